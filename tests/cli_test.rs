use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_cli_help_lists_options() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--max-retry-count"))
        .stdout(predicate::str::contains("--zeebe-rest-url"))
        .stdout(predicate::str::contains("--skip-provider"));

    Ok(())
}

#[test]
fn test_cli_requires_credentials() {
    let mut cmd = Command::new(cargo_bin!());
    cmd.env_remove("AIRTEL_CLIENT_ID")
        .env_remove("AIRTEL_CLIENT_SECRET");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--airtel-client-id"));
}

#[test]
fn test_cli_rejects_bad_country_codes() {
    let mut cmd = Command::new(cargo_bin!());
    cmd.args([
        "--airtel-client-id",
        "id",
        "--airtel-client-secret",
        "secret",
        "--country-codes",
        "kes",
    ]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("currency=country"));
}
