pub mod airtel;
pub mod in_memory;
pub mod zeebe;
