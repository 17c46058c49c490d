pub mod balance;
pub mod catalog;
pub mod classify;
pub mod test_type;
