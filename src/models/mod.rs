pub mod import;
pub mod inventory;
pub mod sales;
