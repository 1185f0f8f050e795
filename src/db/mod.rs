pub mod inventory_repo;
pub use inventory_repo::InventoryRepository;
pub mod sales_repo;
pub use sales_repo::SalesRepository;
