pub mod ledger_service;
pub use ledger_service::LedgerService;
pub mod import_service;
pub use import_service::{ImportMatcher, ImportService, ProductLookup};
pub mod sales_service;
pub use sales_service::SalesService;
