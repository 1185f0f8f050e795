// src/lib.rs

//! Núcleo do livro-razão de estoque por lotes.
//!
//! Este crate concentra as regras que mantêm o saldo agregado de cada produto
//! consistente com seus lotes de compra e com o histórico de movimentações,
//! independente do ponto de entrada: ajuste manual, importação de NF-e,
//! venda no caixa ou cancelamento. A camada HTTP, a autenticação e a
//! impressão vivem fora daqui e consomem os serviços públicos deste módulo.

pub mod common;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

// Reexporta os tipos que os consumidores usam no dia a dia.
pub use common::error::AppError;
pub use config::{AppState, LedgerConfig};
pub use db::{InventoryRepository, SalesRepository};
pub use services::{ImportMatcher, ImportService, LedgerService, ProductLookup, SalesService};
