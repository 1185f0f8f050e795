// src/common/error.rs

use rust_decimal::Decimal;
use thiserror::Error;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
// A camada de API que embute este crate decide o mapeamento para status HTTP;
// aqui só existe a taxonomia de domínio.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("A quantidade deve ser maior que zero")]
    InvalidQuantity,

    #[error("Produto não encontrado")]
    ProductNotFound,

    #[error("Lote não encontrado")]
    BatchNotFound,

    #[error("Venda não encontrada")]
    SaleNotFound,

    #[error("Pedido não encontrado")]
    OrderNotFound,

    // A venda nunca é limitada ao saldo disponível: o chamador recebe o
    // déficit e decide o que fazer com a linha.
    #[error("Estoque insuficiente: solicitado {requested}, disponível {available}")]
    InsufficientStock {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Código interno já cadastrado: {0}")]
    InternalCodeAlreadyExists(String),

    #[error("Código de barras já cadastrado: {0}")]
    BarcodeAlreadyExists(String),

    #[error("Produto possui movimentações vinculadas")]
    ProductHasMovements,

    #[error("Estorno excede a capacidade dos lotes: solicitado {requested}, capacidade {capacity}")]
    RestoreExceedsCapacity {
        requested: Decimal,
        capacity: Decimal,
    },

    #[error("Item de importação sem produto correspondente")]
    ImportItemWithoutMatch,

    // Variante para erros de banco de dados (sqlx)
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Falha ao executar migrações")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// Indica falha de commit que vale uma única nova tentativa pelo chamador
    /// (deadlock ou falha de serialização do Postgres).
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::DatabaseError(sqlx::Error::Database(db_err)) => {
                matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }
}
