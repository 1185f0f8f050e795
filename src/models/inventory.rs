// src/models/inventory.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

// --- 1. Produto ---
// O catálogo mais os agregados de saldo. `current_quantity`, `total_entry` e
// `total_exit` são derivados dos lotes/movimentações e recalculados em toda
// escrita do razão; nunca são editados diretamente.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub internal_code: String,
    pub barcode: Option<String>,
    // Código pelo qual o sistema emissor da nota identifica o item.
    pub import_code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub cost_price: Decimal,
    pub sale_price: Decimal,
    pub units_per_package: Decimal,
    pub sell_by_unit: bool,
    pub low_stock_threshold: Decimal,
    pub current_quantity: Decimal,
    pub total_entry: Decimal,
    pub total_exit: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- 2. Lote de compra ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: Uuid,
    pub product_id: Uuid,
    pub purchase_date: NaiveDate,
    pub cost_price: Decimal,
    pub selling_price: Decimal,
    pub quantity_received: Decimal,
    // Decrementado pelas vendas, reposto por cancelamentos. Nunca negativo.
    pub quantity_remaining: Decimal,
    pub observation: Option<String>,
    // Referência da origem quando o lote nasceu de uma importação
    // (ex.: chave de acesso da NF-e).
    pub source_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- 3. Movimentação de estoque (histórico) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "movement_direction", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementDirection {
    In,  // Vira "IN"
    Out, // Vira "OUT"
}

// Fato imutável: registro só de inserção, sobrevive à exclusão do lote.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub direction: MovementDirection,
    pub quantity: Decimal,
    pub unit_price: Option<Decimal>,
    pub reference: String,
    pub actor: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Resultado da baixa: quanto saiu de cada lote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchDraw {
    pub batch_id: Uuid,
    pub quantity: Decimal,
}

// --- 4. Entradas (DTOs validados) ---

pub fn validate_positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor deve ser maior que zero.".into());
        return Err(err);
    }
    Ok(())
}

pub fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        let mut err = ValidationError::new("range");
        err.message = Some("O valor não pode ser negativo.".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewProductInput {
    #[validate(length(min = 1, message = "O código interno é obrigatório"))]
    pub internal_code: String,
    pub barcode: Option<String>,
    pub import_code: Option<String>,
    #[validate(length(min = 1, message = "O nome é obrigatório"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom(function = "validate_non_negative"))]
    pub cost_price: Decimal,
    #[validate(custom(function = "validate_non_negative"))]
    pub sale_price: Decimal,
    #[validate(custom(function = "validate_positive"))]
    pub units_per_package: Decimal,
    pub sell_by_unit: bool,
    #[validate(custom(function = "validate_non_negative"))]
    pub low_stock_threshold: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveBatchInput {
    pub purchase_date: NaiveDate,
    #[validate(custom(function = "validate_non_negative"))]
    pub cost_price: Decimal,
    #[validate(custom(function = "validate_non_negative"))]
    pub selling_price: Decimal,
    #[validate(custom(function = "validate_positive"))]
    pub quantity: Decimal,
    #[validate(length(min = 1, message = "A referência é obrigatória"))]
    pub reference: String,
    pub observation: Option<String>,
    pub source_reference: Option<String>,
    pub actor: Option<String>,
}

// Correção administrativa: só os campos presentes são alterados.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviseBatchInput {
    pub purchase_date: Option<NaiveDate>,
    #[validate(custom(function = "validate_non_negative"))]
    pub cost_price: Option<Decimal>,
    #[validate(custom(function = "validate_non_negative"))]
    pub selling_price: Option<Decimal>,
    #[validate(custom(function = "validate_non_negative"))]
    pub quantity_received: Option<Decimal>,
    #[validate(custom(function = "validate_non_negative"))]
    pub quantity_remaining: Option<Decimal>,
    pub observation: Option<String>,
}
