// src/models/sales.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::models::inventory::{validate_non_negative, validate_positive};

// --- Venda simples (uma linha por registro) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: Uuid,
    pub display_id: i32,
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub sold_at: DateTime<Utc>,
}

// --- Pedido de venda (várias linhas) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrder {
    pub id: Uuid,
    pub display_id: i32,
    pub customer_name: Option<String>,
    pub total_amount: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
}

// Pedido completo, como a tela de detalhe consome.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesOrderDetail {
    #[serde(flatten)]
    pub header: SalesOrder,
    pub items: Vec<SalesOrderItem>,
}

// --- Entradas ---

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordSaleInput {
    pub product_id: Uuid,
    #[validate(custom(function = "validate_positive"))]
    pub quantity: Decimal,
    #[validate(custom(function = "validate_non_negative"))]
    pub unit_price: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub product_id: Uuid,
    #[validate(custom(function = "validate_positive"))]
    pub quantity: Decimal,
    #[validate(custom(function = "validate_non_negative"))]
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordOrderInput {
    pub customer_name: Option<String>,
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "O pedido precisa de ao menos um item"), nested)]
    pub items: Vec<OrderItemInput>,
}
