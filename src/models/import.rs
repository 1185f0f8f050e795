// src/models/import.rs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::inventory::{validate_non_negative, validate_positive, Product};

// Linha de nota fiscal já normalizada pelo parser de XML (que vive fora deste
// crate). O casador nunca enxerga campos soltos ou números em string.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLineItem {
    #[validate(length(min = 1, message = "O código do item na nota é obrigatório"))]
    pub import_code: String,
    pub barcode: Option<String>,
    #[validate(length(min = 1, message = "A descrição do item é obrigatória"))]
    pub name: String,
    #[validate(custom(function = "validate_positive"))]
    pub quantity: Decimal,
    #[validate(custom(function = "validate_non_negative"))]
    pub unit_cost: Decimal,
    pub sale_price: Option<Decimal>,
    pub units_per_package: Option<Decimal>,
    pub sell_by_unit: Option<bool>,
    pub purchase_date: Option<NaiveDate>,
    // Ex.: chave de acesso da NF-e de origem.
    pub source_reference: Option<String>,
}

// Qual estratégia do casamento em cascata resolveu a linha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    ImportCode,
    Barcode,
    InternalCode,
    Name,
}

// Ação escolhida para a linha. O padrão é `AddBatch` quando houve casamento e
// `Create` quando não houve; o operador pode sobrepor na tela de conferência.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportAction {
    Create,
    AddBatch,
    Skip,
}

// Transiente: criado na conferência, consumido na confirmação. Nunca
// persiste, e volta da tela de conferência com a ação escolhida.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreviewItem {
    pub line: InvoiceLineItem,
    pub matched: Option<Product>,
    pub match_type: Option<MatchType>,
    pub action: ImportAction,
}

// Totais da confirmação, para exibição ao operador.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub products_created: usize,
    pub batches_added: usize,
    pub skipped: usize,
}
