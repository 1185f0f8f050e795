// src/services/import_service.rs

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Acquire, Executor, Postgres};
use validator::Validate;

use crate::{
    common::error::AppError,
    db::InventoryRepository,
    models::import::{ImportAction, ImportOutcome, ImportPreviewItem, InvoiceLineItem, MatchType},
    models::inventory::{NewProductInput, Product, ReceiveBatchInput},
    services::ledger_service::LedgerService,
};

/// As consultas que a cascata de casamento faz ao cadastro de produtos.
#[async_trait]
pub trait ProductLookup: Send + Sync {
    async fn find_by_import_code(&self, code: &str) -> Result<Option<Product>, AppError>;
    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Product>, AppError>;
    async fn find_by_internal_code(&self, code: &str) -> Result<Option<Product>, AppError>;
    async fn find_by_name_exact(&self, name: &str) -> Result<Option<Product>, AppError>;
    async fn find_by_name_containing(&self, name: &str) -> Result<Option<Product>, AppError>;
}

#[async_trait]
impl ProductLookup for InventoryRepository {
    async fn find_by_import_code(&self, code: &str) -> Result<Option<Product>, AppError> {
        InventoryRepository::find_by_import_code(self, code).await
    }

    async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Product>, AppError> {
        InventoryRepository::find_by_barcode(self, barcode).await
    }

    async fn find_by_internal_code(&self, code: &str) -> Result<Option<Product>, AppError> {
        InventoryRepository::find_by_internal_code(self, code).await
    }

    async fn find_by_name_exact(&self, name: &str) -> Result<Option<Product>, AppError> {
        InventoryRepository::find_by_name_exact(self, name).await
    }

    async fn find_by_name_containing(&self, name: &str) -> Result<Option<Product>, AppError> {
        InventoryRepository::find_by_name_containing(self, name).await
    }
}

/// Código de barras utilizável na cascata: presente, com mais de 3
/// caracteres e diferente do marcador "SEM GTIN" das notas sem GTIN
/// cadastrado.
pub fn matchable_barcode(line: &InvoiceLineItem) -> Option<&str> {
    let barcode = line.barcode.as_deref()?.trim();
    if barcode.chars().count() <= 3 {
        return None;
    }
    if barcode.eq_ignore_ascii_case("SEM GTIN") {
        return None;
    }
    Some(barcode)
}

// Notas de fornecedores diferentes codificam o mesmo produto físico sob
// códigos diferentes. A cascata tenta o identificador mais confiável primeiro
// e só degrada para nome no fim, deixando os casos duvidosos para o operador
// em vez de fundir ou duplicar em silêncio.
#[derive(Clone)]
pub struct ImportMatcher<L> {
    lookup: L,
}

impl<L: ProductLookup> ImportMatcher<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    /// Cascata ordenada, a primeira estratégia que acerta vence.
    pub async fn resolve(
        &self,
        line: &InvoiceLineItem,
    ) -> Result<(Option<Product>, Option<MatchType>), AppError> {
        // 1. Código de importação
        if let Some(product) = self.lookup.find_by_import_code(&line.import_code).await? {
            return Ok((Some(product), Some(MatchType::ImportCode)));
        }

        // 2. Código de barras, quando utilizável
        if let Some(barcode) = matchable_barcode(line) {
            if let Some(product) = self.lookup.find_by_barcode(barcode).await? {
                return Ok((Some(product), Some(MatchType::Barcode)));
            }
        }

        // 3. Código interno igual ao código do item na nota
        if let Some(product) = self.lookup.find_by_internal_code(&line.import_code).await? {
            return Ok((Some(product), Some(MatchType::InternalCode)));
        }

        // 4. Nome: igualdade exata, depois contenção de substring
        if let Some(product) = self.lookup.find_by_name_exact(&line.name).await? {
            return Ok((Some(product), Some(MatchType::Name)));
        }
        if let Some(product) = self.lookup.find_by_name_containing(&line.name).await? {
            return Ok((Some(product), Some(MatchType::Name)));
        }

        // Sem casamento: caminho esperado de criação, não é falha.
        Ok((None, None))
    }
}

#[derive(Clone)]
pub struct ImportService {
    matcher: ImportMatcher<InventoryRepository>,
    ledger: LedgerService,
    repo: InventoryRepository,
}

impl ImportService {
    pub fn new(repo: InventoryRepository, ledger: LedgerService) -> Self {
        Self {
            matcher: ImportMatcher::new(repo.clone()),
            ledger,
            repo,
        }
    }

    /// Conferência: resolve cada linha e sugere a ação padrão
    /// (`AddBatch` quando casou, `Create` quando não). O operador pode
    /// sobrepor na tela antes da confirmação.
    pub async fn preview(
        &self,
        lines: Vec<InvoiceLineItem>,
    ) -> Result<Vec<ImportPreviewItem>, AppError> {
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            line.validate()?;
            let (matched, match_type) = self.matcher.resolve(&line).await?;
            let action = if matched.is_some() {
                ImportAction::AddBatch
            } else {
                ImportAction::Create
            };
            items.push(ImportPreviewItem {
                line,
                matched,
                match_type,
                action,
            });
        }
        Ok(items)
    }

    /// Confirmação: uma transação única para a nota inteira. Linha ignorada
    /// não toca o banco; criação forçada nunca viola o código interno único.
    pub async fn confirm<'e, E>(
        &self,
        executor: E,
        items: Vec<ImportPreviewItem>,
    ) -> Result<ImportOutcome, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;
        let mut outcome = ImportOutcome::default();

        // Códigos já usados nesta transação: o probe de unicidade lê pela
        // pool e não enxerga linhas ainda não commitadas.
        let mut reserved: HashSet<String> = HashSet::new();

        for item in items {
            match item.action {
                ImportAction::Skip => {
                    outcome.skipped += 1;
                }
                ImportAction::Create => {
                    let internal_code = self
                        .derive_internal_code(&item.line.import_code, &reserved)
                        .await?;
                    reserved.insert(internal_code.clone());

                    let input = new_product_from_line(&item.line, internal_code);
                    let product = self.ledger.create_product(&mut *tx, &input).await?;
                    self.ledger
                        .receive_batch(
                            &mut *tx,
                            product.id,
                            &batch_from_line(&item.line, product.sale_price),
                        )
                        .await?;
                    outcome.products_created += 1;
                    outcome.batches_added += 1;
                }
                ImportAction::AddBatch => {
                    let product = item.matched.ok_or(AppError::ImportItemWithoutMatch)?;

                    // Configuração de unidade herdada do produto existente,
                    // salvo sobreposição explícita do operador na linha.
                    if item.line.units_per_package.is_some() || item.line.sell_by_unit.is_some() {
                        let units_per_package = item
                            .line
                            .units_per_package
                            .unwrap_or(product.units_per_package);
                        let sell_by_unit = item.line.sell_by_unit.unwrap_or(product.sell_by_unit);
                        self.repo
                            .update_unit_config(&mut *tx, product.id, units_per_package, sell_by_unit)
                            .await?;
                    }

                    self.ledger
                        .receive_batch(
                            &mut *tx,
                            product.id,
                            &batch_from_line(&item.line, product.sale_price),
                        )
                        .await?;
                    outcome.batches_added += 1;
                }
            }
        }

        tx.commit().await?;

        tracing::info!(
            created = outcome.products_created,
            batches = outcome.batches_added,
            skipped = outcome.skipped,
            "Importação confirmada"
        );
        Ok(outcome)
    }

    /// Deriva um código interno livre a partir do código da nota: o próprio,
    /// depois "-2", "-3", ... até achar um desocupado. Uma criação forçada de
    /// duplicata nunca reusa o código do produto original.
    async fn derive_internal_code(
        &self,
        base: &str,
        reserved: &HashSet<String>,
    ) -> Result<String, AppError> {
        if !reserved.contains(base) && self.repo.find_by_internal_code(base).await?.is_none() {
            return Ok(base.to_string());
        }
        let mut suffix = 2u32;
        loop {
            let candidate = format!("{base}-{suffix}");
            if !reserved.contains(&candidate)
                && self.repo.find_by_internal_code(&candidate).await?.is_none()
            {
                return Ok(candidate);
            }
            suffix += 1;
        }
    }
}

fn new_product_from_line(line: &InvoiceLineItem, internal_code: String) -> NewProductInput {
    NewProductInput {
        internal_code,
        // O marcador "SEM GTIN" nunca é persistido como código de barras.
        barcode: matchable_barcode(line).map(str::to_string),
        import_code: Some(line.import_code.clone()),
        name: line.name.clone(),
        description: None,
        cost_price: line.unit_cost,
        sale_price: line.sale_price.unwrap_or(line.unit_cost),
        units_per_package: line.units_per_package.unwrap_or(Decimal::ONE),
        sell_by_unit: line.sell_by_unit.unwrap_or(true),
        low_stock_threshold: Decimal::ZERO,
    }
}

fn batch_from_line(line: &InvoiceLineItem, default_selling: Decimal) -> ReceiveBatchInput {
    ReceiveBatchInput {
        purchase_date: line.purchase_date.unwrap_or_else(|| Utc::now().date_naive()),
        cost_price: line.unit_cost,
        selling_price: line.sale_price.unwrap_or(default_selling),
        quantity: line.quantity,
        reference: "Importação XML".to_string(),
        observation: None,
        source_reference: line.source_reference.clone(),
        actor: None,
    }
}
