// src/services/ledger_service.rs

use rust_decimal::Decimal;
use sqlx::{Acquire, Executor, Postgres};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::InventoryRepository,
    models::inventory::{
        Batch, BatchDraw, MovementDirection, NewProductInput, Product, ReceiveBatchInput,
        ReviseBatchInput, StockMovement,
    },
};

// A única autoridade sobre lotes, movimentações e agregados. Os quatro pontos
// de entrada (ajuste manual, importação, venda, cancelamento) convergem aqui,
// então as invariantes são garantidas em um lugar só.
#[derive(Clone)]
pub struct LedgerService {
    repo: InventoryRepository,
}

// ---
// Planejamento puro (sem banco)
// ---
// As decisões de qual lote baixar/reabastecer são funções puras sobre o
// retrato que a transação trancou com FOR UPDATE. Nada é mutado no plano.

/// Planeja a baixa FIFO: lote de compra mais antiga primeiro, desempate pela
/// ordem de criação. Se o saldo total não cobre o pedido, nenhum lote é
/// tocado e o déficit volta ao chamador.
pub fn plan_fifo_consumption(
    batches: &[Batch],
    requested: Decimal,
) -> Result<Vec<BatchDraw>, AppError> {
    let available: Decimal = batches.iter().map(|b| b.quantity_remaining).sum();
    if available < requested {
        return Err(AppError::InsufficientStock {
            requested,
            available,
        });
    }

    let mut ordered: Vec<&Batch> = batches.iter().collect();
    ordered.sort_by(|a, b| {
        a.purchase_date
            .cmp(&b.purchase_date)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });

    let mut remaining = requested;
    let mut plan = Vec::new();
    for batch in ordered {
        if remaining <= Decimal::ZERO {
            break;
        }
        if batch.quantity_remaining <= Decimal::ZERO {
            continue;
        }
        let take = batch.quantity_remaining.min(remaining);
        plan.push(BatchDraw {
            batch_id: batch.id,
            quantity: take,
        });
        remaining -= take;
    }
    Ok(plan)
}

/// Planeja o estorno: reabastece do lote mais novo para o mais antigo, cada
/// lote limitado ao seu `quantity_received`. Sem o vínculo venda->lote o
/// estorno é melhor esforço, não um desfazer exato; quando a capacidade dos
/// lotes não comporta a quantidade, a operação inteira falha em vez de
/// descartar a sobra em silêncio.
pub fn plan_restore(batches: &[Batch], quantity: Decimal) -> Result<Vec<BatchDraw>, AppError> {
    let mut ordered: Vec<&Batch> = batches.iter().collect();
    ordered.sort_by(|a, b| {
        b.purchase_date
            .cmp(&a.purchase_date)
            .then(b.created_at.cmp(&a.created_at))
            .then(b.id.cmp(&a.id))
    });

    let mut remaining = quantity;
    let mut plan = Vec::new();
    for batch in ordered {
        if remaining <= Decimal::ZERO {
            break;
        }
        // Edições administrativas podem deixar remaining > received; a
        // capacidade nunca é negativa.
        let capacity = (batch.quantity_received - batch.quantity_remaining).max(Decimal::ZERO);
        if capacity <= Decimal::ZERO {
            continue;
        }
        let put = capacity.min(remaining);
        plan.push(BatchDraw {
            batch_id: batch.id,
            quantity: put,
        });
        remaining -= put;
    }

    if remaining > Decimal::ZERO {
        return Err(AppError::RestoreExceedsCapacity {
            requested: quantity,
            capacity: quantity - remaining,
        });
    }
    Ok(plan)
}

impl LedgerService {
    pub fn new(repo: InventoryRepository) -> Self {
        Self { repo }
    }

    // --- PRODUTO ---

    pub async fn create_product<'e, E>(
        &self,
        executor: E,
        input: &NewProductInput,
    ) -> Result<Product, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        input.validate()?;
        self.repo.create_product(executor, input).await
    }

    pub async fn get_product<'e, E>(&self, executor: E, product_id: Uuid) -> Result<Product, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        self.repo
            .get_product(executor, product_id)
            .await?
            .ok_or(AppError::ProductNotFound)
    }

    pub async fn list_products<'e, E>(&self, executor: E) -> Result<Vec<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        self.repo.list_products(executor).await
    }

    /// Produtos no limiar de reposição ou abaixo dele.
    pub async fn list_low_stock<'e, E>(&self, executor: E) -> Result<Vec<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        self.repo.list_low_stock(executor).await
    }

    pub async fn list_batches<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<Vec<Batch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        self.repo.list_batches(executor, product_id).await
    }

    /// Histórico de movimentações do produto, mais recente primeiro.
    pub async fn list_movements<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<Vec<StockMovement>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        self.repo.list_movements(executor, product_id).await
    }

    /// Exclusão de produto com movimentações é recusada por padrão; com
    /// `force` as movimentações dependentes são apagadas junto. Operação
    /// deliberada de perda de dados, sempre logada.
    pub async fn delete_product<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
        force: bool,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;

        self.repo
            .get_product_for_update(&mut *tx, product_id)
            .await?
            .ok_or(AppError::ProductNotFound)?;

        let movements = self.repo.count_movements(&mut *tx, product_id).await?;
        if movements > 0 {
            if !force {
                return Err(AppError::ProductHasMovements);
            }
            tracing::warn!(
                %product_id,
                movements,
                "Exclusão forçada de produto: apagando a trilha de auditoria"
            );
            self.repo
                .delete_movements_by_product(&mut *tx, product_id)
                .await?;
        }

        // Os lotes caem pelo ON DELETE CASCADE.
        self.repo.delete_product(&mut *tx, product_id).await?;

        tx.commit().await?;
        Ok(())
    }

    // --- RECEBIMENTO (ENTRADA) ---

    /// Recebe um lote: insere o lote com saldo integral, espelha uma
    /// movimentação de entrada e atualiza os agregados. Tudo ou nada.
    pub async fn receive_batch<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
        input: &ReceiveBatchInput,
    ) -> Result<Batch, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        input.validate()?;
        let mut tx = executor.begin().await?;

        // 1. Tranca o produto (e garante que existe)
        self.repo
            .get_product_for_update(&mut *tx, product_id)
            .await?
            .ok_or(AppError::ProductNotFound)?;

        // 2. Insere o lote com quantity_remaining = quantity
        let batch = self.repo.insert_batch(&mut *tx, product_id, input).await?;

        // 3. Grava a entrada no razão com a mesma quantidade e custo
        self.repo
            .record_movement(
                &mut *tx,
                product_id,
                MovementDirection::In,
                input.quantity,
                Some(input.cost_price),
                &input.reference,
                input.actor.as_deref(),
            )
            .await?;

        // 4. Atualiza agregados
        self.repo
            .apply_aggregate_delta(&mut *tx, product_id, input.quantity, Decimal::ZERO)
            .await?;

        tx.commit().await?;

        tracing::info!(%product_id, batch_id = %batch.id, quantity = %input.quantity, "Lote recebido");
        Ok(batch)
    }

    // --- CORREÇÃO ADMINISTRATIVA ---

    /// Revisa campos do lote. Um delta em `quantity_received` vai para o
    /// `total_entry` do produto; `current_quantity` é sempre rederivado dos
    /// lotes. Nenhuma movimentação é gravada (o razão e os contadores podem
    /// divergir até um `recompute_aggregate`).
    pub async fn revise_batch<'e, E>(
        &self,
        executor: E,
        batch_id: Uuid,
        input: &ReviseBatchInput,
    ) -> Result<Batch, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        input.validate()?;
        let mut tx = executor.begin().await?;

        let current = self
            .repo
            .get_batch(&mut *tx, batch_id)
            .await?
            .ok_or(AppError::BatchNotFound)?;

        self.repo
            .get_product_for_update(&mut *tx, current.product_id)
            .await?
            .ok_or(AppError::ProductNotFound)?;

        let updated = self
            .repo
            .update_batch(&mut *tx, batch_id, input)
            .await?
            .ok_or(AppError::BatchNotFound)?;

        let entry_delta = updated.quantity_received - current.quantity_received;
        self.repo
            .apply_aggregate_delta(&mut *tx, current.product_id, entry_delta, Decimal::ZERO)
            .await?;

        tx.commit().await?;
        Ok(updated)
    }

    /// Remove o lote e abate seu `quantity_received` do `total_entry`. As
    /// movimentações associadas sobrevivem (trilha de auditoria). Excluir
    /// também o produto quando este era o último lote é decisão do chamador.
    pub async fn delete_batch<'e, E>(&self, executor: E, batch_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;

        let batch = self
            .repo
            .get_batch(&mut *tx, batch_id)
            .await?
            .ok_or(AppError::BatchNotFound)?;

        self.repo
            .get_product_for_update(&mut *tx, batch.product_id)
            .await?
            .ok_or(AppError::ProductNotFound)?;

        self.repo.delete_batch(&mut *tx, batch_id).await?;

        self.repo
            .apply_aggregate_delta(
                &mut *tx,
                batch.product_id,
                -batch.quantity_received,
                Decimal::ZERO,
            )
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // --- BAIXA (VENDA / SAÍDA) ---

    /// Baixa `quantity` unidades em ordem FIFO. Com saldo insuficiente nada é
    /// commitado e o déficit é reportado — a venda nunca é limitada ao
    /// disponível em silêncio. Devolve quanto saiu de cada lote.
    pub async fn consume<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
        quantity: Decimal,
        unit_price: Decimal,
        reference: &str,
    ) -> Result<Vec<BatchDraw>, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        if quantity <= Decimal::ZERO {
            return Err(AppError::InvalidQuantity);
        }
        let mut tx = executor.begin().await?;

        // 1. Tranca produto e lotes: duas baixas simultâneas do mesmo saldo
        //    ficam serializadas aqui.
        self.repo
            .get_product_for_update(&mut *tx, product_id)
            .await?
            .ok_or(AppError::ProductNotFound)?;
        let batches = self.repo.get_batches_for_update(&mut *tx, product_id).await?;

        // 2. Planeja a baixa sobre o retrato trancado; aborta antes de mutar
        let plan = plan_fifo_consumption(&batches, quantity)?;

        // 3. Baixa lote a lote conforme o plano
        for draw in &plan {
            self.repo
                .adjust_batch_remaining(&mut *tx, draw.batch_id, -draw.quantity)
                .await?;
        }

        // 4. Uma saída no razão pela quantidade cheia, ao preço cobrado
        self.repo
            .record_movement(
                &mut *tx,
                product_id,
                MovementDirection::Out,
                quantity,
                Some(unit_price),
                reference,
                None,
            )
            .await?;

        // 5. Atualiza agregados
        self.repo
            .apply_aggregate_delta(&mut *tx, product_id, Decimal::ZERO, quantity)
            .await?;

        tx.commit().await?;
        Ok(plan)
    }

    // --- ESTORNO (CANCELAMENTO) ---

    /// Devolve `quantity` unidades aos lotes, do mais novo para o mais
    /// antigo, sem nunca passar do `quantity_received` de cada um. Grava uma
    /// entrada compensatória no razão.
    pub async fn restore<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
        quantity: Decimal,
        reference: &str,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        if quantity <= Decimal::ZERO {
            return Err(AppError::InvalidQuantity);
        }
        let mut tx = executor.begin().await?;

        self.repo
            .get_product_for_update(&mut *tx, product_id)
            .await?
            .ok_or(AppError::ProductNotFound)?;
        let batches = self.repo.get_batches_for_update(&mut *tx, product_id).await?;

        let plan = plan_restore(&batches, quantity)?;

        for draw in &plan {
            self.repo
                .adjust_batch_remaining(&mut *tx, draw.batch_id, draw.quantity)
                .await?;
        }

        self.repo
            .record_movement(
                &mut *tx,
                product_id,
                MovementDirection::In,
                quantity,
                None,
                reference,
                None,
            )
            .await?;

        self.repo
            .apply_aggregate_delta(&mut *tx, product_id, quantity, Decimal::ZERO)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // --- REPARO ---

    /// Rederiva os três agregados das tabelas de lotes e movimentações.
    /// Ponto de convergência depois de edições em massa ou falhas parciais.
    pub async fn recompute_aggregate<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<Product, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        self.repo
            .recompute_aggregate(executor, product_id)
            .await?
            .ok_or(AppError::ProductNotFound)
    }
}
