// src/services/sales_service.rs

use rust_decimal::Decimal;
use sqlx::{Acquire, Executor, Postgres};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::SalesRepository,
    models::sales::{RecordOrderInput, RecordSaleInput, Sale, SalesOrder, SalesOrderDetail},
    services::ledger_service::LedgerService,
};

// Os dois caminhos de venda (venda simples e pedido com várias linhas) são
// adaptadores finos sobre o mesmo par consume/restore do razão; nenhuma regra
// de estoque vive aqui.
#[derive(Clone)]
pub struct SalesService {
    repo: SalesRepository,
    ledger: LedgerService,
}

impl SalesService {
    pub fn new(repo: SalesRepository, ledger: LedgerService) -> Self {
        Self { repo, ledger }
    }

    // --- VENDA SIMPLES ---

    pub async fn record_sale<'e, E>(
        &self,
        executor: E,
        input: &RecordSaleInput,
    ) -> Result<Sale, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        input.validate()?;
        let mut tx = executor.begin().await?;

        // 1. Registra a venda (gera o display_id usado na referência)
        let total = input.quantity * input.unit_price;
        let sale = self.repo.insert_sale(&mut *tx, input, total).await?;

        // 2. Baixa no razão; estoque insuficiente aborta a venda inteira com
        //    o déficit no erro, nunca limitada ao disponível
        self.ledger
            .consume(
                &mut *tx,
                input.product_id,
                input.quantity,
                input.unit_price,
                &format!("Venda #{}", sale.display_id),
            )
            .await?;

        tx.commit().await?;
        Ok(sale)
    }

    /// Cancela a venda: estorna antes de apagar o registro. Qualquer falha no
    /// estorno aborta o cancelamento inteiro.
    pub async fn cancel_sale<'e, E>(&self, executor: E, sale_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;

        let sale = self
            .repo
            .get_sale(&mut *tx, sale_id)
            .await?
            .ok_or(AppError::SaleNotFound)?;

        self.ledger
            .restore(
                &mut *tx,
                sale.product_id,
                sale.quantity,
                &format!("Cancelamento Venda #{}", sale.display_id),
            )
            .await?;

        self.repo.delete_sale(&mut *tx, sale_id).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_sales(&self) -> Result<Vec<Sale>, AppError> {
        self.repo.list_sales().await
    }

    // --- PEDIDO DE VENDA (VÁRIAS LINHAS) ---

    pub async fn record_order<'e, E>(
        &self,
        executor: E,
        input: &RecordOrderInput,
    ) -> Result<SalesOrderDetail, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        input.validate()?;
        let mut tx = executor.begin().await?;

        let total: Decimal = input
            .items
            .iter()
            .map(|item| item.quantity * item.unit_price)
            .sum();
        let order = self
            .repo
            .insert_order(
                &mut *tx,
                input.customer_name.as_deref(),
                input.notes.as_deref(),
                total,
            )
            .await?;

        // Cada linha baixa pelo mesmo consume; uma linha sem saldo derruba o
        // pedido inteiro.
        let reference = format!("Pedido #{}", order.display_id);
        let mut items = Vec::with_capacity(input.items.len());
        for item in &input.items {
            let row = self.repo.insert_order_item(&mut *tx, order.id, item).await?;
            self.ledger
                .consume(
                    &mut *tx,
                    item.product_id,
                    item.quantity,
                    item.unit_price,
                    &reference,
                )
                .await?;
            items.push(row);
        }

        tx.commit().await?;
        Ok(SalesOrderDetail {
            header: order,
            items,
        })
    }

    /// Cancela o pedido: estorna linha a linha e só então apaga o registro.
    /// Sem reversão parcial — qualquer estorno que falhe aborta tudo.
    pub async fn cancel_order<'e, E>(&self, executor: E, order_id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        let mut tx = executor.begin().await?;

        let order = self
            .repo
            .get_order(&mut *tx, order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        let items = self.repo.list_order_items(&mut *tx, order_id).await?;

        let reference = format!("Cancelamento Pedido #{}", order.display_id);
        for item in &items {
            self.ledger
                .restore(&mut *tx, item.product_id, item.quantity, &reference)
                .await?;
        }

        // Itens caem junto pelo CASCADE.
        self.repo.delete_order(&mut *tx, order_id).await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_orders(&self) -> Result<Vec<SalesOrder>, AppError> {
        self.repo.list_orders().await
    }

    pub async fn get_order_detail<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
    ) -> Result<SalesOrderDetail, AppError>
    where
        E: Executor<'e, Database = Postgres> + Acquire<'e, Database = Postgres>,
    {
        let mut conn = executor.acquire().await?;

        let order = self
            .repo
            .get_order(&mut *conn, order_id)
            .await?
            .ok_or(AppError::OrderNotFound)?;
        let items = self.repo.list_order_items(&mut *conn, order_id).await?;

        Ok(SalesOrderDetail {
            header: order,
            items,
        })
    }
}
