// src/db/sales_repo.rs

use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::sales::{OrderItemInput, RecordSaleInput, Sale, SalesOrder, SalesOrderItem},
};

#[derive(Clone)]
pub struct SalesRepository {
    pool: PgPool,
}

impl SalesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Venda simples
    // ---

    pub async fn insert_sale<'e, E>(
        &self,
        executor: E,
        input: &RecordSaleInput,
        total_amount: Decimal,
    ) -> Result<Sale, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sale = sqlx::query_as::<_, Sale>(
            r#"
            INSERT INTO sales (product_id, quantity, unit_price, total_amount, notes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(input.product_id)
        .bind(input.quantity)
        .bind(input.unit_price)
        .bind(total_amount)
        .bind(&input.notes)
        .fetch_one(executor)
        .await?;
        Ok(sale)
    }

    pub async fn get_sale<'e, E>(&self, executor: E, sale_id: Uuid) -> Result<Option<Sale>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = $1")
            .bind(sale_id)
            .fetch_optional(executor)
            .await?;
        Ok(sale)
    }

    pub async fn list_sales(&self) -> Result<Vec<Sale>, AppError> {
        let sales = sqlx::query_as::<_, Sale>("SELECT * FROM sales ORDER BY sold_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(sales)
    }

    pub async fn delete_sale<'e, E>(&self, executor: E, sale_id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM sales WHERE id = $1")
            .bind(sale_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    // ---
    // Pedido de venda
    // ---

    pub async fn insert_order<'e, E>(
        &self,
        executor: E,
        customer_name: Option<&str>,
        notes: Option<&str>,
        total_amount: Decimal,
    ) -> Result<SalesOrder, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, SalesOrder>(
            r#"
            INSERT INTO sales_orders (customer_name, notes, total_amount)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(customer_name)
        .bind(notes)
        .bind(total_amount)
        .fetch_one(executor)
        .await?;
        Ok(order)
    }

    pub async fn insert_order_item<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        item: &OrderItemInput,
    ) -> Result<SalesOrderItem, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, SalesOrderItem>(
            r#"
            INSERT INTO sales_order_items (order_id, product_id, quantity, unit_price)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(item.product_id)
        .bind(item.quantity)
        .bind(item.unit_price)
        .fetch_one(executor)
        .await?;
        Ok(row)
    }

    pub async fn get_order<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
    ) -> Result<Option<SalesOrder>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, SalesOrder>("SELECT * FROM sales_orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(executor)
            .await?;
        Ok(order)
    }

    pub async fn list_orders(&self) -> Result<Vec<SalesOrder>, AppError> {
        let orders =
            sqlx::query_as::<_, SalesOrder>("SELECT * FROM sales_orders ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(orders)
    }

    pub async fn list_order_items<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
    ) -> Result<Vec<SalesOrderItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let items = sqlx::query_as::<_, SalesOrderItem>(
            "SELECT * FROM sales_order_items WHERE order_id = $1 ORDER BY created_at ASC",
        )
        .bind(order_id)
        .fetch_all(executor)
        .await?;
        Ok(items)
    }

    /// Remove o pedido; os itens caem junto pelo ON DELETE CASCADE.
    pub async fn delete_order<'e, E>(&self, executor: E, order_id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM sales_orders WHERE id = $1")
            .bind(order_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }
}
