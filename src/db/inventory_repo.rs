// src/db/inventory_repo.rs

use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::inventory::{
        Batch, MovementDirection, NewProductInput, Product, ReceiveBatchInput, ReviseBatchInput,
        StockMovement,
    },
};

#[derive(Clone)]
pub struct InventoryRepository {
    pool: PgPool,
}

impl InventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Consultas do casamento de importação (cascata)
    // ---
    // Leituras da conferência: usam a pool principal, fora de transação.

    pub async fn find_by_import_code(&self, code: &str) -> Result<Option<Product>, AppError> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE import_code = $1 ORDER BY created_at ASC LIMIT 1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    pub async fn find_by_barcode(&self, barcode: &str) -> Result<Option<Product>, AppError> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE barcode = $1")
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    pub async fn find_by_internal_code(&self, code: &str) -> Result<Option<Product>, AppError> {
        let product =
            sqlx::query_as::<_, Product>("SELECT * FROM products WHERE internal_code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
        Ok(product)
    }

    pub async fn find_by_name_exact(&self, name: &str) -> Result<Option<Product>, AppError> {
        let product = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE name = $1 ORDER BY created_at ASC LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    /// Contenção de substring sem sensibilidade a caixa nem a acentos, nas
    /// duas direções (o nome da nota costuma trazer sufixos do fornecedor).
    pub async fn find_by_name_containing(&self, name: &str) -> Result<Option<Product>, AppError> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE unaccent(upper($1)) LIKE '%' || unaccent(upper(name)) || '%'
               OR unaccent(upper(name)) LIKE '%' || unaccent(upper($1)) || '%'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(product)
    }

    // ---
    // Produtos
    // ---
    // Escritas usam o padrão genérico 'Executor' para rodar dentro da
    // transação do chamador.

    pub async fn create_product<'e, E>(
        &self,
        executor: E,
        input: &NewProductInput,
    ) -> Result<Product, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (
                internal_code, barcode, import_code, name, description,
                cost_price, sale_price, units_per_package, sell_by_unit,
                low_stock_threshold
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(&input.internal_code)
        .bind(&input.barcode)
        .bind(&input.import_code)
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.cost_price)
        .bind(input.sale_price)
        .bind(input.units_per_package)
        .bind(input.sell_by_unit)
        .bind(input.low_stock_threshold)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error() {
                if db_err.is_unique_violation() {
                    let constraint = db_err.constraint().unwrap_or_default();
                    if constraint.contains("barcode") {
                        return AppError::BarcodeAlreadyExists(
                            input.barcode.clone().unwrap_or_default(),
                        );
                    }
                    return AppError::InternalCodeAlreadyExists(input.internal_code.clone());
                }
            }
            e.into()
        })
    }

    pub async fn get_product<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<Option<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(product_id)
            .fetch_optional(executor)
            .await?;
        Ok(product)
    }

    /// Tranca a linha do produto pela duração da transação. Toda operação que
    /// mexe em lotes passa por aqui primeiro, serializando os concorrentes.
    pub async fn get_product_for_update<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<Option<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let product =
            sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
                .bind(product_id)
                .fetch_optional(executor)
                .await?;
        Ok(product)
    }

    pub async fn list_products<'e, E>(&self, executor: E) -> Result<Vec<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let products = sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY name ASC")
            .fetch_all(executor)
            .await?;
        Ok(products)
    }

    pub async fn list_low_stock<'e, E>(&self, executor: E) -> Result<Vec<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let products = sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE current_quantity <= low_stock_threshold ORDER BY name ASC",
        )
        .fetch_all(executor)
        .await?;
        Ok(products)
    }

    pub async fn update_unit_config<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
        units_per_package: Decimal,
        sell_by_unit: bool,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE products SET units_per_package = $2, sell_by_unit = $3, updated_at = now() WHERE id = $1",
        )
        .bind(product_id)
        .bind(units_per_package)
        .bind(sell_by_unit)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn delete_product<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(product_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    // ---
    // Lotes
    // ---

    pub async fn insert_batch<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
        input: &ReceiveBatchInput,
    ) -> Result<Batch, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batch = sqlx::query_as::<_, Batch>(
            r#"
            INSERT INTO batches (
                product_id, purchase_date, cost_price, selling_price,
                quantity_received, quantity_remaining, observation, source_reference
            )
            VALUES ($1, $2, $3, $4, $5, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(product_id)
        .bind(input.purchase_date)
        .bind(input.cost_price)
        .bind(input.selling_price)
        .bind(input.quantity)
        .bind(&input.observation)
        .bind(&input.source_reference)
        .fetch_one(executor)
        .await?;
        Ok(batch)
    }

    pub async fn get_batch<'e, E>(
        &self,
        executor: E,
        batch_id: Uuid,
    ) -> Result<Option<Batch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batch = sqlx::query_as::<_, Batch>("SELECT * FROM batches WHERE id = $1")
            .bind(batch_id)
            .fetch_optional(executor)
            .await?;
        Ok(batch)
    }

    pub async fn list_batches<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<Vec<Batch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batches = sqlx::query_as::<_, Batch>(
            "SELECT * FROM batches WHERE product_id = $1 ORDER BY purchase_date ASC, created_at ASC, id ASC",
        )
        .bind(product_id)
        .fetch_all(executor)
        .await?;
        Ok(batches)
    }

    /// Lê os lotes do produto em ordem FIFO trancando as linhas
    /// (`FOR UPDATE`): é o que impede duas baixas simultâneas de venderem o
    /// mesmo saldo.
    pub async fn get_batches_for_update<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<Vec<Batch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batches = sqlx::query_as::<_, Batch>(
            r#"
            SELECT * FROM batches
            WHERE product_id = $1
            ORDER BY purchase_date ASC, created_at ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(product_id)
        .fetch_all(executor)
        .await?;
        Ok(batches)
    }

    /// Correção administrativa: só altera os campos presentes.
    pub async fn update_batch<'e, E>(
        &self,
        executor: E,
        batch_id: Uuid,
        input: &ReviseBatchInput,
    ) -> Result<Option<Batch>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let batch = sqlx::query_as::<_, Batch>(
            r#"
            UPDATE batches SET
                purchase_date = COALESCE($2, purchase_date),
                cost_price = COALESCE($3, cost_price),
                selling_price = COALESCE($4, selling_price),
                quantity_received = COALESCE($5, quantity_received),
                quantity_remaining = COALESCE($6, quantity_remaining),
                observation = COALESCE($7, observation),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(batch_id)
        .bind(input.purchase_date)
        .bind(input.cost_price)
        .bind(input.selling_price)
        .bind(input.quantity_received)
        .bind(input.quantity_remaining)
        .bind(&input.observation)
        .fetch_optional(executor)
        .await?;
        Ok(batch)
    }

    /// Soma `delta` ao saldo restante do lote (negativo na baixa, positivo no
    /// estorno). O CHECK da tabela barra qualquer saldo negativo.
    pub async fn adjust_batch_remaining<'e, E>(
        &self,
        executor: E,
        batch_id: Uuid,
        delta: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            "UPDATE batches SET quantity_remaining = quantity_remaining + $2, updated_at = now() WHERE id = $1",
        )
        .bind(batch_id)
        .bind(delta)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn delete_batch<'e, E>(&self, executor: E, batch_id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM batches WHERE id = $1")
            .bind(batch_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    // ---
    // Movimentações (livro-razão)
    // ---

    /// Registra uma movimentação no histórico (auditoria).
    pub async fn record_movement<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
        direction: MovementDirection,
        quantity: Decimal,
        unit_price: Option<Decimal>,
        reference: &str,
        actor: Option<&str>,
    ) -> Result<StockMovement, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let movement = sqlx::query_as::<_, StockMovement>(
            r#"
            INSERT INTO stock_movements (product_id, direction, quantity, unit_price, reference, actor)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(product_id)
        .bind(direction)
        .bind(quantity)
        .bind(unit_price)
        .bind(reference)
        .bind(actor)
        .fetch_one(executor)
        .await?;
        Ok(movement)
    }

    pub async fn list_movements<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<Vec<StockMovement>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let movements = sqlx::query_as::<_, StockMovement>(
            "SELECT * FROM stock_movements WHERE product_id = $1 ORDER BY created_at DESC",
        )
        .bind(product_id)
        .fetch_all(executor)
        .await?;
        Ok(movements)
    }

    pub async fn count_movements<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM stock_movements WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_one(executor)
        .await?;
        Ok(count)
    }

    pub async fn delete_movements_by_product<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM stock_movements WHERE product_id = $1")
            .bind(product_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    // ---
    // Agregados
    // ---

    /// Aplica os deltas de entrada/saída e rederiva `current_quantity` da
    /// soma dos lotes, tudo na mesma transação da escrita que o motivou.
    pub async fn apply_aggregate_delta<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
        entry_delta: Decimal,
        exit_delta: Decimal,
    ) -> Result<Product, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                total_entry = total_entry + $2,
                total_exit = total_exit + $3,
                current_quantity = COALESCE(
                    (SELECT SUM(quantity_remaining) FROM batches WHERE product_id = $1), 0),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(product_id)
        .bind(entry_delta)
        .bind(exit_delta)
        .fetch_one(executor)
        .await?;
        Ok(product)
    }

    /// Rederiva os três agregados a partir das tabelas de lotes e
    /// movimentações. Ferramenta de reparo e de verificação de invariantes.
    pub async fn recompute_aggregate<'e, E>(
        &self,
        executor: E,
        product_id: Uuid,
    ) -> Result<Option<Product>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                total_entry = COALESCE((SELECT SUM(quantity) FROM stock_movements
                                        WHERE product_id = $1 AND direction = 'IN'), 0),
                total_exit = COALESCE((SELECT SUM(quantity) FROM stock_movements
                                       WHERE product_id = $1 AND direction = 'OUT'), 0),
                current_quantity = COALESCE(
                    (SELECT SUM(quantity_remaining) FROM batches WHERE product_id = $1), 0),
                updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(product_id)
        .fetch_optional(executor)
        .await?;
        Ok(product)
    }
}
