// src/config.rs

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, time::Duration};

use crate::{
    common::error::AppError,
    db::{InventoryRepository, SalesRepository},
    services::{ImportService, LedgerService, SalesService},
};

// Configuração do núcleo de estoque, carregada do ambiente.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    pub database_url: String,
    pub max_connections: u32,
    // As operações do razão são interativas; o timeout de statement é curto
    // de propósito (segundos, não minutos).
    pub statement_timeout: Duration,
}

impl LedgerConfig {
    // Carrega as configurações do .env / variáveis de ambiente.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL deve ser definida"))?;

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);

        let statement_timeout_ms = env::var("DB_STATEMENT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5_000u64);

        Ok(Self {
            database_url,
            max_connections,
            statement_timeout: Duration::from_millis(statement_timeout_ms),
        })
    }
}

/// Cria a pool de conexões aplicando o `statement_timeout` em cada conexão.
pub async fn create_pool(config: &LedgerConfig) -> Result<PgPool, AppError> {
    let timeout_ms = config.statement_timeout.as_millis();
    let set_timeout = format!("SET statement_timeout = '{timeout_ms}ms'");

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .after_connect(move |conn, _meta| {
            let set_timeout = set_timeout.clone();
            Box::pin(async move {
                sqlx::query(&set_timeout).execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await?;

    tracing::info!("Conexão com o banco de dados estabelecida");
    Ok(pool)
}

/// Roda as migrações embutidas (diretório `migrations/`).
pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!().run(pool).await?;
    tracing::info!("Migrações do banco de dados executadas");
    Ok(())
}

// Inicializa o logger. Chamado por binários e testes de integração, nunca
// automaticamente pelo crate.
pub fn init_tracing() {
    tracing_subscriber::fmt().with_target(false).compact().init();
}

// O estado compartilhado que a aplicação embutidora injeta nos handlers.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub ledger_service: LedgerService,
    pub import_service: ImportService,
    pub sales_service: SalesService,
}

impl AppState {
    /// Monta os serviços sobre uma pool já criada.
    pub fn new(db_pool: PgPool) -> Self {
        let inventory_repo = InventoryRepository::new(db_pool.clone());
        let ledger_service = LedgerService::new(inventory_repo.clone());
        let import_service = ImportService::new(inventory_repo, ledger_service.clone());
        let sales_service =
            SalesService::new(SalesRepository::new(db_pool.clone()), ledger_service.clone());

        Self {
            db_pool,
            ledger_service,
            import_service,
            sales_service,
        }
    }

    /// Carrega a configuração do ambiente, conecta e roda as migrações.
    pub async fn from_env() -> Result<Self, AppError> {
        let config = LedgerConfig::from_env()?;
        let db_pool = create_pool(&config).await?;
        run_migrations(&db_pool).await?;
        Ok(Self::new(db_pool))
    }
}
