//! Persistence Layer
//!
//! SQLite storage for accounts, verification state, the affiliate ledger,
//! withdrawals and forward-test history, accessed asynchronously via sqlx.
//!
//! # Database Schema
//!
//! ## users
//! - id, email (unique), password_hash (argon2 PHC string)
//! - phone (unique, E.164), phone_verified, email_verified
//! - referral_code (unique), referrer_id (nullable, self reference)
//! - two_factor_secret (base32, nullable), two_factor_enabled
//!
//! ## otp_attempts
//! - destination, channel, purpose, code_hash (HMAC), attempts
//! - created_at, expires_at, consumed_at
//!
//! ## devices / recovery_codes
//! - per-user device fingerprints and hashed 2FA recovery codes
//!
//! ## affiliate_sales / affiliate_commissions
//! - one row per recorded sale (idempotent on source_ref) and one row per
//!   upline share paid for it
//!
//! ## withdrawal_requests
//! - amounts in satang, destination, status (pending/approved/rejected/paid)
//!
//! ## forward_test_sequences
//! - local copy of sequences synced from the signal service

pub mod affiliate_repository;
pub mod device_repository;
pub mod forward_test_repository;
pub mod models;
pub mod otp_repository;
pub mod user_repository;
pub mod withdrawal_repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Unique constraint violated: {0}")]
    Duplicate(String),
}

impl DatabaseError {
    /// Maps a query failure, keeping unique-constraint violations distinguishable.
    pub fn from_query(context: &str, e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.is_unique_violation() {
                return DatabaseError::Duplicate(format!("{}: {}", context, db_err.message()));
            }
        }
        DatabaseError::QueryError(format!("{}: {}", context, e))
    }
}

/// Initialize the database connection pool
///
/// # Arguments
/// - `config`: URL (e.g., "sqlite://data/tradeport.db") and pool size
///
/// # Errors
/// Returns error if database connection fails or migrations fail
pub async fn init_database(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", config.url);

    let in_memory = config.url.contains(":memory:");

    // Ensure data directory exists
    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !in_memory && !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
                })?;
            }
        }
    }

    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let options = if config.log_queries {
        options.log_statements(tracing::log::LevelFilter::Debug)
    } else {
        options.disable_statement_logging()
    };

    // Every connection to `:memory:` is a separate database, so keep exactly one alive
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    let pool = pool_options.connect_with(options).await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

/// Shortcut used by tests and tools: in-memory database with the full schema.
pub async fn init_memory_database() -> Result<DbPool, DatabaseError> {
    init_database(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        log_queries: false,
    })
    .await
}

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            display_name TEXT,
            phone TEXT UNIQUE,
            phone_verified BOOLEAN NOT NULL DEFAULT 0,
            email_verified BOOLEAN NOT NULL DEFAULT 0,
            referral_code TEXT NOT NULL UNIQUE,
            referrer_id TEXT REFERENCES users(id),
            two_factor_secret TEXT,
            two_factor_enabled BOOLEAN NOT NULL DEFAULT 0,
            two_factor_last_step INTEGER,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "otp_attempts",
        r#"
        CREATE TABLE IF NOT EXISTS otp_attempts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT REFERENCES users(id),
            destination TEXT NOT NULL,
            channel TEXT NOT NULL CHECK(channel IN ('sms', 'email')),
            purpose TEXT NOT NULL,
            code_hash TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            expires_at DATETIME NOT NULL,
            consumed_at DATETIME
        )
        "#,
    ),
    (
        "devices",
        r#"
        CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            fingerprint TEXT NOT NULL,
            label TEXT NOT NULL,
            last_ip TEXT,
            first_seen_at DATETIME NOT NULL,
            last_seen_at DATETIME NOT NULL,
            UNIQUE(user_id, fingerprint)
        )
        "#,
    ),
    (
        "recovery_codes",
        r#"
        CREATE TABLE IF NOT EXISTS recovery_codes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL REFERENCES users(id),
            code_hash TEXT NOT NULL,
            used_at DATETIME,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "affiliate_sales",
        r#"
        CREATE TABLE IF NOT EXISTS affiliate_sales (
            source_ref TEXT PRIMARY KEY,
            buyer_id TEXT NOT NULL REFERENCES users(id),
            amount INTEGER NOT NULL CHECK(amount >= 0),
            total_commission INTEGER NOT NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "affiliate_commissions",
        r#"
        CREATE TABLE IF NOT EXISTS affiliate_commissions (
            id TEXT PRIMARY KEY,
            source_ref TEXT NOT NULL REFERENCES affiliate_sales(source_ref),
            beneficiary_id TEXT NOT NULL REFERENCES users(id),
            buyer_id TEXT NOT NULL REFERENCES users(id),
            level INTEGER NOT NULL,
            sale_amount INTEGER NOT NULL,
            amount INTEGER NOT NULL CHECK(amount >= 0),
            created_at DATETIME NOT NULL,
            UNIQUE(source_ref, beneficiary_id)
        )
        "#,
    ),
    (
        "withdrawal_requests",
        r#"
        CREATE TABLE IF NOT EXISTS withdrawal_requests (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            amount INTEGER NOT NULL CHECK(amount > 0),
            method TEXT NOT NULL CHECK(method IN ('bank', 'promptpay')),
            bank_code TEXT,
            account_number TEXT,
            account_name TEXT NOT NULL,
            promptpay_id TEXT,
            status TEXT NOT NULL CHECK(status IN ('pending', 'approved', 'rejected', 'paid')),
            reject_reason TEXT,
            payment_reference TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            processed_at DATETIME
        )
        "#,
    ),
    (
        "forward_test_sequences",
        r#"
        CREATE TABLE IF NOT EXISTS forward_test_sequences (
            sequence_id TEXT PRIMARY KEY,
            symbol TEXT NOT NULL,
            timeframe TEXT NOT NULL,
            model_version TEXT NOT NULL,
            side TEXT NOT NULL,
            entry_price REAL NOT NULL,
            exit_price REAL,
            pnl_percent REAL,
            status TEXT NOT NULL,
            opened_at DATETIME NOT NULL,
            closed_at DATETIME,
            updated_at DATETIME NOT NULL
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_users_referrer ON users(referrer_id)",
    "CREATE INDEX IF NOT EXISTS idx_otp_destination ON otp_attempts(destination, purpose, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_devices_user ON devices(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_recovery_user ON recovery_codes(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_commissions_beneficiary ON affiliate_commissions(beneficiary_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_withdrawals_user ON withdrawal_requests(user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_withdrawals_status ON withdrawal_requests(status)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_withdrawals_one_open ON withdrawal_requests(user_id) \
     WHERE status IN ('pending', 'approved')",
    "CREATE INDEX IF NOT EXISTS idx_forward_tests_symbol ON forward_test_sequences(symbol, opened_at)",
    "CREATE INDEX IF NOT EXISTS idx_forward_tests_updated ON forward_test_sequences(updated_at)",
];

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    for (table, ddl) in MIGRATIONS {
        sqlx::query(ddl).execute(pool).await.map_err(|e| {
            DatabaseError::MigrationError(format!("Failed to create {} table: {}", table, e))
        })?;
    }

    for ddl in INDEXES {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;
    }

    info!("✓ Database migrations completed successfully");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/tradeport.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Enable query logging
    pub log_queries: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/tradeport.db".to_string(),
            max_connections: 5,
            log_queries: cfg!(debug_assertions),
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("DATABASE_URL").unwrap_or(defaults.url);

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &u32| (1..=64).contains(n))
            .unwrap_or(defaults.max_connections);

        let log_queries = std::env::var("DATABASE_LOG_QUERIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.log_queries);

        Self {
            url,
            max_connections,
            log_queries,
        }
    }
}
