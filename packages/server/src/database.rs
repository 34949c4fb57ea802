use std::time::Duration;

use common::DocumentType;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, Statement,
    Value,
};

use crate::config::DatabaseConfig;

pub async fn init_db(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(config.url.to_owned());

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    db.get_schema_registry("server::entity::*")
        .sync(&db)
        .await?;

    Ok(db)
}

/// Keys for transaction-scoped advisory locks.
#[derive(Debug, Clone, Copy)]
pub enum LockKey {
    /// Serializes `application_no` allocation.
    ApplicationNumber,
    /// One current slot per (student, document type).
    DocumentSlot {
        student_id: i32,
        document_type: DocumentType,
    },
    /// One template per document type.
    Template(DocumentType),
}

impl LockKey {
    /// Pack into the single `bigint` key space: scope in the top byte.
    fn as_i64(&self) -> i64 {
        let type_idx = |t: &DocumentType| {
            DocumentType::ALL
                .iter()
                .position(|x| x == t)
                .unwrap_or_default() as i64
        };
        match self {
            Self::ApplicationNumber => 1 << 56,
            Self::DocumentSlot {
                student_id,
                document_type,
            } => (2 << 56) | ((*student_id as u32 as i64) << 8) | type_idx(document_type),
            Self::Template(document_type) => (3 << 56) | type_idx(document_type),
        }
    }
}

/// Take `pg_advisory_xact_lock(key)`; released when the transaction ends.
pub async fn advisory_xact_lock<C: ConnectionTrait>(conn: &C, key: LockKey) -> Result<(), DbErr> {
    conn.execute_raw(Statement::from_sql_and_values(
        DbBackend::Postgres,
        "SELECT pg_advisory_xact_lock($1)",
        [Value::from(key.as_i64())],
    ))
    .await?;
    Ok(())
}
