use chrono::Utc;
use common::Role;
use sea_orm::sea_query::{Index, OnConflict, PostgresQueryBuilder};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Set};
use tracing::{info, warn};

use crate::config::BootstrapConfig;
use crate::entity::{blob, student, student_application, student_document, user};
use crate::services::account::normalize_email;
use crate::utils::hash;

/// Ensure required database indexes exist.
///
/// Schema sync covers single-column uniques only; composite and expression
/// indexes are created here on startup.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let statements = [
        (
            "uq_student_document_slot",
            Index::create()
                .if_not_exists()
                .unique()
                .name("uq_student_document_slot")
                .table(student_document::Entity)
                .col(student_document::Column::StudentId)
                .col(student_document::Column::DocumentType)
                .to_string(PostgresQueryBuilder),
        ),
        (
            "idx_blob_filename",
            Index::create()
                .if_not_exists()
                .name("idx_blob_filename")
                .table(blob::Entity)
                .col(blob::Column::Filename)
                .to_string(PostgresQueryBuilder),
        ),
        (
            "idx_application_status_created",
            Index::create()
                .if_not_exists()
                .name("idx_application_status_created")
                .table(student_application::Entity)
                .col(student_application::Column::Status)
                .col(student_application::Column::CreatedAt)
                .to_string(PostgresQueryBuilder),
        ),
        (
            "idx_student_series",
            Index::create()
                .if_not_exists()
                .name("idx_student_series")
                .table(student::Entity)
                .col(student::Column::SeriesId)
                .to_string(PostgresQueryBuilder),
        ),
        (
            // Expression index; not expressible through the index builder.
            "uq_series_name_lower",
            r#"CREATE UNIQUE INDEX IF NOT EXISTS "uq_series_name_lower" ON "series" (LOWER("name"))"#
                .to_string(),
        ),
    ];

    for (name, stmt) in statements {
        db.execute_unprepared(&stmt).await?;
        info!("Ensured index {} exists", name);
    }

    Ok(())
}

/// Create the configured administrator if it does not exist yet.
pub async fn seed_bootstrap_admin(
    db: &DatabaseConnection,
    config: &BootstrapConfig,
) -> Result<(), DbErr> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };

    let password_hash = match hash::hash_password(password) {
        Ok(h) => h,
        Err(e) => {
            warn!("Skipping bootstrap admin, password hash failed: {}", e);
            return Ok(());
        }
    };

    let model = user::ActiveModel {
        email: Set(normalize_email(email)),
        name: Set(config
            .admin_name
            .clone()
            .unwrap_or_else(|| "Administrator".to_string())),
        password_hash: Set(password_hash),
        role: Set(Role::Admin),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    let result = user::Entity::insert(model)
        .on_conflict(
            OnConflict::column(user::Column::Email)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await;

    match result {
        Ok(0) | Err(DbErr::RecordNotInserted) => {}
        Ok(_) => info!("Seeded bootstrap admin account"),
        Err(e) => return Err(e),
    }

    Ok(())
}
