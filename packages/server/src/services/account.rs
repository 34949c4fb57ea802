use async_trait::async_trait;
use chrono::{Duration, Utc};
use common::{Notification, Role};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use tracing::{debug, info, instrument};

use crate::entity::{password_reset, user};
use crate::error::AppError;
use crate::services::NotificationBus;
use crate::utils::hash;

/// Length of generated temporary passwords and reset tokens.
const TOKEN_LEN: usize = 48;

#[derive(Debug, Clone, Copy)]
pub struct NewAccount<'a> {
    pub email: &'a str,
    pub name: &'a str,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountRef {
    pub id: i32,
    /// `false` when the account already existed.
    pub created: bool,
}

/// Identity collaborator used by the review flow and the auth endpoints.
#[async_trait]
pub trait AccountProvider: Send + Sync {
    /// Create the account, or return the existing one for the same email.
    /// An existing account with a different role is a conflict.
    async fn create_or_get_account(&self, account: NewAccount<'_>) -> Result<AccountRef, AppError>;

    /// Issue a reset token if the email is known. Silent when it is not.
    async fn request_password_reset(&self, email: &str, redirect_url: &str)
    -> Result<(), AppError>;
}

pub struct DbAccountProvider {
    db: DatabaseConnection,
    notifications: NotificationBus,
    reset_ttl: Duration,
}

impl DbAccountProvider {
    pub fn new(
        db: DatabaseConnection,
        notifications: NotificationBus,
        reset_ttl_minutes: i64,
    ) -> Self {
        Self {
            db,
            notifications,
            reset_ttl: Duration::minutes(reset_ttl_minutes),
        }
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
impl AccountProvider for DbAccountProvider {
    #[instrument(skip(self, account), fields(email = %account.email, role = %account.role))]
    async fn create_or_get_account(&self, account: NewAccount<'_>) -> Result<AccountRef, AppError> {
        let email = normalize_email(account.email);

        // Accounts provisioned here start with an unusable random password;
        // the owner sets a real one through the reset flow.
        let password_hash = hash::hash_password(&hash::random_token(TOKEN_LEN))
            .map_err(|e| AppError::Internal(format!("Password hash error: {e}")))?;

        let created = match user::Entity::insert(user::ActiveModel {
            email: Set(email.clone()),
            name: Set(account.name.trim().to_string()),
            password_hash: Set(password_hash),
            role: Set(account.role),
            created_at: Set(Utc::now()),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::column(user::Column::Email)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&self.db)
        .await
        {
            Ok(rows) => rows > 0,
            Err(DbErr::RecordNotInserted) => false,
            Err(e) => return Err(e.into()),
        };

        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(&email))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::Internal("account missing after upsert".into()))?;

        if existing.role != account.role {
            return Err(AppError::Conflict(format!(
                "Email already belongs to a {} account",
                existing.role
            )));
        }

        if created {
            info!(user_id = existing.id, "Provisioned account");
        } else {
            debug!(user_id = existing.id, "Account already exists, reusing");
        }

        Ok(AccountRef {
            id: existing.id,
            created,
        })
    }

    #[instrument(skip(self, email, redirect_url))]
    async fn request_password_reset(
        &self,
        email: &str,
        redirect_url: &str,
    ) -> Result<(), AppError> {
        let email = normalize_email(email);

        let Some(account) = user::Entity::find()
            .filter(user::Column::Email.eq(&email))
            .one(&self.db)
            .await?
        else {
            debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = hash::random_token(TOKEN_LEN);
        let now = Utc::now();
        password_reset::ActiveModel {
            user_id: Set(account.id),
            token_digest: Set(hash::token_digest(&token)),
            expires_at: Set(now + self.reset_ttl),
            used_at: Set(None),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        let separator = if redirect_url.contains('?') { '&' } else { '?' };
        self.notifications.emit(Notification::PasswordReset {
            email: account.email,
            reset_url: format!("{redirect_url}{separator}token={token}"),
        });

        Ok(())
    }
}
