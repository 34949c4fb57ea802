//! Application review: `pending -> approved` and `pending -> rejected`.
//!
//! A rejected application may be re-rejected (note refresh only) and an
//! approved one re-approved (idempotent), but neither crosses over to the
//! other state.

use chrono::Utc;
use common::{ApplicationStatus, Notification, Role, StudentStatus};
use sea_orm::sea_query::{LockType, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QuerySelect, Set, TransactionTrait,
};
use tracing::{info, instrument};

use crate::entity::{student, student_application};
use crate::error::AppError;
use crate::services::{AccountProvider, AccountRef, NewAccount, NotificationBus};

pub struct Approval {
    pub application: student_application::Model,
    pub student: student::Model,
    pub account: AccountRef,
}

pub struct Rejection {
    pub application: student_application::Model,
    /// `false` when the application was already rejected and only the note changed.
    pub transitioned: bool,
}

pub struct ReviewService<'a> {
    db: &'a DatabaseConnection,
    accounts: &'a dyn AccountProvider,
    notifications: &'a NotificationBus,
}

impl<'a> ReviewService<'a> {
    pub fn new(
        db: &'a DatabaseConnection,
        accounts: &'a dyn AccountProvider,
        notifications: &'a NotificationBus,
    ) -> Self {
        Self {
            db,
            accounts,
            notifications,
        }
    }

    #[instrument(skip(self, admin_note))]
    pub async fn approve(
        &self,
        application_id: i32,
        reviewer_id: i32,
        admin_note: Option<String>,
    ) -> Result<Approval, AppError> {
        let application = find_application(self.db, application_id).await?;
        ensure_can_approve(application.status)?;

        // Outside the transaction; idempotent by email.
        let account = self
            .accounts
            .create_or_get_account(NewAccount {
                email: &application.email,
                name: &full_name(&application),
                role: Role::Student,
            })
            .await?;

        let txn = self.db.begin().await?;

        let application = student_application::Entity::find_by_id(application_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Application not found".into()))?;
        ensure_can_approve(application.status)?;

        let now = Utc::now();
        let mut active = application.into_active_model();
        active.status = Set(ApplicationStatus::Approved);
        active.reviewed_by = Set(Some(reviewer_id));
        active.reviewed_at = Set(Some(now));
        if let Some(note) = admin_note {
            active.admin_note = Set(Some(note));
        }
        let application = active.update(&txn).await?;

        student::Entity::insert(student::ActiveModel {
            application_id: Set(application.id),
            user_id: Set(account.id),
            email: Set(application.email.clone()),
            first_name: Set(application.first_name.clone()),
            last_name: Set(application.last_name.clone()),
            phone: Set(application.phone.clone()),
            cnp: Set(application.cnp.clone()),
            status: Set(StudentStatus::Active),
            series_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        })
        .on_conflict(
            // Re-approval refreshes the snapshot; series membership stays.
            OnConflict::column(student::Column::ApplicationId)
                .update_columns([
                    student::Column::UserId,
                    student::Column::Email,
                    student::Column::FirstName,
                    student::Column::LastName,
                    student::Column::Phone,
                    student::Column::Cnp,
                    student::Column::Status,
                    student::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

        let student = student::Entity::find()
            .filter(student::Column::ApplicationId.eq(application.id))
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::Internal("student missing after upsert".into()))?;

        txn.commit().await?;

        info!(
            application_id,
            student_id = student.id,
            user_id = account.id,
            account_created = account.created,
            "Application approved"
        );

        self.notifications.emit(Notification::ApplicationApproved {
            application_id: application.id,
            application_no: application.application_no,
            email: application.email.clone(),
            name: full_name(&application),
            student_id: student.id,
        });

        Ok(Approval {
            application,
            student,
            account,
        })
    }

    #[instrument(skip(self, admin_note))]
    pub async fn reject(
        &self,
        application_id: i32,
        reviewer_id: i32,
        admin_note: Option<String>,
    ) -> Result<Rejection, AppError> {
        let txn = self.db.begin().await?;

        let application = student_application::Entity::find_by_id(application_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound("Application not found".into()))?;

        if !application.status.can_reject() {
            return Err(AppError::Conflict(
                "An approved application cannot be rejected".into(),
            ));
        }
        let transitioned = application.status != ApplicationStatus::Rejected;

        let mut active = application.into_active_model();
        active.status = Set(ApplicationStatus::Rejected);
        active.admin_note = Set(admin_note);
        active.reviewed_by = Set(Some(reviewer_id));
        active.reviewed_at = Set(Some(Utc::now()));
        let application = active.update(&txn).await?;

        txn.commit().await?;

        if transitioned {
            info!(application_id, "Application rejected");
            self.notifications.emit(Notification::ApplicationRejected {
                application_id: application.id,
                application_no: application.application_no,
                email: application.email.clone(),
                name: full_name(&application),
                admin_note: application.admin_note.clone(),
            });
        } else {
            info!(application_id, "Rejection note refreshed");
        }

        Ok(Rejection {
            application,
            transitioned,
        })
    }
}

pub async fn find_application(
    db: &DatabaseConnection,
    id: i32,
) -> Result<student_application::Model, AppError> {
    student_application::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("Application not found".into()))
}

fn ensure_can_approve(status: ApplicationStatus) -> Result<(), AppError> {
    if status.can_approve() {
        Ok(())
    } else {
        Err(AppError::Conflict(
            "A rejected application cannot be approved".into(),
        ))
    }
}

pub fn full_name(application: &student_application::Model) -> String {
    format!("{} {}", application.first_name, application.last_name)
}
