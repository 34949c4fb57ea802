//! One current document per (student, document type).
//!
//! Both write strategies take a transaction-scoped advisory lock on the pair
//! and must run on a transaction; the unique index on
//! `student_document(student_id, document_type)` backs them up.

use chrono::Utc;
use common::{DocumentStatus, DocumentType, Role};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter, Set,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::database::{LockKey, advisory_xact_lock};
use crate::entity::student_document;
use crate::error::AppError;
use crate::services::BlobStore;

/// Payload and provenance of a slot write.
#[derive(Debug)]
pub struct SlotWrite<'b> {
    pub student_id: i32,
    pub document_type: DocumentType,
    pub content: Vec<u8>,
    /// Ignored by the filename-key strategy, which derives its own.
    pub filename: &'b str,
    pub mime_type: &'b str,
    pub uploaded_by: i32,
    pub uploaded_by_role: Role,
    pub visible_to_student: bool,
    pub status: DocumentStatus,
}

pub struct SlotManager<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> SlotManager<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn find(
        &self,
        student_id: i32,
        document_type: DocumentType,
    ) -> Result<Option<student_document::Model>, AppError> {
        Ok(student_document::Entity::find()
            .filter(student_document::Column::StudentId.eq(student_id))
            .filter(student_document::Column::DocumentType.eq(document_type))
            .one(self.conn)
            .await?)
    }

    /// Staff-issued documents: the blob is keyed by the canonical filename
    /// and rewritten in place when it already backs the current slot.
    #[instrument(skip(self, write), fields(student_id = write.student_id, document_type = %write.document_type))]
    pub async fn upsert_by_filename(
        &self,
        write: SlotWrite<'_>,
    ) -> Result<student_document::Model, AppError> {
        self.check_uploader(&write)?;
        self.lock(&write).await?;

        let meta = SlotMeta::from(&write);
        let blobs = BlobStore::new(self.conn);
        let canonical = write.document_type.canonical_filename(write.student_id);
        let existing = self.find(write.student_id, write.document_type).await?;
        let named = blobs.find_by_filename(&canonical).await?;

        match existing {
            Some(slot) if named.as_ref().is_some_and(|b| b.id == slot.blob_id) => {
                debug!(slot_id = slot.id, "Rewriting canonical blob in place");
                let blob_id = slot.blob_id;
                blobs
                    .replace(blob_id, write.content, &canonical, write.mime_type)
                    .await?;
                let mut active = slot.into_active_model();
                meta.stamp(&mut active, blob_id);
                Ok(active.update(self.conn).await?)
            }
            Some(slot) => {
                debug!(
                    slot_id = slot.id,
                    "Slot held a non-canonical blob, swapping it out"
                );
                let old_blob = slot.blob_id;
                let blob_id = blobs
                    .create(write.content, &canonical, write.mime_type)
                    .await?;
                let mut active = slot.into_active_model();
                meta.stamp(&mut active, blob_id);
                let updated = active.update(self.conn).await?;
                blobs.delete(old_blob).await?;
                Ok(updated)
            }
            None => {
                let blob_id = blobs
                    .create(write.content, &canonical, write.mime_type)
                    .await?;
                self.insert(&meta, blob_id).await
            }
        }
    }

    /// Student uploads: the previous slot and its blob are deleted and a
    /// fresh pair is inserted.
    #[instrument(skip(self, write), fields(student_id = write.student_id, document_type = %write.document_type))]
    pub async fn replace_by_owner(
        &self,
        write: SlotWrite<'_>,
    ) -> Result<student_document::Model, AppError> {
        self.check_uploader(&write)?;
        self.lock(&write).await?;

        if let Some(previous) = self.find(write.student_id, write.document_type).await? {
            debug!(slot_id = previous.id, "Dropping previous slot");
            self.delete(previous).await?;
        }

        let meta = SlotMeta::from(&write);
        let blob_id = BlobStore::new(self.conn)
            .create(write.content, write.filename, write.mime_type)
            .await?;
        self.insert(&meta, blob_id).await
    }

    /// Remove a slot together with its blob.
    pub async fn delete(&self, slot: student_document::Model) -> Result<(), AppError> {
        let blob_id = slot.blob_id;
        student_document::Entity::delete_by_id(slot.id)
            .exec(self.conn)
            .await?;
        BlobStore::new(self.conn).delete(blob_id).await?;
        Ok(())
    }

    fn check_uploader(&self, write: &SlotWrite<'_>) -> Result<(), AppError> {
        if write.document_type.allows_uploader(write.uploaded_by_role) {
            Ok(())
        } else {
            Err(AppError::PermissionDenied)
        }
    }

    async fn lock(&self, write: &SlotWrite<'_>) -> Result<(), AppError> {
        advisory_xact_lock(
            self.conn,
            LockKey::DocumentSlot {
                student_id: write.student_id,
                document_type: write.document_type,
            },
        )
        .await?;
        Ok(())
    }

    async fn insert(
        &self,
        meta: &SlotMeta,
        blob_id: Uuid,
    ) -> Result<student_document::Model, AppError> {
        let mut active = student_document::ActiveModel {
            student_id: Set(meta.student_id),
            document_type: Set(meta.document_type),
            ..Default::default()
        };
        meta.stamp(&mut active, blob_id);
        Ok(active.insert(self.conn).await?)
    }
}

/// Copyable part of a [`SlotWrite`], kept after its content has been moved out.
struct SlotMeta {
    student_id: i32,
    document_type: DocumentType,
    uploaded_by: i32,
    uploaded_by_role: Role,
    visible_to_student: bool,
    status: DocumentStatus,
}

impl SlotMeta {
    fn from(write: &SlotWrite<'_>) -> Self {
        Self {
            student_id: write.student_id,
            document_type: write.document_type,
            uploaded_by: write.uploaded_by,
            uploaded_by_role: write.uploaded_by_role,
            visible_to_student: write.visible_to_student,
            status: write.status,
        }
    }

    fn stamp(&self, active: &mut student_document::ActiveModel, blob_id: Uuid) {
        active.blob_id = Set(blob_id);
        active.uploaded_by = Set(self.uploaded_by);
        active.uploaded_by_role = Set(self.uploaded_by_role);
        active.is_visible_to_student = Set(self.visible_to_student);
        active.status = Set(self.status);
        active.created_at = Set(Utc::now());
    }
}
