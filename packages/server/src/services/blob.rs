use std::collections::HashMap;

use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, FromQueryResult, QueryFilter, QuerySelect,
    Set,
};
use uuid::Uuid;

use crate::entity::blob;

/// Blob row without its content.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct BlobMeta {
    pub id: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub byte_size: i64,
    pub uploaded_at: chrono::DateTime<Utc>,
}

/// Whole-buffer binary storage in the `blob` table.
///
/// Writes run on whatever connection is passed in, so a caller holding a
/// transaction gets them inside its unit of work.
pub struct BlobStore<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> BlobStore<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        content: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<Uuid, DbErr> {
        let id = Uuid::now_v7();
        let model = blob::ActiveModel {
            id: Set(id),
            filename: Set(filename.to_string()),
            mime_type: Set(mime_type.to_string()),
            byte_size: Set(content.len() as i64),
            content: Set(content),
            uploaded_at: Set(Utc::now()),
        };
        blob::Entity::insert(model)
            .exec_without_returning(self.conn)
            .await?;
        Ok(id)
    }

    /// Overwrite content and metadata in place. Returns `false` if `id` does not exist.
    pub async fn replace(
        &self,
        id: Uuid,
        content: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<bool, DbErr> {
        let result = blob::Entity::update_many()
            .set(blob::ActiveModel {
                filename: Set(filename.to_string()),
                mime_type: Set(mime_type.to_string()),
                byte_size: Set(content.len() as i64),
                content: Set(content),
                uploaded_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(blob::Column::Id.eq(id))
            .exec(self.conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn read(&self, id: Uuid) -> Result<Option<blob::Model>, DbErr> {
        blob::Entity::find_by_id(id).one(self.conn).await
    }

    pub async fn read_meta(&self, id: Uuid) -> Result<Option<BlobMeta>, DbErr> {
        Self::meta_query()
            .filter(blob::Column::Id.eq(id))
            .into_model::<BlobMeta>()
            .one(self.conn)
            .await
    }

    /// Metadata for several blobs at once, keyed by id. Missing ids are absent.
    pub async fn read_metas(&self, ids: Vec<Uuid>) -> Result<HashMap<Uuid, BlobMeta>, DbErr> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let metas = Self::meta_query()
            .filter(blob::Column::Id.is_in(ids))
            .into_model::<BlobMeta>()
            .all(self.conn)
            .await?;
        Ok(metas.into_iter().map(|m| (m.id, m)).collect())
    }

    /// Look up by exact filename; used for derived-filename slots.
    pub async fn find_by_filename(&self, filename: &str) -> Result<Option<BlobMeta>, DbErr> {
        Self::meta_query()
            .filter(blob::Column::Filename.eq(filename))
            .into_model::<BlobMeta>()
            .one(self.conn)
            .await
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), DbErr> {
        blob::Entity::delete_by_id(id).exec(self.conn).await?;
        Ok(())
    }

    fn meta_query() -> sea_orm::Select<blob::Entity> {
        blob::Entity::find()
            .select_only()
            .column(blob::Column::Id)
            .column(blob::Column::Filename)
            .column(blob::Column::MimeType)
            .column(blob::Column::ByteSize)
            .column(blob::Column::UploadedAt)
    }
}
