//! Read-access decisions for students.
//!
//! Staff bypass these checks at the handler level. Every decision is one
//! statement, so a concurrent series reassignment is seen either fully
//! before or fully after.

use sea_orm::sea_query::{Expr, Query, SelectStatement};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, ExprTrait, FromQueryResult,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Serialize;
use uuid::Uuid;

use crate::entity::{
    blob, material, material_series_access, material_student_access, student, student_document,
};
use crate::error::AppError;

/// Which rule admitted (or refused) the read. Rules are tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Public,
    StudentGrant,
    SeriesGrant,
    Denied,
}

impl AccessDecision {
    pub fn resolve(is_public: bool, student_grant: bool, series_grant: bool) -> Self {
        if is_public {
            Self::Public
        } else if student_grant {
            Self::StudentGrant
        } else if series_grant {
            Self::SeriesGrant
        } else {
            Self::Denied
        }
    }

    pub fn allowed(&self) -> bool {
        !matches!(self, Self::Denied)
    }
}

/// A student document is readable by its owner once staff made it visible.
pub fn can_read_document(student_id: i32, doc: &student_document::Model) -> bool {
    doc.student_id == student_id && doc.is_visible_to_student
}

/// `material_id`s granted to this exact student.
fn student_grants(student_id: i32) -> SelectStatement {
    Query::select()
        .column(material_student_access::Column::MaterialId)
        .from(material_student_access::Entity)
        .and_where(material_student_access::Column::StudentId.eq(student_id))
        .to_owned()
}

/// `material_id`s granted to the series the student is in right now.
fn series_grants(student_id: i32) -> SelectStatement {
    Query::select()
        .column((
            material_series_access::Entity,
            material_series_access::Column::MaterialId,
        ))
        .from(material_series_access::Entity)
        .inner_join(
            student::Entity,
            Expr::col((student::Entity, student::Column::SeriesId)).equals((
                material_series_access::Entity,
                material_series_access::Column::SeriesId,
            )),
        )
        .and_where(Expr::col((student::Entity, student::Column::Id)).eq(student_id))
        .to_owned()
}

/// Filter for materials a student may read.
pub fn readable_materials(student_id: i32) -> Condition {
    Condition::any()
        .add(material::Column::IsPublic.eq(true))
        .add(material::Column::Id.in_subquery(student_grants(student_id)))
        .add(material::Column::Id.in_subquery(series_grants(student_id)))
}

#[derive(Debug, FromQueryResult)]
struct AccessRow {
    is_public: bool,
    student_grant: bool,
    series_grant: bool,
}

pub struct AccessResolver<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> AccessResolver<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Evaluate all three rules for `(student, material)` in one query.
    /// `None` when the material does not exist.
    pub async fn material_access(
        &self,
        student_id: i32,
        material_id: i32,
    ) -> Result<Option<AccessDecision>, DbErr> {
        let row = material::Entity::find()
            .select_only()
            .column(material::Column::IsPublic)
            .expr_as(
                material::Column::Id.in_subquery(student_grants(student_id)),
                "student_grant",
            )
            .expr_as(
                material::Column::Id.in_subquery(series_grants(student_id)),
                "series_grant",
            )
            .filter(material::Column::Id.eq(material_id))
            .into_model::<AccessRow>()
            .one(self.conn)
            .await?;

        Ok(row.map(|r| AccessDecision::resolve(r.is_public, r.student_grant, r.series_grant)))
    }

    /// Whether the blob backs a readable material or a visible document owned by the student.
    pub async fn can_read_blob(&self, student_id: i32, blob_id: Uuid) -> Result<bool, DbErr> {
        let material_blobs = Query::select()
            .column(material::Column::BlobId)
            .from(material::Entity)
            .cond_where(readable_materials(student_id))
            .to_owned();
        let document_blobs = Query::select()
            .column(student_document::Column::BlobId)
            .from(student_document::Entity)
            .and_where(student_document::Column::StudentId.eq(student_id))
            .and_where(student_document::Column::IsVisibleToStudent.eq(true))
            .to_owned();

        let hits = blob::Entity::find()
            .filter(blob::Column::Id.eq(blob_id))
            .filter(
                Condition::any()
                    .add(blob::Column::Id.in_subquery(material_blobs))
                    .add(blob::Column::Id.in_subquery(document_blobs)),
            )
            .count(self.conn)
            .await?;
        Ok(hits > 0)
    }
}

/// Enrollment record behind a student session.
pub async fn student_for_user<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
) -> Result<student::Model, AppError> {
    student::Entity::find()
        .filter(student::Column::UserId.eq(user_id))
        .order_by_desc(student::Column::CreatedAt)
        .one(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("No student record for this account".into()))
}
