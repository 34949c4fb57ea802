use std::collections::{HashMap, HashSet};

use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use common::{Role, Visibility};
use sea_orm::sea_query::LockType;
use sea_orm::*;
use tracing::{debug, info, instrument};

use crate::entity::{
    material, material_category, material_series_access, material_student_access, series, student,
};
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::{AppJson, AppQuery};
use crate::models::material::{
    AccessResponse, CategoryResponse, CreateCategoryRequest, MaterialGrants, MaterialListQuery,
    MaterialResponse, SetVisibilityRequest, validate_material_title,
};
use crate::models::shared::require_text;
use crate::services::BlobStore;
use crate::services::access::{AccessResolver, readable_materials, student_for_user};
use crate::state::AppState;
use crate::utils::upload::{UploadedFile, read_file_field, read_text_field};

#[utoipa::path(
    post,
    path = "/",
    tag = "Materials",
    operation_id = "createMaterialCategory",
    summary = "Create a material category",
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = CategoryResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 409, description = "Name already used (CONFLICT)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id))]
pub async fn create_category(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateCategoryRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_staff()?;
    let name = require_text(&payload.name, "Category name", 100)?;

    let category = material_category::ActiveModel {
        name: Set(name.clone()),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    match category.insert(&state.db).await {
        Ok(model) => {
            info!(category_id = model.id, "Material category created");
            Ok((StatusCode::CREATED, Json(CategoryResponse::from(model))))
        }
        Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => Err(
            AppError::Conflict(format!("A category named '{name}' already exists")),
        ),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Materials",
    operation_id = "listMaterialCategories",
    summary = "List material categories",
    responses(
        (status = 200, description = "Categories ordered by name", body = Vec<CategoryResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, _auth_user))]
pub async fn list_categories(
    _auth_user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryResponse>>, AppError> {
    let categories = material_category::Entity::find()
        .order_by_asc(material_category::Column::Name)
        .all(&state.db)
        .await?;
    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/",
    tag = "Materials",
    operation_id = "uploadMaterial",
    summary = "Upload a study material",
    description = "Multipart parts: `file`, `title` and an optional `category_id`. \
        New materials are private until their visibility is set.",
    request_body(content_type = "multipart/form-data", description = "Material file and metadata"),
    responses(
        (status = 201, description = "Material stored", body = MaterialResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, multipart), fields(user_id = auth_user.user_id))]
pub async fn upload_material(
    auth_user: AuthUser,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_staff()?;

    let mut file: Option<UploadedFile> = None;
    let mut title: Option<String> = None;
    let mut category_id: Option<i32> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                file = Some(read_file_field(field, state.config.upload.max_upload_size).await?);
            }
            Some("title") => title = Some(read_text_field(field).await?),
            Some("category_id") => {
                let raw = read_text_field(field).await?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    category_id = Some(raw.parse().map_err(|_| {
                        AppError::Validation(format!("Invalid category_id '{raw}'"))
                    })?);
                }
            }
            other => debug!(field = ?other, "Ignoring unknown material field"),
        }
    }

    let file = file.ok_or_else(|| AppError::Validation("Missing 'file' field".into()))?;
    let title = validate_material_title(title.as_deref().unwrap_or_default())?;

    if let Some(cid) = category_id {
        let exists = material_category::Entity::find_by_id(cid)
            .count(&state.db)
            .await?
            > 0;
        if !exists {
            return Err(AppError::Validation(format!("Unknown category {cid}")));
        }
    }

    let txn = state.db.begin().await?;
    let byte_size = file.content.len() as i64;
    let blob_id = BlobStore::new(&txn)
        .create(file.content, &file.filename, &file.mime_type)
        .await?;

    let saved = material::ActiveModel {
        blob_id: Set(blob_id),
        title: Set(title),
        category_id: Set(category_id),
        is_public: Set(false),
        uploaded_by: Set(auth_user.user_id),
        original_filename: Set(file.filename),
        mime_type: Set(file.mime_type),
        byte_size: Set(byte_size),
        uploaded_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;

    info!(material_id = saved.id, byte_size, "Material uploaded");
    Ok((
        StatusCode::CREATED,
        Json(MaterialResponse::new(
            saved,
            Visibility::Private,
            Some(MaterialGrants::default()),
        )),
    ))
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Materials",
    operation_id = "listMaterials",
    summary = "List materials",
    description = "Staff see every material with its grants. Students see only what they may read.",
    params(MaterialListQuery),
    responses(
        (status = 200, description = "Materials, newest first", body = Vec<MaterialResponse>),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 404, description = "No enrollment for this account (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, query), fields(user_id = auth_user.user_id))]
pub async fn list_materials(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppQuery(query): AppQuery<MaterialListQuery>,
) -> Result<Json<Vec<MaterialResponse>>, AppError> {
    let mut select = material::Entity::find();
    if let Some(cid) = query.category_id {
        select = select.filter(material::Column::CategoryId.eq(cid));
    }
    let select = select
        .order_by_desc(material::Column::UploadedAt)
        .order_by_desc(material::Column::Id);

    if !auth_user.is_staff() {
        let student = student_for_user(&state.db, auth_user.user_id).await?;
        let readable = select
            .filter(readable_materials(student.id))
            .all(&state.db)
            .await?;
        // A non-public material a student can read is necessarily restricted.
        return Ok(Json(
            readable
                .into_iter()
                .map(|m| {
                    let visibility = if m.is_public {
                        Visibility::Public
                    } else {
                        Visibility::Restricted
                    };
                    MaterialResponse::new(m, visibility, None)
                })
                .collect(),
        ));
    }

    let materials = select.all(&state.db).await?;
    let mut grants = load_grants(&state.db, materials.iter().map(|m| m.id).collect()).await?;

    Ok(Json(
        materials
            .into_iter()
            .map(|m| {
                let g = grants.remove(&m.id).unwrap_or_default();
                let visibility =
                    Visibility::derive(m.is_public, g.series_ids.len(), g.student_ids.len());
                MaterialResponse::new(m, visibility, Some(g))
            })
            .collect(),
    ))
}

#[utoipa::path(
    get,
    path = "/{id}/access",
    tag = "Materials",
    operation_id = "checkMaterialAccess",
    summary = "Whether you may read a material",
    params(("id" = i32, Path, description = "Material ID")),
    responses(
        (status = 200, description = "Access decision", body = AccessResponse),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Material not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn check_material_access(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<AccessResponse>, AppError> {
    auth_user.require_role(&[Role::Student])?;
    let student = student_for_user(&state.db, auth_user.user_id).await?;

    let decision = AccessResolver::new(&state.db)
        .material_access(student.id, id)
        .await?
        .ok_or_else(|| AppError::NotFound("Material not found".into()))?;

    debug!(
        material_id = id,
        student_id = student.id,
        ?decision,
        "Material access resolved"
    );
    Ok(Json(AccessResponse {
        allowed: decision.allowed(),
    }))
}

#[utoipa::path(
    put,
    path = "/{id}/visibility",
    tag = "Materials",
    operation_id = "setMaterialVisibility",
    summary = "Set who may read a material",
    description = "`public` and `private` clear every grant. `restricted` replaces the grant \
        lists; with no grants at all the material becomes `private`.",
    params(("id" = i32, Path, description = "Material ID")),
    request_body = SetVisibilityRequest,
    responses(
        (status = 200, description = "Stored visibility", body = MaterialResponse),
        (status = 400, description = "Unknown series or student IDs (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Material not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(user_id = auth_user.user_id, visibility = %payload.visibility))]
pub async fn set_visibility(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    AppJson(payload): AppJson<SetVisibilityRequest>,
) -> Result<Json<MaterialResponse>, AppError> {
    auth_user.require_admin()?;
    payload.validate()?;
    let (visibility, series_ids, student_ids) = payload.effective();

    let txn = state.db.begin().await?;

    let existing = material::Entity::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Material not found".into()))?;

    let known_series: HashSet<i32> = series::Entity::find()
        .filter(series::Column::Id.is_in(series_ids.to_vec()))
        .select_only()
        .column(series::Column::Id)
        .into_tuple::<i32>()
        .all(&txn)
        .await?
        .into_iter()
        .collect();
    reject_unknown("series", series_ids, &known_series)?;

    let known_students: HashSet<i32> = student::Entity::find()
        .filter(student::Column::Id.is_in(student_ids.to_vec()))
        .select_only()
        .column(student::Column::Id)
        .into_tuple::<i32>()
        .all(&txn)
        .await?
        .into_iter()
        .collect();
    reject_unknown("student", student_ids, &known_students)?;

    material_series_access::Entity::delete_many()
        .filter(material_series_access::Column::MaterialId.eq(id))
        .exec(&txn)
        .await?;
    material_student_access::Entity::delete_many()
        .filter(material_student_access::Column::MaterialId.eq(id))
        .exec(&txn)
        .await?;

    if !series_ids.is_empty() {
        material_series_access::Entity::insert_many(series_ids.iter().map(|&series_id| {
            material_series_access::ActiveModel {
                material_id: Set(id),
                series_id: Set(series_id),
            }
        }))
        .exec_without_returning(&txn)
        .await?;
    }
    if !student_ids.is_empty() {
        material_student_access::Entity::insert_many(student_ids.iter().map(|&student_id| {
            material_student_access::ActiveModel {
                material_id: Set(id),
                student_id: Set(student_id),
            }
        }))
        .exec_without_returning(&txn)
        .await?;
    }

    let mut active = existing.into_active_model();
    active.is_public = Set(visibility == Visibility::Public);
    let updated = active.update(&txn).await?;

    txn.commit().await?;

    info!(
        material_id = id,
        %visibility,
        series = series_ids.len(),
        students = student_ids.len(),
        "Material visibility set"
    );

    let grants = MaterialGrants {
        series_ids: series_ids.to_vec(),
        student_ids: student_ids.to_vec(),
    };
    Ok(Json(MaterialResponse::new(
        updated,
        visibility,
        Some(grants),
    )))
}

#[utoipa::path(
    delete,
    path = "/{id}",
    tag = "Materials",
    operation_id = "deleteMaterial",
    summary = "Delete a material, its grants and its file",
    params(("id" = i32, Path, description = "Material ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Material not found (NOT_FOUND)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user), fields(user_id = auth_user.user_id))]
pub async fn delete_material(
    auth_user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse, AppError> {
    auth_user.require_staff()?;

    let txn = state.db.begin().await?;
    let existing = material::Entity::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(|| AppError::NotFound("Material not found".into()))?;

    material_series_access::Entity::delete_many()
        .filter(material_series_access::Column::MaterialId.eq(id))
        .exec(&txn)
        .await?;
    material_student_access::Entity::delete_many()
        .filter(material_student_access::Column::MaterialId.eq(id))
        .exec(&txn)
        .await?;
    material::Entity::delete_by_id(id).exec(&txn).await?;
    BlobStore::new(&txn).delete(existing.blob_id).await?;

    txn.commit().await?;

    info!(material_id = id, "Material deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn reject_unknown(kind: &str, requested: &[i32], known: &HashSet<i32>) -> Result<(), AppError> {
    let missing: Vec<String> = requested
        .iter()
        .filter(|id| !known.contains(id))
        .map(ToString::to_string)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "Unknown {kind} IDs: {}",
            missing.join(", ")
        )))
    }
}

/// Grant lists for the given materials, keyed by material id.
async fn load_grants<C: ConnectionTrait>(
    db: &C,
    material_ids: Vec<i32>,
) -> Result<HashMap<i32, MaterialGrants>, AppError> {
    let mut grants: HashMap<i32, MaterialGrants> = HashMap::new();
    if material_ids.is_empty() {
        return Ok(grants);
    }

    let series_rows = material_series_access::Entity::find()
        .filter(material_series_access::Column::MaterialId.is_in(material_ids.clone()))
        .order_by_asc(material_series_access::Column::SeriesId)
        .all(db)
        .await?;
    for row in series_rows {
        grants
            .entry(row.material_id)
            .or_default()
            .series_ids
            .push(row.series_id);
    }

    let student_rows = material_student_access::Entity::find()
        .filter(material_student_access::Column::MaterialId.is_in(material_ids))
        .order_by_asc(material_student_access::Column::StudentId)
        .all(db)
        .await?;
    for row in student_rows {
        grants
            .entry(row.material_id)
            .or_default()
            .student_ids
            .push(row.student_id);
    }

    Ok(grants)
}
