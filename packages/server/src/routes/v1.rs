use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers::{
    application, auth, blob, dashboard, document, material, series, student, template,
};
use crate::state::AppState;
use crate::utils::upload::upload_body_limit;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let max_upload = config.upload.max_upload_size;

    OpenApiRouter::new()
        .nest("/auth", auth_routes())
        .nest(
            "/applications",
            application_routes().layer(upload_body_limit(max_upload)),
        )
        .nest(
            "/students",
            student_routes().layer(upload_body_limit(max_upload)),
        )
        .nest("/series", series_routes())
        .nest(
            "/templates",
            template_routes().layer(upload_body_limit(max_upload)),
        )
        .nest("/material-categories", category_routes())
        .nest(
            "/materials",
            material_routes().layer(upload_body_limit(max_upload)),
        )
        .nest(
            "/blobs",
            OpenApiRouter::new().routes(routes!(blob::download_blob)),
        )
        .nest("/dashboard", dashboard_routes())
}

fn auth_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(auth::login))
        .routes(routes!(auth::me))
        .routes(routes!(auth::request_password_reset))
        .routes(routes!(auth::confirm_password_reset))
}

fn application_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(
            application::submit_application,
            application::list_applications
        ))
        .routes(routes!(application::get_application))
        .routes(routes!(application::download_identity_document))
        .routes(routes!(application::approve_application))
        .routes(routes!(application::reject_application))
}

fn student_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(student::list_students))
        .routes(routes!(student::my_student_record))
        .routes(routes!(document::list_my_documents))
        .routes(routes!(
            document::upload_my_document,
            document::delete_my_document
        ))
        .routes(routes!(student::update_student))
        .routes(routes!(document::list_student_documents))
        .routes(routes!(
            document::upload_signed_document,
            document::update_student_document,
            document::delete_student_document
        ))
        .routes(routes!(document::generate_document))
}

fn series_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(series::create_series, series::list_series))
        .routes(routes!(series::delete_series))
        .routes(routes!(series::assign_students))
        .routes(routes!(series::remove_student))
}

fn template_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(template::list_templates))
        .routes(routes!(template::put_template, template::delete_template))
        .routes(routes!(template::list_template_fields))
}

fn category_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(
        material::create_category,
        material::list_categories
    ))
}

fn material_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(material::upload_material, material::list_materials))
        .routes(routes!(material::delete_material))
        .routes(routes!(material::check_material_access))
        .routes(routes!(material::set_visibility))
}

fn dashboard_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(dashboard::summary))
        .routes(routes!(dashboard::recent_applications))
}
