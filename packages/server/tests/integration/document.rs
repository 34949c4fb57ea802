use ::common::Notification;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use server::entity::{blob, student_document};

use crate::common::{TestApp, routes};

const ADEVERINTA: &str = "adeverinta_finalizare_stagiu";
const CONTRACT: &str = "contract_studii";
const DECLARATIE: &str = "declaratie_proprie_raspundere";

async fn slot_count(app: &TestApp, student_id: i32) -> u64 {
    student_document::Entity::find()
        .filter(student_document::Column::StudentId.eq(student_id))
        .count(&app.db)
        .await
        .unwrap()
}

async fn blob_count(app: &TestApp) -> u64 {
    blob::Entity::find().count(&app.db).await.unwrap()
}

mod templates {
    use super::*;

    #[tokio::test]
    async fn admin_uploads_template_and_lists_fields() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;

        let stored = app.upload_template(ADEVERINTA, &admin).await;
        assert_eq!(stored.status, 200, "{}", stored.text);
        assert_eq!(stored.body["document_type"], ADEVERINTA);

        let fields = app
            .get_with_token(&routes::template_fields(ADEVERINTA), &admin)
            .await;
        assert_eq!(fields.status, 200, "{}", fields.text);
        assert_eq!(fields.body["fields"], json!(["nume", "prenume"]));
    }

    #[tokio::test]
    async fn replacing_a_template_keeps_one_row() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;

        let first = app.upload_template(ADEVERINTA, &admin).await;
        let second = app.upload_template(ADEVERINTA, &admin).await;

        assert_eq!(second.status, 200, "{}", second.text);
        assert_eq!(first.body["id"], second.body["id"]);
        assert_eq!(first.body["blob_id"], second.body["blob_id"]);

        let list = app.get_with_token(routes::TEMPLATES, &admin).await;
        assert_eq!(list.body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn non_pdf_template_is_rejected() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;

        let res = app
            .put_multipart(
                &routes::template(ADEVERINTA),
                crate::common::file_form("template.txt", b"plain text".to_vec()),
                &admin,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn tutor_cannot_upload_templates() {
        let app = TestApp::spawn().await;
        let tutor = app.create_tutor().await;

        let res = app.upload_template(ADEVERINTA, &tutor).await;

        assert_eq!(res.status, 403);
    }

    #[tokio::test]
    async fn deleted_template_is_gone() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        app.upload_template(ADEVERINTA, &admin).await;

        let deleted = app
            .delete_with_token(&routes::template(ADEVERINTA), &admin)
            .await;
        assert_eq!(deleted.status, 204);

        let fields = app
            .get_with_token(&routes::template_fields(ADEVERINTA), &admin)
            .await;
        assert_eq!(fields.status, 404);
    }
}

mod generate {
    use super::*;

    #[tokio::test]
    async fn missing_template_is_a_failed_dependency() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;

        let res = app
            .post_with_token(
                &routes::generate(ana.student_id, ADEVERINTA),
                &json!({"fields": {"nume": "Pop"}, "mode": "finalize"}),
                &admin,
            )
            .await;

        assert_eq!(res.status, 424);
        assert_eq!(res.body["code"], "DEPENDENCY_FAILED");
        assert_eq!(slot_count(&app, ana.student_id).await, 0);
    }

    #[tokio::test]
    async fn preview_returns_pdf_without_storing() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        app.upload_template(ADEVERINTA, &admin).await;

        let res = app
            .post_with_token(
                &routes::generate(ana.student_id, ADEVERINTA),
                &json!({"fields": {"nume": "Pop", "prenume": "Ana"}, "mode": "preview"}),
                &admin,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.header("content-type"), Some("application/pdf"));
        assert_eq!(res.header("cache-control"), Some("no-store"));
        assert!(res.bytes.starts_with(b"%PDF"));
        assert_eq!(slot_count(&app, ana.student_id).await, 0);
    }

    #[tokio::test]
    async fn finalize_stores_slot_and_reports_fields() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        app.upload_template(ADEVERINTA, &admin).await;
        app.drain_notifications().await;

        let res = app
            .post_with_token(
                &routes::generate(ana.student_id, ADEVERINTA),
                &json!({
                    "fields": {"nume": "Pop", "prenume": "Ana", "serie": "A"},
                    "mode": "finalize",
                }),
                &admin,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["report"]["filled"], json!(["nume", "prenume"]));
        assert_eq!(res.body["report"]["skipped"], json!(["serie"]));
        assert_eq!(res.body["document"]["status"], "issued");
        assert_eq!(res.body["document"]["is_visible_to_student"], true);
        assert_eq!(
            res.body["document"]["filename"],
            format!("{ADEVERINTA}_student_{}.pdf", ana.student_id)
        );

        let events = app.drain_notifications().await;
        assert!(events.iter().any(|e| matches!(
            e,
            Notification::DocumentAssigned { student_id, .. } if *student_id == ana.student_id
        )));
    }

    #[tokio::test]
    async fn repeated_issuing_keeps_a_single_current_slot() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        app.upload_template(ADEVERINTA, &admin).await;
        let blobs_before = blob_count(&app).await;
        let body = json!({"fields": {"nume": "Pop"}, "mode": "finalize"});

        let first = app
            .post_with_token(&routes::generate(ana.student_id, ADEVERINTA), &body, &admin)
            .await;
        let second = app
            .post_with_token(&routes::generate(ana.student_id, ADEVERINTA), &body, &admin)
            .await;
        let signed = b"%PDF-1.4 signed and stamped".to_vec();
        let upload = app
            .upload_file(
                &routes::student_document(ana.student_id, ADEVERINTA),
                "scan.pdf",
                signed.clone(),
                &admin,
            )
            .await;

        assert_eq!(second.status, 200, "{}", second.text);
        assert_eq!(upload.status, 201, "{}", upload.text);
        assert_eq!(first.body["document"]["id"], upload.body["id"]);
        assert_eq!(slot_count(&app, ana.student_id).await, 1);
        assert_eq!(blob_count(&app).await, blobs_before + 1);

        let blob_id = upload.body["blob_id"].as_str().unwrap();
        let content = app.get_with_token(&routes::blob(blob_id), &admin).await;
        assert_eq!(content.status, 200);
        assert_eq!(content.bytes, signed);
    }

    #[tokio::test]
    async fn unknown_student_is_not_found() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        app.upload_template(ADEVERINTA, &admin).await;

        let res = app
            .post_with_token(
                &routes::generate(999, ADEVERINTA),
                &json!({"fields": {}, "mode": "preview"}),
                &admin,
            )
            .await;

        assert_eq!(res.status, 404);
    }
}

mod staff_documents {
    use super::*;

    #[tokio::test]
    async fn hidden_documents_stay_out_of_the_student_list() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        let uploaded = app
            .upload_file(
                &routes::student_document(ana.student_id, CONTRACT),
                "contract.pdf",
                b"%PDF-1.4 contract".to_vec(),
                &admin,
            )
            .await;
        let document_id = uploaded.id();

        let hidden = app
            .patch_with_token(
                &routes::student_document(ana.student_id, &document_id.to_string()),
                &json!({"visible_to_student": false, "status": "validated"}),
                &admin,
            )
            .await;
        assert_eq!(hidden.status, 200, "{}", hidden.text);
        assert_eq!(hidden.body["status"], "validated");

        let mine = app.get_with_token(routes::MY_DOCUMENTS, &ana.token).await;
        assert_eq!(mine.status, 200);
        assert_eq!(mine.body.as_array().unwrap().len(), 0);

        let staff_view = app
            .get_with_token(&routes::student_documents(ana.student_id), &admin)
            .await;
        assert_eq!(staff_view.body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn admin_deletes_document_and_blob() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        let uploaded = app
            .upload_file(
                &routes::student_document(ana.student_id, CONTRACT),
                "contract.pdf",
                b"%PDF-1.4 contract".to_vec(),
                &admin,
            )
            .await;
        let blob_id = uploaded.body["blob_id"].as_str().unwrap().to_string();

        let deleted = app
            .delete_with_token(
                &routes::student_document(ana.student_id, &uploaded.id().to_string()),
                &admin,
            )
            .await;

        assert_eq!(deleted.status, 204, "{}", deleted.text);
        assert_eq!(slot_count(&app, ana.student_id).await, 0);
        let blob = app.get_with_token(&routes::blob(&blob_id), &admin).await;
        assert_eq!(blob.status, 404);
    }
}

mod self_service {
    use super::*;

    #[tokio::test]
    async fn student_uploads_and_replaces_a_declaration() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        let blobs_before = blob_count(&app).await;

        let first = app
            .upload_file(
                &routes::my_document(DECLARATIE),
                "declaratie.pdf",
                b"%PDF-1.4 v1".to_vec(),
                &ana.token,
            )
            .await;
        let second = app
            .upload_file(
                &routes::my_document(DECLARATIE),
                "declaratie-v2.pdf",
                b"%PDF-1.4 v2".to_vec(),
                &ana.token,
            )
            .await;

        assert_eq!(first.status, 201, "{}", first.text);
        assert_eq!(second.status, 201, "{}", second.text);
        assert_eq!(second.body["status"], "submitted");
        assert_eq!(second.body["uploaded_by_role"], "student");
        assert_eq!(second.body["filename"], "declaratie-v2.pdf");
        assert_eq!(slot_count(&app, ana.student_id).await, 1);
        assert_eq!(blob_count(&app).await, blobs_before + 1);
        let replaced = first.body["blob_id"].as_str().unwrap();
        let gone = app.get_with_token(&routes::blob(replaced), &admin).await;
        assert_eq!(gone.status, 404);

        let mine = app.get_with_token(routes::MY_DOCUMENTS, &ana.token).await;
        assert_eq!(mine.body[0]["id"], second.body["id"]);
    }

    #[tokio::test]
    async fn staff_upload_takes_over_a_student_declaration() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        let blobs_before = blob_count(&app).await;

        let own = app
            .upload_file(
                &routes::my_document(DECLARATIE),
                "declaratie.pdf",
                b"%PDF-1.4 student copy".to_vec(),
                &ana.token,
            )
            .await;
        let issued = app
            .upload_file(
                &routes::student_document(ana.student_id, DECLARATIE),
                "scan.pdf",
                b"%PDF-1.4 staff copy".to_vec(),
                &admin,
            )
            .await;

        assert_eq!(own.status, 201, "{}", own.text);
        assert_eq!(issued.status, 201, "{}", issued.text);
        assert_eq!(issued.body["id"], own.body["id"]);
        assert_eq!(issued.body["uploaded_by_role"], "admin");
        assert_ne!(issued.body["blob_id"], own.body["blob_id"]);
        assert_eq!(slot_count(&app, ana.student_id).await, 1);
        assert_eq!(blob_count(&app).await, blobs_before + 1);

        let old_blob = own.body["blob_id"].as_str().unwrap();
        let gone = app.get_with_token(&routes::blob(old_blob), &admin).await;
        assert_eq!(gone.status, 404);

        let new_blob = issued.body["blob_id"].as_str().unwrap();
        let current = app
            .get_with_token(&routes::blob(new_blob), &ana.token)
            .await;
        assert_eq!(current.status, 200, "{}", current.text);
        assert_eq!(current.bytes, b"%PDF-1.4 staff copy");
        assert_eq!(
            current
                .header("content-disposition")
                .map(|d| d.contains(&format!("{DECLARATIE}_student_{}.pdf", ana.student_id))),
            Some(true)
        );
    }

    #[tokio::test]
    async fn staff_only_types_are_refused() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;

        let res = app
            .upload_file(
                &routes::my_document(CONTRACT),
                "contract.pdf",
                b"%PDF-1.4 forged".to_vec(),
                &ana.token,
            )
            .await;

        assert_eq!(res.status, 403);
        assert_eq!(res.body["code"], "PERMISSION_DENIED");
        assert_eq!(slot_count(&app, ana.student_id).await, 0);
    }

    #[tokio::test]
    async fn student_withdraws_own_upload_but_not_issued_documents() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        let own = app
            .upload_file(
                &routes::my_document(DECLARATIE),
                "declaratie.pdf",
                b"%PDF-1.4 mine".to_vec(),
                &ana.token,
            )
            .await;
        let issued = app
            .upload_file(
                &routes::student_document(ana.student_id, CONTRACT),
                "contract.pdf",
                b"%PDF-1.4 contract".to_vec(),
                &admin,
            )
            .await;

        let refused = app
            .delete_with_token(&routes::my_document(&issued.id().to_string()), &ana.token)
            .await;
        assert_eq!(refused.status, 403);

        let withdrawn = app
            .delete_with_token(&routes::my_document(&own.id().to_string()), &ana.token)
            .await;
        assert_eq!(withdrawn.status, 204, "{}", withdrawn.text);
        assert_eq!(slot_count(&app, ana.student_id).await, 1);
    }

    #[tokio::test]
    async fn student_cannot_touch_another_students_document() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        let ion = app.enroll_student("ion@praxis.test", &admin).await;
        let theirs = app
            .upload_file(
                &routes::my_document(DECLARATIE),
                "declaratie.pdf",
                b"%PDF-1.4 ion".to_vec(),
                &ion.token,
            )
            .await;

        let res = app
            .delete_with_token(&routes::my_document(&theirs.id().to_string()), &ana.token)
            .await;

        assert_eq!(res.status, 404);
    }
}
