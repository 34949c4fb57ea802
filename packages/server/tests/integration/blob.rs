use serde_json::json;

use crate::common::{TestApp, routes};

async fn material_blob_id(app: &TestApp, material_id: i32, token: &str) -> String {
    let list = app.get_with_token(routes::MATERIALS, token).await;
    list.body
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["id"] == material_id)
        .and_then(|m| m["blob_id"].as_str())
        .expect("material should be listed")
        .to_string()
}

#[tokio::test]
async fn staff_reads_any_blob() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;
    let tutor = app.create_tutor().await;
    let id = app.upload_material("Curs 1", &admin).await;
    let blob_id = material_blob_id(&app, id, &admin).await;

    let res = app.get_with_token(&routes::blob(&blob_id), &tutor).await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.bytes, b"%PDF-1.4 course notes");
    assert_eq!(res.header("content-type"), Some("application/pdf"));
    assert!(
        res.header("content-disposition")
            .unwrap()
            .contains("notes.pdf")
    );
}

#[tokio::test]
async fn unreadable_material_blob_looks_missing_to_students() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;
    let ana = app.enroll_student("ana@praxis.test", &admin).await;
    let id = app.upload_material("Curs 1", &admin).await;
    let blob_id = material_blob_id(&app, id, &admin).await;

    let hidden = app
        .get_with_token(&routes::blob(&blob_id), &ana.token)
        .await;
    assert_eq!(hidden.status, 404);
    assert_eq!(hidden.body["code"], "NOT_FOUND");

    app.put_with_token(
        &routes::material_visibility(id),
        &json!({"visibility": "restricted", "student_ids": [ana.student_id]}),
        &admin,
    )
    .await;

    let granted = app
        .get_with_token(&routes::blob(&blob_id), &ana.token)
        .await;
    assert_eq!(granted.status, 200, "{}", granted.text);
}

#[tokio::test]
async fn etag_round_trip_answers_not_modified() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;
    let id = app.upload_material("Curs 1", &admin).await;
    let blob_id = material_blob_id(&app, id, &admin).await;

    let first = app.get_with_token(&routes::blob(&blob_id), &admin).await;
    let etag = first.header("etag").expect("etag header").to_string();

    let cached = app
        .get_with_headers(
            &routes::blob(&blob_id),
            &admin,
            &[("if-none-match", etag.as_str())],
        )
        .await;
    assert_eq!(cached.status, 304);
    assert!(cached.bytes.is_empty());

    let stale = app
        .get_with_headers(
            &routes::blob(&blob_id),
            &admin,
            &[("if-none-match", "\"old\"")],
        )
        .await;
    assert_eq!(stale.status, 200);
}

#[tokio::test]
async fn rewritten_document_gets_a_new_etag() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;
    let ana = app.enroll_student("ana@praxis.test", &admin).await;
    let path = routes::student_document(ana.student_id, "contract_studii");

    let first = app
        .upload_file(&path, "contract.pdf", b"%PDF-1.4 v1".to_vec(), &admin)
        .await;
    let blob_id = first.body["blob_id"].as_str().unwrap().to_string();
    let before = app.get_with_token(&routes::blob(&blob_id), &admin).await;

    let second = app
        .upload_file(&path, "contract.pdf", b"%PDF-1.4 v2".to_vec(), &admin)
        .await;
    assert_eq!(second.body["blob_id"], blob_id.as_str());

    let after = app
        .get_with_headers(
            &routes::blob(&blob_id),
            &admin,
            &[("if-none-match", before.header("etag").unwrap())],
        )
        .await;
    assert_eq!(after.status, 200);
    assert_eq!(after.bytes, b"%PDF-1.4 v2");
}

#[tokio::test]
async fn students_only_read_their_own_visible_documents() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;
    let ana = app.enroll_student("ana@praxis.test", &admin).await;
    let ion = app.enroll_student("ion@praxis.test", &admin).await;
    let issued = app
        .upload_file(
            &routes::student_document(ana.student_id, "contract_studii"),
            "contract.pdf",
            b"%PDF-1.4 contract".to_vec(),
            &admin,
        )
        .await;
    let blob_id = issued.body["blob_id"].as_str().unwrap().to_string();

    let owner = app
        .get_with_token(&routes::blob(&blob_id), &ana.token)
        .await;
    assert_eq!(owner.status, 200, "{}", owner.text);

    let stranger = app
        .get_with_token(&routes::blob(&blob_id), &ion.token)
        .await;
    assert_eq!(stranger.status, 404);

    app.patch_with_token(
        &routes::student_document(ana.student_id, &issued.id().to_string()),
        &json!({"visible_to_student": false}),
        &admin,
    )
    .await;
    let hidden = app
        .get_with_token(&routes::blob(&blob_id), &ana.token)
        .await;
    assert_eq!(hidden.status, 404);
}

#[tokio::test]
async fn malformed_blob_id_is_rejected() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;

    let res = app
        .get_with_token(&routes::blob("not-a-uuid"), &admin)
        .await;

    assert_eq!(res.status, 400);
}

/// Application through enrollment, grouping, material access and an issued certificate.
#[tokio::test]
async fn enrollment_to_certificate_walkthrough() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;

    let ana = app.enroll_student("ana@praxis.test", &admin).await;
    let series_id = app.create_series("Seria 2025 A", &admin).await;
    app.assign_to_series(series_id, &[ana.student_id], &admin)
        .await;

    let material = app.upload_material("Curs introductiv", &admin).await;
    app.put_with_token(
        &routes::material_visibility(material),
        &json!({"visibility": "restricted", "series_ids": [series_id]}),
        &admin,
    )
    .await;
    let materials = app.get_with_token(routes::MATERIALS, &ana.token).await;
    assert_eq!(materials.body.as_array().unwrap().len(), 1);
    let material_blob = materials.body[0]["blob_id"].as_str().unwrap().to_string();
    assert_eq!(
        app.get_with_token(&routes::blob(&material_blob), &ana.token)
            .await
            .status,
        200
    );

    let template = app
        .upload_template("adeverinta_finalizare_stagiu", &admin)
        .await;
    assert_eq!(template.status, 200, "{}", template.text);
    let issued = app
        .post_with_token(
            &routes::generate(ana.student_id, "adeverinta_finalizare_stagiu"),
            &json!({"fields": {"nume": "Pop", "prenume": "Ana"}, "mode": "finalize"}),
            &admin,
        )
        .await;
    assert_eq!(issued.status, 200, "{}", issued.text);

    let mine = app.get_with_token(routes::MY_DOCUMENTS, &ana.token).await;
    assert_eq!(mine.body.as_array().unwrap().len(), 1);
    let certificate_blob = mine.body[0]["blob_id"].as_str().unwrap().to_string();
    let certificate = app
        .get_with_token(&routes::blob(&certificate_blob), &ana.token)
        .await;
    assert_eq!(certificate.status, 200);
    assert!(certificate.bytes.starts_with(b"%PDF"));

    let me = app.get_with_token(routes::MY_STUDENT, &ana.token).await;
    assert_eq!(me.body["series_id"], series_id);
}
