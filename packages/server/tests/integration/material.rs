use serde_json::json;

use crate::common::{TestApp, file_form, routes};

fn titles(body: &serde_json::Value) -> Vec<String> {
    body.as_array()
        .unwrap()
        .iter()
        .map(|m| m["title"].as_str().unwrap().to_string())
        .collect()
}

mod categories {
    use super::*;

    #[tokio::test]
    async fn duplicate_category_conflicts() {
        let app = TestApp::spawn().await;
        let tutor = app.create_tutor().await;

        let first = app
            .post_with_token(routes::CATEGORIES, &json!({"name": "Cursuri"}), &tutor)
            .await;
        let second = app
            .post_with_token(routes::CATEGORIES, &json!({"name": "Cursuri"}), &tutor)
            .await;

        assert_eq!(first.status, 201, "{}", first.text);
        assert_eq!(second.status, 409);
    }

    #[tokio::test]
    async fn material_can_be_filed_under_a_category() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let category = app
            .post_with_token(routes::CATEGORIES, &json!({"name": "Cursuri"}), &admin)
            .await
            .id();
        let form = file_form("curs1.pdf", b"%PDF-1.4 curs".to_vec())
            .text("title", "Curs 1")
            .text("category_id", category.to_string());
        let uploaded = app
            .post_multipart(routes::MATERIALS, form, Some(admin.as_str()))
            .await;
        assert_eq!(uploaded.status, 201, "{}", uploaded.text);
        app.upload_material("Fara categorie", &admin).await;

        let res = app
            .get_with_token(
                &format!("{}?category_id={category}", routes::MATERIALS),
                &admin,
            )
            .await;

        assert_eq!(titles(&res.body), vec!["Curs 1"]);
    }

    #[tokio::test]
    async fn unknown_category_is_rejected() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let form = file_form("curs1.pdf", b"%PDF-1.4 curs".to_vec())
            .text("title", "Curs 1")
            .text("category_id", "404");

        let res = app
            .post_multipart(routes::MATERIALS, form, Some(admin.as_str()))
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod visibility {
    use super::*;

    #[tokio::test]
    async fn new_material_starts_private() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        let id = app.upload_material("Curs 1", &admin).await;

        let staff_view = app.get_with_token(routes::MATERIALS, &admin).await;
        assert_eq!(staff_view.body[0]["visibility"], "private");

        let access = app
            .get_with_token(&routes::material_access(id), &ana.token)
            .await;
        assert_eq!(access.status, 200, "{}", access.text);
        assert_eq!(access.body["allowed"], false);
    }

    #[tokio::test]
    async fn restricted_without_grants_collapses_to_private() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let id = app.upload_material("Curs 1", &admin).await;

        let res = app
            .put_with_token(
                &routes::material_visibility(id),
                &json!({"visibility": "restricted"}),
                &admin,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["visibility"], "private");
    }

    #[tokio::test]
    async fn public_clears_existing_grants() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        let id = app.upload_material("Curs 1", &admin).await;
        app.put_with_token(
            &routes::material_visibility(id),
            &json!({"visibility": "restricted", "student_ids": [ana.student_id]}),
            &admin,
        )
        .await;

        let res = app
            .put_with_token(
                &routes::material_visibility(id),
                &json!({"visibility": "public", "student_ids": [ana.student_id]}),
                &admin,
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["visibility"], "public");
        assert_eq!(res.body["grants"]["student_ids"], json!([]));

        let listed = app.get_with_token(routes::MATERIALS, &admin).await;
        assert_eq!(listed.body[0]["visibility"], "public");
        assert_eq!(listed.body[0]["grants"]["student_ids"], json!([]));
    }

    #[tokio::test]
    async fn unknown_grant_ids_are_rejected() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let id = app.upload_material("Curs 1", &admin).await;

        let res = app
            .put_with_token(
                &routes::material_visibility(id),
                &json!({"visibility": "restricted", "series_ids": [777]}),
                &admin,
            )
            .await;

        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn tutor_cannot_change_visibility() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let tutor = app.create_tutor().await;
        let id = app.upload_material("Curs 1", &admin).await;

        let res = app
            .put_with_token(
                &routes::material_visibility(id),
                &json!({"visibility": "public"}),
                &tutor,
            )
            .await;

        assert_eq!(res.status, 403);
    }
}

mod access {
    use super::*;

    #[tokio::test]
    async fn series_grant_follows_current_membership() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        let granted = app.create_series("Seria A", &admin).await;
        let other = app.create_series("Seria B", &admin).await;
        app.assign_to_series(granted, &[ana.student_id], &admin)
            .await;
        let id = app.upload_material("Curs 1", &admin).await;
        app.put_with_token(
            &routes::material_visibility(id),
            &json!({"visibility": "restricted", "series_ids": [granted]}),
            &admin,
        )
        .await;

        let before = app
            .get_with_token(&routes::material_access(id), &ana.token)
            .await;
        assert_eq!(before.body["allowed"], true);

        app.assign_to_series(other, &[ana.student_id], &admin).await;

        let after = app
            .get_with_token(&routes::material_access(id), &ana.token)
            .await;
        assert_eq!(after.body["allowed"], false);
    }

    #[tokio::test]
    async fn student_list_shows_only_readable_materials() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        let public = app.upload_material("Public", &admin).await;
        let granted = app.upload_material("Granted", &admin).await;
        app.upload_material("Private", &admin).await;
        app.put_with_token(
            &routes::material_visibility(public),
            &json!({"visibility": "public"}),
            &admin,
        )
        .await;
        app.put_with_token(
            &routes::material_visibility(granted),
            &json!({"visibility": "restricted", "student_ids": [ana.student_id]}),
            &admin,
        )
        .await;

        let res = app.get_with_token(routes::MATERIALS, &ana.token).await;

        assert_eq!(res.status, 200, "{}", res.text);
        let mut seen = titles(&res.body);
        seen.sort();
        assert_eq!(seen, vec!["Granted", "Public"]);
        assert!(res.body[0].get("grants").is_none());
    }

    #[tokio::test]
    async fn unknown_material_is_not_found() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;

        let res = app
            .get_with_token(&routes::material_access(4242), &ana.token)
            .await;

        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn deleting_a_material_removes_its_grants() {
        let app = TestApp::spawn().await;
        let admin = app.create_admin().await;
        let ana = app.enroll_student("ana@praxis.test", &admin).await;
        let id = app.upload_material("Curs 1", &admin).await;
        app.put_with_token(
            &routes::material_visibility(id),
            &json!({"visibility": "restricted", "student_ids": [ana.student_id]}),
            &admin,
        )
        .await;

        let deleted = app.delete_with_token(&routes::material(id), &admin).await;

        assert_eq!(deleted.status, 204, "{}", deleted.text);
        let listed = app.get_with_token(routes::MATERIALS, &ana.token).await;
        assert_eq!(listed.body.as_array().unwrap().len(), 0);
    }
}
