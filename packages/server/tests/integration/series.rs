use serde_json::json;

use crate::common::{TestApp, routes};

#[tokio::test]
async fn series_names_are_unique_ignoring_case() {
    let app = TestApp::spawn().await;
    let tutor = app.create_tutor().await;
    app.create_series("Seria A", &tutor).await;

    let res = app
        .post_with_token(routes::SERIES, &json!({"name": "  seria a "}), &tutor)
        .await;

    assert_eq!(res.status, 409);
    assert_eq!(res.body["code"], "CONFLICT");
}

#[tokio::test]
async fn blank_name_is_rejected() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;

    let res = app
        .post_with_token(routes::SERIES, &json!({"name": "   "}), &admin)
        .await;

    assert_eq!(res.status, 400);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn list_reports_member_counts() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;
    let ana = app.enroll_student("ana@praxis.test", &admin).await;
    let ion = app.enroll_student("ion@praxis.test", &admin).await;
    let full = app.create_series("Seria A", &admin).await;
    let empty = app.create_series("Seria B", &admin).await;
    app.assign_to_series(full, &[ana.student_id, ion.student_id], &admin)
        .await;

    let res = app.get_with_token(routes::SERIES, &admin).await;

    assert_eq!(res.status, 200, "{}", res.text);
    let list = res.body.as_array().unwrap();
    let count_of = |id: i32| {
        list.iter()
            .find(|s| s["id"] == id)
            .map(|s| s["member_count"].clone())
            .unwrap()
    };
    assert_eq!(count_of(full), 2);
    assert_eq!(count_of(empty), 0);
}

#[tokio::test]
async fn assignment_moves_students_between_series() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;
    let ana = app.enroll_student("ana@praxis.test", &admin).await;
    let first = app.create_series("Seria A", &admin).await;
    let second = app.create_series("Seria B", &admin).await;

    app.assign_to_series(first, &[ana.student_id], &admin).await;
    let res = app
        .put_with_token(
            &routes::series_students(second),
            &json!({"student_ids": [ana.student_id]}),
            &admin,
        )
        .await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["assigned"], 1);
    assert_eq!(
        app.find_student(ana.student_id).await.series_id,
        Some(second)
    );

    let filtered = app
        .get_with_token(&format!("{}?series_id={first}", routes::STUDENTS), &admin)
        .await;
    assert_eq!(filtered.body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn unknown_student_ids_fail_the_whole_assignment() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;
    let ana = app.enroll_student("ana@praxis.test", &admin).await;
    let series_id = app.create_series("Seria A", &admin).await;

    let res = app
        .put_with_token(
            &routes::series_students(series_id),
            &json!({"student_ids": [ana.student_id, 9999]}),
            &admin,
        )
        .await;

    assert_eq!(res.status, 400);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
    assert_eq!(app.find_student(ana.student_id).await.series_id, None);
}

#[tokio::test]
async fn tutor_cannot_assign_students() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;
    let tutor = app.create_tutor().await;
    let ana = app.enroll_student("ana@praxis.test", &admin).await;
    let series_id = app.create_series("Seria A", &tutor).await;

    let res = app
        .put_with_token(
            &routes::series_students(series_id),
            &json!({"student_ids": [ana.student_id]}),
            &tutor,
        )
        .await;

    assert_eq!(res.status, 403);
}

#[tokio::test]
async fn removing_a_student_requires_membership() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;
    let ana = app.enroll_student("ana@praxis.test", &admin).await;
    let series_id = app.create_series("Seria A", &admin).await;
    app.assign_to_series(series_id, &[ana.student_id], &admin)
        .await;

    let removed = app
        .delete_with_token(&routes::series_student(series_id, ana.student_id), &admin)
        .await;
    assert_eq!(removed.status, 204, "{}", removed.text);
    assert_eq!(app.find_student(ana.student_id).await.series_id, None);

    let again = app
        .delete_with_token(&routes::series_student(series_id, ana.student_id), &admin)
        .await;
    assert_eq!(again.status, 404);
}

#[tokio::test]
async fn deleting_a_series_detaches_members() {
    let app = TestApp::spawn().await;
    let admin = app.create_admin().await;
    let ana = app.enroll_student("ana@praxis.test", &admin).await;
    let series_id = app.create_series("Seria A", &admin).await;
    app.assign_to_series(series_id, &[ana.student_id], &admin)
        .await;

    let res = app
        .delete_with_token(&routes::series(series_id), &admin)
        .await;

    assert_eq!(res.status, 204, "{}", res.text);
    assert_eq!(app.find_student(ana.student_id).await.series_id, None);
    let list = app.get_with_token(routes::SERIES, &admin).await;
    assert_eq!(list.body.as_array().unwrap().len(), 0);
}
