use ::common::{Notification, Role};
use serde_json::json;

use crate::common::{TestApp, routes};

mod login {
    use super::*;

    #[tokio::test]
    async fn registered_user_can_log_in_and_read_session() {
        let app = TestApp::spawn().await;
        let (user_id, token) = app
            .create_user("Maria@Praxis.test", "secret-pass-1", Role::Tutor)
            .await;

        let me = app.get_with_token(routes::ME, &token).await;

        assert_eq!(me.status, 200, "{}", me.text);
        assert_eq!(me.body["id"], user_id);
        assert_eq!(me.body["role"], "tutore");
    }

    #[tokio::test]
    async fn email_is_matched_case_insensitively() {
        let app = TestApp::spawn().await;
        app.create_user("ana@praxis.test", "secret-pass-1", Role::Admin)
            .await;

        let res = app
            .post_without_token(
                routes::LOGIN,
                &json!({"email": "  ANA@praxis.test ", "password": "secret-pass-1"}),
            )
            .await;

        assert_eq!(res.status, 200, "{}", res.text);
        assert_eq!(res.body["role"], "admin");
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let app = TestApp::spawn().await;
        app.create_user("ana@praxis.test", "secret-pass-1", Role::Admin)
            .await;

        let wrong = app
            .post_without_token(
                routes::LOGIN,
                &json!({"email": "ana@praxis.test", "password": "nope-nope-nope"}),
            )
            .await;
        let unknown = app
            .post_without_token(
                routes::LOGIN,
                &json!({"email": "ghost@praxis.test", "password": "nope-nope-nope"}),
            )
            .await;

        assert_eq!(wrong.status, 401);
        assert_eq!(wrong.body["code"], "INVALID_CREDENTIALS");
        assert_eq!(unknown.status, 401);
        assert_eq!(unknown.body, wrong.body);
    }

    #[tokio::test]
    async fn missing_or_garbage_token_is_rejected() {
        let app = TestApp::spawn().await;

        let missing = app.get_without_token(routes::ME).await;
        assert_eq!(missing.status, 401);
        assert_eq!(missing.body["code"], "TOKEN_MISSING");

        let garbage = app.get_with_token(routes::ME, "not-a-jwt").await;
        assert_eq!(garbage.status, 401);
        assert_eq!(garbage.body["code"], "TOKEN_INVALID");
    }
}

mod password_reset {
    use super::*;

    #[tokio::test]
    async fn unknown_email_still_answers_accepted() {
        let app = TestApp::spawn().await;

        let res = app
            .post_without_token(
                routes::PASSWORD_RESET,
                &json!({"email": "nobody@praxis.test"}),
            )
            .await;

        assert_eq!(res.status, 202);
        assert!(app.drain_notifications().await.is_empty());
    }

    #[tokio::test]
    async fn reset_token_sets_a_new_password_once() {
        let app = TestApp::spawn().await;
        app.create_user("ana@praxis.test", "old-password-1", Role::Tutor)
            .await;
        app.drain_notifications().await;

        let known = app
            .post_without_token(routes::PASSWORD_RESET, &json!({"email": "ana@praxis.test"}))
            .await;
        assert_eq!(known.status, 202);

        let events = app.drain_notifications().await;
        let reset_url = match events.as_slice() {
            [Notification::PasswordReset { email, reset_url }] => {
                assert_eq!(email, "ana@praxis.test");
                reset_url.clone()
            }
            other => panic!("expected one password-reset event, got {other:?}"),
        };
        let token = reset_url
            .split("token=")
            .nth(1)
            .expect("reset url should carry the token");

        let confirm = app
            .post_without_token(
                routes::PASSWORD_RESET_CONFIRM,
                &json!({"token": token, "new_password": "new-password-1"}),
            )
            .await;
        assert_eq!(confirm.status, 204, "{}", confirm.text);

        app.login("ana@praxis.test", "new-password-1").await;

        let reused = app
            .post_without_token(
                routes::PASSWORD_RESET_CONFIRM,
                &json!({"token": token, "new_password": "another-pass-1"}),
            )
            .await;
        assert_eq!(reused.status, 400);
        assert_eq!(reused.body["code"], "VALIDATION_ERROR");
    }
}
