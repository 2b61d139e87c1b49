#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use chrono::{Duration, Utc};
    use http_body_util::BodyExt; // for .collect()
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::build_router;
    use crate::state::AppState;
    use crate::tests::support::{setup_test_db, test_state, TestDb};
    use crate::types::Role;

    const PASSWORD: &str = "s3cret-pw";

    async fn setup_test_app() -> (Router, AppState, TestDb) {
        let db = setup_test_db().await;
        let state = test_state(&db);
        (build_router(state.clone()), state, db)
    }

    async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// Creates an account with `role` and returns `(user_id, token)`.
    async fn login_as(app: &Router, state: &AppState, username: &str, role: Role) -> (i64, String) {
        let user = state
            .accounts
            .create_user(username, &format!("{}@example.org", username), PASSWORD, role)
            .await
            .unwrap();
        let (status, body) = send(
            app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": username, "password": PASSWORD })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        (user.id, body["token"].as_str().unwrap().to_string())
    }

    async fn create_book(app: &Router, token: &str, isbn: &str, copies: i64) -> i64 {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/v1/books",
            Some(token),
            Some(json!({
                "isbn": isbn,
                "title": "The Pragmatic Programmer",
                "author": "Andrew Hunt",
                "publication_year": 1999,
                "total_copies": copies,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "create book failed: {}", body);
        body["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_register_login_me_logout() {
        let (app, _state, _db) = setup_test_app().await;

        let (status, user) = send(
            &app,
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({ "username": "reader", "email": "reader@example.org", "password": PASSWORD })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["role"], "member");
        assert!(user.get("password_hash").is_none());

        let (status, login) = send(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "reader", "password": PASSWORD })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = login["token"].as_str().unwrap().to_string();

        let (status, me) = send(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "reader");

        let (status, _) = send(&app, Method::POST, "/api/v1/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&app, Method::GET, "/api/v1/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_wrong_password_is_unauthorized() {
        let (app, state, _db) = setup_test_app().await;
        login_as(&app, &state, "reader", Role::Member).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "username": "reader", "password": "wrong-password" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["message"], "invalid credentials");
    }

    #[tokio::test]
    async fn test_borrow_return_flow() {
        let (app, state, _db) = setup_test_app().await;
        let (_, librarian) = login_as(&app, &state, "librarian", Role::Librarian).await;
        let (member_id, member) = login_as(&app, &state, "member", Role::Member).await;
        let book_id = create_book(&app, &librarian, "9780201616224", 1).await;

        let (status, body) =
            send(&app, Method::POST, "/api/v1/borrow", Some(&member), Some(json!({ "book_id": book_id }))).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["message"], "book borrowed successfully");
        assert_eq!(body["data"]["status"], "borrowed");
        assert_eq!(body["data"]["user_id"], member_id);
        assert_eq!(body["data"]["book"]["isbn"], "9780201616224");
        let record_id = body["data"]["id"].as_i64().unwrap();

        let (_, availability) =
            send(&app, Method::GET, &format!("/api/v1/books/{}/availability", book_id), None, None).await;
        assert_eq!(availability["available"], false);
        assert_eq!(availability["available_copies"], 0);

        let (status, mine) = send(&app, Method::GET, "/api/v1/borrow/my-books", Some(&member), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine["meta"]["total"], 1);

        let (status, fine) =
            send(&app, Method::GET, &format!("/api/v1/borrow/{}/fine", record_id), Some(&member), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fine["fine"], 0);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/borrow/return",
            Some(&member),
            Some(json!({ "borrow_record_id": record_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["status"], "returned");
        assert!(body.get("fine").is_none());

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/borrow/return",
            Some(&member),
            Some(json!({ "borrow_record_id": record_id })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "ALREADY_RETURNED");

        assert_eq!(state.metrics.get_snapshot().books_returned, 1);
    }

    #[tokio::test]
    async fn test_borrow_rejections_map_to_error_codes() {
        let (app, state, _db) = setup_test_app().await;
        let (_, librarian) = login_as(&app, &state, "librarian", Role::Librarian).await;
        let (_, first) = login_as(&app, &state, "first", Role::Member).await;
        let (_, second) = login_as(&app, &state, "second", Role::Member).await;
        let book_id = create_book(&app, &librarian, "9780132350884", 2).await;

        let borrow = json!({ "book_id": book_id });
        let (status, _) = send(&app, Method::POST, "/api/v1/borrow", Some(&first), Some(borrow.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, Method::POST, "/api/v1/borrow", Some(&first), Some(borrow.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "DUPLICATE_BORROW");

        let (status, _) = send(&app, Method::POST, "/api/v1/borrow", Some(&second), Some(borrow.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (_, third) = login_as(&app, &state, "third", Role::Member).await;
        let (status, body) = send(&app, Method::POST, "/api/v1/borrow", Some(&third), Some(borrow)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "UNAVAILABLE");

        let (status, body) =
            send(&app, Method::POST, "/api/v1/borrow", Some(&third), Some(json!({ "book_id": 424242 }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_borrow_input_validation() {
        let (app, state, _db) = setup_test_app().await;
        let (_, member) = login_as(&app, &state, "member", Role::Member).await;

        let (status, body) = send(&app, Method::POST, "/api/v1/borrow", Some(&member), Some(json!({ "book_id": 0 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"]["field"], "book_id");

        let (status, body) = send(&app, Method::POST, "/api/v1/borrow", Some(&member), Some(json!({ "bogus": true }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_supplied_due_date_is_taken_as_is() {
        let (app, state, _db) = setup_test_app().await;
        let (_, librarian) = login_as(&app, &state, "librarian", Role::Librarian).await;
        let (_, member) = login_as(&app, &state, "member", Role::Member).await;
        let book_id = create_book(&app, &librarian, "9780596517748", 2).await;

        let yesterday = Utc::now() - Duration::days(1);
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/borrow",
            Some(&member),
            Some(json!({ "book_id": book_id, "due_date": yesterday.to_rfc3339() })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["data"]["status"], "overdue");

        let (status, overdue) = send(&app, Method::GET, "/api/v1/borrow/overdue", Some(&librarian), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(overdue["meta"]["total"], 1);
    }

    #[tokio::test]
    async fn test_staff_may_borrow_on_behalf_members_may_not() {
        let (app, state, _db) = setup_test_app().await;
        let (_, librarian) = login_as(&app, &state, "librarian", Role::Librarian).await;
        let (member_id, member) = login_as(&app, &state, "member", Role::Member).await;
        let (other_id, _) = login_as(&app, &state, "other", Role::Member).await;
        let book_id = create_book(&app, &librarian, "9780131103627", 3).await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/borrow",
            Some(&member),
            Some(json!({ "book_id": book_id, "user_id": other_id })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "NOT_AUTHORIZED");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/borrow",
            Some(&librarian),
            Some(json!({ "book_id": book_id, "user_id": member_id })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["user_id"], member_id);

        // the borrower returns their own loan; staff cannot return it for them
        let record_id = body["data"]["id"].as_i64().unwrap();
        let ret = json!({ "borrow_record_id": record_id });
        let (status, _) = send(&app, Method::POST, "/api/v1/borrow/return", Some(&librarian), Some(ret.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, Method::POST, "/api/v1/borrow/return", Some(&member), Some(ret)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_role_gates() {
        let (app, state, _db) = setup_test_app().await;
        let (_, member) = login_as(&app, &state, "member", Role::Member).await;
        let (_, librarian) = login_as(&app, &state, "librarian", Role::Librarian).await;

        let (status, _) = send(&app, Method::POST, "/api/v1/borrow", None, Some(json!({ "book_id": 1 }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/books",
            Some(&member),
            Some(json!({ "isbn": "9780132350884", "title": "x", "author": "y", "total_copies": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "NOT_AUTHORIZED");

        let (status, _) = send(&app, Method::GET, "/api/v1/borrow/overdue", Some(&member), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = send(&app, Method::GET, "/api/v1/borrow/overdue", Some(&librarian), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["total"], 0);
        let (status, _) = send(&app, Method::GET, "/api/v1/borrow/active", Some(&librarian), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::GET, "/api/v1/users", Some(&librarian), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // public catalog browsing needs no token
        let (status, body) = send(&app, Method::GET, "/api/v1/books?page=1&limit=5", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["limit"], 5);
    }

    #[tokio::test]
    async fn test_admin_deactivates_user() {
        let (app, state, _db) = setup_test_app().await;
        let (admin_id, admin) = login_as(&app, &state, "admin", Role::Admin).await;
        let (member_id, member) = login_as(&app, &state, "member", Role::Member).await;

        let (status, users) = send(&app, Method::GET, "/api/v1/users", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(users["meta"]["total"], 2);

        let (status, body) = send(&app, Method::GET, &format!("/api/v1/users/{}", member_id), Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "member");
        let (status, _) = send(&app, Method::GET, "/api/v1/users/9999", Some(&admin), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            Method::PATCH,
            &format!("/api/v1/users/{}", member_id),
            Some(&admin),
            Some(json!({ "is_active": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_active"], false);

        let (status, _) = send(&app, Method::GET, "/api/v1/auth/me", Some(&member), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            Method::PATCH,
            &format!("/api/v1/users/{}", admin_id),
            Some(&admin),
            Some(json!({ "role": "member" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_book_management_endpoints() {
        let (app, state, _db) = setup_test_app().await;
        let (_, librarian) = login_as(&app, &state, "librarian", Role::Librarian).await;
        let book_id = create_book(&app, &librarian, "9780262033848", 2).await;

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/v1/books/{}", book_id),
            Some(&librarian),
            Some(json!({ "title": "Introduction to Algorithms", "total_copies": 4 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Introduction to Algorithms");
        assert_eq!(body["available_copies"], 4);

        let (status, body) = send(&app, Method::POST, "/api/v1/books", Some(&librarian), Some(json!({
            "isbn": "9780262033848", "title": "Dup", "author": "Dup", "total_copies": 1
        })))
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");

        let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/books/{}", book_id), Some(&librarian), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&app, Method::GET, &format!("/api/v1/books/{}", book_id), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_security_headers_on_api_responses() {
        let (app, _state, _db) = setup_test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/api/v1/books").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-store");
    }
}
