#[cfg(test)]
mod tests {
    use crate::config::{AuthConfig, BootstrapAdmin};
    use crate::error::AppError;
    use crate::metrics::Metrics;
    use crate::services::AccountsService;
    use crate::tests::support::{setup_test_db, setup_test_db_with, TestDb};
    use crate::types::{LoginRequest, RegisterRequest, Role, UpdateUserRequest};

    fn auth_config() -> AuthConfig {
        AuthConfig { session_ttl_hours: 24, registration_enabled: true, bootstrap_admin: None }
    }

    fn accounts(db: &TestDb, metrics: &Metrics) -> AccountsService {
        AccountsService::new(db.pool.clone(), auth_config(), metrics.clone())
    }

    fn register_req(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest { username: username.into(), email: email.into(), password: "s3cret-pw".into() }
    }

    fn login_req(login: &str, password: &str) -> LoginRequest {
        LoginRequest { username: login.into(), password: password.into() }
    }

    #[tokio::test]
    async fn test_register_creates_member_with_normalized_email() {
        let db = setup_test_db().await;
        let svc = accounts(&db, &Metrics::new());

        let user = svc.register(register_req("jane", "Jane@Example.ORG")).await.unwrap();
        assert_eq!(user.role, Role::Member);
        assert!(user.is_active);
        assert_eq!(user.email, "jane@example.org");
    }

    #[tokio::test]
    async fn test_register_conflicts_and_validation() {
        let db = setup_test_db().await;
        let svc = accounts(&db, &Metrics::new());
        svc.register(register_req("jane", "jane@example.org")).await.unwrap();

        let err = svc.register(register_req("jane", "other@example.org")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m.contains("username")));
        let err = svc.register(register_req("janet", "JANE@example.org")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m.contains("email")));

        let err = svc.register(register_req("j", "j@example.org")).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError { .. }));
        let err = svc
            .register(RegisterRequest { password: "123".into(), ..register_req("jim", "jim@example.org") })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_registration_can_be_disabled() {
        let db = setup_test_db().await;
        let cfg = AuthConfig { registration_enabled: false, ..auth_config() };
        let svc = AccountsService::new(db.pool.clone(), cfg, Metrics::new());
        let err = svc.register(register_req("jane", "jane@example.org")).await.unwrap_err();
        assert!(matches!(err, AppError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn test_login_authenticate_logout() {
        let db = setup_test_db().await;
        let metrics = Metrics::new();
        let svc = accounts(&db, &metrics);
        let user = svc.register(register_req("kim", "kim@example.org")).await.unwrap();

        let by_name = svc.login(login_req("kim", "s3cret-pw")).await.unwrap();
        assert_eq!(by_name.user.id, user.id);
        assert!(by_name.expires_at > chrono::Utc::now());
        let by_email = svc.login(login_req("KIM@example.org", "s3cret-pw")).await.unwrap();
        assert_ne!(by_name.token, by_email.token);

        let resolved = svc.authenticate(&by_name.token).await.unwrap().unwrap();
        assert_eq!(resolved.username, "kim");

        svc.logout(&by_name.token).await.unwrap();
        assert!(svc.authenticate(&by_name.token).await.unwrap().is_none());
        assert!(svc.authenticate(&by_email.token).await.unwrap().is_some());
        assert_eq!(metrics.get_snapshot().logins_succeeded, 2);
    }

    #[tokio::test]
    async fn test_failed_logins_are_uniform() {
        let db = setup_test_db().await;
        let metrics = Metrics::new();
        let svc = accounts(&db, &metrics);
        svc.register(register_req("lou", "lou@example.org")).await.unwrap();

        let wrong_pw = svc.login(login_req("lou", "nope-nope")).await.unwrap_err();
        let unknown = svc.login(login_req("nobody", "s3cret-pw")).await.unwrap_err();
        assert_eq!(wrong_pw.to_string(), unknown.to_string());
        assert!(matches!(wrong_pw, AppError::Unauthorized(_)));
        assert_eq!(metrics.get_snapshot().logins_failed, 2);
    }

    #[tokio::test]
    async fn test_deactivation_revokes_sessions_and_blocks_login() {
        let db = setup_test_db().await;
        let svc = accounts(&db, &Metrics::new());
        let user = svc.register(register_req("max", "max@example.org")).await.unwrap();
        let session = svc.login(login_req("max", "s3cret-pw")).await.unwrap();

        let updated = svc
            .update_user(user.id, UpdateUserRequest { role: Some(Role::Librarian), is_active: Some(false) })
            .await
            .unwrap();
        assert_eq!(updated.role, Role::Librarian);
        assert!(!updated.is_active);

        assert!(svc.authenticate(&session.token).await.unwrap().is_none());
        let err = svc.login(login_req("max", "s3cret-pw")).await.unwrap_err();
        assert!(matches!(err, AppError::NotAuthorized(_)));

        let err = svc.update_user(9999, UpdateUserRequest::default()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_expired_sessions_are_rejected_and_purged() {
        let db = setup_test_db().await;
        let svc = accounts(&db, &Metrics::new());
        let user = svc.register(register_req("ned", "ned@example.org")).await.unwrap();

        let past = chrono::Utc::now() - chrono::Duration::hours(2);
        let mut conn = db.pool.acquire().await.unwrap();
        crate::store::sessions::create(&mut conn, "stale-token", user.id, past, past + chrono::Duration::hours(1))
            .await
            .unwrap();
        drop(conn);

        assert!(svc.authenticate("stale-token").await.unwrap().is_none());
        assert_eq!(svc.purge_expired_sessions().await.unwrap(), 1);
        assert_eq!(svc.purge_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bootstrap_admin_is_created_once() {
        let db = setup_test_db().await;
        let svc = accounts(&db, &Metrics::new());
        let admin = BootstrapAdmin {
            username: "root".into(),
            email: "root@example.org".into(),
            password: "change-me-now".into(),
        };

        assert!(svc.ensure_bootstrap_admin(&admin).await.unwrap());
        assert!(!svc.ensure_bootstrap_admin(&admin).await.unwrap());

        let users = svc.list_users(None, None).await.unwrap();
        assert_eq!(users.meta.total, 1);
        assert_eq!(users.data[0].role, Role::Admin);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_registered_users_can_log_in_immediately() {
        let db = setup_test_db_with(4).await;
        let svc = accounts(&db, &Metrics::new());

        for i in 0..5 {
            let name = format!("reader{}", i);
            let user = svc.register(register_req(&name, &format!("{}@example.org", name))).await.unwrap();
            let session = svc.login(login_req(&name, "s3cret-pw")).await.unwrap();
            assert_eq!(session.user.id, user.id);

            let promoted = svc
                .update_user(user.id, UpdateUserRequest { role: Some(Role::Librarian), is_active: None })
                .await
                .unwrap();
            assert_eq!(promoted.role, Role::Librarian);
            assert_eq!(svc.get_user(user.id).await.unwrap().role, Role::Librarian);
        }
    }
}
