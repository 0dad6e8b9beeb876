// 凭据库端到端流程：口令设置、配置增删改、免密令牌

use std::sync::Arc;

use shellvault::services::vault::ReauthToken;
use shellvault::{App, EngineSettings, NullSink, TargetProfile, VaultError, VaultPaths};

fn app_in(dir: &std::path::Path) -> App {
    App::new(
        VaultPaths::in_dir(dir),
        EngineSettings::default(),
        Arc::new(NullSink),
    )
}

fn profile(name: &str, password: &str) -> TargetProfile {
    TargetProfile {
        name: name.into(),
        host: "10.0.0.5".into(),
        username: "ops".into(),
        password: password.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_first_run_then_restart() {
    let dir = tempfile::tempdir().unwrap();

    let app = app_in(dir.path());
    assert!(!app.is_key_set());
    app.set_encryption_key("correct horse").await.unwrap();
    assert!(app.is_key_set());
    assert!(app.has_valid_session().await);

    let saved = app.save_config(profile("web", "s3cret")).await.unwrap();
    assert!(!saved.id.is_empty());

    // 重启：新实例用同一口令解锁
    let app = app_in(dir.path());
    assert!(app.is_key_set());
    app.verify_key_with_session("correct horse").await.unwrap();

    let loaded = app.get_config(&saved.id).await.unwrap();
    assert_eq!(loaded.password, "s3cret");
    assert_eq!(loaded.created_at, saved.created_at);

    let masked = app.list_configs_masked().await;
    assert_eq!(masked.len(), 1);
    assert_eq!(masked[0].password, "******");
}

#[tokio::test]
async fn test_wrong_key_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(dir.path());
    app.set_encryption_key("right").await.unwrap();
    app.save_config(profile("db", "pw")).await.unwrap();

    let app = app_in(dir.path());
    let err = app.verify_encryption_key("wrong").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VaultError>(),
        Some(VaultError::Decryption(_))
    ));
    assert!(app.get_configs().await.is_err());

    let err = app.verify_key_with_session("wrong").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VaultError>(),
        Some(VaultError::KeyMismatch)
    ));

    app.verify_encryption_key("right").await.unwrap();
    assert_eq!(app.get_configs().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_save_config_updates_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(dir.path());
    app.set_encryption_key("k").await.unwrap();

    let mut saved = app.save_config(profile("web", "a")).await.unwrap();
    let created_at = saved.created_at;

    saved.password = "b".into();
    saved.created_at = chrono::Utc::now() + chrono::Duration::days(1);
    let updated = app.save_config(saved.clone()).await.unwrap();

    assert_eq!(updated.id, saved.id);
    assert_eq!(updated.created_at, created_at);
    assert!(updated.updated_at >= created_at);

    let all = app.get_configs().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].password, "b");

    app.delete_config(&saved.id).await.unwrap();
    assert!(app.get_configs().await.unwrap().is_empty());
    assert!(app.delete_config(&saved.id).await.is_err());
}

#[tokio::test]
async fn test_expired_token_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let paths = VaultPaths::in_dir(dir.path());
    let app = app_in(dir.path());
    app.set_encryption_key("k").await.unwrap();

    // 把 expiresAt 改到过去
    let mut token = ReauthToken::read(&paths.token).await.unwrap().unwrap();
    token.expires_at = chrono::Utc::now() - chrono::Duration::minutes(1);
    std::fs::write(&paths.token, token.to_json().unwrap()).unwrap();

    let err = app.verify_key_with_session("k").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VaultError>(),
        Some(VaultError::SessionExpired)
    ));
    assert!(!app.has_valid_session().await);
    assert!(!paths.token.exists());

    let err = app.verify_key_with_session("k").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VaultError>(),
        Some(VaultError::NoSession)
    ));
}

#[tokio::test]
async fn test_verify_replaces_token() {
    let dir = tempfile::tempdir().unwrap();
    let paths = VaultPaths::in_dir(dir.path());
    let app = app_in(dir.path());
    app.set_encryption_key("k").await.unwrap();
    let first = ReauthToken::read(&paths.token).await.unwrap().unwrap();

    app.verify_encryption_key("k").await.unwrap();
    let second = ReauthToken::read(&paths.token).await.unwrap().unwrap();
    assert_ne!(first.token, second.token);
    assert_eq!(first.key_hash, second.key_hash);

    app.clear_session().await.unwrap();
    assert!(!app.has_valid_session().await);
    // 记录文件仍在
    assert!(app.is_key_set());
}

#[tokio::test]
async fn test_out_of_range_ttl_is_clamped() {
    for raw in [
        r#"{"vault":{"reauth_ttl_hours":9000000000}}"#,
        r#"{"vault":{"reauth_ttl_hours":9223372036854775807}}"#,
    ] {
        let dir = tempfile::tempdir().unwrap();
        let paths = VaultPaths::in_dir(dir.path());
        let settings: EngineSettings = serde_json::from_str(raw).unwrap();
        let app = App::new(paths.clone(), settings, Arc::new(NullSink));

        app.set_encryption_key("k").await.unwrap();
        let token = ReauthToken::read(&paths.token).await.unwrap().unwrap();
        assert_eq!(
            token.expires_at - token.created_at,
            chrono::Duration::hours(shellvault::models::settings::MAX_REAUTH_TTL_HOURS)
        );
        assert!(app.has_valid_session().await);
    }
}

#[tokio::test]
async fn test_has_configs_and_restore_session() {
    let dir = tempfile::tempdir().unwrap();
    let app = app_in(dir.path());
    assert!(!app.has_configs().await);
    let err = app.restore_session().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<VaultError>(),
        Some(VaultError::NoSession)
    ));

    app.set_encryption_key("k").await.unwrap();
    assert!(!app.has_configs().await);
    app.restore_session().await.unwrap();

    app.save_config(profile("web", "pw")).await.unwrap();
    assert!(app.has_configs().await);

    app.clear_session().await.unwrap();
    assert!(app.restore_session().await.is_err());
}
