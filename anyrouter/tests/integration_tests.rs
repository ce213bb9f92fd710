use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyrouter::cli::{Command, PassphraseArg};
use anyrouter::commands;
use anyrouter::scheduler::{run_daily_with_clock, ScheduleTime};
use anyrouter::AppContext;
use anyrouter_api::SigninOutcome;
use anyrouter_auth::{CredentialRecord, Settings};
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use tokio::sync::Notify;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestEnv {
    _dir: tempfile::TempDir,
    ctx: AppContext,
}

fn test_env(server: &MockServer) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let env = [
        ("ANYROUTER_BASE_URL", server.uri()),
        ("ANYROUTER_DATA_DIR", dir.path().display().to_string()),
        ("ANYROUTER_CLIENT_ID", "Ov23client".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let settings = Settings::from_sources(None, Some(env)).unwrap();
    let ctx = AppContext::from_settings(settings).unwrap();
    TestEnv { _dir: dir, ctx }
}

fn record(
    access_token: &str,
    expires_in: Duration,
    refresh_token: Option<&str>,
) -> CredentialRecord {
    CredentialRecord {
        client_id: "Ov23client".to_string(),
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_at: Some(Utc::now() + expires_in),
        scope: Some("read:user".to_string()),
    }
}

async fn mount_checkin(server: &MockServer, token: &str, status: u16, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/checkin"))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn expired_token_is_refreshed_before_signin() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=ghr_keep"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "gho_new",
            "token_type": "bearer",
            "expires_in": 28800
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_checkin(
        &server,
        "gho_new",
        200,
        json!({"success": true, "message": "签到成功", "reward": 25}),
    )
    .await;

    let env = test_env(&server);
    let store = env.ctx.credential_store(None);
    store
        .save(&record("gho_old", -Duration::hours(2), Some("ghr_keep")))
        .unwrap();

    let runner = env.ctx.runner(&PassphraseArg::default());
    let entry = runner.signin().await.unwrap();

    assert_eq!(entry.outcome, SigninOutcome::Success);
    assert_eq!(entry.detail, "签到成功 (reward: 25)");

    let requests = server.received_requests().await.unwrap();
    let paths: Vec<_> = requests.iter().map(|r| r.url.path().to_string()).collect();
    assert_eq!(paths, vec!["/api/oauth/token", "/api/checkin"]);

    let saved = store.load().unwrap().unwrap();
    assert_eq!(saved.access_token, "gho_new");
    assert_eq!(saved.refresh_token.as_deref(), Some("ghr_keep"));
    assert!(!saved.is_expired());

    let history = env.ctx.history().read_recent(10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, SigninOutcome::Success);
}

#[tokio::test]
async fn clear_works_with_invalid_schedule_settings() {
    let dir = tempfile::tempdir().unwrap();
    let env = [
        ("ANYROUTER_DATA_DIR", dir.path().display().to_string()),
        ("ANYROUTER_SCHEDULE_HOUR", "24".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let settings = Settings::from_sources(None, Some(env)).unwrap();

    assert!(AppContext::from_settings(settings.clone()).is_err());

    let ctx = AppContext::without_validation(settings).unwrap();
    let store = ctx.credential_store(None);
    store
        .save(&record("gho_old", Duration::hours(1), None))
        .unwrap();

    let code = commands::execute(Command::Clear, &ctx).await.unwrap();
    assert_eq!(code, std::process::ExitCode::SUCCESS);
    assert!(!store.path().exists());
}

#[tokio::test]
async fn valid_token_skips_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/oauth/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    mount_checkin(&server, "gho_current", 200, json!({"success": true})).await;

    let env = test_env(&server);
    env.ctx
        .credential_store(None)
        .save(&record("gho_current", Duration::hours(4), Some("ghr")))
        .unwrap();

    let entry = env
        .ctx
        .runner(&PassphraseArg::default())
        .signin()
        .await
        .unwrap();
    assert_eq!(entry.outcome, SigninOutcome::Success);
    assert_eq!(entry.detail, "signed in");
}

#[tokio::test]
async fn encrypted_credentials_work_with_passphrase() {
    let server = MockServer::start().await;
    mount_checkin(&server, "gho_secret", 200, json!({"success": true, "message": "ok"})).await;

    let env = test_env(&server);
    let passphrase = PassphraseArg {
        passphrase: Some("open sesame".to_string()),
    };
    env.ctx
        .credential_store(passphrase.secret())
        .save(&record("gho_secret", Duration::hours(4), None))
        .unwrap();

    let entry = env.ctx.runner(&passphrase).signin().await.unwrap();
    assert_eq!(entry.outcome, SigninOutcome::Success);

    let wrong = PassphraseArg {
        passphrase: Some("guess".to_string()),
    };
    let err = env.ctx.runner(&wrong).signin().await.unwrap_err();
    assert!(format!("{:#}", err).contains("check the passphrase"));
}

#[tokio::test]
async fn signin_without_credentials_fails_and_records_nothing() {
    let server = MockServer::start().await;
    let env = test_env(&server);

    let err = env
        .ctx
        .runner(&PassphraseArg::default())
        .signin()
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Not authorized"));
    assert!(env.ctx.history().read_recent(10).unwrap().is_empty());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn server_error_is_recorded_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/checkin"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .mount(&server)
        .await;

    let env = test_env(&server);
    env.ctx
        .credential_store(None)
        .save(&record("gho_current", Duration::hours(4), None))
        .unwrap();

    let entry = env
        .ctx
        .runner(&PassphraseArg::default())
        .scheduled_attempt()
        .await;

    assert_eq!(entry.outcome, SigninOutcome::Failure);
    assert!(entry.detail.contains("500"), "detail: {}", entry.detail);

    let history = env.ctx.history().read_recent(1).unwrap();
    assert_eq!(history, vec![entry]);
}

#[tokio::test]
async fn scheduled_attempt_records_refresh_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&server)
        .await;

    let env = test_env(&server);
    env.ctx
        .credential_store(None)
        .save(&record("gho_old", -Duration::hours(1), Some("ghr_revoked")))
        .unwrap();

    let entry = env
        .ctx
        .runner(&PassphraseArg::default())
        .scheduled_attempt()
        .await;

    assert_eq!(entry.outcome, SigninOutcome::Failure);
    assert!(entry.detail.contains("authorize"), "detail: {}", entry.detail);
}

#[tokio::test]
async fn scheduler_keeps_running_after_failed_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/checkin"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .expect(2)
        .mount(&server)
        .await;

    let env = test_env(&server);
    env.ctx
        .credential_store(None)
        .save(&record("gho_current", Duration::hours(4), None))
        .unwrap();
    let runner = env.ctx.runner(&PassphraseArg::default());

    // Simulated wall clock: every reading moves eight hours forward. Each day
    // reads 00:59:59.9 (plan), 08:59:59.9 (short sleep) and 16:59:59.9 (due)
    let readings = AtomicUsize::new(0);
    let clock = move || {
        let n = readings.fetch_add(1, Ordering::SeqCst) as i64;
        Utc.with_ymd_and_hms(2026, 10, 18, 0, 59, 59).unwrap()
            + Duration::milliseconds(900)
            + Duration::hours(8 * n)
    };

    let attempts = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(Notify::new());

    let runner_ref = &runner;
    let job_attempts = attempts.clone();
    let job_done = done.clone();
    let job = move || {
        let attempts = job_attempts.clone();
        let done = job_done.clone();
        async move {
            runner_ref.scheduled_attempt().await;
            if attempts.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                done.notify_one();
            }
        }
    };
    let shutdown = async move { done.notified().await };

    run_daily_with_clock(ScheduleTime::new(9, 0).unwrap(), clock, job, shutdown).await;

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    let history = env.ctx.history().read_recent(10).unwrap();
    assert_eq!(history.len(), 2);
    assert!(history
        .iter()
        .all(|e| e.outcome == SigninOutcome::Failure && e.detail.contains("500")));
}
