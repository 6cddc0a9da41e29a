//! HTTP-level tests against the in-memory store

use crate::auth::AppState;
use crate::routes::create_router;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use chrono::{Duration, Utc};
use mailwarden_common::config::ApiKeyConfig;
use mailwarden_common::Config;
use mailwarden_core::{DryRunTransport, LoggingUsageMeter};
use mailwarden_storage::{
    AccountRepository, CampaignRepository, CampaignStatus, ContactRepository, ContactStatus,
    EmailAccount, EmailCampaign, EmailContact, ListRepository, MemoryStore, NewAccount,
    NewCampaign, NewContact, NewList, Repositories, SmtpSecurity,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const API_KEY: &str = "mw_test_key";
const OTHER_KEY: &str = "mw_other_key";

struct TestApp {
    server: TestServer,
    state: AppState,
    account: EmailAccount,
    campaign: EmailCampaign,
    contacts: Vec<EmailContact>,
}

fn api_key(key: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-api-key"),
        HeaderValue::from_str(key).unwrap(),
    )
}

async fn setup_with(contacts: usize, configure: impl FnOnce(&mut Config)) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let repos = Repositories::memory(store);
    let owner_id = Uuid::new_v4();

    let account = repos
        .accounts
        .create(NewAccount {
            owner_id,
            email: "news@example.com".to_string(),
            from_name: Some("Example News".to_string()),
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_security: SmtpSecurity::StartTls,
            daily_limit: 1000,
            created_at: Some(Utc::now() - Duration::days(90)),
        })
        .await
        .unwrap();
    let list = repos
        .lists
        .create(NewList {
            owner_id,
            name: "Subscribers".to_string(),
        })
        .await
        .unwrap();

    let mut created = Vec::new();
    for i in 0..contacts {
        created.push(
            repos
                .contacts
                .create(NewContact {
                    list_id: list.id,
                    email: format!("reader{}@example.com", i),
                    first_name: Some(format!("Reader{}", i)),
                    last_name: None,
                    attributes: None,
                })
                .await
                .unwrap(),
        );
    }

    let campaign = repos
        .campaigns
        .create(NewCampaign {
            owner_id,
            account_id: account.id,
            list_id: list.id,
            name: "Launch".to_string(),
            subject: "We just launched".to_string(),
            subject_b: None,
            ab_split_percent: None,
            html_content: "<html><body><p>Hello {{first_name}}</p></body></html>".to_string(),
            text_content: None,
            scheduled_at: None,
        })
        .await
        .unwrap();

    let mut config = Config::default();
    config.pacing.enabled = false;
    config.tracking.signing_secret = "api-test-secret".to_string();
    config.api.keys = vec![
        ApiKeyConfig {
            key: API_KEY.to_string(),
            owner_id,
        },
        ApiKeyConfig {
            key: OTHER_KEY.to_string(),
            owner_id: Uuid::new_v4(),
        },
    ];
    configure(&mut config);

    let state = AppState::new(
        repos,
        config,
        Arc::new(DryRunTransport::new("mail.example.com")),
        Arc::new(LoggingUsageMeter),
    )
    .unwrap();
    let server = TestServer::new(create_router(state.clone())).unwrap();

    TestApp {
        server,
        state,
        account,
        campaign,
        contacts: created,
    }
}

async fn setup(contacts: usize) -> TestApp {
    setup_with(contacts, |_| {}).await
}

async fn wait_for_status(app: &TestApp, status: CampaignStatus) -> EmailCampaign {
    for _ in 0..200 {
        let campaign = app
            .state
            .repos
            .campaigns
            .get(app.campaign.id)
            .await
            .unwrap()
            .unwrap();
        if campaign.status == status {
            return campaign;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("campaign never reached {}", status);
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = setup(0).await;

    let response = app.server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>(), json!({ "status": "healthy" }));

    app.server.get("/health/live").await.assert_status_ok();
    app.server.get("/health/ready").await.assert_status_ok();
}

#[tokio::test]
async fn test_api_requires_key() {
    let app = setup(0).await;
    let body = json!({ "subject": "Hello", "html": "<p>Hi</p>" });

    app.server
        .post("/api/v1/spam-check")
        .json(&body)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let (name, value) = api_key("not-a-key");
    app.server
        .post("/api/v1/spam-check")
        .add_header(name, value)
        .json(&body)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_spam_check() {
    let app = setup(0).await;
    let (name, value) = api_key(API_KEY);

    let response = app
        .server
        .post("/api/v1/spam-check")
        .add_header(name, value)
        .json(&json!({
            "subject": "Our March product update",
            "html": "<html><body><h1>Our March product update</h1>\
                <p>Hi there, this month we shipped faster search, a redesigned settings page \
                and better keyboard shortcuts across the whole application. Thanks for all the \
                feedback you sent us over the last few weeks, it shaped most of these changes.</p>\
                <p>Read the full notes on <a href=\"https://example.com/blog\">our blog</a>.</p>\
                </body></html>"
        }))
        .await;

    response.assert_status_ok();
    let report = response.json::<Value>();
    assert_eq!(report["level"], "safe");
    assert!(report["details"]["word_count"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_send_action_runs_in_background() {
    let app = setup(3).await;
    let (name, value) = api_key(API_KEY);

    let response = app
        .server
        .post("/api/v1/campaigns/action")
        .add_header(name, value)
        .json(&json!({ "campaignId": app.campaign.id, "action": "send" }))
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    assert_eq!(
        response.json::<Value>(),
        json!({
            "campaignId": app.campaign.id,
            "status": "sending",
            "recipients": 3
        })
    );

    let campaign = wait_for_status(&app, CampaignStatus::Sent).await;
    assert_eq!(campaign.total_sent, 3);
}

#[tokio::test]
async fn test_send_action_empty_list() {
    let app = setup(0).await;
    let (name, value) = api_key(API_KEY);

    let response = app
        .server
        .post("/api/v1/campaigns/action")
        .add_header(name, value)
        .json(&json!({ "campaignId": app.campaign.id, "action": "send" }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.json::<Value>();
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert_eq!(body["message"], "Validation error: No active contacts in this list");
}

#[tokio::test]
async fn test_cancel_action() {
    let app = setup(2).await;
    let (name, value) = api_key(API_KEY);

    let response = app
        .server
        .post("/api/v1/campaigns/action")
        .add_header(name, value)
        .json(&json!({ "campaignId": app.campaign.id, "action": "cancel" }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "cancelled");
}

#[tokio::test]
async fn test_campaigns_are_scoped_to_owner() {
    let app = setup(2).await;
    let (name, value) = api_key(OTHER_KEY);

    app.server
        .get(&format!("/api/v1/campaigns/{}", app.campaign.id))
        .add_header(name, value)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_campaign_detail_and_account_health() {
    let app = setup(2).await;

    let (name, value) = api_key(API_KEY);
    let detail = app
        .server
        .get(&format!("/api/v1/campaigns/{}", app.campaign.id))
        .add_header(name, value)
        .await;
    detail.assert_status_ok();
    let detail = detail.json::<Value>();
    assert_eq!(detail["campaign"]["status"], "draft");
    assert_eq!(detail["variants"], json!([]));

    let (name, value) = api_key(API_KEY);
    let health = app
        .server
        .get(&format!("/api/v1/accounts/{}/health", app.account.id))
        .add_header(name, value)
        .await;
    health.assert_status_ok();
    let health = health.json::<Value>();
    assert_eq!(health["health"]["can_send"], true);
    assert_eq!(health["warmup"]["limit"], 1000);
    assert_eq!(health["quota"]["remaining"], 1000);

    let (name, value) = api_key(API_KEY);
    app.server
        .post(&format!("/api/v1/campaigns/{}/ab-winner", app.campaign.id))
        .add_header(name, value)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_webhook_bounce_suppresses_contact() {
    let app = setup(2).await;

    let response = app
        .server
        .post("/webhooks")
        .add_query_param("provider", "generic")
        .text(json!({ "email": "Reader0@Example.com", "event": "bounce" }).to_string())
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({ "ok": true, "processed": 1, "total": 1 })
    );

    let contact = app
        .state
        .repos
        .contacts
        .get(app.contacts[0].id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(contact.status, ContactStatus::Bounced);
}

#[tokio::test]
async fn test_webhook_malformed_body_is_accepted() {
    let app = setup(1).await;

    let response = app
        .server
        .post("/webhooks")
        .add_query_param("provider", "sendgrid")
        .text("this is not json")
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({ "ok": true, "processed": 0, "total": 0 })
    );
}

#[tokio::test]
async fn test_webhook_non_utf8_body_is_accepted() {
    let app = setup(1).await;

    let response = app
        .server
        .post("/webhooks")
        .add_query_param("provider", "sendgrid")
        .bytes(axum::body::Bytes::from_static(&[0xff, 0xfe, 0x7b]))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({ "ok": true, "processed": 0, "total": 0 })
    );
}

#[tokio::test]
async fn test_webhook_secret_required_when_configured() {
    let app = setup_with(1, |c| c.webhooks.secret = Some("hook-secret".to_string())).await;
    let body = json!([{ "email": "reader0@example.com", "event": "bounce" }]).to_string();

    app.server
        .post("/webhooks")
        .text(body.clone())
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    app.server
        .post("/webhooks")
        .add_header(
            HeaderName::from_static("x-webhook-secret"),
            HeaderValue::from_static("hook-secret"),
        )
        .text(body)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_webhook_probe() {
    let app = setup(0).await;
    let response = app.server.get("/webhooks").await;
    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>(),
        json!({
            "ok": true,
            "providers": ["sendgrid", "postmark", "ses", "mailgun", "generic"]
        })
    );
}

#[tokio::test]
async fn test_unsubscribe_flow() {
    let app = setup(1).await;
    let contact = &app.contacts[0];
    let sig = app
        .state
        .lifecycle
        .unsubscribe_signature(contact.id, contact.list_id);

    let first = app
        .server
        .get("/unsubscribe")
        .add_query_param("cid", contact.id)
        .add_query_param("lid", contact.list_id)
        .add_query_param("sig", &sig)
        .await;
    first.assert_status_ok();
    assert_eq!(
        first.json::<Value>(),
        json!({ "ok": true, "message": "You have been unsubscribed" })
    );

    let second = app
        .server
        .post("/unsubscribe")
        .add_query_param("cid", contact.id)
        .add_query_param("lid", contact.list_id)
        .add_query_param("sig", &sig)
        .await;
    second.assert_status_ok();
    assert_eq!(second.json::<Value>()["message"], "You are already unsubscribed");
}

#[tokio::test]
async fn test_unsubscribe_failures() {
    let app = setup(1).await;
    let contact = &app.contacts[0];

    app.server
        .get("/unsubscribe")
        .add_query_param("cid", contact.id)
        .add_query_param("lid", contact.list_id)
        .add_query_param("sig", "deadbeef")
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let missing = app
        .server
        .get("/unsubscribe")
        .add_query_param("cid", Uuid::new_v4())
        .add_query_param("lid", contact.list_id)
        .await;
    missing.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(missing.json::<Value>()["message"], "Not found: Subscription not found");

    app.server
        .get("/unsubscribe")
        .add_query_param("cid", "not-a-uuid")
        .add_query_param("lid", contact.list_id)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_open_pixel_for_unknown_send() {
    let app = setup(0).await;

    let response = app.server.get(&format!("/t/open/{}", Uuid::new_v4())).await;
    response.assert_status_ok();
    assert_eq!(response.header("content-type"), "image/gif");
    assert_eq!(&response.as_bytes()[..6], b"GIF89a");

    app.server.get("/t/open/garbage").await.assert_status_ok();
}

#[tokio::test]
async fn test_click_redirects() {
    let app = setup(0).await;

    let response = app
        .server
        .get(&format!("/t/click/{}", Uuid::new_v4()))
        .add_query_param("url", "https://example.com/pricing?ref=mail")
        .await;
    response.assert_status(StatusCode::FOUND);
    assert_eq!(
        response.header("location"),
        "https://example.com/pricing?ref=mail"
    );

    app.server
        .get(&format!("/t/click/{}", Uuid::new_v4()))
        .add_query_param("url", "javascript:alert(1)")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup(1).await;

    app.server
        .post("/webhooks")
        .add_query_param("provider", "generic")
        .text(json!({ "email": "reader0@example.com", "event": "spamreport" }).to_string())
        .await
        .assert_status_ok();

    let response = app.server.get("/metrics").await;
    response.assert_status_ok();
    let text = response.text();
    let line = text
        .lines()
        .find(|l| l.starts_with("mailwarden_webhook_events_total{"))
        .unwrap();
    assert!(line.contains("provider=\"generic\""));
    assert!(line.contains("event_type=\"complaint\""));
    assert!(line.ends_with(" 1"));
}
