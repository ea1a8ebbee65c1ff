use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use trellis_api::app::{self, routes, services::AppServices};
use trellis_api::config::AppConfig;
use trellis_api::pipeline::{BodySchema, HandlerArgs, RouteDescription, handler};
use trellis_core::{ResultSet, Row};
use trellis_infra::adapter::InMemoryAdapter;

const SECRET: &str = "test-secret";
const POLICY_STATEMENT: &str = "SELECT area, action, role FROM access_policy";

struct TestServer {
    base_url: String,
    adapter: InMemoryAdapter,
    services: Arc<AppServices<InMemoryAdapter>>,
    handle: tokio::task::JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(routes::table()).await
    }

    async fn spawn_with(table: Vec<RouteDescription<AppServices<InMemoryAdapter>>>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let queries_path = dir.path().join("queries.json");
        std::fs::write(
            &queries_path,
            json!({
                "queries": {
                    "get-users": "SELECT * FROM users",
                    "get-user": "SELECT * FROM users WHERE id = $1",
                    "get-access-policy": POLICY_STATEMENT,
                }
            })
            .to_string(),
        )
        .unwrap();

        let adapter = InMemoryAdapter::new()
            .respond_to(POLICY_STATEMENT, policy_rows())
            .respond_to("SELECT * FROM users", users());

        let config = AppConfig {
            session_secret: SECRET.to_string(),
            queries_path: Some(queries_path),
            access_policy_query: Some("get-access-policy".to_string()),
            ..AppConfig::default()
        };
        let services = Arc::new(
            AppServices::bootstrap(adapter.clone(), &config)
                .await
                .expect("failed to bootstrap services"),
        );

        // Same router as prod, bound to an ephemeral port.
        let app = app::build_app_with(Arc::clone(&services), table);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            adapter,
            services,
            handle,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn row(fields: Value) -> Row {
    fields.as_object().cloned().unwrap()
}

fn policy_rows() -> ResultSet {
    ResultSet::from_rows(vec![
        row(json!({"area": "queries", "action": "execute", "role": "admin"})),
        row(json!({"area": "billing", "action": "read", "role": "admin"})),
    ])
}

fn users() -> ResultSet {
    ResultSet::from_rows(vec![
        row(json!({"id": 1, "username": "ada"})),
        row(json!({"id": 2, "username": "grace"})),
    ])
}

fn mint_jwt(secret: &str, sub: &str, role: &str) -> String {
    let now = Utc::now();
    let claims = json!({
        "sub": sub,
        "role": role,
        "iat": now.timestamp(),
        "exp": (now + ChronoDuration::minutes(10)).timestamp(),
    });

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/health")).await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn auth_required_for_pipeline_routes() {
    let srv = TestServer::spawn().await;

    let client = reqwest::Client::new();
    let res = client.get(srv.url("/whoami")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["statusCode"], 401);
    assert_eq!(body["description"], "Unauthorized");
}

#[tokio::test]
async fn identity_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(SECRET, "ada", "admin");

    let client = reqwest::Client::new();
    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["identity"]["sub"], "ada");
    assert_eq!(body["roles"], json!(["admin"]));
}

#[tokio::test]
async fn token_signed_with_other_secret_is_rejected() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt("other-secret", "ada", "admin");

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn named_query_runs_catalog_statement() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(SECRET, "ada", "admin");

    let res = reqwest::Client::new()
        .get(srv.url("/queries/get-users"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["rows"][1]["username"], "grace");

    let executed = srv.adapter.executed();
    let last = executed.last().unwrap();
    assert_eq!(last.statement, "SELECT * FROM users");
    assert!(last.args.is_empty());
}

#[tokio::test]
async fn named_query_binds_body_arguments() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(SECRET, "ada", "admin");

    let res = reqwest::Client::new()
        .post(srv.url("/queries/get-user"))
        .bearer_auth(token)
        .json(&json!({"args": [2]}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let last = srv.adapter.executed().pop().unwrap();
    assert_eq!(last.statement, "SELECT * FROM users WHERE id = $1");
    assert_eq!(last.args, vec![json!(2)]);
}

#[tokio::test]
async fn unknown_query_is_not_found() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(SECRET, "ada", "admin");

    let res = reqwest::Client::new()
        .get(srv.url("/queries/drop-everything"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["description"], "Not Found");
}

#[tokio::test]
async fn role_check_rejects_unlisted_role() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(SECRET, "grace", "guest");

    let res = reqwest::Client::new()
        .get(srv.url("/queries/get-users"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(
        !srv.adapter
            .statements()
            .iter()
            .any(|s| s == "SELECT * FROM users")
    );
}

#[tokio::test]
async fn logout_blacklists_the_token() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(SECRET, "ada", "admin");
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/session/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn routes_register_under_their_own_method() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(SECRET, "ada", "admin");

    let res = reqwest::Client::new()
        .get(srv.url("/session/logout"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["statusCode"], 405);
    assert_eq!(body["description"], "Method Not Allowed");
}

#[tokio::test]
async fn unmatched_path_uses_error_payload() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/nowhere")).await.unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body,
        json!({"message": "Route not found", "statusCode": 404, "description": "Not Found"})
    );
}

#[derive(Serialize, Deserialize)]
struct SetEmail {
    username: String,
}

fn set_email_table() -> Vec<RouteDescription<AppServices<InMemoryAdapter>>> {
    vec![
        RouteDescription::post(
            "/test/set-email",
            handler(|args: HandlerArgs<AppServices<InMemoryAdapter>>| async move {
                Ok(args.body)
            }),
        )
        .with_body_schema(BodySchema::of::<SetEmail>())
        .with_role_check("billing", "read"),
    ]
}

#[tokio::test]
async fn invalid_body_yields_bad_request() {
    let srv = TestServer::spawn_with(set_email_table()).await;
    let token = mint_jwt(SECRET, "ada", "admin");

    let res = reqwest::Client::new()
        .post(srv.url("/test/set-email"))
        .bearer_auth(token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["description"], "Bad Request");
    assert_eq!(body["statusCode"], 400);
}

#[tokio::test]
async fn validation_precedes_authorization() {
    let srv = TestServer::spawn_with(set_email_table()).await;

    // No token and an invalid body: validation answers first.
    let res = reqwest::Client::new()
        .post(srv.url("/test/set-email"))
        .json(&json!({"username": 42}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // Valid body, unlisted role: the role check answers.
    let res = reqwest::Client::new()
        .post(srv.url("/test/set-email"))
        .bearer_auth(mint_jwt(SECRET, "grace", "guest"))
        .json(&json!({"username": "grace"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn valid_body_reaches_handler_normalized() {
    let srv = TestServer::spawn_with(set_email_table()).await;

    let res = reqwest::Client::new()
        .post(srv.url("/test/set-email"))
        .bearer_auth(mint_jwt(SECRET, "ada", "admin"))
        .json(&json!({"username": "ada", "isAdmin": true}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"username": "ada"}));
}

#[tokio::test]
async fn oversized_body_uses_error_payload() {
    let srv = TestServer::spawn_with(set_email_table()).await;
    let padding = "x".repeat(3 * 1024 * 1024);

    let res = reqwest::Client::new()
        .post(srv.url("/test/set-email"))
        .bearer_auth(mint_jwt(SECRET, "ada", "admin"))
        .json(&json!({"username": padding}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["statusCode"], 413);
    assert!(body["message"].as_str().unwrap().contains("length limit exceeded"));
}

#[tokio::test]
async fn shutdown_disconnects_storage() {
    let srv = TestServer::spawn().await;
    assert!(srv.adapter.is_connected());

    srv.services.shutdown().await;

    assert!(!srv.adapter.is_connected());
    let res = reqwest::Client::new()
        .get(srv.url("/queries/get-users"))
        .bearer_auth(mint_jwt(SECRET, "ada", "admin"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}
