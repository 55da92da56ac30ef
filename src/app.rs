use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AppConfig;
use crate::state::AppState;
use crate::{auth, users};

pub fn build_app(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth::router(state.clone()))
        .merge(users::router(state.clone()))
        .route("/health", get(|| async { "ok" }));

    Router::new()
        .nest(&state.config.api_prefix, api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, config: &AppConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::extract::FromRef;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::auth::claims::Claims;
    use crate::auth::jwt::JwtKeys;
    use crate::auth::password::hash_password;
    use crate::users::repo::{CredentialStore, InMemoryStore};
    use crate::users::repo_types::{NewUser, Role};

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.clone().oneshot(req).await.expect("request handled");
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("body read");
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn harness() -> (Arc<InMemoryStore>, AppState, Router) {
        let store = Arc::new(InMemoryStore::default());
        let state = AppState::fake_with(store.clone());
        let app = build_app(state.clone());
        (store, state, app)
    }

    async fn seed(state: &AppState, store: &InMemoryStore, email: &str, password: &str, role: Role) {
        store
            .create(NewUser {
                email: email.into(),
                password_hash: hash_password(&state.config.hashing, password).unwrap(),
                role,
                profile: None,
            })
            .await
            .unwrap();
    }

    async fn login_token(app: &Router, email: &str, password: &str) -> String {
        let (status, body) = send(
            app,
            post_json("/api/auth/login", json!({"email": email, "password": password})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["access_token"].as_str().expect("token present").to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let (_store, _state, app) = harness();
        let (status, body) = send(&app, get_req("/api/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::String("ok".into()));
    }

    #[tokio::test]
    async fn register_then_login_issues_member_session() {
        let (_store, _state, app) = harness();

        let (status, body) = send(
            &app,
            post_json(
                "/api/auth/register",
                json!({
                    "email": "alice@example.com",
                    "password": "secret123",
                    "first_name": "Alice",
                    "last_name": "Smith"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["role"], "member");
        assert_eq!(body["user"]["email"], "alice@example.com");
        assert!(body["access_token"].as_str().is_some());
        assert!(body["user"].get("password_hash").is_none());

        let (status, body) = send(
            &app,
            post_json(
                "/api/auth/login",
                json!({"email": "alice@example.com", "password": "secret123"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["role"], "member");
        assert_eq!(body["user"]["first_name"], "Alice");
    }

    #[tokio::test]
    async fn bad_credentials_are_indistinguishable() {
        let (_store, _state, app) = harness();
        send(
            &app,
            post_json(
                "/api/auth/register",
                json!({"email": "alice@example.com", "password": "secret123"}),
            ),
        )
        .await;

        let (wrong_status, wrong_body) = send(
            &app,
            post_json(
                "/api/auth/login",
                json!({"email": "alice@example.com", "password": "wrong"}),
            ),
        )
        .await;
        let (unknown_status, unknown_body) = send(
            &app,
            post_json(
                "/api/auth/login",
                json!({"email": "nobody@example.com", "password": "secret123"}),
            ),
        )
        .await;

        assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_body, unknown_body);
        assert_eq!(wrong_body["error"], "Invalid credentials");
    }

    #[tokio::test]
    async fn admin_route_distinguishes_forbidden_from_unauthenticated() {
        let (store, state, app) = harness();
        seed(&state, &store, "boss@example.com", "admin-pass", Role::Admin).await;
        send(
            &app,
            post_json(
                "/api/auth/register",
                json!({"email": "alice@example.com", "password": "secret123"}),
            ),
        )
        .await;

        // no token at all: authentication error
        let (status, _) = send(&app, get_req("/api/users", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // member token: authorization error, different status
        let member_token = login_token(&app, "alice@example.com", "secret123").await;
        let (status, body) = send(&app, get_req("/api/users", Some(&member_token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Insufficient privileges");

        // admin token: allowed
        let admin_token = login_token(&app, "boss@example.com", "admin-pass").await;
        let (status, body) = send(&app, get_req("/api/users", Some(&admin_token))).await;
        assert_eq!(status, StatusCode::OK);
        let emails: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|u| u["email"].as_str().unwrap())
            .collect();
        assert!(emails.contains(&"alice@example.com"));
        assert!(emails.contains(&"boss@example.com"));
    }

    #[tokio::test]
    async fn trainer_can_read_single_user_but_not_list() {
        let (store, state, app) = harness();
        seed(&state, &store, "coach@example.com", "coach-pass", Role::Trainer).await;
        let (_, registered) = send(
            &app,
            post_json(
                "/api/auth/register",
                json!({"email": "alice@example.com", "password": "secret123"}),
            ),
        )
        .await;
        let alice_id = registered["user"]["id"].as_str().unwrap().to_string();

        let trainer_token = login_token(&app, "coach@example.com", "coach-pass").await;

        let (status, body) =
            send(&app, get_req(&format!("/api/users/{alice_id}"), Some(&trainer_token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "alice@example.com");

        let (status, _) = send(&app, get_req("/api/users", Some(&trainer_token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn me_returns_caller_view() {
        let (_store, _state, app) = harness();
        send(
            &app,
            post_json(
                "/api/auth/register",
                json!({"email": "alice@example.com", "password": "secret123", "first_name": "Alice"}),
            ),
        )
        .await;
        let token = login_token(&app, "alice@example.com", "secret123").await;

        let (status, body) = send(&app, get_req("/api/me", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "alice@example.com");
        assert_eq!(body["first_name"], "Alice");
    }

    #[tokio::test]
    async fn deactivated_after_issue_is_refused_by_me() {
        let (store, _state, app) = harness();
        send(
            &app,
            post_json(
                "/api/auth/register",
                json!({"email": "alice@example.com", "password": "secret123"}),
            ),
        )
        .await;
        let token = login_token(&app, "alice@example.com", "secret123").await;
        store.set_active("alice@example.com", false);

        let (status, _) = send(&app, get_req("/api/me", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expired_token_is_rejected_with_generic_denial() {
        let (store, state, app) = harness();
        seed(&state, &store, "boss@example.com", "admin-pass", Role::Admin).await;
        let keys = JwtKeys::from_ref(&state);

        let now = time::OffsetDateTime::now_utc();
        let claims = Claims {
            sub: uuid::Uuid::new_v4(),
            email: "boss@example.com".into(),
            role: Role::Admin,
            iat: (now - time::Duration::minutes(10)).unix_timestamp() as usize,
            exp: (now - time::Duration::minutes(5)).unix_timestamp() as usize,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
        };
        let stale = jsonwebtoken::encode(&jsonwebtoken::Header::default(), &claims, &keys.encoding)
            .unwrap();

        let (status, body) = send(&app, get_req("/api/users", Some(&stale))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Authentication required");
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let (store, state, app) = harness();
        seed(&state, &store, "boss@example.com", "admin-pass", Role::Admin).await;
        let token = login_token(&app, "boss@example.com", "admin-pass").await;

        let mut tampered = token[..token.len() - 2].to_string();
        tampered.push_str("xx");
        let (status, _) = send(&app, get_req("/api/users", Some(&tampered))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, get_req("/api/users", Some("garbage"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
