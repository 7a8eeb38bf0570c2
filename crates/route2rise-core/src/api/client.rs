//! API client for the route2rise backend.
//!
//! Every request carries the stored bearer credential when one exists.
//! Every 401 response clears that credential and raises
//! [`AuthEvent::SessionInvalidated`] before the error is handed back to the
//! caller, so the auth gate (not the request site) decides what to show next.

use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::auth::{AuthEvent, Credential, EventBus, SessionStore, Verifier};
use crate::config::Config;

use super::ApiError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
}

/// Body of the backend health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub app: Option<String>,
}

/// API client for the route2rise backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    verify_path: String,
    login_path: String,
    health_path: String,
    store: SessionStore,
    bus: EventBus,
}

impl ApiClient {
    /// Create a new API client reading its credential from `store` and
    /// reporting session changes on `bus`.
    pub fn new(config: &Config, store: SessionStore, bus: EventBus) -> Result<Self> {
        // The backend may pair the token with a session cookie; send it back.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .cookie_store(true)
            .build()?;
        let base_url = config.api_base_url();
        debug!(%base_url, "API client configured");

        Ok(Self {
            client,
            base_url,
            verify_path: config.verify_path.clone(),
            login_path: config.login_path.clone(),
            health_path: config.health_path.clone(),
            store,
            bus,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match self.store.credential() {
            Some(credential) => builder.bearer_auth(credential.expose()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> ApiResult<Response> {
        let response = builder.send().await?;
        self.check_response(response).await
    }

    /// Check if response is successful, returning an error with body if not.
    /// A 401 also ends the session.
    async fn check_response(&self, response: Response) -> ApiResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.invalidate_session(response.url().path());
            return Err(ApiError::Unauthorized);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }

    fn invalidate_session(&self, path: &str) {
        warn!(path, "Backend rejected credential, ending session");
        if let Err(e) = self.store.clear_credential() {
            error!(error = %e, "Failed to clear rejected credential");
        }
        self.bus.publish(AuthEvent::SessionInvalidated);
    }

    async fn json<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
        let url = response.url().to_string();
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self.send(self.request(Method::GET, path)).await?;
        Self::json(response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let response = self.send(self.request(Method::POST, path).json(body)).await?;
        Self::json(response).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let response = self.send(self.request(Method::PUT, path).json(body)).await?;
        Self::json(response).await
    }

    /// DELETE, ignoring any response body.
    pub async fn delete(&self, path: &str) -> ApiResult<()> {
        self.send(self.request(Method::DELETE, path)).await?;
        Ok(())
    }

    /// Ask the backend whether the stored credential is valid. Any failure,
    /// whether rejection or transport, reads as `false`.
    pub async fn verify_credential(&self) -> bool {
        let response = match self.send(self.request(Method::GET, &self.verify_path)).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Credential verification failed");
                return false;
            }
        };
        match response.text().await {
            Ok(body) => is_truthy(&body),
            Err(e) => {
                warn!(error = %e, "Failed to read verification response");
                false
            }
        }
    }

    /// Exchange username and password for a bearer token, store it, and
    /// announce the login.
    pub async fn login(&self, username: &str, password: &str) -> ApiResult<()> {
        let builder = self
            .request(Method::POST, &self.login_path)
            .form(&[("username", username), ("password", password)]);
        let response = self.send(builder).await?;
        let login: LoginResponse = Self::json(response).await?;

        if let Some(ref kind) = login.token_type {
            if !kind.eq_ignore_ascii_case("bearer") {
                warn!(token_type = %kind, "Unexpected token type from login");
            }
        }

        let credential = Credential::new(login.access_token)
            .ok_or_else(|| ApiError::InvalidResponse("Login returned an empty token".to_string()))?;
        self.store
            .set_credential(credential)
            .map_err(ApiError::Storage)?;

        info!(username, "Login successful");
        self.bus.publish(AuthEvent::AuthSucceeded);
        Ok(())
    }

    pub async fn health(&self) -> ApiResult<HealthStatus> {
        self.get(&self.health_path).await
    }
}

impl Verifier for ApiClient {
    fn verify(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.verify_credential())
    }
}

/// JSON truthiness of a verification body. An empty 2xx body counts as a
/// yes; `null`, `false`, `0` and `""` count as a no.
fn is_truthy(body: &str) -> bool {
    let body = body.trim();
    if body.is_empty() {
        return true;
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Null) => false,
        Ok(serde_json::Value::Bool(b)) => b,
        Ok(serde_json::Value::Number(n)) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
        Ok(serde_json::Value::String(s)) => !s.is_empty(),
        Ok(_) => true,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryBackend;
    use crate::config::Config;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, store: SessionStore, bus: EventBus) -> ApiClient {
        let config = Config {
            api_base_url: Some(format!("  {}/  ", server.uri())),
            ..Config::default()
        };
        let client = ApiClient::new(&config, store, bus).unwrap();
        assert_eq!(client.base_url(), server.uri());
        client
    }

    fn store_with(token: &str) -> SessionStore {
        let store = SessionStore::new(MemoryBackend::new());
        store.set_credential(Credential::new(token).unwrap()).unwrap();
        store
    }

    #[test]
    fn test_is_truthy() {
        assert!(is_truthy(""));
        assert!(is_truthy("true"));
        assert!(is_truthy(r#"{"email": "ops@route2rise.in"}"#));
        assert!(is_truthy("1"));
        assert!(is_truthy("[]"));
        assert!(!is_truthy("null"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy(r#""""#));
    }

    #[tokio::test]
    async fn test_bearer_header_attached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/leads"))
            .and(header("authorization", "Bearer tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, store_with("tok-123"), EventBus::new());
        let leads: Vec<serde_json::Value> = client.get("/leads").await.unwrap();
        assert!(leads.is_empty());
    }

    #[tokio::test]
    async fn test_no_header_without_credential() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "healthy", "app": "Route2Rise"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, SessionStore::new(MemoryBackend::new()), EventBus::new());
        let health = client.health().await.unwrap();
        assert_eq!(health.status, "healthy");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_unauthorized_clears_credential_and_signals() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/leads"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let store = store_with("expired");
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let client = client_for(&server, store.clone(), bus);

        let err = client.get::<serde_json::Value>("/leads").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(!store.has_credential());
        assert_eq!(events.try_recv().unwrap(), AuthEvent::SessionInvalidated);
    }

    #[tokio::test]
    async fn test_other_errors_keep_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/leads"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let store = store_with("good");
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let client = client_for(&server, store.clone(), bus);

        let err = client
            .post::<serde_json::Value, _>("/leads", &serde_json::json!({"company_name": "Acme"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ServerError(ref b) if b == "boom"));
        assert!(store.has_credential());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_verify_outcomes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/verify"))
            .and(header("authorization", "Bearer good"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"username": "admin"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/auth/verify"))
            .and(header("authorization", "Bearer bad"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let good = client_for(&server, store_with("good"), EventBus::new());
        assert!(good.verify_credential().await);

        let bad_store = store_with("bad");
        let bad = client_for(&server, bad_store.clone(), EventBus::new());
        assert!(!bad.verify_credential().await);
        assert!(!bad_store.has_credential());
    }

    #[tokio::test]
    async fn test_verify_unreachable_backend() {
        let config = Config {
            api_base_url: Some("http://127.0.0.1:9".to_string()),
            request_timeout_secs: 2,
            ..Config::default()
        };
        let store = store_with("tok");
        let client = ApiClient::new(&config, store.clone(), EventBus::new()).unwrap();

        assert!(!client.verify_credential().await);
        // Only a 401 ends the session.
        assert!(store.has_credential());
    }

    #[tokio::test]
    async fn test_login_stores_token_and_announces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_string_contains("username=admin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh-jwt",
                "token_type": "bearer"
            })))
            .mount(&server)
            .await;

        let store = SessionStore::new(MemoryBackend::new());
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let client = client_for(&server, store.clone(), bus);

        client.login("admin", "s3cret").await.unwrap();
        assert_eq!(store.credential().unwrap().expose(), "fresh-jwt");
        assert_eq!(events.try_recv().unwrap(), AuthEvent::AuthSucceeded);
    }

    #[tokio::test]
    async fn test_put_sends_body_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/leads/42"))
            .and(header("authorization", "Bearer tok-put"))
            .and(body_string_contains("Qualified"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": 42, "status": "Qualified"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, store_with("tok-put"), EventBus::new());
        let lead: serde_json::Value = client
            .put("/leads/42", &serde_json::json!({"status": "Qualified"}))
            .await
            .unwrap();
        assert_eq!(lead["status"], "Qualified");
    }

    #[tokio::test]
    async fn test_delete_unauthorized_ends_session() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/leads/42"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with("revoked");
        let bus = EventBus::new();
        let mut events = bus.subscribe();
        let client = client_for(&server, store.clone(), bus);

        let err = client.delete("/leads/42").await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(!store.has_credential());
        assert_eq!(events.try_recv().unwrap(), AuthEvent::SessionInvalidated);
    }

    #[tokio::test]
    async fn test_delete_ignores_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/leads/7"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, store_with("tok"), EventBus::new());
        client.delete("/leads/7").await.unwrap();
    }

    #[tokio::test]
    async fn test_session_cookie_sent_back() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "session=abc; Path=/")
                    .set_body_json(serde_json::json!({"access_token": "jwt"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/leads"))
            .and(header("cookie", "session=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, SessionStore::new(MemoryBackend::new()), EventBus::new());
        client.login("admin", "s3cret").await.unwrap();
        let leads: Vec<serde_json::Value> = client.get("/leads").await.unwrap();
        assert!(leads.is_empty());
    }
}
