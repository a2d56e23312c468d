// Authenticated API client.
//
// Every operation goes through one request path: build headers, send via
// the transport, normalise the response in `handle_response`. Authenticated
// operations additionally pass through `send_authorized`, which owns the
// retry-after-401 policy so callers never re-implement it.

use std::sync::Arc;

use finmodel_core::config::Config;
use finmodel_core::protocol::{refresh_body, Session, TokenResponse};
use finmodel_core::resources::PeriodType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::endpoints::Endpoints;
use crate::error::ApiError;
use crate::line_items::{LineItemUpload, NewLineItem};
use crate::session::{SessionEvent, SessionManager};
use crate::transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, MultipartForm, ReqwestTransport,
    RequestBody, TransportError,
};

// ---------------------------------------------------------------------------
// Fallback messages (status 500, used when no usable response arrived)
// ---------------------------------------------------------------------------

const LOGIN_FAILED: &str = "Failed to login. Please try again.";
const REGISTER_FAILED: &str = "Failed to register. Please try again.";
const REFRESH_FAILED: &str = "Failed to refresh token";
const LOGOUT_FAILED: &str = "Failed to logout";
const PROFILE_FETCH_FAILED: &str = "Failed to fetch profile";
const PROFILE_UPDATE_FAILED: &str = "Failed to update profile";
const MODELS_FETCH_FAILED: &str = "Failed to fetch finance models";
const MODEL_FETCH_FAILED: &str = "Failed to fetch finance model details";
const MODEL_CREATE_FAILED: &str = "Failed to create finance model";
const MODEL_UPDATE_FAILED: &str = "Failed to update finance model";
const MODEL_DELETE_FAILED: &str = "Failed to delete finance model";
const PERIODS_FETCH_FAILED: &str = "Failed to fetch periods";
const PERIOD_FETCH_FAILED: &str = "Failed to fetch period";
const PERIOD_CREATE_FAILED: &str = "Failed to create period";
const PERIOD_UPDATE_FAILED: &str = "Failed to update period";
const PERIOD_DELETE_FAILED: &str = "Failed to delete period";
const SCENARIOS_FETCH_FAILED: &str = "Failed to fetch scenarios";
const SCENARIO_CREATE_FAILED: &str = "Failed to create scenario";
const SCENARIO_UPDATE_FAILED: &str = "Failed to update scenario";
const SCENARIO_DELETE_FAILED: &str = "Failed to delete scenario";
const LINE_ITEMS_FETCH_FAILED: &str = "Failed to fetch line items";
const LINE_ITEM_CREATE_FAILED: &str = "Failed to add line item";
const LINE_ITEMS_UPLOAD_FAILED: &str = "Failed to upload line items";

// ---------------------------------------------------------------------------
// Call description
// ---------------------------------------------------------------------------

/// One logical backend call. Kept around so the interceptor can replay it.
#[derive(Debug, Clone)]
struct Call {
    method: Method,
    url: String,
    body: RequestBody,
    authenticated: bool,
    fallback: &'static str,
}

impl Call {
    fn new(method: Method, url: String, fallback: &'static str) -> Self {
        Self {
            method,
            url,
            body: RequestBody::Empty,
            authenticated: true,
            fallback,
        }
    }

    fn get(url: String, fallback: &'static str) -> Self {
        Self::new(Method::GET, url, fallback)
    }

    fn post(url: String, fallback: &'static str) -> Self {
        Self::new(Method::POST, url, fallback)
    }

    fn put(url: String, fallback: &'static str) -> Self {
        Self::new(Method::PUT, url, fallback)
    }

    fn delete(url: String, fallback: &'static str) -> Self {
        Self::new(Method::DELETE, url, fallback)
    }

    fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

pub struct ApiClient {
    endpoints: Endpoints,
    transport: Arc<dyn HttpTransport>,
    session: Arc<SessionManager>,
    auto_refresh: bool,
}

impl ApiClient {
    pub fn new(
        endpoints: Endpoints,
        transport: Arc<dyn HttpTransport>,
        session: Arc<SessionManager>,
    ) -> Self {
        Self {
            endpoints,
            transport,
            session,
            auto_refresh: true,
        }
    }

    /// Build a client backed by reqwest from the application config.
    pub fn from_config(
        config: &Config,
        session: Arc<SessionManager>,
    ) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(config.timeout())?;
        Ok(Self::new(
            Endpoints::new(&config.api.base_url),
            Arc::new(transport),
            session,
        )
        .with_auto_refresh(config.session.auto_refresh))
    }

    /// Enable or disable the refresh-and-retry step for 401 responses.
    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    /// Log in and persist the returned token pair.
    pub async fn login<C: Serialize + ?Sized>(&self, credentials: &C) -> Result<Value, ApiError> {
        let body = to_body(credentials, LOGIN_FAILED)?;
        let call = Call::post(self.endpoints.login(), LOGIN_FAILED)
            .json(body)
            .anonymous();
        let data = self.execute(&call).await?;

        let tokens = parse_tokens(&data, LOGIN_FAILED)?;
        let Some(refresh_token) = tokens.refresh else {
            warn!("login response carried no refresh token");
            return Err(ApiError::fallback(LOGIN_FAILED)
                .with_cause("missing `refresh` in login response"));
        };
        let session = Session {
            access_token: tokens.access,
            refresh_token,
        };
        self.persist(&session, LOGIN_FAILED)?;

        info!("logged in");
        self.session.emit(SessionEvent::LoggedIn);
        Ok(data)
    }

    /// Create an account. Does not sign in.
    pub async fn register<U: Serialize + ?Sized>(&self, user_data: &U) -> Result<Value, ApiError> {
        let body = to_body(user_data, REGISTER_FAILED)?;
        let call = Call::post(self.endpoints.register(), REGISTER_FAILED)
            .json(body)
            .anonymous();
        self.execute(&call).await
    }

    /// Exchange the persisted refresh token for a new pair.
    ///
    /// Fails with status 401 and no network call when no refresh token is
    /// stored. A failed refresh leaves the session untouched.
    pub async fn refresh_token(&self) -> Result<Value, ApiError> {
        let _guard = self.session.lock_refresh().await;
        self.refresh_locked().await
    }

    /// Refresh body shared by [`refresh_token`](Self::refresh_token) and the
    /// interceptor. Caller must hold the refresh guard.
    async fn refresh_locked(&self) -> Result<Value, ApiError> {
        let refresh_token = self
            .session
            .refresh_token()
            .map_err(|e| store_error(REFRESH_FAILED, e))?
            .ok_or_else(ApiError::no_refresh_token)?;

        let call = Call::post(self.endpoints.refresh_token(), REFRESH_FAILED)
            .json(refresh_body(&refresh_token))
            .anonymous();
        let data = self.execute(&call).await?;

        let tokens = parse_tokens(&data, REFRESH_FAILED)?;
        let session = Session {
            access_token: tokens.access,
            refresh_token: tokens.refresh.unwrap_or(refresh_token),
        };
        self.persist(&session, REFRESH_FAILED)?;

        info!("session refreshed");
        self.session.emit(SessionEvent::Refreshed);
        Ok(data)
    }

    /// Best-effort server-side logout, then clear the local session.
    ///
    /// Never fails: a network or server error is logged and the tokens are
    /// cleared regardless.
    pub async fn logout(&self) {
        match self.session.refresh_token() {
            Ok(Some(refresh_token)) => {
                let call = Call::post(self.endpoints.logout(), LOGOUT_FAILED)
                    .json(refresh_body(&refresh_token));
                if let Err(e) = self.execute(&call).await {
                    warn!(status = e.status, cause = ?e.cause(), "logout request failed: {e}");
                }
            }
            Ok(None) => debug!("no refresh token stored; skipping logout request"),
            Err(e) => warn!("could not read refresh token for logout: {e:#}"),
        }

        if let Err(e) = self.session.clear() {
            error!("failed to clear session tokens: {e:#}");
        }
        info!("logged out");
        self.session.emit(SessionEvent::LoggedOut);
    }

    // -----------------------------------------------------------------------
    // Profile
    // -----------------------------------------------------------------------

    pub async fn get_profile(&self) -> Result<Value, ApiError> {
        self.send_authorized(Call::get(self.endpoints.profile(), PROFILE_FETCH_FAILED))
            .await
    }

    pub async fn update_profile<T: Serialize + ?Sized>(&self, data: &T) -> Result<Value, ApiError> {
        let body = to_body(data, PROFILE_UPDATE_FAILED)?;
        self.send_authorized(
            Call::put(self.endpoints.profile_update(), PROFILE_UPDATE_FAILED).json(body),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Finance models
    // -----------------------------------------------------------------------

    /// One page of the caller's finance models, envelope unchanged.
    pub async fn get_finance_models(&self, page: u32) -> Result<Value, ApiError> {
        self.send_authorized(Call::get(
            self.endpoints.finance_models_page(page),
            MODELS_FETCH_FAILED,
        ))
        .await
    }

    pub async fn get_finance_model(&self, id: i64) -> Result<Value, ApiError> {
        self.send_authorized(Call::get(self.endpoints.finance_model(id), MODEL_FETCH_FAILED))
            .await
    }

    pub async fn create_finance_model<T: Serialize + ?Sized>(
        &self,
        data: &T,
    ) -> Result<Value, ApiError> {
        let body = to_body(data, MODEL_CREATE_FAILED)?;
        self.send_authorized(
            Call::post(self.endpoints.finance_models(), MODEL_CREATE_FAILED).json(body),
        )
        .await
    }

    pub async fn update_finance_model<T: Serialize + ?Sized>(
        &self,
        id: i64,
        data: &T,
    ) -> Result<Value, ApiError> {
        let body = to_body(data, MODEL_UPDATE_FAILED)?;
        self.send_authorized(
            Call::put(self.endpoints.finance_model(id), MODEL_UPDATE_FAILED).json(body),
        )
        .await
    }

    /// Resolves to `Value::Null` when the backend answers with an empty
    /// body, as it does for `204 No Content`.
    pub async fn delete_finance_model(&self, id: i64) -> Result<Value, ApiError> {
        self.send_authorized(Call::delete(
            self.endpoints.finance_model(id),
            MODEL_DELETE_FAILED,
        ))
        .await
    }

    // -----------------------------------------------------------------------
    // Periods
    // -----------------------------------------------------------------------

    pub async fn get_periods(&self) -> Result<Value, ApiError> {
        self.get_periods_filtered(None, None).await
    }

    pub async fn get_periods_by_type(&self, period_type: PeriodType) -> Result<Value, ApiError> {
        self.get_periods_filtered(None, Some(period_type)).await
    }

    /// Period list narrowed by page and `period_type`, either optional.
    pub async fn get_periods_filtered(
        &self,
        page: Option<u32>,
        period_type: Option<PeriodType>,
    ) -> Result<Value, ApiError> {
        self.send_authorized(Call::get(
            self.endpoints.periods_query(page, period_type),
            PERIODS_FETCH_FAILED,
        ))
        .await
    }

    pub async fn get_period(&self, id: i64) -> Result<Value, ApiError> {
        self.send_authorized(Call::get(self.endpoints.period(id), PERIOD_FETCH_FAILED))
            .await
    }

    pub async fn create_period<T: Serialize + ?Sized>(&self, data: &T) -> Result<Value, ApiError> {
        let body = to_body(data, PERIOD_CREATE_FAILED)?;
        self.send_authorized(Call::post(self.endpoints.periods(), PERIOD_CREATE_FAILED).json(body))
            .await
    }

    pub async fn update_period<T: Serialize + ?Sized>(
        &self,
        id: i64,
        data: &T,
    ) -> Result<Value, ApiError> {
        let body = to_body(data, PERIOD_UPDATE_FAILED)?;
        self.send_authorized(Call::put(self.endpoints.period(id), PERIOD_UPDATE_FAILED).json(body))
            .await
    }

    /// `Value::Null` on an empty success body, like
    /// [`delete_finance_model`](Self::delete_finance_model).
    pub async fn delete_period(&self, id: i64) -> Result<Value, ApiError> {
        self.send_authorized(Call::delete(self.endpoints.period(id), PERIOD_DELETE_FAILED))
            .await
    }

    // -----------------------------------------------------------------------
    // Scenarios
    // -----------------------------------------------------------------------

    pub async fn get_scenarios(&self, model_id: i64) -> Result<Value, ApiError> {
        self.get_scenarios_page(model_id, None).await
    }

    pub async fn get_scenarios_page(
        &self,
        model_id: i64,
        page: Option<u32>,
    ) -> Result<Value, ApiError> {
        self.send_authorized(Call::get(
            self.endpoints.scenarios_for_model(model_id, page),
            SCENARIOS_FETCH_FAILED,
        ))
        .await
    }

    pub async fn create_scenario<T: Serialize + ?Sized>(
        &self,
        data: &T,
    ) -> Result<Value, ApiError> {
        let body = to_body(data, SCENARIO_CREATE_FAILED)?;
        self.send_authorized(
            Call::post(self.endpoints.scenarios(), SCENARIO_CREATE_FAILED).json(body),
        )
        .await
    }

    pub async fn update_scenario<T: Serialize + ?Sized>(
        &self,
        id: i64,
        data: &T,
    ) -> Result<Value, ApiError> {
        let body = to_body(data, SCENARIO_UPDATE_FAILED)?;
        self.send_authorized(
            Call::put(self.endpoints.scenario(id), SCENARIO_UPDATE_FAILED).json(body),
        )
        .await
    }

    /// `Value::Null` on an empty success body, like
    /// [`delete_finance_model`](Self::delete_finance_model).
    pub async fn delete_scenario(&self, id: i64) -> Result<Value, ApiError> {
        self.send_authorized(Call::delete(self.endpoints.scenario(id), SCENARIO_DELETE_FAILED))
            .await
    }

    // -----------------------------------------------------------------------
    // Line items
    // -----------------------------------------------------------------------

    pub async fn get_line_items(&self, model_id: i64, page: u32) -> Result<Value, ApiError> {
        self.send_authorized(Call::get(
            self.endpoints.line_items_page(model_id, page),
            LINE_ITEMS_FETCH_FAILED,
        ))
        .await
    }

    pub async fn create_line_item(&self, item: &NewLineItem) -> Result<Value, ApiError> {
        let body = to_body(item, LINE_ITEM_CREATE_FAILED)?;
        self.send_authorized(
            Call::post(self.endpoints.line_items(), LINE_ITEM_CREATE_FAILED).json(body),
        )
        .await
    }

    /// Send a validated spreadsheet upload as multipart form data.
    pub async fn upload_line_items(&self, upload: &LineItemUpload) -> Result<Value, ApiError> {
        self.send_authorized(
            Call::post(self.endpoints.line_item_upload(), LINE_ITEMS_UPLOAD_FAILED)
                .multipart(upload.to_multipart()),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Request path
    // -----------------------------------------------------------------------

    /// Run an authenticated call, refreshing the session once on 401.
    async fn send_authorized(&self, call: Call) -> Result<Value, ApiError> {
        let generation = self.session.generation();
        match self.execute(&call).await {
            Err(err) if self.auto_refresh && err.is_unauthorized() => {
                debug!(url = %call.url, "401 received; attempting session refresh");
                self.recover_session(generation).await?;
                self.execute(&call).await
            }
            other => other,
        }
    }

    /// Single-flight refresh for a request that started under `seen_generation`.
    async fn recover_session(&self, seen_generation: u64) -> Result<(), ApiError> {
        let _guard = self.session.lock_refresh().await;

        if self.session.generation() != seen_generation {
            let still_signed_in = self
                .session
                .access_token()
                .map_err(|e| store_error(REFRESH_FAILED, e))?
                .is_some();
            if still_signed_in {
                debug!("session already refreshed by a concurrent request");
                return Ok(());
            }
            return Err(ApiError::session_expired());
        }

        match self.refresh_locked().await {
            Ok(_) => Ok(()),
            Err(refresh_err) => {
                warn!(
                    status = refresh_err.status,
                    "session refresh failed: {refresh_err}"
                );
                if let Err(e) = self.session.clear() {
                    error!("failed to clear expired session: {e:#}");
                }
                self.session.emit(SessionEvent::Expired);
                Err(ApiError::session_expired().with_data(refresh_err.data))
            }
        }
    }

    /// One HTTP exchange, no retries.
    async fn execute(&self, call: &Call) -> Result<Value, ApiError> {
        let mut headers = Vec::with_capacity(2);
        if !matches!(call.body, RequestBody::Multipart(_)) {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        if call.authenticated {
            let token = self
                .session
                .access_token()
                .map_err(|e| store_error(call.fallback, e))?;
            if let Some(token) = token {
                headers.push(("Authorization".to_string(), format!("Bearer {token}")));
            }
        }

        let request = HttpRequest {
            method: call.method.clone(),
            url: call.url.clone(),
            headers,
            body: call.body.clone(),
        };

        debug!(method = %call.method, url = %call.url, "sending request");
        let response = self.transport.send(request).await.map_err(|e| {
            warn!(url = %call.url, "transport failure: {e}");
            ApiError::fallback(call.fallback).with_cause(e)
        })?;

        let result = handle_response(response, call.fallback);
        if call.authenticated {
            result.map_err(ApiError::in_session)
        } else {
            result
        }
    }

    fn persist(&self, session: &Session, fallback: &'static str) -> Result<(), ApiError> {
        self.session
            .store_session(session)
            .map_err(|e| store_error(fallback, e))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse the body and turn non-2xx statuses into [`ApiError`].
///
/// An empty body is `null` on success. An empty or malformed body on a
/// failure status collapses into the synthetic 500 `fallback`.
pub(crate) fn handle_response(response: HttpResponse, fallback: &str) -> Result<Value, ApiError> {
    let blank = response.body.iter().all(u8::is_ascii_whitespace);
    let parsed = if blank {
        if response.is_success() {
            Ok(Value::Null)
        } else {
            Err("empty response body".to_string())
        }
    } else {
        serde_json::from_slice::<Value>(&response.body).map_err(|e| e.to_string())
    };

    match parsed {
        Ok(data) if response.is_success() => Ok(data),
        Ok(data) => Err(ApiError::from_response(response.status, data)),
        Err(cause) => {
            warn!(status = response.status, "unreadable response body: {cause}");
            Err(ApiError::fallback(fallback)
                .with_cause(format!("status {}: {cause}", response.status)))
        }
    }
}

fn to_body<T: Serialize + ?Sized>(data: &T, fallback: &str) -> Result<Value, ApiError> {
    serde_json::to_value(data).map_err(|e| ApiError::fallback(fallback).with_cause(e))
}

fn parse_tokens(data: &Value, fallback: &str) -> Result<TokenResponse, ApiError> {
    TokenResponse::deserialize(data).map_err(|e| ApiError::fallback(fallback).with_cause(e))
}

fn store_error(fallback: &str, e: anyhow::Error) -> ApiError {
    warn!("session store failure: {e:#}");
    ApiError::fallback(fallback).with_cause(format!("{e:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, NO_REFRESH_TOKEN_MESSAGE, SESSION_EXPIRED_MESSAGE};
    use crate::testing::ScriptedTransport;
    use finmodel_core::store::{MemorySessionStore, SessionStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
    use serde_json::json;

    const BASE: &str = "http://api.test";

    fn client_with(transport: Arc<ScriptedTransport>) -> (ApiClient, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        let session = Arc::new(SessionManager::new(store.clone()));
        (ApiClient::new(Endpoints::new(BASE), transport, session), store)
    }

    fn signed_in(store: &MemorySessionStore, access: &str, refresh: &str) {
        store.set(ACCESS_TOKEN_KEY, access).unwrap();
        store.set(REFRESH_TOKEN_KEY, refresh).unwrap();
    }

    // -- handle_response --

    #[test]
    fn handle_response_success_passes_body_through() {
        let value = json!({"results": [], "count": 0, "next": null, "previous": null});
        let data = handle_response(HttpResponse::json(200, &value), "x").unwrap();
        assert_eq!(data, value);
    }

    #[test]
    fn handle_response_empty_success_is_null() {
        assert_eq!(handle_response(HttpResponse::new(204, ""), "x").unwrap(), Value::Null);
    }

    #[test]
    fn handle_response_error_keeps_status_and_body() {
        let body = json!({"message": "Name is required", "name": ["required"]});
        let err = handle_response(HttpResponse::json(400, &body), "x").unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.message, "Name is required");
        assert_eq!(err.data, body);
    }

    #[test]
    fn handle_response_malformed_body_is_fallback() {
        let err = handle_response(HttpResponse::new(502, "<html>Bad gateway</html>"), "Failed to fetch profile")
            .unwrap_err();
        assert_eq!(err.status, 500);
        assert_eq!(err.message, "Failed to fetch profile");
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.cause().unwrap().contains("status 502"));
    }

    #[test]
    fn handle_response_malformed_success_body_is_fallback() {
        let err = handle_response(HttpResponse::new(200, "not json"), "Failed").unwrap_err();
        assert_eq!(err.status, 500);
    }

    // -- headers --

    #[tokio::test]
    async fn anonymous_calls_omit_authorization() {
        let transport = Arc::new(ScriptedTransport::queued(vec![Ok(HttpResponse::json(
            201,
            &json!({"message": "User created successfully"}),
        ))]));
        let (client, store) = client_with(transport.clone());
        signed_in(&store, "a1", "r1");

        client.register(&json!({"email": "a@b.co"})).await.unwrap();

        let request = &transport.requests()[0];
        assert_eq!(request.header("Authorization"), None);
        assert_eq!(request.header("Content-Type"), Some("application/json"));
    }

    #[tokio::test]
    async fn authenticated_call_without_token_sends_no_header() {
        let transport = Arc::new(ScriptedTransport::queued(vec![Ok(HttpResponse::json(
            200,
            &json!({"id": 1}),
        ))]));
        let (client, _store) = client_with(transport.clone());

        client.get_profile().await.unwrap();
        assert_eq!(transport.requests()[0].header("Authorization"), None);
    }

    // -- login / register --

    #[tokio::test]
    async fn login_without_refresh_in_response_fails() {
        let transport = Arc::new(ScriptedTransport::queued(vec![Ok(HttpResponse::json(
            200,
            &json!({"access": "a1"}),
        ))]));
        let (client, store) = client_with(transport);

        let err = client
            .login(&json!({"email": "a@b.co", "password": "pw"}))
            .await
            .unwrap_err();
        assert_eq!(err.status, 500);
        assert_eq!(err.message, LOGIN_FAILED);
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn login_network_failure_is_500_fallback() {
        let transport = Arc::new(ScriptedTransport::queued(vec![]));
        let (client, _store) = client_with(transport);

        let err = client
            .login(&json!({"email": "a@b.co", "password": "pw"}))
            .await
            .unwrap_err();
        assert_eq!(err.status, 500);
        assert_eq!(err.message, "Failed to login. Please try again.");
        assert!(err.cause().is_some());
    }

    #[tokio::test]
    async fn login_rejected_keeps_backend_status() {
        let transport = Arc::new(ScriptedTransport::queued(vec![Ok(HttpResponse::json(
            401,
            &json!({"message": "Invalid credentials"}),
        ))]));
        let (client, store) = client_with(transport.clone());

        let err = client
            .login(&json!({"email": "a@b.co", "password": "bad"}))
            .await
            .unwrap_err();
        assert_eq!(err.status, 401);
        assert_eq!(err.message, "Invalid credentials");
        assert_eq!(err.user_message(), "Invalid credentials");
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
        // Anonymous calls never go through the refresh interceptor.
        assert_eq!(transport.requests().len(), 1);
    }

    // -- refresh --

    #[tokio::test]
    async fn refresh_without_token_makes_no_call() {
        let transport = Arc::new(ScriptedTransport::queued(vec![]));
        let (client, _store) = client_with(transport.clone());

        let err = client.refresh_token().await.unwrap_err();
        assert_eq!(err.status, 401);
        assert_eq!(err.message, NO_REFRESH_TOKEN_MESSAGE);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn refresh_keeps_old_refresh_token_when_not_rotated() {
        let transport = Arc::new(ScriptedTransport::queued(vec![Ok(HttpResponse::json(
            200,
            &json!({"access": "a2"}),
        ))]));
        let (client, store) = client_with(transport.clone());
        signed_in(&store, "a1", "r1");

        client.refresh_token().await.unwrap();

        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a2"));
        assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r1"));
        let request = &transport.requests()[0];
        assert_eq!(request.url, "http://api.test/token/refresh/");
        assert_eq!(request.json_body(), Some(&json!({"refresh": "r1"})));
        assert_eq!(request.header("Authorization"), None);
    }

    #[tokio::test]
    async fn failed_explicit_refresh_keeps_session() {
        let transport = Arc::new(ScriptedTransport::queued(vec![Ok(HttpResponse::json(
            401,
            &json!({"message": "Token is blacklisted"}),
        ))]));
        let (client, store) = client_with(transport);
        signed_in(&store, "a1", "r1");

        let err = client.refresh_token().await.unwrap_err();
        assert_eq!(err.status, 401);
        assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap().as_deref(), Some("r1"));
    }

    // -- interceptor --

    #[tokio::test]
    async fn auto_refresh_disabled_returns_raw_401() {
        let transport = Arc::new(ScriptedTransport::queued(vec![Ok(HttpResponse::json(
            401,
            &json!({"message": "Token expired"}),
        ))]));
        let (client, store) = client_with(transport.clone());
        let client = client.with_auto_refresh(false);
        signed_in(&store, "a1", "r1");

        let err = client.get_profile().await.unwrap_err();
        assert_eq!(err.message, "Token expired");
        assert_eq!(err.user_message(), SESSION_EXPIRED_MESSAGE);
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap().as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn second_401_after_refresh_is_returned_as_is() {
        let transport = Arc::new(ScriptedTransport::queued(vec![
            Ok(HttpResponse::json(401, &json!({"message": "expired"}))),
            Ok(HttpResponse::json(200, &json!({"access": "a2", "refresh": "r2"}))),
            Ok(HttpResponse::json(401, &json!({"message": "still no"}))),
        ]));
        let (client, store) = client_with(transport.clone());
        signed_in(&store, "a1", "r1");

        let err = client.get_profile().await.unwrap_err();
        assert_eq!(err.status, 401);
        assert_eq!(err.message, "still no");
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn refresh_failure_clears_session_and_reports_expiry() {
        let transport = Arc::new(ScriptedTransport::queued(vec![
            Ok(HttpResponse::json(401, &json!({"message": "expired"}))),
            Ok(HttpResponse::json(401, &json!({"message": "refresh expired"}))),
        ]));
        let (client, store) = client_with(transport);
        signed_in(&store, "a1", "r1");

        let err = client.get_profile().await.unwrap_err();
        assert_eq!(err.status, 401);
        assert_eq!(err.message, SESSION_EXPIRED_MESSAGE);
        assert_eq!(err.data, json!({"message": "refresh expired"}));
        assert_eq!(store.get(ACCESS_TOKEN_KEY).unwrap(), None);
        assert_eq!(store.get(REFRESH_TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn non_401_errors_skip_refresh() {
        let transport = Arc::new(ScriptedTransport::queued(vec![Ok(HttpResponse::json(
            404,
            &json!({"message": "Not found."}),
        ))]));
        let (client, store) = client_with(transport.clone());
        signed_in(&store, "a1", "r1");

        let err = client.get_finance_model(99).await.unwrap_err();
        assert_eq!(err.status, 404);
        assert_eq!(transport.requests().len(), 1);
    }

    // -- verbs and bodies --

    #[tokio::test]
    async fn crud_calls_use_expected_verbs_and_urls() {
        let transport = Arc::new(ScriptedTransport::new(|_| Ok(HttpResponse::json(200, &json!({})))));
        let (client, store) = client_with(transport.clone());
        signed_in(&store, "a1", "r1");

        client.create_finance_model(&json!({"name": "M"})).await.unwrap();
        client.update_finance_model(3, &json!({"name": "M2"})).await.unwrap();
        client.delete_finance_model(3).await.unwrap();
        client.get_periods().await.unwrap();
        client.get_periods_by_type(PeriodType::Quarterly).await.unwrap();
        client.create_period(&json!({"label": "Q1"})).await.unwrap();
        client.update_period(5, &json!({"label": "Q2"})).await.unwrap();
        client.delete_period(5).await.unwrap();
        client.get_scenarios(3).await.unwrap();
        client.create_scenario(&json!({"name": "Base"})).await.unwrap();
        client.update_scenario(8, &json!({"name": "Worst"})).await.unwrap();
        client.delete_scenario(8).await.unwrap();
        client.get_line_items(3, 2).await.unwrap();
        client.update_profile(&json!({"company_name": "Acme"})).await.unwrap();

        let seen: Vec<(String, String)> = transport
            .requests()
            .iter()
            .map(|r| (r.method.to_string(), r.url.trim_start_matches(BASE).to_string()))
            .collect();
        let expected = [
            ("POST", "/finance-model/"),
            ("PUT", "/finance-model/3/"),
            ("DELETE", "/finance-model/3/"),
            ("GET", "/period/"),
            ("GET", "/period/?period_type=quarterly"),
            ("POST", "/period/"),
            ("PUT", "/period/5/"),
            ("DELETE", "/period/5/"),
            ("GET", "/scenario/?model_id=3"),
            ("POST", "/scenario/"),
            ("PUT", "/scenario/8/"),
            ("DELETE", "/scenario/8/"),
            ("GET", "/line-item/?page=2&model_id=3"),
            ("PUT", "/profile/update"),
        ];
        assert_eq!(seen.len(), expected.len());
        for ((method, path), (want_method, want_path)) in seen.iter().zip(expected) {
            assert_eq!(method, want_method);
            assert_eq!(path, want_path);
        }
        assert!(transport
            .requests()
            .iter()
            .all(|r| r.header("Authorization") == Some("Bearer a1")));
    }

    #[tokio::test]
    async fn delete_with_empty_body_succeeds() {
        let transport = Arc::new(ScriptedTransport::queued(vec![Ok(HttpResponse::new(204, ""))]));
        let (client, store) = client_with(transport);
        signed_in(&store, "a1", "r1");

        assert_eq!(client.delete_scenario(1).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn transport_failure_uses_resource_fallback() {
        let transport = Arc::new(ScriptedTransport::queued(vec![Err(TransportError::Other(
            "connection reset".into(),
        ))]));
        let (client, store) = client_with(transport);
        signed_in(&store, "a1", "r1");

        let err = client.get_scenarios(1).await.unwrap_err();
        assert_eq!(err.status, 500);
        assert_eq!(err.message, "Failed to fetch scenarios");
        assert_eq!(err.cause(), Some("connection reset"));
    }
}
