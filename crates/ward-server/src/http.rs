//! HTTP surface of the letter service

use crate::middleware::{audit_log, security_headers};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::{header, Extensions, HeaderMap, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use ward_core::config::RateLimitConfig;
use ward_core::constants::{LETTER_PDF_LIMITER, LETTER_REQUEST_LIMITER};
use ward_core::letters::GeneratedDocument;
use ward_core::{Decision, LetterWorkflow, RateLimiter, RequesterIdentity, WardError};
use ward_types::{Actor, LetterRequestId, NewLetterRequest, Role, UserId};

/// Shared services handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<LetterWorkflow>,
    pub limiter: Arc<RateLimiter>,
    pub rate_limit: Arc<RateLimitConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/letters", post(submit_letter).get(list_all))
        .route("/letters/mine", get(list_mine))
        .route("/letters/pending", get(list_pending))
        .route("/letters/:id", get(get_letter))
        .route("/letters/:id/approve", post(approve_letter))
        .route("/letters/:id/reject", post(reject_letter))
        .route("/letters/:id/pdf", get(generate_pdf))
        .route("/letters/:id/document", get(stored_document))
        .with_state(state)
        .layer(middleware::from_fn(audit_log))
        .layer(middleware::from_fn(security_headers))
}

/// `WardError` rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub WardError);

impl From<WardError> for ApiError {
    fn from(e: WardError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            WardError::Validation(_) => StatusCode::BAD_REQUEST,
            WardError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            WardError::NotFound(_) => StatusCode::NOT_FOUND,
            WardError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            WardError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            WardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            e if e.is_dependency_failure() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }

        let mut response = (status, Json(json!({ "error": self.0.to_string() }))).into_response();
        if let WardError::RateLimitExceeded { retry_after } = self.0 {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        }
        response
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Caller identity set by the gateway. No `X-User-Id` means anonymous.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Option<Actor>, WardError> {
    let Some(raw_id) = header_str(headers, "x-user-id") else {
        return Ok(None);
    };

    let user_id: i64 = raw_id
        .parse()
        .map_err(|_| WardError::Validation(format!("Invalid X-User-Id: {}", raw_id)))?;
    let role: Role = header_str(headers, "x-user-role")
        .unwrap_or("resident")
        .parse()
        .map_err(|e| WardError::Validation(format!("Invalid X-User-Role: {}", e)))?;

    Ok(Some(Actor {
        user_id: UserId::new(user_id),
        username: header_str(headers, "x-user-name")
            .unwrap_or(raw_id)
            .to_string(),
        role,
        is_staff: header_str(headers, "x-user-staff")
            .map_or(false, |v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")),
        email: header_str(headers, "x-user-email").map(str::to_string),
    }))
}

fn require_actor(headers: &HeaderMap) -> ApiResult<Actor> {
    actor_from_headers(headers)?.ok_or_else(|| {
        ApiError(WardError::PermissionDenied(
            "authentication required".to_string(),
        ))
    })
}

/// Peer address recorded by the listener, if any
pub fn remote_addr(extensions: &Extensions) -> Option<String> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Outcome of the limiter for one request
enum Admission {
    Exempt,
    Admitted(Decision),
    Denied(Decision),
}

async fn admit(
    state: &AppState,
    limiter_name: &str,
    actor: Option<&Actor>,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> ApiResult<Admission> {
    if state.limiter.is_exempt(actor) {
        return Ok(Admission::Exempt);
    }
    let Some(policy) = state.rate_limit.policy(limiter_name) else {
        return Ok(Admission::Exempt);
    };

    let peer = peer.map(|addr| addr.ip().to_string());
    let identity = RequesterIdentity::resolve(
        actor.map(|a| a.user_id),
        header_str(headers, "x-forwarded-for"),
        peer.as_deref(),
    );

    let decision = state.limiter.check(limiter_name, &identity, policy).await?;
    Ok(if decision.allowed {
        Admission::Admitted(decision)
    } else {
        Admission::Denied(decision)
    })
}

fn insert_rate_limit_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset", HeaderValue::from(decision.reset_at));
}

fn rate_limited(decision: &Decision) -> Response {
    let body = format!(
        "Rate limit exceeded. Please try again in {} seconds.",
        decision.retry_after_seconds
    );
    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    insert_rate_limit_headers(response.headers_mut(), decision);
    response.headers_mut().insert(
        header::RETRY_AFTER,
        HeaderValue::from(decision.retry_after_seconds),
    );
    response
}

/// Run `handler` when the limiter admits the request, decorating the response with the budget
async fn limited<F>(
    state: &AppState,
    limiter_name: &str,
    actor: Option<&Actor>,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    handler: F,
) -> Response
where
    F: std::future::Future<Output = ApiResult<Response>>,
{
    let decision = match admit(state, limiter_name, actor, headers, peer).await {
        Ok(Admission::Denied(decision)) => return rate_limited(&decision),
        Ok(Admission::Admitted(decision)) => Some(decision),
        Ok(Admission::Exempt) => None,
        Err(e) => return e.into_response(),
    };

    let mut response = handler.await.unwrap_or_else(IntoResponse::into_response);
    if let Some(decision) = decision {
        insert_rate_limit_headers(response.headers_mut(), &decision);
    }
    response
}

fn pdf_response(document: GeneratedDocument) -> ApiResult<Response> {
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        document.file_name
    ))
    .map_err(|e| WardError::Document(format!("Invalid attachment name: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(document.content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document.bytes,
    )
        .into_response())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn submit_letter(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(e) => return ApiError(e).into_response(),
    };
    let peer = peer.map(|ConnectInfo(addr)| addr);

    limited(&state, LETTER_REQUEST_LIMITER, actor.as_ref(), &headers, peer, async {
        let actor = actor.clone().ok_or_else(|| {
            ApiError(WardError::PermissionDenied("authentication required".to_string()))
        })?;
        // Decoded after admission so malformed bodies count against the limit too
        let submission: NewLetterRequest = serde_json::from_slice(&body)
            .map_err(|e| WardError::Validation(format!("Invalid letter request: {}", e)))?;
        let request = state.workflow.submit(&actor, submission).await?;
        Ok((StatusCode::CREATED, Json(request)).into_response())
    })
    .await
}

async fn generate_pdf(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let actor = match actor_from_headers(&headers) {
        Ok(actor) => actor,
        Err(e) => return ApiError(e).into_response(),
    };
    let peer = peer.map(|ConnectInfo(addr)| addr);

    limited(&state, LETTER_PDF_LIMITER, actor.as_ref(), &headers, peer, async {
        let actor = actor.clone().ok_or_else(|| {
            ApiError(WardError::PermissionDenied("authentication required".to_string()))
        })?;
        let document = state
            .workflow
            .generate_document(&actor, LetterRequestId::new(id))
            .await?;
        pdf_response(document)
    })
    .await
}

async fn stored_document(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let actor = require_actor(&headers)?;
    let document = state
        .workflow
        .stored_document(&actor, LetterRequestId::new(id))
        .await?;
    pdf_response(document)
}

async fn list_mine(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let actor = require_actor(&headers)?;
    Ok(Json(state.workflow.list_mine(&actor).await?).into_response())
}

async fn list_pending(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let actor = require_actor(&headers)?;
    Ok(Json(state.workflow.list_pending(&actor).await?).into_response())
}

async fn list_all(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let actor = require_actor(&headers)?;
    Ok(Json(state.workflow.list_all(&actor).await?).into_response())
}

async fn get_letter(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let actor = require_actor(&headers)?;
    let request = state.workflow.get(&actor, LetterRequestId::new(id)).await?;
    Ok(Json(request).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct ApproveBody {
    #[serde(default)]
    admin_notes: String,
}

#[derive(Debug, Default, Deserialize)]
struct RejectBody {
    #[serde(default)]
    rejection_reason: String,
}

async fn approve_letter(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    body: Option<Json<ApproveBody>>,
) -> ApiResult<Response> {
    let actor = require_actor(&headers)?;
    let Json(body) = body.unwrap_or_default();
    let outcome = state
        .workflow
        .approve(&actor, LetterRequestId::new(id), &body.admin_notes)
        .await?;
    Ok(Json(outcome).into_response())
}

async fn reject_letter(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    headers: HeaderMap,
    body: Option<Json<RejectBody>>,
) -> ApiResult<Response> {
    let actor = require_actor(&headers)?;
    let Json(body) = body.unwrap_or_default();
    let request = state
        .workflow
        .reject(&actor, LetterRequestId::new(id), &body.rejection_reason)
        .await?;
    Ok(Json(request).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use ward_core::config::{FailurePolicy, WardConfig};
    use ward_core::document::MemoryDocumentArchive;
    use ward_core::notify::LogNotifier;
    use ward_core::{MemoryCounterCache, MemoryLetterStore, StaticDirectory};
    use ward_types::{Household, LetterType, LetterTypeId, ResidentId, SubjectProfile};

    fn state_with(rate_limit: RateLimitConfig) -> AppState {
        let resident = SubjectProfile {
            id: ResidentId::new(1),
            user_id: Some(UserId::new(7)),
            first_name: "Amina".to_string(),
            middle_name: String::new(),
            last_name: "Mushi".to_string(),
            nida_number: "19900101123450000123".to_string(),
            phone_number: None,
            email: None,
            household: Household {
                household_number: "HH001".to_string(),
                street_name: "Main Street".to_string(),
                house_number: "123".to_string(),
                ward: "Saranga".to_string(),
            },
        };
        let letter_type = LetterType {
            id: LetterTypeId::new(1),
            name: "Introduction Letter".to_string(),
            description: String::new(),
            is_active: true,
        };

        let workflow = LetterWorkflow::new(
            Arc::new(MemoryLetterStore::new()),
            Arc::new(StaticDirectory::new(vec![resident], vec![letter_type])),
            Arc::new(LogNotifier),
            Arc::new(MemoryDocumentArchive::new()),
            &WardConfig::default(),
        );
        let limiter = RateLimiter::new(Arc::new(MemoryCounterCache::new()), FailurePolicy::FailOpen)
            .with_exempt_roles(rate_limit.exempt_roles.clone());

        AppState {
            workflow: Arc::new(workflow),
            limiter: Arc::new(limiter),
            rate_limit: Arc::new(rate_limit),
        }
    }

    fn resident_request(method: &str, uri: &str, body: Body) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", "7")
            .header("x-user-name", "amina")
            .header("x-user-role", "resident")
            .header("content-type", "application/json")
            .body(body)
            .unwrap()
    }

    fn admin_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", "1")
            .header("x-user-name", "leader")
            .header("x-user-role", "admin")
            .body(Body::empty())
            .unwrap()
    }

    fn submission() -> Body {
        Body::from(r#"{"letter_type_id": 1, "purpose": "employment"}"#)
    }

    #[tokio::test]
    async fn test_health_has_security_headers() {
        let app = router(state_with(RateLimitConfig::default()));
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert_eq!(response.headers()["x-xss-protection"], "1; mode=block");
        assert_eq!(
            response.headers()["referrer-policy"],
            "strict-origin-when-cross-origin"
        );
    }

    #[tokio::test]
    async fn test_submit_returns_created_with_budget_headers() {
        let app = router(state_with(RateLimitConfig::default()));
        let response = app
            .oneshot(resident_request("POST", "/letters", submission()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-ratelimit-limit"], "10");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "9");
        assert!(response.headers().contains_key("x-ratelimit-reset"));

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(created["status"], "pending");
    }

    #[tokio::test]
    async fn test_submit_over_limit_is_429() {
        let mut rate_limit = RateLimitConfig::default();
        rate_limit.policies.insert(
            LETTER_REQUEST_LIMITER.to_string(),
            ward_core::config::RateLimitPolicy {
                limit: 1,
                window_seconds: 3600,
            },
        );
        let app = router(state_with(rate_limit));

        let first = app
            .clone()
            .oneshot(resident_request("POST", "/letters", submission()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);

        let second = app
            .oneshot(resident_request("POST", "/letters", submission()))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry_after: u64 = second.headers()["retry-after"].to_str().unwrap().parse().unwrap();
        assert!(retry_after > 0);
        let body = to_bytes(second.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).starts_with("Rate limit exceeded"));
    }

    #[tokio::test]
    async fn test_malformed_submission_consumes_budget() {
        let mut rate_limit = RateLimitConfig::default();
        rate_limit.policies.insert(
            LETTER_REQUEST_LIMITER.to_string(),
            ward_core::config::RateLimitPolicy {
                limit: 1,
                window_seconds: 3600,
            },
        );
        let app = router(state_with(rate_limit));

        let malformed = app
            .clone()
            .oneshot(resident_request("POST", "/letters", Body::from("{not json")))
            .await
            .unwrap();
        assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
        assert_eq!(malformed.headers()["x-ratelimit-remaining"], "0");

        let valid = app
            .oneshot(resident_request("POST", "/letters", submission()))
            .await
            .unwrap();
        assert_eq!(valid.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_approve_requires_admin_and_conflicts_twice() {
        let app = router(state_with(RateLimitConfig::default()));
        app.clone()
            .oneshot(resident_request("POST", "/letters", submission()))
            .await
            .unwrap();

        let denied = app
            .clone()
            .oneshot(resident_request("POST", "/letters/1/approve", Body::empty()))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let approved = app
            .clone()
            .oneshot(admin_request("POST", "/letters/1/approve"))
            .await
            .unwrap();
        assert_eq!(approved.status(), StatusCode::OK);
        let body = to_bytes(approved.into_body(), usize::MAX).await.unwrap();
        let outcome: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(outcome["request"]["status"], "approved");
        assert_eq!(outcome["notification"]["status"], "skipped");

        let again = app
            .oneshot(admin_request("POST", "/letters/1/reject"))
            .await
            .unwrap();
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_pdf_download_headers() {
        let app = router(state_with(RateLimitConfig::default()));
        app.clone()
            .oneshot(resident_request("POST", "/letters", submission()))
            .await
            .unwrap();
        app.clone()
            .oneshot(admin_request("POST", "/letters/1/approve"))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(resident_request("GET", "/letters/1/pdf", Body::empty()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/pdf");
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"Amina_Mushi_Introduction_Letter.pdf\""
        );
        assert_eq!(response.headers()["x-ratelimit-limit"], "20");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.starts_with(b"%PDF"));

        let second = app
            .oneshot(resident_request("GET", "/letters/1/pdf", Body::empty()))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_anonymous_and_missing() {
        let app = router(state_with(RateLimitConfig::default()));
        let anonymous = app
            .clone()
            .oneshot(Request::get("/letters").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(anonymous.status(), StatusCode::FORBIDDEN);

        let missing = app
            .oneshot(admin_request("GET", "/letters/99"))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_exempt_admin_gets_no_budget_headers() {
        let mut rate_limit = RateLimitConfig::default();
        rate_limit.exempt_roles = vec![Role::Admin];
        let app = router(state_with(rate_limit));

        let response = app
            .oneshot(admin_request("GET", "/letters/5/pdf"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.headers().contains_key("x-ratelimit-limit"));
    }

    #[test]
    fn test_actor_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(actor_from_headers(&headers).unwrap().is_none());

        headers.insert("x-user-id", HeaderValue::from_static("12"));
        headers.insert("x-user-role", HeaderValue::from_static("Admin"));
        headers.insert("x-user-staff", HeaderValue::from_static("true"));
        let actor = actor_from_headers(&headers).unwrap().unwrap();
        assert_eq!(actor.user_id, UserId::new(12));
        assert_eq!(actor.role, Role::Admin);
        assert!(actor.is_staff);
        assert_eq!(actor.username, "12");

        headers.insert("x-user-id", HeaderValue::from_static("abc"));
        assert!(actor_from_headers(&headers).is_err());
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (WardError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (WardError::PermissionDenied("x".into()), StatusCode::FORBIDDEN),
            (WardError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (WardError::RateLimitExceeded { retry_after: 5 }, StatusCode::TOO_MANY_REQUESTS),
            (WardError::DependencyFailure("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (WardError::Timeout("x".into()), StatusCode::GATEWAY_TIMEOUT),
            (WardError::Storage("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError(error).into_response().status(), status);
        }
    }
}
