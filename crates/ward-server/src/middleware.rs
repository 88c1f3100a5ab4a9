//! Response hardening and audit logging

use crate::http::{actor_from_headers, remote_addr};
use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use ward_core::ratelimit::client_ip;

const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
];

/// Add the security headers to every response
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    response
}

/// Log every request made by an identified user
pub async fn audit_log(request: Request, next: Next) -> Response {
    if let Ok(Some(actor)) = actor_from_headers(request.headers()) {
        let forwarded_for = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok());
        let remote = remote_addr(request.extensions());
        let ip = client_ip(forwarded_for, remote.as_deref());

        log::info!(
            "User {} ({}) accessed {} from {}",
            actor.username,
            actor.role,
            request.uri().path(),
            ip
        );
    }

    next.run(request).await
}
