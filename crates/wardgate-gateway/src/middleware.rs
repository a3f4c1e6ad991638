use crate::auth::{AuthVerdict, ConnectRequestContext, SharedConnectAuth};
use crate::server::GatewayState;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;
use wardgate_core::{normalize, FailReason};
use wardgate_security::RateLimitScope;

/// Header carrying a password for HTTP callers.
pub const PASSWORD_HEADER: &str = "x-gateway-password";
/// Header set by the private-overlay proxy with the caller's identity.
pub const OVERLAY_USER_HEADER: &str = "x-overlay-user";

/// Auth middleware for protected HTTP routes.
///
/// Reads `Authorization: Bearer <token>` and `x-gateway-password`, then asks
/// the strategy's HTTP path with the shared-secret rate limiter.
pub async fn http_auth_middleware(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let shared = SharedConnectAuth::from_parts(
        bearer_token(headers).as_deref(),
        header_str(headers, PASSWORD_HEADER),
    );
    let ctx = ConnectRequestContext {
        client_ip: request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip()),
        overlay_user: normalize(header_str(headers, OVERLAY_USER_HEADER)),
        device_id: None,
    };

    let verdict = state
        .orchestrator
        .strategy()
        .authorize_http_connect(
            &state.policy,
            shared.as_ref(),
            &ctx,
            state.rate_limiter.as_deref(),
            &RateLimitScope::SHARED_SECRET,
        )
        .await;
    state.record_decision(Uuid::new_v4(), "http_connect", &ctx, &verdict);

    match verdict {
        AuthVerdict::Ok { .. } => next.run(request).await,
        AuthVerdict::Fail {
            reason: FailReason::RateLimited,
            retry_after_ms,
        } => {
            warn!(client_ip = ?ctx.client_ip, "Rate limited HTTP request");
            let mut response =
                (StatusCode::TOO_MANY_REQUESTS, "Too many failed attempts").into_response();
            let seconds = retry_after_ms.unwrap_or(1_000).div_ceil(1_000).max(1);
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
        AuthVerdict::Fail { reason, .. } => {
            warn!(client_ip = ?ctx.client_ip, reason = %reason, "Rejected HTTP request");
            (StatusCode::UNAUTHORIZED, reason.as_str()).into_response()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    header_str(headers, header::AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|v| normalize(Some(v)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::ResolvedAuthPolicy;
    use crate::authorizer::GatewayAuthorizer;
    use crate::device::InMemoryDeviceTokens;
    use crate::server::GatewayServer;
    use axum::body::Body;
    use std::time::Duration;
    use tower::ServiceExt;
    use wardgate_security::InMemoryRateLimiter;

    fn state() -> Arc<GatewayState> {
        let strategy = Arc::new(GatewayAuthorizer::new(Arc::new(InMemoryDeviceTokens::new())));
        let limiter = Arc::new(InMemoryRateLimiter::new(
            2,
            Duration::from_secs(60),
            Duration::from_secs(30),
        ));
        Arc::new(
            GatewayState::new(ResolvedAuthPolicy::with_token("http-token"), strategy)
                .with_rate_limiter(limiter),
        )
    }

    fn status_request(auth: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/v1/status");
        if let Some(auth) = auth {
            builder = builder.header("authorization", auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Bearer  abc "));
        assert_eq!(bearer_token(&headers), Some("abc".to_string()));
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert("authorization", HeaderValue::from_static("Bearer    "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_protected_route_statuses() {
        let app = GatewayServer::build(state());

        let resp = app.clone().oneshot(status_request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = app
            .clone()
            .oneshot(status_request(Some("Bearer http-token")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(status_request(Some("Bearer wrong")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let app = GatewayServer::build(state());

        // No ConnectInfo here, so every request shares the "unknown" key.
        for _ in 0..2 {
            let resp = app
                .clone()
                .oneshot(status_request(Some("Bearer wrong")))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        }

        let resp = app
            .oneshot(status_request(Some("Bearer http-token")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let retry: u64 = resp.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry > 0 && retry <= 30);
    }
}
