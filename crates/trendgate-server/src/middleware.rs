use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiError;

const API_KEYS_VAR: &str = "TRENDGATE_API_KEYS";

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Operator verified from the bearer token; `None` while auth is disabled.
#[derive(Debug, Clone, Default)]
pub struct OperatorIdentity(pub Option<String>);

#[derive(Clone)]
struct OperatorKey {
    operator_id: String,
    digest: [u8; 32],
}

/// Operator bearer tokens, held as salted SHA-256 digests.
#[derive(Clone)]
pub struct AuthState {
    keys: Arc<Vec<OperatorKey>>,
    salt: Arc<str>,
    pub enabled: bool,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("operators", &self.keys.len())
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl AuthState {
    /// Builds auth config from `TRENDGATE_API_KEYS` (comma-separated
    /// `operator_id:token` pairs).
    ///
    /// In development, empty/missing keys disable auth for local iteration.
    /// In non-development envs, empty/missing keys fail startup.
    pub fn from_env(is_development: bool, salt: Option<&str>) -> anyhow::Result<Self> {
        let raw = std::env::var(API_KEYS_VAR).unwrap_or_default();
        Self::from_pairs(&raw, is_development, salt)
    }

    pub fn from_pairs(raw: &str, is_development: bool, salt: Option<&str>) -> anyhow::Result<Self> {
        let salt: Arc<str> = Arc::from(salt.unwrap_or_default());
        let mut keys = Vec::new();

        for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((operator_id, token)) = entry.split_once(':') else {
                anyhow::bail!("{API_KEYS_VAR} entries must be operator_id:token pairs");
            };
            let (operator_id, token) = (operator_id.trim(), token.trim());
            if operator_id.is_empty() || token.is_empty() {
                anyhow::bail!("{API_KEYS_VAR} entry has an empty operator id or token");
            }
            keys.push(OperatorKey {
                operator_id: operator_id.to_owned(),
                digest: hash_token(&salt, token),
            });
        }

        if keys.is_empty() {
            if is_development {
                tracing::warn!(
                    "{API_KEYS_VAR} not set; bearer auth disabled in development environment"
                );
                return Ok(Self {
                    keys: Arc::new(Vec::new()),
                    salt,
                    enabled: false,
                });
            }

            anyhow::bail!(
                "{API_KEYS_VAR} is required outside development; provide operator_id:token pairs"
            );
        }

        tracing::info!(operators = keys.len(), "bearer auth enabled");
        Ok(Self {
            keys: Arc::new(keys),
            salt,
            enabled: true,
        })
    }

    /// The operator owning `token`. Every key is compared.
    fn verify(&self, token: &str) -> Option<&str> {
        let digest = hash_token(&self.salt, token);
        let mut found = None;
        for key in self.keys.iter() {
            if bool::from(key.digest[..].ct_eq(&digest[..])) {
                found = Some(key.operator_id.as_str());
            }
        }
        found
    }
}

fn hash_token(salt: &str, token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limiter shared by every route.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<RateLimitWindow>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(RateLimitWindow {
                started_at: Instant::now(),
                count: 0,
            })),
        }
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default()
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware enforcing Bearer token auth when enabled.
///
/// Always inserts an [`OperatorIdentity`] for the handlers.
pub async fn require_bearer_auth(
    State(auth): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    if !auth.enabled {
        req.extensions_mut().insert(OperatorIdentity(None));
        return next.run(req).await;
    }

    let operator = extract_bearer_token(req.headers().get(AUTHORIZATION))
        .and_then(|token| auth.verify(token))
        .map(ToOwned::to_owned);

    if let Some(operator) = operator {
        req.extensions_mut()
            .insert(OperatorIdentity(Some(operator)));
        next.run(req).await
    } else {
        ApiError::new(
            request_id_of(&req),
            "unauthorized",
            "missing or invalid bearer token",
        )
        .into_response()
    }
}

/// Middleware enforcing a fixed request-per-window limit.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let mut window = rate_limit.state.lock().await;
    let elapsed = window.started_at.elapsed();

    if elapsed >= rate_limit.window {
        window.started_at = Instant::now();
        window.count = 0;
    }

    if window.count >= rate_limit.max_requests {
        drop(window);
        return ApiError::new(request_id_of(&req), "rate_limited", "rate limit exceeded")
            .into_response();
    }

    window.count += 1;
    drop(window);

    next.run(req).await
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}
