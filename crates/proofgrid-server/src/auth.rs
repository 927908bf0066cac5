use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Credentials the server checks, taken from config.
#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Bearer token for REST API access. None = auth disabled.
    pub bearer_token: Option<String>,
    /// Identity-service signing key. None = identify tokens are not checked.
    pub session_secret: Option<String>,
}

impl AuthConfig {
    /// Whether an identify frame may claim `display_name` with `token`.
    pub fn accepts_identity(&self, display_name: &str, token: Option<&str>) -> bool {
        match &self.session_secret {
            None => true,
            Some(secret) => {
                token.is_some_and(|t| verify_session_token(secret, display_name, t))
            },
        }
    }
}

/// Axum middleware that validates Bearer token authentication.
/// If no token is configured (`AuthConfig::bearer_token` is None), all
/// requests are allowed through (auth disabled).
pub async fn bearer_auth_middleware(
    headers: HeaderMap,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_config = request
        .extensions()
        .get::<AuthConfig>()
        .cloned()
        .unwrap_or_default();

    if let Some(ref expected) = auth_config.bearer_token {
        let provided = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        match provided {
            Some(token) if token == expected => {},
            _ => return Err(StatusCode::UNAUTHORIZED),
        }
    }

    Ok(next.run(request).await)
}

/// Hex HMAC-SHA256 of `display_name` under `secret`. This is what the
/// identity service hands a logged-in player.
pub fn sign_session(secret: &str, display_name: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(display_name.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of an identify token.
pub fn verify_session_token(secret: &str, display_name: &str, token: &str) -> bool {
    let Ok(expected_bytes) = hex::decode(token) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };

    mac.update(display_name.as_bytes());
    mac.verify_slice(&expected_bytes).is_ok()
}
