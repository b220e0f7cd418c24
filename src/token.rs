//! OAuth2 client-credentials session.
//!
//! At most one token request is outstanding. A fetch that needs the token
//! while it is being acquired is remembered once and replayed on success.

use serde_json::Value;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{excerpt, FetchError, STATUS_EXCERPT};
use crate::flight::{RequestId, SingleFlight};
use crate::net::{build_token_request, HttpReply, TokenRequest};

/// A token stops being used this long before it expires.
pub const RENEWAL_SKEW_MS: i64 = 30_000;
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 600;
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenState {
    /// Empty means no token.
    pub access_token: String,
    pub expiry_epoch_ms: i64,
}

impl TokenState {
    pub fn is_usable(&self, now_ms: i64) -> bool {
        !self.access_token.is_empty() && now_ms < self.expiry_epoch_ms.saturating_sub(RENEWAL_SKEW_MS)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum TokenStatus {
    /// The current token may be sent as a Bearer credential.
    Ready(String),
    /// A token request is in flight; the fetch was queued for replay. When
    /// `request` is set the caller must dispatch it.
    Pending { request: Option<(RequestId, TokenRequest)> },
    /// OAuth is not configured.
    Skipped,
}

#[derive(Debug, PartialEq)]
pub enum TokenCompletion {
    /// Completion of a request that is no longer tracked.
    Stale,
    Acquired { replay_fetch: bool },
    Failed { error: FetchError, dropped_fetch: bool },
}

#[derive(Debug, Default)]
pub struct TokenManager {
    state: TokenState,
    flight: SingleFlight,
}

impl TokenManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TokenState {
        &self.state
    }

    pub fn is_requesting(&self) -> bool {
        self.flight.is_busy()
    }

    pub fn fetch_pending(&self) -> bool {
        self.flight.has_pending()
    }

    pub fn ensure_valid(&mut self, settings: &Settings, now_ms: i64) -> TokenStatus {
        if !settings.wants_bearer() {
            return TokenStatus::Skipped;
        }
        if self.flight.is_busy() {
            self.flight.defer();
            return TokenStatus::Pending { request: None };
        }
        if self.state.is_usable(now_ms) {
            return TokenStatus::Ready(self.state.access_token.clone());
        }
        let Some(id) = self.flight.begin() else {
            self.flight.defer();
            return TokenStatus::Pending { request: None };
        };
        self.flight.defer();
        info!("requesting access token {id} from {}", settings.token_url);
        TokenStatus::Pending {
            request: Some((id, build_token_request(settings))),
        }
    }

    pub fn complete(&mut self, id: RequestId, reply: &HttpReply, now_ms: i64) -> TokenCompletion {
        if !self.flight.finish(id) {
            return TokenCompletion::Stale;
        }
        match parse_token_reply(reply) {
            Ok((token, expires_in)) => {
                let lifetime_secs = expires_in
                    .saturating_sub(EXPIRY_MARGIN_SECS)
                    .max(EXPIRY_MARGIN_SECS);
                self.state = TokenState {
                    access_token: token,
                    expiry_epoch_ms: now_ms.saturating_add(lifetime_secs.saturating_mul(1000)),
                };
                info!("access token {id} acquired, valid for {lifetime_secs}s");
                TokenCompletion::Acquired {
                    replay_fetch: self.flight.take_pending(),
                }
            }
            Err(error) => {
                warn!("token request {id} failed: {error}");
                TokenCompletion::Failed {
                    error,
                    dropped_fetch: self.flight.take_pending(),
                }
            }
        }
    }
}

fn parse_token_reply(reply: &HttpReply) -> Result<(String, i64), FetchError> {
    if let Some(err) = &reply.error {
        return Err(FetchError::token(format!(
            "token error ({}): {} {}",
            reply.status,
            err,
            excerpt(&reply.body, STATUS_EXCERPT)
        )));
    }
    if !reply.is_success() {
        return Err(FetchError::token(format!(
            "token error ({}): {}",
            reply.status,
            excerpt(&reply.body, STATUS_EXCERPT)
        )));
    }
    let obj = match serde_json::from_slice::<Value>(&reply.body) {
        Ok(Value::Object(obj)) => obj,
        _ => return Err(FetchError::token("token response is not JSON")),
    };
    let token = obj
        .get("access_token")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if token.is_empty() {
        return Err(FetchError::token("token response missing access_token"));
    }
    let expires_in = obj
        .get("expires_in")
        .and_then(whole_seconds)
        .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
    Ok((token.to_string(), expires_in))
}

/// Integer, or a float with no fractional part (`3600.0`). Out-of-range floats saturate.
fn whole_seconds(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|secs| secs.is_finite() && secs.fract() == 0.0)
            .map(|secs| secs as i64)
    })
}
