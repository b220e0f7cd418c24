use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use tracing::debug;

use crate::config::Settings;
use crate::error::FetchError;
use crate::geo::{compute_bbox, BBOX_KEYS};
use crate::model::ZoneConfig;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const USER_AGENT: &str = concat!("noflyzone/", env!("CARGO_PKG_VERSION"));

/// Hosts that reject unbounded state queries and need a bbox in the query string.
pub const BBOX_PROVIDER_HOST: &str = "opensky-network.org";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Auth {
    None,
    Bearer(String),
    Basic { user: String, password: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataRequest {
    pub url: String,
    pub auth: Auth,
}

#[derive(Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl TokenRequest {
    pub fn form_fields(&self) -> [(&'static str, &str); 3] {
        [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ]
    }
}

impl std::fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequest")
            .field("url", &self.url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// What came back from the wire. `status` is 0 when no HTTP response arrived;
/// `error` holds the transport failure text, if any.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
    pub error: Option<String>,
}

impl HttpReply {
    pub fn ok(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            error: None,
        }
    }

    pub fn failed(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            body: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

/// Blocking HTTP seam. Calls run on worker threads, never on the engine thread.
pub trait Transport: Send + Sync + 'static {
    fn get(&self, request: &DataRequest) -> HttpReply;
    fn post_token(&self, request: &TokenRequest) -> HttpReply;
}

pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        // some providers on the free tier reject HTTP/2
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .http1_only()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, request: &DataRequest) -> HttpReply {
        let req = self.client.get(request.url.as_str());
        let req = match &request.auth {
            Auth::None => req,
            Auth::Bearer(token) => req.bearer_auth(token),
            Auth::Basic { user, password } => req.basic_auth(user, Some(password)),
        };
        debug!("GET {}", request.url);
        into_reply(req.send())
    }

    fn post_token(&self, request: &TokenRequest) -> HttpReply {
        debug!("POST {}", request.url);
        let resp = self
            .client
            .post(request.url.as_str())
            .form(&request.form_fields())
            .send();
        into_reply(resp)
    }
}

fn into_reply(result: reqwest::Result<reqwest::blocking::Response>) -> HttpReply {
    match result {
        Ok(resp) => {
            let status = resp.status().as_u16();
            match resp.bytes() {
                Ok(body) => HttpReply::ok(status, body.to_vec()),
                Err(err) => HttpReply::failed(status, err.to_string()),
            }
        }
        Err(err) => {
            let status = err.status().map(|s| s.as_u16()).unwrap_or(0);
            HttpReply::failed(status, err.to_string())
        }
    }
}

/// Builds the aircraft GET for one cycle. `bearer` is the valid access token
/// when OAuth is configured; otherwise any configured credentials go out as
/// HTTP Basic.
pub fn build_data_request(settings: &Settings, bearer: Option<&str>) -> Result<DataRequest, FetchError> {
    let mut url = Url::parse(settings.api_url.trim()).map_err(|err| FetchError::Transport {
        status: 0,
        message: format!("invalid api url {:?}: {err}", settings.api_url),
        excerpt: String::new(),
    })?;
    inject_bbox(&mut url, &settings.zone);

    let auth = if let Some(token) = bearer {
        Auth::Bearer(token.to_string())
    } else if !settings.client_id.is_empty() || !settings.client_secret.is_empty() {
        Auth::Basic {
            user: settings.client_id.clone(),
            password: settings.client_secret.clone(),
        }
    } else {
        Auth::None
    };

    Ok(DataRequest {
        url: url.into(),
        auth,
    })
}

pub fn build_token_request(settings: &Settings) -> TokenRequest {
    TokenRequest {
        url: settings.token_url.clone(),
        client_id: settings.client_id.clone(),
        client_secret: settings.client_secret.clone(),
    }
}

fn inject_bbox(url: &mut Url, zone: &ZoneConfig) {
    let provider = url
        .host_str()
        .is_some_and(|host| host.contains(BBOX_PROVIDER_HOST));
    if !provider {
        return;
    }
    let has_bbox = url
        .query_pairs()
        .any(|(key, _)| BBOX_KEYS.contains(&key.as_ref()));
    if has_bbox || zone.radius_m <= 0.0 || zone.bbox_scale <= 0.0 {
        return;
    }
    let bbox = compute_bbox(zone.center, zone.radius_m, zone.bbox_scale);
    let mut query = url.query_pairs_mut();
    for (key, value) in bbox.query_pairs() {
        query.append_pair(key, &value);
    }
}
