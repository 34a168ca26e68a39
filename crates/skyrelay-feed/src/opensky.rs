use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use skyrelay_types::RelayError;

use crate::decode::{decode_states, FeedSnapshot};
use crate::StateFeed;

pub const DEFAULT_ROOT_URL: &str = "https://opensky-network.org/api";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

/// Geographic filter applied upstream. Only sent when all four bounds are set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lon_min: f64,
    pub lat_max: f64,
    pub lon_max: f64,
}

#[derive(Debug, Clone)]
pub struct OpenSkyConfig {
    pub root_url: String,
    pub credentials: Option<Credentials>,
    /// Restrict the feed to these ICAO24 codes. Empty means everything.
    pub icao24s: Vec<String>,
    pub bounds: Option<BoundingBox>,
    pub timeout: Duration,
    /// Overwritten with the raw response body after every successful fetch.
    pub json_dump: Option<PathBuf>,
}

impl Default for OpenSkyConfig {
    fn default() -> Self {
        OpenSkyConfig {
            root_url: DEFAULT_ROOT_URL.to_string(),
            credentials: None,
            icao24s: Vec::new(),
            bounds: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
            json_dump: None,
        }
    }
}

/// Build the `states/all` request URL for `config`.
pub fn states_url(config: &OpenSkyConfig) -> Result<Url, RelayError> {
    let root = config.root_url.trim_end_matches('/');
    let mut url = Url::parse(&format!("{root}/states/all"))
        .map_err(|e| RelayError::InvalidArgument(format!("root url {root:?}: {e}")))?;

    let mut params: Vec<(&str, String)> = config
        .icao24s
        .iter()
        .map(|icao| ("icao24", icao.trim().to_ascii_lowercase()))
        .collect();
    if let Some(b) = config.bounds {
        params.push(("lamin", b.lat_min.to_string()));
        params.push(("lomin", b.lon_min.to_string()));
        params.push(("lamax", b.lat_max.to_string()));
        params.push(("lomax", b.lon_max.to_string()));
    }
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params);
    }
    Ok(url)
}

/// The root URL with any embedded user info and query removed, for logging.
pub fn redacted_root_url(root_url: &str) -> String {
    match Url::parse(root_url) {
        Ok(mut url) => {
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.set_query(None);
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}

/// Polls the OpenSky REST API.
///
/// Uses a reusable `reqwest::Client` so connections are pooled between polls.
pub struct OpenSkyClient {
    http: reqwest::Client,
    url: Url,
    credentials: Option<Credentials>,
    json_dump: Option<PathBuf>,
}

impl OpenSkyClient {
    pub fn new(config: OpenSkyConfig) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("skyrelay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::Transport(format!("failed to build HTTP client: {e}")))?;
        let url = states_url(&config)?;

        if let Some(parent) = config.json_dump.as_deref().and_then(|p| p.parent()) {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!(path = %parent.display(), error = %e, "could not create JSON dump folder");
                }
            }
        }

        Ok(OpenSkyClient {
            http,
            url,
            credentials: config.credentials,
            json_dump: config.json_dump,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn dump_json(&self, body: &str) {
        let Some(path) = &self.json_dump else {
            return;
        };
        if let Err(e) = tokio::fs::write(path, body).await {
            tracing::warn!(path = %path.display(), error = %e, "could not save upstream JSON");
        }
    }
}

impl StateFeed for OpenSkyClient {
    async fn fetch(&self) -> Result<FeedSnapshot, RelayError> {
        let mut request = self.http.get(self.url.clone());
        if let Some(c) = &self.credentials {
            request = request.basic_auth(&c.user, Some(&c.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status {
                status: status.as_u16(),
                url: self.url.path().to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        self.dump_json(&body).await;

        let snapshot = decode_states(&body)?;
        tracing::debug!(states = snapshot.samples.len(), "OpenSky states fetched");
        Ok(snapshot)
    }
}
