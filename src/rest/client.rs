use crate::auth::{self, get_timestamp_ms};
use crate::error::{KucoinError, Result};
use crate::types::{KucoinWebsocketConfig, StreamKind};
use crate::websocket::EndpointResolver;
use futures_util::future::BoxFuture;
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

const MAINNET_API_URL: &str = "https://api-futures.kucoin.com";
const TESTNET_API_URL: &str = "https://api-sandbox-futures.kucoin.com";
const BULLET_PUBLIC_PATH: &str = "/api/v1/bullet-public";
const BULLET_PRIVATE_PATH: &str = "/api/v1/bullet-private";
const DEFAULT_TIMEOUT_SECONDS: u64 = 10;
const API_KEY_VERSION: &str = "2";

/// Credential triple used to sign the private bullet request.
#[derive(Debug, Clone)]
pub struct BulletCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

/// A client for the websocket "bullet" handshake endpoints.
///
/// The exchange hands out the connectable websocket endpoint and a
/// short-lived connection token over REST; this client performs that call,
/// signing it with the API credentials when the private (user) stream is
/// requested.
///
/// # Examples
///
/// ```no_run
/// use kucoin_futures_connector_rs::rest::BulletClient;
///
/// #[tokio::main]
/// async fn main() {
///     let client = BulletClient::new(false, None, None).expect("Failed to create client");
///     let data = client.bullet_public().await.expect("Failed to fetch bullet");
///     let url = client.websocket_url(&data).expect("Failed to build url");
///     println!("connect to: {}", url);
/// }
/// ```
#[derive(Clone)]
pub struct BulletClient {
    /// The underlying HTTP client used for making requests.
    http_client: HttpClient,
    /// The base URL for the futures REST API (production or sandbox).
    base_url: Url,
    /// API credentials, required only for the private bullet.
    credentials: Option<BulletCredentials>,
}

impl BulletClient {
    /// Creates a new bullet client.
    ///
    /// # Arguments
    ///
    /// * `is_test` - Whether to use the sandbox (true) or production (false) API
    /// * `credentials` - API credentials; only needed for [`Self::bullet_private`]
    /// * `timeout_sec` - Optional timeout in seconds for HTTP requests
    pub fn new(
        is_test: bool,
        credentials: Option<BulletCredentials>,
        timeout_sec: Option<u64>,
    ) -> Result<Self> {
        let base_url_str = if is_test {
            TESTNET_API_URL
        } else {
            MAINNET_API_URL
        };
        Self::with_base_url(base_url_str, credentials, timeout_sec)
    }

    /// Creates a client against an explicit base URL. Used by tests to
    /// target a local mock server.
    pub fn with_base_url(
        base_url: &str,
        credentials: Option<BulletCredentials>,
        timeout_sec: Option<u64>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let timeout_duration = Duration::from_secs(timeout_sec.unwrap_or(DEFAULT_TIMEOUT_SECONDS));
        let http_client = HttpClient::builder().timeout(timeout_duration).build()?;

        Ok(Self {
            http_client,
            base_url,
            credentials,
        })
    }

    /// Builds the production resolver for a websocket client configuration.
    pub(crate) fn from_config(config: &KucoinWebsocketConfig) -> Result<Arc<dyn EndpointResolver>> {
        let credentials = match (&config.api_key, &config.api_secret, &config.api_passphrase) {
            (Some(key), Some(secret), Some(passphrase)) => Some(BulletCredentials {
                api_key: key.clone(),
                api_secret: secret.clone(),
                api_passphrase: passphrase.clone(),
            }),
            _ => None,
        };
        let client = Self::new(config.is_test, credentials, None)?;
        Ok(Arc::new(BulletResolver {
            client,
            private: config.stream_type == StreamKind::User,
        }))
    }

    /// Fetches the public websocket endpoint and token. Unsigned.
    pub async fn bullet_public(&self) -> Result<BulletData> {
        self.request_bullet(BULLET_PUBLIC_PATH, false).await
    }

    /// Fetches the private websocket endpoint and token. Requires credentials.
    pub async fn bullet_private(&self) -> Result<BulletData> {
        self.request_bullet(BULLET_PRIVATE_PATH, true).await
    }

    /// Builds the connectable URL from a bullet response: the first instance
    /// server, with the token and a fresh `connectId` in the query string.
    pub fn websocket_url(&self, data: &BulletData) -> Result<Url> {
        let server =
            data.instance_servers
                .first()
                .ok_or_else(|| KucoinError::EndpointError {
                    code: "200000".to_string(),
                    message: "Bullet response carried no instance servers".to_string(),
                })?;
        let mut url = Url::parse(&server.endpoint)?;
        url.query_pairs_mut()
            .append_pair("token", &data.token)
            .append_pair("connectId", &Uuid::new_v4().simple().to_string());
        Ok(url)
    }

    async fn request_bullet(&self, path: &str, signed: bool) -> Result<BulletData> {
        let full_url = self.base_url.join(path)?;
        let mut request = self.http_client.post(full_url);
        if signed {
            request = request.headers(self.signed_headers("POST", path)?);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(KucoinError::EndpointError {
                code: status.as_u16().to_string(),
                message,
            });
        }

        let envelope: ApiEnvelope<BulletData> = response.json().await?;
        if envelope.code != "200000" {
            return Err(KucoinError::EndpointError {
                code: envelope.code,
                message: envelope.msg.unwrap_or_default(),
            });
        }
        envelope.data.ok_or_else(|| KucoinError::EndpointError {
            code: "200000".to_string(),
            message: "Bullet response carried no data".to_string(),
        })
    }

    /// Builds the signed header set for a private request.
    ///
    /// The signature covers `timestamp + method + path + body` (the bullet
    /// request has an empty body); version-2 keys additionally transmit the
    /// passphrase as its own HMAC signature.
    fn signed_headers(&self, method: &str, path: &str) -> Result<HeaderMap> {
        let creds =
            self.credentials
                .as_ref()
                .ok_or_else(|| KucoinError::ParameterRequiredError {
                    param: "credentials".to_string(),
                })?;
        let timestamp = get_timestamp_ms()?;
        let message_to_sign = format!("{}{}{}", timestamp, method, path);
        let signature = auth::generate_signature(&creds.api_secret, &message_to_sign)?;
        let passphrase = auth::sign_passphrase(&creds.api_secret, &creds.api_passphrase)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("kc-api-key"),
            HeaderValue::from_str(&creds.api_key)?,
        );
        headers.insert(
            HeaderName::from_static("kc-api-sign"),
            HeaderValue::from_str(&signature)?,
        );
        headers.insert(
            HeaderName::from_static("kc-api-timestamp"),
            HeaderValue::from(timestamp),
        );
        headers.insert(
            HeaderName::from_static("kc-api-passphrase"),
            HeaderValue::from_str(&passphrase)?,
        );
        headers.insert(
            HeaderName::from_static("kc-api-key-version"),
            HeaderValue::from_static(API_KEY_VERSION),
        );
        Ok(headers)
    }
}

#[derive(Deserialize, Debug)]
struct ApiEnvelope<T> {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

/// Payload of a successful bullet response.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct BulletData {
    pub token: String,
    pub instance_servers: Vec<InstanceServer>,
}

/// One connectable websocket endpoint advertised by the exchange.
///
/// The advertised ping settings are informational; the heartbeat
/// configuration of a client instance is fixed at construction.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InstanceServer {
    pub endpoint: String,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default)]
    pub protocol: String,
    pub ping_interval: u64,
    pub ping_timeout: u64,
}

/// Production [`EndpointResolver`]: one bullet call per connect attempt.
pub struct BulletResolver {
    client: BulletClient,
    private: bool,
}

impl BulletResolver {
    pub fn new(client: BulletClient, private: bool) -> Self {
        Self { client, private }
    }
}

impl EndpointResolver for BulletResolver {
    fn resolve(&self) -> BoxFuture<'_, Result<Url>> {
        Box::pin(async move {
            let data = if self.private {
                self.client.bullet_private().await?
            } else {
                self.client.bullet_public().await?
            };
            debug!(
                "[Bullet] Resolved {} instance server(s).",
                data.instance_servers.len()
            );
            self.client.websocket_url(&data)
        })
    }
}
