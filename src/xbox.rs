//! Xbox Live identity provider
//!
//! HTTP client for the profile, titlehub and messaging services. Every call
//! asks the token provider for a fresh XBL3.0 credential.

use crate::admin::GamertagResolver;
use crate::enforcement::DirectMessenger;
use crate::error::{AutomodError, AutomodResult};
use crate::vetting::{IdentitySignals, PlayerIdentity, SignalFetcher, TitleRecord};
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT_LANGUAGE, AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const PROFILE_BASE_URL: &str = "https://profile.xboxlive.com";
pub const TITLEHUB_BASE_URL: &str = "https://titlehub.xboxlive.com";
pub const MESSAGING_BASE_URL: &str = "https://xblmessaging.xboxlive.com";

const CONTRACT_VERSION: &str = "2";
const GAMERSCORE_SETTING: &str = "Gamerscore";
const REPUTATION_SETTING: &str = "XboxOneRep";

/// XBL3.0 credential pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct XboxToken {
    #[serde(rename = "userHash")]
    pub user_hash: String,
    #[serde(rename = "XSTSToken")]
    pub xsts_token: String,
    #[serde(rename = "expiresOn", default)]
    pub expires_on: Option<DateTime<Utc>>,
}

impl XboxToken {
    /// Value for the `Authorization` header
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("XBL3.0 x={};{}", self.user_hash, self.xsts_token)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_on.is_some_and(|expires_on| expires_on <= now)
    }
}

/// Source of Xbox Live credentials
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait TokenProvider: Send + Sync {
    async fn xbox_token(&self) -> AutomodResult<XboxToken>;
}

/// Reads the token cache written by the realm client's auth flow.
///
/// The file is re-read on every call so a refreshed token is picked up
/// without restarting.
#[derive(Debug, Clone)]
pub struct FileTokenProvider {
    path: PathBuf,
}

impl FileTokenProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl TokenProvider for FileTokenProvider {
    async fn xbox_token(&self) -> AutomodResult<XboxToken> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AutomodError::Auth(format!("Failed to read {}: {e}", self.path.display()))
        })?;
        let token: XboxToken = serde_json::from_str(&content).map_err(|e| {
            AutomodError::Auth(format!("Malformed token cache {}: {e}", self.path.display()))
        })?;
        if token.is_expired(Utc::now()) {
            return Err(AutomodError::Auth("Xbox token has expired".to_string()));
        }
        Ok(token)
    }
}

/// Base URLs of the Xbox Live services
#[derive(Debug, Clone)]
pub struct XboxEndpoints {
    pub profile: String,
    pub titlehub: String,
    pub messaging: String,
}

impl Default for XboxEndpoints {
    fn default() -> Self {
        Self {
            profile: PROFILE_BASE_URL.to_string(),
            titlehub: TITLEHUB_BASE_URL.to_string(),
            messaging: MESSAGING_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    #[serde(default)]
    profile_users: Vec<ProfileUser>,
}

#[derive(Debug, Deserialize)]
struct ProfileUser {
    id: String,
    #[serde(default)]
    settings: Vec<ProfileSetting>,
}

#[derive(Debug, Deserialize)]
struct ProfileSetting {
    id: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct TitleHistoryResponse {
    #[serde(default)]
    titles: Vec<Title>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Title {
    name: String,
    #[serde(default)]
    title_history: Option<TitleHistory>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TitleHistory {
    last_time_played: DateTime<Utc>,
}

/// Xbox Live client
#[derive(Clone)]
pub struct XboxLiveClient {
    http: Client,
    tokens: Arc<dyn TokenProvider>,
    endpoints: XboxEndpoints,
}

impl XboxLiveClient {
    /// Create a client for the production endpoints
    ///
    /// # Errors
    ///
    /// Returns `AutomodError::Network` if the HTTP client cannot be built.
    pub fn new(tokens: Arc<dyn TokenProvider>, timeout: Duration) -> AutomodResult<Self> {
        Self::with_endpoints(tokens, timeout, XboxEndpoints::default())
    }

    /// Create a client for custom endpoints
    ///
    /// # Errors
    ///
    /// Returns `AutomodError::Network` if the HTTP client cannot be built.
    pub fn with_endpoints(
        tokens: Arc<dyn TokenProvider>,
        timeout: Duration,
        endpoints: XboxEndpoints,
    ) -> AutomodResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            tokens,
            endpoints,
        })
    }

    async fn headers(&self) -> AutomodResult<HeaderMap> {
        let token = self.tokens.xbox_token().await?;
        let mut headers = HeaderMap::new();
        headers.insert("x-xbl-contract-version", HeaderValue::from_static(CONTRACT_VERSION));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&token.authorization())
                .map_err(|e| AutomodError::Auth(format!("Unusable token: {e}")))?,
        );
        Ok(headers)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> AutomodResult<T> {
        debug!("GET {url}");
        let response = self.http.get(url.clone()).headers(self.headers().await?).send().await?;
        let response = check_status(response)?;
        response
            .json::<T>()
            .await
            .map_err(|e| AutomodError::Network(format!("Malformed response from {url}: {e}")))
    }

    /// Gamerscore and reputation for a XUID. Both settings must be present.
    async fn profile_settings(&self, xuid: &str) -> AutomodResult<(i64, String)> {
        let mut url = endpoint(
            &self.endpoints.profile,
            &["users", &format!("xuid({xuid})"), "profile", "settings"],
        )?;
        url.query_pairs_mut().append_pair(
            "settings",
            &format!("{GAMERSCORE_SETTING},{REPUTATION_SETTING}"),
        );

        let profile: ProfileResponse = self.get_json(url).await?;
        let user = profile.profile_users.into_iter().next().ok_or_else(|| {
            AutomodError::Network(format!("Profile lookup for {xuid} returned no users"))
        })?;

        let mut game_score = None;
        let mut reputation = None;
        for setting in user.settings {
            match setting.id.as_str() {
                GAMERSCORE_SETTING => {
                    game_score = Some(setting.value.parse::<i64>().map_err(|e| {
                        AutomodError::Network(format!(
                            "Malformed Gamerscore {:?}: {e}",
                            setting.value
                        ))
                    })?);
                }
                REPUTATION_SETTING => reputation = Some(setting.value),
                _ => {}
            }
        }

        let game_score = game_score.ok_or_else(|| {
            AutomodError::Network(format!("Profile for {xuid} has no {GAMERSCORE_SETTING}"))
        })?;
        let reputation = reputation.ok_or_else(|| {
            AutomodError::Network(format!("Profile for {xuid} has no {REPUTATION_SETTING}"))
        })?;
        Ok((game_score, reputation))
    }

    /// Title history for a XUID, most recent first
    async fn title_history(&self, xuid: &str) -> AutomodResult<Vec<TitleRecord>> {
        let url = endpoint(
            &self.endpoints.titlehub,
            &[
                "users",
                &format!("xuid({xuid})"),
                "titles",
                "titlehistory",
                "decoration",
                "scid,image,detail",
            ],
        )?;

        let history: TitleHistoryResponse = self.get_json(url).await?;
        Ok(history
            .titles
            .into_iter()
            .map(|title| match title.title_history {
                Some(history) => TitleRecord::new(title.name, history.last_time_played),
                None => TitleRecord::unplayed(title.name),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl SignalFetcher for XboxLiveClient {
    async fn fetch_signals(
        &self,
        player: &PlayerIdentity,
        include_profile: bool,
    ) -> AutomodResult<IdentitySignals> {
        let (game_score, reputation) = if include_profile {
            let (score, reputation) = self.profile_settings(&player.xuid).await?;
            (Some(score), Some(reputation))
        } else {
            (None, None)
        };
        let titles = self.title_history(&player.xuid).await?;

        Ok(IdentitySignals {
            game_score,
            reputation,
            titles,
        })
    }
}

#[async_trait::async_trait]
impl GamertagResolver for XboxLiveClient {
    async fn resolve_gamertag(&self, gamertag: &str) -> AutomodResult<String> {
        let mut url = endpoint(
            &self.endpoints.profile,
            &["users", &format!("gt({gamertag})"), "profile", "settings"],
        )?;
        url.query_pairs_mut().append_pair("settings", "Gamertag");

        let profile: ProfileResponse = self.get_json(url).await?;
        profile
            .profile_users
            .into_iter()
            .next()
            .map(|user| user.id)
            .ok_or_else(|| AutomodError::PlayerNotFound(gamertag.to_string()))
    }
}

#[async_trait::async_trait]
impl DirectMessenger for XboxLiveClient {
    async fn send_message(&self, xuid: &str, text: &str) -> AutomodResult<()> {
        let url = endpoint(
            &self.endpoints.messaging,
            &[
                "network",
                "xbox",
                "users",
                "me",
                "conversations",
                "users",
                &format!("xuid({xuid})"),
            ],
        )?;
        let body = serde_json::json!({
            "parts": [
                {
                    "text": text,
                    "contentType": "text",
                    "version": 0,
                }
            ]
        });

        debug!("POST {url}");
        let response = self
            .http
            .post(url)
            .headers(self.headers().await?)
            .json(&body)
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }
}

/// Append path segments to a base URL, percent-encoding each one
fn endpoint(base: &str, segments: &[&str]) -> AutomodResult<Url> {
    let mut url =
        Url::parse(base).map_err(|e| AutomodError::Config(format!("Invalid URL {base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| AutomodError::Config(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Map provider status codes onto the error taxonomy
fn check_status(response: Response) -> AutomodResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AutomodError::Auth(format!(
            "{} rejected the credential ({status})",
            response.url()
        ))),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            Err(AutomodError::RateLimited { retry_after })
        }
        _ => Err(AutomodError::Network(format!(
            "{} returned {status}",
            response.url()
        ))),
    }
}
