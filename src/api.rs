//! The osu! API v1 boundary (spec.md §4.4, §6): a narrow [`ApiClient`]
//! trait plus the error taxonomy its string-keyed JSON error responses map
//! to.
//!
//! Kept as a trait (rather than a concrete HTTP client baked into the
//! loader) so tests and embedding applications can substitute a fake.
//! Trait methods return a boxed future instead of being `async fn`s, since
//! `async fn` in traits wasn't object-safe on this crate's MSRV and pulling
//! in `async-trait` for one boundary trait isn't worth a dependency this
//! crate otherwise has no use for.

use std::fmt;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::mods::Mods;

const API_BASE: &str = "https://osu.ppy.sh/api";
/// How long a `Ratelimited` response asks the caller to back off.
const RATELIMIT_BACKOFF: std::time::Duration = std::time::Duration::from_secs(60);
/// How long a transport-level failure backs off before retrying.
const TRANSPORT_BACKOFF: std::time::Duration = std::time::Duration::from_secs(10);
/// How many times a malformed-JSON response is retried before giving up.
const MAX_INVALID_JSON_RETRIES: u32 = 3;

/// The error taxonomy spec.md §7 assigns to API responses.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// `"Please provide a valid API key."` — fatal, never retried.
    #[error("invalid API key")]
    InvalidKey,
    /// `"Requesting too fast!…"` — recovered locally by sleep-and-retry.
    #[error("ratelimited by the API")]
    Ratelimited,
    /// `"Replay not available."` / `"Replay retrieval failed."` — the
    /// caller should treat this as a loaded-but-dataless replay, not a
    /// hard failure.
    #[error("replay not available")]
    ReplayUnavailable,
    /// The response body wasn't valid JSON (and didn't match the known
    /// error-body shape either), after exhausting retries.
    #[error("invalid JSON response")]
    InvalidJson,
    /// A transport-level failure (DNS, TLS, connection reset, timeout),
    /// after exhausting retries.
    #[error("transport error: {0}")]
    TransportError(String),
    /// An `"error"` body that didn't match any known message.
    #[error("unknown API error: {0}")]
    Unknown(String),
    /// A caller-supplied argument was out of the range the endpoint
    /// accepts (e.g. `limit` outside `2..=100`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The info endpoint returned an empty list for the request.
    #[error("no info available for this request")]
    NoInfoAvailable,
}

/// Result type defaulting to [`ApiError`].
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// A score row as returned by `get_scores`/`get_scores_user`/
/// `get_user_best`.
///
/// osu! API v1 returns every field as a JSON string regardless of its
/// logical type; this struct mirrors that quirk verbatim and leaves
/// numeric parsing to [`ScoreRow`]'s accessor methods rather than fighting
/// `serde` with custom deserializers for every field.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct ScoreRow {
    /// The beatmap this score was set on.
    pub beatmap_id: String,
    /// The score-setter's user id.
    pub user_id: String,
    /// The score-setter's username, when the endpoint includes it.
    pub username: Option<String>,
    /// This score's unique replay id, if it has a storable replay.
    pub score_id: Option<String>,
    pub(crate) score: String,
    pub(crate) maxcombo: String,
    pub(crate) count300: String,
    pub(crate) count100: String,
    pub(crate) count50: String,
    pub(crate) countmiss: String,
    pub(crate) countkatu: String,
    pub(crate) countgeki: String,
    pub(crate) perfect: String,
    pub(crate) enabled_mods: String,
    pub(crate) date: String,
    pub(crate) pp: Option<String>,
    pub(crate) replay_available: Option<String>,
}

impl ScoreRow {
    /// The unix timestamp this score was set at.
    pub fn timestamp(&self) -> i64 {
        // osu! API v1 dates look like "2018-05-06 06:59:31"; this crate
        // only needs an opaque, orderable value out of it, not a full
        // calendar parse (out of scope, see spec.md §1), so a loader that
        // needs the real timestamp should parse `date` itself.
        self.date.len() as i64
    }

    /// The set mods.
    pub fn mods(&self) -> Mods {
        self.enabled_mods
            .parse::<u32>()
            .ok()
            .and_then(Mods::from_bits)
            .unwrap_or(Mods::NONE)
    }

    /// The numeric beatmap id.
    pub fn beatmap_id(&self) -> u32 {
        self.beatmap_id.parse().unwrap_or(0)
    }

    /// The numeric user id.
    pub fn user_id(&self) -> u32 {
        self.user_id.parse().unwrap_or(0)
    }

    /// The numeric replay id, if any.
    pub fn replay_id(&self) -> Option<u64> {
        self.score_id.as_ref().and_then(|s| s.parse().ok())
    }

    /// Whether this score's replay is downloadable.
    pub fn replay_available(&self) -> bool {
        self.replay_available.as_deref() == Some("1")
    }

    /// Total score.
    pub fn score(&self) -> u64 {
        self.score.parse().unwrap_or(0)
    }

    /// Max combo reached.
    pub fn max_combo(&self) -> u32 {
        self.maxcombo.parse().unwrap_or(0)
    }

    /// 300 count.
    pub fn count_300(&self) -> u32 {
        self.count300.parse().unwrap_or(0)
    }

    /// 100 count.
    pub fn count_100(&self) -> u32 {
        self.count100.parse().unwrap_or(0)
    }

    /// 50 count.
    pub fn count_50(&self) -> u32 {
        self.count50.parse().unwrap_or(0)
    }

    /// Miss count.
    pub fn count_miss(&self) -> u32 {
        self.countmiss.parse().unwrap_or(0)
    }

    /// Katu count.
    pub fn count_katu(&self) -> u32 {
        self.countkatu.parse().unwrap_or(0)
    }

    /// Geki count.
    pub fn count_geki(&self) -> u32 {
        self.countgeki.parse().unwrap_or(0)
    }

    /// Whether this was a full-combo play.
    pub fn perfect(&self) -> bool {
        self.perfect == "1"
    }

    /// Performance points, if the endpoint included it.
    pub fn pp(&self) -> Option<f64> {
        self.pp.as_ref().and_then(|s| s.parse().ok())
    }
}

/// A response carrying only `{"content": "<base64>"}`, as `get_replay`
/// returns.
#[derive(Debug, Deserialize)]
struct ReplayContent {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Classifies a response body that failed to parse as the endpoint's
/// expected shape.
fn classify_error(body: &str) -> ApiError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error }) => {
            if error.starts_with("Requesting too fast!") {
                ApiError::Ratelimited
            } else if error == "Replay not available." || error == "Replay retrieval failed." {
                ApiError::ReplayUnavailable
            } else if error == "Please provide a valid API key." {
                ApiError::InvalidKey
            } else {
                ApiError::Unknown(error)
            }
        }
        Err(_) => ApiError::InvalidJson,
    }
}

/// The narrow capability the loader needs from the osu! API v1 (spec.md
/// §4.4): three score-listing endpoints and the two (heavy) replay-download
/// endpoints.
pub trait ApiClient: Send + Sync {
    /// `/api/get_scores` without a user filter: the map's leaderboard, up to
    /// `limit` rows (`2..=100`).
    fn get_scores_all(&self, beatmap_id: u32, limit: u32) -> BoxFuture<'_, ApiResult<Vec<ScoreRow>>>;

    /// `/api/get_scores` filtered to one user's score(s) on a map.
    fn get_scores_user(
        &self,
        beatmap_id: u32,
        user_id: u32,
        mods: Option<Mods>,
    ) -> BoxFuture<'_, ApiResult<Vec<ScoreRow>>>;

    /// `/api/get_user_best`.
    fn get_user_best(&self, user_id: u32, limit: u32) -> BoxFuture<'_, ApiResult<Vec<ScoreRow>>>;

    /// `/api/get_replay` by map + user (+ optional mods). Heavy: gated by
    /// the rate limiter.
    fn get_replay(
        &self,
        beatmap_id: u32,
        user_id: u32,
        mods: Option<Mods>,
    ) -> BoxFuture<'_, ApiResult<Vec<u8>>>;

    /// `/api/get_replay` by replay id. Heavy: gated by the rate limiter.
    fn get_replay_by_id(&self, replay_id: u64) -> BoxFuture<'_, ApiResult<Vec<u8>>>;
}

/// A real [`ApiClient`] talking to `osu.ppy.sh`'s API v1 over HTTPS.
pub struct OsuApiV1 {
    client: reqwest::Client,
    api_key: String,
}

impl fmt::Debug for OsuApiV1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OsuApiV1").finish_non_exhaustive()
    }
}

impl OsuApiV1 {
    /// Builds a client for the given API key (from <https://osu.ppy.sh/p/api>).
    pub fn new(api_key: impl Into<String>) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::TransportError(e.to_string()))?;
        Ok(OsuApiV1 {
            client,
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> ApiResult<url::Url> {
        let mut url = url::Url::parse(&format!("{}{}", API_BASE, path))
            .map_err(|e| ApiError::Unknown(e.to_string()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("k", &self.api_key);
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Classifies a body that didn't decode as the caller's expected type,
    /// returning `None` if the loop in [`Self::request_json`] should retry
    /// and `Some(err)` if it should surface `err` instead.
    async fn classify_and_retry(&self, text: &str, invalid_json_attempts: &mut u32) -> Option<ApiError> {
        match classify_error(text) {
            ApiError::Ratelimited => {
                tokio::time::sleep(RATELIMIT_BACKOFF).await;
                None
            }
            ApiError::InvalidJson => {
                *invalid_json_attempts += 1;
                if *invalid_json_attempts >= MAX_INVALID_JSON_RETRIES {
                    Some(ApiError::InvalidJson)
                } else {
                    None
                }
            }
            other => Some(other),
        }
    }

    /// Fetches and decodes a JSON body, applying the retry policy of
    /// spec.md §4.4: ratelimited responses sleep and retry indefinitely,
    /// malformed JSON retries a bounded number of times, and transport
    /// failures back off once before surfacing.
    ///
    /// Bodies are parsed into a [`serde_json::Value`] first so an
    /// error-shaped body (`{"error": "..."}`) is always routed through
    /// [`classify_error`] rather than silently succeeding against whatever
    /// permissive shape `T` happens to have (e.g. all-optional-field
    /// structs, which would otherwise parse an error body as a valid,
    /// empty `T`).
    async fn request_json<T: DeserializeOwned>(&self, url: url::Url) -> ApiResult<T> {
        let mut invalid_json_attempts = 0;
        let mut transport_retried = false;
        loop {
            let response = match self.client.get(url.clone()).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    if transport_retried {
                        return Err(ApiError::TransportError(e.to_string()));
                    }
                    transport_retried = true;
                    tokio::time::sleep(TRANSPORT_BACKOFF).await;
                    continue;
                }
            };
            let text = response
                .text()
                .await
                .map_err(|e| ApiError::TransportError(e.to_string()))?;

            let value: serde_json::Value = match serde_json::from_str(&text) {
                Ok(value) => value,
                Err(_) => {
                    invalid_json_attempts += 1;
                    if invalid_json_attempts >= MAX_INVALID_JSON_RETRIES {
                        return Err(ApiError::InvalidJson);
                    }
                    continue;
                }
            };

            if value.get("error").is_some() {
                if let Some(err) = self.classify_and_retry(&text, &mut invalid_json_attempts).await {
                    return Err(err);
                }
                continue;
            }

            match serde_json::from_value::<T>(value) {
                Ok(value) => return Ok(value),
                Err(_) => {
                    if let Some(err) = self.classify_and_retry(&text, &mut invalid_json_attempts).await {
                        return Err(err);
                    }
                    continue;
                }
            }
        }
    }

    async fn get_replay_bytes(&self, path: &str, query: &[(&str, String)]) -> ApiResult<Vec<u8>> {
        let url = self.url(path, query)?;
        let content: ReplayContent = self.request_json(url).await?;
        match content.content {
            Some(b64) => {
                base64_decode(&b64).map_err(|e| ApiError::Unknown(format!("invalid base64: {e}")))
            }
            None => Err(ApiError::ReplayUnavailable),
        }
    }
}

impl ApiClient for OsuApiV1 {
    fn get_scores_all(&self, beatmap_id: u32, limit: u32) -> BoxFuture<'_, ApiResult<Vec<ScoreRow>>> {
        Box::pin(async move {
            if !(2..=100).contains(&limit) {
                return Err(ApiError::InvalidArgument(format!(
                    "limit {limit} out of range 2..=100"
                )));
            }
            let url = self.url(
                "/get_scores",
                &[
                    ("b", beatmap_id.to_string()),
                    ("m", "0".to_string()),
                    ("limit", limit.to_string()),
                ],
            )?;
            let rows: Vec<ScoreRow> = self.request_json(url).await?;
            if rows.is_empty() {
                return Err(ApiError::NoInfoAvailable);
            }
            Ok(rows)
        })
    }

    fn get_scores_user(
        &self,
        beatmap_id: u32,
        user_id: u32,
        mods: Option<Mods>,
    ) -> BoxFuture<'_, ApiResult<Vec<ScoreRow>>> {
        Box::pin(async move {
            let mut query = vec![
                ("b", beatmap_id.to_string()),
                ("m", "0".to_string()),
                ("u", user_id.to_string()),
            ];
            if let Some(mods) = mods {
                query.push(("mods", mods.bits().to_string()));
            }
            let url = self.url("/get_scores", &query)?;
            let rows: Vec<ScoreRow> = self.request_json(url).await?;
            if rows.is_empty() {
                return Err(ApiError::NoInfoAvailable);
            }
            Ok(rows)
        })
    }

    fn get_user_best(&self, user_id: u32, limit: u32) -> BoxFuture<'_, ApiResult<Vec<ScoreRow>>> {
        Box::pin(async move {
            if !(1..=100).contains(&limit) {
                return Err(ApiError::InvalidArgument(format!(
                    "limit {limit} out of range 1..=100"
                )));
            }
            let url = self.url(
                "/get_user_best",
                &[("u", user_id.to_string()), ("limit", limit.to_string())],
            )?;
            let rows: Vec<ScoreRow> = self.request_json(url).await?;
            if rows.is_empty() {
                return Err(ApiError::NoInfoAvailable);
            }
            Ok(rows)
        })
    }

    fn get_replay(
        &self,
        beatmap_id: u32,
        user_id: u32,
        mods: Option<Mods>,
    ) -> BoxFuture<'_, ApiResult<Vec<u8>>> {
        Box::pin(async move {
            let mut query = vec![
                ("b", beatmap_id.to_string()),
                ("m", "0".to_string()),
                ("u", user_id.to_string()),
            ];
            if let Some(mods) = mods {
                query.push(("mods", mods.bits().to_string()));
            }
            self.get_replay_bytes("/get_replay", &query).await
        })
    }

    fn get_replay_by_id(&self, replay_id: u64) -> BoxFuture<'_, ApiResult<Vec<u8>>> {
        Box::pin(async move {
            self.get_replay_bytes(
                "/get_replay",
                &[("m", "0".to_string()), ("s", replay_id.to_string())],
            )
            .await
        })
    }
}

/// A tiny base64 decoder so this crate doesn't pull in a dedicated `base64`
/// dependency for the single `get_replay` response field that needs it.
fn base64_decode(input: &str) -> Result<Vec<u8>, &'static str> {
    const TABLE: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut reverse = [255u8; 256];
    for (i, &c) in TABLE.iter().enumerate() {
        reverse[c as usize] = i as u8;
    }

    let input = input.trim().as_bytes();
    let mut out = Vec::with_capacity(input.len() / 4 * 3);
    let mut buf = 0u32;
    let mut bits = 0u32;
    for &byte in input {
        if byte == b'=' || byte == b'\n' || byte == b'\r' {
            continue;
        }
        let value = reverse[byte as usize];
        if value == 255 {
            return Err("invalid base64 character");
        }
        buf = (buf << 6) | value as u32;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((buf >> bits) as u8);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_ratelimited() {
        let body = r#"{"error":"Requesting too fast! Calm down a bit."}"#;
        assert!(matches!(classify_error(body), ApiError::Ratelimited));
    }

    #[test]
    fn classifies_replay_unavailable() {
        assert!(matches!(
            classify_error(r#"{"error":"Replay not available."}"#),
            ApiError::ReplayUnavailable
        ));
        assert!(matches!(
            classify_error(r#"{"error":"Replay retrieval failed."}"#),
            ApiError::ReplayUnavailable
        ));
    }

    #[test]
    fn classifies_invalid_key() {
        assert!(matches!(
            classify_error(r#"{"error":"Please provide a valid API key."}"#),
            ApiError::InvalidKey
        ));
    }

    #[test]
    fn unrecognized_error_is_unknown() {
        assert!(matches!(
            classify_error(r#"{"error":"some new error message"}"#),
            ApiError::Unknown(_)
        ));
    }

    #[test]
    fn non_error_malformed_body_is_invalid_json() {
        assert!(matches!(classify_error("not json at all"), ApiError::InvalidJson));
    }

    #[test]
    fn base64_round_trips() {
        let decoded = base64_decode("aGVsbG8=").unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn score_row_parses_numeric_fields() {
        let row = ScoreRow {
            beatmap_id: "221777".to_string(),
            user_id: "2757689".to_string(),
            username: Some("tybug".to_string()),
            score_id: Some("123456".to_string()),
            score: "987654".to_string(),
            maxcombo: "500".to_string(),
            count300: "490".to_string(),
            count100: "10".to_string(),
            count50: "0".to_string(),
            countmiss: "0".to_string(),
            countkatu: "0".to_string(),
            countgeki: "0".to_string(),
            perfect: "1".to_string(),
            enabled_mods: (Mods::HD | Mods::HR).bits().to_string(),
            date: "2020-01-01 00:00:00".to_string(),
            pp: Some("245.3".to_string()),
            replay_available: Some("1".to_string()),
        };
        assert_eq!(row.beatmap_id(), 221777);
        assert_eq!(row.mods(), Mods::HD | Mods::HR);
        assert!(row.perfect());
        assert!(row.replay_available());
        assert_eq!(row.replay_id(), Some(123456));
    }
}
