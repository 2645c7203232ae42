/*
 *  tibber.rs
 *
 *  PriceRing - see the price coming
 *	(c) 2020-26 Stuart Hunter
 *
 *	Tibber GraphQL price client and the periodic price poller
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */
use serde_json::{json, Error as JsonError};
use reqwest::{Client, header};
use std::fmt::{self, Display};
use std::time::Duration;
use log::{debug, info, error, warn};
use rand::Rng;

use flate2::read::GzDecoder;
use std::io::Read;

use crate::prices::{PriceDocument, SnapshotWriter};
use crate::store::SharedStore;
use crate::tasks::TaskHandle;

pub const DEFAULT_API_URL: &str = "https://api.tibber.com/v1-beta/gql";

const PRICE_FIELDS: &str = "total energy level startsAt";

const MAX_ATTEMPTS: u8 = 3;

/// Custom error type for price API operations.
#[derive(Debug)]
pub enum TibberApiError {
    HttpRequestError(reqwest::Error),
    DeserializationError(JsonError),
    /// The response carried GraphQL `errors`
    ApiError(String),
    ApiKeyError(String),
    MissingData(String),
}

impl Display for TibberApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TibberApiError::HttpRequestError(e) => write!(f, "HTTP request error: {}", e),
            TibberApiError::DeserializationError(e) => write!(f, "JSON deserialization error: {}", e),
            TibberApiError::ApiError(msg) => write!(f, "Tibber API error: {}", msg),
            TibberApiError::ApiKeyError(msg) => write!(f, "Tibber API token required: {}", msg),
            TibberApiError::MissingData(msg) => write!(f, "Missing price data: {}", msg),
        }
    }
}

impl std::error::Error for TibberApiError {}

impl From<reqwest::Error> for TibberApiError {
    fn from(err: reqwest::Error) -> Self {
        TibberApiError::HttpRequestError(err)
    }
}

impl From<JsonError> for TibberApiError {
    fn from(err: JsonError) -> Self {
        TibberApiError::DeserializationError(err)
    }
}

/// GraphQL query for every home with address and price info.
pub fn price_query() -> String {
    format!(
        "{{ viewer {{ homes {{ id appNickname address {{ address1 postalCode city }} \
         currentSubscription {{ priceInfo {{ current {{ {f} }} today {{ {f} }} tomorrow {{ {f} }} }} }} }} }} }}",
        f = PRICE_FIELDS
    )
}

/// Bodies may arrive gzip compressed or plain.
fn decode_body(raw: &[u8]) -> String {
    let mut decoder = GzDecoder::new(raw);
    let mut decoded = String::new();
    match decoder.read_to_string(&mut decoded) {
        Ok(_) => decoded,
        Err(_) => String::from_utf8_lossy(raw).to_string(),
    }
}

/// Parses a response body, surfacing GraphQL errors and empty documents.
pub fn parse_document(body: &str) -> Result<PriceDocument, TibberApiError> {
    let document: PriceDocument = serde_json::from_str(body)?;
    if let Some(errors) = document.errors.as_ref().filter(|e| !e.is_empty()) {
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        return Err(TibberApiError::ApiError(messages.join("; ")));
    }
    if document.data.as_ref().and_then(|d| d.viewer.as_ref()).is_none() {
        return Err(TibberApiError::MissingData("response has no viewer".to_string()));
    }
    Ok(document)
}

#[derive(Debug, Clone)]
pub struct TibberClient {
    api_url: String,
    client: Client,
}

impl TibberClient {
    pub fn new(api_url: &str, api_token: &str) -> Result<Self, TibberApiError> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        if api_token.trim().is_empty() {
            return Err(TibberApiError::ApiKeyError("no token specified".to_string()));
        }
        let bearer = header::HeaderValue::from_str(&format!("Bearer {}", api_token.trim()))
            .map_err(|_| TibberApiError::ApiKeyError("token is not a valid header value".to_string()))?;

        let mut headers = header::HeaderMap::new();
        headers.insert("User-Agent", header::HeaderValue::from_static(VERSION));
        headers.insert("Content-Type", header::HeaderValue::from_static("application/json"));
        headers.insert("Accept", header::HeaderValue::from_static("application/json"));
        headers.insert("Authorization", bearer);

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .default_headers(headers)
            .timeout(Duration::from_secs(20))
            .build()?;

        Ok(Self {
            api_url: api_url.to_string(),
            client,
        })
    }

    async fn send_with_retries(&self, body: &serde_json::Value, max_attempts: u8) -> Result<String, reqwest::Error> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = async {
                let response = self.client.post(&self.api_url).json(body).send().await?;
                response.error_for_status_ref()?;
                response.bytes().await
            }
            .await;
            match result {
                Ok(raw) => return Ok(decode_body(&raw)),
                Err(e) => {
                    if attempt >= max_attempts {
                        return Err(e);
                    }
                    let pause = Duration::from_millis(500 + rand::rng().random_range(0..1000));
                    warn!("Price request failed (attempt {}): {}, retrying in {:?}", attempt, e, pause);
                    tokio::time::sleep(pause).await;
                }
            }
        }
    }

    /// Fetches the full price document for every home on the account.
    pub async fn fetch_prices(&self) -> Result<PriceDocument, TibberApiError> {
        debug!("Fetching prices from {}", self.api_url);
        let body = json!({ "query": price_query() });
        let plain = self.send_with_retries(&body, MAX_ATTEMPTS).await?;
        parse_document(&plain)
    }
}

/// Periodic fetch into the snapshot channel.
pub struct PricePoller {
    client: TibberClient,
    writer: SnapshotWriter,
    store: Option<SharedStore>,
}

impl PricePoller {
    pub fn new(client: TibberClient, writer: SnapshotWriter) -> Self {
        Self { client, writer, store: None }
    }

    /// Also keep the last good document in the state store.
    pub fn with_store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    async fn poll_once(&self) {
        match self.client.fetch_prices().await {
            Ok(document) => {
                let homes = document.homes().len();
                if let Some(store) = self.store.as_ref() {
                    let mut store = store.lock().await;
                    store.set_cached_prices(document.clone());
                    if let Err(e) = store.save().await {
                        error!("Failed to cache prices: {}", e);
                    }
                }
                let version = self.writer.publish(document);
                info!("Price polling successful: {} home(s), snapshot v{}", homes, version);
            }
            // keep serving the previous snapshot
            Err(e) => error!("Price polling failed: {}", e),
        }
    }

    /// Fetches straight away, then every `interval` until stopped.
    pub fn start(self, interval: Duration) -> TaskHandle {
        TaskHandle::spawn("price poller", move |mut stop_rx| async move {
            self.poll_once().await;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        self.poll_once().await;
                    }
                    _ = stop_rx.recv() => {
                        info!("Price polling received stop signal. Exiting.");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    const BODY: &str = r#"{"data":{"viewer":{"homes":[{"id":"h1","appNickname":"Home",
        "currentSubscription":{"priceInfo":{"current":null,
        "today":[{"total":2.1,"energy":1.2,"level":"EXPENSIVE","startsAt":"2024-03-14T00:00:00.000+01:00"}],
        "tomorrow":[]}}}]}}}"#;

    #[test]
    fn test_query_shape() {
        let q = price_query();
        assert!(q.starts_with("{ viewer { homes { id appNickname"));
        assert!(q.contains("today { total energy level startsAt }"));
        assert!(q.contains("tomorrow { total energy level startsAt }"));
        assert_eq!(q.matches('{').count(), q.matches('}').count());
    }

    #[test]
    fn test_parse_document() {
        let doc = parse_document(BODY).unwrap();
        let series = doc.series_for("h1").unwrap();
        assert_eq!(series.today.len(), 1);
        assert_eq!(series.today[0].total, 2.1);
    }

    #[test]
    fn test_graphql_errors_surface() {
        let body = r#"{"data":null,"errors":[{"message":"invalid token"},{"message":"try again"}]}"#;
        match parse_document(body) {
            Err(TibberApiError::ApiError(msg)) => assert_eq!(msg, "invalid token; try again"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(parse_document(r#"{"data":{}}"#), Err(TibberApiError::MissingData(_))));
        assert!(matches!(parse_document("<html>"), Err(TibberApiError::DeserializationError(_))));
    }

    #[test]
    fn test_gzip_fallback() {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(BODY.as_bytes()).unwrap();
        let zipped = enc.finish().unwrap();
        assert_eq!(decode_body(&zipped), BODY);
        assert_eq!(decode_body(BODY.as_bytes()), BODY);
    }

    #[test]
    fn test_token_required() {
        assert!(matches!(TibberClient::new(DEFAULT_API_URL, "  "), Err(TibberApiError::ApiKeyError(_))));
        assert!(TibberClient::new(DEFAULT_API_URL, "abc123").is_ok());
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_snapshot() {
        let (writer, rx) = crate::prices::snapshot_channel(Some(parse_document(BODY).unwrap()));
        // nothing listens on port 9 locally
        let client = TibberClient::new("http://127.0.0.1:9/gql", "token").unwrap();
        let poller = PricePoller::new(client, writer);
        poller.poll_once().await;
        assert_eq!(rx.borrow().version, 1);
        assert!(rx.borrow().series_for(Some("h1")).is_some());
    }
}
