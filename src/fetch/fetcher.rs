//! The Armory fetcher
//!
//! One `ArmoryFetcher` owns one HTTP session: a cookie-enabled client that
//! probes the login-status page once and reuses the resulting session
//! cookie for every later request. Responses travel gzip-compressed; the
//! compressed payload is what the shared cache stores, and decompression
//! happens on every read so cached and fresh responses take the same path.

use crate::cache::CacheStore;
use crate::fetch::{BackoffPolicy, Fetch, FetchError};
use async_trait::async_trait;
use flate2::read::GzDecoder;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::{Client, StatusCode};
use std::io::Read;
use std::time::Duration;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Builds the cookie-holding HTTP client one fetcher (and therefore one
/// worker) owns.
///
/// Automatic decompression stays off: the wire payload is cached as-is, so
/// the client must hand back the raw gzip bytes.
pub fn build_http_client(user_agent: &str) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

    Client::builder()
        .user_agent(user_agent.to_string())
        .default_headers(headers)
        .cookie_store(true)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .build()
}

/// Decompresses a raw wire payload.
///
/// Payloads without the gzip magic bytes pass through unchanged; the
/// upstream occasionally answers identity-encoded and the caller cannot
/// tell the difference after the fact.
pub fn decompress_payload(url: &str, payload: &[u8]) -> Result<Vec<u8>, FetchError> {
    if !payload.starts_with(&GZIP_MAGIC) {
        return Ok(payload.to_vec());
    }

    let mut decoded = Vec::new();
    GzDecoder::new(payload)
        .read_to_end(&mut decoded)
        .map_err(|e| FetchError::Payload {
            url: url.to_string(),
            message: format!("gzip decode failed: {}", e),
        })?;
    Ok(decoded)
}

/// How a single request attempt failed, before retry policy is applied.
enum RawFailure {
    /// HTTP 404: permanent, never retried.
    NotFound,
    /// Request timeout: retried indefinitely at unchanged parameters.
    /// See DESIGN.md for why this differs from other transient failures.
    Timeout(String),
    /// Any other HTTP or transport failure: retried within the budget.
    Transient(String),
}

/// A fetcher bound to one session, one cache handle and one backoff policy.
pub struct ArmoryFetcher {
    client: Client,
    cache: CacheStore,
    policy: BackoffPolicy,
    session_probe: Option<String>,
    session_ready: bool,
}

impl ArmoryFetcher {
    /// Creates a fetcher around an already-built client.
    ///
    /// `session_probe` is the login-status URL fetched once, lazily, before
    /// the first real request so the session cookie exists. `None` skips
    /// the probe (tests, and hosts without a login endpoint).
    pub fn new(
        client: Client,
        cache: CacheStore,
        policy: BackoffPolicy,
        session_probe: Option<String>,
    ) -> Self {
        Self {
            client,
            cache,
            policy,
            session_probe,
            session_ready: false,
        }
    }

    /// Fires the session probe once. Best effort: a probe failure is logged
    /// and the fetcher carries on without a cookie rather than wedging the
    /// whole worker.
    async fn ensure_session(&mut self) {
        if self.session_ready {
            return;
        }
        self.session_ready = true;

        let Some(probe) = self.session_probe.clone() else {
            return;
        };

        match self.request(&probe).await {
            Ok(_) => tracing::debug!("established armory session via {}", probe),
            Err(_) => tracing::warn!("session probe {} failed, continuing without cookie", probe),
        }
    }

    /// Performs one GET attempt, classifying failures for the retry loop.
    async fn request(&self, url: &str) -> Result<Vec<u8>, RawFailure> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                RawFailure::Timeout(e.to_string())
            } else {
                RawFailure::Transient(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(RawFailure::NotFound);
        }
        if !status.is_success() {
            return Err(RawFailure::Transient(format!("HTTP {}", status)));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                RawFailure::Timeout(e.to_string())
            } else {
                RawFailure::Transient(e.to_string())
            }
        })?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Fetch for ArmoryFetcher {
    async fn fetch(&mut self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(hit) = self.cache.get(url) {
            tracing::debug!("returning cached version of {}", url);
            return decompress_payload(url, &hit);
        }

        self.ensure_session().await;

        tracing::debug!("downloading {}", url);
        let mut schedule = self.policy.schedule();

        loop {
            match self.request(url).await {
                Ok(raw) => {
                    let body = decompress_payload(url, &raw)?;
                    // Only successful payloads are cached, and they are
                    // cached compressed.
                    self.cache.put(url, raw);
                    tracing::debug!("downloaded {}", url);
                    return Ok(body);
                }
                Err(RawFailure::NotFound) => {
                    tracing::warn!("download failed, got HTTP 404: {}", url);
                    return Err(FetchError::NotFound {
                        url: url.to_string(),
                    });
                }
                Err(RawFailure::Timeout(e)) => {
                    tracing::warn!("timed out fetching {}: {}, retrying", url, e);
                }
                Err(RawFailure::Transient(e)) => match schedule.next_delay() {
                    Some(delay) => {
                        tracing::warn!(
                            "download failed ({}), sleeping {:?} before retry: {}",
                            e,
                            delay,
                            url
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::warn!("retry budget exhausted for {}", url);
                        return Err(FetchError::Unavailable {
                            url: url.to_string(),
                            attempts: self.policy.attempts,
                        });
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client("ArmorySpyder/0.1 (+https://example.com)").is_ok());
    }

    #[test]
    fn test_decompress_gzip_payload() {
        let compressed = gzip(b"<?xml version=\"1.0\"?><page/>");
        let decoded = decompress_payload("http://example.com/p.xml", &compressed).unwrap();
        assert_eq!(decoded, b"<?xml version=\"1.0\"?><page/>");
    }

    #[test]
    fn test_identity_payload_passes_through() {
        let decoded = decompress_payload("http://example.com/p.xml", b"<page/>").unwrap();
        assert_eq!(decoded, b"<page/>");
    }

    #[test]
    fn test_corrupt_gzip_is_payload_error() {
        // Gzip magic followed by garbage.
        let corrupt = vec![0x1f, 0x8b, 0xff, 0x00, 0x13];
        let err = decompress_payload("http://example.com/p.xml", &corrupt).unwrap_err();
        assert!(matches!(err, FetchError::Payload { .. }));
    }

    // Network behavior (retry, 404 short-circuit, cache interplay) is
    // covered against a mock server in tests/fetcher_tests.rs.
}
