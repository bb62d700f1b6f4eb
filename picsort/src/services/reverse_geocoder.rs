//! Reverse geocoding
//!
//! Coordinates to an ordered, coarse-to-fine place hierarchy
//! (country, region, district, locality). The Nominatim client shares one
//! rate limiter across all workers.

use async_trait::async_trait;
use picsort_common::config::GeocoderConfig;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

/// Reverse geocoder errors
#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// `(latitude, longitude)` to place names, coarse to fine
///
/// An empty list means the service knows no place at that position.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Vec<String>, GeocodeError>;
}

/// Nominatim `reverse` response (only the fields used)
#[derive(Debug, Clone, Default, Deserialize)]
struct NominatimResponse {
    #[serde(default)]
    address: Option<NominatimAddress>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct NominatimAddress {
    country: Option<String>,
    state: Option<String>,
    county: Option<String>,
    state_district: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
}

impl NominatimAddress {
    fn hierarchy(self) -> Vec<String> {
        let locality = self.city.or(self.town).or(self.village);
        [
            self.country,
            self.state.or(self.county),
            self.state_district,
            locality,
        ]
        .into_iter()
        .flatten()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
    }
}

/// Rate limiter enforcing a minimum spacing between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with rate limit
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// OpenStreetMap Nominatim client
pub struct NominatimGeocoder {
    http_client: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GeocodeError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::new(config.min_interval_ms),
        })
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Vec<String>, GeocodeError> {
        self.rate_limiter.wait().await;

        let url = format!(
            "{}/reverse?format=jsonv2&lat={}&lon={}",
            self.base_url, latitude, longitude
        );
        tracing::debug!(url = %url, "Querying Nominatim");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeocodeError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == 429 || status == 503 {
            return Err(GeocodeError::RateLimitExceeded);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GeocodeError::ApiError(status.as_u16(), error_text));
        }

        let body: NominatimResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::ParseError(e.to_string()))?;

        if let Some(error) = body.error {
            tracing::debug!(latitude, longitude, error = %error, "No place at position");
            return Ok(Vec::new());
        }

        let hierarchy = body.address.map(NominatimAddress::hierarchy).unwrap_or_default();
        tracing::debug!(latitude, longitude, place = %hierarchy.join("/"), "Reverse geocoded");
        Ok(hierarchy)
    }
}
