//! HTTP price service client
//!
//! Fetches prices from a JSON endpoint laid out as `GET {base_url}/{item_code}`,
//! answering with a body such as `{"item_code": "APPLE", "price": 1.5}`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{validate_price, PriceService, ServiceError};

/// Body returned by the price endpoint
#[derive(Debug, Deserialize)]
struct PriceResponse {
    /// Item code echoed back by the service, if it sends one
    item_code: Option<String>,
    /// Current price
    price: f64,
}

/// Client for a remote price service
#[derive(Debug, Clone)]
pub struct HttpPriceService {
    client: Client,
    base_url: String,
}

impl HttpPriceService {
    /// Creates a client for the service rooted at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Creates a client reusing an existing HTTP client
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Builds the lookup URL for an item code
    fn price_url(&self, item_code: &str) -> String {
        format!("{}/{}", self.base_url, urlencoded(item_code))
    }

    /// Parses a response body into a validated price for `item_code`
    fn parse_body(text: &str, item_code: &str) -> Result<f64, ServiceError> {
        let response: PriceResponse = serde_json::from_str(text)?;
        if let Some(returned) = response.item_code {
            if returned != item_code {
                return Err(ServiceError::ItemMismatch {
                    requested: item_code.to_string(),
                    returned,
                });
            }
        }
        validate_price(response.price)
    }
}

#[async_trait]
impl PriceService for HttpPriceService {
    async fn get_price_for(&self, item_code: &str) -> Result<f64, ServiceError> {
        let url = self.price_url(item_code);
        debug!(%url, "requesting price");

        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(ServiceError::UnknownItem(item_code.to_string())),
            status if !status.is_success() => return Err(ServiceError::Status(status.as_u16())),
            _ => {}
        }

        let text = response.text().await?;
        Self::parse_body(&text, item_code)
    }
}

/// Percent-encodes the characters that would break a path segment
fn urlencoded(s: &str) -> String {
    s.replace('%', "%25")
        .replace(' ', "%20")
        .replace('/', "%2F")
        .replace('?', "%3F")
        .replace('#', "%23")
}
