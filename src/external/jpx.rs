use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, PRAGMA, REFERER};
use reqwest::Client;
use tracing::debug;

use crate::config::ImporterConfig;
use crate::external::option_chain_source::{OptionChainSource, OptionChainSourceError};
use crate::models::ExpiryBucket;

/// Fetches the Nikkei 225 options pages published for JPX.
pub struct JpxOptionChainProvider {
    client: Client,
    base_url: String,
}

impl JpxOptionChainProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, OptionChainSourceError> {
        let base_url = base_url.into();

        let mut headers = HeaderMap::new();
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        // The site serves a stale page unless the request looks like in-site navigation
        let referer = HeaderValue::from_str(&bucket_url(&base_url, ExpiryBucket::MonthAfter))
            .map_err(|e| OptionChainSourceError::BadResponse(format!("invalid base url: {}", e)))?;
        headers.insert(REFERER, referer);

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| OptionChainSourceError::Network(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &ImporterConfig) -> Result<Self, OptionChainSourceError> {
        Self::new(config.base_url.clone(), config.http_timeout)
    }
}

pub fn bucket_url(base_url: &str, bucket: ExpiryBucket) -> String {
    format!("{}{}", base_url, bucket.path_suffix())
}

#[async_trait]
impl OptionChainSource for JpxOptionChainProvider {
    async fn fetch_html(&self, bucket: ExpiryBucket) -> Result<String, OptionChainSourceError> {
        let url = bucket_url(&self.base_url, bucket);
        debug!("fetching {} option chain from {}", bucket, url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| OptionChainSourceError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(OptionChainSourceError::BadResponse(format!(
                "{} returned status: {}",
                url,
                resp.status()
            )));
        }

        resp.text()
            .await
            .map_err(|e| OptionChainSourceError::Network(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_urls() {
        let base = "https://svc.qri.jp/jpx/nkopm/";
        assert_eq!(bucket_url(base, ExpiryBucket::NearbyMonth), "https://svc.qri.jp/jpx/nkopm/");
        assert_eq!(bucket_url(base, ExpiryBucket::NextMonth), "https://svc.qri.jp/jpx/nkopm/1");
        assert_eq!(bucket_url(base, ExpiryBucket::MonthAfter), "https://svc.qri.jp/jpx/nkopm/2");
    }

    #[test]
    fn test_provider_builds_with_default_base_url() {
        let provider = JpxOptionChainProvider::new(
            crate::config::DEFAULT_BASE_URL,
            Duration::from_secs(5),
        );
        assert!(provider.is_ok());
    }
}
