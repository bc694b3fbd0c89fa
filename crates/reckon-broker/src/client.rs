use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::signer::RequestSigner;
use crate::wire::Envelope;
use crate::BrokerError;

pub const DEFAULT_BASE_URL: &str = "https://openapi.blofin.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Paged read access to the exchange feeds.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// GET `path` with `query` and return the raw records of the `data` array.
    async fn get_page(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Vec<Value>, BrokerError>;
}

/// Signed REST client.
///
/// Credentials live in the signer; never log them.
#[derive(Clone)]
pub struct HttpBrokerClient {
    http: reqwest::Client,
    base_url: String,
    signer: Arc<dyn RequestSigner>,
}

impl HttpBrokerClient {
    pub fn new(signer: Arc<dyn RequestSigner>) -> Result<Self, BrokerError> {
        Self::new_with_base_url(signer, DEFAULT_BASE_URL.to_string(), DEFAULT_TIMEOUT)
    }

    pub fn new_with_base_url(
        signer: Arc<dyn RequestSigner>,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, BrokerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::Transport(format!("client build failed: {e}")))?;
        Ok(Self {
            http,
            base_url,
            signer,
        })
    }

    /// The query string is part of the signed path, so it is rendered here
    /// rather than by reqwest.
    fn path_with_query(path: &str, query: &[(String, String)]) -> String {
        if query.is_empty() {
            return path.to_string();
        }
        let qs: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{path}?{}", qs.join("&"))
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn get_page(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Vec<Value>, BrokerError> {
        let signed_path = Self::path_with_query(path, query);
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), signed_path);

        let mut req = self.http.get(url);
        for (name, value) in self.signer.sign("GET", &signed_path, "")? {
            req = req.header(name, value);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(BrokerError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope =
            serde_json::from_str(&body).map_err(|e| BrokerError::Decode(e.to_string()))?;
        let records = envelope.into_records()?;
        tracing::debug!(path, records = records.len(), "broker page fetched");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_rendered_in_given_order() {
        let q = vec![
            ("before".to_string(), "1000".to_string()),
            ("limit".to_string(), "20".to_string()),
        ];
        assert_eq!(
            HttpBrokerClient::path_with_query("/api/v1/trade/orders-history", &q),
            "/api/v1/trade/orders-history?before=1000&limit=20"
        );
        assert_eq!(HttpBrokerClient::path_with_query("/x", &[]), "/x");
    }
}
