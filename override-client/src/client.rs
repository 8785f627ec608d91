use reqwest::{Client, Url};
use serde_json::json;
use tracing::debug;

use crate::{
    config::ClientConfig,
    error::Error,
    types::{BatchEntry, FileOverride},
};

/// Client for the editing service's batched query endpoint
pub struct OverrideClient {
    client: Client,
    config: ClientConfig,
}

impl OverrideClient {
    /// Create a new OverrideClient with the given configuration
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        Url::parse(&config.api_url)
            .map_err(|e| Error::Configuration(format!("invalid api_url {}: {}", config.api_url, e)))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::HttpClient)?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Fetch every unpublished file of an override set in one request
    pub async fn fetch_overrides(&self, override_set_id: &str) -> Result<Vec<FileOverride>, Error> {
        let input = json!({ "0": { "json": { "branchId": override_set_id } } }).to_string();
        let url = format!(
            "{}/trpc/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.procedure
        );

        debug!("Fetching overrides for {} from {}", override_set_id, url);

        let response = self
            .client
            .get(url)
            .query(&[("batch", "1"), ("input", input.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Api {
                status_code: response.status().as_u16(),
                message: response.text().await?,
            });
        }

        let body = response.text().await?;
        let overrides = self.parse_batch(&body)?;
        debug!(
            "Override set {} contains {} file(s)",
            override_set_id,
            overrides.len()
        );
        Ok(overrides)
    }

    fn parse_batch(&self, body: &str) -> Result<Vec<FileOverride>, Error> {
        let entries: Vec<BatchEntry> =
            serde_json::from_str(body).map_err(|e| Error::MalformedResponse(e.to_string()))?;

        match entries.into_iter().next() {
            Some(BatchEntry::Result { result }) => Ok(result.data.json),
            Some(BatchEntry::Error { error }) => Err(Error::Procedure {
                procedure: self.config.procedure.clone(),
                message: match error.json.code {
                    Some(code) => format!("{} (code {})", error.json.message, code),
                    None => error.json.message,
                },
            }),
            None => Err(Error::MalformedResponse("empty batch response".into())),
        }
    }
}
