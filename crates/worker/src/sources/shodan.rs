//! Shodan host search.

use async_trait::async_trait;
use bigshot_pipeline::{SourceError, SourceProcessor};
use serde::Deserialize;

use super::{keep_subdomains, send_json, SHODAN};

const DEFAULT_BASE_URL: &str = "https://api.shodan.io";

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    matches: Vec<HostMatch>,
}

#[derive(Debug, Default, Deserialize)]
struct HostMatch {
    #[serde(default)]
    hostnames: Vec<String>,
}

pub struct ShodanSource {
    client: reqwest::Client,
    base_url: String,
}

impl ShodanSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

fn extract_names(response: &SearchResponse, domain: &str) -> Vec<String> {
    keep_subdomains(
        response
            .matches
            .iter()
            .flat_map(|m| m.hostnames.iter().map(String::as_str)),
        domain,
    )
}

#[async_trait]
impl SourceProcessor for ShodanSource {
    fn name(&self) -> &str {
        SHODAN
    }

    async fn process(
        &self,
        target: &str,
        api_key: Option<&str>,
    ) -> Result<Vec<String>, SourceError> {
        let Some(api_key) = api_key else {
            tracing::warn!(domain = target, "Shodan API key not configured");
            return Ok(Vec::new());
        };

        let query = format!("hostname:*.{target}");
        let request = self
            .client
            .get(format!("{}/shodan/host/search", self.base_url))
            .query(&[
                ("key", api_key),
                ("query", query.as_str()),
                ("facets", "hostname"),
                ("minify", "true"),
            ]);
        let response: SearchResponse = send_json(request).await?;
        Ok(extract_names(&response, target))
    }
}
