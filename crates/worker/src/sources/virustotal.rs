//! VirusTotal v2 domain report.

use async_trait::async_trait;
use bigshot_pipeline::{SourceError, SourceProcessor};
use serde::Deserialize;

use super::{keep_subdomains, send_json, VIRUSTOTAL};

const DEFAULT_BASE_URL: &str = "https://www.virustotal.com/vtapi/v2";

#[derive(Debug, Default, Deserialize)]
struct DomainReport {
    #[serde(default)]
    subdomains: Vec<String>,
    #[serde(default)]
    detected_urls: Vec<DetectedUrl>,
}

#[derive(Debug, Deserialize)]
struct DetectedUrl {
    #[serde(default)]
    url: String,
}

pub struct VirusTotalSource {
    client: reqwest::Client,
    base_url: String,
}

impl VirusTotalSource {
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

/// Names from the `subdomains` list plus the hosts of detected URLs.
fn extract_names(report: &DomainReport, domain: &str) -> Vec<String> {
    let hosts: Vec<String> = report
        .detected_urls
        .iter()
        .filter_map(|detected| reqwest::Url::parse(&detected.url).ok())
        .filter_map(|url| url.host_str().map(str::to_string))
        .collect();

    keep_subdomains(
        report
            .subdomains
            .iter()
            .map(String::as_str)
            .chain(hosts.iter().map(String::as_str)),
        domain,
    )
}

#[async_trait]
impl SourceProcessor for VirusTotalSource {
    fn name(&self) -> &str {
        VIRUSTOTAL
    }

    async fn process(
        &self,
        target: &str,
        api_key: Option<&str>,
    ) -> Result<Vec<String>, SourceError> {
        let Some(api_key) = api_key else {
            tracing::warn!(domain = target, "VirusTotal API key not configured");
            return Ok(Vec::new());
        };

        let request = self
            .client
            .get(format!("{}/domain/report", self.base_url))
            .query(&[("apikey", api_key), ("domain", target)]);
        let report: DomainReport = send_json(request).await?;
        Ok(extract_names(&report, target))
    }
}
