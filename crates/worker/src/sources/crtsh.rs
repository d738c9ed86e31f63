//! Certificate transparency lookup via crt.sh.

use async_trait::async_trait;
use bigshot_pipeline::{SourceError, SourceProcessor};
use serde::Deserialize;

use super::{keep_subdomains, send_json, CRTSH};

const DEFAULT_BASE_URL: &str = "https://crt.sh";

#[derive(Debug, Deserialize)]
struct CertificateEntry {
    #[serde(default)]
    name_value: Option<String>,
}

pub struct CrtShSource {
    client: reqwest::Client,
    base_url: String,
}

impl CrtShSource {
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

/// Each certificate lists its names newline-separated in `name_value`.
fn extract_names(entries: &[CertificateEntry], domain: &str) -> Vec<String> {
    keep_subdomains(
        entries
            .iter()
            .filter_map(|entry| entry.name_value.as_deref())
            .flat_map(str::lines),
        domain,
    )
}

#[async_trait]
impl SourceProcessor for CrtShSource {
    fn name(&self) -> &str {
        CRTSH
    }

    async fn process(
        &self,
        target: &str,
        _api_key: Option<&str>,
    ) -> Result<Vec<String>, SourceError> {
        let request = self
            .client
            .get(&self.base_url)
            .query(&[("q", format!("%.{target}")), ("output", "json".to_string())]);
        let entries: Vec<CertificateEntry> = send_json(request).await?;
        let names = extract_names(&entries, target);
        tracing::debug!(domain = target, found = names.len(), "crt.sh lookup finished");
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multi_name_certificates() {
        let entries: Vec<CertificateEntry> = serde_json::from_value(serde_json::json!([
            { "name_value": "a.com\nwww.a.com\n*.api.a.com" },
            { "name_value": "mail.a.com" },
            { "issuer_name": "no names here" }
        ]))
        .unwrap();

        assert_eq!(
            extract_names(&entries, "a.com"),
            ["*.api.a.com", "mail.a.com", "www.a.com"]
        );
    }
}
