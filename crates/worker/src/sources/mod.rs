//! HTTP-backed subdomain sources.
//!
//! Each source returns raw host names filtered to `*.<target>`; the work
//! plan normalises and deduplicates them before they are stored.

pub mod crtsh;
pub mod shodan;
pub mod virustotal;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bigshot_pipeline::{ProcessorRegistry, SourceError};

pub use crtsh::CrtShSource;
pub use shodan::ShodanSource;
pub use virustotal::VirusTotalSource;

pub const CRTSH: &str = "crt.sh";
pub const VIRUSTOTAL: &str = "virustotal";
pub const SHODAN: &str = "shodan";

/// HTTP request timeout for a single source lookup.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared HTTP client for all sources.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Registry with every built-in source.
pub fn default_registry(client: reqwest::Client) -> ProcessorRegistry {
    ProcessorRegistry::new()
        .register(Arc::new(CrtShSource::new(client.clone())))
        .register(Arc::new(VirusTotalSource::new(client.clone())))
        .register(Arc::new(ShodanSource::new(client)))
}

/// Keep names ending in `.<domain>`, trimmed and unique.
fn keep_subdomains<'a>(names: impl IntoIterator<Item = &'a str>, domain: &str) -> Vec<String> {
    let suffix = format!(".{domain}");
    names
        .into_iter()
        .map(str::trim)
        .filter(|name| !name.is_empty() && name.ends_with(&suffix))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

async fn send_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| SourceError::Request(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::HttpStatus(status.as_u16()));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| SourceError::Decode(e.to_string()))
}
