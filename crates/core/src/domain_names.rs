//! Domain name normalisation, validation and tag merging.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Host prefixes stripped during normalisation (at most one is removed).
const NOISE_PREFIXES: [&str; 3] = ["m.", "mobile.", "wap."];

/// Maximum length of a fully qualified domain name.
const MAX_DOMAIN_LEN: usize = 253;

const HOSTNAME_PATTERN: &str = r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$";

static HOSTNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(HOSTNAME_PATTERN).expect("valid regex"));

/// Normalise a discovered host name.
///
/// Lower-cases, trims whitespace, drops a trailing dot, strips a leading
/// `www.` and then at most one noise prefix (`m.`, `mobile.`, `wap.`).
pub fn normalize_domain(domain: &str) -> String {
    let mut name = domain.trim().to_lowercase();

    if let Some(stripped) = name.strip_suffix('.') {
        name = stripped.to_string();
    }
    if let Some(stripped) = name.strip_prefix("www.") {
        name = stripped.to_string();
    }
    if let Some(stripped) = NOISE_PREFIXES
        .iter()
        .find_map(|prefix| name.strip_prefix(prefix))
    {
        name = stripped.to_string();
    }

    name
}

/// Validate a root domain submitted for enumeration.
pub fn validate_target(target: &str) -> Result<(), CoreError> {
    let name = target.trim().to_lowercase();
    if name.is_empty() || name.len() > MAX_DOMAIN_LEN || !HOSTNAME_RE.is_match(&name) {
        return Err(CoreError::Validation(format!(
            "'{target}' is not a valid domain name"
        )));
    }
    Ok(())
}

/// Whether `candidate` is a strict subdomain of `root`.
pub fn is_subdomain_of(candidate: &str, root: &str) -> bool {
    candidate.len() > root.len() + 1 && candidate.ends_with(&format!(".{root}"))
}

/// Union comma-separated tag lists, dropping blanks. Output is sorted so
/// repeated merges are stable.
pub fn merge_tags<'a>(lists: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let merged: BTreeSet<&str> = lists
        .into_iter()
        .flatten()
        .flat_map(|list| list.split(','))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .collect();

    if merged.is_empty() {
        None
    } else {
        Some(merged.into_iter().collect::<Vec<_>>().join(","))
    }
}
