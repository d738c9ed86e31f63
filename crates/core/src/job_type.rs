//! Job type tags.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    DomainEnumeration,
    DataNormalization,
    DataDeduplication,
    DataCleanup,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::DomainEnumeration,
        JobType::DataNormalization,
        JobType::DataDeduplication,
        JobType::DataCleanup,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobType::DomainEnumeration => "domain_enumeration",
            JobType::DataNormalization => "data_normalization",
            JobType::DataDeduplication => "data_deduplication",
            JobType::DataCleanup => "data_cleanup",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown job type '{s}'")))
    }
}

/// Row decoding support (`#[sqlx(try_from = "String")]`).
impl TryFrom<String> for JobType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for kind in JobType::ALL {
            assert_eq!(kind.as_str().parse::<JobType>().unwrap(), kind);
        }
    }

    #[test]
    fn serde_name_matches_as_str() {
        let json = serde_json::to_value(JobType::DataDeduplication).unwrap();
        assert_eq!(json, serde_json::json!("data_deduplication"));
    }

    #[test]
    fn unknown_type_is_a_validation_error() {
        let err = "port_scan".parse::<JobType>().unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
