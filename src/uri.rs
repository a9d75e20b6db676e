//! Channel addresses of the form `bossdb://collection/experiment/channel`

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SCHEMES: &[&str] = &["bossdb", "boss"];

/// Fully-qualified channel address in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BossUri {
    pub collection: String,
    pub experiment: String,
    pub channel: String,
}

impl BossUri {
    pub fn new(
        collection: impl Into<String>,
        experiment: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            experiment: experiment.into(),
            channel: channel.into(),
        }
    }

    /// Parse a `bossdb://` (or `boss://`) URI
    pub fn parse(uri: &str) -> Result<Self> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| IngestError::InvalidUri(format!("Missing scheme: {}", uri)))?;
        if !SCHEMES.contains(&scheme) {
            return Err(IngestError::InvalidUri(format!("Unknown scheme: {}", scheme)));
        }

        let parts: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
        match parts.as_slice() {
            [collection, experiment, channel]
                if !collection.is_empty() && !experiment.is_empty() && !channel.is_empty() =>
            {
                Ok(Self::new(*collection, *experiment, *channel))
            }
            _ => Err(IngestError::InvalidUri(format!(
                "Expected bossdb://collection/experiment/channel, got {}",
                uri
            ))),
        }
    }

    /// Name of the coordinate frame requested for this collection/experiment
    pub fn coord_frame_name(&self) -> String {
        format!("CF_{}_{}", self.collection, self.experiment)
    }

    /// Neuroglancer link that displays this channel as a single layer
    pub fn neuroglancer_url(&self) -> String {
        format!(
            "https://neuroglancer.bossdb.io/#!{{'layers':{{'{}':{{'source':'boss://https://api.bossdb.io/{}/{}/{}','name':'{}'}}}}}}",
            self.experiment, self.collection, self.experiment, self.channel, self.channel
        )
    }
}

impl fmt::Display for BossUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bossdb://{}/{}/{}",
            self.collection, self.experiment, self.channel
        )
    }
}

impl FromStr for BossUri {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        let uri = BossUri::parse("bossdb://MyLab/Mouse42/CalciumImaging").unwrap();
        assert_eq!(uri.collection, "MyLab");
        assert_eq!(uri.experiment, "Mouse42");
        assert_eq!(uri.channel, "CalciumImaging");
        assert_eq!(uri.to_string(), "bossdb://MyLab/Mouse42/CalciumImaging");

        assert_eq!(
            "boss://a/b/c/".parse::<BossUri>().unwrap(),
            BossUri::new("a", "b", "c")
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(BossUri::parse("MyLab/Mouse42/Calcium").is_err());
        assert!(BossUri::parse("s3://MyLab/Mouse42/Calcium").is_err());
        assert!(BossUri::parse("bossdb://MyLab/Mouse42").is_err());
        assert!(BossUri::parse("bossdb://MyLab//Calcium").is_err());
    }

    #[test]
    fn test_derived_names() {
        let uri = BossUri::new("lab", "exp", "seg");
        assert_eq!(uri.coord_frame_name(), "CF_lab_exp");
        let link = uri.neuroglancer_url();
        assert!(link.starts_with("https://neuroglancer.bossdb.io/#!{'layers':{'exp'"));
        assert!(link.contains("boss://https://api.bossdb.io/lab/exp/seg"));
        assert!(link.ends_with("'name':'seg'}}}"));
    }
}
