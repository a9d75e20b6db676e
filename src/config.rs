//! Upload configuration

use crate::error::{IngestError, Result};
use crate::layout::DEFAULT_UPLOAD_INCREMENT;
use crate::resource::DEFAULT_DESCRIPTION;
use crate::types::{ChannelType, DataType};
use crate::upload::{UploadOptions, DEFAULT_RETRY_MAX};
use crate::uri::BossUri;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for one upload session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Destination, e.g. `bossdb://collection/experiment/channel`
    pub uri: String,
    /// Directory holding one image file per depth slice
    pub data_dir: Option<PathBuf>,
    /// File name suffix used to select slices; empty selects every file
    pub data_extension: String,
    /// Physical voxel size in ZYX order
    pub voxel_size: [f64; 3],
    pub voxel_unit: String,
    /// Expected ZYX shape; checked against the source when set
    pub shape: Option<[usize; 3]>,
    pub resolution: u32,
    /// Channel data type; defaults to the source's own type
    pub dtype: Option<DataType>,
    pub channel_type: ChannelType,
    pub upload_increment: usize,
    pub retry_max: u32,
    pub retry_delay_ms: u64,
    pub overwrite: bool,
    pub description: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            uri: String::new(),
            data_dir: None,
            data_extension: String::new(),
            voxel_size: [1.0, 1.0, 1.0],
            voxel_unit: "nanometers".to_string(),
            shape: None,
            resolution: 0,
            dtype: None,
            channel_type: ChannelType::Image,
            upload_increment: DEFAULT_UPLOAD_INCREMENT,
            retry_max: DEFAULT_RETRY_MAX,
            retry_delay_ms: 500,
            overwrite: false,
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

impl UploadConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Load a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            IngestError::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| IngestError::Configuration(format!("Failed to parse config: {}", e)))
    }

    /// Check everything that can be checked without touching the data or remote
    pub fn validate(&self) -> Result<()> {
        self.parsed_uri()?;

        if self.upload_increment == 0 {
            return Err(IngestError::Configuration(
                "upload_increment must be a positive integer".to_string(),
            ));
        }
        if self.voxel_size.iter().any(|&v| !v.is_finite() || v <= 0.0) {
            return Err(IngestError::InvalidGeometry(format!(
                "voxel_size must be positive, got {:?}",
                self.voxel_size
            )));
        }
        if let Some(shape) = self.shape {
            if shape.iter().any(|&d| d == 0) {
                return Err(IngestError::InvalidGeometry(format!(
                    "All shape dimensions must be > 0, got {:?}",
                    shape
                )));
            }
        }
        Ok(())
    }

    pub fn parsed_uri(&self) -> Result<BossUri> {
        BossUri::parse(&self.uri)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            increment: self.upload_increment,
            retry_max: self.retry_max,
            retry_delay: self.retry_delay(),
            resolution: self.resolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = UploadConfig::new("bossdb://lab/exp/em");
        assert_eq!(config.upload_increment, 16);
        assert_eq!(config.retry_max, 3);
        assert!(!config.overwrite);
        assert!(config.validate().is_ok());
        assert_eq!(config.upload_options().retry_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_from_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload.json");
        fs::write(
            &path,
            r#"{
                "uri": "bossdb://lab/exp/seg",
                "data_dir": "/data/seg",
                "data_extension": ".tif",
                "voxel_size": [30.0, 4.0, 4.0],
                "dtype": "uint64",
                "channel_type": "annotation",
                "upload_increment": 64,
                "overwrite": true
            }"#,
        )
        .unwrap();

        let config = UploadConfig::from_json_file(&path).unwrap();
        assert_eq!(config.dtype, Some(DataType::U64));
        assert_eq!(config.channel_type, ChannelType::Annotation);
        assert_eq!(config.upload_increment, 64);
        assert_eq!(config.retry_max, 3);
        assert_eq!(config.data_dir, Some(PathBuf::from("/data/seg")));
        assert!(config.overwrite);
        assert_eq!(config.parsed_uri().unwrap().channel, "seg");
    }

    #[test]
    fn test_validation_errors() {
        let mut config = UploadConfig::new("bossdb://lab/exp/em");
        config.upload_increment = 0;
        assert!(config.validate().unwrap_err().is_configuration());

        let mut config = UploadConfig::new("bossdb://lab/exp/em");
        config.voxel_size = [1.0, 0.0, 1.0];
        assert!(config.validate().is_err());

        let mut config = UploadConfig::new("bossdb://lab/exp/em");
        config.shape = Some([0, 4, 4]);
        assert!(config.validate().is_err());

        assert!(UploadConfig::new("lab/exp").validate().is_err());
        assert!(UploadConfig::from_json_file("/nonexistent/upload.json").is_err());
    }
}
