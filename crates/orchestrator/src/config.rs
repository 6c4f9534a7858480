//! Configuration loading for the landrec pipeline.

use crate::admission::{AdmissionPolicy, StorageMode};
use anyhow::{Context, Result};
use landrec_common::DEFAULT_REVIEW_THRESHOLD;
use landrec_ocr::remote::RemoteConfig;
use landrec_ocr::DEFAULT_POOL_SIZE;
use landrec_preprocess::PreprocessOptions;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PipelineConfig {
    pub pool: Option<PoolConfig>,
    pub batch: Option<BatchConfig>,
    pub admission: Option<AdmissionConfig>,
    pub review: Option<ReviewConfig>,
    pub preprocess: Option<PreprocessOptions>,
    pub backend: Option<BackendConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PoolConfig {
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct BatchConfig {
    pub size: Option<usize>,
    pub handwritten: Option<bool>,
    pub fast_mode: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct AdmissionConfig {
    pub storage: Option<StorageMode>,
    pub min_bytes: Option<u64>,
    pub max_bytes: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ReviewConfig {
    pub threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Tesseract,
    Remote,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct BackendConfig {
    pub kind: Option<BackendKind>,
    pub endpoint: Option<String>,
    pub language: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Default number of files preprocessed together
pub const DEFAULT_BATCH_SIZE: usize = 4;

/// Default recognition language set for the local engine
pub const DEFAULT_LANGUAGE: &str = "tam+eng";

impl PipelineConfig {
    pub fn pool_size(&self) -> usize {
        self.pool
            .as_ref()
            .and_then(|p| p.size)
            .unwrap_or(DEFAULT_POOL_SIZE)
            .max(1)
    }

    pub fn batch_size(&self) -> usize {
        self.batch
            .as_ref()
            .and_then(|b| b.size)
            .unwrap_or(DEFAULT_BATCH_SIZE)
            .max(1)
    }

    pub fn handwritten(&self) -> bool {
        self.batch.as_ref().and_then(|b| b.handwritten).unwrap_or(false)
    }

    pub fn fast_mode(&self) -> bool {
        self.batch.as_ref().and_then(|b| b.fast_mode).unwrap_or(false)
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.admission
            .as_ref()
            .and_then(|a| a.storage)
            .unwrap_or_default()
    }

    /// Size bounds for the configured storage mode, with explicit byte
    /// overrides applied.
    pub fn admission_policy(&self) -> AdmissionPolicy {
        let mut policy = AdmissionPolicy::for_storage(self.storage_mode());
        if let Some(admission) = &self.admission {
            if let Some(min) = admission.min_bytes {
                policy.min_bytes = min;
            }
            if let Some(max) = admission.max_bytes {
                policy.max_bytes = max;
            }
        }
        policy
    }

    pub fn review_threshold(&self) -> f32 {
        self.review
            .as_ref()
            .and_then(|r| r.threshold)
            .unwrap_or(DEFAULT_REVIEW_THRESHOLD)
    }

    /// Preprocess options with the batch-level fast mode folded in
    pub fn preprocess_options(&self) -> PreprocessOptions {
        let mut options = self.preprocess.clone().unwrap_or_default();
        options.fast_mode |= self.fast_mode();
        options
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.as_ref().and_then(|b| b.kind).unwrap_or_default()
    }

    pub fn language(&self) -> String {
        self.backend
            .as_ref()
            .and_then(|b| b.language.clone())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
    }

    pub fn remote_config(&self) -> RemoteConfig {
        let mut remote = RemoteConfig::default();
        if let Some(backend) = &self.backend {
            if let Some(endpoint) = &backend.endpoint {
                remote.endpoint = endpoint.clone();
            }
            if let Some(timeout) = backend.timeout_secs {
                remote.timeout_secs = timeout;
            }
        }
        remote
    }

    /// Reject values that would make the run meaningless
    pub fn validate(&self) -> Result<()> {
        self.preprocess_options()
            .validate()
            .context("Invalid [preprocess] section")?;
        let policy = self.admission_policy();
        if policy.min_bytes > policy.max_bytes {
            anyhow::bail!(
                "Invalid [admission] section: min_bytes {} exceeds max_bytes {}",
                policy.min_bytes,
                policy.max_bytes
            );
        }
        let threshold = self.review_threshold();
        if !(0.0..=100.0).contains(&threshold) {
            anyhow::bail!("Invalid [review] threshold {threshold}: expected 0-100");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: PipelineConfig =
        toml::from_str(&contents).context("Failed to parse config file as TOML")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{MAX_MEMORY_BYTES, MIN_FILE_BYTES};
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.pool_size(), 4);
        assert_eq!(config.batch_size(), 4);
        assert!(!config.handwritten());
        assert_eq!(config.review_threshold(), 60.0);
        assert_eq!(config.backend_kind(), BackendKind::Tesseract);
        assert_eq!(config.language(), "tam+eng");
        assert_eq!(config.preprocess_options(), PreprocessOptions::default());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert!(config.pool.is_none());
    }

    #[test]
    fn test_load_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[pool]
size = 2

[batch]
size = 8
handwritten = true
fast_mode = true

[admission]
storage = "memory"

[review]
threshold = 75.0

[preprocess]
contrast = 40
detect_table = true

[backend]
kind = "remote"
endpoint = "http://ocr.local:9000"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.pool_size(), 2);
        assert_eq!(config.batch_size(), 8);
        assert!(config.handwritten());
        assert_eq!(config.review_threshold(), 75.0);

        let policy = config.admission_policy();
        assert_eq!(policy.min_bytes, MIN_FILE_BYTES);
        assert_eq!(policy.max_bytes, MAX_MEMORY_BYTES);

        let options = config.preprocess_options();
        assert_eq!(options.contrast, 40);
        assert!(options.detect_table);
        assert!(options.fast_mode);
        assert!(options.grayscale);

        assert_eq!(config.backend_kind(), BackendKind::Remote);
        assert_eq!(config.remote_config().endpoint, "http://ocr.local:9000");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[preprocess]\ncontrast = 500").unwrap();
        assert!(load_config(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[admission]\nmin_bytes = 100\nmax_bytes = 10").unwrap();
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[pool\nsize = ").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("TOML"));
    }
}
