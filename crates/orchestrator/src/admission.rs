//! File admission: type allow-list and size bounds checked before a file
//! becomes a job.

use landrec_common::ProcessingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Smallest accepted file (10 KB)
pub const MIN_FILE_BYTES: u64 = 10 * 1024;

/// Largest file accepted when inputs are staged on disk (20 MB)
pub const MAX_DISK_BYTES: u64 = 20 * 1024 * 1024;

/// Largest file accepted when inputs are held in memory (10 MB)
pub const MAX_MEMORY_BYTES: u64 = 10 * 1024 * 1024;

/// Where admitted files are staged, which decides the upper size bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Disk,
    Memory,
}

/// Accepted input formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Pdf,
    Jpeg,
    Png,
    Tiff,
}

impl InputFormat {
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf" => Some(InputFormat::Pdf),
            "image/jpeg" => Some(InputFormat::Jpeg),
            "image/png" => Some(InputFormat::Png),
            "image/tiff" => Some(InputFormat::Tiff),
            _ => None,
        }
    }

    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            InputFormat::Pdf => "application/pdf",
            InputFormat::Jpeg => "image/jpeg",
            InputFormat::Png => "image/png",
            InputFormat::Tiff => "image/tiff",
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Reasons a file is refused before entering the pipeline
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("unsupported file type {found} (accepted: PDF, JPEG, PNG, TIFF)")]
    UnsupportedType { found: String },

    #[error("file is too small ({size} bytes, minimum {min} bytes)")]
    TooSmall { size: u64, min: u64 },

    #[error("file is too large ({size} bytes, maximum {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("file could not be read: {0}")]
    Unreadable(#[from] std::io::Error),
}

impl From<AdmissionError> for ProcessingError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::UnsupportedType { found } => ProcessingError::UnsupportedFormat(found),
            AdmissionError::TooSmall { size, min } => ProcessingError::FileTooSmall { size, min },
            AdmissionError::TooLarge { size, max } => ProcessingError::FileTooLarge { size, max },
            AdmissionError::Unreadable(e) => ProcessingError::IoError(e),
        }
    }
}

/// Size bounds applied at admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    pub min_bytes: u64,
    pub max_bytes: u64,
}

impl AdmissionPolicy {
    #[must_use]
    pub const fn for_storage(mode: StorageMode) -> Self {
        let max_bytes = match mode {
            StorageMode::Disk => MAX_DISK_BYTES,
            StorageMode::Memory => MAX_MEMORY_BYTES,
        };
        Self {
            min_bytes: MIN_FILE_BYTES,
            max_bytes,
        }
    }

    /// Check one file's contents. Type is sniffed from magic bytes, not the
    /// file extension.
    pub fn check(&self, bytes: &[u8]) -> Result<InputFormat, AdmissionError> {
        let found = infer::get(bytes).map_or("unknown", |t| t.mime_type());
        let format = InputFormat::from_mime(found).ok_or_else(|| AdmissionError::UnsupportedType {
            found: found.to_string(),
        })?;

        let size = bytes.len() as u64;
        if size < self.min_bytes {
            return Err(AdmissionError::TooSmall {
                size,
                min: self.min_bytes,
            });
        }
        if size > self.max_bytes {
            return Err(AdmissionError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(format)
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::for_storage(StorageMode::default())
    }
}

/// A file that passed admission
#[derive(Debug, Clone)]
pub struct AdmittedFile {
    pub name: String,
    pub format: InputFormat,
    pub bytes: Vec<u8>,
}

/// A refused file with a reason an operator can read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub file: String,
    pub reason: String,
}

/// Files split by admission outcome, in input order
#[derive(Debug, Default)]
pub struct AdmissionReport {
    pub admitted: Vec<AdmittedFile>,
    pub rejected: Vec<Rejection>,
}

impl AdmissionPolicy {
    /// Check in-memory inputs given as `(name, bytes)` pairs
    #[must_use]
    pub fn admit(&self, inputs: impl IntoIterator<Item = (String, Vec<u8>)>) -> AdmissionReport {
        let mut report = AdmissionReport::default();
        for (name, bytes) in inputs {
            match self.check(&bytes) {
                Ok(format) => report.admitted.push(AdmittedFile {
                    name,
                    format,
                    bytes,
                }),
                Err(e) => report.rejected.push(Rejection {
                    file: name,
                    reason: e.to_string(),
                }),
            }
        }
        report
    }

    /// Read and check files from disk.
    ///
    /// Files larger than the bound are rejected from metadata without
    /// reading them.
    pub async fn admit_paths(&self, paths: &[impl AsRef<Path>]) -> AdmissionReport {
        let mut report = AdmissionReport::default();
        for path in paths {
            let path = path.as_ref();
            let name = display_name(path);
            match self.read_checked(path).await {
                Ok((format, bytes)) => report.admitted.push(AdmittedFile {
                    name,
                    format,
                    bytes,
                }),
                Err(e) => report.rejected.push(Rejection {
                    file: name,
                    reason: e.to_string(),
                }),
            }
        }
        report
    }

    async fn read_checked(&self, path: &Path) -> Result<(InputFormat, Vec<u8>), AdmissionError> {
        let size = tokio::fs::metadata(path).await?.len();
        if size > self.max_bytes {
            return Err(AdmissionError::TooLarge {
                size,
                max: self.max_bytes,
            });
        }
        let bytes = tokio::fs::read(path).await?;
        let format = self.check(&bytes)?;
        Ok((format, bytes))
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    pub(crate) fn padded(magic: &[u8], len: usize) -> Vec<u8> {
        let mut bytes = magic.to_vec();
        bytes.resize(len, 0);
        bytes
    }

    #[test]
    fn test_accepts_allowed_types() {
        let policy = AdmissionPolicy::default();
        assert_eq!(policy.check(&padded(PNG_MAGIC, 20_000)).unwrap(), InputFormat::Png);
        assert_eq!(
            policy.check(&padded(&[0xFF, 0xD8, 0xFF, 0xE0], 20_000)).unwrap(),
            InputFormat::Jpeg
        );
        assert_eq!(policy.check(&padded(b"%PDF-1.7", 20_000)).unwrap(), InputFormat::Pdf);
        assert_eq!(
            policy.check(&padded(&[b'I', b'I', 0x2A, 0x00], 20_000)).unwrap(),
            InputFormat::Tiff
        );
    }

    #[test]
    fn test_rejects_unknown_type() {
        let err = AdmissionPolicy::default()
            .check(&padded(b"hello world", 20_000))
            .unwrap_err();
        assert!(matches!(err, AdmissionError::UnsupportedType { .. }));
        assert!(err.to_string().contains("unsupported file type"));
    }

    #[test]
    fn test_size_bounds_depend_on_storage() {
        let small = padded(PNG_MAGIC, 2_000);
        let err = AdmissionPolicy::default().check(&small).unwrap_err();
        assert!(matches!(err, AdmissionError::TooSmall { size: 2000, min: 10240 }));

        let big = padded(PNG_MAGIC, 15 * 1024 * 1024);
        assert!(AdmissionPolicy::for_storage(StorageMode::Disk).check(&big).is_ok());
        let err = AdmissionPolicy::for_storage(StorageMode::Memory)
            .check(&big)
            .unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_admit_keeps_reasons() {
        let report = AdmissionPolicy::default().admit(vec![
            ("a.png".to_string(), padded(PNG_MAGIC, 20_000)),
            ("notes.txt".to_string(), padded(b"plain", 20_000)),
        ]);
        assert_eq!(report.admitted.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].file, "notes.txt");
        assert!(!report.rejected[0].reason.is_empty());
    }

    #[tokio::test]
    async fn test_admit_paths_reports_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("page.png");
        std::fs::write(&good, padded(PNG_MAGIC, 20_000)).unwrap();
        let missing = dir.path().join("missing.png");

        let report = AdmissionPolicy::default().admit_paths(&[good, missing]).await;
        assert_eq!(report.admitted.len(), 1);
        assert_eq!(report.admitted[0].name, "page.png");
        assert_eq!(report.rejected[0].file, "missing.png");
        assert!(report.rejected[0].reason.contains("could not be read"));
    }
}
