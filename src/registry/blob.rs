use sha2::{Digest, Sha256};

use super::types::BlobInfo;
use crate::error::{OrchError, Result};
use crate::helm::archive;

/// Upper bound on chart and profile uploads.
pub const DEFAULT_MAX_BLOB_BYTES: u64 = 1 << 30;

/// Ingest checks for uploaded tarballs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobPolicy {
    pub max_bytes: u64,
}

impl Default for BlobPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BLOB_BYTES,
        }
    }
}

impl BlobPolicy {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// Reject oversize payloads and anything that is not a readable gzipped
    /// tar; return the digest recorded with the metadata.
    pub fn validate(&self, what: &str, data: &[u8]) -> Result<BlobInfo> {
        let size = data.len() as u64;
        if size > self.max_bytes {
            return Err(OrchError::InvalidPayload(format!(
                "{what} is {size} bytes, limit is {}",
                self.max_bytes
            )));
        }
        let summary = archive::inspect(data)
            .map_err(|e| OrchError::InvalidPayload(format!("{what} is not a gzipped tar: {e}")))?;
        tracing::debug!(what, size, entries = summary.entries, "Accepted upload");
        Ok(BlobInfo {
            sha256: hex::encode(Sha256::digest(data)),
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn tiny_tar_gz() -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let body = b"name: web\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "web/Chart.yaml", &body[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_accepts_tar_gz_and_records_digest() {
        let data = tiny_tar_gz();
        let info = BlobPolicy::default().validate("chart", &data).unwrap();
        assert_eq!(info.size, data.len() as u64);
        assert_eq!(info.sha256.len(), 64);
    }

    #[test]
    fn test_limit_is_inclusive() {
        let data = tiny_tar_gz();
        let exact = BlobPolicy::new(data.len() as u64);
        assert!(exact.validate("chart", &data).is_ok());

        let err = BlobPolicy::new(data.len() as u64 - 1)
            .validate("chart", &data)
            .unwrap_err();
        assert_eq!(err.http_status(), 422);
    }

    #[test]
    fn test_rejects_non_archive() {
        let err = BlobPolicy::default()
            .validate("profile", b"plain text, not gzip")
            .unwrap_err();
        assert!(matches!(err, OrchError::InvalidPayload(_)));
    }
}
