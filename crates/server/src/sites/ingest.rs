//! Upload ingestion: validate, buffer, materialize, record.

use super::{SiteError, SiteLifecycle, join_error};
use crate::metrics;
use bytes::Bytes;
use plinth_archive::{ArchivePolicy, RejectionKind, ValidationError};
use plinth_core::site_url;
use plinth_metadata::models::SiteRow;
use plinth_storage::SCRATCH_PREFIX;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// An archive received from a client.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub owner_id: Option<i64>,
    /// Filename the client gave the archive.
    pub filename: String,
    /// Size the client announced; checked against the limit alongside the actual size.
    pub declared_len: u64,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub site: SiteRow,
    pub url: String,
}

/// Turns an uploaded archive into a live site.
pub struct Ingestor {
    policy: Arc<ArchivePolicy>,
    lifecycle: Arc<SiteLifecycle>,
    scratch_dir: PathBuf,
    base_domain: String,
}

impl Ingestor {
    pub fn new(
        policy: Arc<ArchivePolicy>,
        lifecycle: Arc<SiteLifecycle>,
        scratch_dir: PathBuf,
        base_domain: String,
    ) -> Self {
        Self {
            policy,
            lifecycle,
            scratch_dir,
            base_domain,
        }
    }

    /// Ingest one archive.
    ///
    /// Nothing is written under the sites root unless validation passes, and
    /// a failure after extraction leaves no directory behind.
    #[instrument(skip(self, request), fields(filename = %request.filename, size = request.bytes.len()))]
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, SiteError> {
        let start = Instant::now();
        let result = self.run(request).await;

        let outcome = match &result {
            Ok(_) => "created",
            Err(SiteError::Validation(_)) => "rejected",
            Err(_) => "failed",
        };
        metrics::UPLOADS.with_label_values(&[outcome]).inc();
        metrics::UPLOAD_DURATION.observe(start.elapsed().as_secs_f64());

        result
    }

    async fn run(&self, request: IngestRequest) -> Result<IngestOutcome, SiteError> {
        let display_name = display_name(&request.filename);
        if !display_name.to_ascii_lowercase().ends_with(".zip") {
            return Err(ValidationError::rejected(
                RejectionKind::MalformedArchive,
                format!("'{display_name}' is not a .zip file"),
            )
            .into());
        }

        let policy = Arc::clone(&self.policy);
        let bytes = request.bytes.clone();
        let declared_len = request.declared_len;
        let validated = tokio::task::spawn_blocking(move || {
            plinth_archive::validate(&bytes, declared_len, &policy)
        })
        .await
        .map_err(join_error)?;

        let archive = match validated {
            Ok(archive) => archive,
            Err(e) => {
                for rejection in &e.rejections {
                    metrics::VALIDATION_REJECTIONS
                        .with_label_values(&[rejection.kind.as_str()])
                        .inc();
                }
                warn!(
                    rejections = e.rejections.len(),
                    kind = %e.primary_kind(),
                    "Archive rejected"
                );
                return Err(e.into());
            }
        };

        // The buffer lives until this function returns; dropping it removes the file.
        let scratch_dir = self.scratch_dir.clone();
        let bytes = request.bytes;
        let scratch = tokio::task::spawn_blocking(move || -> std::io::Result<_> {
            let mut file = tempfile::Builder::new()
                .prefix(SCRATCH_PREFIX)
                .suffix(".zip")
                .tempfile_in(&scratch_dir)?;
            file.write_all(&bytes)?;
            file.flush()?;
            Ok(file)
        })
        .await
        .map_err(join_error)?
        .map_err(|e| SiteError::ExtractionFailed(format!("failed to buffer upload: {e}")))?;

        let site = self
            .lifecycle
            .create_with_retry(request.owner_id, &display_name, scratch.path(), &archive)
            .await?;
        drop(scratch);

        self.lifecycle.request_reload("create");

        let url = site_url(&site.identifier, &self.base_domain);
        info!(
            site_id = site.site_id,
            identifier = %site.identifier,
            files = archive.entries().len(),
            bytes = archive.uncompressed_bytes(),
            url = %url,
            "Site published"
        );
        Ok(IngestOutcome { site, url })
    }
}

/// Last path segment of a client-supplied filename.
fn display_name(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    if name.is_empty() {
        "site.zip".to_string()
    } else {
        name.to_string()
    }
}
