//! Bulk ABN verification.
//!
//! - Parsing: schema-less CSV, business number and display name sniffed per row.
//! - Verification: batched registry lookups, concurrent within a batch, batches in sequence.
//! - Output: one `EnrichedRecord` per parsed row, carrying all original columns.
//!
//! Data shape:
//! - `ParsedInput { headers, columns, entries, skipped }`
//! - Per batch: `ResultSink::on_batch(records, processed, total)`
#![cfg_attr(docsrs, feature(doc_cfg))]
//
mod config;
mod export;
mod extract;
mod io;
mod model;
mod parse;
mod reconcile;
mod registry;
mod schedule;

pub use crate::config::{BatchFailurePolicy, VerifyConfig};
pub use crate::export::{write_export, VERIFICATION_COLUMNS};
pub use crate::extract::{
    column_keys, extract_fields, metadata_keys, Columns, ExtractedFields, Extraction,
};
pub use crate::io::{decode_text, read_upload, upload_from_path, Upload, UploadMeta};
pub use crate::model::{EnrichedRecord, InputEntry, Metadata, RegistrationStatus};
pub use crate::parse::{parse_entries, parse_text, split_line, ParsedInput};
pub use crate::reconcile::{
    merge_names, period_status, reconcile, Clock, FixedClock, SystemClock, NEVER_DATE,
};
pub use crate::registry::{strip_jsonp, AbrClient, DateRange, Registry, RegistryRecord};
pub use crate::schedule::{CollectingSink, ResultSink, RunSummary, Scheduler};

use std::sync::Arc;
use thiserror::Error;

/// Error type returned by this crate when not using `anyhow`.
///
/// Per-row and per-lookup problems never show up here; they become skipped
/// rows or Cancelled records.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("no registry GUID configured (set ABN_LOOKUP_GUID)")]
    MissingCredential,
    #[error("not a CSV upload: {0}")]
    UnsupportedUpload(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("lookup task failed: {0}")]
    LookupTask(#[from] tokio::task::JoinError),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv_async::Error),
}

pub type VerifyResult<T> = std::result::Result<T, VerifyError>;

/// Verify an uploaded CSV against the ABR.
///
/// The registry client is built before anything is parsed, so a missing GUID
/// or bad configuration fails the call before the first batch.
pub async fn verify_csv<S>(
    text: &str,
    config: &VerifyConfig,
    sink: &mut S,
) -> VerifyResult<RunSummary>
where
    S: ResultSink + ?Sized,
{
    config.validate()?;
    let registry = Arc::new(AbrClient::from_config(config)?);
    verify_with(text, registry, Arc::new(SystemClock), config, sink).await
}

/// Like [`verify_csv`] with an explicit registry and clock.
pub async fn verify_with<S>(
    text: &str,
    registry: Arc<dyn Registry>,
    clock: Arc<dyn Clock>,
    config: &VerifyConfig,
    sink: &mut S,
) -> VerifyResult<RunSummary>
where
    S: ResultSink + ?Sized,
{
    let parsed = parse_text(text).await?;
    log::info!(
        "verifying {} entries in batches of {} ({} rows skipped)",
        parsed.total(),
        config.batch_size,
        parsed.skipped
    );
    let scheduler = Scheduler::new(registry, clock, config);
    Ok(scheduler.run(&parsed.entries, sink).await)
}
