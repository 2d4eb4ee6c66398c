use crate::{VerifyError, VerifyResult};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://abr.business.gov.au/json/AbnDetails.aspx";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);

/// What to emit for a batch whose lookups could not be completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchFailurePolicy {
    /// Cancelled placeholder records, one per entry, so no row goes missing.
    #[default]
    Placeholder,
    /// An empty record list; the batch's rows are lost.
    Drop,
}

/// Pipeline settings. Batch size and pacing are tuning constants, not user options.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    /// ABR lookup endpoint.
    pub endpoint: String,
    /// ABR authentication GUID; required before any lookup starts.
    pub guid: Option<String>,
    /// Entries looked up concurrently per batch.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub batch_delay: Duration,
    /// Upper bound for one lookup; a slow lookup counts as failed.
    pub lookup_timeout: Duration,
    /// Extra attempts for a batch that failed as a whole.
    pub batch_retries: usize,
    pub failure_policy: BatchFailurePolicy,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            guid: None,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            batch_retries: 1,
            failure_policy: BatchFailurePolicy::default(),
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> VerifyResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| VerifyError::Config(format!("{name}={value:?} is not a valid number")))
}

impl VerifyConfig {
    /// Defaults overridden by `ABN_LOOKUP_*` / `ABN_BATCH_*` environment variables.
    pub fn from_env() -> VerifyResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`VerifyConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> VerifyResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(guid) = lookup("ABN_LOOKUP_GUID") {
            config.guid = Some(guid);
        }
        if let Some(endpoint) = lookup("ABN_LOOKUP_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(v) = lookup("ABN_BATCH_SIZE") {
            config.batch_size = parse_var("ABN_BATCH_SIZE", &v)?;
        }
        if let Some(v) = lookup("ABN_BATCH_DELAY_MS") {
            config.batch_delay = Duration::from_millis(parse_var("ABN_BATCH_DELAY_MS", &v)?);
        }
        if let Some(v) = lookup("ABN_LOOKUP_TIMEOUT_MS") {
            config.lookup_timeout = Duration::from_millis(parse_var("ABN_LOOKUP_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = lookup("ABN_BATCH_RETRIES") {
            config.batch_retries = parse_var("ABN_BATCH_RETRIES", &v)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VerifyResult<()> {
        if self.batch_size == 0 {
            return Err(VerifyError::Config("batch size must be at least 1".into()));
        }
        if self.lookup_timeout.is_zero() {
            return Err(VerifyError::Config("lookup timeout must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn environment_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("ABN_LOOKUP_GUID", "abc-123"),
            ("ABN_BATCH_SIZE", "25"),
            ("ABN_BATCH_DELAY_MS", "0"),
        ]
        .into_iter()
        .collect();
        let config = VerifyConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.guid.as_deref(), Some("abc-123"));
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.batch_delay, Duration::ZERO);
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
    }

    #[test]
    fn bad_numbers_and_zero_batches_are_rejected() {
        let bad = VerifyConfig::from_lookup(|k| (k == "ABN_BATCH_SIZE").then(|| "ten".into()));
        assert!(matches!(bad, Err(VerifyError::Config(_))));

        let zero = VerifyConfig::from_lookup(|k| (k == "ABN_BATCH_SIZE").then(|| "0".into()));
        assert!(matches!(zero, Err(VerifyError::Config(_))));
    }
}
