use std::time::Duration;

use regex::Regex;

use crate::errors::PipelineError;

/// Policy for bucketing Western Digital and HGST models.
///
/// HGST was acquired by WDC; whether the two count as one fleet is an
/// analytical choice, not a data property.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ManufacturerPolicy {
    /// Fold WDC- and HGST-branded models into one `WDC/HGST` bucket.
    #[default]
    MergeWdcHgst,
    /// Keep `WDC` and `HGST` as distinct manufacturers.
    KeepHgstSeparate,
}

/// Policy for rows whose model string cannot be normalized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnrecognizedPolicy {
    /// Abort the run on the first unrecognized model string.
    #[default]
    Fail,
    /// Drop the row and tally it in the run summary.
    Skip,
}

/// Top-level pipeline configuration.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Number of batch producers scanning disjoint month partitions.
    pub workers: usize,
    /// Capacity of the producer → aggregator channel, in batches.
    ///
    /// Bounds pipeline memory: fast producers block here whenever the
    /// aggregator falls behind.
    pub channel_capacity: usize,
    /// Max observations per emitted batch.
    pub batch_size: usize,
    /// Minimum distinct-serial fleet size a model needs to stay in the report.
    pub min_fleet_size: usize,
    /// Models-of-interest regular expressions; a raw model string must match
    /// at least one to be retained. Empty retains every row.
    pub model_patterns: Vec<String>,
    /// WDC/HGST bucketing policy.
    pub manufacturer_policy: ManufacturerPolicy,
    /// Handling of model strings that fail normalization.
    pub unrecognized_policy: UnrecognizedPolicy,
    /// Max time a producer waits for channel capacity before declaring the
    /// pipeline wedged.
    pub send_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            channel_capacity: 1024,
            batch_size: 4096,
            min_fleet_size: 2000,
            model_patterns: Vec::new(),
            manufacturer_policy: ManufacturerPolicy::default(),
            unrecognized_policy: UnrecognizedPolicy::default(),
            send_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would wedge or crash a run before any work starts.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.workers == 0 {
            return Err(PipelineError::Configuration(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(PipelineError::Configuration(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.send_timeout.is_zero() {
            return Err(PipelineError::Configuration(
                "send_timeout must be non-zero".to_string(),
            ));
        }
        for pattern in &self.model_patterns {
            if let Err(err) = Regex::new(pattern) {
                return Err(PipelineError::Configuration(format!(
                    "invalid model pattern '{pattern}': {err}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_valued_settings() {
        let no_workers = PipelineConfig {
            workers: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            no_workers.validate(),
            Err(PipelineError::Configuration(_))
        ));

        let no_capacity = PipelineConfig {
            channel_capacity: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            no_capacity.validate(),
            Err(PipelineError::Configuration(_))
        ));

        let no_batch = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            no_batch.validate(),
            Err(PipelineError::Configuration(_))
        ));

        let no_timeout = PipelineConfig {
            send_timeout: Duration::ZERO,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            no_timeout.validate(),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_unparseable_model_patterns() {
        let bad_pattern = PipelineConfig {
            model_patterns: vec!["^ST".to_string(), "(unclosed".to_string()],
            ..PipelineConfig::default()
        };
        match bad_pattern.validate() {
            Err(PipelineError::Configuration(reason)) => {
                assert!(reason.contains("(unclosed"), "reason was: {reason}");
            }
            other => panic!("expected a configuration error, got {other:?}"),
        }

        let good_patterns = PipelineConfig {
            model_patterns: vec!["^ST".to_string(), "WUH72".to_string()],
            ..PipelineConfig::default()
        };
        assert!(good_patterns.validate().is_ok());
    }
}
