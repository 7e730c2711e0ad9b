//! Drive-model name normalization.
//!
//! Vendor model strings arrive irregularly spaced and prefixed: the same
//! drive shows up as `WUH721816ALE6L4` and `WDC  WUH721816ALE6L4` in the same
//! log. Reports key off a canonical `(manufacturer, model)` identity, so
//! every retained row passes through [`NameNormalizer`] before aggregation.

use std::collections::HashMap;

use regex::Regex;

use crate::config::ManufacturerPolicy;
use crate::data::{Manufacturer, ModelIdentity};
use crate::errors::PipelineError;
use crate::types::RawModelName;

/// Collapse runs of whitespace into single spaces and trim.
pub fn normalize_inline_whitespace<T: AsRef<str>>(text: T) -> String {
    let mut normalized = String::new();
    let mut seen_space = false;
    for ch in text.as_ref().chars() {
        if ch.is_whitespace() {
            if !seen_space {
                normalized.push(' ');
                seen_space = true;
            }
        } else {
            normalized.push(ch);
            seen_space = false;
        }
    }
    normalized.trim().to_string()
}

/// One manufacturer-inference rule for bare model codes. First match wins.
struct InferenceRule {
    pattern: Regex,
    manufacturer: Manufacturer,
}

/// Normalizes raw model strings into canonical identities.
///
/// Deterministic and idempotent per policy: normalizing an identity's
/// canonical name returns the same identity. Each producer owns one
/// normalizer; the memo cache is a performance detail, not shared state.
pub struct NameNormalizer {
    policy: ManufacturerPolicy,
    rules: Vec<InferenceRule>,
    cache: HashMap<RawModelName, ModelIdentity>,
}

impl NameNormalizer {
    /// Build a normalizer for the given bucketing policy.
    pub fn new(policy: ManufacturerPolicy) -> Result<Self, PipelineError> {
        let bare_wu_bucket = match policy {
            ManufacturerPolicy::MergeWdcHgst => Manufacturer::WdcHgst,
            ManufacturerPolicy::KeepHgstSeparate => Manufacturer::Wdc,
        };
        let rules = vec![
            InferenceRule {
                pattern: compile_rule(r"^ST\d+")?,
                manufacturer: Manufacturer::Seagate,
            },
            InferenceRule {
                pattern: compile_rule(r"^WU[HS]72")?,
                manufacturer: bare_wu_bucket,
            },
        ];
        Ok(Self {
            policy,
            rules,
            cache: HashMap::new(),
        })
    }

    /// Normalize one raw model string, memoizing per distinct input.
    pub fn normalize(&mut self, raw: &str) -> Result<ModelIdentity, PipelineError> {
        if let Some(hit) = self.cache.get(raw) {
            return Ok(hit.clone());
        }
        let identity = self.normalize_fresh(raw)?;
        self.cache.insert(raw.to_string(), identity.clone());
        Ok(identity)
    }

    /// Distinct raw strings normalized so far.
    pub fn memo_len(&self) -> usize {
        self.cache.len()
    }

    fn normalize_fresh(&self, raw: &str) -> Result<ModelIdentity, PipelineError> {
        let collapsed = normalize_inline_whitespace(raw);
        let tokens: Vec<&str> = collapsed.split(' ').filter(|t| !t.is_empty()).collect();

        match tokens.as_slice() {
            [bare] => self.infer_bare_model(raw, bare),
            [mfr_token, model] => {
                let manufacturer =
                    manufacturer_for_token(mfr_token, self.policy).ok_or_else(|| {
                        PipelineError::UnrecognizedModel {
                            raw: raw.to_string(),
                            reason: format!("manufacturer token '{mfr_token}' not recognized"),
                        }
                    })?;
                Ok(ModelIdentity {
                    manufacturer,
                    model: (*model).to_string(),
                })
            }
            other => Err(PipelineError::UnrecognizedModel {
                raw: raw.to_string(),
                reason: format!("split into {} tokens, expected 1 or 2", other.len()),
            }),
        }
    }

    fn infer_bare_model(&self, raw: &str, bare: &str) -> Result<ModelIdentity, PipelineError> {
        for rule in &self.rules {
            if rule.pattern.is_match(bare) {
                return Ok(ModelIdentity {
                    manufacturer: rule.manufacturer,
                    model: bare.to_string(),
                });
            }
        }
        Err(PipelineError::UnrecognizedModel {
            raw: raw.to_string(),
            reason: "no manufacturer rule matches bare model code".to_string(),
        })
    }
}

fn compile_rule(pattern: &str) -> Result<Regex, PipelineError> {
    Regex::new(pattern).map_err(|err| {
        PipelineError::Configuration(format!("invalid manufacturer rule '{pattern}': {err}"))
    })
}

/// Map a leading manufacturer token to its canonical bucket, or `None` when
/// the token is outside the recognized set for the policy.
fn manufacturer_for_token(token: &str, policy: ManufacturerPolicy) -> Option<Manufacturer> {
    if token.eq_ignore_ascii_case("TOSHIBA") {
        return Some(Manufacturer::Toshiba);
    }
    match policy {
        ManufacturerPolicy::MergeWdcHgst => match token {
            "Seagate" => Some(Manufacturer::Seagate),
            "WDC" | "HGST" | "WDC/HGST" => Some(Manufacturer::WdcHgst),
            _ => None,
        },
        ManufacturerPolicy::KeepHgstSeparate => match token {
            "Seagate" => Some(Manufacturer::Seagate),
            "WDC" => Some(Manufacturer::Wdc),
            "HGST" => Some(Manufacturer::Hgst),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::test_models;

    fn merged() -> NameNormalizer {
        NameNormalizer::new(ManufacturerPolicy::MergeWdcHgst).expect("normalizer")
    }

    fn separate() -> NameNormalizer {
        NameNormalizer::new(ManufacturerPolicy::KeepHgstSeparate).expect("normalizer")
    }

    #[test]
    fn collapses_inline_whitespace() {
        assert_eq!(
            normalize_inline_whitespace("WDC \t WUH721816ALE6L4 "),
            "WDC WUH721816ALE6L4"
        );
        assert_eq!(normalize_inline_whitespace("   "), "");
        assert_eq!(normalize_inline_whitespace("ST4000DM000"), "ST4000DM000");
    }

    #[test]
    fn infers_seagate_from_bare_model_code() {
        let identity = merged()
            .normalize(test_models::SEAGATE_BARE)
            .expect("seagate");
        assert_eq!(identity.manufacturer, Manufacturer::Seagate);
        assert_eq!(identity.model, "ST4000DM000");
        assert_eq!(identity.canonical_name(), "Seagate ST4000DM000");
    }

    #[test]
    fn bare_and_prefixed_hgst_models_collapse_under_merge() {
        let mut normalizer = merged();
        let bare = normalizer.normalize(test_models::HGST_BARE).expect("bare");
        let prefixed = normalizer
            .normalize(test_models::HGST_PREFIXED)
            .expect("prefixed");
        assert_eq!(bare, prefixed);
        assert_eq!(bare.manufacturer, Manufacturer::WdcHgst);
        assert_eq!(bare.canonical_name(), "WDC/HGST WUH721816ALE6L4");
    }

    #[test]
    fn separate_policy_keeps_wdc_and_hgst_buckets() {
        let mut normalizer = separate();
        let bare = normalizer.normalize(test_models::HGST_BARE).expect("bare");
        assert_eq!(bare.manufacturer, Manufacturer::Wdc);
        let hgst = normalizer
            .normalize("HGST HMS5C4040BLE640")
            .expect("hgst prefixed");
        assert_eq!(hgst.manufacturer, Manufacturer::Hgst);
        assert!(normalizer.normalize("WDC/HGST WUH721816ALE6L4").is_err());
    }

    #[test]
    fn toshiba_prefix_is_case_insensitive() {
        let mut normalizer = merged();
        let upper = normalizer
            .normalize(test_models::TOSHIBA_UPPER)
            .expect("upper");
        let canonical = normalizer
            .normalize("Toshiba MG07ACA14TA")
            .expect("canonical");
        assert_eq!(upper, canonical);
        assert_eq!(upper.manufacturer, Manufacturer::Toshiba);
    }

    #[test]
    fn normalization_is_idempotent_on_canonical_names() {
        for policy in [
            ManufacturerPolicy::MergeWdcHgst,
            ManufacturerPolicy::KeepHgstSeparate,
        ] {
            let mut normalizer = NameNormalizer::new(policy).expect("normalizer");
            for raw in [
                test_models::SEAGATE_BARE,
                test_models::HGST_BARE,
                test_models::HGST_PREFIXED,
                test_models::TOSHIBA_UPPER,
            ] {
                let first = normalizer.normalize(raw).expect("first pass");
                let second = normalizer
                    .normalize(&first.canonical_name())
                    .expect("second pass");
                assert_eq!(first, second, "policy {policy:?} raw '{raw}'");
            }
        }
    }

    #[test]
    fn rejects_unusable_model_strings() {
        let mut normalizer = merged();
        for raw in [
            "",
            "   ",
            "Seagate BarraCuda SSD",
            "SAMSUNG 870EVO",
            "MG07ACA14TA",
        ] {
            let err = normalizer.normalize(raw).expect_err("must fail");
            match err {
                PipelineError::UnrecognizedModel { raw: reported, .. } => {
                    assert_eq!(reported, raw)
                }
                other => panic!("expected UnrecognizedModel, got {other:?}"),
            }
        }
    }

    #[test]
    fn memoizes_distinct_raw_strings() {
        let mut normalizer = merged();
        normalizer.normalize(test_models::SEAGATE_BARE).expect("ok");
        normalizer.normalize(test_models::SEAGATE_BARE).expect("ok");
        normalizer.normalize(test_models::HGST_BARE).expect("ok");
        assert_eq!(normalizer.memo_len(), 2);
    }
}
