//! Control type resolution from sample names
//!
//! All configured control types are compiled into one alternation of named
//! groups, `^(?:(?P<ct0>...)|(?P<ct1>...)|...)`, matched at the start of the
//! sample name. The first group with a non-empty match names the type.
//! Types without an explicit regex match their own name, with `-` and `_`
//! treated as interchangeable.
//!
//! When no type has an explicit regex, names that miss the alternation are
//! given a second chance by fuzzy comparison against the type names.

use controls_common::config::ControlTypeConfig;
use regex::Regex;
use strsim::normalized_levenshtein;
use tracing::{debug, error};

/// Minimum normalized similarity for a fuzzy match
pub const FUZZY_CUTOFF: f64 = 0.6;

/// Group name prefix; index into the configured type list follows
const GROUP_PREFIX: &str = "ct";

pub struct TypeClassifier {
    names: Vec<String>,
    composite: Option<Regex>,
    fuzzy_fallback: bool,
}

/// Regex matching a type name literally, `-` and `_` interchangeable
fn name_pattern(name: &str) -> String {
    name.split(['-', '_'])
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("[-_]")
}

impl TypeClassifier {
    /// Compile the composite pattern for `types`, in configuration order
    pub fn new(types: &[ControlTypeConfig]) -> Result<Self, regex::Error> {
        let names: Vec<String> = types.iter().map(|t| t.name.clone()).collect();
        let fuzzy_fallback = types.iter().all(|t| t.regex.is_none());

        let composite = if types.is_empty() {
            None
        } else {
            let alternatives: Vec<String> = types
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let pattern = t.regex.clone().unwrap_or_else(|| name_pattern(&t.name));
                    format!("(?P<{}{}>{})", GROUP_PREFIX, i, pattern)
                })
                .collect();
            let pattern = format!("^(?:{})", alternatives.join("|"));
            debug!(pattern = %pattern, "Compiled control type pattern");
            Some(Regex::new(&pattern)?)
        };

        Ok(Self {
            names,
            composite,
            fuzzy_fallback,
        })
    }

    /// Control type name for `sample`, or `None` (logged) when unresolvable
    pub fn classify(&self, sample: &str) -> Option<&str> {
        let found = self.match_regex(sample).or_else(|| {
            if self.fuzzy_fallback {
                self.match_fuzzy(sample)
            } else {
                None
            }
        });
        if found.is_none() {
            error!(sample = %sample, "Could not resolve control type");
        }
        found
    }

    fn match_regex(&self, sample: &str) -> Option<&str> {
        let caps = self.composite.as_ref()?.captures(sample)?;
        self.names.iter().enumerate().find_map(|(i, name)| {
            caps.name(&format!("{}{}", GROUP_PREFIX, i))
                .filter(|m| !m.as_str().is_empty())
                .map(|_| name.as_str())
        })
    }

    /// Closest type name by normalized edit distance over the sample prefix
    ///
    /// A tie for the best score is ambiguous and resolves to nothing.
    fn match_fuzzy(&self, sample: &str) -> Option<&str> {
        let sample = sample.to_lowercase().replace('_', "-");
        let mut best: Option<(&str, f64)> = None;
        let mut tied = false;

        for name in &self.names {
            let candidate = name.to_lowercase().replace('_', "-");
            let prefix: String = sample.chars().take(candidate.chars().count()).collect();
            let score = normalized_levenshtein(&candidate, &prefix);
            if score < FUZZY_CUTOFF {
                continue;
            }
            match best {
                Some((_, top)) if score < top => {}
                Some((_, top)) if score == top => tied = true,
                _ => {
                    best = Some((name.as_str(), score));
                    tied = false;
                }
            }
        }

        if tied {
            debug!(sample = %sample, "Ambiguous fuzzy control type match");
            return None;
        }
        best.map(|(name, score)| {
            debug!(sample = %sample, control_type = %name, score, "Fuzzy control type match");
            name
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ct(name: &str, regex: Option<&str>) -> ControlTypeConfig {
        ControlTypeConfig {
            name: name.to_string(),
            regex: regex.map(str::to_string),
            targets: Vec::new(),
        }
    }

    #[test]
    fn test_explicit_regexes_first_match_wins() {
        let classifier = TypeClassifier::new(&[
            ct("EN-NOS", Some(r"EN-?NOS")),
            ct("MCS-NOS", Some(r"MCS-?NOS")),
            ct("EN-SSTI", Some(r"EN-?SSTI")),
        ])
        .unwrap();

        assert_eq!(classifier.classify("EN-NOS-20220701"), Some("EN-NOS"));
        assert_eq!(classifier.classify("MCSNOS_20220701"), Some("MCS-NOS"));
        assert_eq!(classifier.classify("EN-SSTI-1"), Some("EN-SSTI"));
    }

    #[test]
    fn test_match_is_anchored_at_start() {
        let classifier = TypeClassifier::new(&[ct("EN-NOS", Some(r"EN-?NOS"))]).unwrap();
        assert_eq!(classifier.classify("Run7-EN-NOS"), None);
    }

    #[test]
    fn test_no_match_without_fuzzy_when_regex_configured() {
        let classifier =
            TypeClassifier::new(&[ct("EN-NOS", Some(r"EN-?NOS")), ct("PosCtrl", None)]).unwrap();
        assert_eq!(classifier.classify("EM-NOS-1"), None);
        assert_eq!(classifier.classify("PosCtrl_3"), Some("PosCtrl"));
    }

    #[test]
    fn test_synthesized_pattern_accepts_either_separator() {
        let classifier = TypeClassifier::new(&[ct("EN-NOS", None)]).unwrap();
        assert_eq!(classifier.classify("EN_NOS_20230101"), Some("EN-NOS"));
        assert_eq!(classifier.classify("EN-NOS-20230101"), Some("EN-NOS"));
    }

    #[test]
    fn test_synthesized_pattern_escapes_metacharacters() {
        // An explicit regex elsewhere disables the fuzzy second chance.
        let classifier =
            TypeClassifier::new(&[ct("Ctrl.A+", None), ct("Other", Some("Other"))]).unwrap();
        assert_eq!(classifier.classify("Ctrl.A+_1"), Some("Ctrl.A+"));
        assert_eq!(classifier.classify("CtrlxAA_1"), None);
    }

    #[test]
    fn test_fuzzy_fallback_nearest_name() {
        let classifier =
            TypeClassifier::new(&[ct("MCS-NOS", None), ct("EN-SSTI", None)]).unwrap();
        assert_eq!(classifier.classify("MCS-N0S-20230101"), Some("MCS-NOS"));
    }

    #[test]
    fn test_fuzzy_fallback_no_candidate() {
        let classifier =
            TypeClassifier::new(&[ct("MCS-NOS", None), ct("EN-SSTI", None)]).unwrap();
        assert_eq!(classifier.classify("Unrelated_20230101"), None);
    }

    #[test]
    fn test_fuzzy_tie_is_ambiguous() {
        let classifier = TypeClassifier::new(&[ct("AB-X", None), ct("AB-Y", None)]).unwrap();
        assert_eq!(classifier.classify("AB-Z-1"), None);
    }

    #[test]
    fn test_no_types_configured() {
        let classifier = TypeClassifier::new(&[]).unwrap();
        assert_eq!(classifier.classify("anything"), None);
    }

    #[test]
    fn test_bad_regex_rejected() {
        assert!(TypeClassifier::new(&[ct("Bad", Some("(unclosed"))]).is_err());
    }
}
