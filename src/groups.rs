//! Treatment-group assignment of samples.
//!
//! Groups come from explicit subject lists loaded once from the config. A
//! sample id such as `2343_sample 2` is reduced to its subject (`2343`) and
//! looked up; any subject absent from both HI lists is CONTROL.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::GroupsConfig;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Treatment {
    #[serde(rename = "CONTROL")]
    Control,
    #[serde(rename = "HI+HTH+PBS")]
    HiHthPbs,
    #[serde(rename = "HI+HTH+SC")]
    HiHthSc,
}

impl Treatment {
    pub const ALL: [Treatment; 3] = [Treatment::Control, Treatment::HiHthPbs, Treatment::HiHthSc];

    pub fn label(self) -> &'static str {
        match self {
            Treatment::Control => "CONTROL",
            Treatment::HiHthPbs => "HI+HTH+PBS",
            Treatment::HiHthSc => "HI+HTH+SC",
        }
    }

    /// Parse a clinical-sheet group label, tolerating case and spacing.
    pub fn parse_label(raw: &str) -> Option<Self> {
        let norm: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();
        match norm.as_str() {
            "CONTROL" | "CTRL" => Some(Treatment::Control),
            "HI+HTH+PBS" | "PBS" => Some(Treatment::HiHthPbs),
            "HI+HTH+SC" | "SC" => Some(Treatment::HiHthSc),
            _ => None,
        }
    }
}

impl fmt::Display for Treatment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Grouping factor used by the per-protein comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    /// Three levels: CONTROL, HI+HTH+PBS, HI+HTH+SC
    #[default]
    Group,
    /// Two levels: CONTROL vs HI (both hypoxic-injury arms collapsed)
    Injury,
}

impl Factor {
    /// Level label of a treatment under this factor.
    pub fn level(self, treatment: Treatment) -> &'static str {
        match (self, treatment) {
            (Factor::Group, t) => t.label(),
            (Factor::Injury, Treatment::Control) => "CONTROL",
            (Factor::Injury, _) => "HI",
        }
    }

    /// Ordered level labels of this factor.
    pub fn levels(self) -> Vec<&'static str> {
        match self {
            Factor::Group => Treatment::ALL.iter().map(|t| t.label()).collect(),
            Factor::Injury => vec!["CONTROL", "HI"],
        }
    }
}

/// A parsed sample column id: `<subject><delim><marker> <replicate>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleId {
    pub raw: String,
    pub subject: String,
    pub replicate: Option<u32>,
}

impl SampleId {
    pub fn parse(raw: &str, delimiter: &str) -> Self {
        let raw = raw.trim();
        let (subject, rest) = match raw.split_once(delimiter) {
            Some((s, r)) => (s.trim(), r),
            None => (raw, ""),
        };
        // Replicate index is the trailing run of digits ("sample 2" -> 2).
        let digits: String = rest
            .trim_end()
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let replicate = if digits.is_empty() {
            None
        } else {
            digits.parse().ok()
        };
        Self {
            raw: raw.to_string(),
            subject: subject.to_string(),
            replicate,
        }
    }
}

/// Subject to treatment mapping built once at startup.
#[derive(Debug, Clone)]
pub struct GroupAssignment {
    by_subject: HashMap<String, Treatment>,
    delimiter: String,
}

impl GroupAssignment {
    /// Build the mapping; the SC and PBS lists must be disjoint.
    pub fn new(config: &GroupsConfig, delimiter: &str) -> Result<Self> {
        let mut by_subject = HashMap::new();
        let lists = [
            (Treatment::HiHthSc, &config.sc_subjects),
            (Treatment::HiHthPbs, &config.pbs_subjects),
        ];
        for (treatment, subjects) in lists {
            for subject in subjects {
                let subject = subject.trim().to_string();
                if let Some(previous) = by_subject.insert(subject.clone(), treatment) {
                    if previous != treatment {
                        return Err(PipelineError::Config(format!(
                            "subject {subject} is listed under both {previous} and {treatment}"
                        )));
                    }
                }
            }
        }
        Ok(Self {
            by_subject,
            delimiter: delimiter.to_string(),
        })
    }

    /// Treatment of a sample id. Total: unlisted subjects are CONTROL.
    pub fn assign(&self, sample_id: &str) -> Treatment {
        let id = SampleId::parse(sample_id, &self.delimiter);
        self.assign_subject(&id.subject)
    }

    pub fn assign_subject(&self, subject: &str) -> Treatment {
        self.by_subject
            .get(subject)
            .copied()
            .unwrap_or(Treatment::Control)
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment() -> GroupAssignment {
        let config = GroupsConfig {
            sc_subjects: vec!["2343".to_string(), "2350".to_string()],
            pbs_subjects: vec!["2401".to_string()],
        };
        GroupAssignment::new(&config, "_").unwrap()
    }

    #[test]
    fn listed_subject_gets_its_arm() {
        let groups = assignment();
        assert_eq!(groups.assign("2343_sample 2"), Treatment::HiHthSc);
        assert_eq!(groups.assign("2401_sample 1"), Treatment::HiHthPbs);
        assert_eq!(groups.assign("2350_mean"), Treatment::HiHthSc);
    }

    #[test]
    fn unlisted_subject_defaults_to_control() {
        let groups = assignment();
        assert_eq!(groups.assign("9999_sample 1"), Treatment::Control);
        assert_eq!(groups.assign("no-delimiter"), Treatment::Control);
    }

    #[test]
    fn overlapping_lists_are_rejected() {
        let config = GroupsConfig {
            sc_subjects: vec!["2343".to_string()],
            pbs_subjects: vec!["2343".to_string()],
        };
        let err = GroupAssignment::new(&config, "_").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn subject_prefix_must_match_exactly() {
        // "23431" shares a prefix with "2343" but is a different subject.
        let groups = assignment();
        assert_eq!(groups.assign("23431_sample 1"), Treatment::Control);
    }

    #[test]
    fn parses_sample_ids() {
        let id = SampleId::parse("2343_sample 2", "_");
        assert_eq!(id.subject, "2343");
        assert_eq!(id.replicate, Some(2));

        let mean = SampleId::parse("2343_mean", "_");
        assert_eq!(mean.subject, "2343");
        assert_eq!(mean.replicate, None);
    }

    #[test]
    fn injury_factor_collapses_hi_arms() {
        assert_eq!(Factor::Injury.level(Treatment::HiHthPbs), "HI");
        assert_eq!(Factor::Injury.level(Treatment::HiHthSc), "HI");
        assert_eq!(Factor::Injury.level(Treatment::Control), "CONTROL");
        assert_eq!(Factor::Group.levels().len(), 3);
    }

    #[test]
    fn parses_clinical_labels() {
        assert_eq!(Treatment::parse_label("HI + HTH + SC"), Some(Treatment::HiHthSc));
        assert_eq!(Treatment::parse_label("control"), Some(Treatment::Control));
        assert_eq!(Treatment::parse_label("sham"), None);
    }
}
