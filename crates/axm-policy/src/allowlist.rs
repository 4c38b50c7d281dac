//! Investigation-tag allowlist
//!
//! Decides which run tags are eligible for investigation follow-ups
//! (apply, extract and regenerate recommendations). Two rule modes exist:
//! substring and regex, each optionally case-sensitive.

use axm_types::ValidationError;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Serialized allowlist rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TagRule {
    pub pattern: String,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl TagRule {
    /// Case-insensitive substring rule
    #[must_use]
    pub fn substring(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            is_regex: false,
            case_sensitive: false,
        }
    }

    /// Regex rule
    #[must_use]
    pub fn regex(pattern: impl Into<String>, case_sensitive: bool) -> Self {
        Self {
            pattern: pattern.into(),
            is_regex: true,
            case_sensitive,
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Default,
    Substring { needle: String, case_sensitive: bool },
    Regex(Regex),
}

impl Matcher {
    fn matches(&self, tag: &str) -> bool {
        match self {
            Self::Default => {
                let lower = tag.to_lowercase();
                lower.contains("investigation") && !lower.contains("-apply")
            }
            Self::Substring {
                needle,
                case_sensitive: true,
            } => tag.contains(needle.as_str()),
            Self::Substring { needle, .. } => tag.to_lowercase().contains(needle.as_str()),
            Self::Regex(re) => re.is_match(tag),
        }
    }
}

/// Compiled allowlist; an empty rule set falls back to the default rule
#[derive(Debug, Clone)]
pub struct TagAllowlist {
    matchers: Vec<Matcher>,
}

impl Default for TagAllowlist {
    fn default() -> Self {
        Self {
            matchers: vec![Matcher::Default],
        }
    }
}

impl TagAllowlist {
    /// Compile rules
    pub fn new(rules: &[TagRule]) -> Result<Self, ValidationError> {
        if rules.is_empty() {
            return Ok(Self::default());
        }
        let matchers = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| compile(i, rule))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { matchers })
    }

    /// Parse and compile rules from JSON; unknown rule shapes are rejected
    pub fn from_json(value: serde_json::Value) -> Result<Self, ValidationError> {
        let rules: Vec<TagRule> = serde_json::from_value(value).map_err(|e| {
            ValidationError::new("investigationTags", e.to_string())
                .with_hint("rules are {pattern, isRegex, caseSensitive}")
        })?;
        Self::new(&rules)
    }

    /// Check whether a tag is eligible
    #[must_use]
    pub fn matches(&self, tag: &str) -> bool {
        !tag.is_empty() && self.matchers.iter().any(|m| m.matches(tag))
    }

    /// Number of compiled rules
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    /// Always false; an empty rule set compiles to the default rule
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

fn compile(index: usize, rule: &TagRule) -> Result<Matcher, ValidationError> {
    let field = format!("investigationTags[{index}]");
    if rule.pattern.is_empty() {
        return Err(ValidationError::new(field, "pattern must not be empty"));
    }
    if rule.is_regex {
        RegexBuilder::new(&rule.pattern)
            .case_insensitive(!rule.case_sensitive)
            .build()
            .map(Matcher::Regex)
            .map_err(|e| ValidationError::new(field, format!("invalid regex: {e}")))
    } else if rule.case_sensitive {
        Ok(Matcher::Substring {
            needle: rule.pattern.clone(),
            case_sensitive: true,
        })
    } else {
        Ok(Matcher::Substring {
            needle: rule.pattern.to_lowercase(),
            case_sensitive: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_rule() {
        let list = TagAllowlist::default();
        assert!(list.matches("scenario-to-cloud-investigation"));
        assert!(list.matches("Deep-INVESTIGATION"));
        assert!(!list.matches("investigation-apply"));
        assert!(!list.matches("bugfix"));
        assert!(!list.matches(""));
    }

    #[test]
    fn empty_rules_use_default() {
        let list = TagAllowlist::new(&[]).unwrap();
        assert!(list.matches("perf-investigation"));
    }

    #[test]
    fn substring_case_modes() {
        let insensitive = TagAllowlist::new(&[TagRule::substring("Audit")]).unwrap();
        assert!(insensitive.matches("security-audit"));

        let sensitive = TagAllowlist::new(&[TagRule {
            pattern: "Audit".into(),
            is_regex: false,
            case_sensitive: true,
        }])
        .unwrap();
        assert!(!sensitive.matches("security-audit"));
        assert!(sensitive.matches("security-Audit"));
    }

    #[test]
    fn regex_rules() {
        let list = TagAllowlist::new(&[TagRule::regex("^inv-[0-9]+$", false)]).unwrap();
        assert!(list.matches("INV-42"));
        assert!(!list.matches("inv-x"));
        // explicit rules replace the default
        assert!(!list.matches("perf-investigation"));
    }

    #[test]
    fn invalid_rules_rejected() {
        assert!(TagAllowlist::new(&[TagRule::regex("(", true)]).is_err());
        assert!(TagAllowlist::new(&[TagRule::substring("")]).is_err());

        let err = TagAllowlist::from_json(json!([{"pattern": "x", "glob": true}])).unwrap_err();
        assert_eq!(err.field, "investigationTags");
    }
}
