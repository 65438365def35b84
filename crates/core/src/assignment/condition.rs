//! Condition types and their evaluation against a resource.
//!
//! The set of condition types is closed. A stored `(type, meta_info)` pair is
//! parsed once into a [`Condition`]; evaluation is then a total function with
//! one arm per variant, so an unsupported type or a malformed payload can
//! only fail at parse time.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::resource::ResourceView;
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Condition type
// ---------------------------------------------------------------------------

/// Wire/storage name of a condition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    NameIs,
    NameStartsWith,
    NameEndsWith,
    NameContains,
    ResourceTypeIs,
    CloudIs,
    TagIs,
    RegionIs,
    TagExists,
    TagValueStartsWith,
}

impl ConditionType {
    pub const ALL: [ConditionType; 10] = [
        ConditionType::NameIs,
        ConditionType::NameStartsWith,
        ConditionType::NameEndsWith,
        ConditionType::NameContains,
        ConditionType::ResourceTypeIs,
        ConditionType::CloudIs,
        ConditionType::TagIs,
        ConditionType::RegionIs,
        ConditionType::TagExists,
        ConditionType::TagValueStartsWith,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConditionType::NameIs => "name_is",
            ConditionType::NameStartsWith => "name_starts_with",
            ConditionType::NameEndsWith => "name_ends_with",
            ConditionType::NameContains => "name_contains",
            ConditionType::ResourceTypeIs => "resource_type_is",
            ConditionType::CloudIs => "cloud_is",
            ConditionType::TagIs => "tag_is",
            ConditionType::RegionIs => "region_is",
            ConditionType::TagExists => "tag_exists",
            ConditionType::TagValueStartsWith => "tag_value_starts_with",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConditionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unsupported condition type: {s}")))
    }
}

// ---------------------------------------------------------------------------
// Case mode
// ---------------------------------------------------------------------------

/// String comparison mode used by every condition predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    #[default]
    Sensitive,
    Insensitive,
}

impl CaseMode {
    fn fold<'a>(self, s: &'a str) -> Cow<'a, str> {
        match self {
            CaseMode::Sensitive => Cow::Borrowed(s),
            CaseMode::Insensitive => Cow::Owned(s.to_lowercase()),
        }
    }

    pub fn equals(self, actual: &str, expected: &str) -> bool {
        self.fold(actual) == self.fold(expected)
    }

    pub fn starts_with(self, actual: &str, prefix: &str) -> bool {
        self.fold(actual).starts_with(&*self.fold(prefix))
    }

    pub fn ends_with(self, actual: &str, suffix: &str) -> bool {
        self.fold(actual).ends_with(&*self.fold(suffix))
    }

    pub fn contains(self, actual: &str, needle: &str) -> bool {
        self.fold(actual).contains(&*self.fold(needle))
    }

    fn tag_value<'a>(self, tags: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
        match self {
            CaseMode::Sensitive => tags.get(key).map(String::as_str),
            CaseMode::Insensitive => tags
                .iter()
                .find(|(k, _)| self.equals(k, key))
                .map(|(_, v)| v.as_str()),
        }
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// A parsed condition predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    NameIs(String),
    NameStartsWith(String),
    NameEndsWith(String),
    NameContains(String),
    ResourceTypeIs(String),
    CloudIs(String),
    RegionIs(String),
    TagExists(String),
    TagIs { key: String, value: String },
    TagValueStartsWith { key: String, value: String },
}

#[derive(Deserialize)]
struct TagPair {
    key: String,
    value: String,
}

impl Condition {
    /// Parse a raw `(type, meta_info)` pair as stored or submitted.
    pub fn parse(condition_type: &str, meta_info: &str) -> Result<Self, CoreError> {
        Self::from_parts(condition_type.parse()?, meta_info)
    }

    pub fn from_parts(condition_type: ConditionType, meta_info: &str) -> Result<Self, CoreError> {
        let literal = || {
            if meta_info.is_empty() {
                Err(CoreError::Validation(format!(
                    "meta_info for {condition_type} must not be empty"
                )))
            } else {
                Ok(meta_info.to_string())
            }
        };

        Ok(match condition_type {
            ConditionType::NameIs => Condition::NameIs(literal()?),
            ConditionType::NameStartsWith => Condition::NameStartsWith(literal()?),
            ConditionType::NameEndsWith => Condition::NameEndsWith(literal()?),
            ConditionType::NameContains => Condition::NameContains(literal()?),
            ConditionType::ResourceTypeIs => Condition::ResourceTypeIs(literal()?),
            ConditionType::CloudIs => Condition::CloudIs(literal()?),
            ConditionType::RegionIs => Condition::RegionIs(literal()?),
            ConditionType::TagExists => Condition::TagExists(literal()?),
            ConditionType::TagIs => {
                let (key, value) = parse_tag_pair(condition_type, meta_info)?;
                Condition::TagIs { key, value }
            }
            ConditionType::TagValueStartsWith => {
                let (key, value) = parse_tag_pair(condition_type, meta_info)?;
                Condition::TagValueStartsWith { key, value }
            }
        })
    }

    pub fn condition_type(&self) -> ConditionType {
        match self {
            Condition::NameIs(_) => ConditionType::NameIs,
            Condition::NameStartsWith(_) => ConditionType::NameStartsWith,
            Condition::NameEndsWith(_) => ConditionType::NameEndsWith,
            Condition::NameContains(_) => ConditionType::NameContains,
            Condition::ResourceTypeIs(_) => ConditionType::ResourceTypeIs,
            Condition::CloudIs(_) => ConditionType::CloudIs,
            Condition::RegionIs(_) => ConditionType::RegionIs,
            Condition::TagExists(_) => ConditionType::TagExists,
            Condition::TagIs { .. } => ConditionType::TagIs,
            Condition::TagValueStartsWith { .. } => ConditionType::TagValueStartsWith,
        }
    }

    /// Canonical `meta_info` encoding for storage.
    ///
    /// Tag pairs are stored as a `{"key", "value"}` JSON object.
    pub fn meta_info(&self) -> String {
        match self {
            Condition::NameIs(s)
            | Condition::NameStartsWith(s)
            | Condition::NameEndsWith(s)
            | Condition::NameContains(s)
            | Condition::ResourceTypeIs(s)
            | Condition::CloudIs(s)
            | Condition::RegionIs(s)
            | Condition::TagExists(s) => s.clone(),
            Condition::TagIs { key, value } | Condition::TagValueStartsWith { key, value } => {
                serde_json::json!({ "key": key, "value": value }).to_string()
            }
        }
    }

    /// Evaluate this condition against a resource.
    pub fn matches(&self, resource: &ResourceView, case: CaseMode) -> bool {
        match self {
            Condition::NameIs(s) => case.equals(&resource.name, s),
            Condition::NameStartsWith(s) => case.starts_with(&resource.name, s),
            Condition::NameEndsWith(s) => case.ends_with(&resource.name, s),
            Condition::NameContains(s) => case.contains(&resource.name, s),
            Condition::ResourceTypeIs(s) => case.equals(&resource.resource_type, s),
            Condition::CloudIs(s) => case.equals(&resource.cloud_type, s),
            Condition::RegionIs(s) => resource
                .region
                .as_deref()
                .is_some_and(|region| case.equals(region, s)),
            Condition::TagExists(key) => case.tag_value(&resource.tags, key).is_some(),
            Condition::TagIs { key, value } => case
                .tag_value(&resource.tags, key)
                .is_some_and(|v| case.equals(v, value)),
            Condition::TagValueStartsWith { key, value } => case
                .tag_value(&resource.tags, key)
                .is_some_and(|v| case.starts_with(v, value)),
        }
    }
}

/// Accepts `{"key": "...", "value": "..."}` or the short form `key:value`.
fn parse_tag_pair(
    condition_type: ConditionType,
    meta_info: &str,
) -> Result<(String, String), CoreError> {
    let (key, value) = if meta_info.trim_start().starts_with('{') {
        let pair: TagPair = serde_json::from_str(meta_info).map_err(|e| {
            CoreError::Validation(format!("Invalid meta_info for {condition_type}: {e}"))
        })?;
        (pair.key, pair.value)
    } else {
        let (key, value) = meta_info.split_once(':').ok_or_else(|| {
            CoreError::Validation(format!(
                "meta_info for {condition_type} must be a {{\"key\", \"value\"}} object or key:value"
            ))
        })?;
        (key.to_string(), value.to_string())
    };

    if key.is_empty() {
        return Err(CoreError::Validation(format!(
            "meta_info for {condition_type} must name a tag key"
        )));
    }
    Ok((key, value))
}
