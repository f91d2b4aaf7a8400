//! Categorized rule sets as authored in configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;
use crate::rule::{Rule, RuleDefinition};

/// Category name → ordered rule definitions.
///
/// Definitions are kept unvalidated so one malformed rule does not reject the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    categories: BTreeMap<String, Vec<RuleDefinition>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(text: &str) -> Result<Self, RuleError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let text = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn push(&mut self, category: impl Into<String>, definition: RuleDefinition) {
        self.categories
            .entry(category.into())
            .or_default()
            .push(definition);
    }

    pub fn push_rule(&mut self, category: impl Into<String>, rule: &Rule) {
        self.push(category, RuleDefinition::from(rule));
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &[RuleDefinition])> {
        self.categories
            .iter()
            .map(|(name, defs)| (name.as_str(), defs.as_slice()))
    }

    /// `(category, position within category, definition)` in category order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize, &RuleDefinition)> {
        self.categories.iter().flat_map(|(name, defs)| {
            defs.iter()
                .enumerate()
                .map(move |(i, def)| (name.as_str(), i, def))
        })
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
