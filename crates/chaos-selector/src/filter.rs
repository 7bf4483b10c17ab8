// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{Result, SelectorError};
use chaos_types::labels::{self, Operator, Requirement};
use std::collections::BTreeMap;

/// A selector expression split into inclusion and exclusion requirements.
/// A label set passes when it satisfies at least one inclusion requirement
/// (or there are none) and every exclusion requirement.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpressionFilter {
    include: Vec<Requirement>,
    exclude: Vec<Requirement>,
}

impl ExpressionFilter {
    pub fn parse(expression: &str) -> Result<Self> {
        let (exclude, include) = labels::parse(expression)?
            .into_iter()
            .partition(Requirement::is_exclusion);
        Ok(Self { include, exclude })
    }

    /// Like [`ExpressionFilter::parse`], but only bare `key` and `!key`
    /// terms are accepted. Used for namespace and phase expressions, whose
    /// label sets carry keys and no values.
    pub fn parse_existence(expression: &str) -> Result<Self> {
        let filter = Self::parse(expression)?;
        if let Some(req) = filter
            .include
            .iter()
            .chain(filter.exclude.iter())
            .find(|req| !matches!(req.operator(), Operator::Exists | Operator::DoesNotExist))
        {
            return Err(SelectorError::Usage(format!(
                "unsupported operator: {}",
                req.operator()
            )));
        }
        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|req| req.matches(labels));
        included && self.exclude.iter().all(|req| req.matches(labels))
    }

    /// Matches a set holding the single key `key`.
    pub fn matches_key(&self, key: &str) -> bool {
        self.matches(&BTreeMap::from([(key.to_string(), String::new())]))
    }
}
