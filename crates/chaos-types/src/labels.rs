// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Label-style requirement expressions.
//!
//! The grammar is the one used by Kubernetes label selectors: a comma
//! separated list of requirements, each one of
//!
//! * `key` / `!key` (existence),
//! * `key=value`, `key==value`, `key!=value` (equality),
//! * `key in (v1,v2)`, `key notin (v1,v2)` (set membership).
//!
//! Namespace, annotation and pod-phase selectors are all evaluated with this
//! grammar against a small synthesized label set.

use crate::{Error, Result};
use std::{collections::BTreeMap, fmt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operator {
    Exists,
    DoesNotExist,
    Equals,
    NotEquals,
    In,
    NotIn,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Operator::Exists => "exists",
            Operator::DoesNotExist => "!",
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::In => "in",
            Operator::NotIn => "notin",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: Vec<String>,
}

impl Requirement {
    pub fn new(key: impl Into<String>, operator: Operator, values: Vec<String>) -> Self {
        Self {
            key: key.into(),
            operator,
            values,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Exclusion requirements are the ones a label set satisfies by *not*
    /// carrying something: `!key`, `key!=v` and `key notin (..)`.
    pub fn is_exclusion(&self) -> bool {
        matches!(
            self.operator,
            Operator::DoesNotExist | Operator::NotEquals | Operator::NotIn
        )
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
            Operator::Equals | Operator::In => {
                value.map_or(false, |value| self.values.iter().any(|v| v == value))
            },
            Operator::NotEquals | Operator::NotIn => {
                value.map_or(true, |value| self.values.iter().all(|v| v != value))
            },
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.operator {
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
            Operator::Equals | Operator::NotEquals => {
                write!(f, "{}{}{}", self.key, self.operator, self.values.join(""))
            },
            Operator::In | Operator::NotIn => {
                write!(f, "{} {} ({})", self.key, self.operator, self.values.join(","))
            },
        }
    }
}

/// Parses a selector expression into its requirements. An empty (or
/// whitespace only) expression yields no requirements, which matches
/// everything.
pub fn parse(selector: &str) -> Result<Vec<Requirement>> {
    split_terms(selector)?
        .into_iter()
        .map(|term| parse_term(selector, term))
        .collect()
}

/// Returns true when every requirement matches the label set.
pub fn matches_all(requirements: &[Requirement], labels: &BTreeMap<String, String>) -> bool {
    requirements.iter().all(|req| req.matches(labels))
}

/// Renders an equality map as a selector expression, `k1=v1,k2=v2`.
pub fn selector_from_set(set: &BTreeMap<String, String>) -> String {
    set.iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join(",")
}

/// Builds equality requirements straight from a map, skipping the string
/// round trip.
pub fn requirements_from_set(set: &BTreeMap<String, String>) -> Vec<Requirement> {
    set.iter()
        .map(|(key, value)| Requirement::new(key.clone(), Operator::Equals, vec![value.clone()]))
        .collect()
}

fn split_terms(selector: &str) -> Result<Vec<&str>> {
    let mut terms = vec![];
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, c) in selector.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| invalid(selector, "unbalanced parenthesis"))?;
            },
            ',' if depth == 0 => {
                terms.push(&selector[start..idx]);
                start = idx + 1;
            },
            _ => {},
        }
    }
    if depth != 0 {
        return Err(invalid(selector, "unbalanced parenthesis"));
    }
    terms.push(&selector[start..]);

    // A fully blank expression is the empty selector, but a blank term
    // between two commas is malformed.
    if terms.iter().all(|term| term.trim().is_empty()) {
        return Ok(vec![]);
    }
    if terms.iter().any(|term| term.trim().is_empty()) {
        return Err(invalid(selector, "found empty requirement"));
    }
    Ok(terms)
}

fn parse_term(selector: &str, term: &str) -> Result<Requirement> {
    let term = term.trim();

    if let Some(key) = term.strip_prefix('!') {
        let key = validate_key(selector, key.trim())?;
        return Ok(Requirement::new(key, Operator::DoesNotExist, vec![]));
    }

    if let Some((key, value)) = term.split_once("!=") {
        return equality(selector, key, value, Operator::NotEquals);
    }
    if let Some((key, value)) = term.split_once("==") {
        return equality(selector, key, value, Operator::Equals);
    }
    if let Some((key, value)) = term.split_once('=') {
        return equality(selector, key, value, Operator::Equals);
    }

    if let Some(open) = term.find('(') {
        let head = term[..open].trim();
        let (key, operator) = match head.rsplit_once(char::is_whitespace) {
            Some((key, "in")) => (key, Operator::In),
            Some((key, "notin")) => (key, Operator::NotIn),
            _ => return Err(invalid(selector, &format!("unknown operator in {:?}", term))),
        };
        let body = term[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| invalid(selector, &format!("expected ')' to close {:?}", term)))?;
        let values = body
            .split(',')
            .map(|value| validate_value(selector, value.trim()).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;
        if values.iter().all(String::is_empty) {
            return Err(invalid(
                selector,
                &format!("set operator {} needs at least one value", operator),
            ));
        }
        let key = validate_key(selector, key.trim())?;
        return Ok(Requirement::new(key, operator, values));
    }

    let key = validate_key(selector, term)?;
    Ok(Requirement::new(key, Operator::Exists, vec![]))
}

fn equality(selector: &str, key: &str, value: &str, operator: Operator) -> Result<Requirement> {
    let key = validate_key(selector, key.trim())?;
    let value = validate_value(selector, value.trim())?;
    Ok(Requirement::new(key, operator, vec![value.to_string()]))
}

fn validate_key<'a>(selector: &str, key: &'a str) -> Result<&'a str> {
    if key.is_empty() {
        return Err(invalid(selector, "found empty key"));
    }
    if key
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '=' | '!' | '(' | ')' | ','))
    {
        return Err(invalid(selector, &format!("invalid key {:?}", key)));
    }
    Ok(key)
}

fn validate_value<'a>(selector: &str, value: &'a str) -> Result<&'a str> {
    if value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '=' | '!' | '(' | ')' | ','))
    {
        return Err(invalid(selector, &format!("invalid value {:?}", value)));
    }
    Ok(value)
}

fn invalid(selector: &str, reason: &str) -> Error {
    Error::InvalidSelector {
        selector: selector.to_string(),
        reason: reason.to_string(),
    }
}
