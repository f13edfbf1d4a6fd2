//! # Environment Merging
//!
//! Commands run by `runp` see the caller's environment combined with
//! explicit `KEY=VALUE` overrides. How an override combines with an existing
//! value is controlled per variable by a policy list such as
//! `+CFLAGS,:PATH,^GOROOT*`:
//!
//! | Policy    | Effect                                                       |
//! |-----------|--------------------------------------------------------------|
//! | `+KEY`    | append the override to the existing value, space separated   |
//! | `KEY:`    | prepend the override to the existing path list               |
//! | `:KEY`    | append the override to the existing path list                |
//! | `^GLOB`   | remove every base variable whose name matches `GLOB` first   |
//! | `KEY`     | replace the existing value (the default for any variable)    |
//!
//! An override with an empty value (`KEY=`) removes the variable.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Separator of path lists such as `PATH`.
#[cfg(windows)]
pub const PATH_LIST_SEPARATOR: char = ';';
#[cfg(not(windows))]
pub const PATH_LIST_SEPARATOR: char = ':';

/// How an override combines with an existing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    AppendFlag,
    PrependPath,
    AppendPath,
    Replace,
}

impl MergePolicy {
    fn apply(self, existing: Option<&str>, value: &str) -> String {
        let existing = existing.filter(|e| !e.is_empty());
        match (self, existing) {
            (MergePolicy::AppendFlag, Some(e)) => format!("{} {}", e, value),
            (MergePolicy::PrependPath, Some(e)) => format!("{}{}{}", value, PATH_LIST_SEPARATOR, e),
            (MergePolicy::AppendPath, Some(e)) => format!("{}{}{}", e, PATH_LIST_SEPARATOR, value),
            _ => value.to_string(),
        }
    }
}

/// A parsed policy list.
#[derive(Debug, Clone, Default)]
pub struct MergePolicies {
    rules: BTreeMap<String, MergePolicy>,
    clear: Vec<glob::Pattern>,
}

impl MergePolicies {
    pub fn policy(&self, key: &str) -> MergePolicy {
        self.rules.get(key).copied().unwrap_or(MergePolicy::Replace)
    }

    /// Whether a base variable is dropped before overrides apply.
    pub fn clears(&self, key: &str) -> bool {
        self.clear.iter().any(|p| p.matches(key))
    }
}

impl FromStr for MergePolicies {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut policies = MergePolicies::default();
        for raw in s.split(',').map(str::trim).filter(|r| !r.is_empty()) {
            if let Some(pattern) = raw.strip_prefix('^') {
                policies.clear.push(glob::Pattern::new(pattern)?);
                continue;
            }
            let (key, policy) = if let Some(k) = raw.strip_prefix('+') {
                (k, MergePolicy::AppendFlag)
            } else if let Some(k) = raw.strip_prefix(':') {
                (k, MergePolicy::AppendPath)
            } else if let Some(k) = raw.strip_suffix(':') {
                (k, MergePolicy::PrependPath)
            } else {
                (raw, MergePolicy::Replace)
            };
            if !is_valid_name(key) {
                return Err(Error::InvalidInput {
                    message: format!("bad merge policy {:?}", raw),
                });
            }
            policies.rules.insert(key.to_string(), policy);
        }
        Ok(policies)
    }
}

fn is_valid_name(key: &str) -> bool {
    !key.is_empty() && !key.contains(['=', '+', ':', '^', ','])
}

/// Parses `KEY=VALUE` assignments.
pub fn parse_assignments<S: AsRef<str>>(raw: &[S]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|a| {
            let a = a.as_ref();
            match a.split_once('=') {
                Some((k, v)) if is_valid_name(k) => Ok((k.to_string(), v.to_string())),
                _ => Err(Error::InvalidInput {
                    message: format!("expected KEY=VALUE, got {:?}", a),
                }),
            }
        })
        .collect()
}

/// Merges `overrides` into `base` under `policies`.
pub fn merge(
    base: &BTreeMap<String, String>,
    overrides: &[(String, String)],
    policies: &MergePolicies,
) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = base
        .iter()
        .filter(|(k, _)| !policies.clears(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (key, value) in overrides {
        if value.is_empty() {
            env.remove(key);
            continue;
        }
        let merged = policies
            .policy(key)
            .apply(env.get(key).map(String::as_str), value);
        env.insert(key.clone(), merged);
    }
    env
}

/// The current process environment.
pub fn process_env() -> BTreeMap<String, String> {
    std::env::vars().collect()
}
