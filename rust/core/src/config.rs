// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parse configuration loaded from environment variables.

use std::str::FromStr;

use crate::buffered::{DEFAULT_BUFFER_SIZE, MIN_BUFFER_SIZE};
use crate::error::{Error, Result};
use crate::parser::Fidelity;

const BUFFER_SIZE_VAR: &str = "STEP21_BUFFER_SIZE";
const FIDELITY_VAR: &str = "STEP21_FIDELITY";
const STOP_ON_ISSUE_VAR: &str = "STEP21_STOP_ON_ISSUE";

/// Parse configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseConfig {
    /// Block size of the windowed source in bytes.
    pub buffer_size: usize,
    /// Parse fidelity of data section entries.
    pub fidelity: Fidelity,
    /// Halt at the first diagnostic.
    pub stop_on_first_issue: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            fidelity: Fidelity::Full,
            stop_on_first_issue: false,
        }
    }
}

impl ParseConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparsable values fall back to the defaults with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let lookup = |key: &'static str| std::env::var(key).ok();
        Self {
            buffer_size: lenient(lookup, BUFFER_SIZE_VAR, parse_buffer_size)
                .unwrap_or(defaults.buffer_size),
            fidelity: lenient(lookup, FIDELITY_VAR, |v| v.parse().ok())
                .unwrap_or(defaults.fidelity),
            stop_on_first_issue: lenient(lookup, STOP_ON_ISSUE_VAR, parse_flag)
                .unwrap_or(defaults.stop_on_first_issue),
        }
    }

    /// Load configuration from environment variables, rejecting invalid values.
    pub fn try_from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Strict loading from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            buffer_size: strict(&lookup, BUFFER_SIZE_VAR, parse_buffer_size)?
                .unwrap_or(defaults.buffer_size),
            fidelity: strict(&lookup, FIDELITY_VAR, |v| v.parse().ok())?
                .unwrap_or(defaults.fidelity),
            stop_on_first_issue: strict(&lookup, STOP_ON_ISSUE_VAR, parse_flag)?
                .unwrap_or(defaults.stop_on_first_issue),
        })
    }
}

fn lenient<T>(
    lookup: impl Fn(&'static str) -> Option<String>,
    key: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let value = lookup(key)?;
    let parsed = parse(value.trim());
    if parsed.is_none() {
        tracing::warn!(key, value = %value, "Ignoring invalid configuration value");
    }
    parsed
}

fn strict<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => match parse(value.trim()) {
            Some(parsed) => Ok(Some(parsed)),
            None => Err(Error::InvalidConfig { key, value }),
        },
    }
}

fn parse_buffer_size(value: &str) -> Option<usize> {
    value.parse().ok().filter(|size| *size >= MIN_BUFFER_SIZE)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl FromStr for Fidelity {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "full" => Ok(Fidelity::Full),
            "bare" | "fast" => Ok(Fidelity::Bare),
            _ => Err(Error::InvalidConfig {
                key: FIDELITY_VAR,
                value: value.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_defaults() {
        let config = ParseConfig::from_lookup(vars(&[])).unwrap();
        assert_eq!(config, ParseConfig::default());
        assert_eq!(config.buffer_size, 128_000);
    }

    #[test]
    fn test_values() {
        let config = ParseConfig::from_lookup(vars(&[
            ("STEP21_BUFFER_SIZE", "4096"),
            ("STEP21_FIDELITY", "Bare"),
            ("STEP21_STOP_ON_ISSUE", "yes"),
        ]))
        .unwrap();
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.fidelity, Fidelity::Bare);
        assert!(config.stop_on_first_issue);
    }

    #[test]
    fn test_invalid_values() {
        let err = ParseConfig::from_lookup(vars(&[("STEP21_BUFFER_SIZE", "1")])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { key: "STEP21_BUFFER_SIZE", .. }));

        let err = ParseConfig::from_lookup(vars(&[("STEP21_FIDELITY", "partial")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for STEP21_FIDELITY: \"partial\""
        );
    }
}
