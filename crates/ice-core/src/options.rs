//! Simulation options.
//!
//! Options are declared once in `OPTION_DEFS` with their type, default and
//! allowed range. [`ThermalOptions::set`] parses a raw string against that
//! table, so front ends (command line flags, network messages) never deal
//! with typing or validation themselves. Bad input is reported through
//! `tracing` and the previous value is kept.
//!
//! # Adding an option
//!
//! Add an `OptionDef` entry below and read it with `get_float`, `get_int`
//! or `get_string`; if the transient driver needs it, carry it over in
//! [`ThermalOptions::to_config`].

use std::collections::HashMap;
use std::fmt;

use tracing::{info, warn};

use crate::dump::DEFAULT_PRECISION;
use crate::solver::SolverType;
use crate::system_matrix::MatrixStorage;

/// Typed value for a simulator option.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Int(v) => write!(f, "{}", v),
            OptionValue::Float(v) => write!(f, "{}", v),
            OptionValue::Str(v) => write!(f, "{}", v),
        }
    }
}

/// Range constraint for validating option values.
#[derive(Debug, Clone)]
pub enum OptionRange {
    /// Inclusive range for integers
    IntRange(i64, i64),
    /// Exclusive range for floats
    FloatRange(f64, f64),
    /// Case-insensitive set of allowed words
    StringEnum(&'static [&'static str]),
}

#[derive(Debug, Clone)]
pub struct OptionDef {
    pub name: &'static str,
    pub description: &'static str,
    pub default: OptionValue,
    pub range: OptionRange,
}

const OPTION_DEFS: &[OptionDef] = &[
    OptionDef {
        name: "delta_time",
        description: "Time step of the implicit integration, s",
        default: OptionValue::Float(0.002),
        range: OptionRange::FloatRange(0.0, 1e3),
    },
    OptionDef {
        name: "initial_temperature",
        description: "Temperature of every cell before the first step, K",
        default: OptionValue::Float(300.0),
        range: OptionRange::FloatRange(0.0, 1e4),
    },
    OptionDef {
        name: "storage",
        description: "System matrix layout",
        default: OptionValue::Str(String::new()),
        range: OptionRange::StringEnum(&["csc", "csr"]),
    },
    OptionDef {
        name: "solver",
        description: "Linear solver backend",
        default: OptionValue::Str(String::new()),
        range: OptionRange::StringEnum(&["auto", "dense", "faer"]),
    },
    OptionDef {
        name: "dump_precision",
        description: "Digits after the decimal point in debug dumps",
        default: OptionValue::Int(DEFAULT_PRECISION as i64),
        range: OptionRange::IntRange(1, 15),
    },
];

/// Construction-time parameters of a [`ThermalData`](crate::thermal_data::ThermalData).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThermalConfig {
    /// s
    pub delta_time: f64,
    /// K
    pub initial_temperature: f64,
    pub storage: MatrixStorage,
    pub solver: SolverType,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        ThermalOptions::new().to_config()
    }
}

#[derive(Debug, Clone)]
struct OptionEntry {
    value: OptionValue,
    is_set: bool,
}

/// Container for all simulator options, populated with defaults.
#[derive(Debug, Clone)]
pub struct ThermalOptions {
    entries: HashMap<&'static str, OptionEntry>,
}

impl Default for ThermalOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ThermalOptions {
    pub fn new() -> Self {
        let entries = OPTION_DEFS
            .iter()
            .map(|def| {
                let value = match (&def.default, &def.range) {
                    (OptionValue::Str(_), OptionRange::StringEnum(words)) => {
                        OptionValue::Str(words.first().copied().unwrap_or_default().to_string())
                    }
                    (default, _) => default.clone(),
                };
                (
                    def.name,
                    OptionEntry {
                        value,
                        is_set: false,
                    },
                )
            })
            .collect();
        Self { entries }
    }

    /// Set an option by name from a raw string value.
    ///
    /// Returns whether the value was accepted. Unknown names, malformed
    /// values and out-of-range values are ignored with a warning;
    /// redefinitions are accepted with a warning.
    pub fn set(&mut self, key: &str, raw_value: &str) -> bool {
        let key_lower = key.to_ascii_lowercase();
        let Some(def) = OPTION_DEFS.iter().find(|d| d.name == key_lower) else {
            warn!(option = key, "unknown option ignored");
            return false;
        };

        let parsed = match &def.default {
            OptionValue::Float(_) => raw_value.trim().parse().ok().map(OptionValue::Float),
            OptionValue::Int(_) => raw_value.trim().parse().ok().map(OptionValue::Int),
            OptionValue::Str(_) => Some(OptionValue::Str(raw_value.trim().to_ascii_lowercase())),
        };
        let Some(parsed) = parsed else {
            warn!(option = def.name, value = raw_value, "malformed option value ignored");
            return false;
        };

        if !validate_range(&parsed, &def.range) {
            warn!(
                option = def.name,
                value = %parsed,
                allowed = %format_range(&def.range),
                "option value out of range ignored"
            );
            return false;
        }

        if let Some(entry) = self.entries.get(def.name) {
            if entry.is_set {
                warn!(option = def.name, was = %entry.value, now = %parsed, "option redefined");
            }
        }

        self.entries.insert(
            def.name,
            OptionEntry {
                value: parsed,
                is_set: true,
            },
        );
        true
    }

    pub fn get_float(&self, key: &str) -> f64 {
        match self.entries.get(key).map(|e| &e.value) {
            Some(OptionValue::Float(v)) => *v,
            _ => 0.0,
        }
    }

    pub fn get_int(&self, key: &str) -> i64 {
        match self.entries.get(key).map(|e| &e.value) {
            Some(OptionValue::Int(v)) => *v,
            _ => 0,
        }
    }

    pub fn get_string(&self, key: &str) -> &str {
        match self.entries.get(key).map(|e| &e.value) {
            Some(OptionValue::Str(v)) => v.as_str(),
            _ => "",
        }
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|e| e.is_set)
    }

    pub fn dump_precision(&self) -> usize {
        self.get_int("dump_precision").clamp(1, 15) as usize
    }

    pub fn to_config(&self) -> ThermalConfig {
        ThermalConfig {
            delta_time: self.get_float("delta_time"),
            initial_temperature: self.get_float("initial_temperature"),
            storage: MatrixStorage::parse(self.get_string("storage")).unwrap_or_default(),
            solver: SolverType::parse(self.get_string("solver")).unwrap_or_default(),
        }
    }

    /// Log every option the user changed.
    pub fn log_user_options(&self) {
        let mut user_set: Vec<_> = self.entries.iter().filter(|(_, e)| e.is_set).collect();
        user_set.sort_by_key(|(name, _)| **name);
        for (name, entry) in user_set {
            info!(option = *name, value = %entry.value, "user option");
        }
    }

    /// `(name, description)` of every option, in declaration order.
    pub fn describe() -> impl Iterator<Item = (&'static str, &'static str)> {
        OPTION_DEFS.iter().map(|d| (d.name, d.description))
    }
}

fn validate_range(value: &OptionValue, range: &OptionRange) -> bool {
    match (value, range) {
        (OptionValue::Float(v), OptionRange::FloatRange(min, max)) => *v > *min && *v < *max,
        (OptionValue::Int(v), OptionRange::IntRange(min, max)) => *v >= *min && *v <= *max,
        (OptionValue::Str(v), OptionRange::StringEnum(allowed)) => {
            allowed.iter().any(|a| a.eq_ignore_ascii_case(v))
        }
        _ => true,
    }
}

fn format_range(range: &OptionRange) -> String {
    match range {
        OptionRange::IntRange(min, max) => format!("{} to {}", min, max),
        OptionRange::FloatRange(min, max) => format!("{} to {}", min, max),
        OptionRange::StringEnum(values) => format!("one of: {}", values.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ThermalOptions::new();
        assert!((opts.get_float("delta_time") - 0.002).abs() < 1e-15);
        assert!((opts.get_float("initial_temperature") - 300.0).abs() < 1e-12);
        assert_eq!(opts.get_string("storage"), "csc");
        assert_eq!(opts.get_string("solver"), "auto");
        assert_eq!(opts.dump_precision(), 6);

        let config = opts.to_config();
        assert_eq!(config.storage, MatrixStorage::CompressedColumn);
        assert_eq!(config.solver, SolverType::Auto);
    }

    #[test]
    fn test_set_float() {
        let mut opts = ThermalOptions::new();
        assert!(opts.set("delta_time", "0.01"));
        assert!((opts.get_float("delta_time") - 0.01).abs() < 1e-15);
        assert!(opts.is_set("delta_time"));
    }

    #[test]
    fn test_case_insensitive() {
        let mut opts = ThermalOptions::new();
        assert!(opts.set("STORAGE", "CSR"));
        assert_eq!(opts.to_config().storage, MatrixStorage::CompressedRow);
    }

    #[test]
    fn test_out_of_range_keeps_default() {
        let mut opts = ThermalOptions::new();
        // delta_time must be strictly positive
        assert!(!opts.set("delta_time", "0"));
        assert!((opts.get_float("delta_time") - 0.002).abs() < 1e-15);
        assert!(!opts.is_set("delta_time"));
        assert!(!opts.set("dump_precision", "40"));
        assert_eq!(opts.dump_precision(), 6);
    }

    #[test]
    fn test_bad_word_and_unknown() {
        let mut opts = ThermalOptions::new();
        assert!(!opts.set("solver", "klu"));
        assert!(!opts.set("nonexistent", "42"));
        assert!(!opts.set("initial_temperature", "warm"));
        assert_eq!(opts.get_string("solver"), "auto");
    }
}
