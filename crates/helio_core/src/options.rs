//! Render configuration.
//!
//! [`Options`] is a flat, string-keyed map of typed values. Getters never
//! fail: a missing key silently yields the supplied default, a key holding
//! the wrong type logs a warning and yields the default.

use std::collections::HashMap;

use helio_math::{Color, Vec3};
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while loading options.
#[derive(Error, Debug)]
pub enum OptionsError {
    #[error("Invalid options JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single option value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Triple([f32; 3]),
}

impl OptionValue {
    fn type_name(&self) -> &'static str {
        match self {
            OptionValue::Bool(_) => "bool",
            OptionValue::Int(_) => "int",
            OptionValue::Float(_) => "float",
            OptionValue::Str(_) => "string",
            OptionValue::Triple(_) => "triple",
        }
    }
}

impl From<bool> for OptionValue {
    fn from(v: bool) -> Self {
        OptionValue::Bool(v)
    }
}

impl From<i32> for OptionValue {
    fn from(v: i32) -> Self {
        OptionValue::Int(v as i64)
    }
}

impl From<f32> for OptionValue {
    fn from(v: f32) -> Self {
        OptionValue::Float(v as f64)
    }
}

impl From<&str> for OptionValue {
    fn from(v: &str) -> Self {
        OptionValue::Str(v.to_string())
    }
}

impl From<Vec3> for OptionValue {
    fn from(v: Vec3) -> Self {
        OptionValue::Triple(v.to_array())
    }
}

/// String-keyed render options.
///
/// # Example
///
/// ```
/// use helio_core::Options;
///
/// let mut options = Options::new();
/// options.set("aa.max", 2);
/// options.set("filter", "gaussian");
///
/// assert_eq!(options.get_int("aa.max", 1), 2);
/// assert_eq!(options.get_int("aa.min", 0), 0);
/// assert_eq!(options.get_string("filter", "box"), "gaussian");
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Options {
    values: HashMap<String, OptionValue>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON object such as `{"aa.max": 2, "filter": "mitchell"}`.
    pub fn from_json(json: &str) -> Result<Self, OptionsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn set(&mut self, name: &str, value: impl Into<OptionValue>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn remove(&mut self, name: &str) {
        self.values.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn mismatch<T>(&self, name: &str, expected: &str, value: &OptionValue, default: T) -> T {
        log::warn!(
            "Option \"{}\" has type {}, expected {} - using default",
            name,
            value.type_name(),
            expected
        );
        default
    }

    pub fn get_int(&self, name: &str, default: i32) -> i32 {
        match self.values.get(name) {
            None => default,
            Some(OptionValue::Int(v)) => match i32::try_from(*v) {
                Ok(v) => v,
                Err(_) => {
                    log::warn!("Option \"{}\" value {} is out of range - using default", name, v);
                    default
                }
            },
            Some(other) => self.mismatch(name, "int", other, default),
        }
    }

    /// Integers are accepted where a float is expected.
    pub fn get_float(&self, name: &str, default: f32) -> f32 {
        match self.values.get(name) {
            None => default,
            Some(OptionValue::Float(v)) => *v as f32,
            Some(OptionValue::Int(v)) => *v as f32,
            Some(other) => self.mismatch(name, "float", other, default),
        }
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.values.get(name) {
            None => default,
            Some(OptionValue::Bool(v)) => *v,
            Some(other) => self.mismatch(name, "bool", other, default),
        }
    }

    pub fn get_string(&self, name: &str, default: &str) -> String {
        match self.values.get(name) {
            None => default.to_string(),
            Some(OptionValue::Str(v)) => v.clone(),
            Some(other) => self.mismatch(name, "string", other, default.to_string()),
        }
    }

    /// Like [`get_string`](Self::get_string) but without a default.
    pub fn get_optional_string(&self, name: &str) -> Option<String> {
        match self.values.get(name) {
            None => None,
            Some(OptionValue::Str(v)) => Some(v.clone()),
            Some(other) => self.mismatch(name, "string", other, None),
        }
    }

    pub fn get_vector(&self, name: &str, default: Vec3) -> Vec3 {
        match self.values.get(name) {
            None => default,
            Some(OptionValue::Triple(v)) => Vec3::from_array(*v),
            Some(other) => self.mismatch(name, "triple", other, default),
        }
    }

    pub fn get_color(&self, name: &str, default: Color) -> Color {
        self.get_vector(name, default)
    }
}
