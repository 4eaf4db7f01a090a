//! Extracted TDF objects and typed property access

use crate::{ForgeError, Result};
use std::collections::HashMap;
use std::str::FromStr;

/// A TDF section with its properties and nested sections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TdfObject {
    /// Key/value pairs of the section; later duplicates win
    pub properties: HashMap<String, String>,
    /// Nested sections by name; later duplicates win
    pub subobjects: HashMap<String, TdfObject>,
}

impl TdfObject {
    /// Number of properties and subobjects
    pub fn len(&self) -> usize {
        self.properties.len() + self.subobjects.len()
    }

    /// Whether the object has neither properties nor subobjects
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw value of a property
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Nested section by name
    pub fn object(&self, name: &str) -> Option<&TdfObject> {
        self.subobjects.get(name)
    }

    /// Value of a property that must be present
    pub fn required_string(&self, name: &str) -> Result<String> {
        self.properties
            .get(name)
            .cloned()
            .ok_or_else(|| ForgeError::MissingProperty(name.to_string()))
    }

    /// Value of a property, or `default` when absent
    pub fn string_or(&self, name: &str, default: &str) -> String {
        self.property(name).unwrap_or(default).to_string()
    }

    /// Integer property read as a flag: nonzero is true
    ///
    /// Absent or non-numeric values yield `default`.
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.property(name)
            .and_then(|value| value.parse::<i64>().ok())
            .map_or(default, |number| number != 0)
    }

    /// Parsed numeric property, or `default` when absent or unparsable
    pub fn numeric_or<T: FromStr>(&self, name: &str, default: T) -> T {
        self.property(name)
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }
}
