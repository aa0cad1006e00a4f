// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2024 Oxide Computer Company

use crate::utils::format_hex;
use crate::DateCode;
use std::fmt;
use xcvr_messages::cdb::CommandResult;

/// A decoded field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
    Hex(Vec<u8>),
    Date(DateCode),
    /// A raw code with a known name.
    Code { raw: u64, label: &'static str },
    /// A raw code which is not in the field's table.
    UnknownCode(u64),
    CommandResult(CommandResult),
    Record(Record),
}

impl Value {
    /// A short name for the kind of value, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Unsigned(_) => "unsigned",
            Value::Signed(_) => "signed",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Hex(_) => "hex",
            Value::Date(_) => "date",
            Value::Code { .. } => "code",
            Value::UnknownCode(_) => "unknown code",
            Value::CommandResult(_) => "command result",
            Value::Record(_) => "record",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Return the value as an unsigned integer, if it is one.
    ///
    /// Codes, known or not, yield their raw value.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Unsigned(x) | Value::Code { raw: x, .. } | Value::UnknownCode(x) => Some(*x),
            Value::Signed(x) => u64::try_from(*x).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Unsigned(x) => Some(*x as f64),
            Value::Signed(x) => Some(*x as f64),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(x) => write!(f, "{x}"),
            Value::Unsigned(x) => write!(f, "{x}"),
            Value::Signed(x) => write!(f, "{x}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(x) => write!(f, "{x}"),
            Value::Hex(x) => write!(f, "{}", format_hex(x)),
            Value::Date(x) => write!(f, "{x}"),
            Value::Code { label, .. } => write!(f, "{label}"),
            Value::UnknownCode(x) => write!(f, "Unknown (0x{x:02x})"),
            Value::CommandResult(x) => write!(f, "{x}"),
            Value::Record(x) => write!(f, "{x}"),
        }
    }
}

/// An ordered collection of named values, produced by decoding a group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any existing value with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> + '_ {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value}")?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::Record;
    use super::Value;

    #[test]
    fn test_record_keeps_insertion_order() {
        let mut record = Record::new();
        record.insert("b", Value::Unsigned(1));
        record.insert("a", Value::Bool(true));
        record.insert("b", Value::Unsigned(2));
        let names: Vec<_> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(record.get("b"), Some(&Value::Unsigned(2)));
        assert_eq!(record.to_string(), "{b: 2, a: true}");
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Hex(vec![0x00, 0x90, 0x65]).to_string(), "00-90-65");
        assert_eq!(Value::UnknownCode(0x0e).to_string(), "Unknown (0x0e)");
        assert_eq!(
            Value::Code {
                raw: 7,
                label: "LC (Lucent Connector)"
            }
            .to_string(),
            "LC (Lucent Connector)"
        );
    }
}
