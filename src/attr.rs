use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GridError;

/// A cell attribute: numeric or text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Text(String),
}

impl AttrValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            AttrValue::Number(_) => ValueKind::Number,
            AttrValue::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(v) => Some(*v),
            AttrValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Number(_) => None,
        }
    }

    /// Add `other` into `self`: numbers sum, text concatenates.
    /// Returns false (and leaves `self` untouched) on a kind mismatch.
    pub fn accumulate(&mut self, other: &AttrValue) -> bool {
        match (self, other) {
            (AttrValue::Number(a), AttrValue::Number(b)) => {
                *a += b;
                true
            }
            (AttrValue::Text(a), AttrValue::Text(b)) => {
                a.push_str(b);
                true
            }
            _ => false,
        }
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Number(v)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Number(v) => write!(f, "{v}"),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}

/// Declared kind of a pushed attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ValueKind {
    Number,
    Text,
}

impl ValueKind {
    /// Value written into cells that receive nothing.
    pub fn empty(self) -> AttrValue {
        match self {
            ValueKind::Number => AttrValue::Number(0.0),
            ValueKind::Text => AttrValue::Text(String::new()),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ValueKind::Number => "number",
            ValueKind::Text => "string",
        }
    }
}

impl FromStr for ValueKind {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "number" => Ok(ValueKind::Number),
            "string" => Ok(ValueKind::Text),
            other => Err(GridError::UnsupportedKind(other.to_string())),
        }
    }
}

impl TryFrom<String> for ValueKind {
    type Error = GridError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ValueKind> for String {
    fn from(k: ValueKind) -> Self {
        k.label().to_string()
    }
}
