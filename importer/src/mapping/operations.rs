//! Declarative value operations
//!
//! Chains of operations turn a raw dump value into the value assigned to an
//! attribute. They are what a JSON field map uses where Rust code would pass
//! a closure.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Number, Value};
use std::collections::HashMap;

use crate::parser::DEFAULT_LINE_BREAK;

static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").expect("valid year regex"));

/// Regular expression compiled once, when the operation is loaded.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Pattern)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Pattern::new(&pattern).map_err(serde::de::Error::custom)
    }
}

/// All available value operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Remove leading and trailing whitespace
    Trim,

    /// Convert to uppercase
    Uppercase,

    /// Convert to lowercase
    Lowercase,

    /// Replace using regex pattern
    Replace {
        pattern: Pattern,
        #[serde(default)]
        value: String,
    },

    /// Pad string at start to reach target length
    PadStart {
        length: usize,
        #[serde(default = "default_pad_char")]
        char: String,
    },

    /// Pad string at end to reach target length
    PadEnd {
        length: usize,
        #[serde(default = "default_pad_char")]
        char: String,
    },

    /// Extract year (4 digits) from a date string
    ExtractYear,

    /// Ensure string starts with given prefix
    EnsurePrefix { value: String },

    /// Ensure string ends with given suffix
    EnsureSuffix { value: String },

    /// Map values using a lookup table
    Map {
        mapping: HashMap<String, Value>,
        #[serde(default)]
        case_insensitive: bool,
        /// Value used when nothing matches (null when absent)
        #[serde(default)]
        default_unmapped: Option<Value>,
    },

    /// Split string into array
    Split {
        #[serde(default = "default_split_separator")]
        separator: String,
    },

    /// Convert to boolean
    ToBoolean {
        #[serde(default = "default_true_values")]
        true_values: Vec<String>,
    },

    /// Parse an integer or decimal, null when the value is not a number
    ToNumber,

    /// Take a character range
    Substring {
        start: usize,
        #[serde(default)]
        length: Option<usize>,
    },

    /// Keep only letters and digits
    Alphanumeric,

    /// Keep only digits
    DigitsOnly,

    /// Replace the dump's line-break marker
    StripLineBreaks {
        #[serde(default = "default_line_break")]
        marker: String,
        #[serde(default = "default_break_replacement")]
        with: String,
    },

    /// Turn sentinel values (e.g. `NULL`, `0000-00-00`) into null
    Nullify { values: Vec<String> },
}

fn default_pad_char() -> String {
    "0".to_string()
}

fn default_split_separator() -> String {
    ",".to_string()
}

fn default_true_values() -> Vec<String> {
    ["true", "1", "yes", "y", "t"].iter().map(|s| s.to_string()).collect()
}

fn default_line_break() -> String {
    DEFAULT_LINE_BREAK.to_string()
}

fn default_break_replacement() -> String {
    "\n".to_string()
}

impl Operation {
    /// Apply this operation to a value. Null and non-scalar values pass
    /// through unchanged.
    pub fn apply(&self, value: Value) -> Value {
        let Some(s) = as_string(&value) else {
            return value;
        };

        match self {
            Operation::Trim => Value::String(s.trim().to_string()),
            Operation::Uppercase => Value::String(s.to_uppercase()),
            Operation::Lowercase => Value::String(s.to_lowercase()),
            Operation::Replace { pattern, value: replacement } => {
                Value::String(pattern.0.replace_all(&s, replacement.as_str()).into_owned())
            }
            Operation::PadStart { length, char } => Value::String(pad(s, *length, char, true)),
            Operation::PadEnd { length, char } => Value::String(pad(s, *length, char, false)),
            Operation::ExtractYear => extract_year(&s),
            Operation::EnsurePrefix { value: prefix } => {
                if s.starts_with(prefix.as_str()) {
                    Value::String(s)
                } else {
                    Value::String(format!("{}{}", prefix, s))
                }
            }
            Operation::EnsureSuffix { value: suffix } => {
                if s.ends_with(suffix.as_str()) {
                    Value::String(s)
                } else {
                    Value::String(format!("{}{}", s, suffix))
                }
            }
            Operation::Map { mapping, case_insensitive, default_unmapped } => {
                let found = if *case_insensitive {
                    let key = s.to_lowercase();
                    mapping.iter().find(|(k, _)| k.to_lowercase() == key).map(|(_, v)| v)
                } else {
                    mapping.get(&s)
                };
                found
                    .or(default_unmapped.as_ref())
                    .cloned()
                    .unwrap_or(Value::Null)
            }
            Operation::Split { separator } => Value::Array(
                s.split(separator.as_str())
                    .map(|p| Value::String(p.trim().to_string()))
                    .collect(),
            ),
            Operation::ToBoolean { true_values } => {
                if let Value::Bool(b) = value {
                    return Value::Bool(b);
                }
                let lower = s.trim().to_lowercase();
                Value::Bool(true_values.iter().any(|tv| tv.to_lowercase() == lower))
            }
            Operation::ToNumber => to_number(&value, &s),
            Operation::Substring { start, length } => {
                let rest = s.chars().skip(*start);
                Value::String(match length {
                    Some(l) => rest.take(*l).collect(),
                    None => rest.collect(),
                })
            }
            Operation::Alphanumeric => {
                Value::String(s.chars().filter(|c| c.is_alphanumeric()).collect())
            }
            Operation::DigitsOnly => {
                Value::String(s.chars().filter(|c| c.is_ascii_digit()).collect())
            }
            Operation::StripLineBreaks { marker, with } => {
                Value::String(s.replace(marker.as_str(), with))
            }
            Operation::Nullify { values } => {
                if values.iter().any(|v| v == &s) {
                    Value::Null
                } else {
                    Value::String(s)
                }
            }
        }
    }
}

/// Run a chain of operations over a raw value.
pub fn apply_all(operations: &[Operation], raw: &str) -> Value {
    operations
        .iter()
        .fold(Value::String(raw.to_string()), |value, op| op.apply(value))
}

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn pad(s: String, length: usize, pad_char: &str, at_start: bool) -> String {
    let len = s.chars().count();
    if len >= length {
        return s;
    }
    let padding: String = std::iter::repeat(pad_char.chars().next().unwrap_or('0'))
        .take(length - len)
        .collect();
    if at_start {
        format!("{}{}", padding, s)
    } else {
        format!("{}{}", s, padding)
    }
}

fn extract_year(s: &str) -> Value {
    YEAR.find(s)
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .map(|n| Value::Number(n.into()))
        .unwrap_or(Value::Null)
}

fn to_number(value: &Value, s: &str) -> Value {
    if value.is_number() {
        return value.clone();
    }
    let text = s.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Value::Number(n.into());
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Describe all available operations (CLI `operations` subcommand).
pub fn describe_operations() -> String {
    r#"Available value operations:

| Operation | Description | Parameters |
|-----------|-------------|------------|
| trim | Remove leading/trailing whitespace | - |
| uppercase | Convert to uppercase | - |
| lowercase | Convert to lowercase | - |
| replace | Regex pattern replacement | pattern: regex, value: replacement |
| pad_start | Pad string at start | length: target length, char: pad character (default "0") |
| pad_end | Pad string at end | length: target length, char: pad character (default "0") |
| extract_year | Extract 4-digit year from date | - |
| ensure_prefix | Add prefix if not present | value: prefix string |
| ensure_suffix | Add suffix if not present | value: suffix string |
| map | Lookup table, null when unmatched | mapping: {raw: value}, case_insensitive: bool, default_unmapped: value |
| split | Split into array | separator: split string (default ",") |
| to_boolean | Convert to boolean | true_values: list of truthy strings |
| to_number | Parse an integer or decimal, null when unparseable | - |
| substring | Extract substring | start: start index, length: optional length |
| alphanumeric | Keep only letters and digits | - |
| digits_only | Keep only digits | - |
| strip_line_breaks | Replace the line-break marker | marker (default "<br/>"), with (default newline) |
| nullify | Sentinel values become null | values: list of sentinels |

Field map entries:
  "attribute"                                              direct assignment
  {"attribute": "published", "operations": [...]}          transformed assignment
  {"targets": [{"attribute": "a", "operations": [...]}]}   one field, several attributes

Example:
{
  "publish": {"attribute": "published", "operations": [{"type": "to_boolean", "true_values": ["1"]}]},
  "created": {"attribute": "year", "operations": [{"type": "extract_year"}]}
}"#
    .to_string()
}
