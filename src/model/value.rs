use crate::model::{Intrinsic, RecordType, wire_key};
use core::fmt::{self, Display};
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::path::PathBuf;

/// A value produced by evaluating declaration source.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `None`, an unset field.
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A string.
    Str(String),

    /// An intrinsic variable such as `CI::COMMIT_SHA`.
    Var(&'static Intrinsic),

    /// An array or slice.
    List(Vec<Self>),

    /// A tuple; `(key, value)` pairs inside a list form a mapping.
    Tuple(Vec<Self>),

    /// A struct literal of a modeled type.
    Record(Record),

    /// A raw wire-format value from `yaml!(..)`, carried through untouched.
    Opaque(serde_yaml::Value),
}

/// Where a record was bound at the top level of a declaration file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin {
    /// The declaring file.
    pub file: PathBuf,
    /// The `const` or `static` name.
    pub binding: String,
}

/// An instance of one of the modeled record types.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The modeled type.
    pub kind: RecordType,

    /// Set fields in the order they were written.
    pub fields: Vec<(String, Value)>,

    /// The top-level binding the record was declared as, if any.
    pub origin: Option<Origin>,
}

impl Record {
    /// An empty record of `kind`.
    #[must_use]
    pub const fn new(kind: RecordType) -> Self {
        Self {
            kind,
            fields: Vec::new(),
            origin: None,
        }
    }

    /// Gets the value of a set field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.iter().find(|(name, _)| name == field).map(|(_, value)| value)
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        if let Some(slot) = self.fields.iter_mut().find(|(name, _)| *name == field) {
            slot.1 = value;
        } else {
            self.fields.push((field, value));
        }
    }

    /// Removes a field, returning its value.
    pub fn take(&mut self, field: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(name, _)| name == field)?;
        Some(self.fields.remove(pos).1)
    }

    /// The literal `name` field, for records that have one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self.get("name") {
            Some(Value::Str(s)) => Some(s),
            _ => None,
        }
    }
}

impl Value {
    /// A short description of the value's type, for error messages.
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Null => "None".into(),
            Self::Bool(_) => "bool".into(),
            Self::Int(_) => "integer".into(),
            Self::Float(_) => "float".into(),
            Self::Str(_) => "string".into(),
            Self::Var(_) => "intrinsic".into(),
            Self::List(_) => "list".into(),
            Self::Tuple(_) => "tuple".into(),
            Self::Record(r) => format!("`{}` record", r.kind),
            Self::Opaque(_) => "yaml! value".into(),
        }
    }

    /// The value as text, for strings and intrinsics.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s.clone()),
            Self::Var(v) => Some(v.to_string()),
            _ => None,
        }
    }

    /// Renders a scalar value the way `format!` would interpolate it.
    #[must_use]
    pub fn interpolate(&self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s.clone()),
            Self::Var(v) => Some(v.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            _ => None,
        }
    }

    /// Returns the `(key, value)` entries if this is a list of pairs with string keys.
    #[must_use]
    pub fn as_pairs(&self) -> Option<Vec<(&str, &Self)>> {
        let Self::List(items) = self else {
            return None;
        };

        if items.is_empty() {
            return None;
        }

        items
            .iter()
            .map(|item| match item {
                Self::Tuple(pair) => match pair.as_slice() {
                    [Self::Str(key), value] => Some((key.as_str(), value)),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Var(v) => write!(f, "{}::{}", v.namespace(), v.name()),
            Self::Record(r) => match (&r.origin, r.name()) {
                (Some(origin), _) => write!(f, "{}", origin.binding),
                (None, Some(name)) => write!(f, "{} {{ name: {name:?}, .. }}", r.kind),
                (None, None) => write!(f, "{} {{ .. }}", r.kind),
            },
            other => f.write_str(&other.type_name()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => Err(S::Error::custom("`None` has no wire representation here; use yaml!(\"~\") for an explicit null")),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => {
                if f.is_finite() {
                    serializer.serialize_f64(*f)
                } else {
                    Err(S::Error::custom(format!("the float value {f} has no wire representation")))
                }
            }
            Self::Str(s) => serializer.serialize_str(s),
            Self::Var(v) => serializer.collect_str(v),
            Self::List(items) => {
                if let Some(pairs) = self.as_pairs() {
                    let mut map = serializer.serialize_map(Some(pairs.len()))?;
                    for (key, value) in pairs {
                        map.serialize_entry(key, value)?;
                    }
                    map.end()
                } else {
                    let mut seq = serializer.serialize_seq(Some(items.len()))?;
                    for item in items {
                        seq.serialize_element(item)?;
                    }
                    seq.end()
                }
            }
            Self::Tuple(_) => Err(S::Error::custom("tuples are only allowed as `(key, value)` pairs inside a list")),
            Self::Record(record) => record.serialize(serializer),
            Self::Opaque(raw) => raw.serialize(serializer),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.kind {
            RecordType::Job => match self.name() {
                Some(name) => serializer.serialize_str(name),
                None => Err(S::Error::custom("a job reference must have a literal `name`")),
            },
            RecordType::Pipeline => Err(S::Error::custom("a `Pipeline` cannot be nested inside another value")),
            _ => {
                let mut fields: Vec<&(String, Value)> =
                    self.fields.iter().filter(|(name, value)| name != "extra" && *value != Value::Null).collect();
                fields.sort_by_key(|(name, _)| self.kind.field_rank(name));

                let extra = match self.get("extra") {
                    Some(Value::Null) | None => Vec::new(),
                    Some(value) => value
                        .as_pairs()
                        .ok_or_else(|| S::Error::custom("`extra` must be a list of `(key, value)` pairs"))?,
                };

                let mut map = serializer.serialize_map(Some(fields.len() + extra.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(wire_key(name), value)?;
                }
                for (key, value) in extra {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn yaml(value: &Value) -> String {
        serde_yaml::to_string(value).unwrap()
    }

    #[test]
    fn pairs_render_as_mappings() {
        let value = Value::List(vec![
            Value::Tuple(vec![Value::Str("A".into()), Value::Int(1)]),
            Value::Tuple(vec![Value::Str("B".into()), Value::Var(Intrinsic::lookup("CI", "COMMIT_SHA").unwrap())]),
        ]);
        assert_eq!(yaml(&value), "A: 1\nB: $CI_COMMIT_SHA\n");
    }

    #[test]
    fn records_use_canonical_order_and_wire_keys() {
        let mut rule = Record::new(RecordType::Rule);
        rule.set("when", Value::Str("manual".into()));
        rule.set("if_", Value::Str("$CI_COMMIT_TAG".into()));
        rule.set("changes", Value::Null);
        assert_eq!(yaml(&Value::Record(rule)), "if: $CI_COMMIT_TAG\nwhen: manual\n");
    }

    #[test]
    fn job_records_render_as_references() {
        let mut job = Record::new(RecordType::Job);
        job.set("name", Value::Str("build".into()));
        assert_eq!(yaml(&Value::List(vec![Value::Record(job)])), "- build\n");
    }

    #[test]
    fn unrepresentable_values_are_errors() {
        assert!(serde_yaml::to_string(&Value::Float(f64::NAN)).is_err());
        assert!(serde_yaml::to_string(&Value::Tuple(vec![Value::Int(1)])).is_err());
        assert!(serde_yaml::to_string(&Value::List(vec![Value::Null])).is_err());
    }

    #[test]
    fn record_fields_can_be_replaced_and_taken() {
        let mut record = Record::new(RecordType::Job);
        record.set("name", Value::Str("a".into()));
        record.set("name", Value::Str("b".into()));
        assert_eq!(record.name(), Some("b"));
        assert_eq!(record.take("name"), Some(Value::Str("b".into())));
        assert!(record.get("name").is_none());
    }
}
