use crate::model::declaration::{checked_fields, pairs, text};
use crate::model::{Record, RecordType, Value, When};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

/// A conditional-execution clause of a job or workflow.
///
/// Rules are evaluated in order and the first match decides the job's disposition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rule {
    /// `if`, a CI/CD variable expression.
    pub if_: Option<String>,
    /// `changes`.
    pub changes: Option<Value>,
    /// `exists`.
    pub exists: Option<Value>,
    /// `variables`.
    pub variables: Option<Value>,
    /// `when`.
    pub when: Option<When>,
    /// `allow_failure`.
    pub allow_failure: Option<Value>,
    /// `start_in`.
    pub start_in: Option<String>,
    /// `needs`.
    pub needs: Option<Value>,
    /// Keys the model does not know, in declared order.
    pub extra: Vec<(String, Value)>,
}

impl Rule {
    /// A rule that only matches when `condition` holds.
    #[must_use]
    pub fn when_if(condition: impl Into<String>) -> Self {
        Self {
            if_: Some(condition.into()),
            ..Self::default()
        }
    }

    /// Converts an evaluated `Rule { .. }` record.
    ///
    /// # Errors
    ///
    /// Fails if a field has the wrong type or the record is not a rule.
    pub fn from_record(record: &Record) -> Result<Self, String> {
        if record.kind != RecordType::Rule {
            return Err(format!("expected a `Rule`, found a `{}`", record.kind));
        }

        let mut rule = Self::default();
        for (field, value) in checked_fields(record)? {
            match field {
                "if_" => rule.if_ = Some(text(field, value)?),
                "when" => rule.when = Some(text(field, value)?.parse()?),
                "start_in" => rule.start_in = Some(text(field, value)?),
                "changes" => rule.changes = Some(value.clone()),
                "exists" => rule.exists = Some(value.clone()),
                "variables" => rule.variables = Some(value.clone()),
                "allow_failure" => rule.allow_failure = Some(value.clone()),
                "needs" => rule.needs = Some(value.clone()),
                "extra" => rule.extra = pairs(field, value)?,
                _ => return Err(format!("unexpected rule field `{field}`")),
            }
        }

        Ok(rule)
    }

    pub(crate) fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Record(record) => Self::from_record(record),
            other => Err(format!("rules must be `Rule` records, found {}", other.type_name())),
        }
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(condition) = &self.if_ {
            map.serialize_entry("if", condition)?;
        }
        if let Some(changes) = &self.changes {
            map.serialize_entry("changes", changes)?;
        }
        if let Some(exists) = &self.exists {
            map.serialize_entry("exists", exists)?;
        }
        if let Some(variables) = &self.variables {
            map.serialize_entry("variables", variables)?;
        }
        if let Some(when) = &self.when {
            map.serialize_entry("when", when)?;
        }
        if let Some(allow_failure) = &self.allow_failure {
            map.serialize_entry("allow_failure", allow_failure)?;
        }
        if let Some(start_in) = &self.start_in {
            map.serialize_entry("start_in", start_in)?;
        }
        if let Some(needs) = &self.needs {
            map.serialize_entry("needs", needs)?;
        }
        for (key, value) in &self.extra {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Names of the predefined rules available as `Rules::NAME`.
pub const PREDEFINED_RULES: &[&str] = &["ON_DEFAULT_BRANCH", "ON_TAG", "ON_MERGE_REQUEST", "MANUAL", "ALWAYS", "NEVER"];

/// Builds the record for the predefined rule `Rules::name`.
#[must_use]
pub fn predefined_rule(name: &str) -> Option<Record> {
    let (condition, when) = match name {
        "ON_DEFAULT_BRANCH" => (Some("$CI_COMMIT_BRANCH == $CI_DEFAULT_BRANCH"), None),
        "ON_TAG" => (Some("$CI_COMMIT_TAG"), None),
        "ON_MERGE_REQUEST" => (Some("$CI_PIPELINE_SOURCE == \"merge_request_event\""), None),
        "MANUAL" => (None, Some("manual")),
        "ALWAYS" => (None, Some("always")),
        "NEVER" => (None, Some("never")),
        _ => return None,
    };

    let mut record = Record::new(RecordType::Rule);
    if let Some(condition) = condition {
        record.set("if_", Value::Str(condition.into()));
    }
    if let Some(when) = when {
        record.set("when", Value::Str(when.into()));
    }
    Some(record)
}
