use crate::model::{Record, RecordType, Value};

/// Resolves a job record used as a reference to the job's canonical name.
pub type ReferenceResolver<'a> = dyn FnMut(&Record) -> Result<String, String> + 'a;

/// The capability shared by the record types that are top-level declarations.
///
/// The resolver uses this to turn an evaluated record into a typed declaration
/// without inspecting types at runtime.
pub trait Declaration: Sized {
    /// The record type instances are built from.
    const KIND: RecordType;

    /// Builds the declaration from an evaluated record, canonicalizing job references.
    ///
    /// # Errors
    ///
    /// Returns a message describing the first field that does not have the expected shape.
    fn from_record(record: &Record, references: &mut ReferenceResolver<'_>) -> Result<Self, String>;
}

pub(crate) fn text(field: &str, value: &Value) -> Result<String, String> {
    value
        .as_text()
        .ok_or_else(|| format!("field `{field}` must be a string, found {}", value.type_name()))
}

pub(crate) fn text_list(field: &str, value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::List(items) => items.iter().map(|item| text(field, item)).collect(),
        other => Err(format!("field `{field}` must be a list of strings, found {}", other.type_name())),
    }
}

pub(crate) fn boolean(field: &str, value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(format!("field `{field}` must be a bool, found {}", other.type_name())),
    }
}

pub(crate) fn pairs(field: &str, value: &Value) -> Result<Vec<(String, Value)>, String> {
    match value {
        Value::List(items) if items.is_empty() => Ok(Vec::new()),
        _ => value
            .as_pairs()
            .map(|pairs| pairs.into_iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
            .ok_or_else(|| format!("field `{field}` must be a list of `(key, value)` pairs")),
    }
}

/// Reads a field that names a job, either literally or through a job record.
pub(crate) fn job_name(field: &str, value: &Value, references: &mut ReferenceResolver<'_>) -> Result<String, String> {
    match value {
        Value::Str(name) => Ok(name.clone()),
        Value::Record(record) if record.kind == RecordType::Job => references(record),
        other => Err(format!("field `{field}` must name a job, found {}", other.type_name())),
    }
}

/// Returns the set fields of `record`, rejecting any that its type does not declare.
pub(crate) fn checked_fields(record: &Record) -> Result<impl Iterator<Item = (&str, &Value)>, String> {
    if let Some((field, _)) = record.fields.iter().find(|(field, _)| !record.kind.has_field(field)) {
        return Err(format!("`{}` has no field `{field}`", record.kind));
    }

    Ok(record
        .fields
        .iter()
        .filter(|(_, value)| *value != Value::Null)
        .map(|(field, value)| (field.as_str(), value)))
}
