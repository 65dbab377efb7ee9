use crate::model::declaration::{ReferenceResolver, boolean, checked_fields, job_name};
use crate::model::{Record, RecordType, Value};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// One entry of a job's `needs` list.
#[derive(Debug, Clone, PartialEq)]
pub enum Need {
    /// A plain dependency on a job in the same pipeline.
    Job(String),

    /// A dependency with per-edge metadata.
    Detailed {
        /// The job name.
        job: String,
        /// Whether to download its artifacts.
        artifacts: Option<bool>,
        /// Whether the job may be absent.
        optional: Option<bool>,
    },

    /// A dependency on a job in another project or pipeline. Not part of the dependency graph.
    External(Value),
}

impl Need {
    /// The name of the job this need points at, for needs within the pipeline.
    #[must_use]
    pub fn job(&self) -> Option<&str> {
        match self {
            Self::Job(name) | Self::Detailed { job: name, .. } => Some(name),
            Self::External(_) => None,
        }
    }

    pub(crate) fn from_value(value: &Value, references: &mut ReferenceResolver<'_>) -> Result<Self, String> {
        match value {
            Value::Str(_) | Value::Record(Record { kind: RecordType::Job, .. }) => Ok(Self::Job(job_name("needs", value, references)?)),
            Value::Record(record) if record.kind == RecordType::Need => Self::from_need_record(record, references),
            other => Err(format!("`needs` entries must be job names, job references or `Need` records, found {}", other.type_name())),
        }
    }

    fn from_need_record(record: &Record, references: &mut ReferenceResolver<'_>) -> Result<Self, String> {
        if ["project", "pipeline", "parallel"].iter().any(|f| record.get(f).is_some_and(|v| *v != Value::Null)) {
            return Ok(Self::External(Value::Record(record.clone())));
        }

        let mut job = None;
        let mut artifacts = None;
        let mut optional = None;
        for (field, value) in checked_fields(record)? {
            match field {
                "job" => job = Some(job_name(field, value, references)?),
                "artifacts" => artifacts = Some(boolean(field, value)?),
                "optional" => optional = Some(boolean(field, value)?),
                _ => return Err(format!("field `{field}` is only valid for cross-pipeline needs")),
            }
        }

        let job = job.ok_or("a `Need` record must name its `job`")?;
        Ok(Self::Detailed { job, artifacts, optional })
    }
}

impl Serialize for Need {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Job(name) => serializer.serialize_str(name),
            Self::Detailed { job, artifacts, optional } => {
                let mut map = serializer.serialize_map(None)?;
                map.serialize_entry("job", job)?;
                if let Some(artifacts) = artifacts {
                    map.serialize_entry("artifacts", artifacts)?;
                }
                if let Some(optional) = optional {
                    map.serialize_entry("optional", optional)?;
                }
                map.end()
            }
            Self::External(value) => value.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_record(name: &str) -> Value {
        let mut record = Record::new(RecordType::Job);
        record.set("name", Value::Str(name.into()));
        Value::Record(record)
    }

    fn by_name(record: &Record) -> Result<String, String> {
        record.name().map(ToString::to_string).ok_or_else(|| "unnamed".to_string())
    }

    #[test]
    fn job_references_become_names() {
        let need = Need::from_value(&job_record("build"), &mut by_name).unwrap();
        assert_eq!(need, Need::Job("build".into()));
        assert_eq!(need.job(), Some("build"));
    }

    #[test]
    fn need_records_keep_edge_metadata() {
        let mut record = Record::new(RecordType::Need);
        record.set("job", job_record("build"));
        record.set("artifacts", Value::Bool(false));
        let need = Need::from_value(&Value::Record(record), &mut by_name).unwrap();

        assert_eq!(
            need,
            Need::Detailed {
                job: "build".into(),
                artifacts: Some(false),
                optional: None
            }
        );
        assert_eq!(serde_yaml::to_string(&need).unwrap(), "job: build\nartifacts: false\n");
    }

    #[test]
    fn cross_project_needs_are_external() {
        let mut record = Record::new(RecordType::Need);
        record.set("project", Value::Str("group/other".into()));
        record.set("job", Value::Str("build".into()));
        let need = Need::from_value(&Value::Record(record), &mut by_name).unwrap();

        assert!(matches!(need, Need::External(_)));
        assert_eq!(need.job(), None);
    }

    #[test]
    fn rejects_other_values() {
        assert!(Need::from_value(&Value::Int(3), &mut by_name).is_err());
    }
}
