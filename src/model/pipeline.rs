use crate::model::declaration::{Declaration, ReferenceResolver, checked_fields, text, text_list};
use crate::model::{Marker, Record, RecordType, Value};

/// The stage list the orchestrator uses when a pipeline declares none.
pub const DEFAULT_STAGES: &[&str] = &[".pre", "build", "test", "deploy", ".post"];

/// Runs before every declared stage, whether or not the stage list names it.
pub const PRE_STAGE: &str = ".pre";

/// Runs after every declared stage, whether or not the stage list names it.
pub const POST_STAGE: &str = ".post";

/// A top-level block carried through verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct Passthrough {
    /// The top-level key.
    pub key: String,
    /// Why the model does not cover the block.
    pub marker: Marker,
    /// The block as written.
    pub value: Value,
}

/// The top-level pipeline: stage order and global configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    /// Declared stage order. `None` means the default stages.
    pub stages: Option<Vec<String>>,
    /// `workflow`.
    pub workflow: Option<Value>,
    /// `include`.
    pub include: Option<Value>,
    /// `default`.
    pub default: Option<Value>,
    /// `variables`.
    pub variables: Option<Value>,
    /// `cache`.
    pub cache: Option<Value>,
    /// `services`.
    pub services: Option<Value>,
    /// Blocks carried through verbatim, in declared order.
    pub passthrough: Vec<Passthrough>,
}

impl Pipeline {
    /// The effective stage list, always bracketed by `.pre` and `.post`.
    #[must_use]
    pub fn stage_list(&self) -> Vec<&str> {
        let Some(stages) = &self.stages else {
            return DEFAULT_STAGES.to_vec();
        };

        let mut list: Vec<&str> = stages.iter().map(String::as_str).collect();
        if !list.contains(&PRE_STAGE) {
            list.insert(0, PRE_STAGE);
        }
        if !list.contains(&POST_STAGE) {
            list.push(POST_STAGE);
        }
        list
    }

    /// Loosely typed global section by wire key.
    #[must_use]
    pub fn section(&self, key: &str) -> Option<&Value> {
        match key {
            "workflow" => self.workflow.as_ref(),
            "include" => self.include.as_ref(),
            "default" => self.default.as_ref(),
            "variables" => self.variables.as_ref(),
            "cache" => self.cache.as_ref(),
            "services" => self.services.as_ref(),
            _ => None,
        }
    }
}

fn passthrough(value: &Value) -> Result<Passthrough, String> {
    let Value::Record(record) = value else {
        return Err(format!("`passthrough` entries must be `Passthrough` records, found {}", value.type_name()));
    };

    if record.kind != RecordType::Passthrough {
        return Err(format!("`passthrough` entries must be `Passthrough` records, found a `{}`", record.kind));
    }

    let key = record.get("key").ok_or("a `Passthrough` needs a `key`")?;
    let marker = record.get("marker").ok_or("a `Passthrough` needs a `marker`")?;
    let value = record.get("value").ok_or("a `Passthrough` needs a `value`")?;

    Ok(Passthrough {
        key: text("key", key)?,
        marker: text("marker", marker)?.parse()?,
        value: value.clone(),
    })
}

impl Declaration for Pipeline {
    const KIND: RecordType = RecordType::Pipeline;

    fn from_record(record: &Record, _references: &mut ReferenceResolver<'_>) -> Result<Self, String> {
        if record.kind != RecordType::Pipeline {
            return Err(format!("expected a `Pipeline`, found a `{}`", record.kind));
        }

        let mut pipeline = Self::default();
        for (field, value) in checked_fields(record)? {
            match field {
                "stages" => pipeline.stages = Some(text_list(field, value)?),
                "workflow" => pipeline.workflow = Some(value.clone()),
                "include" => pipeline.include = Some(value.clone()),
                "default" => pipeline.default = Some(value.clone()),
                "variables" => pipeline.variables = Some(value.clone()),
                "cache" => pipeline.cache = Some(value.clone()),
                "services" => pipeline.services = Some(value.clone()),
                "passthrough" => match value {
                    Value::List(items) => pipeline.passthrough = items.iter().map(passthrough).collect::<Result<_, _>>()?,
                    other => return Err(format!("field `passthrough` must be a list, found {}", other.type_name())),
                },
                _ => return Err(format!("unexpected pipeline field `{field}`")),
            }
        }

        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_references(_: &Record) -> Result<String, String> {
        Err("unexpected reference".into())
    }

    #[test]
    fn default_stage_list_applies_without_stages() {
        assert_eq!(Pipeline::default().stage_list(), DEFAULT_STAGES.to_vec());

        let pipeline = Pipeline {
            stages: Some(vec!["lint".into(), "ship".into()]),
            ..Pipeline::default()
        };
        assert_eq!(pipeline.stage_list(), vec![".pre", "lint", "ship", ".post"]);
    }

    #[test]
    fn declared_pre_and_post_keep_their_place() {
        let pipeline = Pipeline {
            stages: Some(vec![".pre".into(), "build".into(), ".post".into()]),
            ..Pipeline::default()
        };
        assert_eq!(pipeline.stage_list(), vec![".pre", "build", ".post"]);
    }

    #[test]
    fn converts_passthrough_blocks() {
        let mut block = Record::new(RecordType::Passthrough);
        block.set("key", Value::Str("my_custom_key".into()));
        block.set("marker", Value::Str("UnknownKey".into()));
        block.set("value", Value::Opaque(serde_yaml::Value::Bool(true)));

        let mut record = Record::new(RecordType::Pipeline);
        record.set("stages", Value::List(vec![Value::Str("build".into())]));
        record.set("passthrough", Value::List(vec![Value::Record(block)]));

        let pipeline = Pipeline::from_record(&record, &mut no_references).unwrap();
        assert_eq!(pipeline.passthrough.len(), 1);
        assert_eq!(pipeline.passthrough[0].marker, Marker::UnknownKey);
        assert_eq!(pipeline.passthrough[0].key, "my_custom_key");
    }

    #[test]
    fn stages_must_be_strings() {
        let mut record = Record::new(RecordType::Pipeline);
        record.set("stages", Value::List(vec![Value::Int(1)]));
        assert!(Pipeline::from_record(&record, &mut no_references).is_err());
    }
}
