use crate::error::{Error, Result};
use crate::model::{Job, RecordType, Value, wire_key};
use serde::Serialize;
use serde_yaml::Mapping;

/// Renders one job as a mapping with keys in canonical order.
///
/// Every field is attempted; all fields that fail to serialize are reported together.
///
/// # Errors
///
/// Fails with [`Error::Serialize`] for each field holding a value with no wire form.
pub fn job_mapping(job: &Job) -> Result<Mapping> {
    let mut mapping = Mapping::new();
    let mut errors = Vec::new();

    for &field in RecordType::Job.fields() {
        if matches!(field, "name" | "extra") {
            continue;
        }

        let rendered = match field_value(job, field) {
            Some(rendered) => rendered,
            None => continue,
        };

        match rendered {
            Ok(value) => _ = mapping.insert(wire_key(field).into(), value),
            Err(message) => errors.push(Error::Serialize {
                job: job.name.clone(),
                field: field.to_string(),
                message,
            }),
        }
    }

    for (key, value) in &job.extra {
        match to_wire(value) {
            Ok(value) => _ = mapping.insert(key.as_str().into(), value),
            Err(message) => errors.push(Error::Serialize {
                job: job.name.clone(),
                field: key.clone(),
                message,
            }),
        }
    }

    Error::collect(errors)?;
    Ok(mapping)
}

fn field_value(job: &Job, field: &str) -> Option<Result<serde_yaml::Value, String>> {
    Some(match field {
        "extends" => to_wire(job.extends.as_ref()?),
        "stage" => to_wire(job.stage.as_ref()?),
        "needs" => to_wire(job.needs.as_ref()?),
        "dependencies" => to_wire(job.dependencies.as_ref()?),
        "rules" => to_wire(job.rules.as_ref()?),
        "when" => to_wire(job.when.as_ref()?),
        "start_in" => to_wire(job.start_in.as_ref()?),
        "variables" => {
            let variables = job.variables.as_ref()?;
            check_variables(variables).and_then(|()| to_wire(variables))
        }
        other => to_wire(job.loose(other)?),
    })
}

pub(crate) fn to_wire<T: Serialize + ?Sized>(value: &T) -> Result<serde_yaml::Value, String> {
    serde_yaml::to_value(value).map_err(|e| e.to_string())
}

/// Variable maps hold scalars, or `Variable` records with a value and description.
pub(crate) fn check_variables(value: &Value) -> Result<(), String> {
    if matches!(value, Value::Opaque(_)) || matches!(value, Value::List(items) if items.is_empty()) {
        return Ok(());
    }

    let pairs = value
        .as_pairs()
        .ok_or_else(|| format!("variables must be a list of `(name, value)` pairs, found {}", value.type_name()))?;

    for (name, value) in pairs {
        match value {
            Value::Str(_) | Value::Var(_) | Value::Int(_) | Value::Float(_) | Value::Bool(_) | Value::Opaque(_) => {}
            Value::Record(record) if record.kind == RecordType::Variable => {}
            other => return Err(format!("variable '{name}' must be a scalar, found {}", other.type_name())),
        }
    }

    Ok(())
}
