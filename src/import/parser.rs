use crate::error::{Error, Result};
use crate::import::ir::{IrInclude, IrJob, IrNeed, IrPassthrough, IrPipeline, IrRule};
use crate::model::{Marker, OneOrMany, RecordType, When};
use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::HashSet;

/// Top-level keys with a typed home in the pipeline.
const SECTIONS: &[&str] = &["stages", "variables", "include", "default", "workflow", "cache", "services"];

/// Deprecated global keywords, kept verbatim.
const GLOBAL_KEYWORDS: &[&str] = &["image", "before_script", "after_script"];

/// Keys that make a top-level mapping a job.
const JOB_KEYWORDS: &[&str] = &["script", "trigger", "extends", "run"];

const NEED_KEYS: &[&str] = &["job", "project", "ref", "pipeline", "artifacts", "optional", "parallel"];

/// Parses a wire document into IR.
///
/// An empty document is an empty pipeline.
///
/// # Errors
///
/// Fails with [`Error::Schema`] if the text is not YAML, the document is not a
/// mapping, or a modeled key holds a value of the wrong shape.
pub fn parse_document(text: &str) -> Result<IrPipeline> {
    let document: YamlValue = serde_yaml::from_str(text).map_err(|e| schema("<document>", format!("invalid YAML: {e}")))?;

    let mapping = match document {
        YamlValue::Null => return Ok(IrPipeline::default()),
        YamlValue::Mapping(mapping) => mapping,
        other => return Err(schema("<document>", format!("expected a mapping at the top level, found {}", kind(&other)))),
    };

    let mut pipeline = IrPipeline::default();
    let mut errors = Vec::new();

    for (key, value) in mapping {
        let Some(key) = key.as_str().map(ToString::to_string) else {
            errors.push(schema("<document>", format!("top-level keys must be strings, found {}", kind(&key))));
            continue;
        };

        if has_merge_key(&value) {
            log::debug!("keeping '{key}' verbatim because it uses merge keys");
            pipeline.passthrough.push(passthrough(key, Marker::MergeKey, value));
        } else if GLOBAL_KEYWORDS.contains(&key.as_str()) {
            pipeline.passthrough.push(passthrough(key, Marker::GlobalKeyword, value));
        } else if SECTIONS.contains(&key.as_str()) {
            if let Err(e) = section(&mut pipeline, &key, value) {
                errors.push(e);
            }
        } else if is_job(&key, &value) {
            match job(&key, &value) {
                Ok(job) => pipeline.jobs.push(job),
                Err(e) => errors.push(e),
            }
        } else {
            pipeline.passthrough.push(passthrough(key, Marker::UnknownKey, value));
        }
    }

    // A value that other jobs refer to as a job has to be one.
    let referenced: HashSet<&str> = pipeline.jobs.iter().flat_map(IrJob::referenced_jobs).collect();
    for block in &pipeline.passthrough {
        if block.marker == Marker::UnknownKey && referenced.contains(block.key.as_str()) && !block.value.is_mapping() {
            errors.push(schema(&block.key, format!("expected the job to be a mapping, found {}", kind(&block.value))));
        }
    }

    Error::collect(errors)?;
    Ok(pipeline)
}

fn schema(path: &str, message: impl Into<String>) -> Error {
    Error::Schema {
        path: path.to_string(),
        message: message.into(),
    }
}

fn passthrough(key: String, marker: Marker, value: YamlValue) -> IrPassthrough {
    IrPassthrough { key, marker, value }
}

fn kind(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "null",
        YamlValue::Bool(_) => "a bool",
        YamlValue::Number(_) => "a number",
        YamlValue::String(_) => "a string",
        YamlValue::Sequence(_) => "a list",
        YamlValue::Mapping(_) => "a mapping",
        YamlValue::Tagged(_) => "a tagged value",
    }
}

fn has_merge_key(value: &YamlValue) -> bool {
    match value {
        YamlValue::Mapping(mapping) => mapping.iter().any(|(k, v)| k.as_str() == Some("<<") || has_merge_key(v)),
        YamlValue::Sequence(items) => items.iter().any(has_merge_key),
        YamlValue::Tagged(tagged) => has_merge_key(&tagged.value),
        _ => false,
    }
}

fn is_job(key: &str, value: &YamlValue) -> bool {
    match value {
        YamlValue::Mapping(mapping) => key.starts_with('.') || JOB_KEYWORDS.iter().any(|k| mapping.contains_key(*k)),
        _ => false,
    }
}

fn section(pipeline: &mut IrPipeline, key: &str, value: YamlValue) -> Result<()> {
    match key {
        "stages" => pipeline.stages = Some(strings(key, &value)?),
        "include" => {
            pipeline.includes = Some(match value {
                YamlValue::Sequence(items) => OneOrMany::Many(
                    items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| include(&format!("include[{i}]"), item))
                        .collect::<Result<_>>()?,
                ),
                single => OneOrMany::One(include(key, &single)?),
            });
        }
        "variables" => pipeline.variables = Some(mapping_section(key, value)?),
        "default" => pipeline.default = Some(mapping_section(key, value)?),
        "workflow" => pipeline.workflow = Some(mapping_section(key, value)?),
        "cache" => pipeline.cache = Some(value),
        "services" => pipeline.services = Some(value),
        _ => return Err(Error::internal(format!("'{key}' is not a pipeline section"))),
    }
    Ok(())
}

fn mapping_section(key: &str, value: YamlValue) -> Result<YamlValue> {
    if value.is_mapping() {
        Ok(value)
    } else {
        Err(schema(key, format!("expected a mapping, found {}", kind(&value))))
    }
}

fn include(path: &str, value: &YamlValue) -> Result<IrInclude> {
    match value {
        YamlValue::String(s) => Ok(IrInclude::Path(s.clone())),
        YamlValue::Mapping(mapping) => Ok(IrInclude::Entry(entries(path, mapping)?)),
        other => Err(schema(path, format!("expected a path or a mapping, found {}", kind(other)))),
    }
}

fn entries(path: &str, mapping: &Mapping) -> Result<Vec<(String, YamlValue)>> {
    mapping
        .iter()
        .map(|(k, v)| match k.as_str() {
            Some(k) => Ok((k.to_string(), v.clone())),
            None => Err(schema(path, format!("keys must be strings, found {}", kind(k)))),
        })
        .collect()
}

fn string(path: &str, value: &YamlValue) -> Result<String> {
    value
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| schema(path, format!("expected a string, found {}", kind(value))))
}

fn strings(path: &str, value: &YamlValue) -> Result<Vec<String>> {
    match value {
        YamlValue::Sequence(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| string(&format!("{path}[{i}]"), item))
            .collect(),
        other => Err(schema(path, format!("expected a list of strings, found {}", kind(other)))),
    }
}

fn when(path: &str, value: &YamlValue) -> Result<When> {
    string(path, value)?.parse().map_err(|e: String| schema(path, e))
}

fn job(name: &str, value: &YamlValue) -> Result<IrJob> {
    let YamlValue::Mapping(mapping) = value else {
        return Err(schema(name, format!("expected the job to be a mapping, found {}", kind(value))));
    };

    let mut job = IrJob::new(name);
    for (key, value) in entries(name, mapping)? {
        let path = format!("{name}.{key}");
        match key.as_str() {
            "stage" => job.stage = Some(string(&path, &value)?),
            "when" => job.when = Some(when(&path, &value)?),
            "extends" => {
                job.extends = Some(match &value {
                    YamlValue::Sequence(_) => OneOrMany::Many(strings(&path, &value)?),
                    single => OneOrMany::One(string(&path, single)?),
                });
            }
            "needs" => job.needs = Some(needs(&path, &value)?),
            "dependencies" => job.dependencies = Some(strings(&path, &value)?),
            "rules" => job.rules = Some(rules(&path, &value)?),
            "start_in" => {
                _ = string(&path, &value)?;
                job.fields.push((key, value));
            }
            "script" | "before_script" | "after_script" => {
                commands(&path, &value)?;
                job.fields.push((key, value));
            }
            "name" | "extra" => job.extra.push((key, value)),
            _ if RecordType::Job.has_field(&key) => job.fields.push((key, value)),
            _ => job.extra.push((key, value)),
        }
    }

    Ok(job)
}

fn commands(path: &str, value: &YamlValue) -> Result<()> {
    match value {
        YamlValue::String(_) | YamlValue::Tagged(_) => Ok(()),
        YamlValue::Sequence(items) => {
            for item in items {
                if !matches!(item, YamlValue::String(_) | YamlValue::Sequence(_) | YamlValue::Tagged(_)) {
                    return Err(schema(path, format!("expected commands, found {}", kind(item))));
                }
            }
            Ok(())
        }
        other => Err(schema(path, format!("expected a command or a list of commands, found {}", kind(other)))),
    }
}

fn needs(path: &str, value: &YamlValue) -> Result<Vec<IrNeed>> {
    let YamlValue::Sequence(items) = value else {
        return Err(schema(path, format!("expected a list, found {}", kind(value))));
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let path = format!("{path}[{i}]");
            match item {
                YamlValue::String(job) => Ok(IrNeed::Job(job.clone())),
                YamlValue::Mapping(mapping) => need(&path, mapping),
                other => Err(schema(&path, format!("expected a job name or a mapping, found {}", kind(other)))),
            }
        })
        .collect()
}

fn need(path: &str, mapping: &Mapping) -> Result<IrNeed> {
    let entries = entries(path, mapping)?;
    if let Some((key, _)) = entries.iter().find(|(key, _)| !NEED_KEYS.contains(&key.as_str())) {
        return Err(schema(path, format!("unexpected key '{key}'")));
    }

    if entries.iter().any(|(key, _)| matches!(key.as_str(), "project" | "pipeline" | "parallel")) {
        return Ok(IrNeed::External(entries));
    }

    let mut job = None;
    let mut artifacts = None;
    let mut optional = None;
    for (key, value) in &entries {
        let flag = || {
            value
                .as_bool()
                .ok_or_else(|| schema(path, format!("'{key}' must be a bool, found {}", kind(value))))
        };
        match key.as_str() {
            "job" => job = Some(string(&format!("{path}.job"), value)?),
            "artifacts" => artifacts = Some(flag()?),
            "optional" => optional = Some(flag()?),
            _ => return Err(schema(path, format!("'{key}' is only valid for cross-pipeline needs"))),
        }
    }

    let job = job.ok_or_else(|| schema(path, "a need must name its 'job'"))?;
    Ok(IrNeed::Detailed { job, artifacts, optional })
}

fn rules(path: &str, value: &YamlValue) -> Result<Vec<IrRule>> {
    let YamlValue::Sequence(items) = value else {
        return Err(schema(path, format!("expected a list of rules, found {}", kind(value))));
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let path = format!("{path}[{i}]");
            match item {
                YamlValue::Mapping(mapping) => rule(&path, mapping),
                other => Err(schema(&path, format!("expected a rule mapping, found {}", kind(other)))),
            }
        })
        .collect()
}

fn rule(path: &str, mapping: &Mapping) -> Result<IrRule> {
    let mut rule = IrRule::default();
    for (key, value) in entries(path, mapping)? {
        let field_path = format!("{path}.{key}");
        match key.as_str() {
            "if" => rule.if_ = Some(string(&field_path, &value)?),
            "when" => rule.when = Some(when(&field_path, &value)?),
            "start_in" => {
                _ = string(&field_path, &value)?;
                rule.fields.push((key, value));
            }
            "changes" | "exists" | "variables" | "allow_failure" | "needs" => rule.fields.push((key, value)),
            _ => rule.extra.push((key, value)),
        }
    }
    Ok(rule)
}
