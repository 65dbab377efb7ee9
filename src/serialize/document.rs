use crate::error::{Error, Result};
use crate::model::{Job, Pipeline};
use crate::serialize::job::{check_variables, job_mapping, to_wire};
use core::fmt::{self, Display};
use core::str::FromStr;
use serde::Deserialize;
use serde_yaml::Mapping;

/// The first line of every YAML document the compiler writes.
pub const HEADER: &str = "# Generated by ci-forge. Do not edit.\n";

/// Output text format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// YAML, the format GitLab reads.
    #[default]
    Yaml,

    /// A JSON projection of the same document.
    Json,
}

impl Format {
    /// The usual file extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Yaml => "yml",
            Self::Json => "json",
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown format '{s}', expected 'yaml' or 'json'")),
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
        })
    }
}

const PIPELINE_SCOPE: &str = "<pipeline>";

/// Builds the full document: global sections, passthrough blocks, then jobs in the given order.
///
/// Serialization problems of every job are collected before failing, so one broken
/// job does not hide another.
///
/// # Errors
///
/// Fails with the accumulated [`Error::Serialize`] errors, or if two top-level blocks share a key.
pub fn document(pipeline: Option<&Pipeline>, jobs: &[&Job]) -> Result<Mapping> {
    let mut document = Mapping::new();
    let mut errors = Vec::new();

    if let Some(pipeline) = pipeline {
        if let Some(stages) = &pipeline.stages {
            insert_section(&mut document, &mut errors, "stages", to_wire(stages));
        }

        for key in ["workflow", "include", "default", "variables", "cache", "services"] {
            if let Some(value) = pipeline.section(key) {
                let rendered = if key == "variables" {
                    check_variables(value).and_then(|()| to_wire(value))
                } else {
                    to_wire(value)
                };
                insert_section(&mut document, &mut errors, key, rendered);
            }
        }

        for block in &pipeline.passthrough {
            insert_section(&mut document, &mut errors, &block.key, to_wire(&block.value));
        }
    }

    for job in jobs {
        match job_mapping(job) {
            Ok(mapping) => {
                if document.insert(job.name.as_str().into(), serde_yaml::Value::Mapping(mapping)).is_some() {
                    errors.push(Error::Serialize {
                        job: job.name.clone(),
                        field: "name".into(),
                        message: "the job name collides with another top-level key".into(),
                    });
                }
            }
            Err(e) => errors.extend(e.into_list()),
        }
    }

    Error::collect(errors)?;
    Ok(document)
}

fn insert_section(document: &mut Mapping, errors: &mut Vec<Error>, key: &str, rendered: Result<serde_yaml::Value, String>) {
    match rendered {
        Ok(value) => {
            if document.insert(key.into(), value).is_some() {
                errors.push(Error::Serialize {
                    job: PIPELINE_SCOPE.into(),
                    field: key.into(),
                    message: "the key appears twice at the top level".into(),
                });
            }
        }
        Err(message) => errors.push(Error::Serialize {
            job: PIPELINE_SCOPE.into(),
            field: key.into(),
            message,
        }),
    }
}

/// Renders a document as text. YAML output starts with [`HEADER`] and separates
/// top-level blocks with a blank line.
///
/// # Errors
///
/// Fails if the document cannot be represented in the requested format, such as
/// non-string keys in JSON.
pub fn render(document: &Mapping, format: Format) -> Result<String> {
    match format {
        Format::Yaml => {
            let mut text = String::from(HEADER);
            for (key, value) in document {
                let mut entry = Mapping::new();
                _ = entry.insert(key.clone(), value.clone());
                let block = serde_yaml::to_string(&entry).map_err(|e| Error::internal(format!("unable to render YAML: {e}")))?;
                text.push('\n');
                text.push_str(&block);
            }
            Ok(text)
        }
        Format::Json => {
            let mut text = serde_json::to_string_pretty(document).map_err(|e| Error::Serialize {
                job: PIPELINE_SCOPE.into(),
                field: "document".into(),
                message: format!("no JSON representation: {e}"),
            })?;
            text.push('\n');
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Marker, Need, Passthrough, Value};
    use pretty_assertions::assert_eq;

    fn script(command: &str) -> Option<Value> {
        Some(Value::List(vec![Value::Str(command.into())]))
    }

    fn sample() -> (Pipeline, Vec<Job>) {
        let pipeline = Pipeline {
            stages: Some(vec!["build".into(), "test".into()]),
            variables: Some(Value::List(vec![Value::Tuple(vec![Value::Str("RUST_LOG".into()), Value::Str("debug".into())])])),
            passthrough: vec![Passthrough {
                key: "my_custom_key".into(),
                marker: Marker::UnknownKey,
                value: Value::Opaque(serde_yaml::from_str("{a: 1}").unwrap()),
            }],
            ..Pipeline::default()
        };

        let build = Job {
            stage: Some("build".into()),
            script: script("make"),
            ..Job::new("build")
        };
        let test = Job {
            stage: Some("test".into()),
            needs: Some(vec![Need::Job("build".into())]),
            script: script("make test"),
            ..Job::new("test")
        };

        (pipeline, vec![build, test])
    }

    #[test]
    fn top_level_order_and_yaml_text() {
        let (pipeline, jobs) = sample();
        let jobs: Vec<&Job> = jobs.iter().collect();
        let document = document(Some(&pipeline), &jobs).unwrap();

        let keys: Vec<_> = document.keys().filter_map(serde_yaml::Value::as_str).collect();
        assert_eq!(keys, vec!["stages", "variables", "my_custom_key", "build", "test"]);

        let text = render(&document, Format::Yaml).unwrap();
        assert_eq!(
            text,
            "# Generated by ci-forge. Do not edit.\n\
             \n\
             stages:\n- build\n- test\n\
             \n\
             variables:\n  RUST_LOG: debug\n\
             \n\
             my_custom_key:\n  a: 1\n\
             \n\
             build:\n  stage: build\n  script:\n  - make\n\
             \n\
             test:\n  stage: test\n  needs:\n  - build\n  script:\n  - make test\n"
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let (pipeline, jobs) = sample();
        let jobs: Vec<&Job> = jobs.iter().collect();
        let first = render(&document(Some(&pipeline), &jobs).unwrap(), Format::Yaml).unwrap();
        let second = render(&document(Some(&pipeline), &jobs).unwrap(), Format::Yaml).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn json_projection() {
        let (_, jobs) = sample();
        let jobs: Vec<&Job> = jobs.iter().take(1).collect();
        let text = render(&document(None, &jobs).unwrap(), Format::Json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["build"]["script"][0], "make");
    }

    #[test]
    fn job_names_may_not_collide_with_passthrough_keys() {
        let (mut pipeline, jobs) = sample();
        pipeline.passthrough[0].key = "build".into();
        let jobs: Vec<&Job> = jobs.iter().collect();
        assert!(document(Some(&pipeline), &jobs).is_err());
    }

    #[test]
    fn formats_parse() {
        assert_eq!("yml".parse::<Format>().unwrap(), Format::Yaml);
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert!("toml".parse::<Format>().is_err());
    }
}
