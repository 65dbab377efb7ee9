use crate::model::declaration::{Declaration, ReferenceResolver, checked_fields, job_name, pairs, text};
use crate::model::{Need, Record, RecordType, Rule, Value, When};
use serde::Serialize;

/// The stage a job runs in when it does not declare one.
pub const DEFAULT_STAGE: &str = "test";

/// Either a single value or a list of values, as several wire keys accept both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    /// A single value.
    One(T),
    /// A list.
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    /// The values, one or many.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        match self {
            Self::One(one) => core::slice::from_ref(one).iter(),
            Self::Many(many) => many.iter(),
        }
    }
}

/// A named unit of pipeline work.
///
/// Fields that the compiler never interprets hold loosely typed [`Value`]s and are
/// passed through to the wire document as written. Unknown keys live in `extra`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Job {
    /// The job name, unique in the pipeline.
    pub name: String,
    /// Templates this job extends.
    pub extends: Option<OneOrMany<String>>,
    /// `stage`.
    pub stage: Option<String>,
    /// `image`.
    pub image: Option<Value>,
    /// `services`.
    pub services: Option<Value>,
    /// `variables`.
    pub variables: Option<Value>,
    /// Jobs this job needs.
    pub needs: Option<Vec<Need>>,
    /// Jobs whose artifacts this job downloads.
    pub dependencies: Option<Vec<String>>,
    /// `cache`.
    pub cache: Option<Value>,
    /// `before_script`.
    pub before_script: Option<Value>,
    /// `script`.
    pub script: Option<Value>,
    /// `after_script`.
    pub after_script: Option<Value>,

    /// `Some(vec![])` is an explicit empty rule list: the job never runs.
    pub rules: Option<Vec<Rule>>,

    /// `when`.
    pub when: Option<When>,
    /// `start_in`.
    pub start_in: Option<String>,
    /// `allow_failure`.
    pub allow_failure: Option<Value>,
    /// `artifacts`.
    pub artifacts: Option<Value>,
    /// `environment`.
    pub environment: Option<Value>,
    /// `coverage`.
    pub coverage: Option<Value>,
    /// `retry`.
    pub retry: Option<Value>,
    /// `timeout`.
    pub timeout: Option<Value>,
    /// `tags`.
    pub tags: Option<Value>,
    /// `resource_group`.
    pub resource_group: Option<Value>,
    /// `interruptible`.
    pub interruptible: Option<Value>,
    /// `parallel`.
    pub parallel: Option<Value>,
    /// `trigger`.
    pub trigger: Option<Value>,
    /// `release`.
    pub release: Option<Value>,
    /// `secrets`.
    pub secrets: Option<Value>,
    /// `id_tokens`.
    pub id_tokens: Option<Value>,
    /// `inherit`.
    pub inherit: Option<Value>,
    /// Keys the model does not know, in declared order.
    pub extra: Vec<(String, Value)>,
}

impl Job {
    /// A job named `name` with nothing else set.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Hidden jobs (`.name`) are templates: they are emitted but never run.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    /// The declared stage, or the orchestrator default.
    #[must_use]
    pub fn effective_stage(&self) -> &str {
        self.stage.as_deref().unwrap_or(DEFAULT_STAGE)
    }

    /// Names of the jobs this job depends on for ordering: its in-pipeline needs and its extends targets.
    #[must_use]
    pub fn dependency_names(&self) -> Vec<&str> {
        let needs = self.needs.iter().flatten().filter_map(Need::job);
        let extends = self.extends.iter().flat_map(OneOrMany::iter).map(String::as_str);
        let mut names: Vec<&str> = Vec::new();
        for name in needs.chain(extends) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Loosely typed field by name.
    #[must_use]
    pub fn loose(&self, field: &str) -> Option<&Value> {
        match field {
            "image" => self.image.as_ref(),
            "services" => self.services.as_ref(),
            "variables" => self.variables.as_ref(),
            "cache" => self.cache.as_ref(),
            "before_script" => self.before_script.as_ref(),
            "script" => self.script.as_ref(),
            "after_script" => self.after_script.as_ref(),
            "allow_failure" => self.allow_failure.as_ref(),
            "artifacts" => self.artifacts.as_ref(),
            "environment" => self.environment.as_ref(),
            "coverage" => self.coverage.as_ref(),
            "retry" => self.retry.as_ref(),
            "timeout" => self.timeout.as_ref(),
            "tags" => self.tags.as_ref(),
            "resource_group" => self.resource_group.as_ref(),
            "interruptible" => self.interruptible.as_ref(),
            "parallel" => self.parallel.as_ref(),
            "trigger" => self.trigger.as_ref(),
            "release" => self.release.as_ref(),
            "secrets" => self.secrets.as_ref(),
            "id_tokens" => self.id_tokens.as_ref(),
            "inherit" => self.inherit.as_ref(),
            _ => None,
        }
    }

    fn loose_mut(&mut self, field: &str) -> Option<&mut Option<Value>> {
        Some(match field {
            "image" => &mut self.image,
            "services" => &mut self.services,
            "variables" => &mut self.variables,
            "cache" => &mut self.cache,
            "before_script" => &mut self.before_script,
            "script" => &mut self.script,
            "after_script" => &mut self.after_script,
            "allow_failure" => &mut self.allow_failure,
            "artifacts" => &mut self.artifacts,
            "environment" => &mut self.environment,
            "coverage" => &mut self.coverage,
            "retry" => &mut self.retry,
            "timeout" => &mut self.timeout,
            "tags" => &mut self.tags,
            "resource_group" => &mut self.resource_group,
            "interruptible" => &mut self.interruptible,
            "parallel" => &mut self.parallel,
            "trigger" => &mut self.trigger,
            "release" => &mut self.release,
            "secrets" => &mut self.secrets,
            "id_tokens" => &mut self.id_tokens,
            "inherit" => &mut self.inherit,
            _ => return None,
        })
    }
}

fn list<'a>(field: &str, value: &'a Value) -> Result<&'a [Value], String> {
    match value {
        Value::List(items) => Ok(items),
        other => Err(format!("field `{field}` must be a list, found {}", other.type_name())),
    }
}

fn script(field: &str, value: &Value) -> Result<Value, String> {
    match value {
        Value::Str(_) | Value::Var(_) | Value::Opaque(_) => Ok(value.clone()),
        Value::List(items) => {
            for item in items {
                if !matches!(item, Value::Str(_) | Value::Var(_) | Value::List(_) | Value::Opaque(_)) {
                    return Err(format!("field `{field}` must hold commands, found {}", item.type_name()));
                }
            }
            Ok(value.clone())
        }
        other => Err(format!("field `{field}` must be a command or a list of commands, found {}", other.type_name())),
    }
}

impl Declaration for Job {
    const KIND: RecordType = RecordType::Job;

    fn from_record(record: &Record, references: &mut ReferenceResolver<'_>) -> Result<Self, String> {
        if record.kind != RecordType::Job {
            return Err(format!("expected a `Job`, found a `{}`", record.kind));
        }

        let mut job = Self::default();
        for (field, value) in checked_fields(record)? {
            match field {
                "name" => job.name = text(field, value)?,
                "stage" => job.stage = Some(text(field, value)?),
                "extends" => {
                    job.extends = Some(match value {
                        Value::List(items) => OneOrMany::Many(
                            items
                                .iter()
                                .map(|item| job_name(field, item, references))
                                .collect::<Result<_, _>>()?,
                        ),
                        single => OneOrMany::One(job_name(field, single, references)?),
                    });
                }
                "needs" => {
                    job.needs = Some(
                        list(field, value)?
                            .iter()
                            .map(|item| Need::from_value(item, references))
                            .collect::<Result<_, _>>()?,
                    );
                }
                "dependencies" => {
                    job.dependencies = Some(
                        list(field, value)?
                            .iter()
                            .map(|item| job_name(field, item, references))
                            .collect::<Result<_, _>>()?,
                    );
                }
                "rules" => job.rules = Some(list(field, value)?.iter().map(Rule::from_value).collect::<Result<_, _>>()?),
                "when" => job.when = Some(text(field, value)?.parse()?),
                "start_in" => job.start_in = Some(text(field, value)?),
                "extra" => job.extra = pairs(field, value)?,
                "script" | "before_script" | "after_script" => {
                    let checked = script(field, value)?;
                    if let Some(slot) = job.loose_mut(field) {
                        *slot = Some(checked);
                    }
                }
                other => {
                    let slot = job.loose_mut(other).ok_or_else(|| format!("unexpected job field `{other}`"))?;
                    *slot = Some(value.clone());
                }
            }
        }

        if job.name.is_empty() {
            return Err("a job must have a non-empty `name`".into());
        }

        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn by_name(record: &Record) -> Result<String, String> {
        record.name().map(ToString::to_string).ok_or_else(|| "unnamed".to_string())
    }

    fn job_record(name: &str) -> Record {
        let mut record = Record::new(RecordType::Job);
        record.set("name", Value::Str(name.into()));
        record
    }

    #[test]
    fn converts_typed_and_loose_fields() {
        let mut record = job_record("test");
        record.set("stage", Value::Str("test".into()));
        record.set("needs", Value::List(vec![Value::Record(job_record("build")), Value::Str("lint".into())]));
        record.set("extends", Value::Str(".base".into()));
        record.set("script", Value::List(vec![Value::Str("cargo test".into())]));
        record.set("tags", Value::List(vec![Value::Str("docker".into())]));
        record.set("when", Value::Str("manual".into()));
        record.set("coverage", Value::Null);

        let job = Job::from_record(&record, &mut by_name).unwrap();
        assert_eq!(job.name, "test");
        assert_eq!(job.when, Some(When::Manual));
        assert_eq!(job.dependency_names(), vec!["build", "lint", ".base"]);
        assert_eq!(job.loose("tags"), Some(&Value::List(vec![Value::Str("docker".into())])));
        assert_eq!(job.coverage, None);
    }

    #[test]
    fn empty_rules_differ_from_absent_rules() {
        let mut record = job_record("x");
        record.set("rules", Value::List(Vec::new()));
        let job = Job::from_record(&record, &mut by_name).unwrap();
        assert_eq!(job.rules, Some(Vec::new()));

        let job = Job::from_record(&job_record("y"), &mut by_name).unwrap();
        assert_eq!(job.rules, None);
    }

    #[test]
    fn requires_a_name() {
        let record = Record::new(RecordType::Job);
        assert!(Job::from_record(&record, &mut by_name).is_err());
    }

    #[test]
    fn rejects_non_command_scripts() {
        let mut record = job_record("x");
        record.set("script", Value::Int(3));
        assert!(Job::from_record(&record, &mut by_name).is_err());
    }

    #[test]
    fn defaults_to_test_stage() {
        assert_eq!(Job::new("a").effective_stage(), "test");
        assert!(Job::new(".template").is_hidden());
    }
}
