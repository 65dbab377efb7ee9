use crate::model::{Marker, OneOrMany, When};
use serde_yaml::Value as YamlValue;

/// A parsed wire document, before any source is generated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrPipeline {
    /// `stages`.
    pub stages: Option<Vec<String>>,
    /// Global `variables`.
    pub variables: Option<YamlValue>,
    /// `include`, short or long form.
    pub includes: Option<OneOrMany<IrInclude>>,
    /// `default`.
    pub default: Option<YamlValue>,
    /// `workflow`.
    pub workflow: Option<YamlValue>,
    /// Global `cache`.
    pub cache: Option<YamlValue>,
    /// Global `services`.
    pub services: Option<YamlValue>,

    /// Jobs and hidden templates, in document order.
    pub jobs: Vec<IrJob>,

    /// Top-level blocks carried through verbatim, in document order.
    pub passthrough: Vec<IrPassthrough>,
}

impl IrPipeline {
    /// Returns `true` if anything besides jobs needs a `Pipeline` declaration.
    #[must_use]
    pub const fn has_globals(&self) -> bool {
        self.stages.is_some()
            || self.variables.is_some()
            || self.includes.is_some()
            || self.default.is_some()
            || self.workflow.is_some()
            || self.cache.is_some()
            || self.services.is_some()
            || !self.passthrough.is_empty()
    }

    /// The job or template named `name`.
    #[must_use]
    pub fn job(&self, name: &str) -> Option<&IrJob> {
        self.jobs.iter().find(|job| job.name == name)
    }
}

/// A job or hidden template.
#[derive(Debug, Clone, PartialEq)]
pub struct IrJob {
    /// The job name, with a leading `.` for templates.
    pub name: String,
    /// `stage`.
    pub stage: Option<String>,
    /// `when`.
    pub when: Option<When>,
    /// `extends`.
    pub extends: Option<OneOrMany<String>>,
    /// `needs`.
    pub needs: Option<Vec<IrNeed>>,
    /// `dependencies`.
    pub dependencies: Option<Vec<String>>,

    /// `Some(vec![])` is an explicit empty rule list.
    pub rules: Option<Vec<IrRule>>,

    /// Other modeled keys, in document order.
    pub fields: Vec<(String, YamlValue)>,

    /// Keys the model does not know, in document order.
    pub extra: Vec<(String, YamlValue)>,
}

impl IrJob {
    /// A job named `name` with nothing else set.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage: None,
            when: None,
            extends: None,
            needs: None,
            dependencies: None,
            rules: None,
            fields: Vec::new(),
            extra: Vec::new(),
        }
    }

    /// Returns `true` for templates, whose names start with `.`.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }

    /// Names of the jobs this job refers to through `needs`, `extends` and `dependencies`.
    pub fn referenced_jobs(&self) -> impl Iterator<Item = &str> {
        let needs = self.needs.iter().flatten().filter_map(IrNeed::job);
        let extends = self.extends.iter().flat_map(OneOrMany::iter).map(String::as_str);
        let dependencies = self.dependencies.iter().flatten().map(String::as_str);
        needs.chain(extends).chain(dependencies)
    }
}

/// One entry of `needs`.
#[derive(Debug, Clone, PartialEq)]
pub enum IrNeed {
    /// A job named by itself.
    Job(String),
    /// A job with `artifacts` or `optional` set.
    Detailed {
        /// The job name.
        job: String,
        /// Whether to download its artifacts.
        artifacts: Option<bool>,
        /// Whether the job may be absent.
        optional: Option<bool>,
    },

    /// A cross-project or cross-pipeline need, kept as written.
    External(Vec<(String, YamlValue)>),
}

impl IrNeed {
    /// The job needed, unless the need is external.
    #[must_use]
    pub fn job(&self) -> Option<&str> {
        match self {
            Self::Job(job) | Self::Detailed { job, .. } => Some(job),
            Self::External(_) => None,
        }
    }
}

/// One entry of `rules`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IrRule {
    /// `if`.
    pub if_: Option<String>,
    /// `when`.
    pub when: Option<When>,

    /// Other modeled keys, in document order.
    pub fields: Vec<(String, YamlValue)>,
    /// Keys the model does not know, in document order.
    pub extra: Vec<(String, YamlValue)>,
}

/// One entry of `include`.
#[derive(Debug, Clone, PartialEq)]
pub enum IrInclude {
    /// The short form: a single file path or URL.
    Path(String),

    /// The long form, such as `{ project, file, ref }`.
    Entry(Vec<(String, YamlValue)>),
}

/// A top-level block the model does not cover.
#[derive(Debug, Clone, PartialEq)]
pub struct IrPassthrough {
    /// The top-level key.
    pub key: String,
    /// How the generated source marks the block.
    pub marker: Marker,
    /// The block as written.
    pub value: YamlValue,
}
