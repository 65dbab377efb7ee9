use crate::error::{Error, Result};
use crate::import::ir::{IrInclude, IrJob, IrNeed, IrPipeline, IrRule};
use crate::model::{Intrinsic, OneOrMany, RecordType, When, field_name, wire_key};
use proc_macro2::{Literal, TokenStream};
use quote::{format_ident, quote};
use regex::Regex;
use serde_yaml::{Mapping, Number, Value as YamlValue};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// How generated declarations are laid out on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputMode {
    /// Everything in `pipeline.rs`.
    #[default]
    SingleFile,

    /// `mod.rs`, `pipeline.rs`, `rules.rs` and `jobs.rs`.
    PerCategory,
}

/// A generated source file, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    /// Where the file goes, relative to the source directory.
    pub path: PathBuf,
    /// The Rust source.
    pub contents: String,
}

const HEADER_DOC: &str = " GitLab CI declarations imported by ci-forge.";

/// Bindings the generated code never uses for jobs.
const RESERVED: &[&str] = &["PIPELINE", "CI", "MR"];

/// Generates declaration source for `pipeline`.
///
/// # Errors
///
/// Fails only if the generated code cannot be laid out, which indicates a bug.
pub fn generate(pipeline: &IrPipeline, mode: OutputMode) -> Result<Vec<GeneratedFile>> {
    let generator = Generator::new(pipeline)?;

    let pipeline_item = if pipeline.has_globals() {
        Some(generator.pipeline(pipeline)?)
    } else {
        None
    };

    let mut rule_items = Vec::new();
    let mut job_items = Vec::new();
    let mut interleaved = Vec::new();
    for job in &pipeline.jobs {
        let (rules, item) = generator.job(job)?;
        if let Some(rules) = rules {
            rule_items.push(rules.clone());
            interleaved.push(rules);
        }
        job_items.push(item.clone());
        interleaved.push(item);
    }

    let prelude = quote!(use ci_forge::prelude::*;);
    match mode {
        OutputMode::SingleFile => {
            let items: Vec<TokenStream> = pipeline_item.into_iter().chain(interleaved).collect();
            Ok(vec![file("pipeline.rs", &quote!(#![doc = #HEADER_DOC] #prelude), &items)?])
        }
        OutputMode::PerCategory => {
            let module = quote! {
                #![doc = #HEADER_DOC]
                pub mod pipeline;
                pub mod rules;
                pub mod jobs;
            };
            Ok(vec![
                file("mod.rs", &module, &[])?,
                file("pipeline.rs", &prelude, &pipeline_item.into_iter().collect::<Vec<_>>())?,
                file("rules.rs", &prelude, &rule_items)?,
                file("jobs.rs", &quote!(#prelude use super::rules::*;), &job_items)?,
            ])
        }
    }
}

fn file(path: &str, header: &TokenStream, items: &[TokenStream]) -> Result<GeneratedFile> {
    let mut sections = vec![unparse(header.clone())?];
    for item in items {
        sections.push(unparse(item.clone())?);
    }

    Ok(GeneratedFile {
        path: PathBuf::from(path),
        contents: sections.join("\n"),
    })
}

fn unparse(tokens: TokenStream) -> Result<String> {
    let file: syn::File = syn::parse2(tokens).map_err(|e| Error::internal(format!("generated source does not parse: {e}")))?;
    Ok(prettyplease::unparse(&file))
}

/// The shape a wire value is expected to have, which decides how it is written.
#[derive(Debug, Clone, Copy)]
enum Shape {
    Any,
    Record(RecordType),
    Variables,
    Variable,

    /// A rule condition, kept exactly as written.
    Condition,
}

fn nested(kind: RecordType, field: &str) -> Shape {
    use RecordType as R;

    match (kind, field) {
        (R::Job | R::Pipeline | R::Rule | R::Service, "variables") => Shape::Variables,
        (R::Rule, "if_") => Shape::Condition,
        (R::Job | R::Defaults, "image") => Shape::Record(R::Image),
        (R::Job | R::Defaults | R::Pipeline, "services") => Shape::Record(R::Service),
        (R::Job | R::Defaults | R::Pipeline, "cache") => Shape::Record(R::Cache),
        (R::Job | R::Defaults, "artifacts") => Shape::Record(R::Artifacts),
        (R::Job | R::Defaults, "retry") => Shape::Record(R::Retry),
        (R::Job, "environment") => Shape::Record(R::Environment),
        (R::Job, "parallel") => Shape::Record(R::Parallel),
        (R::Job, "trigger") => Shape::Record(R::Trigger),
        (R::Job, "release") => Shape::Record(R::Release),
        (R::Workflow | R::Include, "rules") => Shape::Record(R::Rule),
        (R::Artifacts, "reports") => Shape::Record(R::Reports),
        (R::Cache, "key") => Shape::Record(R::CacheKey),
        (R::Pipeline, "workflow") => Shape::Record(R::Workflow),
        (R::Pipeline, "default") => Shape::Record(R::Defaults),
        (R::Pipeline, "include") => Shape::Record(R::Include),
        _ => Shape::Any,
    }
}

/// The record field a wire key maps to, if `kind` declares it.
fn field_for(kind: RecordType, key: &str) -> Option<&'static str> {
    let field = field_name(key);
    if field == "extra" || wire_key(field) != key {
        return None;
    }
    kind.fields().iter().copied().find(|f| *f == field)
}

/// Turns a job name into a `SCREAMING_SNAKE` binding.
pub(crate) fn binding_name(job: &str) -> String {
    let (hidden, rest) = job.strip_prefix('.').map_or((false, job), |rest| (true, rest));

    let mut out = String::new();
    let mut after_lower = false;
    for c in rest.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && after_lower {
                out.push('_');
            }
            out.push(c.to_ascii_uppercase());
            after_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            after_lower = false;
        }
    }

    let mut name = match out.trim_end_matches('_') {
        "" => "JOB".to_string(),
        trimmed => trimmed.to_string(),
    };
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name = format!("JOB_{name}");
    }
    if hidden {
        name = format!("HIDDEN_{name}");
    }
    name
}

#[derive(Debug)]
struct Names {
    used: HashSet<String>,
}

impl Names {
    fn new() -> Self {
        Self {
            used: RESERVED.iter().map(ToString::to_string).collect(),
        }
    }

    fn claim(&mut self, base: String) -> String {
        let name = if self.used.contains(&base) {
            (2_usize..)
                .map(|i| format!("{base}_{i}"))
                .find(|candidate| !self.used.contains(candidate))
                .unwrap_or_default()
        } else {
            base
        };
        _ = self.used.insert(name.clone());
        name
    }
}

#[derive(Debug)]
struct Generator<'a> {
    intrinsic: Regex,
    jobs: HashMap<&'a str, String>,
    rules: HashMap<&'a str, String>,
}

impl<'a> Generator<'a> {
    fn new(pipeline: &'a IrPipeline) -> Result<Self> {
        let intrinsic = Regex::new(r"\$([A-Z_][A-Z0-9_]*)").map_err(|e| Error::internal(format!("invalid intrinsic pattern: {e}")))?;

        let mut names = Names::new();
        let jobs: HashMap<&str, String> = pipeline
            .jobs
            .iter()
            .map(|job| (job.name.as_str(), names.claim(binding_name(&job.name))))
            .collect();

        let rules = pipeline
            .jobs
            .iter()
            .filter(|job| job.rules.as_ref().is_some_and(|rules| !rules.is_empty()))
            .filter_map(|job| {
                let binding = jobs.get(job.name.as_str())?;
                Some((job.name.as_str(), names.claim(format!("{binding}_RULES"))))
            })
            .collect();

        Ok(Self { intrinsic, jobs, rules })
    }

    fn pipeline(&self, pipeline: &IrPipeline) -> Result<TokenStream> {
        let mut fields = Vec::new();

        if let Some(stages) = &pipeline.stages {
            fields.push(quote!(stages: &[#(#stages),*]));
        }
        if let Some(workflow) = &pipeline.workflow {
            let value = self.value(workflow, Shape::Record(RecordType::Workflow))?;
            fields.push(quote!(workflow: #value));
        }
        if let Some(includes) = &pipeline.includes {
            let value = match includes {
                OneOrMany::One(include) => self.include(include)?,
                OneOrMany::Many(includes) => {
                    let items = includes.iter().map(|i| self.include(i)).collect::<Result<Vec<_>>>()?;
                    quote!(&[#(#items),*])
                }
            };
            fields.push(quote!(include: #value));
        }
        if let Some(default) = &pipeline.default {
            let value = self.value(default, Shape::Record(RecordType::Defaults))?;
            fields.push(quote!(default: #value));
        }
        if let Some(variables) = &pipeline.variables {
            let value = self.value(variables, Shape::Variables)?;
            fields.push(quote!(variables: #value));
        }
        if let Some(cache) = &pipeline.cache {
            let value = self.value(cache, Shape::Record(RecordType::Cache))?;
            fields.push(quote!(cache: #value));
        }
        if let Some(services) = &pipeline.services {
            let value = self.value(services, Shape::Record(RecordType::Service))?;
            fields.push(quote!(services: #value));
        }
        if !pipeline.passthrough.is_empty() {
            let blocks = pipeline
                .passthrough
                .iter()
                .map(|block| {
                    let key = &block.key;
                    let marker = format_ident!("{}", block.marker.as_str());
                    let value = raw_yaml(&block.value)?;
                    Ok(quote!(Passthrough { key: #key, marker: Marker::#marker, value: #value }))
                })
                .collect::<Result<Vec<_>>>()?;
            fields.push(quote!(passthrough: &[#(#blocks),*]));
        }

        Ok(quote! {
            pub const PIPELINE: Pipeline = Pipeline { #(#fields),* };
        })
    }

    fn include(&self, include: &IrInclude) -> Result<TokenStream> {
        match include {
            IrInclude::Path(path) => Ok(self.text(path)),
            IrInclude::Entry(entries) => {
                let entries: Vec<(String, &YamlValue)> = entries.iter().map(|(k, v)| (k.clone(), v)).collect();
                self.record(RecordType::Include, &entries)
            }
        }
    }

    /// Returns the rule list item, if the job has a non-empty one, and the job item.
    fn job(&self, job: &IrJob) -> Result<(Option<TokenStream>, TokenStream)> {
        let binding = self
            .jobs
            .get(job.name.as_str())
            .ok_or_else(|| Error::internal(format!("job '{}' has no binding", job.name)))?;
        let binding = format_ident!("{binding}");

        let mut fields: Vec<(&str, TokenStream)> = Vec::new();
        let name = &job.name;
        fields.push(("name", quote!(#name)));

        if let Some(stage) = &job.stage {
            fields.push(("stage", quote!(#stage)));
        }
        if let Some(extends) = &job.extends {
            let value = match extends {
                OneOrMany::One(target) => self.job_ref(job, target),
                OneOrMany::Many(targets) => {
                    let targets = targets.iter().map(|t| self.job_ref(job, t));
                    quote!(&[#(#targets),*])
                }
            };
            fields.push(("extends", value));
        }
        if let Some(needs) = &job.needs {
            let needs = needs.iter().map(|need| self.need(job, need)).collect::<Result<Vec<_>>>()?;
            fields.push(("needs", quote!(&[#(#needs),*])));
        }
        if let Some(dependencies) = &job.dependencies {
            let dependencies = dependencies.iter().map(|d| self.job_ref(job, d));
            fields.push(("dependencies", quote!(&[#(#dependencies),*])));
        }
        if let Some(when) = job.when {
            fields.push(("when", when_constant(when)));
        }
        for (key, value) in &job.fields {
            if let Some(field) = field_for(RecordType::Job, key) {
                fields.push((field, self.value(value, nested(RecordType::Job, field))?));
            }
        }
        if !job.extra.is_empty() {
            let extra: Vec<(String, &YamlValue)> = job.extra.iter().map(|(k, v)| (k.clone(), v)).collect();
            fields.push(("extra", self.pairs(&extra, |_| Shape::Any)?));
        }

        let mut rules_item = None;
        if let Some(rules) = &job.rules {
            let value = if let Some(rules_binding) = self.rules.get(job.name.as_str()) {
                let rules_binding = format_ident!("{rules_binding}");
                let rules = rules.iter().map(|rule| self.rule(rule)).collect::<Result<Vec<_>>>()?;
                rules_item = Some(quote! {
                    pub const #rules_binding: &[Rule] = &[#(#rules),*];
                });
                quote!(#rules_binding)
            } else {
                quote!(&[])
            };
            fields.push(("rules", value));
        }

        fields.sort_by_key(|(field, _)| RecordType::Job.field_rank(field));
        let fields = fields.iter().map(|(field, value)| {
            let field = format_ident!("{field}");
            quote!(#field: #value)
        });

        let item = quote! {
            pub const #binding: Job = Job { #(#fields),* };
        };
        Ok((rules_item, item))
    }

    /// A reference to another job in the document, or its name when it is not one.
    fn job_ref(&self, from: &IrJob, target: &str) -> TokenStream {
        match self.jobs.get(target) {
            Some(binding) if target != from.name => {
                let binding = format_ident!("{binding}");
                quote!(&#binding)
            }
            _ => quote!(#target),
        }
    }

    fn need(&self, from: &IrJob, need: &IrNeed) -> Result<TokenStream> {
        Ok(match need {
            IrNeed::Job(target) => self.job_ref(from, target),
            IrNeed::Detailed { job, artifacts, optional } => {
                let job = self.job_ref(from, job);
                let artifacts = artifacts.map(|a| quote!(artifacts: #a));
                let optional = optional.map(|o| quote!(optional: #o));
                let fields = core::iter::once(quote!(job: #job)).chain(artifacts).chain(optional);
                quote!(Need { #(#fields),* })
            }
            IrNeed::External(entries) => {
                let entries: Vec<(String, &YamlValue)> = entries.iter().map(|(k, v)| (k.clone(), v)).collect();
                self.record(RecordType::Need, &entries)?
            }
        })
    }

    fn rule(&self, rule: &IrRule) -> Result<TokenStream> {
        let mut fields: Vec<(&str, TokenStream)> = Vec::new();
        if let Some(condition) = &rule.if_ {
            fields.push(("if_", quote!(#condition)));
        }
        if let Some(when) = rule.when {
            fields.push(("when", when_constant(when)));
        }
        for (key, value) in &rule.fields {
            if let Some(field) = field_for(RecordType::Rule, key) {
                fields.push((field, self.value(value, nested(RecordType::Rule, field))?));
            }
        }
        if !rule.extra.is_empty() {
            let extra: Vec<(String, &YamlValue)> = rule.extra.iter().map(|(k, v)| (k.clone(), v)).collect();
            fields.push(("extra", self.pairs(&extra, |_| Shape::Any)?));
        }

        fields.sort_by_key(|(field, _)| RecordType::Rule.field_rank(field));
        let fields = fields.iter().map(|(field, value)| {
            let field = format_ident!("{field}");
            quote!(#field: #value)
        });
        Ok(quote!(Rule { #(#fields),* }))
    }

    fn value(&self, value: &YamlValue, shape: Shape) -> Result<TokenStream> {
        match (value, shape) {
            (YamlValue::Bool(b), _) => Ok(quote!(#b)),
            (YamlValue::Number(n), _) => number(n, value),
            (YamlValue::String(s), Shape::Condition) => Ok(quote!(#s)),
            (YamlValue::String(s), _) => Ok(self.text(s)),
            (YamlValue::Sequence(_), Shape::Variable) => raw_yaml(value),
            (YamlValue::Sequence(items), _) => {
                let items = items.iter().map(|item| self.value(item, shape)).collect::<Result<Vec<_>>>()?;
                Ok(quote!(&[#(#items),*]))
            }
            (YamlValue::Mapping(mapping), _) => self.mapping(value, mapping, shape),
            (YamlValue::Null | YamlValue::Tagged(_), _) => raw_yaml(value),
        }
    }

    fn mapping(&self, value: &YamlValue, mapping: &Mapping, shape: Shape) -> Result<TokenStream> {
        let entries: Option<Vec<(String, &YamlValue)>> = mapping.iter().map(|(k, v)| Some((k.as_str()?.to_string(), v))).collect();
        let Some(entries) = entries else {
            return raw_yaml(value);
        };
        if entries.is_empty() {
            return raw_yaml(value);
        }

        match shape {
            Shape::Record(kind) => self.record(kind, &entries),
            Shape::Variables => self.pairs(&entries, |_| Shape::Variable),
            Shape::Variable if entries.iter().all(|(key, _)| field_for(RecordType::Variable, key).is_some()) => {
                self.record(RecordType::Variable, &entries)
            }
            Shape::Variable => raw_yaml(value),
            Shape::Any | Shape::Condition => self.pairs(&entries, |_| Shape::Any),
        }
    }

    /// A typed record literal when the keys fit `kind`, otherwise a list of pairs.
    fn record(&self, kind: RecordType, entries: &[(String, &YamlValue)]) -> Result<TokenStream> {
        let (known, unknown): (Vec<_>, Vec<_>) = entries.iter().partition(|(key, _)| field_for(kind, key).is_some());
        if !unknown.is_empty() && !kind.has_field("extra") {
            return self.pairs(entries, |key| nested(kind, field_name(key)));
        }

        let mut fields: Vec<(&str, TokenStream)> = Vec::new();
        for (key, value) in known {
            let Some(field) = field_for(kind, key) else {
                continue;
            };
            let written = match (kind, field, value.as_str().and_then(|s| s.parse::<When>().ok())) {
                (RecordType::Rule, "when", Some(when)) => when_constant(when),
                _ => self.value(value, nested(kind, field))?,
            };
            fields.push((field, written));
        }
        if !unknown.is_empty() {
            let unknown: Vec<(String, &YamlValue)> = unknown.into_iter().map(|(k, v)| (k.clone(), *v)).collect();
            fields.push(("extra", self.pairs(&unknown, |_| Shape::Any)?));
        }

        fields.sort_by_key(|(field, _)| kind.field_rank(field));
        let name = format_ident!("{}", kind.name());
        let fields = fields.iter().map(|(field, value)| {
            let field = format_ident!("{field}");
            quote!(#field: #value)
        });
        Ok(quote!(#name { #(#fields),* }))
    }

    fn pairs(&self, entries: &[(String, &YamlValue)], shape_of: impl Fn(&str) -> Shape) -> Result<TokenStream> {
        let pairs = entries
            .iter()
            .map(|(key, value)| {
                let value = self.value(value, shape_of(key))?;
                Ok(quote!((#key, #value)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(quote!(&[#(#pairs),*]))
    }

    /// Writes text, turning unbraced `$VARIABLE` occurrences of intrinsics into intrinsic syntax.
    fn text(&self, text: &str) -> TokenStream {
        let mut template = String::new();
        let mut args = Vec::new();
        let mut last = 0;

        for captures in self.intrinsic.captures_iter(text) {
            let (Some(whole), Some(variable)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let Some(intrinsic) = Intrinsic::by_variable(variable.as_str()) else {
                continue;
            };

            template.push_str(&escape_braces(text.get(last..whole.start()).unwrap_or_default()));
            template.push_str("{}");
            args.push(intrinsic_path(intrinsic));
            last = whole.end();
        }

        let rest = text.get(last..).unwrap_or_default();
        match args.as_slice() {
            [] => quote!(#text),
            [only] if template == "{}" && rest.is_empty() => only.clone(),
            _ => {
                template.push_str(&escape_braces(rest));
                quote!(format!(#template, #(#args),*))
            }
        }
    }
}

fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

fn intrinsic_path(intrinsic: &Intrinsic) -> TokenStream {
    let namespace = format_ident!("{}", intrinsic.namespace());
    let name = format_ident!("{}", intrinsic.name());
    quote!(#namespace::#name)
}

fn when_constant(when: When) -> TokenStream {
    let variant = format_ident!("{when:?}");
    quote!(When::#variant)
}

fn number(number: &Number, value: &YamlValue) -> Result<TokenStream> {
    if let Some(i) = number.as_i64() {
        if i == i64::MIN {
            return raw_yaml(value);
        }
        let magnitude = Literal::u64_unsuffixed(i.unsigned_abs());
        return Ok(if i < 0 { quote!(-#magnitude) } else { quote!(#magnitude) });
    }

    match number.as_f64() {
        Some(f) if f.is_finite() && number.as_u64().is_none() => {
            let magnitude = Literal::f64_unsuffixed(f.abs());
            Ok(if f.is_sign_negative() { quote!(-#magnitude) } else { quote!(#magnitude) })
        }
        _ => raw_yaml(value),
    }
}

/// `yaml!(r"..")` holding the value verbatim.
fn raw_yaml(value: &YamlValue) -> Result<TokenStream> {
    let text = serde_yaml::to_string(value).map_err(|e| Error::internal(format!("unable to encode a raw value: {e}")))?;
    let literal = raw_literal(text.trim_end())?;
    Ok(quote!(yaml!(#literal)))
}

fn raw_literal(text: &str) -> Result<Literal> {
    if text.contains('\r') {
        return Ok(Literal::string(text));
    }

    let mut hashes = String::new();
    while text.contains(&format!("\"{hashes}")) {
        hashes.push('#');
    }

    format!("r{hashes}\"{text}\"{hashes}")
        .parse()
        .map_err(|e| Error::internal(format!("unable to write a raw string literal: {e}")))
}
