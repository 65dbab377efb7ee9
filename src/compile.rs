//! The forward pipeline: scan, resolve, check stages, order and serialize.

use crate::error::{Diagnostic, Error, Result};
use crate::graph::{DependencyGraph, GraphNode};
use crate::model::{DEFAULT_STAGES, Job};
use crate::resolve::{Resolution, Resolver};
use crate::scan::{DEFAULT_MODELING_CRATE, DiscoveredDeclaration, Scanner};
use crate::serialize::{Format, document, render};
use serde_yaml::Mapping;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

/// What to compile and how to render it.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Root of the declaration files.
    pub source_dir: PathBuf,

    /// Crates whose names declarations may import, such as `ci_forge`.
    pub modeling_crates: Vec<String>,

    /// How the document is rendered.
    pub format: Format,
}

impl CompileOptions {
    /// Options for `source_dir` with the default modeling crate and YAML output.
    #[must_use]
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            modeling_crates: vec![DEFAULT_MODELING_CRATE.to_string()],
            format: Format::default(),
        }
    }
}

/// The result of a successful build.
#[derive(Debug, Clone)]
pub struct Compilation {
    /// The rendered document.
    pub text: String,

    /// The document before rendering, keys in emission order.
    pub document: Mapping,

    /// Job names in emission order.
    pub order: Vec<String>,

    /// Warnings that did not stop the build.
    pub diagnostics: Vec<Diagnostic>,

    /// Everything the scanner found, sorted by file and line.
    pub declarations: Vec<DiscoveredDeclaration>,

    /// The declaration each job was resolved from, by job name.
    pub job_declarations: BTreeMap<String, DiscoveredDeclaration>,

    /// Scanned source files, relative to the source directory.
    pub files: Vec<PathBuf>,

    /// Direct dependencies of every job, by job name.
    pub dependencies: BTreeMap<String, Vec<String>>,

    /// The resolved jobs, in emission order.
    pub jobs: Vec<Job>,

    /// The graph the jobs were ordered by.
    pub graph: DependencyGraph,
}

/// Compiles the declarations under `options.source_dir` into a document.
///
/// # Errors
///
/// Parse and resolution errors are reported together. A graph problem (unknown
/// reference or cycle) fails the build with no partial output, as do serialization
/// errors once every job has been attempted.
pub fn compile(options: &CompileOptions) -> Result<Compilation> {
    let scanner = Scanner::new(options.modeling_crates.clone());
    let scan = scanner.scan(&options.source_dir)?;
    Error::collect(scan.errors)?;

    // A job value cannot contain itself, so cycles through references are found before evaluation.
    if let Some(cycle) = DependencyGraph::from_declarations(&scan.declarations).detect_cycle() {
        return Err(Error::Cycle { cycle });
    }

    let resolution = Resolver::for_sources(&options.source_dir, &scan.files, scanner.modeling_crates()).resolve(&scan.declarations)?;
    let rendered = compile_resolution(&resolution, options.format)?;
    Ok(Compilation {
        text: rendered.text,
        document: rendered.document,
        order: rendered.jobs.iter().map(|job| job.name.clone()).collect(),
        diagnostics: resolution.diagnostics.clone(),
        job_declarations: resolution
            .jobs
            .iter()
            .map(|r| (r.job.name.clone(), r.declaration.clone()))
            .collect(),
        declarations: scan.declarations,
        files: scan.files,
        dependencies: rendered.dependencies,
        jobs: rendered.jobs,
        graph: rendered.graph,
    })
}

struct Rendered {
    text: String,
    document: Mapping,
    jobs: Vec<Job>,
    dependencies: BTreeMap<String, Vec<String>>,
    graph: DependencyGraph,
}

fn compile_resolution(resolution: &Resolution, format: Format) -> Result<Rendered> {
    let pipeline = resolution.pipeline.as_ref().map(|p| &p.pipeline);
    let stages = pipeline.map_or_else(|| DEFAULT_STAGES.to_vec(), |p| p.stage_list());
    let jobs: Vec<&Job> = resolution.jobs.iter().map(|r| &r.job).collect();

    check_stages(&jobs, &stages)?;

    let external = external_names(pipeline, &jobs);
    let nodes = jobs
        .iter()
        .map(|job| GraphNode::new(job.name.as_str(), job.stage.as_deref(), &job.dependency_names()))
        .collect();
    let graph = DependencyGraph::new(nodes, &stages, &external)?;

    let by_name: HashMap<&str, &Job> = jobs.iter().map(|job| (job.name.as_str(), *job)).collect();
    let mut ordered = Vec::with_capacity(jobs.len());
    for name in graph.order()? {
        let job = by_name
            .get(name)
            .ok_or_else(|| Error::internal(format!("ordered job '{name}' has no declaration")))?;
        ordered.push(*job);
    }

    let mapping = document(pipeline, &ordered)?;
    let text = render(&mapping, format)?;

    let dependencies = jobs
        .iter()
        .map(|job| (job.name.clone(), job.dependency_names().into_iter().map(String::from).collect()))
        .collect();

    Ok(Rendered {
        text,
        document: mapping,
        jobs: ordered.into_iter().cloned().collect(),
        dependencies,
        graph,
    })
}

/// Every non-hidden job must use a stage from the pipeline's stage list.
fn check_stages(jobs: &[&Job], stages: &[&str]) -> Result<()> {
    let errors = jobs
        .iter()
        .filter(|job| !job.is_hidden() && !stages.contains(&job.effective_stage()))
        .map(|job| Error::UnknownStage {
            job: job.name.clone(),
            stage: job.effective_stage().to_string(),
        })
        .collect();

    Error::collect(errors)
}

/// Names that jobs may depend on without being declared jobs.
///
/// Passthrough blocks are always external. When the pipeline includes other
/// configuration, any undeclared name may come from there.
fn external_names(pipeline: Option<&crate::model::Pipeline>, jobs: &[&Job]) -> HashSet<String> {
    let Some(pipeline) = pipeline else {
        return HashSet::new();
    };

    let mut external: HashSet<String> = pipeline.passthrough.iter().map(|block| block.key.clone()).collect();

    if pipeline.include.is_some() {
        let declared: HashSet<&str> = jobs.iter().map(|job| job.name.as_str()).collect();
        for job in jobs {
            for name in job.dependency_names() {
                if !declared.contains(name) && external.insert(name.to_string()) {
                    log::debug!("treating '{name}' as defined by an included file");
                }
            }
        }
    }

    external
}

impl Compilation {
    /// Writes the rendered document to `output`, creating its directory if needed.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn write(&self, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(output, &self.text).map_err(|e| Error::io(output, e))?;
        log::info!("wrote {} job(s) to {}", self.order.len(), output.display());
        Ok(())
    }
}

/// Compiles and writes the rendered document to `output`.
///
/// # Errors
///
/// Fails if compilation fails or the file cannot be written.
pub fn compile_to_file(options: &CompileOptions, output: &Path) -> Result<Compilation> {
    let compilation = compile(options)?;
    compilation.write(output)?;
    Ok(compilation)
}
