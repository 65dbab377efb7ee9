use crate::error::{Diagnostic, Error, Location, Result, Severity};
use crate::model::{Declaration, Job, Pipeline, Record, Value};
use crate::resolve::{Module, ModuleCache, ModuleEvaluator, ModuleValues, SourceEvaluator};
use crate::scan::{DeclarationKind, DependencyRef, DiscoveredDeclaration};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A job whose value has been evaluated and reconciled with the scan.
#[derive(Debug, Clone)]
pub struct ResolvedJob {
    /// The typed job.
    pub job: Job,
    /// Where the job was declared.
    pub declaration: DiscoveredDeclaration,
}

/// The pipeline declaration, evaluated.
#[derive(Debug, Clone)]
pub struct ResolvedPipeline {
    /// The typed pipeline.
    pub pipeline: Pipeline,
    /// Where the pipeline was declared.
    pub declaration: DiscoveredDeclaration,
}

/// The outcome of resolving every discovered declaration.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Jobs in discovery order.
    pub jobs: Vec<ResolvedJob>,
    /// The pipeline, if one was declared.
    pub pipeline: Option<ResolvedPipeline>,
    /// Warnings raised while resolving.
    pub diagnostics: Vec<Diagnostic>,
}

/// Evaluates the modules holding discovered declarations and turns the resulting
/// records into typed jobs and a pipeline.
#[derive(Debug)]
pub struct Resolver<E = SourceEvaluator> {
    root: PathBuf,
    modeling_crates: Vec<String>,
    evaluator: E,
    cache: ModuleCache,
}

impl Resolver<SourceEvaluator> {
    /// Creates a resolver backed by [`SourceEvaluator`] over the given source files.
    #[must_use]
    pub fn for_sources(root: &Path, files: &[PathBuf], modeling_crates: &[String]) -> Self {
        Self::new(root, modeling_crates, SourceEvaluator::new(root, files, modeling_crates))
    }
}

impl<E: ModuleEvaluator> Resolver<E> {
    /// Creates a resolver that evaluates modules with `evaluator`.
    #[must_use]
    pub fn new(root: &Path, modeling_crates: &[String], evaluator: E) -> Self {
        Self {
            root: root.to_path_buf(),
            modeling_crates: modeling_crates.to_vec(),
            evaluator,
            cache: ModuleCache::new(),
        }
    }

    /// Resolves every declaration, accumulating all problems found.
    ///
    /// # Errors
    ///
    /// Returns every resolution problem at once, as [`Error::Many`] when there is more than one.
    pub fn resolve(&self, declarations: &[DiscoveredDeclaration]) -> Result<Resolution> {
        let mut errors = Vec::new();
        let modules = self.evaluate_files(declarations, &mut errors);

        let mut records = Vec::new();
        for declaration in declarations {
            let Some(values) = modules.get(&declaration.file) else {
                continue;
            };

            match declaration_record(values, declaration) {
                Ok(record) => records.push((declaration, record)),
                Err(e) => errors.push(e),
            }
        }

        let names: HashMap<(PathBuf, String), String> = records
            .iter()
            .filter_map(|(declaration, record)| {
                let name = record.name()?;
                Some(((declaration.file.clone(), declaration.binding.clone()), name.to_string()))
            })
            .collect();

        let mut resolution = Resolution::default();
        let mut seen: HashMap<String, Location> = HashMap::new();

        for (declaration, record) in records {
            match declaration.kind {
                DeclarationKind::Pipeline => match Pipeline::from_record(&record, &mut |_| Err("pipelines hold no job references".into())) {
                    Ok(pipeline) => {
                        if let Some(first) = &resolution.pipeline {
                            errors.push(resolution_error(
                                declaration,
                                format!("only one pipeline may be declared per build; the first is at {}", first.declaration.location()),
                            ));
                        } else {
                            resolution.pipeline = Some(ResolvedPipeline {
                                pipeline,
                                declaration: declaration.clone(),
                            });
                        }
                    }
                    Err(message) => errors.push(resolution_error(declaration, message)),
                },
                DeclarationKind::Job => {
                    let mut references = |target: &Record| reference_name(&names, target);
                    let job = match Job::from_record(&record, &mut references) {
                        Ok(job) => job,
                        Err(message) => {
                            errors.push(resolution_error(declaration, message));
                            continue;
                        }
                    };

                    if let Err(message) = check_static_view(declaration, &job, &names) {
                        errors.push(resolution_error(declaration, message));
                        continue;
                    }

                    if let Some(first) = seen.get(&job.name) {
                        errors.push(Error::DuplicateName {
                            name: job.name.clone(),
                            first: first.clone(),
                            second: declaration.location(),
                        });
                        continue;
                    }
                    _ = seen.insert(job.name.clone(), declaration.location());

                    if job.rules.as_ref().is_some_and(Vec::is_empty) {
                        resolution.diagnostics.push(Diagnostic {
                            severity: Severity::Warning,
                            job: job.name.clone(),
                            location: declaration.location(),
                            message: "`rules` is an empty list; it is emitted as `rules: []`".into(),
                        });
                    }

                    resolution.jobs.push(ResolvedJob {
                        job,
                        declaration: declaration.clone(),
                    });
                }
            }
        }

        Error::collect(errors)?;

        log::info!(
            "resolved {} job(s){}",
            resolution.jobs.len(),
            if resolution.pipeline.is_some() { " and a pipeline" } else { "" }
        );

        Ok(resolution)
    }

    fn evaluate_files(&self, declarations: &[DiscoveredDeclaration], errors: &mut Vec<Error>) -> HashMap<PathBuf, Arc<ModuleValues>> {
        let mut modules = HashMap::new();
        let mut visited = HashSet::new();
        for declaration in declarations {
            if !visited.insert(&declaration.file) {
                continue;
            }

            let values = Module::load(&self.root, &declaration.file, &self.modeling_crates)
                .and_then(|module| self.cache.get_or_evaluate(&module, &self.evaluator));

            match values {
                Ok(values) => _ = modules.insert(declaration.file.clone(), values),
                Err(e) => errors.push(e),
            }
        }
        modules
    }
}

fn resolution_error(declaration: &DiscoveredDeclaration, message: impl Into<String>) -> Error {
    Error::Resolution {
        file: declaration.file.clone(),
        line: declaration.line,
        binding: declaration.binding.clone(),
        message: message.into(),
    }
}

/// Finds the evaluated record for a declaration and checks it has the expected kind.
fn declaration_record(values: &ModuleValues, declaration: &DiscoveredDeclaration) -> Result<Record> {
    let value = values
        .get(&declaration.binding)
        .ok_or_else(|| resolution_error(declaration, "the binding is not present after evaluation"))??;

    let expected = declaration.kind.record_type();
    match value {
        Value::Record(record) if record.kind == expected => Ok(record),
        Value::Record(record) => Err(resolution_error(
            declaration,
            format!("expected a `{expected}` declaration, found a `{}` record", record.kind),
        )),
        other => Err(resolution_error(
            declaration,
            format!("expected a `{expected}` declaration, found {}", other.type_name()),
        )),
    }
}

/// Maps a job record used as a reference to the name of the declaration it came from.
fn reference_name(names: &HashMap<(PathBuf, String), String>, target: &Record) -> Result<String, String> {
    let Some(origin) = &target.origin else {
        return Err(format!(
            "job references must point to a declared job; `{}` is not a top-level declaration",
            target.name().unwrap_or("<unnamed>")
        ));
    };

    names
        .get(&(origin.file.clone(), origin.binding.clone()))
        .cloned()
        .ok_or_else(|| format!("`{}` in {} is not a discovered job declaration", origin.binding, origin.file.display()))
}

/// Checks that what the scanner saw without evaluating agrees with the evaluated job.
fn check_static_view(declaration: &DiscoveredDeclaration, job: &Job, names: &HashMap<(PathBuf, String), String>) -> Result<(), String> {
    if let Some(name) = &declaration.name
        && *name != job.name
    {
        return Err(format!("the literal name '{name}' does not match the evaluated name '{}'", job.name));
    }

    let resolved = job.dependency_names();
    for dependency in &declaration.dependencies {
        let expected = match dependency {
            DependencyRef::Name(name) => name,

            // Bindings imported from elsewhere are checked through the resolved value alone.
            DependencyRef::Binding(binding) => match names.get(&(declaration.file.clone(), binding.clone())) {
                Some(name) => name,
                None => continue,
            },
        };

        if !resolved.contains(&expected.as_str()) {
            return Err(format!("the statically visible dependency {dependency} is missing from the evaluated job"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::Scanner;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn resolve(files: &[(&str, &str)]) -> Result<Resolution> {
        let dir = tempfile::tempdir().unwrap();
        for (path, text) in files {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }

        let scanner = Scanner::default();
        let scan = scanner.scan(dir.path()).unwrap();
        assert!(scan.errors.is_empty(), "{:?}", scan.errors);

        Resolver::for_sources(dir.path(), &scan.files, scanner.modeling_crates()).resolve(&scan.declarations)
    }

    #[test]
    fn resolves_references_to_names() {
        let resolution = resolve(&[
            (
                "build.rs",
                r#"
use ci_forge::prelude::*;
pub const BUILD: Job = Job { name: "build", stage: "build", script: &["make"] };
"#,
            ),
            (
                "test.rs",
                r#"
use ci_forge::prelude::*;
use crate::build::BUILD;
const TEST: Job = Job { name: "unit", stage: "test", needs: &[&BUILD], script: &["make test"] };
const PIPELINE: Pipeline = Pipeline { stages: &["build", "test"] };
"#,
            ),
        ])
        .unwrap();

        let names: Vec<_> = resolution.jobs.iter().map(|j| j.job.name.as_str()).collect();
        assert_eq!(names, vec!["build", "unit"]);
        assert_eq!(resolution.jobs[1].job.dependency_names(), vec!["build"]);
        assert!(resolution.pipeline.is_some());
        assert!(resolution.diagnostics.is_empty());
    }

    #[test]
    fn duplicate_names_are_reported_with_both_locations() {
        let error = resolve(&[(
            "jobs.rs",
            r#"
use ci_forge::prelude::*;
const A: Job = Job { name: "same", script: &["a"] };
const B: Job = Job { name: "same", script: &["b"] };
"#,
        )])
        .unwrap_err();

        let Error::DuplicateName { name, first, second } = error else {
            panic!("expected a duplicate name error, got {error}");
        };
        assert_eq!(name, "same");
        assert_eq!(first.line, 3);
        assert_eq!(second.line, 4);
    }

    #[test]
    fn empty_rules_are_kept_with_a_warning() {
        let resolution = resolve(&[(
            "jobs.rs",
            r#"
use ci_forge::prelude::*;
const NEVER: Job = Job { name: "never", script: &["x"], rules: &[] };
"#,
        )])
        .unwrap();

        assert_eq!(resolution.jobs[0].job.rules, Some(Vec::new()));
        assert_eq!(resolution.diagnostics.len(), 1);
        assert_eq!(resolution.diagnostics[0].job, "never");
    }

    #[test]
    fn evaluation_failures_accumulate() {
        let error = resolve(&[(
            "jobs.rs",
            r#"
use ci_forge::prelude::*;
const A: Job = Job { name: compute(), script: &["a"] };
const B: Job = Job { name: "b", script: &[1] };
const C: Pipeline = Pipeline { stages: &["x"] };
const D: Pipeline = Pipeline { stages: &["y"] };
"#,
        )])
        .unwrap_err();

        assert_eq!(error.into_list().len(), 3);
    }

    #[test]
    fn references_to_undeclared_jobs_fail() {
        let error = resolve(&[(
            "jobs.rs",
            r#"
use ci_forge::prelude::*;
const A: Job = Job { name: "a", script: &["a"], needs: &[&Job { name: "inline" }] };
"#,
        )])
        .unwrap_err();

        assert!(matches!(error, Error::Resolution { ref binding, .. } if binding == "A"));
    }

    #[test]
    fn matrix_elements_resolve_individually() {
        let resolution = resolve(&[(
            "jobs.rs",
            r#"
use ci_forge::prelude::*;
const MATRIX: [Job; 2] = [
    Job { name: "test-a", script: &["a"] },
    Job { name: "test-b", script: &["b"] },
];
const AFTER: Job = Job { name: "after", script: &["c"], needs: &[&MATRIX[1]] };
"#,
        )])
        .unwrap();

        let names: Vec<_> = resolution.jobs.iter().map(|j| j.job.name.as_str()).collect();
        assert_eq!(names, vec!["test-a", "test-b", "after"]);
        assert_eq!(resolution.jobs[2].job.dependency_names(), vec!["test-b"]);
    }
}
