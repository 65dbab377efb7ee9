//! End-to-end compilation of declaration directories.

use ci_forge::import::{OutputMode, import_document, write_files};
use ci_forge::{CompileOptions, Error, Format, compile};
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

fn project(source: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("pipeline.rs"), source).unwrap();
    dir
}

fn compile_errors(source: &str) -> Vec<Error> {
    let dir = project(source);
    compile(&CompileOptions::new(dir.path())).unwrap_err().into_list()
}

#[test]
fn jobs_follow_their_dependencies() {
    let dir = project(
        r#"
use ci_forge::prelude::*;

const PIPELINE: Pipeline = Pipeline { stages: &["build", "test", "deploy"] };
const DEPLOY: Job = Job { name: "deploy", stage: "deploy", needs: &[&TEST], script: &["./deploy.sh"] };
const TEST: Job = Job { name: "test", stage: "test", needs: &[&BUILD], script: &["make test"] };
const BUILD: Job = Job { name: "build", stage: "build", script: &["make"] };
"#,
    );

    let compilation = compile(&CompileOptions::new(dir.path())).unwrap();

    assert_eq!(compilation.order, vec!["build", "test", "deploy"]);
    assert!(compilation.diagnostics.is_empty());
    assert!(compilation.text.starts_with("# Generated by ci-forge. Do not edit.\n"));

    let build = compilation.text.find("\nbuild:").unwrap();
    let test = compilation.text.find("\ntest:").unwrap();
    let deploy = compilation.text.find("\ndeploy:").unwrap();
    assert!(build < test && test < deploy);
}

#[test]
fn a_cycle_fails_the_build() {
    let errors = compile_errors(
        r#"
use ci_forge::prelude::*;

const A: Job = Job { name: "a", needs: &["b"], script: &["a"] };
const B: Job = Job { name: "b", needs: &["a"], script: &["b"] };
"#,
    );

    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], Error::Cycle { cycle } if cycle == &["a", "b", "a"]));
    assert!(errors[0].is_input_problem());
}

#[test]
fn a_cycle_through_job_references_fails_the_build() {
    let errors = compile_errors(
        r#"
use ci_forge::prelude::*;

const A: Job = Job { name: "a", needs: &[&B], script: &["a"] };
const B: Job = Job { name: "b", needs: &[&A], script: &["b"] };
"#,
    );

    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], Error::Cycle { cycle } if cycle == &["a", "b", "a"]));
}

#[test]
fn an_imported_cycle_is_reported_as_a_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let files = import_document("a:\n  script: [x]\n  needs: [b]\nb:\n  script: [y]\n  needs: [a]\n", OutputMode::SingleFile).unwrap();
    let _written = write_files(dir.path(), &files).unwrap();

    let errors = compile(&CompileOptions::new(dir.path())).unwrap_err().into_list();

    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], Error::Cycle { cycle } if cycle == &["a", "b", "a"]));
}

#[test]
fn duplicate_job_names_are_reported_with_both_locations() {
    let errors = compile_errors(
        r#"
use ci_forge::prelude::*;

const BUILD: Job = Job { name: "build", script: &["make"] };
const BUILD_AGAIN: Job = Job { name: "build", script: &["make again"] };
"#,
    );

    assert!(errors.iter().any(|e| matches!(e, Error::DuplicateName { name, first, second }
        if name == "build" && first.line < second.line)));
}

#[test]
fn duplicate_job_names_across_files_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("build.rs"),
        "use ci_forge::prelude::*;\nconst BUILD: Job = Job { name: \"build\", script: &[\"make\"] };\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("release.rs"),
        "use ci_forge::prelude::*;\n\nconst RELEASE_BUILD: Job = Job { name: \"build\", script: &[\"make release\"] };\n",
    )
    .unwrap();

    let errors = compile(&CompileOptions::new(dir.path())).unwrap_err().into_list();

    assert!(errors.iter().any(|e| matches!(e, Error::DuplicateName { name, first, second }
        if name == "build" && first.file.ends_with("build.rs") && second.file.ends_with("release.rs"))));
}

#[test]
fn a_stage_outside_the_stage_list_is_rejected() {
    let errors = compile_errors(
        r#"
use ci_forge::prelude::*;

const PIPELINE: Pipeline = Pipeline { stages: &["build"] };
const SHIP: Job = Job { name: "ship", stage: "release", script: &["ship"] };
"#,
    );

    assert!(matches!(&errors[0], Error::UnknownStage { job, stage } if job == "ship" && stage == "release"));
}

#[test]
fn empty_rules_are_kept_and_reported() {
    let dir = project(
        r#"
use ci_forge::prelude::*;

const LINT: Job = Job { name: "lint", rules: &[], script: &["make lint"] };
"#,
    );

    let compilation = compile(&CompileOptions::new(dir.path())).unwrap();

    assert_eq!(compilation.diagnostics.len(), 1);
    assert_eq!(compilation.diagnostics[0].job, "lint");
    assert!(compilation.text.contains("rules: []"));
}

#[test]
fn json_projection_parses_as_json() {
    let dir = project(
        r#"
use ci_forge::prelude::*;

const BUILD: Job = Job { name: "build", script: &["make"] };
"#,
    );
    let options = CompileOptions {
        format: Format::Json,
        ..CompileOptions::new(dir.path())
    };

    let compilation = compile(&options).unwrap();
    let value: serde_json::Value = serde_json::from_str(&compilation.text).unwrap();

    assert_eq!(value["build"]["script"][0], "make");
}
