use crate::commands::compile_options;
use crate::config::Config;
use crate::outputter::Outputter;
use anyhow::{Result, bail};
use ci_forge::compile;
use ci_forge::host::Host;
use clap::{ArgAction, Parser};

#[derive(Parser, Debug, Default, Clone)]
pub struct GraphArgs {
    /// Show only what this job depends on, directly or indirectly.
    #[arg(value_name = "JOB")]
    job: Option<String>,

    /// Print the graph in Graphviz `dot` syntax.
    #[arg(long, action = ArgAction::SetTrue)]
    dot: bool,
}

pub fn graph<H: Host>(args: &GraphArgs, outputter: &mut Outputter<'_, H>, cfg: &Config) -> Result<()> {
    let compilation = compile(&compile_options(cfg))?;

    if let Some(job) = &args.job {
        if !compilation.order.contains(job) {
            bail!("Job not found: {job}");
        }
        for dependency in compilation.graph.transitive_dependencies(job) {
            outputter.println(dependency);
        }
        return Ok(());
    }

    if args.dot {
        outputter.println("digraph pipeline {");
        for name in &compilation.order {
            outputter.println(format!("    {name:?};"));
        }
        for (job, dependency) in compilation.graph.edges() {
            outputter.println(format!("    {job:?} -> {dependency:?};"));
        }
        outputter.println("}");
        return Ok(());
    }

    for name in &compilation.order {
        let dependencies = compilation.dependencies.get(name).map(|d| d.join(", ")).unwrap_or_default();
        if dependencies.is_empty() {
            outputter.println(name);
        } else {
            outputter.println(format!("{name}: {dependencies}"));
        }
    }
    Ok(())
}
