//! The reverse pipeline: a wire document to IR, then IR to declaration source.

mod codegen;
mod ir;
mod parser;

pub use codegen::{GeneratedFile, OutputMode, generate};
pub use ir::{IrInclude, IrJob, IrNeed, IrPassthrough, IrPipeline, IrRule};
pub use parser::parse_document;

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Parses `text` and generates declaration source for it.
///
/// # Errors
///
/// Fails with [`Error::Schema`] if the document does not have the expected structure.
pub fn import_document(text: &str, mode: OutputMode) -> Result<Vec<GeneratedFile>> {
    let pipeline = parse_document(text)?;
    log::debug!(
        "parsed {} job(s) and {} passthrough block(s)",
        pipeline.jobs.len(),
        pipeline.passthrough.len()
    );
    generate(&pipeline, mode)
}

/// Imports the document at `input` into `output_dir`, returning the files written.
///
/// # Errors
///
/// Fails if the document cannot be read or imported, or a file cannot be written.
pub fn import_file(input: &Path, output_dir: &Path, mode: OutputMode) -> Result<Vec<PathBuf>> {
    let text = fs::read_to_string(input).map_err(|e| Error::io(input, e))?;
    let files = import_document(&text, mode)?;
    write_files(output_dir, &files)
}

/// Writes generated files below `dir`, creating it if needed.
///
/// # Errors
///
/// Fails if a directory or file cannot be written.
pub fn write_files(dir: &Path, files: &[GeneratedFile]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

    files
        .iter()
        .map(|file| {
            let path = dir.join(&file.path);
            fs::write(&path, &file.contents).map_err(|e| Error::io(&path, e))?;
            log::info!("wrote {}", path.display());
            Ok(path)
        })
        .collect()
}
