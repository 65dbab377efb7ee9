use crate::error::{Error, Result};
use crate::scan::{ImportTable, parse};
use std::fs;
use std::path::{Component, Path, PathBuf};
use syn::{Expr, Item};

/// One parsed declaration source file.
#[derive(Debug, Clone)]
pub struct Module {
    file: PathBuf,
    path: Vec<String>,
    syntax: syn::File,
    imports: ImportTable,
}

impl Module {
    /// Reads and parses `root/file`.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn load(root: &Path, file: &Path, modeling_crates: &[String]) -> Result<Self> {
        let full = root.join(file);
        let text = fs::read_to_string(&full).map_err(|e| Error::io(&full, e))?;
        Self::from_source(file, &text, modeling_crates)
    }

    /// Parses source text as the module stored at `file`.
    ///
    /// # Errors
    ///
    /// Fails if the text is not valid Rust syntax.
    pub fn from_source(file: &Path, text: &str, modeling_crates: &[String]) -> Result<Self> {
        let syntax = parse(file, text)?;
        let imports = ImportTable::new(&syntax.items, modeling_crates);
        Ok(Self {
            file: file.to_path_buf(),
            path: module_path(file),
            syntax,
            imports,
        })
    }

    /// The file path, relative to the source root.
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// The module path the file occupies, e.g. `["ci", "jobs"]` for `ci/jobs.rs`.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The file's `use` declarations.
    #[must_use]
    pub const fn imports(&self) -> &ImportTable {
        &self.imports
    }

    /// The initializer of the top-level `const` or `static` item `name`.
    #[must_use]
    pub fn item(&self, name: &str) -> Option<&Expr> {
        self.syntax.items.iter().find_map(|item| match item {
            Item::Const(c) if c.ident == name => Some(&*c.expr),
            Item::Static(s) if s.ident == name => Some(&*s.expr),
            _ => None,
        })
    }

    /// Names of all top-level `const` and `static` items, in source order.
    pub fn item_names(&self) -> impl Iterator<Item = String> + '_ {
        self.syntax.items.iter().filter_map(|item| match item {
            Item::Const(c) => Some(c.ident.to_string()),
            Item::Static(s) => Some(s.ident.to_string()),
            _ => None,
        })
    }
}

/// Maps a source-root-relative file to its module path.
///
/// `mod.rs`, `lib.rs` and `main.rs` stand for their directory.
#[must_use]
pub fn module_path(file: &Path) -> Vec<String> {
    let mut segments: Vec<String> = file
        .with_extension("")
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if segments.last().is_some_and(|last| matches!(last.as_str(), "mod" | "lib" | "main")) {
        _ = segments.pop();
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_paths() {
        assert_eq!(module_path(Path::new("lib.rs")), Vec::<String>::new());
        assert_eq!(module_path(Path::new("jobs.rs")), vec!["jobs"]);
        assert_eq!(module_path(Path::new("jobs/mod.rs")), vec!["jobs"]);
        assert_eq!(module_path(Path::new("ci/deploy.rs")), vec!["ci", "deploy"]);
    }

    #[test]
    fn finds_items() {
        let module = Module::from_source(
            Path::new("jobs.rs"),
            "const A: Job = Job { name: \"a\" }; static B: &str = \"b\"; fn c() {}",
            &["ci_forge".to_string()],
        )
        .unwrap();

        assert!(module.item("A").is_some());
        assert!(module.item("B").is_some());
        assert!(module.item("c").is_none());
        assert_eq!(module.item_names().collect::<Vec<_>>(), vec!["A", "B"]);
    }
}
