use crate::error::{Error, Result};
use crate::model::RecordType;
use crate::scan::{DeclarationKind, DependencyRef, DiscoveredDeclaration, ImportTable};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use syn::spanned::Spanned;
use syn::{Expr, ExprStruct, Item, Lit, Member};
use walkdir::{DirEntry, WalkDir};

/// The package name declaration files import the model from by default.
pub const DEFAULT_MODELING_CRATE: &str = "ci_forge";

/// Everything one scan pass found.
#[derive(Debug, Default)]
pub struct ScanOutput {
    /// Every `.rs` file under the root, relative to it, sorted.
    pub files: Vec<PathBuf>,

    /// Declarations sorted by file, line and array position.
    pub declarations: Vec<DiscoveredDeclaration>,

    /// Files that could not be read or parsed.
    pub errors: Vec<Error>,
}

/// Finds pipeline declarations in Rust-syntax source files without evaluating them.
#[derive(Debug, Clone)]
pub struct Scanner {
    modeling_crates: Vec<String>,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(vec![DEFAULT_MODELING_CRATE.to_string()])
    }
}

impl Scanner {
    /// A scanner recognizing the record types of `modeling_crates`.
    #[must_use]
    pub const fn new(modeling_crates: Vec<String>) -> Self {
        Self { modeling_crates }
    }

    /// Crates whose record types are recognized.
    #[must_use]
    pub fn modeling_crates(&self) -> &[String] {
        &self.modeling_crates
    }

    /// Scans every source file under `root`.
    ///
    /// Files that fail to parse are reported in [`ScanOutput::errors`] and do not stop the scan.
    ///
    /// # Errors
    ///
    /// Fails if `root` is not a readable directory.
    pub fn scan(&self, root: &Path) -> Result<ScanOutput> {
        let files = source_files(root)?;
        log::debug!("scanning {} source file(s) under {}", files.len(), root.display());

        let results: Vec<Result<Vec<DiscoveredDeclaration>>> = files
            .par_iter()
            .map(|file| {
                let text = fs::read_to_string(root.join(file)).map_err(|e| Error::io(root.join(file), e))?;
                self.scan_source(file, &text)
            })
            .collect();

        let mut output = ScanOutput {
            files,
            ..ScanOutput::default()
        };

        for result in results {
            match result {
                Ok(declarations) => output.declarations.extend(declarations),
                Err(e) => output.errors.push(e),
            }
        }

        output
            .declarations
            .sort_by(|a, b| (&a.file, a.line, a.index).cmp(&(&b.file, b.line, b.index)));

        log::info!(
            "discovered {} declaration(s), {} file error(s)",
            output.declarations.len(),
            output.errors.len()
        );

        Ok(output)
    }

    /// Scans the text of a single file. `file` is only used for diagnostics.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Parse`] if the text is not valid Rust syntax.
    pub fn scan_source(&self, file: &Path, text: &str) -> Result<Vec<DiscoveredDeclaration>> {
        let syntax = parse(file, text)?;
        let imports = ImportTable::new(&syntax.items, &self.modeling_crates);

        let mut declarations = Vec::new();
        for item in &syntax.items {
            let (ident, expr) = match item {
                Item::Const(c) => (&c.ident, &*c.expr),
                Item::Static(s) => (&s.ident, &*s.expr),
                _ => continue,
            };

            let binding = ident.to_string();
            match strip(expr) {
                Expr::Struct(s) => {
                    if let Some(kind) = declaration_kind(&imports, s) {
                        declarations.push(extract(file, binding, None, kind, s, &imports));
                    }
                }
                Expr::Array(array) => {
                    for (index, element) in array.elems.iter().enumerate() {
                        if let Expr::Struct(s) = strip(element)
                            && let Some(kind) = declaration_kind(&imports, s)
                        {
                            declarations.push(extract(file, format!("{binding}[{index}]"), Some(index), kind, s, &imports));
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(declarations)
    }
}

/// Parses a file, mapping syntax errors to a file-scoped [`Error::Parse`].
pub(crate) fn parse(file: &Path, text: &str) -> Result<syn::File> {
    syn::parse_file(text).map_err(|e| Error::Parse {
        file: file.to_path_buf(),
        line: e.span().start().line,
        message: e.to_string(),
    })
}

/// Lists the `.rs` files under `root`, skipping hidden and build-output directories.
pub(crate) fn source_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "source directory does not exist");
        return Err(Error::io(root, source));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_entry(|e| e.depth() == 0 || !is_skipped_dir(e)) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io(&path, e.into())
        })?;

        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "rs") {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            files.push(relative.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_str().is_some_and(|name| name.starts_with('.') || name == "target")
}

/// Looks through references, parentheses and `vec![..]` to the interesting expression.
fn strip(expr: &Expr) -> &Expr {
    match expr {
        Expr::Reference(r) => strip(&r.expr),
        Expr::Paren(p) => strip(&p.expr),
        Expr::Group(g) => strip(&g.expr),
        _ => expr,
    }
}

fn declaration_kind(imports: &ImportTable, s: &ExprStruct) -> Option<DeclarationKind> {
    let resolved = imports.resolve(&s.path)?;
    match resolved.as_slice() {
        [name] => RecordType::from_name(name).and_then(DeclarationKind::from_record_type),
        _ => None,
    }
}

fn extract(
    file: &Path,
    binding: String,
    index: Option<usize>,
    kind: DeclarationKind,
    s: &ExprStruct,
    imports: &ImportTable,
) -> DiscoveredDeclaration {
    let mut declaration = DiscoveredDeclaration {
        binding,
        kind,
        file: file.to_path_buf(),
        line: s.span().start().line,
        name: None,
        stage: None,
        dependencies: Vec::new(),
        index,
    };

    for field in &s.fields {
        let Member::Named(ident) = &field.member else {
            continue;
        };

        match ident.to_string().trim_start_matches("r#") {
            "name" => declaration.name = string_literal(&field.expr),
            "stage" => declaration.stage = string_literal(&field.expr),
            "needs" | "extends" => collect_dependencies(&field.expr, imports, &mut declaration.dependencies),
            _ => {}
        }
    }

    declaration
}

fn string_literal(expr: &Expr) -> Option<String> {
    match strip(expr) {
        Expr::Lit(lit) => match &lit.lit {
            Lit::Str(s) => Some(s.value()),
            _ => None,
        },
        Expr::Call(call) if is_some_call(call) && call.args.len() == 1 => call.args.first().and_then(string_literal),
        _ => None,
    }
}

fn is_some_call(call: &syn::ExprCall) -> bool {
    matches!(&*call.func, Expr::Path(p) if p.path.is_ident("Some"))
}

/// Collects dependencies that are literal names or references to top-level bindings.
///
/// Anything computed is skipped; the resolver supplies the full list after evaluation.
fn collect_dependencies(expr: &Expr, imports: &ImportTable, out: &mut Vec<DependencyRef>) {
    match strip(expr) {
        Expr::Lit(lit) => {
            if let Lit::Str(s) = &lit.lit {
                out.push(DependencyRef::Name(s.value()));
            }
        }
        Expr::Path(p) if p.qself.is_none() && imports.resolve(&p.path).is_none() => {
            if let Some(last) = p.path.segments.last()
                && p.path.segments.len() == 1
            {
                out.push(DependencyRef::Binding(last.ident.to_string()));
            }
        }
        Expr::Index(index) => {
            if let (Expr::Path(p), Expr::Lit(lit)) = (strip(&index.expr), strip(&index.index))
                && let (Some(ident), Lit::Int(i)) = (p.path.get_ident(), &lit.lit)
            {
                out.push(DependencyRef::Binding(format!("{ident}[{}]", i.base10_digits())));
            }
        }
        Expr::Array(array) => {
            for element in &array.elems {
                collect_dependencies(element, imports, out);
            }
        }
        Expr::Call(call) if is_some_call(call) => {
            for arg in &call.args {
                collect_dependencies(arg, imports, out);
            }
        }
        Expr::Macro(m) if m.mac.path.is_ident("vec") => {
            if let Ok(elements) = m.mac.parse_body_with(syn::punctuated::Punctuated::<Expr, syn::Token![,]>::parse_terminated) {
                for element in &elements {
                    collect_dependencies(element, imports, out);
                }
            }
        }
        Expr::Struct(s) if imports.resolve(&s.path).is_some_and(|p| p == ["Need"]) => {
            let external = s.fields.iter().any(|field| {
                matches!(&field.member, Member::Named(ident) if ident == "project" || ident == "pipeline" || ident == "parallel")
            });
            if external {
                return;
            }

            for field in &s.fields {
                if matches!(&field.member, Member::Named(ident) if ident == "job") {
                    collect_dependencies(&field.expr, imports, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scan(source: &str) -> Vec<DiscoveredDeclaration> {
        Scanner::default().scan_source(Path::new("jobs.rs"), source).unwrap()
    }

    #[test]
    fn finds_direct_declarations() {
        let found = scan(
            r#"
use ci_forge::prelude::*;

const BUILD: Job = Job {
    name: "build",
    stage: "build",
    script: &["cargo build"],
};

static TEST: Job = Job {
    name: "test",
    needs: &[&BUILD, "lint", Need { job: &BUILD, artifacts: false }],
    extends: ".base",
};

const PIPELINE: Pipeline = Pipeline { stages: &["build", "test"] };

fn helper() -> Job { Job { name: "hidden" } }
"#,
        );

        assert_eq!(found.len(), 3);
        assert_eq!(found[0].binding, "BUILD");
        assert_eq!(found[0].name.as_deref(), Some("build"));
        assert_eq!(found[0].stage.as_deref(), Some("build"));
        assert_eq!(found[0].line, 4);

        assert_eq!(
            found[1].dependencies,
            vec![
                DependencyRef::Binding("BUILD".into()),
                DependencyRef::Name("lint".into()),
                DependencyRef::Binding("BUILD".into()),
                DependencyRef::Name(".base".into()),
            ]
        );
        assert_eq!(found[2].kind, DeclarationKind::Pipeline);
    }

    #[test]
    fn follows_aliases() {
        let found = scan(
            r#"
use ci_forge as forge;
use ci_forge::Job as CiJob;

const A: forge::Job = forge::Job { name: "a" };
const B: CiJob = CiJob { name: "b" };
const C: ci_forge::Job = ci_forge::Job { name: "c" };
"#,
        );
        let names: Vec<_> = found.iter().filter_map(|d| d.name.as_deref()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn expands_array_declarations() {
        let found = scan(
            r#"
use ci_forge::prelude::*;

const MATRIX: [Job; 2] = [
    Job { name: "test-linux" },
    Job { name: "test-macos", needs: &[&MATRIX[0]] },
];
"#,
        );

        assert_eq!(found.len(), 2);
        assert_eq!(found[1].binding, "MATRIX[1]");
        assert_eq!(found[1].index, Some(1));
        assert_eq!(found[1].item(), "MATRIX");
        assert_eq!(found[1].dependencies, vec![DependencyRef::Binding("MATRIX[0]".into())]);
    }

    #[test]
    fn ignores_shadowed_and_computed_declarations() {
        let found = scan(
            r#"
struct Job { name: &'static str }
const A: Job = Job { name: "a" };
"#,
        );
        assert!(found.is_empty());
    }

    #[test]
    fn computed_names_are_left_unknown() {
        let found = scan(
            r#"
use ci_forge::prelude::*;
const A: Job = Job { name: format!("{}-a", PREFIX), needs: vec![B] };
"#,
        );
        assert_eq!(found[0].name, None);
        assert_eq!(found[0].dependencies, vec![DependencyRef::Binding("B".into())]);
    }

    #[test]
    fn parse_errors_carry_file_and_line() {
        let err = Scanner::default().scan_source(Path::new("bad.rs"), "const A: Job = Job {\n name: \n};").unwrap_err();
        let Error::Parse { file, line, .. } = err else {
            panic!("expected a parse error");
        };
        assert_eq!(file, PathBuf::from("bad.rs"));
        assert!(line >= 2);
    }

    #[test]
    fn scans_directories_and_keeps_going_past_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("ci")).unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();

        fs::write(dir.path().join("ci/b.rs"), "use ci_forge::prelude::*;\nconst B: Job = Job { name: \"b\" };\n").unwrap();
        fs::write(dir.path().join("a.rs"), "use ci_forge::prelude::*;\nconst A: Job = Job { name: \"a\" };\n").unwrap();
        fs::write(dir.path().join("broken.rs"), "const = ;").unwrap();
        fs::write(dir.path().join("target/c.rs"), "const C: Job = Job { name: \"c\" };").unwrap();
        fs::write(dir.path().join(".git/d.rs"), "const D: Job = Job { name: \"d\" };").unwrap();

        let output = Scanner::default().scan(dir.path()).unwrap();
        let bindings: Vec<_> = output.declarations.iter().map(|d| d.binding.as_str()).collect();
        assert_eq!(bindings, vec!["A", "B"]);
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.files.len(), 3);
    }

    #[test]
    fn missing_root_is_an_io_error() {
        let err = Scanner::default().scan(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
