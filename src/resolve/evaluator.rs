use crate::error::{Error, Result};
use crate::model::{Intrinsic, Origin, Record, RecordType, Value, enum_constant, is_enum_namespace, predefined_rule};
use crate::resolve::format::{Piece, parse_format};
use crate::resolve::{Module, ModuleValues, module_path};
use core::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use syn::ext::IdentExt;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{BinOp, Block, Expr, ExprMacro, ExprStruct, Lit, LitStr, Member, Stmt, Token, UnOp};

/// Turns a parsed module into the values of its top-level items.
///
/// This is the only way the compiler obtains runtime values, so an implementation
/// decides how much of the source language is supported.
pub trait ModuleEvaluator {
    /// Evaluates every top-level `const` and `static` item of `module`.
    ///
    /// # Errors
    ///
    /// Fails only if the module as a whole cannot be evaluated. Failures of individual
    /// items are recorded in the returned [`ModuleValues`].
    fn evaluate(&self, module: &Module) -> Result<ModuleValues>;
}

#[derive(Debug, Clone)]
enum ItemState {
    InProgress,
    Done(Result<Value>),
}

struct Frame<'a> {
    module: &'a Module,
    binding: &'a str,
}

/// Interprets a restricted subset of Rust expressions.
///
/// Supported: literals, references, arrays, tuples, `vec!`, `Some`/`None`, model
/// struct literals with `..BASE`, paths to items in the same or imported modules,
/// intrinsics, enum constants, predefined rules, `format!`, `concat!`, `yaml!`,
/// `if`/`else` over `==`, `!=`, `&&`, `||` and `!`, field access and single-expression
/// blocks. Nothing is ever executed.
///
/// Items are evaluated at most once; a reference from another module reuses the
/// earlier result.
#[derive(Debug)]
pub struct SourceEvaluator {
    root: PathBuf,
    modeling_crates: Vec<String>,
    module_files: Vec<(Vec<String>, PathBuf)>,
    modules: RefCell<HashMap<PathBuf, Rc<Module>>>,
    items: RefCell<HashMap<(PathBuf, String), ItemState>>,
}

impl SourceEvaluator {
    /// Creates an evaluator over the given source files, relative to `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, files: &[PathBuf], modeling_crates: &[String]) -> Self {
        Self {
            root: root.into(),
            modeling_crates: modeling_crates.to_vec(),
            module_files: files.iter().map(|f| (module_path(f), f.clone())).collect(),
            modules: RefCell::new(HashMap::new()),
            items: RefCell::new(HashMap::new()),
        }
    }

    fn module(&self, file: &Path) -> Result<Rc<Module>> {
        if let Some(module) = self.modules.borrow().get(file) {
            return Ok(Rc::clone(module));
        }

        let module = Rc::new(Module::load(&self.root, file, &self.modeling_crates)?);
        _ = self.modules.borrow_mut().insert(file.to_path_buf(), Rc::clone(&module));
        Ok(module)
    }

    fn adopt(&self, module: &Module) -> Rc<Module> {
        let mut modules = self.modules.borrow_mut();
        Rc::clone(
            modules
                .entry(module.file().to_path_buf())
                .or_insert_with(|| Rc::new(module.clone())),
        )
    }

    fn item_value(&self, module: &Rc<Module>, name: &str) -> Result<Value> {
        let key = (module.file().to_path_buf(), name.to_string());
        let state = self.items.borrow().get(&key).cloned();
        match state {
            Some(ItemState::Done(result)) => return result,
            Some(ItemState::InProgress) => {
                return Err(Error::Resolution {
                    file: module.file().to_path_buf(),
                    line: module.item(name).map_or(0, |e| e.span().start().line),
                    binding: name.to_string(),
                    message: "the item's value depends on itself".into(),
                });
            }
            None => {}
        }

        let Some(expr) = module.item(name) else {
            return Err(Error::internal(format!("no item '{name}' in {}", module.file().display())));
        };

        _ = self.items.borrow_mut().insert(key.clone(), ItemState::InProgress);
        let frame = Frame {
            module: &**module,
            binding: name,
        };
        let result = self.eval(&frame, expr).map(|value| with_origin(value, module.file(), name));
        _ = self.items.borrow_mut().insert(key, ItemState::Done(result.clone()));
        result
    }

    fn eval(&self, frame: &Frame<'_>, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Lit(lit) => literal(frame, &lit.lit),
            Expr::Reference(r) => self.eval(frame, &r.expr),
            Expr::Paren(p) => self.eval(frame, &p.expr),
            Expr::Group(g) => self.eval(frame, &g.expr),
            Expr::Array(a) => a.elems.iter().map(|e| self.eval(frame, e)).collect::<Result<_>>().map(Value::List),
            Expr::Tuple(t) if !t.elems.is_empty() => t.elems.iter().map(|e| self.eval(frame, e)).collect::<Result<_>>().map(Value::Tuple),
            Expr::Unary(u) => self.unary(frame, u),
            Expr::Binary(b) => self.binary(frame, b),
            Expr::If(i) => {
                let condition = self.condition(frame, &i.cond)?;
                if condition {
                    self.block(frame, &i.then_branch)
                } else if let Some((_, otherwise)) = &i.else_branch {
                    self.eval(frame, otherwise)
                } else {
                    Err(error(frame, expr, "an `if` without `else` has no value"))
                }
            }
            Expr::Block(b) => self.block(frame, &b.block),
            Expr::Call(call) => match (&*call.func, call.args.len()) {
                (Expr::Path(p), 1) if p.path.is_ident("Some") => self.eval(frame, &call.args[0]),
                _ => Err(error(frame, expr, "function calls are not evaluated")),
            },
            Expr::MethodCall(m) if m.args.is_empty() && matches!(m.method.to_string().as_str(), "to_string" | "to_owned" | "into" | "clone" | "as_str") => {
                self.eval(frame, &m.receiver)
            }
            Expr::Path(p) if p.qself.is_none() => self.path(frame, expr, &p.path),
            Expr::Index(index) => {
                let base = self.eval(frame, &index.expr)?;
                let position = match self.eval(frame, &index.index)? {
                    Value::Int(i) => usize::try_from(i).map_err(|e| error(frame, expr, e.to_string()))?,
                    other => return Err(error(frame, expr, format!("cannot index with {}", other.type_name()))),
                };
                match base {
                    Value::List(mut items) if position < items.len() => Ok(items.swap_remove(position)),
                    Value::List(items) => Err(error(frame, expr, format!("index {position} is out of range for {} element(s)", items.len()))),
                    other => Err(error(frame, expr, format!("cannot index into {}", other.type_name()))),
                }
            }
            Expr::Field(f) => {
                let base = self.eval(frame, &f.base)?;
                let (Value::Record(record), Member::Named(field)) = (&base, &f.member) else {
                    return Err(error(frame, expr, format!("cannot access a field of {}", base.type_name())));
                };
                let field = field.unraw().to_string();
                if !record.kind.has_field(&field) {
                    return Err(error(frame, expr, format!("`{}` has no field `{field}`", record.kind)));
                }
                Ok(record.get(&field).cloned().unwrap_or(Value::Null))
            }
            Expr::Struct(s) => self.record(frame, s),
            Expr::Macro(m) => self.mac(frame, m),
            _ => Err(error(frame, expr, "this kind of expression is not supported in declarations")),
        }
    }

    fn block(&self, frame: &Frame<'_>, block: &Block) -> Result<Value> {
        match block.stmts.as_slice() {
            [Stmt::Expr(expr, None)] => self.eval(frame, expr),
            _ => Err(error(frame, block, "blocks must contain a single expression")),
        }
    }

    fn condition(&self, frame: &Frame<'_>, expr: &Expr) -> Result<bool> {
        match self.eval(frame, expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(error(frame, expr, format!("conditions must be bool, found {}", other.type_name()))),
        }
    }

    fn unary(&self, frame: &Frame<'_>, u: &syn::ExprUnary) -> Result<Value> {
        let value = self.eval(frame, &u.expr)?;
        match (&u.op, value) {
            (UnOp::Not(_), Value::Bool(b)) => Ok(Value::Bool(!b)),
            (UnOp::Neg(_), Value::Int(i)) => Ok(Value::Int(-i)),
            (UnOp::Neg(_), Value::Float(f)) => Ok(Value::Float(-f)),
            (UnOp::Deref(_), value) => Ok(value),
            (_, value) => Err(error(frame, u, format!("operator not supported for {}", value.type_name()))),
        }
    }

    fn binary(&self, frame: &Frame<'_>, b: &syn::ExprBinary) -> Result<Value> {
        match b.op {
            BinOp::And(_) => Ok(Value::Bool(self.condition(frame, &b.left)? && self.condition(frame, &b.right)?)),
            BinOp::Or(_) => Ok(Value::Bool(self.condition(frame, &b.left)? || self.condition(frame, &b.right)?)),
            BinOp::Eq(_) => Ok(Value::Bool(self.eval(frame, &b.left)? == self.eval(frame, &b.right)?)),
            BinOp::Ne(_) => Ok(Value::Bool(self.eval(frame, &b.left)? != self.eval(frame, &b.right)?)),
            _ => Err(error(frame, b, "only `==`, `!=`, `&&` and `||` are supported")),
        }
    }

    fn path(&self, frame: &Frame<'_>, expr: &Expr, path: &syn::Path) -> Result<Value> {
        if path.is_ident("None") {
            return Ok(Value::Null);
        }

        if let Some(canonical) = frame.module.imports().resolve(path) {
            return model_constant(&canonical).map_err(|message| error(frame, expr, message));
        }

        let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
        self.lookup(frame, &segments).map_err(|e| match e {
            Lookup::NotFound(message) => error(frame, expr, message),
            Lookup::Failed(e) => e,
        })
    }

    /// Resolves a user path (`NAME`, `jobs::NAME`, `crate::jobs::NAME`) to an item's value.
    fn lookup(&self, frame: &Frame<'_>, segments: &[String]) -> Result<Value, Lookup> {
        let module = self.adopt(frame.module);

        let [prefix @ .., name] = segments else {
            return Err(Lookup::NotFound("empty path".into()));
        };

        if prefix.is_empty() {
            if module.item(name).is_some() {
                return self.item_value(&module, name).map_err(Lookup::Failed);
            }

            if let Some(import) = module.imports().user_imports().iter().find(|i| i.local == *name) {
                return self.lookup_absolute(&module, &import.path);
            }

            for glob in module.imports().user_globs() {
                if let Some(target) = self.find_module(&module, glob)
                    && target.item(name).is_some()
                {
                    return self.item_value(&target, name).map_err(Lookup::Failed);
                }
            }

            return self.lookup_anywhere(name);
        }

        let mut full = segments.to_vec();
        if let Some(import) = module.imports().user_imports().iter().find(|i| i.local == prefix[0]) {
            _ = full.splice(0..1, import.path.iter().cloned());
        }
        self.lookup_absolute(&module, &full)
    }

    fn lookup_absolute(&self, from: &Module, path: &[String]) -> Result<Value, Lookup> {
        let [prefix @ .., name] = path else {
            return Err(Lookup::NotFound("empty path".into()));
        };

        let target = self
            .find_module(from, prefix)
            .ok_or_else(|| Lookup::NotFound(format!("cannot find module `{}`", prefix.join("::"))))?;

        if target.item(name).is_none() {
            return Err(Lookup::NotFound(format!("`{}` has no item `{name}`", target.file().display())));
        }

        self.item_value(&target, name).map_err(Lookup::Failed)
    }

    fn lookup_anywhere(&self, name: &str) -> Result<Value, Lookup> {
        let mut found = None;
        for (_, file) in &self.module_files {
            let module = self.module(file).map_err(Lookup::Failed)?;
            if module.item(name).is_some() {
                if found.is_some() {
                    return Err(Lookup::NotFound(format!("`{name}` is ambiguous; import it explicitly")));
                }
                found = Some(module);
            }
        }

        match found {
            Some(module) => self.item_value(&module, name).map_err(Lookup::Failed),
            None => Err(Lookup::NotFound(format!("cannot find `{name}`"))),
        }
    }

    /// Finds the module a `use` path prefix names, relative to `from`.
    fn find_module(&self, from: &Module, prefix: &[String]) -> Option<Rc<Module>> {
        let mut target: Vec<String> = from.path().to_vec();
        let mut rest = prefix;
        let mut anchored = false;

        while let [first, tail @ ..] = rest {
            match first.as_str() {
                "crate" => {
                    target.clear();
                    anchored = true;
                }
                "self" => anchored = true,
                "super" => {
                    _ = target.pop();
                    anchored = true;
                }
                _ => break,
            }
            rest = tail;
        }

        let candidates: Vec<Vec<String>> = if anchored {
            vec![target.iter().chain(rest).cloned().collect()]
        } else {
            vec![target.iter().chain(rest).cloned().collect(), rest.to_vec()]
        };

        for candidate in &candidates {
            if let Some((_, file)) = self.module_files.iter().find(|(path, _)| path == candidate) {
                return self.module(file).ok();
            }
        }

        let wanted = candidates.last()?;
        let mut matches = self.module_files.iter().filter(|(path, _)| path.ends_with(wanted));
        match (matches.next(), matches.next()) {
            (Some((_, file)), None) => self.module(file).ok(),
            _ => None,
        }
    }

    fn record(&self, frame: &Frame<'_>, s: &ExprStruct) -> Result<Value> {
        let kind = match frame.module.imports().resolve(&s.path).as_deref() {
            Some([name]) => RecordType::from_name(name),
            _ => None,
        }
        .ok_or_else(|| error(frame, &s.path, "only modeled record types can be instantiated"))?;

        let mut record = match &s.rest {
            Some(rest) if self.is_default(frame, rest) => Record::new(kind),
            Some(rest) => match self.eval(frame, rest)? {
                Value::Record(base) if base.kind == kind => Record { origin: None, ..base },
                other => return Err(error(frame, rest, format!("cannot fill a `{kind}` from {}", other.type_name()))),
            },
            None => Record::new(kind),
        };

        for field in &s.fields {
            let Member::Named(ident) = &field.member else {
                return Err(error(frame, field, "fields must be named"));
            };

            let name = ident.unraw().to_string();
            if !kind.has_field(&name) {
                return Err(error(frame, field, format!("`{kind}` has no field `{name}`")));
            }

            let value = self.eval(frame, &field.expr)?;
            record.set(name, value);
        }

        Ok(Value::Record(record))
    }

    /// `..Default::default()`, `..Job::default()` and `..Job::DEFAULT` add nothing.
    fn is_default(&self, frame: &Frame<'_>, expr: &Expr) -> bool {
        let path = match expr {
            Expr::Call(call) if call.args.is_empty() => match &*call.func {
                Expr::Path(p) => &p.path,
                _ => return false,
            },
            Expr::Path(p) => &p.path,
            _ => return false,
        };

        let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
        match segments.as_slice() {
            [d, f] if d == "Default" && f == "default" => true,
            [.., last] if last == "DEFAULT" || last == "default" => frame
                .module
                .imports()
                .resolve_segments(&segments)
                .is_some_and(|c| c.len() == 2 && RecordType::from_name(&c[0]).is_some()),
            _ => false,
        }
    }

    fn mac(&self, frame: &Frame<'_>, m: &ExprMacro) -> Result<Value> {
        let name = m.mac.path.segments.last().map(|s| s.ident.to_string()).unwrap_or_default();
        let args = || {
            m.mac
                .parse_body_with(Punctuated::<Expr, Token![,]>::parse_terminated)
                .map_err(|e| error(frame, m, format!("malformed `{name}!` arguments: {e}")))
        };

        match name.as_str() {
            "vec" => args()?.iter().map(|e| self.eval(frame, e)).collect::<Result<_>>().map(Value::List),
            "concat" => {
                let mut text = String::new();
                for arg in &args()? {
                    let value = self.eval(frame, arg)?;
                    let part = value
                        .interpolate()
                        .ok_or_else(|| error(frame, arg, format!("cannot concatenate {}", value.type_name())))?;
                    text.push_str(&part);
                }
                Ok(Value::Str(text))
            }
            "format" => self.format(frame, m, &args()?),
            "yaml" => {
                let literal: LitStr = m.mac.parse_body().map_err(|e| error(frame, m, format!("`yaml!` takes one string literal: {e}")))?;
                serde_yaml::from_str(&literal.value())
                    .map(Value::Opaque)
                    .map_err(|e| error(frame, m, format!("invalid YAML in `yaml!`: {e}")))
            }
            _ => Err(error(frame, m, format!("the `{name}!` macro is not supported in declarations"))),
        }
    }

    fn format(&self, frame: &Frame<'_>, m: &ExprMacro, args: &Punctuated<Expr, Token![,]>) -> Result<Value> {
        let mut args = args.iter();
        let template = match args.next() {
            Some(Expr::Lit(syn::ExprLit { lit: Lit::Str(s), .. })) => s.value(),
            _ => return Err(error(frame, m, "`format!` needs a string literal first")),
        };

        let mut positional = Vec::new();
        let mut named = HashMap::new();
        for arg in args {
            match arg {
                Expr::Assign(assign) => {
                    let Expr::Path(p) = &*assign.left else {
                        return Err(error(frame, arg, "named arguments must be identifiers"));
                    };
                    let key = p.path.get_ident().map(ToString::to_string).unwrap_or_default();
                    _ = named.insert(key, &*assign.right);
                }
                other => positional.push(other),
            }
        }

        let pieces = parse_format(&template).map_err(|message| error(frame, m, message))?;
        let mut next = 0;
        let mut text = String::new();
        for piece in pieces {
            let value = match piece {
                Piece::Text(t) => {
                    text.push_str(&t);
                    continue;
                }
                Piece::Next => {
                    next += 1;
                    let arg = positional.get(next - 1).ok_or_else(|| error(frame, m, "too few `format!` arguments"))?;
                    self.eval(frame, arg)?
                }
                Piece::Index(i) => {
                    let arg = positional.get(i).ok_or_else(|| error(frame, m, format!("no `format!` argument {i}")))?;
                    self.eval(frame, arg)?
                }
                Piece::Name(name) => match named.get(&name) {
                    Some(arg) => self.eval(frame, arg)?,
                    None => self
                        .lookup(frame, core::slice::from_ref(&name))
                        .map_err(|e| match e {
                            Lookup::NotFound(message) => error(frame, m, message),
                            Lookup::Failed(e) => e,
                        })?,
                },
            };

            let part = value
                .interpolate()
                .ok_or_else(|| error(frame, m, format!("cannot interpolate {}", value.type_name())))?;
            text.push_str(&part);
        }

        Ok(Value::Str(text))
    }
}

impl ModuleEvaluator for SourceEvaluator {
    fn evaluate(&self, module: &Module) -> Result<ModuleValues> {
        let module = self.adopt(module);
        let mut values = ModuleValues::new(module.file());
        for name in module.item_names() {
            let value = self.item_value(&module, &name);
            values.insert(name, value);
        }
        Ok(values)
    }
}

enum Lookup {
    NotFound(String),
    Failed(Error),
}

fn error(frame: &Frame<'_>, at: &impl Spanned, message: impl Into<String>) -> Error {
    Error::Resolution {
        file: frame.module.file().to_path_buf(),
        line: at.span().start().line,
        binding: frame.binding.to_string(),
        message: message.into(),
    }
}

fn literal(frame: &Frame<'_>, lit: &Lit) -> Result<Value> {
    match lit {
        Lit::Str(s) => Ok(Value::Str(s.value())),
        Lit::Char(c) => Ok(Value::Str(c.value().to_string())),
        Lit::Bool(b) => Ok(Value::Bool(b.value)),
        Lit::Int(i) => i.base10_parse().map(Value::Int).map_err(|e| error(frame, lit, e.to_string())),
        Lit::Float(f) => f.base10_parse().map(Value::Float).map_err(|e| error(frame, lit, e.to_string())),
        _ => Err(error(frame, lit, "unsupported literal")),
    }
}

/// Evaluates a path into the modeling package: intrinsics, enum constants and predefined rules.
fn model_constant(canonical: &[String]) -> Result<Value, String> {
    match canonical {
        [namespace, name] if Intrinsic::is_namespace(namespace) => Intrinsic::lookup(namespace, name)
            .map(Value::Var)
            .ok_or_else(|| format!("`{namespace}::{name}` is not a known intrinsic")),
        [namespace, name] if is_enum_namespace(namespace) => enum_constant(namespace, name)
            .map(|v| Value::Str(v.to_string()))
            .ok_or_else(|| format!("`{namespace}::{name}` is not a known constant")),
        [rules, name] if rules == "Rules" => predefined_rule(name)
            .map(Value::Record)
            .ok_or_else(|| format!("`Rules::{name}` is not a predefined rule")),
        _ => Err(format!("`{}` cannot be used as a value", canonical.join("::"))),
    }
}

/// Stamps top-level job and pipeline records with the binding they were declared as.
fn with_origin(value: Value, file: &Path, binding: &str) -> Value {
    let stamp = |record: &mut Record, binding: String| {
        if record.kind.is_declaration() && record.origin.is_none() {
            record.origin = Some(Origin {
                file: file.to_path_buf(),
                binding,
            });
        }
    };

    match value {
        Value::Record(mut record) => {
            stamp(&mut record, binding.to_string());
            Value::Record(record)
        }
        Value::List(mut items) => {
            for (i, item) in items.iter_mut().enumerate() {
                if let Value::Record(record) = item {
                    stamp(record, format!("{binding}[{i}]"));
                }
            }
            Value::List(items)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn crates() -> Vec<String> {
        vec!["ci_forge".to_string()]
    }

    fn evaluate(source: &str) -> ModuleValues {
        let module = Module::from_source(Path::new("jobs.rs"), source, &crates()).unwrap();
        let evaluator = SourceEvaluator::new("/nonexistent", &[PathBuf::from("jobs.rs")], &crates());
        evaluator.evaluate(&module).unwrap()
    }

    fn value(values: &ModuleValues, name: &str) -> Value {
        values.get(name).unwrap().unwrap()
    }

    fn record(values: &ModuleValues, name: &str) -> Record {
        match value(values, name) {
            Value::Record(r) => r,
            other => panic!("expected a record, found {other:?}"),
        }
    }

    #[test]
    fn literals_and_collections() {
        let values = evaluate(
            r#"
const S: &str = "text";
const N: i64 = -3;
const F: f64 = 1.5;
const B: bool = !false;
const L: &[&str] = &["a", "b"];
const V: Vec<i64> = vec![1, 2];
const P: &[(&str, i64)] = &[("A", 1)];
const O: Option<&str> = Some("x");
const E: Option<&str> = None;
"#,
        );

        assert_eq!(value(&values, "S"), Value::Str("text".into()));
        assert_eq!(value(&values, "N"), Value::Int(-3));
        assert_eq!(value(&values, "F"), Value::Float(1.5));
        assert_eq!(value(&values, "B"), Value::Bool(true));
        assert_eq!(value(&values, "L"), Value::List(vec![Value::Str("a".into()), Value::Str("b".into())]));
        assert_eq!(value(&values, "V"), Value::List(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(value(&values, "P").as_pairs().unwrap().len(), 1);
        assert_eq!(value(&values, "O"), Value::Str("x".into()));
        assert_eq!(value(&values, "E"), Value::Null);
    }

    #[test]
    fn format_concat_and_intrinsics() {
        let values = evaluate(
            r#"
use ci_forge::prelude::*;
const REGISTRY: &str = "registry.example.com";
const IMAGE: &str = format!("{REGISTRY}/app:{}", CI::COMMIT_SHORT_SHA);
const NAMED: &str = format!("{x}-{0}", "zero", x = 1);
const ESCAPED: &str = format!("{{literal}} {}", MR::IID);
const JOINED: &str = concat!("a", 1, true);
const SHA: &str = CI::COMMIT_SHA;
"#,
        );

        assert_eq!(value(&values, "IMAGE"), Value::Str("registry.example.com/app:$CI_COMMIT_SHORT_SHA".into()));
        assert_eq!(value(&values, "NAMED"), Value::Str("1-zero".into()));
        assert_eq!(value(&values, "ESCAPED"), Value::Str("{literal} $CI_MERGE_REQUEST_IID".into()));
        assert_eq!(value(&values, "JOINED"), Value::Str("a1true".into()));
        assert_eq!(value(&values, "SHA"), Value::Var(Intrinsic::lookup("CI", "COMMIT_SHA").unwrap()));
    }

    #[test]
    fn conditionals_and_blocks() {
        let values = evaluate(
            r#"
const RELEASE: bool = true;
const MODE: &str = if RELEASE && !false { "release" } else { "debug" };
const OTHER: &str = if MODE == "debug" { "d" } else if MODE != "x" { { "r" } } else { "x" };
"#,
        );

        assert_eq!(value(&values, "MODE"), Value::Str("release".into()));
        assert_eq!(value(&values, "OTHER"), Value::Str("r".into()));
    }

    #[test]
    fn struct_literals_spreads_and_origins() {
        let values = evaluate(
            r#"
use ci_forge::prelude::*;
const BASE: Job = Job { name: "base", stage: "build", script: &["make"], ..Job::DEFAULT };
const DERIVED: Job = Job { name: "derived", needs: &[&BASE], ..BASE };
const MATRIX: [Job; 2] = [Job { name: "m0" }, Job { name: "m1" }];
const ALIAS: Job = BASE;
const RULE: Rule = Rules::ON_TAG;
const WHEN: &str = When::Manual;
"#,
        );

        let derived = record(&values, "DERIVED");
        assert_eq!(derived.name(), Some("derived"));
        assert_eq!(derived.get("stage"), Some(&Value::Str("build".into())));
        assert_eq!(derived.origin.as_ref().unwrap().binding, "DERIVED");

        let Some(Value::List(needs)) = derived.get("needs") else {
            panic!("needs should be a list");
        };
        let Value::Record(base) = &needs[0] else {
            panic!("needs should hold a job record");
        };
        assert_eq!(base.origin.as_ref().unwrap().binding, "BASE");

        let Value::Record(m1) = value(&values, "MATRIX[1]") else {
            panic!("expected a record");
        };
        assert_eq!(m1.origin.unwrap().binding, "MATRIX[1]");

        assert_eq!(record(&values, "ALIAS").origin.unwrap().binding, "BASE");
        assert_eq!(record(&values, "RULE").kind, RecordType::Rule);
        assert_eq!(value(&values, "WHEN"), Value::Str("manual".into()));
    }

    #[test]
    fn field_access() {
        let values = evaluate(
            r#"
use ci_forge::prelude::*;
const BUILD: Job = Job { name: "build" };
const NAME: &str = BUILD.name;
"#,
        );
        assert_eq!(value(&values, "NAME"), Value::Str("build".into()));
    }

    #[test]
    fn unsupported_expressions_fail_with_location() {
        let values = evaluate(
            r#"
use ci_forge::prelude::*;
const GOOD: &str = "ok";
const BAD: i64 = compute();
const WORSE: Job = Job { nmae: "typo" };
const LOOP: &str = LOOP;
const USES_BAD: i64 = BAD;
"#,
        );

        assert!(values.get("GOOD").unwrap().is_ok());

        let Err(Error::Resolution { line, binding, .. }) = values.get("BAD").unwrap() else {
            panic!("expected a resolution error");
        };
        assert_eq!(line, 4);
        assert_eq!(binding, "BAD");

        assert!(values.get("WORSE").unwrap().is_err());
        assert!(values.get("LOOP").unwrap().is_err());
        assert!(values.get("USES_BAD").unwrap().is_err());
    }

    #[test]
    fn cross_module_references() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("ci")).unwrap();
        fs::write(dir.path().join("ci/shared.rs"), "pub const IMAGE: &str = \"rust:1.88\";\npub const TAGS: &[&str] = &[\"docker\"];\n").unwrap();
        fs::write(dir.path().join("ci/rules.rs"), "use ci_forge::prelude::*;\npub const DEPLOY_RULES: &[Rule] = &[Rules::ON_TAG];\n").unwrap();
        fs::write(
            dir.path().join("ci/jobs.rs"),
            r#"
use ci_forge::prelude::*;
use crate::ci::shared::IMAGE;
use super::rules::*;
use super::shared;

const DEPLOY: Job = Job { name: "deploy", image: IMAGE, tags: shared::TAGS, rules: DEPLOY_RULES };
"#,
        )
        .unwrap();

        let files = vec![PathBuf::from("ci/jobs.rs"), PathBuf::from("ci/rules.rs"), PathBuf::from("ci/shared.rs")];
        let evaluator = SourceEvaluator::new(dir.path(), &files, &crates());
        let module = Module::load(dir.path(), Path::new("ci/jobs.rs"), &crates()).unwrap();
        let values = evaluator.evaluate(&module).unwrap();

        let deploy = record(&values, "DEPLOY");
        assert_eq!(deploy.get("image"), Some(&Value::Str("rust:1.88".into())));
        assert_eq!(deploy.get("tags"), Some(&Value::List(vec![Value::Str("docker".into())])));
        assert!(matches!(deploy.get("rules"), Some(Value::List(rules)) if rules.len() == 1));
    }

    #[test]
    fn yaml_values_are_opaque() {
        let values = evaluate(
            r##"
const RAW: () = yaml!(r#"{"a": [1, 2]}"#);
const BROKEN: () = yaml!("[");
"##,
        );
        assert!(matches!(value(&values, "RAW"), Value::Opaque(serde_yaml::Value::Mapping(_))));
        assert!(values.get("BROKEN").unwrap().is_err());
    }
}
