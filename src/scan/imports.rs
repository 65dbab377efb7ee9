use crate::model::is_model_name;
use std::collections::{HashMap, HashSet};
use syn::{Item, Path, UseTree};

/// A `use` of something outside the modeling package, such as another declaration module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserImport {
    /// The name the import is visible as.
    pub local: String,

    /// The full imported path, e.g. `["crate", "jobs", "BUILD"]`.
    pub path: Vec<String>,
}

/// How the names of one source file map onto the modeling package.
///
/// Built from the file's top-level `use` items and item definitions. Model names are
/// recognized when reached through the package name, a module alias of it, a renamed
/// import, or bare (as after a wildcard import) when no local item shadows them.
#[derive(Debug, Clone, Default)]
pub struct ImportTable {
    modeling_crates: Vec<String>,
    aliases: HashMap<String, String>,
    module_aliases: HashSet<String>,
    shadowed: HashSet<String>,
    user_imports: Vec<UserImport>,
    user_globs: Vec<Vec<String>>,
}

impl ImportTable {
    /// Collects the `use` declarations among `items`.
    #[must_use]
    pub fn new(items: &[Item], modeling_crates: &[String]) -> Self {
        let mut table = Self {
            modeling_crates: modeling_crates.to_vec(),
            ..Self::default()
        };

        for item in items {
            match item {
                Item::Use(item_use) => table.add_use_tree(&item_use.tree, Vec::new()),
                Item::Struct(s) => _ = table.shadowed.insert(s.ident.to_string()),
                Item::Enum(e) => _ = table.shadowed.insert(e.ident.to_string()),
                Item::Type(t) => _ = table.shadowed.insert(t.ident.to_string()),
                Item::Mod(m) => _ = table.shadowed.insert(m.ident.to_string()),
                Item::Trait(t) => _ = table.shadowed.insert(t.ident.to_string()),
                Item::Union(u) => _ = table.shadowed.insert(u.ident.to_string()),
                _ => {}
            }
        }

        table
    }

    fn add_use_tree(&mut self, tree: &UseTree, mut prefix: Vec<String>) {
        match tree {
            UseTree::Path(p) => {
                prefix.push(p.ident.to_string());
                self.add_use_tree(&p.tree, prefix);
            }
            UseTree::Name(n) => {
                let name = n.ident.to_string();
                let local = if name == "self" {
                    prefix.last().cloned().unwrap_or_default()
                } else {
                    prefix.push(name.clone());
                    name
                };
                self.add_import(local, prefix);
            }
            UseTree::Rename(r) => {
                if r.ident != "self" {
                    prefix.push(r.ident.to_string());
                }
                self.add_import(r.rename.to_string(), prefix);
            }
            UseTree::Glob(_) => {
                if !self.is_modeling_path(&prefix) {
                    self.user_globs.push(prefix);
                }
            }
            UseTree::Group(g) => {
                for tree in &g.items {
                    self.add_use_tree(tree, prefix.clone());
                }
            }
        }
    }

    fn add_import(&mut self, local: String, path: Vec<String>) {
        if local.is_empty() || local == "_" {
            return;
        }

        if self.is_modeling_path(&path) {
            let rest = self.strip_modeling_prefix(&path);
            match rest.last() {
                None => _ = self.module_aliases.insert(local),
                Some(canonical) if is_model_name(canonical) => _ = self.aliases.insert(local, canonical.clone()),
                Some(_) => {}
            }
            return;
        }

        _ = self.shadowed.insert(local.clone());
        self.user_imports.push(UserImport { local, path });
    }

    fn is_modeling_path(&self, path: &[String]) -> bool {
        path.first().is_some_and(|first| self.modeling_crates.contains(first) || self.module_aliases.contains(first))
    }

    /// Drops the package name and the `prelude`/`model` re-export modules from an imported path.
    fn strip_modeling_prefix(&self, path: &[String]) -> Vec<String> {
        path.iter()
            .skip(1)
            .skip_while(|segment| *segment == "prelude" || *segment == "model")
            .cloned()
            .collect()
    }

    /// Resolves a path written in source to its canonical path within the modeling package.
    ///
    /// Returns `None` when the path does not refer to the modeling package.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> Option<Vec<String>> {
        let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
        self.resolve_segments(&segments)
    }

    /// Like [`ImportTable::resolve`], for an already split path.
    #[must_use]
    pub fn resolve_segments(&self, segments: &[String]) -> Option<Vec<String>> {
        let first = segments.first()?;

        if self.is_modeling_path(segments) {
            let rest = self.strip_modeling_prefix(segments);
            return rest.first().is_some_and(|name| is_model_name(name)).then_some(rest);
        }

        if let Some(canonical) = self.aliases.get(first) {
            let mut resolved = vec![canonical.clone()];
            resolved.extend(segments.iter().skip(1).cloned());
            return Some(resolved);
        }

        (is_model_name(first) && !self.shadowed.contains(first)).then(|| segments.to_vec())
    }

    /// Imports of names outside the modeling package.
    #[must_use]
    pub fn user_imports(&self) -> &[UserImport] {
        &self.user_imports
    }

    /// Wildcard imports of modules outside the modeling package.
    #[must_use]
    pub fn user_globs(&self) -> &[Vec<String>] {
        &self.user_globs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(source: &str) -> ImportTable {
        let file = syn::parse_file(source).unwrap();
        ImportTable::new(&file.items, &["ci_forge".to_string()])
    }

    fn resolve(table: &ImportTable, path: &str) -> Option<Vec<String>> {
        table.resolve(&syn::parse_str::<Path>(path).unwrap())
    }

    #[test]
    fn wildcard_and_bare_names() {
        let t = table("use ci_forge::prelude::*;");
        assert_eq!(resolve(&t, "Job"), Some(vec!["Job".to_string()]));
        assert_eq!(resolve(&t, "CI::COMMIT_SHA"), Some(vec!["CI".to_string(), "COMMIT_SHA".to_string()]));
        assert_eq!(resolve(&t, "Step"), None);
    }

    #[test]
    fn renamed_imports() {
        let t = table("use ci_forge::{Job as CiJob, Pipeline};");
        assert_eq!(resolve(&t, "CiJob"), Some(vec!["Job".to_string()]));
        assert_eq!(resolve(&t, "Pipeline"), Some(vec!["Pipeline".to_string()]));
    }

    #[test]
    fn module_aliases() {
        let t = table("use ci_forge as forge;");
        assert_eq!(resolve(&t, "forge::Job"), Some(vec!["Job".to_string()]));
        assert_eq!(resolve(&t, "ci_forge::model::Rule"), Some(vec!["Rule".to_string()]));
        assert_eq!(resolve(&t, "forge::helpers"), None);
    }

    #[test]
    fn local_definitions_shadow_model_names() {
        let t = table("struct Job; use other::Pipeline;");
        assert_eq!(resolve(&t, "Job"), None);
        assert_eq!(resolve(&t, "Pipeline"), None);
        assert_eq!(t.user_imports().len(), 1);
    }

    #[test]
    fn user_imports_and_globs() {
        let t = table("use crate::jobs::{BUILD, TEST as T}; use super::rules::*;");
        assert_eq!(
            t.user_imports(),
            &[
                UserImport {
                    local: "BUILD".into(),
                    path: vec!["crate".into(), "jobs".into(), "BUILD".into()]
                },
                UserImport {
                    local: "T".into(),
                    path: vec!["crate".into(), "jobs".into(), "TEST".into()]
                },
            ]
        );
        assert_eq!(t.user_globs(), &[vec!["super".to_string(), "rules".to_string()]]);
    }
}
