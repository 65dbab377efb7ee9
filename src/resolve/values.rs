use crate::error::Result;
use crate::model::Value;
use std::path::{Path, PathBuf};

/// The evaluated top-level items of one module.
///
/// Each item keeps its own result so that a broken helper constant only fails the
/// declarations that use it.
#[derive(Debug, Clone, Default)]
pub struct ModuleValues {
    file: PathBuf,
    items: Vec<(String, Result<Value>)>,
}

impl ModuleValues {
    /// No values yet for the module at `file`.
    #[must_use]
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            items: Vec::new(),
        }
    }

    /// The module's file.
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Records the value of a top-level item.
    pub fn insert(&mut self, name: impl Into<String>, value: Result<Value>) {
        self.items.push((name.into(), value));
    }

    /// The number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the module has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up a binding, including array elements written as `NAME[i]`.
    #[must_use]
    pub fn get(&self, binding: &str) -> Option<Result<Value>> {
        let (item, index) = split_binding(binding);
        let value = self.items.iter().find(|(name, _)| name == item).map(|(_, value)| value.clone())?;

        let Some(index) = index else {
            return Some(value);
        };

        match value {
            Ok(Value::List(mut elements)) if index < elements.len() => Some(Ok(elements.swap_remove(index))),
            Ok(_) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

fn split_binding(binding: &str) -> (&str, Option<usize>) {
    if let Some((item, rest)) = binding.split_once('[')
        && let Some(index) = rest.strip_suffix(']')
        && let Ok(index) = index.parse()
    {
        return (item, Some(index));
    }

    (binding, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn looks_up_items_and_elements() {
        let mut values = ModuleValues::new("jobs.rs");
        values.insert("A", Ok(Value::Int(1)));
        values.insert("M", Ok(Value::List(vec![Value::Int(10), Value::Int(11), Value::Int(12)])));
        values.insert("BAD", Err(Error::internal("nope")));

        assert_eq!(values.get("A").unwrap().unwrap(), Value::Int(1));
        assert_eq!(values.get("M[1]").unwrap().unwrap(), Value::Int(11));
        assert!(values.get("M[3]").is_none());
        assert!(values.get("A[0]").is_none());
        assert!(values.get("BAD").unwrap().is_err());
        assert!(values.get("MISSING").is_none());
        assert_eq!(values.len(), 3);
    }
}
