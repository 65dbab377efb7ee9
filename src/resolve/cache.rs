use crate::error::{Error, Result};
use crate::resolve::{Module, ModuleEvaluator, ModuleValues};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Evaluated modules, keyed by file.
///
/// A module is evaluated at most once per cache. The lock is held while a module is
/// evaluated, so concurrent callers asking for the same file wait for the first result.
#[derive(Debug, Default)]
pub struct ModuleCache {
    entries: Mutex<HashMap<PathBuf, Arc<ModuleValues>>>,
}

impl ModuleCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached values for `module`, evaluating it on first use.
    ///
    /// # Errors
    ///
    /// Fails if the evaluator fails, or if an earlier evaluation panicked while holding the lock.
    pub fn get_or_evaluate(&self, module: &Module, evaluator: &dyn ModuleEvaluator) -> Result<Arc<ModuleValues>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| Error::internal(format!("module cache lock poisoned: {e}")))?;

        if let Some(values) = entries.get(module.file()) {
            log::trace!("reusing evaluated module {}", module.file().display());
            return Ok(Arc::clone(values));
        }

        log::debug!("evaluating module {}", module.file().display());
        let values = Arc::new(evaluator.evaluate(module)?);
        _ = entries.insert(module.file().to_path_buf(), Arc::clone(&values));
        Ok(values)
    }

    /// The number of modules evaluated so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    /// Whether no module has been evaluated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
