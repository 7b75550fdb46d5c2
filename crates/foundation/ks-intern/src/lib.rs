//! String interning for symbols

pub use lasso::Spur as Symbol;
use lasso::ThreadedRodeo;
use std::sync::{Arc, Mutex};

/// Thread-safe string interner
#[derive(Clone, Debug)]
pub struct Interner {
    inner: Arc<Mutex<ThreadedRodeo>>,
}

impl Interner {
    /// Create an empty interner
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ThreadedRodeo::new())),
        }
    }

    /// Intern a string, returning its symbol
    pub fn intern(&self, s: &str) -> Symbol {
        self.inner.lock().unwrap().get_or_intern(s)
    }

    /// Resolve a symbol back to its string
    pub fn resolve(&self, sym: &Symbol) -> String {
        self.inner.lock().unwrap().resolve(sym).to_string()
    }

    /// Resolve a symbol if it has been interned
    pub fn try_resolve(&self, sym: &Symbol) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .try_resolve(sym)
            .map(|s| s.to_string())
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}
