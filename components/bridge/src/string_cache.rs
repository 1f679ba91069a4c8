//! Interned property and method names.

use std::collections::HashMap;
use std::rc::Rc;

/// Names looked up repeatedly from the host side, shared as `Rc<str>`.
#[derive(Debug, Default)]
pub struct StringCache {
    strings: HashMap<Box<str>, Rc<str>>,
}

impl StringCache {
    /// Returns the shared copy of `name`, interning it on first use.
    pub fn intern(&mut self, name: &str) -> Rc<str> {
        if let Some(shared) = self.strings.get(name) {
            return shared.clone();
        }
        let shared: Rc<str> = Rc::from(name);
        self.strings.insert(Box::from(name), shared.clone());
        shared
    }

    /// Number of interned names.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether nothing is interned.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Forgets every name.
    pub fn clear(&mut self) {
        self.strings.clear();
    }
}
