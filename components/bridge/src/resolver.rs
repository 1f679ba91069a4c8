//! Module resolvers.
//!
//! A resolver maps a normalized module id to a source file. Resolvers are
//! consulted in registration order and the first match wins; the module
//! remembers which resolver found it so a reload reads from the same place.

use crate::path_util;
use crate::{BridgeResult, FileSystem};

/// Suffixes tried, in order, after the bare id.
pub const MODULE_EXTENSIONS: [&str; 3] = [".js", ".json", "/index.js"];

/// Maps module ids to source files.
pub trait ModuleResolver {
    /// The source path of `module_id`, if this resolver owns it.
    fn resolve(&self, fs: &dyn FileSystem, module_id: &str) -> Option<String>;

    /// Reads the source of a resolved path.
    fn read_source(&self, fs: &dyn FileSystem, path: &str) -> BridgeResult<String> {
        fs.read_to_string(path)
    }
}

/// Resolves ids against a list of root directories.
///
/// An id that already starts with one of the roots (as ids built from a
/// parent module's path do) is tried as is; otherwise it is joined to each
/// root in order.
///
/// # Examples
///
/// ```
/// use bridge::{MemoryFileSystem, ModuleResolver, SearchPathResolver};
///
/// let fs = MemoryFileSystem::new();
/// fs.write("res/lib/util.js", "");
/// fs.write("res/data/index.js", "");
///
/// let resolver = SearchPathResolver::new(["res"]);
/// assert_eq!(resolver.resolve(&fs, "lib/util").as_deref(), Some("res/lib/util.js"));
/// assert_eq!(resolver.resolve(&fs, "res/lib/util").as_deref(), Some("res/lib/util.js"));
/// assert_eq!(resolver.resolve(&fs, "data").as_deref(), Some("res/data/index.js"));
/// assert_eq!(resolver.resolve(&fs, "missing"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SearchPathResolver {
    roots: Vec<String>,
}

impl SearchPathResolver {
    /// Creates a resolver over `roots`.
    pub fn new<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roots: roots
                .into_iter()
                .map(|root| root.into().trim_end_matches('/').to_string())
                .collect(),
        }
    }

    /// The search roots.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    fn owns(&self, module_id: &str) -> bool {
        module_id.starts_with('/')
            || self
                .roots
                .iter()
                .any(|root| module_id.strip_prefix(root.as_str()).is_some_and(|rest| rest.starts_with('/')))
    }

    fn find_file(fs: &dyn FileSystem, base: &str) -> Option<String> {
        if fs.exists(base) {
            return Some(base.to_string());
        }
        MODULE_EXTENSIONS
            .iter()
            .map(|ext| format!("{}{}", base, ext))
            .find(|candidate| fs.exists(candidate))
    }
}

impl ModuleResolver for SearchPathResolver {
    fn resolve(&self, fs: &dyn FileSystem, module_id: &str) -> Option<String> {
        if self.owns(module_id) {
            if let Some(found) = Self::find_file(fs, module_id) {
                return Some(found);
            }
        }
        self.roots
            .iter()
            .find_map(|root| Self::find_file(fs, &path_util::combine(root, module_id)))
    }
}
