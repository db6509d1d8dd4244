//! Reference resolution
//!
//! Turns the configured list of reference names into a [`ReferenceSet`] of resolved, fingerprinted files. Resolution
//! is all-or-nothing: the first name that cannot be found aborts it, so a session never compiles against an
//! incomplete set.
//!
//! ## Lookup rules
//!
//! - A name containing a path separator (or an absolute path) is used as-is.
//! - Otherwise every search root is probed in order for `<root>/<name>`, then `<root>/<name>.<ext>`. The first root
//!   with a match wins, so a name present in several roots always resolves to the same file.
//!
//! ```rust,ignore
//! use forgec::frontend::resolver::ReferenceResolver;
//!
//! let resolver = ReferenceResolver::new(vec!["/usr/share/dotnet/shared/Microsoft.NETCore.App/9.0.0".into()]);
//! let refs = resolver.resolve(&["System.Runtime".to_string()]).await?;
//! ```

use std::path::{Path, PathBuf};

use crate::error::{DriverError, DriverResult};

/// Default file extension probed for logical reference names
pub const DEFAULT_REFERENCE_EXTENSION: &str = "dll";

/// A resolved reference file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceHandle {
    /// Logical name, e.g. `System.Runtime`
    pub name: String,
    pub path: PathBuf,
    /// BLAKE3 hex digest of the file contents
    pub fingerprint: String,
}

/// An immutable, duplicate-free set of references in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    handles: Vec<ReferenceHandle>,
}

impl ReferenceSet {
    /// Build a set, rejecting the first duplicate name.
    pub fn from_handles(handles: Vec<ReferenceHandle>) -> DriverResult<Self> {
        let mut set = Self::default();
        for handle in handles {
            if set.contains(&handle.name) {
                return Err(DriverError::DuplicateReference { name: handle.name });
            }
            set.handles.push(handle);
        }
        Ok(set)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceHandle> {
        self.handles.iter()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ReferenceHandle> {
        self.handles.iter().find(|h| h.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

/// Resolves reference names against a fixed list of search roots.
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    search_roots: Vec<PathBuf>,
    extension: String,
    /// Names that must be present after resolution (the core set)
    required: Vec<String>,
}

impl ReferenceResolver {
    pub fn new(search_roots: Vec<PathBuf>) -> Self {
        Self {
            search_roots,
            extension: DEFAULT_REFERENCE_EXTENSION.to_string(),
            required: Vec::new(),
        }
    }

    /// Set the extension probed for logical names (without the dot).
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Require these names to be part of every resolved set.
    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required = required;
        self
    }

    pub fn search_roots(&self) -> &[PathBuf] {
        &self.search_roots
    }

    /// Resolve every name, in order, into a [`ReferenceSet`].
    ///
    /// ## Errors
    ///
    /// - [`DriverError::MissingReference`] for the first name (in input order) that cannot be found, or the first
    ///   required name that is not among the resolved references
    /// - [`DriverError::DuplicateReference`] if two names resolve to the same logical name
    /// - [`DriverError::Io`] if a located file cannot be read for fingerprinting
    #[tracing::instrument(skip_all, fields(count = names.len(), roots = self.search_roots.len()))]
    pub async fn resolve(&self, names: &[String]) -> DriverResult<ReferenceSet> {
        let mut handles = Vec::with_capacity(names.len());
        for name in names {
            let Some(path) = self.locate(name).await else {
                return Err(DriverError::MissingReference { name: name.clone() });
            };
            let bytes = tokio::fs::read(&path).await.map_err(|e| DriverError::io(&path, e))?;
            let handle = ReferenceHandle {
                name: self.handle_name(&path),
                fingerprint: blake3::hash(&bytes).to_hex().to_string(),
                path,
            };
            tracing::debug!(name = %handle.name, path = %handle.path.display(), "resolved reference");
            handles.push(handle);
        }

        let set = ReferenceSet::from_handles(handles)?;
        if let Some(missing) = self.required.iter().find(|name| !set.contains(&self.logical_name(name))) {
            return Err(DriverError::MissingReference { name: missing.clone() });
        }
        Ok(set)
    }

    /// Find the backing file for a name, or `None` if no candidate exists.
    async fn locate(&self, name: &str) -> Option<PathBuf> {
        if is_explicit_path(name) {
            let path = PathBuf::from(name);
            return is_file(&path).await.then_some(path);
        }

        for root in &self.search_roots {
            let exact = root.join(name);
            if is_file(&exact).await {
                return Some(exact);
            }
            let with_ext = root.join(format!("{name}.{}", self.extension));
            if is_file(&with_ext).await {
                return Some(with_ext);
            }
        }
        None
    }

    /// Logical name of a resolved file: its file name minus the reference extension.
    fn handle_name(&self, path: &Path) -> String {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.logical_name(&file_name)
    }

    /// `System.Runtime.dll` and `System.Runtime` name the same reference.
    fn logical_name(&self, name: &str) -> String {
        let suffix = format!(".{}", self.extension);
        match name.strip_suffix(&suffix) {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => name.to_string(),
        }
    }
}

fn is_explicit_path(name: &str) -> bool {
    name.contains('/') || name.contains('\\') || Path::new(name).is_absolute()
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_resolves_logical_names_with_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("System.Runtime.dll"), b"runtime").unwrap();

        let resolver = ReferenceResolver::new(vec![dir.path().to_path_buf()]);
        let set = resolver.resolve(&names(&["System.Runtime"])).await.unwrap();

        let handle = set.get("System.Runtime").unwrap();
        assert_eq!(handle.path, dir.path().join("System.Runtime.dll"));
        assert_eq!(handle.fingerprint, blake3::hash(b"runtime").to_hex().to_string());
    }

    #[tokio::test]
    async fn test_file_name_with_extension_maps_to_same_logical_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mscorlib.dll"), b"x").unwrap();

        let resolver = ReferenceResolver::new(vec![dir.path().to_path_buf()]);
        let set = resolver.resolve(&names(&["mscorlib.dll"])).await.unwrap();
        assert!(set.contains("mscorlib"));
    }

    #[tokio::test]
    async fn test_explicit_path_bypasses_search_roots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Custom.dll");
        fs::write(&path, b"custom").unwrap();

        let resolver = ReferenceResolver::new(Vec::new());
        let set = resolver
            .resolve(&[path.to_string_lossy().into_owned()])
            .await
            .unwrap();
        assert_eq!(set.get("Custom").unwrap().path, path);
    }

    #[tokio::test]
    async fn test_first_missing_name_in_input_order_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("A.dll"), b"a").unwrap();

        let resolver = ReferenceResolver::new(vec![dir.path().to_path_buf()]);
        let err = resolver.resolve(&names(&["A", "B", "C"])).await.unwrap_err();
        assert!(matches!(err, DriverError::MissingReference { ref name } if name == "B"));
    }

    #[tokio::test]
    async fn test_first_search_root_wins() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("Dup.dll"), b"one").unwrap();
        fs::write(second.path().join("Dup.dll"), b"two").unwrap();

        let resolver = ReferenceResolver::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        for _ in 0..3 {
            let set = resolver.resolve(&names(&["Dup"])).await.unwrap();
            assert_eq!(set.get("Dup").unwrap().fingerprint, blake3::hash(b"one").to_hex().to_string());
        }
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("A.dll"), b"a").unwrap();

        let resolver = ReferenceResolver::new(vec![dir.path().to_path_buf()]);
        let err = resolver.resolve(&names(&["A", "A.dll"])).await.unwrap_err();
        assert!(matches!(err, DriverError::DuplicateReference { ref name } if name == "A"));
    }

    #[tokio::test]
    async fn test_empty_list_fails_when_core_required() {
        let resolver = ReferenceResolver::new(Vec::new()).with_required(names(&["System.Private.CoreLib"]));
        let err = resolver.resolve(&[]).await.unwrap_err();
        assert!(matches!(err, DriverError::MissingReference { ref name } if name == "System.Private.CoreLib"));
    }

    #[tokio::test]
    async fn test_required_name_with_extension_matches_logical_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("System.Private.CoreLib.dll"), b"core").unwrap();

        let resolver = ReferenceResolver::new(vec![dir.path().to_path_buf()])
            .with_required(names(&["System.Private.CoreLib.dll"]));
        let set = resolver.resolve(&names(&["System.Private.CoreLib.dll"])).await.unwrap();
        assert!(set.contains("System.Private.CoreLib"));

        // Either spelling satisfies either spelling
        let resolver = ReferenceResolver::new(vec![dir.path().to_path_buf()])
            .with_required(names(&["System.Private.CoreLib"]));
        assert!(resolver.resolve(&names(&["System.Private.CoreLib.dll"])).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_list_without_requirements_is_empty_set() {
        let resolver = ReferenceResolver::new(Vec::new());
        let set = resolver.resolve(&[]).await.unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_with_extension_strips_dot() {
        let resolver = ReferenceResolver::new(Vec::new()).with_extension(".so");
        assert_eq!(resolver.handle_name(Path::new("/lib/libfoo.so")), "libfoo");
    }
}
