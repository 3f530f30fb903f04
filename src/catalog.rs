//! Algorithm catalog
//!
//! Process-wide cache of the operation signatures declared by the processing
//! backend. The catalog is populated lazily, exactly once, from a
//! [`CatalogFetcher`]; the fetch is the only blocking operation anywhere near
//! this crate and it belongs to the fetcher implementation, not the catalog.
//!
//! Tests construct their own `AlgorithmCatalog` instances;
//! [`AlgorithmCatalog::global`] is the shared instance the wrapper layer
//! binds against.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Context;
use tracing::info;

use crate::error::{ExprError, Result};
use crate::signature::OperationSignature;

// =============================================================================
// FETCHER BOUNDARY
// =============================================================================

/// Source of the name -> signature mapping. The HTTP client implements this
/// in the transport crate; file-backed and in-memory sources live here for
/// offline and test use.
pub trait CatalogFetcher: Send + Sync {
    fn fetch(&self) -> anyhow::Result<HashMap<String, OperationSignature>>;
}

/// In-memory catalog source
pub struct StaticCatalog {
    ops: HashMap<String, OperationSignature>,
}

impl StaticCatalog {
    pub fn new(ops: impl IntoIterator<Item = (String, OperationSignature)>) -> Self {
        Self {
            ops: ops.into_iter().collect(),
        }
    }
}

impl CatalogFetcher for StaticCatalog {
    fn fetch(&self) -> anyhow::Result<HashMap<String, OperationSignature>> {
        Ok(self.ops.clone())
    }
}

/// File-backed catalog source: a YAML or JSON mapping from operation name to
/// signature, selected by file extension.
pub struct FileCatalogSource {
    path: PathBuf,
}

impl FileCatalogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolve the catalog path from the GEOFLUX_CATALOG_FILE environment
    /// variable, falling back to `config/catalog.yaml`.
    pub fn from_env() -> Self {
        match std::env::var("GEOFLUX_CATALOG_FILE") {
            Ok(path) => Self::new(path),
            Err(_) => Self::new("config/catalog.yaml"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CatalogFetcher for FileCatalogSource {
    fn fetch(&self) -> anyhow::Result<HashMap<String, OperationSignature>> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading catalog file {}", self.path.display()))?;
        let is_yaml = matches!(
            self.path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let ops: HashMap<String, OperationSignature> = if is_yaml {
            serde_yaml::from_str(&text)
                .with_context(|| format!("parsing catalog file {}", self.path.display()))?
        } else {
            serde_json::from_str(&text)
                .with_context(|| format!("parsing catalog file {}", self.path.display()))?
        };
        Ok(ops)
    }
}

// =============================================================================
// CATALOG
// =============================================================================

#[derive(Default)]
struct CatalogState {
    ops: HashMap<String, OperationSignature>,
    bound: HashSet<String>,
    initialized: bool,
}

/// The operation catalog: name -> signature, plus bookkeeping of which
/// operations have been bound onto a member table somewhere.
#[derive(Default)]
pub struct AlgorithmCatalog {
    state: RwLock<CatalogState>,
}

static GLOBAL_CATALOG: OnceLock<AlgorithmCatalog> = OnceLock::new();

impl AlgorithmCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide catalog instance
    pub fn global() -> &'static AlgorithmCatalog {
        GLOBAL_CATALOG.get_or_init(AlgorithmCatalog::new)
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Populate the catalog if it is empty. Idempotent: the fetch happens at
    /// most once, and concurrent first callers serialize on the state lock so
    /// all of them observe the same populated catalog.
    pub fn initialize(&self, fetcher: &dyn CatalogFetcher) -> Result<()> {
        let mut state = self.write();
        if state.initialized {
            return Ok(());
        }
        let fetched = fetcher.fetch().map_err(ExprError::CatalogSource)?;
        let mut ops = HashMap::with_capacity(fetched.len());
        for (name, mut signature) in fetched {
            signature.normalize(&name);
            ops.insert(name, signature);
        }
        info!(operations = ops.len(), "operation catalog initialized");
        state.ops = ops;
        state.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.read().initialized
    }

    /// Look up an operation signature by name. An empty name always fails.
    pub fn lookup(&self, name: &str) -> Result<OperationSignature> {
        if name.is_empty() {
            return Err(ExprError::EmptyOperationName);
        }
        let state = self.read();
        if !state.initialized {
            return Err(ExprError::CatalogNotInitialized);
        }
        state
            .ops
            .get(name)
            .cloned()
            .ok_or_else(|| ExprError::UnknownOperation(name.to_string()))
    }

    /// Clear the catalog and the bound-name set; the next `initialize`
    /// re-fetches. Used on re-authentication and in tests.
    pub fn reset(&self) {
        let mut state = self.write();
        *state = CatalogState::default();
    }

    pub fn len(&self) -> usize {
        self.read().ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().ops.is_empty()
    }

    /// All operation names starting with `prefix`, sorted
    pub fn names_with_prefix(&self, prefix: &str) -> Vec<String> {
        let state = self.read();
        let mut names: Vec<String> = state
            .ops
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Record that an operation has been exposed as a member somewhere
    pub fn mark_bound(&self, name: &str) {
        self.write().bound.insert(name.to_string());
    }

    /// Forget a bound-name record (member unbinding)
    pub fn unmark_bound(&self, name: &str) {
        self.write().bound.remove(name);
    }

    /// Has this operation been exposed as a member?
    pub fn is_bound(&self, name: &str) -> bool {
        self.read().bound.contains(name)
    }

    /// Every operation name currently recorded as exposed, sorted
    pub fn bound_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().bound.iter().cloned().collect();
        names.sort();
        names
    }

    /// Catalog entries not yet exposed on any member table, sorted. Hidden
    /// operations are skipped: they are never bound by design.
    pub fn unbound_operations(&self) -> Vec<String> {
        let state = self.read();
        let mut names: Vec<String> = state
            .ops
            .iter()
            .filter(|(name, sig)| !sig.hidden && !state.bound.contains(*name))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::ParameterSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_ops() -> HashMap<String, OperationSignature> {
        let mut ops = HashMap::new();
        ops.insert(
            "Image.constant".to_string(),
            OperationSignature {
                returns: "Image".to_string(),
                args: vec![ParameterSpec::new("value", "Object")],
                ..Default::default()
            },
        );
        ops.insert(
            "Image.select".to_string(),
            OperationSignature {
                returns: "Image".to_string(),
                args: vec![
                    ParameterSpec::new("input", "Image"),
                    ParameterSpec::new("bands", "List<String>"),
                ],
                ..Default::default()
            },
        );
        ops
    }

    #[test]
    fn test_initialize_normalizes_and_names() {
        let catalog = AlgorithmCatalog::new();
        catalog
            .initialize(&StaticCatalog::new(sample_ops()))
            .unwrap();
        let sig = catalog.lookup("Image.select").unwrap();
        assert_eq!(sig.name, "Image.select");
        assert_eq!(sig.args[1].type_name, "List");
    }

    #[test]
    fn test_initialize_fetches_once() {
        struct CountingFetcher(AtomicUsize);
        impl CatalogFetcher for CountingFetcher {
            fn fetch(&self) -> anyhow::Result<HashMap<String, OperationSignature>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(HashMap::new())
            }
        }

        let catalog = AlgorithmCatalog::new();
        let fetcher = CountingFetcher(AtomicUsize::new(0));
        catalog.initialize(&fetcher).unwrap();
        catalog.initialize(&fetcher).unwrap();
        assert_eq!(fetcher.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lookup_empty_name_fails() {
        let catalog = AlgorithmCatalog::new();
        catalog
            .initialize(&StaticCatalog::new(sample_ops()))
            .unwrap();
        assert!(matches!(
            catalog.lookup(""),
            Err(ExprError::EmptyOperationName)
        ));
    }

    #[test]
    fn test_lookup_unknown_fails() {
        let catalog = AlgorithmCatalog::new();
        catalog
            .initialize(&StaticCatalog::new(sample_ops()))
            .unwrap();
        assert!(matches!(
            catalog.lookup("Image.nope"),
            Err(ExprError::UnknownOperation(name)) if name == "Image.nope"
        ));
    }

    #[test]
    fn test_lookup_before_initialize_fails() {
        let catalog = AlgorithmCatalog::new();
        assert!(matches!(
            catalog.lookup("Image.constant"),
            Err(ExprError::CatalogNotInitialized)
        ));
    }

    #[test]
    fn test_reset_clears_everything() {
        let catalog = AlgorithmCatalog::new();
        catalog
            .initialize(&StaticCatalog::new(sample_ops()))
            .unwrap();
        catalog.mark_bound("Image.constant");
        catalog.reset();
        assert!(!catalog.is_initialized());
        assert!(catalog.is_empty());
        assert!(!catalog.is_bound("Image.constant"));
    }

    #[test]
    fn test_unbound_operations_skips_hidden_and_bound() {
        let mut ops = sample_ops();
        ops.insert(
            "Image.internal".to_string(),
            OperationSignature {
                returns: "Image".to_string(),
                hidden: true,
                ..Default::default()
            },
        );
        let catalog = AlgorithmCatalog::new();
        catalog.initialize(&StaticCatalog::new(ops)).unwrap();
        catalog.mark_bound("Image.constant");
        assert_eq!(catalog.unbound_operations(), vec!["Image.select"]);
    }

    #[test]
    fn test_names_with_prefix_sorted() {
        let catalog = AlgorithmCatalog::new();
        catalog
            .initialize(&StaticCatalog::new(sample_ops()))
            .unwrap();
        assert_eq!(
            catalog.names_with_prefix("Image."),
            vec!["Image.constant", "Image.select"]
        );
        assert!(catalog.names_with_prefix("Feature.").is_empty());
    }
}
