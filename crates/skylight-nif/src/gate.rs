//! Loader gate
//!
//! Holds the libskylight function table. The table is written at most once
//! and never cleared, so "not loaded" is an ordinary state every caller
//! checks before touching native code, and "loaded" is permanent.

use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{BridgeError, BridgeResult};
use crate::loader::{self, Library, LoadError};
use crate::sys::SkylightApi;

/// Result of a load attempt that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// This call populated the table
    Loaded,
    /// The table was already populated; the arguments were not looked at
    AlreadyLoaded,
}

/// A populated function table plus the library that backs it.
///
/// Handles keep an `Arc` to this so their release hooks can always reach
/// the native free functions.
pub struct Libskylight {
    api: SkylightApi,
    // Closing the library would invalidate every pointer in `api`.
    library: Option<Library>,
}

impl Libskylight {
    /// The resolved entry points
    #[inline]
    pub fn api(&self) -> &SkylightApi {
        &self.api
    }

    /// Path of the backing shared library, if the table came from one
    pub fn path(&self) -> Option<&str> {
        self.library.as_ref().map(Library::path)
    }
}

impl std::fmt::Debug for Libskylight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Libskylight")
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

static GLOBAL: Gate = Gate::new();

/// Write-once holder for the function table.
///
/// Concurrent first loads block on a single initializer. A failed load
/// leaves the gate empty so a later call may retry with another path.
pub struct Gate {
    table: OnceCell<Arc<Libskylight>>,
}

impl Gate {
    /// An empty gate
    pub const fn new() -> Self {
        Gate {
            table: OnceCell::new(),
        }
    }

    /// The process-wide gate used by the host-facing module
    pub fn global() -> &'static Gate {
        &GLOBAL
    }

    /// Open libskylight at `path` and resolve every entry point.
    ///
    /// # Returns
    /// * `Ok(LoadStatus::Loaded)` - this call populated the table
    /// * `Ok(LoadStatus::AlreadyLoaded)` - nothing was done, `path` ignored
    /// * `Err(LoadError)` - open or symbol resolution failed; gate stays empty
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<LoadStatus, LoadError> {
        self.init_with(|| {
            let library = Library::open(path.as_ref())?;
            // SAFETY: the library is stored next to the table and never closed.
            let api = unsafe { SkylightApi::resolve(&library)? };
            Ok(Libskylight {
                api,
                library: Some(library),
            })
        })
    }

    /// Like [`Gate::load`], for a host byte-string path.
    ///
    /// The bytes are not inspected at all when the gate is already loaded.
    pub fn load_bytes(&self, path: &[u8]) -> Result<LoadStatus, LoadError> {
        if self.is_loaded() {
            return Ok(LoadStatus::AlreadyLoaded);
        }
        let path = loader::path_from_bytes(path)?;
        self.load(path)
    }

    /// Populate the gate from an already-resolved table, e.g. a statically
    /// linked libskylight.
    pub fn load_table(&self, api: SkylightApi) -> LoadStatus {
        let loaded: Result<LoadStatus, LoadError> = self.init_with(|| {
            Ok(Libskylight {
                api,
                library: None,
            })
        });
        loaded.unwrap_or(LoadStatus::AlreadyLoaded)
    }

    fn init_with<F>(&self, init: F) -> Result<LoadStatus, LoadError>
    where
        F: FnOnce() -> Result<Libskylight, LoadError>,
    {
        if self.table.get().is_some() {
            return Ok(LoadStatus::AlreadyLoaded);
        }

        let mut ran = false;
        self.table.get_or_try_init(|| {
            ran = true;
            let lib = init()?;
            tracing::debug!(path = ?lib.path(), "libskylight loaded");
            Ok::<_, LoadError>(Arc::new(lib))
        })?;

        Ok(if ran {
            LoadStatus::Loaded
        } else {
            LoadStatus::AlreadyLoaded
        })
    }

    /// Whether the table is populated
    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.table.get().is_some()
    }

    /// The populated table, or [`BridgeError::NotLoaded`]
    #[inline]
    pub fn libskylight(&self) -> BridgeResult<&Arc<Libskylight>> {
        self.table.get().ok_or(BridgeError::NotLoaded)
    }

    /// Read the native monotonic clock
    pub fn hrtime(&self) -> BridgeResult<u64> {
        let lib = self.libskylight()?;
        Ok(unsafe { (lib.api().hrtime)() })
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gate")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_empty_gate_is_not_loaded() {
        let gate = Gate::new();
        assert!(!gate.is_loaded());
        assert!(matches!(gate.hrtime(), Err(BridgeError::NotLoaded)));
        assert!(matches!(gate.libskylight(), Err(BridgeError::NotLoaded)));
    }

    #[test]
    fn test_failed_load_leaves_gate_empty() {
        let gate = Gate::new();
        let result = gate.load("/nonexistent/libskylight.so");
        assert!(matches!(result, Err(LoadError::NotFound { .. })));
        assert!(!gate.is_loaded());

        // A retry with a working table still succeeds
        assert_eq!(gate.load_table(testing::fake_api()), LoadStatus::Loaded);
        assert!(gate.is_loaded());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_missing_symbol_leaves_gate_empty() {
        // libc opens fine but exports none of the sky_* entry points.
        let gate = Gate::new();
        match gate.load("libc.so.6") {
            Err(LoadError::SymbolNotFound { symbol, .. }) => assert!(symbol.starts_with("sky_")),
            Err(LoadError::NotFound { .. }) => return,
            other => panic!("Expected SymbolNotFound, got {:?}", other),
        }
        assert!(!gate.is_loaded());
        assert!(matches!(gate.hrtime(), Err(BridgeError::NotLoaded)));

        assert_eq!(gate.load_table(testing::fake_api()), LoadStatus::Loaded);
        assert!(gate.is_loaded());
    }

    #[test]
    fn test_second_load_is_already_loaded() {
        let gate = Gate::new();
        assert_eq!(gate.load_table(testing::fake_api()), LoadStatus::Loaded);
        let first = Arc::clone(gate.libskylight().unwrap());

        assert_eq!(gate.load_table(testing::fake_api()), LoadStatus::AlreadyLoaded);
        assert_eq!(
            gate.load("/nonexistent/libskylight.so").unwrap(),
            LoadStatus::AlreadyLoaded
        );
        // Path bytes are not even decoded once loaded
        assert_eq!(
            gate.load_bytes(b"\0not a path\0").unwrap(),
            LoadStatus::AlreadyLoaded
        );

        assert!(Arc::ptr_eq(&first, gate.libskylight().unwrap()));
    }

    #[test]
    fn test_hrtime_is_monotonic() {
        let gate = testing::loaded_gate();
        let a = gate.hrtime().unwrap();
        let b = gate.hrtime().unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_concurrent_first_loads_populate_once() {
        let gate = Arc::new(Gate::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || gate.load_table(testing::fake_api()))
            })
            .collect();

        let statuses: Vec<LoadStatus> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let loaded = statuses
            .iter()
            .filter(|s| **s == LoadStatus::Loaded)
            .count();
        assert_eq!(loaded, 1);
        assert!(gate.is_loaded());
    }

    #[test]
    fn test_prebuilt_table_has_no_path() {
        let gate = testing::loaded_gate();
        assert_eq!(gate.libskylight().unwrap().path(), None);
    }
}
