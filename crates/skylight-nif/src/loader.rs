//! Opening libskylight at runtime
//!
//! The path is handed to the platform loader exactly as given: no search
//! path, no filename decoration. Symbols come back as untyped addresses and
//! are cast to their declared signatures by [`Library::get`].

use std::ffi::{c_void, CString};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use thiserror::Error;

/// Why a library could not be opened or a symbol not resolved
#[derive(Debug, Error)]
pub enum LoadError {
    /// The platform loader refused the file
    #[error("Library not found: {path}: {reason}")]
    NotFound {
        /// Path that was attempted
        path: String,
        /// Loader diagnostic
        reason: String,
    },

    /// The library does not export a required entry point
    #[error("Symbol not found: {symbol} in {library}")]
    SymbolNotFound {
        /// Missing symbol
        symbol: String,
        /// Library path, plus the loader diagnostic when there is one
        library: String,
    },

    /// Path cannot be handed to the platform loader
    #[error("Invalid library path: {0}")]
    InvalidPath(String),

    /// Platform-specific error
    #[error("Platform error: {0}")]
    PlatformError(String),
}

/// Turn host path bytes into a filesystem path.
///
/// Unix paths are arbitrary bytes. Elsewhere they have to be UTF-8.
pub fn path_from_bytes(bytes: &[u8]) -> Result<PathBuf, LoadError> {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;
        Ok(PathBuf::from(std::ffi::OsStr::from_bytes(bytes)))
    }

    #[cfg(not(unix))]
    {
        std::str::from_utf8(bytes)
            .map(PathBuf::from)
            .map_err(|_| LoadError::InvalidPath(String::from_utf8_lossy(bytes).into_owned()))
    }
}

/// An open shared library.
///
/// Dropping it unloads the library, which invalidates every address
/// [`Library::get`] returned.
pub struct Library {
    handle: NonNull<c_void>,
    path: String,
}

// The handle is only an identifier for the loader; the platform loaders
// are thread-safe.
unsafe impl Send for Library {}
unsafe impl Sync for Library {}

impl Library {
    /// Open the library at `path`.
    ///
    /// Unix uses `dlopen(RTLD_NOW | RTLD_LOCAL)`, so an unresolvable
    /// dependency fails here rather than at first call. Windows uses
    /// `LoadLibraryW`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let handle = imp::open(path)?.ok_or_else(|| LoadError::NotFound {
            path: display.clone(),
            reason: imp::last_error().unwrap_or_else(|| "unknown error".to_string()),
        })?;

        Ok(Library {
            handle,
            path: display,
        })
    }

    /// Resolve `symbol` as a `T`.
    ///
    /// # Safety
    ///
    /// `T` must be a function pointer type matching the symbol's real
    /// signature, and the result must not be used after `self` is dropped.
    pub unsafe fn get<T: Copy>(&self, symbol: &str) -> Result<T, LoadError> {
        if std::mem::size_of::<T>() != std::mem::size_of::<*mut c_void>() {
            return Err(LoadError::PlatformError(format!(
                "{} cannot be read as a {}-byte value",
                symbol,
                std::mem::size_of::<T>()
            )));
        }
        let name = CString::new(symbol)
            .map_err(|e| LoadError::PlatformError(format!("Invalid symbol name: {}", e)))?;

        match imp::symbol(self.handle, &name) {
            Ok(addr) => Ok(std::mem::transmute_copy(&addr)),
            Err(reason) => Err(LoadError::SymbolNotFound {
                symbol: symbol.to_string(),
                library: match reason {
                    Some(reason) => format!("{}: {}", self.path, reason),
                    None => self.path.clone(),
                },
            }),
        }
    }

    /// Get the path this library was loaded from
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        unsafe { imp::close(self.handle) }
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("path", &self.path).finish()
    }
}

// ============================================================================
// Unix (Linux, macOS, BSD)
// ============================================================================

#[cfg(unix)]
mod imp {
    use std::ffi::{c_void, CStr, CString};
    use std::os::unix::ffi::OsStrExt;
    use std::path::Path;
    use std::ptr::NonNull;

    use super::LoadError;

    pub(super) fn open(path: &Path) -> Result<Option<NonNull<c_void>>, LoadError> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| LoadError::InvalidPath(format!("{}: {}", path.display(), e)))?;
        Ok(NonNull::new(unsafe {
            libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL)
        }))
    }

    pub(super) fn last_error() -> Option<String> {
        let msg = unsafe { libc::dlerror() };
        if msg.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned())
        }
    }

    /// `Err(None)` means the symbol exists but is null, which is as useless
    /// as it not existing.
    pub(super) unsafe fn symbol(
        handle: NonNull<c_void>,
        name: &CStr,
    ) -> Result<NonNull<c_void>, Option<String>> {
        // dlsym reports through dlerror, so clear any stale message first.
        libc::dlerror();
        let addr = libc::dlsym(handle.as_ptr(), name.as_ptr());
        if let Some(reason) = last_error() {
            return Err(Some(reason));
        }
        NonNull::new(addr).ok_or(None)
    }

    pub(super) unsafe fn close(handle: NonNull<c_void>) {
        libc::dlclose(handle.as_ptr());
    }
}

// ============================================================================
// Windows
// ============================================================================

#[cfg(windows)]
mod imp {
    use std::ffi::{c_void, CStr};
    use std::os::raw::c_char;
    use std::os::windows::ffi::OsStrExt;
    use std::path::Path;
    use std::ptr::NonNull;

    use super::LoadError;

    extern "system" {
        fn LoadLibraryW(filename: *const u16) -> *mut c_void;
        fn GetProcAddress(module: *mut c_void, procname: *const c_char) -> *mut c_void;
        fn FreeLibrary(module: *mut c_void) -> i32;
        fn GetLastError() -> u32;
    }

    pub(super) fn open(path: &Path) -> Result<Option<NonNull<c_void>>, LoadError> {
        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();
        if wide[..wide.len() - 1].contains(&0) {
            return Err(LoadError::InvalidPath(path.display().to_string()));
        }
        Ok(NonNull::new(unsafe { LoadLibraryW(wide.as_ptr()) }))
    }

    pub(super) fn last_error() -> Option<String> {
        Some(format!("error code: {}", unsafe { GetLastError() }))
    }

    pub(super) unsafe fn symbol(
        handle: NonNull<c_void>,
        name: &CStr,
    ) -> Result<NonNull<c_void>, Option<String>> {
        NonNull::new(GetProcAddress(handle.as_ptr(), name.as_ptr())).ok_or_else(last_error)
    }

    pub(super) unsafe fn close(handle: NonNull<c_void>) {
        FreeLibrary(handle.as_ptr());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_not_found() {
        match Library::open("/nonexistent/libskylight.so") {
            Err(LoadError::NotFound { path, reason }) => {
                assert!(path.contains("libskylight"));
                assert!(!reason.is_empty());
            }
            other => panic!("Expected NotFound error, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_interior_nul_is_invalid_path() {
        let path = path_from_bytes(b"/tmp/lib\0skylight.so").unwrap();
        assert!(matches!(Library::open(path), Err(LoadError::InvalidPath(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_bytes_are_accepted() {
        let path = path_from_bytes(b"/opt/\xffskylight/libskylight.so").unwrap();
        assert_eq!(path.file_name().unwrap(), "libskylight.so");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_missing_symbol_in_real_library() {
        // libc is always mapped on linux and has no sky_* symbols.
        let lib = match Library::open("libc.so.6") {
            Ok(lib) => lib,
            Err(_) => return,
        };
        let result = unsafe { lib.get::<unsafe extern "C" fn() -> u64>("sky_hrtime") };
        match result {
            Err(LoadError::SymbolNotFound { symbol, library }) => {
                assert_eq!(symbol, "sky_hrtime");
                assert!(library.starts_with("libc.so.6"));
            }
            other => panic!("Expected SymbolNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_get_rejects_non_pointer_types() {
        let lib = match Library::open("libc.so.6") {
            Ok(lib) => lib,
            Err(_) => return,
        };
        let result = unsafe { lib.get::<[u8; 3]>("malloc") };
        assert!(matches!(result, Err(LoadError::PlatformError(_))));
    }
}
