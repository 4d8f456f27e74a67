//! NVML library loader
//!
//! Owns the dynamically loaded management library and its symbol table.
//! The loaded state sits behind a `RwLock`: queries hold the read side for the
//! whole native call, `initialize`/`shutdown` take the write side, so nothing
//! can call through a function pointer whose library has been unloaded.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::NvmlError;
use crate::nvml::ffi::{nvmlReturn_t, LIBRARY_NAME, NVML_SUCCESS};
use crate::nvml::library::{NativeLibrary, SystemLibrary};
use crate::nvml::status;
use crate::nvml::symbols::SymbolTable;

/// Opens the native library; injected so tests can substitute a stub
pub type Opener = Box<dyn Fn() -> Result<Box<dyn NativeLibrary>, String> + Send + Sync>;

/// Observable loader state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    /// No library loaded; every query fails with `LibraryNotLoaded`
    Unloaded,
    /// Library open, all required symbols resolved, native init succeeded
    Ready,
}

/// Library handle plus the symbols resolved from it
pub(crate) struct Loaded {
    library: Box<dyn NativeLibrary>,
    pub(crate) symbols: SymbolTable,
    init_count: u32,
    generation: u64,
}

impl Loaded {
    /// Identifies this load; device handles are only valid for the load they came from
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Map a status returned by a call through this library
    pub(crate) fn check(&self, code: nvmlReturn_t) -> Result<(), NvmlError> {
        status::check(&self.symbols, code)
    }
}

/// Loader for the NVML shared library
///
/// Pair every successful [`initialize`](Self::initialize) with one
/// [`shutdown`](Self::shutdown), or use [`session`](Self::session).
pub struct LibraryLoader {
    opener: Opener,
    state: RwLock<Option<Loaded>>,
    loads: AtomicU64,
}

impl LibraryLoader {
    /// Loader for the system's management library
    pub fn new() -> Self {
        Self::with_opener(|| {
            SystemLibrary::open(LIBRARY_NAME).map(|lib| Box::new(lib) as Box<dyn NativeLibrary>)
        })
    }

    /// Loader that opens the library through `opener`
    pub fn with_opener<F>(opener: F) -> Self
    where
        F: Fn() -> Result<Box<dyn NativeLibrary>, String> + Send + Sync + 'static,
    {
        Self {
            opener: Box::new(opener),
            state: RwLock::new(None),
            loads: AtomicU64::new(0),
        }
    }

    /// Current state
    pub fn state(&self) -> LoaderState {
        match *self.read_state() {
            Some(_) => LoaderState::Ready,
            None => LoaderState::Unloaded,
        }
    }

    /// Load the library, resolve its entry points and initialize NVML
    ///
    /// On any failure the library handle is released and the loader stays
    /// unloaded. Calling this while already loaded re-runs native init and
    /// requires one more `shutdown` to unload.
    pub fn initialize(&self) -> Result<(), NvmlError> {
        let mut state = self.write_state();

        if let Some(loaded) = state.as_mut() {
            log::warn!("NVML already initialized, re-running nvmlInit");
            let init = loaded.symbols.init.get()?;
            // SAFETY: library is open, signature from nvml.h.
            loaded.check(unsafe { init() })?;
            loaded.init_count += 1;
            return Ok(());
        }

        let library = (self.opener)().map_err(NvmlError::LibraryNotFound)?;
        let symbols = SymbolTable::resolve(library.as_ref());

        if let Some(name) = symbols.first_missing_required() {
            log::debug!("Required NVML symbol {} missing, unloading", name);
            release(library);
            return Err(NvmlError::FunctionNotFound(name));
        }

        let init = match symbols.init.get() {
            Ok(f) => f,
            Err(e) => {
                release(library);
                return Err(e);
            }
        };
        // SAFETY: library is open, signature from nvml.h.
        let code = unsafe { init() };
        if code != NVML_SUCCESS {
            // Resolve the message before the library goes away
            let err = status::check(&symbols, code).err();
            release(library);
            return Err(err.unwrap_or(NvmlError::Unknown(format!("nvmlInit returned {}", code))));
        }

        let generation = self.loads.fetch_add(1, Ordering::Relaxed) + 1;
        log::info!("NVML initialized (load {})", generation);
        *state = Some(Loaded {
            library,
            symbols,
            init_count: 1,
            generation,
        });
        Ok(())
    }

    /// Shut NVML down and unload the library
    ///
    /// A no-op when nothing is loaded. If native shutdown fails the library
    /// stays loaded; if unloading fails the loader is still left unloaded and
    /// the failure is reported as `Unknown`.
    pub fn shutdown(&self) -> Result<(), NvmlError> {
        let mut state = self.write_state();

        let Some(loaded) = state.as_mut() else {
            log::debug!("NVML not loaded, nothing to shut down");
            return Ok(());
        };

        let shutdown = loaded.symbols.shutdown.get()?;
        // SAFETY: library is open, signature from nvml.h.
        loaded.check(unsafe { shutdown() })?;

        loaded.init_count = loaded.init_count.saturating_sub(1);
        if loaded.init_count > 0 {
            log::debug!("NVML still referenced {} time(s)", loaded.init_count);
            return Ok(());
        }

        let Some(Loaded { library, .. }) = state.take() else {
            return Ok(());
        };
        log::info!("NVML shut down");
        library
            .close()
            .map_err(|e| NvmlError::Unknown(format!("failed to unload NVML library: {}", e)))
    }

    /// Initialize and return a guard that shuts down when dropped
    pub fn session(&self) -> Result<Session<'_>, NvmlError> {
        self.initialize()?;
        Ok(Session { loader: self })
    }

    /// Map a native status code to an error
    ///
    /// While unloaded every failure maps to `LibraryNotLoaded`: the native
    /// description lookup cannot be used without the library.
    pub fn map_error(&self, code: nvmlReturn_t) -> Option<NvmlError> {
        if code == NVML_SUCCESS {
            return None;
        }
        match self.read_state().as_ref() {
            Some(loaded) => status::map_status(&loaded.symbols, code),
            None => Some(NvmlError::LibraryNotLoaded),
        }
    }

    /// Run `f` against the loaded library, holding it loaded until `f` returns
    pub(crate) fn with_loaded<T>(
        &self,
        f: impl FnOnce(&Loaded) -> Result<T, NvmlError>,
    ) -> Result<T, NvmlError> {
        match self.read_state().as_ref() {
            Some(loaded) => f(loaded),
            None => Err(NvmlError::LibraryNotLoaded),
        }
    }

    /// Like [`with_loaded`](Self::with_loaded), but only for the load `generation`
    ///
    /// A library that was unloaded and loaded again counts as not loaded.
    pub(crate) fn with_generation<T>(
        &self,
        generation: u64,
        f: impl FnOnce(&Loaded) -> Result<T, NvmlError>,
    ) -> Result<T, NvmlError> {
        match self.read_state().as_ref() {
            Some(loaded) if loaded.generation == generation => f(loaded),
            Some(loaded) => {
                log::debug!(
                    "Device handle from load {} used with load {}",
                    generation,
                    loaded.generation
                );
                Err(NvmlError::LibraryNotLoaded)
            }
            None => Err(NvmlError::LibraryNotLoaded),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, Option<Loaded>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Option<Loaded>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LibraryLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LibraryLoader")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Scoped NVML initialization; shuts down on drop
#[derive(Debug)]
pub struct Session<'a> {
    loader: &'a LibraryLoader,
}

impl<'a> Session<'a> {
    /// The loader this session keeps initialized
    pub fn loader(&self) -> &'a LibraryLoader {
        self.loader
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.loader.shutdown() {
            log::warn!("NVML shutdown failed: {}", e);
        }
    }
}

/// Drop a library that never reached the ready state
fn release(library: Box<dyn NativeLibrary>) {
    if let Err(e) = library.close() {
        log::warn!("Failed to unload NVML library: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, StubDevice, StubDriver};
    use crate::nvml::ffi::{NVML_ERROR_DRIVER_NOT_LOADED, NVML_ERROR_NOT_SUPPORTED};

    #[test]
    fn test_initialize_and_shutdown() {
        mock::install(StubDriver::default().with_device(StubDevice::new(0)));
        let loader = mock::stub_loader();

        assert_eq!(loader.state(), LoaderState::Unloaded);
        loader.initialize().unwrap();
        assert_eq!(loader.state(), LoaderState::Ready);
        assert_eq!(mock::open_handles(), 1);

        loader.shutdown().unwrap();
        assert_eq!(loader.state(), LoaderState::Unloaded);
        assert_eq!(mock::open_handles(), 0);
        mock::with_driver(|d| {
            assert_eq!(d.init_calls, 1);
            assert_eq!(d.shutdown_calls, 1);
        });
    }

    #[test]
    fn test_repeated_cycles_do_not_leak_handles() {
        mock::install(StubDriver::default());
        let loader = mock::stub_loader();

        for _ in 0..25 {
            loader.initialize().unwrap();
            assert_eq!(mock::open_handles(), 1);
            loader.shutdown().unwrap();
            assert_eq!(mock::open_handles(), 0);
        }
    }

    #[test]
    fn test_library_not_found() {
        mock::install(StubDriver::default().with_open_failure());
        let loader = mock::stub_loader();

        let err = loader.initialize().unwrap_err();
        assert!(matches!(err, NvmlError::LibraryNotFound(_)));
        assert_eq!(loader.state(), LoaderState::Unloaded);
        assert_eq!(mock::native_calls(), 0);
    }

    #[test]
    fn test_missing_required_symbol_leaves_unloaded() {
        mock::install(StubDriver::default().without_symbol("nvmlDeviceGetSamples"));
        let loader = mock::stub_loader();

        let err = loader.initialize().unwrap_err();
        assert_eq!(err, NvmlError::FunctionNotFound("nvmlDeviceGetSamples"));
        assert_eq!(loader.state(), LoaderState::Unloaded);
        assert_eq!(mock::open_handles(), 0);
        // Native init must not run on a partial table
        mock::with_driver(|d| assert_eq!(d.init_calls, 0));
    }

    #[test]
    fn test_missing_error_string_fails_initialize() {
        mock::install(StubDriver::default().without_symbol("nvmlErrorString"));
        let loader = mock::stub_loader();

        let err = loader.initialize().unwrap_err();
        assert_eq!(err, NvmlError::FunctionNotFound("nvmlErrorString"));
        assert_eq!(loader.state(), LoaderState::Unloaded);
        assert_eq!(mock::open_handles(), 0);
        mock::with_driver(|d| assert_eq!(d.init_calls, 0));
    }

    #[test]
    fn test_every_required_symbol_is_checked() {
        for &(name, required) in SymbolTable::ENTRY_POINTS {
            mock::install(StubDriver::default().without_symbol(name));
            let loader = mock::stub_loader();
            let result = loader.initialize();
            if required {
                assert_eq!(result, Err(NvmlError::FunctionNotFound(name)));
                assert_eq!(mock::open_handles(), 0);
            } else {
                assert!(result.is_ok());
                loader.shutdown().unwrap();
            }
        }
    }

    #[test]
    fn test_native_init_failure_releases_handle() {
        mock::install(StubDriver::default().with_init_status(NVML_ERROR_DRIVER_NOT_LOADED));
        let loader = mock::stub_loader();

        let err = loader.initialize().unwrap_err();
        assert_eq!(
            err,
            NvmlError::Native {
                code: NVML_ERROR_DRIVER_NOT_LOADED,
                message: "Driver Not Loaded".to_string(),
            }
        );
        assert_eq!(loader.state(), LoaderState::Unloaded);
        assert_eq!(mock::open_handles(), 0);
    }

    #[test]
    fn test_shutdown_when_never_loaded_is_noop() {
        mock::install(StubDriver::default());
        let loader = mock::stub_loader();

        assert!(loader.shutdown().is_ok());
        assert!(loader.shutdown().is_ok());
        assert_eq!(mock::native_calls(), 0);
    }

    #[test]
    fn test_native_shutdown_failure_keeps_library_loaded() {
        mock::install(StubDriver::default().with_shutdown_status(NVML_ERROR_NOT_SUPPORTED));
        let loader = mock::stub_loader();
        loader.initialize().unwrap();

        let err = loader.shutdown().unwrap_err();
        assert_eq!(err.code(), Some(NVML_ERROR_NOT_SUPPORTED));
        assert_eq!(loader.state(), LoaderState::Ready);
        assert_eq!(mock::open_handles(), 1);

        mock::with_driver(|d| d.shutdown_status = NVML_SUCCESS);
        loader.shutdown().unwrap();
        assert_eq!(mock::open_handles(), 0);
    }

    #[test]
    fn test_close_failure_is_unknown_error() {
        mock::install(StubDriver::default().with_close_failure());
        let loader = mock::stub_loader();
        loader.initialize().unwrap();

        let err = loader.shutdown().unwrap_err();
        assert!(matches!(err, NvmlError::Unknown(_)));
        assert_eq!(loader.state(), LoaderState::Unloaded);
    }

    #[test]
    fn test_reinitialize_is_reference_counted() {
        mock::install(StubDriver::default());
        let loader = mock::stub_loader();

        loader.initialize().unwrap();
        loader.initialize().unwrap();
        assert_eq!(mock::open_handles(), 1);

        loader.shutdown().unwrap();
        assert_eq!(loader.state(), LoaderState::Ready);
        loader.shutdown().unwrap();
        assert_eq!(loader.state(), LoaderState::Unloaded);
        assert_eq!(mock::open_handles(), 0);
        mock::with_driver(|d| {
            assert_eq!(d.init_calls, 2);
            assert_eq!(d.shutdown_calls, 2);
        });
    }

    #[test]
    fn test_generation_changes_only_on_fresh_load() {
        mock::install(StubDriver::default());
        let loader = mock::stub_loader();

        loader.initialize().unwrap();
        let first = loader.with_loaded(|lib| Ok(lib.generation())).unwrap();
        loader.initialize().unwrap();
        assert_eq!(loader.with_loaded(|lib| Ok(lib.generation())).unwrap(), first);
        loader.shutdown().unwrap();
        loader.shutdown().unwrap();

        loader.initialize().unwrap();
        let second = loader.with_loaded(|lib| Ok(lib.generation())).unwrap();
        assert_ne!(first, second);
        assert_eq!(
            loader.with_generation(first, |_| Ok(())),
            Err(NvmlError::LibraryNotLoaded)
        );
        assert!(loader.with_generation(second, |_| Ok(())).is_ok());
        loader.shutdown().unwrap();
    }

    #[test]
    fn test_session_shuts_down_on_drop() {
        mock::install(StubDriver::default());
        let loader = mock::stub_loader();
        {
            let session = loader.session().unwrap();
            assert_eq!(session.loader().state(), LoaderState::Ready);
        }
        assert_eq!(loader.state(), LoaderState::Unloaded);
        assert_eq!(mock::open_handles(), 0);
    }

    #[test]
    fn test_map_error_while_unloaded() {
        mock::install(StubDriver::default());
        let loader = mock::stub_loader();

        assert_eq!(loader.map_error(NVML_SUCCESS), None);
        assert_eq!(
            loader.map_error(NVML_ERROR_NOT_SUPPORTED),
            Some(NvmlError::LibraryNotLoaded)
        );
        assert_eq!(mock::native_calls(), 0);
    }

    #[test]
    fn test_map_error_while_loaded() {
        mock::install(StubDriver::default());
        let loader = mock::stub_loader();
        loader.initialize().unwrap();

        let err = loader.map_error(NVML_ERROR_NOT_SUPPORTED).unwrap();
        assert_eq!(err.to_string(), "nvml: Not Supported");
        loader.shutdown().unwrap();
    }

    #[test]
    #[ignore = "Requires NVIDIA GPU"]
    fn test_system_library_session() {
        let loader = LibraryLoader::new();
        let _session = loader.session().unwrap();
        assert_eq!(loader.state(), LoaderState::Ready);
    }
}
