//! Native library backends
//!
//! [`NativeLibrary`] is the seam between the loader and the dynamic linker:
//! production code opens the real management library through `libloading`,
//! tests plug in a stub that exports Rust functions under NVML's names.

use std::ffi::c_void;

use libloading::Library;

/// An opened shared library that symbols can be resolved from
pub trait NativeLibrary: Send + Sync {
    /// Address of the exported symbol `name`, or `None` if it is not exported
    fn symbol(&self, name: &str) -> Option<*const c_void>;

    /// Unload the library, reporting failures from the dynamic linker
    fn close(self: Box<Self>) -> Result<(), String>;
}

/// The management library opened through the platform dynamic linker
#[derive(Debug)]
pub struct SystemLibrary {
    lib: Library,
}

impl SystemLibrary {
    /// Open `name` via the dynamic loader's standard search path
    pub fn open(name: &str) -> Result<Self, String> {
        // SAFETY: loading the vendor library runs its initializers; NVML has no
        // load-time requirements beyond a matching kernel driver.
        match unsafe { Library::new(name) } {
            Ok(lib) => {
                log::debug!("Opened {}", name);
                Ok(Self { lib })
            }
            Err(e) => {
                log::debug!("Failed to open {}: {}", name, e);
                Err(format!("{}: {}", name, e))
            }
        }
    }
}

impl NativeLibrary for SystemLibrary {
    fn symbol(&self, name: &str) -> Option<*const c_void> {
        // SAFETY: only the address is read here; it is reinterpreted as a
        // function pointer by the symbol table using the nvml.h signature.
        let sym = unsafe { self.lib.get::<*const c_void>(name.as_bytes()) }.ok()?;
        let addr = *sym;
        (!addr.is_null()).then_some(addr)
    }

    fn close(self: Box<Self>) -> Result<(), String> {
        self.lib.close().map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_library() {
        let result = SystemLibrary::open("libnvprobe-does-not-exist.so.0");
        let err = result.expect_err("library should not exist");
        assert!(err.contains("libnvprobe-does-not-exist.so.0"));
    }

    #[test]
    #[ignore = "Requires NVIDIA GPU"]
    fn test_open_system_library() {
        let lib = Box::new(SystemLibrary::open(crate::nvml::ffi::LIBRARY_NAME).unwrap());
        assert!(lib.symbol("nvmlInit_v2").is_some());
        assert!(lib.symbol("nvmlNoSuchFunction").is_none());
        lib.close().unwrap();
    }
}
