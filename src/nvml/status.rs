//! Mapping of native status codes to [`NvmlError`]

use std::ffi::CStr;

use crate::error::NvmlError;
use crate::nvml::ffi::{nvmlReturn_t, NVML_ERROR_LIBRARY_NOT_FOUND, NVML_SUCCESS};
use crate::nvml::symbols::{Symbol, SymbolTable};

/// Description used when no `nvmlErrorString` lookup is available
pub const ERROR_STRING_UNAVAILABLE: &str = "nvmlErrorString Function Not Found";

/// Map a status code returned through `symbols` to an error
///
/// `NVML_ERROR_LIBRARY_NOT_FOUND` maps to `LibraryNotLoaded`. Must only be
/// called while the library that `symbols` was resolved from is still open;
/// the loader guarantees that for every query.
pub fn map_status(symbols: &SymbolTable, code: nvmlReturn_t) -> Option<NvmlError> {
    if code == NVML_SUCCESS {
        return None;
    }
    if code == NVML_ERROR_LIBRARY_NOT_FOUND {
        return Some(NvmlError::LibraryNotLoaded);
    }
    Some(NvmlError::Native {
        code,
        message: error_string(symbols, code),
    })
}

/// Like [`map_status`], as a `Result`
pub fn check(symbols: &SymbolTable, code: nvmlReturn_t) -> Result<(), NvmlError> {
    match map_status(symbols, code) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Human-readable description of `code` from the library's own lookup
fn error_string(symbols: &SymbolTable, code: nvmlReturn_t) -> String {
    let lookup = match symbols.error_string {
        Symbol::Resolved(f) => f,
        Symbol::Missing(_) => return ERROR_STRING_UNAVAILABLE.to_string(),
    };

    // SAFETY: the library is open and nvmlErrorString returns a pointer to a
    // static NUL-terminated string (or null, which is handled below).
    let ptr = unsafe { lookup(code) };
    if ptr.is_null() {
        return format!("unknown error code {}", code);
    }
    // SAFETY: non-null and NUL-terminated per the NVML contract.
    unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{self, StubDriver, StubLibrary};
    use crate::nvml::ffi::{NVML_ERROR_NOT_SUPPORTED, NVML_ERROR_UNKNOWN};

    #[test]
    fn test_success_maps_to_none() {
        let symbols = SymbolTable::unresolved();
        assert!(map_status(&symbols, NVML_SUCCESS).is_none());
        assert!(check(&symbols, NVML_SUCCESS).is_ok());
    }

    #[test]
    fn test_message_from_native_lookup() {
        mock::install(StubDriver::default());
        let symbols = SymbolTable::resolve(&StubLibrary);
        let err = map_status(&symbols, NVML_ERROR_NOT_SUPPORTED).unwrap();
        assert_eq!(
            err,
            NvmlError::Native {
                code: NVML_ERROR_NOT_SUPPORTED,
                message: "Not Supported".to_string(),
            }
        );
        assert_eq!(err.to_string(), "nvml: Not Supported");
    }

    #[test]
    fn test_library_not_found_code_is_not_loaded() {
        mock::install(StubDriver::default());
        let symbols = SymbolTable::resolve(&StubLibrary);
        let calls_before = mock::native_calls();
        assert_eq!(
            map_status(&symbols, NVML_ERROR_LIBRARY_NOT_FOUND),
            Some(NvmlError::LibraryNotLoaded)
        );
        assert_eq!(
            check(&SymbolTable::unresolved(), NVML_ERROR_LIBRARY_NOT_FOUND),
            Err(NvmlError::LibraryNotLoaded)
        );
        assert_eq!(mock::native_calls(), calls_before);
    }

    #[test]
    fn test_missing_lookup_uses_placeholder() {
        let symbols = SymbolTable::unresolved();
        let err = check(&symbols, NVML_ERROR_UNKNOWN).unwrap_err();
        assert_eq!(
            err,
            NvmlError::Native {
                code: NVML_ERROR_UNKNOWN,
                message: ERROR_STRING_UNAVAILABLE.to_string(),
            }
        );
    }
}
