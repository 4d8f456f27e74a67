//! Typed table of NVML entry points
//!
//! Every entry point is resolved once, when the library is loaded. An entry
//! that could not be resolved stays in the table as [`Symbol::Missing`], so
//! calling through it is an error instead of a null call.

use std::ffi::c_void;

use crate::error::NvmlError;
use crate::nvml::ffi::*;
use crate::nvml::library::NativeLibrary;

/// A single entry point: either a callable resolved from the library, or missing
#[derive(Debug, Clone, Copy)]
pub enum Symbol<F> {
    /// Resolved function pointer
    Resolved(F),
    /// Not exported by the loaded library
    Missing(&'static str),
}

impl<F: Copy> Symbol<F> {
    /// Get the callable, or `FunctionNotFound` if the entry point is missing
    pub fn get(&self) -> Result<F, NvmlError> {
        match self {
            Self::Resolved(f) => Ok(*f),
            Self::Missing(name) => Err(NvmlError::FunctionNotFound(name)),
        }
    }

    /// Whether the entry point was resolved
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

macro_rules! symbol_table {
    ($( $field:ident: $ty:ty = $name:literal, $required:literal; )*) => {
        /// Entry points resolved from the loaded NVML library
        #[derive(Debug, Clone, Copy)]
        pub struct SymbolTable {
            $( pub $field: Symbol<$ty>, )*
        }

        impl SymbolTable {
            /// Exported names in resolution order, with whether each one is required
            pub const ENTRY_POINTS: &'static [(&'static str, bool)] = &[$( ($name, $required), )*];

            /// Resolve every entry point from `library`
            ///
            /// Never fails; unresolved entries are recorded as missing and
            /// reported by [`SymbolTable::first_missing_required`].
            pub fn resolve(library: &dyn NativeLibrary) -> Self {
                Self {
                    $(
                        $field: match library.symbol($name) {
                            // SAFETY: the address was exported under `$name`, whose
                            // signature in nvml.h is the one declared for `$ty`.
                            Some(addr) => Symbol::Resolved(unsafe {
                                std::mem::transmute::<*const c_void, $ty>(addr)
                            }),
                            None => {
                                log::debug!("NVML symbol {} not found", $name);
                                Symbol::Missing($name)
                            }
                        },
                    )*
                }
            }

            /// A table with every entry point missing
            pub fn unresolved() -> Self {
                Self {
                    $( $field: Symbol::Missing($name), )*
                }
            }

            /// Name of the first required entry point that is missing, if any
            pub fn first_missing_required(&self) -> Option<&'static str> {
                $(
                    if $required && !self.$field.is_resolved() {
                        return Some($name);
                    }
                )*
                None
            }
        }
    };
}

symbol_table! {
    init: FnInit = "nvmlInit_v2", true;
    shutdown: FnShutdown = "nvmlShutdown", true;
    error_string: FnErrorString = "nvmlErrorString", true;
    system_get_driver_version: FnSystemGetDriverVersion = "nvmlSystemGetDriverVersion", true;
    device_get_count: FnDeviceGetCount = "nvmlDeviceGetCount_v2", true;
    device_get_handle_by_index: FnDeviceGetHandleByIndex = "nvmlDeviceGetHandleByIndex_v2", true;
    device_get_minor_number: FnDeviceGetUint = "nvmlDeviceGetMinorNumber", true;
    device_get_uuid: FnDeviceGetString = "nvmlDeviceGetUUID", true;
    device_get_name: FnDeviceGetString = "nvmlDeviceGetName", true;
    device_get_memory_info: FnDeviceGetMemoryInfo = "nvmlDeviceGetMemoryInfo", true;
    device_get_utilization_rates: FnDeviceGetUtilizationRates = "nvmlDeviceGetUtilizationRates", true;
    device_get_power_usage: FnDeviceGetUint = "nvmlDeviceGetPowerUsage", true;
    device_get_temperature: FnDeviceGetTemperature = "nvmlDeviceGetTemperature", true;
    device_get_fan_speed: FnDeviceGetUint = "nvmlDeviceGetFanSpeed", true;
    device_get_samples: FnDeviceGetSamples = "nvmlDeviceGetSamples", true;
    device_get_encoder_utilization: FnDeviceGetCodecUtilization = "nvmlDeviceGetEncoderUtilization", true;
    device_get_decoder_utilization: FnDeviceGetCodecUtilization = "nvmlDeviceGetDecoderUtilization", true;
    system_get_process_name: FnSystemGetProcessName = "nvmlSystemGetProcessName", true;
    device_get_accounting_mode: FnDeviceGetAccountingMode = "nvmlDeviceGetAccountingMode", true;
    device_get_accounting_stats: FnDeviceGetAccountingStats = "nvmlDeviceGetAccountingStats", true;
    device_get_accounting_pids: FnDeviceGetAccountingPids = "nvmlDeviceGetAccountingPids", true;
    device_get_accounting_buffer_size: FnDeviceGetUint = "nvmlDeviceGetAccountingBufferSize", true;
    device_get_process_utilization: FnDeviceGetProcessUtilization = "nvmlDeviceGetProcessUtilization", true;
}
