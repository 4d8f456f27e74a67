//! NVML binding layer
//!
//! Loads the management library at runtime, resolves its entry points into a
//! typed table and exposes device queries over it. Nothing links against the
//! vendor library at build time.

pub mod device;
pub mod ffi;
pub mod library;
pub mod loader;
pub mod sampling;
pub mod status;
pub mod symbols;
mod system;

pub use device::Device;
pub use library::{NativeLibrary, SystemLibrary};
pub use loader::{LibraryLoader, LoaderState, Session};
pub use sampling::{average_samples, SampleKind};
pub use symbols::{Symbol, SymbolTable};
