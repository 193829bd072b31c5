//! ## Crate layout
//! - `core`: runtime engine — schema compilation, chain queries, save
//!   orchestration, validation, and the storage facade.
//! - `schema`: node/event/property definitions and the registry.
//!
//! The `prelude` module mirrors the surface a typical caller touches.

pub use vinedb_core as core;
pub use vinedb_schema as schema;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use vinedb_core::Error;

///
/// Prelude
/// using _ brings traits into scope and avoids name conflicts
///

pub mod prelude {
    pub use vinedb_core::prelude::*;
}
