//! Shared utilities

pub mod diagnostic;
pub mod errors;
pub mod fs;
pub mod hash;
pub mod process;

pub use diagnostic::Diagnostic;
pub use errors::UserError;
pub use fs::BuildDir;
