//! sipbuild - configure and build Python extension modules from .sip files
//!
//! This crate provides the library functionality behind the `sipbuild`
//! tool: layered project configuration, ABI version resolution, bindings
//! selection, and building, installing and packaging through a builder.

pub mod builder;
pub mod codegen;
pub mod core;
pub mod ops;
pub mod util;

/// The version of sipbuild, recorded in generated bindings configuration.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use builder::{Builder, BuilderRegistry};
pub use core::bindings::{Bindings, BindingsSet};
pub use core::project::{Project, ProjectHooks, ResolvedProject};
pub use util::errors::UserError;
