//! Core data structures for sipbuild.
//!
//! This module contains the configuration model:
//! - Option descriptors and values, and the layering that fills them
//! - The project, its bindings and the ABI version they target
//! - pyproject.toml and the target Python interpreter

pub mod abi;
pub mod bindings;
pub mod configurable;
pub mod option;
pub mod project;
pub mod pyproject;
pub mod python;

pub use abi::{resolve_abi_version, AbiVersion, ModuleSources};
pub use bindings::{Bindings, BindingsSet};
pub use configurable::Configurable;
pub use option::{ConfigOption, ConfigValues, Origin, Tool, Value};
pub use project::{Project, ProjectHooks, ResolvedProject};
pub use pyproject::{Metadata, PyProject};
pub use python::{PythonProbe, PythonTarget};
