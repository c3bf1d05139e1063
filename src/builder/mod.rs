//! Building the extension modules of a project.
//!
//! A [`Builder`] only has to know how to turn one set of generated bindings
//! into a loadable module. Building in place, installing, and creating an
//! sdist or a wheel are written in terms of that in [`package`].

use std::path::{Path, PathBuf};

use anyhow::Result;
use indexmap::IndexMap;

use crate::codegen::CodeGenerator;
use crate::core::bindings::{Bindings, BindingsSet};
use crate::core::configurable::Configurable;
use crate::core::project::ResolvedProject;
use crate::core::pyproject::PROJECT_SECTION;
use crate::util::errors::UserError;

pub mod cc;
pub mod package;
pub mod toolchain;

pub use cc::CcBuilder;
pub use toolchain::{
    detect_toolchain, CommandSpec, GccToolchain, MsvcToolchain, Toolchain, ToolchainPlatform,
};

/// The builder used when the project doesn't name one.
pub const DEFAULT_BUILDER: &str = "cc";

/// What generation and building share.
pub struct BuildContext<'a> {
    pub project: &'a ResolvedProject,
    pub generator: &'a dyn CodeGenerator,
}

/// Builds the extension modules of a project.
pub trait Builder: Configurable {
    /// The registered name of the builder.
    fn name(&self) -> &'static str;

    /// Check the builder's configuration against the verified project.
    fn verify(&self, _project: &ResolvedProject) -> Result<()> {
        Ok(())
    }

    /// Compile and link the generated sources of a set of bindings and
    /// return the pathname of the module.
    fn build_extension_module(
        &self,
        bindings: &Bindings,
        project: &ResolvedProject,
    ) -> Result<PathBuf>;

    /// Build the project in the build directory.
    fn build(&self, ctx: &BuildContext<'_>, bindings: &mut BindingsSet) -> Result<()> {
        package::build_modules(self, ctx, bindings).map(|_| ())
    }

    /// Build the project and install it in the target directory.
    fn install(&self, ctx: &BuildContext<'_>, bindings: &mut BindingsSet) -> Result<PathBuf> {
        package::install(self, ctx, bindings)
    }

    /// Create an sdist in a directory and return its pathname.
    fn build_sdist(
        &self,
        ctx: &BuildContext<'_>,
        bindings: &mut BindingsSet,
        sdist_dir: &Path,
    ) -> Result<PathBuf> {
        package::build_sdist(ctx, bindings, sdist_dir)
    }

    /// Create a wheel in a directory and return its pathname.
    fn build_wheel(
        &self,
        ctx: &BuildContext<'_>,
        bindings: &mut BindingsSet,
        wheel_dir: &Path,
    ) -> Result<PathBuf> {
        package::build_wheel(self, ctx, bindings, wheel_dir)
    }
}

/// Creates a builder with its options declared and nothing set.
pub type BuilderFactory = fn() -> Box<dyn Builder>;

/// Registry of the builders a project can name.
///
/// Construction never fails. Whether a builder can actually run is only
/// discovered when it is used.
pub struct BuilderRegistry {
    factories: IndexMap<&'static str, BuilderFactory>,
}

impl BuilderRegistry {
    /// Create a new registry with all built-in builders.
    pub fn new() -> Self {
        let mut registry = BuilderRegistry {
            factories: IndexMap::new(),
        };

        registry.register(cc::BUILDER_NAME, || Box::new(CcBuilder::new()));

        registry
    }

    pub fn register(&mut self, name: &'static str, factory: BuilderFactory) {
        self.factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }

    /// Create the builder registered under a name.
    pub fn create(&self, name: &str) -> Result<Box<dyn Builder>, UserError> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory()),
            None => Err(UserError::InvalidOption {
                name: "builder".to_string(),
                section: Some(PROJECT_SECTION.to_string()),
                message: format!("'{}' is not a registered builder", name),
                detail: Some(format!(
                    "the registered builders are: {}",
                    self.names().collect::<Vec<_>>().join(", ")
                )),
            }),
        }
    }
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::option::{ConfigOption, ConfigValues};
    use crate::core::pyproject::BUILDER_SECTION;

    /// Pretends to compile by writing a placeholder module.
    #[derive(Debug, Default)]
    pub struct FakeBuilder {
        values: ConfigValues,
    }

    impl Configurable for FakeBuilder {
        fn section(&self) -> &'static str {
            BUILDER_SECTION
        }

        fn options(&self) -> &[ConfigOption] {
            &[]
        }

        fn values(&self) -> &ConfigValues {
            &self.values
        }

        fn values_mut(&mut self) -> &mut ConfigValues {
            &mut self.values
        }
    }

    impl Builder for FakeBuilder {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn build_extension_module(
            &self,
            bindings: &Bindings,
            project: &ResolvedProject,
        ) -> Result<PathBuf> {
            let generated = bindings.generated().unwrap();
            let module = generated.sources_dir.join(format!(
                "{}{}",
                generated.base_name(),
                bindings.module_extension(project)
            ));
            std::fs::write(&module, b"\x7fELF")?;
            Ok(module)
        }
    }
}
