//! The interface to the code generator.
//!
//! Parsing .sip files and generating C/C++ from them is done by an external
//! collaborator. The bindings only see the results: an opaque parsed
//! representation that is handed back to the generation entry points, the
//! module's name, whether it uses the limited API and which files were read.

use std::any::Any;
use std::path::{Path, PathBuf};

use anyhow::Result;

pub mod command;
pub mod scan;

pub use command::CommandGenerator;

/// What the parser needs to know.
#[derive(Debug, Clone)]
pub struct ParseRequest<'a> {
    /// The defining .sip file, relative to `cwd`.
    pub sip_file: &'a Path,
    /// The directory containing the defining .sip file.
    pub cwd: &'a Path,
    pub tags: &'a [String],
    pub backstops: &'a [String],
    pub disabled_features: &'a [String],
    pub protected_is_public: bool,
    pub include_dirs: &'a [PathBuf],
}

/// The parsed representation of a module. Only the generator that created
/// it knows what it contains.
pub struct ParsedSpec(Box<dyn Any + Send>);

impl ParsedSpec {
    pub fn new<T: Any + Send>(spec: T) -> Self {
        ParsedSpec(Box::new(spec))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl std::fmt::Debug for ParsedSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ParsedSpec(..)")
    }
}

/// The result of parsing.
#[derive(Debug)]
pub struct ParseOutput {
    pub spec: ParsedSpec,
    /// The fully qualified name of the module.
    pub module_name: String,
    pub uses_limited_api: bool,
    /// Every .sip file that was read, as absolute paths.
    pub sip_files: Vec<PathBuf>,
}

/// Options affecting the generated code.
#[derive(Debug, Clone)]
pub struct CodeOptions<'a> {
    pub sources_dir: &'a Path,
    pub source_suffix: Option<&'a str>,
    pub exceptions: bool,
    pub tracing: bool,
    pub release_gil: bool,
    pub concatenate: Option<i64>,
    pub docstrings: bool,
    pub py_debug: bool,
    pub sip_module: Option<&'a str>,
    pub warnings: bool,
    pub warnings_are_errors: bool,
}

/// The files created by code generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    pub header: PathBuf,
    pub sources: Vec<PathBuf>,
}

/// A parser and code generator.
pub trait CodeGenerator {
    fn parse(&self, request: &ParseRequest<'_>) -> Result<ParseOutput>;

    fn generate_code(&self, spec: &ParsedSpec, options: &CodeOptions<'_>) -> Result<GeneratedCode>;

    /// Generate a PEP 484 stub file.
    fn generate_type_hints(&self, spec: &ParsedSpec, pyi_file: &Path) -> Result<()>;

    /// Generate extracts, each given as `id:file`.
    fn generate_extracts(&self, spec: &ParsedSpec, extracts: &[String]) -> Result<()>;

    /// Generate a QScintilla .api file.
    fn generate_api(&self, spec: &ParsedSpec, api_file: &Path) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! A generator that writes placeholder files.

    use super::*;
    use crate::util::fs;

    #[derive(Debug, Default)]
    pub struct StubGenerator;

    struct StubSpec {
        base_name: String,
    }

    impl CodeGenerator for StubGenerator {
        fn parse(&self, request: &ParseRequest<'_>) -> Result<ParseOutput> {
            let scanned =
                scan::scan_module(&request.cwd.join(request.sip_file), request.include_dirs)?;
            let base_name = scanned
                .module_name
                .rsplit('.')
                .next()
                .unwrap_or(&scanned.module_name)
                .to_string();

            Ok(ParseOutput {
                spec: ParsedSpec::new(StubSpec { base_name }),
                module_name: scanned.module_name,
                uses_limited_api: scanned.uses_limited_api,
                sip_files: scanned.sip_files,
            })
        }

        fn generate_code(
            &self,
            spec: &ParsedSpec,
            options: &CodeOptions<'_>,
        ) -> Result<GeneratedCode> {
            let spec = spec.downcast_ref::<StubSpec>().expect("stub spec");
            let suffix = options.source_suffix.unwrap_or(".c");

            let header = options.sources_dir.join(format!("sipAPI{}.h", spec.base_name));
            fs::write_string(&header, "")?;

            let source = options
                .sources_dir
                .join(format!("sip{}cmodule{}", spec.base_name, suffix));
            fs::write_string(&source, "")?;

            Ok(GeneratedCode {
                header,
                sources: vec![source],
            })
        }

        fn generate_type_hints(&self, _spec: &ParsedSpec, pyi_file: &Path) -> Result<()> {
            fs::write_string(pyi_file, "")
        }

        fn generate_extracts(&self, _spec: &ParsedSpec, extracts: &[String]) -> Result<()> {
            for extract in extracts {
                if let Some((_, file)) = extract.split_once(':') {
                    fs::write_string(Path::new(file), "")?;
                }
            }
            Ok(())
        }

        fn generate_api(&self, _spec: &ParsedSpec, api_file: &Path) -> Result<()> {
            fs::write_string(api_file, "")
        }
    }
}
