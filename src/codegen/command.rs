//! A code generator that runs an external sip command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::codegen::scan::scan_module;
use crate::codegen::{
    CodeGenerator, CodeOptions, GeneratedCode, ParseOutput, ParseRequest, ParsedSpec,
};
use crate::util::errors::UserError;
use crate::util::process::ProcessBuilder;

/// Overrides the code generator command.
pub const CODEGEN_ENV: &str = "SIPBUILD_CODEGEN";

/// The default code generator command.
pub const DEFAULT_CODEGEN: &str = "sip5";

/// Runs the code generator as a separate process.
///
/// Parsing only scans the .sip files for the module's name and the files it
/// includes. The command itself parses them again on each invocation.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: PathBuf,
    verbose: bool,
}

/// What a command needs to re-parse a module.
#[derive(Debug, Clone)]
struct CommandSpec {
    sip_file: PathBuf,
    cwd: PathBuf,
    tags: Vec<String>,
    backstops: Vec<String>,
    disabled_features: Vec<String>,
    protected_is_public: bool,
    include_dirs: Vec<PathBuf>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<PathBuf>, verbose: bool) -> Self {
        CommandGenerator {
            program: program.into(),
            verbose,
        }
    }

    /// Use `$SIPBUILD_CODEGEN` or the default command.
    pub fn from_env(verbose: bool) -> Self {
        let program = std::env::var(CODEGEN_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_CODEGEN.to_string());

        CommandGenerator::new(program, verbose)
    }

    fn spec<'a>(&self, spec: &'a ParsedSpec) -> Result<&'a CommandSpec> {
        spec.downcast_ref::<CommandSpec>()
            .context("the parsed module was not created by the command generator")
    }

    /// The command with the arguments that affect parsing.
    fn command(&self, spec: &CommandSpec) -> ProcessBuilder {
        let mut cmd = ProcessBuilder::new(&self.program).cwd(&spec.cwd);

        for tag in &spec.tags {
            cmd = cmd.arg("-t").arg(tag);
        }
        for backstop in &spec.backstops {
            cmd = cmd.arg("-B").arg(backstop);
        }
        for feature in &spec.disabled_features {
            cmd = cmd.arg("-x").arg(feature);
        }
        if spec.protected_is_public {
            cmd = cmd.arg("-P");
        }
        for dir in &spec.include_dirs {
            cmd = cmd.arg("-I").arg(dir);
        }

        cmd
    }

    fn run(&self, cmd: ProcessBuilder, spec: &CommandSpec) -> Result<()> {
        cmd.arg(&spec.sip_file).run(self.verbose)
    }
}

impl CodeGenerator for CommandGenerator {
    fn parse(&self, request: &ParseRequest<'_>) -> Result<ParseOutput> {
        let scanned = scan_module(&request.cwd.join(request.sip_file), request.include_dirs)?;

        let spec = CommandSpec {
            sip_file: request.sip_file.to_path_buf(),
            cwd: request.cwd.to_path_buf(),
            tags: request.tags.to_vec(),
            backstops: request.backstops.to_vec(),
            disabled_features: request.disabled_features.to_vec(),
            protected_is_public: request.protected_is_public,
            include_dirs: request.include_dirs.to_vec(),
        };

        Ok(ParseOutput {
            spec: ParsedSpec::new(spec),
            module_name: scanned.module_name,
            uses_limited_api: scanned.uses_limited_api,
            sip_files: scanned.sip_files,
        })
    }

    fn generate_code(&self, spec: &ParsedSpec, options: &CodeOptions<'_>) -> Result<GeneratedCode> {
        let spec = self.spec(spec)?;

        let mut cmd = self.command(spec).arg("-c").arg(options.sources_dir);

        if options.exceptions {
            cmd = cmd.arg("-e");
        }
        if options.tracing {
            cmd = cmd.arg("-r");
        }
        if options.release_gil {
            cmd = cmd.arg("-g");
        }
        if let Some(parts) = options.concatenate.filter(|&n| n > 0) {
            cmd = cmd.arg("-j").arg(parts.to_string());
        }
        if options.docstrings {
            cmd = cmd.arg("-o");
        }
        if options.py_debug {
            cmd = cmd.arg("-D");
        }
        if let Some(sip_module) = options.sip_module {
            cmd = cmd.arg("-n").arg(sip_module);
        }
        if let Some(suffix) = options.source_suffix {
            cmd = cmd.arg("-s").arg(suffix);
        }
        if options.warnings {
            cmd = cmd.arg("-w");
        }
        if options.warnings_are_errors {
            cmd = cmd.arg("-f");
        }

        self.run(cmd, spec)?;

        collect_generated(options.sources_dir)
    }

    fn generate_type_hints(&self, spec: &ParsedSpec, pyi_file: &Path) -> Result<()> {
        let spec = self.spec(spec)?;
        let cmd = self.command(spec).arg("-y").arg(pyi_file);
        self.run(cmd, spec)
    }

    fn generate_extracts(&self, spec: &ParsedSpec, extracts: &[String]) -> Result<()> {
        let spec = self.spec(spec)?;

        let mut cmd = self.command(spec);
        for extract in extracts {
            cmd = cmd.arg("-X").arg(extract);
        }

        self.run(cmd, spec)
    }

    fn generate_api(&self, spec: &ParsedSpec, api_file: &Path) -> Result<()> {
        let spec = self.spec(spec)?;
        let cmd = self.command(spec).arg("-a").arg(api_file);
        self.run(cmd, spec)
    }
}

/// Find the header and sources written to a sources directory.
fn collect_generated(sources_dir: &Path) -> Result<GeneratedCode> {
    let mut header = None;
    let mut sources = Vec::new();

    for entry in std::fs::read_dir(sources_dir)
        .with_context(|| format!("failed to read directory: {}", sources_dir.display()))?
    {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if name.starts_with("sipAPI") && name.ends_with(".h") {
            header = Some(path.clone());
        } else if name.starts_with("sip")
            && (name.ends_with(".c") || name.ends_with(".cpp") || name.ends_with(".cxx"))
        {
            sources.push(path.clone());
        }
    }

    let Some(header) = header else {
        return Err(UserError::new(format!(
            "the code generator did not create a sipAPI header in '{}'",
            sources_dir.display()
        ))
        .into());
    };

    sources.sort();
    Ok(GeneratedCode { header, sources })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_generated() {
        let tmp = TempDir::new().unwrap();
        for name in ["sipAPIQtCore.h", "sipQtCorepart1.cpp", "sipQtCorepart0.cpp", "notes.txt"] {
            std::fs::write(tmp.path().join(name), "").unwrap();
        }

        let generated = collect_generated(tmp.path()).unwrap();
        assert_eq!(generated.header, tmp.path().join("sipAPIQtCore.h"));
        assert_eq!(
            generated.sources,
            vec![
                tmp.path().join("sipQtCorepart0.cpp"),
                tmp.path().join("sipQtCorepart1.cpp"),
            ]
        );
    }

    #[test]
    fn test_missing_header_is_user_error() {
        let tmp = TempDir::new().unwrap();
        let err = collect_generated(tmp.path()).unwrap_err();
        assert!(err.downcast_ref::<UserError>().is_some());
    }

    #[test]
    fn test_parse_records_module_details() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("spam.sip"), "%Module(name=spam.core)\n").unwrap();

        let generator = CommandGenerator::new("sip5", false);
        let output = generator
            .parse(&ParseRequest {
                sip_file: Path::new("spam.sip"),
                cwd: tmp.path(),
                tags: &["Spam_1".to_string()],
                backstops: &[],
                disabled_features: &[],
                protected_is_public: true,
                include_dirs: &[],
            })
            .unwrap();

        assert_eq!(output.module_name, "spam.core");
        assert!(!output.uses_limited_api);

        let spec = generator.spec(&output.spec).unwrap();
        let cmd = generator.command(spec);
        assert_eq!(cmd.get_args(), &["-t", "Spam_1", "-P"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_generate_code_runs_the_command() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("spam.sip"), "%Module(name=spam)\n").unwrap();

        // A fake generator that writes what the real one would.
        let script = tmp.path().join("fake-sip");
        std::fs::write(
            &script,
            "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"-c\" ]; then dir=\"$2\"; fi\n  shift\ndone\ntouch \"$dir/sipAPIspam.h\" \"$dir/sipspamcmodule.c\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let generator = CommandGenerator::new(&script, false);
        let output = generator
            .parse(&ParseRequest {
                sip_file: Path::new("spam.sip"),
                cwd: tmp.path(),
                tags: &[],
                backstops: &[],
                disabled_features: &[],
                protected_is_public: false,
                include_dirs: &[],
            })
            .unwrap();

        let sources_dir = tmp.path().join("build");
        std::fs::create_dir_all(&sources_dir).unwrap();

        let generated = generator
            .generate_code(
                &output.spec,
                &CodeOptions {
                    sources_dir: &sources_dir,
                    source_suffix: None,
                    exceptions: false,
                    tracing: false,
                    release_gil: true,
                    concatenate: None,
                    docstrings: true,
                    py_debug: false,
                    sip_module: None,
                    warnings: false,
                    warnings_are_errors: false,
                },
            )
            .unwrap();

        assert_eq!(generated.header, sources_dir.join("sipAPIspam.h"));
        assert_eq!(generated.sources, vec![sources_dir.join("sipspamcmodule.c")]);
    }
}
