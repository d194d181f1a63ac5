//! Project builds
//!
//! A project is a directory holding `main.dime`. Building it writes the
//! compiled module to `builds/<profile>/<project>.wat` under the same root.

use crate::codegen::compile_source;
use crate::error::{BuildError, CompileError};
use crate::FILE_EXTENSION;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the entry file, without extension
pub const ENTRY_NAME: &str = "main";

/// Directory under the project root that receives build output
pub const BUILD_DIR: &str = "builds";

/// Build parameters
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub root: PathBuf,
    pub release: bool,
}

impl BuildConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            release: false,
        }
    }

    pub fn release(mut self, release: bool) -> Self {
        self.release = release;
        self
    }

    pub fn entry(&self) -> PathBuf {
        self.root.join(format!("{}.{}", ENTRY_NAME, FILE_EXTENSION))
    }

    fn profile(&self) -> &'static str {
        if self.release {
            "release"
        } else {
            "debug"
        }
    }

    /// Project name taken from the root directory
    pub fn name(&self) -> String {
        let root = fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ENTRY_NAME.to_string())
    }

    pub fn output(&self) -> PathBuf {
        self.root
            .join(BUILD_DIR)
            .join(self.profile())
            .join(format!("{}.wat", self.name()))
    }
}

/// Compile the project's entry file and write the module. Returns the path
/// written.
pub fn build_project(config: &BuildConfig) -> Result<PathBuf, BuildError> {
    let entry = config.entry();
    if !entry.is_file() {
        return Err(CompileError::missing_entry(&entry.to_string_lossy()).into());
    }
    debug!(entry = %entry.display(), release = config.release, "building project");

    let source = fs::read_to_string(&entry).map_err(|e| BuildError::io(&entry, e))?;
    let module = compile_source(&entry.to_string_lossy(), &source)?;

    let output = config.output();
    write_output(&output, &module)?;
    debug!(output = %output.display(), bytes = module.len(), "build finished");
    Ok(output)
}

/// Write `contents`, creating parent directories
pub fn write_output(path: &Path, contents: &str) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| BuildError::io(path, e))
}
