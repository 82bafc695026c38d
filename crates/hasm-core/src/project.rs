//! Project writer/reader for the three-artifact disassembly layout.
//!
//! ```text
//! <project>/
//!   metadata.json      opaque module metadata
//!   string.json        [{ "id", "isUTF16", "value" }, ...]
//!   instruction.hasm   function blocks
//! ```
//!
//! A dump renders all three artifacts in memory before touching the disk, and
//! a load parses and validates everything before the first set-by-index call.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::emit::{emit_instructions, EmitError};
use crate::module::{AccessorError, Function, Metadata, ModuleAccessor, ModuleShell, StringEntry};
use crate::parser::{parse_program, ModuleShape, ParseError};
use crate::strings::{collect_records, hydrate, StringRecord, StringTableError};

/// Metadata artifact file name.
pub const METADATA_FILE: &str = "metadata.json";
/// String table artifact file name.
pub const STRINGS_FILE: &str = "string.json";
/// Instruction text artifact file name.
pub const INSTRUCTIONS_FILE: &str = "instruction.hasm";

/// Decides whether an existing output location may be removed.
pub trait ConfirmOverwrite {
    /// Returns `true` to allow `path` to be deleted and rewritten.
    fn confirm_overwrite(&mut self, path: &Path) -> bool;
}

/// Policy that always allows overwriting.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOverwrite;

impl ConfirmOverwrite for AlwaysOverwrite {
    fn confirm_overwrite(&mut self, _path: &Path) -> bool {
        true
    }
}

/// Policy that never allows overwriting.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverOverwrite;

impl ConfirmOverwrite for NeverOverwrite {
    fn confirm_overwrite(&mut self, _path: &Path) -> bool {
        false
    }
}

impl<F: FnMut(&Path) -> bool> ConfirmOverwrite for F {
    fn confirm_overwrite(&mut self, path: &Path) -> bool {
        self(path)
    }
}

/// Coarse error classes so callers can tell failures apart without matching
/// every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Nothing (or not enough) to load.
    Missing,
    /// An artifact is present but corrupt.
    Malformed,
    /// The user declined a destructive overwrite.
    Declined,
    /// The module backend rejected or could not supply data.
    Backend,
    /// Filesystem failure.
    Io,
}

/// Failures of project-level dump and load.
#[derive(Debug, Error)]
pub enum ProjectError {
    /// A required artifact (or the project directory) does not exist.
    #[error("{}: not found", .path.display())]
    MissingArtifact {
        /// Expected path.
        path: PathBuf,
    },
    /// The output location exists and removal was not confirmed.
    #[error("'{}' exists and was not overwritten", .path.display())]
    DestructiveOverwriteDeclined {
        /// Existing output location.
        path: PathBuf,
    },
    /// The instruction text is malformed.
    #[error("instruction.hasm: {0}")]
    Parse(#[from] ParseError),
    /// The string table artifact is inconsistent.
    #[error("string.json: {0}")]
    StringTable(#[from] StringTableError),
    /// The module cannot be rendered to text.
    #[error(transparent)]
    Emit(#[from] EmitError),
    /// The module backend rejected an operation.
    #[error(transparent)]
    Accessor(#[from] AccessorError),
    /// JSON artifact could not be encoded or decoded.
    #[error("{}: {source}", .path.display())]
    Json {
        /// Artifact path.
        path: PathBuf,
        /// Underlying serializer error.
        source: serde_json::Error,
    },
    /// Filesystem operation failed.
    #[error("{}: {source}", .path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

impl ProjectError {
    /// Returns the coarse class of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::MissingArtifact { .. } => ErrorClass::Missing,
            Self::DestructiveOverwriteDeclined { .. } => ErrorClass::Declined,
            Self::Parse(_) | Self::StringTable(_) | Self::Json { .. } => ErrorClass::Malformed,
            Self::Emit(_) | Self::Accessor(_) => ErrorClass::Backend,
            Self::Io { .. } => ErrorClass::Io,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Counts reported after a successful dump or load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectSummary {
    /// Functions written or installed.
    pub functions: usize,
    /// Strings written or installed.
    pub strings: usize,
}

struct RenderedProject {
    metadata: Vec<u8>,
    strings: Vec<u8>,
    instructions: String,
    summary: ProjectSummary,
}

fn render<M: ModuleAccessor + ?Sized>(
    module: &M,
    dir: &Path,
) -> Result<RenderedProject, ProjectError> {
    let metadata = serde_json::to_vec(module.metadata())
        .map_err(|e| ProjectError::json(&dir.join(METADATA_FILE), e))?;

    let records = collect_records(module)?;
    let mut strings = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut strings, formatter);
    records
        .serialize(&mut serializer)
        .map_err(|e| ProjectError::json(&dir.join(STRINGS_FILE), e))?;

    let instructions = emit_instructions(module)?;

    Ok(RenderedProject {
        metadata,
        strings,
        instructions,
        summary: ProjectSummary {
            functions: module.function_count(),
            strings: records.len(),
        },
    })
}

fn remove_existing(path: &Path) -> Result<(), ProjectError> {
    let meta = fs::symlink_metadata(path).map_err(|e| ProjectError::io(path, e))?;
    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| ProjectError::io(path, e))
}

fn write_artifacts(dir: &Path, rendered: &RenderedProject) -> Result<(), ProjectError> {
    fs::create_dir_all(dir).map_err(|e| ProjectError::io(dir, e))?;
    let artifacts: [(&str, &[u8]); 3] = [
        (METADATA_FILE, rendered.metadata.as_slice()),
        (STRINGS_FILE, rendered.strings.as_slice()),
        (INSTRUCTIONS_FILE, rendered.instructions.as_bytes()),
    ];
    for (name, bytes) in artifacts {
        let path = dir.join(name);
        fs::write(&path, bytes).map_err(|e| ProjectError::io(&path, e))?;
        debug!("wrote {} ({} bytes)", path.display(), bytes.len());
    }
    Ok(())
}

/// Disassembles `module` into a project directory at `dir`.
///
/// If `dir` already exists, `policy` is asked first; on approval the old
/// contents are removed entirely before the new artifacts are written. Either
/// all three artifacts are written or the directory is left absent.
///
/// # Errors
///
/// Returns [`ProjectError::DestructiveOverwriteDeclined`] if the policy
/// refuses (nothing on disk is changed), an emit/string-table error if the
/// module cannot be rendered, or an I/O error if writing fails.
pub fn dump_project<M, P>(
    module: &M,
    dir: &Path,
    policy: &mut P,
) -> Result<ProjectSummary, ProjectError>
where
    M: ModuleAccessor + ?Sized,
    P: ConfirmOverwrite + ?Sized,
{
    let rendered = render(module, dir)?;

    if fs::symlink_metadata(dir).is_ok() {
        if !policy.confirm_overwrite(dir) {
            return Err(ProjectError::DestructiveOverwriteDeclined {
                path: dir.to_path_buf(),
            });
        }
        warn!("removing existing '{}'", dir.display());
        remove_existing(dir)?;
    }

    if let Err(e) = write_artifacts(dir, &rendered) {
        // Leave no half-written project behind.
        if fs::remove_dir_all(dir).is_err() {
            warn!("could not clean up '{}'", dir.display());
        }
        return Err(e);
    }

    info!(
        "dumped {} functions and {} strings to '{}'",
        rendered.summary.functions,
        rendered.summary.strings,
        dir.display()
    );
    Ok(rendered.summary)
}

struct ProjectFiles {
    metadata: Metadata,
    strings: Vec<StringRecord>,
    instructions: String,
}

fn require(path: PathBuf) -> Result<PathBuf, ProjectError> {
    if path.exists() {
        Ok(path)
    } else {
        Err(ProjectError::MissingArtifact { path })
    }
}

fn read_text(path: &Path) -> Result<String, ProjectError> {
    fs::read_to_string(path).map_err(|e| ProjectError::io(path, e))
}

fn read_project(dir: &Path) -> Result<ProjectFiles, ProjectError> {
    let dir = require(dir.to_path_buf())?;
    let metadata_path = require(dir.join(METADATA_FILE))?;
    let strings_path = require(dir.join(STRINGS_FILE))?;
    let instructions_path = require(dir.join(INSTRUCTIONS_FILE))?;

    let metadata = serde_json::from_str(&read_text(&metadata_path)?)
        .map_err(|e| ProjectError::json(&metadata_path, e))?;
    let strings = serde_json::from_str(&read_text(&strings_path)?)
        .map_err(|e| ProjectError::json(&strings_path, e))?;
    let instructions = read_text(&instructions_path)?;

    Ok(ProjectFiles {
        metadata,
        strings,
        instructions,
    })
}

fn stage(
    strings: Vec<StringRecord>,
    instructions: &str,
    shape: ModuleShape,
) -> Result<(Vec<StringEntry>, Vec<Function>), ProjectError> {
    let functions = parse_program(instructions, shape)?;
    let strings = hydrate(strings, shape.string_count)?;
    Ok((strings, functions))
}

fn install<M: ModuleAccessor + ?Sized>(
    module: &mut M,
    strings: Vec<StringEntry>,
    functions: Vec<Function>,
) -> Result<ProjectSummary, ProjectError> {
    let summary = ProjectSummary {
        functions: functions.len(),
        strings: strings.len(),
    };
    for (id, entry) in strings.into_iter().enumerate() {
        module.set_string(id, entry)?;
    }
    for (index, function) in functions.into_iter().enumerate() {
        module.set_function(index, function)?;
    }
    Ok(summary)
}

fn shape_of<M: ModuleAccessor + ?Sized>(module: &M) -> ModuleShape {
    ModuleShape {
        function_count: module.function_count(),
        string_count: module.string_count(),
    }
}

/// Rebuilds a module from the project directory at `dir`.
///
/// The module shell is built from `metadata.json`, which alone decides the
/// function and string counts.
///
/// # Errors
///
/// Returns [`ProjectError::MissingArtifact`] if the directory or any artifact
/// is absent, and a parse, string-table, JSON, or backend error if any
/// artifact is rejected. No module is returned on failure.
pub fn load_project<M: ModuleShell>(dir: &Path) -> Result<M, ProjectError> {
    let files = read_project(dir)?;
    let mut module = M::from_metadata(files.metadata)?;
    let (strings, functions) = stage(files.strings, &files.instructions, shape_of(&module))?;
    let summary = install(&mut module, strings, functions)?;
    info!(
        "loaded {} functions and {} strings from '{}'",
        summary.functions,
        summary.strings,
        dir.display()
    );
    Ok(module)
}

/// Loads the project at `dir` into an existing module.
///
/// The module's own counts are authoritative; `metadata.json` must be present
/// but is not applied. Everything is parsed and validated before the first
/// set-by-index call, so a rejected project leaves `module` untouched.
///
/// # Errors
///
/// See [`load_project`].
pub fn load_into<M: ModuleAccessor + ?Sized>(
    dir: &Path,
    module: &mut M,
) -> Result<ProjectSummary, ProjectError> {
    let files = read_project(dir)?;
    let (strings, functions) = stage(files.strings, &files.instructions, shape_of(module))?;
    install(module, strings, functions)
}
