//! Module data model and the accessor capability the codec is written against.
//!
//! The codec never touches a concrete bytecode container. It reads functions
//! and strings through [`ModuleAccessor`] when dumping and installs them
//! through the same trait when loading, so any binary backend can sit behind
//! it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::operand::Operand;

/// Opaque module metadata, passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(serde_json::Value);

impl Metadata {
    /// Wraps a JSON value.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Borrows the underlying JSON value.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Unwraps the underlying JSON value.
    #[must_use]
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for Metadata {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// One decoded instruction: opcode token plus ordered operands.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Instruction {
    /// Opcode mnemonic.
    pub opcode: String,
    /// Operands in encoding order.
    pub operands: Vec<Operand>,
}

impl Instruction {
    /// Creates an instruction.
    #[must_use]
    pub fn new(opcode: impl Into<String>, operands: Vec<Operand>) -> Self {
        Self {
            opcode: opcode.into(),
            operands,
        }
    }
}

/// One function of a module.
///
/// The name is cosmetic; identity is the function's position in the module.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Function {
    /// Display name.
    pub name: String,
    /// Declared parameter count.
    pub param_count: u32,
    /// Frame register count.
    pub register_count: u32,
    /// Symbol count.
    pub symbol_count: u32,
    /// Instruction sequence.
    pub instructions: Vec<Instruction>,
}

/// One string table entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StringEntry {
    /// Decoded text.
    pub value: String,
    /// Whether the container stores this string with wide (UTF-16) units.
    pub is_wide: bool,
}

impl StringEntry {
    /// Creates a narrow entry.
    #[must_use]
    pub fn narrow(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_wide: false,
        }
    }

    /// Creates a wide entry.
    #[must_use]
    pub fn wide(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_wide: true,
        }
    }
}

/// Failures raised by a backend's set-by-index operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessorError {
    /// Function index is outside the module.
    #[error("function index {index} out of range (function count {count})")]
    FunctionIndex {
        /// Requested index.
        index: usize,
        /// Number of functions in the module.
        count: usize,
    },
    /// String id is outside the string table.
    #[error("string id {id} out of range (string count {count})")]
    StringId {
        /// Requested id.
        id: usize,
        /// Number of strings in the module.
        count: usize,
    },
    /// Metadata cannot describe a module for this backend.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}

/// Indexed read/write access to a bytecode module.
///
/// Functions are addressed by a dense index `0..function_count()` and strings
/// by a dense id `0..string_count()`. Getters return owned values so a backend
/// may decode lazily from its binary form.
pub trait ModuleAccessor {
    /// Opaque metadata describing the module.
    fn metadata(&self) -> &Metadata;

    /// Number of entries in the string table.
    fn string_count(&self) -> usize;

    /// Reads string `id`, or `None` if out of range.
    fn string(&self, id: usize) -> Option<StringEntry>;

    /// Replaces string `id`.
    ///
    /// # Errors
    ///
    /// Returns an [`AccessorError`] if `id` is out of range or the backend
    /// cannot store the entry.
    fn set_string(&mut self, id: usize, entry: StringEntry) -> Result<(), AccessorError>;

    /// Number of functions in the module.
    fn function_count(&self) -> usize;

    /// Reads function `index`, or `None` if out of range.
    fn function(&self, index: usize) -> Option<Function>;

    /// Replaces function `index`.
    ///
    /// # Errors
    ///
    /// Returns an [`AccessorError`] if `index` is out of range or the backend
    /// cannot store the function.
    fn set_function(&mut self, index: usize, function: Function) -> Result<(), AccessorError>;
}

/// A backend that can build an empty module from metadata alone.
///
/// The shell's function and string counts come from the metadata; loading
/// then fills every slot by index.
pub trait ModuleShell: ModuleAccessor + Sized {
    /// Builds an empty module shaped by `metadata`.
    ///
    /// # Errors
    ///
    /// Returns [`AccessorError::InvalidMetadata`] if the metadata does not
    /// describe a module this backend understands.
    fn from_metadata(metadata: Metadata) -> Result<Self, AccessorError>;
}
