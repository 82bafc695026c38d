//! In-memory module backend.
//!
//! `MemoryModule` keeps every function and string decoded in vectors. Its
//! metadata carries the module shape under `header.functionCount` and
//! `header.stringCount`, which is all [`ModuleShell::from_metadata`] needs to
//! rebuild an empty module.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::module::{
    AccessorError, Function, Metadata, ModuleAccessor, ModuleShell, StringEntry,
};

/// Metadata key holding the module header object.
pub const HEADER_KEY: &str = "header";
/// Header key holding the function count.
pub const FUNCTION_COUNT_KEY: &str = "functionCount";
/// Header key holding the string count.
pub const STRING_COUNT_KEY: &str = "stringCount";

/// A fully decoded module held in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModuleImage")]
pub struct MemoryModule {
    metadata: Metadata,
    functions: Vec<Function>,
    strings: Vec<StringEntry>,
}

#[derive(Deserialize)]
struct ModuleImage {
    metadata: Metadata,
    functions: Vec<Function>,
    strings: Vec<StringEntry>,
}

impl TryFrom<ModuleImage> for MemoryModule {
    type Error = AccessorError;

    fn try_from(image: ModuleImage) -> Result<Self, Self::Error> {
        Self::with_metadata(image.metadata, image.functions, image.strings)
    }
}

impl MemoryModule {
    /// Creates a module whose metadata holds only the header counts.
    #[must_use]
    pub fn new(functions: Vec<Function>, strings: Vec<StringEntry>) -> Self {
        let metadata = Metadata::new(json!({
            HEADER_KEY: {
                FUNCTION_COUNT_KEY: functions.len(),
                STRING_COUNT_KEY: strings.len(),
            }
        }));
        Self {
            metadata,
            functions,
            strings,
        }
    }

    /// Creates a module with caller-supplied metadata.
    ///
    /// # Errors
    ///
    /// Returns [`AccessorError::InvalidMetadata`] if the header counts are
    /// missing or disagree with the supplied functions and strings.
    pub fn with_metadata(
        metadata: Metadata,
        functions: Vec<Function>,
        strings: Vec<StringEntry>,
    ) -> Result<Self, AccessorError> {
        let (function_count, string_count) = header_counts(&metadata)?;
        if function_count != functions.len() {
            return Err(AccessorError::InvalidMetadata(format!(
                "header declares {function_count} functions, module has {}",
                functions.len()
            )));
        }
        if string_count != strings.len() {
            return Err(AccessorError::InvalidMetadata(format!(
                "header declares {string_count} strings, module has {}",
                strings.len()
            )));
        }
        Ok(Self {
            metadata,
            functions,
            strings,
        })
    }

    /// All functions in index order.
    #[must_use]
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// All strings in id order.
    #[must_use]
    pub fn strings(&self) -> &[StringEntry] {
        &self.strings
    }
}

fn header_counts(metadata: &Metadata) -> Result<(usize, usize), AccessorError> {
    let header = metadata
        .as_value()
        .get(HEADER_KEY)
        .ok_or_else(|| AccessorError::InvalidMetadata(format!("missing `{HEADER_KEY}`")))?;
    Ok((
        count_field(header, FUNCTION_COUNT_KEY)?,
        count_field(header, STRING_COUNT_KEY)?,
    ))
}

fn count_field(header: &Value, key: &str) -> Result<usize, AccessorError> {
    header
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            AccessorError::InvalidMetadata(format!(
                "`{HEADER_KEY}.{key}` must be a non-negative integer"
            ))
        })
}

impl ModuleAccessor for MemoryModule {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn string_count(&self) -> usize {
        self.strings.len()
    }

    fn string(&self, id: usize) -> Option<StringEntry> {
        self.strings.get(id).cloned()
    }

    fn set_string(&mut self, id: usize, entry: StringEntry) -> Result<(), AccessorError> {
        let count = self.strings.len();
        let slot = self
            .strings
            .get_mut(id)
            .ok_or(AccessorError::StringId { id, count })?;
        *slot = entry;
        Ok(())
    }

    fn function_count(&self) -> usize {
        self.functions.len()
    }

    fn function(&self, index: usize) -> Option<Function> {
        self.functions.get(index).cloned()
    }

    fn set_function(&mut self, index: usize, mut function: Function) -> Result<(), AccessorError> {
        let count = self.functions.len();
        let slot = self
            .functions
            .get_mut(index)
            .ok_or(AccessorError::FunctionIndex { index, count })?;
        for instruction in &mut function.instructions {
            for operand in &mut instruction.operands {
                *operand = operand.resolved();
            }
        }
        *slot = function;
        Ok(())
    }
}

impl ModuleShell for MemoryModule {
    fn from_metadata(metadata: Metadata) -> Result<Self, AccessorError> {
        let (function_count, string_count) = header_counts(&metadata)?;
        Ok(Self {
            functions: empty_slots(function_count, FUNCTION_COUNT_KEY)?,
            strings: empty_slots(string_count, STRING_COUNT_KEY)?,
            metadata,
        })
    }
}

// Fails instead of aborting when a count exceeds what can be allocated.
fn empty_slots<T: Clone + Default>(count: usize, key: &str) -> Result<Vec<T>, AccessorError> {
    let mut slots = Vec::new();
    slots.try_reserve_exact(count).map_err(|e| {
        AccessorError::InvalidMetadata(format!("`{HEADER_KEY}.{key}` of {count} is too large: {e}"))
    })?;
    slots.resize(count, T::default());
    Ok(slots)
}
