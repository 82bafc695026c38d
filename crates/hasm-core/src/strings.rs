//! String table artifact: one `{id, isUTF16, value}` record per string.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::{ModuleAccessor, StringEntry};

/// A single record of the string table artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringRecord {
    /// String table index.
    pub id: usize,
    /// Wide (UTF-16) storage flag.
    #[serde(rename = "isUTF16")]
    pub is_wide: bool,
    /// Decoded text.
    pub value: String,
}

/// String table artifact inconsistencies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StringTableError {
    /// The backend reported a string count but could not produce an entry.
    #[error("string {id} could not be read from the module")]
    Unreadable {
        /// Missing id.
        id: usize,
    },
    /// A record names an id outside the table.
    #[error("string record id {id} out of range (string count {count})")]
    OutOfRange {
        /// Offending id.
        id: usize,
        /// Number of strings in the module.
        count: usize,
    },
    /// Two records share an id.
    #[error("string record id {id} appears more than once")]
    Duplicate {
        /// Repeated id.
        id: usize,
    },
    /// An id in range has no record.
    #[error("string record id {id} is missing")]
    Missing {
        /// Absent id.
        id: usize,
    },
}

/// Reads every string in the module, in id order.
///
/// # Errors
///
/// Returns [`StringTableError::Unreadable`] if the backend cannot produce an
/// id below its own string count.
pub fn collect_records<M: ModuleAccessor + ?Sized>(
    module: &M,
) -> Result<Vec<StringRecord>, StringTableError> {
    (0..module.string_count())
        .map(|id| {
            let entry = module.string(id).ok_or(StringTableError::Unreadable { id })?;
            Ok(StringRecord {
                id,
                is_wide: entry.is_wide,
                value: entry.value,
            })
        })
        .collect()
}

/// Orders records by id, checking the table is exhaustive.
///
/// Records may appear in any order, but every id in `[0, string_count)` must
/// appear exactly once.
///
/// # Errors
///
/// Returns a [`StringTableError`] for an out-of-range, duplicated, or
/// missing id.
pub fn hydrate(
    records: Vec<StringRecord>,
    string_count: usize,
) -> Result<Vec<StringEntry>, StringTableError> {
    let mut slots: Vec<Option<StringEntry>> = vec![None; string_count];

    for record in records {
        let slot = slots.get_mut(record.id).ok_or(StringTableError::OutOfRange {
            id: record.id,
            count: string_count,
        })?;
        if slot.is_some() {
            return Err(StringTableError::Duplicate { id: record.id });
        }
        *slot = Some(StringEntry {
            value: record.value,
            is_wide: record.is_wide,
        });
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(id, slot)| slot.ok_or(StringTableError::Missing { id }))
        .collect()
}
