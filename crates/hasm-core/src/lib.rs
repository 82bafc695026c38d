//! Round-trip text assembly codec for indexed bytecode modules.

/// Operand kind vocabulary and typed operand values.
pub mod operand;
pub use operand::{
    parse_operand, parse_value, Operand, OperandError, OperandKind, OperandValue, KIND_SEPARATOR,
    OPERAND_KINDS,
};

/// Module data model and accessor capability traits.
pub mod module;
pub use module::{
    AccessorError, Function, Instruction, Metadata, ModuleAccessor, ModuleShell, StringEntry,
};

/// In-memory module backend.
pub mod memory;
pub use memory::{MemoryModule, FUNCTION_COUNT_KEY, HEADER_KEY, STRING_COUNT_KEY};

/// String table artifact records.
pub mod strings;
pub use strings::{collect_records, hydrate, StringRecord, StringTableError};

/// Assembly text emitter.
pub mod emit;
pub use emit::{
    emit_instructions, format_header, EmitError, COMMENT_MARKER, END_MARKER, HEADER_PREFIX,
};

/// Assembly text parser.
pub mod parser;
pub use parser::{
    parse_header, parse_instruction, parse_program, Header, ModuleShape, ParseError,
    ParseErrorKind,
};

/// Three-artifact project writer/reader.
pub mod project;
pub use project::{
    dump_project, load_into, load_project, AlwaysOverwrite, ConfirmOverwrite, ErrorClass,
    NeverOverwrite, ProjectError, ProjectSummary, INSTRUCTIONS_FILE, METADATA_FILE, STRINGS_FILE,
};

#[cfg(test)]
use proptest as _;
