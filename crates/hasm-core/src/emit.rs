//! Text emitter: renders a module's function table as assembly text.
//!
//! Each function becomes one block:
//!
//! ```text
//! Function<global>0(1 params, 4 registers, 0 symbols):
//! 	LoadConstString     	Reg8:0, UInt16S:2
//! 	; Oper[1]: String(2) "hello"
//!
//! 	Ret                 	Reg8:0
//! EndFunction
//!
//! ```
//!
//! String annotations are informative only; the parser skips them.

use log::debug;
use thiserror::Error;

use crate::module::{Function, Instruction, ModuleAccessor};

/// Leading text of every function header line.
pub const HEADER_PREFIX: &str = "Function<";
/// Line that terminates every function block.
pub const END_MARKER: &str = "EndFunction";
/// Leading character of comment lines.
pub const COMMENT_MARKER: char = ';';
/// Column width the opcode is padded to.
pub const OPCODE_WIDTH: usize = 20;

/// Failures while rendering a module to text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    /// The backend reported a function count but could not produce a function.
    #[error("function {index} could not be read from the module")]
    MissingFunction {
        /// Missing index.
        index: usize,
    },
    /// A string operand does not resolve to a string table entry.
    #[error(
        "function {function}, instruction {instruction}, operand {operand}: string {value} is not in the string table"
    )]
    UnresolvedString {
        /// Function index.
        function: usize,
        /// Instruction position within the function.
        instruction: usize,
        /// Operand position within the instruction.
        operand: usize,
        /// Operand value as written.
        value: String,
    },
    /// A name or opcode would not survive a round trip through the text form.
    #[error("function {function}: cannot represent {what} `{text}` in text form")]
    Unrepresentable {
        /// Function index.
        function: usize,
        /// Which field was rejected.
        what: &'static str,
        /// Rejected text.
        text: String,
    },
}

/// Renders every function in index order.
///
/// # Errors
///
/// Returns an [`EmitError`] if a function cannot be read, a string operand
/// dangles, or a name/opcode cannot be written unambiguously.
pub fn emit_instructions<M: ModuleAccessor + ?Sized>(module: &M) -> Result<String, EmitError> {
    let mut out = String::new();
    for index in 0..module.function_count() {
        let function = module
            .function(index)
            .ok_or(EmitError::MissingFunction { index })?;
        write_function(&mut out, index, &function, module)?;
    }
    Ok(out)
}

/// Formats a function header line (without newline).
#[must_use]
pub fn format_header(index: usize, function: &Function) -> String {
    format!(
        "{HEADER_PREFIX}{}>{index}({} params, {} registers, {} symbols):",
        function.name, function.param_count, function.register_count, function.symbol_count
    )
}

/// Appends one function block to `out`.
///
/// # Errors
///
/// See [`emit_instructions`].
pub fn write_function<M: ModuleAccessor + ?Sized>(
    out: &mut String,
    index: usize,
    function: &Function,
    module: &M,
) -> Result<(), EmitError> {
    if function.name.contains(['\n', '\r']) {
        return Err(EmitError::Unrepresentable {
            function: index,
            what: "name",
            text: function.name.clone(),
        });
    }

    debug!(
        "emitting function {index} `{}` ({} instructions)",
        function.name,
        function.instructions.len()
    );

    out.push_str(&format_header(index, function));
    out.push('\n');

    for (position, instruction) in function.instructions.iter().enumerate() {
        write_instruction(out, index, position, instruction, module)?;
    }

    out.push_str(END_MARKER);
    out.push_str("\n\n");
    Ok(())
}

fn write_instruction<M: ModuleAccessor + ?Sized>(
    out: &mut String,
    function: usize,
    position: usize,
    instruction: &Instruction,
    module: &M,
) -> Result<(), EmitError> {
    let opcode = &instruction.opcode;
    if opcode.is_empty()
        || opcode.starts_with(COMMENT_MARKER)
        || opcode.contains(char::is_whitespace)
        || opcode == END_MARKER
        || opcode.starts_with(HEADER_PREFIX)
    {
        return Err(EmitError::Unrepresentable {
            function,
            what: "opcode",
            text: opcode.clone(),
        });
    }

    let operands = instruction
        .operands
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    out.push_str(&format!("\t{opcode:<OPCODE_WIDTH$}\t{operands}\n"));

    let mut annotated = false;
    for (slot, operand) in instruction.operands.iter().enumerate() {
        if !operand.kind.is_string_ref() {
            continue;
        }
        let entry = operand
            .string_id()
            .and_then(|id| module.string(id).map(|entry| (id, entry)));
        let Some((id, entry)) = entry else {
            return Err(EmitError::UnresolvedString {
                function,
                instruction: position,
                operand: slot,
                value: operand.value.to_string(),
            });
        };
        out.push_str(&format!(
            "\t{COMMENT_MARKER} Oper[{slot}]: String({id}) {:?}\n",
            entry.value
        ));
        annotated = true;
    }

    if annotated {
        out.push('\n');
    }
    Ok(())
}
