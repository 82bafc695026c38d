//! Text parser: recovers the function table from assembly text.
//!
//! Parsing runs in three steps over the whole text before anything is handed
//! back, so a failure never yields a partial function table:
//!
//! 1. **Segmentation**: lines are grouped into blocks, each ending at an
//!    `EndFunction` line. The first non-blank, non-comment line of a block must
//!    be its header, and the header's index places the block.
//! 2. **Body parse**: instruction lines are tokenized on whitespace into an
//!    opcode and `kind:value` operands. Blank lines and `;` comments are
//!    skipped, which is how string annotations are ignored.
//! 3. **Assembly**: blocks are slotted by declared index; every index in
//!    `[0, function_count)` must be claimed exactly once.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use thiserror::Error;

use crate::emit::{COMMENT_MARKER, END_MARKER, HEADER_PREFIX};
use crate::module::{Function, Instruction};
use crate::operand::{parse_operand, OperandError};

const NAME_TERMINATOR: char = '>';
const OPERAND_SEPARATOR: char = ',';

/// Shape a parsed text must fit, taken from the module metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleShape {
    /// Number of functions the module holds.
    pub function_count: usize,
    /// Number of strings the module holds.
    pub string_count: usize,
}

/// A parsed function header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Display name (cosmetic).
    pub name: String,
    /// Declared function index, saturated at `u64::MAX`.
    pub index: u64,
    /// Parameter count.
    pub param_count: u32,
    /// Register count.
    pub register_count: u32,
    /// Symbol count.
    pub symbol_count: u32,
}

/// Parse error with the 1-indexed line it was detected on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Line in the instruction text, when the error has one.
    pub line: Option<usize>,
    /// Kind of parse error.
    pub kind: ParseErrorKind,
}

impl ParseError {
    const fn at(line: usize, kind: ParseErrorKind) -> Self {
        Self {
            line: Some(line),
            kind,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {line}: {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for ParseError {}

/// Classification of parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    /// Block header does not match `Function<NAME>INDEX(P params, R registers, S symbols):`.
    #[error("malformed header in block {block}: {reason}: `{text}`")]
    MalformedHeader {
        /// 1-indexed ordinal of the block in the text.
        block: usize,
        /// What the header parser expected.
        reason: &'static str,
        /// Offending header text.
        text: String,
    },
    /// Header index is outside `[0, function_count)`.
    #[error("function index {index} out of range (function count {function_count})")]
    OutOfRangeIndex {
        /// Declared index.
        index: u64,
        /// Function count from metadata.
        function_count: usize,
    },
    /// Two blocks declare the same index.
    #[error("function {index} declared again (first declared on line {first_line})")]
    DuplicateFunction {
        /// Repeated index.
        index: usize,
        /// Header line of the first declaration.
        first_line: usize,
    },
    /// No block declares this index.
    #[error("function {index} has no block")]
    MissingFunction {
        /// Unclaimed index.
        index: usize,
    },
    /// Trailing text never reaches an `EndFunction` line.
    #[error("block {block} is not terminated by `EndFunction`")]
    UnterminatedBlock {
        /// 1-indexed ordinal of the block in the text.
        block: usize,
    },
    /// Operand token is not a well-typed `kind:value` pair.
    #[error("function {function}: malformed operand `{token}`: {reason}")]
    MalformedOperand {
        /// Index of the enclosing function.
        function: usize,
        /// Offending token.
        token: String,
        /// Why the token was rejected.
        reason: OperandError,
    },
    /// String operand does not index the string table.
    #[error("function {function}: string operand {id} out of range (string count {string_count})")]
    UnresolvedString {
        /// Index of the enclosing function.
        function: usize,
        /// Operand value.
        id: i64,
        /// String count from metadata.
        string_count: usize,
    },
}

/// Parses a function header line.
///
/// The name runs to the last `>` on the line, so names may themselves contain
/// `<` and `>`.
///
/// # Errors
///
/// Returns a static description of the first grammar element that failed.
pub fn parse_header(text: &str) -> Result<Header, &'static str> {
    let rest = text
        .trim()
        .strip_prefix(HEADER_PREFIX)
        .ok_or("expected `Function<`")?;
    let (name, tail) = rest
        .rsplit_once(NAME_TERMINATOR)
        .ok_or("expected `>` after function name")?;

    let (index, tail) = split_index(tail).ok_or("expected function index")?;
    let tail = tail.strip_prefix('(').ok_or("expected `(` after index")?;
    let (param_count, tail) = split_number::<u32>(tail).ok_or("expected parameter count")?;
    let tail = tail.strip_prefix(" params, ").ok_or("expected ` params, `")?;
    let (register_count, tail) = split_number::<u32>(tail).ok_or("expected register count")?;
    let tail = tail.strip_prefix(" registers,").ok_or("expected ` registers,`")?;
    let tail = tail.strip_prefix(char::is_whitespace).unwrap_or(tail);
    let (symbol_count, tail) = split_number::<u32>(tail).ok_or("expected symbol count")?;
    let tail = tail.strip_prefix(" symbols):").ok_or("expected ` symbols):`")?;
    if !tail.is_empty() {
        return Err("unexpected text after header");
    }

    Ok(Header {
        name: name.to_string(),
        index,
        param_count,
        register_count,
        symbol_count,
    })
}

fn split_number<T: std::str::FromStr>(text: &str) -> Option<(T, &str)> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let value = text[..end].parse().ok()?;
    Some((value, &text[end..]))
}

// A digit run too long for u64 is still an index, just one no module can hold.
fn split_index(text: &str) -> Option<(u64, &str)> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let index = text[..end].parse().unwrap_or(u64::MAX);
    Some((index, &text[end..]))
}

/// Parses a single instruction line.
///
/// Returns `Ok(None)` for blank and comment lines.
///
/// # Errors
///
/// Returns the offending token and reason if an operand is malformed.
pub fn parse_instruction(line: &str) -> Result<Option<Instruction>, (String, OperandError)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
        return Ok(None);
    }

    let mut tokens = trimmed.split_whitespace();
    let Some(opcode) = tokens.next() else {
        return Ok(None);
    };

    let operands = tokens
        .map(|raw| {
            let token = raw.strip_suffix(OPERAND_SEPARATOR).unwrap_or(raw);
            parse_operand(token).map_err(|reason| (token.to_string(), reason))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Instruction::new(opcode, operands)))
}

struct RawBlock<'a> {
    ordinal: usize,
    header_line: usize,
    header: &'a str,
    body: Vec<(usize, &'a str)>,
}

fn segment(text: &str) -> Result<Vec<RawBlock<'_>>, ParseError> {
    let mut blocks = Vec::new();
    let mut current: Option<RawBlock<'_>> = None;

    for (offset, line) in text.lines().enumerate() {
        let line_no = offset + 1;
        let trimmed = line.trim();

        if trimmed == END_MARKER && current.is_some() {
            blocks.extend(current.take());
            continue;
        }
        if let Some(block) = current.as_mut() {
            if trimmed.starts_with(HEADER_PREFIX) {
                return Err(ParseError::at(
                    block.header_line,
                    ParseErrorKind::UnterminatedBlock {
                        block: block.ordinal,
                    },
                ));
            }
            block.body.push((line_no, line));
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER) {
            continue;
        }
        current = Some(RawBlock {
            ordinal: blocks.len() + 1,
            header_line: line_no,
            header: trimmed,
            body: Vec::new(),
        });
    }

    if let Some(block) = current {
        return Err(ParseError::at(
            block.header_line,
            ParseErrorKind::UnterminatedBlock {
                block: block.ordinal,
            },
        ));
    }
    Ok(blocks)
}

fn parse_body(
    index: usize,
    body: &[(usize, &str)],
    shape: ModuleShape,
) -> Result<Vec<Instruction>, ParseError> {
    let mut instructions = Vec::new();

    for &(line_no, line) in body {
        let instruction = parse_instruction(line).map_err(|(token, reason)| {
            ParseError::at(
                line_no,
                ParseErrorKind::MalformedOperand {
                    function: index,
                    token,
                    reason,
                },
            )
        })?;
        let Some(instruction) = instruction else {
            continue;
        };

        for operand in instruction.operands.iter().filter(|o| o.kind.is_string_ref()) {
            if operand.string_id().is_some_and(|id| id < shape.string_count) {
                continue;
            }
            return Err(ParseError::at(
                line_no,
                ParseErrorKind::UnresolvedString {
                    function: index,
                    id: operand.value.as_integer().unwrap_or_default(),
                    string_count: shape.string_count,
                },
            ));
        }

        instructions.push(instruction);
    }

    Ok(instructions)
}

/// Parses a complete instruction text into a function table.
///
/// Blocks may appear in any order; the result is ordered by declared index and
/// has exactly `shape.function_count` entries.
///
/// # Errors
///
/// Returns the first [`ParseError`] found. Headers are all checked before any
/// body is parsed.
pub fn parse_program(text: &str, shape: ModuleShape) -> Result<Vec<Function>, ParseError> {
    let blocks = segment(text)?;

    let mut placed: BTreeMap<usize, (usize, &RawBlock<'_>, Header)> = BTreeMap::new();

    for block in &blocks {
        let header = parse_header(block.header).map_err(|reason| {
            ParseError::at(
                block.header_line,
                ParseErrorKind::MalformedHeader {
                    block: block.ordinal,
                    reason,
                    text: block.header.to_string(),
                },
            )
        })?;

        let out_of_range = ParseErrorKind::OutOfRangeIndex {
            index: header.index,
            function_count: shape.function_count,
        };
        let index = usize::try_from(header.index)
            .ok()
            .filter(|&i| i < shape.function_count)
            .ok_or_else(|| ParseError::at(block.header_line, out_of_range))?;

        if let Some((first_line, _, _)) = placed.get(&index) {
            return Err(ParseError::at(
                block.header_line,
                ParseErrorKind::DuplicateFunction {
                    index,
                    first_line: *first_line,
                },
            ));
        }
        placed.insert(index, (block.header_line, block, header));
    }

    (0..shape.function_count)
        .map(|index| {
            let (_, block, header) = placed.remove(&index).ok_or(ParseError {
                line: None,
                kind: ParseErrorKind::MissingFunction { index },
            })?;
            let instructions = parse_body(index, &block.body, shape)?;
            debug!(
                "parsed function {index} `{}` ({} instructions)",
                header.name,
                instructions.len()
            );
            Ok(Function {
                name: header.name,
                param_count: header.param_count,
                register_count: header.register_count,
                symbol_count: header.symbol_count,
                instructions,
            })
        })
        .collect()
}
