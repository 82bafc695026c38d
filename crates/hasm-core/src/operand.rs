//! Operand kind vocabulary and typed operand values.
//!
//! Every operand in the text form is written as `kind:value`. The kind decides
//! how the value is parsed: [`OperandKind::Double`] parses as a real number,
//! every other kind parses as an integer constrained to the kind's width.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between an operand kind tag and its value.
pub const KIND_SEPARATOR: char = ':';

/// Fixed vocabulary of operand kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperandKind {
    /// Register index with no declared width.
    Reg,
    /// 8-bit register index.
    Reg8,
    /// 32-bit register index.
    Reg32,
    /// Unsigned 8-bit immediate.
    UInt8,
    /// Unsigned 16-bit immediate.
    UInt16,
    /// Unsigned 32-bit immediate.
    UInt32,
    /// Signed 8-bit relative jump offset.
    Addr8,
    /// Signed 32-bit relative jump offset.
    Addr32,
    /// Signed 32-bit immediate.
    Imm32,
    /// 64-bit floating-point immediate.
    Double,
    /// 8-bit string table index.
    UInt8S,
    /// 16-bit string table index.
    UInt16S,
    /// 32-bit string table index.
    UInt32S,
}

/// All operand kinds in tag order.
pub const OPERAND_KINDS: [OperandKind; 13] = [
    OperandKind::Reg,
    OperandKind::Reg8,
    OperandKind::Reg32,
    OperandKind::UInt8,
    OperandKind::UInt16,
    OperandKind::UInt32,
    OperandKind::Addr8,
    OperandKind::Addr32,
    OperandKind::Imm32,
    OperandKind::Double,
    OperandKind::UInt8S,
    OperandKind::UInt16S,
    OperandKind::UInt32S,
];

impl OperandKind {
    /// Returns the textual tag used in the instruction artifact.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Reg => "Reg",
            Self::Reg8 => "Reg8",
            Self::Reg32 => "Reg32",
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::Addr8 => "Addr8",
            Self::Addr32 => "Addr32",
            Self::Imm32 => "Imm32",
            Self::Double => "Double",
            Self::UInt8S => "UInt8S",
            Self::UInt16S => "UInt16S",
            Self::UInt32S => "UInt32S",
        }
    }

    /// Resolves a textual tag back into a kind.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        OPERAND_KINDS.into_iter().find(|kind| kind.tag() == tag)
    }

    /// Whether operands of this kind index into the string table.
    #[must_use]
    pub const fn is_string_ref(self) -> bool {
        matches!(self, Self::UInt8S | Self::UInt16S | Self::UInt32S)
    }

    /// Whether operands of this kind carry a real number.
    #[must_use]
    pub const fn is_real(self) -> bool {
        matches!(self, Self::Double)
    }

    /// Inclusive integer bounds accepted for this kind.
    ///
    /// Returns `None` for [`OperandKind::Double`].
    #[must_use]
    pub const fn integer_bounds(self) -> Option<(i64, i64)> {
        match self {
            Self::Reg8 | Self::UInt8 | Self::UInt8S => Some((0, u8::MAX as i64)),
            Self::UInt16 | Self::UInt16S => Some((0, u16::MAX as i64)),
            Self::Reg | Self::Reg32 | Self::UInt32 | Self::UInt32S => Some((0, u32::MAX as i64)),
            Self::Addr8 => Some((i8::MIN as i64, i8::MAX as i64)),
            Self::Addr32 | Self::Imm32 => Some((i32::MIN as i64, i32::MAX as i64)),
            Self::Double => None,
        }
    }
}

impl fmt::Display for OperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Numeric payload of an operand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OperandValue {
    /// Integer payload (registers, immediates, offsets, string ids).
    Integer(i64),
    /// Real payload (only for [`OperandKind::Double`]).
    Real(f64),
}

impl OperandValue {
    /// Returns the integer payload, if any.
    #[must_use]
    pub const fn as_integer(self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(v),
            Self::Real(_) => None,
        }
    }

    /// Returns the real payload, if any.
    #[must_use]
    pub const fn as_real(self) -> Option<f64> {
        match self {
            Self::Real(v) => Some(v),
            Self::Integer(_) => None,
        }
    }
}

impl fmt::Display for OperandValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            // f64 Display is the shortest text that parses back to the same bits.
            Self::Real(v) => write!(f, "{v}"),
        }
    }
}

/// A typed instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Operand {
    /// Operand kind tag.
    pub kind: OperandKind,
    /// Whether the value is a string table index.
    pub is_string_ref: bool,
    /// Operand payload.
    pub value: OperandValue,
}

impl Operand {
    /// Creates an integer operand; the string flag follows the kind.
    #[must_use]
    pub const fn integer(kind: OperandKind, value: i64) -> Self {
        Self {
            kind,
            is_string_ref: kind.is_string_ref(),
            value: OperandValue::Integer(value),
        }
    }

    /// Creates a [`OperandKind::Double`] operand.
    #[must_use]
    pub const fn real(value: f64) -> Self {
        Self {
            kind: OperandKind::Double,
            is_string_ref: false,
            value: OperandValue::Real(value),
        }
    }

    /// Returns the string table index when this operand references a string.
    #[must_use]
    pub fn string_id(&self) -> Option<usize> {
        if !self.kind.is_string_ref() {
            return None;
        }
        self.value
            .as_integer()
            .and_then(|v| usize::try_from(v).ok())
    }

    /// Returns a copy with the string flag re-derived from the kind.
    #[must_use]
    pub const fn resolved(self) -> Self {
        Self {
            is_string_ref: self.kind.is_string_ref(),
            ..self
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{KIND_SEPARATOR}{}", self.kind, self.value)
    }
}

/// Reasons an operand token is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperandError {
    /// Token has no `kind:value` separator, or more than one.
    #[error("expected `kind:value`")]
    MissingSeparator,
    /// Kind tag is not in the vocabulary.
    #[error("unknown operand kind `{0}`")]
    UnknownKind(String),
    /// Value is not an integer.
    #[error("`{text}` is not an integer for {kind}")]
    InvalidInteger {
        /// Operand kind being parsed.
        kind: OperandKind,
        /// Offending value text.
        text: String,
    },
    /// Value is not a real number.
    #[error("`{0}` is not a real number")]
    InvalidReal(String),
    /// Integer does not fit the kind's width.
    #[error("{value} does not fit {kind} ({min}..={max})")]
    OutOfRange {
        /// Operand kind being parsed.
        kind: OperandKind,
        /// Parsed value.
        value: i64,
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
    },
}

/// Parses an operand token of the form `kind:value`.
///
/// The returned operand always has `is_string_ref == false`; resolving string
/// identity is left to whoever consumes the parsed function.
///
/// # Errors
///
/// Returns an [`OperandError`] if the token lacks a separator, names an
/// unknown kind, or carries a value that does not parse for that kind.
pub fn parse_operand(token: &str) -> Result<Operand, OperandError> {
    let mut parts = token.split(KIND_SEPARATOR);
    let (Some(tag), Some(text), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(OperandError::MissingSeparator);
    };

    let kind = OperandKind::from_tag(tag).ok_or_else(|| OperandError::UnknownKind(tag.into()))?;
    let value = parse_value(kind, text)?;

    Ok(Operand {
        kind,
        is_string_ref: false,
        value,
    })
}

/// Parses a value string according to `kind`.
///
/// # Errors
///
/// Returns an [`OperandError`] if the text is not numeric or is out of range
/// for the kind.
pub fn parse_value(kind: OperandKind, text: &str) -> Result<OperandValue, OperandError> {
    let Some((min, max)) = kind.integer_bounds() else {
        return text
            .parse::<f64>()
            .map(OperandValue::Real)
            .map_err(|_| OperandError::InvalidReal(text.into()));
    };

    let value = text.parse::<i64>().map_err(|_| OperandError::InvalidInteger {
        kind,
        text: text.into(),
    })?;

    if value < min || value > max {
        return Err(OperandError::OutOfRange {
            kind,
            value,
            min,
            max,
        });
    }

    Ok(OperandValue::Integer(value))
}
