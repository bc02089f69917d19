//! Opcode definitions for the Python 3.8 bytecode the translator accepts.
//!
//! The frontend hands us opcode *names* (`"LOAD_CONST"`), not bytes, so the
//! enum derives `strum::EnumString` with SCREAMING_SNAKE_CASE serialization
//! for the name→opcode direction and `IntoStaticStr` for display. Anything
//! that fails to parse is an unsupported opcode.

use std::str::FromStr;

use strum::{EnumString, IntoStaticStr};

use crate::expr::{BinaryOp, UnaryOp};

/// The recognized opcode set, exactly.
///
/// Exception-handling opcodes and everything newer than 3.8 are deliberately
/// absent; encountering them is an `UnsupportedOpcode` error, not a decode
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    // === Constants & Variables ===
    LoadConst,
    LoadName,
    LoadGlobal,
    LoadFast,
    LoadAttr,
    LoadClosure,
    StoreName,
    StoreGlobal,
    StoreFast,
    StoreAttr,
    StoreSubscr,

    // === Stack Manipulation ===
    PopTop,
    DupTop,
    UnpackSequence,

    // === Binary Operations ===
    BinaryAdd,
    BinaryAnd,
    BinaryFloorDivide,
    BinaryLshift,
    BinaryMatrixMultiply,
    BinaryModulo,
    BinaryMultiply,
    BinaryOr,
    BinaryPower,
    BinaryRshift,
    BinarySubtract,
    BinaryTrueDivide,
    BinaryXor,
    BinarySubscr,

    // === In-place Operations ===
    InplaceAdd,
    InplaceAnd,
    InplaceFloorDivide,
    InplaceLshift,
    InplaceMatrixMultiply,
    InplaceModulo,
    InplaceMultiply,
    InplaceOr,
    InplacePower,
    InplaceRshift,
    InplaceSubtract,
    InplaceTrueDivide,
    InplaceXor,

    // === Unary Operations ===
    UnaryPositive,
    UnaryNegative,
    UnaryNot,
    UnaryInvert,

    // === Comparison ===
    CompareOp,

    // === Collection Building ===
    BuildList,
    BuildSet,
    BuildTuple,
    BuildSlice,
    BuildString,
    BuildMap,
    BuildConstKeyMap,

    // === Functions & Classes ===
    MakeFunction,
    CallFunction,
    LoadBuildClass,
    LoadMethod,
    CallMethod,

    // === Imports & Annotations ===
    SetupAnnotations,
    ImportName,
    ImportFrom,

    // === F-strings ===
    FormatValue,

    // === Control Flow ===
    ReturnValue,
    PopJumpIfTrue,
    PopJumpIfFalse,
    JumpIfTrueOrPop,
    JumpIfFalseOrPop,
    JumpForward,
    JumpAbsolute,
    GetIter,
    ForIter,
}

impl Opcode {
    /// Parses a frontend opcode name; `None` means unsupported.
    #[must_use]
    pub fn parse(opname: &str) -> Option<Self> {
        Self::from_str(opname).ok()
    }

    /// The binary operator for a `BINARY_*` opcode, if this is one.
    ///
    /// `BINARY_SUBSCR` is not an operator: it lowers to a `Subscript`
    /// expression rather than a builtin call.
    #[must_use]
    pub fn binary_op(self) -> Option<BinaryOp> {
        match self {
            Self::BinaryAdd => Some(BinaryOp::Add),
            Self::BinaryAnd => Some(BinaryOp::And),
            Self::BinaryFloorDivide => Some(BinaryOp::FloorDivide),
            Self::BinaryLshift => Some(BinaryOp::LShift),
            Self::BinaryMatrixMultiply => Some(BinaryOp::MatrixMultiply),
            Self::BinaryModulo => Some(BinaryOp::Modulo),
            Self::BinaryMultiply => Some(BinaryOp::Multiply),
            Self::BinaryOr => Some(BinaryOp::Or),
            Self::BinaryPower => Some(BinaryOp::Power),
            Self::BinaryRshift => Some(BinaryOp::RShift),
            Self::BinarySubtract => Some(BinaryOp::Subtract),
            Self::BinaryTrueDivide => Some(BinaryOp::TrueDivide),
            Self::BinaryXor => Some(BinaryOp::Xor),
            _ => None,
        }
    }

    /// The binary operator for an `INPLACE_*` opcode, if this is one.
    #[must_use]
    pub fn inplace_op(self) -> Option<BinaryOp> {
        match self {
            Self::InplaceAdd => Some(BinaryOp::Add),
            Self::InplaceAnd => Some(BinaryOp::And),
            Self::InplaceFloorDivide => Some(BinaryOp::FloorDivide),
            Self::InplaceLshift => Some(BinaryOp::LShift),
            Self::InplaceMatrixMultiply => Some(BinaryOp::MatrixMultiply),
            Self::InplaceModulo => Some(BinaryOp::Modulo),
            Self::InplaceMultiply => Some(BinaryOp::Multiply),
            Self::InplaceOr => Some(BinaryOp::Or),
            Self::InplacePower => Some(BinaryOp::Power),
            Self::InplaceRshift => Some(BinaryOp::RShift),
            Self::InplaceSubtract => Some(BinaryOp::Subtract),
            Self::InplaceTrueDivide => Some(BinaryOp::TrueDivide),
            Self::InplaceXor => Some(BinaryOp::Xor),
            _ => None,
        }
    }

    /// The unary operator for a `UNARY_*` opcode, if this is one.
    #[must_use]
    pub fn unary_op(self) -> Option<UnaryOp> {
        match self {
            Self::UnaryPositive => Some(UnaryOp::Positive),
            Self::UnaryNegative => Some(UnaryOp::Negative),
            Self::UnaryNot => Some(UnaryOp::Not),
            Self::UnaryInvert => Some(UnaryOp::Invert),
            _ => None,
        }
    }
}
