//! This module defines the expression language that pointers, object sizes
//! and path constraints are written in.
//!
//! Expressions are a small tagged-variant AST over fixed-width bitvectors.
//! The symbolic execution engine producing the expressions is expected to
//! simplify them; this crate only pattern-matches on [`Expression::Const`]
//! to take concrete fast paths and otherwise hands expressions to the
//! solver oracle unchanged.

use crate::prelude::*;
use derive_more::*;
use std::collections::BTreeMap;

mod bitvector;
pub use bitvector::*;
mod builder;
mod macros;
pub use macros::parsing;

/// An unsigned number of bytes.
///
/// Used to represent the width of expressions and pointers.
/// Can also be used for other byte-valued numbers, like offsets,
/// as long as the number is guaranteed to be non-negative.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Clone,
    Copy,
    Display,
    Binary,
    Octal,
    LowerHex,
    UpperHex,
    From,
    Into,
    Add,
    Sub,
    AddAssign,
    SubAssign,
    Sum,
)]
#[serde(transparent)]
pub struct ByteSize(u64);

impl From<ByteSize> for apint::BitWidth {
    fn from(bytesize: ByteSize) -> apint::BitWidth {
        apint::BitWidth::from((u64::from(bytesize) * 8) as usize)
    }
}

impl From<apint::BitWidth> for ByteSize {
    /// Convert to `ByteSize`, while always rounding up to the nearest full byte.
    fn from(bitwidth: apint::BitWidth) -> ByteSize {
        ByteSize::new((bitwidth.to_usize() + 7) as u64 / 8)
    }
}

impl ByteSize {
    /// Create a new `ByteSize` object
    pub fn new(value: u64) -> ByteSize {
        ByteSize(value)
    }

    /// Convert to the equivalent size in bits (by multiplying with 8).
    pub fn as_bit_length(self) -> usize {
        (u64::from(self) * 8) as usize
    }
}

/// A variable represents a symbolic input of known size and name,
/// e.g. a value the engine marked as symbolic.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone)]
pub struct Variable {
    /// The name of the variable. Required to be unique within one execution path.
    pub name: String,
    /// The size (in bytes) of the variable.
    pub size: ByteSize,
}

impl std::fmt::Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.size)
    }
}

/// A concrete valuation of symbolic variables,
/// e.g. one model returned by a solver.
pub type VariableAssignment = BTreeMap<Variable, Bitvector>;

/// The type/mnemonic of a binary operation.
///
/// Comparison operations always return a 1-byte bitvector holding 0 or 1.
/// The `Int` comparisons are unsigned unless prefixed with `S`.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum BinOpType {
    /// Modulo addition
    IntAdd,
    /// Modulo subtraction
    IntSub,
    /// Equality check
    IntEqual,
    /// Inequality check
    IntNotEqual,
    /// Unsigned less-than check
    IntLess,
    /// Unsigned less-than-or-equal check
    IntLessEqual,
    /// Signed less-than check
    IntSLess,
    /// Boolean and
    BoolAnd,
    /// Boolean or
    BoolOr,
}

/// The type/mnemonic of a unary operation.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum UnOpType {
    /// Bitwise negation
    IntNegate,
    /// Two's complement negation
    Int2Comp,
    /// Boolean negation
    BoolNegate,
}

/// An expression is a computation rule for a fixed-width bitvector value
/// in terms of symbolic input variables.
///
/// Computing the value of an expression is a side-effect-free operation.
/// Expressions are typed in the sense that each expression has a `ByteSize`
/// indicating the size of the result when evaluating the expression.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub enum Expression {
    /// A symbolic input variable of known size.
    Var(Variable),
    /// A constant value represented by a bitvector.
    Const(Bitvector),
    /// A binary operation.
    /// Both sides are required to be of equal size.
    BinOp {
        /// The opcode/type of the operation
        op: BinOpType,
        /// The left hand side expression
        lhs: Box<Expression>,
        /// The right hand side expression
        rhs: Box<Expression>,
    },
    /// A unary operation
    UnOp {
        /// The opcode/type of the operation
        op: UnOpType,
        /// The argument expression
        arg: Box<Expression>,
    },
}

impl Expression {
    /// Return the size (in bytes) of the result value of the expression.
    pub fn bytesize(&self) -> ByteSize {
        use BinOpType::*;
        use Expression::*;
        match self {
            Var(var) => var.size,
            Const(bitvec) => bitvec.width().into(),
            BinOp { op, lhs, rhs: _ } => match op {
                IntEqual | IntNotEqual | IntLess | IntLessEqual | IntSLess | BoolAnd | BoolOr => {
                    ByteSize::new(1)
                }
                IntAdd | IntSub => lhs.bytesize(),
            },
            UnOp { op: _, arg } => arg.bytesize(),
        }
    }

    /// Return whether the expression is a constant.
    pub fn is_const(&self) -> bool {
        matches!(self, Expression::Const(_))
    }

    /// If the expression is a constant, return the corresponding bitvector.
    /// Return an error otherwise.
    pub fn try_to_bitvec(&self) -> Result<Bitvector, Error> {
        match self {
            Expression::Const(bitvec) => Ok(bitvec.clone()),
            _ => Err(anyhow!("Expression is not a constant")),
        }
    }

    /// If the expression is a constant that fits into a `u64`, return its value.
    /// Return an error otherwise.
    pub fn try_to_u64(&self) -> Result<u64, Error> {
        Ok(self.try_to_bitvec()?.try_to_u64()?)
    }

    /// Return an array of all input variables of the given expression.
    /// The array may contain duplicates.
    pub fn input_vars(&self) -> Vec<&Variable> {
        use Expression::*;
        match self {
            Var(var) => vec![var],
            Const(_) => Vec::new(),
            BinOp { op: _, lhs, rhs } => {
                let mut vars = lhs.input_vars();
                vars.append(&mut rhs.input_vars());
                vars
            }
            UnOp { arg, .. } => arg.input_vars(),
        }
    }

    /// Compute the concrete value of the expression under the given assignment
    /// of values to symbolic variables.
    ///
    /// Returns an error if the expression contains a variable
    /// that has no value bound in the assignment.
    pub fn evaluate(&self, assignment: &VariableAssignment) -> Result<Bitvector, Error> {
        match self {
            Expression::Const(bitvec) => Ok(bitvec.clone()),
            Expression::Var(var) => assignment
                .get(var)
                .cloned()
                .ok_or_else(|| anyhow!("No value bound for variable {}", var)),
            Expression::BinOp { op, lhs, rhs } => {
                Ok(lhs.evaluate(assignment)?.bin_op(*op, &rhs.evaluate(assignment)?))
            }
            Expression::UnOp { op, arg } => Ok(arg.evaluate(assignment)?.un_op(*op)),
        }
    }
}

impl From<Bitvector> for Expression {
    fn from(bitvec: Bitvector) -> Expression {
        Expression::Const(bitvec)
    }
}

impl From<Variable> for Expression {
    fn from(var: Variable) -> Expression {
        Expression::Var(var)
    }
}
