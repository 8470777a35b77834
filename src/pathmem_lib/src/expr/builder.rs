use super::*;

/// ## Helper functions for building expressions
impl Expression {
    /// Shortcut for creating a constant expression of the given width from a `u64` value.
    /// The value is truncated if it does not fit into the given width.
    pub fn const_from_u64(value: u64, width: ByteSize) -> Expression {
        Expression::Const(Bitvector::from_u64(value).into_resize_unsigned(width))
    }

    /// Shortcut for creating the constant zero of the given width.
    pub fn zero(width: ByteSize) -> Expression {
        Expression::Const(Bitvector::zero(width.into()))
    }

    /// Shortcut for creating an `IntAdd`-expression
    pub fn plus(self, rhs: Expression) -> Expression {
        Expression::BinOp {
            lhs: Box::new(self),
            op: BinOpType::IntAdd,
            rhs: Box::new(rhs),
        }
    }

    /// Shortcut for creating an `IntSub`-expression
    pub fn minus(self, rhs: Expression) -> Expression {
        Expression::BinOp {
            lhs: Box::new(self),
            op: BinOpType::IntSub,
            rhs: Box::new(rhs),
        }
    }

    /// Shortcut for creating an `IntEqual`-expression
    pub fn eq(self, rhs: Expression) -> Expression {
        Expression::BinOp {
            lhs: Box::new(self),
            op: BinOpType::IntEqual,
            rhs: Box::new(rhs),
        }
    }

    /// Shortcut for creating an expression checking `self == 0`.
    pub fn eq_zero(self) -> Expression {
        let width = self.bytesize();
        self.eq(Expression::zero(width))
    }

    /// Shortcut for creating an unsigned `self < rhs` comparison.
    pub fn ult(self, rhs: Expression) -> Expression {
        Expression::BinOp {
            lhs: Box::new(self),
            op: BinOpType::IntLess,
            rhs: Box::new(rhs),
        }
    }

    /// Shortcut for creating an unsigned `self <= rhs` comparison.
    pub fn ule(self, rhs: Expression) -> Expression {
        Expression::BinOp {
            lhs: Box::new(self),
            op: BinOpType::IntLessEqual,
            rhs: Box::new(rhs),
        }
    }

    /// Shortcut for creating an unsigned `self >= rhs` comparison.
    pub fn uge(self, rhs: Expression) -> Expression {
        rhs.ule(self)
    }

    /// Shortcut for creating a `BoolAnd`-expression
    pub fn bool_and(self, rhs: Expression) -> Expression {
        Expression::BinOp {
            lhs: Box::new(self),
            op: BinOpType::BoolAnd,
            rhs: Box::new(rhs),
        }
    }
}
