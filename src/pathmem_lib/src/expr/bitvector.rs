use super::*;

/// A bitvector is a fixed-length vector of bits
/// with the semantics of a CPU register,
/// i.e. it supports two's complement modulo arithmetic.
///
/// Bitvector is just an alias for the [`apint::ApInt`] type.
pub type Bitvector = apint::ApInt;

/// A trait to extend the bitvector type with the helper functions
/// that the memory model needs and that are not contained in the [`apint`] crate.
pub trait BitvectorExtended: Sized {
    /// Compute the result of the given binary operation.
    /// Both operands are required to have the same width for arithmetic and comparison operations.
    fn bin_op(&self, op: BinOpType, rhs: &Self) -> Self;

    /// Compute the result of the given unary operation.
    fn un_op(&self, op: UnOpType) -> Self;

    /// Resize `self` to the target byte size by either zero extending or truncating `self`.
    fn into_resize_unsigned(self, size: ByteSize) -> Self;

    /// Return the size in bytes of the bitvector.
    fn bytesize(&self) -> ByteSize;
}

impl BitvectorExtended for Bitvector {
    fn bin_op(&self, op: BinOpType, rhs: &Self) -> Self {
        use BinOpType::*;
        match op {
            IntAdd => self + rhs,
            IntSub => self - rhs,
            IntEqual => {
                assert_eq!(self.width(), rhs.width());
                Bitvector::from((self == rhs) as u8)
            }
            IntNotEqual => {
                assert_eq!(self.width(), rhs.width());
                Bitvector::from((self != rhs) as u8)
            }
            IntLess => Bitvector::from(self.checked_ult(rhs).unwrap() as u8),
            IntLessEqual => Bitvector::from(self.checked_ule(rhs).unwrap() as u8),
            IntSLess => Bitvector::from(self.checked_slt(rhs).unwrap() as u8),
            BoolAnd => self & rhs,
            BoolOr => self | rhs,
        }
    }

    fn un_op(&self, op: UnOpType) -> Self {
        use UnOpType::*;
        match op {
            IntNegate => self.clone().into_bitnot(),
            Int2Comp => -self.clone(),
            BoolNegate => {
                if self.is_zero() {
                    Bitvector::from_u8(1)
                } else {
                    Bitvector::from_u8(0)
                }
            }
        }
    }

    fn into_resize_unsigned(self, size: ByteSize) -> Self {
        if self.width() < size.into() {
            self.into_zero_extend(size).unwrap()
        } else {
            self.into_truncate(size).unwrap()
        }
    }

    fn bytesize(&self) -> ByteSize {
        self.width().into()
    }
}
