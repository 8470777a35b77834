use crate::expr::Expression;
use crate::prelude::*;

/// A pointer value as seen by the symbolic execution engine:
/// a pair of a segment expression and an offset expression of equal width.
///
/// Segment `0` means that the offset is a raw address
/// to be resolved against the base addresses of all objects in the address space.
/// A non-zero segment denotes the memory object registered under that segment id;
/// the offset is then the displacement inside that object.
///
/// Objects with symbolic size can only be reached through segmented pointers,
/// since they have no meaningful concrete extent to match a raw address against.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct Pointer {
    segment: Expression,
    offset: Expression,
}

impl Pointer {
    /// Create a new pointer from a segment and an offset expression.
    ///
    /// Panics if the two expressions have different widths.
    pub fn new(segment: Expression, offset: Expression) -> Pointer {
        assert_eq!(
            segment.bytesize(),
            offset.bytesize(),
            "pointer segment and offset must have the same width"
        );
        Pointer { segment, offset }
    }

    /// Create a raw-address pointer (segment zero) from a concrete address.
    pub fn from_address(address: Bitvector) -> Pointer {
        let width = address.width();
        Pointer {
            segment: Expression::Const(Bitvector::zero(width)),
            offset: Expression::Const(address),
        }
    }

    /// Get the segment expression of the pointer.
    pub fn segment(&self) -> &Expression {
        &self.segment
    }

    /// Get the offset expression of the pointer.
    pub fn offset(&self) -> &Expression {
        &self.offset
    }

    /// Get the width of the pointer.
    pub fn bytesize(&self) -> ByteSize {
        self.offset.bytesize()
    }

    /// Return whether both segment and offset are constant.
    pub fn is_constant(&self) -> bool {
        self.segment.is_const() && self.offset.is_const()
    }

    /// If the segment expression is constant, return its value.
    pub fn constant_segment(&self) -> Option<u64> {
        self.segment.try_to_u64().ok()
    }

    /// If the offset expression is constant, return its value.
    pub fn constant_offset(&self) -> Option<u64> {
        self.offset.try_to_u64().ok()
    }
}

impl std::fmt::Display for Pointer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "({:?}, {:?})", self.segment, self.offset)
    }
}
