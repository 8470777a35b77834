use super::Pointer;
use crate::expr::Expression;
use crate::prelude::*;
use derive_more::Deref;
use std::sync::Arc;

/// The identity and metadata of one allocation.
///
/// A memory object is immutable after creation;
/// the (mutable, copy-on-write) byte contents live in the
/// [`ObjectState`](super::ObjectState) bound to the object by an address space.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct MemoryObject {
    /// The concrete base address of the allocation.
    /// Used for raw-address resolution and for external concrete I/O.
    address: u64,
    /// The size in bytes of the allocation. May be symbolic.
    size: Expression,
    /// The segment id under which the object is registered, or 0 for none.
    ///
    /// Segment ids are unique across the whole process,
    /// so a segmented pointer identifies its object independently of any address space.
    segment: u64,
    /// User-specified objects describe memory that the engine does not manage itself.
    /// They are excluded from bulk concrete I/O.
    is_user_specified: bool,
    /// A name for diagnostics, e.g. derived from the allocation site.
    name: String,
}

impl MemoryObject {
    /// Create a new unsegmented memory object.
    pub fn new(address: u64, size: Expression) -> MemoryObject {
        MemoryObject {
            address,
            size,
            segment: 0,
            is_user_specified: false,
            name: String::new(),
        }
    }

    /// Create a new memory object registered under the given segment id.
    ///
    /// Panics if the segment id is 0, which is reserved for raw-address pointers.
    pub fn with_segment(address: u64, size: Expression, segment: u64) -> MemoryObject {
        assert_ne!(segment, 0, "segment id 0 is reserved");
        MemoryObject {
            address,
            size,
            segment,
            is_user_specified: false,
            name: String::new(),
        }
    }

    /// Set the diagnostic name of the object.
    pub fn named(mut self, name: impl ToString) -> MemoryObject {
        self.name = name.to_string();
        self
    }

    /// Mark the object as user-specified, excluding it from bulk concrete I/O.
    pub fn user_specified(mut self) -> MemoryObject {
        self.is_user_specified = true;
        self
    }

    /// Get the concrete base address of the object.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Get the size expression of the object.
    pub fn size(&self) -> &Expression {
        &self.size
    }

    /// If the object has constant size, return it.
    /// Objects with symbolic size return `None`.
    pub fn const_size(&self) -> Option<u64> {
        self.size.try_to_u64().ok()
    }

    /// Get the segment id of the object (0 if unsegmented).
    pub fn segment(&self) -> u64 {
        self.segment
    }

    /// Return whether the object is user-specified.
    pub fn is_user_specified(&self) -> bool {
        self.is_user_specified
    }

    /// Get the diagnostic name of the object.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the base address of the object as a constant expression of the given width.
    pub fn base_expr(&self, width: ByteSize) -> Expression {
        Expression::const_from_u64(self.address, width)
    }

    /// Build the boolean expression stating that the given pointer points into this object.
    ///
    /// For a segmented object this is
    /// `pointer.segment == self.segment && pointer.offset < self.size`.
    /// For an unsegmented object the pointer offset is interpreted as a raw address:
    /// `pointer.segment == 0 && pointer.offset - self.address < self.size`,
    /// respectively an exact base address match for zero-sized objects.
    pub fn bounds_check_pointer(&self, pointer: &Pointer) -> Expression {
        let width = pointer.bytesize();
        let segment_matches = pointer
            .segment()
            .clone()
            .eq(Expression::const_from_u64(self.segment, width));
        let offset_in_bounds = if self.segment != 0 {
            pointer.offset().clone().ult(self.size.clone())
        } else if self.const_size() == Some(0) {
            pointer.offset().clone().eq(self.base_expr(width))
        } else {
            pointer
                .offset()
                .clone()
                .minus(self.base_expr(width))
                .ult(self.size.clone())
        };
        segment_matches.bool_and(offset_in_bounds)
    }
}

impl std::fmt::Display for MemoryObject {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.name.is_empty() {
            write!(formatter, "object@{:#x}", self.address)
        } else {
            write!(formatter, "{}@{:#x}", self.name, self.address)
        }
    }
}

/// A reference-counted handle to a memory object.
///
/// Handles are the keys of the object map of an address space.
/// They are ordered by the base address of the object;
/// within one address space no two live objects share a base address,
/// so this order is total.
#[derive(Serialize, Deserialize, Debug, Clone, Deref)]
#[deref(forward)]
pub struct MemoryObjectRef(Arc<MemoryObject>);

impl MemoryObjectRef {
    /// Create a new handle to the given memory object.
    pub fn new(object: MemoryObject) -> MemoryObjectRef {
        MemoryObjectRef(Arc::new(object))
    }

    /// Return whether two handles refer to the same memory object allocation.
    pub fn ptr_eq(&self, other: &MemoryObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<MemoryObject> for MemoryObjectRef {
    fn from(object: MemoryObject) -> MemoryObjectRef {
        MemoryObjectRef::new(object)
    }
}

impl PartialEq for MemoryObjectRef {
    /// Handles compare by base address,
    /// matching their ordering as object map keys.
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.address() == other.address()
    }
}

impl Eq for MemoryObjectRef {}

impl PartialOrd for MemoryObjectRef {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MemoryObjectRef {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.address().cmp(&other.address())
    }
}

impl std::hash::Hash for MemoryObjectRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl std::fmt::Display for MemoryObjectRef {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&**self, formatter)
    }
}
