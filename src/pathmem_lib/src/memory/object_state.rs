use crate::expr::Expression;
use crate::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The owner tag of an object state that no address space has claimed yet.
pub const NO_OWNER: u64 = 0;

/// The byte contents of one allocation.
///
/// An object state consists of a concrete byte cache
/// and a sparse symbolic overlay on top of it:
/// a byte with an overlay entry is symbolic and its concrete cache byte is meaningless.
///
/// Object states are shared between the address spaces of forked execution paths.
/// Sharing is governed by the `copy_on_write_owner` tag:
/// only the address space whose key matches the tag may write to the state,
/// every other holder must copy first
/// (see [`AddressSpace::get_writeable`](super::AddressSpace::get_writeable)).
/// To make those copies cheap until a write actually happens,
/// the data is wrapped into an `Arc`.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct ObjectState {
    inner: Arc<Inner>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
struct Inner {
    read_only: bool,
    copy_on_write_owner: u64,
    offset_plane: OffsetPlane,
}

/// The per-offset storage of an object state.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct OffsetPlane {
    /// The concrete byte cache.
    concrete_store: Vec<u8>,
    /// Upper bound for the concrete store length.
    /// The store may be materialized smaller and is grown to the bound
    /// before handing the bytes to external code.
    size_bound: u64,
    /// The byte value used to pad the concrete store when it is grown.
    initial_value: u8,
    /// Sparse symbolic overlay: bytes listed here are symbolic.
    symbolic_bytes: BTreeMap<u64, Expression>,
}

impl ObjectState {
    /// Create a new object state of the given concrete size,
    /// with all bytes initialized to `initial_value`.
    pub fn new(size: u64, initial_value: u8) -> ObjectState {
        ObjectState {
            inner: Arc::new(Inner {
                read_only: false,
                copy_on_write_owner: NO_OWNER,
                offset_plane: OffsetPlane {
                    concrete_store: vec![initial_value; size as usize],
                    size_bound: size,
                    initial_value,
                    symbolic_bytes: BTreeMap::new(),
                },
            }),
        }
    }

    /// Create a new object state holding the given concrete bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> ObjectState {
        ObjectState {
            inner: Arc::new(Inner {
                read_only: false,
                copy_on_write_owner: NO_OWNER,
                offset_plane: OffsetPlane {
                    size_bound: bytes.len() as u64,
                    concrete_store: bytes,
                    initial_value: 0,
                    symbolic_bytes: BTreeMap::new(),
                },
            }),
        }
    }

    /// Return whether the state is read-only.
    pub fn read_only(&self) -> bool {
        self.inner.read_only
    }

    /// Mark the state as read-only.
    pub fn mark_read_only(&mut self) {
        Arc::make_mut(&mut self.inner).read_only = true;
    }

    /// Get the copy-on-write owner tag of the state.
    /// [`NO_OWNER`] means that no address space has claimed the state yet.
    pub fn cow_owner(&self) -> u64 {
        self.inner.copy_on_write_owner
    }

    /// Stamp the state with a new copy-on-write owner.
    pub(super) fn set_cow_owner(&mut self, owner: u64) {
        Arc::make_mut(&mut self.inner).copy_on_write_owner = owner;
    }

    /// Get the concrete byte cache of the state.
    pub fn concrete_store(&self) -> &[u8] {
        &self.inner.offset_plane.concrete_store
    }

    /// Get the upper bound for the concrete store length.
    pub fn size_bound(&self) -> u64 {
        self.inner.offset_plane.size_bound
    }

    /// Get the padding byte used when the concrete store is grown.
    pub fn initial_value(&self) -> u8 {
        self.inner.offset_plane.initial_value
    }

    /// Read `len` concrete bytes starting at the given offset.
    ///
    /// Panics if the range lies outside the concrete store.
    pub fn read_concrete(&self, offset: u64, len: usize) -> &[u8] {
        let start = offset as usize;
        &self.inner.offset_plane.concrete_store[start..start + len]
    }

    /// Write concrete bytes at the given offset.
    /// Any symbolic overlay entries for the written bytes are removed,
    /// since the bytes are now known concretely.
    ///
    /// Panics if the state is read-only or the range lies outside the concrete store.
    pub fn write_concrete(&mut self, offset: u64, bytes: &[u8]) {
        assert!(!self.read_only(), "write to read-only object state");
        let inner = Arc::make_mut(&mut self.inner);
        let start = offset as usize;
        inner.offset_plane.concrete_store[start..start + bytes.len()].copy_from_slice(bytes);
        for position in offset..offset + bytes.len() as u64 {
            inner.offset_plane.symbolic_bytes.remove(&position);
        }
    }

    /// Overwrite the whole concrete byte cache with the given bytes
    /// without touching the symbolic overlay.
    ///
    /// This is the access path of external concrete I/O:
    /// bytes that are symbolic keep their symbolic value,
    /// their concrete cache byte is meaningless anyway.
    ///
    /// Panics if the state is read-only
    /// or if the byte count differs from the current store length.
    pub fn overwrite_concrete_store(&mut self, bytes: &[u8]) {
        assert!(!self.read_only(), "write to read-only object state");
        let inner = Arc::make_mut(&mut self.inner);
        assert_eq!(bytes.len(), inner.offset_plane.concrete_store.len());
        inner.offset_plane.concrete_store.copy_from_slice(bytes);
    }

    /// Mark the byte at the given offset as symbolic with the given 1-byte expression.
    ///
    /// Panics if the state is read-only or the expression is not byte-sized.
    pub fn write_symbolic_byte(&mut self, offset: u64, expr: Expression) {
        assert!(!self.read_only(), "write to read-only object state");
        assert_eq!(expr.bytesize(), ByteSize::new(1));
        let inner = Arc::make_mut(&mut self.inner);
        inner.offset_plane.symbolic_bytes.insert(offset, expr);
    }

    /// Get the value of the byte at the given offset as an expression:
    /// its symbolic overlay entry if the byte is symbolic,
    /// the constant from the concrete cache otherwise.
    pub fn byte_expr(&self, offset: u64) -> Expression {
        match self.inner.offset_plane.symbolic_bytes.get(&offset) {
            Some(expr) => expr.clone(),
            None => Expression::Const(Bitvector::from_u8(
                self.inner.offset_plane.concrete_store[offset as usize],
            )),
        }
    }

    /// Return whether the byte at the given offset is symbolic.
    pub fn is_byte_symbolic(&self, offset: u64) -> bool {
        self.inner.offset_plane.symbolic_bytes.contains_key(&offset)
    }

    /// Raise the size bound of the concrete store.
    ///
    /// Panics if the new bound is smaller than the current one;
    /// the bound is monotonically non-decreasing over the lifetime of a state.
    pub fn set_size_bound(&mut self, bound: u64) {
        let inner = Arc::make_mut(&mut self.inner);
        assert!(
            bound >= inner.offset_plane.size_bound,
            "the concrete store size bound must not shrink"
        );
        inner.offset_plane.size_bound = bound;
    }

    /// Grow the concrete store to its size bound,
    /// padding new bytes with the initial value.
    ///
    /// Panics if the state is read-only.
    pub fn grow_concrete_store_to_bound(&mut self) {
        assert!(!self.read_only(), "write to read-only object state");
        let inner = Arc::make_mut(&mut self.inner);
        let bound = inner.offset_plane.size_bound as usize;
        assert!(inner.offset_plane.concrete_store.len() <= bound);
        let padding = inner.offset_plane.initial_value;
        inner.offset_plane.concrete_store.resize(bound, padding);
    }

    /// Return whether two states have equal contents,
    /// ignoring the copy-on-write owner tag.
    pub fn contents_eq(&self, other: &ObjectState) -> bool {
        self.inner.read_only == other.inner.read_only
            && self.inner.offset_plane == other.inner.offset_plane
    }
}
