//! The address space of one execution path and the pointer resolution algorithms.
//!
//! An address space owns two persistent maps:
//! the object map binding each [`MemoryObject`](super::MemoryObject) to its current [`ObjectState`],
//! ordered by base address,
//! and the segment map from segment ids to their registered objects.
//! Forking an execution path clones both maps by reference,
//! so the actual byte contents stay shared until one of the paths writes.
//!
//! Pointer resolution comes in two flavours:
//! [`resolve_one`](AddressSpace::resolve_one) returns a single candidate object
//! (the executor then typically forks on it),
//! while [`resolve`](AddressSpace::resolve) enumerates all candidates
//! up to a configurable cap and wall-clock budget.
//! Both interleave ordered map traversal with solver queries:
//! a concrete example value obtained from the solver positions the scan,
//! `may_be_true` bounds checks accept candidates
//! and `must_be_true` comparisons against object base addresses
//! prune the rest of the scan direction.

use super::{MemoryObjectRef, ObjectState, PersistentMap, Pointer, NO_OWNER};
use crate::expr::Expression;
use crate::prelude::*;
use crate::solver::{ConstraintSet, SolverFailure, SolverOracle, SolverResult};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

#[cfg(test)]
mod tests;

/// Source of copy-on-write keys.
/// Key 0 is reserved as the "no owner" sentinel, so the counter starts at 1.
static COW_DOMAIN: AtomicU64 = AtomicU64::new(1);

fn fresh_cow_key() -> u64 {
    COW_DOMAIN.fetch_add(1, AtomicOrdering::Relaxed)
}

/// One possible referent of a pointer:
/// a memory object together with its current state in the address space.
pub type ObjectPair = (MemoryObjectRef, ObjectState);

/// The list of candidate objects collected by a multi-resolution.
pub type ResolutionList = Vec<ObjectPair>;

/// The outcome qualifier of a multi-resolution.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ResolveStatus {
    /// The search ran to completion; the resolution list contains every candidate.
    Complete,
    /// The search was truncated; the resolution list may be missing candidates.
    Incomplete(IncompleteReason),
}

impl ResolveStatus {
    /// Return whether the search was truncated.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, ResolveStatus::Incomplete(_))
    }
}

/// Why a multi-resolution was truncated.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum IncompleteReason {
    /// A solver query failed or hit its per-query budget.
    SolverFailure,
    /// The operator interrupted a solver query.
    /// The executor is expected to wind down the whole run;
    /// only the outermost driver may re-raise the interrupt at the platform level.
    Interrupted,
    /// The wall-clock budget of the resolution was exhausted.
    Timeout,
    /// The resolution list reached the configured cap.
    ResolutionCap,
}

impl From<SolverFailure> for IncompleteReason {
    fn from(failure: SolverFailure) -> IncompleteReason {
        match failure {
            SolverFailure::Interrupted => IncompleteReason::Interrupted,
            SolverFailure::Failure | SolverFailure::Timeout => IncompleteReason::SolverFailure,
        }
    }
}

/// Verdict of a bounds check against one candidate object during multi-resolution.
enum CheckResult {
    /// The pointer provably resolves to the checked object alone; stop searching.
    UniqueHit,
    /// The search must be abandoned.
    Incomplete(IncompleteReason),
    /// Keep scanning.
    Continue,
}

/// Configurable parameters for multi-resolution.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Default)]
pub struct Config {
    /// Upper bound for the number of candidates a single `resolve` call may return.
    /// 0 means unbounded.
    pub max_resolutions: usize,
    /// Wall-clock budget in milliseconds for a single `resolve` call.
    /// 0 means unbounded.
    pub timeout_millis: u64,
}

impl Config {
    /// The wall-clock budget as a duration, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_millis == 0 {
            None
        } else {
            Some(Duration::from_millis(self.timeout_millis))
        }
    }
}

fn out_of_time(timer: Instant, timeout: Option<Duration>) -> bool {
    match timeout {
        Some(limit) => timer.elapsed() > limit,
        None => false,
    }
}

/// The memory map of one symbolic execution path.
///
/// Address spaces are deliberately not `Clone`:
/// new spaces for forked paths must be created through [`fork`](AddressSpace::fork),
/// which keeps the copy-on-write keys of all live spaces distinct.
#[derive(Debug)]
pub struct AddressSpace {
    /// The copy-on-write key of this address space.
    /// An object state is writable in place exactly if its owner tag equals this key.
    cow_key: u64,
    /// All bound objects, ordered by base address.
    objects: PersistentMap<MemoryObjectRef, ObjectState>,
    /// All segmented objects, keyed by segment id.
    /// Every object in this map is also bound in `objects`.
    segment_map: PersistentMap<u64, MemoryObjectRef>,
}

impl Default for AddressSpace {
    fn default() -> Self {
        AddressSpace::new()
    }
}

impl AddressSpace {
    /// Create a new, empty address space.
    pub fn new() -> AddressSpace {
        AddressSpace {
            cow_key: fresh_cow_key(),
            objects: PersistentMap::new(),
            segment_map: PersistentMap::new(),
        }
    }

    /// Get the copy-on-write key of this address space.
    pub fn cow_key(&self) -> u64 {
        self.cow_key
    }

    /// Fork the address space for a new execution path.
    ///
    /// The maps are cloned by reference, so this is O(1).
    /// Both the original and the forked space receive fresh copy-on-write keys:
    /// retiring the original key ensures that neither path
    /// can write in place to a state that is now shared between them.
    pub fn fork(&mut self) -> AddressSpace {
        self.cow_key = fresh_cow_key();
        AddressSpace {
            cow_key: fresh_cow_key(),
            objects: self.objects.clone(),
            segment_map: self.segment_map.clone(),
        }
    }

    /// Get the number of bound objects.
    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    /// Get an iterator over all bound objects and their states,
    /// in ascending base address order.
    pub fn iter(&self) -> impl Iterator<Item = (&MemoryObjectRef, &ObjectState)> {
        self.objects.iter()
    }

    /// Bind a memory object to its initial state.
    ///
    /// Panics if the state already has a copy-on-write owner,
    /// i.e. if it is already bound in some address space.
    pub fn bind_object(&mut self, mo: MemoryObjectRef, mut os: ObjectState) {
        assert_eq!(os.cow_owner(), NO_OWNER, "object state already has an owner");
        os.set_cow_owner(self.cow_key);
        if mo.segment() != 0 {
            self.segment_map = self.segment_map.replace(mo.segment(), mo.clone());
        }
        self.objects = self.objects.replace(mo, os);
    }

    /// Remove a memory object and its state from the address space.
    /// The object may be deallocated afterwards if this was its last handle.
    pub fn unbind_object(&mut self, mo: &MemoryObjectRef) {
        if mo.segment() != 0 {
            self.segment_map = self.segment_map.remove(&mo.segment());
        }
        self.objects = self.objects.remove(mo);
    }

    /// Look up the state bound to the given memory object.
    pub fn find_object(&self, mo: &MemoryObjectRef) -> Option<&ObjectState> {
        self.objects.lookup(mo).map(|(_, os)| os)
    }

    /// Look up the memory object registered under the given segment id.
    pub fn find_segment(&self, segment: u64) -> Option<&MemoryObjectRef> {
        self.segment_map.lookup(&segment).map(|(_, mo)| mo)
    }

    /// Get a writeable handle to the state bound to `mo`.
    ///
    /// If this address space still owns the state, the handle wraps it directly.
    /// Otherwise the state is shared with forked address spaces:
    /// the handle then wraps a copy stamped with this space's copy-on-write key.
    /// In both cases the handle rebinds the (possibly mutated) state
    /// into the object map when it is dropped,
    /// so writes through the handle are never visible to other address spaces.
    ///
    /// `os` is typically a clone of the state returned by
    /// [`find_object`](AddressSpace::find_object).
    ///
    /// Panics if the state is read-only.
    pub fn get_writeable(&mut self, mo: &MemoryObjectRef, os: &ObjectState) -> WriteableState<'_> {
        assert!(!os.read_only(), "cannot write to a read-only object state");
        let mut state = os.clone();
        if state.cow_owner() != self.cow_key {
            // stamping the owner copies the shared contents
            state.set_cow_owner(self.cow_key);
        }
        WriteableState {
            space: self,
            object: mo.clone(),
            state: Some(state),
        }
    }

    /// Resolve a fully constant pointer to the object it points into.
    ///
    /// A non-zero segment is looked up in the segment map;
    /// offset bounds are not checked here,
    /// segmented pointers carry their own offset-range guarantees in the caller.
    /// Segment zero treats the offset as a raw address
    /// and accepts the nearest object at or below it
    /// if the address falls inside the object
    /// (or aliases a zero-sized object exactly).
    /// Objects with symbolic size are never matched by raw addresses.
    ///
    /// Panics if the pointer is not fully constant.
    pub fn resolve_constant_address(&self, pointer: &Pointer) -> Option<ObjectPair> {
        let segment = pointer
            .constant_segment()
            .expect("pointer segment must be constant");
        if segment != 0 {
            let mo = self.find_segment(segment)?;
            let (mo, os) = self
                .objects
                .lookup(mo)
                .expect("segmented object must be bound in the object map");
            Some((mo.clone(), os.clone()))
        } else {
            let address = pointer
                .constant_offset()
                .expect("pointer offset must be constant");
            let (mo, os) = self
                .objects
                .lookup_previous_by(|key| key.address().cmp(&address))?;
            // objects with symbolic size can only be accessed through segmented pointers
            let size = mo.const_size()?;
            if (size == 0 && address == mo.address()) || address.wrapping_sub(mo.address()) < size
            {
                Some((mo.clone(), os.clone()))
            } else {
                None
            }
        }
    }

    /// Resolve a pointer to a single candidate object.
    ///
    /// A symbolic segment is concretized with a solver model first.
    /// For raw-address pointers the solver also provides an example offset;
    /// the object containing the example is accepted directly when its size is constant
    /// (the common in-bounds case),
    /// otherwise a bounded bidirectional scan around the example
    /// asks the solver for the first object the pointer may point into.
    ///
    /// Returns `Ok(None)` if the pointer cannot point into any object.
    /// A solver failure aborts the resolution and is returned as an error;
    /// the caller must treat the resolution as unanswered, not as "no object".
    pub fn resolve_one(
        &self,
        constraints: &ConstraintSet,
        solver: &mut dyn SolverOracle,
        pointer: &Pointer,
    ) -> SolverResult<Option<ObjectPair>> {
        if pointer.is_constant() {
            return Ok(self.resolve_constant_address(pointer));
        }
        let width = pointer.bytesize();
        let segment = match pointer.constant_segment() {
            Some(segment) => segment,
            None => {
                let example = solver.get_value(constraints, pointer.segment())?;
                example
                    .try_to_u64()
                    .expect("pointer segment exceeds 64 bit")
            }
        };
        if segment != 0 {
            let concretized = Pointer::new(
                Expression::const_from_u64(segment, width),
                pointer.offset().clone(),
            );
            return Ok(self.resolve_constant_address(&concretized));
        }

        // try cheap search, will succeed for any inbounds pointer
        let example = solver
            .get_value(constraints, pointer.offset())?
            .try_to_u64()
            .expect("pointer offset exceeds 64 bit");
        if let Some((mo, os)) = self
            .objects
            .lookup_previous_by(|key| key.address().cmp(&example))
        {
            if let Some(size) = mo.const_size() {
                if example.wrapping_sub(mo.address()) < size {
                    return Ok(Some((mo.clone(), os.clone())));
                }
            }
        }

        // didn't work, now we have to search

        // search backwards, nearest object below the example first
        for (mo, os) in self
            .objects
            .iter_at_most_rev_by(|key| key.address().cmp(&example))
        {
            if solver.may_be_true(constraints, &mo.bounds_check_pointer(pointer))? {
                return Ok(Some((mo.clone(), os.clone())));
            }
            // every earlier object lies at a strictly smaller base address
            let past_base = pointer.offset().clone().uge(mo.base_expr(width));
            if solver.must_be_true(constraints, &past_base)? {
                break;
            }
        }

        // search forwards
        for (mo, os) in self
            .objects
            .iter_upper_bound_by(|key| key.address().cmp(&example))
        {
            let before_base = pointer.offset().clone().ult(mo.base_expr(width));
            if solver.must_be_true(constraints, &before_base)? {
                break;
            }
            if solver.may_be_true(constraints, &mo.bounds_check_pointer(pointer))? {
                return Ok(Some((mo.clone(), os.clone())));
            }
        }

        Ok(None)
    }

    /// Check one candidate object during multi-resolution.
    ///
    /// Asking `may_be_true` before `must_be_true` on the first hit
    /// proves the common unique resolution in exactly two queries,
    /// without ever scanning the neighbors of the candidate.
    fn check_pointer_in_object(
        &self,
        constraints: &ConstraintSet,
        solver: &mut dyn SolverOracle,
        pointer: &Pointer,
        op: ObjectPair,
        rl: &mut ResolutionList,
        max_resolutions: usize,
    ) -> CheckResult {
        let in_bounds = op.0.bounds_check_pointer(pointer);
        match solver.may_be_true(constraints, &in_bounds) {
            Err(failure) => return CheckResult::Incomplete(failure.into()),
            Ok(false) => return CheckResult::Continue,
            Ok(true) => (),
        }
        rl.push(op);
        if rl.len() == 1 {
            match solver.must_be_true(constraints, &in_bounds) {
                Err(failure) => return CheckResult::Incomplete(failure.into()),
                Ok(true) => return CheckResult::UniqueHit,
                Ok(false) => (),
            }
        } else if rl.len() == max_resolutions {
            return CheckResult::Incomplete(IncompleteReason::ResolutionCap);
        }
        CheckResult::Continue
    }

    /// Multi-resolution for a pointer whose segment expression is constant.
    ///
    /// A non-zero segment reduces to a single constant-address resolution
    /// and is always complete.
    /// Segment zero performs the bidirectional scan around a solver-provided
    /// example offset, accumulating every candidate the pointer may point into.
    pub fn resolve_constant_segment(
        &self,
        constraints: &ConstraintSet,
        solver: &mut dyn SolverOracle,
        pointer: &Pointer,
        rl: &mut ResolutionList,
        max_resolutions: usize,
        timeout: Option<Duration>,
    ) -> ResolveStatus {
        let segment = pointer
            .constant_segment()
            .expect("pointer segment must be constant");
        if segment != 0 {
            if let Some(pair) = self.resolve_constant_address(pointer) {
                rl.push(pair);
            }
            return ResolveStatus::Complete;
        }

        let timer = Instant::now();
        let width = pointer.bytesize();
        let example = match solver.get_value(constraints, pointer.offset()) {
            Ok(value) => value.try_to_u64().expect("pointer offset exceeds 64 bit"),
            Err(failure) => return ResolveStatus::Incomplete(failure.into()),
        };

        // search backwards, starting with the object the pointer *should* be within
        for (mo, os) in self
            .objects
            .iter_at_most_rev_by(|key| key.address().cmp(&example))
        {
            if out_of_time(timer, timeout) {
                return ResolveStatus::Incomplete(IncompleteReason::Timeout);
            }
            let op = (mo.clone(), os.clone());
            match self.check_pointer_in_object(constraints, solver, pointer, op, rl, max_resolutions)
            {
                CheckResult::UniqueHit => return ResolveStatus::Complete,
                CheckResult::Incomplete(reason) => return ResolveStatus::Incomplete(reason),
                CheckResult::Continue => (),
            }
            let past_base = pointer.offset().clone().uge(mo.base_expr(width));
            match solver.must_be_true(constraints, &past_base) {
                Err(failure) => return ResolveStatus::Incomplete(failure.into()),
                Ok(true) => break,
                Ok(false) => (),
            }
        }

        // search forwards
        for (mo, os) in self
            .objects
            .iter_upper_bound_by(|key| key.address().cmp(&example))
        {
            if out_of_time(timer, timeout) {
                return ResolveStatus::Incomplete(IncompleteReason::Timeout);
            }
            let before_base = pointer.offset().clone().ult(mo.base_expr(width));
            match solver.must_be_true(constraints, &before_base) {
                Err(failure) => return ResolveStatus::Incomplete(failure.into()),
                Ok(true) => break,
                Ok(false) => (),
            }
            let op = (mo.clone(), os.clone());
            match self.check_pointer_in_object(constraints, solver, pointer, op, rl, max_resolutions)
            {
                CheckResult::UniqueHit => return ResolveStatus::Complete,
                CheckResult::Incomplete(reason) => return ResolveStatus::Incomplete(reason),
                CheckResult::Continue => (),
            }
        }

        ResolveStatus::Complete
    }

    /// Resolve a pointer to the bounded list of all objects it may point into.
    ///
    /// If the segment is symbolic, the raw-address candidates are collected first
    /// (when segment zero is feasible at all),
    /// followed by every segmented object whose segment id the pointer's segment
    /// expression may equal.
    /// The search honors the wall-clock `timeout` and the `max_resolutions` cap
    /// (0 means unbounded); candidates found so far stay in `rl`
    /// even when the search is truncated.
    pub fn resolve(
        &self,
        constraints: &ConstraintSet,
        solver: &mut dyn SolverOracle,
        pointer: &Pointer,
        rl: &mut ResolutionList,
        max_resolutions: usize,
        timeout: Option<Duration>,
    ) -> ResolveStatus {
        if pointer.constant_segment().is_some() {
            return self.resolve_constant_segment(
                constraints,
                solver,
                pointer,
                rl,
                max_resolutions,
                timeout,
            );
        }

        let timer = Instant::now();
        let width = pointer.bytesize();
        let segment_may_be_zero =
            match solver.may_be_true(constraints, &pointer.segment().clone().eq_zero()) {
                Ok(answer) => answer,
                Err(failure) => return ResolveStatus::Incomplete(failure.into()),
            };
        if segment_may_be_zero {
            let raw_pointer = Pointer::new(Expression::zero(width), pointer.offset().clone());
            let status = self.resolve_constant_segment(
                constraints,
                solver,
                &raw_pointer,
                rl,
                max_resolutions,
                timeout,
            );
            if status.is_incomplete() {
                return status;
            }
        }
        // TODO inefficient: a range filter on the segment expression could skip
        // most segments without a solver query
        for (segment_id, mo) in self.segment_map.iter() {
            if out_of_time(timer, timeout) {
                return ResolveStatus::Incomplete(IncompleteReason::Timeout);
            }
            let segment_expr = Expression::const_from_u64(*segment_id, width);
            let is_this_segment = pointer.segment().clone().eq(segment_expr);
            match solver.may_be_true(constraints, &is_this_segment) {
                Err(failure) => return ResolveStatus::Incomplete(failure.into()),
                Ok(false) => (),
                Ok(true) => {
                    let (mo, os) = self
                        .objects
                        .lookup(mo)
                        .expect("segmented object must be bound in the object map");
                    rl.push((mo.clone(), os.clone()));
                    if rl.len() == max_resolutions {
                        return ResolveStatus::Incomplete(IncompleteReason::ResolutionCap);
                    }
                }
            }
        }
        ResolveStatus::Complete
    }

    /// Copy the concrete byte caches of all managed objects out to host memory,
    /// growing each cache to its size bound first.
    ///
    /// Together with [`copy_in_concretes`](AddressSpace::copy_in_concretes)
    /// this is the mechanism for calling uninstrumented native code
    /// on engine-managed memory.
    /// Symbolic bytes are passed as their stale concrete cache values;
    /// this is a documented best-effort contract.
    /// User-specified and read-only objects are skipped.
    ///
    /// # Safety
    ///
    /// For every non-user-specified, non-read-only object,
    /// `mo.address()` must point to at least `size_bound` bytes
    /// of valid writable host memory.
    pub unsafe fn copy_out_concretes(&mut self) {
        let objects: Vec<ObjectPair> = self
            .objects
            .iter()
            .filter(|(mo, os)| !mo.is_user_specified() && !os.read_only())
            .map(|(mo, os)| (mo.clone(), os.clone()))
            .collect();
        for (mo, os) in objects {
            if (os.concrete_store().len() as u64) < os.size_bound() {
                let mut writeable = self.get_writeable(&mo, &os);
                writeable.grow_concrete_store_to_bound();
                let store = writeable.concrete_store();
                std::ptr::copy_nonoverlapping(store.as_ptr(), mo.address() as *mut u8, store.len());
            } else {
                let store = os.concrete_store();
                std::ptr::copy_nonoverlapping(store.as_ptr(), mo.address() as *mut u8, store.len());
            }
        }
    }

    /// Copy host memory back into the concrete byte caches of all managed objects
    /// after a call to external code.
    ///
    /// Returns `false` if host bytes of a read-only object changed;
    /// the executor decides whether that terminates the path.
    /// Symbolic overlays are left untouched:
    /// external writes clobber the affected bytes only concretely.
    ///
    /// # Safety
    ///
    /// For every non-user-specified object,
    /// `mo.address()` must point to at least `concrete_store().len()` bytes
    /// of valid readable host memory.
    pub unsafe fn copy_in_concretes(&mut self) -> bool {
        let objects: Vec<ObjectPair> = self
            .objects
            .iter()
            .filter(|(mo, _)| !mo.is_user_specified())
            .map(|(mo, os)| (mo.clone(), os.clone()))
            .collect();
        for (mo, os) in objects {
            if !self.copy_in_concrete(&mo, &os, mo.address()) {
                return false;
            }
        }
        true
    }

    /// Copy host memory at `src_address` back into the concrete byte cache
    /// of a single object, if the bytes differ.
    ///
    /// Returns `false` if the bytes differ but the object state is read-only.
    ///
    /// # Safety
    ///
    /// `src_address` must point to at least `os.concrete_store().len()` bytes
    /// of valid readable host memory.
    pub unsafe fn copy_in_concrete(
        &mut self,
        mo: &MemoryObjectRef,
        os: &ObjectState,
        src_address: u64,
    ) -> bool {
        let host =
            std::slice::from_raw_parts(src_address as *const u8, os.concrete_store().len());
        if host != os.concrete_store() {
            if os.read_only() {
                return false;
            }
            let mut writeable = self.get_writeable(mo, os);
            writeable.overwrite_concrete_store(host);
        }
        true
    }

    /// Get a compact json-representation of the address space.
    /// Intended for pretty printing, not useable for serialization/deserialization.
    pub fn to_json_compact(&self) -> serde_json::Value {
        let mut objects = serde_json::Map::new();
        for (mo, os) in self.objects.iter() {
            objects.insert(
                format!("{mo}"),
                serde_json::json!({
                    "segment": mo.segment(),
                    "size": format!("{:?}", mo.size()),
                    "read_only": os.read_only(),
                    "owner": os.cow_owner(),
                    "concrete_bytes": os.concrete_store().len(),
                }),
            );
        }
        serde_json::Value::Object(objects)
    }
}

/// A writeable handle to an object state,
/// returned by [`AddressSpace::get_writeable`].
///
/// The handle dereferences to the wrapped [`ObjectState`].
/// When it is dropped, the state is rebound into the object map of the address space,
/// replacing the previously bound (possibly still shared) state.
pub struct WriteableState<'a> {
    space: &'a mut AddressSpace,
    object: MemoryObjectRef,
    state: Option<ObjectState>,
}

impl Deref for WriteableState<'_> {
    type Target = ObjectState;

    fn deref(&self) -> &ObjectState {
        self.state.as_ref().unwrap()
    }
}

impl DerefMut for WriteableState<'_> {
    fn deref_mut(&mut self) -> &mut ObjectState {
        self.state.as_mut().unwrap()
    }
}

impl Drop for WriteableState<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            self.space.objects = self.space.objects.replace(self.object.clone(), state);
        }
    }
}
