use crate::expr::{parsing, Expression, VariableAssignment};
use crate::memory::*;
use crate::prelude::*;
use crate::solver::mock::FiniteModelSolver;
use crate::solver::{ConstraintSet, InstrumentedSolver, SolverFailure};
use crate::{bitvec, expr};
use std::time::Duration;

fn new_object(address: u64, size: u64) -> MemoryObjectRef {
    MemoryObject::new(address, Expression::const_from_u64(size, ByteSize::new(8))).into()
}

fn new_segmented_object(address: u64, size: u64, segment: u64) -> MemoryObjectRef {
    MemoryObject::with_segment(address, Expression::const_from_u64(size, ByteSize::new(8)), segment)
        .into()
}

/// Models binding the symbolic offset `x:8` to the given values.
fn offset_models(values: &[u64]) -> Vec<VariableAssignment> {
    values
        .iter()
        .map(|&value| {
            [(parsing::parse_variable("x:8"), Bitvector::from_u64(value))]
                .into_iter()
                .collect()
        })
        .collect()
}

/// Models binding the symbolic segment `s:8` and offset `x:8` to the given pairs.
fn pointer_models(pairs: &[(u64, u64)]) -> Vec<VariableAssignment> {
    pairs
        .iter()
        .map(|&(segment, offset)| {
            [
                (parsing::parse_variable("s:8"), Bitvector::from_u64(segment)),
                (parsing::parse_variable("x:8"), Bitvector::from_u64(offset)),
            ]
            .into_iter()
            .collect()
        })
        .collect()
}

/// A raw-address pointer with the symbolic offset `x:8`.
fn raw_symbolic_pointer() -> Pointer {
    Pointer::new(Expression::zero(ByteSize::new(8)), expr!("x:8"))
}

/// A pointer with symbolic segment `s:8` and symbolic offset `x:8`.
fn fully_symbolic_pointer() -> Pointer {
    Pointer::new(expr!("s:8"), expr!("x:8"))
}

fn addresses_of(rl: &ResolutionList) -> Vec<u64> {
    rl.iter().map(|(mo, _)| mo.address()).collect()
}

#[test]
fn constant_inbounds_resolution() {
    let mut space = AddressSpace::new();
    let mo = new_object(0x1000, 16);
    space.bind_object(mo.clone(), ObjectState::new(16, 0));

    let (found, _) = space
        .resolve_constant_address(&Pointer::from_address(bitvec!("0x1004:8")))
        .unwrap();
    assert!(found.ptr_eq(&mo));

    // base address is inbounds, one-past-the-end and below-base are not
    assert!(space
        .resolve_constant_address(&Pointer::from_address(bitvec!("0x1000:8")))
        .is_some());
    assert!(space
        .resolve_constant_address(&Pointer::from_address(bitvec!("0x1010:8")))
        .is_none());
    assert!(space
        .resolve_constant_address(&Pointer::from_address(bitvec!("0xfff:8")))
        .is_none());
}

#[test]
fn constant_resolution_matches_bounds_predicate() {
    let mut space = AddressSpace::new();
    space.bind_object(new_object(0x1000, 16), ObjectState::new(16, 0));
    for address in 0xff0..0x1020u64 {
        let accepted = space
            .resolve_constant_address(&Pointer::from_address(Bitvector::from_u64(address)))
            .is_some();
        assert_eq!(accepted, address.wrapping_sub(0x1000) < 16);
    }
}

#[test]
fn zero_size_object_aliases_only_its_base() {
    let mut space = AddressSpace::new();
    space.bind_object(new_object(0x2000, 0), ObjectState::new(0, 0));
    assert!(space
        .resolve_constant_address(&Pointer::from_address(bitvec!("0x2000:8")))
        .is_some());
    assert!(space
        .resolve_constant_address(&Pointer::from_address(bitvec!("0x2001:8")))
        .is_none());
}

#[test]
fn segmented_lookup_skips_bounds() {
    let mut space = AddressSpace::new();
    let mo = new_segmented_object(0x3000, 0x20, 7);
    space.bind_object(mo.clone(), ObjectState::new(0x20, 0));

    // the offset is far outside the object, the segment alone decides
    let pointer = Pointer::new(expr!("0x7:8"), expr!("0x5000:8"));
    let (found, _) = space.resolve_constant_address(&pointer).unwrap();
    assert!(found.ptr_eq(&mo));

    let unknown_segment = Pointer::new(expr!("0x8:8"), expr!("0x0:8"));
    assert!(space.resolve_constant_address(&unknown_segment).is_none());
}

#[test]
fn symbolic_size_objects_are_unreachable_from_raw_addresses() {
    let mut space = AddressSpace::new();
    let raw = MemoryObjectRef::from(MemoryObject::new(0x4000, expr!("n:8")));
    let segmented =
        MemoryObjectRef::from(MemoryObject::with_segment(0x5000, expr!("n:8"), 3));
    space.bind_object(raw, ObjectState::new(0, 0));
    space.bind_object(segmented.clone(), ObjectState::new(0, 0));

    assert!(space
        .resolve_constant_address(&Pointer::from_address(bitvec!("0x4000:8")))
        .is_none());
    // through its segment the object is reachable regardless of size
    let (found, _) = space
        .resolve_constant_address(&Pointer::new(expr!("0x3:8"), expr!("0x0:8")))
        .unwrap();
    assert!(found.ptr_eq(&segmented));
}

#[test]
fn resolve_one_takes_the_concrete_example_fast_path() {
    let mut space = AddressSpace::new();
    for address in [0x100, 0x200, 0x300] {
        space.bind_object(new_object(address, 0x40), ObjectState::new(0x40, 0));
    }
    let mut solver =
        InstrumentedSolver::new(FiniteModelSolver::new(offset_models(&[0x205, 0x210])));
    let constraints = ConstraintSet::new();

    let resolution = space
        .resolve_one(&constraints, &mut solver, &raw_symbolic_pointer())
        .unwrap()
        .unwrap();
    assert_eq!(resolution.0.address(), 0x200);
    // one example value, no satisfiability queries
    assert_eq!(solver.stats().value_queries, 1);
    assert_eq!(solver.stats().may_be_true_queries, 0);
    assert_eq!(solver.stats().must_be_true_queries, 0);
}

#[test]
fn resolve_one_scans_forward_when_the_example_is_in_a_gap() {
    let mut space = AddressSpace::new();
    space.bind_object(new_object(0x100, 0x40), ObjectState::new(0x40, 0));
    space.bind_object(new_object(0x200, 0x40), ObjectState::new(0x40, 0));

    // the first model lies in the gap between the objects, the second inside the second object
    let mut solver = FiniteModelSolver::new(offset_models(&[0x1f0, 0x205]));
    let constraints = ConstraintSet::new();
    let resolution = space
        .resolve_one(&constraints, &mut solver, &raw_symbolic_pointer())
        .unwrap()
        .unwrap();
    assert_eq!(resolution.0.address(), 0x200);
}

#[test]
fn resolve_one_scans_backward_from_an_example_past_all_objects() {
    let mut space = AddressSpace::new();
    space.bind_object(new_object(0x100, 0x40), ObjectState::new(0x40, 0));
    space.bind_object(new_object(0x200, 0x40), ObjectState::new(0x40, 0));

    let mut solver = FiniteModelSolver::new(offset_models(&[0x3f0, 0x230]));
    let constraints = ConstraintSet::new();
    let resolution = space
        .resolve_one(&constraints, &mut solver, &raw_symbolic_pointer())
        .unwrap()
        .unwrap();
    assert_eq!(resolution.0.address(), 0x200);
}

#[test]
fn resolve_one_reports_unresolvable_pointers() {
    let mut space = AddressSpace::new();
    space.bind_object(new_object(0x100, 0x40), ObjectState::new(0x40, 0));
    space.bind_object(new_object(0x200, 0x40), ObjectState::new(0x40, 0));

    // the only model lies in the gap between the objects
    let mut solver = FiniteModelSolver::new(offset_models(&[0x1f0]));
    let constraints = ConstraintSet::new();
    let resolution = space
        .resolve_one(&constraints, &mut solver, &raw_symbolic_pointer())
        .unwrap();
    assert!(resolution.is_none());
}

#[test]
fn resolve_one_propagates_solver_failures() {
    let mut space = AddressSpace::new();
    space.bind_object(new_object(0x100, 0x40), ObjectState::new(0x40, 0));
    let mut solver = FiniteModelSolver::new(offset_models(&[0x105]))
        .with_failure_after(0, SolverFailure::Failure);
    let constraints = ConstraintSet::new();
    assert_eq!(
        space.resolve_one(&constraints, &mut solver, &raw_symbolic_pointer()),
        Err(SolverFailure::Failure)
    );
}

#[test]
fn unique_resolution_is_proven_with_two_queries() {
    let mut space = AddressSpace::new();
    for address in [0x100, 0x200, 0x300] {
        space.bind_object(new_object(address, 0x40), ObjectState::new(0x40, 0));
    }
    let mut solver = InstrumentedSolver::new(FiniteModelSolver::new(pointer_models(&[
        (0, 0x205),
        (0, 0x210),
    ])));
    let constraints = ConstraintSet::new();
    let mut rl = ResolutionList::new();

    let status = space.resolve(
        &constraints,
        &mut solver,
        &fully_symbolic_pointer(),
        &mut rl,
        0,
        None,
    );
    assert_eq!(status, ResolveStatus::Complete);
    assert_eq!(addresses_of(&rl), vec![0x200]);
    // segment feasibility check plus the fast-path uniqueness proof:
    // two may-be-true, one must-be-true, one example value
    assert_eq!(solver.stats().may_be_true_queries, 2);
    assert_eq!(solver.stats().must_be_true_queries, 1);
    assert_eq!(solver.stats().value_queries, 1);
}

#[test]
fn multi_resolution_collects_all_candidates() {
    let mut space = AddressSpace::new();
    for address in [0x100, 0x200, 0x300, 0x400] {
        space.bind_object(new_object(address, 0x40), ObjectState::new(0x40, 0));
    }
    let mut solver =
        FiniteModelSolver::new(offset_models(&[0x105, 0x205, 0x305, 0x405]));
    let constraints = ConstraintSet::new();
    let mut rl = ResolutionList::new();

    let status = space.resolve(
        &constraints,
        &mut solver,
        &raw_symbolic_pointer(),
        &mut rl,
        0,
        None,
    );
    assert_eq!(status, ResolveStatus::Complete);
    assert_eq!(addresses_of(&rl), vec![0x100, 0x200, 0x300, 0x400]);
}

#[test]
fn multi_resolution_honors_the_cap() {
    let mut space = AddressSpace::new();
    for address in [0x100, 0x200, 0x300, 0x400] {
        space.bind_object(new_object(address, 0x40), ObjectState::new(0x40, 0));
    }
    let mut solver =
        FiniteModelSolver::new(offset_models(&[0x105, 0x205, 0x305, 0x405]));
    let constraints = ConstraintSet::new();
    let mut rl = ResolutionList::new();

    let config: Config = serde_json::from_value(serde_json::json!({
        "max_resolutions": 2,
        "timeout_millis": 0,
    }))
    .unwrap();
    assert_eq!(config.timeout(), None);
    let status = space.resolve(
        &constraints,
        &mut solver,
        &raw_symbolic_pointer(),
        &mut rl,
        config.max_resolutions,
        config.timeout(),
    );
    assert_eq!(status, ResolveStatus::Incomplete(IncompleteReason::ResolutionCap));
    assert_eq!(rl.len(), 2);
}

#[test]
fn multi_resolution_times_out() {
    let mut space = AddressSpace::new();
    for index in 1..=100u64 {
        space.bind_object(new_object(0x1000 * index, 0x10), ObjectState::new(0x10, 0));
    }
    // one model below all objects, one above: neither scan direction can stop early
    let mut solver = FiniteModelSolver::new(offset_models(&[0x15, 0x100015]))
        .with_query_delay(Duration::from_millis(10));
    let constraints = ConstraintSet::new();
    let mut rl = ResolutionList::new();

    let status = space.resolve(
        &constraints,
        &mut solver,
        &raw_symbolic_pointer(),
        &mut rl,
        0,
        Some(Duration::from_millis(5)),
    );
    assert_eq!(status, ResolveStatus::Incomplete(IncompleteReason::Timeout));
    // the example query already exhausts the budget,
    // no object is scanned more than once before the timeout check fires
    assert!(solver.queries_issued() <= 3);
}

#[test]
fn multi_resolution_completes_without_a_timeout() {
    let mut space = AddressSpace::new();
    for index in 1..=100u64 {
        space.bind_object(new_object(0x1000 * index, 0x10), ObjectState::new(0x10, 0));
    }
    let mut solver = FiniteModelSolver::new(offset_models(&[0x15, 0x100015]));
    let constraints = ConstraintSet::new();
    let mut rl = ResolutionList::new();

    let status = space.resolve(
        &constraints,
        &mut solver,
        &raw_symbolic_pointer(),
        &mut rl,
        0,
        Some(Duration::from_secs(10)),
    );
    assert_eq!(status, ResolveStatus::Complete);
    assert!(rl.is_empty());
}

#[test]
fn multi_resolution_enumerates_feasible_segments() {
    let mut space = AddressSpace::new();
    space.bind_object(new_object(0x100, 0x40), ObjectState::new(0x40, 0));
    space.bind_object(new_segmented_object(0x5000, 0x20, 7), ObjectState::new(0x20, 0));
    space.bind_object(new_segmented_object(0x6000, 0x20, 9), ObjectState::new(0x20, 0));

    let mut solver = FiniteModelSolver::new(pointer_models(&[
        (0, 0x105),
        (7, 0x0),
        (9, 0x8),
    ]));
    let constraints = ConstraintSet::new();
    let mut rl = ResolutionList::new();

    let status = space.resolve(
        &constraints,
        &mut solver,
        &fully_symbolic_pointer(),
        &mut rl,
        0,
        None,
    );
    assert_eq!(status, ResolveStatus::Complete);
    let mut segments: Vec<u64> = rl.iter().map(|(mo, _)| mo.segment()).collect();
    segments.sort_unstable();
    assert_eq!(segments, vec![0, 7, 9]);
    // no duplicates
    assert_eq!(addresses_of(&rl).len(), 3);
}

#[test]
fn constant_nonzero_segment_resolution_is_complete() {
    let mut space = AddressSpace::new();
    let mo = new_segmented_object(0x5000, 0x20, 7);
    space.bind_object(mo.clone(), ObjectState::new(0x20, 0));
    let mut solver = FiniteModelSolver::new(Vec::new());
    let constraints = ConstraintSet::new();
    let mut rl = ResolutionList::new();

    let pointer = Pointer::new(expr!("0x7:8"), expr!("x:8"));
    let status =
        space.resolve_constant_segment(&constraints, &mut solver, &pointer, &mut rl, 0, None);
    assert_eq!(status, ResolveStatus::Complete);
    assert_eq!(rl.len(), 1);
    assert!(rl[0].0.ptr_eq(&mo));
    // no solver interaction is needed at all
    assert_eq!(solver.queries_issued(), 0);
}

#[test]
fn solver_failures_truncate_multi_resolution() {
    let mut space = AddressSpace::new();
    space.bind_object(new_object(0x100, 0x40), ObjectState::new(0x40, 0));
    let constraints = ConstraintSet::new();

    let mut failing = FiniteModelSolver::new(offset_models(&[0x105]))
        .with_failure_after(0, SolverFailure::Failure);
    let mut rl = ResolutionList::new();
    let status = space.resolve(
        &constraints,
        &mut failing,
        &raw_symbolic_pointer(),
        &mut rl,
        0,
        None,
    );
    assert_eq!(status, ResolveStatus::Incomplete(IncompleteReason::SolverFailure));
    assert!(rl.is_empty());

    let mut interrupted = FiniteModelSolver::new(offset_models(&[0x105]))
        .with_failure_after(0, SolverFailure::Interrupted);
    let mut rl = ResolutionList::new();
    let status = space.resolve(
        &constraints,
        &mut interrupted,
        &raw_symbolic_pointer(),
        &mut rl,
        0,
        None,
    );
    assert_eq!(status, ResolveStatus::Incomplete(IncompleteReason::Interrupted));
}

#[test]
fn binding_keeps_objects_and_segment_map_in_sync() {
    let mut space = AddressSpace::new();
    let plain = new_object(0x100, 0x10);
    let seg_a = new_segmented_object(0x200, 0x10, 3);
    let seg_b = new_segmented_object(0x300, 0x10, 5);
    space.bind_object(plain.clone(), ObjectState::new(0x10, 0));
    space.bind_object(seg_a.clone(), ObjectState::new(0x10, 0));
    space.bind_object(seg_b.clone(), ObjectState::new(0x10, 0));

    for (mo, _) in space.iter() {
        if mo.segment() != 0 {
            assert!(space.find_segment(mo.segment()).unwrap().ptr_eq(mo));
        }
    }

    space.unbind_object(&seg_a);
    assert!(space.find_object(&seg_a).is_none());
    assert!(space.find_segment(3).is_none());
    assert!(space.find_segment(5).is_some());
    assert_eq!(space.num_objects(), 2);
}

#[test]
#[should_panic]
fn binding_an_owned_state_panics() {
    let mut space = AddressSpace::new();
    let mo = new_object(0x100, 0x10);
    let os = ObjectState::new(0x10, 0);
    space.bind_object(mo.clone(), os.clone());
    // the state now carries an owner tag, rebinding it is a programming error
    let owned = space.find_object(&mo).unwrap().clone();
    let mut other = AddressSpace::new();
    other.bind_object(new_object(0x100, 0x10), owned);
}

#[test]
fn get_writeable_stamps_the_owner_and_keeps_contents() {
    let mut space = AddressSpace::new();
    let mo = new_object(0x100, 4);
    space.bind_object(mo.clone(), ObjectState::from_bytes(vec![1, 2, 3, 4]));

    let key = space.cow_key();
    let os = space.find_object(&mo).unwrap().clone();
    let writeable = space.get_writeable(&mo, &os);
    assert_eq!(writeable.cow_owner(), key);
    assert!(writeable.contents_eq(&os));
    drop(writeable);

    let os = space.find_object(&mo).unwrap().clone();
    let mut writeable = space.get_writeable(&mo, &os);
    writeable.write_concrete(0, &[9]);
    drop(writeable);
    assert_eq!(space.find_object(&mo).unwrap().read_concrete(0, 4), &[9, 2, 3, 4]);
}

#[test]
fn forked_spaces_do_not_observe_each_others_writes() {
    let mut parent = AddressSpace::new();
    let mo = new_object(0x100, 4);
    parent.bind_object(mo.clone(), ObjectState::from_bytes(vec![1, 2, 3, 4]));

    let mut child = parent.fork();
    assert_ne!(parent.cow_key(), child.cow_key());

    // child writes are invisible to the parent
    let os = child.find_object(&mo).unwrap().clone();
    child.get_writeable(&mo, &os).write_concrete(0, &[0xaa]);
    assert_eq!(parent.find_object(&mo).unwrap().read_concrete(0, 1), &[1]);
    assert_eq!(child.find_object(&mo).unwrap().read_concrete(0, 1), &[0xaa]);

    // the fork retired the parent's old key, so parent writes copy as well
    let os = parent.find_object(&mo).unwrap().clone();
    parent.get_writeable(&mo, &os).write_concrete(1, &[0xbb]);
    assert_eq!(child.find_object(&mo).unwrap().read_concrete(1, 1), &[2]);
    assert_eq!(parent.find_object(&mo).unwrap().read_concrete(1, 1), &[0xbb]);
}

#[test]
fn writes_in_the_owning_space_stay_visible() {
    let mut space = AddressSpace::new();
    let mo = new_object(0x100, 2);
    space.bind_object(mo.clone(), ObjectState::new(2, 0));
    for round in 1..=3u8 {
        let os = space.find_object(&mo).unwrap().clone();
        space.get_writeable(&mo, &os).write_concrete(0, &[round]);
        assert_eq!(space.find_object(&mo).unwrap().read_concrete(0, 1), &[round]);
    }
}

#[test]
fn copy_out_and_in_round_trip() {
    let mut host = vec![0u8; 32];
    let mut space = AddressSpace::new();
    let mo: MemoryObjectRef = MemoryObject::new(
        host.as_mut_ptr() as u64,
        Expression::const_from_u64(32, ByteSize::new(8)),
    )
    .into();
    let contents: Vec<u8> = (0u8..32).collect();
    space.bind_object(mo.clone(), ObjectState::from_bytes(contents.clone()));

    // a sibling path forked before the external call
    let sibling = space.fork();

    unsafe { space.copy_out_concretes() };
    assert_eq!(host, contents);

    host[5] = 0xee;
    assert!(unsafe { space.copy_in_concretes() });
    assert_eq!(space.find_object(&mo).unwrap().read_concrete(5, 1), &[0xee]);
    // the sibling keeps its pre-call view of the bytes
    assert_eq!(sibling.find_object(&mo).unwrap().read_concrete(5, 1), &[5]);
}

#[test]
fn copy_out_grows_the_concrete_store_to_its_bound() {
    let mut host = vec![0xffu8; 5];
    let mut space = AddressSpace::new();
    let mo: MemoryObjectRef = MemoryObject::new(
        host.as_mut_ptr() as u64,
        Expression::const_from_u64(5, ByteSize::new(8)),
    )
    .into();
    let mut os = ObjectState::from_bytes(vec![1, 2, 3]);
    os.set_size_bound(5);
    space.bind_object(mo.clone(), os);

    unsafe { space.copy_out_concretes() };
    assert_eq!(host, vec![1, 2, 3, 0, 0]);
    assert_eq!(space.find_object(&mo).unwrap().concrete_store().len(), 5);
}

#[test]
fn copy_in_rejects_changes_to_read_only_objects() {
    let mut host = vec![0u8; 4];
    let mut space = AddressSpace::new();
    let mo: MemoryObjectRef = MemoryObject::new(
        host.as_mut_ptr() as u64,
        Expression::const_from_u64(4, ByteSize::new(8)),
    )
    .into();
    let mut os = ObjectState::from_bytes(vec![0, 0, 0, 0]);
    os.mark_read_only();
    space.bind_object(mo, os);

    // read-only objects are not copied out
    host.copy_from_slice(&[7, 7, 7, 7]);
    assert!(!unsafe { space.copy_in_concretes() });
}

#[test]
fn user_specified_objects_are_excluded_from_concrete_io() {
    let mut host = vec![0u8; 4];
    let mut space = AddressSpace::new();
    let mo: MemoryObjectRef = MemoryObject::new(
        host.as_mut_ptr() as u64,
        Expression::const_from_u64(4, ByteSize::new(8)),
    )
    .user_specified()
    .into();
    space.bind_object(mo.clone(), ObjectState::from_bytes(vec![1, 2, 3, 4]));

    unsafe { space.copy_out_concretes() };
    assert_eq!(host, vec![0, 0, 0, 0]);
    host.copy_from_slice(&[9, 9, 9, 9]);
    assert!(unsafe { space.copy_in_concretes() });
    assert_eq!(space.find_object(&mo).unwrap().concrete_store(), &[1, 2, 3, 4]);
}

#[test]
fn json_debug_representation() {
    let mut space = AddressSpace::new();
    space.bind_object(new_object(0x100, 4), ObjectState::new(4, 0));
    let json = space.to_json_compact();
    assert!(json.as_object().unwrap().contains_key("object@0x100"));
}
