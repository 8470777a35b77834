/*!
# pathmem_lib

The per-path memory model of a symbolic execution engine.

Each explored execution path owns an [`AddressSpace`](memory::AddressSpace):
a collection of allocated [memory objects](memory::MemoryObject),
each tracking both concrete and symbolic contents in an [`ObjectState`](memory::ObjectState).
The central service of this crate is pointer resolution:
given a possibly symbolic [`Pointer`](memory::Pointer) and the current path constraints,
compute the set of memory objects the pointer could legally refer to.
Satisfiability questions are delegated to an external SMT solver
through the [`SolverOracle`](solver::SolverOracle) interface.

Address spaces are forked cheaply when execution paths split:
the underlying [`PersistentMap`](memory::PersistentMap) shares structure between map versions
and object contents are only copied when a path actually writes to them
(see [`AddressSpace::get_writeable`](memory::AddressSpace::get_writeable)).

This crate deliberately does *not* contain a constraint solver,
an expression simplifier or any execution scheduling logic.
Those are collaborators of the surrounding engine.
*/

pub mod expr;
pub mod memory;
pub mod solver;
pub mod termination;
pub mod utils;

mod prelude {
    pub use apint::Width;
    pub use serde::{Deserialize, Serialize};

    pub use crate::expr::{Bitvector, ByteSize};
    pub use anyhow::{anyhow, Error};
}
