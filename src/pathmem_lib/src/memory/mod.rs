//! The symbolic memory model:
//! memory objects, their copy-on-write contents,
//! the persistent maps tying them together
//! and the address space type owning one memory map per execution path.

mod persistent_map;
pub use persistent_map::*;

mod pointer;
pub use pointer::*;

mod object;
pub use object::*;

mod object_state;
pub use object_state::*;

mod address_space;
pub use address_space::*;
