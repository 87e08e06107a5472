//! Image compositing for the frameloom pipeline.
//!
//! Consuming channels hand their ready input frames to the functions in
//! [`assemble`]: 2D (sort-first) contributions are copied straight into the
//! destination surface, database-range (sort-last) contributions are ordered
//! far-to-near by [`sorter::order_frames`] and blended in that order.
//!
//! The destination is any [`DrawableSurface`]; [`MemorySurface`] is the
//! host-memory reference backend used by headless nodes and the test suite.

mod arena;
mod assemble;
mod memory;
mod readback;
mod sorter;
mod surface;

pub use arena::{Handle, ObjectArena};
pub use assemble::{assemble_frame, assemble_frames_sorted};
pub use memory::MemorySurface;
pub use readback::read_back;
pub use sorter::order_frames;
pub use surface::{AssembleError, AssembleOp, DrawableSurface, ReadbackError, StorageKind};
