//! The constrained decoding state machine: states, per-stream context, and
//! the generator that ties them to the prefix acceptors and fixed literals.

pub mod context;
pub mod generator;
pub mod state;

pub use context::GenerationContext;
pub use generator::{Allowed, ConstrainedGenerator};
pub use state::{State, StateKind};
