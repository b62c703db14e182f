//! Generic tag-dispatched state-machine engine.
//!
//! A [`Machine`] owns a set of declared [`State`]s, the data of the actor
//! that drives it, and transition bookkeeping (entered-at tick, staleness
//! guard, terminated flag). Each state has enter/leave hooks, a fallback
//! for unexpected messages, and an ordered table mapping a message tag to
//! an action plus success/failure [`Target`]s.
//!
//! The Stepper is built on this engine; other simulated actors can be too.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod machine;
pub mod state;

pub use machine::{Machine, Savable, StateId};
pub use state::{ActionEntry, ActionFn, EnterFn, LeaveFn, State, Tagged, Target, UnexpectedFn};
