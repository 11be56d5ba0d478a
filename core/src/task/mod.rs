//! Generation task data model and lifecycle rules.
//!
//! A task record only changes through the methods on [`GenerationTask`], which
//! enforce the status state machine, monotonic progress and the
//! result/error/cancelled exclusivity. Callers hold the record behind a lock
//! (see [`crate::registry`]) so every mutation lands as one consistent snapshot.

pub mod events;
pub mod record;
pub mod transitions;
pub mod types;
pub mod validate;

pub use events::TaskEvent;
pub use record::GenerationTask;
pub use transitions::{StatusTransition, TransitionError};
pub use types::{SubjectType, TaskFilter, TaskRequest, TaskSnapshot, TaskStatus};
pub use validate::validate_request;
