//! tessera-rotation — rotation decision engine.
//!
//! Given a member, its live pod and the desired and last-applied pod
//! templates, decide how the member must be brought up to date:
//!
//! ```text
//! Skipped < Silent < InPlace < Graceful < Enforced
//! ```
//!
//! The decision is a pure function; the plan builder turns the resulting
//! [`RotationMode`] into actions.

pub mod check;
pub mod compare;
pub mod error;
pub mod mode;

pub use check::{Rotation, RotationInput, is_rotation_required};
pub use error::{RotationError, RotationResult};
pub use mode::RotationMode;
