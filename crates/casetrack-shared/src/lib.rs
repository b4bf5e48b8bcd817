//! Shared types for casetrack: domain model, wire types, and errors.
//!
//! Everything the daemon and its tests exchange over the API lives here,
//! so the serde representation is defined in exactly one place.

pub mod api;
pub mod error;
pub mod model;

pub use error::{Error, FieldError, Result};
pub use model::{
    Case, CasePayload, CaseStatus, CaseUpdate, CallStatus, DuplicateMode, Event, EventType,
};
