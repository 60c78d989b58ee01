//! Proposed corrections
//!
//! Users propose field-level edits to canonical records; moderators review
//! them; approved edits are merged by the apply engine.
//!
//! - [`diff`] - sparse change-set between canonical and candidate
//! - [`validate`] - schema checks and normalisation
//! - [`store`] - persistence and review lifecycle
//! - [`apply`] - merge into the canonical record
//! - [`service`] - submission pipeline

pub mod apply;
pub mod diff;
pub mod model;
pub mod service;
pub mod store;
pub mod validate;

pub use apply::ApplyEngine;
pub use diff::{deep_equal, diff};
pub use model::{ApplyState, ChangeSet, CorrectionDoc, CorrectionStatus};
pub use service::{CorrectionService, SubmitCorrection};
pub use store::{CorrectionApplier, CorrectionPage, CorrectionQuery, CorrectionStore};
pub use validate::{validate_changes, validate_correction, validate_record};
