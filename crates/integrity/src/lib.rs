//! Batch Integrity Validation
//!
//! Checks a fully captured, decoded batch for dropped notifications (8-bit
//! sequence continuity) and for timestamp ordering across sequence wraps.
//! Validation is all-or-nothing: any error rejects the whole batch.

mod error;
mod validator;

pub use error::IntegrityError;
pub use validator::{IntegrityValidator, ValidatorConfig};
