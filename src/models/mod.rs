//! # Models
//!
//! The single persisted entity swept by the engine, plus its creation form and
//! the marker token type.

pub mod record;

pub use record::{MarkerToken, NewRecord, Record};
