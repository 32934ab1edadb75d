//! # IRI Module
//!
//! Namespace handling for documents moving between environments.
//!
//! - `rebind`: development/production text rebinding
//! - `safety`: allow-list validation of untrusted documents

pub mod rebind;
pub mod safety;

pub use rebind::{IriRebinder, RebindTarget};
pub use safety::{SafetyReport, validate, validate_value};
