//! Domain logic for the costkeeper backend.
//!
//! This crate has no internal dependencies and no database access. The
//! assignment-rule engine lives in [`assignment`]; storage and HTTP layers
//! build on the types and errors defined here.

pub mod assignment;
pub mod error;
pub mod types;
