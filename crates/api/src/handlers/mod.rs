//! Request handlers.
//!
//! Handlers delegate to the repositories in `costkeeper_db` and the rule
//! engine in `costkeeper_core`, mapping errors via [`AppError`](crate::error::AppError).

pub mod assignment_rules;
