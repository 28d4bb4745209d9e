//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls into use-case level APIs.
//! - Keep UI layers decoupled from cell-level store details.

pub mod todo_service;
