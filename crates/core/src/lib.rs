//! Core business logic for Ratechart.
//!
//! This crate contains pure business logic with ZERO web or database dependencies.
//! Storage is reached through the transaction-scoped traits in
//! [`ratechart::store`], implemented by the db crate.
//!
//! # Modules
//!
//! - `ratechart` - Rate table parsing, master/shared chart groups, assignment,
//!   status toggling, and machine download tracking

pub mod ratechart;
