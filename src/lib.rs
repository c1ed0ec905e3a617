//! # SQL Advisor Library
//!
//! Rule-based review of SQL scripts.
//!
//! - [`query`] - Script splitting and parsing with absolute line tracking
//! - [`walk`] - Pre-order tree walk over statements, routines and nodes
//! - [`rules`] - Rule contract, registry and the built-in rule families
//! - [`dispatcher`] - Fans one tree walk out to every enabled rule
//! - [`catalog`] - Origin catalog and DDL walk-through
//! - [`executor`] - `EXPLAIN` collaborator for plan-based rules
//! - [`review`] - End-to-end review driver
//! - [`config`] / [`output`] / [`cli`] / [`app`] - Command-line front end

pub mod app;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod diagnostic;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod output;
pub mod query;
pub mod review;
pub mod rules;
pub mod walk;
