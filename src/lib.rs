//! Coverage-guided mutation testing.
//!
//! Syntax trees produced by an external parser are mutated by a registry of
//! operators, each mutant is printed back to source, and only the tests that
//! cover the mutated lines are run against it inside an isolated working copy.

pub mod ast;
pub mod config;
pub mod coverage;
pub mod engine;
pub mod mutation;
pub mod runner;
pub mod scheduler;
