//! Constraint-aware synthetic data generation.
//!
//! Reads a schema (from a live database or `CREATE TABLE` DDL), orders its
//! tables so parents are filled before children, and inserts generated rows
//! that honor types, ranges, patterns, nullability, uniqueness and foreign
//! keys. [`insert::Seeder`] is the entry point.

// Allow dead code for items that are part of the public API but only used in tests
#![allow(dead_code)]

pub mod analyze;
pub mod config;
pub mod db;
pub mod duplicate;
pub mod error;
pub mod generator;
pub mod insert;
pub mod json_schema;
pub mod monitor;
pub mod pk;
pub mod progress;
pub mod report;
pub mod schema;
