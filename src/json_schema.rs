//! JSON Schemas for the configuration file and the `--json` outputs.
//!
//! Exported with the `schema` subcommand so editors and CI can validate
//! configuration files and run reports.

use schemars::{schema_for, Schema};
use std::collections::BTreeMap;

/// Every schema by name, in a stable order
pub fn all_schemas() -> BTreeMap<&'static str, Schema> {
    let mut schemas = BTreeMap::new();

    // configuration file accepted by --config
    schemas.insert("config", schema_for!(crate::config::SeedConfig));

    // generate --json
    schemas.insert("report", schema_for!(crate::report::GenerationReport));

    // plan --json
    schemas.insert("plan", schema_for!(crate::report::PlanReport));

    // analyze --json
    schemas.insert("analysis", schema_for!(crate::analyze::AnalysisReport));

    schemas
}

/// A single schema by name
pub fn get_schema(name: &str) -> Option<Schema> {
    all_schemas().remove(name)
}

pub fn schema_names() -> Vec<&'static str> {
    all_schemas().keys().copied().collect()
}
