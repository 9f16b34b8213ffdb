//! Follow-up pass linking self-referencing rows.
//!
//! Rows of a self-referencing table are inserted with the reference NULL
//! (or pointing at themselves when NULL is not allowed). After the insert
//! pass the run's keys are read back page by page in key order, and every
//! row but the first gets a parent drawn from a bounded sample of the rows
//! before it. Parents always precede their children, so the hierarchy stays
//! acyclic, and memory is bounded by the page and sample sizes.

use super::run::TableRun;
use crate::db::DatabaseAccess;
use crate::error::DbError;
use crate::generator::{KeyTuple, Reservoir};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

/// Keys read, and updates written, per round trip
pub const KEY_PAGE: usize = 5_000;

/// Earlier rows kept as parent candidates
pub const PARENT_SAMPLE: usize = 10_000;

/// Run the update pass for every self-reference of the table. Returns the
/// number of rows updated.
pub fn link_self_references(
    db: &dyn DatabaseAccess,
    table: &TableRun,
    rng: &mut StdRng,
) -> Result<u64, DbError> {
    let plan = &table.plan;
    let mut updated = 0u64;

    for (index, self_ref) in plan.self_refs.iter().enumerate() {
        let Some(run_keys) = table.run_keys(index) else {
            continue;
        };
        let key_columns: Vec<String> = self_ref
            .key_slots
            .iter()
            .map(|&s| table.columns[s].clone())
            .collect();
        let set_columns: Vec<String> = self_ref
            .slots
            .iter()
            .map(|&s| table.columns[s].clone())
            .collect();

        let null_probability = if self_ref.nullable {
            self_ref
                .slots
                .first()
                .map(|&s| plan.columns[s].null_probability)
                .unwrap_or(0.0)
        } else {
            0.0
        };

        let mut parents: Reservoir<KeyTuple> =
            Reservoir::new(PARENT_SAMPLE, StdRng::seed_from_u64(rng.random()));
        let mut after = run_keys.start();
        let mut rows = 0u64;
        let mut linked = 0u64;

        // Rows the database refused are not in the table, so never paged
        loop {
            let page = db.key_page(&table.name, &key_columns, after.as_ref(), KEY_PAGE)?;
            let full = page.len() == KEY_PAGE;
            after = page.last().cloned();

            let mut updates = Vec::new();
            for key in page.into_iter().filter(|key| run_keys.contains(key)) {
                rows += 1;
                let skip = null_probability > 0.0 && rng.random_bool(null_probability);
                if !skip {
                    if let Some(parent) = parents.choose() {
                        updates.push((key.clone(), parent.clone()));
                    }
                }
                parents.consider(key);
            }

            if !updates.is_empty() {
                debug!(table = %table.name, updates = updates.len(), "linking page");
                linked += db.update_rows(&table.name, &key_columns, &set_columns, &updates)?;
            }
            if !full {
                break;
            }
        }

        updated += linked;
        info!(
            table = %table.name,
            columns = %set_columns.join(", "),
            rows,
            updated = linked,
            "self references linked"
        );
    }

    table.record_self_ref_pass(updated);
    Ok(updated)
}
