//! Post-insert checks: row counts and sampled foreign key values.

use super::run::TableRun;
use crate::db::DatabaseAccess;
use crate::error::DbError;
use crate::generator::Value;
use crate::report::VerificationMismatch;
use crate::schema::TableSchema;
use tracing::debug;

/// Check a finished table. Mismatches are returned, never repaired.
pub fn verify_table(
    db: &dyn DatabaseAccess,
    schema: &TableSchema,
    table: &TableRun,
    sample_size: usize,
) -> Result<Vec<VerificationMismatch>, DbError> {
    let mut mismatches = Vec::new();

    let expected = table.rows_before + table.rows_inserted();
    let actual = db.count_rows(&table.name)?;
    if actual != expected {
        mismatches.push(VerificationMismatch {
            table: table.name.clone(),
            check: "row_count".to_string(),
            expected,
            actual,
            detail: format!(
                "{} rows before the run plus {} inserted",
                table.rows_before,
                table.rows_inserted()
            ),
        });
    }

    if sample_size == 0 {
        return Ok(mismatches);
    }

    for fk in &schema.foreign_keys {
        let sample = db.sample_rows(&table.name, &fk.column_names, sample_size)?;
        let mut checked = 0u64;
        let mut missing = 0u64;
        for row in sample {
            if row.iter().any(Value::is_null) {
                continue;
            }
            checked += 1;
            let tuple = row.into_iter().collect();
            if !db.contains_key(&fk.referenced_table, &fk.referenced_columns, &tuple)? {
                missing += 1;
            }
        }
        debug!(
            table = %table.name,
            columns = %fk.column_names.join(", "),
            checked,
            missing,
            "foreign key spot check"
        );
        if missing > 0 {
            mismatches.push(VerificationMismatch {
                table: table.name.clone(),
                check: format!("foreign_key:{}", fk.column_names.join(",")),
                expected: checked,
                actual: checked - missing,
                detail: format!(
                    "{} of {} sampled values missing from {}",
                    missing, checked, fk.referenced_table
                ),
            });
        }
    }

    Ok(mismatches)
}
