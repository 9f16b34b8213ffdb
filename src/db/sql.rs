//! SQL text generation for the DuckDB backend.

use crate::generator::{format_decimal, KeyTuple, Value, DATETIME_FORMAT, DATE_FORMAT};

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn ident_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format a value as a SQL literal
pub fn format_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Int(n) => n.to_string(),
        Value::Decimal { units, scale } => format_decimal(*units, *scale),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::Text(s) | Value::Json(s) | Value::Uuid(s) => {
            // Escape single quotes by doubling them (SQL standard)
            format!("'{}'", s.replace('\'', "''"))
        }
        Value::Date(d) => format!("DATE '{}'", d.format(DATE_FORMAT)),
        Value::DateTime(dt) => format!("TIMESTAMP '{}'", dt.format(DATETIME_FORMAT)),
        Value::Bytes(bytes) => {
            let escaped: String = bytes.iter().map(|b| format!("\\x{:02X}", b)).collect();
            format!("'{}'::BLOB", escaped)
        }
    }
}

fn tuple_literal(values: &[Value]) -> String {
    let mut out = String::with_capacity(values.len() * 8 + 2);
    out.push('(');
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&format_literal(value));
    }
    out.push(')');
    out
}

/// Multi-row INSERT for one batch
pub fn insert_statement(table: &str, columns: &[String], rows: &[Vec<Value>]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES\n",
        quote_ident(table),
        ident_list(columns)
    );
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            sql.push_str(",\n");
        }
        sql.push_str(&tuple_literal(row));
    }
    sql.push(';');
    sql
}

/// One UPDATE joining a VALUES list of (key..., new value...) tuples
pub fn update_statement(
    table: &str,
    key_columns: &[String],
    set_columns: &[String],
    updates: &[(KeyTuple, KeyTuple)],
) -> String {
    if updates.is_empty() {
        return String::new();
    }
    let key_alias: Vec<String> = (0..key_columns.len()).map(|i| format!("k{i}")).collect();
    let set_alias: Vec<String> = (0..set_columns.len()).map(|i| format!("s{i}")).collect();

    let assignments = set_columns
        .iter()
        .zip(&set_alias)
        .map(|(col, alias)| format!("{} = v.{}", quote_ident(col), alias))
        .collect::<Vec<_>>()
        .join(", ");
    let predicate = key_columns
        .iter()
        .zip(&key_alias)
        .map(|(col, alias)| format!("t.{} = v.{}", quote_ident(col), alias))
        .collect::<Vec<_>>()
        .join(" AND ");
    let values = updates
        .iter()
        .map(|(key, set)| {
            let mut tuple: Vec<Value> = key.iter().cloned().collect();
            tuple.extend(set.iter().cloned());
            tuple_literal(&tuple)
        })
        .collect::<Vec<_>>()
        .join(", ");
    let aliases = key_alias
        .iter()
        .chain(&set_alias)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "UPDATE {} AS t SET {} FROM (VALUES {}) AS v({}) WHERE {};",
        quote_ident(table),
        assignments,
        values,
        aliases,
        predicate
    )
}

/// SELECT casting every column to text
pub fn select_text(table: &str, columns: &[String]) -> String {
    let cols = columns
        .iter()
        .map(|c| format!("CAST({} AS VARCHAR)", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM {}", cols, quote_ident(table))
}

/// `a IS NOT NULL AND b IS NOT NULL`
pub fn not_null_predicate(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| format!("{} IS NOT NULL", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// `a = 1 AND b = 'x'`
pub fn key_predicate(columns: &[String], tuple: &KeyTuple) -> String {
    columns
        .iter()
        .zip(tuple.iter())
        .map(|(c, v)| format!("{} = {}", quote_ident(c), format_literal(v)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Rows whose tuple sorts after `tuple`: `a > 1 OR (a = 1 AND b > 'x')`
pub fn after_predicate(columns: &[String], tuple: &KeyTuple) -> String {
    let terms: Vec<String> = (0..columns.len().min(tuple.len()))
        .map(|i| {
            let mut parts: Vec<String> = columns[..i]
                .iter()
                .zip(tuple.iter())
                .map(|(c, v)| format!("{} = {}", quote_ident(c), format_literal(v)))
                .collect();
            parts.push(format!(
                "{} > {}",
                quote_ident(&columns[i]),
                format_literal(&tuple[i])
            ));
            parts.join(" AND ")
        })
        .collect();
    match terms.len() {
        0 => "TRUE".to_string(),
        1 => terms.into_iter().collect(),
        _ => terms
            .iter()
            .map(|t| format!("({})", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_insert_statement() {
        let rows = vec![
            vec![Value::Int(1), Value::Text("O'Brien".into())],
            vec![Value::Int(2), Value::Null],
        ];
        let sql = insert_statement("users", &["id".into(), "name".into()], &rows);
        assert_eq!(
            sql,
            "INSERT INTO \"users\" (\"id\", \"name\") VALUES\n(1, 'O''Brien'),\n(2, NULL);"
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(format_literal(&Value::Bytes(vec![0xAB, 0x01])), "'\\xAB\\x01'::BLOB");
        assert_eq!(
            format_literal(&Value::Decimal {
                units: 1999,
                scale: 2
            }),
            "19.99"
        );
        assert_eq!(format_literal(&Value::Bool(false)), "FALSE");
    }

    #[test]
    fn test_update_statement() {
        let updates: Vec<(KeyTuple, KeyTuple)> = vec![
            (smallvec![Value::Int(2)], smallvec![Value::Int(1)]),
            (smallvec![Value::Int(3)], smallvec![Value::Int(1)]),
        ];
        let sql = update_statement("emp", &["id".into()], &["manager_id".into()], &updates);
        assert_eq!(
            sql,
            "UPDATE \"emp\" AS t SET \"manager_id\" = v.s0 FROM (VALUES (2, 1), (3, 1)) AS v(k0, s0) WHERE t.\"id\" = v.k0;"
        );
    }

    #[test]
    fn test_after_predicate() {
        let one: KeyTuple = smallvec![Value::Int(5)];
        assert_eq!(after_predicate(&["id".into()], &one), "\"id\" > 5");

        let two: KeyTuple = smallvec![Value::Int(5), Value::Text("x".into())];
        assert_eq!(
            after_predicate(&["a".into(), "b".into()], &two),
            "(\"a\" > 5) OR (\"a\" = 5 AND \"b\" > 'x')"
        );
    }
}
