//! Starter configuration written by `init-config`.

/// Commented YAML template covering every option.
pub fn config_template() -> String {
    r#"# sql-seeder configuration
#
# Resolution order for column options: column > table > global.
# Strategies on PRIMARY KEY, UNIQUE, auto-increment and foreign key columns
# are downgraded to generate_new and listed in the run report.

# Rows per batch (default: derived from total memory)
# batch_size: 10000

# Worker threads / isolated workers (default: derived from CPU count)
# max_workers: 4
# max_processes: 4

# executor: auto            # auto | threads | partitioned
# partition_threshold: 1000000

# seed: 42
truncate_existing: false
verify: true
verify_sample_size: 100
progress_interval: 1000

insert_retries: 3
retry_backoff_ms: 50

memory_high_water: 80.0
memory_low_water: 50.0
min_batch_size: 1000
max_batch_size: 100000

unique_attempts: 100
default_rows: 100

# generate_new | allow_duplicates | smart_duplicates | cached_pool | fast_data_reuse
duplicate_strategy: generate_new

# Sample existing rows and reuse their most common values in fabricated columns
analyze_existing_data: false
pattern_sample_size: 1000

# include_tables: [users, orders]
# exclude_tables: [audit_log]

tables:
  users:
    rows_to_generate: 1000
    columns:
      email:
        generator_function: email
      first_name:
        generator_function: first_name
      age:
        min_value: 18
        max_value: 90
        null_probability: 0.05

  orders:
    rows_to_generate: 5000
    columns:
      status:
        weighted_values:
          pending: 0.3
          shipped: 0.5
          cancelled: 0.2
      total:
        min_value: 1.0
        max_value: 999.99
      notes:
        duplicate_strategy: smart_duplicates
        pool_size: 10
        reuse_probability: 0.5
"#
    .to_string()
}
