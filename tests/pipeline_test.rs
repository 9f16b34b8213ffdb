//! End-to-end runs of the seeder against the in-memory database.

use ahash::AHashSet;
use sql_seeder::config::{ColumnConfig, DuplicateStrategy, ExecutorKind, SeedConfig};
use sql_seeder::db::{DatabaseAccess, MemoryDatabase};
use sql_seeder::duplicate::DowngradeReason;
use sql_seeder::generator::{Row, Value};
use sql_seeder::insert::{Seeder, TableState};
use sql_seeder::monitor::FixedTelemetry;
use sql_seeder::progress::{ProgressEvent, ProgressSink, StopFlag};
use sql_seeder::report::ShortfallReason;
use std::sync::Arc;
use std::sync::Mutex;

const SHOP_DDL: &str = "
    CREATE TABLE customers (
        id INT PRIMARY KEY,
        email VARCHAR(120) NOT NULL UNIQUE,
        first_name VARCHAR(40),
        age INT CHECK (age >= 18)
    );
    CREATE TABLE products (
        id INT PRIMARY KEY,
        sku VARCHAR(20) NOT NULL UNIQUE,
        status VARCHAR(10),
        price DECIMAL(8,2)
    );
    CREATE TABLE orders (
        id INT PRIMARY KEY,
        customer_id INT NOT NULL REFERENCES customers(id),
        created_at TIMESTAMP
    );
    CREATE TABLE order_items (
        order_id INT NOT NULL REFERENCES orders(id),
        product_id INT NOT NULL REFERENCES products(id),
        quantity INT,
        PRIMARY KEY (order_id, product_id)
    );
";

fn memory_db(ddl: &str) -> Arc<MemoryDatabase> {
    Arc::new(MemoryDatabase::from_ddl(ddl).unwrap())
}

fn seeder(db: &Arc<MemoryDatabase>, config: SeedConfig) -> Seeder {
    Seeder::new(db.clone(), config).with_telemetry(Arc::new(FixedTelemetry::new(30.0)))
}

fn column(db: &MemoryDatabase, table: &str, name: &str) -> Vec<Value> {
    let idx = db
        .schema()
        .get_table(table)
        .unwrap()
        .get_column_id(name)
        .unwrap()
        .0 as usize;
    db.rows(table).into_iter().map(|r| r[idx].clone()).collect()
}

fn sorted(rows: Vec<Row>) -> Vec<String> {
    let mut out: Vec<String> = rows.into_iter().map(|r| format!("{:?}", r)).collect();
    out.sort();
    out
}

#[test]
fn test_generates_exact_row_counts() {
    let db = memory_db(SHOP_DDL);
    let config = SeedConfig::default()
        .with_seed(11)
        .with_batch_size(40)
        .with_rows("customers", 120)
        .with_rows("products", 60)
        .with_rows("orders", 300)
        .with_rows("order_items", 500);
    let report = seeder(&db, config).run().unwrap();

    assert!(report.is_complete(), "{:#?}", report.tables);
    for (table, rows) in [
        ("customers", 120),
        ("products", 60),
        ("orders", 300),
        ("order_items", 500),
    ] {
        assert_eq!(db.rows(table).len(), rows, "{}", table);
        let t = report.table(table).unwrap();
        assert_eq!(t.state, TableState::Done);
        assert_eq!(t.rows_inserted, rows as u64);
    }
    assert_eq!(report.rows_inserted(), 980);
}

#[test]
fn test_stages_put_parents_first() {
    let db = memory_db(SHOP_DDL);
    let report = seeder(&db, SeedConfig::default().with_seed(1)).run().unwrap();

    let stage_of = |name: &str| {
        report
            .stages
            .iter()
            .position(|s| s.iter().any(|t| t == name))
            .unwrap()
    };
    assert!(stage_of("customers") < stage_of("orders"));
    assert!(stage_of("orders") < stage_of("order_items"));
    assert!(stage_of("products") < stage_of("order_items"));
}

#[test]
fn test_unique_and_foreign_keys_hold() {
    let db = memory_db(SHOP_DDL);
    let config = SeedConfig::default()
        .with_seed(5)
        .with_workers(4)
        .with_batch_size(25)
        .with_rows("customers", 200)
        .with_rows("orders", 400)
        .with_rows("order_items", 600);
    let report = seeder(&db, config).run().unwrap();
    assert!(report.is_complete(), "{:#?}", report.tables);

    let emails = column(&db, "customers", "email");
    let distinct: AHashSet<_> = emails.iter().cloned().collect();
    assert_eq!(distinct.len(), emails.len());
    assert!(emails.iter().all(|v| !v.is_null()));

    let customer_ids: AHashSet<_> = column(&db, "customers", "id").into_iter().collect();
    for id in column(&db, "orders", "customer_id") {
        assert!(customer_ids.contains(&id), "orphan order customer {:?}", id);
    }

    let pairs: Vec<(Value, Value)> = column(&db, "order_items", "order_id")
        .into_iter()
        .zip(column(&db, "order_items", "product_id"))
        .collect();
    let distinct_pairs: AHashSet<_> = pairs.iter().cloned().collect();
    assert_eq!(distinct_pairs.len(), pairs.len());

    for age in column(&db, "customers", "age") {
        if let Some(age) = age.as_i64() {
            assert!(age >= 18, "age {} below check", age);
        }
    }
}

#[test]
fn test_partitioned_executor_keeps_keys_unique() {
    let db = memory_db(SHOP_DDL);
    let config = SeedConfig::default()
        .with_seed(8)
        .with_executor(ExecutorKind::Partitioned)
        .with_workers(3)
        .with_batch_size(30)
        .with_rows("customers", 300)
        .with_include_tables(&["customers", "products"]);
    let report = seeder(&db, config).run().unwrap();

    assert_eq!(report.executor, "partitioned");
    assert_eq!(report.workers, 3);
    assert!(report.is_complete(), "{:#?}", report.tables);
    let skus = column(&db, "products", "sku");
    let distinct: AHashSet<_> = skus.iter().cloned().collect();
    assert_eq!(distinct.len(), skus.len());
    assert_eq!(db.rows("customers").len(), 300);
}

#[test]
fn test_partitioned_executor_with_several_unique_keys() {
    let db = memory_db(
        "CREATE TABLE acct (
            id UUID PRIMARY KEY,
            email VARCHAR(120) NOT NULL UNIQUE,
            username VARCHAR(60) NOT NULL UNIQUE
        );",
    );
    let config = SeedConfig::default()
        .with_seed(21)
        .with_executor(ExecutorKind::Partitioned)
        .with_workers(8)
        .with_batch_size(100)
        .with_rows("acct", 2000);
    let report = seeder(&db, config).run().unwrap();

    let acct = report.table("acct").unwrap();
    assert!(report.is_complete(), "{:#?}", report.tables);
    assert_eq!(acct.shortfall_rows(), 0);
    assert_eq!(acct.rows_inserted, 2000);
    for name in ["id", "email", "username"] {
        let values = column(&db, "acct", name);
        let distinct: AHashSet<_> = values.iter().cloned().collect();
        assert_eq!(distinct.len(), 2000, "{}", name);
    }
}

#[test]
fn test_allow_duplicates_on_unique_column_is_downgraded() {
    let db = memory_db(SHOP_DDL);
    let config = SeedConfig::default()
        .with_seed(2)
        .with_rows("products", 50)
        .with_include_tables(&["products"])
        .with_table_strategy("products", DuplicateStrategy::AllowDuplicates);
    let report = seeder(&db, config).run().unwrap();
    let products = report.table("products").unwrap();

    assert!(products.is_done());
    assert!(products
        .downgrades
        .iter()
        .any(|d| d.column == "sku" && d.reason == DowngradeReason::Unique));
    assert!(products
        .downgrades
        .iter()
        .any(|d| d.column == "id" && d.reason == DowngradeReason::PrimaryKey));

    let skus: AHashSet<_> = column(&db, "products", "sku").into_iter().collect();
    assert_eq!(skus.len(), 50);
    let statuses: AHashSet<_> = column(&db, "products", "status").into_iter().collect();
    assert_eq!(statuses.len(), 1, "status repeats one fixed value");
}

#[test]
fn test_fast_data_reuse_on_empty_table_generates_new() {
    let db = memory_db(SHOP_DDL);
    let config = SeedConfig::default()
        .with_seed(3)
        .with_rows("products", 20)
        .with_include_tables(&["products"])
        .with_column(
            "products",
            "status",
            ColumnConfig {
                duplicate_strategy: Some(DuplicateStrategy::FastDataReuse),
                ..Default::default()
            },
        );
    let report = seeder(&db, config).run().unwrap();
    let products = report.table("products").unwrap();

    assert!(products.is_done());
    assert_eq!(products.rows_inserted, 20);
    let downgrade = products
        .downgrades
        .iter()
        .find(|d| d.column == "status")
        .unwrap();
    assert_eq!(downgrade.reason, DowngradeReason::EmptySample);
    assert_eq!(downgrade.applied, DuplicateStrategy::GenerateNew);
}

#[test]
fn test_fast_data_reuse_draws_existing_values() {
    let db = memory_db(SHOP_DDL);
    let columns: Vec<String> = ["id", "sku", "status", "price"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let existing: Vec<Row> = (1..=4)
        .map(|i| {
            vec![
                Value::Int(i),
                Value::Text(format!("SKU-{}", i)),
                Value::Text(if i % 2 == 0 { "active" } else { "retired" }.to_string()),
                Value::Null,
            ]
        })
        .collect();
    db.insert_batch("products", &columns, &existing).unwrap();

    let config = SeedConfig::default()
        .with_seed(4)
        .with_rows("products", 40)
        .with_include_tables(&["products"])
        .with_column(
            "products",
            "status",
            ColumnConfig {
                duplicate_strategy: Some(DuplicateStrategy::FastDataReuse),
                reuse_probability: Some(1.0),
                ..Default::default()
            },
        );
    let report = seeder(&db, config).run().unwrap();
    let products = report.table("products").unwrap();

    assert!(products.is_done(), "{:#?}", products);
    assert_eq!(products.rows_before, 4);
    assert_eq!(db.rows("products").len(), 44);
    for status in column(&db, "products", "status") {
        assert!(
            status == Value::Text("active".into()) || status == Value::Text("retired".into()),
            "unexpected status {:?}",
            status
        );
    }
    // New ids continue after the existing maximum
    let ids: AHashSet<_> = column(&db, "products", "id").into_iter().collect();
    assert_eq!(ids.len(), 44);
}

#[test]
fn test_existing_values_shape_new_rows() {
    let db = memory_db("CREATE TABLE tickets (id INT PRIMARY KEY, status VARCHAR(12), title VARCHAR(80));");
    let existing: Vec<Row> = (1..=30)
        .map(|i| {
            vec![
                Value::Int(i),
                Value::Text(if i % 3 == 0 { "closed" } else { "open" }.into()),
                Value::Text(format!("ticket {}", i)),
            ]
        })
        .collect();
    db.insert_batch(
        "tickets",
        &["id".to_string(), "status".to_string(), "title".to_string()],
        &existing,
    )
    .unwrap();

    let config = SeedConfig {
        analyze_existing_data: true,
        pattern_sample_size: 100,
        ..Default::default()
    }
    .with_seed(6)
    .with_rows("tickets", 120);
    let report = seeder(&db, config).run().unwrap();
    assert!(report.is_complete(), "{:#?}", report.tables);

    let statuses = column(&db, "tickets", "status");
    assert_eq!(statuses.len(), 150);
    let open = Value::Text("open".into());
    let closed = Value::Text("closed".into());
    assert!(statuses.iter().all(|s| *s == open || *s == closed));
    let opened = statuses.iter().filter(|s| **s == open).count();
    assert!(opened > 75, "{}", opened);

    // Titles never repeated, so they stay freshly generated
    let titles: AHashSet<_> = column(&db, "tickets", "title").into_iter().collect();
    assert!(titles.len() > 100);
}

#[test]
fn test_self_reference_linked_in_one_update() {
    let ddl = "
        CREATE TABLE employees (
            id INT PRIMARY KEY,
            name VARCHAR(60),
            manager_id INT REFERENCES employees(id)
        );
    ";
    let db = memory_db(ddl);
    let config = SeedConfig::default()
        .with_seed(21)
        .with_batch_size(100)
        .with_rows("employees", 500)
        .with_column(
            "employees",
            "manager_id",
            ColumnConfig {
                null_probability: Some(0.0),
                ..Default::default()
            },
        );
    let report = seeder(&db, config).run().unwrap();
    let employees = report.table("employees").unwrap();

    assert!(employees.is_done());
    assert_eq!(employees.rows_inserted, 500);
    assert_eq!(employees.self_reference_passes, 1);
    assert_eq!(db.update_calls(), 1);

    let rows = db.rows("employees");
    let ids: AHashSet<_> = rows.iter().map(|r| r[0].clone()).collect();
    let mut roots = 0;
    for row in &rows {
        match &row[2] {
            Value::Null => roots += 1,
            manager => {
                assert!(ids.contains(manager));
                assert_ne!(manager, &row[0], "row manages itself");
            }
        }
    }
    assert_eq!(roots, 1, "only the first employee has no manager");
    assert_eq!(employees.self_reference_updates, 499);
}

#[test]
fn test_self_reference_linked_page_by_page() {
    let db = memory_db(
        "CREATE TABLE category (id INT PRIMARY KEY, parent_id INT REFERENCES category(id));",
    );
    let config = SeedConfig::default()
        .with_seed(4)
        .with_batch_size(1000)
        .with_rows("category", 6000)
        .with_column(
            "category",
            "parent_id",
            ColumnConfig {
                null_probability: Some(0.0),
                ..Default::default()
            },
        );
    let report = seeder(&db, config).run().unwrap();
    let category = report.table("category").unwrap();

    assert!(category.is_done());
    assert_eq!(category.self_reference_updates, 5999);
    assert_eq!(db.update_calls(), 2);
    for row in db.rows("category") {
        if let (Value::Int(id), Value::Int(parent)) = (&row[0], &row[1]) {
            assert!(parent < id, "{} points forward to {}", id, parent);
        }
    }
}

#[test]
fn test_self_reference_leaves_existing_rows_alone() {
    let db = memory_db(
        "CREATE TABLE node (id UUID PRIMARY KEY, label VARCHAR(20), parent_id UUID REFERENCES node(id));",
    );
    let existing: Vec<Row> = (0..3)
        .map(|i| {
            vec![
                Value::Uuid(format!("00000000-0000-4000-8000-00000000000{}", i)),
                Value::Text(format!("old-{}", i)),
                Value::Null,
            ]
        })
        .collect();
    db.insert_batch(
        "node",
        &["id".to_string(), "label".to_string(), "parent_id".to_string()],
        &existing,
    )
    .unwrap();

    let config = SeedConfig::default()
        .with_seed(9)
        .with_rows("node", 40)
        .with_column(
            "node",
            "parent_id",
            ColumnConfig {
                null_probability: Some(0.0),
                ..Default::default()
            },
        );
    let report = seeder(&db, config).run().unwrap();
    let node = report.table("node").unwrap();
    assert!(node.is_done());
    assert_eq!(node.rows_inserted, 40);
    assert_eq!(node.self_reference_updates, 39);

    let old: AHashSet<Value> = existing.iter().map(|r| r[0].clone()).collect();
    let rows = db.rows("node");
    let new: AHashSet<Value> = rows
        .iter()
        .map(|r| r[0].clone())
        .filter(|id| !old.contains(id))
        .collect();
    for row in &rows {
        if old.contains(&row[0]) {
            assert_eq!(row[2], Value::Null, "existing row relinked");
        } else if !row[2].is_null() {
            assert!(new.contains(&row[2]), "new row linked to an old one");
        }
    }
}

#[test]
fn test_stop_from_progress_sink_interrupts_run() {
    let db = memory_db(SHOP_DDL);
    let stop = StopFlag::new();
    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));

    let sink_stop = stop.clone();
    let sink_events = events.clone();
    let sink: ProgressSink = Arc::new(move |event: &ProgressEvent| {
        sink_events.lock().unwrap().push(event.clone());
        if event.rows_done >= 100 {
            sink_stop.stop();
        }
    });

    let config = SeedConfig {
        progress_interval: 50,
        ..SeedConfig::default()
    }
    .with_seed(9)
    .with_workers(1)
    .with_executor(ExecutorKind::Threads)
    .with_batch_size(50)
    .with_rows("customers", 1000);
    let report = seeder(&db, config)
        .with_progress(sink)
        .with_stop_flag(stop.clone())
        .run()
        .unwrap();

    assert!(report.interrupted);
    assert!(!report.is_complete());

    let customers = report.table("customers").unwrap();
    assert_eq!(customers.state, TableState::Interrupted);
    assert_eq!(customers.rows_inserted, 100);
    assert_eq!(customers.shortfall_for(ShortfallReason::Interrupted), 900);
    assert_eq!(db.rows("customers").len(), 100);

    let orders = report.table("orders").unwrap();
    assert_eq!(orders.state, TableState::Interrupted);
    assert_eq!(orders.rows_inserted, 0);

    let seen = events.lock().unwrap();
    assert!(seen.iter().any(|e| e.table == "customers" && e.rows_done == 50));
    assert!(seen.iter().any(|e| e.table == "customers" && e.rows_done == 100));
}

#[test]
fn test_failed_parent_blocks_children_only() {
    let db = memory_db(SHOP_DDL);
    db.fail_always("customers");
    let config = SeedConfig {
        retry_backoff_ms: 1,
        ..SeedConfig::default()
    }
    .with_seed(6)
    .with_rows("customers", 30)
    .with_rows("products", 30)
    .with_rows("orders", 30)
    .with_rows("order_items", 30);
    let report = seeder(&db, config).run().unwrap();

    let customers = report.table("customers").unwrap();
    assert_eq!(customers.state, TableState::Failed);
    assert_eq!(customers.rows_inserted, 0);
    assert_eq!(customers.shortfall_for(ShortfallReason::BatchFailed), 30);
    assert_eq!(customers.batch_retries, 3);

    let orders = report.table("orders").unwrap();
    assert_eq!(orders.state, TableState::Failed);
    assert_eq!(orders.shortfall_for(ShortfallReason::ParentNotDone), 30);

    let order_items = report.table("order_items").unwrap();
    assert_eq!(order_items.state, TableState::Failed);

    let products = report.table("products").unwrap();
    assert_eq!(products.state, TableState::Done);
    assert_eq!(db.rows("products").len(), 30);

    assert_eq!(report.failed_tables().len(), 3);
}

#[test]
fn test_transient_failure_is_retried() {
    let db = memory_db(SHOP_DDL);
    db.fail_inserts("products", 2);
    let config = SeedConfig {
        retry_backoff_ms: 1,
        ..SeedConfig::default()
    }
    .with_seed(6)
    .with_rows("products", 10)
    .with_include_tables(&["products"]);
    let report = seeder(&db, config).run().unwrap();
    let products = report.table("products").unwrap();

    assert!(products.is_done());
    assert_eq!(products.rows_inserted, 10);
    assert_eq!(products.batch_retries, 2);
}

#[test]
fn test_same_seed_same_data() {
    let run = || {
        let db = memory_db(SHOP_DDL);
        let config = SeedConfig::default()
            .with_seed(1234)
            .with_workers(1)
            .with_executor(ExecutorKind::Threads)
            .with_batch_size(64)
            .with_rows("customers", 150)
            .with_rows("orders", 200);
        seeder(&db, config).run().unwrap();
        (sorted(db.rows("customers")), sorted(db.rows("orders")))
    };
    assert_eq!(run(), run());
}

#[test]
fn test_excluded_parent_without_rows_is_rejected() {
    let db = memory_db(SHOP_DDL);
    let config = SeedConfig {
        exclude_tables: vec!["customers".to_string()],
        ..SeedConfig::default()
    };
    let err = seeder(&db, config).run().unwrap_err();
    assert!(err.to_string().contains("customers"), "{}", err);
}

#[test]
fn test_dry_run_leaves_database_untouched() {
    let db = memory_db(SHOP_DDL);
    let config = SeedConfig {
        dry_run: true,
        ..SeedConfig::default()
    }
    .with_seed(7)
    .with_rows("customers", 25);
    let report = seeder(&db, config).run().unwrap();

    assert!(report.dry_run);
    assert_eq!(report.table("customers").unwrap().rows_inserted, 25);
    assert!(db.rows("customers").is_empty());
    assert!(db.rows("orders").is_empty());
}

#[test]
fn test_cycle_is_rejected_before_inserting() {
    let ddl = "
        CREATE TABLE a (id INT PRIMARY KEY, b_id INT REFERENCES b(id));
        CREATE TABLE b (id INT PRIMARY KEY, a_id INT REFERENCES a(id));
    ";
    let db = memory_db(ddl);
    let err = seeder(&db, SeedConfig::default()).run().unwrap_err();
    assert!(err.to_string().contains("cyclic"), "{}", err);
    assert!(db.rows("a").is_empty());
}

#[test]
fn test_truncate_replaces_existing_rows() {
    let db = memory_db(SHOP_DDL);
    let config = SeedConfig::default()
        .with_seed(13)
        .with_rows("products", 15)
        .with_include_tables(&["products"]);
    seeder(&db, config.clone()).run().unwrap();
    assert_eq!(db.rows("products").len(), 15);

    let config = SeedConfig {
        truncate_existing: true,
        ..config
    };
    let report = seeder(&db, config).run().unwrap();
    assert_eq!(report.table("products").unwrap().rows_before, 0);
    assert_eq!(db.rows("products").len(), 15);
}
