//! Catalog decoding through to the DDL issued on the target.

mod common;

use std::sync::Arc;

use common::{
    orchestrator, test_config, FakeForeignKey, FakeIndex, FakePrimaryKey, FakeSource, FakeTable, FakeTarget,
    INTEGER, SERIAL_NOT_NULL, VARCHAR,
};
use informix_pg_migrate::{CatalogReader, CheckpointRecord, MigrationConcern};
use tempfile::TempDir;

fn orders_source() -> FakeSource {
    let mut source = FakeSource::new(vec![
        FakeTable::with_columns(
            101,
            "orders",
            &[("id", SERIAL_NOT_NULL, 4), ("customer", INTEGER, 4), ("region", VARCHAR, 20)],
        ),
        FakeTable::with_columns(102, "audit_log", &[("id", INTEGER, 4), ("msg", VARCHAR, 200)]),
    ]);
    source.primary_keys.push(FakePrimaryKey {
        tabid: 101,
        table: "orders".to_string(),
        constraint: "pk_orders".to_string(),
        index: " 101_1".to_string(),
        parts: vec![1],
    });
    // Backs pk_orders; the indexes concern must leave it alone.
    source.indexes.push(FakeIndex {
        tabid: 101,
        table: "orders".to_string(),
        name: " 101_1".to_string(),
        unique: true,
        parts: vec![1],
    });
    source.indexes.push(FakeIndex {
        tabid: 101,
        table: "orders".to_string(),
        name: "ix_orders_region".to_string(),
        unique: true,
        parts: vec![3, -1],
    });
    source.indexes.push(FakeIndex {
        tabid: 102,
        table: "audit_log".to_string(),
        name: "ix_audit_msg".to_string(),
        unique: false,
        parts: vec![2],
    });
    source
}

#[tokio::test]
async fn test_tables_listed_smallest_first() {
    let source = FakeSource::new(vec![
        FakeTable::numbered(101, "big", 30),
        FakeTable::numbered(102, "small", 1),
        FakeTable::numbered(103, "medium", 10),
    ]);

    let listing = CatalogReader::new(&source).list_tables().await.unwrap();

    let names: Vec<&str> = listing.descriptors.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["small", "medium", "big"]);
    assert!(listing.rejected.is_empty());
}

#[tokio::test]
async fn test_index_part_signs_become_sort_directions() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(orders_source());
    let target = Arc::new(FakeTarget::new());

    let summary = orchestrator(test_config(500, false), &source, &target, dir.path())
        .migrate_indexes()
        .await
        .unwrap();

    assert_eq!(summary.completed, 2);
    let created = target.statements_starting_with("CREATE UNIQUE INDEX");
    assert_eq!(created.len(), 1);
    assert!(
        created[0].ends_with("ON public.orders (region ASC, id DESC)"),
        "{}",
        created[0]
    );
    let plain = target.statements_starting_with("CREATE INDEX");
    assert_eq!(plain.len(), 1);
    assert!(plain[0].ends_with("ON public.audit_log (msg ASC)"), "{}", plain[0]);
}

#[tokio::test]
async fn test_primary_key_uses_target_naming() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(orders_source());
    let target = Arc::new(FakeTarget::new());

    let summary = orchestrator(test_config(500, false), &source, &target, dir.path())
        .migrate_primary_keys()
        .await
        .unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(
        target.statements(),
        vec!["ALTER TABLE public.orders ADD CONSTRAINT orders_pkey PRIMARY KEY (id)".to_string()]
    );
    let record = CheckpointRecord::read(&MigrationConcern::PrimaryKeys.path_in(dir.path()))
        .unwrap()
        .unwrap();
    assert!(record.is_completed("orders.pk_orders"));
}

#[tokio::test]
async fn test_unknown_column_ordinal_fails_only_that_index() {
    let dir = TempDir::new().unwrap();
    let mut source = orders_source();
    source.indexes.push(FakeIndex {
        tabid: 101,
        table: "orders".to_string(),
        name: "ix_orders_ghost".to_string(),
        unique: false,
        parts: vec![9],
    });
    let source = Arc::new(source);
    let target = Arc::new(FakeTarget::new());

    let summary = orchestrator(test_config(500, false), &source, &target, dir.path())
        .migrate_indexes()
        .await
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].key, "orders.ix_orders_ghost");
    assert!(summary.failures[0]
        .detail
        .contains("column ordinal 9 does not exist"));

    let record = CheckpointRecord::read(&MigrationConcern::Indexes.path_in(dir.path()))
        .unwrap()
        .unwrap();
    assert!(record.is_failed("orders.ix_orders_ghost"));
    assert_eq!(record.completed.len(), 2);
}

#[tokio::test]
async fn test_excluded_tables_are_not_indexed() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(orders_source());
    let target = Arc::new(FakeTarget::new());
    let mut config = test_config(500, false);
    config.migration.exclude_tables = vec!["audit*".to_string()];

    let summary = orchestrator(config, &source, &target, dir.path())
        .migrate_indexes()
        .await
        .unwrap();

    assert_eq!(summary.total, 1);
    assert_eq!(summary.completed, 1);
    assert!(target
        .statements()
        .iter()
        .all(|s| !s.contains("audit_log")));
}

#[tokio::test]
async fn test_second_index_run_skips_completed() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(orders_source());
    let target = Arc::new(FakeTarget::new());

    orchestrator(test_config(500, false), &source, &target, dir.path())
        .migrate_indexes()
        .await
        .unwrap();
    let summary = orchestrator(test_config(500, false), &source, &target, dir.path())
        .migrate_indexes()
        .await
        .unwrap();

    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.completed, 0);
    assert_eq!(target.statements().len(), 2);
}

#[tokio::test]
async fn test_primary_key_index_is_not_recreated() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(orders_source());
    let target = Arc::new(FakeTarget::new());

    let summary = orchestrator(test_config(500, false), &source, &target, dir.path())
        .migrate_indexes()
        .await
        .unwrap();

    assert_eq!(summary.total, 2);
    let indexes = target.statements_starting_with("CREATE");
    assert_eq!(indexes.len(), 2, "{:?}", indexes);
    assert!(indexes.iter().all(|s| !s.contains("101_1") && !s.ends_with("(id ASC)")));

    let record = CheckpointRecord::read(&MigrationConcern::Indexes.path_in(dir.path()))
        .unwrap()
        .unwrap();
    assert!(record.completed.iter().all(|key| !key.contains("101_1")));
}

/// customers(id, region) is referenced by orders(cust_id, cust_region).
fn shop_source(delete_rule: &'static str) -> FakeSource {
    let mut source = FakeSource::new(vec![
        FakeTable::with_columns(201, "customers", &[("id", INTEGER, 4), ("region", VARCHAR, 8), ("name", VARCHAR, 40)]),
        FakeTable::with_columns(
            202,
            "orders",
            &[("id", SERIAL_NOT_NULL, 4), ("cust_id", INTEGER, 4), ("cust_region", VARCHAR, 8)],
        ),
        FakeTable::with_columns(203, "archive", &[("id", INTEGER, 4), ("cust_id", INTEGER, 4)]),
    ]);
    // Catalog order is child table name, then constraint name.
    source.foreign_keys.push(FakeForeignKey {
        tabid: 203,
        table: "archive".to_string(),
        constraint: "fk_archive_order".to_string(),
        parent_tabid: 202,
        parent_table: "orders".to_string(),
        parts: vec![1],
        parent_parts: vec![1],
        delete_rule: "R",
        update_rule: " ",
    });
    source.foreign_keys.push(FakeForeignKey {
        tabid: 202,
        table: "orders".to_string(),
        constraint: "fk_cust".to_string(),
        parent_tabid: 201,
        parent_table: "customers".to_string(),
        parts: vec![2, 3],
        parent_parts: vec![1, 2],
        delete_rule,
        update_rule: " ",
    });
    source
}

#[tokio::test]
async fn test_composite_foreign_key_with_cascade() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(shop_source("C"));
    let target = Arc::new(FakeTarget::new());

    let summary = orchestrator(test_config(500, false), &source, &target, dir.path())
        .migrate_foreign_keys()
        .await
        .unwrap();

    assert_eq!(summary.total, 2);
    assert_eq!(summary.completed, 2);
    assert_eq!(
        target.statements(),
        vec![
            "ALTER TABLE public.archive ADD CONSTRAINT archive_fk_archive_order_fkey \
             FOREIGN KEY (id) REFERENCES public.orders (id) ON DELETE RESTRICT"
                .to_string(),
            "ALTER TABLE public.orders ADD CONSTRAINT orders_fk_cust_fkey \
             FOREIGN KEY (cust_id, cust_region) REFERENCES public.customers (id, region) \
             ON DELETE CASCADE"
                .to_string(),
        ]
    );

    let record = CheckpointRecord::read(&MigrationConcern::ForeignKeys.path_in(dir.path()))
        .unwrap()
        .unwrap();
    assert!(record.is_completed("orders.fk_cust"));
    assert!(record.is_completed("archive.fk_archive_order"));
}

#[tokio::test]
async fn test_foreign_key_without_rule_has_no_clause() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(shop_source(" "));
    let target = Arc::new(FakeTarget::new());
    let mut config = test_config(500, false);
    config.migration.exclude_tables = vec!["archive".to_string()];

    let summary = orchestrator(config, &source, &target, dir.path())
        .migrate_foreign_keys()
        .await
        .unwrap();

    assert_eq!(summary.total, 1);
    let statements = target.statements();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].ends_with("REFERENCES public.customers (id, region)"), "{}", statements[0]);
}

#[tokio::test]
async fn test_foreign_key_rerun_skips_completed() {
    let dir = TempDir::new().unwrap();
    let source = Arc::new(shop_source("C"));
    let target = Arc::new(FakeTarget::new());
    let mut config = test_config(500, false);
    config.migration.exclude_tables = vec!["archive".to_string()];
    let first = orchestrator(config, &source, &target, dir.path())
        .migrate_foreign_keys()
        .await
        .unwrap();
    assert_eq!(first.completed, 1);

    let second = orchestrator(test_config(500, false), &source, &target, dir.path())
        .migrate_foreign_keys()
        .await
        .unwrap();
    assert_eq!(second.skipped, 1);
    assert_eq!(second.completed, 1);

    let rerun = orchestrator(test_config(500, false), &source, &target, dir.path())
        .migrate_foreign_keys()
        .await
        .unwrap();

    assert_eq!(rerun.skipped, 2);
    assert_eq!(rerun.completed, 0);
    assert_eq!(target.statements_starting_with("ALTER TABLE").len(), 2);
}
