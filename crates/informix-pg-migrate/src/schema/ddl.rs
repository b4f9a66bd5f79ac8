//! DDL rendering. Pure functions from descriptors to PostgreSQL statements.

use crate::core::identifier::{escape_identifier, normalize_index_name, qualify, truncate_identifier};
use crate::source::{ForeignKeyDescriptor, IndexDescriptor, ResolvedColumn, TableDescriptor};

/// `DROP TABLE IF EXISTS ... CASCADE`.
pub fn drop_table(schema: &str, table: &str) -> String {
    format!("DROP TABLE IF EXISTS {} CASCADE", qualify(schema, table))
}

/// `CREATE TABLE` with columns in catalog order.
pub fn create_table(schema: &str, table: &TableDescriptor) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("    {}", c.definition()))
        .collect();
    format!(
        "CREATE TABLE {} (\n{}\n)",
        qualify(schema, &table.name),
        columns.join(",\n")
    )
}

/// `TRUNCATE TABLE` for a data refresh.
pub fn truncate_table(schema: &str, table: &str) -> String {
    format!("TRUNCATE TABLE {}", qualify(schema, table))
}

/// Target name of a table's primary key: `<table>_pkey`.
pub fn primary_key_name(table: &str) -> String {
    truncate_identifier(&format!("{}_pkey", table).to_lowercase())
}

/// `ALTER TABLE ... ADD CONSTRAINT <table>_pkey PRIMARY KEY (...)`.
pub fn add_primary_key(schema: &str, table: &str, columns: &[ResolvedColumn]) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
        qualify(schema, table),
        escape_identifier(&primary_key_name(table)),
        column_list(columns)
    )
}

/// Target name of a foreign key: `<child>_<constraint>_fkey`, lowercased.
///
/// Distinct source constraints can collide once truncated to 63 characters.
pub fn foreign_key_name(child_table: &str, constraint: &str) -> String {
    truncate_identifier(&format!("{}_{}_fkey", child_table, constraint).to_lowercase())
}

/// `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY ... REFERENCES ...`.
///
/// `ON DELETE`/`ON UPDATE` are only rendered for CASCADE and RESTRICT.
pub fn add_foreign_key(
    schema: &str,
    fk: &ForeignKeyDescriptor,
    columns: &[ResolvedColumn],
    referenced: &[ResolvedColumn],
) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        qualify(schema, &fk.table),
        escape_identifier(&foreign_key_name(&fk.table, &fk.constraint_name)),
        column_list(columns),
        qualify(schema, &fk.referenced_table),
        column_list(referenced)
    );
    if let Some(action) = fk.on_delete.action() {
        sql.push_str(" ON DELETE ");
        sql.push_str(action);
    }
    if let Some(action) = fk.on_update.action() {
        sql.push_str(" ON UPDATE ");
        sql.push_str(action);
    }
    sql
}

/// Target name of a secondary index.
pub fn index_name(index: &IndexDescriptor) -> String {
    normalize_index_name(&index.name, &index.table)
}

/// `CREATE [UNIQUE] INDEX` with per-column sort direction.
pub fn create_index(schema: &str, index: &IndexDescriptor, columns: &[ResolvedColumn]) -> String {
    let columns: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", c.escaped(), c.order))
        .collect();
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        escape_identifier(&index_name(index)),
        qualify(schema, &index.table),
        columns.join(", ")
    )
}

fn column_list(columns: &[ResolvedColumn]) -> String {
    columns
        .iter()
        .map(ResolvedColumn::escaped)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{KeyColumnRef, ReferentialRule, SortOrder};

    fn resolved(name: &str, order: SortOrder) -> ResolvedColumn {
        ResolvedColumn {
            name: name.to_string(),
            order,
        }
    }

    fn fk(on_delete: ReferentialRule, on_update: ReferentialRule) -> ForeignKeyDescriptor {
        let part = KeyColumnRef {
            ordinal: 2,
            order: SortOrder::Asc,
        };
        ForeignKeyDescriptor {
            table: "items".into(),
            tabid: 102,
            constraint_name: "R102_7".into(),
            columns: vec![part],
            referenced_table: "orders".into(),
            referenced_tabid: 101,
            referenced_columns: vec![part],
            on_delete,
            on_update,
        }
    }

    #[test]
    fn test_foreign_key_cascade_rendering() {
        let sql = add_foreign_key(
            "public",
            &fk(ReferentialRule::Cascade, ReferentialRule::NoAction),
            &[resolved("order_id", SortOrder::Asc)],
            &[resolved("id", SortOrder::Asc)],
        );
        assert_eq!(
            sql,
            "ALTER TABLE public.items ADD CONSTRAINT items_r102_7_fkey FOREIGN KEY (order_id) \
             REFERENCES public.orders (id) ON DELETE CASCADE"
        );
    }

    #[test]
    fn test_foreign_key_unrecognized_rule_renders_nothing() {
        let descriptor = fk(
            ReferentialRule::from_code(Some("Z")),
            ReferentialRule::Restrict,
        );
        let sql = add_foreign_key(
            "public",
            &descriptor,
            &[resolved("order_id", SortOrder::Asc)],
            &[resolved("id", SortOrder::Asc)],
        );
        assert!(!sql.contains("ON DELETE"));
        assert!(sql.ends_with("ON UPDATE RESTRICT"));
    }

    #[test]
    fn test_foreign_key_name_truncated() {
        let name = foreign_key_name(&"t".repeat(50), "CONSTRAINT_NAME");
        assert_eq!(name.len(), 63);
        assert!(name.starts_with("ttt"));
        assert!(name.chars().all(|c| !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_primary_key_statement() {
        let sql = add_primary_key(
            "public",
            "orders",
            &[resolved("region", SortOrder::Asc), resolved("user", SortOrder::Desc)],
        );
        assert_eq!(
            sql,
            "ALTER TABLE public.orders ADD CONSTRAINT orders_pkey PRIMARY KEY (region, \"user\")"
        );
    }

    #[test]
    fn test_index_statement_directions() {
        let index = IndexDescriptor {
            table: "orders".into(),
            tabid: 101,
            name: " 101_3".into(),
            unique: true,
            columns: Vec::new(),
        };
        let sql = create_index(
            "stage",
            &index,
            &[resolved("region", SortOrder::Asc), resolved("id", SortOrder::Desc)],
        );
        assert_eq!(
            sql,
            "CREATE UNIQUE INDEX idx_101_3 ON stage.orders (region ASC, id DESC)"
        );
    }

    #[test]
    fn test_drop_and_create_table() {
        assert_eq!(
            drop_table("public", "order"),
            "DROP TABLE IF EXISTS public.\"order\" CASCADE"
        );

        let mapped = crate::typemap::map_type(262, 4);
        let table = TableDescriptor {
            name: "orders".into(),
            tabid: 101,
            columns: vec![crate::source::ColumnDescriptor {
                name: "id".into(),
                escaped_name: "id".into(),
                ordinal: 1,
                raw_type: 262,
                source_type: mapped.source,
                length: 4,
                target_type: mapped.target,
                nullable: false,
            }],
            estimated_rows: 0,
        };
        assert_eq!(
            create_table("public", &table),
            "CREATE TABLE public.orders (\n    id serial NOT NULL\n)"
        );
    }
}
