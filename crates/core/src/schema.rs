use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySchema {
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    pub foreign_keys: Vec<ForeignKeySchema>,
}

impl TableSchema {
    fn matches(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self
                .columns
                .iter()
                .any(|column| column.name.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSchema {
    pub name: String,
    pub tables: Vec<TableSchema>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RelationshipDirection {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRelationship {
    pub direction: RelationshipDirection,
    pub source_column: String,
    pub related_table: String,
    pub related_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaCatalog {
    pub databases: Vec<DatabaseSchema>,
}

static BUILTIN: LazyLock<SchemaCatalog> = LazyLock::new(build_builtin);

impl SchemaCatalog {
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    #[must_use]
    pub fn database(&self, name: &str) -> Option<&DatabaseSchema> {
        self.databases.iter().find(|database| database.name == name)
    }

    #[must_use]
    pub fn table(&self, database_name: &str, table_name: &str) -> Option<&TableSchema> {
        self.database(database_name)?
            .tables
            .iter()
            .find(|table| table.name == table_name)
    }

    /// Keeps tables whose name or any column name contains `term`, ignoring
    /// case. Databases left without tables are dropped. A blank term keeps
    /// everything.
    #[must_use]
    pub fn filter(&self, term: &str) -> SchemaCatalog {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return self.clone();
        }

        let databases = self
            .databases
            .iter()
            .filter_map(|database| {
                let tables = database
                    .tables
                    .iter()
                    .filter(|table| table.matches(&needle))
                    .cloned()
                    .collect::<Vec<_>>();
                (!tables.is_empty()).then(|| DatabaseSchema {
                    name: database.name.clone(),
                    tables,
                })
            })
            .collect();
        SchemaCatalog { databases }
    }

    #[must_use]
    pub fn related_tables(&self, database_name: &str, table_name: &str) -> Vec<TableRelationship> {
        let mut relationships = Vec::new();
        let Some(database) = self.database(database_name) else {
            return relationships;
        };

        for table in &database.tables {
            for foreign_key in &table.foreign_keys {
                if table.name == table_name {
                    relationships.push(TableRelationship {
                        direction: RelationshipDirection::Outbound,
                        source_column: foreign_key.column_name.clone(),
                        related_table: foreign_key.referenced_table.clone(),
                        related_column: foreign_key.referenced_column.clone(),
                    });
                }
                if foreign_key.referenced_table == table_name {
                    relationships.push(TableRelationship {
                        direction: RelationshipDirection::Inbound,
                        source_column: foreign_key.referenced_column.clone(),
                        related_table: table.name.clone(),
                        related_column: foreign_key.column_name.clone(),
                    });
                }
            }
        }

        relationships.sort_by(|left, right| {
            left.direction
                .cmp(&right.direction)
                .then_with(|| left.related_table.cmp(&right.related_table))
        });
        relationships
    }
}

#[must_use]
pub fn select_table_sql(table: &str) -> String {
    format!("SELECT * FROM {table} LIMIT 100;")
}

#[must_use]
pub fn count_table_sql(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {table};")
}

fn column(name: &str, data_type: &str, nullable: bool) -> ColumnSchema {
    ColumnSchema {
        name: name.to_string(),
        data_type: data_type.to_string(),
        nullable,
        primary_key: false,
    }
}

fn primary(name: &str, data_type: &str) -> ColumnSchema {
    ColumnSchema {
        primary_key: true,
        ..column(name, data_type, false)
    }
}

fn foreign(column_name: &str, table: &str, referenced: &str) -> ForeignKeySchema {
    ForeignKeySchema {
        column_name: column_name.to_string(),
        referenced_table: table.to_string(),
        referenced_column: referenced.to_string(),
    }
}

fn table(
    name: &str,
    columns: Vec<ColumnSchema>,
    foreign_keys: Vec<ForeignKeySchema>,
) -> TableSchema {
    TableSchema {
        name: name.to_string(),
        columns,
        foreign_keys,
    }
}

fn build_builtin() -> SchemaCatalog {
    let sales = DatabaseSchema {
        name: "sales_db".to_string(),
        tables: vec![
            table(
                "users",
                vec![
                    primary("id", "INTEGER"),
                    column("username", "VARCHAR(50)", false),
                    column("email", "VARCHAR(100)", false),
                    column("first_name", "VARCHAR(50)", true),
                    column("last_name", "VARCHAR(50)", true),
                    column("created_at", "TIMESTAMP", false),
                    column("last_login", "TIMESTAMP", true),
                ],
                Vec::new(),
            ),
            table(
                "products",
                vec![
                    primary("id", "INTEGER"),
                    column("name", "VARCHAR(100)", false),
                    column("category", "VARCHAR(50)", false),
                    column("price", "DECIMAL(10,2)", false),
                    column("stock", "INTEGER", false),
                    column("description", "TEXT", true),
                    column("created_at", "TIMESTAMP", false),
                ],
                Vec::new(),
            ),
            table(
                "orders",
                vec![
                    primary("id", "INTEGER"),
                    column("user_id", "INTEGER", false),
                    column("total_amount", "DECIMAL(10,2)", false),
                    column("status", "VARCHAR(20)", false),
                    column("created_at", "TIMESTAMP", false),
                    column("updated_at", "TIMESTAMP", true),
                ],
                vec![foreign("user_id", "users", "id")],
            ),
            table(
                "order_items",
                vec![
                    primary("id", "INTEGER"),
                    column("order_id", "INTEGER", false),
                    column("product_id", "INTEGER", false),
                    column("quantity", "INTEGER", false),
                    column("price", "DECIMAL(10,2)", false),
                ],
                vec![
                    foreign("order_id", "orders", "id"),
                    foreign("product_id", "products", "id"),
                ],
            ),
            table(
                "monthly_sales",
                vec![
                    primary("month", "VARCHAR(20)"),
                    primary("year", "INTEGER"),
                    column("total_sales", "DECIMAL(15,2)", false),
                    column("total_orders", "INTEGER", false),
                    column("avg_order_value", "DECIMAL(10,2)", false),
                ],
                Vec::new(),
            ),
        ],
    };

    let marketing = DatabaseSchema {
        name: "marketing_db".to_string(),
        tables: vec![
            table(
                "campaigns",
                vec![
                    primary("id", "INTEGER"),
                    column("name", "VARCHAR(100)", false),
                    column("start_date", "DATE", false),
                    column("end_date", "DATE", true),
                    column("budget", "DECIMAL(12,2)", false),
                    column("status", "VARCHAR(20)", false),
                ],
                Vec::new(),
            ),
            table(
                "leads",
                vec![
                    primary("id", "INTEGER"),
                    column("campaign_id", "INTEGER", false),
                    column("email", "VARCHAR(100)", false),
                    column("phone", "VARCHAR(20)", true),
                    column("status", "VARCHAR(20)", false),
                    column("created_at", "TIMESTAMP", false),
                ],
                vec![foreign("campaign_id", "campaigns", "id")],
            ),
        ],
    };

    SchemaCatalog {
        databases: vec![sales, marketing],
    }
}

#[cfg(test)]
mod tests {
    use super::{count_table_sql, select_table_sql, RelationshipDirection, SchemaCatalog};

    #[test]
    fn builtin_catalog_lists_both_databases() {
        let catalog = SchemaCatalog::builtin();
        let names = catalog
            .databases
            .iter()
            .map(|database| database.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["sales_db", "marketing_db"]);
        assert_eq!(catalog.database("sales_db").map(|db| db.tables.len()), Some(5));

        let users = catalog.table("sales_db", "users").expect("users table");
        assert!(users.columns[0].primary_key);
        assert!(users.columns.iter().any(|column| column.name == "last_login" && column.nullable));
    }

    #[test]
    fn filter_matches_table_or_column_names() {
        let catalog = SchemaCatalog::builtin();

        let by_table = catalog.filter("LEAD");
        assert_eq!(by_table.databases.len(), 1);
        assert_eq!(by_table.databases[0].tables[0].name, "leads");

        let by_column = catalog.filter("budget");
        assert_eq!(by_column.databases[0].tables[0].name, "campaigns");

        let status = catalog.filter("status");
        let tables = status
            .databases
            .iter()
            .flat_map(|database| database.tables.iter().map(|table| table.name.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(tables, vec!["orders", "campaigns", "leads"]);

        assert!(catalog.filter("nothing_here").databases.is_empty());
        assert_eq!(&catalog.filter("  "), catalog);
    }

    #[test]
    fn related_tables_cover_both_directions() {
        let catalog = SchemaCatalog::builtin();
        let related = catalog.related_tables("sales_db", "orders");

        assert_eq!(related.len(), 2);
        assert_eq!(related[0].direction, RelationshipDirection::Outbound);
        assert_eq!(related[0].related_table, "users");
        assert_eq!(related[1].direction, RelationshipDirection::Inbound);
        assert_eq!(related[1].related_table, "order_items");
        assert_eq!(related[1].related_column, "order_id");

        assert!(catalog.related_tables("missing_db", "orders").is_empty());
    }

    #[test]
    fn generated_sql_templates() {
        assert_eq!(select_table_sql("users"), "SELECT * FROM users LIMIT 100;");
        assert_eq!(count_table_sql("users"), "SELECT COUNT(*) FROM users;");
    }
}
