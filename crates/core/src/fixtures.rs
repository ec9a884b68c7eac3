use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const BUILTIN_FIXTURES: &str = include_str!("../fixtures/builtin.json");

pub const LARGE_ORDERS_QUERY_ID: &str = "q6";
pub const EXTRA_LARGE_SALES_QUERY_ID: &str = "q7";
const LARGE_ORDERS_ROWS: usize = 1_000;
const EXTRA_LARGE_SALES_ROWS: usize = 10_000;
const GENERATED_SEED: u64 = 0x5eed_0f_5a1e5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(value) => write!(f, "{value}"),
            #[allow(clippy::cast_possible_truncation)]
            Self::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for CellValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Self, FixtureError> {
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(FixtureError::RowWidth {
                    row: index,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn record(&self, index: usize) -> Option<Record<'_>> {
        self.rows.get(index).map(|values| Record {
            columns: &self.columns,
            values,
        })
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|values| Record {
            columns: &self.columns,
            values,
        })
    }

    pub fn set_cell(&mut self, row: usize, column: &str, value: CellValue) -> bool {
        let Some(column_index) = self.columns.iter().position(|name| name == column) else {
            return false;
        };
        let Some(cells) = self.rows.get_mut(row) else {
            return false;
        };
        cells[column_index] = value;
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [CellValue],
}

impl<'a> Record<'a> {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a CellValue> {
        self.columns
            .iter()
            .position(|name| name == column)
            .and_then(|index| self.values.get(index))
    }

    #[must_use]
    pub fn values(&self) -> &'a [CellValue] {
        self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a CellValue)> {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredefinedQuery {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub query: String,
    #[serde(default)]
    pub execution_time: Option<String>,
}

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture pack at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse fixture pack `{origin}`: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("fixture pack defines no queries")]
    NoQueries,
    #[error("duplicate fixture query id `{0}`")]
    DuplicateQueryId(String),
    #[error("result row {row} has {found} values, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("invalid rows for fixture `{query_id}`: {source}")]
    InvalidResults {
        query_id: String,
        #[source]
        source: Box<FixtureError>,
    },
}

#[derive(Debug, Deserialize)]
struct RawResultSet {
    columns: Vec<String>,
    #[serde(default)]
    rows: Vec<Vec<CellValue>>,
}

#[derive(Debug, Deserialize)]
struct FixtureDocument {
    queries: Vec<PredefinedQuery>,
    #[serde(default)]
    results: HashMap<String, RawResultSet>,
}

#[derive(Debug, Clone)]
pub struct FixtureStore {
    queries: Vec<PredefinedQuery>,
    results: HashMap<String, Arc<ResultSet>>,
}

impl FixtureStore {
    pub fn new(
        queries: Vec<PredefinedQuery>,
        results: HashMap<String, ResultSet>,
    ) -> Result<Self, FixtureError> {
        if queries.is_empty() {
            return Err(FixtureError::NoQueries);
        }
        for (index, query) in queries.iter().enumerate() {
            if queries[..index].iter().any(|seen| seen.id == query.id) {
                return Err(FixtureError::DuplicateQueryId(query.id.clone()));
            }
        }

        Ok(Self {
            queries,
            results: results
                .into_iter()
                .map(|(id, rows)| (id, Arc::new(rows)))
                .collect(),
        })
    }

    pub fn builtin() -> Result<Self, FixtureError> {
        Self::from_json_str(BUILTIN_FIXTURES, "builtin")
    }

    pub fn builtin_with_generated() -> Result<Self, FixtureError> {
        let mut store = Self::builtin()?;
        store.add_generated_datasets();
        Ok(store)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| FixtureError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw, &path.display().to_string())
    }

    pub fn from_json_str(raw: &str, origin: &str) -> Result<Self, FixtureError> {
        let doc: FixtureDocument =
            serde_json::from_str(raw).map_err(|source| FixtureError::Parse {
                origin: origin.to_string(),
                source,
            })?;

        let mut results = HashMap::with_capacity(doc.results.len());
        for (query_id, raw_rows) in doc.results {
            let rows = ResultSet::new(raw_rows.columns, raw_rows.rows).map_err(|source| {
                FixtureError::InvalidResults {
                    query_id: query_id.clone(),
                    source: Box::new(source),
                }
            })?;
            results.insert(query_id, rows);
        }

        Self::new(doc.queries, results)
    }

    pub fn add_generated_datasets(&mut self) {
        self.insert(
            PredefinedQuery {
                id: LARGE_ORDERS_QUERY_ID.to_string(),
                name: "All Orders (Large Dataset)".to_string(),
                description: "Performance test with a large dataset of 1000 orders".to_string(),
                query: "SELECT * FROM orders\n\
                        JOIN customers ON orders.customer_id = customers.id\n\
                        JOIN products ON orders.product_id = products.id;"
                    .to_string(),
                execution_time: Some("0.214s".to_string()),
            },
            generate_orders(LARGE_ORDERS_ROWS, GENERATED_SEED),
        );
        self.insert(
            PredefinedQuery {
                id: EXTRA_LARGE_SALES_QUERY_ID.to_string(),
                name: "All Sales (Virtualized 10K Rows)".to_string(),
                description:
                    "Performance demonstration with 10,000 rows using virtualized rendering"
                        .to_string(),
                query: "SELECT * FROM sales JOIN products ON sales.product_id = products.id \
                        ORDER BY date DESC;"
                    .to_string(),
                execution_time: Some("0.456s".to_string()),
            },
            generate_sales(EXTRA_LARGE_SALES_ROWS, GENERATED_SEED.wrapping_add(1)),
        );
    }

    pub fn insert(&mut self, query: PredefinedQuery, rows: ResultSet) {
        let id = query.id.clone();
        if let Some(existing) = self.queries.iter_mut().find(|existing| existing.id == id) {
            *existing = query;
        } else {
            self.queries.push(query);
        }
        self.results.insert(id, Arc::new(rows));
    }

    /// Drops a query. Refuses to remove the last remaining one.
    pub fn remove(&mut self, query_id: &str) -> bool {
        if self.queries.len() == 1 {
            return false;
        }
        let original_len = self.queries.len();
        self.queries.retain(|query| query.id != query_id);
        self.results.remove(query_id);
        self.queries.len() != original_len
    }

    #[must_use]
    pub fn list_queries(&self) -> &[PredefinedQuery] {
        &self.queries
    }

    #[must_use]
    pub fn first_query(&self) -> &PredefinedQuery {
        // `new` rejects empty packs and `remove` keeps the last query.
        &self.queries[0]
    }

    #[must_use]
    pub fn query(&self, query_id: &str) -> Option<&PredefinedQuery> {
        self.queries.iter().find(|query| query.id == query_id)
    }

    #[must_use]
    pub fn contains(&self, query_id: &str) -> bool {
        self.query(query_id).is_some()
    }

    #[must_use]
    pub fn results_for(&self, query_id: &str) -> Option<Arc<ResultSet>> {
        self.results.get(query_id).cloned()
    }

    #[must_use]
    pub fn find_by_text(&self, text: &str) -> Option<&PredefinedQuery> {
        let needle = text.trim();
        self.queries
            .iter()
            .find(|query| query.query.trim() == needle)
    }
}

fn generate_orders(row_count: usize, seed: u64) -> ResultSet {
    const CATEGORIES: [&str; 7] = [
        "Electronics",
        "Clothing",
        "Footwear",
        "Home Goods",
        "Appliances",
        "Food",
        "Beverages",
    ];
    const STATUSES: [&str; 5] = ["Completed", "Processing", "Shipped", "Cancelled", "Returned"];

    let mut rng = StdRng::seed_from_u64(seed);
    let columns = [
        "order_id",
        "customer_name",
        "product_name",
        "category",
        "price",
        "quantity",
        "total",
        "order_date",
        "status",
    ]
    .iter()
    .map(|column| (*column).to_string())
    .collect();

    let rows = (1..=row_count)
        .map(|index| {
            let month = rng.gen_range(1..=12);
            let day = rng.gen_range(1..=28);
            vec![
                CellValue::from(i64::try_from(index).unwrap_or(i64::MAX)),
                CellValue::from(format!("Customer {index}")),
                CellValue::from(format!("Product {}", rng.gen_range(1..=500))),
                CellValue::from(CATEGORIES[rng.gen_range(0..CATEGORIES.len())]),
                CellValue::from(round_cents(rng.gen_range(10.0..1_010.0))),
                CellValue::from(rng.gen_range(1_i64..=10)),
                CellValue::from(round_cents(rng.gen_range(50.0..5_050.0))),
                CellValue::from(format!("2023-{month:02}-{day:02}")),
                CellValue::from(STATUSES[rng.gen_range(0..STATUSES.len())]),
            ]
        })
        .collect();

    ResultSet { columns, rows }
}

fn generate_sales(row_count: usize, seed: u64) -> ResultSet {
    const PRODUCTS: [&str; 10] = [
        "Laptop",
        "Smartphone",
        "Tablet",
        "Headphones",
        "Monitor",
        "Keyboard",
        "Mouse",
        "Printer",
        "Speaker",
        "Camera",
    ];
    const COMPANIES: [&str; 10] = [
        "Apple",
        "Samsung",
        "Microsoft",
        "Google",
        "Dell",
        "HP",
        "Lenovo",
        "Sony",
        "LG",
        "Asus",
    ];
    const REGIONS: [&str; 5] = ["North", "South", "East", "West", "Central"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    const YEARS: [i64; 4] = [2020, 2021, 2022, 2023];

    let mut rng = StdRng::seed_from_u64(seed);
    let columns = [
        "id",
        "product",
        "region",
        "date",
        "quantity",
        "unit_price",
        "total_amount",
        "is_priority",
        "status",
    ]
    .iter()
    .map(|column| (*column).to_string())
    .collect();

    let rows = (1..=row_count)
        .map(|index| {
            let product = PRODUCTS[rng.gen_range(0..PRODUCTS.len())];
            let company = COMPANIES[rng.gen_range(0..COMPANIES.len())];
            let region = REGIONS[rng.gen_range(0..REGIONS.len())];
            let month = MONTHS[rng.gen_range(0..MONTHS.len())];
            let year = YEARS[rng.gen_range(0..YEARS.len())];
            let quantity = rng.gen_range(1_i64..=100);
            let unit_price = round_cents(rng.gen_range(50.0..1_050.0));
            #[allow(clippy::cast_precision_loss)]
            let total = round_cents(quantity as f64 * unit_price);
            let status = if rng.gen_bool(0.8) {
                "Completed"
            } else if rng.gen_bool(0.5) {
                "In Progress"
            } else {
                "Cancelled"
            };

            vec![
                CellValue::from(i64::try_from(index).unwrap_or(i64::MAX)),
                CellValue::from(format!("{company} {product}")),
                CellValue::from(region),
                CellValue::from(format!("{month} {year}")),
                CellValue::from(quantity),
                CellValue::from(unit_price),
                CellValue::from(total),
                CellValue::from(rng.gen_bool(0.3)),
                CellValue::from(status),
            ]
        })
        .collect();

    ResultSet { columns, rows }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
