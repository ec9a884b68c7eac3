use std::sync::LazyLock;

use regex::Regex;

pub const DEFAULT_TAB_NAME: &str = "New Query";
pub const OUTPUT_TAB_SUFFIX: &str = " Output";
pub const VISUALIZATION_TAB_SUFFIX: &str = " Visualization";

static STATEMENT_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(SELECT|INSERT|UPDATE|DELETE|CREATE|ALTER|DROP)\s+(?:.*?FROM\s+)?([^\s;]+)",
    )
    .expect("valid regex")
});

#[must_use]
pub fn derive_tab_name(sql: &str) -> String {
    let Some(captures) = STATEMENT_HEAD.captures(sql.trim()) else {
        return DEFAULT_TAB_NAME.to_string();
    };

    match (captures.get(1), captures.get(2)) {
        (Some(verb), Some(target)) => format!("{} {}", verb.as_str(), target.as_str()),
        _ => DEFAULT_TAB_NAME.to_string(),
    }
}

#[must_use]
pub fn output_tab_name(source_tab_name: &str) -> String {
    format!("{source_tab_name}{OUTPUT_TAB_SUFFIX}")
}

#[must_use]
pub fn visualization_tab_name(source_output_name: &str) -> String {
    format!("{source_output_name}{VISUALIZATION_TAB_SUFFIX}")
}

#[must_use]
pub fn table_tab_name(table: &str) -> String {
    format!("SELECT {table}")
}
