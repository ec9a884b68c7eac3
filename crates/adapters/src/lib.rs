pub mod export;

#[must_use]
pub fn adapter_name() -> &'static str {
    "sqlpad-adapters"
}
