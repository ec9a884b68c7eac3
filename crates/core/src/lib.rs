pub mod config;
pub mod executor;
pub mod fixtures;
pub mod history;
pub mod layout;
pub mod naming;
pub mod schema;
pub mod session;
pub mod sync;
pub mod tabs;

#[must_use]
pub fn domain_name() -> &'static str {
    "sqlpad-core"
}
