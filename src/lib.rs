/// biblio-search - Bibliographic metadata search core
///
/// Full-text search over scholarly works with a dedicated engine, a relational
/// fallback, a shared result cache and bounded citation/collaboration graphs.

pub mod config;
pub mod core;
pub mod database;

#[cfg(test)]
mod tests;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
