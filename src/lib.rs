//! Sqlbridge - Configuration-Driven SQL Bridge
//!
//! Sqlbridge maps an incoming logical database name to one of several
//! independently configured database backends, resolves connection
//! parameters with positional-argument substitution extracted from that
//! name, and dispatches queries through a pluggable driver abstraction.
//!
//! # Core Principles
//! - One YAML document per logical database group, matched by regex
//! - Captured match groups fill `{{N}}` placeholders in configuration values
//! - Drivers are instantiated once per configuration and isolated per backend
//! - Fail-fast error propagation (no retries, no silent fallbacks)
//! - Registry rebuilds are atomic snapshot swaps, never in-place mutation
//!
//! # Architecture
//! This library provides the core resolution-and-dispatch pipeline. The CLI
//! binary is a thin wrapper over the same library calls; an HTTP transport
//! would consume the identical surface.
//!
//! # Module Organization
//! - [`error`] - Error types and stable error codes
//! - [`template`] - Placeholder substitution over configuration values
//! - [`driver`] - Driver contract, normalized results, driver registry
//! - [`config`] - Database configurations, directory registry, atomic reload
//! - [`output`] - JSON output envelope types
//!
//! # Example
//!
//! ```rust,no_run
//! use sqlbridge::Bridge;
//!
//! #[tokio::main]
//! async fn main() -> sqlbridge::Result<()> {
//!     let bridge = Bridge::open("/etc/sqlbridge/databases")?;
//!
//!     let registry = bridge.snapshot();
//!     let db = registry.resolve("inventory_eu")?;
//!     let result = db.run_query("SELECT * FROM stock LIMIT 10").await?;
//!
//!     println!("{}", serde_json::to_string(&result.rows).unwrap_or_default());
//!     Ok(())
//! }
//! ```

pub mod error;     // Error handling infrastructure
pub mod template;  // Parameter substitution engine
pub mod driver;    // Driver contract and driver registry
pub mod config;    // Database configurations and registry
pub mod output;    // JSON output envelopes

// Re-export commonly used types for convenience
pub use error::{BridgeError, Result};
pub use template::{substitute, TemplateValue};
pub use driver::{
    default_registry, ConnectionParams, Driver, DriverFactory, DriverRegistry, QueryResult, Row,
};
pub use config::{Bridge, ConfigRegistry, DatabaseConfig, ResolvedDatabase};
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
