//! Driver Contract and Driver Registry
//!
//! This module defines the capability set every database backend must
//! implement, the normalized result types drivers return, and the registry
//! that instantiates a driver from its short string name.
//!
//! # Per-Call Connection Scope
//! Drivers are expected to open a connection, execute, and close within each
//! call. The contract does not mandate this lifecycle - an implementation may
//! hold a persistent connection - but it must keep `run_query` safe to call
//! from concurrent requests and must always return fully materialized rows,
//! never a live cursor.
//!
//! # Backend Isolation
//! Each driver implementation is completely independent. No shared SQL
//! helpers or cross-backend abstractions beyond the literal formatting used
//! for stored-procedure variables.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::template::TemplateValue;

// Driver implementations
#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "mssql")]
pub mod mssql;

/// A single result row: column name to JSON-safe value
pub type Row = HashMap<String, serde_json::Value>;

/// Query execution result
///
/// All rows are collected before the result crosses the driver boundary;
/// the resolution layers above are synchronous and short-lived per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in result set order
    pub columns: Vec<String>,

    /// Result rows (each row is a map of column name to value)
    pub rows: Vec<Row>,

    /// Number of rows affected (for INSERT/UPDATE/DELETE)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
}

impl QueryResult {
    /// An empty result set with no affected-row count
    #[must_use]
    pub fn empty() -> Self {
        Self { columns: Vec::new(), rows: Vec::new(), rows_affected: None }
    }
}

/// Resolved connection parameters handed to a driver on each call.
///
/// This is the configuration's `connection` mapping after placeholder
/// substitution. The shape is driver-specific; the typed accessors let each
/// backend extract what it needs and fail with a uniform error when a
/// required key is missing or has the wrong type.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams(BTreeMap<String, TemplateValue>);

impl ConnectionParams {
    /// Wrap a substituted `connection` value; it must be a mapping
    pub fn from_value(value: TemplateValue) -> Result<Self> {
        match value {
            TemplateValue::Mapping(map) => Ok(Self(map)),
            _ => Err(BridgeError::configuration("'connection' must be a mapping")),
        }
    }

    /// Look up a raw parameter value
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TemplateValue> {
        self.0.get(key)
    }

    /// Parameter names present in this mapping
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Require a string parameter
    pub fn require_str(&self, key: &str) -> Result<&str> {
        match self.0.get(key) {
            Some(TemplateValue::String(s)) => Ok(s),
            Some(_) => {
                Err(BridgeError::invalid_input(format!("connection parameter '{key}' must be a string")))
            }
            None => Err(BridgeError::invalid_input(format!("connection parameter '{key}' is required"))),
        }
    }

    /// Require a port number; accepts an integer or a numeric string
    /// (substituted values arrive as strings)
    pub fn require_port(&self, key: &str) -> Result<u16> {
        match self.0.get(key) {
            Some(value) => parse_port(key, value),
            None => Err(BridgeError::invalid_input(format!("connection parameter '{key}' is required"))),
        }
    }

    /// Port number with a fallback when the key is absent
    pub fn port_or(&self, key: &str, default: u16) -> Result<u16> {
        match self.0.get(key) {
            Some(value) => parse_port(key, value),
            None => Ok(default),
        }
    }

    /// Optional boolean parameter
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.0.get(key) {
            Some(TemplateValue::Bool(b)) => Ok(*b),
            Some(_) => {
                Err(BridgeError::invalid_input(format!("connection parameter '{key}' must be a boolean")))
            }
            None => Ok(default),
        }
    }
}

fn parse_port(key: &str, value: &TemplateValue) -> Result<u16> {
    let out_of_range =
        || BridgeError::invalid_input(format!("connection parameter '{key}' is not a valid port"));
    match value {
        TemplateValue::Integer(i) => u16::try_from(*i).map_err(|_| out_of_range()),
        TemplateValue::String(s) => s.parse::<u16>().map_err(|_| out_of_range()),
        _ => Err(out_of_range()),
    }
}

/// Database driver contract
///
/// One instance is constructed per database configuration at load time and
/// reused for every subsequent call against that configuration. Methods take
/// the substituted connection parameters because placeholder values are only
/// known once a concrete logical name has matched.
///
/// `run_update` and `run_delete` default to `run_query`; backends needing
/// different handling override them independently. `run_stored_proc` defaults
/// to an `Unsupported` error for backends without stored-procedure support.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Short driver name, matching its registry key (e.g. "mysql")
    fn name(&self) -> &'static str;

    /// Establish and validate a backend connection.
    ///
    /// For per-call drivers this opens and closes a probe connection; it
    /// never leaves state behind. Fails with `ConnectionFailed` on
    /// network or authentication failure.
    async fn connect(&self, params: &ConnectionParams) -> Result<()>;

    /// Execute an arbitrary statement and return materialized rows
    async fn run_query(&self, params: &ConnectionParams, sql: &str) -> Result<QueryResult>;

    /// Run an update statement; defaults to `run_query`
    async fn run_update(&self, params: &ConnectionParams, sql: &str) -> Result<QueryResult> {
        self.run_query(params, sql).await
    }

    /// Run a delete statement; defaults to `run_query`
    async fn run_delete(&self, params: &ConnectionParams, sql: &str) -> Result<QueryResult> {
        self.run_query(params, sql).await
    }

    /// Execute a named stored procedure with positional variables
    async fn run_stored_proc(
        &self,
        params: &ConnectionParams,
        proc_name: &str,
        variables: &[serde_json::Value],
    ) -> Result<QueryResult> {
        let _ = (params, variables);
        Err(BridgeError::unsupported(format!(
            "driver '{}' does not support stored procedures (requested '{proc_name}')",
            self.name()
        )))
    }
}

/// Factory function constructing a driver from a parsed configuration
/// document (the full field mapping, exposing at minimum `connection`).
pub type DriverFactory = fn(&BTreeMap<String, TemplateValue>) -> Result<Arc<dyn Driver>>;

/// Registry of driver implementations keyed by short string identifiers.
///
/// New backends are added by registering a factory under a new key; the
/// compiled-in backends live in the process-wide table returned by
/// [`default_registry`].
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Create a registry pre-populated with the compiled-in drivers
    #[must_use]
    pub fn with_builtin_drivers() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "mysql")]
        registry.register("mysql", mysql::factory);

        #[cfg(feature = "mssql")]
        registry.register("mssql", mssql::factory);

        registry
    }

    /// Register a driver factory under a short name.
    ///
    /// Re-registering a name replaces the previous factory; configurations
    /// loaded earlier keep the driver instance they were built with.
    pub fn register(&mut self, name: impl Into<String>, factory: DriverFactory) {
        let name = name.into();
        tracing::debug!(driver = %name, "Registered driver factory");
        self.factories.insert(name, factory);
    }

    /// Instantiate a driver by name for one configuration document.
    ///
    /// Unknown names fail with `DriverNotFound`; nothing is silently
    /// registered in their place.
    pub fn load(
        &self,
        name: &str,
        fields: &BTreeMap<String, TemplateValue>,
    ) -> Result<Arc<dyn Driver>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| BridgeError::driver_not_found(name))?;
        factory(fields)
    }

    /// Whether a driver is registered under `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered driver names, sorted
    #[must_use]
    pub fn driver_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_builtin_drivers()
    }
}

/// Process-wide driver table with the compiled-in backends.
///
/// Built once on first use; subsequent calls return the same table. Callers
/// needing additional backends construct their own [`DriverRegistry`] and
/// pass it to the configuration loader instead.
pub fn default_registry() -> &'static DriverRegistry {
    static REGISTRY: OnceLock<DriverRegistry> = OnceLock::new();
    REGISTRY.get_or_init(DriverRegistry::with_builtin_drivers)
}

/// Borrow the `connection` mapping out of a configuration document.
///
/// Shared by driver factories for load-time validation of required keys.
pub fn connection_template(
    fields: &BTreeMap<String, TemplateValue>,
) -> Result<&BTreeMap<String, TemplateValue>> {
    fields
        .get("connection")
        .ok_or_else(|| BridgeError::configuration("missing 'connection' mapping"))?
        .as_mapping()
        .ok_or_else(|| BridgeError::configuration("'connection' must be a mapping"))
}

/// Render a stored-procedure variable as a SQL literal.
///
/// Only scalar JSON values are accepted; structured values have no portable
/// literal form.
pub(crate) fn sql_literal(value: &serde_json::Value) -> Result<String> {
    match value {
        serde_json::Value::Null => Ok("NULL".to_string()),
        serde_json::Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(
            BridgeError::invalid_input("stored procedure variables must be scalar values"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Mock driver recording how often run_query is reached
    #[derive(Default)]
    struct MockDriver {
        queries: AtomicUsize,
    }

    #[async_trait]
    impl Driver for MockDriver {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn connect(&self, _params: &ConnectionParams) -> Result<()> {
            Ok(())
        }

        async fn run_query(&self, _params: &ConnectionParams, _sql: &str) -> Result<QueryResult> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(QueryResult::empty())
        }
    }

    fn mock_factory(_fields: &BTreeMap<String, TemplateValue>) -> Result<Arc<dyn Driver>> {
        Ok(Arc::new(MockDriver::default()))
    }

    fn empty_params() -> ConnectionParams {
        ConnectionParams(BTreeMap::new())
    }

    fn params_from_yaml(document: &str) -> ConnectionParams {
        let value: TemplateValue = serde_yaml::from_str(document).expect("test yaml should parse");
        ConnectionParams::from_value(value).expect("test value should be a mapping")
    }

    #[test]
    fn test_registry_unknown_driver() {
        let registry = DriverRegistry::new();
        let err = registry.load("oracle", &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, BridgeError::DriverNotFound(_)));
        assert!(err.message().contains("oracle"));
        // The failed lookup must not register anything
        assert!(!registry.contains("oracle"));
    }

    #[test]
    fn test_registry_register_and_load() {
        let mut registry = DriverRegistry::new();
        registry.register("mock", mock_factory);

        assert!(registry.contains("mock"));
        let driver = registry.load("mock", &BTreeMap::new()).unwrap();
        assert_eq!(driver.name(), "mock");
    }

    #[test]
    fn test_registry_driver_names_sorted() {
        let mut registry = DriverRegistry::new();
        registry.register("zeta", mock_factory);
        registry.register("alpha", mock_factory);
        assert_eq!(registry.driver_names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_default_registry_is_idempotent() {
        let first = default_registry() as *const DriverRegistry;
        let second = default_registry() as *const DriverRegistry;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_run_update_delegates_to_run_query() {
        let driver = MockDriver::default();
        let params = empty_params();

        driver.run_update(&params, "UPDATE t SET x = 1").await.unwrap();
        driver.run_delete(&params, "DELETE FROM t").await.unwrap();

        assert_eq!(driver.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_stored_proc_defaults_to_unsupported() {
        let driver = MockDriver::default();
        let err = driver
            .run_stored_proc(&empty_params(), "sp_who", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Unsupported(_)));
        assert!(err.message().contains("sp_who"));
    }

    #[test]
    fn test_connection_params_require_str() {
        let params = params_from_yaml("host: db.example.com\nport: 3306");
        assert_eq!(params.require_str("host").unwrap(), "db.example.com");

        let err = params.require_str("user").unwrap_err();
        assert!(err.message().contains("'user'"));

        let err = params.require_str("port").unwrap_err();
        assert!(err.message().contains("must be a string"));
    }

    #[test]
    fn test_connection_params_ports() {
        let params = params_from_yaml("a: 3306\nb: '1433'\nc: not-a-port\nd: 70000");
        assert_eq!(params.require_port("a").unwrap(), 3306);
        assert_eq!(params.require_port("b").unwrap(), 1433);
        assert!(params.require_port("c").is_err());
        assert!(params.require_port("d").is_err());
        assert!(params.require_port("missing").is_err());
        assert_eq!(params.port_or("missing", 1433).unwrap(), 1433);
    }

    #[test]
    fn test_connection_params_bools() {
        let params = params_from_yaml("encrypt: true\nbad: maybe");
        assert!(params.bool_or("encrypt", false).unwrap());
        assert!(!params.bool_or("missing", false).unwrap());
        assert!(params.bool_or("bad", false).is_err());
    }

    #[test]
    fn test_connection_params_rejects_non_mapping() {
        let err = ConnectionParams::from_value(TemplateValue::String("nope".into())).unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
    }

    #[test]
    fn test_connection_template_requires_mapping() {
        let mut fields = BTreeMap::new();
        assert!(connection_template(&fields).is_err());

        fields.insert("connection".to_string(), TemplateValue::String("x".into()));
        assert!(connection_template(&fields).is_err());

        fields.insert("connection".to_string(), TemplateValue::Mapping(BTreeMap::new()));
        assert!(connection_template(&fields).is_ok());
    }

    #[test]
    fn test_sql_literal_scalars() {
        assert_eq!(sql_literal(&serde_json::json!(null)).unwrap(), "NULL");
        assert_eq!(sql_literal(&serde_json::json!(true)).unwrap(), "1");
        assert_eq!(sql_literal(&serde_json::json!(42)).unwrap(), "42");
        assert_eq!(sql_literal(&serde_json::json!("it's")).unwrap(), "'it''s'");
        assert!(sql_literal(&serde_json::json!([1, 2])).is_err());
    }
}
