//! MySQL Driver Implementation
//!
//! Implements the [`Driver`](crate::driver::Driver) contract for MySQL
//! (including MariaDB) using the native `mysql_async` client.
//!
//! # Implementation Notes
//! - Connections are scoped to a single call: open, execute, disconnect
//! - Statements that return rows are detected by a SELECT/SHOW/DESCRIBE
//!   prefix heuristic; everything else reports `rows_affected`
//! - BLOB data is Base64-encoded for JSON safety
//! - Stored procedures execute as `CALL` statements with literal variables
//!
//! The minimum connection mapping for this driver:
//! `host`, `user`, `password`, `port`, `db`.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use mysql_async::{prelude::*, Conn, OptsBuilder, Row as MySqlRow, Value};

use crate::driver::{connection_template, sql_literal, ConnectionParams, Driver, QueryResult, Row};
use crate::error::{BridgeError, Result};
use crate::template::TemplateValue;

/// Connection keys every MySQL configuration must provide
const REQUIRED_KEYS: [&str; 5] = ["host", "user", "password", "port", "db"];

/// MySQL driver bound to one database configuration
pub struct MySqlDriver {
    /// The configuration's raw `connection` template, kept for reference;
    /// values may still contain placeholder tokens
    connection: BTreeMap<String, TemplateValue>,
}

/// Construct a [`MySqlDriver`] from a parsed configuration document.
///
/// Validates at load time that the `connection` mapping exists and carries
/// every required key; values are not typed here because they may still
/// contain placeholders.
pub fn factory(fields: &BTreeMap<String, TemplateValue>) -> Result<Arc<dyn Driver>> {
    let connection = connection_template(fields)?;
    for key in REQUIRED_KEYS {
        if !connection.contains_key(key) {
            return Err(BridgeError::configuration(format!(
                "mysql connection requires '{key}'"
            )));
        }
    }
    Ok(Arc::new(MySqlDriver { connection: connection.clone() }))
}

impl MySqlDriver {
    /// The raw connection template this driver was configured with
    #[must_use]
    pub fn connection_template(&self) -> &BTreeMap<String, TemplateValue> {
        &self.connection
    }
}

#[async_trait]
impl Driver for MySqlDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<()> {
        let opts = build_opts(params)?;
        let conn = Conn::new(opts).await.map_err(|e| {
            BridgeError::connection_failed(format!("failed to connect to MySQL: {e}"))
        })?;
        conn.disconnect().await.map_err(|e| {
            BridgeError::connection_failed(format!("failed to disconnect: {e}"))
        })?;
        Ok(())
    }

    async fn run_query(&self, params: &ConnectionParams, sql: &str) -> Result<QueryResult> {
        let opts = build_opts(params)?;
        let mut conn = Conn::new(opts).await.map_err(|e| {
            BridgeError::connection_failed(format!("failed to connect to MySQL: {e}"))
        })?;

        let outcome = execute_statement(&mut conn, sql).await;
        let disconnect = conn.disconnect().await;

        let result = outcome?;
        disconnect
            .map_err(|e| BridgeError::query_failed(format!("failed to disconnect: {e}")))?;
        Ok(result)
    }

    async fn run_stored_proc(
        &self,
        params: &ConnectionParams,
        proc_name: &str,
        variables: &[serde_json::Value],
    ) -> Result<QueryResult> {
        let call = render_call(proc_name, variables)?;
        self.run_query(params, &call).await
    }
}

/// Build MySQL connection options from resolved parameters
fn build_opts(params: &ConnectionParams) -> Result<OptsBuilder> {
    let host = params.require_str("host")?;
    let port = params.require_port("port")?;
    let user = params.require_str("user")?;
    let password = params.require_str("password")?;
    let database = params.require_str("db")?;

    let opts = OptsBuilder::default()
        .ip_or_hostname(host)
        .tcp_port(port)
        .user(Some(user))
        .pass(Some(password))
        .db_name(Some(database));

    Ok(opts)
}

/// Render a `CALL` statement for a stored procedure with literal variables
fn render_call(proc_name: &str, variables: &[serde_json::Value]) -> Result<String> {
    validate_proc_name(proc_name)?;
    let rendered: Vec<String> = variables.iter().map(sql_literal).collect::<Result<_>>()?;
    Ok(format!("CALL {proc_name}({})", rendered.join(", ")))
}

/// Reject procedure names that would escape the CALL statement
fn validate_proc_name(proc_name: &str) -> Result<()> {
    let valid = !proc_name.is_empty()
        && proc_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(BridgeError::invalid_input(format!(
            "invalid stored procedure name '{proc_name}'"
        )))
    }
}

/// Whether a statement is expected to produce a result set
fn returns_rows(sql: &str) -> bool {
    let upper = sql.trim().to_uppercase();
    upper.starts_with("SELECT")
        || upper.starts_with("SHOW")
        || upper.starts_with("DESCRIBE")
        || upper.starts_with("DESC")
        || upper.starts_with("CALL")
        || (upper.starts_with("WITH") && upper.contains("SELECT"))
}

/// Execute a statement and normalize the outcome
async fn execute_statement(conn: &mut Conn, sql: &str) -> Result<QueryResult> {
    if returns_rows(sql) {
        let rows: Vec<MySqlRow> = conn.query(sql).await.map_err(|e| {
            BridgeError::query_failed(format!("failed to execute query: {e}"))
        })?;

        let columns: Vec<String> = rows.first().map_or_else(Vec::new, |first| {
            first
                .columns_ref()
                .iter()
                .map(|col| col.name_str().to_string())
                .collect()
        });

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row_to_json(&row)?);
        }

        Ok(QueryResult { columns, rows: out, rows_affected: None })
    } else {
        let result = conn.query_iter(sql).await.map_err(|e| {
            BridgeError::query_failed(format!("failed to execute statement: {e}"))
        })?;
        let rows_affected = result.affected_rows();
        drop(result);

        Ok(QueryResult { columns: Vec::new(), rows: Vec::new(), rows_affected: Some(rows_affected) })
    }
}

/// Convert a MySQL row to a JSON-safe map
fn row_to_json(row: &MySqlRow) -> Result<Row> {
    let mut map = Row::new();
    for (idx, column) in row.columns_ref().iter().enumerate() {
        map.insert(column.name_str().to_string(), value_to_json(row, idx)?);
    }
    Ok(map)
}

/// Convert one MySQL cell to a JSON value
fn value_to_json(row: &MySqlRow, idx: usize) -> Result<serde_json::Value> {
    let value = row.as_ref(idx).ok_or_else(|| {
        BridgeError::query_failed(format!("failed to read value at column index {idx}"))
    })?;

    let json = match value {
        Value::NULL => serde_json::Value::Null,

        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => serde_json::Value::String(s.to_string()),
            Err(_) => {
                // Binary data - encode as Base64
                use base64::Engine;
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                serde_json::Value::String(encoded)
            }
        },

        Value::Int(i) => serde_json::Value::Number((*i).into()),

        Value::UInt(u) => serde_json::json!(*u),

        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null), // NaN/Infinity as null

        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),

        Value::Date(year, month, day, hour, minute, second, micro) => {
            serde_json::Value::String(format!(
                "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}"
            ))
        }

        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            serde_json::Value::String(format!(
                "{sign}{total_hours}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    };

    Ok(json)
}
