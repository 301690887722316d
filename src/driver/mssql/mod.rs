//! MS-SQL Driver Implementation
//!
//! Implements the [`Driver`](crate::driver::Driver) contract for Microsoft
//! SQL Server using the native `tiberius` TDS client over a tokio TCP stream.
//!
//! # Implementation Notes
//! - Connections are scoped to a single call: open, execute, drop
//! - `simple_query` execution; the first result set is normalized, matching
//!   the single-result contract of the other drivers
//! - Cell extraction is driven by the column's TDS type
//! - Stored procedures execute as `EXEC` statements with literal variables
//!
//! The minimum connection mapping for this driver: `host`, `user`,
//! `password`. Optional: `port` (default 1433), `database`, `encrypt`
//! (default false), `trust_cert` (default true).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tiberius::{AuthMethod, Client, ColumnType, Config, EncryptionLevel, Row as TdsRow};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::driver::{connection_template, sql_literal, ConnectionParams, Driver, QueryResult, Row};
use crate::error::{BridgeError, Result};
use crate::template::TemplateValue;

/// Connection keys every MS-SQL configuration must provide
const REQUIRED_KEYS: [&str; 3] = ["host", "user", "password"];

/// Default TDS port
const DEFAULT_PORT: u16 = 1433;

/// MS-SQL driver bound to one database configuration
pub struct MssqlDriver {
    /// The configuration's raw `connection` template, kept for reference;
    /// values may still contain placeholder tokens
    connection: BTreeMap<String, TemplateValue>,
}

/// Construct a [`MssqlDriver`] from a parsed configuration document.
pub fn factory(fields: &BTreeMap<String, TemplateValue>) -> Result<Arc<dyn Driver>> {
    let connection = connection_template(fields)?;
    for key in REQUIRED_KEYS {
        if !connection.contains_key(key) {
            return Err(BridgeError::configuration(format!(
                "mssql connection requires '{key}'"
            )));
        }
    }
    Ok(Arc::new(MssqlDriver { connection: connection.clone() }))
}

impl MssqlDriver {
    /// The raw connection template this driver was configured with
    #[must_use]
    pub fn connection_template(&self) -> &BTreeMap<String, TemplateValue> {
        &self.connection
    }
}

#[async_trait]
impl Driver for MssqlDriver {
    fn name(&self) -> &'static str {
        "mssql"
    }

    async fn connect(&self, params: &ConnectionParams) -> Result<()> {
        let client = open_client(params).await?;
        drop(client);
        Ok(())
    }

    async fn run_query(&self, params: &ConnectionParams, sql: &str) -> Result<QueryResult> {
        let mut client = open_client(params).await?;

        let stream = client.simple_query(sql).await.map_err(|e| {
            BridgeError::query_failed(format!("failed to execute query: {e}"))
        })?;
        let result_sets = stream.into_results().await.map_err(|e| {
            BridgeError::query_failed(format!("failed to read result set: {e}"))
        })?;

        // First result set only; additional sets are driver-internal noise
        // for the single-statement contract
        let rows = result_sets.into_iter().next().unwrap_or_default();

        let columns: Vec<String> = rows.first().map_or_else(Vec::new, |first| {
            first.columns().iter().map(|col| col.name().to_string()).collect()
        });

        let out: Vec<Row> = rows.iter().map(row_to_json).collect();

        Ok(QueryResult { columns, rows: out, rows_affected: None })
    }

    async fn run_stored_proc(
        &self,
        params: &ConnectionParams,
        proc_name: &str,
        variables: &[serde_json::Value],
    ) -> Result<QueryResult> {
        let exec = render_exec(proc_name, variables)?;
        self.run_query(params, &exec).await
    }
}

/// Open a TDS client from resolved parameters
async fn open_client(params: &ConnectionParams) -> Result<Client<Compat<TcpStream>>> {
    let host = params.require_str("host")?;
    let port = params.port_or("port", DEFAULT_PORT)?;
    let config = build_config(params, host, port)?;

    let tcp = TcpStream::connect((host, port)).await.map_err(|e| {
        BridgeError::connection_failed(format!("failed to reach {host}:{port}: {e}"))
    })?;
    tcp.set_nodelay(true).map_err(|e| {
        BridgeError::connection_failed(format!("failed to configure socket: {e}"))
    })?;

    Client::connect(config, tcp.compat_write()).await.map_err(|e| {
        BridgeError::connection_failed(format!("failed to connect to MS-SQL: {e}"))
    })
}

/// Build a tiberius `Config` from resolved parameters
fn build_config(params: &ConnectionParams, host: &str, port: u16) -> Result<Config> {
    let user = params.require_str("user")?;
    let password = params.require_str("password")?;

    let mut config = Config::new();
    config.host(host);
    config.port(port);
    config.authentication(AuthMethod::sql_server(user, password));

    if let Some(database) = params.get("database") {
        let database = database.as_str().ok_or_else(|| {
            BridgeError::invalid_input("connection parameter 'database' must be a string")
        })?;
        config.database(database);
    }

    if params.bool_or("trust_cert", true)? {
        config.trust_cert();
    }

    config.encryption(if params.bool_or("encrypt", false)? {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::Off
    });

    Ok(config)
}

/// Render an `EXEC` statement for a stored procedure with literal variables
fn render_exec(proc_name: &str, variables: &[serde_json::Value]) -> Result<String> {
    validate_proc_name(proc_name)?;
    let rendered: Vec<String> = variables.iter().map(sql_literal).collect::<Result<_>>()?;
    if rendered.is_empty() {
        Ok(format!("EXEC {proc_name}"))
    } else {
        Ok(format!("EXEC {proc_name} {}", rendered.join(", ")))
    }
}

/// Reject procedure names that would escape the EXEC statement
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

/// Convert an MS-SQL row to a JSON-safe map
fn row_to_json(row: &TdsRow) -> Row {
    let mut map = Row::new();
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), cell_to_json(row, idx, column.column_type()));
    }
    map
}

/// Convert one MS-SQL cell to a JSON value based on its TDS column type
fn cell_to_json(row: &TdsRow, idx: usize, col_type: ColumnType) -> serde_json::Value {
    use serde_json::Value;

    match col_type {
        ColumnType::Null => Value::Null,

        // Integer types
        ColumnType::Int1 => row
            .try_get::<u8, _>(idx)
            .ok()
            .flatten()
            .map_or(Value::Null, |v| Value::Number(v.into())),
        ColumnType::Int2 => row
            .try_get::<i16, _>(idx)
            .ok()
            .flatten()
            .map_or(Value::Null, |v| Value::Number(v.into())),
        ColumnType::Int4 => row
            .try_get::<i32, _>(idx)
            .ok()
            .flatten()
            .map_or(Value::Null, |v| Value::Number(v.into())),
        ColumnType::Int8 => row
            .try_get::<i64, _>(idx)
            .ok()
            .flatten()
            .map_or(Value::Null, |v| Value::Number(v.into())),
        ColumnType::Intn => row
            .try_get::<i64, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::Number(v.into()))
            .or_else(|| {
                row.try_get::<i32, _>(idx).ok().flatten().map(|v| Value::Number(v.into()))
            })
            .unwrap_or(Value::Null),

        // Float types
        ColumnType::Float4 => float_value(row.try_get::<f32, _>(idx).ok().flatten().map(f64::from)),
        ColumnType::Float8 => float_value(row.try_get::<f64, _>(idx).ok().flatten()),
        ColumnType::Floatn => float_value(
            row.try_get::<f64, _>(idx)
                .ok()
                .flatten()
                .or_else(|| row.try_get::<f32, _>(idx).ok().flatten().map(f64::from)),
        ),

        // Decimal/Numeric and Money types surface as floats
        ColumnType::Decimaln | ColumnType::Numericn => float_value(
            row.try_get::<tiberius::numeric::Numeric, _>(idx)
                .ok()
                .flatten()
                .map(f64::from),
        ),
        ColumnType::Money | ColumnType::Money4 => {
            float_value(row.try_get::<f64, _>(idx).ok().flatten())
        }

        // Boolean
        ColumnType::Bit | ColumnType::Bitn => row
            .try_get::<bool, _>(idx)
            .ok()
            .flatten()
            .map_or(Value::Null, Value::Bool),

        // String types
        ColumnType::BigVarChar
        | ColumnType::BigChar
        | ColumnType::NVarchar
        | ColumnType::NChar
        | ColumnType::Text
        | ColumnType::NText => row
            .try_get::<&str, _>(idx)
            .ok()
            .flatten()
            .map_or(Value::Null, |s| Value::String(s.to_string())),

        // Date/Time types
        ColumnType::Datetime | ColumnType::Datetime2 | ColumnType::Datetimen | ColumnType::Datetime4 => {
            row.try_get::<NaiveDateTime, _>(idx)
                .ok()
                .flatten()
                .map_or(Value::Null, |dt| Value::String(dt.to_string()))
        }
        ColumnType::DatetimeOffsetn => row
            .try_get::<DateTime<Utc>, _>(idx)
            .ok()
            .flatten()
            .map_or(Value::Null, |dt| Value::String(dt.to_rfc3339())),
        ColumnType::Daten => row
            .try_get::<NaiveDate, _>(idx)
            .ok()
            .flatten()
            .map_or(Value::Null, |d| Value::String(d.to_string())),
        ColumnType::Timen => row
            .try_get::<NaiveTime, _>(idx)
            .ok()
            .flatten()
            .map_or(Value::Null, |t| Value::String(t.to_string())),

        // Binary types - encode as Base64
        ColumnType::BigVarBin | ColumnType::BigBinary | ColumnType::Image => row
            .try_get::<&[u8], _>(idx)
            .ok()
            .flatten()
            .map_or(Value::Null, |bytes| {
                use base64::Engine;
                Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
            }),

        // GUID
        ColumnType::Guid => row
            .try_get::<tiberius::Uuid, _>(idx)
            .ok()
            .flatten()
            .map_or(Value::Null, |u| Value::String(u.to_string())),

        // XML
        ColumnType::Xml => row
            .try_get::<&tiberius::xml::XmlData, _>(idx)
            .ok()
            .flatten()
            .map_or(Value::Null, |xml| Value::String(xml.to_owned().into_string())),

        _ => Value::Null,
    }
}

fn float_value(value: Option<f64>) -> serde_json::Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map_or(serde_json::Value::Null, serde_json::Value::Number) // NaN/Infinity as null
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(document: &str) -> ConnectionParams {
        let value: TemplateValue = serde_yaml::from_str(document).expect("test yaml should parse");
        ConnectionParams::from_value(value).expect("test value should be a mapping")
    }

    fn document(connection_yaml: &str) -> BTreeMap<String, TemplateValue> {
        let mut fields = BTreeMap::new();
        fields.insert(
            "connection".to_string(),
            serde_yaml::from_str(connection_yaml).expect("test yaml should parse"),
        );
        fields
    }

    #[test]
    fn test_factory_requires_connection_keys() {
        let fields = document("host: sql01\nuser: sa\npassword: secret");
        assert!(factory(&fields).is_ok());

        let fields = document("host: sql01\nuser: sa");
        let err = factory(&fields).unwrap_err();
        assert!(matches!(err, BridgeError::Configuration(_)));
        assert!(err.message().contains("'password'"));
    }

    #[test]
    fn test_build_config_defaults() {
        let p = params("host: sql01\nuser: sa\npassword: secret");
        assert!(build_config(&p, "sql01", DEFAULT_PORT).is_ok());
    }

    #[test]
    fn test_build_config_optional_fields() {
        let p = params(
            "host: sql01\nuser: sa\npassword: secret\ndatabase: reporting\nencrypt: true\ntrust_cert: false",
        );
        assert!(build_config(&p, "sql01", 14330).is_ok());

        let p = params("host: sql01\nuser: sa\npassword: secret\ndatabase: 42");
        assert!(build_config(&p, "sql01", DEFAULT_PORT).is_err());
    }

    #[test]
    fn test_render_exec() {
        let exec = render_exec("sp_rollup", &[serde_json::json!("eu"), serde_json::json!(5)])
            .unwrap();
        assert_eq!(exec, "EXEC sp_rollup 'eu', 5");

        let exec = render_exec("dbo.sp_who", &[]).unwrap();
        assert_eq!(exec, "EXEC dbo.sp_who");
    }

    #[test]
    fn test_render_exec_rejects_bad_names() {
        assert!(render_exec("", &[]).is_err());
        assert!(render_exec("sp_who; DROP TABLE users", &[]).is_err());
    }

    // Note: connection tests require a running SQL Server instance.
    // They are marked with #[ignore] and should be run with:
    // cargo test --features mssql -- --ignored

    #[tokio::test]
    #[ignore] // Requires running SQL Server instance
    async fn test_connect_probe() {
        let fields = document("host: localhost\nuser: sa\npassword: Password1!\ndatabase: master");
        let driver = factory(&fields).unwrap();
        let p = params("host: localhost\nuser: sa\npassword: Password1!\ndatabase: master");

        driver.connect(&p).await.unwrap();

        let result = driver.run_query(&p, "SELECT 1 AS one").await.unwrap();
        assert_eq!(result.columns, vec!["one"]);
    }
}
