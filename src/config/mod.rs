//! Database Configuration and Configuration Registry
//!
//! This module loads per-database configuration documents from a directory
//! tree, matches inbound logical database names against each configuration's
//! identifier pattern, and hands out resolved views that substitute captured
//! parameters into templated fields.
//!
//! # Configuration Documents
//! One YAML file per logical database group, anywhere under the scan root:
//!
//! ```yaml
//! identifier: '^inventory_(\w+)$'   # required, compiled as a regex
//! driver: mysql                     # required, must match a registered driver
//! connection:                       # driver-specific shape
//!   host: 'db-{{0}}.internal'
//!   user: bridge
//!   password: hunter2
//!   port: 3306
//!   db: inventory
//! queries:                          # arbitrary extra fields, also templated
//!   region_rollup: "SELECT * FROM rollup_{{0}}"
//! ```
//!
//! # Resolution
//! `resolve` walks configurations in lexicographic source-path order and
//! returns the first whose pattern matches anywhere in the requested name.
//! The ordering is the documented tie-break when several patterns match.
//!
//! # Reload
//! [`Bridge`] holds the active registry behind an atomically swapped
//! snapshot: a rebuild parses the whole directory into a fresh registry
//! before it becomes visible, and a failed rebuild leaves the previous
//! snapshot untouched. Concurrent readers always observe one complete
//! registry, never a partial mix.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use regex::Regex;

use crate::driver::{ConnectionParams, Driver, DriverRegistry, QueryResult};
use crate::error::{BridgeError, Result};
use crate::template::{substitute, TemplateValue};

/// Recognized configuration file extensions
const CONFIG_EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// One logical database group: its matching pattern, driver instance, and
/// templated fields.
///
/// Immutable after construction; substitution at query time works on copies
/// of the stored field values, never in place.
pub struct DatabaseConfig {
    /// Compiled identifier pattern; also extracts positional capture groups
    identifier: Regex,

    /// Registry key the driver was instantiated from (e.g. "mysql")
    driver_name: String,

    /// Driver instance bound to this configuration, constructed once at
    /// load time and reused for all subsequent queries
    driver: Arc<dyn Driver>,

    /// All remaining document fields, kept verbatim as substitution
    /// templates (includes `connection`)
    fields: BTreeMap<String, TemplateValue>,

    /// Originating file, for error messages and deterministic ordering
    source: PathBuf,
}

impl DatabaseConfig {
    /// Build a configuration from a parsed document.
    ///
    /// Requires `identifier` and `driver` string fields; compiles the
    /// identifier and instantiates the driver through `drivers`. Everything
    /// else in the document is stored verbatim as a substitution template.
    pub fn from_document(
        document: TemplateValue,
        source: &Path,
        drivers: &DriverRegistry,
    ) -> Result<Self> {
        let TemplateValue::Mapping(mut fields) = document else {
            return Err(BridgeError::configuration(format!(
                "{}: document must be a mapping",
                source.display()
            )));
        };

        let raw_identifier = take_string_field(&mut fields, "identifier", source)?;
        let driver_name = take_string_field(&mut fields, "driver", source)?;

        let identifier = Regex::new(&raw_identifier).map_err(|e| {
            BridgeError::configuration(format!(
                "{}: invalid identifier pattern: {e}",
                source.display()
            ))
        })?;

        let driver = drivers.load(&driver_name, &fields).map_err(|e| match e {
            BridgeError::DriverNotFound(name) => {
                BridgeError::DriverNotFound(format!("{name} (requested by {})", source.display()))
            }
            BridgeError::Configuration(msg) => {
                BridgeError::configuration(format!("{}: {msg}", source.display()))
            }
            other => other,
        })?;

        Ok(Self { identifier, driver_name, driver, fields, source: source.to_path_buf() })
    }

    /// The raw identifier pattern string
    #[must_use]
    pub fn identifier_str(&self) -> &str {
        self.identifier.as_str()
    }

    /// Registry key of this configuration's driver
    #[must_use]
    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    /// The driver instance owned by this configuration
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// Templated fields stored for this configuration
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, TemplateValue> {
        &self.fields
    }

    /// Originating configuration file
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Whether `database_name` belongs to this configuration.
    ///
    /// Unanchored: the pattern may match anywhere in the name. Anchor the
    /// pattern itself (`^...$`) for exact matching.
    #[must_use]
    pub fn matches(&self, database_name: &str) -> bool {
        self.identifier.is_match(database_name)
    }

    /// Extract positional substitution arguments from a matching name.
    ///
    /// Capture groups are indexed from zero; a group that participated in
    /// no match (e.g. an unused optional group) yields an empty string.
    /// Fails with `NoMatch` when the name does not match at all.
    pub fn capture_args(&self, database_name: &str) -> Result<Vec<String>> {
        let captures = self
            .identifier
            .captures(database_name)
            .ok_or_else(|| BridgeError::no_match(database_name))?;

        Ok(captures
            .iter()
            .skip(1) // group 0 is the whole match
            .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect())
    }

    /// Resolve a stored field for a concrete database name.
    ///
    /// Guards independently against a non-matching name, then substitutes
    /// the captured groups into a copy of the stored template. The stored
    /// template itself is never modified.
    pub fn resolve_field(&self, database_name: &str, key: &str) -> Result<TemplateValue> {
        let args = self.capture_args(database_name)?;
        let template = self.fields.get(key).ok_or_else(|| {
            BridgeError::invalid_input(format!(
                "configuration '{}' has no field '{key}'",
                self.identifier_str()
            ))
        })?;
        substitute(template, &args)
    }

    /// Resolve the `connection` mapping for a concrete database name
    pub fn connection(&self, database_name: &str) -> Result<ConnectionParams> {
        ConnectionParams::from_value(self.resolve_field(database_name, "connection")?)
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("identifier", &self.identifier_str())
            .field("driver", &self.driver_name)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Extract a required string field from a document, removing it from the map
fn take_string_field(
    fields: &mut BTreeMap<String, TemplateValue>,
    key: &str,
    source: &Path,
) -> Result<String> {
    match fields.remove(key) {
        Some(TemplateValue::String(s)) => Ok(s),
        Some(_) => Err(BridgeError::configuration(format!(
            "{}: '{key}' must be a string",
            source.display()
        ))),
        None => Err(BridgeError::configuration(format!(
            "{}: missing required field '{key}'",
            source.display()
        ))),
    }
}

/// All database configurations loaded from one directory scan.
///
/// Construction is all-or-nothing: any file that fails to parse, omits a
/// required field, or names an unknown driver fails the whole load with an
/// error naming the offending file.
pub struct ConfigRegistry {
    /// Configurations in lexicographic source-path order
    configs: Vec<DatabaseConfig>,
}

impl ConfigRegistry {
    /// Recursively load every `*.yml`/`*.yaml` document under `directory`.
    pub fn load(directory: &Path, drivers: &DriverRegistry) -> Result<Self> {
        let mut paths = Vec::new();
        collect_config_files(directory, &mut paths)?;
        paths.sort();

        let mut configs = Vec::with_capacity(paths.len());
        let mut seen: HashMap<String, PathBuf> = HashMap::new();

        for path in paths {
            let contents = fs::read_to_string(&path).map_err(|e| {
                BridgeError::configuration(format!("{}: {e}", path.display()))
            })?;
            let document: TemplateValue = serde_yaml::from_str(&contents).map_err(|e| {
                BridgeError::configuration(format!("{}: {e}", path.display()))
            })?;

            let config = DatabaseConfig::from_document(document, &path, drivers)?;

            if let Some(previous) = seen.insert(config.identifier_str().to_string(), path.clone())
            {
                return Err(BridgeError::configuration(format!(
                    "duplicate identifier '{}' in {} and {}",
                    config.identifier_str(),
                    previous.display(),
                    path.display()
                )));
            }

            configs.push(config);
        }

        tracing::info!(
            count = configs.len(),
            directory = %directory.display(),
            "Loaded database configurations"
        );

        Ok(Self { configs })
    }

    /// Load using the process-wide default driver table
    pub fn load_default(directory: &Path) -> Result<Self> {
        Self::load(directory, crate::driver::default_registry())
    }

    /// Find the configuration for a logical database name.
    ///
    /// Configurations are tried in lexicographic source-path order; the
    /// first whose pattern matches wins. Returns `NoMatch` when nothing
    /// matches.
    pub fn resolve(&self, database_name: &str) -> Result<ResolvedDatabase<'_>> {
        for config in &self.configs {
            if config.matches(database_name) {
                let args = config.capture_args(database_name)?;
                tracing::debug!(
                    database = database_name,
                    identifier = config.identifier_str(),
                    "Resolved database"
                );
                return Ok(ResolvedDatabase { config, args });
            }
        }
        Err(BridgeError::no_match(database_name))
    }

    /// Look up a configuration by its raw identifier pattern string
    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<&DatabaseConfig> {
        self.configs.iter().find(|c| c.identifier_str() == identifier)
    }

    /// Identifier pattern strings of all loaded configurations, in
    /// resolution order
    #[must_use]
    pub fn identifiers(&self) -> Vec<&str> {
        self.configs.iter().map(DatabaseConfig::identifier_str).collect()
    }

    /// Loaded configurations in resolution order
    #[must_use]
    pub fn configs(&self) -> &[DatabaseConfig] {
        &self.configs
    }

    /// Number of loaded configurations
    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Whether the registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

impl std::fmt::Debug for ConfigRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigRegistry").field("identifiers", &self.identifiers()).finish()
    }
}

/// Recursively gather configuration file paths under `directory`
fn collect_config_files(directory: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(directory).map_err(|e| {
        BridgeError::configuration(format!("could not read {}: {e}", directory.display()))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| {
            BridgeError::configuration(format!("could not read {}: {e}", directory.display()))
        })?;
        let path = entry.path();

        if path.is_dir() {
            collect_config_files(&path, out)?;
        } else if has_config_extension(&path) {
            out.push(path);
        }
    }

    Ok(())
}

fn has_config_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| CONFIG_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// A configuration paired with the capture groups of a concrete match.
///
/// This is what the transport layer works with after resolution: field
/// access substitutes the captured arguments, and the query methods hand the
/// substituted connection parameters to the configuration's driver.
pub struct ResolvedDatabase<'a> {
    config: &'a DatabaseConfig,
    args: Vec<String>,
}

impl ResolvedDatabase<'_> {
    /// The matched configuration
    #[must_use]
    pub fn config(&self) -> &DatabaseConfig {
        self.config
    }

    /// Positional arguments captured from the logical name
    #[must_use]
    pub fn capture_args(&self) -> &[String] {
        &self.args
    }

    /// A stored field with placeholders filled from the captured arguments
    pub fn field(&self, key: &str) -> Result<TemplateValue> {
        let template = self.config.fields.get(key).ok_or_else(|| {
            BridgeError::invalid_input(format!(
                "configuration '{}' has no field '{key}'",
                self.config.identifier_str()
            ))
        })?;
        substitute(template, &self.args)
    }

    /// The substituted connection parameters
    pub fn connection(&self) -> Result<ConnectionParams> {
        ConnectionParams::from_value(self.field("connection")?)
    }

    /// Probe the backend connection
    pub async fn connect(&self) -> Result<()> {
        let params = self.connection()?;
        self.config.driver.connect(&params).await
    }

    /// Execute a statement through the configuration's driver
    pub async fn run_query(&self, sql: &str) -> Result<QueryResult> {
        let params = self.connection()?;
        self.config.driver.run_query(&params, sql).await
    }

    /// Execute an update statement
    pub async fn run_update(&self, sql: &str) -> Result<QueryResult> {
        let params = self.connection()?;
        self.config.driver.run_update(&params, sql).await
    }

    /// Execute a delete statement
    pub async fn run_delete(&self, sql: &str) -> Result<QueryResult> {
        let params = self.connection()?;
        self.config.driver.run_delete(&params, sql).await
    }

    /// Execute a named stored procedure with positional variables
    pub async fn run_stored_proc(
        &self,
        proc_name: &str,
        variables: &[serde_json::Value],
    ) -> Result<QueryResult> {
        let params = self.connection()?;
        self.config.driver.run_stored_proc(&params, proc_name, variables).await
    }
}

/// Long-lived handle over a configuration directory with atomic reload.
///
/// `snapshot` returns the active registry; `reload` re-scans the directory
/// into a completely new registry and swaps it in only on success. Readers
/// holding an older snapshot keep using it unaffected; a failed reload
/// leaves the active snapshot unchanged.
pub struct Bridge {
    directory: PathBuf,
    drivers: Arc<DriverRegistry>,
    registry: RwLock<Arc<ConfigRegistry>>,
}

impl Bridge {
    /// Open a bridge over `directory` with the compiled-in drivers.
    ///
    /// Performs the initial load; fails fast if any document is invalid.
    pub fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        Self::with_drivers(directory, Arc::new(DriverRegistry::with_builtin_drivers()))
    }

    /// Open a bridge with a caller-supplied driver table (for custom
    /// backends registered beyond the compiled-in ones)
    pub fn with_drivers(
        directory: impl Into<PathBuf>,
        drivers: Arc<DriverRegistry>,
    ) -> Result<Self> {
        let directory = directory.into();
        let registry = ConfigRegistry::load(&directory, &drivers)?;
        Ok(Self { directory, drivers, registry: RwLock::new(Arc::new(registry)) })
    }

    /// The configuration directory this bridge scans
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// The currently active registry snapshot.
    ///
    /// The returned `Arc` stays valid across concurrent reloads; it simply
    /// keeps referring to the registry that was active when it was taken.
    #[must_use]
    pub fn snapshot(&self) -> Arc<ConfigRegistry> {
        match self.registry.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Re-scan the configuration directory and swap in the new registry.
    ///
    /// The new registry is built completely before it becomes visible.
    /// On error the active snapshot is left untouched.
    pub fn reload(&self) -> Result<()> {
        let rebuilt = Arc::new(ConfigRegistry::load(&self.directory, &self.drivers)?);

        let mut guard = match self.registry.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = rebuilt;

        tracing::info!(directory = %self.directory.display(), "Registry reloaded");
        Ok(())
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("directory", &self.directory)
            .field("databases", &self.snapshot().len())
            .finish_non_exhaustive()
    }
}
