//! Configuration file handling for tally.
//!
//! Credentials for both endpoints live in a JSON file (`db_config.json` by
//! default, written by `tally setup`); the discovery query sets live in
//! `db_info/<database>_info.json`, one ordered label -> SQL mapping per
//! logical database name.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CliError, CliResult};

/// Connection parameters for one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbEndpoint {
    pub database: String,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl DbEndpoint {
    /// Build a connection pool for this endpoint, sized to the fan-out
    /// bound so up to `size` audit tasks can hold a connection at once.
    pub fn pool(&self, size: usize) -> CliResult<deadpool_postgres::Pool> {
        let mut cfg = deadpool_postgres::Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.dbname = Some(self.database.clone());
        cfg.pool = Some(deadpool_postgres::PoolConfig::new(size.max(1)));

        cfg.create_pool(
            Some(deadpool_postgres::Runtime::Tokio1),
            tokio_postgres::NoTls,
        )
        .map_err(|e| {
            CliError::Config(format!(
                "failed to build a pool for '{}' on {}: {e}",
                self.database, self.host
            ))
        })
    }
}

/// Credentials for both sides of the audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub source: DbEndpoint,
    pub target: DbEndpoint,
}

impl Credentials {
    /// Load credentials, failing with a pointer at `tally setup` if the
    /// file is missing.
    pub fn load(path: &Path) -> CliResult<Self> {
        if !path.exists() {
            return Err(CliError::Config(format!(
                "credentials file '{}' not found; create one with `tally setup`",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            CliError::Config(format!("failed to parse '{}': {e}", path.display()))
        })
    }

    /// A placeholder configuration for `tally setup` to write out.
    pub fn template() -> Self {
        let endpoint = DbEndpoint {
            database: "database_name".to_string(),
            user: "user_name".to_string(),
            password: "password".to_string(),
            host: "localhost".to_string(),
            port: 5432,
        };
        Self {
            source: endpoint.clone(),
            target: endpoint,
        }
    }

    /// Write the template, refusing to clobber an existing file unless
    /// `force` is set.
    pub fn write_template(path: &Path, force: bool) -> CliResult<()> {
        if path.exists() && !force {
            return Err(CliError::Config(format!(
                "'{}' already exists; pass --force to overwrite it",
                path.display()
            )));
        }
        let rendered = serde_json::to_string_pretty(&Self::template())
            .map_err(|e| CliError::Config(e.to_string()))?;
        fs::write(path, rendered)?;
        Ok(())
    }
}

/// Load the discovery query set for one logical database name.
///
/// Absence of a definition file, or an empty one, is a configuration error:
/// discovery with nothing to discover is a misconfigured run, not a quiet
/// no-op.
pub fn load_query_set(dir: &Path, database: &str) -> CliResult<IndexMap<String, String>> {
    let path: PathBuf = dir.join(format!("{database}_info.json"));
    if !path.exists() {
        return Err(CliError::Config(format!(
            "no discovery query set for database '{database}' (expected '{}')",
            path.display()
        )));
    }
    let content = fs::read_to_string(&path)?;
    let queries: IndexMap<String, String> = serde_json::from_str(&content)
        .map_err(|e| CliError::Config(format!("failed to parse '{}': {e}", path.display())))?;
    if queries.is_empty() {
        return Err(CliError::Config(format!(
            "query set '{}' defines no queries",
            path.display()
        )));
    }
    Ok(queries)
}
