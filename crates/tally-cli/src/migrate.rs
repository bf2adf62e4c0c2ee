//! Migration hand-off.
//!
//! tally does not move data itself. `tally migrate` shells out to the
//! operator-provided `migrate_postgres.sh`, passing both endpoints'
//! connection parameters as positional arguments, and reports the script's
//! exit status as the command's outcome.

use std::io::{self, Write};
use std::path::Path;

use tokio::process::Command;

use crate::config::Credentials;
use crate::error::{CliError, CliResult};

pub const MIGRATE_SCRIPT: &str = "migrate_postgres.sh";

/// Interactive yes/no prompt. Anything but an explicit yes declines.
pub fn confirm(prompt: &str) -> CliResult<bool> {
    print!("{prompt} [y/N] ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes" | "YES"))
}

/// Argument vector handed to the script: five connection parameters per
/// side, source first, then the mode ("auto" streams a dump straight into
/// the target, "manual" restores from an existing dump file).
fn script_args(credentials: &Credentials, dump_file: Option<&Path>) -> Vec<String> {
    let mut args = Vec::with_capacity(12);
    for side in [&credentials.source, &credentials.target] {
        args.push(side.database.clone());
        args.push(side.user.clone());
        args.push(side.password.clone());
        args.push(side.host.clone());
        args.push(side.port.to_string());
    }
    match dump_file {
        Some(path) => {
            args.push("manual".to_string());
            args.push(path.display().to_string());
        }
        None => args.push("auto".to_string()),
    }
    args
}

pub async fn run(credentials: &Credentials, dump_file: Option<&Path>) -> CliResult<()> {
    let args = script_args(credentials, dump_file);
    tracing::info!(script = MIGRATE_SCRIPT, "starting migration");

    let status = Command::new("bash")
        .arg(MIGRATE_SCRIPT)
        .args(&args)
        .status()
        .await?;
    if status.success() {
        Ok(())
    } else {
        Err(CliError::Migration(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbEndpoint;

    fn credentials() -> Credentials {
        let side = |db: &str, host: &str| DbEndpoint {
            database: db.to_string(),
            user: "app".to_string(),
            password: "secret".to_string(),
            host: host.to_string(),
            port: 5432,
        };
        Credentials {
            source: side("orders", "old.example.com"),
            target: side("orders", "new.example.com"),
        }
    }

    #[test]
    fn auto_mode_passes_both_endpoints_then_the_mode() {
        let args = script_args(&credentials(), None);
        assert_eq!(
            args,
            vec![
                "orders",
                "app",
                "secret",
                "old.example.com",
                "5432",
                "orders",
                "app",
                "secret",
                "new.example.com",
                "5432",
                "auto",
            ]
        );
    }

    #[test]
    fn manual_mode_appends_the_dump_path() {
        let args = script_args(&credentials(), Some(Path::new("/tmp/orders.dump")));
        assert_eq!(&args[args.len() - 2..], &["manual", "/tmp/orders.dump"]);
    }
}
