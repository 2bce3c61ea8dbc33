use std::io::Write;

use clap::{Parser, Subcommand};

use crate::config::DatabaseConfig;
use crate::db::{EngineInfo, Pools};

#[derive(Parser, Debug)]
#[command(
    name = "monolith",
    version,
    about = "monolith command line tool for the monolith web service"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP server (applies pending migrations first)
    Server,
    /// Apply or revert the embedded schema migrations
    Migrate {
        #[command(subcommand)]
        direction: Direction,
    },
    /// Show the linked SQLite version and its compile options
    Info,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Apply every pending migration
    Up,
    /// Revert every applied migration
    Down,
}

/// Runs one migration direction against the configured database file.
///
/// Only the writer does any work here, so the read pool is kept to a single
/// lazily-opened connection.
pub async fn migrate(mut config: DatabaseConfig, direction: &Direction) -> anyhow::Result<()> {
    config.read.min_connections = 0;
    config.read.max_connections = 1;
    let pools = Pools::open(&config).await?;
    let result = match direction {
        Direction::Up => pools.migrate().await,
        Direction::Down => pools.revert().await,
    };
    pools.close().await;
    Ok(result?)
}

pub fn write_info<W: Write>(out: &mut W, info: &EngineInfo) -> std::io::Result<()> {
    writeln!(
        out,
        "monolith {} (built with sqlite version {})",
        env!("CARGO_PKG_VERSION"),
        info.sqlite_version
    )?;
    writeln!(out, "PRAGMA compile_options;")?;
    for option in &info.compile_options {
        writeln!(out, "{option}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["monolith", "server"]).unwrap();
        assert_eq!(cli.command, Command::Server);

        let cli = Cli::try_parse_from(["monolith", "migrate", "down"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Migrate {
                direction: Direction::Down
            }
        );

        let cli = Cli::try_parse_from(["monolith", "info"]).unwrap();
        assert_eq!(cli.command, Command::Info);
    }

    #[test]
    fn migrate_needs_a_direction() {
        assert!(Cli::try_parse_from(["monolith", "migrate"]).is_err());
        assert!(Cli::try_parse_from(["monolith", "migrate", "sideways"]).is_err());
    }

    #[test]
    fn version_flag_prints_package_version() {
        let err = Cli::try_parse_from(["monolith", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
        assert!(err.to_string().contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn info_lists_version_then_options() {
        let info = EngineInfo {
            sqlite_version: "3.45.0".into(),
            compile_options: vec!["THREADSAFE=1".into(), "ENABLE_FTS5".into()],
        };
        let mut out = Vec::new();
        write_info(&mut out, &info).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with("(built with sqlite version 3.45.0)"), "{text}");
        assert_eq!(&lines[2..], ["THREADSAFE=1", "ENABLE_FTS5"]);
    }

    #[tokio::test]
    async fn migrate_up_then_down_on_a_fresh_file() {
        let dir = TempDir::new().unwrap();
        let mut config = DatabaseConfig::new(dir.path().join("cli.db"));
        config.read.min_connections = 1;
        config.read.max_connections = 4;

        migrate(config.clone(), &Direction::Up).await.unwrap();
        let pools = Pools::open(&config).await.unwrap();
        let tables: i64 =
            sqlx::query_scalar("select count(*) from sqlite_master where name = 'users'")
                .fetch_one(pools.read())
                .await
                .unwrap();
        assert_eq!(tables, 1);
        pools.close().await;

        migrate(config.clone(), &Direction::Down).await.unwrap();
        let pools = Pools::open(&config).await.unwrap();
        let tables: i64 =
            sqlx::query_scalar("select count(*) from sqlite_master where name = 'users'")
                .fetch_one(pools.read())
                .await
                .unwrap();
        assert_eq!(tables, 0);
        pools.close().await;
    }
}
