//! Node configuration.

use clap::Parser;
use std::path::PathBuf;

/// Default HTTP listen port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default interval between metadata-store connectivity pings.
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 10;

/// Command-line arguments for a node.
#[derive(Parser, Debug, Clone)]
#[command(name = "blobmesh-node")]
#[command(about = "Content-addressed file replication cluster node")]
#[command(version)]
pub struct Args {
    /// Name identifying this node in the cluster. Must be unique.
    #[arg(long, env = "BLOBMESH_NAME")]
    pub name: String,

    /// Absolute path to the directory this node stores blobs under.
    #[arg(long, env = "BLOBMESH_WORKDIR")]
    pub workdir: PathBuf,

    /// Address to bind the HTTP listener to.
    #[arg(long, env = "BLOBMESH_LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// Address peers should use to reach this node.
    #[arg(long, env = "BLOBMESH_ADVERTISE_ADDR")]
    pub advertise_addr: String,

    /// Postgres connection string for the shared metadata store.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Interval, in seconds, between metadata-store connectivity pings.
    #[arg(long, default_value_t = DEFAULT_PING_INTERVAL_SECS)]
    pub ping_interval_secs: u64,

    /// Enable debug logging.
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Enable silent mode (errors only).
    #[arg(long, short = 's')]
    pub silent: bool,
}

/// Validated configuration a node is constructed from.
#[derive(Debug, Clone)]
pub struct Config {
    pub name: String,
    pub workdir: PathBuf,
    pub listen_addr: String,
    pub advertise_addr: String,
    pub database_url: String,
    pub ping_interval_secs: u64,
    pub debug: bool,
    pub silent: bool,
}

impl TryFrom<Args> for Config {
    type Error = String;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.name.trim().is_empty() {
            return Err("node name must not be empty".to_string());
        }
        if args.advertise_addr.trim().is_empty() {
            return Err("advertise address must not be empty".to_string());
        }
        if !args.workdir.is_absolute() {
            return Err("workdir must be an absolute path".to_string());
        }
        Ok(Self {
            name: args.name,
            workdir: args.workdir,
            listen_addr: args.listen_addr,
            advertise_addr: args.advertise_addr,
            database_url: args.database_url,
            ping_interval_secs: args.ping_interval_secs,
            debug: args.debug,
            silent: args.silent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            name: "n1".to_string(),
            workdir: PathBuf::from("/var/lib/blobmesh"),
            listen_addr: "127.0.0.1:8080".to_string(),
            advertise_addr: "http://127.0.0.1:8080".to_string(),
            database_url: "postgres://localhost/blobmesh".to_string(),
            ping_interval_secs: DEFAULT_PING_INTERVAL_SECS,
            debug: false,
            silent: false,
        }
    }

    #[test]
    fn rejects_relative_workdir() {
        let mut args = base_args();
        args.workdir = PathBuf::from("relative/path");
        assert!(Config::try_from(args).is_err());
    }

    #[test]
    fn rejects_empty_name() {
        let mut args = base_args();
        args.name = "   ".to_string();
        assert!(Config::try_from(args).is_err());
    }

    #[test]
    fn accepts_valid_args() {
        let config = Config::try_from(base_args()).unwrap();
        assert_eq!(config.name, "n1");
        assert_eq!(config.ping_interval_secs, DEFAULT_PING_INTERVAL_SECS);
    }
}
