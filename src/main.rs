use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, Level};

use o3fs::{Config, Node};

fn cli() -> Command {
    Command::new("o3fs")
        .version(env!("CARGO_PKG_VERSION"))
        .about("File storage node with local and distributed backends")
        .arg(
            Arg::new("ip")
                .long("ip")
                .env("O3FS_IP")
                .help("IP address to listen on")
                .default_value("127.0.0.1"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .env("O3FS_PORT")
                .help("Port to listen on")
                .default_value("8000"),
        )
        .arg(
            Arg::new("advertise")
                .long("advertise")
                .env("O3FS_ADVERTISE")
                .help("Address peers use to reach this node (defaults to ip:port)"),
        )
        .arg(
            Arg::new("storage-path")
                .long("storage-path")
                .env("O3FS_STORAGE_PATH")
                .help("Root directory for metadata and blob bodies")
                .default_value("/var/lib/o3fs"),
        )
        .arg(
            Arg::new("api-prefix")
                .long("api-prefix")
                .env("O3FS_API_PREFIX")
                .help("Route prefix of the peer file endpoints")
                .default_value(network::DEFAULT_API_PREFIX),
        )
        .arg(
            Arg::new("default-storage-type")
                .long("default-storage-type")
                .env("O3FS_DEFAULT_STORAGE_TYPE")
                .help("Backend used when a caller does not name one")
                .default_value(storage::LOCAL_STORAGE_TYPE),
        )
        .arg(
            Arg::new("chunk-size")
                .long("chunk-size")
                .env("O3FS_CHUNK_SIZE")
                .help("Chunk size in bytes for streamed I/O"),
        )
        .arg(
            Arg::new("no-check-hash")
                .long("no-check-hash")
                .env("O3FS_NO_CHECK_HASH")
                .help("Skip hashing on save and verification on load")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("connect-timeout-ms")
                .long("connect-timeout-ms")
                .env("O3FS_CONNECT_TIMEOUT_MS")
                .help("Connect timeout for peer requests"),
        )
        .arg(
            Arg::new("transfer-timeout-ms")
                .long("transfer-timeout-ms")
                .env("O3FS_TRANSFER_TIMEOUT_MS")
                .help("Timeout for a whole peer transfer"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .env("O3FS_LOG_LEVEL")
                .help("One of trace, debug, info, warn, error")
                .default_value("info"),
        )
}

fn parse_arg<T>(matches: &ArgMatches, name: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    matches
        .get_one::<String>(name)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("Invalid value for --{}: {}", name, value))
        })
        .transpose()
}

fn config_from_matches(matches: &ArgMatches) -> anyhow::Result<Config> {
    let ip: IpAddr = parse_arg(matches, "ip")?.context("--ip is required")?;
    let port: u16 = parse_arg(matches, "port")?.context("--port is required")?;

    let mut config = Config::new(ip, port);
    config.advertised_address = matches.get_one::<String>("advertise").cloned();
    if let Some(path) = matches.get_one::<String>("storage-path") {
        config.storage_path = PathBuf::from(path);
    }
    if let Some(prefix) = matches.get_one::<String>("api-prefix") {
        config.api_prefix = prefix.clone();
    }
    if let Some(storage_type) = matches.get_one::<String>("default-storage-type") {
        config.default_storage_type = storage_type.clone();
    }
    if let Some(chunk_size) = parse_arg(matches, "chunk-size")? {
        config.save_chunk_size = chunk_size;
    }
    if let Some(timeout) = parse_arg(matches, "connect-timeout-ms")? {
        config.connect_timeout_ms = timeout;
    }
    if let Some(timeout) = parse_arg(matches, "transfer-timeout-ms")? {
        config.transfer_timeout_ms = timeout;
    }
    config.check_hash = !matches.get_flag("no-check-hash");

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let level: Level = parse_arg(&matches, "log-level")?.unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = config_from_matches(&matches)?;
    info!("Node configuration: {:?}", config);

    let node = Node::new(config)
        .await
        .context("Failed to initialize storage node")?;
    node.start().await.context("Storage node stopped with an error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let matches = cli().get_matches_from(["o3fs"]);
        let config = config_from_matches(&matches).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8000");
        assert!(config.check_hash);
        assert_eq!(config.api_prefix, network::DEFAULT_API_PREFIX);
    }

    #[test]
    fn test_cli_overrides() {
        let matches = cli().get_matches_from([
            "o3fs",
            "--port",
            "9100",
            "--advertise",
            "node-b:9100",
            "--no-check-hash",
            "--chunk-size",
            "4096",
        ]);
        let config = config_from_matches(&matches).unwrap();
        assert_eq!(config.node_address(), "node-b:9100");
        assert!(!config.check_hash);
        assert_eq!(config.save_chunk_size, 4096);
    }

    #[test]
    fn test_cli_rejects_bad_port() {
        let matches = cli().get_matches_from(["o3fs", "--port", "not-a-port"]);
        assert!(config_from_matches(&matches).is_err());
    }
}
