use crate::models::blob::Application;
use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::path::PathBuf;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; read-only after
/// startup and shared by every unit of work.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    /// Root of the per-process scratch space. Each blob gets its own
    /// subdirectory beneath it.
    pub working_dir: PathBuf,

    /// Data lines per chunk for line-oriented splitting.
    pub line_threshold: usize,

    /// Array elements per chunk for contract exports.
    pub contract_threshold: usize,

    /// Whether the conventional first checksum line of tabular exports
    /// is dropped before splitting.
    pub skip_checksum: bool,

    /// Suffix appended to decrypted artifacts and chunk names.
    pub decrypted_suffix: String,

    pub aggregates_container: String,
    pub transactions_container: String,
    pub contracts_container: String,

    /// PGP private key used to decrypt inbound payloads.
    pub private_key_path: PathBuf,
    pub private_key_passphrase: String,

    /// Base URL of the remote object store.
    pub store_base_url: String,

    /// Value sent in the store's auth header.
    pub store_api_key: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Encrypted batch-file decrypter and splitter")]
pub struct Args {
    /// Host to bind to (overrides DECRYPTER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides DECRYPTER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Scratch directory (overrides DECRYPTER_WORKING_DIR)
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Data lines per chunk (overrides DECRYPTER_LINE_THRESHOLD)
    #[arg(long)]
    pub line_threshold: Option<usize>,

    /// Contract elements per chunk (overrides DECRYPTER_CONTRACT_THRESHOLD)
    #[arg(long)]
    pub contract_threshold: Option<usize>,

    /// Keep the first checksum line as data instead of dropping it
    #[arg(long)]
    pub keep_checksum: bool,

    /// Path to the PGP private key (overrides DECRYPTER_PRIVATE_KEY_PATH)
    #[arg(long)]
    pub private_key_path: Option<PathBuf>,

    /// Object store base URL (overrides DECRYPTER_STORE_BASE_URL)
    #[arg(long)]
    pub store_base_url: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("DECRYPTER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("DECRYPTER_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing DECRYPTER_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading DECRYPTER_PORT"),
        };
        let env_working_dir =
            env::var("DECRYPTER_WORKING_DIR").unwrap_or_else(|_| "./data/work".into());
        let env_line_threshold = parse_env_usize("DECRYPTER_LINE_THRESHOLD", 1_000_000)?;
        let env_contract_threshold = parse_env_usize("DECRYPTER_CONTRACT_THRESHOLD", 30_000)?;
        let skip_checksum = !args.keep_checksum
            && env::var("DECRYPTER_KEEP_CHECKSUM")
                .map(|v| v != "true")
                .unwrap_or(true);

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            working_dir: args
                .working_dir
                .unwrap_or_else(|| PathBuf::from(env_working_dir)),
            line_threshold: args.line_threshold.unwrap_or(env_line_threshold),
            contract_threshold: args.contract_threshold.unwrap_or(env_contract_threshold),
            skip_checksum,
            decrypted_suffix: env::var("DECRYPTER_DECRYPTED_SUFFIX")
                .unwrap_or_else(|_| ".decrypted".into()),
            aggregates_container: env::var("DECRYPTER_AGGREGATES_CONTAINER")
                .unwrap_or_else(|_| "ade-transactions-decrypted".into()),
            transactions_container: env::var("DECRYPTER_TRANSACTIONS_CONTAINER")
                .unwrap_or_else(|_| "rtd-transactions-decrypted".into()),
            contracts_container: env::var("DECRYPTER_CONTRACTS_CONTAINER")
                .unwrap_or_else(|_| "wallet-contracts-decrypted".into()),
            private_key_path: args.private_key_path.unwrap_or_else(|| {
                PathBuf::from(
                    env::var("DECRYPTER_PRIVATE_KEY_PATH")
                        .unwrap_or_else(|_| "./certs/private.key".into()),
                )
            }),
            private_key_passphrase: env::var("DECRYPTER_PRIVATE_KEY_PASSPHRASE")
                .unwrap_or_default(),
            store_base_url: args.store_base_url.unwrap_or_else(|| {
                env::var("DECRYPTER_STORE_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:10000".into())
            }),
            store_api_key: env::var("DECRYPTER_STORE_API_KEY").unwrap_or_default(),
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Destination container for a resolved application.
    pub fn target_container_for(&self, application: Application) -> &str {
        match application {
            Application::Aggregates => &self.aggregates_container,
            Application::Transactions => &self.transactions_container,
            Application::Contracts => &self.contracts_container,
            Application::Unknown => "",
        }
    }

    /// Small fixed configuration for unit and integration tests.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            working_dir: std::env::temp_dir(),
            line_threshold: 2,
            contract_threshold: 3,
            skip_checksum: true,
            decrypted_suffix: ".decrypted".into(),
            aggregates_container: "ade-target".into(),
            transactions_container: "rtd-target".into(),
            contracts_container: "wallet-target".into(),
            private_key_path: PathBuf::new(),
            private_key_passphrase: String::new(),
            store_base_url: "http://localhost:0".into(),
            store_api_key: String::new(),
        }
    }
}

fn parse_env_usize(key: &str, default: usize) -> Result<usize> {
    match env::var(key) {
        Ok(value) => value
            .parse::<usize>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).context(format!("reading {}", key)),
    }
}
