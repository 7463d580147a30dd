//! Configuration for Propolis
//!
//! CLI arguments and environment variable handling using clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::store::PublicKeyCacheConfig;

/// Propolis - signed message envelopes for federated identities
#[derive(Parser, Debug, Clone)]
#[command(name = "propolis")]
#[command(about = "Create identities, sign and verify Propolis message envelopes")]
pub struct Args {
    /// Directory holding one JSON record per identity
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Public key cache TTL in seconds (0 = entries never expire)
    #[arg(long, env = "KEY_CACHE_TTL_SECONDS", default_value = "3600")]
    pub key_cache_ttl_seconds: u64,

    /// Maximum number of cached public keys
    #[arg(long, env = "KEY_CACHE_MAX_ENTRIES", default_value = "10000")]
    pub key_cache_max_entries: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create a new identity and print its public profile
    Create {
        #[arg(long)]
        handle: String,

        #[arg(long)]
        email: String,

        #[arg(long, env = "PROPOLIS_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Print the public profile of an identity
    Show {
        #[arg(long)]
        id: String,
    },

    /// Sign a JSON payload as an identity
    Sign {
        #[arg(long)]
        id: String,

        #[arg(long, env = "PROPOLIS_PASSWORD", hide_env_values = true)]
        password: String,

        /// Content type placed after the base message type
        #[arg(long, default_value = "x-propolis-post")]
        subtype: String,

        /// Payload as a JSON document
        #[arg(long)]
        payload: String,
    },

    /// Verify an envelope against the local identities
    Verify {
        /// Envelope text; read from stdin when omitted
        #[arg(long)]
        envelope: Option<String>,
    },
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.data_dir.as_os_str().is_empty() {
            return Err("DATA_DIR must not be empty".to_string());
        }

        if self.key_cache_max_entries == 0 {
            return Err("KEY_CACHE_MAX_ENTRIES must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Public key cache settings derived from the arguments.
    pub fn cache_config(&self) -> PublicKeyCacheConfig {
        PublicKeyCacheConfig {
            default_ttl: match self.key_cache_ttl_seconds {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            max_entries: self.key_cache_max_entries,
            ..Default::default()
        }
    }
}
