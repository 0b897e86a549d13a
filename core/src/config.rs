/// Configuration management
use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_API_PORT: u16 = 8787;
const DEFAULT_DATA_DIR: &str = ".chatlink";

/// Client service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP API address for the UI frontend
    pub api_addr: SocketAddr,

    /// Data directory for the store (defaults to `.chatlink`)
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_addr: format!("127.0.0.1:{}", DEFAULT_API_PORT).parse().unwrap(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
        }
    }
}

impl Config {
    /// Create config from command line arguments
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut api_port: Option<u16> = None;
        let mut data_dir: Option<PathBuf> = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--api-port" => {
                    let p = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--api-port requires a port argument".to_string())
                    })?;
                    api_port = Some(p.parse::<u16>().map_err(|_| {
                        ChatError::Config("--api-port must be a valid number (0-65535)".to_string())
                    })?);
                    i += 2;
                }
                "--data-dir" => {
                    let path = args.get(i + 1).ok_or_else(|| {
                        ChatError::Config("--data-dir requires a path argument".to_string())
                    })?;
                    data_dir = Some(PathBuf::from(path));
                    i += 2;
                }
                other => {
                    return Err(ChatError::Config(format!(
                        "Usage: {} [--api-port <port>] [--data-dir <path>] (unknown argument: {})",
                        args.first().map(String::as_str).unwrap_or("chatlink"),
                        other
                    )));
                }
            }
        }

        // Env overrides (nice for scripts)
        if let Some(p) = std::env::var("CHATLINK_API_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
        {
            api_port = Some(p);
        }
        if let Ok(dir) = std::env::var("CHATLINK_DATA_DIR") {
            data_dir = Some(PathBuf::from(dir));
        }

        let api_addr = format!("127.0.0.1:{}", api_port.unwrap_or(DEFAULT_API_PORT))
            .parse()
            .map_err(|_| ChatError::Config("Invalid api address".to_string()))?;

        Ok(Self {
            api_addr,
            data_dir: data_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        })
    }
}
