//! Server configuration, loaded from a TOML file.

use serde_derive::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 5500;

#[derive(Serialize, Deserialize, Clone)]
pub struct ServerSection {
    /// Listen address for the control channel. The file-transfer side
    /// channel binds the same host on `port + 1`.
    pub address: Option<String>,
    pub port: u16,
    pub name: String,
    pub max_clients: u16,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct PathsSection {
    /// Root of the served file volume.
    pub file_root: PathBuf,
    /// Directory holding per-login account records.
    pub accounts: PathBuf,
    /// Directory holding the news tree, the flat news log and the ban list.
    pub data: PathBuf,
    /// Agreement text shown after login; optional.
    pub agreement: Option<PathBuf>,
    /// Server banner image; optional.
    pub banner: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct NewsSection {
    /// Prefix template for flat-news posts. `%s` expands to the poster's
    /// nickname, a second `%s` to the timestamp.
    pub template: String,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct Config {
    pub server: ServerSection,
    pub paths: PathsSection,
    pub news: NewsSection,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            server: ServerSection {
                address: None,
                port: DEFAULT_PORT,
                name: "hxd server".to_string(),
                max_clients: 256,
            },
            paths: PathsSection {
                file_root: PathBuf::from("files"),
                accounts: PathBuf::from("accounts"),
                data: PathBuf::from("data"),
                agreement: None,
                banner: None,
            },
            news: NewsSection {
                template: "From %s (%s):\r\r%s\r\r_________________________________\r".to_string(),
            },
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, serdeconv::Error> {
        serdeconv::from_toml_file(path)
    }

    /// Address the control listener binds.
    pub fn bind_address(&self) -> String {
        let host = self.server.address.as_deref().unwrap_or("0.0.0.0");
        format!("{}:{}", host, self.server.port)
    }

    /// Address the transfer listener binds.
    pub fn transfer_address(&self) -> String {
        let host = self.server.address.as_deref().unwrap_or("0.0.0.0");
        format!("{}:{}", host, self.server.port + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addresses() {
        let config = Config::default();

        assert_eq!(config.bind_address(), "0.0.0.0:5500");
        assert_eq!(config.transfer_address(), "0.0.0.0:5501");
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = Config::default();
        let toml = serdeconv::to_toml_string(&config).unwrap();
        let loaded: Config = serdeconv::from_toml_str(&toml).unwrap();

        assert_eq!(loaded.server.port, config.server.port);
        assert_eq!(loaded.paths.file_root, config.paths.file_root);
    }
}
