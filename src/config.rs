use std::env;
use std::net::IpAddr;
use std::path::PathBuf;

use log::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedRoom {
    pub name: String,
    pub password: Option<String>,
}

/// Runtime configuration. Defaults match the historical hardcoded values;
/// every field can be overridden through a `CHAT_*` environment variable.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: IpAddr,
    pub port: u16,
    pub tls_cert: PathBuf,
    pub tls_key: PathBuf,
    pub public_dir: String,
    pub seed_rooms: Vec<SeedRoom>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: 2052,
            tls_cert: PathBuf::from("ssl/room/certificate.pem"),
            tls_key: PathBuf::from("ssl/room/private.key"),
            public_dir: "public".to_string(),
            seed_rooms: parse_seed_rooms("ALL,General,Tech"),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(bind) = env::var("CHAT_BIND") {
            match bind.parse() {
                Ok(addr) => config.bind = addr,
                Err(_) => warn!("Ignoring unparsable CHAT_BIND value: {}", bind),
            }
        }
        if let Ok(port) = env::var("CHAT_PORT") {
            match port.parse() {
                Ok(port) => config.port = port,
                Err(_) => warn!("Ignoring unparsable CHAT_PORT value: {}", port),
            }
        }
        if let Ok(cert) = env::var("CHAT_TLS_CERT") {
            config.tls_cert = PathBuf::from(cert);
        }
        if let Ok(key) = env::var("CHAT_TLS_KEY") {
            config.tls_key = PathBuf::from(key);
        }
        if let Ok(dir) = env::var("CHAT_PUBLIC_DIR") {
            config.public_dir = dir;
        }
        if let Ok(rooms) = env::var("CHAT_SEED_ROOMS") {
            config.seed_rooms = parse_seed_rooms(&rooms);
        }

        config
    }
}

/// Comma-separated room list; a `name:password` entry seeds a gated room.
fn parse_seed_rooms(raw: &str) -> Vec<SeedRoom> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            let (name, password) = match entry.split_once(':') {
                Some((name, password)) if !password.is_empty() => {
                    (name, Some(password.to_string()))
                }
                Some((name, _)) => (name, None),
                None => (entry, None),
            };
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(SeedRoom {
                name: name.to_string(),
                password,
            })
        })
        .collect()
}
