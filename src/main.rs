use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;

use log::{error, info};

use chat_relay::config::Config;
use chat_relay::server::{routes, ChatServer};

/// Check that the configured certificate and key parse as PEM. The server
/// falls back to plaintext when they do not, rather than refusing to start.
fn tls_ready(cert_path: &Path, key_path: &Path) -> bool {
    let cert_file = match File::open(cert_path) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open certificate file {}: {}", cert_path.display(), e);
            return false;
        }
    };
    let key_file = match File::open(key_path) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to open private key file {}: {}", key_path.display(), e);
            return false;
        }
    };

    let certs: Vec<_> = match rustls_pemfile::certs(&mut BufReader::new(cert_file)).collect() {
        Ok(certs) => certs,
        Err(e) => {
            error!("Failed to parse certificate: {}", e);
            return false;
        }
    };
    let keys: Vec<_> =
        match rustls_pemfile::pkcs8_private_keys(&mut BufReader::new(key_file)).collect() {
            Ok(keys) => keys,
            Err(e) => {
                error!("Failed to parse private key: {}", e);
                return false;
            }
        };

    !certs.is_empty() && !keys.is_empty()
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = Config::from_env();
    let server = ChatServer::new(&config.seed_rooms);
    let routes = routes(server, config.public_dir.clone());
    let addr = SocketAddr::new(config.bind, config.port);

    if tls_ready(&config.tls_cert, &config.tls_key) {
        info!("Starting secure server (HTTPS/WSS) on {}", addr);
        warp::serve(routes)
            .tls()
            .cert_path(&config.tls_cert)
            .key_path(&config.tls_key)
            .run(addr)
            .await;
    } else {
        info!("TLS unavailable, falling back to HTTP/WS on {}", addr);
        warp::serve(routes).run(addr).await;
    }
}
