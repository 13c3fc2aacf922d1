//! Advertises the bound attach endpoint so tooling can discover the
//! runtime-assigned port.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use console_mux::{MuxError, SetupStep};
use serde::{Deserialize, Serialize};

/// One advertised attach endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,
    pub family: String,
    pub protocol: String,
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn for_listener(app: &str, addr: SocketAddr) -> Self {
        let family = match addr {
            SocketAddr::V4(_) => "inet",
            SocketAddr::V6(_) => "inet6",
        };
        Self {
            name: app.to_string(),
            family: family.to_string(),
            protocol: "tcp".to_string(),
            address: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

/// Path of the advertisement file: `<status_dir>/<app>/endpoint.json`.
pub fn endpoint_path(status_dir: &Path, app: &str) -> PathBuf {
    status_dir.join(app).join("endpoint.json")
}

/// Write the endpoint record. Failure shares the socket-bind setup step,
/// since an unadvertised ephemeral port is unreachable in practice.
pub fn advertise(status_dir: &Path, app: &str, addr: SocketAddr) -> Result<PathBuf, MuxError> {
    let dir = status_dir.join(app);
    fs::create_dir_all(&dir).map_err(|e| MuxError::setup(SetupStep::SocketBind, e))?;
    let path = dir.join("endpoint.json");

    let record = Endpoint::for_listener(app, addr);
    let body = serde_json::to_vec_pretty(&record)
        .map_err(|e| MuxError::setup(SetupStep::SocketBind, e.into()))?;
    fs::write(&path, body).map_err(|e| MuxError::setup(SetupStep::SocketBind, e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_the_listener_coordinates() {
        let addr: SocketAddr = "127.0.0.1:39741".parse().unwrap();
        let endpoint = Endpoint::for_listener("web1", addr);
        assert_eq!(endpoint.name, "web1");
        assert_eq!(endpoint.family, "inet");
        assert_eq!(endpoint.protocol, "tcp");
        assert_eq!(endpoint.address, "127.0.0.1");
        assert_eq!(endpoint.port, 39741);
    }

    #[test]
    fn advertise_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let addr: SocketAddr = "127.0.0.1:45000".parse().unwrap();

        let path = advertise(dir.path(), "web1", addr).unwrap();
        assert_eq!(path, dir.path().join("web1/endpoint.json"));

        let body = std::fs::read(&path).unwrap();
        let parsed: Endpoint = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed, Endpoint::for_listener("web1", addr));
    }
}
