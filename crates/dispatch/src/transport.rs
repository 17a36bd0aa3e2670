//! Coordinator endpoints.
//!
//! Accepted forms:
//!
//! - `tcp://host:port`: port 0 asks the OS for an ephemeral port.
//! - `ipc:///abs/path.sock`: a Unix socket at exactly that path.
//! - `ipc://name`: shorthand for `ipc:///tmp/divvy/name.sock`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DispatchError;

/// Where `ipc://name` sockets live.
const IPC_DIR: &str = "/tmp/divvy";

/// Where the coordinator listens and workers connect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Unix domain socket at an absolute path, for workers on this host.
    Ipc(PathBuf),

    /// TCP, for workers spread across hosts.
    Tcp { host: String, port: u16 },
}

impl Transport {
    /// Socket `<name>.sock` in the shared IPC directory.
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(Path::new(IPC_DIR).join(format!("{name}.sock")))
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// The ZeroMQ endpoint string.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(path) => format!("ipc://{}", path.display()),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            Self::Ipc(path) => Some(path),
            Self::Tcp { .. } => None,
        }
    }

    /// Make an IPC path bindable: create its directory and remove a socket
    /// file left behind by an earlier coordinator. No-op for TCP.
    pub fn prepare_bind(&self) -> std::io::Result<()> {
        let Some(path) = self.socket_path() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed stale IPC socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

fn parse_ipc(endpoint: &str, rest: &str) -> Result<Transport, DispatchError> {
    let invalid =
        |why: &str| DispatchError::Config(format!("invalid ipc endpoint '{endpoint}': {why}"));

    if rest.is_empty() {
        return Err(invalid("empty path"));
    }
    if !rest.contains('/') {
        return Ok(Transport::ipc(rest));
    }
    let path = Path::new(rest);
    if !path.is_absolute() {
        return Err(invalid("path must be absolute"));
    }
    if rest.ends_with('/') || path.file_name().is_none() {
        return Err(invalid("path names a directory"));
    }
    Ok(Transport::Ipc(path.to_path_buf()))
}

fn parse_tcp(endpoint: &str, addr: &str) -> Result<Transport, DispatchError> {
    let (host, port) = addr.rsplit_once(':').ok_or_else(|| {
        DispatchError::Config(format!("tcp endpoint '{endpoint}' is missing a port"))
    })?;
    if host.is_empty() {
        return Err(DispatchError::Config(format!(
            "tcp endpoint '{endpoint}' is missing a host"
        )));
    }
    let port = port.parse().map_err(|_| {
        DispatchError::Config(format!("invalid port in tcp endpoint '{endpoint}'"))
    })?;
    Ok(Transport::tcp(host, port))
}

impl std::str::FromStr for Transport {
    type Err = DispatchError;

    fn from_str(endpoint: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = endpoint.strip_prefix("ipc://") {
            parse_ipc(endpoint, rest)
        } else if let Some(addr) = endpoint.strip_prefix("tcp://") {
            parse_tcp(endpoint, addr)
        } else {
            Err(DispatchError::Config(format!(
                "unsupported endpoint '{endpoint}', expected ipc:// or tcp://"
            )))
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.endpoint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ipc_name_lands_in_shared_dir() {
        let t: Transport = "ipc://coordinator".parse().unwrap();
        assert_eq!(t, Transport::ipc("coordinator"));
        assert_eq!(t.endpoint(), "ipc:///tmp/divvy/coordinator.sock");
    }

    #[test]
    fn absolute_ipc_path_is_kept_whole() {
        let t: Transport = "ipc:///var/run/a.b.sock".parse().unwrap();
        assert_eq!(t.socket_path(), Some(Path::new("/var/run/a.b.sock")));
        assert_eq!(t.endpoint(), "ipc:///var/run/a.b.sock");
    }

    #[test]
    fn tcp_endpoint() {
        let t = Transport::tcp("127.0.0.1", 5570);
        assert_eq!(t.endpoint(), "tcp://127.0.0.1:5570");
        assert_eq!(t.socket_path(), None);
        assert_eq!(t.to_string(), t.endpoint());
    }

    #[test]
    fn parses_its_own_endpoints() {
        for t in [
            Transport::ipc("run-7"),
            Transport::Ipc(PathBuf::from("/srv/jobs/ctl.sock")),
            Transport::tcp("10.0.0.4", 0),
        ] {
            let parsed: Transport = t.endpoint().parse().unwrap();
            assert_eq!(parsed, t);
        }
    }

    #[test]
    fn rejects_bad_endpoints() {
        for bad in [
            "udp://host:1",
            "tcp://host",
            "tcp://host:http",
            "tcp://:5570",
            "ipc://",
            "ipc://run/x.sock",
            "ipc:///tmp/divvy/",
        ] {
            assert!(bad.parse::<Transport>().is_err(), "{bad}");
        }
    }

    #[test]
    fn prepare_bind_creates_dir_and_clears_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ctl.sock");
        let t = Transport::Ipc(path.clone());

        t.prepare_bind().unwrap();
        assert!(path.parent().unwrap().is_dir());

        std::fs::write(&path, b"").unwrap();
        t.prepare_bind().unwrap();
        assert!(!path.exists());

        Transport::tcp("127.0.0.1", 0).prepare_bind().unwrap();
    }
}
