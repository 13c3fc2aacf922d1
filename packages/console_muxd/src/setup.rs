//! Fatal setup steps shared between the daemon binary and its tests.

use std::env;
use std::io;
use std::net::SocketAddr;

use console_mux::{MuxError, SetupStep};
use tokio::net::TcpListener;

use crate::APPNAME_ENV;

/// Application name from the environment. The daemon serves exactly one
/// application; an unset name is the first fatal setup step.
pub fn discover_app_name() -> Result<String, MuxError> {
    env::var(APPNAME_ENV).map_err(|_| {
        MuxError::setup(
            SetupStep::AppName,
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{APPNAME_ENV} is not set"),
            ),
        )
    })
}

/// Bind the attach listener socket.
pub async fn bind_attach(addr: SocketAddr) -> Result<TcpListener, MuxError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| MuxError::setup(SetupStep::SocketBind, e))
}
