//! Setup-phase pieces of the console multiplexer daemon: stage mount
//! publishing and attach-endpoint advertisement. The relay engine itself
//! lives in the `console_mux` crate.

pub mod endpoint;
pub mod mounts;
pub mod setup;

/// Environment variable naming the application whose console is served.
pub const APPNAME_ENV: &str = "MUXD_APPNAME";
