//! Console Mux - event-driven console multiplexer core
//!
//! This crate owns a single pseudoterminal that serves as the console of a
//! containerized application and relays bytes between the pty master and any
//! number of remote attach clients connected over a loopback socket. It has
//! no knowledge of mounts, supervisors, or logging backends; those are
//! injected at the edges.
//!
//! # Example
//!
//! ```no_run
//! use console_mux::{DEFAULT_MAX_CLIENTS, Multiplexer, MuxError, NullNotifier, NullSink};
//! use console_mux::{PtyConsole, SetupStep};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), MuxError> {
//!     let console = PtyConsole::open()?;
//!     println!("console device at {}", console.slave_path().display());
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
//!         .await
//!         .map_err(|e| MuxError::setup(SetupStep::SocketBind, e))?;
//!
//!     let mux = Multiplexer::new(
//!         console,
//!         listener,
//!         DEFAULT_MAX_CLIENTS,
//!         Box::new(NullSink),
//!         Box::new(NullNotifier),
//!     )?;
//!     mux.run().await
//! }
//! ```

mod error;
mod mux;
mod notify;
pub mod pty;
mod registry;

pub use error::{MuxError, SetupStep};
pub use mux::Multiplexer;
pub use notify::{ConsoleSink, NullNotifier, NullSink, ReadinessNotifier};
pub use pty::PtyConsole;
pub use registry::{AttachClient, ClientRegistry, DEFAULT_MAX_CLIENTS};
