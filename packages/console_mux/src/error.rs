use std::fmt;
use std::io;

use thiserror::Error;

/// The ordered setup steps that can fail fatally before the relay loop
/// starts. Each step exits with its own distinct non-zero status so a
/// supervisor can tell how far setup got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    /// Discovering the application name from the environment.
    AppName,
    /// Allocating the pseudoterminal pair.
    PtyAlloc,
    /// Configuring the pseudoterminal line discipline.
    PtyConfig,
    /// Publishing the console into the primary stage filesystem.
    StagePrimary,
    /// Publishing the console into the secondary stage filesystem.
    StageSecondary,
    /// Binding the attach listener socket.
    SocketBind,
    /// Registering readiness sources with the dispatcher.
    Dispatch,
}

impl SetupStep {
    /// Process exit status for a failure at this step.
    pub fn code(self) -> i32 {
        match self {
            SetupStep::AppName => 1,
            SetupStep::PtyAlloc => 2,
            SetupStep::PtyConfig => 3,
            SetupStep::StagePrimary => 4,
            SetupStep::StageSecondary => 5,
            SetupStep::SocketBind => 6,
            SetupStep::Dispatch => 7,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            SetupStep::AppName => "application name discovery",
            SetupStep::PtyAlloc => "pty allocation",
            SetupStep::PtyConfig => "pty configuration",
            SetupStep::StagePrimary => "primary stage publish",
            SetupStep::StageSecondary => "secondary stage publish",
            SetupStep::SocketBind => "attach socket bind",
            SetupStep::Dispatch => "dispatcher registration",
        }
    }
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by the console multiplexer.
///
/// Two tiers only: `Setup` failures are fatal and happen before the relay
/// loop runs; `Relay` is an unrecoverable loop failure (pty end-of-file or a
/// dispatcher error). Per-client I/O problems are handled inside the loop
/// and never surface here.
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("setup failed during {step}: {source}")]
    Setup { step: SetupStep, source: io::Error },
    #[error("console relay failed: {0}")]
    Relay(#[from] io::Error),
}

impl MuxError {
    pub fn setup(step: SetupStep, source: io::Error) -> Self {
        MuxError::Setup { step, source }
    }

    /// Process exit status for this error. Setup failures map to the failing
    /// step's code; relay failures propagate the underlying OS error number.
    pub fn exit_code(&self) -> i32 {
        match self {
            MuxError::Setup { step, .. } => step.code(),
            MuxError::Relay(e) => e.raw_os_error().unwrap_or(1),
        }
    }
}
