//! Pseudoterminal allocation and configuration.
//!
//! The master side stays in this process and feeds the multiplexer; the
//! slave path is handed to the mount publisher so the device can be exposed
//! inside the stage filesystems.

use std::fs::File;
use std::os::fd::{FromRawFd, IntoRawFd};
use std::path::{Path, PathBuf};

use nix::fcntl::OFlag;
use nix::pty::{grantpt, posix_openpt, ptsname_r, unlockpt};
use nix::sys::termios::{LocalFlags, SetArg, tcgetattr, tcsetattr};

use crate::error::{MuxError, SetupStep};

/// An allocated console pseudoterminal.
///
/// The master descriptor is non-blocking and close-on-exec, with local echo
/// disabled on the line discipline. It is never explicitly released; its
/// lifetime is the process's lifetime.
pub struct PtyConsole {
    master: File,
    slave_path: PathBuf,
}

impl PtyConsole {
    /// Allocate and configure the console pty pair.
    ///
    /// Fails with a fatal setup error if allocation or mode configuration
    /// fails; there is no retry.
    pub fn open() -> Result<Self, MuxError> {
        let master = posix_openpt(
            OFlag::O_RDWR | OFlag::O_NOCTTY | OFlag::O_CLOEXEC | OFlag::O_NONBLOCK,
        )
        .map_err(|e| MuxError::setup(SetupStep::PtyAlloc, e.into()))?;

        grantpt(&master).map_err(|e| MuxError::setup(SetupStep::PtyConfig, e.into()))?;
        unlockpt(&master).map_err(|e| MuxError::setup(SetupStep::PtyConfig, e.into()))?;
        let slave_path =
            PathBuf::from(ptsname_r(&master).map_err(|e| {
                MuxError::setup(SetupStep::PtyConfig, e.into())
            })?);

        // SAFETY: the raw fd is taken out of the PtyMaster wrapper exactly
        // once and ownership moves into the File.
        let master = unsafe { File::from_raw_fd(master.into_raw_fd()) };

        let mut tio = tcgetattr(&master).map_err(|e| {
            MuxError::setup(SetupStep::PtyConfig, e.into())
        })?;
        tio.local_flags.remove(LocalFlags::ECHO);
        tcsetattr(&master, SetArg::TCSANOW, &tio)
            .map_err(|e| MuxError::setup(SetupStep::PtyConfig, e.into()))?;

        Ok(Self { master, slave_path })
    }

    /// Filesystem path of the slave device, for the mount publisher.
    pub fn slave_path(&self) -> &Path {
        &self.slave_path
    }

    /// Consume the console and hand the master descriptor to the dispatcher.
    pub(crate) fn into_master(self) -> File {
        self.master
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::{self, Read};

    #[test]
    fn open_yields_a_slave_device_path() {
        let console = PtyConsole::open().expect("pty allocation failed");
        assert!(console.slave_path().exists());
        assert!(console.slave_path().starts_with("/dev"));
    }

    #[test]
    fn local_echo_is_disabled() {
        let console = PtyConsole::open().unwrap();
        let tio = tcgetattr(&console.master).unwrap();
        assert!(!tio.local_flags.contains(LocalFlags::ECHO));
    }

    #[test]
    fn master_is_nonblocking() {
        let console = PtyConsole::open().unwrap();
        // Keep the slave open so the master does not report end-of-file.
        let _slave = OpenOptions::new()
            .read(true)
            .write(true)
            .open(console.slave_path())
            .unwrap();

        let mut master = console.into_master();
        let mut buf = [0u8; 16];
        let err = master.read(&mut buf).expect_err("read should not block");
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
