//! Publishes the console slave device into the stage filesystem views.
//!
//! Each stage gets a plain file bind-mounted over the slave device path.
//! Failures here are fatal setup errors; nothing created earlier is rolled
//! back.

use std::fs::{DirBuilder, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use console_mux::{MuxError, SetupStep};
use nix::mount::{MsFlags, mount};
use tracing::debug;

/// Console file for the primary stage: `<stage_dir>/<app>`.
pub fn primary_console_path(stage_dir: &Path, app: &str) -> PathBuf {
    stage_dir.join(app)
}

/// Per-application device directory for the secondary stage:
/// `<rootfs_base>/<app>/rootfs/dev/console-mux`.
pub fn secondary_console_dir(rootfs_base: &Path, app: &str) -> PathBuf {
    rootfs_base.join(app).join("rootfs/dev/console-mux")
}

/// Console file for the secondary stage, inside [`secondary_console_dir`].
pub fn secondary_console_path(rootfs_base: &Path, app: &str) -> PathBuf {
    secondary_console_dir(rootfs_base, app).join("app")
}

/// Bind-mount the slave device into the primary stage view.
pub fn publish_primary(slave: &Path, stage_dir: &Path, app: &str) -> Result<PathBuf, MuxError> {
    let target = primary_console_path(stage_dir, app);
    publish(slave, stage_dir, &target).map_err(|e| MuxError::setup(SetupStep::StagePrimary, e))?;
    Ok(target)
}

/// Bind-mount the slave device into the secondary stage rootfs.
pub fn publish_secondary(slave: &Path, rootfs_base: &Path, app: &str) -> Result<PathBuf, MuxError> {
    let dir = secondary_console_dir(rootfs_base, app);
    let target = secondary_console_path(rootfs_base, app);
    publish(slave, &dir, &target).map_err(|e| MuxError::setup(SetupStep::StageSecondary, e))?;
    Ok(target)
}

fn publish(slave: &Path, dir: &Path, target: &Path) -> io::Result<()> {
    make_dir(dir)?;
    touch(target)?;
    debug!(slave = %slave.display(), target = %target.display(), "bind-mounting console");
    mount(
        Some(slave),
        target,
        None::<&str>,
        MsFlags::MS_BIND,
        None::<&str>,
    )
    .map_err(io::Error::from)
}

fn make_dir(dir: &Path) -> io::Result<()> {
    DirBuilder::new().recursive(true).mode(0o755).create(dir)
}

/// Create the mount target as an empty file, mode 0600.
fn touch(path: &Path) -> io::Result<()> {
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .mode(0o600)
        .open(path)
        .map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_path_is_keyed_by_app_name() {
        assert_eq!(
            primary_console_path(Path::new("/run/console-mux/tty"), "web1"),
            PathBuf::from("/run/console-mux/tty/web1")
        );
    }

    #[test]
    fn secondary_path_lands_in_the_app_rootfs() {
        assert_eq!(
            secondary_console_path(Path::new("/opt/stage2"), "web1"),
            PathBuf::from("/opt/stage2/web1/rootfs/dev/console-mux/app")
        );
    }

    #[test]
    fn touch_creates_the_mount_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("app");
        touch(&target).unwrap();
        assert!(target.exists());
        // An existing target is left alone.
        std::fs::write(&target, b"x").unwrap();
        touch(&target).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"x");
    }

    #[test]
    fn make_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        make_dir(&nested).unwrap();
        make_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
