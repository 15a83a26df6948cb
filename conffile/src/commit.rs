// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! Writing a whole configuration file without ever leaving a half-written target behind.
//!
//! The new contents go to a temporary file in the target's directory which is then renamed over
//! the target. The whole sequence runs under an exclusive `flock` on a sidecar lock file, so two
//! writers of the same file are serialized.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use log::*;
use nix::fcntl::{Flock, FlockArg};

use crate::{Error, Result};

/// Exclusive advisory lock on the sidecar lock file of a configuration file. Released on drop.
pub struct FileLock {
    _lock: Flock<File>,
    path: PathBuf,
}

impl FileLock {
    /// Block until the exclusive lock for `target` is held.
    pub fn acquire(target: &Path) -> Result<Self> {
        let path = sidecar_path(target, "lock")?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| Error::io(&path, e))?;

        let lock = Flock::lock(file, FlockArg::LockExclusive)
            .map_err(|(_, errno)| Error::io(&path, io::Error::from(errno)))?;
        debug!("locked {}", path.display());

        Ok(Self { _lock: lock, path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        debug!("unlocking {}", self.path.display());
    }
}

/// Replace `target` with `contents`. On failure the target is left exactly as it was.
pub fn write_atomic(target: &Path, contents: &str) -> Result<()> {
    let _lock = FileLock::acquire(target)?;
    let tmp = sidecar_path(target, "tmp")?;

    let res = write_temp(&tmp, target, contents)
        .and_then(|()| fs::rename(&tmp, target).map_err(|e| Error::io(target, e)));

    match res {
        Ok(()) => {
            sync_parent(target);
            info!("wrote {} ({} bytes)", target.display(), contents.len());
            Ok(())
        }
        Err(e) => {
            warn!("failed to write {}: {e}", target.display());
            // Only ever a regular file we created; anything else at that path is left alone.
            if fs::symlink_metadata(&tmp).is_ok_and(|m| m.is_file()) {
                let _ = fs::remove_file(&tmp);
            }
            Err(e)
        }
    }
}

fn write_temp(tmp: &Path, target: &Path, contents: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(tmp)
        .map_err(|e| Error::io(tmp, e))?;

    file.write_all(contents.as_bytes())
        .map_err(|e| Error::io(tmp, e))?;

    // Keep the mode and owner of the file being replaced.
    if let Ok(meta) = fs::metadata(target) {
        file.set_permissions(meta.permissions())
            .map_err(|e| Error::io(tmp, e))?;
        let ours = file.metadata().map_err(|e| Error::io(tmp, e))?;
        if ours.uid() != meta.uid() || ours.gid() != meta.gid() {
            std::os::unix::fs::fchown(&file, Some(meta.uid()), Some(meta.gid()))
                .map_err(|e| Error::io(tmp, e))?;
        }
    }

    file.sync_all().map_err(|e| Error::io(tmp, e))
}

fn sync_parent(target: &Path) {
    if let Some(dir) = target.parent() {
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
            debug!("could not sync {}: {e}", dir.display());
        }
    }
}

/// `/etc/fstab` -> `/etc/.fstab.<suffix>`
pub fn sidecar_path(target: &Path, suffix: &str) -> Result<PathBuf> {
    let Some(name) = target.file_name() else {
        return Err(Error::io(
            target,
            io::Error::new(io::ErrorKind::InvalidInput, "path does not name a file"),
        ));
    };
    let mut sidecar = std::ffi::OsString::from(".");
    sidecar.push(name);
    sidecar.push(".");
    sidecar.push(suffix);
    Ok(target.with_file_name(sidecar))
}
