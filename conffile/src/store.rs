// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::fs;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use log::*;

use crate::{commit, ConfigFormat, Error, Result};

/// One edit session over a configuration file: the parsed table plus the file it came from.
///
/// Edits go through the table (the store dereferences to it); nothing touches the disk until
/// [`Store::commit`], and [`Store::revert`] throws the edits away.
#[derive(Debug)]
pub struct Store<T> {
    path: PathBuf,
    table: T,
}

impl<T: ConfigFormat> Store<T> {
    /// Load and parse `path`. A file that does not exist yet loads as an empty table.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = match fs::read_to_string(&path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("{} does not exist; starting empty", path.display());
                T::parse("")?
            }
            read => load(&path, read)?,
        };
        Ok(Self { path, table })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    /// Atomically replace the file with the serialized table.
    pub fn commit(&self) -> Result<()> {
        commit::write_atomic(&self.path, &self.table.serialize())
    }

    /// Re-read the file, discarding every in-memory edit. If the file cannot be read or parsed
    /// the current table is kept. A missing file counts as unreadable here.
    pub fn revert(&mut self) -> Result<()> {
        let table = load(&self.path, fs::read_to_string(&self.path))?;
        self.table = table;
        debug!("reverted {}", self.path.display());
        Ok(())
    }
}

impl<T> Deref for Store<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.table
    }
}

impl<T> DerefMut for Store<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.table
    }
}

fn load<T: ConfigFormat>(path: &Path, read: io::Result<String>) -> Result<T> {
    let src = read.map_err(|e| Error::io(path, e))?;
    let table = T::parse(&src)?;
    debug!("loaded {}", path.display());
    Ok(table)
}
