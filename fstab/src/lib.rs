// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The filesystem table (`/etc/fstab`): imports of remote filesystems and every other mount the
//! system knows about.

mod entry;
mod escape;
pub mod options;

use std::collections::HashMap;
use std::path::PathBuf;

use log::*;

use conffile::{ConfigFormat, Error, ParseError, ParseErrorKind, Result, Store};

pub use entry::{ImportEntry, ImportField};
pub use options::{ExpertOptions, MountAccess, MountOptions, MountThread, RetryMethod, SetuidPolicy};

/// An edit session over a filesystem table file.
pub type ImportStore = Store<Fstab>;

/// Open the table at `path`, or at `/etc/fstab` when no path is given.
pub fn open(path: Option<PathBuf>) -> Result<ImportStore> {
    Store::open(path.unwrap_or_else(|| PathBuf::from(conffile::FSTAB_PATH)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// Comment or blank line, written back exactly as read.
    Verbatim(String),
    Entry(ImportEntry),
}

/// The parsed table: entries in file order, interleaved with the lines that are not entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fstab {
    lines: Vec<Line>,
}

/// Several entries that mount onto the same directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPointConflict {
    pub mount_point: String,
    pub indexes: Vec<usize>,
}

impl Fstab {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> impl Iterator<Item = &ImportEntry> {
        self.lines.iter().filter_map(|line| match line {
            Line::Entry(e) => Some(e),
            Line::Verbatim(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }

    pub fn get(&self, index: usize) -> Option<&ImportEntry> {
        self.entries().nth(index)
    }

    pub fn entry(&self, index: usize) -> Result<&ImportEntry> {
        let size = self.len();
        self.get(index).ok_or(Error::Index {
            requested: index,
            size,
        })
    }

    pub fn entry_mut(&mut self, index: usize) -> Result<&mut ImportEntry> {
        let pos = self.line_of(index)?;
        match &mut self.lines[pos] {
            Line::Entry(e) => Ok(e),
            Line::Verbatim(_) => unreachable!("line_of returns entry lines"),
        }
    }

    /// Index of the first entry mounted on `mount_point`.
    pub fn position(&self, mount_point: &str) -> Option<usize> {
        self.entries().position(|e| e.mount_point() == mount_point)
    }

    /// Append an entry and return its index. Duplicates are allowed.
    pub fn add(&mut self, entry: ImportEntry) -> usize {
        debug!("adding {} on {}", entry.spec(), entry.mount_point());
        self.lines.push(Line::Entry(entry));
        self.len() - 1
    }

    pub fn remove(&mut self, index: usize) -> Result<ImportEntry> {
        let pos = self.line_of(index)?;
        match self.lines.remove(pos) {
            Line::Entry(e) => {
                debug!("removed {} on {}", e.spec(), e.mount_point());
                Ok(e)
            }
            Line::Verbatim(_) => unreachable!("line_of returns entry lines"),
        }
    }

    /// Set one field of one entry from its string form.
    pub fn update_field(&mut self, index: usize, field: ImportField, value: &str) -> Result<()> {
        self.entry_mut(index)?.set(field, value)?;
        Ok(())
    }

    pub fn field_at(&self, index: usize, field: ImportField) -> Result<String> {
        Ok(self.entry(index)?.get(field)?)
    }

    /// Mount points claimed by more than one entry, in order of first appearance.
    pub fn conflicts(&self) -> Vec<MountPointConflict> {
        let mut conflicts: Vec<MountPointConflict> = Vec::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();

        for (i, entry) in self.entries().enumerate() {
            let mount_point = entry.mount_point();
            match seen.get(mount_point) {
                Some(&c) => conflicts[c].indexes.push(i),
                None => {
                    seen.insert(mount_point, conflicts.len());
                    conflicts.push(MountPointConflict {
                        mount_point: mount_point.to_string(),
                        indexes: vec![i],
                    });
                }
            }
        }

        conflicts.retain(|c| c.indexes.len() > 1);
        conflicts
    }

    fn line_of(&self, index: usize) -> Result<usize> {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, line)| matches!(line, Line::Entry(_)))
            .nth(index)
            .map(|(pos, _)| pos)
            .ok_or_else(|| Error::Index {
                requested: index,
                size: self.len(),
            })
    }
}

impl ConfigFormat for Fstab {
    fn parse(src: &str) -> std::result::Result<Self, ParseError> {
        let mut lines = Vec::new();

        for (i, line) in src.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                lines.push(Line::Verbatim(line.to_string()));
            } else {
                lines.push(Line::Entry(parse_entry(line, i + 1)?));
            }
        }

        let table = Fstab { lines };
        debug!("parsed {} fstab entries", table.len());
        Ok(table)
    }

    fn serialize(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Verbatim(text) => out.push_str(text),
                Line::Entry(entry) => out.push_str(&entry.to_string()),
            }
            out.push('\n');
        }
        out
    }
}

fn parse_entry(line: &str, lineno: usize) -> std::result::Result<ImportEntry, ParseError> {
    let malformed = || ParseError::new(ParseErrorKind::MalformedLine, lineno);

    let fields: Vec<&str> = line.split_whitespace().collect();
    let [spec, mount_point, vfs_type, options, freq, passno, trailing @ ..] = fields.as_slice()
    else {
        return Err(malformed());
    };

    let options = MountOptions::parse(&escape::unescape(options).ok_or_else(malformed)?);
    if options.is_empty() {
        return Err(malformed());
    }

    Ok(ImportEntry::from_fields(
        escape::unescape(spec).ok_or_else(malformed)?.into_owned(),
        escape::unescape(mount_point).ok_or_else(malformed)?.into_owned(),
        escape::unescape(vfs_type).ok_or_else(malformed)?.into_owned(),
        options,
        freq.parse().map_err(|_| malformed())?,
        passno.parse().map_err(|_| malformed())?,
        trailing.iter().map(|f| f.to_string()).collect(),
    ))
}
