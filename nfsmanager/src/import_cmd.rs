// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::io::Write;
use std::path::PathBuf;

use clap::Subcommand;
use log::*;

use fstab::{ImportEntry, ImportField};

#[derive(Debug, Subcommand)]
pub enum ImportCommand {
    /// Print every entry with its index.
    List,
    /// Append an entry. Give either --spec or both --server and --directory.
    Add {
        #[arg(long, conflicts_with_all = ["server", "directory"])]
        spec: Option<String>,
        #[arg(long, requires = "directory")]
        server: Option<String>,
        #[arg(long, requires = "server")]
        directory: Option<String>,
        #[arg(long)]
        mount_point: String,
        #[arg(long, default_value = "nfs")]
        vfs_type: String,
        #[arg(long, default_value = "rw")]
        options: String,
        #[arg(long, default_value = "0")]
        freq: String,
        #[arg(long, default_value = "0")]
        passno: String,
    },
    /// Delete the entry at an index.
    Remove { index: usize },
    /// Print one field of an entry.
    Get { index: usize, field: String },
    /// Change one field of an entry.
    Set {
        index: usize,
        field: String,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Report mount points used by more than one entry.
    Conflicts,
}

pub fn run(
    path: PathBuf,
    command: ImportCommand,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = fstab::open(Some(path))?;

    match command {
        ImportCommand::List => {
            for (i, entry) in store.entries().enumerate() {
                writeln!(out, "{i}\t{entry}")?;
            }
        }
        ImportCommand::Add {
            spec,
            server,
            directory,
            mount_point,
            vfs_type,
            options,
            freq,
            passno,
        } => {
            let spec = match (spec, server, directory) {
                (Some(spec), _, _) => spec,
                (None, Some(server), Some(directory)) => format!("{server}:{directory}"),
                _ => return Err("either --spec or --server and --directory is required".into()),
            };
            let entry = ImportEntry::build(&spec, &mount_point, &vfs_type, &options, &freq, &passno)?;
            let index = store.add(entry);
            store.commit()?;
            info!("added entry {index}");
            writeln!(out, "{index}")?;
        }
        ImportCommand::Remove { index } => {
            let removed = store.remove(index)?;
            store.commit()?;
            info!("removed {} on {}", removed.spec(), removed.mount_point());
        }
        ImportCommand::Get { index, field } => {
            let field: ImportField = field.parse()?;
            writeln!(out, "{}", store.field_at(index, field)?)?;
        }
        ImportCommand::Set {
            index,
            field,
            value,
        } => {
            let field: ImportField = field.parse()?;
            store.update_field(index, field, &value)?;
            store.commit()?;
        }
        ImportCommand::Conflicts => {
            for conflict in store.conflicts() {
                let indexes: Vec<String> = conflict.indexes.iter().map(|i| i.to_string()).collect();
                writeln!(out, "{}: entries {}", conflict.mount_point, indexes.join(", "))?;
            }
        }
    }

    Ok(())
}
