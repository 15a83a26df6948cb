// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::io::Write;
use std::path::PathBuf;

use clap::Subcommand;
use log::*;

use exports::{ClientId, HostCategory};

#[derive(Debug, Subcommand)]
pub enum ExportCommand {
    /// Print every export with its clients grouped by access.
    List,
    /// Grant a host access to a directory, exporting it if needed.
    AddHost {
        path: PathBuf,
        host: String,
        /// read-only, read-write, or root-access
        category: String,
    },
    /// Revoke a host's access. An export left without hosts is removed.
    RemoveHost {
        path: PathBuf,
        host: String,
        category: String,
    },
    /// Set how users the server does not know are treated.
    Policy {
        path: PathBuf,
        /// Allow unknown users.
        #[arg(long)]
        allow: bool,
        /// nobody, deny, or a uid
        mapping: String,
    },
    /// Stop exporting a directory.
    Delete { path: PathBuf },
}

pub fn run(
    path: PathBuf,
    command: ExportCommand,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = exports::open(Some(path))?;

    match command {
        ExportCommand::List => {
            for rule in store.rules() {
                writeln!(out, "{}", rule.path().display())?;
                for category in HostCategory::ALL {
                    let hosts: Vec<String> =
                        rule.hosts(category).iter().map(ToString::to_string).collect();
                    if !hosts.is_empty() {
                        writeln!(out, "  {category}: {}", hosts.join(" "))?;
                    }
                }
                writeln!(
                    out,
                    "  unknown users: {} ({})",
                    if rule.allow_unknown_users() { "allowed" } else { "refused" },
                    rule.unknown_user_mapping()
                )?;
            }
        }
        ExportCommand::AddHost {
            path,
            host,
            category,
        } => {
            let client: ClientId = host.parse()?;
            let category: HostCategory = category.parse()?;
            if store.add_host(&path, client, category)? {
                store.commit()?;
            } else {
                info!("{host} already has {category} access to {}", path.display());
            }
        }
        ExportCommand::RemoveHost {
            path,
            host,
            category,
        } => {
            let client: ClientId = host.parse()?;
            let category: HostCategory = category.parse()?;
            if store.remove_host(&path, &client, category) {
                store.commit()?;
            } else {
                warn!("{host} has no {category} access to {}", path.display());
            }
        }
        ExportCommand::Policy {
            path,
            allow,
            mapping,
        } => {
            store.set_unknown_user_policy(&path, allow, &mapping)?;
            store.commit()?;
        }
        ExportCommand::Delete { path } => {
            if !store.remove_rule(&path) {
                return Err(format!("{} is not exported", path.display()).into());
            }
            store.commit()?;
        }
    }

    Ok(())
}
