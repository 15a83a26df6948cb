// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

mod export_cmd;
mod import_cmd;

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use export_cmd::ExportCommand;
use import_cmd::ImportCommand;

#[derive(Debug, Parser)]
#[command(about = "Edit NFS imports (fstab) and exports")]
struct Cli {
    /// Filesystem table to edit.
    #[arg(long, default_value = conffile::FSTAB_PATH)]
    fstab: PathBuf,

    /// Export table to edit.
    #[arg(long, default_value = conffile::EXPORTS_PATH)]
    exports: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Remote filesystems mounted by this machine.
    Imports {
        #[clap(subcommand)]
        command: ImportCommand,
    },
    /// Directories this machine exports.
    Exports {
        #[clap(subcommand)]
        command: ExportCommand,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Cli::parse();
    log::debug!("{args:?}");

    let mut out = io::stdout().lock();
    run(args, &mut out)?;
    out.flush()?;
    Ok(())
}

fn run(args: Cli, out: &mut impl Write) -> Result<(), Box<dyn std::error::Error>> {
    match args.command {
        Command::Imports { command } => import_cmd::run(args.fstab, command, out),
        Command::Exports { command } => export_cmd::run(args.exports, command, out),
    }
}
