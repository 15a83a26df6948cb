// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

pub mod commit;
mod error;
mod store;

pub use error::{parse_count, Error, ParseError, ParseErrorKind, ValidationError};
pub use store::Store;

pub type Result<T> = std::result::Result<T, Error>;

/// Well-known location of the filesystem table.
pub const FSTAB_PATH: &str = "/etc/fstab";

/// Well-known location of the NFS export table.
pub const EXPORTS_PATH: &str = "/etc/exports";

/// A line-oriented configuration file format that can be read into a table and written back.
pub trait ConfigFormat: Sized {
    fn parse(src: &str) -> std::result::Result<Self, ParseError>;

    fn serialize(&self) -> String;
}
