// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use conffile::{parse_count, ValidationError};

use crate::ClientId;

/// An NFS export: a directory and the clients allowed to mount it, grouped by access level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRule {
    path: PathBuf,
    read_only_hosts: Vec<ClientId>,
    read_write_hosts: Vec<ClientId>,
    root_access_hosts: Vec<ClientId>,
    allow_unknown_users: bool,
    unknown_user_mapping: UnknownUserMapping,
    /// A `#` comment at the end of the line.
    pub(crate) comment: Option<String>,
}

impl ExportRule {
    /// A rule for `path` with no clients and the default unknown-user policy.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ValidationError> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(ValidationError::new(
                "path",
                format!("'{}' is not an absolute path", path.display()),
            ));
        }
        Ok(Self {
            path,
            read_only_hosts: Vec::new(),
            read_write_hosts: Vec::new(),
            root_access_hosts: Vec::new(),
            allow_unknown_users: false,
            unknown_user_mapping: UnknownUserMapping::default(),
            comment: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn hosts(&self, category: HostCategory) -> &[ClientId] {
        match category {
            HostCategory::ReadOnly => &self.read_only_hosts,
            HostCategory::ReadWrite => &self.read_write_hosts,
            HostCategory::RootAccess => &self.root_access_hosts,
        }
    }

    fn hosts_mut(&mut self, category: HostCategory) -> &mut Vec<ClientId> {
        match category {
            HostCategory::ReadOnly => &mut self.read_only_hosts,
            HostCategory::ReadWrite => &mut self.read_write_hosts,
            HostCategory::RootAccess => &mut self.root_access_hosts,
        }
    }

    /// Grant `client` the access of `category`. Returns false if it already had it.
    pub fn add_host(&mut self, client: ClientId, category: HostCategory) -> bool {
        let hosts = self.hosts_mut(category);
        if hosts.contains(&client) {
            return false;
        }
        hosts.push(client);
        true
    }

    /// Returns false if `client` was not in `category`.
    pub fn remove_host(&mut self, client: &ClientId, category: HostCategory) -> bool {
        let hosts = self.hosts_mut(category);
        let before = hosts.len();
        hosts.retain(|c| c != client);
        hosts.len() != before
    }

    pub fn has_hosts(&self) -> bool {
        HostCategory::ALL
            .into_iter()
            .any(|category| !self.hosts(category).is_empty())
    }

    pub fn allow_unknown_users(&self) -> bool {
        self.allow_unknown_users
    }

    pub fn unknown_user_mapping(&self) -> UnknownUserMapping {
        self.unknown_user_mapping
    }

    pub fn set_unknown_user_policy(&mut self, allow: bool, mapping: UnknownUserMapping) {
        self.allow_unknown_users = allow;
        self.unknown_user_mapping = mapping;
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub(crate) fn has_default_policy(&self) -> bool {
        !self.allow_unknown_users && self.unknown_user_mapping == UnknownUserMapping::default()
    }
}

/// The access a client gets to an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCategory {
    ReadOnly,
    ReadWrite,
    /// Read-write, and the client's root user is not squashed.
    RootAccess,
}

impl HostCategory {
    pub const ALL: [HostCategory; 3] = [Self::ReadOnly, Self::ReadWrite, Self::RootAccess];

    pub fn options(self) -> ExportOptions {
        ExportOptions {
            read_only: self == Self::ReadOnly,
            root_squash: self != Self::RootAccess,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::ReadWrite => "read-write",
            Self::RootAccess => "root-access",
        }
    }
}

impl fmt::Display for HostCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HostCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "ro" | "read-only" => Ok(Self::ReadOnly),
            "rw" | "read-write" => Ok(Self::ReadWrite),
            "root" | "root-access" => Ok(Self::RootAccess),
            _ => Err(ValidationError::new(
                "category",
                format!("'{s}' is not one of read-only, read-write, root-access"),
            )),
        }
    }
}

/// The options applied to a client, as written in its qualifier list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    /// Whether to deny write access to the export.
    pub read_only: bool,
    /// If true, map the root user to the anonymous user.
    pub root_squash: bool,
}

impl ExportOptions {
    /// The category these options put a client in. A read-only client without root squashing has
    /// no category.
    pub fn category(self) -> Option<HostCategory> {
        match (self.read_only, self.root_squash) {
            (true, true) => Some(HostCategory::ReadOnly),
            (false, true) => Some(HostCategory::ReadWrite),
            (false, false) => Some(HostCategory::RootAccess),
            (true, false) => None,
        }
    }
}

impl fmt::Display for ExportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.read_only { "ro" } else { "rw" })?;
        if !self.root_squash {
            f.write_str(",no_root_squash")?;
        }
        Ok(())
    }
}

/// What requests from users the server cannot map are treated as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum UnknownUserMapping {
    /// Map to the anonymous user.
    #[default]
    Nobody,
    /// Map to a specific uid.
    Uid(u32),
    /// Refuse the request.
    Deny,
}

impl fmt::Display for UnknownUserMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nobody => f.write_str("nobody"),
            Self::Uid(uid) => write!(f, "{uid}"),
            Self::Deny => f.write_str("deny"),
        }
    }
}

impl FromStr for UnknownUserMapping {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "nobody" => Ok(Self::Nobody),
            "deny" => Ok(Self::Deny),
            s if s.starts_with(|c: char| c.is_ascii_digit()) => {
                Ok(Self::Uid(parse_count("unknown_user_mapping", s)?))
            }
            _ => Err(ValidationError::new(
                "unknown_user_mapping",
                format!("'{s}' is not one of nobody, deny, or a uid"),
            )),
        }
    }
}
