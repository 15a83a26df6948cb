// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::fmt;

use conffile::{parse_count, ValidationError};

/// The comma-separated options column of an fstab entry: an ordered set of tokens, each either a
/// flag (`hard`) or a `key=value` pair (`rsize=32768`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    tokens: Vec<String>,
}

impl MountOptions {
    /// Split an options column. Empty tokens are dropped and repeated tokens collapse to the
    /// first occurrence.
    pub fn parse(s: &str) -> Self {
        let mut options = Self::default();
        for token in s.split(',') {
            options.insert(token);
        }
        options
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    /// Append `token` unless it is already present. Returns whether it was added.
    pub fn insert(&mut self, token: &str) -> bool {
        let token = token.trim();
        if token.is_empty() || self.contains(token) {
            return false;
        }
        self.tokens.push(token.to_string());
        true
    }

    pub fn remove(&mut self, token: &str) -> bool {
        let before = self.tokens.len();
        self.tokens.retain(|t| t != token);
        self.tokens.len() != before
    }

    /// Value of the first `key=value` token with this key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.tokens.iter().find_map(|t| value_of(t, key))
    }

    /// Set `key=value` in place of the first token with this key (appending if there is none),
    /// dropping any later tokens with the same key. `None` removes the key entirely.
    pub fn set(&mut self, key: &str, value: Option<&str>) {
        let mut slot = None;
        let mut i = 0;
        while i < self.tokens.len() {
            if value_of(&self.tokens[i], key).is_some() {
                if slot.is_none() {
                    slot = Some(i);
                    i += 1;
                } else {
                    self.tokens.remove(i);
                }
            } else {
                i += 1;
            }
        }

        match (slot, value) {
            (Some(i), Some(v)) => self.tokens[i] = format!("{key}={v}"),
            (Some(i), None) => {
                self.tokens.remove(i);
            }
            (None, Some(v)) => self.tokens.push(format!("{key}={v}")),
            (None, None) => {}
        }
    }

    /// The selected member of a group of mutually exclusive flags, if any flag of the group is
    /// present.
    pub fn choice<C: Choice>(&self) -> Option<C> {
        self.tokens.iter().find_map(|t| {
            C::CHOICES
                .iter()
                .find(|(token, _)| *token == t.as_str())
                .map(|(_, value)| *value)
        })
    }

    /// Select `value` within its group, replacing whichever flag of the group was set.
    pub fn set_choice<C: Choice>(&mut self, value: C) {
        let token = value.token();
        let in_group = |t: &String| C::CHOICES.iter().any(|(c, _)| *c == t.as_str());

        match self.tokens.iter().position(in_group) {
            Some(i) => {
                self.tokens[i] = token.to_string();
                let mut seen_first = false;
                self.tokens.retain(|t| {
                    if !in_group(t) {
                        return true;
                    }
                    let keep = !seen_first;
                    seen_first = true;
                    keep
                });
            }
            None => self.tokens.push(token.to_string()),
        }
    }

    /// Numeric value of `key`, 0 when the key is absent.
    pub fn count(&self, field: &'static str, key: &str) -> Result<u32, ValidationError> {
        match self.get(key) {
            Some(v) => parse_count(field, v),
            None => Ok(0),
        }
    }

    /// Store a numeric value under `key`; 0 removes the key.
    pub fn set_count(&mut self, key: &str, value: u32) {
        if value == 0 {
            self.set(key, None);
        } else {
            self.set(key, Some(&value.to_string()));
        }
    }
}

impl fmt::Display for MountOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens.join(","))
    }
}

fn value_of<'a>(token: &'a str, key: &str) -> Option<&'a str> {
    token.strip_prefix(key)?.strip_prefix('=')
}

/// A group of mutually exclusive mount flags.
pub trait Choice: Copy + PartialEq + 'static {
    const CHOICES: &'static [(&'static str, Self)];

    fn token(self) -> &'static str {
        Self::CHOICES
            .iter()
            .find(|(_, value)| *value == self)
            .map(|(token, _)| *token)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountAccess {
    ReadWrite,
    ReadOnly,
}

impl Choice for MountAccess {
    const CHOICES: &'static [(&'static str, Self)] =
        &[("rw", Self::ReadWrite), ("ro", Self::ReadOnly)];
}

/// What the client does when the server stops answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryMethod {
    /// Retry forever.
    Hard,
    /// Give up and report an error after the configured retransmissions.
    Soft,
}

impl Choice for RetryMethod {
    const CHOICES: &'static [(&'static str, Self)] = &[("hard", Self::Hard), ("soft", Self::Soft)];
}

/// Whether a failing mount keeps retrying in the foreground or backgrounds itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountThread {
    Foreground,
    Background,
}

impl Choice for MountThread {
    const CHOICES: &'static [(&'static str, Self)] =
        &[("fg", Self::Foreground), ("bg", Self::Background)];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetuidPolicy {
    Allow,
    Deny,
}

impl Choice for SetuidPolicy {
    const CHOICES: &'static [(&'static str, Self)] =
        &[("suid", Self::Allow), ("nosuid", Self::Deny)];
}

/// Tuning parameters of an NFS mount, kept in the options column.
///
/// Zero means "not set" for the numeric parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpertOptions {
    /// Minutes to keep retrying the mount (`retry=`).
    pub mount_timeout: u32,
    /// Number of mount attempts (`retrycnt=`).
    pub mount_retries: u32,
    /// Tenths of a second before an RPC is retransmitted (`timeo=`).
    pub nfs_timeout: u32,
    /// Retransmissions before a major timeout (`retrans=`).
    pub nfs_retries: u32,
    pub read_buffer_size: u32,
    pub write_buffer_size: u32,
    /// Server port (`port=`).
    pub server_ip_port: Option<String>,
}

pub(crate) const MOUNT_TIMEOUT: &str = "retry";
pub(crate) const MOUNT_RETRIES: &str = "retrycnt";
pub(crate) const NFS_TIMEOUT: &str = "timeo";
pub(crate) const NFS_RETRIES: &str = "retrans";
pub(crate) const READ_BUFFER_SIZE: &str = "rsize";
pub(crate) const WRITE_BUFFER_SIZE: &str = "wsize";
pub(crate) const SERVER_IP_PORT: &str = "port";

impl ExpertOptions {
    pub fn from_options(options: &MountOptions) -> Result<Self, ValidationError> {
        Ok(Self {
            mount_timeout: options.count("mount_timeout", MOUNT_TIMEOUT)?,
            mount_retries: options.count("mount_retries", MOUNT_RETRIES)?,
            nfs_timeout: options.count("nfs_timeout", NFS_TIMEOUT)?,
            nfs_retries: options.count("nfs_retries", NFS_RETRIES)?,
            read_buffer_size: options.count("read_buffer_size", READ_BUFFER_SIZE)?,
            write_buffer_size: options.count("write_buffer_size", WRITE_BUFFER_SIZE)?,
            server_ip_port: options.get(SERVER_IP_PORT).map(str::to_string),
        })
    }

    pub fn apply(&self, options: &mut MountOptions) -> Result<(), ValidationError> {
        let port = match &self.server_ip_port {
            Some(port) => Some(check_port(port)?),
            None => None,
        };

        options.set_count(MOUNT_TIMEOUT, self.mount_timeout);
        options.set_count(MOUNT_RETRIES, self.mount_retries);
        options.set_count(NFS_TIMEOUT, self.nfs_timeout);
        options.set_count(NFS_RETRIES, self.nfs_retries);
        options.set_count(READ_BUFFER_SIZE, self.read_buffer_size);
        options.set_count(WRITE_BUFFER_SIZE, self.write_buffer_size);
        options.set(SERVER_IP_PORT, port.flatten());
        Ok(())
    }
}

/// A port value has to fit inside a single option token. Empty means unset.
pub(crate) fn check_port(port: &str) -> Result<Option<&str>, ValidationError> {
    let port = port.trim();
    if port.is_empty() {
        return Ok(None);
    }
    if port.contains(|c: char| c == ',' || c == '=' || c.is_whitespace()) {
        return Err(ValidationError::new(
            "server_ip_port",
            format!("'{port}' cannot be used as an option value"),
        ));
    }
    Ok(Some(port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_drops_empty_and_repeated() {
        let opts = MountOptions::parse("rw,,hard,rw,intr");
        assert_eq!(opts.iter().collect::<Vec<_>>(), ["rw", "hard", "intr"]);
        assert_eq!(opts.to_string(), "rw,hard,intr");
    }

    #[test]
    fn key_values() {
        let mut opts = MountOptions::parse("rw,rsize=8192,hard,rsize=4096");
        assert_eq!(opts.get("rsize"), Some("8192"));
        assert_eq!(opts.get("r"), None);

        opts.set("rsize", Some("32768"));
        assert_eq!(opts.to_string(), "rw,rsize=32768,hard");

        opts.set("wsize", Some("1024"));
        assert_eq!(opts.to_string(), "rw,rsize=32768,hard,wsize=1024");

        opts.set("rsize", None);
        assert_eq!(opts.to_string(), "rw,hard,wsize=1024");
    }

    #[test]
    fn choices_replace_in_place() {
        let mut opts = MountOptions::parse("ro,soft,intr");
        assert_eq!(opts.choice::<MountAccess>(), Some(MountAccess::ReadOnly));
        assert_eq!(opts.choice::<MountThread>(), None);

        opts.set_choice(MountAccess::ReadWrite);
        opts.set_choice(RetryMethod::Hard);
        opts.set_choice(MountThread::Background);
        assert_eq!(opts.to_string(), "rw,hard,intr,bg");

        // Contradictory flags in the file collapse to the first one.
        let mut opts = MountOptions::parse("hard,intr,soft");
        opts.set_choice(RetryMethod::Soft);
        assert_eq!(opts.to_string(), "soft,intr");
    }

    #[test]
    fn expert_round_trip() {
        let mut opts = MountOptions::parse("rw,timeo=14");
        let mut expert = ExpertOptions::from_options(&opts).unwrap();
        assert_eq!(expert.nfs_timeout, 14);
        assert_eq!(expert.read_buffer_size, 0);

        expert.nfs_timeout = 0;
        expert.read_buffer_size = 32768;
        expert.server_ip_port = Some("2049".into());
        expert.apply(&mut opts).unwrap();
        assert_eq!(opts.to_string(), "rw,rsize=32768,port=2049");
        assert_eq!(ExpertOptions::from_options(&opts).unwrap(), expert);
    }

    #[test]
    fn bad_expert_values() {
        let opts = MountOptions::parse("rw,retrans=lots");
        let err = ExpertOptions::from_options(&opts).unwrap_err();
        assert_eq!(err.field, "nfs_retries");

        let expert = ExpertOptions {
            server_ip_port: Some("20,49".into()),
            ..Default::default()
        };
        let mut opts = MountOptions::parse("rw");
        assert_eq!(expert.apply(&mut opts).unwrap_err().field, "server_ip_port");
        assert_eq!(opts.to_string(), "rw");
    }
}
