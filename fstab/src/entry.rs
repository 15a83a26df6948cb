// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::fmt;
use std::str::FromStr;

use conffile::{parse_count, ValidationError};

use crate::escape::escape;
use crate::options::{self, check_port, ExpertOptions, MountAccess, MountOptions};

/// One line of the filesystem table describing a mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    spec: String,
    mount_point: String,
    vfs_type: String,
    options: MountOptions,
    dump_frequency: u32,
    pass_number: u32,
    /// Fields after the pass number, carried through untouched.
    trailing: Vec<String>,
}

impl ImportEntry {
    /// Build an entry from the string form of each column, validating all of them.
    pub fn build(
        spec: &str,
        mount_point: &str,
        vfs_type: &str,
        options: &str,
        dump_frequency: &str,
        pass_number: &str,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            spec: non_empty("spec", spec)?,
            mount_point: non_empty("mount_point", mount_point)?,
            vfs_type: non_empty("vfs_type", vfs_type)?,
            options: non_empty_options(options)?,
            dump_frequency: parse_count("dump_frequency", dump_frequency)?,
            pass_number: parse_count("pass_number", pass_number)?,
            trailing: Vec::new(),
        })
    }

    /// A read-write NFS import of `server:directory` with no dump and no fsck pass.
    pub fn nfs(server: &str, directory: &str, mount_point: &str) -> Result<Self, ValidationError> {
        let server = non_empty("server", server)?;
        let directory = non_empty("remote_path", directory)?;
        Self::build(
            &format!("{server}:{directory}"),
            mount_point,
            "nfs",
            "rw",
            "0",
            "0",
        )
    }

    /// Assemble an entry from already-split file fields.
    pub(crate) fn from_fields(
        spec: String,
        mount_point: String,
        vfs_type: String,
        options: MountOptions,
        dump_frequency: u32,
        pass_number: u32,
        trailing: Vec<String>,
    ) -> Self {
        Self {
            spec,
            mount_point,
            vfs_type,
            options,
            dump_frequency,
            pass_number,
            trailing,
        }
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Host part of an `host:/path` spec.
    pub fn server(&self) -> Option<&str> {
        self.spec.split_once(':').map(|(server, _)| server)
    }

    /// Path part of an `host:/path` spec.
    pub fn remote_path(&self) -> Option<&str> {
        self.spec.split_once(':').map(|(_, path)| path)
    }

    pub fn mount_point(&self) -> &str {
        &self.mount_point
    }

    pub fn vfs_type(&self) -> &str {
        &self.vfs_type
    }

    pub fn is_nfs(&self) -> bool {
        matches!(self.vfs_type.as_str(), "nfs" | "nfs4")
    }

    pub fn options(&self) -> &MountOptions {
        &self.options
    }

    pub fn dump_frequency(&self) -> u32 {
        self.dump_frequency
    }

    pub fn pass_number(&self) -> u32 {
        self.pass_number
    }

    pub fn trailing(&self) -> &[String] {
        &self.trailing
    }

    pub fn set_spec(&mut self, spec: &str) -> Result<(), ValidationError> {
        self.spec = non_empty("spec", spec)?;
        Ok(())
    }

    pub fn set_mount_point(&mut self, mount_point: &str) -> Result<(), ValidationError> {
        self.mount_point = non_empty("mount_point", mount_point)?;
        Ok(())
    }

    pub fn set_vfs_type(&mut self, vfs_type: &str) -> Result<(), ValidationError> {
        self.vfs_type = non_empty("vfs_type", vfs_type)?;
        Ok(())
    }

    pub fn set_options(&mut self, options: &str) -> Result<(), ValidationError> {
        self.options = non_empty_options(options)?;
        Ok(())
    }

    pub fn set_dump_frequency(&mut self, freq: u32) {
        self.dump_frequency = freq;
    }

    pub fn set_pass_number(&mut self, passno: u32) {
        self.pass_number = passno;
    }

    pub fn access(&self) -> MountAccess {
        // Mounts are read-write unless told otherwise.
        self.options.choice().unwrap_or(MountAccess::ReadWrite)
    }

    /// Select one flag of a mutually exclusive group (access, retry method, mount thread, setuid).
    pub fn set_choice<C: options::Choice>(&mut self, value: C) {
        self.options.set_choice(value);
    }

    pub fn choice<C: options::Choice>(&self) -> Option<C> {
        self.options.choice()
    }

    pub fn expert_options(&self) -> Result<ExpertOptions, ValidationError> {
        ExpertOptions::from_options(&self.options)
    }

    pub fn set_expert_options(&mut self, expert: &ExpertOptions) -> Result<(), ValidationError> {
        let mut options = self.options.clone();
        expert.apply(&mut options)?;
        self.options = options;
        Ok(())
    }

    /// String form of one field, as a table cell would show it.
    pub fn get(&self, field: ImportField) -> Result<String, ValidationError> {
        let name = field.name();
        Ok(match field {
            ImportField::Spec => self.spec.clone(),
            ImportField::MountPoint => self.mount_point.clone(),
            ImportField::VfsType => self.vfs_type.clone(),
            ImportField::MountOptions => self.options.to_string(),
            ImportField::DumpFrequency => self.dump_frequency.to_string(),
            ImportField::PassNumber => self.pass_number.to_string(),
            ImportField::ServerIpPort => self
                .options
                .get(options::SERVER_IP_PORT)
                .unwrap_or_default()
                .to_string(),
            _ => self.options.count(name, field.option_key())?.to_string(),
        })
    }

    /// Set one field from its string form. On error the entry is unchanged.
    pub fn set(&mut self, field: ImportField, value: &str) -> Result<(), ValidationError> {
        match field {
            ImportField::Spec => self.set_spec(value),
            ImportField::MountPoint => self.set_mount_point(value),
            ImportField::VfsType => self.set_vfs_type(value),
            ImportField::MountOptions => self.set_options(value),
            ImportField::DumpFrequency => {
                self.dump_frequency = parse_count(field.name(), value)?;
                Ok(())
            }
            ImportField::PassNumber => {
                self.pass_number = parse_count(field.name(), value)?;
                Ok(())
            }
            ImportField::ServerIpPort => {
                let port = check_port(value)?;
                self.options.set(options::SERVER_IP_PORT, port);
                Ok(())
            }
            _ => {
                let count = parse_count(field.name(), value)?;
                self.options.set_count(field.option_key(), count);
                Ok(())
            }
        }
    }
}

/// The file form of the entry: one tab-separated line without the newline.
impl fmt::Display for ImportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let options: Vec<_> = self.options.iter().map(escape).collect();
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}",
            escape(&self.spec),
            escape(&self.mount_point),
            escape(&self.vfs_type),
            options.join(","),
            self.dump_frequency,
            self.pass_number,
        )?;
        for field in &self.trailing {
            write!(f, "\t{field}")?;
        }
        Ok(())
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    Ok(value.to_string())
}

fn non_empty_options(options: &str) -> Result<MountOptions, ValidationError> {
    let options = MountOptions::parse(options);
    if options.is_empty() {
        return Err(ValidationError::new(
            "mount_options",
            "at least one option is required (use 'defaults')",
        ));
    }
    Ok(options)
}

/// Every field of an [`ImportEntry`] that can be shown or edited on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportField {
    Spec,
    MountPoint,
    VfsType,
    MountOptions,
    DumpFrequency,
    PassNumber,
    MountTimeout,
    MountRetries,
    NfsTimeout,
    NfsRetries,
    ReadBufferSize,
    WriteBufferSize,
    ServerIpPort,
}

impl ImportField {
    pub const ALL: [ImportField; 13] = [
        Self::Spec,
        Self::MountPoint,
        Self::VfsType,
        Self::MountOptions,
        Self::DumpFrequency,
        Self::PassNumber,
        Self::MountTimeout,
        Self::MountRetries,
        Self::NfsTimeout,
        Self::NfsRetries,
        Self::ReadBufferSize,
        Self::WriteBufferSize,
        Self::ServerIpPort,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Spec => "spec",
            Self::MountPoint => "mount_point",
            Self::VfsType => "vfs_type",
            Self::MountOptions => "mount_options",
            Self::DumpFrequency => "dump_frequency",
            Self::PassNumber => "pass_number",
            Self::MountTimeout => "mount_timeout",
            Self::MountRetries => "mount_retries",
            Self::NfsTimeout => "nfs_timeout",
            Self::NfsRetries => "nfs_retries",
            Self::ReadBufferSize => "read_buffer_size",
            Self::WriteBufferSize => "write_buffer_size",
            Self::ServerIpPort => "server_ip_port",
        }
    }

    /// Option key backing an expert parameter.
    fn option_key(self) -> &'static str {
        match self {
            Self::MountTimeout => options::MOUNT_TIMEOUT,
            Self::MountRetries => options::MOUNT_RETRIES,
            Self::NfsTimeout => options::NFS_TIMEOUT,
            Self::NfsRetries => options::NFS_RETRIES,
            Self::ReadBufferSize => options::READ_BUFFER_SIZE,
            Self::WriteBufferSize => options::WRITE_BUFFER_SIZE,
            Self::ServerIpPort => options::SERVER_IP_PORT,
            _ => unreachable!("{} is a column, not an option", self.name()),
        }
    }
}

impl fmt::Display for ImportField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImportField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| ValidationError::new("field", format!("no field named '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{MountThread, RetryMethod, SetuidPolicy};

    #[test]
    fn build_validates_each_column() {
        let e = ImportEntry::build("", "/mnt", "nfs", "rw", "0", "0").unwrap_err();
        assert_eq!(e.field, "spec");

        let e = ImportEntry::build("host:/export", "/mnt", "nfs", "rw", "-1", "0").unwrap_err();
        assert_eq!(e.field, "dump_frequency");

        let e = ImportEntry::build("host:/export", " ", "nfs", "rw", "0", "0").unwrap_err();
        assert_eq!(e.field, "mount_point");

        let e = ImportEntry::build("host:/export", "/mnt", "nfs", "rw", "0", "x").unwrap_err();
        assert_eq!(e.field, "pass_number");

        let e = ImportEntry::build("host:/export", "/mnt", "nfs", ",", "0", "0").unwrap_err();
        assert_eq!(e.field, "mount_options");

        let ok = ImportEntry::build("host:/export", "/mnt", "nfs", "rw,hard", "1", "2").unwrap();
        assert_eq!(ok.dump_frequency(), 1);
        assert_eq!(ok.pass_number(), 2);
    }

    #[test]
    fn nfs_defaults() {
        let e = ImportEntry::nfs("fileserver", "/srv/home", "/home").unwrap();
        assert_eq!(e.spec(), "fileserver:/srv/home");
        assert_eq!(e.server(), Some("fileserver"));
        assert_eq!(e.remote_path(), Some("/srv/home"));
        assert_eq!(e.vfs_type(), "nfs");
        assert_eq!(e.access(), MountAccess::ReadWrite);
        assert_eq!(e.to_string(), "fileserver:/srv/home\t/home\tnfs\trw\t0\t0");

        assert_eq!(ImportEntry::nfs("", "/srv", "/mnt").unwrap_err().field, "server");
    }

    #[test]
    fn fields_by_name() {
        let mut e = ImportEntry::nfs("srv", "/data", "/mnt/data").unwrap();
        e.set("nfs_timeout".parse().unwrap(), "600").unwrap();
        e.set(ImportField::ServerIpPort, "2049").unwrap();
        assert_eq!(e.get(ImportField::NfsTimeout).unwrap(), "600");
        assert_eq!(e.get(ImportField::MountRetries).unwrap(), "0");
        assert_eq!(e.get(ImportField::ServerIpPort).unwrap(), "2049");
        assert_eq!(e.options().to_string(), "rw,timeo=600,port=2049");

        let before = e.clone();
        assert_eq!(e.set(ImportField::Spec, "").unwrap_err().field, "spec");
        assert_eq!(
            e.set(ImportField::ReadBufferSize, "big").unwrap_err().field,
            "read_buffer_size"
        );
        assert_eq!(e, before);

        assert!("mount-point".parse::<ImportField>().is_ok());
        assert!("colour".parse::<ImportField>().is_err());
    }

    #[test]
    fn mount_choices() {
        let mut e = ImportEntry::build("srv:/x", "/x", "nfs", "ro,soft", "0", "0").unwrap();
        assert_eq!(e.access(), MountAccess::ReadOnly);
        e.set_choice(RetryMethod::Hard);
        e.set_choice(MountThread::Background);
        assert_eq!(e.choice::<RetryMethod>(), Some(RetryMethod::Hard));
        assert_eq!(e.options().to_string(), "ro,hard,bg");

        assert_eq!(e.choice::<SetuidPolicy>(), None);
        e.set_choice(SetuidPolicy::Deny);
        e.set_choice(SetuidPolicy::Allow);
        assert_eq!(e.choice::<SetuidPolicy>(), Some(SetuidPolicy::Allow));
        assert_eq!(e.options().to_string(), "ro,hard,bg,suid");
    }

    #[test]
    fn display_escapes() {
        let e = ImportEntry::build("LABEL=My Disk", "/mnt/my disk", "ext4", "defaults", "0", "2")
            .unwrap();
        assert_eq!(
            e.to_string(),
            "LABEL=My\\040Disk\t/mnt/my\\040disk\text4\tdefaults\t0\t2"
        );
    }
}
