// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! The NFS export table (`/etc/exports`).
//!
//! Each rule is one line:
//!
//! ```text
//! /export/home -allow_unknown,anonuid=1000 client.example.com(ro) 192.168.1.0/24(rw) admin(rw,no_root_squash)
//! ```
//!
//! The optional `-` token after the path holds the rule's unknown-user policy. Every client lands
//! in exactly one of the read-only, read-write, or root-access groups according to its
//! qualifiers.

mod client;
mod rule;

use std::{
    fmt::Write,
    path::{Path, PathBuf},
};

use log::*;

use conffile::{ConfigFormat, Error, ParseError, ParseErrorKind, Result, Store, ValidationError};

pub use client::ClientId;
pub use rule::{ExportOptions, ExportRule, HostCategory, UnknownUserMapping};

/// An edit session over an export table file.
pub type ExportStore = Store<Exports>;

/// Open the table at `path`, or at `/etc/exports` when no path is given.
pub fn open(path: Option<PathBuf>) -> Result<ExportStore> {
    Store::open(path.unwrap_or_else(|| PathBuf::from(conffile::EXPORTS_PATH)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// Comment or blank line, written back exactly as read.
    Verbatim(String),
    Rule(ExportRule),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exports {
    lines: Vec<Line>,
}

impl Exports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> impl Iterator<Item = &ExportRule> {
        self.lines.iter().filter_map(|line| match line {
            Line::Rule(r) => Some(r),
            Line::Verbatim(_) => None,
        })
    }

    fn rules_mut(&mut self) -> impl Iterator<Item = &mut ExportRule> {
        self.lines.iter_mut().filter_map(|line| match line {
            Line::Rule(r) => Some(r),
            Line::Verbatim(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.rules().count()
    }

    pub fn is_empty(&self) -> bool {
        self.rules().next().is_none()
    }

    pub fn get(&self, index: usize) -> Option<&ExportRule> {
        self.rules().nth(index)
    }

    pub fn rule(&self, index: usize) -> Result<&ExportRule> {
        self.get(index).ok_or(Error::Index {
            requested: index,
            size: self.len(),
        })
    }

    pub fn find(&self, path: impl AsRef<Path>) -> Option<&ExportRule> {
        let path = path.as_ref();
        self.rules().find(|r| r.path() == path)
    }

    pub fn find_mut(&mut self, path: impl AsRef<Path>) -> Option<&mut ExportRule> {
        let path = path.as_ref();
        self.rules_mut().find(|r| r.path() == path)
    }

    pub fn position(&self, path: impl AsRef<Path>) -> Option<usize> {
        let path = path.as_ref();
        self.rules().position(|r| r.path() == path)
    }

    /// Append a rule and return its index. Fails if its path is already exported.
    pub fn add_rule(&mut self, rule: ExportRule) -> Result<usize> {
        if self.find(rule.path()).is_some() {
            return Err(ValidationError::new(
                "path",
                format!("{} is already exported", rule.path().display()),
            )
            .into());
        }
        debug!("adding export {}", rule.path().display());
        self.lines.push(Line::Rule(rule));
        Ok(self.len() - 1)
    }

    /// Delete the rule for `path`. Returns false if there is none.
    pub fn remove_rule(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let before = self.lines.len();
        self.lines
            .retain(|line| !matches!(line, Line::Rule(r) if r.path() == path));
        let removed = self.lines.len() != before;
        if removed {
            debug!("removed export {}", path.display());
        }
        removed
    }

    pub fn remove_rule_at(&mut self, index: usize) -> Result<ExportRule> {
        let size = self.len();
        let pos = self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| matches!(line, Line::Rule(_)))
            .nth(index)
            .map(|(pos, _)| pos)
            .ok_or(Error::Index {
                requested: index,
                size,
            })?;
        match self.lines.remove(pos) {
            Line::Rule(r) => Ok(r),
            Line::Verbatim(_) => unreachable!("only rule lines are selected"),
        }
    }

    /// Grant `client` access to `path`, exporting the path first if needed. Returns false if the
    /// client already had that access.
    pub fn add_host(
        &mut self,
        path: impl AsRef<Path>,
        client: ClientId,
        category: HostCategory,
    ) -> Result<bool> {
        let path = path.as_ref();
        if self.find(path).is_none() {
            self.add_rule(ExportRule::new(path)?)?;
        }
        let added = match self.find_mut(path) {
            Some(rule) => rule.add_host(client, category),
            None => unreachable!("rule was just added"),
        };
        Ok(added)
    }

    /// Revoke one grant. When that leaves the rule with no clients at all the rule is deleted.
    /// Returns false if there was nothing to remove.
    pub fn remove_host(
        &mut self,
        path: impl AsRef<Path>,
        client: &ClientId,
        category: HostCategory,
    ) -> bool {
        let path = path.as_ref();
        let Some(rule) = self.find_mut(path) else {
            return false;
        };
        if !rule.remove_host(client, category) {
            return false;
        }
        if !rule.has_hosts() {
            debug!("last client of {} removed", path.display());
            self.remove_rule(path);
        }
        true
    }

    /// Set the unknown-user policy of the rule for `path`, with the mapping given as text
    /// (`nobody`, `deny`, or a uid).
    pub fn set_unknown_user_policy(
        &mut self,
        path: impl AsRef<Path>,
        allow: bool,
        mapping: &str,
    ) -> Result<()> {
        let path = path.as_ref();
        let mapping: UnknownUserMapping = mapping.parse()?;
        let Some(rule) = self.find_mut(path) else {
            return Err(ValidationError::new(
                "path",
                format!("{} is not exported", path.display()),
            )
            .into());
        };
        rule.set_unknown_user_policy(allow, mapping);
        Ok(())
    }

    pub fn field_at(&self, index: usize, field: ExportField) -> Result<String> {
        let rule = self.rule(index)?;
        let hosts = |category| {
            rule.hosts(category)
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        };
        Ok(match field {
            ExportField::Path => rule.path().display().to_string(),
            ExportField::ReadOnlyHosts => hosts(HostCategory::ReadOnly),
            ExportField::ReadWriteHosts => hosts(HostCategory::ReadWrite),
            ExportField::RootAccessHosts => hosts(HostCategory::RootAccess),
            ExportField::AllowUnknownUsers => rule.allow_unknown_users().to_string(),
            ExportField::UnknownUserMapping => rule.unknown_user_mapping().to_string(),
        })
    }
}

/// The columns a presentation layer can show for a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportField {
    Path,
    ReadOnlyHosts,
    ReadWriteHosts,
    RootAccessHosts,
    AllowUnknownUsers,
    UnknownUserMapping,
}

impl ExportField {
    pub const ALL: [ExportField; 6] = [
        Self::Path,
        Self::ReadOnlyHosts,
        Self::ReadWriteHosts,
        Self::RootAccessHosts,
        Self::AllowUnknownUsers,
        Self::UnknownUserMapping,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Path => "path",
            Self::ReadOnlyHosts => "read_only_hosts",
            Self::ReadWriteHosts => "read_write_hosts",
            Self::RootAccessHosts => "root_access_hosts",
            Self::AllowUnknownUsers => "allow_unknown_users",
            Self::UnknownUserMapping => "unknown_user_mapping",
        }
    }
}

impl std::str::FromStr for ExportField {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|f| f.name() == wanted)
            .ok_or_else(|| ValidationError::new("field", format!("no field named '{s}'")))
    }
}

impl ConfigFormat for Exports {
    fn parse(src: &str) -> std::result::Result<Self, ParseError> {
        let mut table = Exports::default();

        for (i, line) in src.lines().enumerate() {
            let lineno = i + 1;
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                table.lines.push(Line::Verbatim(line.to_string()));
                continue;
            }

            let rule = parse_rule(trimmed, lineno)?;
            if table.find(rule.path()).is_some() {
                return Err(ParseError::new(ParseErrorKind::DuplicatePath, lineno));
            }
            table.lines.push(Line::Rule(rule));
        }

        debug!("parsed {} export rules", table.len());
        Ok(table)
    }

    fn serialize(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Verbatim(text) => out.push_str(text),
                Line::Rule(rule) => write_rule(&mut out, rule),
            }
            out.push('\n');
        }
        out
    }
}

fn parse_rule(line: &str, lineno: usize) -> std::result::Result<ExportRule, ParseError> {
    let malformed = || ParseError::new(ParseErrorKind::MalformedLine, lineno);

    let (path, rest) = match line.strip_prefix('"') {
        Some(quoted) => {
            let (path, rest) = quoted.split_once('"').ok_or_else(malformed)?;
            // The closing quote has to end the path token.
            if !(rest.is_empty() || rest.starts_with(char::is_whitespace)) {
                return Err(malformed());
            }
            (path, rest)
        }
        None => line
            .split_once(char::is_whitespace)
            .unwrap_or((line, "")),
    };

    let mut rule = ExportRule::new(path).map_err(|_| malformed())?;

    let mut tokens = rest.split_whitespace().peekable();
    if let Some(opts) = tokens.next_if(|t| t.starts_with('-')) {
        parse_rule_options(&opts[1..], &mut rule, lineno)?;
    }

    while let Some(token) = tokens.next() {
        if token.starts_with('#') {
            let rest: Vec<&str> = std::iter::once(token).chain(tokens).collect();
            rule.comment = Some(rest.join(" "));
            break;
        }
        let (client, category) = parse_client(token, lineno)?;
        rule.add_host(client, category);
    }

    Ok(rule)
}

/// `allow_unknown`, `anon=nobody`, `anon=deny`, `anonuid=<uid>`
fn parse_rule_options(
    opts: &str,
    rule: &mut ExportRule,
    lineno: usize,
) -> std::result::Result<(), ParseError> {
    let unknown = |opt: &str| {
        ParseError::new(ParseErrorKind::UnknownQualifier(opt.to_string()), lineno)
    };

    let mut allow = false;
    let mut mapping = UnknownUserMapping::default();
    for opt in opts.split(',').filter(|o| !o.is_empty()) {
        match opt {
            "allow_unknown" => allow = true,
            "anon=nobody" => mapping = UnknownUserMapping::Nobody,
            "anon=deny" => mapping = UnknownUserMapping::Deny,
            _ => match opt.strip_prefix("anonuid=") {
                Some(uid) => {
                    let uid = uid.parse().map_err(|_| unknown(opt))?;
                    mapping = UnknownUserMapping::Uid(uid);
                }
                None => return Err(unknown(opt)),
            },
        }
    }

    rule.set_unknown_user_policy(allow, mapping);
    Ok(())
}

fn parse_client(
    token: &str,
    lineno: usize,
) -> std::result::Result<(ClientId, HostCategory), ParseError> {
    let malformed = || ParseError::new(ParseErrorKind::MalformedLine, lineno);

    let (name, qualifiers) = match token.split_once('(') {
        Some((name, rest)) => {
            let qualifiers = rest.strip_suffix(')').ok_or_else(malformed)?;
            if name.is_empty() || qualifiers.contains(['(', ')']) {
                return Err(malformed());
            }
            (name, qualifiers)
        }
        None if token.contains(')') => return Err(malformed()),
        None => (token, ""),
    };

    let client = name.parse().map_err(|_| malformed())?;
    let category = classify(qualifiers).map_err(|q| {
        ParseError::new(ParseErrorKind::UnknownQualifier(q), lineno)
    })?;
    Ok((client, category))
}

/// Decide which group a client's qualifiers put it in. The error is the offending qualifier, or
/// the whole list when the qualifiers contradict each other.
fn classify(qualifiers: &str) -> std::result::Result<HostCategory, String> {
    let mut ro = false;
    let mut rw = false;
    let mut squash = false;
    let mut no_squash = false;

    for q in qualifiers.split(',').filter(|q| !q.is_empty()) {
        match q {
            "ro" => ro = true,
            "rw" => rw = true,
            "root_squash" => squash = true,
            "no_root_squash" => no_squash = true,
            other => return Err(other.to_string()),
        }
    }

    if (ro && rw) || (squash && no_squash) {
        return Err(qualifiers.to_string());
    }

    // No access qualifier at all means read-only.
    ExportOptions {
        read_only: ro || (!rw && !no_squash),
        root_squash: !no_squash,
    }
    .category()
    .ok_or_else(|| qualifiers.to_string())
}

fn write_rule(out: &mut String, rule: &ExportRule) {
    let path = rule.path().to_string_lossy();
    if path.contains(char::is_whitespace) {
        let _ = write!(out, "\"{path}\"");
    } else {
        out.push_str(&path);
    }

    if !rule.has_default_policy() {
        let mut opts = Vec::new();
        if rule.allow_unknown_users() {
            opts.push("allow_unknown".to_string());
        }
        match rule.unknown_user_mapping() {
            UnknownUserMapping::Nobody => {}
            UnknownUserMapping::Uid(uid) => opts.push(format!("anonuid={uid}")),
            UnknownUserMapping::Deny => opts.push("anon=deny".to_string()),
        }
        let _ = write!(out, " -{}", opts.join(","));
    }

    for category in HostCategory::ALL {
        let options = category.options();
        for client in rule.hosts(category) {
            let _ = write!(out, " {client}({options})");
        }
    }

    if let Some(comment) = rule.comment() {
        let _ = write!(out, " {comment}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(s: &str) -> ClientId {
        s.parse().unwrap()
    }

    fn parse_err(src: &str) -> ParseError {
        Exports::parse(src).unwrap_err()
    }

    #[test]
    fn classify_hosts() {
        let table = Exports::parse(
            "/srv a(ro) b(rw) c(rw,no_root_squash) d(no_root_squash) e f(rw,root_squash) g()\n",
        )
        .unwrap();
        let rule = table.get(0).unwrap();
        assert_eq!(rule.hosts(HostCategory::ReadOnly), [host("a"), host("e"), host("g")]);
        assert_eq!(rule.hosts(HostCategory::ReadWrite), [host("b"), host("f")]);
        assert_eq!(rule.hosts(HostCategory::RootAccess), [host("c"), host("d")]);
    }

    #[test]
    fn conflicting_qualifiers() {
        let err = parse_err("# exports\n/srv a(ro,rw)\n");
        assert_eq!(err.line, 2);
        assert_eq!(err.kind, ParseErrorKind::UnknownQualifier("ro,rw".into()));

        let err = parse_err("/srv a(ro,no_root_squash)");
        assert_eq!(
            err.kind,
            ParseErrorKind::UnknownQualifier("ro,no_root_squash".into())
        );

        let err = parse_err("/srv a(root_squash,no_root_squash)");
        assert!(matches!(err.kind, ParseErrorKind::UnknownQualifier(_)));

        let err = parse_err("/srv a(rw,sync)");
        assert_eq!(err.kind, ParseErrorKind::UnknownQualifier("sync".into()));
    }

    #[test]
    fn malformed_lines() {
        for src in [
            "srv/relative host(rw)",
            "/srv host(rw",
            "/srv host)rw(",
            "/srv (rw)",
            "/srv a(rw)(ro)",
            "\"/no/closing quote host(rw)",
            "/srv @(rw)",
            "/srv a(rw) -x",
            "/srv a(rw) -x(ro)",
        ] {
            assert_eq!(parse_err(src).kind, ParseErrorKind::MalformedLine, "{src}");
        }
    }

    #[test]
    fn duplicate_path() {
        let err = parse_err("/srv a(rw)\n/data b(rw)\n/srv c(ro)\n");
        assert_eq!(err, ParseError::new(ParseErrorKind::DuplicatePath, 3));
    }

    #[test]
    fn rule_options() {
        let table = Exports::parse("/pub -allow_unknown,anonuid=1000 *(ro)\n/priv -anon=deny lab(rw)\n")
            .unwrap();
        let public = table.find("/pub").unwrap();
        assert!(public.allow_unknown_users());
        assert_eq!(public.unknown_user_mapping(), UnknownUserMapping::Uid(1000));

        let private = table.find("/priv").unwrap();
        assert!(!private.allow_unknown_users());
        assert_eq!(private.unknown_user_mapping(), UnknownUserMapping::Deny);

        assert_eq!(
            table.serialize(),
            "/pub -allow_unknown,anonuid=1000 *(ro)\n/priv -anon=deny lab(rw)\n"
        );

        let err = parse_err("/srv -all_squash a(rw)");
        assert_eq!(err.kind, ParseErrorKind::UnknownQualifier("all_squash".into()));
        let err = parse_err("/srv -anonuid=me a(rw)");
        assert_eq!(err.kind, ParseErrorKind::UnknownQualifier("anonuid=me".into()));
    }

    #[test]
    fn quoted_paths_and_comments() {
        let src = "\"/srv/shared files\" lab(rw) # weekly backup\n";
        let table = Exports::parse(src).unwrap();
        let rule = table.get(0).unwrap();
        assert_eq!(rule.path(), Path::new("/srv/shared files"));
        assert_eq!(rule.comment(), Some("# weekly backup"));
        assert_eq!(table.serialize(), src);
    }

    #[test]
    fn serialize_groups_by_category() {
        let table = Exports::parse("/srv c(rw) a b(rw,no_root_squash) d(ro)\n").unwrap();
        assert_eq!(
            table.serialize(),
            "/srv a(ro) d(ro) c(rw) b(rw,no_root_squash)\n"
        );
    }

    #[test]
    fn add_host_to_new_path() {
        let mut table = Exports::new();
        assert!(table
            .add_host("/export/home", host("192.168.1.0/24"), HostCategory::ReadWrite)
            .unwrap());
        assert!(!table
            .add_host("/export/home", host("192.168.1.0/24"), HostCategory::ReadWrite)
            .unwrap());

        let text = table.serialize();
        assert_eq!(text, "/export/home 192.168.1.0/24(rw)\n");
        let rule = table.find("/export/home").unwrap();
        assert!(rule.hosts(HostCategory::ReadOnly).is_empty());
        assert!(rule.hosts(HostCategory::RootAccess).is_empty());

        assert!(matches!(
            table.add_host("relative", host("a"), HostCategory::ReadOnly),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn hosts_that_would_not_read_back_are_refused() {
        assert!("#lab".parse::<ClientId>().is_err());
        assert!("-x".parse::<ClientId>().is_err());

        let mut table = Exports::new();
        table
            .add_host("/srv", host("lab"), HostCategory::ReadWrite)
            .unwrap();
        table
            .add_host("/srv", host("b"), HostCategory::RootAccess)
            .unwrap();
        let text = table.serialize();
        assert_eq!(text, "/srv lab(rw) b(rw,no_root_squash)\n");

        let reparsed = Exports::parse(&text).unwrap();
        assert_eq!(reparsed, table);
        assert_eq!(reparsed.serialize(), text);
    }

    #[test]
    fn removing_last_host_removes_rule() {
        let mut table = Exports::parse("/a x(ro) y(rw)\n/b z(ro)\n").unwrap();

        assert!(!table.remove_host("/a", &host("x"), HostCategory::ReadWrite));
        assert!(table.remove_host("/a", &host("x"), HostCategory::ReadOnly));
        assert!(table.find("/a").is_some());
        assert!(table.remove_host("/a", &host("y"), HostCategory::ReadWrite));
        assert!(table.find("/a").is_none());
        assert!(!table.remove_host("/a", &host("y"), HostCategory::ReadWrite));

        assert_eq!(table.serialize(), "/b z(ro)\n");
    }

    #[test]
    fn explicit_deletion() {
        let mut table = Exports::parse("# top\n/a x(ro)\n/b y(ro)\n").unwrap();
        assert!(!table.remove_rule("/c"));
        assert!(table.remove_rule("/a"));
        assert_eq!(table.remove_rule_at(0).unwrap().path(), Path::new("/b"));
        assert!(matches!(
            table.remove_rule_at(0),
            Err(Error::Index {
                requested: 0,
                size: 0
            })
        ));
        assert_eq!(table.serialize(), "# top\n");
    }

    #[test]
    fn unknown_user_policy() {
        let mut table = Exports::parse("/srv lab(rw)\n").unwrap();
        table.set_unknown_user_policy("/srv", true, "nobody").unwrap();
        assert_eq!(table.serialize(), "/srv -allow_unknown lab(rw)\n");

        let before = table.clone();
        let err = table.set_unknown_user_policy("/srv", false, "guest").unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError { field: "unknown_user_mapping", .. })));
        assert!(table.set_unknown_user_policy("/other", true, "deny").is_err());
        assert_eq!(table, before);

        table.set_unknown_user_policy("/srv", false, "nobody").unwrap();
        assert_eq!(table.serialize(), "/srv lab(rw)\n");
    }

    #[test]
    fn fields_for_display() {
        let table = Exports::parse("/srv a(ro) b(ro) c(rw,no_root_squash)\n").unwrap();
        assert_eq!(table.field_at(0, ExportField::ReadOnlyHosts).unwrap(), "a b");
        assert_eq!(table.field_at(0, ExportField::ReadWriteHosts).unwrap(), "");
        assert_eq!(
            table.field_at(0, "root-access-hosts".parse().unwrap()).unwrap(),
            "c"
        );
        assert_eq!(table.field_at(0, ExportField::UnknownUserMapping).unwrap(), "nobody");
        assert!(matches!(
            table.field_at(1, ExportField::Path),
            Err(Error::Index { .. })
        ));
    }
}
