// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::{fmt, net::IpAddr, str::FromStr};

use cidr::IpCidr;
use conffile::ValidationError;

/// Who an export is granted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientId {
    /// `*`: every host.
    Anyone,
    /// A host name or a wildcard pattern such as `*.example.com`.
    Name(String),
    Addr(IpAddr),
    /// `@group`, stored without the `@`.
    Netgroup(String),
    Network(IpCidr),
}

impl FromStr for ClientId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::new("host", "must not be empty"));
        }
        if s.contains(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | ',' | '"')) {
            return Err(ValidationError::new(
                "host",
                format!("'{s}' is not a host, network, or netgroup"),
            ));
        }
        // A leading `-` reads as the rule-options token and `#` starts a comment.
        if s.starts_with(['-', '#']) {
            return Err(ValidationError::new(
                "host",
                format!("'{s}' cannot start with '{}'", &s[..1]),
            ));
        }

        if s == "*" {
            return Ok(Self::Anyone);
        }
        if let Some(group) = s.strip_prefix('@') {
            if group.is_empty() {
                return Err(ValidationError::new("host", "netgroup name is missing"));
            }
            return Ok(Self::Netgroup(group.to_string()));
        }
        if s.contains('/') {
            // Networks with host bits set or dotted masks are kept as written.
            return Ok(match s.parse::<IpCidr>() {
                Ok(net) => Self::Network(net),
                Err(_) => Self::Name(s.to_string()),
            });
        }
        if let Ok(addr) = s.parse::<IpAddr>() {
            return Ok(Self::Addr(addr));
        }

        Ok(Self::Name(s.to_string()))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anyone => f.write_str("*"),
            Self::Name(name) => f.write_str(name),
            Self::Addr(addr) => write!(f, "{addr}"),
            Self::Netgroup(group) => write!(f, "@{group}"),
            Self::Network(net) => write!(f, "{}/{}", net.first_address(), net.network_length()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(s: &str) -> ClientId {
        let client: ClientId = s.parse().unwrap();
        assert_eq!(client.to_string(), s);
        client
    }

    #[test]
    fn kinds() {
        assert_eq!(round_trip("*"), ClientId::Anyone);
        assert!(matches!(round_trip("192.168.1.0/24"), ClientId::Network(_)));
        assert!(matches!(round_trip("fd00::/8"), ClientId::Network(_)));
        assert!(matches!(round_trip("10.0.0.7"), ClientId::Addr(_)));
        assert_eq!(round_trip("@trusted"), ClientId::Netgroup("trusted".into()));
        assert_eq!(round_trip("*.lab.example.com"), ClientId::Name("*.lab.example.com".into()));
        assert_eq!(
            round_trip("192.168.1.7/24"),
            ClientId::Name("192.168.1.7/24".into())
        );
    }

    #[test]
    fn single_address_network_keeps_prefix() {
        assert!(matches!(round_trip("10.1.2.3/32"), ClientId::Network(_)));
    }

    #[test]
    fn rejects() {
        assert!("".parse::<ClientId>().is_err());
        assert!("@".parse::<ClientId>().is_err());
        assert!("host(rw)".parse::<ClientId>().is_err());
        assert!("two words".parse::<ClientId>().is_err());
        for s in ["-x", "#lab", "-@group"] {
            let err = s.parse::<ClientId>().unwrap_err();
            assert_eq!(err.field, "host", "{s}");
        }
    }
}
