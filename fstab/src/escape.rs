// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

//! fstab's octal escapes for characters that would otherwise split a field.

use std::{borrow::Cow, fmt::Write};

/// Decode `\ooo` sequences. A backslash that does not start a valid escape is kept as-is.
/// Returns `None` when the decoded bytes are not UTF-8.
pub fn unescape(field: &str) -> Option<Cow<'_, str>> {
    if !field.contains('\\') {
        return Some(Cow::Borrowed(field));
    }

    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if let Some(b) = octal_byte(&bytes[i + 1..]) {
                out.push(b);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(out).ok().map(Cow::Owned)
}

fn octal_byte(digits: &[u8]) -> Option<u8> {
    let digits = digits.get(..3)?;
    let mut value: u32 = 0;
    for d in digits {
        if !(b'0'..=b'7').contains(d) {
            return None;
        }
        value = value * 8 + u32::from(d - b'0');
    }
    u8::try_from(value).ok()
}

/// Encode the characters that cannot appear literally inside an fstab field.
pub fn escape(field: &str) -> Cow<'_, str> {
    if !field.contains(|c: char| c == ' ' || c == '\\' || c.is_ascii_control()) {
        return Cow::Borrowed(field);
    }

    let mut out = String::with_capacity(field.len() + 8);
    for ch in field.chars() {
        if ch == ' ' || ch == '\\' || ch.is_ascii_control() {
            let _ = write!(out, "\\{:03o}", u32::from(ch));
        } else {
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(field: &str) -> String {
        unescape(field).unwrap().into_owned()
    }

    #[test]
    fn decode() {
        assert_eq!(decoded("/mnt/My\\040Disk"), "/mnt/My Disk");
        assert_eq!(decoded("a\\011b\\134c"), "a\tb\\c");
        assert_eq!(decoded("plain"), "plain");
        assert_eq!(decoded("caf\\303\\251"), "caf\u{e9}");
        // Not escapes:
        assert_eq!(decoded("a\\b"), "a\\b");
        assert_eq!(decoded("end\\04"), "end\\04");
        assert_eq!(decoded("big\\777"), "big\\777");
    }

    #[test]
    fn undecodable_bytes() {
        assert_eq!(unescape("bad\\377"), None);
        assert_eq!(unescape("half\\303"), None);
    }

    #[test]
    fn encode() {
        assert_eq!(escape("/mnt/My Disk"), "/mnt/My\\040Disk");
        assert_eq!(escape("a\\b"), "a\\134b");
        assert_eq!(escape("tab\there"), "tab\\011here");
        assert!(matches!(escape("/mnt/data"), Cow::Borrowed(_)));
        assert!(matches!(escape("/mnt/caf\u{e9}"), Cow::Borrowed(_)));
    }

    #[test]
    fn control_characters_stay_escaped() {
        assert_eq!(decoded("nul\\000end"), "nul\0end");
        assert_eq!(escape("nul\0end"), "nul\\000end");
        assert_eq!(escape("del\u{7f}"), "del\\177");
        assert_eq!(escape(&decoded("x\\001\\037y")), "x\\001\\037y");
    }

    #[test]
    fn literal_backslash_survives() {
        let once = decoded("a\\b");
        let twice = decoded(&escape(&once));
        assert_eq!(once, twice);
    }
}
