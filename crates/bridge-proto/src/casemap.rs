//! RFC 1459 case mapping.
//!
//! IRC treats `{}|^` as the lowercase forms of `[]\~`, so `Nick[1]` and
//! `nick{1}` name the same user.

/// Lowercase one character under RFC 1459 rules.
#[inline]
pub fn irc_lower_char(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        _ => c.to_ascii_lowercase(),
    }
}

/// Lowercase a nick or channel name under RFC 1459 rules.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(irc_lower_char).collect()
}

/// Case-insensitive comparison under RFC 1459 rules.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .chars()
            .zip(b.chars())
            .all(|(x, y)| irc_lower_char(x) == irc_lower_char(y))
}
