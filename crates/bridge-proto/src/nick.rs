//! Nickname rules.
//!
//! The legal nickname alphabet is ASCII letters, digits and
//! `` _-\[]{}^`| ``. A nick may not start with a digit or a hyphen.

/// True for characters allowed anywhere in a nickname.
#[inline]
pub fn is_nick_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '_' | '-' | '\\' | '[' | ']' | '{' | '}' | '^' | '`' | '|')
}

/// Drop every illegal character and truncate to `max_len` characters.
///
/// The result can still be empty or start with a digit; callers that need
/// a usable nick check [`NickExt::is_valid_nick_len`] afterwards.
pub fn sanitize_nick(raw: &str, max_len: usize) -> String {
    raw.chars().filter(|c| is_nick_char(*c)).take(max_len).collect()
}

/// Extension trait for checking if a string is a valid IRC nickname.
pub trait NickExt {
    /// Valid charset, non-empty, does not start with a digit or hyphen, and
    /// no longer than `max_len`.
    fn is_valid_nick_len(&self, max_len: usize) -> bool;
}

impl NickExt for str {
    fn is_valid_nick_len(&self, max_len: usize) -> bool {
        let Some(first) = self.chars().next() else {
            return false;
        };
        self.chars().count() <= max_len
            && !first.is_ascii_digit()
            && first != '-'
            && self.chars().all(is_nick_char)
    }
}

impl NickExt for String {
    fn is_valid_nick_len(&self, max_len: usize) -> bool {
        self.as_str().is_valid_nick_len(max_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_nick("Alice Smith", 13), "AliceSmith");
        assert_eq!(sanitize_nick("dr. [who]", 13), "dr[who]");
        assert_eq!(sanitize_nick("Zoë", 13), "Zo");
        assert_eq!(sanitize_nick("averyveryverylongname", 13), "averyveryvery");
        assert_eq!(sanitize_nick("!!!", 13), "");
    }

    #[test]
    fn test_valid_nicks() {
        assert!("bob".is_valid_nick_len(13));
        assert!("[cool]".is_valid_nick_len(13));
        assert!("bob|dc".is_valid_nick_len(16));
        assert!(!"".is_valid_nick_len(13));
        assert!(!"1bob".is_valid_nick_len(13));
        assert!(!"-bob".is_valid_nick_len(13));
        assert!(!"bob smith".is_valid_nick_len(13));
        assert!(!"fourteen_chars".is_valid_nick_len(13));
    }
}
