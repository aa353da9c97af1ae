//! IRC message prefix types.
//!
//! A prefix names the origin of a message: either a server or a user's
//! `nick!user@host` mask.

use std::fmt;

/// IRC message prefix.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Prefix {
    /// Server name (e.g., "irc.libera.chat").
    ServerName(String),
    /// User prefix: (nickname, username, hostname).
    Nickname(String, String, String),
}

impl Prefix {
    /// Parse a prefix string leniently.
    ///
    /// A bare name containing a dot and neither `!` nor `@` is taken to be a
    /// server; everything else is a user mask with possibly empty parts.
    pub fn new_from_str(s: &str) -> Self {
        let (name_user, host) = match s.split_once('@') {
            Some((left, host)) => (left, Some(host)),
            None => (s, None),
        };
        let (name, user) = match name_user.split_once('!') {
            Some((name, user)) => (name, Some(user)),
            None => (name_user, None),
        };

        if user.is_none() && host.is_none() && name.contains('.') {
            return Prefix::ServerName(name.to_owned());
        }

        Prefix::Nickname(
            name.to_owned(),
            user.unwrap_or_default().to_owned(),
            host.unwrap_or_default().to_owned(),
        )
    }

    /// The nickname, for user prefixes.
    pub fn nickname(&self) -> Option<&str> {
        match self {
            Prefix::Nickname(nick, _, _) => Some(nick),
            Prefix::ServerName(_) => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::ServerName(name) => f.write_str(name),
            Prefix::Nickname(nick, user, host) => {
                f.write_str(nick)?;
                if !user.is_empty() {
                    write!(f, "!{}", user)?;
                }
                if !host.is_empty() {
                    write!(f, "@{}", host)?;
                }
                Ok(())
            }
        }
    }
}
