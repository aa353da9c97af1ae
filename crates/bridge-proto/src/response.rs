//! IRC numeric replies the bridge reacts to.
//!
//! Numerics outside this set are parsed as [`Command::Raw`](crate::Command::Raw)
//! with their three-digit code as the command name.

#![allow(non_camel_case_types)]

/// IRC server response code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
#[non_exhaustive]
pub enum Response {
    /// 001 - Welcome to the IRC network
    RPL_WELCOME = 1,
    /// 331 - No topic is set
    RPL_NOTOPIC = 331,
    /// 332 - Channel topic
    RPL_TOPIC = 332,
    /// 353 - Names list entry
    RPL_NAMREPLY = 353,
    /// 366 - End of names list
    RPL_ENDOFNAMES = 366,
    /// 401 - No such nick/channel
    ERR_NOSUCHNICK = 401,
    /// 403 - No such channel
    ERR_NOSUCHCHANNEL = 403,
    /// 432 - Erroneous nickname
    ERR_ERRONEUSNICKNAME = 432,
    /// 433 - Nickname is already in use
    ERR_NICKNAMEINUSE = 433,
}

impl Response {
    /// The numeric code.
    #[inline]
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Look up a known numeric.
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            1 => Self::RPL_WELCOME,
            331 => Self::RPL_NOTOPIC,
            332 => Self::RPL_TOPIC,
            353 => Self::RPL_NAMREPLY,
            366 => Self::RPL_ENDOFNAMES,
            401 => Self::ERR_NOSUCHNICK,
            403 => Self::ERR_NOSUCHCHANNEL,
            432 => Self::ERR_ERRONEUSNICKNAME,
            433 => Self::ERR_NICKNAMEINUSE,
            _ => return None,
        })
    }

    /// Error numerics live in the 400-599 range.
    pub fn is_error(&self) -> bool {
        (400..600).contains(&self.code())
    }
}
