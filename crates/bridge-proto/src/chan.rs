//! Channel name helpers.

/// Extension trait for telling channel targets from nick targets.
pub trait ChannelExt {
    /// True when the string starts with one of the channel prefixes `& # + !`.
    fn is_channel_name(&self) -> bool;
}

impl ChannelExt for str {
    fn is_channel_name(&self) -> bool {
        self.starts_with(&['&', '#', '+', '!'][..])
    }
}

impl ChannelExt for String {
    fn is_channel_name(&self) -> bool {
        self.as_str().is_channel_name()
    }
}
