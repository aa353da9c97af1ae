//! Default value functions for configuration.

// =============================================================================
// IRC Defaults
// =============================================================================

pub fn default_port() -> u16 {
    6667
}

pub fn default_nick() -> String {
    "DC-Bridge".to_string()
}

// =============================================================================
// Bridge Defaults
// =============================================================================

pub fn default_uploads_url() -> String {
    "https://0x0.st/".to_string()
}

pub fn default_max_message_len() -> usize {
    450
}

pub fn default_quote_len() -> usize {
    40
}

pub fn default_database_path() -> String {
    "bridge.db".to_string()
}

// =============================================================================
// Timing Defaults (seconds)
// =============================================================================

pub fn default_startup_delay() -> u64 {
    10
}

pub fn default_reconnect_delay() -> u64 {
    15
}

pub fn default_restart_delay() -> u64 {
    5
}

pub fn default_join_delay() -> u64 {
    2
}

pub fn default_puppet_stagger() -> u64 {
    2
}

pub fn default_topic_timeout() -> u64 {
    5
}
