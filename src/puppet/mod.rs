//! Puppet connections: one IRC session per bridged user.
//!
//! A single reactor task owns every [`Puppet`]. Requests from the bridge,
//! session events and timers all arrive on its one mailbox, so creating a
//! puppet is serialized and an address never gets two live sessions.
//! [`PuppetRegistry`] is the cloneable handle the rest of the bridge uses.

mod command;
mod reactor;
mod registry;
mod state;

pub use command::PuppetCommand;
pub use registry::{PuppetInfo, PuppetRegistry, RestoredPuppet};
pub use state::{Action, Puppet, PuppetState};
