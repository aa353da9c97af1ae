//! slirc-bridge - IRC bridge for group-messaging platforms
//!
//! Every platform user active in a bridged group gets a puppet: a dedicated
//! IRC connection under their own nick. One shared observer connection
//! listens to every bridged channel and feeds inbound traffic back to the
//! platform.
//!
//! The host owns the messaging platform. It implements [`Platform`], picks
//! a [`BridgeStore`] and calls [`Bridge::start`]:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use slirc_bridge::{Bridge, Config, Database, Platform, TcpConnector};
//! # async fn run(platform: Arc<dyn Platform>) -> anyhow::Result<()> {
//! slirc_bridge::telemetry::init();
//! let config = Config::load("bridge.toml")?;
//! let store = Arc::new(Database::new(&config.database.path).await?);
//! let connector = Arc::new(TcpConnector::new(&config.irc)?);
//! let bridge = Bridge::start(config, store, platform, connector, None).await?;
//! # drop(bridge);
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod http;
pub mod link;
pub mod metrics;
pub mod nick;
pub mod observer;
pub mod platform;
pub mod puppet;
pub mod router;
pub mod store;
pub mod supervisor;
pub mod telemetry;
pub mod upload;

pub use bridge::{Bridge, Joined};
pub use config::Config;
pub use error::{BridgeError, BridgeResult};
pub use event::{IrcEvent, TextKind};
pub use link::{Connector, IrcStream, TcpConnector};
pub use observer::Observer;
pub use platform::{
    Attachment, GroupId, GroupMessage, OutgoingMessage, Platform, PlatformError, Quote,
};
pub use puppet::{PuppetInfo, PuppetRegistry, PuppetState};
pub use store::{BridgeStore, Database, MemoryStore, StoreError};
pub use upload::{HttpUploader, UploadError, Uploader};
