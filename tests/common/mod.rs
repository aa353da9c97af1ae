//! Integration test common infrastructure.
//!
//! Provides an in-memory IRC network, a recording platform and a scripted
//! uploader, plus a helper that starts a bridge wired to all three.

pub mod net;
pub mod platform;
pub mod upload;

use std::sync::Arc;

use slirc_bridge::{Bridge, BridgeStore, Config, MemoryStore, Uploader};

#[allow(unused_imports)]
pub use net::{ServerConn, TestConnector, TestNetwork};
#[allow(unused_imports)]
pub use platform::FakePlatform;
#[allow(unused_imports)]
pub use upload::FakeUploader;

/// Config with uploads off and no startup delay. Other timings keep their
/// defaults, so timer-driven tests run on a paused clock.
#[allow(dead_code)]
pub fn test_config() -> Config {
    Config::parse(
        r#"
        [irc]
        host = "irc.test"

        [bridge]
        uploads_url = ""

        [timing]
        startup_delay = 0
        "#,
    )
    .expect("test config parses")
}

/// A running bridge and everything it talks to.
#[allow(dead_code)]
pub struct Harness {
    pub bridge: Bridge,
    pub store: Arc<MemoryStore>,
    pub platform: Arc<FakePlatform>,
    pub connector: Arc<TestConnector>,
    pub network: TestNetwork,
}

#[allow(dead_code)]
impl Harness {
    pub async fn start(store: Arc<MemoryStore>, platform: Arc<FakePlatform>) -> Self {
        Self::start_with(test_config(), store, platform, None).await
    }

    pub async fn start_with(
        config: Config,
        store: Arc<MemoryStore>,
        platform: Arc<FakePlatform>,
        uploader: Option<Arc<dyn Uploader>>,
    ) -> Self {
        let (connector, network) = TestNetwork::new();
        let bridge = Bridge::start(
            config,
            store.clone() as Arc<dyn BridgeStore>,
            platform.clone(),
            connector.clone(),
            uploader,
        )
        .await
        .expect("bridge starts");
        Self {
            bridge,
            store,
            platform,
            connector,
            network,
        }
    }

    /// Accept the observer connection and complete its registration.
    pub async fn welcome_observer(&self) -> ServerConn {
        let mut observer = self.network.accept("DC-Bridge").await;
        observer.welcome().await;
        observer
    }
}
