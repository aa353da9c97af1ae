//! Opening transports to the IRC server.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

use super::IrcStream;
use crate::config::IrcConfig;

/// Opens a fresh transport for each session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> io::Result<IrcStream>;
}

/// TCP connector with optional TLS.
pub struct TcpConnector {
    host: String,
    port: u16,
    tls: Option<TlsConnector>,
}

impl TcpConnector {
    pub fn new(config: &IrcConfig) -> io::Result<Self> {
        let tls = if config.tls {
            Some(TlsConnector::from(Arc::new(Self::client_config()?)))
        } else {
            None
        };
        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            tls,
        })
    }

    fn client_config() -> io::Result<ClientConfig> {
        let mut roots = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            if let Err(e) = roots.add(cert) {
                tracing::warn!(error = %e, "Failed to add root cert");
            }
        }
        for e in &certs.errors {
            tracing::warn!(error = %e, "Error loading native certs");
        }

        let provider = Arc::new(tokio_rustls::rustls::crypto::aws_lc_rs::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(io::Error::other)?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(config)
    }

    async fn upgrade_to_tls(
        &self,
        connector: &TlsConnector,
        tcp_stream: TcpStream,
    ) -> io::Result<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        connector.connect(server_name, tcp_stream).await
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self) -> io::Result<IrcStream> {
        let tcp_stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let _ = tcp_stream.set_nodelay(true);

        match &self.tls {
            Some(connector) => {
                let tls_stream = self.upgrade_to_tls(connector, tcp_stream).await?;
                Ok(IrcStream::Tls(Box::new(tls_stream)))
            }
            None => Ok(IrcStream::Plain(tcp_stream)),
        }
    }
}
