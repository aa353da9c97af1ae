//! In-memory IRC network.
//!
//! Every connect opens a `tokio::io::duplex` pipe. The bridge gets the
//! client end; the test gets a [`ServerConn`] for the server end and plays
//! the IRC server by hand.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bridge_proto::{Command, Message};
use slirc_bridge::{Connector, IrcStream};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Connector handing out pipes into a [`TestNetwork`].
pub struct TestConnector {
    incoming: mpsc::UnboundedSender<DuplexStream>,
    connections: AtomicUsize,
    refuse: AtomicBool,
}

#[allow(dead_code)]
impl TestConnector {
    /// Connection attempts so far, refused ones included.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Make later connects fail until switched back.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for TestConnector {
    async fn connect(&self) -> std::io::Result<IrcStream> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused by test",
            ));
        }
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.incoming
            .send(server)
            .map_err(|_| std::io::Error::other("test network gone"))?;
        Ok(IrcStream::custom(client))
    }
}

/// The server side of the in-memory network.
pub struct TestNetwork {
    incoming: Mutex<mpsc::UnboundedReceiver<DuplexStream>>,
    /// Registered connections nobody asked for yet.
    backlog: Mutex<Vec<ServerConn>>,
}

#[allow(dead_code)]
impl TestNetwork {
    pub fn new() -> (Arc<TestConnector>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(TestConnector {
            incoming: tx,
            connections: AtomicUsize::new(0),
            refuse: AtomicBool::new(false),
        });
        let network = Self {
            incoming: Mutex::new(rx),
            backlog: Mutex::new(Vec::new()),
        };
        (connector, network)
    }

    /// Next connection that registers as `nick`.
    pub async fn accept(&self, nick: &str) -> ServerConn {
        self.try_accept(nick, RECV_TIMEOUT)
            .await
            .unwrap_or_else(|| panic!("no connection registered as {nick}"))
    }

    /// Like [`accept`](Self::accept), but `None` once `wait` passes.
    pub async fn try_accept(&self, nick: &str, wait: Duration) -> Option<ServerConn> {
        {
            let mut backlog = self.backlog.lock().await;
            if let Some(pos) = backlog.iter().position(|c| c.nick == nick) {
                return Some(backlog.remove(pos));
            }
        }

        let mut incoming = self.incoming.lock().await;
        let accept = async {
            while let Some(stream) = incoming.recv().await {
                let conn = ServerConn::register(stream).await;
                if conn.nick == nick {
                    return Some(conn);
                }
                self.backlog.lock().await.push(conn);
            }
            None
        };
        timeout(wait, accept).await.ok().flatten()
    }
}

/// The test's view of one client connection.
pub struct ServerConn {
    /// Nick sent during registration (or the last `NICK` read).
    pub nick: String,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

#[allow(dead_code)]
impl ServerConn {
    async fn register(stream: DuplexStream) -> Self {
        let (read, writer) = tokio::io::split(stream);
        let mut conn = Self {
            nick: String::new(),
            lines: BufReader::new(read).lines(),
            writer,
        };
        let nick = conn.recv().await.expect("NICK during registration");
        match nick.command {
            Command::NICK(nick) => conn.nick = nick,
            other => panic!("expected NICK, got {other:?}"),
        }
        let user = conn.recv().await.expect("USER during registration");
        assert_eq!(user.command.name(), "USER");
        conn
    }

    /// Next line from the client, raw.
    pub async fn recv_line(&mut self) -> anyhow::Result<String> {
        match timeout(RECV_TIMEOUT, self.lines.next_line()).await?? {
            Some(line) => Ok(line),
            None => anyhow::bail!("connection closed"),
        }
    }

    /// Next message from the client.
    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        let line = self.recv_line().await?;
        line.parse::<Message>()
            .map_err(|e| anyhow::anyhow!("Parse error: {e}"))
    }

    /// Read until `predicate` matches, returning everything read.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<Message>>
    where
        F: FnMut(&Message) -> bool,
    {
        let mut messages = Vec::new();
        loop {
            let msg = self.recv().await?;
            let done = predicate(&msg);
            messages.push(msg);
            if done {
                return Ok(messages);
            }
        }
    }

    /// True once the client has closed the connection; other lines are
    /// skipped.
    pub async fn closed(&mut self) -> bool {
        loop {
            match timeout(RECV_TIMEOUT, self.lines.next_line()).await {
                Ok(Ok(Some(_))) => continue,
                Ok(Ok(None)) | Ok(Err(_)) => return true,
                Err(_) => return false,
            }
        }
    }

    pub async fn send_raw(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .expect("write to client");
    }

    /// Finish registration with `001`.
    pub async fn welcome(&mut self) {
        let line = format!(":irc.test 001 {} :Welcome to the test network", self.nick);
        self.send_raw(&line).await;
    }

    /// Reject the current nick with `433`.
    pub async fn nick_in_use(&mut self) {
        let line = format!(":irc.test 433 * {} :Nickname is already in use", self.nick);
        self.send_raw(&line).await;
    }

    /// Deliver a PRIVMSG from `from` to `target`.
    pub async fn privmsg_from(&mut self, from: &str, target: &str, text: &str) {
        let line = format!(":{from}!{from}@users.test PRIVMSG {target} :{text}");
        self.send_raw(&line).await;
    }
}
