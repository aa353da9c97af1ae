//! Client sessions.
//!
//! A [`Link`] is one IRC connection driven by its own task. The owner talks
//! to it through a [`LinkHandle`] (an ordered queue of [`LinkOp`]s) and hears
//! back through [`LinkEvent`]s tagged with the generation the owner assigned,
//! so events from a replaced session are easy to ignore. Puppets and the
//! observer both sit on top of this layer.

mod connector;
mod stream;

pub use connector::{Connector, TcpConnector};
pub use stream::{AsyncStream, IrcStream};

use std::sync::Arc;
use std::time::Duration;

use bridge_proto::{Command, IrcCodec, Message};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::codec::Framed;
use tracing::{Instrument, Span, debug, info, warn};

/// Work queued on a session, executed strictly in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOp {
    Send(Message),
    /// Hold back later ops for this long. Incoming traffic keeps flowing.
    Pause(Duration),
    Quit(Option<String>),
}

/// What a session reports to its owner.
#[derive(Debug, Clone)]
pub enum LinkEvent<K> {
    /// Transport is up and registration (`NICK`/`USER`) was sent.
    Connected { key: K, generation: u64 },
    Message {
        key: K,
        generation: u64,
        message: Message,
    },
    Disconnected {
        key: K,
        generation: u64,
        reason: String,
        /// Queued messages that never reached the socket, in queue order.
        unsent: Vec<Message>,
    },
    ConnectFailed {
        key: K,
        generation: u64,
        error: String,
    },
}

impl<K> LinkEvent<K> {
    pub fn key(&self) -> &K {
        match self {
            Self::Connected { key, .. }
            | Self::Message { key, .. }
            | Self::Disconnected { key, .. }
            | Self::ConnectFailed { key, .. } => key,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            Self::Connected { generation, .. }
            | Self::Message { generation, .. }
            | Self::Disconnected { generation, .. }
            | Self::ConnectFailed { generation, .. } => *generation,
        }
    }
}

/// Identity sent during registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub nick: String,
    pub realname: String,
}

impl Registration {
    /// Registration where the real name repeats the nick.
    pub fn new(nick: impl Into<String>) -> Self {
        let nick = nick.into();
        Self {
            realname: nick.clone(),
            nick,
        }
    }

    fn username(&self) -> String {
        let user: String = self
            .nick
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(10)
            .collect();
        if user.is_empty() { "bridge".into() } else { user }
    }
}

/// Sender side of a session's op queue.
#[derive(Debug, Clone)]
pub struct LinkHandle {
    ops: mpsc::UnboundedSender<LinkOp>,
}

impl LinkHandle {
    /// Queue a raw message. Returns false if the session has ended.
    pub fn send(&self, message: Message) -> bool {
        self.ops.send(LinkOp::Send(message)).is_ok()
    }

    pub fn join(&self, channel: &str) -> bool {
        self.send(Message::join(channel))
    }

    pub fn part(&self, channel: &str) -> bool {
        self.send(Message::part(channel))
    }

    pub fn privmsg(&self, target: &str, text: &str) -> bool {
        self.send(Message::privmsg(target, text))
    }

    /// CTCP `ACTION`.
    pub fn action(&self, target: &str, text: &str) -> bool {
        self.send(Message::action(target, text))
    }

    pub fn nick(&self, nick: &str) -> bool {
        self.send(Message::nick(nick))
    }

    /// Ask the server for the topic of `channel`.
    pub fn topic(&self, channel: &str) -> bool {
        self.send(Message::topic(channel))
    }

    pub fn names(&self, channel: &str) -> bool {
        self.send(Message::names(channel))
    }

    pub fn pause(&self, delay: Duration) -> bool {
        self.ops.send(LinkOp::Pause(delay)).is_ok()
    }

    /// Send `QUIT` once earlier ops are done, then close.
    pub fn quit(&self, reason: Option<String>) -> bool {
        self.ops.send(LinkOp::Quit(reason)).is_ok()
    }
}

/// Spawner for client sessions.
pub struct Link;

impl Link {
    /// Open a session in its own task.
    ///
    /// Events are delivered on `events`, converted into the owner's mailbox
    /// type. Dropping every clone of the returned handle quits the session.
    pub fn spawn<K, M>(
        connector: Arc<dyn Connector>,
        registration: Registration,
        key: K,
        generation: u64,
        events: mpsc::UnboundedSender<M>,
        span: Span,
    ) -> LinkHandle
    where
        K: Clone + Send + Sync + 'static,
        M: From<LinkEvent<K>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session {
            key,
            generation,
            events,
        };
        tokio::spawn(session.run(connector, registration, rx).instrument(span));
        LinkHandle { ops: tx }
    }
}

struct Session<K, M> {
    key: K,
    generation: u64,
    events: mpsc::UnboundedSender<M>,
}

impl<K, M> Session<K, M>
where
    K: Clone + Send + Sync + 'static,
    M: From<LinkEvent<K>> + Send + 'static,
{
    fn emit(&self, event: LinkEvent<K>) {
        let _ = self.events.send(M::from(event));
    }

    async fn run(
        self,
        connector: Arc<dyn Connector>,
        registration: Registration,
        mut ops: mpsc::UnboundedReceiver<LinkOp>,
    ) {
        let stream = match connector.connect().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Connect failed");
                self.emit(LinkEvent::ConnectFailed {
                    key: self.key.clone(),
                    generation: self.generation,
                    error: e.to_string(),
                });
                return;
            }
        };

        let tls = stream.is_tls();
        let mut framed = Framed::new(stream, IrcCodec::new());

        let register = [
            Message::nick(registration.nick.as_str()),
            Message::user(registration.username(), registration.realname.as_str()),
        ];
        for msg in register {
            if let Err(e) = framed.send(msg).await {
                self.emit(LinkEvent::Disconnected {
                    key: self.key.clone(),
                    generation: self.generation,
                    reason: e.to_string(),
                    unsent: drain_unsent(&mut ops, None),
                });
                return;
            }
        }

        info!(nick = %registration.nick, tls, "Connected, registering");
        self.emit(LinkEvent::Connected {
            key: self.key.clone(),
            generation: self.generation,
        });

        let (reason, failed) = self.pump(&mut framed, &mut ops).await;
        let unsent = drain_unsent(&mut ops, failed);
        debug!(%reason, unsent = unsent.len(), "Session ended");
        self.emit(LinkEvent::Disconnected {
            key: self.key.clone(),
            generation: self.generation,
            reason,
            unsent,
        });
    }

    /// Shuttle ops out and messages in until either side ends. Returns why
    /// the session ended, plus the message whose write failed, if any.
    async fn pump(
        &self,
        framed: &mut Framed<IrcStream, IrcCodec>,
        ops: &mut mpsc::UnboundedReceiver<LinkOp>,
    ) -> (String, Option<Message>) {
        let mut resume_at: Option<Instant> = None;

        loop {
            let paused = resume_at.is_some();
            let wake = sleep_until(resume_at.unwrap_or_else(Instant::now));

            tokio::select! {
                _ = wake, if paused => {
                    resume_at = None;
                }
                op = ops.recv(), if !paused => match op {
                    Some(LinkOp::Send(msg)) => {
                        if let Err(e) = framed.send(msg.clone()).await {
                            return (format!("write failed: {e}"), Some(msg));
                        }
                    }
                    Some(LinkOp::Pause(delay)) => {
                        resume_at = Some(Instant::now() + delay);
                    }
                    Some(LinkOp::Quit(reason)) => {
                        let _ = framed.send(Message::quit(reason)).await;
                        return ("quit".into(), None);
                    }
                    None => {
                        let _ = framed.send(Message::quit(None)).await;
                        return ("handle dropped".into(), None);
                    }
                },
                frame = framed.next() => match frame {
                    Some(Ok(message)) => {
                        if let Command::PING(ref token, _) = message.command {
                            if let Err(e) = framed.send(Message::pong(token.as_str())).await {
                                return (format!("write failed: {e}"), None);
                            }
                            continue;
                        }
                        self.emit(LinkEvent::Message {
                            key: self.key.clone(),
                            generation: self.generation,
                            message,
                        });
                    }
                    Some(Err(e)) => return (format!("stream error: {e}"), None),
                    None => return ("connection closed".into(), None),
                },
            }
        }
    }
}

/// Close the op queue and collect the messages still waiting in it.
///
/// Closing first makes any later [`LinkHandle::send`] fail, so every message
/// is either returned here or refused to its sender.
fn drain_unsent(
    ops: &mut mpsc::UnboundedReceiver<LinkOp>,
    failed: Option<Message>,
) -> Vec<Message> {
    ops.close();
    let mut unsent: Vec<Message> = failed.into_iter().collect();
    while let Ok(op) = ops.try_recv() {
        if let LinkOp::Send(message) = op {
            unsent.push(message);
        }
    }
    unsent
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    struct PipeConnector(Mutex<Option<DuplexStream>>);

    #[async_trait]
    impl Connector for PipeConnector {
        async fn connect(&self) -> std::io::Result<IrcStream> {
            self.0
                .lock()
                .take()
                .map(IrcStream::custom)
                .ok_or_else(|| std::io::Error::other("no more pipes"))
        }
    }

    #[tokio::test]
    async fn test_registers_answers_ping_and_reports_messages() {
        let (client, server) = tokio::io::duplex(4096);
        let connector = Arc::new(PipeConnector(Mutex::new(Some(client))));
        let (tx, mut rx) = mpsc::unbounded_channel::<LinkEvent<&'static str>>();

        let handle = Link::spawn(
            connector,
            Registration::new("bob|dc"),
            "bob",
            7,
            tx,
            Span::none(),
        );

        let (read, mut write) = tokio::io::split(server);
        let mut lines = BufReader::new(read).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "NICK bob|dc");
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "USER bobdc 0 * :bob|dc"
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            LinkEvent::Connected { generation: 7, .. }
        ));

        write.write_all(b"PING :abc\r\n:srv 001 bob|dc :Welcome\r\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "PONG abc");
        match rx.recv().await.unwrap() {
            LinkEvent::Message { message, .. } => {
                assert_eq!(message.command.name(), "001");
            }
            other => panic!("unexpected event {other:?}"),
        }

        handle.privmsg("#c", "hi");
        handle.quit(None);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "PRIVMSG #c :hi");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "QUIT");
        assert!(matches!(
            rx.recv().await.unwrap(),
            LinkEvent::Disconnected { ref reason, .. } if reason == "quit"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_delays_later_ops() {
        let (client, server) = tokio::io::duplex(4096);
        let connector = Arc::new(PipeConnector(Mutex::new(Some(client))));
        let (tx, _rx) = mpsc::unbounded_channel::<LinkEvent<()>>();
        let handle = Link::spawn(connector, Registration::new("obs"), (), 1, tx, Span::none());

        let mut lines = BufReader::new(server).lines();
        lines.next_line().await.unwrap();
        lines.next_line().await.unwrap();

        let start = Instant::now();
        handle.pause(Duration::from_secs(2));
        handle.join("#a");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "JOIN #a");
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_returns_unsent_messages() {
        let (client, server) = tokio::io::duplex(4096);
        let connector = Arc::new(PipeConnector(Mutex::new(Some(client))));
        let (tx, mut rx) = mpsc::unbounded_channel::<LinkEvent<()>>();
        let handle = Link::spawn(connector, Registration::new("obs"), (), 1, tx, Span::none());

        let mut lines = BufReader::new(server).lines();
        lines.next_line().await.unwrap();
        lines.next_line().await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), LinkEvent::Connected { .. }));

        handle.pause(Duration::from_secs(2));
        handle.join("#a");
        handle.privmsg("#a", "hello");
        drop(lines);

        match rx.recv().await.unwrap() {
            LinkEvent::Disconnected { unsent, .. } => {
                assert_eq!(unsent, vec![Message::join("#a"), Message::privmsg("#a", "hello")]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!handle.privmsg("#a", "late"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let connector = Arc::new(PipeConnector(Mutex::new(None)));
        let (tx, mut rx) = mpsc::unbounded_channel::<LinkEvent<u8>>();
        let _handle = Link::spawn(connector, Registration::new("x"), 1, 3, tx, Span::none());
        assert!(matches!(
            rx.recv().await.unwrap(),
            LinkEvent::ConnectFailed { key: 1, generation: 3, .. }
        ));
    }
}
