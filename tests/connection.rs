use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use leetbot::Error;
use leetbot::config::{ChannelConfig, ServerConfig};
use leetbot::irc::{
    Connection, ConnectionOptions, ConnectionState, Event, EventHandler, EventKind, Sender,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

/// The server side of a test connection.
struct Peer {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Peer {
    fn new(stream: TcpStream) -> Self {
        let (read, writer) = stream.into_split();

        Peer {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn next_line(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for line")
            .expect("read failed")
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    /// Reads the registration lines and welcomes the client.
    async fn welcome(&mut self) {
        assert_eq!(self.next_line().await.as_deref(), Some("NICK leetbot"));
        assert_eq!(
            self.next_line().await.as_deref(),
            Some("USER leetbot 0 * :leetbot")
        );

        self.send(":irc.test 001 leetbot :Welcome").await;
    }
}

#[derive(Default)]
struct CountingHandler {
    calls: AtomicUsize,
}

#[async_trait]
impl EventHandler for CountingHandler {
    async fn handle(&self, _event: &Event, _sender: &Sender) -> Result<(), Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}

async fn listen(channels: Vec<ChannelConfig>) -> (TcpListener, ServerConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = ServerConfig {
        name: "test".to_string(),
        hostname: "127.0.0.1".to_string(),
        port,
        nickname: None,
        channels,
    };

    (listener, server)
}

fn options() -> ConnectionOptions {
    ConnectionOptions {
        send_delay: Duration::from_millis(1),
        connect_timeout: Duration::from_secs(5),
        read_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

fn channel(name: &str) -> ChannelConfig {
    ChannelConfig {
        name: name.to_string(),
        key: None,
    }
}

async fn accept(listener: &TcpListener) -> Peer {
    let (stream, _) = listener.accept().await.unwrap();

    Peer::new(stream)
}

/// Connects `connection` to a peer that welcomes it and reads the joins.
async fn connected(listener: &TcpListener, connection: &mut Connection) -> Peer {
    let joins = connection.server().channels.len();
    let (result, peer) = tokio::join!(connection.connect(), async {
        let mut peer = accept(listener).await;

        peer.welcome().await;

        for _ in 0..joins {
            peer.next_line().await;
        }

        peer
    });

    result.unwrap();
    peer
}

#[tokio::test]
async fn it_should_answer_ping_during_registration() {
    let (listener, server) = listen(vec![channel("#leet")]).await;
    let mut connection = Connection::new(server, "leetbot", options());

    let (result, ()) = tokio::join!(connection.connect(), async {
        let mut peer = accept(&listener).await;

        assert_eq!(peer.next_line().await.as_deref(), Some("NICK leetbot"));
        assert!(peer.next_line().await.unwrap().starts_with("USER leetbot"));

        peer.send("PING :abc").await;
        assert_eq!(peer.next_line().await.as_deref(), Some("PONG :abc"));

        peer.send(":irc.test 001 leetbot :Welcome").await;
        assert_eq!(peer.next_line().await.as_deref(), Some("JOIN #leet"));
    });

    result.unwrap();

    let info = connection.info();

    assert_eq!(info.state, ConnectionState::Connected);
    assert_eq!(info.channels, vec!["#leet".to_string()]);
    assert!(info.connected_at.is_some());
    assert!(info.last_ping.is_some());
}

#[tokio::test]
async fn it_should_join_with_channel_keys() {
    let channels = vec![
        ChannelConfig {
            name: "#secret".to_string(),
            key: Some("hunter2".to_string()),
        },
        channel("#open"),
    ];
    let (listener, server) = listen(channels).await;
    let mut connection = Connection::new(server, "leetbot", options());

    let (result, ()) = tokio::join!(connection.connect(), async {
        let mut peer = accept(&listener).await;

        peer.welcome().await;

        assert_eq!(peer.next_line().await.as_deref(), Some("JOIN #secret hunter2"));
        assert_eq!(peer.next_line().await.as_deref(), Some("JOIN #open"));
    });

    result.unwrap();

    assert_eq!(connection.info().channels, vec!["#secret", "#open"]);
}

#[tokio::test]
async fn it_should_retry_with_new_nickname_when_in_use() {
    let (listener, server) = listen(vec![]).await;
    let mut connection = Connection::new(server, "leetbot", options());

    let (result, (retried, mut peer)) = tokio::join!(connection.connect(), async {
        let mut peer = accept(&listener).await;

        peer.next_line().await;
        peer.next_line().await;
        peer.send(":irc.test 433 * leetbot :Nickname is already in use").await;

        let retried = peer.next_line().await.unwrap();

        peer.send(":irc.test 001 leetbot :Welcome").await;

        (retried, peer)
    });

    result.unwrap();

    let nickname = retried.strip_prefix("NICK ").unwrap();

    assert!(nickname.starts_with("leetbot"));
    assert_ne!(nickname, "leetbot");
    assert_eq!(connection.info().nickname, nickname);

    // Nothing else was sent between the retried NICK and the QUIT.
    connection.disconnect("bye").await;

    assert_eq!(peer.next_line().await.as_deref(), Some("QUIT :bye"));
}

#[tokio::test]
async fn it_should_ping_when_idle() {
    let (listener, server) = listen(vec![]).await;
    let idle = Duration::from_millis(300);
    let mut connection = Connection::new(
        server,
        "leetbot",
        ConnectionOptions {
            keepalive_idle: idle,
            keepalive_tick: Duration::from_millis(50),
            ..options()
        },
    );
    let mut peer = connected(&listener, &mut connection).await;
    let before = connection.info().last_ping.unwrap();

    assert_eq!(peer.next_line().await.as_deref(), Some("PING :keepalive"));
    assert!(before.elapsed() >= idle);

    let mut touched = false;

    for _ in 0..100 {
        if connection.info().last_ping.is_some_and(|at| at > before) {
            touched = true;
            break;
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(touched);

    connection.disconnect("bye").await;
}

#[tokio::test]
async fn it_should_time_out_without_welcome() {
    let (listener, server) = listen(vec![]).await;
    let mut connection = Connection::new(
        server,
        "leetbot",
        ConnectionOptions {
            connect_timeout: Duration::from_millis(200),
            ..options()
        },
    );

    let (result, _peer) = tokio::join!(connection.connect(), accept(&listener));

    assert!(matches!(result, Err(Error::AuthenticationTimeout)));
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn it_should_fail_when_nothing_listens() {
    let (listener, server) = listen(vec![]).await;

    drop(listener);

    let mut connection = Connection::new(server, "leetbot", options());

    assert!(matches!(
        connection.connect().await,
        Err(Error::Connect { .. })
    ));
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn it_should_answer_ping_after_registration() {
    let (listener, server) = listen(vec![]).await;
    let mut connection = Connection::new(server, "leetbot", options());
    let handler = Arc::new(CountingHandler::default());

    connection.add_handler(EventKind::Privmsg, handler.clone());

    let mut peer = connected(&listener, &mut connection).await;

    peer.send("PING :xyz").await;

    let mut events = vec![];

    while events.is_empty() {
        events = connection.read_messages().await.unwrap();
    }

    assert_eq!(events[0].kind, EventKind::Ping);
    assert_eq!(peer.next_line().await.as_deref(), Some("PONG :xyz"));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn it_should_pass_events_to_handlers_and_observers() {
    let (listener, server) = listen(vec![]).await;
    let mut connection = Connection::new(server, "leetbot", options());
    let handler = Arc::new(CountingHandler::default());
    let observed = Arc::new(AtomicUsize::new(0));
    let counter = observed.clone();

    connection.add_handler(EventKind::Privmsg, handler.clone());
    connection.add_raw_observer(Arc::new(move |_line: &str| -> Result<(), Error> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    let mut peer = connected(&listener, &mut connection).await;

    peer.send(":nick!user@host PRIVMSG #leet :hello").await;
    peer.send(":nick!user@host JOIN #leet").await;

    let mut events = vec![];

    while events.len() < 2 {
        events.extend(connection.read_messages().await.unwrap());
    }

    assert_eq!(events[0].kind, EventKind::Privmsg);
    assert_eq!(events[1].kind, EventKind::Join);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert_eq!(observed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn it_should_report_lost_connection() {
    let (listener, server) = listen(vec![]).await;
    let mut connection = Connection::new(server, "leetbot", options());
    let peer = connected(&listener, &mut connection).await;

    drop(peer);

    let result = loop {
        match connection.read_messages().await {
            Ok(_) => continue,
            Err(err) => break err,
        }
    };

    assert!(matches!(result, Error::ConnectionLost));
}

#[tokio::test]
async fn it_should_send_quit_and_reset_on_disconnect() {
    let (listener, server) = listen(vec![channel("#leet")]).await;
    let mut connection = Connection::new(server, "leetbot", options());
    let mut peer = connected(&listener, &mut connection).await;

    connection.disconnect("Goodbye!").await;

    assert_eq!(peer.next_line().await.as_deref(), Some("QUIT :Goodbye!"));
    assert_eq!(peer.next_line().await, None);

    let info = connection.info();

    assert_eq!(info.state, ConnectionState::Disconnected);
    assert!(info.channels.is_empty());
    assert_eq!(info.connected_at, None);
    assert!(matches!(
        connection.sender().send_raw("PRIVMSG #leet :hi").await,
        Err(Error::NotConnected)
    ));
}
