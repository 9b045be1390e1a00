use crate::audio::{AudioOutput, SoundEffect, MASTER_VOLUME};
use crate::game::{ClientEvent, ClientPhase, ClientSyncEngine, Role};
use crate::input::{Command, InputManager};
use crate::rendering::Renderer;
use futures_util::{Sink, SinkExt, StreamExt};
use log::{debug, error, info, warn};
use macroquad::prelude::next_frame;
use shared::{
    decode_server, encode, ClientMessage, ErrorClass, ProtocolError, ServerMessage,
    DEFAULT_SECURE_PORT,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};

const DEFAULT_PLAIN_PORT: u16 = 80;

/// Longest the network thread waits for a peer to take our close frame
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid server address '{0}': expected host or host:port")]
    InvalidAddress(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("failed to start network runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl TransportError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Transport
    }
}

/// Builds the WebSocket URL for a `host` or `host:port` address.
///
/// Local hosts get `ws`, everything else `wss`. The port is left out when it is
/// the scheme's default or when none was given.
pub fn server_url(address: &str) -> Result<String, TransportError> {
    let address = address.trim();
    let invalid = || TransportError::InvalidAddress(address.to_string());

    let (host, port) = match address.split(':').collect::<Vec<_>>().as_slice() {
        [host] => (*host, None),
        [host, port] => (*host, Some(port.parse::<u16>().map_err(|_| invalid())?)),
        _ => return Err(invalid()),
    };
    if host.is_empty() {
        return Err(invalid());
    }

    let secure = host != "localhost" && host != "127.0.0.1";
    let (scheme, default_port) = if secure {
        ("wss", DEFAULT_SECURE_PORT)
    } else {
        ("ws", DEFAULT_PLAIN_PORT)
    };

    Ok(match port {
        Some(port) if port != default_port => format!("{}://{}:{}", scheme, host, port),
        _ => format!("{}://{}", scheme, host),
    })
}

/// Transport activity reported to the frame loop
#[derive(Debug)]
pub enum NetworkEvent {
    Connected,
    Message(ServerMessage),
    Malformed(ProtocolError),
    Closed(Option<TransportError>),
}

/// A WebSocket running on its own thread with a private tokio runtime.
///
/// The frame loop talks to it through channels only, so nothing here ever blocks
/// a frame. Dropping the connection asks the thread to close the socket and
/// detaches it; the thread exits on its own once the close is sent or times out.
pub struct Connection {
    outgoing: mpsc::UnboundedSender<ClientMessage>,
    incoming: mpsc::UnboundedReceiver<NetworkEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn open(url: String) -> Result<Self, TransportError> {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, incoming) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let thread = thread::Builder::new()
            .name("network".into())
            .spawn(move || {
                runtime.block_on(run_transport(url, outgoing_rx, events_tx, shutdown_rx));
            })?;

        Ok(Self {
            outgoing,
            incoming,
            shutdown: Some(shutdown),
            thread: Some(thread),
        })
    }

    /// Queues a message; false once the transport has stopped
    pub fn send(&self, message: ClientMessage) -> bool {
        self.outgoing.send(message).is_ok()
    }

    /// Drains everything that arrived since the last call
    pub fn poll(&mut self) -> Vec<NetworkEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.incoming.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
        if let Some(thread) = self.thread.take() {
            if thread.is_finished() && thread.join().is_err() {
                error!("Network thread panicked");
            }
        }
    }
}

/// Sends a close frame, giving up after `limit`
async fn send_close<S>(sink: &mut S, limit: Duration)
where
    S: Sink<Message> + Unpin,
{
    if tokio::time::timeout(limit, sink.send(Message::Close(None)))
        .await
        .is_err()
    {
        warn!("Server did not take the close frame within {:?}", limit);
    }
}

async fn run_transport(
    url: String,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    events: mpsc::UnboundedSender<NetworkEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    info!("Connecting to {}", url);

    let ws = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((ws, _)) => ws,
            Err(e) => {
                let _ = events.send(NetworkEvent::Closed(Some(e.into())));
                return;
            }
        },
        _ = &mut shutdown => {
            let _ = events.send(NetworkEvent::Closed(None));
            return;
        }
    };

    let _ = events.send(NetworkEvent::Connected);
    let (mut sink, mut stream) = ws.split();
    let mut failure = None;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Closing connection");
                send_close(&mut sink, CLOSE_TIMEOUT).await;
                break;
            }

            message = outgoing.recv() => {
                let Some(message) = message else {
                    send_close(&mut sink, CLOSE_TIMEOUT).await;
                    break;
                };
                match encode(&message) {
                    Ok(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            failure = Some(e.into());
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to encode {}: {}", message.kind(), e),
                }
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let event = match decode_server(&text) {
                        Ok(message) => NetworkEvent::Message(message),
                        Err(e) => NetworkEvent::Malformed(e),
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    failure = Some(e.into());
                    break;
                }
            },
        }
    }

    let _ = events.send(NetworkEvent::Closed(failure));
}

/// Frame loop tying input, the sync engine, the transport, audio and drawing together
pub struct Client {
    address: String,
    engine: ClientSyncEngine,
    input: InputManager,
    renderer: Renderer,
    audio: Option<AudioOutput>,
    connection: Option<Connection>,
    opening: Option<ClientMessage>,
}

impl Client {
    pub async fn new(address: &str, move_delay: Duration) -> Self {
        let audio = match AudioOutput::load(MASTER_VOLUME).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                warn!("Audio disabled: {}", e);
                None
            }
        };

        Self {
            address: address.to_string(),
            engine: ClientSyncEngine::new(),
            input: InputManager::new(move_delay),
            renderer: Renderer::new(),
            audio,
            connection: None,
            opening: None,
        }
    }

    pub async fn run(&mut self) {
        loop {
            for command in self.input.update() {
                self.handle_command(command);
            }

            self.poll_network();
            self.renderer.render(&self.engine, &self.address);

            next_frame().await;
        }
    }

    fn handle_command(&mut self, command: Command) {
        match (command, self.engine.phase()) {
            (Command::Create, ClientPhase::Disconnected) => self.connect(Role::Host),
            (Command::Join, ClientPhase::Disconnected) => self.connect(Role::Guest),
            (Command::Disconnect, ClientPhase::Disconnected) => {}
            (Command::Disconnect, _) => {
                info!("Leaving room");
                self.disconnect();
            }
            (Command::Start, ClientPhase::Lobby) => {
                if let Some(message) = self.engine.start_request() {
                    self.send(message);
                }
            }
            (Command::Move(direction), ClientPhase::Running) => {
                if let Some(request) = self.engine.request_move(direction) {
                    self.play(if request.blocked {
                        SoundEffect::Hit
                    } else {
                        SoundEffect::Move
                    });
                    self.send(request.message);
                }
            }
            _ => {}
        }
    }

    fn connect(&mut self, role: Role) {
        let url = match server_url(&self.address) {
            Ok(url) => url,
            Err(e) => {
                warn!("{}", e);
                self.engine.record_error(e.to_string());
                return;
            }
        };

        let opening = self.engine.begin_connect(role);
        match Connection::open(url) {
            Ok(connection) => {
                self.connection = Some(connection);
                self.opening = Some(opening);
            }
            Err(e) => {
                error!("{}", e);
                self.engine.on_transport_closed();
                self.engine.record_error(e.to_string());
            }
        }
    }

    fn disconnect(&mut self) {
        self.connection = None;
        self.opening = None;
        self.engine.on_transport_closed();
    }

    fn send(&self, message: ClientMessage) {
        if let Some(connection) = &self.connection {
            if !connection.send(message) {
                debug!("Transport already stopped");
            }
        }
    }

    fn play(&self, effect: SoundEffect) {
        if let Some(audio) = &self.audio {
            audio.play(effect);
        }
    }

    fn poll_network(&mut self) {
        let events = match self.connection.as_mut() {
            Some(connection) => connection.poll(),
            None => return,
        };

        for event in events {
            match event {
                NetworkEvent::Connected => {
                    if let Some(opening) = self.opening.take() {
                        self.send(opening);
                    }
                }
                NetworkEvent::Message(message) => self.apply(message),
                NetworkEvent::Malformed(e) => self.fail(e.to_string()),
                NetworkEvent::Closed(failure) => {
                    let was_active = self.engine.on_transport_closed();
                    match failure {
                        Some(e) => {
                            warn!("Connection lost ({:?}): {}", e.class(), e);
                            self.engine.record_error(e.to_string());
                        }
                        None if was_active => {
                            self.engine.record_error("Disconnected from server");
                        }
                        None => {}
                    }
                    self.connection = None;
                    return;
                }
            }

            if self.connection.is_none() {
                return;
            }
        }
    }

    fn apply(&mut self, message: ServerMessage) {
        match self.engine.apply(message) {
            Ok(events) => {
                for event in events {
                    match event {
                        ClientEvent::Finished { winner_id, local_won } => {
                            info!("{} won (local: {})", winner_id, local_won);
                            self.play(SoundEffect::Clear);
                        }
                        ClientEvent::Rejected { .. } => {
                            self.connection = None;
                            self.opening = None;
                        }
                        other => debug!("Engine event: {:?}", other),
                    }
                }
            }
            Err(e) => self.fail(e.to_string()),
        }
    }

    /// Protocol errors are fatal for the connection
    fn fail(&mut self, message: String) {
        error!("Protocol error: {}", message);
        self.disconnect();
        self.engine.record_error(message);
    }
}
