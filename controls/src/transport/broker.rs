//! WebSocket broker binding.
//!
//! Receivers register, announce their panels and get one [`PanelTransport`]
//! per panel. Senders register, pick a panel from the broker's panel list and
//! then exchange `wrapped-message` frames with it.
//!
//! Outgoing frames go through a bounded queue that is flushed whenever the
//! socket is writable. While the connection is down the queue keeps the most
//! recent frames and drops the oldest.

use super::{ConnectionState, Listener, Listeners, Transport};
use crate::error::{ControlError, Result};
use av_controls_types::{BrokerMessage, Message, RootSpecification, DEFAULT_BROKER_PORT};
use futures_util::{SinkExt, StreamExt};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Client-side broker settings.
#[derive(Debug, Clone)]
pub struct BrokerOptions {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:8090/ws`
    pub url: String,
    pub auto_reconnect: bool,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    /// Frames kept while disconnected (or before a panel is chosen)
    pub queue_capacity: usize,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            url: format!("ws://127.0.0.1:{}/ws", DEFAULT_BROKER_PORT),
            auto_reconnect: true,
            reconnect_interval: Duration::from_millis(3000),
            max_reconnect_attempts: 10,
            queue_capacity: 256,
        }
    }
}

impl BrokerOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

/// Bounded FIFO of serialized frames waiting for the socket.
struct Outbox {
    queue: Mutex<VecDeque<String>>,
    capacity: usize,
    notify: Notify,
}

impl Outbox {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            notify: Notify::new(),
        }
    }

    fn push(&self, message: &BrokerMessage) -> Result<()> {
        let frame = serde_json::to_string(message)?;
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity {
                queue.pop_front();
                warn!(
                    "Broker queue full ({} frames), dropping oldest",
                    self.capacity
                );
            }
            queue.push_back(frame);
        }
        self.notify.notify_one();
        Ok(())
    }

    fn pop(&self) -> Option<String> {
        self.queue.lock().pop_front()
    }

    fn requeue(&self, frame: String) {
        self.queue.lock().push_front(frame);
    }

    fn len(&self) -> usize {
        self.queue.lock().len()
    }
}

type OnOpen = Arc<dyn Fn() -> Vec<BrokerMessage> + Send + Sync>;
type OnMessage = Arc<dyn Fn(BrokerMessage) + Send + Sync>;

/// A socket plus the task that keeps it alive.
struct Connection {
    outbox: Arc<Outbox>,
    state: Arc<Mutex<ConnectionState>>,
    task: JoinHandle<()>,
}

impl Connection {
    /// Connect once. A failure here is returned to the caller; later
    /// disconnects are handled by the reconnect loop and only logged.
    async fn open(
        options: BrokerOptions,
        outbox: Arc<Outbox>,
        on_open: OnOpen,
        on_message: OnMessage,
    ) -> Result<Self> {
        info!("Connecting to broker: {}", options.url);
        let (stream, _) = connect_async(options.url.as_str()).await.map_err(|e| {
            ControlError::Communication(format!("Failed to connect to {}: {}", options.url, e))
        })?;
        info!("Connected to broker");

        let state = Arc::new(Mutex::new(ConnectionState::Connected));
        let task = tokio::spawn(connection_loop(
            stream,
            options,
            outbox.clone(),
            on_open,
            on_message,
            state.clone(),
        ));
        Ok(Self {
            outbox,
            state,
            task,
        })
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn connection_loop(
    mut stream: WsStream,
    options: BrokerOptions,
    outbox: Arc<Outbox>,
    on_open: OnOpen,
    on_message: OnMessage,
    state: Arc<Mutex<ConnectionState>>,
) {
    loop {
        *state.lock() = ConnectionState::Connected;
        run_session(stream, &outbox, &on_open, &on_message).await;
        *state.lock() = ConnectionState::Disconnected;

        if !options.auto_reconnect {
            info!("Broker connection closed");
            return;
        }

        let mut attempt = 0u32;
        stream = loop {
            attempt += 1;
            if attempt > options.max_reconnect_attempts {
                error!(
                    "Giving up on broker after {} reconnection attempts",
                    options.max_reconnect_attempts
                );
                *state.lock() = ConnectionState::Disconnected;
                return;
            }
            *state.lock() = ConnectionState::Reconnecting { attempt };
            info!(
                "Waiting {}ms before reconnection attempt {}...",
                options.reconnect_interval.as_millis(),
                attempt
            );
            tokio::time::sleep(options.reconnect_interval).await;

            match connect_async(options.url.as_str()).await {
                Ok((stream, _)) => {
                    info!("Reconnected to broker ({} frames queued)", outbox.len());
                    break stream;
                }
                Err(e) => warn!("Reconnection attempt {} failed: {}", attempt, e),
            }
        };
    }
}

/// Drive one socket until it closes or errors.
async fn run_session(stream: WsStream, outbox: &Outbox, on_open: &OnOpen, on_message: &OnMessage) {
    let (mut write, mut read) = stream.split();

    for message in on_open() {
        let frame = match serde_json::to_string(&message) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize {}: {}", message.description(), e);
                continue;
            }
        };
        if let Err(e) = write.send(WsMessage::text(frame)).await {
            error!("Failed to send registration: {}", e);
            return;
        }
    }

    loop {
        while let Some(frame) = outbox.pop() {
            if let Err(e) = write.send(WsMessage::text(frame.clone())).await {
                error!("WebSocket send error: {}", e);
                outbox.requeue(frame);
                return;
            }
        }

        tokio::select! {
            incoming = read.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    trace!("Received broker frame: {}", text);
                    match serde_json::from_str::<BrokerMessage>(&text) {
                        Ok(message) => on_message(message),
                        Err(e) => warn!("Failed to parse broker frame: {}", e),
                    }
                }
                Some(Ok(WsMessage::Close(_))) => {
                    info!("WebSocket closed by broker");
                    return;
                }
                Some(Ok(_)) => {
                    // Ping/pong is answered by tungstenite itself
                }
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    return;
                }
                None => return,
            },
            _ = outbox.notify.notified() => {}
        }
    }
}

/// Connection hosting one or more panels.
pub struct BrokerReceiverClient {
    connection: Connection,
    panels: Arc<Mutex<IndexMap<String, RootSpecification>>>,
    listeners: Arc<Mutex<HashMap<String, Listeners>>>,
}

impl BrokerReceiverClient {
    pub async fn connect(options: BrokerOptions) -> Result<Self> {
        let outbox = Arc::new(Outbox::new(options.queue_capacity));
        let panels: Arc<Mutex<IndexMap<String, RootSpecification>>> = Arc::default();
        let listeners: Arc<Mutex<HashMap<String, Listeners>>> = Arc::default();

        let registered = panels.clone();
        let on_open: OnOpen = Arc::new(move || {
            let mut messages = vec![BrokerMessage::RegisterReceiver];
            messages.extend(registered.lock().iter().map(|(id, root)| {
                BrokerMessage::AddNetPanel {
                    id: id.clone(),
                    root_specification: root.clone(),
                }
            }));
            messages
        });

        let routes = listeners.clone();
        let on_message: OnMessage = Arc::new(move |message| match message {
            BrokerMessage::WrappedMessage { panel_id, message } => {
                let target = routes.lock().get(&panel_id).cloned();
                match target {
                    Some(listeners) => listeners.dispatch(&message),
                    None => warn!("Message for unknown panel '{}'", panel_id),
                }
            }
            other => debug!("Ignoring broker message: {}", other.description()),
        });

        let connection = Connection::open(options, outbox, on_open, on_message).await?;
        Ok(Self {
            connection,
            panels,
            listeners,
        })
    }

    /// Announce a panel and get the transport that talks to its senders.
    pub fn add_panel(
        &self,
        panel_id: impl Into<String>,
        root_specification: RootSpecification,
    ) -> Result<Arc<PanelTransport>> {
        let panel_id = panel_id.into();
        self.panels
            .lock()
            .insert(panel_id.clone(), root_specification.clone());
        let listeners = self
            .listeners
            .lock()
            .entry(panel_id.clone())
            .or_default()
            .clone();

        self.connection.outbox.push(&BrokerMessage::AddNetPanel {
            id: panel_id.clone(),
            root_specification,
        })?;
        info!("Announced panel '{}'", panel_id);

        Ok(Arc::new(PanelTransport {
            panel_id,
            outbox: self.connection.outbox.clone(),
            listeners,
        }))
    }

    pub fn panel_ids(&self) -> Vec<String> {
        self.panels.lock().keys().cloned().collect()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }
}

/// One panel's view of a [`BrokerReceiverClient`].
pub struct PanelTransport {
    panel_id: String,
    outbox: Arc<Outbox>,
    listeners: Listeners,
}

impl PanelTransport {
    pub fn panel_id(&self) -> &str {
        &self.panel_id
    }
}

impl Transport for PanelTransport {
    fn send(&self, message: Message) -> Result<()> {
        self.outbox.push(&BrokerMessage::WrappedMessage {
            panel_id: self.panel_id.clone(),
            message,
        })
    }

    fn add_listener(&self, listener: Listener) {
        self.listeners.push(listener);
    }
}

/// Picks a panel from the broker's list. `None` keeps waiting for the next list.
pub type PanelChooser = Box<dyn Fn(&[String]) -> Option<String> + Send + Sync>;

struct SenderShared {
    outbox: Arc<Outbox>,
    chosen: Mutex<Option<String>>,
    panel_ids: Mutex<Vec<String>>,
    pending: Mutex<VecDeque<Message>>,
    capacity: usize,
    listeners: Listeners,
    chooser: PanelChooser,
}

impl SenderShared {
    fn choose(&self, panel_id: String) -> Result<()> {
        let mut chosen = self.chosen.lock();
        info!("Choosing panel '{}'", panel_id);
        self.outbox.push(&BrokerMessage::ChoosePanel {
            panel_id: panel_id.clone(),
        })?;
        let pending: Vec<Message> = self.pending.lock().drain(..).collect();
        for message in pending {
            self.outbox.push(&BrokerMessage::WrappedMessage {
                panel_id: panel_id.clone(),
                message,
            })?;
        }
        *chosen = Some(panel_id);
        Ok(())
    }

    fn handle(&self, message: BrokerMessage) {
        match message {
            BrokerMessage::PanelList { panel_ids } => {
                debug!("Broker lists {} panel(s)", panel_ids.len());
                *self.panel_ids.lock() = panel_ids.clone();

                let current = self.chosen.lock().clone();
                if let Some(current) = &current {
                    if panel_ids.contains(current) {
                        return;
                    }
                    warn!("Panel '{}' is gone", current);
                    *self.chosen.lock() = None;
                }
                if let Some(panel_id) = (self.chooser)(&panel_ids) {
                    if let Err(e) = self.choose(panel_id) {
                        warn!("Failed to choose panel: {}", e);
                    }
                }
            }
            BrokerMessage::WrappedMessage { panel_id, message } => {
                if self.chosen.lock().as_deref() == Some(panel_id.as_str()) {
                    self.listeners.dispatch(&message);
                } else {
                    trace!("Ignoring message from panel '{}'", panel_id);
                }
            }
            other => debug!("Ignoring broker message: {}", other.description()),
        }
    }
}

/// Connection controlling one panel at a time.
pub struct BrokerSenderClient {
    connection: Connection,
    shared: Arc<SenderShared>,
}

impl BrokerSenderClient {
    pub async fn connect(
        options: BrokerOptions,
        chooser: impl Fn(&[String]) -> Option<String> + Send + Sync + 'static,
    ) -> Result<Self> {
        let outbox = Arc::new(Outbox::new(options.queue_capacity));
        let shared = Arc::new(SenderShared {
            outbox: outbox.clone(),
            chosen: Mutex::new(None),
            panel_ids: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
            capacity: options.queue_capacity.max(1),
            listeners: Listeners::default(),
            chooser: Box::new(chooser),
        });

        let reopen = shared.clone();
        let on_open: OnOpen = Arc::new(move || {
            let mut messages = vec![BrokerMessage::RegisterSender];
            if let Some(panel_id) = reopen.chosen.lock().clone() {
                messages.push(BrokerMessage::ChoosePanel { panel_id });
            }
            messages
        });
        let handler = shared.clone();
        let on_message: OnMessage = Arc::new(move |message| handler.handle(message));

        let connection = Connection::open(options, outbox, on_open, on_message).await?;
        Ok(Self { connection, shared })
    }

    /// Attach to a panel explicitly, bypassing the chooser.
    pub fn choose_panel(&self, panel_id: impl Into<String>) -> Result<()> {
        self.shared.choose(panel_id.into())
    }

    pub fn chosen_panel(&self) -> Option<String> {
        self.shared.chosen.lock().clone()
    }

    /// Panels in the last list received from the broker.
    pub fn panel_ids(&self) -> Vec<String> {
        self.shared.panel_ids.lock().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }
}

impl Transport for BrokerSenderClient {
    fn send(&self, message: Message) -> Result<()> {
        let chosen = self.shared.chosen.lock();
        match chosen.as_ref() {
            Some(panel_id) => self.shared.outbox.push(&BrokerMessage::WrappedMessage {
                panel_id: panel_id.clone(),
                message,
            }),
            None => {
                let mut pending = self.shared.pending.lock();
                if pending.len() >= self.shared.capacity {
                    pending.pop_front();
                    warn!("No panel chosen yet, dropping oldest queued message");
                }
                pending.push_back(message);
                Ok(())
            }
        }
    }

    fn add_listener(&self, listener: Listener) {
        self.shared.listeners.push(listener);
    }
}
