//! Broker state: connections, their roles and the panels they host.

use crate::error::BrokerError;
use av_controls_types::{
    BrokerMessage, Message, PanelSummary, RootSpecification, StatsResponse,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// What a connection registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unregistered,
    Receiver,
    Sender,
}

struct Connection {
    role: Role,
    outbox: mpsc::Sender<BrokerMessage>,
    /// Panel a sender is attached to
    chosen: Option<String>,
}

struct PanelEntry {
    owner: ConnectionId,
    root_specification: RootSpecification,
}

#[derive(Default)]
struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    panels: BTreeMap<String, PanelEntry>,
}

impl Registry {
    fn deliver(&self, to: &ConnectionId, message: BrokerMessage) {
        let Some(connection) = self.connections.get(to) else {
            return;
        };
        match connection.outbox.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(message)) => {
                warn!(
                    "Outbox of {} is full, dropping: {}",
                    to,
                    message.description()
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Connection {} already closed", to);
            }
        }
    }

    fn panel_list(&self) -> BrokerMessage {
        BrokerMessage::PanelList {
            panel_ids: self.panels.keys().cloned().collect(),
        }
    }

    fn broadcast_panel_list(&self) {
        let list = self.panel_list();
        for (id, connection) in &self.connections {
            if connection.role == Role::Sender {
                self.deliver(id, list.clone());
            }
        }
    }

    fn senders_of<'a>(&'a self, panel_id: &'a str) -> impl Iterator<Item = &'a ConnectionId> + 'a {
        self.connections
            .iter()
            .filter(move |(_, c)| c.role == Role::Sender && c.chosen.as_deref() == Some(panel_id))
            .map(|(id, _)| id)
    }

    fn summary(&self, id: &str, entry: &PanelEntry) -> PanelSummary {
        PanelSummary {
            id: id.to_string(),
            name: entry.root_specification.name.clone(),
            version: entry.root_specification.version,
            senders: self.senders_of(id).count(),
        }
    }
}

/// Specification of a panel, as a sender receives it after choosing.
fn specification_for(panel_id: &str, entry: &PanelEntry) -> BrokerMessage {
    BrokerMessage::WrappedMessage {
        panel_id: panel_id.to_string(),
        message: Message::ControllerSpecification(entry.root_specification.clone()),
    }
}

/// Shared broker state.
#[derive(Clone)]
pub struct BrokerState {
    inner: Arc<BrokerStateInner>,
}

struct BrokerStateInner {
    registry: RwLock<Registry>,
    channel_capacity: usize,
    ping_interval: Duration,
}

impl BrokerState {
    pub fn new(channel_capacity: usize, ping_interval: Duration) -> Self {
        Self {
            inner: Arc::new(BrokerStateInner {
                registry: RwLock::new(Registry::default()),
                channel_capacity: channel_capacity.max(1),
                ping_interval,
            }),
        }
    }

    pub fn ping_interval(&self) -> Duration {
        self.inner.ping_interval
    }

    /// Track a new connection. Messages for it arrive on the returned channel.
    pub async fn connect(&self) -> (ConnectionId, mpsc::Receiver<BrokerMessage>) {
        let id = Uuid::new_v4();
        let (outbox, rx) = mpsc::channel(self.inner.channel_capacity);
        self.inner.registry.write().await.connections.insert(
            id,
            Connection {
                role: Role::Unregistered,
                outbox,
                chosen: None,
            },
        );
        debug!("Connection {} opened", id);
        (id, rx)
    }

    /// Forget a connection and every panel it hosted.
    pub async fn disconnect(&self, id: &ConnectionId) {
        let mut registry = self.inner.registry.write().await;
        let Some(connection) = registry.connections.remove(id) else {
            return;
        };

        let owned: Vec<String> = registry
            .panels
            .iter()
            .filter(|(_, entry)| entry.owner == *id)
            .map(|(panel_id, _)| panel_id.clone())
            .collect();
        for panel_id in &owned {
            registry.panels.remove(panel_id);
            info!("Panel '{}' removed with its receiver", panel_id);
        }
        for connection in registry.connections.values_mut() {
            if connection
                .chosen
                .as_ref()
                .is_some_and(|chosen| owned.contains(chosen))
            {
                connection.chosen = None;
            }
        }
        if !owned.is_empty() {
            registry.broadcast_panel_list();
        }
        info!("{:?} connection {} closed", connection.role, id);
    }

    /// Apply one message from connection `from`.
    pub async fn handle(&self, from: &ConnectionId, message: BrokerMessage) -> Result<(), BrokerError> {
        trace!("From {}: {}", from, message.description());
        let mut registry = self.inner.registry.write().await;
        let role = registry
            .connections
            .get(from)
            .map(|c| c.role)
            .ok_or_else(|| BrokerError::Unexpected("message from closed connection".to_string()))?;

        match message {
            BrokerMessage::RegisterReceiver => {
                set_role(&mut registry, from, Role::Receiver);
                info!("Connection {} registered as receiver", from);
                Ok(())
            }
            BrokerMessage::RegisterSender => {
                set_role(&mut registry, from, Role::Sender);
                info!("Connection {} registered as sender", from);
                let list = registry.panel_list();
                registry.deliver(from, list);
                Ok(())
            }
            BrokerMessage::AddNetPanel {
                id,
                root_specification,
            } => {
                if role != Role::Receiver {
                    return Err(BrokerError::WrongRole {
                        expected: "receiver",
                        action: "add-net-panel",
                    });
                }
                if let Some(previous) = registry.panels.get(&id) {
                    if previous.owner != *from {
                        warn!("Panel '{}' taken over by connection {}", id, from);
                    }
                }
                let entry = PanelEntry {
                    owner: *from,
                    root_specification,
                };
                // senders still attached from before a reconnect get the new tree
                let attached: Vec<ConnectionId> = registry.senders_of(&id).copied().collect();
                for sender in &attached {
                    registry.deliver(sender, specification_for(&id, &entry));
                }
                registry.panels.insert(id.clone(), entry);
                info!("Panel '{}' added", id);
                registry.broadcast_panel_list();
                Ok(())
            }
            BrokerMessage::ChoosePanel { panel_id } => {
                if role != Role::Sender {
                    return Err(BrokerError::WrongRole {
                        expected: "sender",
                        action: "choose-panel",
                    });
                }
                let Some(entry) = registry.panels.get(&panel_id) else {
                    return Err(BrokerError::PanelNotFound(panel_id));
                };
                let spec = specification_for(&panel_id, entry);
                if let Some(connection) = registry.connections.get_mut(from) {
                    connection.chosen = Some(panel_id.clone());
                }
                registry.deliver(from, spec);
                info!("Sender {} chose panel '{}'", from, panel_id);
                Ok(())
            }
            BrokerMessage::WrappedMessage { panel_id, message } => match role {
                Role::Sender => {
                    let chosen = registry.connections.get(from).and_then(|c| c.chosen.clone());
                    if chosen.as_deref() != Some(panel_id.as_str()) {
                        return Err(BrokerError::NotChosen(panel_id));
                    }
                    let owner = registry
                        .panels
                        .get(&panel_id)
                        .map(|entry| entry.owner)
                        .ok_or_else(|| BrokerError::PanelNotFound(panel_id.clone()))?;
                    registry.deliver(&owner, BrokerMessage::WrappedMessage { panel_id, message });
                    Ok(())
                }
                Role::Receiver => {
                    match registry.panels.get(&panel_id) {
                        Some(entry) if entry.owner == *from => {}
                        Some(_) => return Err(BrokerError::NotOwner(panel_id)),
                        None => return Err(BrokerError::PanelNotFound(panel_id)),
                    }
                    let senders: Vec<ConnectionId> =
                        registry.senders_of(&panel_id).copied().collect();
                    let wrapped = BrokerMessage::WrappedMessage { panel_id, message };
                    for sender in &senders {
                        registry.deliver(sender, wrapped.clone());
                    }
                    Ok(())
                }
                Role::Unregistered => Err(BrokerError::WrongRole {
                    expected: "registered",
                    action: "wrapped-message",
                }),
            },
            BrokerMessage::PanelList { .. } => Err(BrokerError::Unexpected(message.description())),
        }
    }

    pub async fn panels(&self) -> Vec<PanelSummary> {
        let registry = self.inner.registry.read().await;
        registry
            .panels
            .iter()
            .map(|(id, entry)| registry.summary(id, entry))
            .collect()
    }

    pub async fn panel(&self, id: &str) -> Option<(PanelSummary, RootSpecification)> {
        let registry = self.inner.registry.read().await;
        let entry = registry.panels.get(id)?;
        Some((registry.summary(id, entry), entry.root_specification.clone()))
    }

    pub async fn stats(&self) -> StatsResponse {
        let registry = self.inner.registry.read().await;
        let mut stats = StatsResponse {
            panels: registry.panels.len(),
            ..Default::default()
        };
        for connection in registry.connections.values() {
            match connection.role {
                Role::Receiver => stats.receivers += 1,
                Role::Sender => stats.senders += 1,
                Role::Unregistered => stats.unregistered += 1,
            }
        }
        stats
    }
}

impl Default for BrokerState {
    fn default() -> Self {
        Self::new(256, Duration::from_secs(15))
    }
}

fn set_role(registry: &mut Registry, id: &ConnectionId, role: Role) {
    if let Some(connection) = registry.connections.get_mut(id) {
        if connection.role != Role::Unregistered && connection.role != role {
            warn!("Connection {} changes role to {:?}", id, role);
        }
        connection.role = role;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use av_controls_types::{RootSpecification, Spec};
    use serde_json::json;

    fn root(name: &str) -> RootSpecification {
        let spec = Spec::from_value(json!({"type": "group", "name": name, "controlSpecs": {}})).unwrap();
        RootSpecification::new(name, spec)
    }

    async fn receiver(state: &BrokerState) -> (ConnectionId, mpsc::Receiver<BrokerMessage>) {
        let (id, rx) = state.connect().await;
        state.handle(&id, BrokerMessage::RegisterReceiver).await.unwrap();
        (id, rx)
    }

    async fn sender(state: &BrokerState) -> (ConnectionId, mpsc::Receiver<BrokerMessage>) {
        let (id, rx) = state.connect().await;
        state.handle(&id, BrokerMessage::RegisterSender).await.unwrap();
        (id, rx)
    }

    #[tokio::test]
    async fn test_sender_gets_panel_list_on_register() {
        let state = BrokerState::default();
        let (rid, _rrx) = receiver(&state).await;
        state
            .handle(
                &rid,
                BrokerMessage::AddNetPanel {
                    id: "stage".to_string(),
                    root_specification: root("stage"),
                },
            )
            .await
            .unwrap();

        let (_sid, mut srx) = sender(&state).await;
        assert_eq!(
            srx.recv().await.unwrap(),
            BrokerMessage::PanelList {
                panel_ids: vec!["stage".to_string()]
            }
        );
    }

    #[tokio::test]
    async fn test_routing_between_sender_and_panel() {
        let state = BrokerState::default();
        let (rid, mut rrx) = receiver(&state).await;
        let (sid, mut srx) = sender(&state).await;
        srx.recv().await.unwrap(); // empty list

        state
            .handle(
                &rid,
                BrokerMessage::AddNetPanel {
                    id: "stage".to_string(),
                    root_specification: root("stage"),
                },
            )
            .await
            .unwrap();
        assert!(matches!(srx.recv().await.unwrap(), BrokerMessage::PanelList { panel_ids } if panel_ids == ["stage"]));

        // not attached yet
        let nudge = BrokerMessage::WrappedMessage {
            panel_id: "stage".to_string(),
            message: Message::Nudge,
        };
        assert!(matches!(
            state.handle(&sid, nudge.clone()).await,
            Err(BrokerError::NotChosen(_))
        ));

        state
            .handle(
                &sid,
                BrokerMessage::ChoosePanel {
                    panel_id: "stage".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            srx.recv().await.unwrap(),
            BrokerMessage::WrappedMessage {
                panel_id: "stage".to_string(),
                message: Message::ControllerSpecification(root("stage")),
            }
        );

        state.handle(&sid, nudge.clone()).await.unwrap();
        assert_eq!(rrx.recv().await.unwrap(), nudge);

        let ready = BrokerMessage::WrappedMessage {
            panel_id: "stage".to_string(),
            message: Message::Ready,
        };
        state.handle(&rid, ready.clone()).await.unwrap();
        assert_eq!(srx.recv().await.unwrap(), ready);
        assert_eq!(state.panels().await[0].senders, 1);
    }

    #[tokio::test]
    async fn test_receiver_disconnect_drops_panels() {
        let state = BrokerState::default();
        let (rid, _rrx) = receiver(&state).await;
        let (sid, mut srx) = sender(&state).await;
        state
            .handle(
                &rid,
                BrokerMessage::AddNetPanel {
                    id: "stage".to_string(),
                    root_specification: root("stage"),
                },
            )
            .await
            .unwrap();
        state
            .handle(
                &sid,
                BrokerMessage::ChoosePanel {
                    panel_id: "stage".to_string(),
                },
            )
            .await
            .unwrap();

        state.disconnect(&rid).await;
        assert!(state.panels().await.is_empty());

        let mut last = None;
        while let Ok(message) = srx.try_recv() {
            last = Some(message);
        }
        assert_eq!(last, Some(BrokerMessage::PanelList { panel_ids: vec![] }));
        assert_eq!(state.stats().await.senders, 1);
    }

    #[tokio::test]
    async fn test_roles_are_enforced() {
        let state = BrokerState::default();
        let (sid, _srx) = sender(&state).await;
        let err = state
            .handle(
                &sid,
                BrokerMessage::AddNetPanel {
                    id: "x".to_string(),
                    root_specification: root("x"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::WrongRole { .. }));

        let err = state
            .handle(
                &sid,
                BrokerMessage::ChoosePanel {
                    panel_id: "missing".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::PanelNotFound(_)));
    }
}
