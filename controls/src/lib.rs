//! Path-addressed remote controls for audio-visual work.
//!
//! A [`Panel`] owns the visual side of a control tree ([`Receiver`] nodes) and
//! a [`Timeline`] that automates it. A [`Controller`] mirrors the same tree
//! with [`Sender`] nodes and turns user actions into signals. The two talk
//! over any [`Transport`]: an in-process [`WindowTransport`] or the WebSocket
//! broker bindings.

pub mod controller;
pub mod error;
pub mod panel;
pub mod receiver;
pub mod registry;
pub mod routing;
pub mod sender;
pub mod state;
pub mod timeline;
pub mod transport;

pub use controller::Controller;
pub use error::{ControlError, Result};
pub use panel::{spawn_driver, Panel};
pub use receiver::Receiver;
pub use registry::Registry;
pub use sender::Sender;
pub use state::ControlState;
pub use timeline::{FrameLoop, Timeline, TimelineClient, TimelineOptions};
pub use transport::{
    BrokerOptions, BrokerReceiverClient, BrokerSenderClient, ConnectionState, PanelTransport,
    Transport, Window, WindowTransport,
};

pub use av_controls_types as types;
