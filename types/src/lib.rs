//! Shared wire types for the AV Controls protocol.
//!
//! This crate contains the data model exchanged between the visual side
//! (panels), the controller side and the WebSocket broker: control specs,
//! tree paths, nested message envelopes, protocol messages and timeline
//! automation state.

/// Default port for the broker server.
pub const DEFAULT_BROKER_PORT: u16 = 8090;

/// Version tag carried by every `controller-specification` message.
pub const PROTOCOL_VERSION: u32 = 1;

pub mod api;
pub mod broker;
pub mod envelope;
pub mod messages;
pub mod path;
pub mod spec;
pub mod timeline;

// Re-export commonly used types
pub use api::{ErrorResponse, PanelListResponse, PanelResponse, PanelSummary, StatsResponse};
pub use broker::BrokerMessage;
pub use envelope::Envelope;
pub use messages::{Message, RootSpecification};
pub use path::ControlPath;
pub use spec::{
    BaseArgs, ControlType, Dot, DotsSpec, GroupSpec, JoystickSpec, LabelPosition, LabelSpec,
    ModalSpec, PlainSpec, Position, PresetButtonSpec, RangeSpec, SelectorSpec, Spec, SpecsDict,
    SpecParseError, SwitchSpec, TabsSpec, TextboxSpec, UnknownControlType,
};
pub use timeline::{
    PointKind, TimelineControl, TimelineEdit, TimelineLane, TimelinePoint, TimelineState,
};
