//! INDI Protocol Server (single device)
//!
//! Exposes a simulated telescope's properties to INDI control clients.
//!
//! ## Features
//!
//! - Streaming, resumable XML tokenizer with bounded buffers
//! - Device → Group → Vector → Entry property model with validation
//! - Message router for `getProperties` and `new*Vector` requests
//! - Escaped `def*Vector` / `set*Vector` serialization
//! - JSON property configuration with a built-in telescope default
//! - Single-session tokio TCP server

mod config;
mod error;
mod property;
mod protocol;
mod router;
mod serializer;
mod session;
mod server;
mod tokenizer;

pub use config::{load, load_path, load_str, ServerConfig, DEFAULT_PROPERTIES_JSON};
pub use error::{IndiError, IndiResult};
pub use property::{Device, Entry, EntryValue, Group, NumberHints, Vector};
pub use protocol::{coord_elements, standard_properties, INDI_PROTOCOL_VERSION};
pub use router::{MessageRouter, RouterStats};
pub use serializer::{serialize_definition, serialize_definitions, serialize_update};
pub use session::{EntryUpdate, IndiSession};
pub use server::IndiServer;
pub use tokenizer::{Tokenizer, XmlEvent, XmlEventSink, DEFAULT_MAX_TOKEN_LEN};

/// Default INDI server port
pub const INDI_DEFAULT_PORT: u16 = 7624;

/// Device name announced when none is configured
pub const DEFAULT_DEVICE_NAME: &str = "ESP32-Telescope";

/// INDI property types supported by this server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndiPropertyType {
    Switch,
    Number,
    Text,
}

impl IndiPropertyType {
    /// Kind name as used inside INDI tag names (`defNumberVector`, `oneText`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            IndiPropertyType::Switch => "Switch",
            IndiPropertyType::Number => "Number",
            IndiPropertyType::Text => "Text",
        }
    }
}

impl std::fmt::Display for IndiPropertyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// INDI property state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndiPropertyState {
    #[default]
    Idle,
    Ok,
    Busy,
    Alert,
}

impl IndiPropertyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndiPropertyState::Idle => "Idle",
            IndiPropertyState::Ok => "Ok",
            IndiPropertyState::Busy => "Busy",
            IndiPropertyState::Alert => "Alert",
        }
    }

    /// Parse the wire form; unknown text yields `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Idle" => Some(IndiPropertyState::Idle),
            "Ok" => Some(IndiPropertyState::Ok),
            "Busy" => Some(IndiPropertyState::Busy),
            "Alert" => Some(IndiPropertyState::Alert),
            _ => None,
        }
    }
}

/// INDI property permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndiPermission {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl IndiPermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndiPermission::ReadOnly => "ro",
            IndiPermission::WriteOnly => "wo",
            IndiPermission::ReadWrite => "rw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ro" => Some(IndiPermission::ReadOnly),
            "wo" => Some(IndiPermission::WriteOnly),
            "rw" => Some(IndiPermission::ReadWrite),
            _ => None,
        }
    }

    /// Whether clients may send `new*Vector` for this property
    pub fn is_writable(&self) -> bool {
        !matches!(self, IndiPermission::ReadOnly)
    }
}

/// Switch vector rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchRule {
    #[default]
    OneOfMany,
    AtMostOne,
    AnyOfMany,
}

impl SwitchRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchRule::OneOfMany => "OneOfMany",
            SwitchRule::AtMostOne => "AtMostOne",
            SwitchRule::AnyOfMany => "AnyOfMany",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OneOfMany" => Some(SwitchRule::OneOfMany),
            "AtMostOne" => Some(SwitchRule::AtMostOne),
            "AnyOfMany" => Some(SwitchRule::AnyOfMany),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_wire_text() {
        for state in [
            IndiPropertyState::Idle,
            IndiPropertyState::Ok,
            IndiPropertyState::Busy,
            IndiPropertyState::Alert,
        ] {
            assert_eq!(IndiPropertyState::parse(state.as_str()), Some(state));
        }
        assert_eq!(IndiPropertyState::parse("ok"), None);
    }

    #[test]
    fn test_permission_parsing() {
        assert_eq!(IndiPermission::parse("RO"), Some(IndiPermission::ReadOnly));
        assert_eq!(IndiPermission::parse("rw"), Some(IndiPermission::ReadWrite));
        assert_eq!(IndiPermission::parse("x"), None);
        assert!(!IndiPermission::ReadOnly.is_writable());
        assert!(IndiPermission::WriteOnly.is_writable());
    }

    #[test]
    fn test_switch_rule_default() {
        assert_eq!(SwitchRule::default(), SwitchRule::OneOfMany);
        assert_eq!(SwitchRule::parse("AtMostOne"), Some(SwitchRule::AtMostOne));
    }
}
