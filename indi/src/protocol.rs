//! INDI XML Protocol definitions

use crate::IndiPropertyType;

/// INDI protocol version
pub const INDI_PROTOCOL_VERSION: &str = "1.7";

/// Top-level request tag asking for all definitions
pub const GET_PROPERTIES: &str = "getProperties";

/// Top-level message kinds the server reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    GetProperties,
    NewVector(IndiPropertyType),
}

impl MessageKind {
    /// Classify a top-level tag name. A single trailing `/` (self-closing
    /// form, which the tokenizer leaves in the name) is ignored.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.strip_suffix('/').unwrap_or(tag);
        match tag {
            GET_PROPERTIES => Some(MessageKind::GetProperties),
            "newSwitchVector" => Some(MessageKind::NewVector(IndiPropertyType::Switch)),
            "newNumberVector" => Some(MessageKind::NewVector(IndiPropertyType::Number)),
            "newTextVector" => Some(MessageKind::NewVector(IndiPropertyType::Text)),
            _ => None,
        }
    }
}

/// `def<Kind>Vector`
pub fn def_vector_tag(kind: IndiPropertyType) -> &'static str {
    match kind {
        IndiPropertyType::Switch => "defSwitchVector",
        IndiPropertyType::Number => "defNumberVector",
        IndiPropertyType::Text => "defTextVector",
    }
}

/// `def<Kind>`
pub fn def_element_tag(kind: IndiPropertyType) -> &'static str {
    match kind {
        IndiPropertyType::Switch => "defSwitch",
        IndiPropertyType::Number => "defNumber",
        IndiPropertyType::Text => "defText",
    }
}

/// `set<Kind>Vector`
pub fn set_vector_tag(kind: IndiPropertyType) -> &'static str {
    match kind {
        IndiPropertyType::Switch => "setSwitchVector",
        IndiPropertyType::Number => "setNumberVector",
        IndiPropertyType::Text => "setTextVector",
    }
}

/// `new<Kind>Vector`
pub fn new_vector_tag(kind: IndiPropertyType) -> &'static str {
    match kind {
        IndiPropertyType::Switch => "newSwitchVector",
        IndiPropertyType::Number => "newNumberVector",
        IndiPropertyType::Text => "newTextVector",
    }
}

/// `one<Kind>`, the child element of both `new*Vector` and `set*Vector`
pub fn one_element_tag(kind: IndiPropertyType) -> &'static str {
    match kind {
        IndiPropertyType::Switch => "oneSwitch",
        IndiPropertyType::Number => "oneNumber",
        IndiPropertyType::Text => "oneText",
    }
}

/// Standard INDI properties
pub mod standard_properties {
    /// Connection control switch
    pub const CONNECTION: &str = "CONNECTION";
    pub const CONNECT: &str = "CONNECT";
    pub const DISCONNECT: &str = "DISCONNECT";

    /// Driver identification texts
    pub const DRIVER_INFO: &str = "DRIVER_INFO";
    pub const DRIVER_NAME: &str = "DRIVER_NAME";
    pub const DRIVER_EXEC: &str = "DRIVER_EXEC";
    pub const DRIVER_VERSION: &str = "DRIVER_VERSION";

    // Mount properties
    pub const EQUATORIAL_EOD_COORD: &str = "EQUATORIAL_EOD_COORD";
    pub const ON_COORD_SET: &str = "ON_COORD_SET";
    pub const TELESCOPE_ABORT_MOTION: &str = "TELESCOPE_ABORT_MOTION";
}

/// Common coordinate elements
pub mod coord_elements {
    pub const RA: &str = "RA";
    pub const DEC: &str = "DEC";
}
