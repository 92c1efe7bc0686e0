//! Property configuration and server settings
//!
//! The property document maps group names to switch/number/text vector
//! definitions:
//!
//! ```json
//! { "Main": { "NumberVector": [ { "name": "EQ_COORD", "label": "Eq Coord",
//!     "numbers": [ { "name": "RA", "label": "RA", "value": 0 } ] } ] } }
//! ```
//!
//! Group order follows the document. Inside a group, switch vectors are
//! declared first, then number vectors, then text vectors.

use crate::error::{IndiError, IndiResult};
use crate::property::{Device, Entry, EntryValue, Group, NumberHints, Vector};
use crate::tokenizer::DEFAULT_MAX_TOKEN_LEN;
use crate::{
    IndiPermission, IndiPropertyState, IndiPropertyType, SwitchRule, DEFAULT_DEVICE_NAME,
    INDI_DEFAULT_PORT,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Built-in simulated telescope used when no property file is given
pub const DEFAULT_PROPERTIES_JSON: &str = r#"{
  "Main Control": {
    "SwitchVector": [
      { "name": "CONNECTION", "label": "Connection", "Switches": [
          { "name": "CONNECT", "label": "Connect", "value": "Off" },
          { "name": "DISCONNECT", "label": "Disconnect", "value": "On" } ] },
      { "name": "ON_COORD_SET", "label": "On Set", "Switches": [
          { "name": "TRACK", "label": "Track", "value": "On" },
          { "name": "SLEW", "label": "Slew", "value": "Off" },
          { "name": "SYNC", "label": "Sync", "value": "Off" } ] },
      { "name": "TELESCOPE_ABORT_MOTION", "label": "Abort Motion", "rule": "AtMostOne", "Switches": [
          { "name": "ABORT", "label": "Abort", "value": "Off" } ] }
    ],
    "NumberVector": [
      { "name": "EQUATORIAL_EOD_COORD", "label": "Eq. Coordinates", "numbers": [
          { "name": "RA", "label": "RA (hh:mm:ss)", "value": 0,
            "format": "%010.6m", "min": 0, "max": 24, "step": 0 },
          { "name": "DEC", "label": "DEC (dd:mm:ss)", "value": 0,
            "format": "%010.6m", "min": -90, "max": 90, "step": 0 } ] }
    ]
  },
  "General Info": {
    "TextVector": [
      { "name": "DRIVER_INFO", "label": "Driver Info", "texts": [
          { "name": "DRIVER_NAME", "label": "Name", "value": "ESP32 Telescope" },
          { "name": "DRIVER_EXEC", "label": "Exec", "value": "indi-telescope" },
          { "name": "DRIVER_VERSION", "label": "Version", "value": "0.1" } ] }
    ]
  }
}"#;

#[derive(Debug, Deserialize)]
struct GroupConfig {
    #[serde(rename = "SwitchVector", default)]
    switch_vectors: Vec<SwitchVectorConfig>,
    #[serde(rename = "NumberVector", default)]
    number_vectors: Vec<NumberVectorConfig>,
    #[serde(rename = "TextVector", default)]
    text_vectors: Vec<TextVectorConfig>,
}

/// Attributes shared by all vector kinds
#[derive(Debug, Deserialize)]
struct VectorHeader {
    name: String,
    label: Option<String>,
    perm: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SwitchVectorConfig {
    #[serde(flatten)]
    header: VectorHeader,
    rule: Option<String>,
    #[serde(rename = "Switches")]
    switches: Vec<EntryConfig<String>>,
}

#[derive(Debug, Deserialize)]
struct NumberVectorConfig {
    #[serde(flatten)]
    header: VectorHeader,
    numbers: Vec<NumberEntryConfig>,
}

#[derive(Debug, Deserialize)]
struct TextVectorConfig {
    #[serde(flatten)]
    header: VectorHeader,
    texts: Vec<EntryConfig<String>>,
}

/// Number entry with optional display hints
#[derive(Debug, Deserialize)]
struct NumberEntryConfig {
    name: String,
    label: Option<String>,
    value: f64,
    format: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
    step: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EntryConfig<T> {
    name: String,
    label: Option<String>,
    value: T,
}

/// Build the device tree from an already-parsed property document
pub fn load(device_name: &str, config: &Value) -> IndiResult<Device> {
    let root: &Map<String, Value> = config
        .as_object()
        .ok_or_else(|| IndiError::Config("Property document must be a JSON object".to_string()))?;

    let mut groups = Vec::with_capacity(root.len());
    for (group_name, group_value) in root {
        let group: GroupConfig = serde_json::from_value(group_value.clone())
            .map_err(|e| IndiError::Config(format!("Group '{}': {}", group_name, e)))?;
        groups.push(build_group(group_name, group)?);
    }

    Device::new(device_name, groups)
}

/// Parse and load a property document from JSON text
pub fn load_str(device_name: &str, json: &str) -> IndiResult<Device> {
    let value: Value = serde_json::from_str(json)?;
    load(device_name, &value)
}

/// Read and load a property document from a file
pub fn load_path(device_name: &str, path: &Path) -> IndiResult<Device> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        IndiError::Config(format!("Cannot read {}: {}", path.display(), e))
    })?;
    load_str(device_name, &json)
}

fn build_group(name: &str, group: GroupConfig) -> IndiResult<Group> {
    let mut vectors = Vec::new();

    for sv in group.switch_vectors {
        let entries = sv
            .switches
            .into_iter()
            .map(|e| -> IndiResult<Entry> {
                let value = EntryValue::parse(IndiPropertyType::Switch, &e.value).ok_or_else(|| {
                    IndiError::Config(format!(
                        "Switch '{}' in '{}' must be \"On\" or \"Off\", got '{}'",
                        e.name, sv.header.name, e.value
                    ))
                })?;
                Ok(entry(e.name, e.label, value))
            })
            .collect::<IndiResult<Vec<_>>>()?;
        let mut vector = build_vector(sv.header, IndiPropertyType::Switch, entries)?;
        if let Some(rule) = sv.rule {
            let rule = SwitchRule::parse(&rule).ok_or_else(|| {
                IndiError::Config(format!("Unknown switch rule '{}' on '{}'", rule, vector.name()))
            })?;
            vector = vector.with_rule(rule);
        }
        vectors.push(vector);
    }

    for nv in group.number_vectors {
        let entries = nv
            .numbers
            .into_iter()
            .map(|e| -> IndiResult<Entry> {
                if !e.value.is_finite() {
                    return Err(IndiError::Config(format!(
                        "Number '{}' in '{}' is not finite",
                        e.name, nv.header.name
                    )));
                }
                if let (Some(min), Some(max)) = (e.min, e.max) {
                    if min > max {
                        return Err(IndiError::Config(format!(
                            "Number '{}' in '{}' has min {} above max {}",
                            e.name, nv.header.name, min, max
                        )));
                    }
                }
                let hints = NumberHints {
                    format: e.format,
                    min: e.min,
                    max: e.max,
                    step: e.step,
                };
                Ok(entry(e.name, e.label, EntryValue::Number(e.value)).with_hints(hints))
            })
            .collect::<IndiResult<Vec<_>>>()?;
        vectors.push(build_vector(nv.header, IndiPropertyType::Number, entries)?);
    }

    for tv in group.text_vectors {
        let entries = tv
            .texts
            .into_iter()
            .map(|e| entry(e.name, e.label, EntryValue::Text(e.value)))
            .collect();
        vectors.push(build_vector(tv.header, IndiPropertyType::Text, entries)?);
    }

    Group::new(name, vectors)
}

fn entry(name: String, label: Option<String>, value: EntryValue) -> Entry {
    let label = label.unwrap_or_else(|| name.clone());
    Entry::new(name, label, value)
}

fn build_vector(
    header: VectorHeader,
    kind: IndiPropertyType,
    entries: Vec<Entry>,
) -> IndiResult<Vector> {
    if entries.is_empty() {
        return Err(IndiError::Config(format!(
            "{} vector '{}' has no entries",
            kind, header.name
        )));
    }

    // Text vectors are read-only unless configured otherwise
    let perm = match header.perm {
        Some(p) => IndiPermission::parse(&p).ok_or_else(|| {
            IndiError::Config(format!("Unknown permission '{}' on '{}'", p, header.name))
        })?,
        None if kind == IndiPropertyType::Text => IndiPermission::ReadOnly,
        None => IndiPermission::ReadWrite,
    };
    let state = match header.state {
        Some(s) => IndiPropertyState::parse(&s).ok_or_else(|| {
            IndiError::Config(format!("Unknown state '{}' on '{}'", s, header.name))
        })?,
        None => IndiPropertyState::Idle,
    };

    let label = header.label.unwrap_or_else(|| header.name.clone());
    Ok(Vector::new(header.name, label, kind, perm, entries)?.with_state(state))
}

/// Runtime settings for the server process
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (default: 0.0.0.0)
    pub bind_address: String,
    /// TCP port (default: 7624)
    pub port: u16,
    /// Device name announced to clients
    pub device_name: String,
    /// Property document; the built-in telescope is used when `None`
    pub properties_path: Option<PathBuf>,
    /// Cap for any single buffered XML token (default: 64 KiB)
    pub max_token_len: usize,
    /// Reject requests whose `device` attribute names another device
    pub strict_device_match: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: INDI_DEFAULT_PORT,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            properties_path: None,
            max_token_len: DEFAULT_MAX_TOKEN_LEN,
            strict_device_match: false,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Load the configured device
    ///
    /// A configuration failure is logged and yields an empty device: the
    /// server keeps accepting connections but declares no properties.
    pub fn load_device(&self) -> Device {
        let result = match &self.properties_path {
            Some(path) => load_path(&self.device_name, path),
            None => load_str(&self.device_name, DEFAULT_PROPERTIES_JSON),
        };

        match result {
            Ok(device) => {
                tracing::info!(
                    "Loaded {} properties in {} groups for device '{}'",
                    device.vector_count(),
                    device.groups().len(),
                    device.name()
                );
                device
            }
            Err(e) => {
                tracing::error!("INDI property configuration failed: {}", e);
                Device::empty(&self.device_name)
            }
        }
    }
}
