//! INDI message router
//!
//! Receives tokenizer events and assembles them into protocol messages.
//! Events arrive flat, with no nesting markers. The protocol never nests
//! deeper than message → child element, so tracking the open top-level
//! message plus its open child is enough to rebuild structure.
//!
//! Handled messages:
//! - `getProperties`: answered at its start tag with one `def*Vector` per
//!   vector, since the usual self-closing form never produces an end tag
//! - `new{Switch,Number,Text}Vector`: validated as a whole, applied, then
//!   confirmed with a `set*Vector`
//!
//! Anything else is ignored. Failed requests mutate nothing and get no reply.
//! A tokenizer overflow abandons whatever message was being assembled.
//!
//! Values produced on the device side enter through `publish`, which applies
//! them without a permission check and renders the `set*Vector` for the peer.

use crate::error::{IndiError, IndiResult};
use crate::property::Device;
use crate::protocol::{new_vector_tag, one_element_tag, MessageKind, GET_PROPERTIES};
use crate::serializer::{serialize_definitions, serialize_update};
use crate::tokenizer::XmlEventSink;
use crate::{IndiPropertyState, IndiPropertyType, INDI_PROTOCOL_VERSION};

/// Counters for dispatched traffic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// `getProperties` requests answered
    pub definition_requests: u64,
    /// `new*Vector` requests applied
    pub updates_applied: u64,
    /// `new*Vector` requests rejected
    pub updates_rejected: u64,
    /// Top-level tags that were not recognized
    pub ignored: u64,
}

/// Child element currently being collected
#[derive(Debug, Default)]
struct PendingChild {
    name: Option<String>,
    text: String,
}

/// A `new*Vector` message under assembly
#[derive(Debug)]
struct PendingVector {
    kind: IndiPropertyType,
    device: Option<String>,
    name: Option<String>,
    children: Vec<(String, String)>,
    open_child: Option<PendingChild>,
}

impl PendingVector {
    fn new(kind: IndiPropertyType) -> Self {
        Self {
            kind,
            device: None,
            name: None,
            children: Vec::new(),
            open_child: None,
        }
    }

    fn commit_child(&mut self) {
        if let Some(child) = self.open_child.take() {
            match child.name {
                Some(name) => self.children.push((name, child.text)),
                None => tracing::debug!(
                    "Dropping {} without a name attribute",
                    one_element_tag(self.kind)
                ),
            }
        }
    }
}

/// Message-assembly state
#[derive(Debug, Default)]
enum Assembly {
    #[default]
    Idle,
    Vector(PendingVector),
}

/// Routes assembled messages against the device and collects replies
#[derive(Debug)]
pub struct MessageRouter {
    device: Device,
    strict_device_match: bool,
    assembly: Assembly,
    outbox: Vec<String>,
    stats: RouterStats,
}

impl MessageRouter {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            strict_device_match: false,
            assembly: Assembly::Idle,
            outbox: Vec::new(),
            stats: RouterStats::default(),
        }
    }

    /// Require the `device` attribute of requests to name this device
    pub fn with_strict_device_match(mut self, strict: bool) -> Self {
        self.strict_device_match = strict;
        self
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// Whether a message is partially assembled
    pub fn is_assembling(&self) -> bool {
        matches!(self.assembly, Assembly::Vector(_))
    }

    /// Drain outbound messages produced so far
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbox)
    }

    /// Forget any half-assembled message and pending output
    pub fn reset(&mut self) {
        self.assembly = Assembly::Idle;
        self.outbox.clear();
    }

    /// Set one entry from the device side and render the resulting update
    ///
    /// Read-only vectors are writable here; they exist for exactly this path.
    pub fn publish(
        &mut self,
        vector: &str,
        entry: &str,
        raw: &str,
        state: IndiPropertyState,
    ) -> IndiResult<String> {
        let device_name = self.device.name().to_string();
        let target = self
            .device
            .find_vector_mut(&device_name, vector)
            .ok_or_else(|| IndiError::Protocol(format!("unknown vector '{}'", vector)))?;
        target.set_entry_value(entry, raw)?;
        target.set_state(state);
        tracing::debug!("Published {}.{} = {} ({})", vector, entry, raw, state.as_str());
        Ok(serialize_update(&device_name, target))
    }

    fn send_definitions(&mut self) {
        let defs = serialize_definitions(&self.device);
        tracing::debug!(
            "Sending {} property definitions for '{}'",
            defs.len(),
            self.device.name()
        );
        self.stats.definition_requests += 1;
        self.outbox.extend(defs);
    }

    fn dispatch_new_vector(&mut self, pending: PendingVector) {
        let vector_name = pending.name.clone().unwrap_or_default();
        match self.apply_new_vector(pending) {
            Ok(reply) => {
                self.stats.updates_applied += 1;
                self.outbox.push(reply);
            }
            Err(e) => {
                self.stats.updates_rejected += 1;
                tracing::warn!("Rejected update for '{}': {}", vector_name, e);
            }
        }
    }

    /// Validate and apply a complete `new*Vector`; returns the `set*Vector` reply
    fn apply_new_vector(&mut self, pending: PendingVector) -> IndiResult<String> {
        let name = pending
            .name
            .ok_or_else(|| IndiError::Protocol("missing vector name".to_string()))?;

        let device_name = self.device.name().to_string();
        if let Some(requested) = pending.device.as_deref() {
            if requested != device_name {
                if self.strict_device_match {
                    return Err(IndiError::Protocol(format!(
                        "unknown vector '{}.{}'",
                        requested, name
                    )));
                }
                tracing::debug!(
                    "Request for device '{}' handled by '{}'",
                    requested,
                    device_name
                );
            }
        }

        if pending.children.is_empty() {
            return Err(IndiError::Protocol(format!(
                "{} '{}' carries no elements",
                new_vector_tag(pending.kind),
                name
            )));
        }

        let vector = self
            .device
            .find_vector_mut(&device_name, &name)
            .filter(|v| v.kind() == pending.kind)
            .ok_or_else(|| IndiError::Protocol(format!("unknown vector '{}'", name)))?;

        if !vector.perm().is_writable() {
            return Err(IndiError::PermissionDenied(format!(
                "Property '{}' is read-only",
                name
            )));
        }

        vector.apply_updates(&pending.children)?;
        tracing::info!(
            "Updated {} ({} element(s)), state {}",
            name,
            pending.children.len(),
            vector.state().as_str()
        );
        Ok(serialize_update(&device_name, vector))
    }
}

impl XmlEventSink for MessageRouter {
    fn tag_start(&mut self, name: &str) {
        if let Some(kind) = MessageKind::from_tag(name) {
            if self.is_assembling() {
                tracing::debug!("Discarding incomplete message before <{}>", name);
            }
            match kind {
                MessageKind::GetProperties => {
                    self.assembly = Assembly::Idle;
                    self.send_definitions();
                }
                MessageKind::NewVector(kind) => {
                    self.assembly = Assembly::Vector(PendingVector::new(kind));
                }
            }
            return;
        }

        match &mut self.assembly {
            Assembly::Vector(pending) => {
                let tag = name.strip_suffix('/').unwrap_or(name);
                if tag == one_element_tag(pending.kind) {
                    pending.commit_child();
                    pending.open_child = Some(PendingChild::default());
                }
            }
            Assembly::Idle => {
                self.stats.ignored += 1;
                tracing::debug!("Ignoring <{}>", name);
            }
        }
    }

    fn attribute(&mut self, tag: &str, name: &str, value: &str) {
        match &mut self.assembly {
            Assembly::Vector(pending) => {
                if let Some(child) = pending.open_child.as_mut() {
                    if tag == one_element_tag(pending.kind) && name == "name" {
                        child.name = Some(unescape_or_raw(value));
                    }
                } else if tag == new_vector_tag(pending.kind) {
                    match name {
                        "device" => pending.device = Some(unescape_or_raw(value)),
                        "name" => pending.name = Some(unescape_or_raw(value)),
                        _ => {}
                    }
                }
            }
            Assembly::Idle => {
                if tag == GET_PROPERTIES && name == "version" && value != INDI_PROTOCOL_VERSION {
                    tracing::debug!(
                        "Client speaks INDI {} (server {})",
                        value,
                        INDI_PROTOCOL_VERSION
                    );
                }
            }
        }
    }

    fn text(&mut self, content: &str) {
        if let Assembly::Vector(pending) = &mut self.assembly {
            if let Some(child) = pending.open_child.as_mut() {
                child.text.push_str(&unescape_or_raw(content));
            }
        }
    }

    fn tag_end(&mut self, name: &str) {
        let Assembly::Vector(pending) = &mut self.assembly else {
            return;
        };

        if name == one_element_tag(pending.kind) {
            pending.commit_child();
        } else if name == new_vector_tag(pending.kind) {
            pending.commit_child();
            if let Assembly::Vector(pending) = std::mem::take(&mut self.assembly) {
                self.dispatch_new_vector(pending);
            }
        }
    }

    fn overflow(&mut self) {
        if let Assembly::Vector(pending) = std::mem::take(&mut self.assembly) {
            self.stats.updates_rejected += 1;
            tracing::warn!(
                "Abandoning {} '{}' after oversized input",
                new_vector_tag(pending.kind),
                pending.name.unwrap_or_default()
            );
        }
    }
}

/// Resolve XML entities; malformed references are kept as written
fn unescape_or_raw(s: &str) -> String {
    match quick_xml::escape::unescape(s) {
        Ok(cow) => cow.into_owned(),
        Err(_) => s.to_string(),
    }
}
