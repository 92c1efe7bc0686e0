//! Property model
//!
//! Device → Group → Vector → Entry. The tree shape is fixed once built;
//! afterwards only entry values and vector state change.

use crate::error::{IndiError, IndiResult};
use crate::{IndiPermission, IndiPropertyState, IndiPropertyType, SwitchRule};
use std::collections::HashSet;

/// Value held by one entry
#[derive(Debug, Clone, PartialEq)]
pub enum EntryValue {
    Switch(bool),
    Number(f64),
    Text(String),
}

impl EntryValue {
    pub fn kind(&self) -> IndiPropertyType {
        match self {
            EntryValue::Switch(_) => IndiPropertyType::Switch,
            EntryValue::Number(_) => IndiPropertyType::Number,
            EntryValue::Text(_) => IndiPropertyType::Text,
        }
    }

    /// Parse wire text for the given kind
    ///
    /// Switches accept exactly `On` / `Off`, numbers any finite `f64`,
    /// text anything.
    pub fn parse(kind: IndiPropertyType, raw: &str) -> Option<Self> {
        match kind {
            IndiPropertyType::Switch => match raw {
                "On" => Some(EntryValue::Switch(true)),
                "Off" => Some(EntryValue::Switch(false)),
                _ => None,
            },
            IndiPropertyType::Number => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(EntryValue::Number),
            IndiPropertyType::Text => Some(EntryValue::Text(raw.to_string())),
        }
    }

    /// Wire text, unescaped. Numbers use six fractional digits.
    pub fn to_wire(&self) -> String {
        match self {
            EntryValue::Switch(true) => "On".to_string(),
            EntryValue::Switch(false) => "Off".to_string(),
            EntryValue::Number(v) => format!("{:.6}", v),
            EntryValue::Text(t) => t.clone(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            EntryValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_switch(&self) -> Option<bool> {
        match self {
            EntryValue::Switch(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            EntryValue::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Client-side display hints for a number entry
///
/// Only announced in definitions; values outside `min..=max` are still
/// accepted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumberHints {
    pub format: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
}

impl NumberHints {
    pub const DEFAULT_FORMAT: &'static str = "%g";

    pub fn is_empty(&self) -> bool {
        self.format.is_none() && self.min.is_none() && self.max.is_none() && self.step.is_none()
    }

    /// printf-style format announced to clients
    pub fn format(&self) -> &str {
        self.format.as_deref().unwrap_or(Self::DEFAULT_FORMAT)
    }
}

/// A single named value inside a vector
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    name: String,
    label: String,
    value: EntryValue,
    hints: NumberHints,
}

impl Entry {
    pub fn new(name: impl Into<String>, label: impl Into<String>, value: EntryValue) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            value,
            hints: NumberHints::default(),
        }
    }

    /// Attach display hints; ignored unless the entry holds a number
    pub fn with_hints(mut self, hints: NumberHints) -> Self {
        if self.value.kind() == IndiPropertyType::Number {
            self.hints = hints;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> &EntryValue {
        &self.value
    }

    pub fn hints(&self) -> &NumberHints {
        &self.hints
    }
}

/// A named, typed group of same-kind entries
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    name: String,
    label: String,
    kind: IndiPropertyType,
    perm: IndiPermission,
    state: IndiPropertyState,
    rule: Option<SwitchRule>,
    entries: Vec<Entry>,
}

impl Vector {
    /// Build a vector; every entry must match `kind` and entry names must be unique
    pub fn new(
        name: impl Into<String>,
        label: impl Into<String>,
        kind: IndiPropertyType,
        perm: IndiPermission,
        entries: Vec<Entry>,
    ) -> IndiResult<Self> {
        let name = name.into();
        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.value.kind() != kind {
                return Err(IndiError::Config(format!(
                    "Entry '{}' in {} vector '{}' holds a {} value",
                    entry.name,
                    kind,
                    name,
                    entry.value.kind()
                )));
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(IndiError::Config(format!(
                    "Duplicate entry '{}' in vector '{}'",
                    entry.name, name
                )));
            }
        }

        Ok(Self {
            name,
            label: label.into(),
            kind,
            perm,
            state: IndiPropertyState::Idle,
            rule: (kind == IndiPropertyType::Switch).then_some(SwitchRule::default()),
            entries,
        })
    }

    /// Override the switch rule; ignored for non-switch vectors
    pub fn with_rule(mut self, rule: SwitchRule) -> Self {
        if self.kind == IndiPropertyType::Switch {
            self.rule = Some(rule);
        }
        self
    }

    pub fn with_state(mut self, state: IndiPropertyState) -> Self {
        self.state = state;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn kind(&self) -> IndiPropertyType {
        self.kind
    }

    pub fn perm(&self) -> IndiPermission {
        self.perm
    }

    pub fn state(&self) -> IndiPropertyState {
        self.state
    }

    pub fn set_state(&mut self, state: IndiPropertyState) {
        self.state = state;
    }

    /// Switch rule (`None` for number and text vectors)
    pub fn rule(&self) -> Option<SwitchRule> {
        self.rule
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Validate `raw` for the named entry without mutating anything
    pub fn parse_value(&self, entry: &str, raw: &str) -> IndiResult<EntryValue> {
        if self.entry(entry).is_none() {
            return Err(IndiError::UnknownEntry {
                vector: self.name.clone(),
                entry: entry.to_string(),
            });
        }
        EntryValue::parse(self.kind, raw).ok_or_else(|| IndiError::InvalidValue {
            vector: self.name.clone(),
            entry: entry.to_string(),
            kind: self.kind,
            value: raw.to_string(),
        })
    }

    /// Set one entry from wire text; on success the vector state becomes `Ok`
    pub fn set_entry_value(&mut self, entry: &str, raw: &str) -> IndiResult<()> {
        let value = self.parse_value(entry, raw)?;
        self.assign(entry, value);
        self.state = IndiPropertyState::Ok;
        Ok(())
    }

    /// Apply several `(entry, raw)` pairs all-or-nothing
    ///
    /// Every pair is validated before any value is assigned. Later pairs for
    /// the same entry win.
    pub fn apply_updates(&mut self, updates: &[(String, String)]) -> IndiResult<()> {
        let mut parsed = Vec::with_capacity(updates.len());
        for (entry, raw) in updates {
            parsed.push((entry.as_str(), self.parse_value(entry, raw)?));
        }

        for (entry, value) in parsed {
            self.assign(entry, value);
        }
        self.state = IndiPropertyState::Ok;
        Ok(())
    }

    fn assign(&mut self, entry: &str, value: EntryValue) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.name == entry) {
            e.value = value;
        }
    }
}

/// A named, ordered collection of vectors
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    name: String,
    vectors: Vec<Vector>,
}

impl Group {
    pub fn new(name: impl Into<String>, vectors: Vec<Vector>) -> IndiResult<Self> {
        let name = name.into();
        let mut seen = HashSet::new();
        for vector in &vectors {
            if !seen.insert(vector.name()) {
                return Err(IndiError::Config(format!(
                    "Duplicate vector '{}' in group '{}'",
                    vector.name(),
                    name
                )));
            }
        }
        Ok(Self { name, vectors })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vectors(&self) -> &[Vector] {
        &self.vectors
    }
}

/// The single device served by this process
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    name: String,
    groups: Vec<Group>,
}

impl Device {
    /// Build a device; group names and vector names must be unique device-wide
    pub fn new(name: impl Into<String>, groups: Vec<Group>) -> IndiResult<Self> {
        let mut group_names = HashSet::new();
        let mut vector_names = HashSet::new();
        for group in &groups {
            if !group_names.insert(group.name()) {
                return Err(IndiError::Config(format!(
                    "Duplicate group '{}'",
                    group.name()
                )));
            }
            for vector in group.vectors() {
                if !vector_names.insert(vector.name()) {
                    return Err(IndiError::Config(format!(
                        "Vector '{}' declared in more than one group",
                        vector.name()
                    )));
                }
            }
        }
        Ok(Self {
            name: name.into(),
            groups,
        })
    }

    /// A device that declares nothing
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.vectors.is_empty())
    }

    /// All vectors with their group, in declaration order
    pub fn vectors(&self) -> impl Iterator<Item = (&Group, &Vector)> {
        self.groups
            .iter()
            .flat_map(|g| g.vectors.iter().map(move |v| (g, v)))
    }

    pub fn vector_count(&self) -> usize {
        self.groups.iter().map(|g| g.vectors.len()).sum()
    }

    /// Look up a vector by device and vector name
    pub fn find_vector(&self, device: &str, vector: &str) -> Option<&Vector> {
        if device != self.name {
            return None;
        }
        self.vectors().map(|(_, v)| v).find(|v| v.name == vector)
    }

    pub fn find_vector_mut(&mut self, device: &str, vector: &str) -> Option<&mut Vector> {
        if device != self.name {
            return None;
        }
        self.groups
            .iter_mut()
            .flat_map(|g| g.vectors.iter_mut())
            .find(|v| v.name == vector)
    }

    /// Group name owning the vector
    pub fn group_of(&self, vector: &str) -> Option<&str> {
        self.vectors()
            .find(|(_, v)| v.name == vector)
            .map(|(g, _)| g.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Vector {
        Vector::new(
            "CONNECTION",
            "Connection",
            IndiPropertyType::Switch,
            IndiPermission::ReadWrite,
            vec![
                Entry::new("CONNECT", "Connect", EntryValue::Switch(false)),
                Entry::new("DISCONNECT", "Disconnect", EntryValue::Switch(true)),
            ],
        )
        .unwrap()
    }

    fn coords() -> Vector {
        Vector::new(
            "EQ_COORD",
            "Eq Coord",
            IndiPropertyType::Number,
            IndiPermission::ReadWrite,
            vec![
                Entry::new("RA", "RA", EntryValue::Number(0.0)),
                Entry::new("DEC", "DEC", EntryValue::Number(0.0)),
            ],
        )
        .unwrap()
    }

    fn device() -> Device {
        Device::new(
            "Scope",
            vec![
                Group::new("Main", vec![connection()]).unwrap(),
                Group::new("Motion", vec![coords()]).unwrap(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_entry_value_parsing() {
        assert_eq!(
            EntryValue::parse(IndiPropertyType::Switch, "On"),
            Some(EntryValue::Switch(true))
        );
        assert_eq!(EntryValue::parse(IndiPropertyType::Switch, "on"), None);
        assert_eq!(
            EntryValue::parse(IndiPropertyType::Number, " 12.5 "),
            Some(EntryValue::Number(12.5))
        );
        assert_eq!(EntryValue::parse(IndiPropertyType::Number, "NaN"), None);
        assert_eq!(EntryValue::parse(IndiPropertyType::Number, "inf"), None);
        assert_eq!(
            EntryValue::parse(IndiPropertyType::Text, " as is "),
            Some(EntryValue::Text(" as is ".to_string()))
        );
    }

    #[test]
    fn test_wire_formatting() {
        assert_eq!(EntryValue::Number(0.0).to_wire(), "0.000000");
        assert_eq!(EntryValue::Number(3.14159265).to_wire(), "3.141593");
        assert_eq!(EntryValue::Number(-12.5).to_wire(), "-12.500000");
        assert_eq!(EntryValue::Switch(false).to_wire(), "Off");
    }

    #[test]
    fn test_set_entry_value_updates_state() {
        let mut v = coords();
        assert_eq!(v.state(), IndiPropertyState::Idle);
        v.set_entry_value("RA", "12.5").unwrap();
        assert_eq!(v.entry("RA").unwrap().value().as_number(), Some(12.5));
        assert_eq!(v.entry("DEC").unwrap().value().as_number(), Some(0.0));
        assert_eq!(v.state(), IndiPropertyState::Ok);
    }

    #[test]
    fn test_out_of_kind_value_leaves_vector_unchanged() {
        let mut v = connection();
        let before = v.clone();
        let err = v.set_entry_value("CONNECT", "Maybe").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(v, before);
    }

    #[test]
    fn test_unknown_entry_is_rejected() {
        let mut v = coords();
        let err = v.set_entry_value("ALT", "1").unwrap_err();
        assert!(matches!(err, IndiError::UnknownEntry { .. }));
    }

    #[test]
    fn test_apply_updates_is_all_or_nothing() {
        let mut v = coords();
        let before = v.clone();
        let updates = vec![
            ("RA".to_string(), "1.0".to_string()),
            ("DEC".to_string(), "north".to_string()),
        ];
        assert!(v.apply_updates(&updates).is_err());
        assert_eq!(v, before);

        let updates = vec![
            ("RA".to_string(), "1.0".to_string()),
            ("DEC".to_string(), "-45".to_string()),
            ("RA".to_string(), "2.0".to_string()),
        ];
        v.apply_updates(&updates).unwrap();
        assert_eq!(v.entry("RA").unwrap().value().as_number(), Some(2.0));
        assert_eq!(v.entry("DEC").unwrap().value().as_number(), Some(-45.0));
    }

    #[test]
    fn test_vector_rejects_mixed_kinds_and_duplicates() {
        let mixed = Vector::new(
            "V",
            "V",
            IndiPropertyType::Number,
            IndiPermission::ReadWrite,
            vec![Entry::new("A", "A", EntryValue::Text("x".into()))],
        );
        assert!(matches!(mixed, Err(IndiError::Config(_))));

        let dup = Vector::new(
            "V",
            "V",
            IndiPropertyType::Number,
            IndiPermission::ReadWrite,
            vec![
                Entry::new("A", "A", EntryValue::Number(1.0)),
                Entry::new("A", "A", EntryValue::Number(2.0)),
            ],
        );
        assert!(matches!(dup, Err(IndiError::Config(_))));
    }

    #[test]
    fn test_number_hints_only_on_number_entries() {
        let hints = NumberHints {
            min: Some(0.0),
            max: Some(24.0),
            ..Default::default()
        };
        let ra = Entry::new("RA", "RA", EntryValue::Number(0.0)).with_hints(hints.clone());
        assert_eq!(ra.hints(), &hints);
        assert_eq!(ra.hints().format(), NumberHints::DEFAULT_FORMAT);

        let connect = Entry::new("CONNECT", "Connect", EntryValue::Switch(false)).with_hints(hints);
        assert!(connect.hints().is_empty());
    }

    #[test]
    fn test_switch_rule_only_on_switch_vectors() {
        assert_eq!(connection().rule(), Some(SwitchRule::OneOfMany));
        assert_eq!(coords().rule(), None);
        assert_eq!(coords().with_rule(SwitchRule::AnyOfMany).rule(), None);
    }

    #[test]
    fn test_find_vector() {
        let mut d = device();
        assert!(d.find_vector("Scope", "EQ_COORD").is_some());
        assert!(d.find_vector("Other", "EQ_COORD").is_none());
        assert!(d.find_vector("Scope", "MISSING").is_none());
        d.find_vector_mut("Scope", "CONNECTION")
            .unwrap()
            .set_entry_value("CONNECT", "On")
            .unwrap();
        assert_eq!(
            d.find_vector("Scope", "CONNECTION")
                .unwrap()
                .entry("CONNECT")
                .unwrap()
                .value()
                .as_switch(),
            Some(true)
        );
        assert_eq!(d.group_of("EQ_COORD"), Some("Motion"));
    }

    #[test]
    fn test_device_rejects_duplicate_vector_across_groups() {
        let result = Device::new(
            "Scope",
            vec![
                Group::new("A", vec![coords()]).unwrap(),
                Group::new("B", vec![coords()]).unwrap(),
            ],
        );
        assert!(matches!(result, Err(IndiError::Config(_))));
    }

    #[test]
    fn test_declaration_order() {
        let d = device();
        let names: Vec<_> = d.vectors().map(|(g, v)| (g.name(), v.name())).collect();
        assert_eq!(names, vec![("Main", "CONNECTION"), ("Motion", "EQ_COORD")]);
        assert_eq!(d.vector_count(), 2);
        assert!(Device::empty("Scope").is_empty());
    }
}
