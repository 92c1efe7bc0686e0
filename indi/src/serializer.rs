//! INDI message serialization
//!
//! Renders vectors as `def*Vector` definitions or `set*Vector` updates.
//! Every attribute value and element text passes through XML escaping;
//! labels come from configuration and are not trusted.

use crate::property::{Device, NumberHints, Vector};
use crate::protocol::{def_element_tag, def_vector_tag, one_element_tag, set_vector_tag};
use quick_xml::escape::escape;

/// Render one `def<Kind>Vector` with all entries and current values
pub fn serialize_definition(device: &str, group: &str, vector: &Vector) -> String {
    let kind = vector.kind();
    let tag = def_vector_tag(kind);
    let child = def_element_tag(kind);

    let mut out = format!(
        "<{} device=\"{}\" name=\"{}\" label=\"{}\" group=\"{}\" state=\"{}\" perm=\"{}\"",
        tag,
        escape(device),
        escape(vector.name()),
        escape(vector.label()),
        escape(group),
        vector.state().as_str(),
        vector.perm().as_str(),
    );
    if let Some(rule) = vector.rule() {
        out.push_str(&format!(" rule=\"{}\"", rule.as_str()));
    }
    out.push('>');

    for entry in vector.entries() {
        out.push_str(&format!(
            "<{} name=\"{}\" label=\"{}\"",
            child,
            escape(entry.name()),
            escape(entry.label()),
        ));
        push_number_hints(&mut out, entry.hints());
        out.push_str(&format!(">{}</{}>", escape(&entry.value().to_wire()), child));
    }

    out.push_str(&format!("</{}>", tag));
    out
}

/// `format` is announced whenever any hint is configured; bounds only when set
fn push_number_hints(out: &mut String, hints: &NumberHints) {
    if hints.is_empty() {
        return;
    }
    out.push_str(&format!(" format=\"{}\"", escape(hints.format())));
    for (name, value) in [("min", hints.min), ("max", hints.max), ("step", hints.step)] {
        if let Some(value) = value {
            out.push_str(&format!(" {}=\"{}\"", name, value));
        }
    }
}

/// Render the full definition broadcast, group then vector order
pub fn serialize_definitions(device: &Device) -> Vec<String> {
    device
        .vectors()
        .map(|(group, vector)| serialize_definition(device.name(), group.name(), vector))
        .collect()
}

/// Render one `set<Kind>Vector` carrying every entry and the current state
pub fn serialize_update(device: &str, vector: &Vector) -> String {
    let kind = vector.kind();
    let tag = set_vector_tag(kind);
    let child = one_element_tag(kind);

    let mut out = format!(
        "<{} device=\"{}\" name=\"{}\" state=\"{}\">",
        tag,
        escape(device),
        escape(vector.name()),
        vector.state().as_str(),
    );
    for entry in vector.entries() {
        out.push_str(&format!(
            "<{} name=\"{}\">{}</{}>",
            child,
            escape(entry.name()),
            escape(&entry.value().to_wire()),
            child
        ));
    }
    out.push_str(&format!("</{}>", tag));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_str;
    use crate::property::{Entry, EntryValue};
    use crate::{IndiPermission, IndiPropertyType};
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    /// Parse with quick-xml; returns (element name, attributes, text) triples
    fn parse(xml: &str) -> Vec<(String, Vec<(String, String)>, String)> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut elements = Vec::new();
        loop {
            match reader.read_event().expect("well-formed XML") {
                Event::Start(e) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    let attrs = e
                        .attributes()
                        .map(|a| {
                            let a = a.expect("valid attribute");
                            (
                                String::from_utf8_lossy(a.key.as_ref()).to_string(),
                                a.unescape_value().expect("valid escape").to_string(),
                            )
                        })
                        .collect();
                    elements.push((name, attrs, String::new()));
                }
                Event::Text(t) => {
                    if let Some(last) = elements.last_mut() {
                        last.2 = t.unescape().expect("valid escape").to_string();
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        elements
    }

    fn attr<'a>(attrs: &'a [(String, String)], key: &str) -> Option<&'a str> {
        attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    const CONFIG: &str = r#"{"Main":{
        "SwitchVector":[{"name":"CONNECTION","label":"Connection","Switches":[
            {"name":"CONNECT","label":"Connect","value":"On"},
            {"name":"DISCONNECT","label":"Disconnect","value":"Off"}]}],
        "NumberVector":[{"name":"EQ_COORD","label":"Eq Coord","numbers":[
            {"name":"RA","label":"RA","value":0},
            {"name":"DEC","label":"DEC","value":3.14159265}]}]},
      "Info":{"TextVector":[{"name":"DRIVER_INFO","label":"Driver","texts":[
            {"name":"DRIVER_NAME","label":"Name","value":"Scope"}]}]}}"#;

    #[test]
    fn test_number_definition_shape() {
        let device = load_str("D", CONFIG).unwrap();
        let v = device.find_vector("D", "EQ_COORD").unwrap();
        let xml = serialize_definition("D", "Main", v);
        assert!(xml.starts_with(
            r#"<defNumberVector device="D" name="EQ_COORD" label="Eq Coord" group="Main" state="Idle" perm="rw">"#
        ));
        assert!(xml.contains(r#"<defNumber name="RA" label="RA">0.000000</defNumber>"#));
        assert!(xml.contains(r#"<defNumber name="DEC" label="DEC">3.141593</defNumber>"#));
        assert!(xml.ends_with("</defNumberVector>"));
        assert!(!xml.contains("rule="));
    }

    #[test]
    fn test_number_hints_in_definition() {
        let json = r#"{"Main":{"NumberVector":[{"name":"EQ_COORD","numbers":[
            {"name":"RA","value":0,"format":"%010.6m","min":0,"max":24,"step":0},
            {"name":"DEC","value":0,"min":-90,"max":90.5}]}]}}"#;
        let device = load_str("D", json).unwrap();
        let v = device.find_vector("D", "EQ_COORD").unwrap();
        let parsed = parse(&serialize_definition("D", "Main", v));

        let ra = &parsed[1].1;
        assert_eq!(attr(ra, "format"), Some("%010.6m"));
        assert_eq!(attr(ra, "min"), Some("0"));
        assert_eq!(attr(ra, "max"), Some("24"));
        assert_eq!(attr(ra, "step"), Some("0"));

        let dec = &parsed[2].1;
        assert_eq!(attr(dec, "format"), Some("%g"));
        assert_eq!(attr(dec, "min"), Some("-90"));
        assert_eq!(attr(dec, "max"), Some("90.5"));
        assert_eq!(attr(dec, "step"), None);
        assert_eq!(parsed[2].2, "0.000000");

        // Hints never reach set messages
        assert!(!serialize_update("D", v).contains("format="));
    }

    #[test]
    fn test_switch_and_text_definitions() {
        let device = load_str("D", CONFIG).unwrap();
        let defs = serialize_definitions(&device);
        assert_eq!(defs.len(), 3);

        let switch = parse(&defs[0]);
        assert_eq!(switch[0].0, "defSwitchVector");
        assert_eq!(attr(&switch[0].1, "rule"), Some("OneOfMany"));
        assert_eq!(attr(&switch[0].1, "perm"), Some("rw"));
        assert_eq!(switch[1].0, "defSwitch");
        assert_eq!(switch[1].2, "On");
        assert_eq!(switch[2].2, "Off");

        let text = parse(&defs[2]);
        assert_eq!(text[0].0, "defTextVector");
        assert_eq!(attr(&text[0].1, "perm"), Some("ro"));
        assert_eq!(attr(&text[0].1, "group"), Some("Info"));
        assert_eq!(text[1].2, "Scope");
    }

    #[test]
    fn test_every_entry_appears_once() {
        let device = load_str("D", CONFIG).unwrap();
        let all = serialize_definitions(&device).join("\n");
        for (_, vector) in device.vectors() {
            for entry in vector.entries() {
                let needle = format!("name=\"{}\"", entry.name());
                assert_eq!(all.matches(&needle).count(), 1, "{}", entry.name());
                let value = format!(">{}<", entry.value().to_wire());
                assert!(all.contains(&value));
            }
        }
    }

    #[test]
    fn test_update_shape() {
        let mut device = load_str("D", CONFIG).unwrap();
        let v = device.find_vector_mut("D", "EQ_COORD").unwrap();
        v.set_entry_value("RA", "12.5").unwrap();
        let xml = serialize_update("D", v);
        assert_eq!(
            xml,
            concat!(
                r#"<setNumberVector device="D" name="EQ_COORD" state="Ok">"#,
                r#"<oneNumber name="RA">12.500000</oneNumber>"#,
                r#"<oneNumber name="DEC">3.141593</oneNumber>"#,
                "</setNumberVector>"
            )
        );
    }

    #[test]
    fn test_hostile_content_is_escaped() {
        let vector = Vector::new(
            "V<1>",
            r#"Label "with" <tags> & 'quotes'"#,
            IndiPropertyType::Text,
            IndiPermission::ReadWrite,
            vec![Entry::new(
                "T",
                "</defText><evil>",
                EntryValue::Text("a < b && c > 'd'".to_string()),
            )],
        )
        .unwrap();

        let xml = serialize_definition("Dev&ice", "G\"1", &vector);
        assert!(!xml.contains("<evil>"));
        let parsed = parse(&xml);
        assert_eq!(parsed.len(), 2);
        assert_eq!(attr(&parsed[0].1, "device"), Some("Dev&ice"));
        assert_eq!(attr(&parsed[0].1, "name"), Some("V<1>"));
        assert_eq!(attr(&parsed[0].1, "label"), Some(r#"Label "with" <tags> & 'quotes'"#));
        assert_eq!(attr(&parsed[0].1, "group"), Some("G\"1"));
        assert_eq!(attr(&parsed[1].1, "label"), Some("</defText><evil>"));
        assert_eq!(parsed[1].2, "a < b && c > 'd'");

        let update = parse(&serialize_update("Dev&ice", &vector));
        assert_eq!(update[1].2, "a < b && c > 'd'");
    }
}
