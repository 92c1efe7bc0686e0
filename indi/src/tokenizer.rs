//! Streaming XML tokenizer
//!
//! A byte-at-a-time state machine that turns an arbitrarily chunked INDI
//! stream into tag-start / attribute / text / tag-end events. It knows
//! nothing about the protocol and never fails: malformed input is absorbed
//! and parsing resynchronizes at the next `<`.
//!
//! Self-closing tags are not special. In `<tag a="1"/>` the `/` is an
//! ordinary byte, so no `TagEnd` is produced for it.
//!
//! A token longer than the configured cap is dropped together with the rest
//! of its input up to the next `<`, and the sink is told via `overflow`.

/// Default cap for any single buffered token (tag name, attribute, text run)
pub const DEFAULT_MAX_TOKEN_LEN: usize = 64 * 1024;

/// Receiver of tokenizer events, in document order
pub trait XmlEventSink {
    fn tag_start(&mut self, name: &str);
    fn attribute(&mut self, tag: &str, name: &str, value: &str);
    fn text(&mut self, content: &str);
    fn tag_end(&mut self, name: &str);

    /// A token overflowed and was discarded; partial structure is lost
    fn overflow(&mut self) {}
}

/// Tokenizer event as a value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    TagStart(String),
    Attribute {
        tag: String,
        name: String,
        value: String,
    },
    Text(String),
    TagEnd(String),
}

impl XmlEventSink for Vec<XmlEvent> {
    fn tag_start(&mut self, name: &str) {
        self.push(XmlEvent::TagStart(name.to_string()));
    }

    fn attribute(&mut self, tag: &str, name: &str, value: &str) {
        self.push(XmlEvent::Attribute {
            tag: tag.to_string(),
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    fn text(&mut self, content: &str) {
        self.push(XmlEvent::Text(content.to_string()));
    }

    fn tag_end(&mut self, name: &str) {
        self.push(XmlEvent::TagEnd(name.to_string()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    TagOpen,
    AttrName,
    AttrValueAwaitingQuote,
    AttrValue,
    TagClose,
    /// Dropping bytes after an overflow until the next `<`
    Discard,
}

/// Resumable tokenizer state; one per peer connection
#[derive(Debug)]
pub struct Tokenizer {
    state: State,
    text: Vec<u8>,
    tag: Vec<u8>,
    attr_name: Vec<u8>,
    attr_value: Vec<u8>,
    quote: u8,
    tag_started: bool,
    max_token_len: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::with_max_token_len(DEFAULT_MAX_TOKEN_LEN)
    }

    /// Create a tokenizer whose buffers are capped at `max_token_len` bytes
    pub fn with_max_token_len(max_token_len: usize) -> Self {
        Self {
            state: State::Text,
            text: Vec::new(),
            tag: Vec::new(),
            attr_name: Vec::new(),
            attr_value: Vec::new(),
            quote: b'"',
            tag_started: false,
            max_token_len: max_token_len.max(1),
        }
    }

    pub fn max_token_len(&self) -> usize {
        self.max_token_len
    }

    /// True when no partial token is held
    pub fn is_idle(&self) -> bool {
        self.state == State::Text && self.text.is_empty()
    }

    /// Drop all partial state (used between peer connections)
    pub fn reset(&mut self) {
        self.state = State::Text;
        self.text.clear();
        self.clear_tag();
    }

    /// Feed a chunk of bytes
    pub fn feed<S: XmlEventSink + ?Sized>(&mut self, bytes: &[u8], sink: &mut S) {
        for &b in bytes {
            self.feed_byte(b, sink);
        }
    }

    /// Feed a single byte
    pub fn feed_byte<S: XmlEventSink + ?Sized>(&mut self, b: u8, sink: &mut S) {
        match self.state {
            State::Text => {
                if b == b'<' {
                    self.emit_text(sink);
                    self.clear_tag();
                    self.state = State::TagOpen;
                } else {
                    self.push(Buffer::Text, b, sink);
                }
            }
            State::TagOpen => {
                if b == b'/' && self.tag.is_empty() {
                    self.state = State::TagClose;
                } else if is_whitespace(b) {
                    self.emit_tag_start_once(sink);
                    self.state = State::AttrName;
                } else if b == b'>' {
                    self.emit_tag_start_once(sink);
                    self.state = State::Text;
                } else {
                    self.push(Buffer::Tag, b, sink);
                }
            }
            State::AttrName => {
                if b == b'>' {
                    self.emit_tag_start_once(sink);
                    self.state = State::Text;
                } else if b == b'=' {
                    self.state = State::AttrValueAwaitingQuote;
                } else if !is_whitespace(b) {
                    self.push(Buffer::AttrName, b, sink);
                }
            }
            State::AttrValueAwaitingQuote => {
                if b == b'"' || b == b'\'' {
                    self.quote = b;
                    self.attr_value.clear();
                    self.state = State::AttrValue;
                }
            }
            State::AttrValue => {
                if b == self.quote {
                    sink.attribute(
                        &String::from_utf8_lossy(&self.tag),
                        &String::from_utf8_lossy(&self.attr_name),
                        &String::from_utf8_lossy(&self.attr_value),
                    );
                    self.attr_name.clear();
                    self.attr_value.clear();
                    self.state = State::AttrName;
                } else {
                    self.push(Buffer::AttrValue, b, sink);
                }
            }
            State::TagClose => {
                if b == b'>' {
                    sink.tag_end(&String::from_utf8_lossy(&self.tag));
                    self.tag.clear();
                    self.state = State::Text;
                } else {
                    self.push(Buffer::Tag, b, sink);
                }
            }
            State::Discard => {
                if b == b'<' {
                    self.clear_tag();
                    self.state = State::TagOpen;
                }
            }
        }
    }

    fn push<S: XmlEventSink + ?Sized>(&mut self, buffer: Buffer, b: u8, sink: &mut S) {
        let buf = match buffer {
            Buffer::Text => &mut self.text,
            Buffer::Tag => &mut self.tag,
            Buffer::AttrName => &mut self.attr_name,
            Buffer::AttrValue => &mut self.attr_value,
        };
        if buf.len() >= self.max_token_len {
            tracing::warn!(
                "INDI token exceeded {} bytes in {:?} state - discarding up to next tag",
                self.max_token_len,
                self.state
            );
            self.text.clear();
            self.clear_tag();
            self.state = State::Discard;
            sink.overflow();
            return;
        }
        buf.push(b);
    }

    fn emit_text<S: XmlEventSink + ?Sized>(&mut self, sink: &mut S) {
        if !self.text.is_empty() {
            let text = String::from_utf8_lossy(&self.text);
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                sink.text(trimmed);
            }
            self.text.clear();
        }
    }

    fn emit_tag_start_once<S: XmlEventSink + ?Sized>(&mut self, sink: &mut S) {
        if !self.tag_started {
            self.tag_started = true;
            sink.tag_start(&String::from_utf8_lossy(&self.tag));
        }
    }

    fn clear_tag(&mut self) {
        self.tag.clear();
        self.attr_name.clear();
        self.attr_value.clear();
        self.tag_started = false;
    }
}

#[derive(Debug, Clone, Copy)]
enum Buffer {
    Text,
    Tag,
    AttrName,
    AttrValue,
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\n' | b'\t' | b'\r')
}
