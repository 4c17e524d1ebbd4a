//! [`Message`] is the uniform value that flows through every transform.
//!
//! Modeled as the tagged union the design notes recommend: a message either
//! carries a data payload, or is a control message that carries none. The
//! "empty-data-with-control-flag" encoding used internally by some streaming
//! systems is an implementation artifact this crate does not reproduce.
use crate::accessor::{self, Accessed};
use crate::Error;
use serde_json::Value;

/// A single unit of data flowing through the pipeline, or a control signal
/// instructing stateful transforms to flush buffered state.
///
/// Accessor reads never fail; a path that does not resolve reports
/// [`Accessed::Missing`]. A message is mutated by exactly one transform at a
/// time — the pipeline driver owns message ordering and never hands the same
/// message to two transforms concurrently.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Carries an opaque byte payload, interpreted as structured data only by
    /// the accessor methods.
    Data(Vec<u8>),
    /// Carries no payload; signals downstream stateful transforms to flush.
    Control,
}

/// An ordered sequence of output messages from a single `Transform` call.
pub type MessageBatch = Vec<Message>;

impl Default for Message {
    fn default() -> Self {
        Message::new()
    }
}

impl Message {
    /// Constructs an empty data message.
    pub fn new() -> Self {
        Message::Data(Vec::new())
    }

    /// Constructs a control message.
    pub fn control() -> Self {
        Message::Control
    }

    /// `true` if this is a control message.
    pub fn is_control(&self) -> bool {
        matches!(self, Message::Control)
    }

    /// Replaces the raw payload. Converts a control message into a data
    /// message.
    pub fn set_data(&mut self, bytes: Vec<u8>) {
        *self = Message::Data(bytes);
    }

    /// The raw payload. Empty for control messages.
    pub fn data(&self) -> &[u8] {
        match self {
            Message::Data(b) => b,
            Message::Control => &[],
        }
    }

    /// Reads a dotted path from the payload; see [`accessor::get`]. Always
    /// reports [`Accessed::Missing`] for control messages.
    pub fn get_value(&self, path: &str) -> Accessed {
        match self {
            Message::Data(bytes) => accessor::get(bytes, path),
            Message::Control => Accessed::Missing,
        }
    }

    /// Writes `value` at the dotted path `path`, creating intermediate
    /// objects/arrays as needed. A no-op on control messages (there is
    /// nothing to write into).
    pub fn set_value(&mut self, path: &str, value: Value) -> Result<(), Error> {
        match self {
            Message::Data(bytes) => {
                let updated = accessor::set(bytes, path, value)?;
                *bytes = updated;
                Ok(())
            }
            Message::Control => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_message_is_empty_data() {
        let m = Message::new();
        assert!(!m.is_control());
        assert_eq!(m.data(), b"");
    }

    #[test]
    fn control_message_has_no_payload() {
        let m = Message::control();
        assert!(m.is_control());
        assert_eq!(m.data(), b"");
        assert_eq!(m.get_value("anything"), Accessed::Missing);
    }

    #[test]
    fn set_then_get_value_round_trips() {
        let mut m = Message::new();
        m.set_value("a.b", json!(42)).unwrap();
        assert_eq!(m.get_value("a.b"), Accessed::Present(json!(42)));
    }
}
