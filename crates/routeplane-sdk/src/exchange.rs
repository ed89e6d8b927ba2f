//! Message exchange passed to processors

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// A message exchange: the inbound message and the outbound message being
/// built by processors.
///
/// # Example
///
/// ```ignore
/// let mut exchange = Exchange::new("ex-1", Message::with_body("payload"));
/// exchange.out_mut().set_header("reply_to", "mock:replies");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Exchange {
    /// Exchange identifier for tracing
    #[serde(default)]
    pub id: String,

    /// Inbound message
    #[serde(rename = "in")]
    pub in_message: Message,

    /// Outbound message
    #[serde(default)]
    pub out: Message,
}

impl Exchange {
    /// Create an exchange around an inbound message.
    pub fn new(id: impl Into<String>, in_message: Message) -> Self {
        Self {
            id: id.into(),
            in_message,
            out: Message::new(),
        }
    }

    /// Inbound message.
    pub fn in_message(&self) -> &Message {
        &self.in_message
    }

    /// Outbound message.
    pub fn out(&self) -> &Message {
        &self.out
    }

    /// Mutable outbound message.
    pub fn out_mut(&mut self) -> &mut Message {
        &mut self.out
    }

    /// Consume the exchange, returning the outbound message.
    pub fn into_out(self) -> Message {
        self.out
    }
}
