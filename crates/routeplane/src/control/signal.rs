//! Control signals

use std::fmt;

use routeplane_sdk::Message;
use serde::Serialize;

use crate::environment;

/// A recognized value of the `signal` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Start,
    Stop,
    Configure,
    Terminate,
}

impl Signal {
    /// Parse a header value. Matching ignores case and surrounding
    /// whitespace; anything unrecognized is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        [
            (environment::SIG_START, Signal::Start),
            (environment::SIG_STOP, Signal::Stop),
            (environment::SIG_CONFIGURE, Signal::Configure),
            (environment::SIG_TERMINATE, Signal::Terminate),
        ]
        .into_iter()
        .find(|(name, _)| raw.eq_ignore_ascii_case(name))
        .map(|(_, signal)| signal)
    }

    /// Read the signal carried by a message, if any.
    pub fn from_message(message: &Message) -> Option<Self> {
        message
            .header_str(environment::SIGNAL)
            .as_deref()
            .and_then(Self::parse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Start => environment::SIG_START,
            Signal::Stop => environment::SIG_STOP,
            Signal::Configure => environment::SIG_CONFIGURE,
            Signal::Terminate => environment::SIG_TERMINATE,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive_and_trimmed() {
        assert_eq!(Signal::parse("start"), Some(Signal::Start));
        assert_eq!(Signal::parse("  STOP "), Some(Signal::Stop));
        assert_eq!(Signal::parse("Configure"), Some(Signal::Configure));
        assert_eq!(Signal::parse("terminate\n"), Some(Signal::Terminate));
        assert_eq!(Signal::parse("restart"), None);
        assert_eq!(Signal::parse(""), None);
    }

    #[test]
    fn test_from_message() {
        let message = Message::new().header_value("Signal", "start");
        assert_eq!(Signal::from_message(&message), Some(Signal::Start));

        assert_eq!(Signal::from_message(&Message::new()), None);
        let message = Message::new().header_value(environment::SIGNAL, serde_json::Value::Null);
        assert_eq!(Signal::from_message(&message), None);
    }
}
