//! Exchange kinds, bindings and routing-key matching.

use std::fmt;
use std::str::FromStr;

use sbomer_core::config::BindingConfig;

use crate::error::QueueError;

/// How an exchange selects the bindings a message is copied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Binding key equals the routing key.
    Direct,
    /// Every binding, routing key ignored.
    Fanout,
    /// Dot-separated words, `*` matches one word and `#` zero or more.
    Topic,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Fanout => "fanout",
            Self::Topic => "topic",
        }
    }

    /// Whether a binding with `binding_key` receives a message published
    /// with `routing_key`.
    pub fn routes(&self, binding_key: &str, routing_key: &str) -> bool {
        match self {
            Self::Fanout => true,
            Self::Direct => binding_key == routing_key,
            Self::Topic => topic_matches(binding_key, routing_key),
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "fanout" => Ok(Self::Fanout),
            "topic" => Ok(Self::Topic),
            other => Err(QueueError::InvalidExchangeKind(other.to_owned())),
        }
    }
}

fn topic_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.split_first(), key.split_first()) {
        (None, None) => true,
        (Some((&"#", rest)), _) => {
            // '#' swallows zero words, or one word and stays
            match_words(rest, key) || (!key.is_empty() && match_words(pattern, &key[1..]))
        }
        (Some((&"*", rest)), Some((_, key_rest))) => match_words(rest, key_rest),
        (Some((word, rest)), Some((k, key_rest))) => word == k && match_words(rest, key_rest),
        _ => false,
    }
}

/// An exchange together with one consumer group bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub exchange: String,
    pub kind: ExchangeKind,
    /// Routing key used both for publishing and as the binding key.
    pub routing_key: String,
    pub consumer_group: String,
    /// Unacknowledged deliveries a subscription may hold.
    pub prefetch: usize,
}

impl TryFrom<&BindingConfig> for Binding {
    type Error = QueueError;

    fn try_from(config: &BindingConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            exchange: config.exchange.clone(),
            kind: config.exchange_type.parse()?,
            routing_key: config.routing_key.clone(),
            consumer_group: config.consumer_group.clone(),
            prefetch: config.prefetch.max(1),
        })
    }
}
