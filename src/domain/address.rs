//! Tagged destination address variants.
//!
//! Grounded on the re-architecture guidance in `SPEC_FULL.md` §9: model the
//! source's inheritance hierarchy of address classes as one tagged enum.
//! Each variant carries exactly the fields needed to key a stub in the
//! factory cache; `#[derive(Eq, Hash)]` gives correct per-variant equality
//! and hashing for free since every field is itself `Eq + Hash`.

use serde::{Deserialize, Serialize};

/// A destination address for an outbound message.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Address {
    /// A recipient hosted in this same cluster-controller process.
    InProcess,
    /// A consumer connected to this CC as a WebSocket client.
    WebSocketClient {
        /// Opaque connection id assigned when the client connected.
        connection_id: String,
    },
    /// A peer CC reachable as a WebSocket server.
    WebSocketServer {
        /// `ws://` or `wss://` URL of the peer's messaging endpoint.
        url: String,
    },
    /// A peer reachable via an MQTT broker on a fixed topic.
    Mqtt {
        /// Broker URL, e.g. `tcp://broker.example.com:1883`.
        broker_url: String,
        /// Topic this address publishes to.
        topic: String,
    },
    /// A peer reachable via an HTTP long-poll channel.
    HttpChannel {
        /// Base URL of the channel endpoint.
        url: String,
        /// Channel id distinguishing multiple long-poll sessions at the
        /// same URL.
        channel_id: String,
    },
}

impl Address {
    /// A short tag naming the variant, useful for logging and metrics
    /// without formatting the full address.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InProcess => "in-process",
            Self::WebSocketClient { .. } => "websocket-client",
            Self::WebSocketServer { .. } => "websocket-server",
            Self::Mqtt { .. } => "mqtt",
            Self::HttpChannel { .. } => "http-channel",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equality_and_hash_are_per_variant() {
        let a = Address::Mqtt {
            broker_url: "tcp://broker:1883".into(),
            topic: "t1".into(),
        };
        let b = Address::Mqtt {
            broker_url: "tcp://broker:1883".into(),
            topic: "t1".into(),
        };
        let c = Address::Mqtt {
            broker_url: "tcp://broker:1883".into(),
            topic: "t2".into(),
        };
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
        assert!(!set.contains(&c));
    }

    #[test]
    fn distinct_variants_are_never_equal() {
        assert_ne!(Address::InProcess, Address::WebSocketServer { url: "ws://x".into() });
    }
}
