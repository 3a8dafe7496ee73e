//! # ccmp - cluster-controller message plane
//!
//! Core of a distributed service-oriented middleware: a cluster controller
//! process that routes messages between local consumers/providers and peer
//! cluster controllers across WebSocket, MQTT, HTTP long-poll, and
//! in-process transports, resolves provider locations via a local cache
//! plus a global directory, and manages subscription/publication
//! lifecycles.
//!
//! ## Architecture
//!
//! Ten components, wired together by [`cc::ClusterController`]:
//!
//! - **C1** [`routing_table`] - participant id -> address, with sticky/expiry rules.
//! - **C2** [`message_queue`] - per-recipient FIFO with capacity eviction.
//! - **C3** [`stub_factory`] - transport-specific outbound connections, cached per address.
//! - **C4** [`router`] - retries, backoff, multicast fan-out.
//! - **C5** [`scheduler`] - bounded-concurrency delayed callbacks.
//! - **C6** [`dispatcher`] - classifies inbound messages, correlates replies/publications.
//! - **C7** [`reply_caller_directory`] - request/reply correlation with TTL.
//! - **C8** [`publication_manager`] - provider-side publication scheduling.
//! - **C9** [`subscription_manager`] - consumer-side subscription bookkeeping.
//! - **C10** [`lcd`] - local capabilities cache plus global directory client.

pub use crate::cc::*;
pub use crate::config::*;
pub use crate::dispatcher::*;
pub use crate::domain::*;
pub use crate::error::*;
pub use crate::lcd::*;
pub use crate::message_queue::*;
pub use crate::observability::*;
pub use crate::publication_manager::*;
pub use crate::reply_caller_directory::*;
pub use crate::router::*;
pub use crate::routing_table::*;
pub use crate::scheduler::*;
pub use crate::settings::*;
pub use crate::stub_factory::*;
pub use crate::subscription_manager::*;
pub use crate::time_provider::*;

pub mod cc;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod lcd;
pub mod message_queue;
pub mod observability;
pub mod persistence;
pub mod publication_manager;
pub mod reply_caller_directory;
pub mod router;
pub mod routing_table;
pub mod scheduler;
pub mod settings;
pub mod stub_factory;
pub mod subscription_manager;
pub mod time_provider;
pub mod utils;

// Common imports
pub use ::tracing::{debug, error, info, instrument, warn};
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use std::collections::HashMap;
pub use std::sync::Arc;
pub use std::time::Duration;
pub use thiserror::Error;
pub use uuid::Uuid;
