//! Top-level wiring: the `ClusterController` composes C1-C10 into one
//! running process, grounded on `WasmRuntime`'s shape (one struct owning
//! every subsystem, built once from a validated config and handed out as
//! `Arc` to whatever serves the external interfaces).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::config::CcConfig;
use crate::dispatcher::Dispatcher;
use crate::domain::Message;
use crate::error::CcError;
use crate::lcd::{GlobalDirectoryClient, HttpGlobalDirectoryClient, InMemoryGlobalDirectoryClient, LocalCapabilitiesDirectory};
use crate::message_queue::{MessageQueue, MessageQueueCaps};
use crate::persistence::MulticastReceiverStore;
use crate::publication_manager::PublicationManager;
use crate::reply_caller_directory::ReplyCallerDirectory;
use crate::router::{MessageRouter, RetryPolicy};
use crate::routing_table::RoutingTable;
use crate::scheduler::DelayedScheduler;
use crate::settings::{apply_to, SettingsSource};
use crate::stub_factory::{HttpFactory, InProcessFactory, MqttFactory, StubFactory, WebSocketFactory};
use crate::subscription_manager::SubscriptionManager;
use crate::time_provider::{production_time_provider, SharedTimeProvider};

/// Every component of the cluster controller, wired together and ready to
/// route, dispatch, and persist.
pub struct ClusterController {
    /// The validated configuration this instance was built from.
    pub config: CcConfig,
    /// C1 — routing table.
    pub routing_table: Arc<RoutingTable>,
    /// C2 — message queue.
    pub queue: Arc<MessageQueue>,
    /// C3 — stub factory.
    pub stubs: Arc<StubFactory>,
    /// C4 — message router.
    pub router: Arc<MessageRouter>,
    /// C5 — delayed scheduler.
    pub scheduler: Arc<DelayedScheduler>,
    /// C6 — dispatcher.
    pub dispatcher: Arc<Dispatcher>,
    /// C7 — reply caller directory.
    pub replies: Arc<ReplyCallerDirectory>,
    /// C8 — publication manager.
    pub publications: Arc<PublicationManager>,
    /// C9 — subscription manager.
    pub subscriptions: Arc<SubscriptionManager>,
    /// C10 — local capabilities directory.
    pub lcd: Arc<LocalCapabilitiesDirectory>,
    /// Shared time source, swapped for a mock in tests.
    pub time_provider: SharedTimeProvider,
    /// WebSocket client connections keyed by connection id, shared with
    /// whatever accepts inbound WebSocket connections.
    pub ws_client_senders: Arc<DashMap<String, mpsc::UnboundedSender<Message>>>,
    inbound_tx: mpsc::UnboundedSender<Message>,
}

impl ClusterController {
    /// Builds every component from `config` and starts the inbound
    /// dispatch loop that feeds locally delivered messages into the
    /// dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`CcError`] if persistence paths cannot be opened.
    #[instrument(skip(config))]
    pub fn start(config: CcConfig) -> Result<Arc<Self>, CcError> {
        config.validate()?;

        let routing_table = Arc::new(RoutingTable::new());
        let queue = Arc::new(MessageQueue::new(MessageQueueCaps {
            global_byte_cap: config.queue_global_byte_cap,
            global_count_cap: config.queue_global_count_cap,
            per_key_count_cap: config.queue_per_key_count_cap,
        }));

        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<Message>();
        let ws_client_senders: Arc<DashMap<String, mpsc::UnboundedSender<Message>>> =
            Arc::new(DashMap::new());

        let stubs = Arc::new(StubFactory::new());
        stubs.register_middleware_factory(Arc::new(InProcessFactory::new(inbound_tx.clone())));
        stubs.register_middleware_factory(Arc::new(WebSocketFactory::new(Arc::clone(&ws_client_senders))));
        stubs.register_middleware_factory(Arc::new(MqttFactory::new()));
        stubs.register_middleware_factory(Arc::new(HttpFactory::new()));

        let scheduler = DelayedScheduler::new(config.scheduler_worker_count);

        let retry_policy = RetryPolicy {
            max_retries: config.router_max_retries,
            backoff_base_ms: config.router_retry_backoff_base_ms,
            backoff_factor: config.router_retry_backoff_factor,
            backoff_cap_ms: config.router_retry_backoff_cap_ms,
        };
        let router = MessageRouter::new(
            Arc::clone(&routing_table),
            Arc::clone(&queue),
            Arc::clone(&stubs),
            Arc::clone(&scheduler),
            retry_policy,
        );
        let multicast_receiver_store = Arc::new(
            MulticastReceiverStore::load(config.multicast_receiver_directory_persistence_file.clone())
                .map_err(crate::persistence::PersistenceError::from)?,
        );
        router.load_multicast_receiver_store(multicast_receiver_store);

        let replies = ReplyCallerDirectory::new(Arc::clone(&scheduler));
        let subscriptions = SubscriptionManager::new(Arc::clone(&scheduler));
        let publications = PublicationManager::new(
            Arc::clone(&scheduler),
            Arc::clone(&router),
            config.record_store_dir.join("publications"),
        )?;

        let global_client: Arc<dyn GlobalDirectoryClient> =
            match &config.global_directory_base_url {
                Some(base_url) => Arc::new(HttpGlobalDirectoryClient::new(base_url.clone())),
                None => Arc::new(InMemoryGlobalDirectoryClient::new()),
            };
        let lcd = LocalCapabilitiesDirectory::open(
            config.record_store_dir.join("capabilities"),
            config.participant_ids_persistence_file.clone(),
            global_client,
            config.lcd_cache_max_age_ms,
        )?;

        let dispatcher = Dispatcher::new(
            Arc::clone(&router),
            Arc::clone(&replies),
            Arc::clone(&subscriptions),
            Arc::clone(&publications),
            config.reply_default_ttl_ms,
        );

        let cc = Arc::new(Self {
            config,
            routing_table,
            queue,
            stubs,
            router,
            scheduler,
            dispatcher,
            replies,
            publications,
            subscriptions,
            lcd,
            time_provider: production_time_provider(),
            ws_client_senders,
            inbound_tx,
        });

        let loop_dispatcher = Arc::clone(&cc.dispatcher);
        tokio::spawn(async move {
            while let Some(message) = inbound_rx.recv().await {
                if let Err(err) = loop_dispatcher.dispatch_inbound(message).await {
                    warn!(%err, "failed to dispatch inbound message");
                }
            }
            info!("inbound dispatch loop stopped, no more senders");
        });

        Ok(cc)
    }

    /// Convenience constructor that loads settings through `source` before
    /// starting, mapping them onto `base` (e.g. an environment-appropriate
    /// preset) before validation.
    ///
    /// # Errors
    ///
    /// Returns [`CcError`] if the settings source fails to load, a setting
    /// fails to parse, or the merged config fails validation.
    pub async fn start_with_settings(
        base: CcConfig,
        source: &dyn SettingsSource,
    ) -> Result<Arc<Self>, CcError> {
        let values: HashMap<String, String> = source.load().await?;
        let config = apply_to(&values, builder_from(base))?;
        Self::start(config)
    }

    /// Hands a clone of the inbound-message sender to a transport acceptor
    /// (e.g. a WebSocket handler) so it can feed received frames into the
    /// dispatch loop without reaching into the controller's internals.
    #[must_use]
    pub fn inbound_sender(&self) -> mpsc::UnboundedSender<Message> {
        self.inbound_tx.clone()
    }
}

/// Seeds a [`crate::config::CcConfigBuilder`] from an already-built config,
/// so a settings file can be layered onto any preset rather than only the
/// production default `CcConfig::builder()` starts from.
pub fn builder_from(base: CcConfig) -> crate::config::CcConfigBuilder {
    CcConfig::builder()
        .queue_global_byte_cap(base.queue_global_byte_cap)
        .queue_global_count_cap(base.queue_global_count_cap)
        .queue_per_key_count_cap(base.queue_per_key_count_cap)
        .router_max_retries(base.router_max_retries)
        .router_retry_backoff_base_ms(base.router_retry_backoff_base_ms)
        .router_retry_backoff_factor(base.router_retry_backoff_factor)
        .router_retry_backoff_cap_ms(base.router_retry_backoff_cap_ms)
        .scheduler_worker_count(base.scheduler_worker_count)
        .reply_default_ttl_ms(base.reply_default_ttl_ms)
        .lcd_cache_max_age_ms(base.lcd_cache_max_age_ms)
        .lcd_discovery_timeout_ms(base.lcd_discovery_timeout_ms)
        .lcd_retry_interval_ms(base.lcd_retry_interval_ms)
        .participant_ids_persistence_file(base.participant_ids_persistence_file)
        .multicast_receiver_directory_persistence_file(
            base.multicast_receiver_directory_persistence_file,
        )
        .record_store_dir(base.record_store_dir)
        .ws_port(base.ws_port)
        .ws_tls_port(base.ws_tls_port)
        .mqtt_broker_url(base.mqtt_broker_url)
        .log_level(base.log_level)
        .global_directory_base_url(base.global_directory_base_url)
}
