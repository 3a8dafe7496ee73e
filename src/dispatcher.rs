//! C6 — Dispatcher.
//!
//! The wire-facing seam between the router and the rest of the cluster
//! controller: classifies an inbound [`Message`] by
//! [`crate::domain::MessageType`] and routes it to whichever component owns
//! that concern (a registered [`RequestInterpreter`] for request/one-way,
//! the Reply Caller Directory for replies, the Publication Manager for
//! subscription control traffic, the Subscription Manager for inbound
//! publications). Outbound, it is the one place that knows how to stamp the
//! header fields (`requestReplyId`, `subscriptionId`, `multicastId`, `error`)
//! a given message type correlates on, since [`Message`] itself carries only
//! opaque custom headers, not a dedicated correlation-id field.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::domain::message::{now_ms, CustomHeaders, EffortLevel, MessageParams};
use crate::domain::{
    Message, MessageType, ParticipantId, RequestReplyId, SubscriptionId, SubscriptionQos,
    HEADER_ERROR, HEADER_MULTICAST_ID, HEADER_REQUEST_REPLY_ID, HEADER_SUBSCRIPTION_ID,
};
use crate::publication_manager::{PublicationError, PublicationManager, PublicationRequest, ProviderCaller};
use crate::reply_caller_directory::{ReplyCaller, ReplyCallerDirectory, ReplyOutcome};
use crate::router::MessageRouter;
use crate::subscription_manager::SubscriptionManager;

/// Errors raised dispatching or building a message.
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// A message of a type that correlates on a header arrived without it.
    #[error("message is missing required header `{0}`")]
    MissingHeader(&'static str),
    /// A header's value could not be parsed into the type it correlates.
    #[error("header `{header}` could not be parsed: {reason}")]
    MalformedHeader {
        /// The offending header name.
        header: &'static str,
        /// Why it could not be parsed.
        reason: String,
    },
    /// A subscription-control payload was not valid JSON, or did not match
    /// [`WireSubscriptionRequest`]'s shape.
    #[error("malformed subscription request payload: {0}")]
    MalformedSubscriptionRequest(serde_json::Error),
    /// The envelope itself was malformed.
    #[error(transparent)]
    Message(#[from] crate::domain::message::MessageError),
    /// The publication manager rejected the request.
    #[error(transparent)]
    Publication(#[from] PublicationError),
}

/// Provider-side handler for inbound requests and one-way messages,
/// registered per participant at provider-registration time.
#[async_trait]
pub trait RequestInterpreter: Send + Sync {
    /// Handles `request`'s payload, returning the serialized reply payload
    /// or a human-readable failure description.
    async fn invoke(&self, request: &Message) -> Result<Vec<u8>, String>;
}

/// The wire shape of a subscription-control message's payload: the Dispatcher
/// needs enough structure here to hand a complete [`PublicationRequest`] to
/// the Publication Manager, which is more than an opaque byte string can
/// carry without a private parsing convention of its own.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct WireSubscriptionRequest {
    /// Caller-supplied subscription id, if the consumer chose one.
    pub subscription_id: Option<SubscriptionId>,
    /// Name of the attribute or broadcast being subscribed to.
    pub attribute_or_broadcast_name: String,
    /// The requested qos.
    pub qos: SubscriptionQos,
    /// Ordered partition path; empty for a plain attribute/broadcast
    /// subscription.
    pub partitions: Vec<String>,
}

/// Classifies inbound messages and provides the correlating outbound
/// builders for request/reply, one-way, and subscription-control traffic.
pub struct Dispatcher {
    router: Arc<MessageRouter>,
    replies: Arc<ReplyCallerDirectory>,
    subscriptions: Arc<SubscriptionManager>,
    publications: Arc<PublicationManager>,
    interpreters: DashMap<ParticipantId, Arc<dyn RequestInterpreter>>,
    providers: DashMap<ParticipantId, Arc<dyn ProviderCaller>>,
    default_reply_ttl_ms: u64,
}

impl Dispatcher {
    /// Builds a dispatcher wiring the given components together.
    #[must_use]
    pub fn new(
        router: Arc<MessageRouter>,
        replies: Arc<ReplyCallerDirectory>,
        subscriptions: Arc<SubscriptionManager>,
        publications: Arc<PublicationManager>,
        default_reply_ttl_ms: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            router,
            replies,
            subscriptions,
            publications,
            interpreters: DashMap::new(),
            providers: DashMap::new(),
            default_reply_ttl_ms,
        })
    }

    /// Registers the request interpreter and provider caller for a locally
    /// hosted provider. Both are looked up by `participant_id` when an
    /// inbound message names it as the recipient.
    pub fn register_provider(
        &self,
        participant_id: ParticipantId,
        interpreter: Arc<dyn RequestInterpreter>,
        provider: Arc<dyn ProviderCaller>,
    ) {
        self.interpreters.insert(participant_id, interpreter);
        self.providers.insert(participant_id, provider);
    }

    /// Removes a previously registered provider.
    pub fn unregister_provider(&self, participant_id: &ParticipantId) {
        self.interpreters.remove(participant_id);
        self.providers.remove(participant_id);
    }

    /// Classifies `message` and dispatches it to the owning component.
    #[instrument(skip(self, message), fields(message_id = %message.message_id(), message_type = ?message.message_type()))]
    pub async fn dispatch_inbound(self: &Arc<Self>, message: Message) -> Result<(), DispatcherError> {
        match message.message_type() {
            MessageType::Request => self.dispatch_request(message).await,
            MessageType::OneWay => self.dispatch_one_way(message).await,
            MessageType::Reply => self.dispatch_reply(message),
            MessageType::SubscriptionRequest
            | MessageType::MulticastSubscriptionRequest
            | MessageType::BroadcastSubscriptionRequest => self.dispatch_subscription_request(message),
            MessageType::SubscriptionStop => self.dispatch_subscription_stop(message),
            MessageType::Publication => self.dispatch_publication(message),
            MessageType::Multicast => self.dispatch_multicast(message),
            MessageType::SubscriptionReply => {
                // Consumer-side acknowledgement; nothing further to route.
                Ok(())
            }
        }
    }

    async fn dispatch_request(self: &Arc<Self>, message: Message) -> Result<(), DispatcherError> {
        let request_reply_id = read_request_reply_id(&message)?;
        let sender = message.sender();
        let recipient = message.recipient();
        let expiry_ms = message.expiry_ms();

        let Some(interpreter) = self.interpreters.get(&recipient).map(|e| e.clone()) else {
            warn!(%recipient, "no request interpreter registered for inbound request");
            return self
                .send_reply(recipient, sender, request_reply_id, Err("no such provider".to_string()), expiry_ms)
                .await;
        };

        let outcome = interpreter.invoke(&message).await;
        self.send_reply(recipient, sender, request_reply_id, outcome, expiry_ms).await
    }

    async fn dispatch_one_way(self: &Arc<Self>, message: Message) -> Result<(), DispatcherError> {
        let Some(interpreter) = self.interpreters.get(&message.recipient()).map(|e| e.clone()) else {
            warn!(recipient = %message.recipient(), "no request interpreter registered for inbound one-way message");
            return Ok(());
        };
        if let Err(reason) = interpreter.invoke(&message).await {
            warn!(recipient = %message.recipient(), reason, "one-way interpreter returned an error");
        }
        Ok(())
    }

    fn dispatch_reply(&self, message: Message) -> Result<(), DispatcherError> {
        let request_reply_id = read_request_reply_id(&message)?;
        let Some(caller) = self.replies.take(request_reply_id) else {
            warn!(%request_reply_id, "reply arrived with no matching caller (already timed out)");
            return Ok(());
        };
        let outcome = if message.headers().contains_key(HEADER_ERROR) {
            ReplyOutcome::TimedOut
        } else {
            ReplyOutcome::Reply(message)
        };
        caller(outcome);
        Ok(())
    }

    fn dispatch_subscription_request(self: &Arc<Self>, message: Message) -> Result<(), DispatcherError> {
        let provider_id = message.recipient();
        let consumer_id = message.sender();
        let wire: WireSubscriptionRequest =
            serde_json::from_slice(message.payload()).map_err(DispatcherError::MalformedSubscriptionRequest)?;
        let Some(provider) = self.providers.get(&provider_id).map(|e| e.clone()) else {
            warn!(%provider_id, "subscription request for unknown local provider");
            return Ok(());
        };
        let subscription_id = wire.subscription_id.unwrap_or_else(SubscriptionId::generate);
        let outcome = self
            .publications
            .add(
                PublicationRequest {
                    subscription_id,
                    provider_id,
                    consumer_id,
                    attribute_or_broadcast_name: wire.attribute_or_broadcast_name,
                    qos: wire.qos,
                },
                provider,
            )
            .map_err(|err| err.to_string());
        self.send_subscription_reply(provider_id, consumer_id, subscription_id, outcome);
        Ok(())
    }

    fn dispatch_subscription_stop(&self, message: Message) -> Result<(), DispatcherError> {
        let subscription_id = read_subscription_id(&message)?;
        self.publications.remove(&subscription_id);
        Ok(())
    }

    fn dispatch_publication(self: &Arc<Self>, message: Message) -> Result<(), DispatcherError> {
        let subscription_id = read_subscription_id(&message)?;
        if !self.subscriptions.deliver(&subscription_id, message) {
            warn!(%subscription_id, "publication arrived for unknown subscription");
        }
        Ok(())
    }

    fn dispatch_multicast(&self, message: Message) -> Result<(), DispatcherError> {
        let multicast_id = message
            .headers()
            .get(HEADER_MULTICAST_ID)
            .cloned()
            .ok_or(DispatcherError::MissingHeader(HEADER_MULTICAST_ID))?;
        let listeners = self.subscriptions.get_subscription_listeners(&multicast_id);
        for listener in listeners {
            listener.on_receive(message.clone());
        }
        Ok(())
    }

    async fn send_reply(
        self: &Arc<Self>,
        sender: ParticipantId,
        recipient: ParticipantId,
        request_reply_id: RequestReplyId,
        outcome: Result<Vec<u8>, String>,
        request_expiry_ms: u64,
    ) -> Result<(), DispatcherError> {
        let mut headers = CustomHeaders::new();
        headers.insert(HEADER_REQUEST_REPLY_ID.to_string(), request_reply_id.to_string());
        let payload = match outcome {
            Ok(payload) => payload,
            Err(reason) => {
                headers.insert(HEADER_ERROR.to_string(), reason);
                Vec::new()
            }
        };
        let reply_ttl_ms = self.default_reply_ttl_ms.min(request_expiry_ms.saturating_sub(now_ms()).max(1));
        let message = Message::try_new(MessageParams {
            sender,
            recipient,
            message_type: MessageType::Reply,
            expiry_ms: now_ms() + reply_ttl_ms,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers,
            encrypt: false,
            compress: false,
            payload,
        })?;
        self.router.route(message, 0).await;
        Ok(())
    }

    /// Acknowledges a subscription request back to the consumer, carrying
    /// the (possibly provider-assigned) `subscriptionId` and an `error`
    /// header if registration failed.
    fn send_subscription_reply(
        self: &Arc<Self>,
        sender: ParticipantId,
        recipient: ParticipantId,
        subscription_id: SubscriptionId,
        outcome: Result<(), String>,
    ) {
        let mut headers = CustomHeaders::new();
        headers.insert(HEADER_SUBSCRIPTION_ID.to_string(), subscription_id.to_string());
        if let Err(reason) = outcome {
            headers.insert(HEADER_ERROR.to_string(), reason);
        }
        let message = match Message::try_new(MessageParams {
            sender,
            recipient,
            message_type: MessageType::SubscriptionReply,
            expiry_ms: now_ms() + self.default_reply_ttl_ms,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers,
            encrypt: false,
            compress: false,
            payload: Vec::new(),
        }) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, %subscription_id, "failed to build subscription reply message");
                return;
            }
        };
        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            router.route(message, 0).await;
        });
    }

    /// Routes `payload` to `recipient` as a request, registering `caller` to
    /// fire on the correlated reply or on TTL expiry.
    ///
    /// # Errors
    ///
    /// Returns [`DispatcherError::Message`] if `sender == recipient`.
    #[instrument(skip(self, payload, caller), fields(%sender, %recipient, ttl_ms))]
    pub fn send_request(
        self: &Arc<Self>,
        sender: ParticipantId,
        recipient: ParticipantId,
        payload: Vec<u8>,
        ttl_ms: u64,
        caller: ReplyCaller,
    ) -> Result<RequestReplyId, DispatcherError> {
        let request_reply_id = RequestReplyId::generate();
        let mut headers = CustomHeaders::new();
        headers.insert(HEADER_REQUEST_REPLY_ID.to_string(), request_reply_id.to_string());
        let message = Message::try_new(MessageParams {
            sender,
            recipient,
            message_type: MessageType::Request,
            expiry_ms: now_ms() + ttl_ms,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers,
            encrypt: false,
            compress: false,
            payload,
        })?;
        self.replies.add(request_reply_id, caller, ttl_ms);
        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            router.route(message, 0).await;
        });
        Ok(request_reply_id)
    }

    /// Routes `payload` to `recipient` as a fire-and-forget message; no
    /// reply is expected or awaited.
    ///
    /// # Errors
    ///
    /// Returns [`DispatcherError::Message`] if `sender == recipient`.
    pub fn send_one_way(
        self: &Arc<Self>,
        sender: ParticipantId,
        recipient: ParticipantId,
        payload: Vec<u8>,
        ttl_ms: u64,
    ) -> Result<(), DispatcherError> {
        let message = Message::try_new(MessageParams {
            sender,
            recipient,
            message_type: MessageType::OneWay,
            expiry_ms: now_ms() + ttl_ms,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers: CustomHeaders::new(),
            encrypt: false,
            compress: false,
            payload,
        })?;
        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            router.route(message, 0).await;
        });
        Ok(())
    }

    /// Routes `payload` as a multicast, tagged with `multicast_id` so the
    /// receiving Subscription Managers can match it against their
    /// registered wildcard patterns. Fan-out itself is resolved by the
    /// router's registered receiver set (see
    /// [`MessageRouter::add_multicast_receiver`]).
    ///
    /// # Errors
    ///
    /// Returns [`DispatcherError::Message`] if `sender` collides with the
    /// internally generated placeholder recipient (practically never, as
    /// it is freshly generated).
    pub fn send_multicast(
        self: &Arc<Self>,
        sender: ParticipantId,
        multicast_id: &str,
        payload: Vec<u8>,
        ttl_ms: u64,
    ) -> Result<(), DispatcherError> {
        let mut headers = CustomHeaders::new();
        headers.insert(HEADER_MULTICAST_ID.to_string(), multicast_id.to_string());
        // Multicast fan-out is resolved entirely from the router's receiver
        // set; `recipient` is unused by that path but must differ from
        // `sender` to satisfy the envelope's own invariant.
        let message = Message::try_new(MessageParams {
            sender,
            recipient: ParticipantId::generate(),
            message_type: MessageType::Multicast,
            expiry_ms: now_ms() + ttl_ms,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers,
            encrypt: false,
            compress: false,
            payload,
        })?;
        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            router.route(message, 0).await;
        });
        Ok(())
    }

    /// Routes a one-off unicast publication to `consumer_id`, tagged with
    /// `subscription_id`. The Publication Manager's own wiring publishes
    /// through the router directly for qos-driven ticks; this is the
    /// Dispatcher-level entry point for an ad hoc push outside that wiring.
    ///
    /// # Errors
    ///
    /// Returns [`DispatcherError::Message`] if `provider_id == consumer_id`.
    pub fn send_publication(
        self: &Arc<Self>,
        provider_id: ParticipantId,
        consumer_id: ParticipantId,
        subscription_id: &SubscriptionId,
        payload: Vec<u8>,
        ttl_ms: u64,
    ) -> Result<(), DispatcherError> {
        let mut headers = CustomHeaders::new();
        headers.insert(HEADER_SUBSCRIPTION_ID.to_string(), subscription_id.to_string());
        let message = Message::try_new(MessageParams {
            sender: provider_id,
            recipient: consumer_id,
            message_type: MessageType::Publication,
            expiry_ms: now_ms() + ttl_ms,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers,
            encrypt: false,
            compress: false,
            payload,
        })?;
        let router = Arc::clone(&self.router);
        tokio::spawn(async move {
            router.route(message, 0).await;
        });
        Ok(())
    }
}

fn read_request_reply_id(message: &Message) -> Result<RequestReplyId, DispatcherError> {
    let raw = message
        .headers()
        .get(HEADER_REQUEST_REPLY_ID)
        .ok_or(DispatcherError::MissingHeader(HEADER_REQUEST_REPLY_ID))?;
    let uuid = Uuid::parse_str(raw).map_err(|err| DispatcherError::MalformedHeader {
        header: HEADER_REQUEST_REPLY_ID,
        reason: err.to_string(),
    })?;
    Ok(RequestReplyId::new(uuid))
}

fn read_subscription_id(message: &Message) -> Result<SubscriptionId, DispatcherError> {
    let raw = message
        .headers()
        .get(HEADER_SUBSCRIPTION_ID)
        .ok_or(DispatcherError::MissingHeader(HEADER_SUBSCRIPTION_ID))?;
    SubscriptionId::try_new(raw.clone()).map_err(|err| DispatcherError::MalformedHeader {
        header: HEADER_SUBSCRIPTION_ID,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::qos::{MinIntervalMs, OnChangeQos, PublicationTtlMs};
    use crate::domain::Address;
    use crate::message_queue::{MessageQueue, MessageQueueCaps};
    use crate::routing_table::RoutingTable;
    use crate::scheduler::DelayedScheduler;
    use crate::stub_factory::{InProcessFactory, StubFactory};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    struct EchoInterpreter;

    #[async_trait]
    impl RequestInterpreter for EchoInterpreter {
        async fn invoke(&self, request: &Message) -> Result<Vec<u8>, String> {
            Ok(request.payload().to_vec())
        }
    }

    struct FailingInterpreter;

    #[async_trait]
    impl RequestInterpreter for FailingInterpreter {
        async fn invoke(&self, _request: &Message) -> Result<Vec<u8>, String> {
            Err("boom".to_string())
        }
    }

    struct NoopProvider;

    impl ProviderCaller for NoopProvider {
        fn read_value(&self, _name: &str) -> Vec<u8> {
            Vec::new()
        }
        fn subscribe_to_changes(&self, _name: &str, _on_change: Arc<dyn Fn(Vec<u8>) + Send + Sync>) {}
    }

    fn build_dispatcher(
        inbound: mpsc::UnboundedSender<Message>,
    ) -> (Arc<Dispatcher>, Arc<MessageRouter>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let routing_table = Arc::new(RoutingTable::new());
        let queue = Arc::new(MessageQueue::new(MessageQueueCaps {
            global_byte_cap: 1_000_000,
            global_count_cap: 1_000,
            per_key_count_cap: 1_000,
        }));
        let stubs = Arc::new(StubFactory::new());
        let scheduler = DelayedScheduler::new(4);
        stubs.register_middleware_factory(Arc::new(InProcessFactory::new(inbound)));
        let router = MessageRouter::new(routing_table, queue, stubs, Arc::clone(&scheduler), crate::router::RetryPolicy::default());
        let replies = ReplyCallerDirectory::new(Arc::clone(&scheduler));
        let subscriptions = SubscriptionManager::new(Arc::clone(&scheduler));
        let publications = PublicationManager::new(scheduler, Arc::clone(&router), dir.path().join("pub")).unwrap();
        let dispatcher = Dispatcher::new(router.clone(), replies, subscriptions, publications, 30_000);
        (dispatcher, router, dir)
    }

    fn request_message(sender: ParticipantId, recipient: ParticipantId, request_reply_id: RequestReplyId) -> Message {
        let mut headers = CustomHeaders::new();
        headers.insert(HEADER_REQUEST_REPLY_ID.to_string(), request_reply_id.to_string());
        Message::try_new(MessageParams {
            sender,
            recipient,
            message_type: MessageType::Request,
            expiry_ms: now_ms() + 60_000,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers,
            encrypt: false,
            compress: false,
            payload: vec![7, 8, 9],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn request_with_registered_interpreter_routes_a_reply() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (dispatcher, router, _dir) = build_dispatcher(tx);
        let consumer = ParticipantId::generate();
        let provider = ParticipantId::generate();
        router.add_next_hop(consumer, Address::InProcess, false, u64::MAX, false).await;
        dispatcher.register_provider(provider, Arc::new(EchoInterpreter), Arc::new(NoopProvider));

        let request_reply_id = RequestReplyId::generate();
        let message = request_message(consumer, provider, request_reply_id);
        dispatcher.dispatch_inbound(message).await.unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.message_type(), MessageType::Reply);
        assert_eq!(reply.payload(), &[7, 8, 9]);
        assert_eq!(
            reply.headers().get(HEADER_REQUEST_REPLY_ID).unwrap(),
            &request_reply_id.to_string()
        );
    }

    #[tokio::test]
    async fn failing_interpreter_routes_an_error_reply() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (dispatcher, router, _dir) = build_dispatcher(tx);
        let consumer = ParticipantId::generate();
        let provider = ParticipantId::generate();
        router.add_next_hop(consumer, Address::InProcess, false, u64::MAX, false).await;
        dispatcher.register_provider(provider, Arc::new(FailingInterpreter), Arc::new(NoopProvider));

        let message = request_message(consumer, provider, RequestReplyId::generate());
        dispatcher.dispatch_inbound(message).await.unwrap();

        let reply = rx.recv().await.unwrap();
        assert_eq!(reply.headers().get(HEADER_ERROR).unwrap(), "boom");
    }

    #[tokio::test]
    async fn reply_with_no_pending_caller_is_dropped_quietly() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (dispatcher, _router, _dir) = build_dispatcher(tx);
        let mut headers = CustomHeaders::new();
        headers.insert(HEADER_REQUEST_REPLY_ID.to_string(), RequestReplyId::generate().to_string());
        let message = Message::try_new(MessageParams {
            sender: ParticipantId::generate(),
            recipient: ParticipantId::generate(),
            message_type: MessageType::Reply,
            expiry_ms: u64::MAX,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers,
            encrypt: false,
            compress: false,
            payload: Vec::new(),
        })
        .unwrap();
        dispatcher.dispatch_inbound(message).await.unwrap();
    }

    #[tokio::test]
    async fn reply_fires_registered_caller() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (dispatcher, _router, _dir) = build_dispatcher(tx);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let sender = ParticipantId::generate();
        let recipient = ParticipantId::generate();
        let request_reply_id = dispatcher
            .send_request(
                sender,
                recipient,
                vec![1],
                10_000,
                Box::new(move |outcome| {
                    assert!(matches!(outcome, ReplyOutcome::Reply(_)));
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        let mut headers = CustomHeaders::new();
        headers.insert(HEADER_REQUEST_REPLY_ID.to_string(), request_reply_id.to_string());
        let reply = Message::try_new(MessageParams {
            sender: recipient,
            recipient: sender,
            message_type: MessageType::Reply,
            expiry_ms: u64::MAX,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers,
            encrypt: false,
            compress: false,
            payload: vec![2],
        })
        .unwrap();
        dispatcher.dispatch_inbound(reply).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscription_request_wires_publication_manager() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (dispatcher, _router, _dir) = build_dispatcher(tx);
        let provider_id = ParticipantId::generate();
        let consumer_id = ParticipantId::generate();
        dispatcher.register_provider(provider_id, Arc::new(EchoInterpreter), Arc::new(NoopProvider));

        let wire = WireSubscriptionRequest {
            subscription_id: None,
            attribute_or_broadcast_name: "speed".to_string(),
            qos: SubscriptionQos::OnChange(OnChangeQos::new(
                MinIntervalMs::try_new(0).unwrap(),
                now_ms() + 60_000,
                PublicationTtlMs::try_new(1000).unwrap(),
            )),
            partitions: Vec::new(),
        };
        let message = Message::try_new(MessageParams {
            sender: consumer_id,
            recipient: provider_id,
            message_type: MessageType::SubscriptionRequest,
            expiry_ms: now_ms() + 60_000,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers: CustomHeaders::new(),
            encrypt: false,
            compress: false,
            payload: serde_json::to_vec(&wire).unwrap(),
        })
        .unwrap();
        dispatcher.dispatch_inbound(message).await.unwrap();
        assert_eq!(dispatcher.publications.len(), 1);
    }

    #[tokio::test]
    async fn subscription_request_sends_reply_with_subscription_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (dispatcher, router, _dir) = build_dispatcher(tx);
        let provider_id = ParticipantId::generate();
        let consumer_id = ParticipantId::generate();
        router.add_next_hop(consumer_id, Address::InProcess, false, u64::MAX, false).await;
        dispatcher.register_provider(provider_id, Arc::new(EchoInterpreter), Arc::new(NoopProvider));

        let wire = WireSubscriptionRequest {
            subscription_id: None,
            attribute_or_broadcast_name: "speed".to_string(),
            qos: SubscriptionQos::OnChange(OnChangeQos::new(
                MinIntervalMs::try_new(0).unwrap(),
                now_ms() + 60_000,
                PublicationTtlMs::try_new(1000).unwrap(),
            )),
            partitions: Vec::new(),
        };
        let message = Message::try_new(MessageParams {
            sender: consumer_id,
            recipient: provider_id,
            message_type: MessageType::SubscriptionRequest,
            expiry_ms: now_ms() + 60_000,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers: CustomHeaders::new(),
            encrypt: false,
            compress: false,
            payload: serde_json::to_vec(&wire).unwrap(),
        })
        .unwrap();
        dispatcher.dispatch_inbound(message).await.unwrap();

        let reply = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("subscription reply arrives before the test timeout")
            .expect("dispatch loop channel stays open");
        assert_eq!(reply.message_type(), MessageType::SubscriptionReply);
        assert!(reply.headers().contains_key(HEADER_SUBSCRIPTION_ID));
        assert!(!reply.headers().contains_key(HEADER_ERROR));
    }

    #[tokio::test]
    async fn multicast_fans_out_to_matching_listeners() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (dispatcher, _router, _dir) = build_dispatcher(tx);
        struct RecordingListener(Arc<AtomicUsize>);
        impl crate::subscription_manager::SubscriptionListener for RecordingListener {
            fn on_receive(&self, _message: Message) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn on_error(&self, _subscription_id: &SubscriptionId) {}
            fn on_unsubscribed(&self, _subscription_id: &SubscriptionId) {}
        }
        let received = Arc::new(AtomicUsize::new(0));
        let provider = ParticipantId::generate();
        dispatcher
            .subscriptions
            .register_multicast_subscription(
                "event",
                provider,
                &["+".to_string()],
                Arc::new(RecordingListener(received.clone())),
                SubscriptionQos::OnChange(OnChangeQos::new(
                    MinIntervalMs::try_new(0).unwrap(),
                    now_ms() + 60_000,
                    PublicationTtlMs::try_new(1000).unwrap(),
                )),
                None,
            )
            .unwrap();

        let mut headers = CustomHeaders::new();
        headers.insert(HEADER_MULTICAST_ID.to_string(), format!("{provider}/event/north"));
        let message = Message::try_new(MessageParams {
            sender: provider,
            recipient: ParticipantId::generate(),
            message_type: MessageType::Multicast,
            expiry_ms: u64::MAX,
            effort: EffortLevel::Assured,
            reply_to: None,
            headers,
            encrypt: false,
            compress: false,
            payload: Vec::new(),
        })
        .unwrap();
        dispatcher.dispatch_inbound(message).await.unwrap();
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
