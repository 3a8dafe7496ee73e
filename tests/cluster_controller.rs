//! End-to-end coverage of `ClusterController::start`: wiring all ten
//! components together the way a real process does, rather than building
//! them by hand the way the per-module unit tests do.

use std::time::Duration;

use ccmp::cc::{builder_from, ClusterController};
use ccmp::config::CcConfig;
use ccmp::domain::{Address, Message, ParticipantId};
use ccmp::dispatcher::RequestInterpreter;
use ccmp::publication_manager::ProviderCaller;
use ccmp::reply_caller_directory::ReplyOutcome;
use ccmp::settings::{apply_to, InMemorySettingsSource, SettingsSource};
use async_trait::async_trait;
use tempfile::tempdir;
use tokio::sync::oneshot;

struct EchoInterpreter;

#[async_trait]
impl RequestInterpreter for EchoInterpreter {
    async fn invoke(&self, request: &Message) -> Result<Vec<u8>, String> {
        Ok(request.payload().to_vec())
    }
}

struct NoopProvider;

impl ProviderCaller for NoopProvider {
    fn read_value(&self, _name: &str) -> Vec<u8> {
        Vec::new()
    }
    fn subscribe_to_changes(&self, _name: &str, _on_change: std::sync::Arc<dyn Fn(Vec<u8>) + Send + Sync>) {}
}

fn testing_config(dir: &tempfile::TempDir) -> CcConfig {
    builder_from(CcConfig::testing())
        .record_store_dir(dir.path().to_path_buf())
        .participant_ids_persistence_file(dir.path().join("participant-ids.ini"))
        .multicast_receiver_directory_persistence_file(dir.path().join("multicast-receivers.ini"))
        .build()
        .expect("testing preset always validates")
}

#[tokio::test]
async fn request_reply_round_trips_through_a_started_controller() {
    let dir = tempdir().unwrap();
    let cc = ClusterController::start(testing_config(&dir)).expect("controller starts");

    let consumer = ParticipantId::generate();
    let provider = ParticipantId::generate();
    cc.router.add_next_hop(consumer, Address::InProcess, false, u64::MAX, false).await;
    cc.router.add_next_hop(provider, Address::InProcess, false, u64::MAX, false).await;
    cc.dispatcher.register_provider(provider, std::sync::Arc::new(EchoInterpreter), std::sync::Arc::new(NoopProvider));

    let (tx, rx) = oneshot::channel();
    cc.dispatcher
        .send_request(consumer, provider, vec![1, 2, 3], 5_000, Box::new(move |outcome| {
            let _ = tx.send(outcome);
        }))
        .expect("request message is well formed");

    let outcome = tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("reply arrives before the test timeout")
        .expect("caller is invoked exactly once");

    match outcome {
        ReplyOutcome::Reply(message) => assert_eq!(message.payload(), &[1, 2, 3]),
        ReplyOutcome::TimedOut => panic!("request should not time out against a registered provider"),
    }
}

#[tokio::test]
async fn request_to_an_unregistered_provider_times_out() {
    let dir = tempdir().unwrap();
    let mut config = testing_config(&dir);
    config.reply_default_ttl_ms = 50;
    let cc = ClusterController::start(config).expect("controller starts");

    let consumer = ParticipantId::generate();
    let provider = ParticipantId::generate();
    cc.router.add_next_hop(consumer, Address::InProcess, false, u64::MAX, false).await;
    cc.router.add_next_hop(provider, Address::InProcess, false, u64::MAX, false).await;

    let (tx, rx) = oneshot::channel();
    cc.dispatcher
        .send_request(consumer, provider, vec![9], 50, Box::new(move |outcome| {
            let _ = tx.send(outcome);
        }))
        .expect("request message is well formed");

    let outcome = tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("timeout notification arrives before the test timeout")
        .expect("caller is invoked exactly once");

    assert!(matches!(outcome, ReplyOutcome::TimedOut));
}

#[tokio::test]
async fn start_with_settings_layers_a_settings_source_onto_a_preset() {
    let dir = tempdir().unwrap();
    let mut values = std::collections::HashMap::new();
    values.insert("cluster-controller/ws-port".to_string(), "4242".to_string());
    values.insert("messaging/broker-url".to_string(), "tcp://broker.example:1883".to_string());
    let source = InMemorySettingsSource::new(values);

    let base = testing_config(&dir);
    let loaded = source.load().await.unwrap();
    let config = apply_to(&loaded, builder_from(base)).expect("settings merge onto the testing preset");

    assert_eq!(config.ws_port, Some(4242));
    assert_eq!(config.mqtt_broker_url.as_deref(), Some("tcp://broker.example:1883"));

    let cc = ClusterController::start(config).expect("merged config still validates and starts");
    assert_eq!(cc.config.ws_port, Some(4242));
}
