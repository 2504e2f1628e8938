#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use herald_domain::{ChannelKey, ChatEvent, EventKind, SubjectKey};
use tokio::time::timeout;

use crate::server::recipients::{Delivery, Recipient, RecipientRegistry, RegistryConfig};

fn registry() -> RecipientRegistry {
	RecipientRegistry::new(RegistryConfig::default())
}

fn subject(name: &str) -> SubjectKey {
	SubjectKey::Channel(ChannelKey::new("libera", name).expect("valid channel key"))
}

fn event(subject: &SubjectKey, text: &str) -> Arc<ChatEvent> {
	Arc::new(
		ChatEvent::new(EventKind::Message, subject.clone(), 1_700_000_000_000)
			.with_username("someone")
			.with_text(text),
	)
}

async fn recv_event(rx: &mut tokio::sync::mpsc::Receiver<Delivery>) -> String {
	let item = timeout(Duration::from_millis(250), rx.recv())
		.await
		.expect("expected a delivery within timeout")
		.expect("channel open");

	match item {
		Delivery::Event { event, .. } => event.text.clone().unwrap_or_default(),
		other => panic!("expected Event delivery, got: {other:?}"),
	}
}

#[tokio::test]
async fn subscribe_is_idempotent() {
	let registry = registry();
	let chan = subject("chan1");

	let (recipient, mut rx) = Recipient::channel(1, 16);
	registry.subscribe(chan.clone(), recipient.clone()).await;
	registry.subscribe(chan.clone(), recipient).await;

	assert_eq!(registry.recipients_for(&chan).await.len(), 1);

	let stats = registry.deliver(&chan, event(&chan, "once")).await;
	assert_eq!(stats.delivered, 1);
	assert_eq!(recv_event(&mut rx).await, "once");

	// No duplicate delivery from the second subscribe.
	assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
}

#[tokio::test]
async fn snapshot_does_not_leak_registry_state() {
	let registry = registry();
	let chan = subject("chan1");

	let (recipient, _rx) = Recipient::channel(1, 16);
	registry.subscribe(chan.clone(), recipient).await;

	let mut snapshot = registry.recipients_for(&chan).await;
	snapshot.clear();

	assert_eq!(registry.recipients_for(&chan).await.len(), 1);
}

#[tokio::test]
async fn unsubscribe_everywhere_touches_only_own_subjects() {
	let registry = registry();
	let chan1 = subject("chan1");
	let chan2 = subject("chan2");

	let (s, _s_rx) = Recipient::channel(1, 16);
	let (t, _t_rx) = Recipient::channel(2, 16);

	registry.subscribe(chan1.clone(), s.clone()).await;
	registry.subscribe(chan2.clone(), s).await;
	registry.subscribe(chan1.clone(), t).await;

	let before: Vec<u64> = registry.recipients_for(&chan1).await.iter().map(Recipient::conn_id).collect();
	assert_eq!(before, vec![1, 2]);

	registry.unsubscribe_everywhere(1).await;

	let after: Vec<u64> = registry.recipients_for(&chan1).await.iter().map(Recipient::conn_id).collect();
	assert_eq!(after, vec![2]);
	assert!(registry.recipients_for(&chan2).await.is_empty());

	// Repeating the cleanup for an already-absent connection is a no-op.
	registry.unsubscribe_everywhere(1).await;
	assert_eq!(registry.recipients_for(&chan1).await.len(), 1);
}

#[tokio::test]
async fn unsubscribe_absent_subscriber_is_noop() {
	let registry = registry();
	let chan = subject("chan1");

	let (recipient, _rx) = Recipient::channel(1, 16);
	registry.subscribe(chan.clone(), recipient).await;

	registry.unsubscribe(&chan, 99).await;
	registry.unsubscribe(&subject("elsewhere"), 1).await;

	assert_eq!(registry.recipients_for(&chan).await.len(), 1);
}

#[tokio::test]
async fn unrecognized_category_is_silently_dropped() {
	let registry = registry();

	let (recipient, _rx) = Recipient::channel(1, 16);
	registry.subscribe_category("sidebar", recipient).await;

	assert!(registry.recipients_for_category("sidebar").await.is_empty());
	assert!(registry.subject_counts().await.is_empty());
}

#[tokio::test]
async fn supported_category_subscribes() {
	let registry = registry();

	let (recipient, mut rx) = Recipient::channel(1, 16);
	registry.subscribe_category("highlights", recipient).await;

	let recipients = registry.recipients_for_category("highlights").await;
	assert_eq!(recipients.len(), 1);

	let key: SubjectKey = "category:highlights".parse().expect("valid subject key");
	let stats = registry.deliver(&key, event(&key, "starred")).await;
	assert_eq!(stats.delivered, 1);
	assert_eq!(recv_event(&mut rx).await, "starred");
}

#[tokio::test]
async fn full_queue_is_isolated_and_flushes_lag_marker() {
	let registry = registry();
	let chan = subject("chan1");

	let (slow, mut slow_rx) = Recipient::channel(1, 3);
	let (healthy, mut healthy_rx) = Recipient::channel(2, 16);

	registry.subscribe(chan.clone(), slow).await;
	registry.subscribe(chan.clone(), healthy).await;

	for text in ["e1", "e2", "e3", "e4"] {
		registry.deliver(&chan, event(&chan, text)).await;
	}

	// The healthy subscriber saw everything.
	for text in ["e1", "e2", "e3", "e4"] {
		assert_eq!(recv_event(&mut healthy_rx).await, text);
	}

	// The slow subscriber's queue held e1..e3; e4 was dropped against it.
	assert_eq!(recv_event(&mut slow_rx).await, "e1");
	assert_eq!(recv_event(&mut slow_rx).await, "e2");

	// With room again, the next delivery carries the pending lag marker.
	registry.deliver(&chan, event(&chan, "e5")).await;

	assert_eq!(recv_event(&mut slow_rx).await, "e3");
	assert_eq!(recv_event(&mut slow_rx).await, "e5");

	let marker = timeout(Duration::from_millis(250), slow_rx.recv())
		.await
		.expect("expected lag marker")
		.expect("channel open");
	match marker {
		Delivery::Lagged { dropped } => assert_eq!(dropped, 1),
		other => panic!("expected Lagged marker, got: {other:?}"),
	}
}

#[tokio::test]
async fn closed_receivers_are_pruned_on_deliver() {
	let registry = registry();
	let chan = subject("chan1");

	{
		let (recipient, _rx) = Recipient::channel(1, 16);
		registry.subscribe(chan.clone(), recipient).await;
	}

	let stats = registry.deliver(&chan, event(&chan, "gone")).await;
	assert_eq!(stats.delivered, 0);
	assert!(registry.subject_counts().await.is_empty());
}
