#![forbid(unsafe_code)]

use std::sync::Arc;

use herald_domain::{ChannelKey, ChatEvent, EventKind, SubjectKey};
use proptest::prelude::*;

use crate::server::cache::SubjectCache;

fn subject(name: &str) -> SubjectKey {
	SubjectKey::Channel(ChannelKey::new("libera", name).expect("valid channel key"))
}

fn event(subject: &SubjectKey, n: i64) -> Arc<ChatEvent> {
	Arc::new(
		ChatEvent::new(EventKind::Message, subject.clone(), 1_700_000_000_000 + n)
			.with_username("someone")
			.with_text(format!("message #{n}")),
	)
}

fn texts(events: &[Arc<ChatEvent>]) -> Vec<String> {
	events.iter().map(|e| e.text.clone().unwrap_or_default()).collect()
}

#[tokio::test]
async fn window_keeps_last_n_in_order() {
	let cache = SubjectCache::new(5);
	let chan = subject("rust");

	for n in 1..=7 {
		cache.append(&chan, event(&chan, n)).await;
		assert!(cache.len(&chan).await <= 5);
	}

	let window = cache.get(&chan).await;
	assert_eq!(
		texts(&window),
		vec!["message #3", "message #4", "message #5", "message #6", "message #7"]
	);
}

#[tokio::test]
async fn bulk_append_matches_single_appends() {
	let chan = subject("rust");

	let singles = SubjectCache::new(5);
	for n in 1..=9 {
		singles.append(&chan, event(&chan, n)).await;
	}

	let bulk = SubjectCache::new(5);
	bulk.append_bulk(&chan, (1..=9).map(|n| event(&chan, n)).collect()).await;

	assert_eq!(texts(&singles.get(&chan).await), texts(&bulk.get(&chan).await));
	assert_eq!(bulk.len(&chan).await, 5);
}

#[tokio::test]
async fn bulk_append_on_existing_window_slices_to_bound() {
	let cache = SubjectCache::new(4);
	let chan = subject("rust");

	for n in 1..=3 {
		cache.append(&chan, event(&chan, n)).await;
	}

	cache.append_bulk(&chan, (4..=8).map(|n| event(&chan, n)).collect()).await;

	let window = cache.get(&chan).await;
	assert_eq!(
		texts(&window),
		vec!["message #5", "message #6", "message #7", "message #8"]
	);
}

#[tokio::test]
async fn absent_subject_yields_empty_window() {
	let cache = SubjectCache::new(5);

	assert!(cache.get(&subject("nowhere")).await.is_empty());
	assert_eq!(cache.len(&subject("nowhere")).await, 0);
}

#[tokio::test]
async fn subjects_are_isolated() {
	let cache = SubjectCache::new(2);
	let a = subject("a");
	let b = subject("b");

	cache.append(&a, event(&a, 1)).await;
	cache.append(&b, event(&b, 2)).await;
	cache.append(&a, event(&a, 3)).await;
	cache.append(&a, event(&a, 4)).await;

	assert_eq!(texts(&cache.get(&a).await), vec!["message #3", "message #4"]);
	assert_eq!(texts(&cache.get(&b).await), vec!["message #2"]);
}

proptest! {
	#[test]
	fn window_always_holds_exactly_the_last_n(
		bound in 1usize..8,
		ops in proptest::collection::vec(1usize..6, 1..24),
	) {
		let rt = tokio::runtime::Builder::new_current_thread()
			.build()
			.expect("build runtime");

		rt.block_on(async move {
			let cache = SubjectCache::new(bound);
			let chan = subject("prop");
			let mut model: Vec<String> = Vec::new();
			let mut n: i64 = 0;

			for batch in ops {
				if batch == 1 {
					n += 1;
					model.push(format!("message #{n}"));
					cache.append(&chan, event(&chan, n)).await;
				} else {
					let events: Vec<Arc<ChatEvent>> = (0..batch)
						.map(|_| {
							n += 1;
							model.push(format!("message #{n}"));
							event(&chan, n)
						})
						.collect();
					cache.append_bulk(&chan, events).await;
				}

				let window = cache.get(&chan).await;
				assert!(window.len() <= bound);

				let expected: Vec<String> = model.iter().rev().take(bound).rev().cloned().collect();
				assert_eq!(texts(&window), expected);
			}
		});
	}
}
