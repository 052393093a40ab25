use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};
use weak_cache::{CachePolicy, EntryOptions, SignalToken, StoreBuilder, WeakCache};

/// Example showing that the cache only sees values someone else still owns.
///
/// Run with `RUST_LOG=weak_cache=trace` to watch entries come and go.

#[derive(Debug)]
struct Document {
	title: String,
	body: String,
}

fn document(title: &str, body: &str) -> Arc<Document> {
	Arc::new(Document {
		title: title.to_string(),
		body: body.to_string(),
	})
}

fn main() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weak_cache=debug"));
	tracing_subscriber::registry().with(filter).with(fmt::layer().with_target(true)).init();

	let store = StoreBuilder::new().size_limit(1_000).expiration_scan_frequency(Duration::from_secs(5)).build();
	let cache = WeakCache::from_store(store);

	let on_eviction = EntryOptions::new().on_eviction(|evicted| {
		let key = evicted.key::<&str>().copied().unwrap_or("<other>");
		tracing::info!(key, reason = ?evicted.reason, "entry left the cache");
	});

	// Open documents are owned by the "editor"; the cache just indexes them.
	let mut editor = Vec::new();
	for (name, body) in [("readme", "Welcome!"), ("notes", "Remember the milk."), ("draft", "Once upon a time")] {
		let size = body.len() as u64;
		let options = on_eviction.clone().size(size);
		editor.push(cache.set_with(name, document(name, body), &options).expect("document fits"));
	}
	println!("Cached {} documents", cache.len());

	if let Some(doc) = cache.get::<_, Document>(&"notes") {
		println!("Found '{}': {}", doc.title, doc.body);
	}

	// Closing a document drops the last strong reference.
	editor.retain(|doc| doc.title != "draft");
	match cache.get::<_, Document>(&"draft") {
		Some(_) => println!("'draft' is still cached"),
		None => println!("'draft' was closed and is gone from the cache"),
	}

	// A signal token invalidates a group of entries at once, even while they are owned.
	let workspace = SignalToken::new();
	let grouped = on_eviction.clone().size(1).policy(CachePolicy::Volatile).expiration_token(Arc::new(workspace.clone()));
	let scratch = cache.set_with("scratch", document("scratch", "temporary"), &grouped).expect("document fits");

	workspace.signal();
	println!(
		"After closing the workspace, 'scratch' cached: {} (still owned: {})",
		cache.contains(&"scratch"),
		scratch.title
	);

	drop(editor);
	println!("Closed everything; {} cache entries await purging", cache.len());
	println!("Purged {} dead entries", cache.store().scan_expired());
}
