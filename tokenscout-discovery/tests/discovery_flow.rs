//! End-to-end pipeline tests: channels → runner → stores → detectors.
//!
//! These drive the public API the binary wires together, over the
//! in-memory store, and pin the determinism property: replaying the same
//! input yields byte-identical candidate ids.

#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tokenscout_discovery::detectors::{FirstSightDetector, SpikeConfig, SpikeDetector};
use tokenscout_discovery::runner::{Runner, RunnerConfig};
use tokenscout_discovery::store::MemoryStore;
use tokenscout_discovery::types::{
    CandidateSource, LiquidityEvent, LiquidityKind, SwapEvent, candidate_id,
};

fn swap(slot: i64, sig: &str, index: i64, mint: &str, timestamp: i64, amount: f64) -> SwapEvent {
    SwapEvent {
        mint: mint.into(),
        pool: Some(format!("{mint}-pool")),
        tx_signature: sig.into(),
        event_index: index,
        slot,
        timestamp,
        amount_out: amount,
    }
}

fn liquidity(slot: i64, sig: &str, mint: &str, timestamp: i64) -> LiquidityEvent {
    LiquidityEvent {
        pool: Some(format!("{mint}-pool")),
        mint: mint.into(),
        event_type: LiquidityKind::Add,
        tx_signature: sig.into(),
        event_index: 0,
        slot,
        timestamp,
        amount_token: 10.0,
        amount_quote: 5.0,
        candidate_id: None,
    }
}

fn pipeline(store: &MemoryStore, lag: i64) -> Runner {
    let first_sight = Arc::new(FirstSightDetector::new(Arc::new(store.clone())));
    let spike = Arc::new(SpikeDetector::new(
        SpikeConfig::default(),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    ));
    Runner::new(
        RunnerConfig {
            lag_window_slots: lag,
            flush_interval: Duration::from_millis(50),
            detection_interval: Duration::from_secs(3600),
        },
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        first_sight,
        spike,
    )
}

async fn replay(events: Vec<SwapEvent>, liquidity_events: Vec<LiquidityEvent>) -> MemoryStore {
    let store = MemoryStore::new();
    let runner = pipeline(&store, 5);

    let (swap_tx, swap_rx) = mpsc::channel(1024);
    let (liq_tx, liq_rx) = mpsc::channel(1024);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(runner.run(swap_rx, liq_rx, cancel.clone()));

    for event in events {
        swap_tx.send(event).await.expect("send failed");
    }
    for event in liquidity_events {
        liq_tx.send(event).await.expect("send failed");
    }
    drop(swap_tx);
    drop(liq_tx);

    handle.await.expect("runner panicked").expect("runner failed");
    store
}

#[tokio::test]
async fn scrambled_arrival_yields_canonical_storage_order() {
    // Slots arrive 5, 3, 4, 8; two events inside slot 4 arrive inverted.
    let events = vec![
        swap(5, "SigE", 0, "MintE", 5000, 1.0),
        swap(3, "SigC", 0, "MintC", 3000, 1.0),
        swap(4, "SigD", 1, "MintD", 4000, 1.0),
        swap(4, "SigD", 0, "MintD", 4000, 1.0),
        swap(8, "SigH", 0, "MintH", 8000, 1.0),
    ];

    let store = replay(events, vec![]).await;

    // Stream end drains everything, slot 8 included.
    let stored = store.swaps_in_order();
    let keys: Vec<(i64, String, i64)> = stored
        .iter()
        .map(|e| (e.slot, e.tx_signature.clone(), e.event_index))
        .collect();
    assert_eq!(
        keys,
        vec![
            (3, "SigC".to_string(), 0),
            (4, "SigD".to_string(), 0),
            (4, "SigD".to_string(), 1),
            (5, "SigE".to_string(), 0),
            (8, "SigH".to_string(), 0),
        ]
    );
}

#[tokio::test]
async fn every_new_mint_becomes_exactly_one_candidate() {
    let events = vec![
        swap(1, "Sig1", 0, "MintA", 1000, 1.0),
        swap(2, "Sig2", 0, "MintB", 2000, 1.0),
        swap(3, "Sig3", 0, "MintA", 3000, 1.0), // repeat
        swap(4, "Sig4", 0, "MintA", 4000, 1.0), // repeat
    ];

    let store = replay(events, vec![]).await;
    assert_eq!(store.candidate_count(), 2);

    let for_a = tokenscout_discovery::ports::CandidateStore::get_by_mint(&store, "MintA")
        .await
        .expect("query failed");
    assert_eq!(for_a.len(), 1, "at most one candidate per mint");
    assert_eq!(for_a[0].source, CandidateSource::NewToken);
    assert_eq!(for_a[0].slot, 1, "the first sighting wins");
}

#[tokio::test]
async fn replaying_the_same_input_reproduces_candidate_ids() {
    let events = vec![
        swap(10, "SigX", 0, "MintX", 10_000, 2.0),
        swap(11, "SigY", 1, "MintY", 11_000, 3.0),
        swap(12, "SigZ", 0, "MintZ", 12_000, 4.0),
    ];

    let first = replay(events.clone(), vec![]).await;
    let second = replay(events, vec![]).await;

    async fn candidate_ids(store: &MemoryStore) -> Vec<String> {
        let mut ids = Vec::new();
        for mint in ["MintX", "MintY", "MintZ"] {
            let rows = tokenscout_discovery::ports::CandidateStore::get_by_mint(store, mint)
                .await
                .expect("query failed");
            ids.push(rows[0].candidate_id.clone());
        }
        ids
    }

    assert_eq!(candidate_ids(&first).await, candidate_ids(&second).await);

    // And each id is the documented hash of its field tuple.
    let rows = tokenscout_discovery::ports::CandidateStore::get_by_mint(&first, "MintX")
        .await
        .expect("query failed");
    assert_eq!(
        rows[0].candidate_id,
        candidate_id("MintX", Some("MintX-pool"), CandidateSource::NewToken, "SigX", 0, 10)
    );
}

#[tokio::test]
async fn liquidity_events_flow_into_their_store() {
    let events = vec![swap(1, "Sig1", 0, "MintA", 1000, 1.0)];
    let liq = vec![
        liquidity(1, "SigL1", "MintA", 1000),
        liquidity(2, "SigL2", "MintA", 2000),
    ];

    let store = replay(events, liq).await;
    assert_eq!(store.liquidity_count(), 2);
}

#[tokio::test]
async fn spike_detection_over_the_persisted_history() {
    const HOUR: i64 = 3_600_000;

    // A day of uniform baseline plus a burst in the final hour, all
    // ingested through the runner.
    let mut events: Vec<SwapEvent> = (0..24)
        .map(|i| swap(i, &format!("Sig{i:02}"), 0, "MintHot", i * HOUR, 10.0))
        .collect();
    let t = 24 * HOUR;
    events.push(swap(500, "SigBurst", 0, "MintHot", t - 1000, 100.0));

    let store = replay(events, vec![]).await;

    // MintHot already exists as NEW_TOKEN, so the spike must not duplicate
    // it; a fresh mint-only store isolates the spike path instead.
    let spike_store = MemoryStore::new();
    for event in store.swaps_in_order() {
        tokenscout_discovery::ports::SwapEventStore::insert(&spike_store, &event)
            .await
            .expect("insert failed");
    }
    let detector = SpikeDetector::new(
        SpikeConfig::default(),
        Arc::new(spike_store.clone()),
        Arc::new(spike_store.clone()),
    );

    let candidates = detector.detect(t).await.expect("detect failed");
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].source, CandidateSource::ActiveToken);
    assert_eq!(candidates[0].tx_signature, "SigBurst");

    // While on the original store the NEW_TOKEN row blocks re-discovery.
    let blocked = SpikeDetector::new(
        SpikeConfig::default(),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
    );
    assert!(blocked.detect(t).await.expect("detect failed").is_empty());
}
