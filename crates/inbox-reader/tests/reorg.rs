mod support;

use std::time::Duration;

use alloy_primitives::B256;
use support::*;

use inflow_inbox::error::is_accumulator_not_found;
use inflow_inbox_reader::reader::InboxReaderConfig;

#[tokio::test(flavor = "multi_thread")]
async fn accumulator_mismatch_walks_back_and_converges() {
    let chain = MockChain::new();
    let init = make_init_message(1, 410);
    let acc0 = init.after_inbox_acc().unwrap();
    let d1 = make_delayed(1, 500, acc0, b"payload");

    // The tracker's view of batches 0..=4, posted at blocks 450..=454.
    let mut ours = Vec::new();
    let mut before = B256::ZERO;
    for seq in 0..5u64 {
        let batch = make_batch(seq, 450 + seq, before, 0xaa, 1, acc0);
        before = batch.after_inbox_acc;
        ours.push(batch);
    }
    // The chain replaced batch 4: same predecessor, different contents.
    let mut canonical = ours.clone();
    canonical[4] = make_batch(4, 454, ours[3].after_inbox_acc, 0xbb, 1, acc0);
    let reorged_acc = canonical[4].after_inbox_acc;

    chain.with_state(|s| {
        s.height = 520;
        s.delayed = vec![init.clone(), d1.clone()];
        s.batches = canonical;
    });

    let t = setup(chain.clone(), 400, 1, InboxReaderConfig::test());
    t.tracker.add_delayed_messages(&[init, d1]).unwrap();
    t.tracker.add_sequencer_batches(&ours).unwrap();
    assert_ne!(t.tracker.get_batch_acc(4).unwrap(), reorged_acc);

    let start = tokio::spawn({
        let reader = t.reader.clone();
        let cancel = t.cancel.clone();
        async move { reader.start(cancel).await }
    });
    tokio::time::timeout(Duration::from_secs(10), start)
        .await
        .expect("start timed out")
        .unwrap()
        .unwrap();

    // The scan starts at the delayed tip (block 500), finds nothing, and
    // retreats in 10-block steps until the batches come back into range.
    assert!(
        wait_for(Duration::from_secs(5), || {
            t.tracker.get_batch_acc(4).unwrap() == reorged_acc
        })
        .await
    );
    assert_eq!(t.tracker.get_batch_count().unwrap(), 5);
    assert!(
        wait_for(Duration::from_secs(5), || {
            t.reader.get_last_read_block_and_batch_count().1 == 5
        })
        .await
    );
    t.cancel.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn hard_reorg_truncates_future_batches() {
    let chain = MockChain::new();
    let init = make_init_message(1, 10);
    let acc0 = init.after_inbox_acc().unwrap();

    let mut batches = Vec::new();
    let mut before = B256::ZERO;
    for seq in 0..10u64 {
        let batch = make_batch(seq, 11 + seq, before, 0xaa, 1, acc0);
        before = batch.after_inbox_acc;
        batches.push(batch);
    }

    // The chain only ever saw the first 7.
    chain.with_state(|s| {
        s.height = 30;
        s.delayed = vec![init.clone()];
        s.batches = batches[..7].to_vec();
    });

    let config = InboxReaderConfig {
        hard_reorg: true,
        ..InboxReaderConfig::test()
    };
    let t = setup(chain.clone(), 10, 1, config);
    t.tracker.add_delayed_messages(&[init]).unwrap();
    t.tracker.add_sequencer_batches(&batches).unwrap();
    assert_eq!(t.tracker.get_batch_count().unwrap(), 10);

    let start = tokio::spawn({
        let reader = t.reader.clone();
        let cancel = t.cancel.clone();
        async move { reader.start(cancel).await }
    });
    tokio::time::timeout(Duration::from_secs(10), start)
        .await
        .expect("start timed out")
        .unwrap()
        .unwrap();

    assert!(
        wait_for(Duration::from_secs(5), || {
            t.tracker.get_batch_count().unwrap() == 7
        })
        .await
    );
    assert_eq!(
        t.tracker.get_batch_acc(6).unwrap(),
        batches[6].after_inbox_acc
    );
    let err = t.tracker.get_batch_metadata(7).unwrap_err();
    assert!(is_accumulator_not_found(&err));
    assert!(
        wait_for(Duration::from_secs(5), || {
            t.reader.get_last_read_block_and_batch_count() == (30, 7)
        })
        .await
    );
    t.cancel.cancel();
}

#[tokio::test(flavor = "multi_thread")]
async fn delayed_shortfall_retreats_and_reapplies() {
    let chain = MockChain::new();
    let init = make_init_message(1, 10);
    let acc0 = init.after_inbox_acc().unwrap();
    let d1 = make_delayed(1, 110, acc0, b"one");
    let acc1 = d1.after_inbox_acc().unwrap();
    let d2 = make_delayed(2, 115, acc1, b"two");
    let acc2 = d2.after_inbox_acc().unwrap();
    let b0 = make_batch(0, 120, B256::ZERO, 0xaa, 3, acc2);

    chain.with_state(|s| {
        s.height = 130;
        s.delayed = vec![init, d1, d2];
        s.batches = vec![b0];
    });
    // The log index lags: message 2 only shows up on the third range
    // lookup, after the batch that consumes it was already fetched.
    chain.hide_delayed_until(2, 3);

    let t = setup(chain.clone(), 5, 1, InboxReaderConfig::test());
    let start = tokio::spawn({
        let reader = t.reader.clone();
        let cancel = t.cancel.clone();
        async move { reader.start(cancel).await }
    });

    assert!(
        wait_for(Duration::from_secs(5), || {
            t.tracker.get_batch_count().unwrap() == 1
        })
        .await
    );
    assert_eq!(t.tracker.get_delayed_count().unwrap(), 3);
    assert_eq!(t.tracker.get_delayed_acc(2).unwrap(), acc2);
    assert!(
        wait_for(Duration::from_secs(5), || {
            t.reader.get_last_read_block_and_batch_count() == (130, 1)
        })
        .await
    );
    tokio::time::timeout(Duration::from_secs(10), start)
        .await
        .expect("start timed out")
        .unwrap()
        .unwrap();
    t.cancel.cancel();
}
