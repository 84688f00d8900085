//! Integration tests for the tokio session driver.
//!
//! The runtime clock is paused, so timers fire in virtual time and the
//! tests run instantly while still exercising the real event loop.

use std::time::Duration;

use handoff_prefetch::config::SchedulerConfig;
use handoff_prefetch::scheduler::RequestScheduler;
use handoff_prefetch::session::{ChannelTransport, SchedulerSession, DELIVERY_BACKLOG};
use handoff_prefetch::state::SchedulerState;
use handoff_prefetch::transport::OutgoingRequest;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

// ---------------------------------------------------------------------------
// Test 1: every request answered 20 ms later, no retransmissions
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_session_answers_every_request() {
    let config = SchedulerConfig {
        seq_ceiling: Some(5),
        ..SchedulerConfig::default()
    };
    let (transport, mut outgoing) = ChannelTransport::new();
    let mut session = SchedulerSession::spawn(RequestScheduler::new(config, transport).unwrap());

    let mut sent_at = Vec::new();
    for _ in 0..5 {
        let (at, request) = outgoing.recv().await.expect("request");
        let OutgoingRequest::Single { seq, .. } = request else {
            panic!("unexpected burst");
        };
        sent_at.push(at);
        tokio::time::sleep(ms(20)).await;
        session.reply(seq).await.expect("reply");
    }

    for expected in 0..5 {
        let d = session.deliveries_rx.recv().await.expect("delivery");
        assert_eq!(d.seq, expected);
        assert_eq!(d.retry_count, 0);
        assert!(d.rtt >= ms(20));
    }

    let scheduler = session.close().await.expect("close");
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(scheduler.stats().delivered, 5);
    assert_eq!(scheduler.stats().retransmissions, 0);
    assert!(scheduler.ledger().is_empty());
    assert_eq!(sent_at, vec![ms(0), ms(100), ms(200), ms(300), ms(400)]);
}

// ---------------------------------------------------------------------------
// Test 2: unanswered request is retransmitted by the sweep
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_session_retransmits_after_rto() {
    let config = SchedulerConfig {
        seq_ceiling: Some(1),
        ..SchedulerConfig::default()
    };
    let (transport, mut outgoing) = ChannelTransport::new();
    let session = SchedulerSession::spawn(RequestScheduler::new(config, transport).unwrap());

    let (first, _) = outgoing.recv().await.expect("first send");
    let (again, request) = outgoing.recv().await.expect("retransmission");
    assert_eq!(first, ms(0));
    assert_eq!(again, ms(1_000));
    assert_eq!(request.seqs(), 0..=0);

    session.nack(0, "congestion").await.expect("nack");
    session.reply(0).await.expect("reply");

    let scheduler = session.close().await.expect("close");
    let stats = scheduler.stats();
    assert_eq!(stats.retransmissions, 1);
    assert_eq!(stats.nacks, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(scheduler.estimator().sample_count(), 0);
}

// ---------------------------------------------------------------------------
// Test 3: unread delivery reports beyond the backlog are dropped
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_unread_deliveries_are_dropped_past_backlog() {
    let total = DELIVERY_BACKLOG as u32 + 6;
    let config = SchedulerConfig {
        seq_ceiling: Some(total),
        ..SchedulerConfig::default()
    };
    let (transport, mut outgoing) = ChannelTransport::new();
    let mut session = SchedulerSession::spawn(RequestScheduler::new(config, transport).unwrap());

    for _ in 0..total {
        let (_, request) = outgoing.recv().await.expect("request");
        session.reply(*request.seqs().start()).await.expect("reply");
    }
    // Let the event loop drain the last replies.
    tokio::time::sleep(ms(10)).await;

    let mut received = Vec::new();
    while let Ok(d) = session.deliveries_rx.try_recv() {
        received.push(d.seq);
    }
    assert_eq!(received, (0..DELIVERY_BACKLOG as u32).collect::<Vec<_>>());

    let scheduler = session.close().await.expect("close");
    assert_eq!(scheduler.stats().delivered, u64::from(total));
}
