mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use hypercopy::ingestion::fill_stream::{FillHandler, FillStream, FillStreamError, StreamState};
use hypercopy::models::FillEvent;
use hypercopy::retry::BackoffPolicy;

use common::{fill_frame, ConnectScript, MockTransport, RecordingNotifier, TARGET_ADDRESS};

fn stream(transport: &Arc<MockTransport>, notifier: &Arc<RecordingNotifier>, max: u32) -> FillStream {
    FillStream::new(
        transport.clone(),
        BackoffPolicy::RECONNECT,
        max,
        notifier.clone(),
    )
}

fn channel_handler(capacity: usize) -> (Arc<dyn FillHandler>, mpsc::Receiver<FillEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Arc::new(tx), rx)
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_is_skipped_and_live_fill_delivered() {
    let transport = Arc::new(MockTransport::new(vec![ConnectScript::Frames {
        frames: vec![fill_frame("BTC", true), fill_frame("ETH", false)],
        hold_open: true,
    }]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (handler, mut rx) = channel_handler(8);

    let mut sub = stream(&transport, &notifier, 3).subscribe(TARGET_ADDRESS, handler);

    let fill = rx.recv().await.expect("live fill");
    assert_eq!(fill.coin, "ETH");
    assert_eq!(fill.size.to_string(), "1.5");
    assert!(rx.try_recv().is_err());
    assert_eq!(*sub.state().borrow(), StreamState::Subscribed);

    sub.unsubscribe();
    assert_eq!(sub.join().await, Ok(()));
    assert_eq!(*sub.state().borrow(), StreamState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_gives_up_after_max_reconnects() {
    let transport = Arc::new(MockTransport::new(Vec::new()));
    let notifier = Arc::new(RecordingNotifier::default());
    let (handler, _rx) = channel_handler(8);

    let mut sub = stream(&transport, &notifier, 3).subscribe(TARGET_ADDRESS, handler);

    assert_eq!(
        sub.join().await,
        Err(FillStreamError::ReconnectExhausted { attempts: 3 })
    );
    // Initial connect plus three retries.
    assert_eq!(transport.connects(), 4);
    assert_eq!(*sub.state().borrow(), StreamState::Failed);
    assert_eq!(
        notifier.errors(),
        vec!["Fill stream failed permanently".to_string()]
    );

    // A second join reports the same outcome.
    assert_eq!(
        sub.join().await,
        Err(FillStreamError::ReconnectExhausted { attempts: 3 })
    );
}

#[tokio::test(start_paused = true)]
async fn test_successful_connect_resets_attempts() {
    let transport = Arc::new(MockTransport::new(vec![
        ConnectScript::Fail,
        ConnectScript::Frames {
            frames: Vec::new(),
            hold_open: false,
        },
        ConnectScript::Fail,
        ConnectScript::Frames {
            frames: vec![fill_frame("SOL", false)],
            hold_open: true,
        },
    ]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (handler, mut rx) = channel_handler(8);

    let mut sub = stream(&transport, &notifier, 2).subscribe(TARGET_ADDRESS, handler);

    // Three reconnects against a budget of two: only survivable because the
    // session in between reset the counter.
    let fill = rx.recv().await.expect("fill after reconnect");
    assert_eq!(fill.coin, "SOL");
    assert_eq!(transport.connects(), 4);

    sub.unsubscribe();
    assert_eq!(sub.join().await, Ok(()));
    assert!(notifier.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_cancels_pending_reconnect() {
    let transport = Arc::new(MockTransport::new(Vec::new()));
    let notifier = Arc::new(RecordingNotifier::default());
    let (handler, _rx) = channel_handler(8);

    let mut sub = stream(&transport, &notifier, 10).subscribe(TARGET_ADDRESS, handler);
    let mut state = sub.state();
    state
        .wait_for(|s| matches!(s, StreamState::Reconnecting { .. }))
        .await
        .expect("stream reconnecting");

    sub.unsubscribe();

    assert_eq!(sub.join().await, Ok(()));
    assert_eq!(*sub.state().borrow(), StreamState::Closed);
    assert_eq!(transport.connects(), 1);
    assert!(notifier.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_interrupts_blocked_delivery() {
    let transport = Arc::new(MockTransport::new(vec![ConnectScript::Frames {
        frames: vec![
            fill_frame("BTC", false),
            fill_frame("ETH", false),
            fill_frame("SOL", false),
        ],
        hold_open: true,
    }]));
    let notifier = Arc::new(RecordingNotifier::default());
    // Capacity one and never read: the second fill blocks the stream.
    let (handler, _rx) = channel_handler(1);

    let mut sub = stream(&transport, &notifier, 3).subscribe(TARGET_ADDRESS, handler);
    let mut state = sub.state();
    state
        .wait_for(|s| *s == StreamState::Subscribed)
        .await
        .expect("stream subscribed");
    tokio::time::sleep(Duration::from_millis(100)).await;

    sub.unsubscribe();

    let joined = tokio::time::timeout(Duration::from_secs(2), sub.join()).await;
    assert_eq!(joined, Ok(Ok(())));
    assert_eq!(*sub.state().borrow(), StreamState::Closed);
    assert_eq!(transport.connects(), 1);
}

struct FlakyHandler {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FillHandler for FlakyHandler {
    async fn on_fill(&self, fill: FillEvent) -> anyhow::Result<()> {
        match fill.coin.as_str() {
            "BOOM" => panic!("handler exploded"),
            "ERR" => anyhow::bail!("handler refused"),
            _ => {
                let _ = self.tx.send(fill.coin);
                Ok(())
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_handler_failures_do_not_stop_the_stream() {
    let transport = Arc::new(MockTransport::new(vec![ConnectScript::Frames {
        frames: vec![
            fill_frame("BOOM", false),
            fill_frame("ERR", false),
            fill_frame("ETH", false),
        ],
        hold_open: true,
    }]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut sub = stream(&transport, &notifier, 3)
        .subscribe(TARGET_ADDRESS, Arc::new(FlakyHandler { tx }));

    assert_eq!(rx.recv().await.as_deref(), Some("ETH"));
    assert_eq!(*sub.state().borrow(), StreamState::Subscribed);
    assert_eq!(transport.connects(), 1);

    sub.unsubscribe();
    assert_eq!(sub.join().await, Ok(()));
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_frames_are_dropped() {
    let transport = Arc::new(MockTransport::new(vec![ConnectScript::Frames {
        frames: vec![
            "not json".to_string(),
            r#"{"channel":"pong"}"#.to_string(),
            r#"{"channel":"userFills","data":{"fills":"oops"}}"#.to_string(),
            fill_frame("ARB", false),
        ],
        hold_open: true,
    }]));
    let notifier = Arc::new(RecordingNotifier::default());
    let (handler, mut rx) = channel_handler(8);

    let mut sub = stream(&transport, &notifier, 3).subscribe(TARGET_ADDRESS, handler);

    let fill = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("fill before timeout")
        .expect("channel open");
    assert_eq!(fill.coin, "ARB");
    assert_eq!(transport.connects(), 1);

    sub.unsubscribe();
    assert_eq!(sub.join().await, Ok(()));
}
