//! Cadence and failure handling of the stats poller, driven by a scripted
//! source on a paused clock.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use modchat::protocol::SessionStats;
use modchat::stats::{StatsPoller, StatsSource};
use modchat::{ModchatError, StatsState};

/// Returns `Ok(stats(n))` for call `n` unless the script marks it as failing.
struct ScriptedSource {
    calls: Arc<AtomicUsize>,
    failing: Vec<usize>,
}

impl ScriptedSource {
    fn new(failing: &[usize]) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = Self {
            calls: Arc::clone(&calls),
            failing: failing.to_vec(),
        };
        (source, calls)
    }
}

fn stats(total: u64) -> SessionStats {
    SessionStats {
        total_messages: total,
        toxic_messages: total / 2,
        clean_messages: total - total / 2,
        ..SessionStats::default()
    }
}

impl StatsSource for ScriptedSource {
    fn fetch(&self) -> impl Future<Output = Result<SessionStats, ModchatError>> + Send {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = self.failing.contains(&n);
        async move {
            if fail {
                Err(ModchatError::Http {
                    status: 503,
                    url: "http://localhost:8000/api/stats".to_string(),
                })
            } else {
                Ok(stats(n as u64))
            }
        }
    }
}

const FIVE_SECS: Duration = Duration::from_secs(5);

#[tokio::test(start_paused = true)]
async fn polls_immediately_then_every_interval() {
    let (source, calls) = ScriptedSource::new(&[]);
    let (handle, rx) = StatsPoller::builder(source).poll_interval(FIVE_SECS).spawn();
    assert_eq!(*rx.borrow(), StatsState::Loading);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1, "first poll happens on start");
    assert_eq!(*rx.borrow(), StatsState::Loaded(stats(0)));

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3, "polls at t=0, 5s and 10s");
    assert_eq!(*rx.borrow(), StatsState::Loaded(stats(2)));

    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn failed_polls_keep_the_last_good_stats() {
    let (source, calls) = ScriptedSource::new(&[1, 2]);
    let (handle, rx) = StatsPoller::builder(source).poll_interval(FIVE_SECS).spawn();

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(*rx.borrow(), StatsState::Loaded(stats(0)));

    // Recovery replaces wholesale.
    tokio::time::sleep(FIVE_SECS).await;
    assert_eq!(*rx.borrow(), StatsState::Loaded(stats(3)));

    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn first_failure_is_unavailable_until_a_poll_succeeds() {
    let (source, _calls) = ScriptedSource::new(&[0]);
    let (handle, rx) = StatsPoller::builder(source).poll_interval(FIVE_SECS).spawn();

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(*rx.borrow(), StatsState::Unavailable);

    tokio::time::sleep(FIVE_SECS).await;
    assert_eq!(*rx.borrow(), StatsState::Loaded(stats(1)));

    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn stop_halts_polling() {
    let (source, calls) = ScriptedSource::new(&[]);
    let (handle, rx) = StatsPoller::builder(source).poll_interval(FIVE_SECS).spawn();

    tokio::time::sleep(Duration::from_millis(1)).await;
    handle.stop();

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*rx.borrow(), StatsState::Loaded(stats(0)));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_receiver_ends_the_task() {
    let (source, calls) = ScriptedSource::new(&[]);
    let (handle, rx) = StatsPoller::builder(source).poll_interval(FIVE_SECS).spawn();
    drop(rx);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(handle.is_finished());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn custom_interval_is_honoured() {
    let (source, calls) = ScriptedSource::new(&[]);
    let poller = StatsPoller::builder(source)
        .poll_interval(Duration::from_secs(2))
        .build();
    assert_eq!(poller.poll_interval(), Duration::from_secs(2));

    let (tx, _rx) = tokio::sync::watch::channel(StatsState::Loading);
    let task = tokio::spawn(poller.run(tx));

    tokio::time::sleep(Duration::from_millis(6_500)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4, "t=0, 2, 4 and 6s");
    task.abort();
}
