use super::*;
use fuel_watcher::scheduler::{OperatingWindow, PriceScheduler, ScheduledJob, SchedulerHandle, ShutdownStatus};
use std::sync::atomic::{AtomicBool, AtomicUsize};

/// Records when it was run; optionally takes a while, fails or panics.
#[derive(Default)]
struct RecordingJob {
    runs: Mutex<Vec<NaiveDateTime>>,
    work: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    finished: AtomicBool,
    panic_first: bool,
    always_fail: bool,
}

impl RecordingJob {
    fn taking(work: Duration) -> Self {
        Self {
            work,
            ..Self::default()
        }
    }

    fn runs(&self) -> Vec<NaiveDateTime> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduledJob for RecordingJob {
    async fn run(&self, scheduled_for: NaiveDateTime) -> anyhow::Result<()> {
        let first = {
            let mut runs = self.runs.lock().unwrap();
            runs.push(scheduled_for);
            runs.len() == 1
        };
        if self.panic_first && first {
            panic!("selector exploded");
        }

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.work).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.store(true, Ordering::SeqCst);

        if self.always_fail {
            anyhow::bail!("mail server unreachable");
        }
        Ok(())
    }
}

fn start(job: Arc<RecordingJob>, window: OperatingWindow, base: NaiveDateTime) -> SchedulerHandle {
    PriceScheduler::new(job, window, Arc::new(TokioClock::starting_at(base))).start()
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

#[tokio::test(start_paused = true)]
async fn test_ticks_are_aligned_to_one_and_thirty_one() {
    let job = Arc::new(RecordingJob::default());
    let handle = start(job.clone(), OperatingWindow::all_day(), at(9, 0, 0));

    tokio::time::sleep(minutes(62)).await;

    assert_eq!(job.runs(), vec![at(9, 1, 0), at(9, 31, 0), at(10, 1, 0)]);
    let stats = handle.stats().await;
    assert_eq!(stats.ticks_completed, 3);
    assert_eq!(stats.last_run, Some(at(10, 1, 0)));

    assert_eq!(
        handle.shutdown(Duration::from_secs(10), Duration::from_secs(5)).await,
        ShutdownStatus::Graceful
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_mid_hour_waits_for_next_mark() {
    let job = Arc::new(RecordingJob::default());
    let handle = start(job.clone(), OperatingWindow::all_day(), at(9, 45, 30));

    tokio::time::sleep(minutes(15)).await;
    assert!(job.runs().is_empty());

    tokio::time::sleep(minutes(1)).await;
    assert_eq!(job.runs(), vec![at(10, 1, 0)]);

    handle.shutdown(Duration::from_secs(10), Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_ticks_outside_window_are_skipped() {
    let window = OperatingWindow::new(at(9, 15, 0).time(), at(9, 45, 0).time()).unwrap();
    let job = Arc::new(RecordingJob::default());
    let handle = start(job.clone(), window, at(9, 0, 0));

    tokio::time::sleep(minutes(62)).await;

    assert_eq!(job.runs(), vec![at(9, 31, 0)]);
    let stats = handle.stats().await;
    assert_eq!(stats.ticks_completed, 1);
    assert_eq!(stats.ticks_skipped, 2);

    handle.shutdown(Duration::from_secs(10), Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_long_ticks_never_overlap() {
    let job = Arc::new(RecordingJob::taking(minutes(45)));
    let handle = start(job.clone(), OperatingWindow::all_day(), at(9, 0, 0));

    tokio::time::sleep(minutes(180)).await;

    // Marks that passed while a tick was running are not replayed.
    assert_eq!(job.runs(), vec![at(9, 1, 0), at(10, 1, 0), at(11, 1, 0)]);
    assert_eq!(job.max_in_flight.load(Ordering::SeqCst), 1);

    handle.shutdown(Duration::from_secs(10), Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_panicking_tick_does_not_stop_the_loop() {
    let job = Arc::new(RecordingJob {
        panic_first: true,
        ..RecordingJob::default()
    });
    let handle = start(job.clone(), OperatingWindow::all_day(), at(9, 0, 0));

    tokio::time::sleep(minutes(32)).await;

    assert_eq!(job.runs().len(), 2);
    assert!(!handle.is_finished());
    let stats = handle.stats().await;
    assert_eq!(stats.ticks_failed, 1);
    assert_eq!(stats.ticks_completed, 1);
    assert_eq!(stats.last_error.as_deref(), Some("selector exploded"));

    handle.shutdown(Duration::from_secs(10), Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_failing_tick_is_counted_and_loop_continues() {
    let job = Arc::new(RecordingJob {
        always_fail: true,
        ..RecordingJob::default()
    });
    let handle = start(job.clone(), OperatingWindow::all_day(), at(9, 0, 0));

    tokio::time::sleep(minutes(32)).await;

    let stats = handle.stats().await;
    assert_eq!(stats.ticks_failed, 2);
    assert_eq!(stats.last_error.as_deref(), Some("mail server unreachable"));

    handle.shutdown(Duration::from_secs(10), Duration::from_secs(5)).await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_idle_is_graceful_and_stops_ticks() {
    let job = Arc::new(RecordingJob::default());
    let handle = start(job.clone(), OperatingWindow::all_day(), at(9, 0, 0));

    tokio::time::sleep(Duration::from_secs(5)).await;
    let status = handle.shutdown(Duration::from_secs(10), Duration::from_secs(5)).await;
    assert_eq!(status, ShutdownStatus::Graceful);

    tokio::time::sleep(minutes(90)).await;
    assert!(job.runs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_tick_finishes_within_grace() {
    let job = Arc::new(RecordingJob::taking(Duration::from_secs(5)));
    let handle = start(job.clone(), OperatingWindow::all_day(), at(9, 0, 59));

    // Tick starts at 09:01:00 and runs until 09:01:05.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(job.runs().len(), 1);

    let status = handle.shutdown(Duration::from_secs(10), Duration::from_secs(5)).await;
    assert_eq!(status, ShutdownStatus::Graceful);
    assert!(job.finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_overrunning_tick_is_force_stopped() {
    let job = Arc::new(RecordingJob::taking(minutes(10)));
    let handle = start(job.clone(), OperatingWindow::all_day(), at(9, 0, 59));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(job.runs().len(), 1);

    let status = handle.shutdown(Duration::from_secs(10), Duration::from_secs(5)).await;
    assert_eq!(status, ShutdownStatus::Forced);
    assert!(!job.finished.load(Ordering::SeqCst));
}

/// Blocks its worker thread outright, so aborting the task cannot stop it.
struct StuckJob {
    block_for: Duration,
    started: AtomicBool,
}

#[async_trait]
impl ScheduledJob for StuckJob {
    async fn run(&self, _scheduled_for: NaiveDateTime) -> anyhow::Result<()> {
        self.started.store(true, Ordering::SeqCst);
        std::thread::sleep(self.block_for);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_is_unclean_when_tick_ignores_abort() {
    let job = Arc::new(StuckJob {
        block_for: Duration::from_secs(3),
        started: AtomicBool::new(false),
    });
    // Real time: the first mark is one second away.
    let handle = PriceScheduler::new(
        job.clone(),
        OperatingWindow::all_day(),
        Arc::new(TokioClock::starting_at(at(9, 0, 59))),
    )
    .start();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(job.started.load(Ordering::SeqCst));

    let status = handle
        .shutdown(Duration::from_millis(200), Duration::from_millis(200))
        .await;
    assert_eq!(status, ShutdownStatus::Unclean);
}
