use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pipeline_api::Frame;

const QUEUE_CAPACITY: usize = 5;

/// Bounded SPSC-style frame queue with drop-oldest-on-full semantics (spec
/// §4.3's producer thread contract: "push to a bounded queue of capacity 5
/// with drop-oldest on full, by popping one element before pushing").
///
/// `ci2-async::ThreadedAsyncCamera` backs its frame channel with a
/// `futures::mpsc` channel that drops the *newest* frame under backpressure
/// (`tx.try_send` fails and the frame is discarded). The contract here is
/// the opposite eviction policy, so a plain `VecDeque` behind a mutex is
/// used instead of reusing that channel type.
struct FrameQueue {
    frames: Mutex<VecDeque<Frame>>,
}

impl FrameQueue {
    fn new() -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(QUEUE_CAPACITY)),
        }
    }

    fn push(&self, frame: Frame) {
        let mut frames = self.frames.lock();
        if frames.len() >= QUEUE_CAPACITY {
            frames.pop_front();
        }
        frames.push_back(frame);
    }

    fn pop(&self) -> Option<Frame> {
        self.frames.lock().pop_front()
    }
}

/// Handle to a running producer thread: owns the shared queue and the
/// running flag, and joins the thread with a bounded timeout on close.
pub struct ProducerHandle {
    queue: Arc<FrameQueue>,
    running: Arc<AtomicBool>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl ProducerHandle {
    /// Spawn a background thread that repeatedly calls `grab_raw` (a
    /// blocking-or-immediate frame source provided by the backend), deep
    /// copies the result, and pushes it to the bounded queue. Sleeps
    /// `1 / (2 * max_fps)` between iterations to avoid a spin loop (spec
    /// §4.3), matching the one-thread-per-camera shape of
    /// `ci2-async::ThreadedAsyncCamera::frames`.
    pub fn spawn<F>(name: String, max_fps: f64, mut grab_raw: F) -> Self
    where
        F: FnMut() -> Option<Frame> + Send + 'static,
    {
        let queue = Arc::new(FrameQueue::new());
        let running = Arc::new(AtomicBool::new(true));

        let thread_queue = queue.clone();
        let thread_running = running.clone();
        let sleep_duration = Duration::from_secs_f64(1.0 / (2.0 * max_fps.max(1.0)));

        let join_handle = std::thread::Builder::new()
            .name(format!("camera-producer-{name}"))
            .spawn(move || {
                while thread_running.load(Ordering::Acquire) {
                    if let Some(frame) = grab_raw() {
                        thread_queue.push(frame);
                    }
                    std::thread::sleep(sleep_duration);
                }
                tracing::debug!(camera = %name, "producer thread exiting");
            })
            .expect("spawning camera producer thread");

        Self {
            queue,
            running,
            join_handle: Some(join_handle),
        }
    }

    pub fn grab(&self) -> Option<Frame> {
        self.queue.pop()
    }

    /// Signal the thread to stop and join it with a 1 s timeout (spec §4.3).
    /// Returns `false` if the thread did not exit within the timeout.
    pub fn close(&mut self) -> bool {
        self.running.store(false, Ordering::Release);
        let Some(handle) = self.join_handle.take() else {
            return true;
        };
        join_with_timeout(handle, Duration::from_secs(1))
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        if self.join_handle.is_some() {
            self.close();
        }
    }
}

fn join_with_timeout(handle: std::thread::JoinHandle<()>, timeout: Duration) -> bool {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let _ = handle.join();
        let _ = tx.send(());
    });
    rx.recv_timeout(timeout).is_ok()
}
