//! Terminal spinner shown while long phases run. UI plumbing only; the
//! pipeline's correctness never depends on it.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

const FRAMES: [char; 4] = ['|', '/', '-', '\\'];
const FRAME_INTERVAL: Duration = Duration::from_millis(200);

/// A scoped spinner on stderr.
///
/// The animation task is signalled through a watch channel: `finish` stops it
/// cleanly, and dropping the spinner on any other exit path (including an
/// error return) stops it too, so no code path can leave the animation
/// running over later output.
pub struct Spinner {
    stop: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Spinner {
    pub fn start(label: &str) -> Self {
        let (stop, mut stopped) = watch::channel(false);
        let label = label.to_string();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(FRAME_INTERVAL);
            let mut frame = 0usize;
            loop {
                tokio::select! {
                    _ = stopped.changed() => break,
                    _ = interval.tick() => {
                        eprint!("\r{} {label}", FRAMES[frame % FRAMES.len()]);
                        frame += 1;
                    }
                }
            }
            eprint!("\r");
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stops the animation and waits for the final carriage return.
    pub async fn finish(mut self) {
        let _ = self.stop.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
