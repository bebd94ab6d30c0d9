//! Single-task event driver
//!
//! Every notification is handled on one task, one at a time, so the runner
//! needs no locking. Requests it issues return immediately; their outcomes
//! come back later through the same queue.

use crate::link::EventSource;
use crate::runner::HeadlessMissionRunner;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Process events until `shutdown` fires or the channel closes.
///
/// On shutdown, events already queued are still handled before the runner
/// releases its subscriptions. The runner is handed back for inspection.
pub async fn run(
    mut runner: HeadlessMissionRunner,
    mut events: EventSource,
    mut shutdown: broadcast::Receiver<()>,
) -> HeadlessMissionRunner {
    loop {
        tokio::select! {
            biased;
            notification = events.recv() => match notification {
                Some(notification) => runner.handle_notification(notification),
                None => {
                    debug!("Event channel closed");
                    break;
                }
            },
            _ = shutdown.recv() => {
                let drained = pump(&mut runner, &mut events);
                info!(drained, "Event driver shutting down");
                break;
            }
        }
    }

    runner.shutdown();
    runner
}

/// Handle every event currently queued without waiting. Returns the count.
pub fn pump(runner: &mut HeadlessMissionRunner, events: &mut EventSource) -> usize {
    let mut handled = 0;
    while let Ok(notification) = events.try_recv() {
        runner.handle_notification(notification);
        handled += 1;
    }
    handled
}
