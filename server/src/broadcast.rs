//! Periodic snapshot broadcast

use crate::network::{is_shutting_down, Link};
use crate::utils::get_timestamp;
use log::debug;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Fires a broadcast tick every `period` until the shutdown flag is set
pub async fn run_broadcast_loop(link: Link, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip the first tick since it fires immediately
    ticker.tick().await;

    loop {
        if is_shutting_down(&shutdown) {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                broadcast_tick(&link).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!("Broadcast loop stopped");
}

/// Runs one tick and returns how many sessions the snapshot was sent to
///
/// The queue is drained under the lock and the snapshot timestamp is taken
/// right before the lock is released; the sends happen afterwards on the
/// copied recipient list.
pub async fn broadcast_tick(link: &Link) -> usize {
    let snapshot = {
        let mut state = link.state().lock().await;
        state.take_snapshot(get_timestamp())
    };

    match snapshot {
        Some(delivery) => {
            let recipients = delivery.recipients.len();
            debug!("Broadcasting snapshot to {} session(s)", recipients);
            link.deliver(delivery).await;
            recipients
        }
        None => 0,
    }
}
