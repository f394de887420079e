//! Keyframe recovery heartbeat
//!
//! While the relay pipeline is active, the publisher is asked for a fresh
//! keyframe on a fixed interval so a lost or garbled frame cannot corrupt
//! the echoed stream for longer than one period. This stands in for a
//! demand-driven scheme where a viewer would request recovery explicitly.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, warn};

use super::relay::KeyframeRequester;

/// Run the heartbeat until the pipeline signals stop.
///
/// The first request fires one full period after relaying starts. A failed
/// send is logged and retried on the next tick; it never stops the timer.
pub(crate) async fn run<K>(
    session_id: String,
    keyframes: K,
    media_ssrc: u32,
    period: Duration,
    mut stop: oneshot::Receiver<()>,
) where
    K: KeyframeRequester,
{
    let mut ticker = time::interval_at(time::Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = keyframes.request_keyframe(media_ssrc).await {
                    warn!(
                        session_id = %session_id,
                        media_ssrc,
                        error = %e,
                        "keyframe request failed, retrying on next tick"
                    );
                }
            }
            _ = &mut stop => {
                debug!(session_id = %session_id, "keyframe heartbeat stopped");
                break;
            }
        }
    }
}
