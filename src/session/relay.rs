//! RTP relay pipeline
//!
//! One worker task per session. The transport's track callback only enqueues
//! inbound tracks on a bounded channel; the worker waits for the first video
//! track, then copies packets from it to the outbound track, rewriting the
//! SSRC to the session's outbound identifier and leaving every other field
//! untouched. End of stream or an I/O failure terminates the pipeline; the
//! keyframe heartbeat is always stopped and joined before the worker exits.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;
use webrtc::track::track_remote::TrackRemote;

use super::heartbeat;
use crate::{Error, Result};

/// Pipeline lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelayState {
    WaitingForTrack,
    Relaying,
    Terminated,
}

/// Source of inbound media packets. `Ok(None)` signals end of stream.
#[async_trait]
pub(crate) trait PacketSource: Send + Sync {
    async fn recv(&self) -> Result<Option<Packet>>;

    /// Stream-source identifier of the inbound stream
    fn ssrc(&self) -> u32;

    fn is_video(&self) -> bool;
}

/// Sink for outbound media packets
#[async_trait]
pub(crate) trait PacketSink: Send + Sync {
    async fn send(&self, packet: &Packet) -> Result<()>;
}

/// Control-channel capability for requesting a fresh keyframe from the
/// publisher of the given stream
#[async_trait]
pub(crate) trait KeyframeRequester: Send + Sync {
    async fn request_keyframe(&self, media_ssrc: u32) -> Result<()>;
}

#[async_trait]
impl PacketSource for Arc<TrackRemote> {
    async fn recv(&self) -> Result<Option<Packet>> {
        match self.read_rtp().await {
            Ok((packet, _attributes)) => Ok(Some(packet)),
            Err(e) if is_end_of_stream(&e) => Ok(None),
            Err(e) => Err(Error::PipelineIo(e.to_string())),
        }
    }

    fn ssrc(&self) -> u32 {
        (**self).ssrc()
    }

    fn is_video(&self) -> bool {
        (**self).kind() == RTPCodecType::Video
    }
}

#[async_trait]
impl PacketSink for Arc<TrackLocalStaticRTP> {
    async fn send(&self, packet: &Packet) -> Result<()> {
        self.write_rtp(packet)
            .await
            .map(|_| ())
            .map_err(|e| Error::PipelineIo(e.to_string()))
    }
}

#[async_trait]
impl KeyframeRequester for Arc<RTCPeerConnection> {
    async fn request_keyframe(&self, media_ssrc: u32) -> Result<()> {
        self.write_rtcp(&[Box::new(PictureLossIndication {
            sender_ssrc: 0,
            media_ssrc,
        })])
        .await
        .map(|_| ())
        .map_err(|e| Error::ControlSend(e.to_string()))
    }
}

/// A closed track reads as end of stream rather than a pipeline fault.
fn is_end_of_stream(e: &webrtc::Error) -> bool {
    matches!(e, webrtc::Error::ErrClosedPipe) || e.to_string().contains("EOF")
}

/// Run the relay pipeline to completion.
///
/// Blocks on the inbound-track queue until the first video track arrives
/// (non-video tracks are ignored), relays until the stream ends or fails,
/// then stops and joins the heartbeat. A shutdown signal observed in either
/// phase terminates the pipeline.
pub(crate) async fn run<S, W, K>(
    session_id: String,
    mut tracks: mpsc::Receiver<S>,
    sink: W,
    keyframes: K,
    outbound_ssrc: u32,
    keyframe_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    S: PacketSource + Send + Sync + 'static,
    W: PacketSink + Send + Sync + 'static,
    K: KeyframeRequester + Send + Sync + 'static,
{
    let mut state = RelayState::WaitingForTrack;
    debug!(session_id = %session_id, state = ?state, "relay pipeline started");

    let source = loop {
        tokio::select! {
            next = tracks.recv() => match next {
                Some(track) if track.is_video() => break Some(track),
                Some(track) => {
                    debug!(
                        session_id = %session_id,
                        ssrc = track.ssrc(),
                        "ignoring non-video inbound track"
                    );
                }
                None => break None,
            },
            _ = shutdown.changed() => break None,
        }
    };

    let Some(source) = source else {
        state = RelayState::Terminated;
        debug!(session_id = %session_id, state = ?state, "relay pipeline exited before any video track");
        return;
    };

    let inbound_ssrc = source.ssrc();
    state = RelayState::Relaying;
    info!(
        session_id = %session_id,
        inbound_ssrc,
        outbound_ssrc,
        state = ?state,
        "inbound video track started, relaying"
    );

    let (stop_tx, stop_rx) = oneshot::channel();
    let heartbeat_handle = tokio::spawn(heartbeat::run(
        session_id.clone(),
        keyframes,
        inbound_ssrc,
        keyframe_interval,
        stop_rx,
    ));

    let mut forwarded: u64 = 0;
    loop {
        tokio::select! {
            next = source.recv() => match next {
                Ok(Some(mut packet)) => {
                    // The SSRC rewrite is the only mutation; payload, sequence
                    // number and timestamp pass through unchanged.
                    packet.header.ssrc = outbound_ssrc;
                    if let Err(e) = sink.send(&packet).await {
                        warn!(session_id = %session_id, error = %e, "relay write failed, terminating pipeline");
                        break;
                    }
                    forwarded += 1;
                }
                Ok(None) => {
                    debug!(session_id = %session_id, "inbound stream ended");
                    break;
                }
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "relay read failed, terminating pipeline");
                    break;
                }
            },
            _ = shutdown.changed() => {
                debug!(session_id = %session_id, "shutdown requested, terminating pipeline");
                break;
            }
        }
    }

    // Stop the heartbeat before the pipeline completes so no keyframe
    // request can outlive the relay.
    let _ = stop_tx.send(());
    let _ = heartbeat_handle.await;

    state = RelayState::Terminated;
    info!(
        session_id = %session_id,
        forwarded,
        state = ?state,
        "relay pipeline terminated"
    );
}
