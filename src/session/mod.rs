//! Session lifecycle management
//!
//! A relay serves exactly one peer at a time. The manager owns the single
//! session slot behind a mutex, so `open` and `close` can never interleave:
//! opening while a session exists is refused, and closing joins the relay
//! worker (which has already joined the heartbeat) before the slot is
//! cleared. Handlers receive the manager by `Arc` rather than reaching for
//! global state.

mod heartbeat;
mod relay;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecParameters;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::config::RelayConfig;
use crate::negotiate::OfferedCapabilities;
use crate::{signal, Error, Result};

/// How long to wait for ICE gathering before answering with whatever
/// candidates have been collected. The answer travels over a single HTTP
/// response, so trickled candidates would have nowhere to go.
const GATHER_TIMEOUT: Duration = Duration::from_secs(5);

/// One active peer relationship: the connection handle, the outbound stream
/// and its randomly chosen stream-source identifier, and the background
/// relay worker bound to the inbound stream's lifetime.
struct Session {
    id: String,
    connection: Arc<RTCPeerConnection>,
    shutdown: watch::Sender<bool>,
    worker: tokio::task::JoinHandle<()>,
}

impl Session {
    /// Stop the background units, release the connection and wait for the
    /// relay worker to exit. Transport-level close failures are logged, not
    /// surfaced; the session is gone either way.
    async fn teardown(self) {
        let _ = self.shutdown.send(true);

        // Closing the connection is what unblocks a pending packet read in
        // the pipeline.
        if let Err(e) = self.connection.close().await {
            warn!(session_id = %self.id, error = %e, "error closing peer connection");
        }

        if self.worker.await.is_err() {
            warn!(session_id = %self.id, "relay worker panicked before close");
        }

        info!(session_id = %self.id, "relay session closed");
    }
}

/// Owns the single session slot and mediates open/close requests.
pub struct SessionManager {
    config: RelayConfig,
    slot: Mutex<Option<Session>>,
}

impl SessionManager {
    /// Create a manager with no active session.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            slot: Mutex::new(None),
        }
    }

    /// Whether a session is currently active.
    pub async fn is_active(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Open a relay session from an encoded offer and return the encoded
    /// answer.
    ///
    /// Fails with [`Error::SessionAlreadyActive`] while a session exists
    /// (the existing session is left untouched), with
    /// [`Error::MalformedPayload`] for an undecodable offer, and with
    /// [`Error::NoUsableVideoCapability`] when the offer advertises no video
    /// codec. Any failure while constructing the transport tears the partial
    /// session down and leaves the slot empty.
    pub async fn open(&self, offer_text: &str) -> Result<String> {
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            return Err(Error::SessionAlreadyActive);
        }

        let offer = signal::decode(offer_text)?;
        let capabilities = OfferedCapabilities::from_offer(&offer)?;
        let selected = capabilities.select_video()?.clone();

        let (session, answer_text) =
            Session::establish(&self.config, offer, &capabilities, selected).await?;

        info!(session_id = %session.id, "relay session opened");
        *slot = Some(session);
        Ok(answer_text)
    }

    /// Close the active session.
    ///
    /// Fails with [`Error::NoActiveSession`] when none exists. Both
    /// background units have exited by the time this returns.
    pub async fn close(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        let session = slot.take().ok_or(Error::NoActiveSession)?;
        session.teardown().await;
        Ok(())
    }
}

impl Session {
    /// Build the peer connection for an accepted offer, wire up the relay
    /// pipeline, and produce the encoded answer.
    async fn establish(
        config: &RelayConfig,
        offer: RTCSessionDescription,
        capabilities: &OfferedCapabilities,
        selected: RTCRtpCodecParameters,
    ) -> Result<(Session, String)> {
        let mut media_engine = capabilities.build_media_engine()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| Error::WebRtc(format!("failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers(config),
            ..Default::default()
        };

        let connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::WebRtc(format!("failed to create peer connection: {}", e)))?,
        );

        // From here on a failure must release the connection so the slot is
        // never left pointing at a half-built session.
        match Self::wire(Arc::clone(&connection), config, offer, selected).await {
            Ok((session, answer_text)) => Ok((session, answer_text)),
            Err(e) => {
                let _ = connection.close().await;
                Err(e)
            }
        }
    }

    async fn wire(
        connection: Arc<RTCPeerConnection>,
        config: &RelayConfig,
        offer: RTCSessionDescription,
        selected: RTCRtpCodecParameters,
    ) -> Result<(Session, String)> {
        let session_id = uuid::Uuid::new_v4().to_string();
        register_state_observer(&connection, session_id.clone());

        debug!(
            session_id = %session_id,
            codec = %selected.capability.mime_type,
            payload_type = selected.payload_type,
            "negotiated echo capability"
        );

        // The outbound stream the inbound video is echoed on. Its
        // stream-source identifier is chosen at random per session and
        // stamped onto every relayed packet.
        let outbound_ssrc: u32 = rand::random();
        let output_track = Arc::new(TrackLocalStaticRTP::new(
            selected.capability.clone(),
            "video".to_string(),
            "mirrorweb".to_string(),
        ));

        let rtp_sender = connection
            .add_track(Arc::clone(&output_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::WebRtc(format!("failed to add outbound track: {}", e)))?;

        // Drain incoming reports on the sender so the interceptors keep
        // processing feedback for the outbound stream.
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = rtp_sender.read(&mut rtcp_buf).await {}
        });

        connection
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::WebRtc(format!("failed to apply remote offer: {}", e)))?;

        // Inbound tracks are handed to the relay worker through a bounded
        // queue; the transport callback never does more than enqueue.
        let (track_tx, track_rx) = mpsc::channel::<Arc<TrackRemote>>(config.track_queue_size);
        connection.on_track(Box::new(move |track, _receiver, _transceiver| {
            let track_tx = track_tx.clone();
            Box::pin(async move {
                debug!(
                    kind = %track.kind(),
                    ssrc = track.ssrc(),
                    "inbound track signalled"
                );
                if track_tx.try_send(track).is_err() {
                    warn!("inbound track queue full or closed, dropping track");
                }
            })
        }));

        let answer = connection
            .create_answer(None)
            .await
            .map_err(|e| Error::WebRtc(format!("failed to create answer: {}", e)))?;

        let mut gather_complete = connection.gathering_complete_promise().await;
        connection
            .set_local_description(answer)
            .await
            .map_err(|e| Error::WebRtc(format!("failed to apply local answer: {}", e)))?;

        if tokio::time::timeout(GATHER_TIMEOUT, gather_complete.recv())
            .await
            .is_err()
        {
            debug!(session_id = %session_id, "ICE gathering still running, answering with partial candidates");
        }

        let local_description = connection
            .local_description()
            .await
            .ok_or_else(|| Error::WebRtc("no local description after answering".to_string()))?;
        let answer_text = signal::encode(&local_description)?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(relay::run(
            session_id.clone(),
            track_rx,
            output_track,
            Arc::clone(&connection),
            outbound_ssrc,
            Duration::from_secs(config.keyframe_interval_secs),
            shutdown_rx,
        ));

        let session = Session {
            id: session_id,
            connection,
            shutdown: shutdown_tx,
            worker,
        };
        Ok((session, answer_text))
    }
}

/// Log every transport connectivity transition. Disconnection does not close
/// the session; the peer owns the lifecycle and must call close explicitly.
fn register_state_observer(connection: &RTCPeerConnection, session_id: String) {
    connection.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let session_id = session_id.clone();
        Box::pin(async move {
            info!(session_id = %session_id, state = %state, "peer connection state changed");
        })
    }));
}

fn ice_servers(config: &RelayConfig) -> Vec<RTCIceServer> {
    config
        .stun_servers
        .iter()
        .map(|url| RTCIceServer {
            urls: vec![url.clone()],
            ..Default::default()
        })
        .chain(config.turn_servers.iter().map(|turn| RTCIceServer {
            urls: vec![turn.url.clone()],
            username: turn.username.clone(),
            credential: turn.credential.clone(),
            ..Default::default()
        }))
        .collect()
}
