//! End-to-end echo test
//!
//! Connects a publisher-side peer connection to the relay over loopback
//! (host ICE candidates, in-process DTLS/SRTP) and verifies that RTP sent
//! into the relay comes back with its payload intact.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use mirrorweb_relay::{signal, RelayConfig, SessionManager};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::rtp::header::Header;
use webrtc::rtp::packet::Packet;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::{TrackLocal, TrackLocalWriter};

const ECHO_PAYLOAD: &[u8] = b"mirrorweb-echo-probe";

#[tokio::test]
async fn test_video_echoes_back_with_payload_intact() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();

    let manager = Arc::new(SessionManager::new(RelayConfig {
        stun_servers: Vec::new(),
        ..Default::default()
    }));

    // Publisher-side peer connection.
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .expect("register codecs");
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)
        .expect("register interceptors");
    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();
    let publisher = Arc::new(
        api.new_peer_connection(RTCConfiguration::default())
            .await
            .expect("create publisher"),
    );

    let send_track = Arc::new(TrackLocalStaticRTP::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_VP8.to_string(),
            clock_rate: 90000,
            ..Default::default()
        },
        "video".to_string(),
        "publisher".to_string(),
    ));
    let rtp_sender = publisher
        .add_track(Arc::clone(&send_track) as Arc<dyn TrackLocal + Send + Sync>)
        .await
        .expect("add publisher track");
    tokio::spawn(async move {
        let mut rtcp_buf = vec![0u8; 1500];
        while let Ok((_, _)) = rtp_sender.read(&mut rtcp_buf).await {}
    });

    // Collect whatever the relay echoes back.
    let (echo_tx, mut echo_rx) = mpsc::channel::<Packet>(64);
    publisher.on_track(Box::new(move |track, _receiver, _transceiver| {
        let echo_tx = echo_tx.clone();
        Box::pin(async move {
            tokio::spawn(async move {
                while let Ok((packet, _)) = track.read_rtp().await {
                    if echo_tx.send(packet).await.is_err() {
                        break;
                    }
                }
            });
        })
    }));

    let (connected_tx, mut connected_rx) = watch::channel(false);
    publisher.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let connected_tx = connected_tx.clone();
        Box::pin(async move {
            if state == RTCPeerConnectionState::Connected {
                let _ = connected_tx.send(true);
            }
        })
    }));

    // Offer/answer exchange through the relay's signaling codec.
    let offer = publisher.create_offer(None).await.expect("create offer");
    let mut gather_complete = publisher.gathering_complete_promise().await;
    publisher
        .set_local_description(offer)
        .await
        .expect("set local offer");
    let _ = gather_complete.recv().await;
    let local = publisher
        .local_description()
        .await
        .expect("local description");

    let answer_text = manager
        .open(&signal::encode(&local).expect("encode offer"))
        .await
        .expect("relay open");
    let answer = signal::decode(&answer_text).expect("decode answer");
    publisher
        .set_remote_description(answer)
        .await
        .expect("set remote answer");

    timeout(Duration::from_secs(20), async {
        while !*connected_rx.borrow() {
            connected_rx.changed().await.expect("state channel open");
        }
    })
    .await
    .expect("publisher and relay never connected");

    // Pump RTP at the relay until echoes arrive.
    let pump_track = Arc::clone(&send_track);
    let pump = tokio::spawn(async move {
        let mut sequence_number: u16 = 0;
        loop {
            let packet = Packet {
                header: Header {
                    version: 2,
                    payload_type: 96,
                    sequence_number,
                    timestamp: u32::from(sequence_number) * 3000,
                    ssrc: 1111,
                    ..Default::default()
                },
                payload: Bytes::from_static(ECHO_PAYLOAD),
            };
            let _ = pump_track.write_rtp(&packet).await;
            sequence_number = sequence_number.wrapping_add(1);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    });

    let mut echoed = Vec::new();
    timeout(Duration::from_secs(20), async {
        while echoed.len() < 3 {
            if let Some(packet) = echo_rx.recv().await {
                echoed.push(packet);
            }
        }
    })
    .await
    .expect("no echoed packets arrived");
    pump.abort();

    let first_ssrc = echoed[0].header.ssrc;
    for packet in &echoed {
        assert_eq!(
            packet.payload.as_ref(),
            ECHO_PAYLOAD,
            "payload bytes must pass through the relay unchanged"
        );
        assert_eq!(
            packet.header.ssrc, first_ssrc,
            "all echoed packets must share one outbound stream identifier"
        );
    }

    manager.close().await.expect("relay close");
    publisher.close().await.expect("publisher close");
}
