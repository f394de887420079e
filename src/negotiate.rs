//! Codec negotiation
//!
//! The relay never decodes media, so it does not restrict what the publisher
//! may send: it enumerates the codecs advertised in the offer and accepts
//! them all, echoing RTP on the first advertised video capability. Building
//! the media engine from the offer (instead of a fixed codec list) also keeps
//! the publisher's dynamic payload types intact in the answer.

use webrtc::api::media_engine::MediaEngine;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::rtp_transceiver::RTCPFeedback;
use webrtc::sdp::util::Codec as SdpCodec;

use crate::{Error, Result};

/// Media capabilities advertised by a remote offer, in advertised order.
#[derive(Debug, Default)]
pub(crate) struct OfferedCapabilities {
    video: Vec<RTCRtpCodecParameters>,
    // Audio codecs are collected too: the answer's audio section has to
    // mirror the publisher's codecs even though audio is never relayed.
    audio: Vec<RTCRtpCodecParameters>,
}

impl OfferedCapabilities {
    /// Enumerate the codecs advertised by an offer.
    ///
    /// Formats without a resolvable rtpmap entry are skipped. Fails with
    /// [`Error::MalformedPayload`] when the offer's SDP does not parse.
    pub(crate) fn from_offer(offer: &RTCSessionDescription) -> Result<Self> {
        let parsed = offer
            .unmarshal()
            .map_err(|e| Error::MalformedPayload(format!("unparsable SDP in offer: {}", e)))?;

        let mut caps = Self::default();

        for media in &parsed.media_descriptions {
            let kind = media.media_name.media.as_str();
            let list = match kind {
                "video" => &mut caps.video,
                "audio" => &mut caps.audio,
                _ => continue,
            };

            for format in &media.media_name.formats {
                let Ok(payload_type) = format.parse::<u8>() else {
                    continue;
                };
                let Ok(codec) = parsed.get_codec_for_payload_type(payload_type) else {
                    continue;
                };
                list.push(codec_parameters(kind, &codec));
            }
        }

        Ok(caps)
    }

    /// Select the capability the relay will echo on: the first video codec
    /// in advertised order, deferring preference to the publisher.
    pub(crate) fn select_video(&self) -> Result<&RTCRtpCodecParameters> {
        self.video.first().ok_or(Error::NoUsableVideoCapability)
    }

    /// Build a media engine populated with exactly the offered codecs.
    pub(crate) fn build_media_engine(&self) -> Result<MediaEngine> {
        let mut engine = MediaEngine::default();

        for codec in &self.video {
            engine
                .register_codec(codec.clone(), RTPCodecType::Video)
                .map_err(|e| Error::WebRtc(format!("failed to register video codec: {}", e)))?;
        }
        for codec in &self.audio {
            engine
                .register_codec(codec.clone(), RTPCodecType::Audio)
                .map_err(|e| Error::WebRtc(format!("failed to register audio codec: {}", e)))?;
        }

        Ok(engine)
    }
}

fn codec_parameters(kind: &str, codec: &SdpCodec) -> RTCRtpCodecParameters {
    RTCRtpCodecParameters {
        capability: RTCRtpCodecCapability {
            mime_type: format!("{}/{}", kind, codec.name),
            clock_rate: codec.clock_rate,
            channels: codec.encoding_parameters.parse().unwrap_or(0),
            sdp_fmtp_line: codec.fmtp.clone(),
            rtcp_feedback: codec
                .rtcp_feedback
                .iter()
                .map(|fb| {
                    let (typ, parameter) = fb.split_once(' ').unwrap_or((fb.as_str(), ""));
                    RTCPFeedback {
                        typ: typ.to_owned(),
                        parameter: parameter.to_owned(),
                    }
                })
                .collect(),
        },
        payload_type: codec.payload_type,
        ..Default::default()
    }
}
