//! Media payloads.
//!
//! Capture itself (microphone, camera) is an external producer of encoded
//! bytes; this module owns the wire form (a data URI in the message
//! `content` field) and the bounded-duration stop semantics a capture UI
//! needs.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::oneshot;

use crate::protocol::MessageKind;

/// Ceiling on a single capture. Hitting it behaves exactly as if the user
/// had stopped the capture themselves.
pub const CAPTURE_CEILING: Duration = Duration::from_secs(60);

/// An encoded media payload handed over by a capture source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAttachment {
    pub kind: MessageKind,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl MediaAttachment {
    pub fn image(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            kind: MessageKind::Image,
            mime: mime.into(),
            bytes,
        }
    }

    pub fn audio(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            kind: MessageKind::Audio,
            mime: mime.into(),
            bytes,
        }
    }

    /// Wire form: `data:<mime>;base64,<payload>`.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
    }

    /// Parse a data URI received in a message body.
    pub fn from_data_uri(kind: MessageKind, uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (mime, payload) = rest.split_once(";base64,")?;
        let bytes = BASE64.decode(payload).ok()?;
        Some(Self {
            kind,
            mime: mime.to_string(),
            bytes,
        })
    }
}

/// How a capture ended. Deliberately equivalent for callers: the ceiling
/// firing is indistinguishable from an explicit stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEnd {
    Stopped,
    CeilingReached,
}

/// Resolve when the user stops the capture or the ceiling fires, whichever
/// comes first. A dropped sender counts as a stop.
pub async fn await_capture_end(stop: oneshot::Receiver<()>, ceiling: Duration) -> CaptureEnd {
    tokio::select! {
        _ = stop => CaptureEnd::Stopped,
        _ = tokio::time::sleep(ceiling) => CaptureEnd::CeilingReached,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uri_round_trip() {
        let attachment = MediaAttachment::image("image/png", vec![0x89, b'P', b'N', b'G']);
        let uri = attachment.to_data_uri();
        assert!(uri.starts_with("data:image/png;base64,"));
        let parsed = MediaAttachment::from_data_uri(MessageKind::Image, &uri).unwrap();
        assert_eq!(parsed, attachment);
    }

    #[test]
    fn rejects_non_data_uris() {
        assert!(MediaAttachment::from_data_uri(MessageKind::Audio, "https://x/clip.ogg").is_none());
        assert!(MediaAttachment::from_data_uri(MessageKind::Audio, "data:audio/ogg;hex,ff").is_none());
        assert!(
            MediaAttachment::from_data_uri(MessageKind::Audio, "data:audio/ogg;base64,!!!").is_none()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ceiling_fires_like_a_user_stop() {
        let (_tx, rx) = oneshot::channel();
        let end = await_capture_end(rx, CAPTURE_CEILING).await;
        assert_eq!(end, CaptureEnd::CeilingReached);
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_stop_cancels_the_ceiling() {
        let (tx, rx) = oneshot::channel();
        let wait = tokio::spawn(await_capture_end(rx, CAPTURE_CEILING));
        tx.send(()).ok();
        assert_eq!(wait.await.unwrap(), CaptureEnd::Stopped);
    }
}
