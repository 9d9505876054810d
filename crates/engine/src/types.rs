//! Wire types shared with the protocol engine.
//!
//! These mirror the Baileys message shape (camelCase keys). Unknown fields
//! are kept through `#[serde(flatten)]` so a payload persisted as raw JSON
//! still carries everything the engine needs to re-fetch media later
//! (mediaKey, directPath, file hashes, ...).

use serde::{Deserialize, Serialize};

/// Routing key of a message: id, remote party and direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    pub id: String,
    pub remote_jid: String,
    #[serde(default)]
    pub from_me: bool,
}

/// Extended text payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A media payload variant (image/audio/video/document).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Playback duration in seconds (audio/video).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u32>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// `documentWithCaptionMessage` wraps the document one level deeper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<InnerDocument>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InnerDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_message: Option<MediaPart>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Media categories the pipeline materializes to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    Document,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Document => "document",
        }
    }
}

/// The message body, keyed by payload variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_text_message: Option<TextPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_message: Option<MediaPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_message: Option<MediaPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_message: Option<MediaPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_message: Option<MediaPart>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_with_caption_message: Option<WrappedDocument>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MessagePayload {
    /// The first payload-variant key present, or `"unknown"`.
    pub fn kind(&self) -> String {
        if self.text.is_some() {
            "text".into()
        } else if self.conversation.is_some() {
            "conversation".into()
        } else if self.extended_text_message.is_some() {
            "extendedTextMessage".into()
        } else if self.image_message.is_some() {
            "imageMessage".into()
        } else if self.audio_message.is_some() {
            "audioMessage".into()
        } else if self.video_message.is_some() {
            "videoMessage".into()
        } else if self.document_message.is_some() {
            "documentMessage".into()
        } else if self.document_with_caption_message.is_some() {
            "documentWithCaptionMessage".into()
        } else {
            self.extra
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| "unknown".into())
        }
    }

    /// Textual content, if any variant carries one.
    pub fn body_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .or(self.conversation.as_deref())
            .or_else(|| {
                self.extended_text_message
                    .as_ref()
                    .and_then(|t| t.text.as_deref())
            })
    }

    /// Textual content, falling back to the serialized raw payload.
    pub fn content_string(&self) -> String {
        match self.body_text() {
            Some(t) => t.to_string(),
            None => serde_json::to_string(self).unwrap_or_else(|_| "{}".into()),
        }
    }

    /// The media variant carried by this payload, if any.
    pub fn media(&self) -> Option<(MediaKind, &MediaPart)> {
        if let Some(p) = &self.image_message {
            return Some((MediaKind::Image, p));
        }
        if let Some(p) = &self.audio_message {
            return Some((MediaKind::Audio, p));
        }
        if let Some(p) = &self.video_message {
            return Some((MediaKind::Video, p));
        }
        if let Some(p) = &self.document_message {
            return Some((MediaKind::Document, p));
        }
        if let Some(p) = self
            .document_with_caption_message
            .as_ref()
            .and_then(|w| w.message.as_ref())
            .and_then(|m| m.document_message.as_ref())
        {
            return Some((MediaKind::Document, p));
        }
        None
    }

    /// Build a payload carrying exactly one media variant. Used to
    /// synthesize redownload requests from persisted raw content.
    pub fn with_media(kind: MediaKind, part: MediaPart) -> Self {
        let mut payload = Self::default();
        match kind {
            MediaKind::Image => payload.image_message = Some(part),
            MediaKind::Audio => payload.audio_message = Some(part),
            MediaKind::Video => payload.video_message = Some(part),
            MediaKind::Document => payload.document_message = Some(part),
        }
        payload
    }
}

/// A message event produced by the protocol engine, consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    pub key: MessageKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessagePayload>,
    /// Send time in epoch seconds; absent for some synthetic events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    /// Delivery status set by the engine on messages sent from this account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
}

impl InboundMessage {
    /// Whether this message originated from this application instance.
    pub fn from_app(&self) -> bool {
        self.status.is_some()
    }
}

/// The minimal message object the engine needs to re-fetch and decrypt a
/// media payload: key plus the embedded media variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaRequest {
    pub key: MessageKey,
    pub message: MessagePayload,
}

impl MediaRequest {
    pub fn new(id: impl Into<String>, remote_jid: impl Into<String>, payload: MessagePayload) -> Self {
        Self {
            key: MessageKey {
                id: id.into(),
                remote_jid: remote_jid.into(),
                from_me: false,
            },
            message: payload,
        }
    }
}
