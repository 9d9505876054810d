use std::{path::PathBuf, sync::Arc};

use tracing::info;

use {
    zapgate_common::time::now_ms,
    zapgate_engine::{MediaFetcher, MediaKind, MediaPart, MediaRequest, MessagePayload},
};

use crate::{Error, Result, mime};

/// A materialized media file. Derived and ephemeral — reconstructible from
/// the persisted row at any time.
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub kind: MediaKind,
    pub file_name: String,
    pub file_path: PathBuf,
    /// Retrievable path, `/uploads/{category-code}/{file_name}`.
    pub file_url: String,
    pub mimetype: Option<String>,
}

/// Fetches media bytes through the engine and writes them under the
/// per-category storage roots.
pub struct MediaResolver {
    fetcher: Arc<dyn MediaFetcher>,
    uploads_root: PathBuf,
}

impl MediaResolver {
    pub fn new(fetcher: Arc<dyn MediaFetcher>, uploads_root: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            uploads_root: uploads_root.into(),
        }
    }

    /// Absolute path of a stored file, by category code and name.
    pub fn stored_path(&self, kind: MediaKind, file_name: &str) -> PathBuf {
        self.uploads_root.join(mime::category_dir(kind)).join(file_name)
    }

    /// Fetch, decrypt and write the media payload of a live message.
    ///
    /// `request` must carry the message key and the full payload so the
    /// engine can locate and decrypt the bytes.
    pub async fn materialize(
        &self,
        request: &MediaRequest,
        kind: MediaKind,
        part: &MediaPart,
    ) -> Result<MediaAsset> {
        let extension = mime::extension_for(kind, part.mimetype.as_deref());
        let file_name = format!("{}-{}.{}", now_ms(), request.key.id, extension);

        let bytes = self.fetcher.download_media(request).await?;

        let dir = self.uploads_root.join(mime::category_dir(kind));
        tokio::fs::create_dir_all(&dir).await?;
        let file_path = dir.join(&file_name);
        tokio::fs::write(&file_path, &bytes).await?;

        info!(
            message_id = %request.key.id,
            kind = kind.as_str(),
            size = bytes.len(),
            file = %file_name,
            "media materialized"
        );

        Ok(MediaAsset {
            kind,
            file_url: format!("/uploads/{}/{}", mime::category_code(kind), file_name),
            file_name,
            file_path,
            mimetype: part.mimetype.clone(),
        })
    }

    /// Regenerate a media file from a persisted row's raw content.
    ///
    /// The stored content is the serialized payload; a minimal message
    /// carrying just the embedded media variant is enough for the engine to
    /// re-fetch and decrypt the bytes.
    pub async fn redownload(
        &self,
        message_id: &str,
        remote_party: &str,
        raw_content: &str,
    ) -> Result<(MediaAsset, MediaPart)> {
        let payload: MessagePayload = serde_json::from_str(raw_content)?;
        let (kind, part) = payload
            .media()
            .ok_or_else(|| Error::no_media(message_id))?;
        let part = part.clone();

        let request = MediaRequest::new(
            message_id,
            remote_party,
            MessagePayload::with_media(kind, part.clone()),
        );
        let asset = self.materialize(&request, kind, &part).await?;
        Ok((asset, part))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Fetcher double that records requests and returns fixed bytes.
    struct FixedFetcher {
        bytes: Vec<u8>,
        requests: Mutex<Vec<MediaRequest>>,
    }

    impl FixedFetcher {
        fn new(bytes: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                bytes: bytes.to_vec(),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl MediaFetcher for FixedFetcher {
        async fn download_media(&self, request: &MediaRequest) -> zapgate_engine::Result<Vec<u8>> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.bytes.clone())
        }
    }

    fn image_part() -> MediaPart {
        MediaPart {
            mimetype: Some("image/png".into()),
            caption: Some("holiday".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn materialize_writes_under_category_dir() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FixedFetcher::new(b"png-bytes");
        let resolver = MediaResolver::new(fetcher, dir.path());

        let part = image_part();
        let request = MediaRequest::new(
            "m1",
            "5511888887777@s.whatsapp.net",
            MessagePayload::with_media(MediaKind::Image, part.clone()),
        );
        let asset = resolver
            .materialize(&request, MediaKind::Image, &part)
            .await
            .unwrap();

        assert!(asset.file_name.ends_with("-m1.png"));
        assert!(asset.file_url.starts_with("/uploads/m/"));
        assert_eq!(std::fs::read(&asset.file_path).unwrap(), b"png-bytes");
        assert!(asset.file_path.starts_with(dir.path().join("image")));
    }

    #[tokio::test]
    async fn redownload_synthesizes_request_from_stored_content() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FixedFetcher::new(b"again");
        let resolver = MediaResolver::new(Arc::clone(&fetcher) as Arc<dyn MediaFetcher>, dir.path());

        // What the pipeline persisted: the serialized payload, secrets included.
        let raw = serde_json::json!({
            "audioMessage": {
                "mimetype": "audio/ogg; codecs=opus",
                "seconds": 12,
                "mediaKey": "c2VjcmV0",
                "directPath": "/v/t62.7114-24/abc",
            }
        })
        .to_string();

        let (asset, part) = resolver
            .redownload("m9", "5511999990000:1@s.whatsapp.net", &raw)
            .await
            .unwrap();

        assert_eq!(asset.kind, MediaKind::Audio);
        assert!(asset.file_name.ends_with("-m9.ogg"));
        assert_eq!(part.seconds, Some(12));

        // The synthesized request carries the key and the embedded payload.
        let requests = fetcher.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].key.id, "m9");
        let sent = serde_json::to_value(&requests[0].message).unwrap();
        assert_eq!(sent["audioMessage"]["mediaKey"], "c2VjcmV0");
    }

    #[tokio::test]
    async fn redownload_rejects_text_rows() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = MediaResolver::new(FixedFetcher::new(b""), dir.path());

        let raw = serde_json::json!({ "conversation": "oi" }).to_string();
        let err = resolver
            .redownload("m1", "5511999990000", &raw)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoMedia { .. }));

        let err = resolver.redownload("m1", "5511999990000", "oi").await.unwrap_err();
        assert!(matches!(err, Error::InvalidContent(_)));
    }
}
