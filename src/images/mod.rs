//! Image reference management.
//!
//! Inline image payloads exist only while a model call is prepared. Before
//! anything is persisted, payloads are swapped back for the stored-file
//! references they were resolved from, so conversation storage never holds
//! base64 data.

pub mod store;

use std::collections::VecDeque;
use std::sync::Arc;

use base64::Engine;

use crate::error::FlowError;
use crate::types::{
    Artifact, ContentPart, FileRefKind, ImageContent, ImageOrigin, ModelMessage, Role,
    StoredFileRef,
};

pub use store::{FileStore, InMemoryFileStore};

/// References replaced by [`ImageReferenceManager::inline`], in message order.
///
/// One queue holds references uploaded with the current turn, the other those
/// found in earlier history. [`externalize`] consumes both in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageLedger {
    pub turn: VecDeque<StoredFileRef>,
    pub past: VecDeque<StoredFileRef>,
}

impl ImageLedger {
    pub fn is_empty(&self) -> bool {
        self.turn.is_empty() && self.past.is_empty()
    }
}

/// Messages with images inlined plus the ledger needed to undo it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InlinedImages {
    pub messages: Vec<ModelMessage>,
    pub ledger: ImageLedger,
}

/// Resolves stored image references against a [`FileStore`].
#[derive(Clone)]
pub struct ImageReferenceManager {
    store: Arc<dyn FileStore>,
    detail: String,
}

impl ImageReferenceManager {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self {
            store,
            detail: "low".to_string(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    /// Replace image references with inline payloads.
    ///
    /// References equal to one of `uploads` are attributed to this turn, all
    /// others to past history. Assistant messages whose artifacts point at
    /// stored images are followed by a temporary user message showing those
    /// images to the model. References that cannot be loaded stay as they are.
    pub async fn inline(
        &self,
        messages: &[ModelMessage],
        uploads: &[StoredFileRef],
        chat_id: Option<&str>,
    ) -> Result<InlinedImages, FlowError> {
        let mut ledger = ImageLedger::default();
        let mut out = Vec::with_capacity(messages.len());

        for message in messages {
            let mut next = message.clone();
            let mut parts = Vec::with_capacity(message.content.len());
            for part in &message.content {
                let ContentPart::FileRef(file) = part else {
                    parts.push(part.clone());
                    continue;
                };
                if !file.is_image() {
                    parts.push(part.clone());
                    continue;
                }
                let origin = if uploads.contains(file) {
                    ImageOrigin::Turn
                } else {
                    ImageOrigin::Past
                };
                match self.resolve(file, origin, chat_id).await {
                    Ok(image) => {
                        match origin {
                            ImageOrigin::Turn => ledger.turn.push_back(file.clone()),
                            _ => ledger.past.push_back(file.clone()),
                        }
                        parts.push(ContentPart::Image(image));
                    }
                    Err(err) if err.is_cancellation() => return Err(err),
                    Err(err) => {
                        tracing::warn!(file = %file.name, error = %err, "image reference not inlined");
                        parts.push(part.clone());
                    }
                }
            }
            next.content = parts;
            let artifact_images = if message.role == Role::Assistant {
                self.artifact_images(message, chat_id).await
            } else {
                Vec::new()
            };
            out.push(next);
            if !artifact_images.is_empty() {
                out.push(ModelMessage::from_parts(
                    Role::User,
                    artifact_images.into_iter().map(ContentPart::Image).collect(),
                ));
            }
        }

        Ok(InlinedImages {
            messages: out,
            ledger,
        })
    }

    async fn resolve(
        &self,
        file: &StoredFileRef,
        origin: ImageOrigin,
        chat_id: Option<&str>,
    ) -> Result<ImageContent, FlowError> {
        let url = match file.kind {
            FileRefKind::Url => file.name.clone(),
            FileRefKind::StoredFile => {
                let bytes = self.store.load(chat_id, &file.name).await?;
                data_url(&file.mime, &bytes)
            }
        };
        Ok(ImageContent {
            url,
            mime_type: file.mime.clone(),
            detail: Some(self.detail.clone()),
            origin: Some(origin),
        })
    }

    async fn artifact_images(&self, message: &ModelMessage, chat_id: Option<&str>) -> Vec<ImageContent> {
        let Some(attachments) = &message.attachments else {
            return Vec::new();
        };
        let mut images = Vec::new();
        for artifact in &attachments.artifacts {
            let Some(name) = artifact.stored_image_name() else {
                continue;
            };
            let subtype = if artifact.kind == "jpg" { "jpeg" } else { artifact.kind.as_str() };
            let mime = format!("image/{subtype}");
            match self.store.load(chat_id, name).await {
                Ok(bytes) => images.push(ImageContent {
                    url: data_url(&mime, &bytes),
                    mime_type: mime,
                    detail: Some(self.detail.clone()),
                    origin: Some(ImageOrigin::Artifact),
                }),
                Err(err) => {
                    tracing::warn!(file = name, error = %err, "artifact image not inlined");
                }
            }
        }
        images
    }

    /// Store images produced by the model and describe them as artifacts.
    ///
    /// Returns the file references to attach to the final message together
    /// with one artifact per image.
    pub async fn persist_generated_images(
        &self,
        images: &[ImageContent],
        chat_id: Option<&str>,
    ) -> Result<(Vec<StoredFileRef>, Vec<Artifact>), FlowError> {
        let mut refs = Vec::new();
        let mut artifacts = Vec::new();
        for image in images {
            let extension = extension_for(&image.mime_type);
            match decode_data_url(&image.url) {
                Some(bytes) => {
                    let name = format!("{}.{extension}", uuid::Uuid::new_v4());
                    let stored = self
                        .store
                        .save(chat_id, &name, bytes, &image.mime_type)
                        .await?;
                    artifacts.push(Artifact::stored_image(extension, &stored.name));
                    refs.push(stored);
                }
                None => artifacts.push(Artifact {
                    kind: extension.to_string(),
                    data: serde_json::Value::String(image.url.clone()),
                }),
            }
        }
        Ok((refs, artifacts))
    }
}

/// Swap inline payloads back for the references they were resolved from.
///
/// Turn images pop the turn queue and past images the past queue, so each
/// reference returns to its original position. Temporary artifact messages
/// are removed. Images without an origin (produced by the model) are kept.
pub fn externalize(messages: &[ModelMessage], ledger: &ImageLedger) -> Vec<ModelMessage> {
    let mut turn = ledger.turn.clone();
    let mut past = ledger.past.clone();
    let mut out = Vec::with_capacity(messages.len());

    for message in messages {
        if is_temporary_artifact_message(message) {
            continue;
        }
        let mut next = message.clone();
        next.content = message
            .content
            .iter()
            .map(|part| {
                let ContentPart::Image(image) = part else {
                    return part.clone();
                };
                let replacement = match image.origin {
                    Some(ImageOrigin::Turn) => turn.pop_front(),
                    Some(ImageOrigin::Past) => past.pop_front(),
                    _ => None,
                };
                replacement.map_or_else(|| part.clone(), ContentPart::FileRef)
            })
            .collect();
        out.push(next);
    }
    if !turn.is_empty() || !past.is_empty() {
        tracing::warn!(
            turn = turn.len(),
            past = past.len(),
            "image ledger not fully consumed"
        );
    }
    out
}

fn is_temporary_artifact_message(message: &ModelMessage) -> bool {
    !message.content.is_empty()
        && message.content.iter().all(|part| {
            matches!(part, ContentPart::Image(image) if image.origin == Some(ImageOrigin::Artifact))
        })
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{mime};base64,{encoded}")
}

fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    let rest = url.strip_prefix("data:")?;
    let (_, payload) = rest.split_once(";base64,")?;
    base64::engine::general_purpose::STANDARD.decode(payload).ok()
}

fn extension_for(mime: &str) -> &str {
    match mime {
        "image/jpeg" | "image/jpg" => "jpeg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "png",
    }
}
