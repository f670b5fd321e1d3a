//! Chunk aggregation for streamed model responses.

use futures::stream::BoxStream;

use super::ProviderResponse;
use crate::error::FlowError;
use crate::types::MessageChunk;

/// Folds streamed chunks into one [`ProviderResponse`].
///
/// Text is concatenated in arrival order. Tool calls, usage and finish
/// reason are replaced by each chunk that carries them.
#[derive(Debug, Default)]
pub struct ChunkAggregator {
    response: ProviderResponse,
}

impl ChunkAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: MessageChunk) {
        self.response.text.push_str(&chunk.text);
        if let Some(tool_calls) = chunk.tool_calls {
            self.response.tool_calls = tool_calls;
        }
        if let Some(usage) = chunk.usage {
            self.response.usage = usage;
        }
        if chunk.finish_reason.is_some() {
            self.response.finish_reason = chunk.finish_reason;
        }
        self.response.images.extend(chunk.images);
    }

    pub fn text(&self) -> &str {
        &self.response.text
    }

    pub fn finish(self) -> ProviderResponse {
        self.response
    }
}

/// Replay a complete response as a one-chunk stream.
pub(crate) fn single_chunk_stream(
    response: ProviderResponse,
) -> BoxStream<'static, Result<MessageChunk, FlowError>> {
    Box::pin(async_stream::stream! {
        yield Ok(MessageChunk {
            text: response.text,
            tool_calls: Some(response.tool_calls),
            usage: Some(response.usage),
            finish_reason: response.finish_reason,
            images: response.images,
        });
    })
}
