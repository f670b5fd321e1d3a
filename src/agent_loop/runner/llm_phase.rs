use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;

use crate::error::FlowError;
use crate::provider::{BoundModel, ChunkAggregator, ProviderResponse};
use crate::types::{MessageChunk, ModelMessage};

use super::super::events::StreamEmitter;
use super::super::types::LoopSettings;

pub(super) struct LlmPhaseArgs<'a> {
    pub(super) model: &'a BoundModel,
    pub(super) messages: &'a [ModelMessage],
    pub(super) emitter: &'a StreamEmitter,
    pub(super) settings: &'a LoopSettings,
    pub(super) cancel: &'a CancellationToken,
    pub(super) depth: usize,
}

/// One model call, streamed or single-shot.
///
/// Streamed calls forward each chunk's text as a token while folding chunks
/// into the same [`ProviderResponse`] a single-shot call would return.
pub(super) async fn run_llm_phase(args: LlmPhaseArgs<'_>) -> Result<ProviderResponse, FlowError> {
    let LlmPhaseArgs {
        model,
        messages,
        emitter,
        settings,
        cancel,
        depth,
    } = args;

    let response = if settings.streaming {
        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FlowError::Canceled),
            stream = model.stream(messages, cancel.child_token()) => stream?,
        };
        drain_stream(stream, emitter, settings, cancel).await?
    } else {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FlowError::Canceled),
            response = model.invoke(messages, cancel.child_token()) => response?,
        }
    };

    tracing::debug!(
        run_id = %settings.run_id,
        depth,
        streamed = settings.streaming,
        tool_calls = response.tool_calls.len(),
        text_len = response.text.len(),
        "model call complete"
    );
    Ok(response)
}

async fn drain_stream(
    mut stream: BoxStream<'static, Result<MessageChunk, FlowError>>,
    emitter: &StreamEmitter,
    settings: &LoopSettings,
    cancel: &CancellationToken,
) -> Result<ProviderResponse, FlowError> {
    let idle_timeout =
        (settings.stream_idle_timeout_ms > 0).then(|| Duration::from_millis(settings.stream_idle_timeout_ms));
    let mut aggregator = ChunkAggregator::new();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FlowError::Canceled),
            next = next_chunk(&mut stream, idle_timeout) => next?,
        };
        let Some(chunk) = next else {
            break;
        };
        match chunk {
            Ok(chunk) => {
                emitter.token(&chunk.text);
                aggregator.push(chunk);
            }
            Err(err) if err.is_cancellation() => return Err(err),
            Err(FlowError::Stream(message)) => return Err(FlowError::Stream(message)),
            Err(err) => return Err(FlowError::Stream(err.to_string())),
        }
    }
    Ok(aggregator.finish())
}

async fn next_chunk(
    stream: &mut BoxStream<'static, Result<MessageChunk, FlowError>>,
    idle_timeout: Option<Duration>,
) -> Result<Option<Result<MessageChunk, FlowError>>, FlowError> {
    match idle_timeout {
        Some(limit) => time::timeout(limit, stream.next())
            .await
            .map_err(|_| FlowError::Timeout(limit.as_millis() as u64)),
        None => Ok(stream.next().await),
    }
}
