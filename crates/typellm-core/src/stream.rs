//! Streaming reassembly
//!
//! [`ChatStream`] turns a source of raw provider frames into validated
//! [`ChatCompletionChunk`]s. It is pull-based: a raw frame is requested from
//! the source only when the consumer asks for the next value, and every
//! callback registered for the previous frame has finished before that
//! happens.
//!
//! Per choice index the session enforces frame order (role first, arguments
//! after a name, nothing after a terminal frame) and accumulates function-call
//! argument text. When the call finishes the text is parsed and validated
//! against the named function, and the frame is replaced by
//! [`DeltaFrame::FunctionCompleted`].

use futures::future::BoxFuture;
use futures::lock::Mutex;
use futures::{Stream, StreamExt, stream};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::error::LlmError;
use crate::function::FunctionCall;
use crate::metrics::StreamMetrics;
use crate::response::{ChatCompletionChunk, Delta, DeltaFrame, ResponseModel};

/// Upstream of raw frames with a cancellation hook
pub trait FrameSource: Stream<Item = Result<Value, LlmError>> + Send + Unpin {
    /// Stop producing frames and release the underlying connection
    fn cancel(&mut self);
}

/// Adapts any stream of raw frames into a [`FrameSource`]; cancelling drops
/// the wrapped stream.
pub struct StreamSource<S> {
    inner: Option<S>,
}

impl<S> StreamSource<S> {
    pub fn new(inner: S) -> Self {
        Self { inner: Some(inner) }
    }
}

impl<S> Stream for StreamSource<S>
where
    S: Stream<Item = Result<Value, LlmError>> + Send + Unpin,
{
    type Item = Result<Value, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut() {
            Some(inner) => Pin::new(inner).poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}

impl<S> FrameSource for StreamSource<S>
where
    S: Stream<Item = Result<Value, LlmError>> + Send + Unpin,
{
    fn cancel(&mut self) {
        self.inner = None;
    }
}

pub type CallbackFuture = BoxFuture<'static, Result<(), LlmError>>;

type FrameCallback = Box<dyn FnMut(ChatCompletionChunk) -> CallbackFuture + Send>;
type FunctionCallCallback = Box<dyn FnMut(u32, FunctionCall) -> CallbackFuture + Send>;
type DoneCallback = Box<dyn FnOnce(Vec<ChatCompletionChunk>) -> CallbackFuture + Send>;

/// Optional hooks for a streaming session; each is awaited before the next
/// raw frame is pulled. An error returned by a hook ends the stream with that
/// error.
#[derive(Default)]
pub struct StreamCallbacks {
    on_frame: Option<FrameCallback>,
    on_function_call: Option<FunctionCallCallback>,
    on_done: Option<DoneCallback>,
}

impl StreamCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with every validated frame, in order
    pub fn on_frame<F, Fut>(mut self, mut callback: F) -> Self
    where
        F: FnMut(ChatCompletionChunk) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), LlmError>> + Send + 'static,
    {
        self.on_frame = Some(Box::new(move |chunk| Box::pin(callback(chunk))));
        self
    }

    /// Called once per reassembled function call with its choice index
    pub fn on_function_call<F, Fut>(mut self, mut callback: F) -> Self
    where
        F: FnMut(u32, FunctionCall) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), LlmError>> + Send + 'static,
    {
        self.on_function_call = Some(Box::new(move |index, call| Box::pin(callback(index, call))));
        self
    }

    /// Called with every validated frame once the source is exhausted
    pub fn on_done<F, Fut>(mut self, callback: F) -> Self
    where
        F: FnOnce(Vec<ChatCompletionChunk>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), LlmError>> + Send + 'static,
    {
        self.on_done = Some(Box::new(move |frames| Box::pin(callback(frames))));
        self
    }
}

impl std::fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("on_frame", &self.on_frame.is_some())
            .field("on_function_call", &self.on_function_call.is_some())
            .field("on_done", &self.on_done.is_some())
            .finish()
    }
}

#[derive(Debug, Default)]
struct PendingCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Default)]
struct ChoiceState {
    started: bool,
    pending: Option<PendingCall>,
    finished: bool,
}

/// Per-index reassembly state of one stream
#[derive(Debug)]
struct Session {
    model: ResponseModel,
    choices: HashMap<u32, ChoiceState>,
}

impl Session {
    fn new(model: ResponseModel) -> Self {
        Self {
            model,
            choices: HashMap::new(),
        }
    }

    fn accept(&mut self, raw: &Value) -> Result<ChatCompletionChunk, LlmError> {
        let classified = self.model.classify_chunk(raw)?;

        let mut frames = Vec::with_capacity(classified.deltas.len());
        for delta in classified.deltas {
            let frame = self.advance(delta, raw)?;
            log::trace!("Classified frame {frame:?}");
            frames.push(frame);
        }

        Ok(ChatCompletionChunk {
            id: classified.id,
            model: classified.model,
            created: classified.created,
            choices: frames,
        })
    }

    fn advance(&mut self, delta: Delta, raw: &Value) -> Result<DeltaFrame, LlmError> {
        let index = match &delta {
            Delta::Frame(frame) => frame.index(),
            Delta::FunctionCallFinished { index } => *index,
        };
        let functions = self.model.functions();
        let state = self.choices.entry(index).or_default();

        let mismatch = |message: String| Err(LlmError::schema_mismatch(message, raw.clone()));

        if state.finished {
            return mismatch(format!("choice {index} received a frame after finishing"));
        }
        let first = !state.started;
        state.started = true;

        let frame = match delta {
            Delta::Frame(DeltaFrame::Role { role, .. }) => {
                if !first {
                    return mismatch(format!("choice {index} announced its role late"));
                }
                DeltaFrame::Role { index, role }
            }
            Delta::Frame(DeltaFrame::FunctionName {
                name, arguments, ..
            }) => {
                if state.pending.is_some() {
                    return mismatch(format!("choice {index} announced a second function"));
                }
                if functions.get(&name).is_none() {
                    return mismatch(format!("choice {index} names unknown function {name:?}"));
                }
                state.pending = Some(PendingCall {
                    name: name.clone(),
                    arguments: arguments.clone(),
                });
                DeltaFrame::FunctionName {
                    index,
                    name,
                    arguments,
                }
            }
            Delta::Frame(DeltaFrame::FunctionArguments { arguments, .. }) => {
                let Some(pending) = state.pending.as_mut() else {
                    return mismatch(format!("choice {index} sent arguments before a name"));
                };
                pending.arguments.push_str(&arguments);
                DeltaFrame::FunctionArguments { index, arguments }
            }
            Delta::FunctionCallFinished { .. } => {
                let Some(pending) = state.pending.take() else {
                    return mismatch(format!("choice {index} finished a call it never started"));
                };
                state.finished = true;
                let call = functions.resolve(index, &pending.name, &pending.arguments)?;
                DeltaFrame::FunctionCompleted { index, call }
            }
            // some providers end a function call with `stop`
            Delta::Frame(DeltaFrame::Stop { .. }) => {
                state.finished = true;
                match state.pending.take() {
                    Some(pending) => {
                        let call = functions.resolve(index, &pending.name, &pending.arguments)?;
                        DeltaFrame::FunctionCompleted { index, call }
                    }
                    None => DeltaFrame::Stop { index },
                }
            }
            Delta::Frame(frame) => {
                if frame.is_terminal() {
                    state.finished = true;
                    state.pending = None;
                }
                frame
            }
        };

        Ok(frame)
    }
}

type SharedSource = Arc<Mutex<Option<Box<dyn FrameSource>>>>;

/// Take the source out of its slot and cancel it
async fn release(source: &SharedSource) {
    if let Some(mut source) = source.lock().await.take() {
        source.cancel();
    }
}

/// Cancellable, pull-based sequence of validated frames
///
/// Dropping the stream cancels it. A read after cancellation, exhaustion, or
/// an error returns `None`.
pub struct ChatStream {
    inner: Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, LlmError>> + Send>>,
    source: SharedSource,
    finished: bool,
}

impl ChatStream {
    pub fn new(
        model_name: impl Into<String>,
        source: Box<dyn FrameSource>,
        model: ResponseModel,
        callbacks: StreamCallbacks,
    ) -> Self {
        let source: SharedSource = Arc::new(Mutex::new(Some(source)));
        let upstream = source.clone();
        let model_name = model_name.into();

        let inner = async_stream::stream! {
            let StreamCallbacks { mut on_frame, mut on_function_call, on_done } = callbacks;
            let mut session = Session::new(model);
            let mut metrics = StreamMetrics::new(model_name);
            let mut buffer: Vec<ChatCompletionChunk> = Vec::new();

            log::debug!("Starting stream for model {}", metrics.model);

            loop {
                let next = {
                    let mut guard = upstream.lock().await;
                    match guard.as_mut() {
                        Some(source) => source.next().await,
                        None => None,
                    }
                };

                let Some(next) = next else {
                    break;
                };

                let chunk = match next.and_then(|raw| session.accept(&raw)) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        metrics.record_error();
                        release(&upstream).await;
                        yield Err(e);
                        return;
                    }
                };
                metrics.record_frame();

                yield Ok(chunk.clone());

                let calls: Vec<(u32, FunctionCall)> = chunk
                    .choices
                    .iter()
                    .filter_map(|frame| match frame {
                        DeltaFrame::FunctionCompleted { index, call } => Some((*index, call.clone())),
                        _ => None,
                    })
                    .collect();

                if let Some(callback) = on_frame.as_mut() {
                    if let Err(e) = callback(chunk.clone()).await {
                        metrics.record_error();
                        release(&upstream).await;
                        yield Err(e);
                        return;
                    }
                }

                for (index, call) in calls {
                    metrics.record_function_call(&call.name);
                    if let Some(callback) = on_function_call.as_mut() {
                        if let Err(e) = callback(index, call).await {
                            metrics.record_error();
                            release(&upstream).await;
                            yield Err(e);
                            return;
                        }
                    }
                }

                buffer.push(chunk);
            }

            // exhausted upstream is released, not cancelled
            upstream.lock().await.take();
            metrics.finalize();

            if let Some(callback) = on_done {
                if let Err(e) = callback(buffer).await {
                    yield Err(e);
                }
            }
        };

        Self {
            inner: Box::pin(inner),
            source,
            finished: false,
        }
    }

    /// Stop reading; the upstream source is cancelled exactly once
    pub fn cancel(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        // dropping the generator releases its hold on the source
        self.inner = Box::pin(stream::empty());

        if let Some(mut guard) = self.source.try_lock() {
            if let Some(mut source) = guard.take() {
                log::debug!("Cancelling upstream frame source");
                source.cancel();
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read to the end, concatenating the content fragments of one choice
    pub async fn collect_text(mut self, index: u32) -> Result<String, LlmError> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            for frame in chunk?.choices {
                if frame.index() == index {
                    if let Some(content) = frame.content() {
                        text.push_str(content);
                    }
                }
            }
        }
        Ok(text)
    }

    /// Drive the stream from a spawned task into a bounded channel
    ///
    /// A frame is pulled only once the channel has room for it, so at most
    /// `capacity` frames are read ahead of the receiver. Dropping the returned
    /// stream cancels the upstream source, including a pending read.
    pub fn into_channel(mut self, capacity: usize) -> ChannelStream {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(async move {
            loop {
                let Ok(permit) = tx.reserve().await else {
                    self.cancel();
                    break;
                };
                tokio::select! {
                    item = self.next() => match item {
                        Some(item) => permit.send(item),
                        None => break,
                    },
                    _ = tx.closed() => {
                        self.cancel();
                        break;
                    }
                }
            }
        });
        ChannelStream { rx }
    }
}

impl Stream for ChatStream {
    type Item = Result<ChatCompletionChunk, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        let polled = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = polled {
            self.finished = true;
        }
        polled
    }
}

impl Drop for ChatStream {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Receiving half of [`ChatStream::into_channel`]
#[derive(Debug)]
pub struct ChannelStream {
    rx: mpsc::Receiver<Result<ChatCompletionChunk, LlmError>>,
}

impl Stream for ChannelStream {
    type Item = Result<ChatCompletionChunk, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
