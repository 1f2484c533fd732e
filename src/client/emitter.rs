use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use futures_util::stream::FusedStream;
use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, UpstreamCode};
use crate::extract::PayloadExtractor;
use crate::observability;
use crate::protocol::canonical::{ChunkResult, CompletionSummary};
use crate::request::PreparedRequest;
use crate::stream::{guarded_reads, FrameDecoder, GuardedReads};
use crate::transport::{invoke, CancelSource, Invocation, TimeoutGuard, Transport, UpstreamResponse};

/// Everything needed to issue the request on first poll.
pub(crate) struct CallPlan {
    pub transport: Arc<dyn Transport>,
    pub request: PreparedRequest,
    pub caller: Option<CancellationToken>,
    pub timeout: Option<Duration>,
    pub idle: Option<Duration>,
    pub upstream_code: UpstreamCode,
    pub model: String,
}

/// Cancellation state owned for the lifetime of one call. Dropping it
/// disarms the deadline timer.
struct Call {
    invocation: Invocation,
    cancelled: BoxFuture<'static, CancelSource>,
    _timer: Option<TimeoutGuard>,
    idle: Option<Duration>,
}

enum State {
    Idle(Box<CallPlan>),
    Connecting {
        response: BoxFuture<'static, Result<UpstreamResponse, ClientError>>,
        call: Call,
    },
    Reading {
        reads: GuardedReads,
        call: Call,
    },
    Closed,
}

/// Lazy, pull-driven stream of normalized chunks for one completion call.
///
/// The request goes out on the first poll. The response body and deadline
/// timer are owned by the stream and released on every exit path, including
/// the consumer dropping the stream early. After `[DONE]`, end of body, or
/// the first error the stream yields `None`.
pub struct CompletionStream {
    state: State,
    extractor: PayloadExtractor,
    decoder: FrameDecoder,
    frames: Vec<String>,
    ready: VecDeque<ChunkResult>,
    summary: CompletionSummary,
    complete: bool,
    model: String,
    started: Option<Instant>,
}

impl fmt::Debug for CompletionStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Idle(_) => "idle",
            State::Connecting { .. } => "connecting",
            State::Reading { .. } => "reading",
            State::Closed => "closed",
        };
        f.debug_struct("CompletionStream")
            .field("state", &state)
            .field("framing", &self.decoder.framing())
            .field("complete", &self.complete)
            .finish_non_exhaustive()
    }
}

impl CompletionStream {
    pub(crate) fn new(plan: CallPlan, extractor: PayloadExtractor) -> Self {
        Self {
            decoder: FrameDecoder::new(extractor.framing()),
            extractor,
            frames: Vec::new(),
            ready: VecDeque::new(),
            summary: CompletionSummary::default(),
            complete: false,
            model: plan.model.clone(),
            started: None,
            state: State::Idle(Box::new(plan)),
        }
    }

    /// Terminal usage and finish reason, available once the stream has
    /// ended without error.
    #[must_use]
    pub fn summary(&self) -> Option<&CompletionSummary> {
        self.complete.then_some(&self.summary)
    }

    /// Drain the stream, concatenating every delta.
    ///
    /// # Errors
    ///
    /// Returns the first error the stream yields.
    pub async fn collect_text(mut self) -> Result<(String, CompletionSummary), ClientError> {
        let mut text = String::new();
        while let Some(chunk) = self.next().await {
            if let Some(delta) = chunk?.delta {
                text.push_str(&delta);
            }
        }
        Ok((text, self.summary))
    }

    fn start(&mut self, plan: CallPlan) -> State {
        self.started = Some(Instant::now());
        let (invocation, timer) = Invocation::arm(plan.caller, plan.timeout, plan.upstream_code);
        let call = Call {
            cancelled: Box::pin(invocation.signal.clone().into_cancelled()),
            invocation: invocation.clone(),
            _timer: timer,
            idle: plan.idle,
        };
        State::Connecting {
            response: Box::pin(invoke(plan.transport, plan.request, invocation)),
            call,
        }
    }

    /// Streamed frames are extracted as they complete. A buffered body
    /// yields its single document only at end of body.
    fn extract_frames(&mut self) {
        let PayloadExtractor::Frames(extractor) = &self.extractor else {
            return;
        };
        let mut chunks = Vec::new();
        for frame in self.frames.drain(..) {
            extractor.extract_frame(&frame, &mut chunks);
        }
        self.enqueue(chunks);
    }

    fn enqueue(&mut self, chunks: Vec<ChunkResult>) {
        for chunk in chunks {
            self.summary.observe(&chunk);
            self.ready.push_back(chunk);
        }
    }

    /// End of body: flush the decoder and extract what remains.
    fn finish_body(&mut self) -> Result<(), ClientError> {
        self.decoder.finish(&mut self.frames);
        match &self.extractor {
            PayloadExtractor::Document(extractor) => {
                let mut chunks = Vec::new();
                for document in self.frames.drain(..) {
                    extractor.extract_document(&document, &mut chunks)?;
                }
                self.enqueue(chunks);
            }
            PayloadExtractor::Frames(_) => self.extract_frames(),
        }
        self.close_clean();
        Ok(())
    }

    fn close_clean(&mut self) {
        self.complete = true;
        let elapsed = self.started.map(|started| started.elapsed()).unwrap_or_default();
        observability::log_completion(&self.model, &self.summary, elapsed);
    }
}

impl Stream for CompletionStream {
    type Item = Result<ChunkResult, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(chunk) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(chunk)));
            }

            // Every arm either restores a live state or leaves `Closed`, which
            // drops the body and timer it held.
            match std::mem::replace(&mut this.state, State::Closed) {
                State::Idle(plan) => {
                    this.state = this.start(*plan);
                }
                State::Connecting { mut response, call } => match response.as_mut().poll(cx) {
                    Poll::Pending => {
                        this.state = State::Connecting { response, call };
                        return Poll::Pending;
                    }
                    Poll::Ready(Ok(upstream)) => {
                        this.state = State::Reading {
                            reads: guarded_reads(upstream.body, call.idle),
                            call,
                        };
                    }
                    Poll::Ready(Err(err)) => return Poll::Ready(Some(Err(err))),
                },
                State::Reading { mut reads, mut call } => {
                    if let Poll::Ready(source) = call.cancelled.as_mut().poll(cx) {
                        tracing::debug!(?source, "completion cancelled mid-stream");
                        let err = call.invocation.cancel_error(source);
                        drop(reads);
                        drop(call);
                        return Poll::Ready(Some(Err(err)));
                    }
                    match reads.as_mut().poll_next(cx) {
                        Poll::Pending => {
                            this.state = State::Reading { reads, call };
                            return Poll::Pending;
                        }
                        Poll::Ready(Some(Ok(bytes))) => {
                            this.decoder.feed(&bytes, &mut this.frames);
                            this.extract_frames();
                            if this.decoder.is_done() {
                                drop(reads);
                                drop(call);
                                this.close_clean();
                            } else {
                                this.state = State::Reading { reads, call };
                            }
                        }
                        Poll::Ready(Some(Err(err))) => {
                            let err = match call.invocation.signal.fired() {
                                Some(source) => call.invocation.cancel_error(source),
                                None => err,
                            };
                            tracing::debug!(code = %err.code(), "body read failed");
                            drop(reads);
                            drop(call);
                            return Poll::Ready(Some(Err(err)));
                        }
                        Poll::Ready(None) => {
                            drop(reads);
                            drop(call);
                            if let Err(err) = this.finish_body() {
                                return Poll::Ready(Some(Err(err)));
                            }
                        }
                    }
                }
                State::Closed => return Poll::Ready(None),
            }
        }
    }
}

impl FusedStream for CompletionStream {
    fn is_terminated(&self) -> bool {
        matches!(self.state, State::Closed) && self.ready.is_empty()
    }
}
