//! Provider-independent stream accumulation
//!
//! Each provider supplies a [`StreamFold`] that merges its events into a
//! running provider-native message and reports the canonical parts each
//! event added. [`accumulate`] drives a fold over an event stream, hands the
//! new parts to the caller's callback, and produces the final response once
//! the stream completes.

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::types::{GenerateChunk, GenerateResponse, Part, Role};

/// Per-chunk callback for streaming calls
///
/// Returning an error aborts the stream; the error is returned to the
/// caller as [`LlmError::Callback`].
pub type StreamCallback<'a> = dyn FnMut(GenerateChunk) -> anyhow::Result<()> + Send + 'a;

/// Outcome of merging one event
#[derive(Debug, Default)]
pub struct FoldStep {
    /// Canonical parts added by this event, in provider order
    pub parts: Vec<Part>,
    /// The provider signalled the end of the message
    pub terminal: bool,
}

impl FoldStep {
    pub fn parts(parts: Vec<Part>) -> Self {
        Self { parts, terminal: false }
    }

    pub fn terminal() -> Self {
        Self {
            parts: Vec::new(),
            terminal: true,
        }
    }
}

/// Incremental merge of one provider's stream events
pub trait StreamFold {
    type Event;

    /// Merge `event` into the running message
    fn merge(&mut self, event: Self::Event) -> Result<FoldStep, LlmError>;

    /// Normalize the fully merged message
    fn finish(self) -> Result<GenerateResponse, LlmError>;

    /// Whether the end of the event stream completes the message even
    /// without a terminal event
    fn completes_at_end(&self) -> bool {
        false
    }
}

/// Lifecycle of an accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    /// Events are arriving
    Streaming,
    /// The terminal event was seen
    Completed,
    /// A transport, protocol, or callback error occurred
    Failed,
}

/// Owns a fold for the duration of one streaming call
#[derive(Debug)]
pub struct StreamAccumulator<F> {
    fold: F,
    state: AccumulatorState,
}

impl<F: StreamFold> StreamAccumulator<F> {
    pub const fn new(fold: F) -> Self {
        Self {
            fold,
            state: AccumulatorState::Streaming,
        }
    }

    pub const fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Merge one event, returning the chunk to deliver (if it added content)
    ///
    /// # Errors
    ///
    /// Fails when the fold rejects the event or the accumulator has already
    /// failed; the accumulator moves to [`AccumulatorState::Failed`].
    pub fn push(&mut self, event: F::Event) -> Result<Option<GenerateChunk>, LlmError> {
        match self.state {
            AccumulatorState::Streaming => {}
            AccumulatorState::Completed => {
                tracing::debug!("ignoring stream event after completion");
                return Ok(None);
            }
            AccumulatorState::Failed => {
                return Err(LlmError::Streaming("stream already failed".to_owned()));
            }
        }

        let step = match self.fold.merge(event) {
            Ok(step) => step,
            Err(e) => {
                self.state = AccumulatorState::Failed;
                return Err(e);
            }
        };

        if step.terminal {
            self.state = AccumulatorState::Completed;
        }

        Ok((!step.parts.is_empty()).then(|| GenerateChunk {
            role: Role::Model,
            index: 0,
            content: step.parts,
        }))
    }

    /// Record a failure that happened outside the fold
    pub const fn fail(&mut self) {
        self.state = AccumulatorState::Failed;
    }

    /// Build the final response
    ///
    /// # Errors
    ///
    /// Fails when the stream never completed or the fold cannot normalize
    /// the merged message.
    pub fn finish(self) -> Result<GenerateResponse, LlmError> {
        match self.state {
            AccumulatorState::Completed => self.fold.finish(),
            AccumulatorState::Streaming if self.fold.completes_at_end() => self.fold.finish(),
            AccumulatorState::Streaming => Err(LlmError::Streaming(
                "stream ended before the message was complete".to_owned(),
            )),
            AccumulatorState::Failed => Err(LlmError::Streaming("stream failed".to_owned())),
        }
    }
}

/// Drive `fold` over `events`, delivering new parts to `callback`
///
/// Cancellation stops consuming events immediately and no further chunks
/// are delivered.
///
/// # Errors
///
/// Returns the first event error, fold error, or callback error;
/// [`LlmError::Cancelled`] when `cancellation` fires. No partial response is
/// returned in any failure case.
pub async fn accumulate<F, S>(
    fold: F,
    events: S,
    callback: &mut StreamCallback<'_>,
    cancellation: &CancellationToken,
) -> Result<GenerateResponse, LlmError>
where
    F: StreamFold,
    S: Stream<Item = Result<F::Event, LlmError>>,
{
    let mut accumulator = StreamAccumulator::new(fold);
    let mut events = std::pin::pin!(events);

    loop {
        let next = tokio::select! {
            biased;
            () = cancellation.cancelled() => {
                accumulator.fail();
                return Err(LlmError::Cancelled);
            }
            next = events.next() => next,
        };

        let Some(event) = next else { break };

        let event = event.inspect_err(|_| accumulator.fail())?;
        let chunk = accumulator.push(event)?;

        if cancellation.is_cancelled() {
            accumulator.fail();
            return Err(LlmError::Cancelled);
        }

        if let Some(chunk) = chunk
            && let Err(e) = callback(chunk)
        {
            accumulator.fail();
            return Err(LlmError::Callback(e));
        }

        if accumulator.state() == AccumulatorState::Completed {
            break;
        }
    }

    accumulator.finish()
}

#[cfg(test)]
mod tests {
    use futures_util::stream;

    use super::*;
    use crate::types::{FinishReason, Message};

    /// Fold over plain strings; `"."` is the terminal event
    #[derive(Default)]
    struct TextFold {
        text: String,
        open_ended: bool,
    }

    impl StreamFold for TextFold {
        type Event = &'static str;

        fn merge(&mut self, event: &'static str) -> Result<FoldStep, LlmError> {
            match event {
                "." => Ok(FoldStep::terminal()),
                "!" => Err(LlmError::Streaming("bad event".to_owned())),
                text => {
                    self.text.push_str(text);
                    Ok(FoldStep::parts(vec![Part::text(text)]))
                }
            }
        }

        fn finish(self) -> Result<GenerateResponse, LlmError> {
            Ok(GenerateResponse {
                message: Some(Message::model_text(self.text)),
                finish_reason: FinishReason::Stop,
                ..GenerateResponse::default()
            })
        }

        fn completes_at_end(&self) -> bool {
            self.open_ended
        }
    }

    fn events(items: &[&'static str]) -> impl Stream<Item = Result<&'static str, LlmError>> {
        stream::iter(items.iter().copied().map(Ok).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn delivers_only_incremental_parts() {
        let mut seen = Vec::new();
        let mut callback = |chunk: GenerateChunk| -> anyhow::Result<()> {
            seen.push(chunk.text());
            Ok(())
        };

        let response = accumulate(
            TextFold::default(),
            events(&["Hel", "lo", "."]),
            &mut callback,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(seen, ["Hel", "lo"]);
        assert_eq!(response.text(), "Hello");
    }

    #[tokio::test]
    async fn missing_terminal_event_is_an_error() {
        let mut callback = |_: GenerateChunk| -> anyhow::Result<()> { Ok(()) };
        let err = accumulate(
            TextFold::default(),
            events(&["partial"]),
            &mut callback,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LlmError::Streaming(ref msg) if msg.contains("before the message was complete")));
    }

    #[tokio::test]
    async fn open_ended_fold_completes_at_end_of_stream() {
        let mut callback = |_: GenerateChunk| -> anyhow::Result<()> { Ok(()) };
        let fold = TextFold {
            open_ended: true,
            ..TextFold::default()
        };
        let response = accumulate(fold, events(&["a", "b"]), &mut callback, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.text(), "ab");
    }

    #[tokio::test]
    async fn callback_error_aborts_the_stream() {
        let mut calls = 0;
        let mut callback = |_: GenerateChunk| -> anyhow::Result<()> {
            calls += 1;
            anyhow::bail!("client went away")
        };
        let err = accumulate(
            TextFold::default(),
            events(&["a", "b", "."]),
            &mut callback,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, LlmError::Callback(_)));
        assert_eq!(err.to_string(), "client went away");
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn event_error_fails_without_partial_result() {
        let mut callback = |_: GenerateChunk| -> anyhow::Result<()> { Ok(()) };
        let items = vec![Ok("a"), Err(LlmError::Streaming("connection reset".to_owned())), Ok(".")];
        let err = accumulate(
            TextFold::default(),
            stream::iter(items),
            &mut callback,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LlmError::Streaming(ref msg) if msg == "connection reset"));
    }

    #[tokio::test]
    async fn cancellation_stops_delivery() {
        let token = CancellationToken::new();
        token.cancel();

        let mut calls = 0;
        let mut callback = |_: GenerateChunk| -> anyhow::Result<()> {
            calls += 1;
            Ok(())
        };
        let err = accumulate(TextFold::default(), events(&["a", "."]), &mut callback, &token)
            .await
            .unwrap_err();

        assert!(matches!(err, LlmError::Cancelled));
        assert_eq!(calls, 0);
    }

    #[test]
    fn accumulator_tracks_state() {
        let mut accumulator = StreamAccumulator::new(TextFold::default());
        assert_eq!(accumulator.state(), AccumulatorState::Streaming);

        assert!(accumulator.push("x").unwrap().is_some());
        assert!(accumulator.push(".").unwrap().is_none());
        assert_eq!(accumulator.state(), AccumulatorState::Completed);
        assert!(accumulator.push("late").unwrap().is_none());

        let mut failing = StreamAccumulator::new(TextFold::default());
        assert!(failing.push("!").is_err());
        assert_eq!(failing.state(), AccumulatorState::Failed);
        assert!(failing.finish().is_err());
    }
}
