//! Frame loop driver.
//!
//! One session = open the source, then repeat
//! `next_frame -> transforms -> sink -> stop check` until end of stream, a read
//! failure, a stop request or the frame limit. Strictly sequential: one frame is
//! in flight at a time and nothing is buffered.
//!
//! The source is closed exactly once on every exit path, including open
//! failure, error returns and panics unwinding out of a stage or sink.

use crate::cancel::StopCondition;
use crate::error::SessionError;
use crate::ingest::CaptureSource;
use crate::sink::FrameSink;
use crate::transform::TransformChain;

/// What to do when a stage has no retained frame to compare against yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HistoryPolicy {
    /// Drop the frame without calling the sink and keep going.
    #[default]
    Skip,
    /// End the session with `SessionError::Transform`.
    Abort,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub history_policy: HistoryPolicy,
    /// Treat recoverable sink errors as fatal.
    pub abort_on_sink_error: bool,
    /// Stop after this many frames have been read.
    pub max_frames: Option<u64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StopReason {
    #[default]
    EndOfStream,
    /// `next_frame` failed; the error was logged and the session ended.
    ReadFailure,
    StopRequested,
    FrameLimit,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_read: u64,
    /// Sink invocations, successful or not.
    pub frames_emitted: u64,
    pub frames_skipped: u64,
    pub sink_failures: u64,
    pub stop_reason: StopReason,
}

/// Open source, closed on drop.
struct OpenSource<'a, S: CaptureSource + ?Sized> {
    source: &'a mut S,
}

impl<'a, S: CaptureSource + ?Sized> OpenSource<'a, S> {
    fn acquire(source: &'a mut S) -> Result<Self, SessionError> {
        // Built before `open` so that a failed open is closed too.
        let mut guard = Self { source };
        guard.source.open()?;
        Ok(guard)
    }
}

impl<S: CaptureSource + ?Sized> Drop for OpenSource<'_, S> {
    fn drop(&mut self) {
        self.source.close();
        log::debug!("session: released {}", self.source.describe());
    }
}

/// A configurable driver run over an owned source and transform chain.
pub struct Session<S: CaptureSource> {
    source: S,
    transforms: TransformChain,
    config: SessionConfig,
}

impl<S: CaptureSource> Session<S> {
    pub fn new(source: S, transforms: TransformChain) -> Self {
        Self {
            source,
            transforms,
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Give back the source and the chain (with whatever state its stages kept).
    pub fn into_parts(self) -> (S, TransformChain) {
        (self.source, self.transforms)
    }

    /// Drive the loop until it ends. See the module docs for the exit paths.
    pub fn run<K, C>(&mut self, sink: &mut K, stop: &mut C) -> Result<SessionSummary, SessionError>
    where
        K: FrameSink + ?Sized,
        C: StopCondition + ?Sized,
    {
        let Self {
            source,
            transforms,
            config,
        } = self;
        let uri = source.describe();
        log::info!(
            "session: starting source={} stages={:?}",
            uri,
            transforms.names()
        );

        let mut guard = OpenSource::acquire(source)?;
        let mut summary = SessionSummary::default();

        loop {
            if config.max_frames.is_some_and(|max| summary.frames_read >= max) {
                summary.stop_reason = StopReason::FrameLimit;
                break;
            }

            let frame = match guard.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    summary.stop_reason = StopReason::EndOfStream;
                    break;
                }
                Err(e) => {
                    log::warn!("session: read failed, ending session: {}", e);
                    summary.stop_reason = StopReason::ReadFailure;
                    break;
                }
            };
            summary.frames_read += 1;
            let sequence = frame.sequence();

            match transforms.apply(frame) {
                Ok(out) => {
                    summary.frames_emitted += 1;
                    if let Err(e) = sink.consume(&out) {
                        if e.is_fatal() || config.abort_on_sink_error {
                            return Err(SessionError::Sink {
                                sequence,
                                source: e,
                            });
                        }
                        log::warn!("session: frame {}: {}", sequence, e);
                        summary.sink_failures += 1;
                    }
                }
                Err(failure)
                    if failure.error.is_insufficient_history()
                        && config.history_policy == HistoryPolicy::Skip =>
                {
                    log::debug!(
                        "session: frame {} skipped ({} has no history yet)",
                        sequence,
                        failure.stage
                    );
                    summary.frames_skipped += 1;
                }
                Err(failure) => {
                    return Err(SessionError::Transform {
                        stage: failure.stage,
                        sequence,
                        source: failure.error,
                    });
                }
            }

            if stop.should_stop() {
                summary.stop_reason = StopReason::StopRequested;
                break;
            }
        }

        drop(guard);
        log::info!(
            "session: finished source={} reason={:?} read={} emitted={} skipped={} sink_failures={}",
            uri,
            summary.stop_reason,
            summary.frames_read,
            summary.frames_emitted,
            summary.frames_skipped,
            summary.sink_failures
        );
        Ok(summary)
    }
}

/// Run one session with the default configuration.
pub fn start<S, K, C>(
    source: S,
    transforms: TransformChain,
    mut on_frame: K,
    mut stop: C,
) -> Result<SessionSummary, SessionError>
where
    S: CaptureSource,
    K: FrameSink,
    C: StopCondition,
{
    Session::new(source, transforms).run(&mut on_frame, &mut stop)
}
