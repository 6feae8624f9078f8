//! Pipeline controller: extraction, translation and reconstruction of one image,
//! observed by the caller as a stream of [`PipelineEvent`]s.

mod progress;
mod state;

use futures_util::Stream;
use image::DynamicImage;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::languages::LanguagePair;
use crate::ocr::{TextExtractor, TranslatedBlock};
use crate::orchestrator::Orchestrator;
use crate::render::Reconstructor;

pub use progress::{ProgressEvent, ProgressLog, ProgressReporter};
pub use state::PipelineState;

const NO_TEXT_MESSAGE: &str = "no text found";

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub image_path: PathBuf,
    pub languages: LanguagePair,
}

/// Final result of one invocation. On failure `blocks` is empty and `image` is
/// `None`; the message says why.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub state: PipelineState,
    pub blocks: Vec<TranslatedBlock>,
    pub image: Option<DynamicImage>,
    pub message: String,
    pub error: Option<PipelineError>,
}

impl PipelineOutcome {
    fn failed(error: PipelineError, message: impl Into<String>) -> Self {
        Self {
            state: PipelineState::Error,
            blocks: Vec::new(),
            image: None,
            message: message.into(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Done
    }
}

#[derive(Debug)]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    Finished(PipelineOutcome),
}

/// Races `future` against cancellation. Cancellation wins ties.
pub(crate) async fn cancellable<F>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, PipelineError>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        output = future => Ok(output),
    }
}

pub struct Pipeline {
    extractor: Arc<dyn TextExtractor>,
    orchestrator: Arc<Orchestrator>,
    reconstructor: Arc<Reconstructor>,
    log: ProgressLog,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        orchestrator: Orchestrator,
        reconstructor: Reconstructor,
        log: ProgressLog,
    ) -> Self {
        Self {
            extractor,
            orchestrator: Arc::new(orchestrator),
            reconstructor: Arc::new(reconstructor),
            log,
        }
    }

    /// Progress events of recent invocations, oldest first.
    pub fn history(&self) -> Vec<ProgressEvent> {
        self.log.snapshot()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Starts an invocation on the current tokio runtime.
    pub fn run(&self, request: PipelineRequest) -> PipelineRun {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        let cancel = CancellationToken::new();

        let run = RunContext {
            state: state_tx,
            reporter: ProgressReporter::new(self.log.clone(), event_tx.clone()),
            events: event_tx,
        };
        let stages = Stages {
            extractor: Arc::clone(&self.extractor),
            orchestrator: Arc::clone(&self.orchestrator),
            reconstructor: Arc::clone(&self.reconstructor),
        };
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            let outcome = match stages.execute(&run, request, &task_cancel).await {
                Ok(outcome) => outcome,
                Err(err) => run.fail(err),
            };
            run.finish(outcome);
        });

        PipelineRun {
            events: event_rx,
            state: state_rx,
            cancel,
            handle,
        }
    }
}

struct Stages {
    extractor: Arc<dyn TextExtractor>,
    orchestrator: Arc<Orchestrator>,
    reconstructor: Arc<Reconstructor>,
}

impl Stages {
    async fn execute(
        &self,
        run: &RunContext,
        request: PipelineRequest,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let PipelineRequest {
            image_path,
            languages,
        } = request;

        run.advance(PipelineState::Extracting, "recognizing image");
        let blocks = cancellable(
            cancel,
            self.extractor.extract(&image_path, languages.source()),
        )
        .await??;
        let load_path = image_path.clone();
        let image = cancellable(
            cancel,
            tokio::task::spawn_blocking(move || image::open(load_path)),
        )
        .await?
        .map_err(|err| PipelineError::Worker(err.to_string()))??;

        let has_text = !blocks.is_empty();
        if has_text {
            run.advance(
                PipelineState::Translating,
                format!("recognized {} text blocks, translating", blocks.len()),
            );
        } else {
            run.advance(PipelineState::Translating, "no text found, skipping translation");
        }
        let translated = self
            .orchestrator
            .translate(blocks, languages, &run.reporter, cancel)
            .await?;

        run.advance(PipelineState::Reconstructing, "translation complete, redrawing image");
        let reconstructor = Arc::clone(&self.reconstructor);
        let render_blocks = translated.clone();
        let image = cancellable(
            cancel,
            tokio::task::spawn_blocking(move || reconstructor.reconstruct(&image, &render_blocks)),
        )
        .await?
        .map_err(|err| PipelineError::Worker(err.to_string()))?;

        let message = if has_text {
            "image translated"
        } else {
            NO_TEXT_MESSAGE
        };
        run.advance(PipelineState::Done, message);
        info!(blocks = translated.len(), path = %image_path.display(), "pipeline finished");
        Ok(PipelineOutcome {
            state: PipelineState::Done,
            blocks: translated,
            image: Some(image),
            message: message.to_string(),
            error: None,
        })
    }
}

/// Per-invocation state publisher. Dropping it before a terminal state (panic or
/// abort of the task) still drives the run to `Error`.
struct RunContext {
    state: watch::Sender<PipelineState>,
    reporter: ProgressReporter,
    events: mpsc::UnboundedSender<PipelineEvent>,
}

impl RunContext {
    fn advance(&self, next: PipelineState, message: impl Into<String>) {
        let current = *self.state.borrow();
        if !current.can_transition_to(next) {
            warn!(from = %current, to = %next, "invalid pipeline transition");
            return;
        }
        self.state.send_replace(next);
        self.reporter.emit(message);
    }

    fn fail(&self, error: PipelineError) -> PipelineOutcome {
        let message = match &error {
            PipelineError::Cancelled => "task aborted".to_string(),
            PipelineError::ServiceUnavailable => "translation service unavailable".to_string(),
            other => other.to_string(),
        };
        warn!(error = %error, "pipeline failed");
        self.state.send_replace(PipelineState::Error);
        self.reporter.emit(message.clone());
        PipelineOutcome::failed(error, message)
    }

    fn finish(&self, outcome: PipelineOutcome) {
        // nobody may be listening any more
        let _ = self.events.send(PipelineEvent::Finished(outcome));
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if self.state.borrow().is_terminal() {
            return;
        }
        let outcome = self.fail(PipelineError::Worker("pipeline task stopped early".to_string()));
        self.finish(outcome);
    }
}

/// Handle to a running invocation. Yields progress events in order and ends with
/// exactly one [`PipelineEvent::Finished`]. Dropping the handle cancels the run.
pub struct PipelineRun {
    events: mpsc::UnboundedReceiver<PipelineEvent>,
    state: watch::Receiver<PipelineState>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PipelineRun {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn is_processing(&self) -> bool {
        self.state().is_processing()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn next_event(&mut self) -> Option<PipelineEvent> {
        self.events.recv().await
    }

    /// Discards progress and waits for the outcome.
    pub async fn finish(mut self) -> PipelineOutcome {
        while let Some(event) = self.events.recv().await {
            if let PipelineEvent::Finished(outcome) = event {
                return outcome;
            }
        }
        PipelineOutcome::failed(
            PipelineError::Worker("event channel closed".to_string()),
            "pipeline task stopped early",
        )
    }
}

impl Stream for PipelineRun {
    type Item = PipelineEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

impl Drop for PipelineRun {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
