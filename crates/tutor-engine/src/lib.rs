pub mod config;
pub mod media;
pub mod provider;
pub mod session;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tutor_contracts::events::{
    EventWriter, ImageSource, ImageSummary, ReleaseReason, ResetReason, SessionEvent,
};
use tutor_contracts::providers::{GenerationError, StudyProvider};
use tutor_contracts::request::{EncodedImage, StudyRequest};
use tutor_contracts::response::StudyResponse;
use tutor_contracts::subject::Subject;
use tutor_contracts::tabs::DisplayTab;

pub use config::{GenerationSettings, ProviderConfig};
pub use media::{CaptureDevice, CaptureError, MediaCapture, StillImageCamera};
pub use provider::GeminiStudyClient;
pub use session::{
    Completion, Draft, Phase, Session, SessionError, Submission, SubmissionTicket,
    DEFAULT_PROMPT,
};

const FINGERPRINT_HEX_LEN: usize = 12;

struct Finished {
    ticket: SubmissionTicket,
    outcome: Result<StudyResponse, GenerationError>,
    elapsed: Duration,
}

/// Drives a [`Session`] against a provider and a capture device.
///
/// Generation runs on a background thread per submission; results come back
/// over a channel and are applied by [`StudyEngine::wait`] or
/// [`StudyEngine::poll`]. Every state change is journaled when a journal is
/// configured.
pub struct StudyEngine {
    session: Session,
    media: MediaCapture,
    provider: Arc<dyn StudyProvider>,
    events: Option<EventWriter>,
    session_id: String,
    done_tx: mpsc::Sender<Finished>,
    done_rx: mpsc::Receiver<Finished>,
}

impl StudyEngine {
    pub fn new(provider: Arc<dyn StudyProvider>, media: MediaCapture) -> Self {
        let (done_tx, done_rx) = mpsc::channel();
        Self {
            session: Session::new(),
            media,
            provider,
            events: None,
            session_id: uuid::Uuid::new_v4().simple().to_string(),
            done_tx,
            done_rx,
        }
    }

    /// Starts appending journal events to `path`.
    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.events = Some(EventWriter::new(path, self.session_id.clone()));
        self.journal(SessionEvent::SessionStarted {
            provider: self.provider.name().to_string(),
        });
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn journal_path(&self) -> Option<PathBuf> {
        self.events.as_ref().map(|events| events.path().to_path_buf())
    }

    pub fn select_subject(&mut self, subject: Subject) -> Result<(), SessionError> {
        self.session.select_subject(subject)?;
        self.journal(SessionEvent::SubjectSelected { subject });
        Ok(())
    }

    pub fn change_subject(&mut self) {
        let abandoned = self.session.pending_ticket();
        if self.session.change_subject() {
            self.journal(SessionEvent::CaptureReleased {
                reason: ReleaseReason::ChangeSubject,
                frame_taken: false,
            });
        }
        self.journal(SessionEvent::SessionReset {
            reason: ResetReason::ChangeSubject,
            abandoned_ticket: abandoned.map(SubmissionTicket::id),
        });
    }

    pub fn start_capture(&mut self) -> Result<(), SessionError> {
        self.session.start_capture(&self.media)?;
        self.journal(SessionEvent::CaptureStarted);
        Ok(())
    }

    pub fn capture_frame(&mut self) -> Result<(), SessionError> {
        let captured = self.session.capture_frame(&self.media);
        if let Err(SessionError::InvalidTransition { .. }) = captured {
            return captured;
        }
        self.journal(SessionEvent::CaptureReleased {
            reason: ReleaseReason::Frame,
            frame_taken: captured.is_ok(),
        });
        captured?;
        if let Some(image) = self.session.draft().and_then(|draft| draft.image.clone()) {
            self.journal(SessionEvent::ImageAttached {
                source: ImageSource::Camera,
                image: image_summary(&image),
            });
        }
        Ok(())
    }

    pub fn cancel_capture(&mut self) -> Result<(), SessionError> {
        self.session.cancel_capture()?;
        self.journal(SessionEvent::CaptureReleased {
            reason: ReleaseReason::Cancel,
            frame_taken: false,
        });
        Ok(())
    }

    /// Decodes file bytes and attaches them to the draft.
    pub fn import_image(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.ensure_ready("attach an image")?;
        let image = self.media.import_file(bytes)?;
        self.attach(image, ImageSource::File)
    }

    pub fn import_data_url(&mut self, data_url: &str) -> Result<(), SessionError> {
        self.ensure_ready("attach an image")?;
        let image = self.media.import_data_url(data_url)?;
        self.attach(image, ImageSource::DataUrl)
    }

    pub fn clear_image(&mut self) -> Result<(), SessionError> {
        self.session.clear_image()
    }

    pub fn set_prompt(&mut self, text: &str) -> Result<(), SessionError> {
        self.session.set_prompt(text)
    }

    /// `Ok(None)` when a request is already in flight.
    pub fn submit(&mut self) -> Result<Option<SubmissionTicket>, SessionError> {
        let Some(submission) = self.session.submit()? else {
            return Ok(None);
        };
        Ok(Some(self.dispatch(submission, false)))
    }

    pub fn ask_follow_up(&mut self, text: &str) -> Result<SubmissionTicket, SessionError> {
        let submission = self.session.ask_follow_up(text)?;
        Ok(self.dispatch(submission, true))
    }

    pub fn acknowledge(&mut self) -> Result<(), SessionError> {
        self.session.acknowledge()?;
        self.journal(SessionEvent::SessionReset {
            reason: ResetReason::Acknowledge,
            abandoned_ticket: None,
        });
        Ok(())
    }

    pub fn new_question(&mut self) -> Result<(), SessionError> {
        self.session.new_question()?;
        self.journal(SessionEvent::SessionReset {
            reason: ResetReason::NewQuestion,
            abandoned_ticket: None,
        });
        Ok(())
    }

    pub fn select_tab(&mut self, tab: DisplayTab) -> Result<(), SessionError> {
        self.session.select_tab(tab)
    }

    pub fn select_tab_key(&mut self, key: &str) -> Result<(), SessionError> {
        self.session.select_tab_key(key)
    }

    /// Applies the next finished generation, blocking up to `timeout`.
    pub fn wait(&mut self, timeout: Duration) -> Option<Completion> {
        let finished = self.done_rx.recv_timeout(timeout).ok()?;
        Some(self.apply(finished))
    }

    /// Applies a finished generation if one is already available.
    pub fn poll(&mut self) -> Option<Completion> {
        let finished = self.done_rx.try_recv().ok()?;
        Some(self.apply(finished))
    }

    /// Blocks until the in-flight submission settles. Stale completions that
    /// arrive in the meantime are discarded along the way.
    pub fn wait_for_settle(&mut self) -> Phase {
        while self.session.phase() == Phase::Submitting {
            self.wait(Duration::from_millis(250));
        }
        self.session.phase()
    }

    fn dispatch(&mut self, submission: Submission, follow_up: bool) -> SubmissionTicket {
        let Submission { ticket, request } = submission;
        self.journal(SessionEvent::SubmissionStarted {
            ticket: ticket.id(),
            subject: request.subject_label().to_string(),
            prompt_chars: request.prompt_text().chars().count(),
            follow_up,
            provider: self.provider.name().to_string(),
            image: request.image().map(image_summary),
        });
        tracing::debug!(ticket = ticket.id(), follow_up, "dispatching generation");

        let provider = Arc::clone(&self.provider);
        let done_tx = self.done_tx.clone();
        let spawned = thread::Builder::new()
            .name(format!("tutor-generate-{}", ticket.id()))
            .spawn(move || {
                let started_at = Instant::now();
                let outcome = generate_guarded(provider.as_ref(), &request);
                let _ = done_tx.send(Finished {
                    ticket,
                    outcome,
                    elapsed: started_at.elapsed(),
                });
            });
        if let Err(err) = spawned {
            let _ = self.done_tx.send(Finished {
                ticket,
                outcome: Err(GenerationError::ProviderUnavailable(format!(
                    "worker thread spawn failed: {err}"
                ))),
                elapsed: Duration::ZERO,
            });
        }
        ticket
    }

    fn apply(&mut self, finished: Finished) -> Completion {
        let Finished {
            ticket,
            outcome,
            elapsed,
        } = finished;
        let failure = outcome
            .as_ref()
            .err()
            .map(|err| (err.code().to_string(), err.to_string()));
        let completion = self.session.complete(ticket, outcome);
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let ticket = ticket.id();
        let event = match (completion, failure) {
            (Completion::Stale, _) => {
                tracing::warn!(ticket, "discarding stale generation result");
                SessionEvent::StaleResponseDiscarded { ticket, elapsed_ms }
            }
            (Completion::Applied(_), Some((code, error))) => SessionEvent::SubmissionFailed {
                ticket,
                code,
                error,
                elapsed_ms,
            },
            (Completion::Applied(_), None) => {
                SessionEvent::ResponseReceived { ticket, elapsed_ms }
            }
        };
        self.journal(event);
        completion
    }

    fn ensure_ready(&self, event: &'static str) -> Result<(), SessionError> {
        match self.session.phase() {
            Phase::Ready => Ok(()),
            phase => Err(SessionError::InvalidTransition { event, phase }),
        }
    }

    fn attach(&mut self, image: EncodedImage, source: ImageSource) -> Result<(), SessionError> {
        let summary = image_summary(&image);
        self.session.attach_image(image)?;
        self.journal(SessionEvent::ImageAttached {
            source,
            image: summary,
        });
        Ok(())
    }

    fn journal(&self, event: SessionEvent) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.record(&event) {
            tracing::warn!(
                event = event.kind(),
                error = %format!("{err:#}"),
                "journal write failed"
            );
        }
    }
}

/// A panicking provider still produces an outcome, so the session never
/// stays in `Submitting`.
fn generate_guarded(
    provider: &dyn StudyProvider,
    request: &StudyRequest,
) -> Result<StudyResponse, GenerationError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| provider.generate(request)));
    outcome.unwrap_or_else(|payload| {
        Err(GenerationError::ProviderUnavailable(format!(
            "provider {} panicked: {}",
            provider.name(),
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("no message")
}

fn image_summary(image: &EncodedImage) -> ImageSummary {
    ImageSummary {
        mime_type: image.mime_type().to_string(),
        bytes: image.len(),
        sha256: image_fingerprint(image),
    }
}

/// Short SHA-256 prefix identifying an image without logging its content.
pub fn image_fingerprint(image: &EncodedImage) -> String {
    let digest = Sha256::digest(image.bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(FINGERPRINT_HEX_LEN);
    encoded
}
