//! User-visible lifecycle of one study conversation.
//!
//! The session is a plain state machine: it never performs network IO itself.
//! [`Session::submit`] hands back a [`Submission`] carrying a ticket and the
//! request to send; the caller reports the outcome through
//! [`Session::complete`] with the same ticket. Tickets are never reused, so an
//! outcome that arrives after the user moved on is recognised as stale and
//! dropped without touching state.

use std::fmt;
use std::mem;

use tutor_contracts::providers::GenerationError;
use tutor_contracts::request::{self, EncodedImage, RequestError, StudyRequest};
use tutor_contracts::response::StudyResponse;
use tutor_contracts::subject::Subject;
use tutor_contracts::tabs::{DisplayTab, UnknownTab};

use crate::media::{CaptureError, CaptureHandle, MediaCapture};

/// Prompt used when an image is submitted without any text.
pub const DEFAULT_PROMPT: &str = "Solve the exercise";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Capturing,
    Ready,
    Submitting,
    Result,
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::Capturing => "capturing",
            Phase::Ready => "ready",
            Phase::Submitting => "submitting",
            Phase::Result => "showing a result",
            Phase::Error => "showing an error",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub prompt_text: String,
    pub image: Option<EncodedImage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionTicket(u64);

impl SubmissionTicket {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// A request that left the session and must be answered via `complete`.
#[derive(Debug, Clone)]
pub struct Submission {
    pub ticket: SubmissionTicket,
    pub request: StudyRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied(Phase),
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("cannot {event} while {phase}")]
    InvalidTransition { event: &'static str, phase: Phase },
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Request(#[from] RequestError),
    #[error(transparent)]
    Tab(#[from] UnknownTab),
}

#[derive(Debug)]
enum State {
    Idle,
    Ready {
        draft: Draft,
    },
    Capturing {
        draft: Draft,
        handle: CaptureHandle,
    },
    Submitting {
        draft: Draft,
        ticket: SubmissionTicket,
    },
    Result {
        draft: Draft,
        response: StudyResponse,
        tab: DisplayTab,
    },
    Error {
        draft: Draft,
        error: GenerationError,
    },
}

#[derive(Debug)]
pub struct Session {
    subject: Option<Subject>,
    state: State,
    issued_tickets: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            subject: None,
            state: State::Idle,
            issued_tickets: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        match &self.state {
            State::Idle => Phase::Idle,
            State::Ready { .. } => Phase::Ready,
            State::Capturing { .. } => Phase::Capturing,
            State::Submitting { .. } => Phase::Submitting,
            State::Result { .. } => Phase::Result,
            State::Error { .. } => Phase::Error,
        }
    }

    pub fn subject(&self) -> Option<Subject> {
        self.subject
    }

    pub fn draft(&self) -> Option<&Draft> {
        match &self.state {
            State::Idle => None,
            State::Ready { draft }
            | State::Capturing { draft, .. }
            | State::Submitting { draft, .. }
            | State::Result { draft, .. }
            | State::Error { draft, .. } => Some(draft),
        }
    }

    pub fn response(&self) -> Option<&StudyResponse> {
        match &self.state {
            State::Result { response, .. } => Some(response),
            _ => None,
        }
    }

    pub fn active_tab(&self) -> Option<DisplayTab> {
        match &self.state {
            State::Result { tab, .. } => Some(*tab),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<&GenerationError> {
        match &self.state {
            State::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn pending_ticket(&self) -> Option<SubmissionTicket> {
        match &self.state {
            State::Submitting { ticket, .. } => Some(*ticket),
            _ => None,
        }
    }

    pub fn select_subject(&mut self, subject: Subject) -> Result<(), SessionError> {
        if !matches!(self.state, State::Idle) {
            return Err(self.invalid("select a subject"));
        }
        self.subject = Some(subject);
        self.state = State::Ready {
            draft: Draft::default(),
        };
        Ok(())
    }

    /// Hard reset from any phase. A live camera is released before the
    /// draft is discarded; an in-flight submission becomes stale.
    /// Returns `true` when a camera stream was stopped.
    pub fn change_subject(&mut self) -> bool {
        let released = match &mut self.state {
            State::Capturing { handle, .. } => handle.release(),
            _ => false,
        };
        self.subject = None;
        self.state = State::Idle;
        released
    }

    pub fn start_capture(&mut self, media: &MediaCapture) -> Result<(), SessionError> {
        match mem::replace(&mut self.state, State::Idle) {
            State::Ready { draft } => match media.start_capture() {
                Ok(handle) => {
                    self.state = State::Capturing { draft, handle };
                    Ok(())
                }
                Err(err) => {
                    self.state = State::Ready { draft };
                    Err(err.into())
                }
            },
            other => {
                self.state = other;
                Err(self.invalid("start the camera"))
            }
        }
    }

    /// Attaches one frame and returns to `Ready`. The camera is released
    /// whether or not the frame could be taken.
    pub fn capture_frame(&mut self, media: &MediaCapture) -> Result<(), SessionError> {
        match mem::replace(&mut self.state, State::Idle) {
            State::Capturing {
                mut draft,
                mut handle,
            } => {
                let captured = media.capture_frame(&mut handle);
                media.release_capture(&mut handle);
                let outcome = captured.map(|image| draft.image = Some(image));
                self.state = State::Ready { draft };
                outcome.map_err(SessionError::from)
            }
            other => {
                self.state = other;
                Err(self.invalid("capture a frame"))
            }
        }
    }

    pub fn cancel_capture(&mut self) -> Result<(), SessionError> {
        match mem::replace(&mut self.state, State::Idle) {
            State::Capturing { draft, mut handle } => {
                handle.release();
                self.state = State::Ready { draft };
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid("cancel the camera"))
            }
        }
    }

    pub fn attach_image(&mut self, image: EncodedImage) -> Result<(), SessionError> {
        let draft = self.ready_draft_mut("attach an image")?;
        draft.image = Some(image);
        Ok(())
    }

    pub fn clear_image(&mut self) -> Result<(), SessionError> {
        let draft = self.ready_draft_mut("clear the image")?;
        draft.image = None;
        Ok(())
    }

    pub fn set_prompt(&mut self, text: &str) -> Result<(), SessionError> {
        let draft = self.ready_draft_mut("edit the question")?;
        draft.prompt_text = text.to_string();
        Ok(())
    }

    /// `Ok(None)` when a submission is already in flight.
    pub fn submit(&mut self) -> Result<Option<Submission>, SessionError> {
        let draft = match &self.state {
            State::Submitting { .. } => return Ok(None),
            State::Ready { draft } => draft,
            _ => return Err(self.invalid("submit")),
        };
        let request = self.build_request(draft)?;
        let ticket = self.issue_ticket();
        let draft = self.take_draft();
        self.state = State::Submitting { draft, ticket };
        Ok(Some(Submission { ticket, request }))
    }

    /// Follow-ups keep the subject but start from a text-only draft.
    pub fn ask_follow_up(&mut self, text: &str) -> Result<Submission, SessionError> {
        if !matches!(self.state, State::Result { .. }) {
            return Err(self.invalid("ask a follow-up"));
        }
        let draft = Draft {
            prompt_text: text.to_string(),
            image: None,
        };
        let request = self.build_request(&draft)?;
        let ticket = self.issue_ticket();
        self.state = State::Submitting { draft, ticket };
        Ok(Submission { ticket, request })
    }

    pub fn complete(
        &mut self,
        ticket: SubmissionTicket,
        outcome: Result<StudyResponse, GenerationError>,
    ) -> Completion {
        if self.pending_ticket() != Some(ticket) {
            return Completion::Stale;
        }
        let draft = self.take_draft();
        self.state = match outcome {
            Ok(response) => State::Result {
                draft,
                response,
                tab: DisplayTab::default(),
            },
            Err(error) => State::Error { draft, error },
        };
        Completion::Applied(self.phase())
    }

    /// Back to `Ready` with the failed draft intact so it can be resent.
    pub fn acknowledge(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, State::Error { .. }) {
            return Err(self.invalid("acknowledge an error"));
        }
        let draft = self.take_draft();
        self.state = State::Ready { draft };
        Ok(())
    }

    pub fn new_question(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, State::Result { .. }) {
            return Err(self.invalid("start a new question"));
        }
        self.state = State::Ready {
            draft: Draft::default(),
        };
        Ok(())
    }

    pub fn select_tab(&mut self, selected: DisplayTab) -> Result<(), SessionError> {
        let phase = self.phase();
        match &mut self.state {
            State::Result { tab, .. } => {
                *tab = selected;
                Ok(())
            }
            _ => Err(SessionError::InvalidTransition {
                event: "select a tab",
                phase,
            }),
        }
    }

    pub fn select_tab_key(&mut self, key: &str) -> Result<(), SessionError> {
        let tab = DisplayTab::from_key(key)?;
        self.select_tab(tab)
    }

    fn build_request(&self, draft: &Draft) -> Result<StudyRequest, SessionError> {
        let label = self.subject.map(Subject::label).unwrap_or_default();
        let prompt = if draft.prompt_text.trim().is_empty() && draft.image.is_some() {
            DEFAULT_PROMPT
        } else {
            draft.prompt_text.as_str()
        };
        Ok(request::build(label, prompt, draft.image.clone())?)
    }

    fn ready_draft_mut(&mut self, event: &'static str) -> Result<&mut Draft, SessionError> {
        let phase = self.phase();
        match &mut self.state {
            State::Ready { draft } => Ok(draft),
            _ => Err(SessionError::InvalidTransition { event, phase }),
        }
    }

    fn issue_ticket(&mut self) -> SubmissionTicket {
        self.issued_tickets += 1;
        SubmissionTicket(self.issued_tickets)
    }

    fn take_draft(&mut self) -> Draft {
        match mem::replace(&mut self.state, State::Idle) {
            State::Idle => Draft::default(),
            State::Ready { draft }
            | State::Submitting { draft, .. }
            | State::Result { draft, .. }
            | State::Error { draft, .. } => draft,
            State::Capturing { draft, mut handle } => {
                handle.release();
                draft
            }
        }
    }

    fn invalid(&self, event: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            event,
            phase: self.phase(),
        }
    }
}
