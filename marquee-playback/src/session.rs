//! Playback session state machine.
//!
//! ```text
//! Idle -> Loading -> Playing <-> Buffering -> Ended
//!            |          |            |
//!            +--------> Error <------+
//!                         |
//!              next candidate -> Loading
//!              exhausted      -> Failed --retry()--> Loading
//! ```
//!
//! The session never touches a media element. It consumes [`MediaEvent`]s
//! and answers with a [`SessionAction`] the caller applies.

use std::fmt;
use std::time::Duration;

use marquee_core::{
    CaptionError, ConnectionEstimate, PlaybackError, PlaybackSettings, SourceCandidate,
};

use crate::selector::{self, SelectionReason};
use crate::subtitles::CaptionTrack;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Buffering,
    Ended,
    Error,
    Failed,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Buffering => "buffering",
            Self::Ended => "ended",
            Self::Error => "error",
            Self::Failed => "failed",
        }
    }

    /// A source is attached and expected to produce events.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Loading | Self::Playing | Self::Buffering)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events reported by the media element.
#[derive(Clone, Debug, PartialEq)]
pub enum MediaEvent {
    Playing,
    Waiting,
    TimeUpdate { position: Duration },
    Error { message: String },
    Ended,
}

impl MediaEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Waiting => "waiting",
            Self::TimeUpdate { .. } => "timeupdate",
            Self::Error { .. } => "error",
            Self::Ended => "ended",
        }
    }
}

/// What the media element should load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaSource {
    pub url: String,
    pub mime_type: &'static str,
    /// Seek here once loaded so a switch continues where playback stopped.
    pub resume_at: Duration,
}

/// Instruction for the caller after a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionAction {
    Load(MediaSource),
    Fail(PlaybackError),
    Continue,
}

impl SessionAction {
    pub fn source(&self) -> Option<&MediaSource> {
        match self {
            Self::Load(source) => Some(source),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Try sources a media element can stream before the rest. Off by
    /// default. When set, initial selection, bandwidth downgrades and
    /// `retry` all work on the demoted order, which is then no longer
    /// sorted by resolution alone.
    pub prefer_streamable: bool,
}

impl From<&PlaybackSettings> for SessionOptions {
    fn from(settings: &PlaybackSettings) -> Self {
        Self {
            prefer_streamable: settings.prefer_streamable,
        }
    }
}

/// One title's playback attempt over a ranked candidate list.
#[derive(Debug)]
pub struct PlaybackSession {
    ranked: Vec<SourceCandidate>,
    current_index: usize,
    state: PlaybackState,
    connection: Option<ConnectionEstimate>,
    position: Duration,
    failure_run: usize,
    last_error: Option<String>,
    captions: Option<CaptionTrack>,
    caption_error: Option<CaptionError>,
}

impl PlaybackSession {
    /// Rank `candidates` and pick the starting source for `connection`.
    pub fn new(
        candidates: &[SourceCandidate],
        connection: Option<ConnectionEstimate>,
        options: SessionOptions,
    ) -> Result<Self, PlaybackError> {
        if candidates.is_empty() {
            return Err(PlaybackError::NoCandidates);
        }

        let mut ranked = selector::rank(candidates);
        if options.prefer_streamable {
            ranked = selector::demote_unstreamable(&ranked);
        }
        let current_index = selector::select_initial(&ranked, connection.as_ref());

        Ok(Self {
            ranked,
            current_index,
            state: PlaybackState::Idle,
            connection,
            position: Duration::ZERO,
            failure_run: 0,
            last_error: None,
            captions: None,
            caption_error: None,
        })
    }

    pub fn candidates(&self) -> &[SourceCandidate] {
        &self.ranked
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current(&self) -> &SourceCandidate {
        &self.ranked[self.current_index]
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn connection(&self) -> Option<&ConnectionEstimate> {
        self.connection.as_ref()
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Load the selected source.
    pub fn start(&mut self) -> Result<SessionAction, PlaybackError> {
        if self.state != PlaybackState::Idle {
            return Err(self.invalid("start"));
        }
        Ok(self.load(self.current_index))
    }

    /// Apply a media element event.
    ///
    /// Events that make no sense in the current state (a late `timeupdate`
    /// after `Failed`, say) are ignored.
    pub fn handle_event(&mut self, event: MediaEvent) -> SessionAction {
        use PlaybackState as S;

        match (self.state, event) {
            (S::Loading | S::Playing | S::Buffering, MediaEvent::Playing) => {
                self.failure_run = 0;
                self.last_error = None;
                self.transition(S::Playing, "playing");
                SessionAction::Continue
            }
            (S::Playing, MediaEvent::Waiting) => {
                self.transition(S::Buffering, "waiting");
                SessionAction::Continue
            }
            (S::Loading | S::Playing | S::Buffering, MediaEvent::TimeUpdate { position }) => {
                self.position = position;
                SessionAction::Continue
            }
            (S::Loading | S::Playing | S::Buffering, MediaEvent::Error { message }) => {
                self.fail_current(message)
            }
            (S::Playing | S::Buffering, MediaEvent::Ended) => {
                self.transition(S::Ended, "ended");
                SessionAction::Continue
            }
            (state, event) => {
                tracing::debug!(state = %state, event = event.name(), "Ignoring media event");
                SessionAction::Continue
            }
        }
    }

    /// Restart a failed session from the top of the ranked list.
    pub fn retry(&mut self) -> Result<SessionAction, PlaybackError> {
        if self.state != PlaybackState::Failed {
            return Err(self.invalid("retry"));
        }

        tracing::info!(candidates = self.ranked.len(), "Retrying playback");
        self.failure_run = 0;
        self.last_error = None;
        Ok(self.load(0))
    }

    /// Explicit quality change to `index` in the ranked list.
    pub fn select_quality(&mut self, index: usize) -> Result<SessionAction, PlaybackError> {
        if index >= self.ranked.len() {
            return Err(PlaybackError::IndexOutOfRange {
                index,
                len: self.ranked.len(),
            });
        }
        if matches!(self.state, PlaybackState::Idle | PlaybackState::Failed) {
            return Err(self.invalid("select_quality"));
        }
        if index == self.current_index && self.state != PlaybackState::Ended {
            return Ok(SessionAction::Continue);
        }

        tracing::info!(
            from = %self.current().quality_label,
            to = %self.ranked[index].quality_label,
            "Quality changed"
        );
        self.failure_run = 0;
        Ok(self.load(index))
    }

    /// Record a new connection estimate, downgrading the active source if
    /// it no longer fits the tier.
    pub fn update_connection(&mut self, estimate: ConnectionEstimate) -> SessionAction {
        self.connection = Some(estimate);
        if !self.state.is_active() {
            return SessionAction::Continue;
        }

        let decision =
            selector::decide_adjustment(&self.ranked, self.current_index, estimate.quality_tier);
        if decision.reason == SelectionReason::AlreadyOptimal {
            return SessionAction::Continue;
        }

        tracing::info!(
            tier = %estimate.quality_tier,
            speed_mbps = estimate.speed_mbps,
            from = %self.current().quality_label,
            to = %self.ranked[decision.index].quality_label,
            "Connection degraded, downgrading source"
        );
        self.load(decision.index)
    }

    /// Attach the outcome of a caption fetch. Never affects playback.
    pub fn set_captions(&mut self, result: Result<CaptionTrack, CaptionError>) {
        match result {
            Ok(track) => {
                self.captions = Some(track);
                self.caption_error = None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Captions unavailable");
                self.captions = None;
                self.caption_error = Some(e);
            }
        }
    }

    pub fn captions(&self) -> Option<&CaptionTrack> {
        self.captions.as_ref()
    }

    pub fn caption_error(&self) -> Option<&CaptionError> {
        self.caption_error.as_ref()
    }

    pub fn dismiss_caption_error(&mut self) {
        self.caption_error = None;
    }

    fn fail_current(&mut self, message: String) -> SessionAction {
        self.transition(PlaybackState::Error, "error");
        self.failure_run += 1;

        let failed = self.current_index;
        let next = selector::next_on_failure(&self.ranked, failed);
        tracing::warn!(
            url = %self.ranked[failed].url,
            quality = %self.ranked[failed].quality_label,
            error = %message,
            failures = self.failure_run,
            "Playback source failed"
        );
        self.last_error = Some(message);

        if next == failed || self.failure_run >= self.ranked.len() {
            let err = PlaybackError::SourcesExhausted {
                attempts: self.failure_run,
            };
            tracing::error!(error = %err, "No playable source left");
            self.transition(PlaybackState::Failed, "exhausted");
            return SessionAction::Fail(err);
        }

        tracing::info!(quality = %self.ranked[next].quality_label, "Falling back to next source");
        self.load(next)
    }

    fn load(&mut self, index: usize) -> SessionAction {
        self.current_index = index;
        self.transition(PlaybackState::Loading, "load");

        let candidate = &self.ranked[index];
        SessionAction::Load(MediaSource {
            url: candidate.url.clone(),
            mime_type: candidate.mime_type(),
            resume_at: self.position,
        })
    }

    fn transition(&mut self, to: PlaybackState, event: &str) {
        if self.state != to {
            tracing::debug!(from = %self.state, to = %to, trigger = event, "Playback state changed");
        }
        self.state = to;
    }

    fn invalid(&self, event: &str) -> PlaybackError {
        PlaybackError::InvalidTransition {
            from: self.state.to_string(),
            event: event.to_string(),
        }
    }
}
