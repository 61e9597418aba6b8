//! Marquee Playback
//!
//! Everything between a title's source list and the media element:
//! quality ranking and bandwidth-aware selection, connection estimation
//! and monitoring, the playback session state machine, and subtitle
//! conversion to WebVTT.

pub mod estimator;
pub mod monitor;
pub mod selector;
pub mod session;
pub mod subtitles;

pub use estimator::{ConnectionEstimator, ProbeSample};
pub use monitor::{BandwidthProbe, ConnectionMonitor, HttpProbe};
pub use selector::{
    adjust_for_connection, decide_adjustment, decide_initial, demote_unstreamable,
    next_on_failure, rank, select_initial, SelectionDecision, SelectionReason,
};
pub use session::{
    MediaEvent, MediaSource, PlaybackSession, PlaybackState, SessionAction, SessionOptions,
};
pub use subtitles::{srt_to_webvtt, CaptionFormat, CaptionTrack};
