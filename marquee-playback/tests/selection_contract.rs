//! Selection, fallback and caption behavior against the public API.

use marquee_core::{ConnectionEstimate, SourceCandidate};
use marquee_playback::{
    next_on_failure, rank, select_initial, srt_to_webvtt, CaptionTrack, MediaEvent,
    PlaybackSession, PlaybackState, SessionAction, SessionOptions,
};

fn candidates(labels: &[&str]) -> Vec<SourceCandidate> {
    labels
        .iter()
        .map(|label| SourceCandidate::new(format!("https://cdn.example/{label}/index.m3u8"), *label, "m3u8"))
        .collect()
}

fn labels(ranked: &[SourceCandidate]) -> Vec<&str> {
    ranked.iter().map(|c| c.quality_label.as_str()).collect()
}

#[test]
fn ranking_orders_by_resolution_with_unparseable_last() {
    let ranked = rank(&candidates(&["480p", "1080p", "720p"]));
    assert_eq!(labels(&ranked), vec!["1080p", "720p", "480p"]);

    let ranked = rank(&candidates(&["Original", "480p", "1080p", "720p"]));
    assert_eq!(labels(&ranked).last(), Some(&"Original"));
}

#[test]
fn initial_selection_follows_speed() {
    let ranked = rank(&candidates(&["480p", "1080p", "720p"]));

    let slow = ConnectionEstimate::new(3.0, 60.0);
    assert_eq!(ranked[select_initial(&ranked, Some(&slow))].quality_label, "720p");

    let fast = ConnectionEstimate::new(15.0, 20.0);
    assert_eq!(ranked[select_initial(&ranked, Some(&fast))].quality_label, "1080p");

    assert_eq!(ranked[select_initial(&ranked, None)].quality_label, "1080p");
}

#[test]
fn failure_advance_wraps_and_is_reflexive_for_one() {
    let three = rank(&candidates(&["480p", "1080p", "720p"]));
    assert_eq!(next_on_failure(&three, 2), 0);

    let one = candidates(&["720p"]);
    assert_eq!(next_on_failure(&one, 0), 0);
}

#[test]
fn subtitle_conversion_rewrites_timestamps_and_drops_index() {
    let vtt = srt_to_webvtt("1\n00:00:01,000 --> 00:00:02,500\nHello\n");

    assert!(vtt.starts_with("WEBVTT"));
    assert!(vtt.lines().any(|line| line == "00:00:01.000 --> 00:00:02.500"));
    assert!(!vtt.lines().any(|line| line.trim() == "1"));
    assert!(vtt.contains("Hello"));
}

#[test]
fn session_walks_every_candidate_before_failing() {
    let mut session = PlaybackSession::new(
        &candidates(&["480p", "1080p", "720p"]),
        Some(ConnectionEstimate::new(3.0, 60.0)),
        SessionOptions::default(),
    )
    .expect("session should build");

    let first = session.start().expect("start should succeed");
    let mut tried = vec![first.source().expect("start should load").url.clone()];

    loop {
        match session.handle_event(MediaEvent::Error {
            message: "decode error".to_string(),
        }) {
            SessionAction::Load(source) => tried.push(source.url),
            SessionAction::Fail(_) => break,
            SessionAction::Continue => panic!("an error must either fall back or fail"),
        }
    }

    tried.sort();
    tried.dedup();
    assert_eq!(tried.len(), 3, "each candidate is tried exactly once");
    assert_eq!(session.state(), PlaybackState::Failed);

    session.retry().expect("retry should succeed");
    assert_eq!(session.current().quality_label, "1080p");
}

#[test]
fn broken_captions_do_not_stop_playback() {
    let mut session = PlaybackSession::new(&candidates(&["720p"]), None, SessionOptions::default())
        .expect("session should build");
    session.start().expect("start should succeed");
    session.handle_event(MediaEvent::Playing);

    session.set_captions(CaptionTrack::parse("https://cdn.example/en.srt", "English", ""));
    assert!(session.caption_error().is_some());
    assert_eq!(session.state(), PlaybackState::Playing);

    session.set_captions(CaptionTrack::parse(
        "https://cdn.example/en.srt",
        "English",
        "1\n00:00:01,000 --> 00:00:02,500\nHello\n",
    ));
    assert!(session.caption_error().is_none());
    let track = session.captions().expect("captions should attach");
    assert!(track.to_webvtt().contains("00:00:01.000"));
}
