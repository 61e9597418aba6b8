//! Source ranking and selection policy.
//!
//! All functions are pure: they take a ranked candidate slice and return
//! an index. Callers own the session state.

use marquee_core::{ConnectionEstimate, QualityTier, SourceCandidate};

/// Why a selection was made.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SelectionReason {
    /// No usable bandwidth estimate: start at the top.
    NoEstimate,
    /// Fast connection: start at the top.
    Unconstrained,
    /// First candidate under the speed-derived ceiling.
    UnderCeiling,
    /// Nothing fits under the ceiling: lowest candidate.
    LowestAvailable,
    /// Connection degraded below the current resolution.
    Downgrade,
    /// Current source is already within the tier ceiling.
    AlreadyOptimal,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SelectionDecision {
    pub index: usize,
    pub reason: SelectionReason,
}

/// Stable sort by descending parsed resolution. Unparseable labels rank
/// as 0 and therefore last; ties keep their original order.
pub fn rank(candidates: &[SourceCandidate]) -> Vec<SourceCandidate> {
    let mut ranked = candidates.to_vec();
    ranked.sort_by_key(|candidate| std::cmp::Reverse(candidate.resolution()));
    ranked
}

/// Move candidates a media element cannot stream behind the streamable
/// ones, keeping rank order within each group.
pub fn demote_unstreamable(ranked: &[SourceCandidate]) -> Vec<SourceCandidate> {
    let (mut streamable, rest): (Vec<_>, Vec<_>) =
        ranked.iter().cloned().partition(SourceCandidate::is_streamable);
    streamable.extend(rest);
    streamable
}

/// Resolution ceiling for an initial pick at `speed_mbps`, or `None` when
/// the speed imposes no limit.
fn speed_ceiling(speed_mbps: f64) -> Option<u32> {
    if speed_mbps < 2.0 {
        Some(480)
    } else if speed_mbps < 5.0 {
        Some(720)
    } else if speed_mbps < 10.0 {
        Some(1080)
    } else {
        None
    }
}

/// Choose the starting candidate for a ranked list.
pub fn decide_initial(
    ranked: &[SourceCandidate],
    estimate: Option<&ConnectionEstimate>,
) -> SelectionDecision {
    if ranked.is_empty() {
        return SelectionDecision {
            index: 0,
            reason: SelectionReason::NoEstimate,
        };
    }

    let Some(estimate) = estimate.filter(|e| e.is_usable()) else {
        return SelectionDecision {
            index: 0,
            reason: SelectionReason::NoEstimate,
        };
    };

    let Some(ceiling) = speed_ceiling(estimate.speed_mbps) else {
        return SelectionDecision {
            index: 0,
            reason: SelectionReason::Unconstrained,
        };
    };

    let decision = match ranked.iter().position(|c| c.resolution() <= ceiling) {
        Some(index) => SelectionDecision {
            index,
            reason: SelectionReason::UnderCeiling,
        },
        None => SelectionDecision {
            index: ranked.len() - 1,
            reason: SelectionReason::LowestAvailable,
        },
    };

    tracing::debug!(
        speed_mbps = estimate.speed_mbps,
        ceiling,
        index = decision.index,
        reason = ?decision.reason,
        "Initial source selected"
    );
    decision
}

/// Index of the starting candidate; 0 for an empty list.
pub fn select_initial(ranked: &[SourceCandidate], estimate: Option<&ConnectionEstimate>) -> usize {
    decide_initial(ranked, estimate).index
}

/// Next candidate after a playback failure, wrapping to the top.
///
/// A result equal to `current` (single candidate) means every option has
/// been tried.
pub fn next_on_failure(ranked: &[SourceCandidate], current: usize) -> usize {
    if ranked.is_empty() {
        0
    } else {
        (current + 1) % ranked.len()
    }
}

/// Decide whether a connection change should move playback to a lower
/// resolution. Never upgrades.
pub fn decide_adjustment(
    ranked: &[SourceCandidate],
    current: usize,
    tier: QualityTier,
) -> SelectionDecision {
    let unchanged = SelectionDecision {
        index: current,
        reason: SelectionReason::AlreadyOptimal,
    };

    let Some(current_resolution) = ranked.get(current).map(SourceCandidate::resolution) else {
        return unchanged;
    };
    let ceiling = tier.ceiling();
    if current_resolution <= ceiling {
        return unchanged;
    }

    if let Some(index) = ranked.iter().position(|c| c.resolution() <= ceiling) {
        return SelectionDecision {
            index,
            reason: SelectionReason::Downgrade,
        };
    }

    // Nothing fits: settle for the lowest candidate if it is still a step down.
    let (lowest, lowest_resolution) = ranked
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.resolution()))
        .min_by_key(|&(_, resolution)| resolution)
        .unwrap_or((current, current_resolution));

    if lowest_resolution < current_resolution {
        SelectionDecision {
            index: lowest,
            reason: SelectionReason::LowestAvailable,
        }
    } else {
        unchanged
    }
}

/// New index when the connection tier no longer supports the current
/// source, or `None` to keep playing it.
pub fn adjust_for_connection(
    ranked: &[SourceCandidate],
    current: usize,
    tier: QualityTier,
) -> Option<usize> {
    let decision = decide_adjustment(ranked, current, tier);
    (decision.index != current).then_some(decision.index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn candidates(labels: &[&str]) -> Vec<SourceCandidate> {
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| SourceCandidate::new(format!("https://cdn.example/{i:02}.mp4"), *label, "mp4"))
            .collect()
    }

    fn labels(ranked: &[SourceCandidate]) -> Vec<&str> {
        ranked.iter().map(|c| c.quality_label.as_str()).collect()
    }

    #[test]
    fn test_rank_descending() {
        let ranked = rank(&candidates(&["480p", "1080p", "720p"]));
        assert_eq!(labels(&ranked), vec!["1080p", "720p", "480p"]);
    }

    #[test]
    fn test_rank_unparseable_last_and_stable() {
        let ranked = rank(&candidates(&["auto", "720p", "HD 720", "1080p"]));
        assert_eq!(labels(&ranked), vec!["1080p", "720p", "HD 720", "auto"]);
    }

    #[rstest]
    #[case(None, "1080p")]
    #[case(Some(0.0), "1080p")]
    #[case(Some(1.0), "480p")]
    #[case(Some(3.0), "720p")]
    #[case(Some(7.0), "1080p")]
    #[case(Some(15.0), "1080p")]
    fn test_select_initial(#[case] speed_mbps: Option<f64>, #[case] expected: &str) {
        let ranked = rank(&candidates(&["480p", "1080p", "720p"]));
        let estimate = speed_mbps.map(|s| ConnectionEstimate::new(s, 50.0));
        let index = select_initial(&ranked, estimate.as_ref());
        assert_eq!(ranked[index].quality_label, expected);
    }

    #[test]
    fn test_select_initial_fast_connection_takes_4k() {
        let ranked = rank(&candidates(&["1080p", "4K"]));
        let estimate = ConnectionEstimate::new(50.0, 10.0);
        assert_eq!(decide_initial(&ranked, Some(&estimate)).reason, SelectionReason::Unconstrained);
        assert_eq!(select_initial(&ranked, Some(&estimate)), 0);

        let estimate = ConnectionEstimate::new(7.0, 10.0);
        assert_eq!(ranked[select_initial(&ranked, Some(&estimate))].quality_label, "1080p");
    }

    #[test]
    fn test_select_initial_falls_back_to_last() {
        let ranked = rank(&candidates(&["1080p", "720p"]));
        let estimate = ConnectionEstimate::new(1.0, 300.0);
        let decision = decide_initial(&ranked, Some(&estimate));
        assert_eq!(decision.index, 1);
        assert_eq!(decision.reason, SelectionReason::LowestAvailable);
    }

    #[test]
    fn test_select_initial_empty() {
        assert_eq!(select_initial(&[], Some(&ConnectionEstimate::new(1.0, 10.0))), 0);
    }

    #[rstest]
    #[case(3, 0, 1)]
    #[case(3, 2, 0)]
    #[case(1, 0, 0)]
    #[case(0, 0, 0)]
    fn test_next_on_failure(#[case] len: usize, #[case] current: usize, #[case] expected: usize) {
        let ranked = candidates(&vec!["720p"; len]);
        assert_eq!(next_on_failure(&ranked, current), expected);
    }

    #[rstest]
    #[case(&["1080p", "720p", "480p"], 0, QualityTier::Excellent, None)]
    #[case(&["1080p", "720p", "480p"], 0, QualityTier::Good, Some(1))]
    #[case(&["1080p", "720p", "480p"], 0, QualityTier::Fair, Some(2))]
    #[case(&["1080p", "720p", "480p"], 0, QualityTier::Poor, Some(2))]
    #[case(&["1080p", "720p", "480p"], 2, QualityTier::Excellent, None)]
    #[case(&["1080p", "720p", "480p"], 1, QualityTier::Poor, Some(2))]
    #[case(&["480p"], 0, QualityTier::Poor, None)]
    #[case(&["2160p", "1440p"], 0, QualityTier::Excellent, Some(1))]
    fn test_adjust_for_connection(
        #[case] labels: &[&str],
        #[case] current: usize,
        #[case] tier: QualityTier,
        #[case] expected: Option<usize>,
    ) {
        let ranked = rank(&candidates(labels));
        assert_eq!(adjust_for_connection(&ranked, current, tier), expected);
    }

    #[test]
    fn test_demote_unstreamable() {
        let ranked = vec![
            SourceCandidate::new("https://cdn/a.mkv", "1080p", "mkv"),
            SourceCandidate::new("https://cdn/b.mp4", "720p", "mp4"),
            SourceCandidate::new("https://cdn/c.avi", "480p", ""),
        ];
        let urls: Vec<String> = demote_unstreamable(&ranked).into_iter().map(|c| c.url).collect();
        assert_eq!(urls, vec!["https://cdn/b.mp4", "https://cdn/a.mkv", "https://cdn/c.avi"]);
    }

    proptest! {
        #[test]
        fn prop_rank_is_sorted_stable_permutation(
            labels in proptest::collection::vec(
                prop_oneof![
                    Just("1080p"), Just("720p"), Just("480p"), Just("360p"),
                    Just("4K"), Just("auto"), Just(""),
                ],
                0..12,
            )
        ) {
            let input = candidates(&labels);
            let ranked = rank(&input);

            prop_assert_eq!(ranked.len(), input.len());
            for pair in ranked.windows(2) {
                prop_assert!(pair[0].resolution() >= pair[1].resolution());
                if pair[0].resolution() == pair[1].resolution() {
                    // urls encode the original position
                    prop_assert!(pair[0].url < pair[1].url);
                }
            }
        }

        #[test]
        fn prop_adjust_never_upgrades(
            labels in proptest::collection::vec(
                prop_oneof![Just("1080p"), Just("720p"), Just("480p"), Just("360p"), Just("auto")],
                1..8,
            ),
            current_seed in 0usize..8,
            tier in prop_oneof![
                Just(QualityTier::Excellent), Just(QualityTier::Good),
                Just(QualityTier::Fair), Just(QualityTier::Poor),
            ],
        ) {
            let ranked = rank(&candidates(&labels));
            let current = current_seed % ranked.len();
            if let Some(next) = adjust_for_connection(&ranked, current, tier) {
                prop_assert!(ranked[next].resolution() < ranked[current].resolution());
            }
        }

        #[test]
        fn prop_select_initial_in_bounds(len in 1usize..10, speed in 0.0f64..50.0) {
            let ranked = candidates(&vec!["720p"; len]);
            let estimate = ConnectionEstimate::new(speed, 50.0);
            prop_assert!(select_initial(&ranked, Some(&estimate)) < len);
        }
    }
}
