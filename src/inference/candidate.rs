use crate::config::HeaderConfig;
use crate::inference::profile::RowProfile;
use crate::inference::profile::RowProfiler;
use crate::spreadsheet::grid::Grid;
use std::cmp::Ordering;
use tracing::debug;

/// A row hypothesized to hold column labels.
#[derive(Clone, Debug, PartialEq)]
pub struct HeaderCandidate<'p> {
    pub row_index: usize,
    pub profile: &'p RowProfile,
}

impl HeaderCandidate<'_> {
    pub fn confidence(&self) -> f64 {
        self.profile.header_confidence
    }
}

/// Profiles every row of the grid, in row order.
pub fn profile_grid(grid: &Grid, profiler: &RowProfiler<'_>) -> Vec<RowProfile> {
    grid.rows()
        .iter()
        .enumerate()
        .map(|(index, row)| profiler.profile_or_zero(index, row))
        .collect()
}

/// Ranks header candidates among the leading rows.
pub struct HeaderCandidateDetector<'c> {
    config: &'c HeaderConfig,
}

impl<'c> HeaderCandidateDetector<'c> {
    pub fn new(config: &'c HeaderConfig) -> HeaderCandidateDetector<'c> {
        HeaderCandidateDetector { config }
    }

    /// Returns at most `top_n` candidates from the first `scan_rows` rows whose
    /// confidence exceeds the floor, highest confidence first (earlier row on ties).
    pub fn detect<'p>(&self, profiles: &'p [RowProfile]) -> Vec<HeaderCandidate<'p>> {
        let mut candidates: Vec<HeaderCandidate<'p>> = profiles
            .iter()
            .take(self.config.scan_rows)
            .enumerate()
            .filter(|(_, profile)| profile.non_empty_count > 0)
            .filter(|(_, profile)| profile.header_confidence > self.config.candidate_floor)
            .map(|(row_index, profile)| HeaderCandidate { row_index, profile })
            .collect();
        candidates.sort_by(|a, b| {
            b.confidence()
                .partial_cmp(&a.confidence())
                .unwrap_or(Ordering::Equal)
                .then(a.row_index.cmp(&b.row_index))
        });
        candidates.truncate(self.config.top_n);
        debug!(
            candidates = ?candidates.iter().map(|it| (it.row_index, it.confidence())).collect::<Vec<_>>(),
            "ranked header candidates"
        );
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(confidence: f64) -> RowProfile {
        RowProfile {
            non_empty_count: if confidence > 0.0 { 2 } else { 0 },
            header_confidence: confidence,
            ..RowProfile::default()
        }
    }

    #[test]
    fn ranks_by_confidence_then_row() {
        let profiles = vec![profile(0.0), profile(0.7), profile(0.9), profile(0.7), profile(0.2)];
        let config = HeaderConfig::default();
        let candidates = HeaderCandidateDetector::new(&config).detect(&profiles);
        let rows: Vec<usize> = candidates.iter().map(|it| it.row_index).collect();
        assert_eq!(rows, vec![2, 1, 3]);
    }

    #[test]
    fn scan_window_and_top_n_are_respected() {
        let profiles: Vec<RowProfile> = (0..30).map(|_| profile(0.8)).collect();
        let config = HeaderConfig {
            scan_rows: 4,
            top_n: 2,
            ..HeaderConfig::default()
        };
        let candidates = HeaderCandidateDetector::new(&config).detect(&profiles);
        assert_eq!(candidates.iter().map(|it| it.row_index).collect::<Vec<_>>(), vec![0, 1]);

        let config = HeaderConfig {
            scan_rows: 2,
            ..HeaderConfig::default()
        };
        let mut profiles = profiles;
        profiles[0] = profile(0.0);
        profiles[1] = profile(0.0);
        assert!(HeaderCandidateDetector::new(&config).detect(&profiles).is_empty());
    }
}
