//! Property-Based Tests for Quota Rendering
//!
//! # Test Properties
//!
//! 1. **Sample Count**: every project renders 2·|global| + 2·Σ|region| + 2 samples
//! 2. **Up Indicators**: exactly one `project_up` and one `regions_up` per project,
//!    1 when the data is present and 0 when it is absent
//! 3. **Global Region Label**: only global quotas carry an empty region label

#![cfg(test)]

use proptest::prelude::*;

use super::exporter::{render_samples, QuotaFamily};
use crate::domain::ports::{ProjectId, ProjectSnapshot, QuotaRecord, RegionQuotaSet, Snapshot};

// =============================================================================
// Property Strategies
// =============================================================================

fn quota_strategy() -> impl Strategy<Value = QuotaRecord> {
    ("[A-Z_]{1,12}", 0u32..100_000, 0u32..100_000)
        .prop_map(|(metric, limit, usage)| QuotaRecord::new(metric, limit as f64, usage as f64))
}

fn region_strategy() -> impl Strategy<Value = RegionQuotaSet> {
    ("[a-z]{2,6}-[a-z]{2,8}[1-9]", prop::collection::vec(quota_strategy(), 0..6))
        .prop_map(|(region, quotas)| RegionQuotaSet::new(region, quotas))
}

fn project_data_strategy(
) -> impl Strategy<Value = (Option<Vec<QuotaRecord>>, Option<Vec<RegionQuotaSet>>)> {
    (
        prop::option::of(prop::collection::vec(quota_strategy(), 0..8)),
        prop::option::of(prop::collection::vec(region_strategy(), 0..5)),
    )
}

/// Snapshots with distinct project ids.
fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    prop::collection::vec(project_data_strategy(), 0..6).prop_map(|projects| {
        Snapshot::new(
            1,
            projects
                .into_iter()
                .enumerate()
                .map(|(i, (global, regions))| ProjectSnapshot {
                    project_id: ProjectId::new(format!("project-{}", i)),
                    global,
                    regions,
                }),
        )
    })
}

// =============================================================================
// Rendering Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_sample_count_formula(snapshot in snapshot_strategy()) {
        let samples = render_samples(&snapshot);

        let expected: usize = snapshot
            .projects()
            .map(|p| {
                2 * p.global.as_ref().map_or(0, Vec::len)
                    + 2 * p
                        .regions
                        .as_ref()
                        .map_or(0, |r| r.iter().map(|s| s.quotas.len()).sum())
                    + 2
            })
            .sum();

        prop_assert_eq!(samples.len(), expected);
        prop_assert_eq!(samples.len(), snapshot.sample_count());
    }

    #[test]
    fn prop_up_indicators_match_presence(snapshot in snapshot_strategy()) {
        let samples = render_samples(&snapshot);

        for project in snapshot.projects() {
            let name = project.project_id.as_str();
            let ups: Vec<_> = samples
                .iter()
                .filter(|s| s.family == QuotaFamily::ProjectUp && s.labels[0] == name)
                .collect();
            let region_ups: Vec<_> = samples
                .iter()
                .filter(|s| s.family == QuotaFamily::RegionsUp && s.labels[0] == name)
                .collect();

            prop_assert_eq!(ups.len(), 1);
            prop_assert_eq!(region_ups.len(), 1);
            prop_assert_eq!(ups[0].value, if project.global_up() { 1.0 } else { 0.0 });
            prop_assert_eq!(region_ups[0].value, if project.regions_up() { 1.0 } else { 0.0 });
        }
    }

    #[test]
    fn prop_absent_global_has_no_global_samples(snapshot in snapshot_strategy()) {
        let samples = render_samples(&snapshot);

        for project in snapshot.projects() {
            let name = project.project_id.as_str();
            let global_samples = samples
                .iter()
                .filter(|s| s.labels.len() == 3 && s.labels[0] == name && s.labels[1].is_empty())
                .count();
            let expected = 2 * project.global.as_ref().map_or(0, Vec::len);

            prop_assert_eq!(global_samples, expected);
        }
    }
}
