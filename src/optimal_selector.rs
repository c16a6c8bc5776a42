//! The Optimal Record Selector (spec §4.7): tries to replace a segment
//! chain with one that needs fewer records, better reliability, or wider
//! transition coverage, without ever making things worse.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Instant;

use crate::catalog::{CatalogLike, CatalogRow, OptimizationScore, Row, VirtualRow};
use crate::config::CoreConfig;
use crate::phase::Phase;
use crate::record_selector::optimize_sequence;
use crate::segment::{PhaseSegment, PhaseSegmentBuilder, PhaseTransition};

/// Bounded, insertion-order-evicted cache of merged virtual rows, keyed by
/// the sorted tuple of source ids that produced them (spec §5/§9).
#[derive(Default)]
pub struct VirtualRowCache {
    capacity: usize,
    order: RefCell<VecDeque<Vec<i64>>>,
    entries: RefCell<std::collections::HashMap<Vec<i64>, Row>>,
}

impl VirtualRowCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: RefCell::new(VecDeque::new()),
            entries: RefCell::new(std::collections::HashMap::new()),
        }
    }

    fn key_for(sources: &[&CatalogRow]) -> Vec<i64> {
        let mut ids: Vec<i64> = sources.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        ids
    }

    /// Returns a cached merge for this exact source set, or builds,
    /// caches and returns a new one.
    pub fn get_or_merge(&self, sources: &[&CatalogRow]) -> Row {
        let key = Self::key_for(sources);
        if let Some(row) = self.entries.borrow().get(&key) {
            return row.clone();
        }
        let merged = Row::virtual_row(VirtualRow::merge(sources));
        let mut entries = self.entries.borrow_mut();
        if entries.len() >= self.capacity.max(1) {
            if let Some(oldest) = self.order.borrow_mut().pop_front() {
                entries.remove(&oldest);
            }
        }
        entries.insert(key.clone(), merged.clone());
        self.order.borrow_mut().push_back(key);
        merged
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

/// Whether a contiguous run of source rows is eligible to merge into a
/// single virtual row (spec §4.7 "virtual-merge check"): same phase, and
/// coefficients equal within `tolerance`.
fn mergeable(sources: &[&CatalogRow], tolerance: f64) -> bool {
    if sources.len() < 2 {
        return false;
    }
    let first = sources[0];
    sources.iter().all(|r| {
        r.phase.map(|p| p.as_str()) == first.phase.map(|p| p.as_str())
            && r.coeffs()
                .iter()
                .zip(first.coeffs())
                .all(|(a, b)| (a - b).abs() <= tolerance)
    })
}

/// A replacement proposal for one phase-continuous group of segments.
struct GroupProposal {
    segments: Vec<PhaseSegment>,
}

/// The Optimal Record Selector (spec §4.7).
pub struct OptimalRecordSelector<'a> {
    config: &'a CoreConfig,
    virtual_cache: VirtualRowCache,
}

impl<'a> OptimalRecordSelector<'a> {
    pub fn new(config: &'a CoreConfig) -> Self {
        Self {
            config,
            virtual_cache: VirtualRowCache::new(config.max_virtual_records),
        }
    }

    /// `OptimizationScore` from spec §3: `w_r·(1/N) + w_q·((R_max −
    /// R_avg)/R_max) + w_t·T_cov`.
    pub fn score(&self, segments: &[PhaseSegment], t_lo: f64, t_hi: f64) -> OptimizationScore {
        let n = segments.len().max(1) as f64;
        let r_max = self.config.max_reliability_class.max(1) as f64;
        let avg_reliability = if segments.is_empty() {
            r_max
        } else {
            segments
                .iter()
                .map(|s| s.active_record.reliability_class() as f64)
                .sum::<f64>()
                / segments.len() as f64
        };
        let span = (t_hi - t_lo).max(f64::EPSILON);
        let covered: f64 = segments
            .iter()
            .map(|s| (s.t_end.min(t_hi) - s.t_start.max(t_lo)).max(0.0))
            .sum();
        let t_cov = (covered / span).clamp(0.0, 1.0);

        let w = &self.config.weights;
        let value = w.w_r * (1.0 / n) + w.w_q * ((r_max - avg_reliability) / r_max) + w.w_t * t_cov;

        OptimizationScore {
            record_count: segments.len(),
            average_reliability: avg_reliability,
            transition_coverage: t_cov,
            value,
        }
    }

    /// Groups segments whose active records are in the same phase and
    /// touch (or nearly touch, within `gap_tolerance_k`) consecutively.
    fn group_by_phase_continuity(&self, segments: &[PhaseSegment]) -> Vec<Vec<PhaseSegment>> {
        let mut groups: Vec<Vec<PhaseSegment>> = Vec::new();
        for segment in segments {
            let phase = segment.active_record.phase();
            match groups.last_mut() {
                Some(group)
                    if group.last().unwrap().active_record.phase().map(|p| p.as_str())
                        == phase.map(|p| p.as_str())
                        && (segment.t_start - group.last().unwrap().t_end).abs()
                            <= self.config.gap_tolerance_k =>
                {
                    group.push(segment.clone());
                }
                _ => groups.push(vec![segment.clone()]),
            }
        }
        groups
    }

    /// Tries, in order, to replace one phase-continuous group with: (a) a
    /// single pool row covering the whole group and carrying nonzero
    /// H298/S298 if it is the first-in-phase group, (b) a virtual merge of
    /// the group's own rows, (c) a minimal-subset pool search tolerating
    /// gaps under 100 K, or (d) the original chain unchanged.
    fn optimize_group(
        &self,
        group: &[PhaseSegment],
        pool: &[Row],
        is_first_in_phase: bool,
    ) -> GroupProposal {
        if group.is_empty() {
            return GroupProposal {
                segments: Vec::new(),
            };
        }
        let t_lo = group.first().unwrap().t_start;
        let t_hi = group.last().unwrap().t_end;
        let phase = group.first().unwrap().active_record.phase();

        if let Some(candidate) = pool.iter().find(|r| {
            r.tmin() <= t_lo
                && r.tmax() >= t_hi
                && r.phase().map(|p| p.as_str()) == phase.map(|p| p.as_str())
                && (!is_first_in_phase || (r.h298() != 0.0 && r.s298() != 0.0))
        }) {
            return GroupProposal {
                segments: vec![PhaseSegment {
                    active_record: candidate.clone(),
                    t_start: t_lo,
                    t_end: t_hi,
                    h_start: 0.0,
                    s_start: 0.0,
                    is_transition_boundary: false,
                }],
            };
        }

        let physical_sources: Vec<Row> = group
            .iter()
            .map(|s| s.active_record.clone())
            .filter(|r| !r.is_virtual())
            .collect();
        if physical_sources.len() == group.len() && physical_sources.len() >= 2 {
            let catalog_rows: Vec<std::rc::Rc<CatalogRow>> = physical_sources
                .iter()
                .map(|r| match r {
                    Row::Physical(r) => r.clone(),
                    Row::Virtual(_) => unreachable!(),
                })
                .collect();
            let refs: Vec<&CatalogRow> = catalog_rows.iter().map(|r| r.as_ref()).collect();
            if mergeable(&refs, self.config.coeffs_comparison_tolerance) {
                let merged = self.virtual_cache.get_or_merge(&refs);
                return GroupProposal {
                    segments: vec![PhaseSegment {
                        active_record: merged,
                        t_start: t_lo,
                        t_end: t_hi,
                        h_start: 0.0,
                        s_start: 0.0,
                        is_transition_boundary: false,
                    }],
                };
            }
        }

        let outcome = optimize_sequence(pool, t_lo, t_hi, self.config.gap_tolerance_k);
        if outcome.gaps.iter().all(|(a, b)| (b - a) <= 100.0) && !outcome.order.is_empty() {
            let mut segments = Vec::new();
            let mut cursor = t_lo;
            for row in &outcome.order {
                let end = row.tmax().min(t_hi);
                segments.push(PhaseSegment {
                    active_record: row.clone(),
                    t_start: cursor,
                    t_end: end,
                    h_start: 0.0,
                    s_start: 0.0,
                    is_transition_boundary: false,
                });
                cursor = end;
            }
            return GroupProposal { segments };
        }

        GroupProposal {
            segments: group.to_vec(),
        }
    }

    /// Spec §4.7 step 4: for each of `tmelt`, `tboil` inside `[t_lo, t_hi]`,
    /// verify some segment contains it within `transition_tolerance_k`; if
    /// not, search `pool` for the best covering row by reliability and
    /// splice it into the chain in temperature order.
    fn ensure_transition_coverage(
        &self,
        mut segments: Vec<PhaseSegment>,
        pool: &[Row],
        t_lo: f64,
        t_hi: f64,
        tmelt: Option<f64>,
        tboil: Option<f64>,
    ) -> Vec<PhaseSegment> {
        let tol = self.config.transition_tolerance_k;
        for point in [tmelt, tboil].into_iter().flatten() {
            if point < t_lo || point > t_hi {
                continue;
            }
            let covered = segments
                .iter()
                .any(|s| s.t_start - tol <= point && point <= s.t_end + tol);
            if covered {
                continue;
            }
            let mut by_reliability: Vec<&Row> = pool.iter().filter(|r| r.covers(point)).collect();
            by_reliability.sort_by_key(|r| r.reliability_class());
            let Some(best) = by_reliability.into_iter().next() else {
                continue;
            };
            let new_segment = PhaseSegment {
                active_record: best.clone(),
                t_start: best.tmin().max(t_lo),
                t_end: best.tmax().min(t_hi),
                h_start: 0.0,
                s_start: 0.0,
                is_transition_boundary: false,
            };
            segments.push(new_segment);
        }
        segments.sort_by(|a, b| a.t_start.total_cmp(&b.t_start));
        segments
    }

    /// Spec §4.7 step 5: the new chain must have no gap above tolerance,
    /// must preserve `s ≤ l ≤ g` ordering, and a complex (non-elemental)
    /// compound's first segment in each phase must still carry nonzero
    /// H298/S298.
    fn validate(&self, segments: &[PhaseSegment], is_elemental: bool) -> bool {
        if segments.is_empty() {
            return false;
        }
        for pair in segments.windows(2) {
            let gap = pair[1].t_start - pair[0].t_end;
            if gap.abs() > self.config.gap_tolerance_k {
                return false;
            }
            if let (Some(ra), Some(rb)) = (
                pair[0].active_record.phase().and_then(|p| p.rank()),
                pair[1].active_record.phase().and_then(|p| p.rank()),
            ) {
                if rb < ra {
                    return false;
                }
            }
        }
        if !is_elemental {
            let mut seen_phases = std::collections::HashSet::new();
            for segment in segments {
                let phase_key = segment.active_record.phase().map(|p| p.as_str());
                if seen_phases.insert(phase_key) {
                    let record = &segment.active_record;
                    if record.h298() == 0.0 && record.s298() == 0.0 {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Attempts to improve `segments` in place, honoring
    /// `max_optimization_time_ms` and only accepting an improvement of at
    /// least `min_score_improvement`. Returns the accepted chain (possibly
    /// unchanged) together with the before/after scores.
    #[allow(clippy::too_many_arguments)]
    pub fn optimize(
        &self,
        segments: Vec<PhaseSegment>,
        transitions: Vec<PhaseTransition>,
        pool: &[Row],
        t_lo: f64,
        t_hi: f64,
        tmelt: Option<f64>,
        tboil: Option<f64>,
        is_elemental: bool,
    ) -> (Vec<PhaseSegment>, Vec<PhaseTransition>, OptimizationScore, OptimizationScore) {
        let start = Instant::now();
        let before = self.score(&segments, t_lo, t_hi);

        let groups = self.group_by_phase_continuity(&segments);
        let mut seen_phases = std::collections::HashSet::new();
        let mut candidate_segments = Vec::new();
        for group in &groups {
            if start.elapsed().as_millis() as u64 >= self.config.max_optimization_time_ms {
                candidate_segments.extend(group.iter().cloned());
                continue;
            }
            let phase_key = group.first().and_then(|s| s.active_record.phase()).map(|p| p.as_str());
            let is_first_in_phase = seen_phases.insert(phase_key);
            let proposal = self.optimize_group(group, pool, is_first_in_phase);
            candidate_segments.extend(proposal.segments);
        }
        candidate_segments =
            self.ensure_transition_coverage(candidate_segments, pool, t_lo, t_hi, tmelt, tboil);
        candidate_segments.sort_by(|a, b| a.t_start.total_cmp(&b.t_start));

        let builder = PhaseSegmentBuilder::new(self.config);
        let candidate_transitions = if candidate_segments.len() == segments.len()
            && candidate_segments
                .iter()
                .zip(&segments)
                .all(|(a, b)| a.active_record.id() == b.active_record.id())
        {
            transitions.clone()
        } else {
            let rows: Vec<Row> = candidate_segments.iter().map(|s| s.active_record.clone()).collect();
            let (_, derived, _) = builder.build(&rows, t_lo, t_hi);
            derived
        };

        if !self.validate(&candidate_segments, is_elemental) {
            return (segments, transitions, before, before);
        }

        let after = self.score(&candidate_segments, t_lo, t_hi);
        let improvement = if before.value.abs() < f64::EPSILON {
            0.0
        } else {
            (after.value - before.value) / before.value.abs()
        };
        if improvement >= self.config.min_score_improvement {
            (candidate_segments, candidate_transitions, before, after)
        } else {
            (segments, transitions, before, before)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRow;

    fn row(id: i64, phase: Phase, tmin: f64, tmax: f64, reliability: u8, h298: f64) -> Row {
        Row::physical(
            CatalogRow::new(
                id,
                "X",
                None,
                Some(phase),
                tmin,
                tmax,
                h298,
                10.0,
                [10.0, 1.0, 0.0, 0.0, 0.0, 0.0],
                None,
                None,
                reliability,
            )
            .unwrap(),
        )
    }

    fn segment(r: Row, t_start: f64, t_end: f64) -> PhaseSegment {
        PhaseSegment {
            active_record: r,
            t_start,
            t_end,
            h_start: 0.0,
            s_start: 0.0,
            is_transition_boundary: false,
        }
    }

    #[test]
    fn prefers_single_covering_row_over_a_split_chain() {
        let config = CoreConfig::default();
        let selector = OptimalRecordSelector::new(&config);
        let chain = vec![
            segment(row(1, Phase::Gas, 298.0, 800.0, 3, 1.0), 298.0, 800.0),
            segment(row(2, Phase::Gas, 800.0, 1500.0, 3, 0.0), 800.0, 1500.0),
        ];
        let pool = vec![
            row(1, Phase::Gas, 298.0, 800.0, 3, 1.0),
            row(2, Phase::Gas, 800.0, 1500.0, 3, 0.0),
            row(3, Phase::Gas, 298.0, 1500.0, 1, 1.0),
        ];
        let (optimized, _transitions, before, after) =
            selector.optimize(chain, Vec::new(), &pool, 298.0, 1500.0, None, None, false);
        assert_eq!(optimized.len(), 1);
        assert!(after.value >= before.value);
    }

    #[test]
    fn rejects_improvement_that_drops_first_in_phase_reference_data() {
        let config = CoreConfig::default();
        let selector = OptimalRecordSelector::new(&config);
        let chain = vec![segment(row(1, Phase::Gas, 298.0, 1500.0, 3, 1.0), 298.0, 1500.0)];
        let pool = vec![
            row(1, Phase::Gas, 298.0, 1500.0, 3, 1.0),
            row(2, Phase::Gas, 298.0, 1500.0, 1, 0.0),
        ];
        let (optimized, _, _, _) =
            selector.optimize(chain, Vec::new(), &pool, 298.0, 1500.0, None, None, false);
        assert_eq!(optimized[0].active_record.id(), 1);
    }

    #[test]
    fn ensure_transition_coverage_splices_in_a_row_for_an_uncovered_boiling_point() {
        let config = CoreConfig::default();
        let selector = OptimalRecordSelector::new(&config);
        // The chain's only segment stops well short of the declared
        // boiling point; the pool holds a gas row that covers it.
        let chain = vec![segment(row(1, Phase::Liquid, 298.0, 450.0, 1, 1.0), 298.0, 450.0)];
        let pool = vec![
            row(1, Phase::Liquid, 298.0, 450.0, 1, 1.0),
            row(2, Phase::Gas, 450.0, 1200.0, 1, 1.0),
        ];
        let spliced = selector.ensure_transition_coverage(chain, &pool, 298.0, 1200.0, None, Some(800.0));
        assert!(
            spliced.iter().any(|s| s.t_start <= 800.0 && 800.0 <= s.t_end),
            "expected a spliced-in segment covering the boiling point, got {spliced:?}"
        );
    }

    #[test]
    fn ensure_transition_coverage_is_a_no_op_when_already_covered() {
        let config = CoreConfig::default();
        let selector = OptimalRecordSelector::new(&config);
        let chain = vec![segment(row(1, Phase::Liquid, 298.0, 1200.0, 1, 1.0), 298.0, 1200.0)];
        let pool = chain.clone().into_iter().map(|s| s.active_record).collect::<Vec<_>>();
        let untouched =
            selector.ensure_transition_coverage(chain.clone(), &pool, 298.0, 1200.0, None, Some(800.0));
        assert_eq!(untouched.len(), chain.len());
    }
}
