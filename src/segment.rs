//! `PhaseSegment`, `PhaseTransition` (spec §3) and the Phase Segment
//! Builder (spec §4.6).

use crate::catalog::{CatalogLike, Row};
use crate::config::CoreConfig;
use crate::phase::{Phase, PhaseResolver, TransitionKind};
use crate::record_selector::{optimize_sequence, select, selection_score};

/// One link of a compound's segment chain (spec §3 `PhaseSegment`).
#[derive(Debug, Clone)]
pub struct PhaseSegment {
    pub active_record: Row,
    pub t_start: f64,
    pub t_end: f64,
    pub h_start: f64,
    pub s_start: f64,
    pub is_transition_boundary: bool,
}

impl PhaseSegment {
    pub fn phase_at_start(&self, resolver: &PhaseResolver) -> Phase {
        resolver.effective_phase(self.active_record.as_catalog_like(), self.t_start)
    }
}

/// A segment boundary that crosses phases (spec §3 `PhaseTransition`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseTransition {
    pub temperature: f64,
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub kind: TransitionKind,
    pub delta_h_kj_per_mol: f64,
    pub delta_s_j_per_mol_k: f64,
}

fn transition_enthalpy_prior(kind: TransitionKind, config: &CoreConfig) -> f64 {
    match kind {
        TransitionKind::Melting => config.transition_priors.melting_kj_per_mol,
        TransitionKind::Boiling => config.transition_priors.boiling_kj_per_mol,
        TransitionKind::Sublimation | TransitionKind::Unknown => {
            config.transition_priors.unknown_kj_per_mol
        }
    }
}

/// Modal value across rows' declared transitions, per spec §4.6 step 1.
fn modal_value(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    for v in values {
        if let Some(entry) = counts.iter_mut().find(|(existing, _)| (*existing - v).abs() < 1e-9) {
            entry.1 += 1;
        } else {
            counts.push((v, 1));
        }
    }
    counts.into_iter().max_by_key(|(_, count)| *count).map(|(v, _)| v)
}

fn extract_transitions(rows: &[Row]) -> (Option<f64>, Option<f64>) {
    let tmelt = modal_value(rows.iter().filter_map(|r| r.tmelt()));
    let mut tboil = modal_value(rows.iter().filter_map(|r| r.tboil()));
    if let (Some(m), Some(b)) = (tmelt, tboil) {
        if m >= b {
            tboil = Some(m + (b - m).abs().max(1.0));
        }
    }
    (tmelt, tboil)
}

/// The Phase Segment Builder (spec §4.6).
pub struct PhaseSegmentBuilder<'a> {
    config: &'a CoreConfig,
    resolver: PhaseResolver,
}

impl<'a> PhaseSegmentBuilder<'a> {
    pub fn new(config: &'a CoreConfig) -> Self {
        Self {
            config,
            resolver: PhaseResolver::new(),
        }
    }

    /// Builds the segment chain and transition list for one compound over
    /// `[t_lo, t_hi]`, given all candidate rows for that compound.
    pub fn build(
        &self,
        rows: &[Row],
        t_lo: f64,
        t_hi: f64,
    ) -> (Vec<PhaseSegment>, Vec<PhaseTransition>, Vec<String>) {
        let mut warnings = Vec::new();
        if rows.is_empty() {
            warnings.push("no rows available to build phase segments".to_string());
            return (Vec::new(), Vec::new(), warnings);
        }

        let (tmelt, tboil) = extract_transitions(rows);

        let boundaries = self.boundary_plan(t_lo, t_hi, tmelt, tboil, rows);
        let mut segments = Vec::with_capacity(boundaries.len());
        for (start, end, phase) in &boundaries {
            let (mut assigned, assign_warnings) = self.assign_segments(rows, *start, *end, *phase);
            segments.append(&mut assigned);
            warnings.extend(assign_warnings);
        }

        if segments.is_empty() {
            warnings.push("falling back to a single whole-interval segment".to_string());
            if let Some(result) = select(rows, (t_lo + t_hi) / 2.0, None) {
                segments.push(PhaseSegment {
                    active_record: result.selected,
                    t_start: t_lo,
                    t_end: t_hi,
                    h_start: 0.0,
                    s_start: 0.0,
                    is_transition_boundary: false,
                });
            }
        }

        self.reconcile_continuity(&mut segments, &mut warnings);
        let transitions = self.derive_transitions(&segments, tmelt, tboil);
        for segment in &mut segments {
            segment.is_transition_boundary = transitions
                .iter()
                .any(|t| (t.temperature - segment.t_end).abs() <= self.config.transition_tolerance_k);
        }

        (segments, transitions, warnings)
    }

    /// Spec §4.6 step 2: three segments when both transitions fall
    /// strictly inside `[t_lo, t_hi]`, fewer otherwise, a single segment
    /// when only partial information exists.
    fn boundary_plan(
        &self,
        t_lo: f64,
        t_hi: f64,
        tmelt: Option<f64>,
        tboil: Option<f64>,
        rows: &[Row],
    ) -> Vec<(f64, f64, Phase)> {
        match (tmelt, tboil) {
            (Some(tmelt), Some(tboil)) if t_lo < tmelt && tmelt < tboil && tboil < t_hi => vec![
                (t_lo, tmelt, Phase::Solid),
                (tmelt, tboil, Phase::Liquid),
                (tboil, t_hi, Phase::Gas),
            ],
            (Some(tmelt), Some(tboil)) if t_lo < tmelt && tmelt < t_hi && tboil >= t_hi => {
                vec![(t_lo, tmelt, Phase::Solid), (tmelt, t_hi, Phase::Liquid)]
            }
            (Some(tmelt), _) if t_lo < tmelt && tmelt < t_hi => {
                vec![(t_lo, tmelt, Phase::Solid), (tmelt, t_hi, Phase::Liquid)]
            }
            (None, Some(tboil)) if t_lo < tboil && tboil < t_hi => {
                vec![(t_lo, tboil, Phase::Liquid), (tboil, t_hi, Phase::Gas)]
            }
            (Some(tmelt), Some(tboil)) if tmelt <= t_lo && t_lo < tboil && tboil < t_hi => {
                vec![(t_lo, tboil, Phase::Liquid), (tboil, t_hi, Phase::Gas)]
            }
            _ => vec![(t_lo, t_hi, self.fallback_phase(t_lo, t_hi, rows))],
        }
    }

    /// Single-segment fallback phase (spec §4.6 step 2 "only partial
    /// information exists"): the modal declared phase across the rows that
    /// overlap `[t_lo, t_hi]` when any declare one, else the coarse
    /// temperature heuristic (spec §4.3) on a contentless probe.
    fn fallback_phase(&self, t_lo: f64, t_hi: f64, rows: &[Row]) -> Phase {
        let mut counts: Vec<(Phase, usize)> = Vec::new();
        for phase in rows
            .iter()
            .filter(|r| r.tmax() >= t_lo && r.tmin() <= t_hi)
            .filter_map(|r| r.phase())
        {
            match counts.iter_mut().find(|(p, _)| p.as_str() == phase.as_str()) {
                Some(entry) => entry.1 += 1,
                None => counts.push((phase, 1)),
            }
        }
        if let Some((phase, _)) = counts.into_iter().max_by_key(|(_, count)| *count) {
            return phase;
        }
        let mid = (t_lo + t_hi) / 2.0;
        self.resolver.effective_phase(&ProbeRow, mid)
    }

    /// Assigns one or more active records to cover `[start, end]` in
    /// `expected_phase` (spec §4.6 step 3): prefers a single row spanning
    /// the whole sub-interval (with a bonus for rows matching the expected
    /// phase and, near 298.15 K, for rows carrying nonzero `h298`/`s298`);
    /// otherwise falls back to a greedy multi-row cover (spec §4.5
    /// "Sequence optimization") so no segment's active record leaves part
    /// of its own interval uncovered.
    fn assign_segments(
        &self,
        rows: &[Row],
        start: f64,
        end: f64,
        expected_phase: Phase,
    ) -> (Vec<PhaseSegment>, Vec<String>) {
        let mut warnings = Vec::new();
        let mid = (start + end) / 2.0;
        let near_298 = (start - crate::polynomial::T_REF).abs() <= self.config.transition_tolerance_k;

        let full_coverage = rows.iter().filter(|r| {
            r.tmin() <= start
                && r.tmax() >= end
                && r.phase()
                    .map(|p| p.as_str() == expected_phase.as_str())
                    .unwrap_or(true)
        });
        let mut best: Option<(f64, Row)> = None;
        for row in full_coverage {
            let mut score = selection_score(row, mid);
            let declared = row.phase();
            if declared.map(|p| p.as_str() == expected_phase.as_str()).unwrap_or(false) {
                score += 15.0;
            }
            if near_298 && row.h298() != 0.0 && row.s298() != 0.0 {
                score += 25.0;
            }
            if best.as_ref().map(|(s, _)| score > *s).unwrap_or(true) {
                best = Some((score, row.clone()));
            }
        }
        if let Some((_, row)) = best {
            return (
                vec![PhaseSegment {
                    active_record: row,
                    t_start: start,
                    t_end: end,
                    h_start: 0.0,
                    s_start: 0.0,
                    is_transition_boundary: false,
                }],
                warnings,
            );
        }

        let phase_candidates: Vec<Row> = rows
            .iter()
            .filter(|r| r.tmax() > start && r.tmin() < end)
            .filter(|r| {
                r.phase()
                    .map(|p| p.as_str() == expected_phase.as_str())
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        let pool = if phase_candidates.is_empty() {
            rows.to_vec()
        } else {
            phase_candidates
        };
        let outcome = optimize_sequence(&pool, start, end, self.config.gap_tolerance_k);
        for (gap_start, gap_end) in &outcome.gaps {
            warnings.push(format!(
                "uncovered gap [{gap_start}, {gap_end}] K in phase {expected_phase}"
            ));
        }
        if outcome.order.is_empty() {
            warnings.push(format!(
                "no compatible record for [{start}, {end}] K ({expected_phase})"
            ));
            return (Vec::new(), warnings);
        }

        let mut segments = Vec::with_capacity(outcome.order.len());
        let mut cursor = start;
        for row in &outcome.order {
            let seg_end = row.tmax().min(end);
            if seg_end <= cursor {
                continue;
            }
            segments.push(PhaseSegment {
                active_record: row.clone(),
                t_start: cursor,
                t_end: seg_end,
                h_start: 0.0,
                s_start: 0.0,
                is_transition_boundary: false,
            });
            cursor = seg_end;
        }
        (segments, warnings)
    }

    /// Spec §4.6 step 4: move overlapping midpoints to the mean of the two
    /// endpoints; record a warning for gaps beyond tolerance.
    fn reconcile_continuity(&self, segments: &mut [PhaseSegment], warnings: &mut Vec<String>) {
        segments.sort_by(|a, b| a.t_start.total_cmp(&b.t_start));
        let tol = self.config.gap_tolerance_k.max(self.config.overlap_threshold);
        for i in 0..segments.len().saturating_sub(1) {
            let end = segments[i].t_end;
            let next_start = segments[i + 1].t_start;
            let gap = next_start - end;
            if gap > tol {
                warnings.push(format!(
                    "uncovered gap of {gap:.2} K between segment {i} and {}",
                    i + 1
                ));
            } else if gap < -self.config.overlap_threshold {
                let mean = (end + next_start) / 2.0;
                segments[i].t_end = mean;
                segments[i + 1].t_start = mean;
            }
        }
    }

    fn derive_transitions(
        &self,
        segments: &[PhaseSegment],
        tmelt: Option<f64>,
        tboil: Option<f64>,
    ) -> Vec<PhaseTransition> {
        let mut transitions = Vec::new();
        for pair in segments.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            let from_phase = lower.phase_at_start(&self.resolver);
            let to_phase = upper.phase_at_start(&self.resolver);
            if from_phase.as_str() == to_phase.as_str() {
                continue;
            }
            let boundary = lower.t_end;
            let kind = self
                .resolver
                .transition_kind_at(tmelt, tboil, boundary, self.config.transition_tolerance_k)
                .unwrap_or(TransitionKind::Unknown);
            let delta_h = transition_enthalpy_prior(kind, self.config) * 1000.0;
            transitions.push(PhaseTransition {
                temperature: boundary,
                from_phase,
                to_phase,
                kind,
                delta_h_kj_per_mol: delta_h / 1000.0,
                delta_s_j_per_mol_k: delta_h / boundary,
            });
        }
        transitions
    }
}

/// A phase-less zero-coefficient probe used only to evaluate the coarse
/// temperature-heuristic fallback in [`PhaseSegmentBuilder::boundary_plan`]
/// when no row declares any transition at all.
struct ProbeRow;

impl CatalogLike for ProbeRow {
    fn id(&self) -> i64 {
        0
    }
    fn formula(&self) -> &str {
        ""
    }
    fn display_name(&self) -> Option<&str> {
        None
    }
    fn phase(&self) -> Option<Phase> {
        None
    }
    fn tmin(&self) -> f64 {
        0.0
    }
    fn tmax(&self) -> f64 {
        f64::INFINITY
    }
    fn h298(&self) -> f64 {
        0.0
    }
    fn s298(&self) -> f64 {
        0.0
    }
    fn coeffs(&self) -> [f64; 6] {
        [0.0; 6]
    }
    fn tmelt(&self) -> Option<f64> {
        None
    }
    fn tboil(&self) -> Option<f64> {
        None
    }
    fn reliability_class(&self) -> u8 {
        5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRow;

    fn row(
        id: i64,
        formula: &str,
        phase: Option<Phase>,
        tmin: f64,
        tmax: f64,
        h298: f64,
        s298: f64,
        tmelt: Option<f64>,
        tboil: Option<f64>,
    ) -> Row {
        Row::physical(
            CatalogRow::new(
                id,
                formula,
                None,
                phase,
                tmin,
                tmax,
                h298,
                s298,
                [30.0, 10.0, 0.0, 0.0, 0.0, 0.0],
                tmelt,
                tboil,
                1,
            )
            .unwrap(),
        )
    }

    #[test]
    fn three_segments_when_both_transitions_are_interior() {
        let config = CoreConfig::default();
        let builder = PhaseSegmentBuilder::new(&config);
        let rows = vec![
            row(1, "H2O", Some(Phase::Solid), 200.0, 273.15, -292_000.0, 40.0, Some(273.15), Some(373.15)),
            row(2, "H2O", Some(Phase::Liquid), 273.15, 373.15, -285_830.0, 70.0, Some(273.15), Some(373.15)),
            row(3, "H2O", Some(Phase::Gas), 373.15, 2000.0, -241_800.0, 188.8, Some(273.15), Some(373.15)),
        ];
        let (segments, transitions, _warnings) = builder.build(&rows, 250.0, 1500.0);
        assert_eq!(segments.len(), 3);
        assert_eq!(transitions.len(), 2);
    }

    #[test]
    fn single_segment_when_no_transition_data_at_all() {
        let config = CoreConfig::default();
        let builder = PhaseSegmentBuilder::new(&config);
        let rows = vec![row(1, "X", None, 200.0, 2000.0, 0.0, 0.0, None, None)];
        let (segments, transitions, _warnings) = builder.build(&rows, 250.0, 1500.0);
        assert_eq!(segments.len(), 1);
        assert!(transitions.is_empty());
    }
}
