//! The Record Selector (spec §4.5): picks one best row for a target
//! temperature or phase sub-interval, plus the transition-point and
//! sequence-coverage helpers it shares with the Segment Builder.

use crate::catalog::{order_rows, CatalogLike, Row};
use crate::phase::Phase;

const RELIABILITY_CLASS_MAX: f64 = 5.0;

/// Coverage-quality component of the selection score (up to 40 points):
/// best when `t` sits well inside the row's interval.
fn coverage_quality(row: &Row, t: f64) -> f64 {
    let width = row.tmax() - row.tmin();
    if width <= 0.0 {
        return 0.0;
    }
    let centered = 1.0 - (2.0 * (t - row.tmin()) / width - 1.0).abs();
    40.0 * centered.clamp(0.0, 1.0)
}

fn reliability_component(row: &Row) -> f64 {
    (RELIABILITY_CLASS_MAX + 1.0 - row.reliability_class() as f64) / (RELIABILITY_CLASS_MAX + 1.0)
        * 30.0
}

fn completeness_component(row: &Row) -> f64 {
    let mut score = 0.0;
    if row.h298() != 0.0 {
        score += 10.0;
    }
    if row.s298() != 0.0 {
        score += 10.0;
    }
    score
}

fn width_component(row: &Row) -> f64 {
    ((row.tmax() - row.tmin()) / 1000.0).min(10.0)
}

/// Total selection score (spec §4.5 step 3), capped at 100.
pub fn selection_score(row: &Row, t: f64) -> f64 {
    coverage_quality(row, t) + reliability_component(row) + completeness_component(row) + width_component(row)
}

fn distance_to_interval(row: &Row, t: f64) -> f64 {
    if row.covers(t) {
        0.0
    } else if t < row.tmin() {
        row.tmin() - t
    } else {
        t - row.tmax()
    }
}

/// Result of [`select`].
#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub selected: Row,
    pub alternatives: Vec<Row>,
    pub reason: String,
    pub warnings: Vec<String>,
}

/// Picks the best row for `t`, optionally restricted to `preferred_phase`
/// (spec §4.5 steps 1-4).
pub fn select(candidates: &[Row], t: f64, preferred_phase: Option<Phase>) -> Option<SelectionResult> {
    if candidates.is_empty() {
        return None;
    }
    let mut warnings = Vec::new();

    let covering: Vec<Row> = candidates.iter().filter(|r| r.covers(t)).cloned().collect();
    let mut pool = if covering.is_empty() {
        warnings.push(format!("no row covers T={t}"));
        let mut sorted = candidates.to_vec();
        sorted.sort_by(|a, b| {
            distance_to_interval(a, t).total_cmp(&distance_to_interval(b, t))
        });
        sorted
    } else {
        covering
    };

    if let Some(phase) = preferred_phase {
        let restricted: Vec<Row> = pool
            .iter()
            .filter(|r| r.phase().map(|p| p.as_str() == phase.as_str()).unwrap_or(false))
            .cloned()
            .collect();
        if !restricted.is_empty() {
            pool = restricted;
        }
    }

    let mut scored: Vec<(f64, Row)> = pool.into_iter().map(|r| (selection_score(&r, t), r)).collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let (top_score, selected) = scored.first().cloned()?;
    if selected.h298() == 0.0 && selected.s298() == 0.0 {
        warnings.push("selected row has H298/S298 == 0".to_string());
    }

    // Scores are out of 100; "score > 0.5 after normalization to [0,1]"
    // (spec §4.5) is just raw score > 50.
    let alternatives: Vec<Row> = scored
        .iter()
        .skip(1)
        .filter(|(score, _)| *score / 100.0 > 0.5)
        .map(|(_, row)| row.clone())
        .collect();

    if alternatives
        .iter()
        .any(|r| r.reliability_class() < selected.reliability_class())
    {
        warnings.push("a better-reliability alternative exists".to_string());
    }

    let mut reason = format!(
        "row {} scored {:.1}/100 (coverage={:.1}, reliability={:.1}, completeness={:.1}, width={:.1})",
        selected.id(),
        top_score,
        coverage_quality(&selected, t),
        reliability_component(&selected),
        completeness_component(&selected),
        width_component(&selected),
    );
    if let Some(phase) = preferred_phase {
        reason.push_str(&format!(", preferred phase {phase}"));
    }

    Some(SelectionResult {
        selected,
        alternatives,
        reason,
        warnings,
    })
}

/// The kind of a transition point between two consecutive rows (spec
/// §4.5: "Transition-point analysis").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPointKind {
    PhaseChange,
    Reliability,
    TemperatureLimit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionPoint {
    pub temperature: f64,
    pub kind: TransitionPointKind,
}

/// Classifies the boundary between two consecutive, endpoint-touching
/// rows (spec §4.5's `TransitionPoint` analysis, supplemented per
/// `record_selector.py`'s standalone helper — see SPEC_FULL.md §3).
pub fn classify_transition(a: &Row, b: &Row, gap_tolerance: f64) -> Option<TransitionPoint> {
    if (b.tmin() - a.tmax()).abs() > gap_tolerance {
        return None;
    }
    let midpoint = (a.tmax() + b.tmin()) / 2.0;
    let kind = match (a.phase(), b.phase()) {
        (Some(pa), Some(pb)) if pa.as_str() != pb.as_str() => TransitionPointKind::PhaseChange,
        _ => {
            if a.reliability_class().abs_diff(b.reliability_class()) > 1 {
                TransitionPointKind::Reliability
            } else {
                TransitionPointKind::TemperatureLimit
            }
        }
    };
    Some(TransitionPoint {
        temperature: midpoint,
        kind,
    })
}

/// Outcome of [`optimize_sequence`]: the greedily chosen cover and any
/// gaps it could not close, widened per `record_selector.py`'s
/// diagnostic-rich reporting (SPEC_FULL.md §3).
#[derive(Debug, Clone, Default)]
pub struct CoverageOutcome {
    pub order: Vec<Row>,
    pub gaps: Vec<(f64, f64)>,
}

/// Greedy coverage of `[t_lo, t_hi]` (spec §4.5 "Sequence optimization"):
/// at each step, pick the highest-scoring row that covers the current
/// frontier and maximally extends it.
pub fn optimize_sequence(candidates: &[Row], t_lo: f64, t_hi: f64, gap_tolerance: f64) -> CoverageOutcome {
    let mut remaining: Vec<Row> = candidates.to_vec();
    order_rows(&mut remaining);

    let mut frontier = t_lo;
    let mut order = Vec::new();
    let mut gaps = Vec::new();

    loop {
        if frontier >= t_hi {
            break;
        }
        let candidates_here: Vec<&Row> = remaining
            .iter()
            .filter(|r| r.tmin() <= frontier + gap_tolerance && r.tmax() > frontier)
            .collect();

        let Some(best) = candidates_here
            .into_iter()
            .max_by(|a, b| {
                selection_score(a, frontier)
                    .total_cmp(&selection_score(b, frontier))
                    .then_with(|| a.tmax().total_cmp(&b.tmax()))
            })
        else {
            let next_start = remaining
                .iter()
                .map(|r| r.tmin())
                .filter(|&tmin| tmin > frontier)
                .fold(t_hi, f64::min);
            gaps.push((frontier, next_start));
            frontier = next_start;
            continue;
        };

        order.push(best.clone());
        let new_frontier = best.tmax();
        let chosen_id = best.id();
        remaining.retain(|r| r.id() != chosen_id);
        frontier = new_frontier.max(frontier);
    }

    CoverageOutcome { order, gaps }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogRow;

    fn row(id: i64, tmin: f64, tmax: f64, reliability: u8, h298: f64) -> Row {
        Row::physical(
            CatalogRow::new(
                id, "X", None, None, tmin, tmax, h298, 10.0, [10.0, 1.0, 0.0, 0.0, 0.0, 0.0], None, None,
                reliability,
            )
            .unwrap(),
        )
    }

    #[test]
    fn selects_row_that_covers_target() {
        let rows = vec![row(1, 200.0, 300.0, 2, 1.0), row(2, 250.0, 500.0, 1, 1.0)];
        let result = select(&rows, 350.0, None).unwrap();
        assert_eq!(result.selected.id(), 2);
    }

    #[test]
    fn falls_back_to_nearest_row_when_nothing_covers() {
        let rows = vec![row(1, 200.0, 300.0, 1, 1.0), row(2, 1000.0, 1200.0, 1, 1.0)];
        let result = select(&rows, 500.0, None).unwrap();
        assert_eq!(result.selected.id(), 1);
        assert!(result.warnings.iter().any(|w| w.contains("no row covers")));
    }

    #[test]
    fn warns_when_selected_row_has_zero_reference_data() {
        let rows = vec![row(1, 200.0, 500.0, 1, 0.0)];
        let result = select(&rows, 300.0, None).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("H298/S298")));
    }

    #[test]
    fn optimize_sequence_covers_whole_interval_without_gaps() {
        let rows = vec![row(1, 298.0, 600.0, 1, 1.0), row(2, 600.0, 1500.0, 1, 1.0)];
        let outcome = optimize_sequence(&rows, 298.0, 1500.0, 1.0);
        assert!(outcome.gaps.is_empty());
        assert_eq!(outcome.order.len(), 2);
    }

    #[test]
    fn optimize_sequence_reports_uncovered_gap() {
        let rows = vec![row(1, 298.0, 400.0, 1, 1.0), row(2, 600.0, 1500.0, 1, 1.0)];
        let outcome = optimize_sequence(&rows, 298.0, 1500.0, 1.0);
        assert_eq!(outcome.gaps.len(), 1);
    }
}
