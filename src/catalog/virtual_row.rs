//! `VirtualRow`: a synthetic catalog row merged from a contiguous run of
//! coefficient-identical source rows (spec §3 `VirtualRow`).

use super::{CatalogLike, CatalogRow};
use crate::phase::Phase;

/// A synthetic row produced by merging a contiguous, non-empty, same-phase
/// sequence of source rows whose `f1..f6` agree within tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualRow {
    pub source_ids: Vec<i64>,
    pub formula: String,
    pub phase: Option<Phase>,
    pub tmin: f64,
    pub tmax: f64,
    pub h298: f64,
    pub s298: f64,
    pub coeffs: [f64; 6],
    pub reliability_class: u8,
    /// Reliability classes of every merged source, kept for
    /// [`VirtualRow::explain`].
    source_reliability_classes: Vec<u8>,
}

impl VirtualRow {
    /// Merges `sources` (already ordered by `T_start`) into one virtual
    /// row. Per spec §3: `tmin`/`tmax` span the sources, `reliability_class`
    /// is the best (minimum) of the sources, and the polynomial/H298/S298
    /// are copied from the first source.
    ///
    /// Panics if `sources` is empty — callers are expected to have already
    /// checked the merge preconditions (same phase, bounded gaps,
    /// coefficient equality) before calling this.
    pub fn merge(sources: &[&CatalogRow]) -> Self {
        assert!(!sources.is_empty(), "cannot merge an empty row sequence");
        let first = sources[0];
        let tmin = sources
            .iter()
            .map(|r| r.tmin)
            .fold(f64::INFINITY, f64::min);
        let tmax = sources
            .iter()
            .map(|r| r.tmax)
            .fold(f64::NEG_INFINITY, f64::max);
        let reliability_class = sources.iter().map(|r| r.reliability_class).min().unwrap();
        Self {
            source_ids: sources.iter().map(|r| r.id).collect(),
            formula: first.formula.clone(),
            phase: first.phase,
            tmin,
            tmax,
            h298: first.h298,
            s298: first.s298,
            coeffs: first.coeffs(),
            reliability_class,
            source_reliability_classes: sources.iter().map(|r| r.reliability_class).collect(),
        }
    }

    /// Human-readable provenance trail, supplementing the spec's merge
    /// description with the diagnostic detail the Python prototype kept
    /// (`precomputed_data.py`).
    pub fn explain(&self) -> String {
        format!(
            "virtual row over {} merging source ids {:?} (reliability classes {:?}) spanning [{}, {}] K",
            self.formula, self.source_ids, self.source_reliability_classes, self.tmin, self.tmax
        )
    }
}

impl CatalogLike for VirtualRow {
    fn id(&self) -> i64 {
        // Deterministic synthetic id: negative, derived from the first
        // source id so repeated merges of the same sources are stable.
        -(self.source_ids[0].unsigned_abs() as i64) - 1
    }
    fn formula(&self) -> &str {
        &self.formula
    }
    fn display_name(&self) -> Option<&str> {
        None
    }
    fn phase(&self) -> Option<Phase> {
        self.phase
    }
    fn tmin(&self) -> f64 {
        self.tmin
    }
    fn tmax(&self) -> f64 {
        self.tmax
    }
    fn h298(&self) -> f64 {
        self.h298
    }
    fn s298(&self) -> f64 {
        self.s298
    }
    fn coeffs(&self) -> [f64; 6] {
        self.coeffs
    }
    fn tmelt(&self) -> Option<f64> {
        None
    }
    fn tboil(&self) -> Option<f64> {
        None
    }
    fn reliability_class(&self) -> u8 {
        self.reliability_class
    }
}
