//! Phase normalization, extraction and the Phase Resolver (spec §4.3).

use std::cell::RefCell;
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::catalog::CatalogLike;

/// Normalized phase tag. Variants match the canonical set in spec §3
/// exactly; synonyms (solid, liquid, gas, aqueous, crystalline, amorphous,
/// vapor) are folded in by [`Phase::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Phase {
    Solid,
    Liquid,
    Gas,
    Aqueous,
    Crystalline,
    Amorphous,
    A,
    Ao,
    Ai,
}

impl Phase {
    /// Canonical short tag, as stored on a `CatalogRow`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Solid => "s",
            Phase::Liquid => "l",
            Phase::Gas => "g",
            Phase::Aqueous => "aq",
            Phase::Crystalline => "cr",
            Phase::Amorphous => "am",
            Phase::A => "a",
            Phase::Ao => "ao",
            Phase::Ai => "ai",
        }
    }

    /// Parse a canonical tag or a full-name synonym, case-insensitively.
    pub fn parse(s: &str) -> Option<Phase> {
        match s.trim().to_lowercase().as_str() {
            "s" | "solid" => Some(Phase::Solid),
            "l" | "liquid" => Some(Phase::Liquid),
            "g" | "gas" | "vapor" | "vapour" => Some(Phase::Gas),
            "aq" | "aqueous" => Some(Phase::Aqueous),
            "cr" | "crystalline" => Some(Phase::Crystalline),
            "am" | "amorphous" => Some(Phase::Amorphous),
            "a" => Some(Phase::A),
            "ao" => Some(Phase::Ao),
            "ai" => Some(Phase::Ai),
            _ => None,
        }
    }

    /// Ranking used to validate `s ≤ l ≤ g` segment-chain ordering (spec
    /// §4.7 step 5, §8). `None` for phases outside the s/l/g progression —
    /// they never participate in that ordering check.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Phase::Solid => Some(0),
            Phase::Liquid => Some(1),
            Phase::Gas => Some(2),
            _ => None,
        }
    }
}

impl std::convert::TryFrom<String> for Phase {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Phase::parse(&value).ok_or_else(|| format!("unrecognized phase tag {value:?}"))
    }
}

impl From<Phase> for String {
    fn from(phase: Phase) -> Self {
        phase.as_str().to_string()
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Extracts a trailing `(phase)` suffix from a formula like `H2O(g)`.
/// Recognizes only a parenthesized run of lowercase ASCII letters
/// immediately before the end of the string — equivalent to the regex
/// `\([a-z]+\)$` named in spec §4.3, without pulling in a regex engine
/// for a single fixed pattern.
pub fn extract_phase_suffix(formula: &str) -> Option<&str> {
    let bytes = formula.as_bytes();
    if bytes.last() != Some(&b')') {
        return None;
    }
    let open = formula.rfind('(')?;
    let inner = &formula[open + 1..formula.len() - 1];
    if !inner.is_empty() && inner.bytes().all(|b| b.is_ascii_lowercase()) {
        Some(inner)
    } else {
        None
    }
}

/// Strips a trailing `(phase)` suffix, returning the bare formula.
pub fn strip_phase_suffix(formula: &str) -> &str {
    match extract_phase_suffix(formula) {
        Some(suffix) => &formula[..formula.len() - suffix.len() - 2],
        None => formula,
    }
}

/// Phase a row carries, either declared or recovered from its formula.
pub fn phase_from_formula(formula: &str) -> Option<Phase> {
    extract_phase_suffix(formula).and_then(Phase::parse)
}

/// The kind of a phase change at a segment boundary (spec §3
/// `PhaseTransition`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Melting,
    Boiling,
    Sublimation,
    Unknown,
}

/// Coarse fallback used only when a row declares neither `tmelt` nor
/// `tboil`. These thresholds are not physical constants; they exist so the
/// resolver degrades gracefully instead of refusing to answer (spec §4.3
/// "falls back to coarse temperature heuristics").
const COARSE_SOLID_CEILING_K: f64 = 250.0;
const COARSE_LIQUID_CEILING_K: f64 = 450.0;

fn coarse_phase(t: f64) -> Phase {
    if t < COARSE_SOLID_CEILING_K {
        Phase::Solid
    } else if t < COARSE_LIQUID_CEILING_K {
        Phase::Liquid
    } else {
        Phase::Gas
    }
}

/// Bounded, insertion-order-evicted cache of phase-at-temperature lookups,
/// keyed by `(row id, bit pattern of T)`. Per spec §5/§9: bounded,
/// resettable, no LRU required because inputs are stable within a request.
pub struct PhaseAtTemperatureCache {
    capacity: usize,
    order: RefCell<VecDeque<(i64, u64)>>,
    entries: RefCell<std::collections::HashMap<(i64, u64), Phase>>,
}

impl PhaseAtTemperatureCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: RefCell::new(VecDeque::new()),
            entries: RefCell::new(std::collections::HashMap::new()),
        }
    }

    pub fn clear(&self) {
        self.order.borrow_mut().clear();
        self.entries.borrow_mut().clear();
    }

    fn insert(&self, key: (i64, u64), phase: Phase) {
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(&key) {
            return;
        }
        if entries.len() >= self.capacity {
            if let Some(oldest) = self.order.borrow_mut().pop_front() {
                entries.remove(&oldest);
            }
        }
        entries.insert(key, phase);
        self.order.borrow_mut().push_back(key);
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PhaseAtTemperatureCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// The Phase Resolver (spec §4.3): normalizes labels, derives the
/// effective phase of a row at a temperature, and validates phase
/// consistency.
#[derive(Default)]
pub struct PhaseResolver {
    cache: PhaseAtTemperatureCache,
}

impl PhaseResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            cache: PhaseAtTemperatureCache::new(capacity),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// The effective phase of `row` at `t`, per spec §4.3's melting/boiling
    /// rule, falling back to the coarse heuristic when transitions are
    /// undeclared.
    pub fn effective_phase(&self, row: &dyn CatalogLike, t: f64) -> Phase {
        let key = (row.id(), t.to_bits());
        if let Some(phase) = self.cache.entries.borrow().get(&key) {
            return *phase;
        }
        let phase = match (row.tmelt(), row.tboil()) {
            (Some(tmelt), Some(tboil)) => {
                if t < tmelt {
                    Phase::Solid
                } else if t < tboil {
                    Phase::Liquid
                } else {
                    Phase::Gas
                }
            }
            (Some(tmelt), None) => {
                if t < tmelt {
                    Phase::Solid
                } else {
                    match coarse_phase(t) {
                        Phase::Solid => Phase::Liquid,
                        other => other,
                    }
                }
            }
            _ => coarse_phase(t),
        };
        self.cache.insert(key, phase);
        phase
    }

    /// Is `t` within `tolerance` of a declared melting or boiling point?
    pub fn transition_kind_at(
        &self,
        tmelt: Option<f64>,
        tboil: Option<f64>,
        t: f64,
        tolerance: f64,
    ) -> Option<TransitionKind> {
        if let Some(tm) = tmelt {
            if (t - tm).abs() <= tolerance {
                return Some(TransitionKind::Melting);
            }
        }
        if let Some(tb) = tboil {
            if (t - tb).abs() <= tolerance {
                return Some(TransitionKind::Boiling);
            }
        }
        None
    }

    /// Phase-consistency validation (spec §4.3): formula-declared phase
    /// agrees with the row's own phase tag, `tmelt < tboil`, and both
    /// transitions (when present) fall inside `[tmin, tmax]`.
    pub fn validate_consistency(&self, row: &dyn CatalogLike) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(formula_phase) = phase_from_formula(row.formula()) {
            if let Some(row_phase) = row.phase() {
                if formula_phase.as_str() != row_phase.as_str() {
                    warnings.push(format!(
                        "row {}: formula suggests phase {} but row declares {}",
                        row.id(),
                        formula_phase,
                        row_phase
                    ));
                }
            }
        }
        if let (Some(tmelt), Some(tboil)) = (row.tmelt(), row.tboil()) {
            if tmelt >= tboil {
                warnings.push(format!(
                    "row {}: tmelt ({tmelt}) >= tboil ({tboil})",
                    row.id()
                ));
            }
            if row.tmin() > tmelt {
                warnings.push(format!(
                    "row {}: tmin ({}) exceeds tmelt ({tmelt})",
                    row.id(),
                    row.tmin()
                ));
            }
            if row.tmax() < tboil {
                warnings.push(format!(
                    "row {}: tmax ({}) is below tboil ({tboil})",
                    row.id(),
                    row.tmax()
                ));
            }
        }
        warnings
    }
}
