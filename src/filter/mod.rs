//! The Filter Pipeline (spec §4.4): an ordered, builder-composed chain of
//! stages that reduces a compound's candidate rows.

pub mod stages;

use std::cell::RefCell;
use std::fs;
use std::time::Instant;

use indexmap::IndexMap;

use crate::catalog::Row;
use crate::observability::ObservabilitySink;

/// Per-invocation descriptor threaded through the pipeline (spec §3
/// `FilterContext`).
#[derive(Debug, Clone)]
pub struct FilterContext {
    pub formula: String,
    pub temperature_range: (f64, f64),
    pub extra: IndexMap<String, String>,
}

impl FilterContext {
    pub fn new(formula: impl Into<String>, temperature_range: (f64, f64)) -> Self {
        Self {
            formula: formula.into(),
            temperature_range,
            extra: IndexMap::new(),
        }
    }
}

/// A stage-specific metrics snapshot, captured after the most recent
/// `apply` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageMetrics {
    pub name: String,
    pub count_in: usize,
    pub count_out: usize,
    pub reduction_rate: f64,
    pub elapsed_us: u128,
    pub rss_before_mb: f64,
    pub rss_after_mb: f64,
    pub data_volume_mb: f64,
    pub extra: IndexMap<String, String>,
}

/// Fixed per-row byte budget used only to produce an observability
/// estimate of data volume, never to bound actual memory.
const BYTES_PER_ROW_ESTIMATE: f64 = 256.0;

fn estimate_data_volume_mb(row_count: usize) -> f64 {
    (row_count as f64 * BYTES_PER_ROW_ESTIMATE) / (1024.0 * 1024.0)
}

/// Best-effort resident set size in MB, read from `/proc/self/status` on
/// Linux. Returns `0.0` wherever that file doesn't exist — this is a pure
/// observability nicety, never load-bearing.
fn read_rss_mb() -> f64 {
    let Ok(status) = fs::read_to_string("/proc/self/status") else {
        return 0.0;
    };
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            if let Some(kb) = rest.trim().split_whitespace().next() {
                if let Ok(kb) = kb.parse::<f64>() {
                    return kb / 1024.0;
                }
            }
        }
    }
    0.0
}

/// A single link of the filter chain (spec §9 "dynamic polymorphism of
/// filter stages"): `filter(rows, context) -> rows` plus `metrics()` and
/// `name()`.
pub trait FilterStage {
    fn name(&self) -> &str;

    /// Applies the stage, returning the surviving rows. Implementations
    /// are expected to call [`FilterStage::record_metrics`] (via their
    /// internal `RefCell<StageMetrics>`) so `metrics()` reflects the most
    /// recent run.
    fn filter(&self, rows: Vec<Row>, ctx: &mut FilterContext) -> Vec<Row>;

    fn metrics(&self) -> StageMetrics;
}

/// Marks the start of a stage's timed work: captured RSS and a clock
/// reading, handed back to [`StageRunner::finish`] once the stage knows
/// its output count.
pub struct StageTiming {
    rss_before_mb: f64,
    start: Instant,
}

/// Shared bookkeeping every concrete stage embeds: times the `filter`
/// call, captures RSS before/after, and stores the resulting
/// [`StageMetrics`] for later retrieval.
#[derive(Default)]
pub struct StageRunner {
    last: RefCell<StageMetrics>,
}

impl StageRunner {
    pub fn start(&self) -> StageTiming {
        StageTiming {
            rss_before_mb: read_rss_mb(),
            start: Instant::now(),
        }
    }

    pub fn finish(
        &self,
        timing: StageTiming,
        name: &str,
        count_in: usize,
        count_out: usize,
        extra: IndexMap<String, String>,
    ) -> StageMetrics {
        let metrics = StageMetrics {
            name: name.to_string(),
            count_in,
            count_out,
            reduction_rate: if count_in == 0 {
                0.0
            } else {
                1.0 - (count_out as f64 / count_in as f64)
            },
            elapsed_us: timing.start.elapsed().as_micros(),
            rss_before_mb: timing.rss_before_mb,
            rss_after_mb: read_rss_mb(),
            data_volume_mb: estimate_data_volume_mb(count_in),
            extra,
        };
        *self.last.borrow_mut() = metrics.clone();
        metrics
    }

    pub fn snapshot(&self) -> StageMetrics {
        self.last.borrow().clone()
    }
}

/// One stage's contribution to [`FilterResult`]: the metrics of that run
/// plus whether it emptied the row set.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRecord {
    pub metrics: StageMetrics,
    pub survived: bool,
}

/// The stage-chain verdict (spec §3 `FilterResult`).
#[derive(Debug, Clone, PartialEq)]
pub struct FilterResult {
    pub rows: Vec<Row>,
    pub stage_records: Vec<StageRecord>,
    pub is_found: bool,
    pub failing_stage: Option<usize>,
    pub failure_reason: Option<String>,
}

/// An ordered list of [`FilterStage`]s, built with [`PipelineBuilder`].
pub struct Pipeline {
    stages: Vec<Box<dyn FilterStage>>,
}

impl Pipeline {
    pub fn stages(&self) -> &[Box<dyn FilterStage>] {
        &self.stages
    }
}

/// Builder-style composition surface named in spec §4.4: "Stages may be
/// added or removed; builder-style composition is the only configuration
/// surface."
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Box<dyn FilterStage>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(mut self, stage: Box<dyn FilterStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

/// `build_filter_pipeline` (spec §6): the canonical six-stage order.
pub fn build_filter_pipeline(config: &crate::config::CoreConfig) -> Pipeline {
    PipelineBuilder::new()
        .add_stage(Box::new(stages::ComplexFormulaSearchStage::default()))
        .add_stage(Box::new(stages::FormulaConsistencyDedupStage::new(
            config.max_records_per_formula,
        )))
        .add_stage(Box::new(stages::TemperatureOverlapStage::default()))
        .add_stage(Box::new(stages::PhaseSelectionStage::default()))
        .add_stage(Box::new(stages::ReliabilityPriorityStage::new(
            config.max_records,
        )))
        .add_stage(Box::new(stages::FormulaConsistencyExitStage::default()))
        .build()
}

/// `run_filter_pipeline` (spec §6): executes every stage in order, halting
/// at the first stage that empties the row set.
pub fn run_filter_pipeline(
    pipeline: &Pipeline,
    rows: Vec<Row>,
    mut ctx: FilterContext,
    sink: &dyn ObservabilitySink,
) -> FilterResult {
    let mut current = rows;
    let mut stage_records = Vec::new();

    for (index, stage) in pipeline.stages().iter().enumerate() {
        current = stage.filter(current, &mut ctx);
        let metrics = stage.metrics();
        let survived = !current.is_empty();
        sink.log_info(&format!(
            "stage {}: {} -> {} rows ({:.1}% reduction)",
            stage.name(),
            metrics.count_in,
            metrics.count_out,
            metrics.reduction_rate * 100.0
        ));
        stage_records.push(StageRecord {
            metrics,
            survived,
        });
        if !survived {
            let reason = format!(
                "stage {} ({}) produced zero rows",
                index + 1,
                stage.name()
            );
            sink.log_error(&reason);
            return FilterResult {
                rows: current,
                stage_records,
                is_found: false,
                failing_stage: Some(index + 1),
                failure_reason: Some(reason),
            };
        }
    }

    FilterResult {
        rows: current,
        stage_records,
        is_found: true,
        failing_stage: None,
        failure_reason: None,
    }
}
