//! The log sink collaborator named in spec §6 ("Consumed"). The core never
//! owns a logger; it is handed one (or the no-op default) by the caller.

/// Structured-log sink the core writes progress and diagnostics to.
///
/// Default is [`NoopSink`]; collaborators that want the thermo_agents-style
/// formatted tables can implement this trait against their own logger.
pub trait ObservabilitySink {
    fn log_info(&self, msg: &str);
    fn log_error(&self, msg: &str);

    /// Render a table for human consumption; default joins rows with tabs.
    fn format_table(&self, headers: &[&str], rows: &[Vec<String>]) -> String {
        let mut out = String::new();
        out.push_str(&headers.join("\t"));
        out.push('\n');
        for row in rows {
            out.push_str(&row.join("\t"));
            out.push('\n');
        }
        out
    }
}

/// Default sink: discards everything. Used whenever a caller doesn't pass
/// an explicit sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ObservabilitySink for NoopSink {
    fn log_info(&self, _msg: &str) {}
    fn log_error(&self, _msg: &str) {}
}
