//! Output sink for the per-instruction debug trace and for warnings.
//!
//! The translator never writes to stdout/stderr directly; everything goes
//! through a [`TraceWriter`] so hosts can capture, redirect or silence the
//! output. Warnings (which never abort translation) use the same sink as the
//! `debug` trace.

use std::fmt;

/// Destination for trace lines and warnings.
pub trait TraceWriter {
    /// Writes one line (without trailing newline) to the sink.
    fn write_line(&mut self, line: fmt::Arguments<'_>);
}

/// Writes trace output to stderr.
#[derive(Debug, Default)]
pub struct StdTrace;

impl TraceWriter for StdTrace {
    fn write_line(&mut self, line: fmt::Arguments<'_>) {
        eprintln!("{line}");
    }
}

/// Discards all trace output.
#[derive(Debug, Default)]
pub struct NoTrace;

impl TraceWriter for NoTrace {
    fn write_line(&mut self, _line: fmt::Arguments<'_>) {}
}

/// Collects trace output into a string, one line per write.
#[derive(Debug, Default)]
pub struct CollectTrace {
    output: String,
}

impl TraceWriter for CollectTrace {
    fn write_line(&mut self, line: fmt::Arguments<'_>) {
        use fmt::Write;

        // writing to a String cannot fail
        let _ = writeln!(self.output, "{line}");
    }
}

impl CollectTrace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    #[must_use]
    pub fn into_output(self) -> String {
        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_trace_accumulates_lines() {
        let mut sink = CollectTrace::new();
        sink.write_line(format_args!("first {}", 1));
        sink.write_line(format_args!("second"));
        assert_eq!(sink.output(), "first 1\nsecond\n");
    }
}
