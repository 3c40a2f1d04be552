//! Prometheus metrics and `tracing` span helpers.
//!
//! Both halves are feature-gated: `metrics` pulls in the OpenTelemetry meters,
//! `tracing` the span constructors used around database round trips.

#[cfg(feature = "metrics")]
pub use meters::{RelmigMetrics, METRICS};

#[cfg(feature = "metrics")]
mod meters {
    use std::time::Duration;

    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
    };
    use opentelemetry_prometheus::PrometheusExporter;

    pub static METRICS: Lazy<RelmigMetrics> = Lazy::new(RelmigMetrics::init);

    pub struct RelmigMetrics {
        /// `None` when the Prometheus exporter could not be registered.
        pub exporter: Option<PrometheusExporter>,
        pub diffs_total: Counter<u64>,
        pub operations_total: Counter<u64>,
        pub diff_duration: Histogram<f64>,
        pub batches_total: Counter<u64>,
        pub commands_batched_total: Counter<u64>,
        pub prepare_duration: Histogram<f64>,
        pub queries_total: Counter<u64>,
        pub query_errors_total: Counter<u64>,
        pub query_duration: Histogram<f64>,
    }

    impl RelmigMetrics {
        pub fn init() -> Self {
            let exporter = match opentelemetry_prometheus::exporter().build() {
                Ok(exporter) => Some(exporter),
                Err(err) => {
                    log::warn!("failed to build prometheus exporter, metrics stay in-process: {err}");
                    None
                }
            };
            let meter = global::meter("relmig");

            let diffs_total = meter
                .u64_counter("relmig_diffs_total")
                .with_description("Model diffs computed")
                .build();

            let operations_total = meter
                .u64_counter("relmig_diff_operations_total")
                .with_description("Migration operations emitted by the differ")
                .build();

            let diff_duration = meter
                .f64_histogram("relmig_diff_duration_seconds")
                .with_description("Duration of model diffs")
                .build();

            let batches_total = meter
                .u64_counter("relmig_batches_total")
                .with_description("Command batches prepared")
                .build();

            let commands_batched_total = meter
                .u64_counter("relmig_commands_batched_total")
                .with_description("Modification commands placed into batches")
                .build();

            let prepare_duration = meter
                .f64_histogram("relmig_batch_prepare_duration_seconds")
                .with_description("Duration of batch preparation")
                .build();

            let queries_total = meter
                .u64_counter("relmig_queries_total")
                .with_description("Total queries executed")
                .build();

            let query_errors_total = meter
                .u64_counter("relmig_query_errors_total")
                .with_description("Queries that returned an error")
                .build();

            let query_duration = meter
                .f64_histogram("relmig_query_duration_seconds")
                .with_description("Duration of queries")
                .build();

            Self {
                exporter,
                diffs_total,
                operations_total,
                diff_duration,
                batches_total,
                commands_batched_total,
                prepare_duration,
                queries_total,
                query_errors_total,
                query_duration,
            }
        }

        pub fn record_diff(&self, operations: usize, elapsed: Duration) {
            self.diffs_total.add(1, &[]);
            self.operations_total.add(operations as u64, &[]);
            self.diff_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_prepare(&self, batches: usize, commands: usize, elapsed: Duration) {
            self.batches_total.add(batches as u64, &[]);
            self.commands_batched_total.add(commands as u64, &[]);
            self.prepare_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.queries_total.add(1, &[]);
            self.query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_query_error(&self) {
            self.query_errors_total.add(1, &[]);
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    /// Longest statement prefix recorded on a span.
    const STATEMENT_PREVIEW: usize = 120;

    pub fn execute_query_span(sql: &str) -> Span {
        let preview: String = sql.chars().take(STATEMENT_PREVIEW).collect();
        tracing::debug_span!("relmig.execute", db.system = "postgresql", db.statement = %preview)
    }

    pub fn history_span(operation: &'static str) -> Span {
        tracing::debug_span!("relmig.history", operation)
    }
}

#[cfg(all(test, feature = "metrics"))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_recording_does_not_panic() {
        METRICS.record_diff(3, Duration::from_millis(2));
        METRICS.record_prepare(2, 5, Duration::from_millis(1));
        METRICS.record_query_duration(Duration::from_millis(4));
        METRICS.record_query_error();
    }
}
