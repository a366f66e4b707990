// self
#[cfg(feature = "metrics")]
use crate::obs::{MetricsSink, RefreshMetric};
use crate::obs::{FlowKind, FlowOutcome};

/// Records a flow outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(kind: FlowKind, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"token_keeper_flow_total",
			"flow" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// [`MetricsSink`] adapter that forwards refresh resolutions to the global metrics
/// recorder.
///
/// Each record increments `token_keeper_refresh_total` (labeled by outcome) and feeds
/// `token_keeper_refresh_latency_seconds` and `token_keeper_refresh_retries`. Profile ids
/// are deliberately not used as labels; they are unbounded and would blow up series
/// cardinality.
#[cfg(feature = "metrics")]
#[derive(Clone, Copy, Debug, Default)]
pub struct MetricsRecorderSink;
#[cfg(feature = "metrics")]
impl MetricsSink for MetricsRecorderSink {
	fn record(&self, metric: RefreshMetric) {
		let outcome = if metric.success { "success" } else { "failure" };

		metrics::counter!("token_keeper_refresh_total", "outcome" => outcome).increment(1);
		metrics::histogram!("token_keeper_refresh_latency_seconds")
			.record(metric.latency.as_secs_f64());
		metrics::histogram!("token_keeper_refresh_retries").record(f64::from(metric.retry_count));

		if let Some(code) = metric.error_code {
			metrics::counter!("token_keeper_refresh_errors_total", "code" => code).increment(1);
		}
	}
}
