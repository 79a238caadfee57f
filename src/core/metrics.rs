use std::sync::OnceLock;

use metrics::{describe_counter, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe_exam_metrics();
    Ok(())
}

fn describe_exam_metrics() {
    describe_counter!("exam_attempts_started_total", Unit::Count, "Attempts created");
    describe_counter!(
        "exam_attempts_submitted_total",
        Unit::Count,
        "Attempts finalized, labelled by submit mode"
    );
    describe_counter!("exam_attempts_expired_total", Unit::Count, "Attempts auto-submitted on expiry");
    describe_counter!("exam_store_version_conflicts_total", Unit::Count, "Lost optimistic write races");
    describe_counter!("exam_results_release_total", Unit::Count, "Release and unrelease operations");
    describe_counter!("exam_notifications_failed_total", Unit::Count, "Undelivered teacher notifications");
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
