use tracing::info;

pub fn report_started(report_id: &str, entity_name: &str, running: usize, available_permits: usize) {
    info!(
        target = "telemetry.gui",
        report_id,
        entity_name,
        running_reports = running,
        available_permits,
        event = "report_started"
    );
}

pub fn report_completed(report_id: &str, summary_chars: usize, available_permits: usize) {
    info!(
        target = "telemetry.gui",
        report_id,
        summary_chars,
        available_permits,
        event = "report_completed"
    );
}

pub fn report_failed(report_id: &str, available_permits: usize, error: &str) {
    info!(
        target = "telemetry.gui",
        report_id,
        available_permits,
        error,
        event = "report_failed"
    );
}

pub fn stream_opened(report_id: &str, active_streams: usize) {
    info!(
        target = "telemetry.gui",
        report_id,
        active_streams,
        event = "stream_opened"
    );
}
