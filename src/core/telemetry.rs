use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// Audit events are emitted under the `audit` target, so targets stay visible.
pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.telemetry().log_level.clone()));

    let builder = fmt().with_env_filter(filter).with_target(true);

    if settings.telemetry().json {
        builder
            .json()
            .with_current_span(false)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    } else {
        builder.compact().try_init().map_err(|err| anyhow::anyhow!(err.to_string()))?;
    }

    Ok(())
}
