use anyhow::{Context, Result};
use memoflight::config::Config;
use memoflight::metrics;

/// Keeps the sentry client alive for the duration of the stresstest.
#[derive(Default)]
pub struct Guard {
    _sentry: Option<sentry::ClientInitGuard>,
}

/// Sets up sentry, logging and metrics, in that order.
///
/// # Safety
/// This toggles environment variables, see [`memoflight::logging::init_logging`]. It must be
/// called before any other thread is started.
pub unsafe fn init(config: &Config) -> Result<Guard> {
    let mut guard = Guard::default();

    if let Some(dsn) = &config.sentry_dsn {
        guard._sentry = Some(sentry::init((
            dsn.clone(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                traces_sample_rate: 1.0,
                ..Default::default()
            },
        )));
    }

    // SAFETY: Forwarded from our own contract.
    unsafe { memoflight::logging::init_logging(config) };

    if let Some(statsd) = &config.metrics.statsd {
        // have some default tags, just to be closer to the real world config
        let mut tags = config.metrics.custom_tags.clone();
        tags.insert("env".into(), "stresstest".into());

        metrics::configure_statsd(&config.metrics.prefix, statsd, tags)
            .with_context(|| format!("failed to configure statsd at {statsd}"))?;
    }

    Ok(guard)
}
