use std::sync::Arc;

use db_health_check::app::Coordinator;
use db_health_check::config::Config;
use db_health_check::metrics::setup_metrics_recorder;
use db_health_check::pool::connect_lazy;
use db_health_check::probe::PgProbeClient;
use eyre::Result;
use lifecycle::wait_for_shutdown_signal;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let log_layer = if json {
        fmt::layer().with_target(true).json().with_filter(filter).boxed()
    } else {
        fmt::layer().with_target(true).with_filter(filter).boxed()
    };

    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(false);
            error!(error = %e, "failed to load configuration");
            return Err(e.into());
        }
    };
    init_tracing(config.log_json);

    info!(
        database_url = %config.masked_database_url(),
        pool_size = config.pool_size,
        interval_secs = config.interval_secs,
        "loaded configuration"
    );

    let settings = match config.validate() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };

    let metrics_handle = match setup_metrics_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to install metrics recorder, metrics will be empty");
            PrometheusBuilder::new().build_recorder().handle()
        }
    };

    let pool = connect_lazy(&settings.pool);
    let client = Arc::new(PgProbeClient::new(pool, settings.probe.clone()));

    let coordinator = Coordinator::start(&settings, client, metrics_handle).await;
    let report = coordinator.run_until(wait_for_shutdown_signal()).await;

    info!(
        clean = report.is_clean(),
        total_secs = report.total.as_secs_f64(),
        "exiting"
    );
    Ok(())
}
