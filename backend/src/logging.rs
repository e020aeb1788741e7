use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LogFormat};

/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.log_format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_target(true))
            .init(),
        LogFormat::Pretty => subscriber.with(fmt::layer().with_target(true)).init(),
    }
}
