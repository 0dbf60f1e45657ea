use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

fn subscriber() -> impl tracing::Subscriber + Send + Sync {
    let filter: EnvFilter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let formatting_layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_target(true)
        .compact();

    Registry::default().with(filter).with(formatting_layer)
}

/// Installs the global subscriber. Panics if one is already set.
pub fn init_logging() {
    tracing::subscriber::set_global_default(subscriber()).expect("Failed to set global subscriber");
}

/// Like [`init_logging`], but leaves an existing subscriber in place.
/// Returns whether this call installed one.
pub fn try_init_logging() -> bool {
    tracing::subscriber::set_global_default(subscriber()).is_ok()
}
