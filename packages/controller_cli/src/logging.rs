use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "SUNSHINE_CONTROLLER_LOG";

/// Logs to stderr, or to `log_path` when given. The returned guard must be
/// held until exit or buffered lines are lost.
pub fn init_logging(log_path: Option<&str>) -> Option<WorkerGuard> {
    let log_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let Some(path) = log_path else {
        tracing_subscriber::registry()
            .with(log_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
        return None;
    };

    let (dir, file) = split_log_path(path);
    let (non_blocking, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));

    tracing_subscriber::registry()
        .with(log_filter)
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(non_blocking))
        .init();

    Some(guard)
}

fn split_log_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some(("", file)) => ("/", file),
        Some((dir, file)) => (dir, file),
        None => (".", path),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn log_path_split() {
        assert_eq!(split_log_path("/var/log/sunshine.log"), ("/var/log", "sunshine.log"));
        assert_eq!(split_log_path("/sunshine.log"), ("/", "sunshine.log"));
        assert_eq!(split_log_path("sunshine.log"), (".", "sunshine.log"));
    }
}
