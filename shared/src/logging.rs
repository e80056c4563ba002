use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFmt {
    Plain,
    Json,
}

impl FromStr for LogFmt {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(LogFmt::Plain),
            "json" => Ok(LogFmt::Json),
            _ => Err("Unrecognized log format"),
        }
    }
}

/// Install the global subscriber. Filtering follows `RUST_LOG`, defaulting to `info`.
pub fn init_logger(format: LogFmt) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = Registry::default().with(filter);

    match format {
        LogFmt::Plain => registry.with(fmt::layer()).init(),
        LogFmt::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("plain".parse::<LogFmt>(), Ok(LogFmt::Plain));
        assert_eq!("json".parse::<LogFmt>(), Ok(LogFmt::Json));
        assert!("gcp".parse::<LogFmt>().is_err());
    }
}
