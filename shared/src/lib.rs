mod logging;

pub use logging::{init_logger, LogFmt};
