use std::net;
use std::path::PathBuf;
use std::time::Duration;

use patch_commit_server as server;
use server::config::{self, CommitDefaults};

use argh::FromArgs;

use shared::LogFmt;

/// Patch-to-commit git server.
#[derive(FromArgs)]
pub struct Options {
    /// listen on the following address for HTTP connections (default: 0.0.0.0:3178)
    #[argh(option, default = "std::net::SocketAddr::from(([0, 0, 0, 0], 3178))")]
    pub listen: net::SocketAddr,

    /// root path of the canonical repositories
    #[argh(option)]
    pub root: PathBuf,

    /// TLS certificate path
    #[argh(option)]
    pub tls_cert: Option<PathBuf>,

    /// TLS key path
    #[argh(option)]
    pub tls_key: Option<PathBuf>,

    /// git binary to run (default: git)
    #[argh(option, default = "PathBuf::from(\"git\")")]
    pub git_bin: PathBuf,

    /// commit message used when a request has none
    #[argh(option, default = "config::DEFAULT_COMMIT_MESSAGE.to_owned()")]
    pub commit_message: String,

    /// author name used when a request has none
    #[argh(option, default = "config::DEFAULT_AUTHOR_NAME.to_owned()")]
    pub author_name: String,

    /// author email used when a request has none
    #[argh(option, default = "config::DEFAULT_AUTHOR_EMAIL.to_owned()")]
    pub author_email: String,

    /// committer name stamped on every commit
    #[argh(option, default = "config::DEFAULT_COMMITTER_NAME.to_owned()")]
    pub committer_name: String,

    /// committer email stamped on every commit
    #[argh(option, default = "config::DEFAULT_COMMITTER_EMAIL.to_owned()")]
    pub committer_email: String,

    /// request deadline in seconds
    #[argh(option)]
    pub timeout: Option<u64>,

    /// either "plain" or "json"
    #[argh(option, default = "LogFmt::Plain")]
    pub log_format: LogFmt,
}

impl Options {
    pub fn from_env() -> Self {
        argh::from_env()
    }
}

impl From<Options> for server::Options {
    fn from(other: Options) -> Self {
        Self {
            root: other.root,
            listen: other.listen,
            tls_cert: other.tls_cert,
            tls_key: other.tls_key,
            git_bin: other.git_bin,
            defaults: CommitDefaults {
                message: other.commit_message,
                author_name: other.author_name,
                author_email: other.author_email,
                committer_name: other.committer_name,
                committer_email: other.committer_email,
            },
            timeout: other.timeout.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() {
    let options = Options::from_env();

    shared::init_logger(options.log_format);

    if let Err(e) = server::run(options.into()).await {
        tracing::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}
