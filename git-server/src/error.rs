use axum::response::{IntoResponse, Response};

use crate::pipeline;
use crate::runner::RunError;

/// Steps of a request that follow the pipeline.
pub const STEP_PROMOTE: &str = "promote";
pub const STEP_PUBLISH: &str = "publish";

/// Errors that may occur when creating a commit from a patch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No canonical repository with this name.
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    /// The workspace directory could not be created.
    #[error("make workspace: {0}")]
    Workspace(#[source] std::io::Error),

    /// A pipeline stage failed.
    #[error(transparent)]
    Pipeline(#[from] pipeline::Error),

    /// New objects could not be copied into the canonical repository.
    #[error("copying git objects: {0}")]
    Promote(#[source] std::io::Error),

    /// The target ref could not be updated.
    #[error("creating ref {refname}: {source}")]
    Publish {
        refname: String,
        #[source]
        source: RunError,
    },

    /// The request was abandoned after its commit was created, before the
    /// named step ran.
    #[error("request cancelled before {0}")]
    Cancelled(&'static str),

    /// The 'git' command is not available.
    #[error("'git' command not found: {0}")]
    GitNotFound(#[source] RunError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP server error.
    #[error("HTTP error: {0}")]
    Server(#[from] hyper::Error),

    /// The blocking task running the request failed.
    #[error("request task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Whether retrying the same request cannot succeed.
    pub fn is_client_error(&self) -> bool {
        match self {
            Error::InvalidRequest(_) | Error::RepoNotFound(_) => true,
            Error::Pipeline(err) => err.is_client_error(),
            _ => false,
        }
    }

    pub fn status(&self) -> http::StatusCode {
        match self {
            Error::InvalidRequest(_) => http::StatusCode::BAD_REQUEST,
            Error::RepoNotFound(_) => http::StatusCode::NOT_FOUND,
            Error::Pipeline(pipeline::Error::Cancelled(_)) | Error::Cancelled(_) => {
                http::StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Pipeline(err) if err.is_client_error() => http::StatusCode::BAD_REQUEST,
            _ => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::info!("rejected request: {}", self);
        }
        (status, format!("gitserver: {}", self)).into_response()
    }
}
