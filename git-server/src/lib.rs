pub mod config;
pub mod error;
pub mod pipeline;
pub mod promote;
pub mod protocol;
pub mod publish;
pub mod repository;
pub mod runner;
pub mod workspace;


use std::net;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use tower_http::trace::TraceLayer;

use config::CommitDefaults;
use error::Error;
use pipeline::{Interrupt, Pipeline};
use protocol::{PatchRequest, PatchResponse};
use publish::Publisher;
use repository::Canonical;
use runner::{Git, Runner};
use workspace::Provisioner;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HEAD: &str = env!("GIT_HEAD");

#[derive(Debug, Clone)]
pub struct Options {
    pub root: PathBuf,
    pub listen: net::SocketAddr,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub git_bin: PathBuf,
    pub defaults: CommitDefaults,
    /// Deadline of a single request.
    pub timeout: Option<Duration>,
}

#[derive(Clone)]
pub struct Context {
    root: PathBuf,
    runner: Arc<dyn Runner>,
    provisioner: Arc<Provisioner>,
    publisher: Arc<Publisher>,
    defaults: Arc<CommitDefaults>,
    timeout: Option<Duration>,
}

impl Context {
    pub fn new(
        root: PathBuf,
        runner: Arc<dyn Runner>,
        defaults: CommitDefaults,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            provisioner: Arc::new(Provisioner::new(&root)),
            publisher: Arc::default(),
            defaults: Arc::new(defaults),
            root,
            runner,
            timeout,
        }
    }

    /// Create a commit from a patch and publish it under the request's target ref.
    ///
    /// Blocks until all git commands have completed. The workspace is removed
    /// before this returns, whatever the outcome.
    pub fn create_commit_from_patch(
        &self,
        request: PatchRequest,
        interrupt: &Interrupt,
    ) -> Result<PatchResponse, Error> {
        let repo = request.validate()?;
        let canonical = Canonical::open(&self.root, &repo)?;
        let workspace = self.provisioner.acquire(&repo).map_err(Error::Workspace)?;

        let span = tracing::info_span!("patch", id = workspace.id(), repo = %repo);
        let _enter = span.enter();

        let metadata = request.commit_info.resolve(&self.defaults);
        let alternates = canonical.objects_dir();
        let commit = Pipeline::new(&*self.runner, &workspace, &alternates).run(
            &request,
            &metadata,
            interrupt,
        )?;

        if interrupt.is_tripped() {
            return Err(Error::Cancelled(error::STEP_PROMOTE));
        }
        promote::promote(&workspace.objects_dir(), &canonical.objects_dir())
            .map_err(Error::Promote)?;

        if interrupt.is_tripped() {
            return Err(Error::Cancelled(error::STEP_PUBLISH));
        }
        self.publisher
            .publish(&*self.runner, &canonical, &commit.target_ref, commit.id)
            .map_err(|source| Error::Publish {
                refname: commit.target_ref.clone(),
                source,
            })?;

        Ok(PatchResponse {
            rev: commit.target_ref,
        })
    }
}

/// Trips an interrupt when dropped, ie. when the request is abandoned.
struct CancelOnDrop(Interrupt);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

pub fn router(ctx: Context) -> Router {
    Router::new()
        .route("/create-commit-from-patch", post(create_commit_handler))
        .route("/ping", get(ping_handler))
        .layer(Extension(ctx))
}

/// Create a commit from a patch.
/// `POST /create-commit-from-patch`
async fn create_commit_handler(
    Extension(ctx): Extension<Context>,
    body: Result<Json<PatchRequest>, JsonRejection>,
) -> Result<Json<PatchResponse>, Error> {
    let Json(request) = body.map_err(|err| Error::InvalidRequest(err.to_string()))?;
    let interrupt = Interrupt::new(ctx.timeout.map(|t| Instant::now() + t));
    let _guard = CancelOnDrop(interrupt.clone());
    let response =
        tokio::task::spawn_blocking(move || ctx.create_commit_from_patch(request, &interrupt))
            .await??;

    Ok(Json(response))
}

/// `GET /ping`
async fn ping_handler() -> impl IntoResponse {
    "pong"
}

/// Run the server.
pub async fn run(options: Options) -> Result<(), Error> {
    let git = Git::new(&options.git_bin);
    let git_version = git.version().map_err(Error::GitNotFound)?;

    tracing::info!("patch-commit-server {} ({})", VERSION, GIT_HEAD);
    tracing::info!("{}", git_version);

    let root = options.root.canonicalize()?;
    tracing::debug!("Root path set to: {:?}", root);

    let ctx = Context::new(root, Arc::new(git), options.defaults, options.timeout);
    let removed = ctx.provisioner.sweep()?;
    if removed > 0 {
        tracing::info!("removed {} stale workspace(s)", removed);
    }

    let app = router(ctx).layer(TraceLayer::new_for_http());

    tracing::info!("listening on {}", options.listen);

    if let (Some(cert), Some(key)) = (options.tls_cert, options.tls_key) {
        let config = RustlsConfig::from_pem_file(cert, key).await?;

        axum_server::bind_rustls(options.listen, config)
            .serve(app.into_make_service())
            .await?;
    } else {
        axum::Server::bind(&options.listen)
            .serve(app.into_make_service())
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod routes {
    use std::fs;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::test::runner::Stub;

    fn context(root: &std::path::Path, stub: &Stub) -> Context {
        Context::new(
            root.to_path_buf(),
            Arc::new(stub.clone()),
            CommitDefaults::default(),
            None,
        )
    }

    fn request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/create-commit-from-patch")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn patch_request(repo: &str, base: &str) -> Value {
        json!({
            "repo": repo,
            "baseCommit": base,
            "targetRef": "refs/heads/patch-1",
            "patch": "",
            "commitInfo": { "date": "2018-06-01T12:00:00Z" },
        })
    }

    async fn body_text(response: axum::response::Response) -> String {
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_ping_route() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(context(tmp.path(), &Stub::default()));
        let response = app
            .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_request() {
        let tmp = tempfile::tempdir().unwrap();
        let app = router(context(tmp.path(), &Stub::default()));
        let response = app
            .oneshot(request(json!({ "repo": "foo" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_repository() {
        let tmp = tempfile::tempdir().unwrap();
        let stub = Stub::default();
        let app = router(context(tmp.path(), &stub));
        let response = app
            .oneshot(request(patch_request("github.com/foo/bar", "deadbeef")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(stub.subcommands().is_empty());
    }

    #[tokio::test]
    async fn test_base_not_found_route() {
        let tmp = tempfile::tempdir().unwrap();
        git2::Repository::init(tmp.path().join("foo")).unwrap();

        let stub = Stub::default().fail("reset", "fatal: ambiguous argument 'deadbeef'");
        let app = router(context(tmp.path(), &stub));
        let response = app
            .oneshot(request(patch_request("foo", "deadbeef")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("deadbeef"));
        assert_eq!(stub.subcommands(), vec!["init", "reset"]);

        // Only the canonical repository remains.
        let entries = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect::<Vec<_>>();
        assert_eq!(entries, vec!["foo"]);
    }

    #[tokio::test]
    async fn test_commit_failure_route() {
        let tmp = tempfile::tempdir().unwrap();
        git2::Repository::init(tmp.path().join("foo")).unwrap();

        let stub = Stub::default().fail("commit", "fatal: unable to write new index file");
        let app = router(context(tmp.path(), &stub));
        let response = app
            .oneshot(request(patch_request("foo", "deadbeef")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(stub.find("update-ref").is_none());
    }

    #[tokio::test]
    async fn test_date_before_epoch_route() {
        let tmp = tempfile::tempdir().unwrap();
        git2::Repository::init(tmp.path().join("foo")).unwrap();

        let stub = Stub::default();
        let app = router(context(tmp.path(), &stub));
        let mut body = patch_request("foo", "deadbeef");
        body["commitInfo"]["date"] = json!("1969-12-31T23:59:00Z");

        let response = app.oneshot(request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Unix epoch"));
        assert!(stub.subcommands().is_empty());
    }

    #[tokio::test]
    async fn test_promote_failure_route() {
        let tmp = tempfile::tempdir().unwrap();
        git2::Repository::init(tmp.path().join("foo")).unwrap();

        // The stub never creates the workspace object store, so promotion fails.
        let stub = Stub::default().answer("rev-parse", "4b825dc642cb6eb9a060e54bf8d69288fbee4904\n");
        let app = router(context(tmp.path(), &stub));
        let response = app
            .oneshot(request(patch_request("foo", "deadbeef")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("copying git objects"));
        assert!(stub.find("update-ref").is_none());

        let entries = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect::<Vec<_>>();
        assert_eq!(entries, vec!["foo"]);
    }
}
