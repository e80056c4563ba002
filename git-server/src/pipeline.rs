//! The sequence of git operations turning a base commit, a patch and commit
//! metadata into a new commit object inside an ephemeral workspace.
//!
//! Stages run strictly in order: `Init → Based → Patched → Committed →
//! ResolvedHash`. The first failing stage aborts the pipeline; nothing is
//! retried in place. The canonical repository is only ever read, through the
//! object alternates of the workspace.
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use git2::Oid;

use crate::protocol::{CommitMetadata, PatchRequest};
use crate::runner::{Invocation, RunError, Runner};
use crate::workspace::Workspace;

/// Pipeline stage, named after the state reached when it succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Based,
    Patched,
    Committed,
    ResolvedHash,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Based => "base",
            Self::Patched => "apply",
            Self::Committed => "commit",
            Self::ResolvedHash => "resolve",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The workspace repository could not be initialized.
    #[error("init workspace repository: {0}")]
    InitFailed(#[source] RunError),

    /// The base commit does not resolve in the canonical object store.
    #[error("base commit {base} not found: {diagnostic}")]
    BaseNotFound { base: String, diagnostic: String },

    /// The patch does not apply to the base tree.
    #[error("applying patch: {0}")]
    PatchApplyFailed(String),

    /// The commit object could not be created.
    #[error("committing patch: {0}")]
    CommitFailed(#[source] RunError),

    /// The new commit id could not be read back.
    #[error("retrieving new commit id: {0}")]
    HashResolutionFailed(String),

    /// The request was cancelled or ran past its deadline.
    #[error("cancelled before {0} stage")]
    Cancelled(Stage),
}

impl Error {
    /// The stage at which the pipeline failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::InitFailed(_) => Stage::Init,
            Self::BaseNotFound { .. } => Stage::Based,
            Self::PatchApplyFailed(_) => Stage::Patched,
            Self::CommitFailed(_) => Stage::Committed,
            Self::HashResolutionFailed(_) => Stage::ResolvedHash,
            Self::Cancelled(stage) => *stage,
        }
    }

    /// Whether the failure is caused by the request's input, and will recur
    /// until the input changes.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::BaseNotFound { .. } | Self::PatchApplyFailed(_))
    }
}

/// Cancellation signal checked at each stage boundary.
///
/// Cloned handles share the same flag. An interrupt also trips once its
/// deadline, if any, has passed.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Interrupt {
    pub fn new(deadline: Option<Instant>) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.map_or(false, |d| Instant::now() >= d)
    }
}

/// A commit created by the pipeline, not yet visible in the canonical repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: Oid,
    pub target_ref: String,
}

pub struct Pipeline<'a> {
    runner: &'a dyn Runner,
    workspace: &'a Workspace,
    /// Canonical object store, linked read-only into the workspace.
    alternates: &'a Path,
}

impl<'a> Pipeline<'a> {
    pub fn new(runner: &'a dyn Runner, workspace: &'a Workspace, alternates: &'a Path) -> Self {
        Self {
            runner,
            workspace,
            alternates,
        }
    }

    pub fn run(
        &self,
        request: &PatchRequest,
        metadata: &CommitMetadata,
        interrupt: &Interrupt,
    ) -> Result<Commit, Error> {
        self.enter(Stage::Init, interrupt)?;
        self.init()?;

        self.enter(Stage::Based, interrupt)?;
        self.reset(&request.base_commit)?;

        self.enter(Stage::Patched, interrupt)?;
        self.apply(&request.patch)?;

        self.enter(Stage::Committed, interrupt)?;
        self.commit(metadata)?;

        self.enter(Stage::ResolvedHash, interrupt)?;
        let id = self.resolve_head()?;

        tracing::debug!("created commit {} in workspace {}", id, self.workspace.id());

        Ok(Commit {
            id,
            target_ref: request.target_ref.clone(),
        })
    }

    fn enter(&self, stage: Stage, interrupt: &Interrupt) -> Result<(), Error> {
        if interrupt.is_tripped() {
            tracing::info!("pipeline interrupted before {} stage", stage);
            return Err(Error::Cancelled(stage));
        }
        tracing::trace!("entering {} stage", stage);

        Ok(())
    }

    /// A git invocation inside the workspace, with access to canonical objects.
    fn git(&self) -> Invocation {
        Invocation::new(self.workspace.path())
            .env("GIT_DIR", self.workspace.git_dir())
            .env("GIT_ALTERNATE_OBJECT_DIRECTORIES", self.alternates)
    }

    fn init(&self) -> Result<(), Error> {
        let init = Invocation::new(self.workspace.path())
            .env("GIT_DIR", self.workspace.git_dir())
            .args(["init", "--quiet"]);

        self.runner.run(&init).map_err(Error::InitFailed)?;

        Ok(())
    }

    fn reset(&self, base: &str) -> Result<(), Error> {
        let reset = self.git().args(["reset", "--quiet", base, "--"]);

        self.runner
            .run(&reset)
            .map_err(|err| Error::BaseNotFound {
                base: base.to_owned(),
                diagnostic: err.diagnostic(),
            })?;

        Ok(())
    }

    fn apply(&self, patch: &str) -> Result<(), Error> {
        let apply = self.git().args(["apply", "--cached"]).stdin(patch);

        self.runner
            .run(&apply)
            .map_err(|err| Error::PatchApplyFailed(err.diagnostic()))?;

        Ok(())
    }

    fn commit(&self, metadata: &CommitMetadata) -> Result<(), Error> {
        let date = metadata.git_date();
        let commit = self
            .git()
            .args(["-c", "commit.gpgsign=false", "commit", "--quiet", "--no-verify"])
            .args(["-m", metadata.message.as_str()])
            .env("GIT_AUTHOR_NAME", &metadata.author_name)
            .env("GIT_AUTHOR_EMAIL", &metadata.author_email)
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_NAME", &metadata.committer_name)
            .env("GIT_COMMITTER_EMAIL", &metadata.committer_email)
            .env("GIT_COMMITTER_DATE", &date);

        self.runner.run(&commit).map_err(Error::CommitFailed)?;

        Ok(())
    }

    fn resolve_head(&self) -> Result<Oid, Error> {
        let rev_parse = self.git().args(["rev-parse", "--verify", "HEAD^{commit}"]);
        let output = self
            .runner
            .run(&rev_parse)
            .map_err(|err| Error::HashResolutionFailed(err.diagnostic()))?;
        let hash = output.stdout.trim();

        Oid::from_str(hash)
            .ok()
            .filter(|oid| !oid.is_zero() && hash.len() >= 40)
            .ok_or_else(|| Error::HashResolutionFailed(format!("unexpected output {:?}", hash)))
    }
}
