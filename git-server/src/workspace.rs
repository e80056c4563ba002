//! Ephemeral per-request workspaces.
//!
//! Workspaces live directly under the storage root, next to the canonical
//! repositories, so that objects can be promoted with a rename on the same
//! volume. A [`Workspace`] removes its directory when dropped, whichever way
//! the request ends.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Name prefix of workspace directories.
pub const WORKSPACE_PREFIX: &str = ".patch-";

#[derive(Debug)]
pub struct Provisioner {
    root: PathBuf,
    /// Distinguishes this process' workspaces from those of earlier runs.
    nonce: String,
    counter: AtomicU64,
}

impl Provisioner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            nonce: gen_random_string(8),
            counter: AtomicU64::new(0),
        }
    }

    /// Create a fresh workspace for a request on `repo`.
    pub fn acquire(&self, repo: &str) -> io::Result<Workspace> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let name = format!(
            "{}{}-{}-{}",
            WORKSPACE_PREFIX,
            self.nonce,
            id,
            repo.replace('/', "-")
        );
        let path = self.root.join(name);

        fs::create_dir(&path)?;
        tracing::debug!("acquired workspace {} at {:?}", id, path);

        Ok(Workspace { id, path })
    }

    /// Remove workspaces left behind by a previous process. Returns how many were removed.
    pub fn sweep(&self) -> io::Result<usize> {
        let mut removed = 0;

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let is_workspace = entry
                .file_name()
                .to_str()
                .map_or(false, |name| name.starts_with(WORKSPACE_PREFIX));

            if is_workspace && entry.file_type()?.is_dir() {
                match fs::remove_dir_all(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(err) => {
                        tracing::warn!("unable to remove stale workspace {:?}: {}", entry.path(), err)
                    }
                }
            }
        }
        Ok(removed)
    }
}

/// A workspace directory, removed on drop.
#[derive(Debug)]
pub struct Workspace {
    id: u64,
    path: PathBuf,
}

impl Workspace {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn git_dir(&self) -> PathBuf {
        self.path.join(".git")
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.git_dir().join("objects")
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!("released workspace {}", self.id),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!("unable to clean up workspace {:?}: {}", self.path, err),
        }
    }
}

fn gen_random_string(len: usize) -> String {
    let rng = fastrand::Rng::new();
    let mut out = String::new();

    for _ in 0..len {
        out.push(rng.alphanumeric());
    }
    out
}
