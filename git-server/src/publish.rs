//! Publication of new commits under their target ref.
//!
//! Updating the ref is the only change to the canonical repository visible
//! to its readers. Publishes to the same ref of the same repository are
//! serialized in-process; among concurrent requests, the last one to
//! publish wins.
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use git2::Oid;

use crate::repository::Canonical;
use crate::runner::{Invocation, RunError, Runner};

#[derive(Debug, Default)]
pub struct Publisher {
    locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl Publisher {
    /// Point `target_ref` of `repo` at `commit`.
    pub fn publish(
        &self,
        runner: &dyn Runner,
        repo: &Canonical,
        target_ref: &str,
        commit: Oid,
    ) -> Result<(), RunError> {
        let key = (repo.name().to_owned(), target_ref.to_owned());
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone();

        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            let commit_id = commit.to_string();
            let update = Invocation::new(repo.git_dir())
                .env("GIT_DIR", repo.git_dir())
                .args(["update-ref", target_ref, commit_id.as_str()]);

            runner.run(&update).map(|_| ())
        };
        drop(lock);

        // Forget locks nobody else is holding or waiting for.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(&key).map_or(false, |l| Arc::strong_count(l) == 1) {
            locks.remove(&key);
        }
        drop(locks);

        match &result {
            Ok(()) => tracing::info!("published {} as {} in {}", commit, target_ref, repo.name()),
            Err(err) => tracing::error!(
                "failed to update {} to {} in {}: {}",
                target_ref,
                commit,
                repo.name(),
                err
            ),
        }
        result
    }

    #[cfg(test)]
    fn held(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}
