use std::path::{Path, PathBuf};

use crate::error::Error;

/// A canonical repository under the storage root.
#[derive(Debug, Clone)]
pub struct Canonical {
    name: String,
    git_dir: PathBuf,
}

impl Canonical {
    /// Open the repository `name` under `root`. Both bare and non-bare layouts are accepted.
    pub fn open(root: &Path, name: &str) -> Result<Self, Error> {
        let repo = git2::Repository::open(root.join(name)).map_err(|err| {
            tracing::debug!("unable to open repository {:?}: {}", name, err);
            Error::RepoNotFound(name.to_owned())
        })?;

        Ok(Self {
            name: name.to_owned(),
            git_dir: repo.path().to_path_buf(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.git_dir.join("objects")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_open() {
        let tmp = tempfile::tempdir().unwrap();

        git2::Repository::init(tmp.path().join("work")).unwrap();
        git2::Repository::init_bare(tmp.path().join("bare")).unwrap();

        let work = Canonical::open(tmp.path(), "work").unwrap();
        assert!(work.git_dir().ends_with(".git"));
        assert!(work.objects_dir().is_dir());

        let bare = Canonical::open(tmp.path(), "bare").unwrap();
        assert!(bare.objects_dir().is_dir());

        assert!(matches!(
            Canonical::open(tmp.path(), "missing"),
            Err(Error::RepoNotFound(_))
        ));
    }
}
