//! Wire types of the `create-commit-from-patch` call.
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::config::CommitDefaults;
use crate::error::Error;

/// Request to create a commit on top of `base_commit` by applying `patch`,
/// and to point `target_ref` at it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchRequest {
    pub repo: String,
    pub base_commit: String,
    pub target_ref: String,
    pub patch: String,
    pub commit_info: CommitInfo,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub author_name: String,
    #[serde(default)]
    pub author_email: String,
    /// Used verbatim as both author and committer date.
    pub date: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PatchResponse {
    /// The ref now pointing at the new commit.
    pub rev: String,
}

/// Commit metadata with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMetadata {
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    pub date: DateTime<FixedOffset>,
}

impl CommitMetadata {
    /// The date in git's internal format, eg. `1700000000 +0100`.
    pub fn git_date(&self) -> String {
        self.date.format("%s %z").to_string()
    }
}

impl CommitInfo {
    pub fn resolve(&self, defaults: &CommitDefaults) -> CommitMetadata {
        fn or(value: &str, default: &str) -> String {
            if value.is_empty() {
                default.to_owned()
            } else {
                value.to_owned()
            }
        }

        CommitMetadata {
            message: or(&self.message, &defaults.message),
            author_name: or(&self.author_name, &defaults.author_name),
            author_email: or(&self.author_email, &defaults.author_email),
            committer_name: defaults.committer_name.clone(),
            committer_email: defaults.committer_email.clone(),
            date: self.date,
        }
    }
}

impl PatchRequest {
    /// Check the request's identifiers, returning the normalized repository name.
    pub fn validate(&self) -> Result<String, Error> {
        let repo = normalize_repo(&self.repo)?;

        if !self.target_ref.starts_with("refs/")
            || !git2::Reference::is_valid_name(&self.target_ref)
        {
            return Err(Error::InvalidRequest(format!(
                "invalid target ref {:?}",
                self.target_ref
            )));
        }
        let base = &self.base_commit;
        if !(4..=64).contains(&base.len()) || !base.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidRequest(format!(
                "invalid base commit {:?}",
                base
            )));
        }
        // Git's internal date format has no representation for these.
        if self.commit_info.date.timestamp() < 0 {
            return Err(Error::InvalidRequest(format!(
                "commit date {} precedes the Unix epoch",
                self.commit_info.date.to_rfc3339()
            )));
        }
        Ok(repo)
    }
}

/// Normalize a repository name into the relative path of its storage directory.
///
/// Trailing `.git` and slashes are dropped, and the host is lowercased. On
/// `github.com`, names are case-insensitive, so the whole name is lowercased.
pub fn normalize_repo(name: &str) -> Result<String, Error> {
    let invalid = || Error::InvalidRequest(format!("invalid repository name {:?}", name));
    let trimmed = name.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    if trimmed.starts_with('/') {
        return Err(invalid());
    }
    let mut components = Vec::new();
    for component in trimmed.split('/') {
        match component {
            "" | "." => continue,
            c if c.starts_with('.') => return Err(invalid()),
            c if c.contains('\\') || c.contains('\0') => return Err(invalid()),
            c => components.push(c),
        }
    }
    let (host, path) = match components.split_first() {
        Some((host, path)) => (host.to_lowercase(), path),
        None => return Err(invalid()),
    };
    let mut repo = host;

    for component in path {
        repo.push('/');
        repo.push_str(component);
    }
    if repo.starts_with("github.com/") {
        repo = repo.to_lowercase();
    }
    Ok(repo)
}

#[cfg(test)]
mod test {
    use super::*;

    fn request(repo: &str, base: &str, target: &str) -> PatchRequest {
        PatchRequest {
            repo: repo.to_owned(),
            base_commit: base.to_owned(),
            target_ref: target.to_owned(),
            patch: String::new(),
            commit_info: CommitInfo {
                message: String::new(),
                author_name: String::new(),
                author_email: String::new(),
                date: DateTime::parse_from_rfc3339("2018-06-01T12:00:00+02:00").unwrap(),
            },
        }
    }

    #[test]
    fn test_normalize_repo() {
        assert_eq!(
            normalize_repo("github.com/Foo/Bar.git").unwrap(),
            "github.com/foo/bar"
        );
        assert_eq!(
            normalize_repo("GitLab.com/Foo/Bar/").unwrap(),
            "gitlab.com/Foo/Bar"
        );
        assert_eq!(normalize_repo("a//./b").unwrap(), "a/b");
        assert!(normalize_repo("a/../b").is_err());
        assert!(normalize_repo("/etc/passwd").is_err());
        assert!(normalize_repo("a/.hidden/b").is_err());
        assert!(normalize_repo("").is_err());
        assert!(normalize_repo(".git").is_err());
    }

    #[test]
    fn test_request_de() {
        let json = serde_json::json!({
            "repo": "github.com/foo/bar",
            "baseCommit": "deadbeef",
            "targetRef": "refs/heads/patch-1",
            "patch": "",
            "commitInfo": {
                "message": "add hello",
                "date": "2018-06-01T12:00:00Z",
            },
        });
        let req: PatchRequest = serde_json::from_value(json).unwrap();

        assert_eq!(req.base_commit, "deadbeef");
        assert_eq!(req.commit_info.message, "add hello");
        assert!(req.commit_info.author_name.is_empty());
    }

    #[test]
    fn test_validate() {
        let base = "a".repeat(40);

        assert_eq!(
            request("github.com/foo/bar", &base, "refs/heads/patch-1")
                .validate()
                .unwrap(),
            "github.com/foo/bar"
        );
        assert!(request("foo", &base, "heads/patch-1").validate().is_err());
        assert!(request("foo", &base, "refs/heads/a..b").validate().is_err());
        assert!(request("foo", "--exec=sh", "refs/heads/x").validate().is_err());
        assert!(request("foo", "", "refs/heads/x").validate().is_err());

        let mut req = request("foo", &base, "refs/heads/x");
        req.commit_info.date = DateTime::parse_from_rfc3339("1969-12-31T23:59:00Z").unwrap();
        assert!(matches!(req.validate(), Err(Error::InvalidRequest(_))));

        req.commit_info.date = DateTime::parse_from_rfc3339("1970-01-01T01:00:00+01:00").unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_resolve_defaults() {
        let defaults = CommitDefaults::default();
        let mut info = request("foo", "abcd", "refs/heads/x").commit_info;
        let meta = info.resolve(&defaults);

        assert_eq!(meta.message, defaults.message);
        assert_eq!(meta.author_name, defaults.author_name);
        assert_eq!(meta.author_email, defaults.author_email);
        assert_eq!(meta.committer_name, defaults.committer_name);
        assert_eq!(meta.git_date(), "1527847200 +0200");

        info.message = "add hello".to_owned();
        info.author_name = "Alice".to_owned();
        let meta = info.resolve(&defaults);

        assert_eq!(meta.message, "add hello");
        assert_eq!(meta.author_name, "Alice");
        assert_eq!(meta.author_email, defaults.author_email);
    }
}
