//! Identity and message applied to synthesized commits.

pub const DEFAULT_COMMIT_MESSAGE: &str = "Creating commit from patch";
pub const DEFAULT_AUTHOR_NAME: &str = "Patch Server";
pub const DEFAULT_AUTHOR_EMAIL: &str = "patch-server@localhost";
pub const DEFAULT_COMMITTER_NAME: &str = "patch-server-committer";
pub const DEFAULT_COMMITTER_EMAIL: &str = "patch-server@localhost";

/// Fallbacks for empty commit metadata fields, and the committer identity
/// stamped on every commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitDefaults {
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
}

impl Default for CommitDefaults {
    fn default() -> Self {
        Self {
            message: DEFAULT_COMMIT_MESSAGE.to_owned(),
            author_name: DEFAULT_AUTHOR_NAME.to_owned(),
            author_email: DEFAULT_AUTHOR_EMAIL.to_owned(),
            committer_name: DEFAULT_COMMITTER_NAME.to_owned(),
            committer_email: DEFAULT_COMMITTER_EMAIL.to_owned(),
        }
    }
}
