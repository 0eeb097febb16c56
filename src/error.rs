use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while dumping.
///
/// `SourceUnavailable` is fatal: without a project listing there is nothing
/// to iterate over. Every other variant is scoped to a single project and is
/// recorded in the report instead of aborting the run.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("cannot reach gitlab: {0}")]
    SourceUnavailable(String),

    #[error("repository has no commits, the server cannot produce an archive")]
    EmptyProject,

    #[error("working copy at {} has uncommitted changes, resolve manually", .0.display())]
    DirtyWorkingCopy(PathBuf),

    #[error("remote has no history yet")]
    UnbornOrEmptyRemote,

    #[error("destination for {} escapes dump root {}", .slug, .root.display())]
    PathEscape { slug: String, root: PathBuf },

    #[error("{0}")]
    Unclassified(String),
}

impl DumpError {
    /// Short label used in the final report table.
    pub fn kind(&self) -> &'static str {
        match self {
            DumpError::SourceUnavailable(_) => "source unavailable",
            DumpError::EmptyProject => "empty project",
            DumpError::DirtyWorkingCopy(_) => "dirty working copy",
            DumpError::UnbornOrEmptyRemote => "unborn or empty remote",
            DumpError::PathEscape { .. } => "path escape",
            DumpError::Unclassified(_) => "unclassified",
        }
    }
}

impl From<std::io::Error> for DumpError {
    fn from(err: std::io::Error) -> Self {
        DumpError::Unclassified(err.to_string())
    }
}

impl From<reqwest::Error> for DumpError {
    fn from(err: reqwest::Error) -> Self {
        DumpError::Unclassified(err.to_string())
    }
}
