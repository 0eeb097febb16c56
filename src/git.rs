use crate::dump::{safe_join, Strategy};
use crate::error::DumpError;
use crate::project::Project;
use async_trait::async_trait;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Cred, ErrorCode, FetchOptions, RemoteCallbacks, Repository, StatusOptions};
use std::path::{Path, PathBuf};

/// Clone-or-update materialization: a fresh clone over ssh, or a
/// fetch + fast-forward when a working copy is already on disk.
pub struct GitSync;

#[async_trait]
impl Strategy for GitSync {
    fn name(&self) -> &'static str {
        "sync"
    }

    fn destination(&self, project: &Project, root: &Path) -> Result<PathBuf, DumpError> {
        safe_join(
            root,
            &project.path_with_namespace,
            project.path_with_namespace.split('/'),
        )
    }

    async fn materialize(
        &self,
        project: &Project,
        destination: &Path,
        dry_run: bool,
    ) -> Result<PathBuf, DumpError> {
        if dry_run {
            log::info!(
                "Dry-run: would clone or update {} at {}",
                project.path_with_namespace,
                destination.display()
            );
            return Ok(destination.to_path_buf());
        }
        // git2 is blocking; the dump is a single sequential control flow by
        // design, so the call simply runs inline.
        clone_or_update(project, destination)
    }
}

fn clone_or_update(project: &Project, destination: &Path) -> Result<PathBuf, DumpError> {
    let slug = &project.path_with_namespace;
    log::info!("Cloning {}...", slug);

    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_options());
    match builder.clone(&project.ssh_url_to_repo, destination) {
        Ok(_) => {
            log::info!("Project {} successfully cloned", slug);
            Ok(destination.to_path_buf())
        }
        Err(e) if e.code() == ErrorCode::Exists => {
            log::warn!("{} already cloned, updating instead", slug);
            update(project, destination)
        }
        Err(e) => Err(DumpError::Unclassified(e.to_string())),
    }
}

fn update(project: &Project, destination: &Path) -> Result<PathBuf, DumpError> {
    let slug = &project.path_with_namespace;
    let repo = Repository::open(destination).map_err(|e| DumpError::Unclassified(e.to_string()))?;

    if is_dirty(&repo).map_err(|e| DumpError::Unclassified(e.to_string()))? {
        return Err(DumpError::DirtyWorkingCopy(destination.to_path_buf()));
    }

    match fast_forward(&repo, project.default_branch.as_deref()) {
        Ok(()) => {
            log::info!("Successfully updated {} from remote origin", slug);
            Ok(destination.to_path_buf())
        }
        Err(e) if is_unborn_or_empty(&e) => {
            // An empty remote is not an error at this step; leave the
            // working copy as is.
            log::warn!("{}: {}", slug, DumpError::UnbornOrEmptyRemote);
            Ok(destination.to_path_buf())
        }
        Err(e) => Err(DumpError::Unclassified(e.to_string())),
    }
}

/// Uncommitted changes to tracked files. Untracked files do not count,
/// matching what an operator would expect from a dump tree they never
/// edit by hand.
fn is_dirty(repo: &Repository) -> Result<bool, git2::Error> {
    let mut opts = StatusOptions::new();
    opts.include_untracked(false).include_ignored(false);
    let statuses = repo.statuses(Some(&mut opts))?;
    Ok(!statuses.is_empty())
}

fn fast_forward(repo: &Repository, configured_branch: Option<&str>) -> Result<(), git2::Error> {
    let head = repo.head()?;
    let branch = match configured_branch {
        Some(branch) => branch.to_string(),
        None => head.shorthand().unwrap_or("master").to_string(),
    };

    let mut remote = repo.find_remote("origin")?;
    remote.fetch(&[branch.as_str()], Some(&mut fetch_options()), None)?;

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let fetch_commit = repo.reference_to_annotated_commit(&fetch_head)?;
    let (analysis, _) = repo.merge_analysis(&[&fetch_commit])?;

    if analysis.is_up_to_date() {
        return Ok(());
    }
    if analysis.is_fast_forward() {
        let refname = format!("refs/heads/{}", branch);
        let mut reference = repo.find_reference(&refname)?;
        reference.set_target(fetch_commit.id(), "fast-forward")?;
        repo.set_head(&refname)?;
        let mut checkout = CheckoutBuilder::new();
        checkout.force();
        repo.checkout_head(Some(&mut checkout))?;
        return Ok(());
    }
    Err(git2::Error::from_str(
        "local history has diverged from remote, refusing to fast-forward",
    ))
}

/// Only unborn-HEAD and missing-ref outcomes of a fetch are treated as "the
/// remote has no history yet"; everything else stays a real failure.
fn is_unborn_or_empty(err: &git2::Error) -> bool {
    matches!(err.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound)
}

fn fetch_options() -> FetchOptions<'static> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|_url, username_from_url, _allowed_types| {
        Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"))
    });
    let mut fo = FetchOptions::new();
    fo.remote_callbacks(callbacks);
    fo
}
