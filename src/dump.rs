use crate::error::DumpError;
use crate::project::Project;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Lazy sequence of projects consumed by the orchestrator. Implemented by
/// the paginated API listing and by the filter adapter on top of it.
#[async_trait]
pub trait ProjectSource: Send {
    async fn try_next(&mut self) -> Result<Option<Project>, DumpError>;
}

/// One way of materializing a project under the dump root. Exactly two
/// implementers exist: clone-or-update and archive download. Strategies are
/// stateless across invocations; anything needed to retry lives on disk.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Resolve the destination under `root` for this project. Must reject
    /// slugs that would land outside `root`.
    fn destination(&self, project: &Project, root: &Path) -> Result<PathBuf, DumpError>;

    async fn materialize(
        &self,
        project: &Project,
        destination: &Path,
        dry_run: bool,
    ) -> Result<PathBuf, DumpError>;
}

#[derive(Debug, Clone)]
pub struct DumpOptions {
    pub dry_run: bool,
    pub skip_empty: bool,
    /// Pause between two consecutive non-skipped projects.
    pub delay: Duration,
}

#[derive(Debug)]
pub enum DumpResult {
    Skipped { reason: &'static str },
    Succeeded { destination: PathBuf },
    Failed { error: DumpError },
}

#[derive(Debug, Default)]
pub struct DumpReport {
    /// One entry per yielded project, in listing order.
    pub results: Vec<(Project, DumpResult)>,
    /// False only when the filtered sequence itself was empty, which is a
    /// different outcome than "ran and nothing failed".
    pub matched_any: bool,
}

impl DumpReport {
    pub fn succeeded(&self) -> usize {
        self.count(|r| matches!(r, DumpResult::Succeeded { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, DumpResult::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, DumpResult::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&DumpResult) -> bool) -> usize {
        self.results.iter().filter(|(_, r)| pred(r)).count()
    }
}

/// Join validated slug segments onto `root`. Segments coming from the
/// remote listing are untrusted: anything that could climb out of the dump
/// root is rejected before a single byte is written.
pub(crate) fn safe_join<'a>(
    root: &Path,
    slug: &str,
    segments: impl Iterator<Item = &'a str>,
) -> Result<PathBuf, DumpError> {
    let escape = || DumpError::PathEscape {
        slug: slug.to_string(),
        root: root.to_path_buf(),
    };

    let mut path = root.to_path_buf();
    let mut joined_any = false;
    for segment in segments {
        if segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.contains(['/', '\\'])
            || Path::new(segment).is_absolute()
        {
            return Err(escape());
        }
        path.push(segment);
        joined_any = true;
    }
    if !joined_any {
        return Err(escape());
    }
    Ok(path)
}

/// Drive the whole dump: pull projects from `source`, skip or dispatch each
/// one, and collect every outcome. A single project's failure never stops
/// the run; only a failure of the listing itself does.
pub async fn run(
    source: &mut dyn ProjectSource,
    strategy: &dyn Strategy,
    root: &Path,
    opts: &DumpOptions,
) -> Result<DumpReport, DumpError> {
    let mut report = DumpReport::default();
    let mut dispatched_before = false;

    while let Some(project) = source.try_next().await? {
        report.matched_any = true;
        let slug = project.path_with_namespace.clone();

        if opts.skip_empty && project.empty_repo {
            log::info!("Skipping {}: empty repository", slug);
            report.results.push((
                project,
                DumpResult::Skipped {
                    reason: "empty repository",
                },
            ));
            continue;
        }

        // Throttle between consecutive dispatches, never before the first
        // one and never after a skipped project.
        if dispatched_before && !opts.delay.is_zero() {
            if opts.dry_run {
                log::info!("Dry-run: would wait {:?} before the next project", opts.delay);
            } else {
                log::debug!("Waiting {:?} before the next project", opts.delay);
                tokio::time::sleep(opts.delay).await;
            }
        }
        dispatched_before = true;

        let result = match dispatch(strategy, &project, root, opts.dry_run).await {
            Ok(destination) => {
                log::info!("{} {} -> {}", strategy.name(), slug, destination.display());
                DumpResult::Succeeded { destination }
            }
            Err(error) => {
                log::error!("Failed to dump {}: {}", slug, error);
                DumpResult::Failed { error }
            }
        };
        report.results.push((project, result));
    }

    Ok(report)
}

async fn dispatch(
    strategy: &dyn Strategy,
    project: &Project,
    root: &Path,
    dry_run: bool,
) -> Result<PathBuf, DumpError> {
    let destination = strategy.destination(project, root)?;
    strategy.materialize(project, &destination, dry_run).await
}
