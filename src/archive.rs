use crate::dump::{safe_join, Strategy};
use crate::error::DumpError;
use crate::gitlab::GitlabClient;
use crate::project::Project;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zip" => Ok(ArchiveFormat::Zip),
            "tar" => Ok(ArchiveFormat::Tar),
            "tar.gz" => Ok(ArchiveFormat::TarGz),
            _ => Err("expected one of: zip, tar, tar.gz"),
        }
    }
}

/// Archive-download materialization: one server-side snapshot file per
/// project at `root/<top-namespace-segment>/<leaf>.<ext>`, flattened
/// rather than mirroring the whole namespace tree.
pub struct Snapshot<'a> {
    client: &'a GitlabClient,
    format: ArchiveFormat,
}

impl<'a> Snapshot<'a> {
    pub fn new(client: &'a GitlabClient, format: ArchiveFormat) -> Snapshot<'a> {
        Snapshot { client, format }
    }
}

#[async_trait]
impl Strategy for Snapshot<'_> {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn destination(&self, project: &Project, root: &Path) -> Result<PathBuf, DumpError> {
        let slug = &project.path_with_namespace;
        let top = slug.split('/').next().unwrap_or("");
        let file_name = format!("{}.{}", project.path, self.format.extension());
        safe_join(root, slug, [top, file_name.as_str()].into_iter())
    }

    async fn materialize(
        &self,
        project: &Project,
        destination: &Path,
        dry_run: bool,
    ) -> Result<PathBuf, DumpError> {
        // The server refuses to archive a repository with no commits, so
        // short-circuit before making the request.
        if project.empty_repo {
            return Err(DumpError::EmptyProject);
        }
        if dry_run {
            log::info!(
                "Dry-run: would download {} archive of {} to {}",
                self.format.extension(),
                project.path_with_namespace,
                destination.display()
            );
            return Ok(destination.to_path_buf());
        }

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        log::info!(
            "Downloading {} archive of {}...",
            self.format.extension(),
            project.path_with_namespace
        );
        self.client
            .download_archive(project, self.format.extension(), destination)
            .await?;
        Ok(destination.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Namespace, NamespaceKind};
    use crate::settings::Settings;
    use std::time::Duration;
    use warp::Filter;

    fn project(slug: &str, empty_repo: bool) -> Project {
        let (namespace, leaf) = slug.rsplit_once('/').unwrap();
        Project {
            id: 3,
            path: leaf.to_string(),
            path_with_namespace: slug.to_string(),
            namespace: Namespace {
                id: 10,
                kind: NamespaceKind::Group,
                full_path: namespace.to_string(),
            },
            empty_repo,
            default_branch: Some(String::from("main")),
            web_url: String::new(),
            ssh_url_to_repo: String::new(),
            statistics: None,
        }
    }

    fn client_for(port: u16) -> GitlabClient {
        let settings = Settings {
            gitlab_url: format!("http://localhost:{}", port),
            oauth_token: None,
            private_token: Some(String::from("test-token")),
            dump_dir: PathBuf::from("./dumps"),
            log_level: String::from("info"),
        };
        GitlabClient::new(&settings).unwrap()
    }

    #[test]
    fn format_parsing_and_extensions() {
        assert_eq!("zip".parse(), Ok(ArchiveFormat::Zip));
        assert_eq!("tar".parse(), Ok(ArchiveFormat::Tar));
        assert_eq!("tar.gz".parse(), Ok(ArchiveFormat::TarGz));
        assert!("rar".parse::<ArchiveFormat>().is_err());
        assert_eq!(ArchiveFormat::TarGz.extension(), "tar.gz");
    }

    #[tokio::test]
    async fn snapshot_flattens_to_top_segment_and_leaf() {
        let client = client_for(1);
        let snapshot = Snapshot::new(&client, ArchiveFormat::TarGz);
        let dest = snapshot
            .destination(&project("team/backend/service", false), Path::new("/dumps"))
            .unwrap();
        assert_eq!(dest, PathBuf::from("/dumps/team/service.tar.gz"));
    }

    #[tokio::test]
    async fn downloads_archive_to_disk() {
        let archive_route = warp::path!("api" / "v4" / "projects" / u64 / "repository" / String)
            .map(|_id, name: String| {
                assert_eq!(name, "archive.tar.gz");
                String::from("fake-archive-bytes")
            });

        tokio::spawn(async move {
            warp::serve(archive_route)
                .run(([127, 0, 0, 1], 18126))
                .await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let client = client_for(18126);
        let snapshot = Snapshot::new(&client, ArchiveFormat::TarGz);
        let root = tempfile::tempdir().unwrap();
        let project = project("team/repo", false);

        let dest = snapshot.destination(&project, root.path()).unwrap();
        let written = snapshot.materialize(&project, &dest, false).await.unwrap();
        assert_eq!(written, root.path().join("team").join("repo.tar.gz"));
        assert_eq!(
            std::fs::read_to_string(&written).unwrap(),
            "fake-archive-bytes"
        );
    }

    #[tokio::test]
    async fn empty_repo_fails_fast_even_in_dry_run() {
        let client = client_for(1);
        let snapshot = Snapshot::new(&client, ArchiveFormat::Zip);
        let root = tempfile::tempdir().unwrap();
        let project = project("team/empty", true);

        let dest = snapshot.destination(&project, root.path()).unwrap();
        let err = snapshot.materialize(&project, &dest, true).await.unwrap_err();
        assert!(matches!(err, DumpError::EmptyProject));
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let client = client_for(1);
        let snapshot = Snapshot::new(&client, ArchiveFormat::Zip);
        let root = tempfile::tempdir().unwrap();
        let project = project("team/repo", false);

        let dest = snapshot.destination(&project, root.path()).unwrap();
        let reported = snapshot.materialize(&project, &dest, true).await.unwrap();
        assert_eq!(reported, dest);
        assert!(!dest.exists());
        assert!(!root.path().join("team").exists());
    }
}
