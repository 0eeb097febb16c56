use crate::dump::ProjectSource;
use crate::error::DumpError;
use crate::project::{Group, Project};
use crate::settings::Settings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

const PER_PAGE: usize = 100;

/// Authenticated client for the GitLab v4 REST API.
pub struct GitlabClient {
    http: reqwest::Client,
    base_url: String,
}

impl GitlabClient {
    pub fn new(settings: &Settings) -> Result<GitlabClient> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &settings.private_token {
            headers.insert(
                "PRIVATE-TOKEN",
                HeaderValue::from_str(token)
                    .with_context(|| "Invalid token: cannot be set as HTTP header")?,
            );
        } else if let Some(token) = &settings.oauth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .with_context(|| "Invalid token: cannot be set as HTTP header")?,
            );
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .default_headers(headers)
            .build()
            .with_context(|| "Failed to create http client")?;

        Ok(GitlabClient {
            http,
            base_url: settings.gitlab_url.clone(),
        })
    }

    /// Lazy, keyset-paginated listing of every project visible to the token.
    pub fn projects(&self, with_statistics: bool) -> ProjectPager<'_> {
        ProjectPager {
            client: self,
            with_statistics,
            buffer: VecDeque::new(),
            id_after: None,
            done: false,
        }
    }

    /// Lazy, keyset-paginated listing of every group visible to the token.
    pub fn groups(&self) -> GroupPager<'_> {
        GroupPager {
            client: self,
            buffer: VecDeque::new(),
            id_after: None,
            done: false,
        }
    }

    /// Projects directly under one group (used by the tree command).
    pub async fn group_projects(&self, group_id: u64) -> Result<Vec<Project>, DumpError> {
        self.fetch_all_pages(&format!("groups/{}/projects", group_id))
            .await
    }

    /// Immediate subgroups of one group (used by the tree command).
    pub async fn group_subgroups(&self, group_id: u64) -> Result<Vec<Group>, DumpError> {
        self.fetch_all_pages(&format!("groups/{}/subgroups", group_id))
            .await
    }

    /// Stream a server-side archive of the project's default branch into
    /// `destination`, overwriting any prior file.
    pub async fn download_archive(
        &self,
        project: &Project,
        extension: &str,
        destination: &Path,
    ) -> Result<(), DumpError> {
        let mut url = format!(
            "{}/api/v4/projects/{}/repository/archive.{}",
            self.base_url, project.id, extension
        );
        if let Some(branch) = &project.default_branch {
            url.push_str(&format!("?sha={}", branch));
        }
        log::debug!("Downloading archive url={}", url);

        let mut resp = self.http.get(&url).send().await?.error_for_status()?;
        let mut file = std::fs::File::create(destination)?;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk)?;
        }
        Ok(())
    }

    async fn fetch_listing_page<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, DumpError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DumpError::SourceUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| DumpError::SourceUnavailable(e.to_string()))?;
        let json = resp
            .text()
            .await
            .map_err(|e| DumpError::SourceUnavailable(e.to_string()))?;
        serde_json::from_str(&json)
            .map_err(|e| DumpError::SourceUnavailable(format!("failed to parse listing: {}", e)))
    }

    async fn fetch_all_pages<T: DeserializeOwned>(&self, resource: &str) -> Result<Vec<T>, DumpError> {
        let mut all = Vec::new();
        let mut page = 1usize;
        loop {
            let url = format!(
                "{}/api/v4/{}?per_page={}&page={}",
                self.base_url, resource, PER_PAGE, page
            );
            let items: Vec<T> = self.fetch_listing_page(&url).await?;
            let count = items.len();
            all.extend(items);
            if count < PER_PAGE {
                return Ok(all);
            }
            page += 1;
        }
    }
}

/// Pulls project pages on demand so callers never hold more than one page
/// in memory and an early exit stops the pagination.
pub struct ProjectPager<'a> {
    client: &'a GitlabClient,
    with_statistics: bool,
    buffer: VecDeque<Project>,
    id_after: Option<u64>,
    done: bool,
}

#[async_trait]
impl ProjectSource for ProjectPager<'_> {
    async fn try_next(&mut self) -> Result<Option<Project>, DumpError> {
        loop {
            if let Some(project) = self.buffer.pop_front() {
                return Ok(Some(project));
            }
            if self.done {
                return Ok(None);
            }

            let url = format!(
                "{}/api/v4/projects?all_available=true&order_by=id&sort=asc&pagination=keyset&per_page={}&id_after={}&statistics={}",
                self.client.base_url,
                PER_PAGE,
                self.id_after.unwrap_or(0),
                self.with_statistics,
            );
            log::debug!("project_id_after={:?}", self.id_after);
            let page: Vec<Project> = self.client.fetch_listing_page(&url).await?;
            log::debug!("Fetched projects: count={}", page.len());

            match page.last().map(|p| p.id) {
                Some(last) if Some(last) != self.id_after => {
                    self.id_after = Some(last);
                    self.buffer.extend(page);
                }
                _ => self.done = true,
            }
        }
    }
}

pub struct GroupPager<'a> {
    client: &'a GitlabClient,
    buffer: VecDeque<Group>,
    id_after: Option<u64>,
    done: bool,
}

impl GroupPager<'_> {
    pub async fn try_next(&mut self) -> Result<Option<Group>, DumpError> {
        loop {
            if let Some(group) = self.buffer.pop_front() {
                return Ok(Some(group));
            }
            if self.done {
                return Ok(None);
            }

            let url = format!(
                "{}/api/v4/groups?all_available=true&order_by=id&sort=asc&pagination=keyset&per_page={}&id_after={}",
                self.client.base_url,
                PER_PAGE,
                self.id_after.unwrap_or(0),
            );
            log::debug!("group_id_after={:?}", self.id_after);
            let page: Vec<Group> = self.client.fetch_listing_page(&url).await?;

            match page.last().map(|g| g.id) {
                Some(last) if Some(last) != self.id_after => {
                    self.id_after = Some(last);
                    self.buffer.extend(page);
                }
                _ => self.done = true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Namespace, NamespaceKind};
    use std::collections::HashMap;
    use warp::Filter;

    fn test_client(port: u16) -> GitlabClient {
        GitlabClient {
            http: reqwest::Client::new(),
            base_url: format!("http://localhost:{}", port),
        }
    }

    fn project(id: u64, slug: &str) -> Project {
        let (namespace, leaf) = slug.rsplit_once('/').unwrap();
        Project {
            id,
            path: leaf.to_string(),
            path_with_namespace: slug.to_string(),
            namespace: Namespace {
                id: 1,
                kind: NamespaceKind::Group,
                full_path: namespace.to_string(),
            },
            empty_repo: false,
            default_branch: Some(String::from("main")),
            web_url: format!("https://gitlab.example.com/{}", slug),
            ssh_url_to_repo: format!("git@gitlab.example.com:{}.git", slug),
            statistics: None,
        }
    }

    #[tokio::test]
    async fn projects_one_page() {
        let _ = env_logger::builder().is_test(true).try_init();

        let page = [project(3, "team/repo")];
        let page1 = page.clone();
        let projects_route =
            warp::path!("api" / "v4" / "projects").map(move || warp::reply::json(&page1));

        tokio::spawn(async move {
            warp::serve(projects_route)
                .run(([127, 0, 0, 1], 18123))
                .await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let client = test_client(18123);
        let mut pager = client.projects(false);

        assert_eq!(pager.try_next().await.unwrap(), Some(page[0].clone()));
        assert_eq!(pager.try_next().await.unwrap(), None);
        // Exhausted pagers stay exhausted.
        assert_eq!(pager.try_next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn projects_two_pages() {
        let first_page = [project(1, "team/one")];
        let second_page = [project(2, "team/two")];

        let first_page1 = first_page.clone();
        let second_page1 = second_page.clone();
        let projects_route = warp::get()
            .and(warp::path!("api" / "v4" / "projects"))
            .and(warp::query::<HashMap<String, String>>())
            .map(
                move |p: HashMap<String, String>| match p.get("id_after").map(|s| s.as_str()) {
                    Some("1") | Some("2") => warp::reply::json(&second_page1),
                    Some("0") | None => warp::reply::json(&first_page1),
                    Some(id) => panic!("Unknown id_after={}", id),
                },
            );

        tokio::spawn(async move {
            warp::serve(projects_route)
                .run(([127, 0, 0, 1], 18124))
                .await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let client = test_client(18124);
        let mut pager = client.projects(false);

        assert_eq!(pager.try_next().await.unwrap(), Some(first_page[0].clone()));
        assert_eq!(pager.try_next().await.unwrap(), Some(second_page[0].clone()));
        assert_eq!(pager.try_next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn listing_failure_is_source_unavailable() {
        // Nothing listens on this port.
        let client = test_client(18199);
        let mut pager = client.projects(false);
        let err = pager.try_next().await.unwrap_err();
        assert!(matches!(err, DumpError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn groups_paginate() {
        let page = [Group {
            id: 7,
            name: String::from("Team"),
            path: String::from("team"),
            full_path: String::from("team"),
            parent_id: None,
            web_url: String::from("https://gitlab.example.com/groups/team"),
        }];
        let page1 = page.clone();
        let groups_route =
            warp::path!("api" / "v4" / "groups").map(move || warp::reply::json(&page1));

        tokio::spawn(async move {
            warp::serve(groups_route).run(([127, 0, 0, 1], 18125)).await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let client = test_client(18125);
        let mut pager = client.groups();
        assert_eq!(pager.try_next().await.unwrap(), Some(page[0].clone()));
        assert_eq!(pager.try_next().await.unwrap(), None);
    }
}
