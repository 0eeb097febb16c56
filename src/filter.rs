use crate::dump::ProjectSource;
use crate::error::DumpError;
use crate::project::{Group, NamespaceKind, Project};
use async_trait::async_trait;
use std::collections::HashSet;

/// Splits a comma-separated CLI value into trimmed, non-empty items. A
/// value holding no items at all (e.g. `" , "`) counts as not given, so a
/// degenerate flag never turns into an allow-nothing list.
pub fn parse_csv(raw: Option<String>) -> Option<Vec<String>> {
    let items: Vec<String> = raw?
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn normalized_set(items: Option<&[String]>) -> Option<HashSet<String>> {
    items.map(|items| items.iter().map(|item| item.trim().to_lowercase()).collect())
}

/// Project criteria, applied in order: personal-namespace exclusion, then
/// the namespace allow-list, then slug exclusion. All matching is
/// case-insensitive; the exclude set matches the leaf slug segment only.
pub struct ProjectFilter {
    exclude: Option<HashSet<String>>,
    namespaces: Option<HashSet<String>>,
    no_personal: bool,
}

impl ProjectFilter {
    pub fn new(
        exclude: Option<&[String]>,
        namespaces: Option<&[String]>,
        no_personal: bool,
    ) -> ProjectFilter {
        ProjectFilter {
            exclude: normalized_set(exclude),
            namespaces: normalized_set(namespaces),
            no_personal,
        }
    }

    pub fn accept(&self, project: &Project) -> bool {
        if self.no_personal && project.namespace.kind == NamespaceKind::User {
            return false;
        }
        if let Some(namespaces) = &self.namespaces {
            if !namespaces.contains(&project.namespace.full_path.to_lowercase()) {
                return false;
            }
        }
        if let Some(exclude) = &self.exclude {
            if exclude.contains(&project.path.trim().to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Group criteria: parents-only, then slug exclusion.
pub struct GroupFilter {
    parents_only: bool,
    exclude: Option<HashSet<String>>,
}

impl GroupFilter {
    pub fn new(parents_only: bool, exclude: Option<&[String]>) -> GroupFilter {
        GroupFilter {
            parents_only,
            exclude: normalized_set(exclude),
        }
    }

    pub fn accept(&self, group: &Group) -> bool {
        if self.parents_only && !group.is_parent() {
            return false;
        }
        if let Some(exclude) = &self.exclude {
            if exclude.contains(&group.path.trim().to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Lazy adapter over any project source, yielding only accepted records.
pub struct FilteredProjects<S> {
    source: S,
    filter: ProjectFilter,
}

impl<S: ProjectSource> FilteredProjects<S> {
    pub fn new(source: S, filter: ProjectFilter) -> FilteredProjects<S> {
        FilteredProjects { source, filter }
    }
}

#[async_trait]
impl<S: ProjectSource> ProjectSource for FilteredProjects<S> {
    async fn try_next(&mut self) -> Result<Option<Project>, DumpError> {
        while let Some(project) = self.source.try_next().await? {
            if self.filter.accept(&project) {
                return Ok(Some(project));
            }
            log::debug!("Filtered out {}", project.path_with_namespace);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Namespace;

    fn project(slug: &str, kind: NamespaceKind) -> Project {
        let (namespace, leaf) = slug.rsplit_once('/').unwrap();
        Project {
            id: 1,
            path: leaf.to_string(),
            path_with_namespace: slug.to_string(),
            namespace: Namespace {
                id: 10,
                kind,
                full_path: namespace.to_string(),
            },
            empty_repo: false,
            default_branch: Some(String::from("main")),
            web_url: String::new(),
            ssh_url_to_repo: String::new(),
            statistics: None,
        }
    }

    fn group(path: &str, parent_id: Option<u64>) -> Group {
        Group {
            id: 1,
            name: path.to_string(),
            path: path.to_string(),
            full_path: path.to_string(),
            parent_id,
            web_url: String::new(),
        }
    }

    #[test]
    fn exclude_is_case_insensitive_and_trimmed() {
        let exclude = vec![String::from("  RePo1 ")];
        let filter = ProjectFilter::new(Some(&exclude), None, false);
        assert!(!filter.accept(&project("team/repo1", NamespaceKind::Group)));
        assert!(filter.accept(&project("team/repo2", NamespaceKind::Group)));
    }

    #[test]
    fn exclude_matches_leaf_segment_not_full_slug() {
        let exclude = vec![String::from("team/repo1")];
        let filter = ProjectFilter::new(Some(&exclude), None, false);
        // The set holds a full slug, the leaf is "repo1", so nothing matches.
        assert!(filter.accept(&project("team/repo1", NamespaceKind::Group)));
    }

    #[test]
    fn namespace_allow_list() {
        let namespaces = vec![String::from("Team/Backend")];
        let filter = ProjectFilter::new(None, Some(&namespaces), false);
        assert!(filter.accept(&project("team/backend/api", NamespaceKind::Group)));
        assert!(!filter.accept(&project("team/frontend/app", NamespaceKind::Group)));
    }

    #[test]
    fn no_personal_drops_user_namespaces() {
        let filter = ProjectFilter::new(None, None, true);
        assert!(!filter.accept(&project("alice/dotfiles", NamespaceKind::User)));
        assert!(filter.accept(&project("team/api", NamespaceKind::Group)));
    }

    #[test]
    fn group_parents_only_and_exclude() {
        let exclude = vec![String::from("archived")];
        let filter = GroupFilter::new(true, Some(&exclude));
        assert!(filter.accept(&group("team", None)));
        assert!(!filter.accept(&group("subteam", Some(3))));
        assert!(!filter.accept(&group("archived", None)));
    }

    #[test]
    fn parse_csv_trims_and_drops_empty_items() {
        assert_eq!(
            parse_csv(Some(String::from(" a , b ,, c"))),
            Some(vec![
                String::from("a"),
                String::from("b"),
                String::from("c")
            ])
        );
        assert_eq!(parse_csv(None), None);
    }

    #[test]
    fn parse_csv_treats_blank_values_as_not_given() {
        assert_eq!(parse_csv(Some(String::from(" , "))), None);
        assert_eq!(parse_csv(Some(String::from(""))), None);
    }
}
