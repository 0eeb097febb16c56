use crate::error::DumpError;
use crate::filter::GroupFilter;
use crate::gitlab::GitlabClient;
use crate::project::Group;
use console::style;

/// Render the whole namespace hierarchy: parent groups, their subgroups
/// (depth-first) and the projects directly under each group.
pub async fn print_tree(client: &GitlabClient) -> Result<(), DumpError> {
    let parents_only = GroupFilter::new(true, None);
    let mut pager = client.groups();
    let mut parents = Vec::new();
    while let Some(group) = pager.try_next().await? {
        if parents_only.accept(&group) {
            parents.push(group);
        }
    }

    println!("Gitlab");
    let mut total_projects = 0usize;
    let mut stack: Vec<(Group, usize)> =
        parents.into_iter().rev().map(|g| (g, 1)).collect();
    while let Some((group, depth)) = stack.pop() {
        println!("{}{}", "    ".repeat(depth), group.path);

        for project in client.group_projects(group.id).await? {
            // Listings can include projects owned by subgroups; those are
            // printed when their own group is visited.
            if project.namespace.id != group.id {
                continue;
            }
            total_projects += 1;
            println!("{}{}", "    ".repeat(depth + 1), project.path);
        }

        let subgroups = client.group_subgroups(group.id).await?;
        for subgroup in subgroups.into_iter().rev() {
            stack.push((subgroup, depth + 1));
        }
    }

    println!();
    println!(
        "{}",
        style(format!("Total projects found: {}", total_projects)).cyan()
    );
    Ok(())
}
