use crate::dump::{DumpReport, DumpResult};
use crate::project::{Group, Project};
use console::style;

/// Per-project outcome lines plus a one-line summary.
pub fn print_dump_report(report: &DumpReport) {
    println!();
    for (project, result) in &report.results {
        let slug = &project.path_with_namespace;
        match result {
            DumpResult::Succeeded { destination } => println!(
                "{:>5} {} -> {}",
                style("ok").green().bold(),
                slug,
                destination.display()
            ),
            DumpResult::Skipped { reason } => {
                println!("{:>5} {} ({})", style("skip").yellow().bold(), slug, reason)
            }
            DumpResult::Failed { error } => println!(
                "{:>5} {} ({}: {})",
                style("fail").red().bold(),
                slug,
                error.kind(),
                error
            ),
        }
    }
    println!();

    if !report.matched_any {
        println!(
            "{}",
            style("No projects matched the given filters").yellow().bold()
        );
        return;
    }
    println!(
        "{} succeeded, {} skipped, {} failed",
        style(report.succeeded()).green(),
        style(report.skipped()).yellow(),
        style(report.failed()).red(),
    );
}

pub fn print_groups_table(groups: &[Group]) {
    let rows: Vec<[String; 4]> = groups
        .iter()
        .map(|group| {
            [
                group.id.to_string(),
                group.name.clone(),
                group.path.clone(),
                group.web_url.clone(),
            ]
        })
        .collect();
    print_table(&["id", "name", "slug", "url"], &rows);
}

pub fn print_projects_table(projects: &[Project], with_statistics: bool) {
    let rows: Vec<[String; 4]> = projects
        .iter()
        .map(|project| {
            let last = if with_statistics {
                project
                    .statistics
                    .as_ref()
                    .map(|s| s.repository_size.to_string())
                    .unwrap_or_default()
            } else {
                project.web_url.clone()
            };
            [
                project.id.to_string(),
                project.path_with_namespace.clone(),
                project
                    .default_branch
                    .clone()
                    .unwrap_or_else(|| String::from("-")),
                last,
            ]
        })
        .collect();
    let last_header = if with_statistics { "size" } else { "url" };
    print_table(&["id", "slug", "default branch", last_header], &rows);
}

fn print_table<const N: usize>(headers: &[&str; N], rows: &[[String; N]]) {
    let mut widths: [usize; N] = headers.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row.iter()) {
            *width = (*width).max(cell.len());
        }
    }

    println!();
    let header_line = headers
        .iter()
        .zip(widths.iter())
        .map(|(h, w)| format!("{:<width$}", h, width = w))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", style(header_line).bold());
    println!(
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  ")
    );
    for row in rows {
        let line = row
            .iter()
            .zip(widths.iter())
            .map(|(cell, w)| format!("{:<width$}", cell, width = w))
            .collect::<Vec<_>>()
            .join("  ");
        println!("{}", line.trim_end());
    }
}
