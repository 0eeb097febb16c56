use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod archive;
mod dump;
mod error;
mod filter;
mod git;
mod gitlab;
mod project;
mod report;
mod settings;
mod tree;

use archive::{ArchiveFormat, Snapshot};
use dump::{DumpOptions, ProjectSource, Strategy};
use filter::{parse_csv, FilteredProjects, GroupFilter, ProjectFilter};
use git::GitSync;
use gitlab::GitlabClient;
use settings::Settings;

#[derive(Parser)]
#[clap(name = "gitlab-dumper", version, about = "Dump Gitlab groups and projects to local disk")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Operations with Gitlab groups.
    Groups {
        #[clap(subcommand)]
        command: GroupsCommand,
    },
    /// Operations with Gitlab projects.
    Projects {
        #[clap(subcommand)]
        command: ProjectsCommand,
    },
    /// Show groups, subgroups and projects as a tree.
    Tree,
}

#[derive(Subcommand)]
enum GroupsCommand {
    /// Show available Gitlab groups.
    List {
        /// Show only parent groups.
        #[clap(long)]
        parents: bool,
        /// Comma-separated group slugs to exclude.
        #[clap(long)]
        exclude: Option<String>,
    },
}

#[derive(Subcommand)]
enum ProjectsCommand {
    /// Show available Gitlab projects.
    List {
        /// Comma-separated project slugs to exclude.
        #[clap(long)]
        exclude: Option<String>,
        /// Comma-separated namespaces to dump; everything else is skipped.
        #[clap(long)]
        namespaces: Option<String>,
        /// Ignore projects living in personal (user) namespaces.
        #[clap(long)]
        no_personal: bool,
        /// Fetch repository statistics and show sizes.
        #[clap(long)]
        statistics: bool,
    },
    /// Clone or update every matching project, or download archives.
    Dump {
        /// Comma-separated project slugs to exclude.
        #[clap(long)]
        exclude: Option<String>,
        /// Comma-separated namespaces to dump; everything else is skipped.
        #[clap(long)]
        namespaces: Option<String>,
        /// Ignore projects living in personal (user) namespaces.
        #[clap(long)]
        no_personal: bool,
        /// Download server-side archives instead of cloning.
        #[clap(long)]
        snapshot: bool,
        /// Archive container format used with --snapshot.
        #[clap(long, default_value = "tar.gz")]
        format: ArchiveFormat,
        /// Simulate without touching the network or the filesystem.
        #[clap(long)]
        dry_run: bool,
        /// Skip projects that have no commits yet.
        #[clap(long)]
        skip_empty: bool,
        /// Seconds to wait between two projects.
        #[clap(long, default_value_t = 0)]
        delay: u64,
        /// Destination directory, defaults to DEFAULT_DUMP_DIR.
        #[clap(long)]
        dest: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = try_main().await {
        eprintln!("{}", console::style(format!("error: {:#}", e)).red().bold());
        std::process::exit(1);
    }
}

async fn try_main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::from_env()?;
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&settings.log_level),
    )
    .init();

    let client = GitlabClient::new(&settings)?;
    match cli.command {
        Command::Groups {
            command: GroupsCommand::List { parents, exclude },
        } => {
            let exclude = parse_csv(exclude);
            let filter = GroupFilter::new(parents, exclude.as_deref());
            let mut pager = client.groups();
            let mut groups = Vec::new();
            while let Some(group) = pager.try_next().await? {
                if filter.accept(&group) {
                    groups.push(group);
                }
            }
            report::print_groups_table(&groups);
        }
        Command::Projects {
            command:
                ProjectsCommand::List {
                    exclude,
                    namespaces,
                    no_personal,
                    statistics,
                },
        } => {
            let exclude = parse_csv(exclude);
            let namespaces = parse_csv(namespaces);
            let filter =
                ProjectFilter::new(exclude.as_deref(), namespaces.as_deref(), no_personal);
            let mut source = FilteredProjects::new(client.projects(statistics), filter);
            let mut projects = Vec::new();
            while let Some(project) = source.try_next().await? {
                projects.push(project);
            }
            report::print_projects_table(&projects, statistics);
        }
        Command::Projects {
            command:
                ProjectsCommand::Dump {
                    exclude,
                    namespaces,
                    no_personal,
                    snapshot,
                    format,
                    dry_run,
                    skip_empty,
                    delay,
                    dest,
                },
        } => {
            let exclude = parse_csv(exclude);
            let namespaces = parse_csv(namespaces);
            let filter =
                ProjectFilter::new(exclude.as_deref(), namespaces.as_deref(), no_personal);
            let mut source = FilteredProjects::new(client.projects(false), filter);

            let git_sync = GitSync;
            let snapshot_strategy;
            let strategy: &dyn Strategy = if snapshot {
                snapshot_strategy = Snapshot::new(&client, format);
                &snapshot_strategy
            } else {
                &git_sync
            };

            let root = dest.unwrap_or_else(|| settings.dump_dir.clone());
            let opts = DumpOptions {
                dry_run,
                skip_empty,
                delay: Duration::from_secs(delay),
            };
            log::info!(
                "Dumping to {} strategy={} dry_run={}",
                root.display(),
                strategy.name(),
                dry_run
            );

            let dump_report = dump::run(&mut source, strategy, &root, &opts).await?;
            report::print_dump_report(&dump_report);

            if !dump_report.matched_any {
                bail!("no projects matched the given filters");
            }
            let failed = dump_report.failed();
            if failed > 0 {
                bail!("{} project(s) failed to dump", failed);
            }
        }
        Command::Tree => tree::print_tree(&client).await?,
    }
    Ok(())
}
