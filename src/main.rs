//! # Collab CLI (`collab`)
//!
//! The `collab` binary drives the analysis backend against a local SQLite
//! database. Every command prints its result as JSON on stdout; logs go to
//! stderr.
//!
//! ## Usage
//!
//! ```bash
//! collab --config ./config/collab.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `collab init` | Create the SQLite database and run schema migrations |
//! | `collab stats` | Row counts and task status breakdown |
//! | `collab project create\|show\|edit` | Manage projects |
//! | `collab file create\|show\|list` | Manage files in a project |
//! | `collab version create\|complete\|list` | Manage file snapshots |
//! | `collab dependency add\|list` | File dependency edges |
//! | `collab instance import\|show\|list` | Instances with vectors and annotations |
//! | `collab vector list` | Vectors of a file version |
//! | `collab task create\|show\|edit\|progress` | Match task lifecycle |
//! | `collab match record\|list` | Matches produced by a task |
//! | `collab matchers` / `collab strategies` | Engine catalog |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use collab::instances::InstanceView;
use collab::{catalog, config, instances, logging, migrate, output, projects, stats, tasks};
use collab_core::models::{InstanceType, NewProject, ProjectEdit, TaskStatus};
use collab_core::task::{TaskProgress, TaskRequest};

/// Collab CLI: storage and task management for collaborative binary analysis.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/collab.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "collab",
    about = "Storage and task management for collaborative binary analysis",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/collab.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Print row counts and a task status breakdown.
    Stats,

    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage files.
    File {
        #[command(subcommand)]
        action: FileAction,
    },

    /// Manage file versions (snapshots of a file's content).
    Version {
        #[command(subcommand)]
        action: VersionAction,
    },

    /// Manage file dependency edges.
    Dependency {
        #[command(subcommand)]
        action: DependencyAction,
    },

    /// Import and read instances.
    Instance {
        #[command(subcommand)]
        action: InstanceAction,
    },

    /// Read vectors.
    Vector {
        #[command(subcommand)]
        action: VectorAction,
    },

    /// Manage match tasks.
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Record and list task matches.
    Match {
        #[command(subcommand)]
        action: MatchAction,
    },

    /// List the matchers the engine offers.
    Matchers,

    /// List the strategies the engine offers.
    Strategies,
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a project.
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        private: bool,
    },
    /// Show a project with its file ids.
    Show { id: i64 },
    /// Edit a project's name, description or visibility.
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        private: Option<bool>,
    },
}

#[derive(Subcommand)]
enum FileAction {
    /// Register a file. The hash is computed from `--path` unless `--hash` is given.
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        project: i64,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        hash: Option<String>,
        #[arg(long)]
        path: Option<PathBuf>,
        /// Where the bytes are kept. Defaults to `--path`.
        #[arg(long)]
        locator: Option<String>,
    },
    Show {
        id: i64,
    },
    List {
        #[arg(long)]
        project: i64,
    },
}

#[derive(Subcommand)]
enum VersionAction {
    /// Snapshot a file.
    Create {
        #[arg(long)]
        file: i64,
        #[arg(long)]
        hash: Option<String>,
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        complete: bool,
    },
    /// Mark an upload complete with its final hash.
    Complete {
        id: i64,
        #[arg(long)]
        hash: Option<String>,
        #[arg(long)]
        path: Option<PathBuf>,
    },
    List {
        #[arg(long)]
        file: i64,
    },
}

#[derive(Subcommand)]
enum DependencyAction {
    /// Record that `dependent` depends on `dependency`.
    Add { dependent: i64, dependency: i64 },
    List { dependent: i64 },
}

#[derive(Subcommand)]
enum InstanceAction {
    /// Import instances from a JSON file (one object or an array).
    Import {
        path: PathBuf,
        #[arg(long)]
        owner: String,
    },
    Show {
        id: i64,
        #[arg(long, value_enum, default_value_t = InstanceView::Counted)]
        view: InstanceView,
    },
    List {
        #[arg(long)]
        file_version: i64,
        #[arg(long = "type")]
        kind: Option<InstanceType>,
    },
}

#[derive(Subcommand)]
enum VectorAction {
    List {
        #[arg(long)]
        file_version: i64,
        #[arg(long = "type")]
        kind: Option<String>,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Create a pending match task.
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        source_file_version: i64,
        #[arg(long = "matcher", required = true)]
        matchers: Vec<String>,
        #[arg(long)]
        strategy: String,
        #[arg(long)]
        target_project: Option<i64>,
        #[arg(long)]
        target_file: Option<i64>,
        #[arg(long)]
        source_start: Option<u64>,
        #[arg(long)]
        source_end: Option<u64>,
    },
    Show {
        id: i64,
    },
    /// Submit a JSON edit body. Task fields are read-only after creation.
    Edit {
        id: i64,
        body: String,
    },
    /// Job-runner status and progress update.
    Progress {
        id: i64,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        progress: Option<u64>,
        #[arg(long)]
        progress_max: Option<u64>,
        #[arg(long)]
        local_count: Option<u64>,
        #[arg(long)]
        remote_count: Option<u64>,
        #[arg(long)]
        match_count: Option<u64>,
    },
}

#[derive(Subcommand)]
enum MatchAction {
    /// Record matches for a task from a JSON array file.
    Record { task: i64, path: PathBuf },
    List { task: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(cfg.logging.log_format(), &cfg.logging.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            output::print_json(&serde_json::json!({
                "initialized": true,
                "path": cfg.db.path.display().to_string(),
            }))?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Project { action } => match action {
            ProjectAction::Create {
                owner,
                name,
                description,
                private,
            } => {
                let new = NewProject {
                    name,
                    description,
                    private,
                };
                projects::run_project_create(&cfg, &owner, new).await?;
            }
            ProjectAction::Show { id } => projects::run_project_show(&cfg, id).await?,
            ProjectAction::Edit {
                id,
                name,
                description,
                private,
            } => {
                let edit = ProjectEdit {
                    name,
                    description,
                    private,
                };
                projects::run_project_edit(&cfg, id, edit).await?;
            }
        },
        Commands::File { action } => match action {
            FileAction::Create {
                owner,
                project,
                name,
                description,
                hash,
                path,
                locator,
            } => {
                projects::run_file_create(
                    &cfg,
                    &owner,
                    project,
                    name,
                    description,
                    hash,
                    path.as_deref(),
                    locator,
                )
                .await?;
            }
            FileAction::Show { id } => projects::run_file_show(&cfg, id).await?,
            FileAction::List { project } => projects::run_file_list(&cfg, project).await?,
        },
        Commands::Version { action } => match action {
            VersionAction::Create {
                file,
                hash,
                path,
                complete,
            } => {
                projects::run_version_create(&cfg, file, hash, path.as_deref(), complete).await?;
            }
            VersionAction::Complete { id, hash, path } => {
                projects::run_version_complete(&cfg, id, hash, path.as_deref()).await?;
            }
            VersionAction::List { file } => projects::run_version_list(&cfg, file).await?,
        },
        Commands::Dependency { action } => match action {
            DependencyAction::Add {
                dependent,
                dependency,
            } => projects::run_dependency_add(&cfg, dependent, dependency).await?,
            DependencyAction::List { dependent } => {
                projects::run_dependency_list(&cfg, dependent).await?
            }
        },
        Commands::Instance { action } => match action {
            InstanceAction::Import { path, owner } => {
                instances::run_instance_import(&cfg, &owner, &path).await?;
            }
            InstanceAction::Show { id, view } => {
                instances::run_instance_show(&cfg, id, view).await?;
            }
            InstanceAction::List { file_version, kind } => {
                instances::run_instance_list(&cfg, file_version, kind).await?;
            }
        },
        Commands::Vector {
            action: VectorAction::List { file_version, kind },
        } => {
            instances::run_vector_list(&cfg, file_version, kind.as_deref()).await?;
        }
        Commands::Task { action } => match action {
            TaskAction::Create {
                owner,
                source_file_version,
                matchers,
                strategy,
                target_project,
                target_file,
                source_start,
                source_end,
            } => {
                let request = TaskRequest {
                    target_project,
                    target_file,
                    source_file_version,
                    source_start,
                    source_end,
                    matchers,
                    strategy,
                };
                tasks::run_task_create(&cfg, &owner, request).await?;
            }
            TaskAction::Show { id } => tasks::run_task_show(&cfg, id).await?,
            TaskAction::Edit { id, body } => tasks::run_task_edit(&cfg, id, &body).await?,
            TaskAction::Progress {
                id,
                status,
                progress,
                progress_max,
                local_count,
                remote_count,
                match_count,
            } => {
                let update = TaskProgress {
                    status,
                    progress,
                    progress_max,
                    local_count,
                    remote_count,
                    match_count,
                };
                tasks::run_task_progress(&cfg, id, update).await?;
            }
        },
        Commands::Match { action } => match action {
            MatchAction::Record { task, path } => tasks::run_match_record(&cfg, task, &path).await?,
            MatchAction::List { task } => tasks::run_match_list(&cfg, task).await?,
        },
        Commands::Matchers => catalog::run_matchers(&cfg)?,
        Commands::Strategies => catalog::run_strategies(&cfg)?,
    }

    Ok(())
}
