//! Thin CLI front-end (spec.md §1.4).
//!
//! Stands in for the command-line client spec.md §1 names as an external
//! collaborator: it only turns a compilation database into `index()`
//! calls, starts the watcher, and runs read-only queries against an
//! already-open project.

pub mod compile_db;
pub mod discover;

use crate::config::Settings;
use crate::error::{IndexError, IndexResult};
use crate::indexing::CompileMessage;
use crate::location::Location;
use crate::project::Project;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

#[derive(Parser)]
#[command(name = "cxindex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Incremental code-intelligence index for C/C++ source trees")]
pub struct Cli {
    /// Project root (defaults to the current directory).
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index every translation unit named in a compile_commands.json.
    Index {
        compile_db: PathBuf,
        /// Precompiled header every translation unit in this batch
        /// depends on, if any (spec.md §4.3 PCH ordering).
        #[arg(long)]
        pch: Option<PathBuf>,
    },
    /// Index one file as a precompiled header, ahead of its dependents.
    IndexPch {
        path: PathBuf,
    },
    /// Walk a directory tree with no compile_commands.json, applying
    /// `.gitignore` plus `indexing.ignore_patterns`, and index every
    /// source/header file found.
    Discover {
        root: PathBuf,
    },
    /// Start the directory watcher and block, reindexing dirty files as
    /// they change.
    Watch,
    /// Read-only query jobs against the index.
    Query {
        #[command(subcommand)]
        query: QueryCommand,
    },
    /// Print scheduler and store occupancy.
    Stats,
}

#[derive(Subcommand)]
pub enum QueryCommand {
    /// Resolve `file:offset`, following a reference to its declaration.
    FollowLocation { location: String },
    /// All locations recorded for a symbol name.
    References { name: String },
    /// Prefix scan over indexed symbol names.
    ListSymbols { prefix: String },
    /// Files directly including `path`.
    FileIncludes { path: PathBuf },
}

fn parse_location(registry: &crate::file_registry::FileRegistry, spec: &str) -> IndexResult<Location> {
    let (path, offset) = spec.rsplit_once(':').ok_or_else(|| IndexError::General(
        format!("expected `<file>:<offset>`, got '{spec}'"),
    ))?;
    let offset: u32 = offset
        .parse()
        .map_err(|_| IndexError::General(format!("invalid offset '{offset}'")))?;
    let file = registry
        .id_for(std::path::Path::new(path))
        .ok_or_else(|| IndexError::PathResolveFailed {
            path: PathBuf::from(path),
            reason: "file is not indexed".to_string(),
        })?;
    Ok(Location::from_file(file, offset))
}

pub fn run(cli: Cli) -> IndexResult<()> {
    let root = cli.root.unwrap_or_else(|| PathBuf::from("."));
    let settings = Settings::load().unwrap_or_default();
    let ignore_patterns = settings.indexing.ignore_patterns.clone();
    let project = std::sync::Arc::new(Project::open(&root, settings)?);

    match cli.command {
        Commands::Index { compile_db, pch } => {
            let messages = compile_db::load(&compile_db)?;
            let total = messages.len();
            for message in messages {
                match &pch {
                    Some(pch_path) => {
                        project.index_with_pch(message, pch_path);
                    }
                    None => {
                        project.index(message);
                    }
                }
            }
            println!("submitted {total} translation units");
        }
        Commands::IndexPch { path } => {
            project.index_pch(CompileMessage { path, args: Vec::new() });
            println!("submitted precompiled header");
        }
        Commands::Discover { root: discover_root } => {
            let found = discover::discover_sources(&discover_root, &ignore_patterns);
            let total = found.len();
            for path in found {
                project.index(CompileMessage { path, args: Vec::new() });
            }
            println!("discovered and submitted {total} files under {}", discover_root.display());
        }
        Commands::Watch => {
            project.start_watching()?;
            println!("watching {} for changes (ctrl-c to stop)", root.display());
            loop {
                std::thread::sleep(std::time::Duration::from_secs(1));
            }
        }
        Commands::Query { query } => run_query(&project, query)?,
        Commands::Stats => {
            println!("in-flight jobs:      {}", project.scheduler().in_flight_count());
            println!("waiting on PCH:      {}", project.scheduler().waiting_for_pch_count());
            println!("tracked files:       {}", project.registry().len());
        }
    }
    Ok(())
}

fn run_query(project: &Project, query: QueryCommand) -> IndexResult<()> {
    let queries = project.queries();
    match query {
        QueryCommand::FollowLocation { location } => {
            let loc = parse_location(project.registry(), &location)?;
            match queries.follow_location(loc) {
                Some((resolved, cursor)) => println!("{resolved} {} ({:?})", cursor.name, cursor.kind),
                None => println!("no symbol at {location}"),
            }
        }
        QueryCommand::References { name } => {
            let flag = AtomicBool::new(false);
            for loc in queries.references_for_name(&name, &flag) {
                println!("{loc}");
            }
        }
        QueryCommand::ListSymbols { prefix } => {
            let flag = AtomicBool::new(false);
            for (name, locs) in queries.list_symbols(&prefix, &flag) {
                println!("{name}: {} location(s)", locs.len());
            }
        }
        QueryCommand::FileIncludes { path } => {
            let file = project
                .registry()
                .id_for(&path)
                .ok_or_else(|| IndexError::PathResolveFailed {
                    path: path.clone(),
                    reason: "file is not indexed".to_string(),
                })?;
            for included in queries.file_includes(file) {
                println!("{}", included.display());
            }
        }
    }
    Ok(())
}

