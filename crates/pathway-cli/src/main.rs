//! CLI binary for pathway: author and inspect course flows on disk.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pathway_builder::BuilderController;
use pathway_core::catalog::{ModuleCatalog, StaticCatalog};
use pathway_core::config::PathwayConfig;
use pathway_core::export::{self, ExportFormat};
use pathway_core::graph::ModuleData;
use pathway_core::repository::{CourseRepository, RepositoryError};
use pathway_core::schema::PersistedCourse;
use pathway_core::storage::{self, FileRepository};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "pathway", about = "Course-flow builder")]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(short, long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty course and print its id
    New {
        /// Course title
        title: String,
    },

    /// List stored courses
    List,

    /// Show a course summary: modules, reachable path, total duration
    Info {
        course: String,
    },

    /// Add a module node, from a catalog file or from flags
    Add {
        course: String,

        /// Catalog reference of the module
        module_ref: String,

        /// JSON catalog to look the module up in
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Module title (without --catalog)
        #[arg(long)]
        title: Option<String>,

        /// Duration in minutes (without --catalog)
        #[arg(long, default_value = "0")]
        minutes: u32,

        /// Connect the new module after this node id
        #[arg(long)]
        after: Option<String>,
    },

    /// Connect two nodes with a prerequisite edge
    Connect {
        course: String,
        source: String,
        target: String,
    },

    /// Delete nodes and edges by id (edges touching deleted nodes go too)
    Delete {
        course: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Duplicate module nodes
    Duplicate {
        course: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Change the course title
    Rename {
        course: String,
        title: String,
    },

    /// Run the layered layout and save the new positions
    Arrange {
        course: String,
    },

    /// Export a course as DOT (Graphviz) or Mermaid flowchart
    Export {
        course: String,

        /// Output format: dot, mermaid
        #[arg(short, long, default_value = "dot")]
        format: String,
    },

    /// Check the stored document for structural problems
    Validate {
        course: String,
    },

    /// Save and submit a course for review
    Submit {
        course: String,
    },
}

fn get_project_root(cli: &Cli) -> Result<PathBuf> {
    match &cli.project {
        Some(p) => Ok(p.clone()),
        None => std::env::current_dir().context("failed to get current directory"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project_root = get_project_root(&cli)?;
    let config = PathwayConfig::load(&project_root)?;
    let repo = FileRepository::new(&project_root, config.storage.clone());

    match cli.command {
        Commands::New { title } => cmd_new(&repo, &config, &title).await,
        Commands::List => cmd_list(&repo).await,
        Commands::Info { course } => cmd_info(&repo, &config, &course).await,
        Commands::Add {
            course,
            module_ref,
            catalog,
            title,
            minutes,
            after,
        } => {
            let data = resolve_module(&module_ref, catalog.as_deref(), title, minutes)?;
            cmd_add(&repo, &config, &course, data, after.as_deref()).await
        }
        Commands::Connect {
            course,
            source,
            target,
        } => cmd_connect(&repo, &config, &course, &source, &target).await,
        Commands::Delete { course, ids } => cmd_delete(&repo, &config, &course, &ids).await,
        Commands::Duplicate { course, ids } => cmd_duplicate(&repo, &config, &course, &ids).await,
        Commands::Rename { course, title } => cmd_rename(&repo, &config, &course, &title).await,
        Commands::Arrange { course } => cmd_arrange(&repo, &config, &course).await,
        Commands::Export { course, format } => cmd_export(&repo, &course, &format).await,
        Commands::Validate { course } => cmd_validate(&repo, &course).await,
        Commands::Submit { course } => cmd_submit(&repo, &config, &course).await,
    }
}

async fn open(
    repo: &FileRepository,
    config: &PathwayConfig,
    course: &str,
) -> Result<BuilderController> {
    Ok(BuilderController::open(repo, course, config).await?)
}

/// The stored document as-is, without the repair that opening a course applies.
async fn load_stored(repo: &FileRepository, course: &str) -> Result<PersistedCourse> {
    match repo.load_course(course).await {
        Err(RepositoryError::NotFound(_)) => {
            anyhow::bail!("No course {} found. Run `pathway list`.", course)
        }
        result => Ok(result?),
    }
}

async fn cmd_new(repo: &FileRepository, config: &PathwayConfig, title: &str) -> Result<()> {
    let mut controller = BuilderController::new_course(title, config);
    controller.save_now(repo).await?;
    let id = controller
        .course_id()
        .context("repository returned no course id")?;
    println!("{}", id);
    Ok(())
}

async fn cmd_list(repo: &FileRepository) -> Result<()> {
    let ids = storage::list_courses(repo.root())?;
    if ids.is_empty() {
        eprintln!("No courses found. Run `pathway new <title>` first.");
        return Ok(());
    }
    for id in ids {
        let course = repo.load_course(&id).await?;
        println!("{}  {}  (updated {})", id, course.title, course.updated_at);
    }
    Ok(())
}

async fn cmd_info(repo: &FileRepository, config: &PathwayConfig, course: &str) -> Result<()> {
    let controller = open(repo, config, course).await?;
    let graph = controller.graph();
    let reach = controller.reachability();

    println!("Course: {}", graph.title);
    println!("Modules: {}", graph.module_nodes().count());
    println!("Edges: {}", graph.edges.len());
    println!(
        "Path: {} module(s), {} min ({} h)",
        reach.reachable_module_ids.len(),
        reach.total_duration_minutes,
        reach.total_hours()
    );

    let modules: Vec<_> = graph.module_nodes().collect();
    if !modules.is_empty() {
        println!();
        for node in modules {
            let marker = if reach.is_reachable(&node.id) { " " } else { "!" };
            println!(
                "{} {}  {} ({} min)",
                marker,
                node.id,
                node.label(),
                node.duration_minutes()
            );
        }
        if reach.reachable_module_ids.len() < graph.module_nodes().count() {
            println!("\n! = not reachable from the start, not counted in the total");
        }
    }
    Ok(())
}

fn resolve_module(
    module_ref: &str,
    catalog: Option<&Path>,
    title: Option<String>,
    minutes: u32,
) -> Result<ModuleData> {
    if let Some(path) = catalog {
        let catalog = StaticCatalog::load(path)?;
        return catalog
            .get(module_ref)
            .cloned()
            .with_context(|| format!("module {} not found in {}", module_ref, path.display()));
    }
    Ok(ModuleData {
        module_ref: module_ref.to_string(),
        title: title.unwrap_or_else(|| module_ref.to_string()),
        description: String::new(),
        duration_minutes: minutes,
        family_label: String::new(),
        family_icon: String::new(),
    })
}

async fn cmd_add(
    repo: &FileRepository,
    config: &PathwayConfig,
    course: &str,
    data: ModuleData,
    after: Option<&str>,
) -> Result<()> {
    let mut controller = open(repo, config, course).await?;
    let id = controller.add_module(data, None, Instant::now())?;
    if let Some(source) = after
        && controller.connect(source, &id, Instant::now())?.is_none()
    {
        eprintln!("WARN: node {} not found, module left unconnected", source);
    }
    controller.close(repo).await?;
    println!("{}", id);
    Ok(())
}

async fn cmd_connect(
    repo: &FileRepository,
    config: &PathwayConfig,
    course: &str,
    source: &str,
    target: &str,
) -> Result<()> {
    let mut controller = open(repo, config, course).await?;
    let Some(edge) = controller.connect(source, target, Instant::now())? else {
        anyhow::bail!("Both nodes must exist: {} -> {}", source, target);
    };
    controller.close(repo).await?;
    println!("{}", edge);
    Ok(())
}

async fn cmd_delete(
    repo: &FileRepository,
    config: &PathwayConfig,
    course: &str,
    ids: &[String],
) -> Result<()> {
    let mut controller = open(repo, config, course).await?;
    let (edge_ids, node_ids): (Vec<String>, Vec<String>) = ids
        .iter()
        .cloned()
        .partition(|id| controller.graph().edges.iter().any(|e| &e.id == id));
    if controller.delete_selected(&node_ids, &edge_ids, Instant::now())? {
        controller.close(repo).await?;
        eprintln!(
            "Deleted. {} node(s), {} edge(s) remain.",
            controller.graph().nodes.len(),
            controller.graph().edges.len()
        );
    } else {
        eprintln!("Nothing to delete.");
    }
    Ok(())
}

async fn cmd_duplicate(
    repo: &FileRepository,
    config: &PathwayConfig,
    course: &str,
    ids: &[String],
) -> Result<()> {
    let mut controller = open(repo, config, course).await?;
    let copies = controller.duplicate_selected(ids, Instant::now())?;
    controller.close(repo).await?;
    for id in copies {
        println!("{}", id);
    }
    Ok(())
}

async fn cmd_rename(
    repo: &FileRepository,
    config: &PathwayConfig,
    course: &str,
    title: &str,
) -> Result<()> {
    let mut controller = open(repo, config, course).await?;
    controller.rename(title, Instant::now())?;
    controller.close(repo).await?;
    Ok(())
}

async fn cmd_arrange(repo: &FileRepository, config: &PathwayConfig, course: &str) -> Result<()> {
    let mut controller = open(repo, config, course).await?;
    let bounds = controller.auto_arrange(Instant::now())?;
    controller.close(repo).await?;
    match bounds {
        Some(b) => eprintln!(
            "Arranged. Bounds ({:.0}, {:.0}) .. ({:.0}, {:.0})",
            b.min_x, b.min_y, b.max_x, b.max_y
        ),
        None => eprintln!("No modules to arrange."),
    }
    Ok(())
}

async fn cmd_export(repo: &FileRepository, course: &str, format: &str) -> Result<()> {
    let graph = load_stored(repo, course).await?.to_graph();

    let export_format = match format {
        "dot" | "graphviz" => ExportFormat::Dot,
        "mermaid" | "md" => ExportFormat::Mermaid,
        _ => anyhow::bail!("Unknown export format: {}. Use 'dot' or 'mermaid'.", format),
    };

    let output = export::export(&graph, export_format);
    print!("{}", output);

    Ok(())
}

async fn cmd_validate(repo: &FileRepository, course: &str) -> Result<()> {
    let graph = load_stored(repo, course).await?.to_graph();
    let issues = graph.integrity_issues();

    for issue in &issues {
        println!("WARN: {}", issue);
    }

    if issues.is_empty() {
        eprintln!("Course is valid. No integrity issues found.");
        eprintln!(
            "  {} modules, {} edges",
            graph.module_nodes().count(),
            graph.edges.len()
        );
    } else {
        eprintln!("\nFound {} integrity issue(s). Opening the course repairs them.", issues.len());
    }

    Ok(())
}

async fn cmd_submit(repo: &FileRepository, config: &PathwayConfig, course: &str) -> Result<()> {
    let mut controller = open(repo, config, course).await?;
    controller.submit_for_review(repo).await?;
    eprintln!("Submitted {} for review.", course);
    Ok(())
}
