use std::path::{Path, PathBuf};

/// Reset SIGPIPE to default behavior so piping (e.g. `orkestra dig status ... --json | jq`)
/// exits cleanly instead of panicking on broken pipe.
#[cfg(unix)]
fn reset_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use orkestra::bundle::BundleApplier;
use orkestra::config::load_config;
use orkestra::deploy::{StatusQuery, StatusView};
use orkestra::output::formatter;
use orkestra::output::spinner::Spinner;
use orkestra::registry::DigRef;
use orkestra::Orchestrator;

/// orkestra - multi-cluster application deployment orchestrator
#[derive(Parser)]
#[command(name = "orkestra", version, about, long_about = None)]
struct Cli {
    /// Path to the orchestrator config file
    #[arg(short, long, default_value = "orkestra.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the document and context databases
    Init,

    /// Create registry entities from a multi-document YAML bundle
    Apply {
        /// Bundle file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Manage sub-controller registrations
    Controller {
        #[command(subcommand)]
        command: ControllerCommands,
    },

    /// Drive a deployment intent group through its lifecycle
    Dig {
        #[command(subcommand)]
        command: DigCommands,
    },
}

#[derive(Subcommand)]
enum ControllerCommands {
    /// List registered controllers
    List,
    /// Unregister a controller
    Delete {
        /// Controller name
        name: String,
    },
}

/// Addresses one deployment intent group.
#[derive(Args, Clone)]
struct DigArgs {
    project: String,
    composite_app: String,
    version: String,
    dig: String,
}

impl DigArgs {
    fn dig_ref(&self) -> DigRef {
        DigRef::new(&self.project, &self.composite_app, &self.version, &self.dig)
    }
}

#[derive(Subcommand)]
enum DigCommands {
    /// Approve the DIG for instantiation
    Approve(DigArgs),
    /// Build, schedule and install a new context
    Instantiate(DigArgs),
    /// Uninstall the current context
    Terminate(DigArgs),
    /// Stop work on the current context
    Stop(DigArgs),
    /// Rebuild the DIG and move onto the new context
    Update(DigArgs),
    /// Move the deployment onto another approved DIG of the same composite app
    Migrate {
        #[command(flatten)]
        dig: DigArgs,
        /// Composite app version of the target DIG
        #[arg(long)]
        target_version: String,
        /// Name of the target DIG
        #[arg(long)]
        target_dig: String,
    },
    /// Move back onto the context of an earlier revision
    Rollback {
        #[command(flatten)]
        dig: DigArgs,
        #[arg(long)]
        revision: u64,
    },
    /// Show the action log
    History(DigArgs),
    /// Show deployment status
    Status {
        #[command(flatten)]
        dig: DigArgs,
        /// Context to report on (defaults to the current one)
        #[arg(long)]
        instance: Option<String>,
        /// Status source: rsync or cluster
        #[arg(long = "type", default_value = "rsync")]
        view: String,
        /// Only these apps
        #[arg(long)]
        app: Vec<String>,
        /// Only these clusters
        #[arg(long)]
        cluster: Vec<String>,
        /// Only these resources
        #[arg(long)]
        resource: Vec<String>,
        /// Report shape: summary, apps, clusters or resources
        #[arg(short, long, default_value = "summary")]
        output: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Stream readiness events for the current context
    Watch(DigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    #[cfg(unix)]
    reset_sigpipe();

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("orkestra=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("orkestra=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init(&cli.config).await,
        Commands::Apply { ref file } => cmd_apply(&cli.config, file).await,
        Commands::Controller { ref command } => cmd_controller(&cli.config, command).await,
        Commands::Dig { ref command } => cmd_dig(&cli.config, command).await,
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn open(config_path: &Path) -> Result<Orchestrator> {
    let config = load_config(config_path)?;
    let orch = Orchestrator::open(config).context("Failed to open orchestrator stores")?;
    Ok(orch)
}

// ─── Commands ────────────────────────────────────────────────────────────────

async fn cmd_init(config_path: &Path) -> Result<()> {
    let orch = open(config_path)?;
    let config = orch.config();
    println!("  {} {}", "+".green(), config.database.path.bold());
    println!("  {} {}", "+".green(), config.context_store.path.bold());
    formatter::print_success("Orchestrator initialized.");
    Ok(())
}

async fn cmd_apply(config_path: &Path, file: &Path) -> Result<()> {
    let orch = open(config_path)?;
    let applied = BundleApplier::apply_file(orch.registry(), file).await?;
    formatter::print_applied(&applied);
    Ok(())
}

async fn cmd_controller(config_path: &Path, command: &ControllerCommands) -> Result<()> {
    let orch = open(config_path)?;
    match command {
        ControllerCommands::List => {
            let controllers = orch.registry().controllers.list_controllers().await?;
            formatter::print_controller_list(&controllers);
        }
        ControllerCommands::Delete { name } => {
            orch.delete_controller(name).await?;
            formatter::print_success(&format!("Controller '{}' deleted.", name));
        }
    }
    Ok(())
}

async fn cmd_dig(config_path: &Path, command: &DigCommands) -> Result<()> {
    let orch = open(config_path)?;
    let lifecycle = orch.lifecycle();

    match command {
        DigCommands::Approve(args) => {
            let dig = args.dig_ref();
            lifecycle.approve(&dig).await?;
            formatter::print_success(&format!("{} approved.", dig));
        }
        DigCommands::Instantiate(args) => {
            let dig = args.dig_ref();
            orch.init_channels().await?;
            let spinner = Spinner::start(format!("Instantiating {}", dig));
            let result = lifecycle.instantiate(&dig).await;
            spinner.finish();
            let context_id = result?;
            formatter::print_success(&format!("{} instantiated as context {}.", dig, context_id));
        }
        DigCommands::Terminate(args) => {
            let dig = args.dig_ref();
            let spinner = Spinner::start(format!("Terminating {}", dig));
            let result = lifecycle.terminate(&dig).await;
            spinner.finish();
            result?;
            formatter::print_success(&format!("{} terminated.", dig));
        }
        DigCommands::Stop(args) => {
            let dig = args.dig_ref();
            lifecycle.stop(&dig).await?;
            formatter::print_success(&format!("Stop requested for {}.", dig));
        }
        DigCommands::Update(args) => {
            let dig = args.dig_ref();
            orch.init_channels().await?;
            let spinner = Spinner::start(format!("Updating {}", dig));
            let result = lifecycle.update(&dig).await;
            spinner.finish();
            let revision = result?;
            formatter::print_success(&format!("{} updated to revision {}.", dig, revision));
        }
        DigCommands::Migrate {
            dig,
            target_version,
            target_dig,
        } => {
            let source = dig.dig_ref();
            let target = DigRef::new(&dig.project, &dig.composite_app, target_version, target_dig);
            orch.init_channels().await?;
            let spinner = Spinner::start(format!("Migrating {} to {}", source, target));
            let result = lifecycle.migrate(&source, &target).await;
            spinner.finish();
            let context_id = result?;
            formatter::print_success(&format!("{} migrated to {} (context {}).", source, target, context_id));
        }
        DigCommands::Rollback { dig, revision } => {
            let dig = dig.dig_ref();
            let spinner = Spinner::start(format!("Rolling back {} to revision {}", dig, revision));
            let result = lifecycle.rollback(&dig, *revision).await;
            spinner.finish();
            let new_revision = result?;
            formatter::print_success(&format!(
                "{} rolled back to revision {} (now revision {}).",
                dig, revision, new_revision
            ));
        }
        DigCommands::History(args) => {
            let dig = args.dig_ref();
            let info = lifecycle.state(&dig).await?;
            println!();
            println!("{} {}", "Deployment intent group:".bold().cyan(), dig);
            println!("{}", "─".repeat(72));
            formatter::print_state(&info);
            println!();
        }
        DigCommands::Status {
            dig,
            instance,
            view,
            app,
            cluster,
            resource,
            output,
            json,
        } => {
            let dig = dig.dig_ref();
            let query = StatusQuery {
                instance: instance.clone(),
                view: view.parse::<StatusView>()?,
                apps: app.clone(),
                clusters: cluster.clone(),
                resources: resource.clone(),
            };
            print_status(&orch, &dig, &query, output, *json).await?;
        }
        DigCommands::Watch(args) => {
            let dig = args.dig_ref();
            let mut subscription = orch.watch(&dig).await?;
            println!("Watching {} (Ctrl-C to stop)", dig.to_string().bold());
            loop {
                tokio::select! {
                    event = subscription.next() => match event {
                        Some(event) => println!(
                            "  {} {} {}",
                            event.context_id.dimmed(),
                            event.status.bold(),
                            event.message
                        ),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
        }
    }
    Ok(())
}

async fn print_status(orch: &Orchestrator, dig: &DigRef, query: &StatusQuery, output: &str, json: bool) -> Result<()> {
    let status = orch.status();
    match output {
        "summary" => {
            let summary = status.summary(dig, query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                formatter::print_dig_status(&summary);
            }
        }
        "apps" => {
            let apps = status.apps(dig, query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&apps)?);
            } else {
                for app in apps {
                    println!("{}", app);
                }
            }
        }
        "clusters" => {
            let clusters = status.clusters_by_app(dig, query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&clusters)?);
            } else {
                formatter::print_clusters_by_app(&clusters);
            }
        }
        "resources" => {
            let resources = status.resources_by_app(dig, query).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&resources)?);
            } else {
                for app in &resources {
                    println!("{}", app.app.bold());
                    for r in &app.resources {
                        println!("  {:<44} {}", r.name, r.status);
                    }
                }
            }
        }
        other => anyhow::bail!("unknown status output {other:?}; expected summary, apps, clusters or resources"),
    }
    Ok(())
}
