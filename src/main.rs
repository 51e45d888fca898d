//! Administrative CLI for Markov brains.

use markov_brain::{BrainRegistry, Config, Trainer};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use std::path::PathBuf;

/// Train, query and manage per-tenant Markov brains.
#[derive(Parser, Debug)]
#[command(name = "markov-brain")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a TOML config file
    #[arg(short = 'c', long = "config", env = "MARKOV_BRAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// List registered tenants
    List,
    /// Create a brain, optionally copying another tenant's brain
    Create {
        tenant: String,
        #[arg(long)]
        root: Option<String>,
    },
    /// Permanently delete a tenant's brain
    Remove { tenant: String },
    /// Clear a tenant's brain, keeping it registered
    Reset { tenant: String },
    /// Learn from every line of a text file
    Train {
        tenant: String,
        file: PathBuf,
        #[arg(long)]
        max_characters: Option<usize>,
    },
    /// Generate a reply, from a random seed when none is given
    Speak {
        tenant: String,
        seed: Option<String>,
    },
    /// Generate text around a seed in both directions
    Babble { tenant: String, seed: String },
    /// Write a tenant's brain to a JSON file
    Export { tenant: String, file: PathBuf },
    /// Merge a JSON export into a tenant's brain
    Import { tenant: String, file: PathBuf },
    /// Show row counts for a tenant's brain
    Stats { tenant: String },
    /// Set a tenant's chattiness (0-100)
    Chattiness { tenant: String, level: u8 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    markov_brain::telemetry::init_tracing(cli.debug);

    let config = Config::load_or_default(cli.config.as_deref())?;
    let registry = BrainRegistry::connect(&config)
        .await
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;

    let result = run(&registry, cli.command).await;
    registry.close().await;
    result
}

async fn run(registry: &BrainRegistry, command: Command) -> anyhow::Result<()> {
    match command {
        Command::List => {
            for tenant in registry.tenants().await {
                println!("{tenant}");
            }
        }
        Command::Create { tenant, root } => {
            registry.create(&tenant, root.as_deref()).await?;
            println!("brain '{tenant}' ready");
        }
        Command::Remove { tenant } => {
            if registry.remove(&tenant).await? {
                println!("brain '{tenant}' removed");
            } else {
                println!("no brain registered for '{tenant}'");
            }
        }
        Command::Reset { tenant } => {
            engine(registry, &tenant).await?.reset().await?;
            println!("brain '{tenant}' reset");
        }
        Command::Train {
            tenant,
            file,
            max_characters,
        } => {
            let engine = registry.create(&tenant, None).await?;
            let report = Trainer::new(&engine)
                .train_on_file(&file, max_characters)
                .await?;
            println!(
                "learned {} of {} lines ({} windows)",
                report.learned, report.messages, report.windows
            );
        }
        Command::Speak { tenant, seed } => {
            let engine = engine(registry, &tenant).await?;
            print_reply(engine.speak(seed.as_deref()).await)?;
        }
        Command::Babble { tenant, seed } => {
            let engine = engine(registry, &tenant).await?;
            print_reply(engine.babble(&seed).await)?;
        }
        Command::Export { tenant, file } => {
            engine(registry, &tenant).await?.export_json(&file).await?;
            println!("exported '{tenant}' to {}", file.display());
        }
        Command::Import { tenant, file } => {
            let engine = registry.create(&tenant, None).await?;
            let written = engine.import_json(&file).await?;
            println!("imported {written} transitions into '{tenant}'");
        }
        Command::Stats { tenant } => {
            let stats = engine(registry, &tenant).await?.brain().stats().await?;
            println!(
                "seeds: {}\ntransitions: {}\ntotal weight: {}",
                stats.seeds, stats.transitions, stats.total_weight
            );
        }
        Command::Chattiness { tenant, level } => {
            if !registry.set_chattiness(&tenant, level).await? {
                anyhow::bail!("no brain registered for '{tenant}'");
            }
            println!("chattiness for '{tenant}' set to {level}");
        }
    }
    Ok(())
}

async fn engine(
    registry: &BrainRegistry,
    tenant: &str,
) -> anyhow::Result<std::sync::Arc<markov_brain::Engine>> {
    registry
        .get(tenant)
        .await
        .with_context(|| format!("no brain registered for '{tenant}'"))
}

fn print_reply(reply: markov_brain::Result<String>) -> anyhow::Result<()> {
    match reply {
        Ok(reply) if reply.is_empty() => println!("(nothing to say yet)"),
        Ok(reply) => println!("{reply}"),
        Err(error) if error.is_not_found() => {
            println!("I don't know that phrase, try another one.");
        }
        Err(error) => return Err(error.into()),
    }
    Ok(())
}
