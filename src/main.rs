use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use i18n_catalog::config;
use i18n_catalog::{MessageSource, SourceCheck};

#[derive(Debug, Parser)]
#[command(author, version, about = "Manage translation catalogues stored in SQLite")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the configured culture
    #[arg(long)]
    culture: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List stored catalogues
    Catalogues,
    /// Print every message of a catalogue variant (e.g. messages.ru)
    Show { variant: String },
    /// Check a variant and create its catalogue if allowed
    Ensure { variant: String },
    /// Add a translated message
    Add {
        #[arg(long)]
        source: String,
        #[arg(long, default_value = "")]
        target: String,
        #[arg(long, default_value = "")]
        comments: String,
        /// Catalogue name; defaults to i18n.default_catalogue
        #[arg(long)]
        catalogue: Option<String>,
        #[arg(long, default_value = "1")]
        user: i64,
    },
    /// Update the translation of an existing message
    Update {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        #[arg(long, default_value = "")]
        comments: String,
        #[arg(long)]
        catalogue: Option<String>,
    },
    /// Delete a message
    Delete {
        #[arg(long)]
        source: String,
        #[arg(long)]
        catalogue: Option<String>,
    },
    /// Store untranslated source strings with empty targets
    Queue {
        #[arg(long)]
        catalogue: Option<String>,
        #[arg(required = true)]
        messages: Vec<String>,
    },
    /// Write a catalogue as JSON
    Export {
        variant: String,
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Drop the cache entry of a catalogue
    Invalidate { catalogue: Option<String> },
    /// Print an example configuration
    ExampleConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::ExampleConfig = args.command {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let mut source = MessageSource::connect(&cfg)
        .await
        .context("failed to open catalogue database")?;
    if let Some(culture) = args.culture {
        source.set_culture(culture);
    }
    execute(source, args.command, &cfg.i18n.default_catalogue).await
}

/// Run one command and close the pool whatever the outcome.
async fn execute(mut source: MessageSource, command: Command, default_catalogue: &str) -> Result<()> {
    let result = run(&mut source, command, default_catalogue).await;
    source.close().await;
    result
}

async fn run(source: &mut MessageSource, command: Command, default_catalogue: &str) -> Result<()> {
    let pick = |c: Option<String>| c.unwrap_or_else(|| default_catalogue.to_string());

    match command {
        Command::Catalogues => {
            for entry in source.catalogues().await? {
                println!("{}\t{}", entry.name, entry.culture.unwrap_or_default());
            }
        }
        Command::Show { variant } => {
            for (text, message) in source.load_data(&variant).await? {
                println!("{}\t{}\t{}\t{}", message.id, text, message.target, message.comments);
            }
        }
        Command::Ensure { variant } => match source.is_valid_source(&variant).await? {
            SourceCheck::Existing(id) => println!("{variant}: exists (id {id})"),
            SourceCheck::Created(id) => println!("{variant}: created (id {id})"),
            SourceCheck::Rejected(reason) => println!("{variant}: rejected ({reason})"),
        },
        Command::Add {
            source: text,
            target,
            comments,
            catalogue,
            user,
        } => {
            let id = source
                .add(&text, &target, &comments, &pick(catalogue), user)
                .await?;
            info!(id, "added");
        }
        Command::Update {
            source: text,
            target,
            comments,
            catalogue,
        } => {
            source
                .update(&text, &target, &comments, &pick(catalogue))
                .await?;
        }
        Command::Delete {
            source: text,
            catalogue,
        } => {
            source.delete(&text, &pick(catalogue)).await?;
        }
        Command::Queue {
            catalogue,
            messages,
        } => {
            for message in messages {
                source.append(message);
            }
            let inserted = source.save(&pick(catalogue)).await?;
            println!("{inserted} message(s) stored");
        }
        Command::Export { variant, out } => {
            let export = source.export(&variant).await?;
            let json = serde_json::to_string_pretty(&export)?;
            match out {
                Some(path) => tokio::fs::write(&path, json)
                    .await
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => println!("{json}"),
            }
        }
        Command::Invalidate { catalogue } => {
            let removed = source.invalidate(&pick(catalogue)).await?;
            println!("{}", if removed { "removed" } else { "not cached" });
        }
        Command::ExampleConfig => {}
    }
    Ok(())
}
