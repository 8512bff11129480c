use anyhow::Context;
use clap::{Parser, Subcommand};
use formwatch::config::ConfigLoader;
use formwatch::replay::{load_fixture, replay};
use formwatch_core::IgnorePolicy;
use formwatch_core::dom::PageLocation;
use formwatch_core::network::classify_url;
use formwatch_core::provider::classify_location;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "formwatch", version, about = "Form submission capture engine")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (overrides $FORMWATCH_CONFIG and the default search path)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a page fixture and print every delivered message as a JSON line
    Replay {
        /// Fixture file: page snapshot plus event timeline
        fixture: PathBuf,
    },
    /// Show how a URL is classified and whether captures from it are ignored
    Classify {
        /// Page URL
        url: String,
        /// Form action or request URL, if different from the page
        #[arg(long)]
        action: Option<String>,
    },
    /// Print the effective configuration as YAML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries replay output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ConfigLoader::resolve(args.config.as_deref())
        .await
        .context("loading configuration")?;

    match args.command {
        Command::Replay { fixture } => {
            let loaded = load_fixture(&fixture)
                .await
                .with_context(|| format!("loading fixture {}", fixture.display()))?;
            for message in replay(&loaded, config)? {
                println!("{}", serde_json::to_string(&message)?);
            }
        }
        Command::Classify { url, action } => {
            let action = action.unwrap_or_else(|| url.clone());
            let page = classify_location(&PageLocation::parse(&url));
            println!("page provider: {}", page.as_str());
            match classify_url(&action) {
                Some(endpoint) => println!("endpoint: {}", endpoint.as_str()),
                None => println!("endpoint: none"),
            }
            let policy = IgnorePolicy::from_config(&config.ignore);
            match policy.matching_pattern(&url, &action) {
                Some(pattern) => println!("ignored: yes (matches {:?})", pattern),
                None => println!("ignored: no"),
            }
        }
        Command::Config => print!("{}", serde_yaml::to_string(&config)?),
    }

    Ok(())
}
