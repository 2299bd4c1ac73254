//! `scalesync` command line tool.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use scalesync_protocol::{RecipeStub, TitleListFormat};
use scalesync_runner::{
    load_recipe, load_recipes, RunnerConfig, RunnerError, RunnerResult, ScaleClient,
    ScaleEmulator, ScaleModel,
};
use scalesync_session::SessionError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scalesync", version, about = "Synchronize recipes with a smart kitchen scale")]
struct Cli {
    /// Address of the scale's serial bridge (host:port)
    #[arg(long, global = true)]
    connect: Option<String>,

    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the recipes stored on the scale
    List,

    /// Add a recipe from a YAML file
    Add {
        /// Recipe file
        recipe: PathBuf,
    },

    /// Delete a recipe by its position in the list (starting at 1)
    Delete {
        /// Position as printed by `list`
        position: usize,
    },

    /// Run a scale emulator on a TCP port
    Emulate {
        /// Port to listen on
        #[arg(long, default_value_t = 4040)]
        port: u16,

        /// YAML file with the recipes the scale starts with
        #[arg(long)]
        recipes: Option<PathBuf>,

        /// Send the titles listing without a count
        #[arg(long)]
        bare: bool,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_recipes(recipes: &[RecipeStub]) {
    if recipes.is_empty() {
        println!("No recipes on the scale.");
        return;
    }
    for (i, stub) in recipes.iter().enumerate() {
        println!("{:>2}. {}", i + 1, stub.title);
    }
}

async fn run(cli: Cli) -> RunnerResult<()> {
    let mut config = match cli.config {
        Some(ref path) => RunnerConfig::load(path)?,
        None => RunnerConfig::default(),
    };
    if let Some(address) = cli.connect {
        config.address = address;
    }
    // Deletes are addressed by position, so every command starts from the scale's list.
    config.session.list_on_connect = true;

    match cli.command {
        Commands::List => {
            let client = ScaleClient::connect(&config).await?;
            print_recipes(&client.handle().current_recipe_list());
            client.close().await;
        }

        Commands::Add { recipe } => {
            let recipe = load_recipe(&recipe)?;
            recipe.validate().map_err(SessionError::from)?;

            let client = ScaleClient::connect(&config).await?;
            info!("Adding '{}' ({} steps)", recipe.title, recipe.steps.len());
            let result = client.handle().request_add(recipe).await;
            if result.is_ok() {
                print_recipes(&client.handle().current_recipe_list());
            }
            client.close().await;
            result?;
        }

        Commands::Delete { position } => {
            if position == 0 {
                return Err(RunnerError::InvalidArgument("positions start at 1".to_string()));
            }

            let client = ScaleClient::connect(&config).await?;
            let result = client.handle().request_delete(position - 1).await;
            if result.is_ok() {
                print_recipes(&client.handle().current_recipe_list());
            }
            client.close().await;
            result?;
        }

        Commands::Emulate {
            port,
            recipes,
            bare,
        } => {
            let recipes = match recipes {
                Some(ref path) => load_recipes(path)?,
                None => Vec::new(),
            };
            for recipe in &recipes {
                recipe.validate().map_err(SessionError::from)?;
            }
            let format = if bare {
                TitleListFormat::Bare
            } else {
                config.session.title_format
            };
            let mut emulator =
                ScaleEmulator::bind(&format!("0.0.0.0:{}", port), ScaleModel::new(recipes, format))
                    .await?;
            emulator.join().await;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    scalesync_metrics::describe_metrics();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
