mod config;
mod deployment;
mod error;
mod http;
mod launch;
mod launch_config;
mod list;
mod operation;
mod platform;
mod region;
mod snapshot;
mod stop;
#[cfg(test)]
mod testing;

use clap::error::ErrorKind;
use clap::{ArgAction, Parser, Subcommand};
use error::{command_failure_message, launch_failure_message};
use http::HttpConnector;
use launch::{CreateArgs, CreateSimArgs, SimulatedPlayerArgs};
use region::RegionResolver;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Launches, stops and lists cloud deployments, optionally paired with a
/// simulated player deployment. Regions: 'EU', 'US', 'AP' and 'CN'.
#[derive(Parser)]
#[command(name = "deployment-launcher", version, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts a cloud deployment, with optionally a simulated player deployment.
    /// The deployments can be started in different regions.
    Create {
        project: String,
        assembly: String,
        runtime_version: String,
        main_name: String,
        main_launch_json: PathBuf,
        main_snapshot: PathBuf,
        main_region: String,
        #[arg(requires_all = ["sim_launch_json", "sim_region", "sim_player_count"])]
        sim_name: Option<String>,
        sim_launch_json: Option<PathBuf>,
        sim_region: Option<String>,
        sim_player_count: Option<u32>,
    },
    /// Starts a simulated player deployment. Can be started in a different
    /// region from the target deployment.
    #[command(name = "createsim")]
    CreateSim {
        project: String,
        assembly: String,
        runtime_version: String,
        target_name: String,
        sim_name: String,
        sim_launch_json: PathBuf,
        sim_region: String,
        sim_player_count: u32,
        #[arg(action = ArgAction::Set, value_parser = parse_bool)]
        auto_connect: bool,
    },
    /// Stops the specified deployment within the project. Without a
    /// deployment id, every active deployment started by this launcher in
    /// the project is stopped.
    Stop {
        project: String,
        region: String,
        deployment_id: Option<String>,
    },
    /// Lists all active deployments within the project that were started
    /// by this launcher.
    List { project: String, region: String },
}

impl Commands {
    fn regions(&self) -> Vec<&str> {
        match self {
            Commands::Create {
                main_region,
                sim_region,
                ..
            } => std::iter::once(main_region.as_str())
                .chain(sim_region.as_deref())
                .collect(),
            Commands::CreateSim { sim_region, .. } => vec![sim_region.as_str()],
            Commands::Stop { region, .. } | Commands::List { region, .. } => vec![region.as_str()],
        }
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(format!("Cannot parse the auto-connect flag '{}'", value)),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("deployment_launcher=info")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            let _ = err.print();
            return ExitCode::FAILURE;
        }
    };

    run(cli.command)
}

fn run(command: Commands) -> ExitCode {
    let config = match config::load_launcher_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{:#}", err);
            return ExitCode::FAILURE;
        }
    };

    let resolver = match RegionResolver::new(&config, command.regions()) {
        Ok(resolver) => resolver,
        Err(err) => {
            eprintln!("{:#}", err);
            return ExitCode::FAILURE;
        }
    };
    let connector = HttpConnector::new(&config, &resolver);

    let result = match command {
        Commands::Create {
            project,
            assembly,
            runtime_version,
            main_name,
            main_launch_json,
            main_snapshot,
            main_region,
            sim_name,
            sim_launch_json,
            sim_region,
            sim_player_count,
        } => {
            let simulated = match (sim_name, sim_launch_json, sim_region, sim_player_count) {
                (Some(name), Some(launch_json), Some(region), Some(player_count)) => {
                    Some(SimulatedPlayerArgs {
                        name,
                        launch_json,
                        region,
                        player_count,
                    })
                }
                _ => None,
            };
            let args = CreateArgs {
                project,
                assembly,
                runtime_version,
                main_name,
                main_launch_json,
                main_snapshot,
                main_region,
                simulated,
            };
            launch::create(&connector, &resolver, &config, &args)
                .map_err(|err| launch_failure_message(&err, &args.project, &args.assembly))
        }
        Commands::CreateSim {
            project,
            assembly,
            runtime_version,
            target_name,
            sim_name,
            sim_launch_json,
            sim_region,
            sim_player_count,
            auto_connect,
        } => {
            let args = CreateSimArgs {
                project,
                assembly,
                runtime_version,
                target_name,
                simulated: SimulatedPlayerArgs {
                    name: sim_name,
                    launch_json: sim_launch_json,
                    region: sim_region,
                    player_count: sim_player_count,
                },
                auto_connect,
            };
            launch::create_sim(&connector, &config, &args)
                .map_err(|err| launch_failure_message(&err, &args.project, &args.assembly))
        }
        Commands::Stop {
            project,
            region,
            deployment_id,
        } => stop::stop(&connector, &config, &project, &region, deployment_id.as_deref())
            .map_err(|err| command_failure_message(&err)),
        Commands::List { project, region } => {
            list::list(&connector, &config, &project, &region)
                .map_err(|err| command_failure_message(&err))
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            println!("{}", message);
            ExitCode::FAILURE
        }
    }
}
