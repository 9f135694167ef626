use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use instr_sim::{run_simulator, SimConfigFile, SimulatorConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("instr-sim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Instruction lifecycle simulator")
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .help("Log filter, overrides RUST_LOG (e.g. debug, instr_core=trace)"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run a seeded session against the in-memory host")
                .arg(
                    Arg::new("instructions")
                        .long("instructions")
                        .default_value("200")
                        .value_parser(value_parser!(u64))
                        .help("Number of instructions to render"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("failure-rate")
                        .long("failure-rate")
                        .default_value("0.1")
                        .value_parser(value_parser!(f64))
                        .help("Probability of injecting a host failure per instruction"),
                )
                .arg(
                    Arg::new("external-edits")
                        .long("external-edits")
                        .default_value("6")
                        .value_parser(value_parser!(usize))
                        .help("External elements added while the change detector runs"),
                )
                .arg(
                    Arg::new("snapshot")
                        .long("snapshot")
                        .value_parser(value_parser!(PathBuf))
                        .help("Write the session snapshot to this file before clearing"),
                )
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("report")
                .about("Print the effective configuration")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                )
                .arg(config_arg()),
        )
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("TOML file with [engine] and [detector] tables")
}

fn init_tracing(level: Option<&String>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config_file(args: &ArgMatches) -> anyhow::Result<SimConfigFile> {
    match args.get_one::<PathBuf>("config") {
        Some(path) => SimConfigFile::load(path),
        None => Ok(SimConfigFile::default()),
    }
}

fn arg<T: Clone + Send + Sync + 'static>(args: &ArgMatches, name: &str) -> anyhow::Result<T> {
    args.get_one::<T>(name)
        .cloned()
        .with_context(|| format!("missing --{name}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_one::<String>("log-level"));

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let config = SimulatorConfig {
                seed: arg(args, "seed")?,
                instructions: arg(args, "instructions")?,
                failure_rate: arg(args, "failure-rate")?,
                external_edits: arg(args, "external-edits")?,
                snapshot: args.get_one::<PathBuf>("snapshot").cloned(),
                ..SimulatorConfig::default()
            }
            .with_file(load_config_file(args)?);

            println!("Running instruction simulator...");
            println!("Instructions: {}", config.instructions);
            println!("Seed: {}", config.seed);
            println!("Failure Rate: {}", config.failure_rate);
            println!();

            let report = run_simulator(config).await?;
            println!("{}", report.generate_text());

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("report", args)) => {
            let file = load_config_file(args)?;
            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&file)?);
            } else {
                println!("=== Effective Configuration ===\n");
                print!("{}", toml::to_string_pretty(&file)?);
            }
        }
        _ => {
            cli().print_help()?;
            println!();
        }
    }

    Ok(())
}
