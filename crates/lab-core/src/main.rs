use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use lab_core::{ExperimentId, ExperimentStatus, Lab, LabConfig, LabError, LabState, StoreChange};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("research-lab")
        .version(lab_core::VERSION)
        .about("Research lab experiment simulator")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to a TOML configuration file"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Create experiments from topics and run them to completion")
                .arg(
                    Arg::new("topic")
                        .long("topic")
                        .required(true)
                        .action(ArgAction::Append)
                        .help("Research topic (repeatable)"),
                )
                .arg(
                    Arg::new("tick-ms")
                        .long("tick-ms")
                        .value_parser(value_parser!(u64))
                        .help("Override the tick interval in milliseconds"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the final state as JSON"),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective configuration as TOML"));

    let matches = cli.get_matches();
    init_tracing(matches.get_flag("log-json"));

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => LabConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => LabConfig::default(),
    };

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let mut config = config;
            if let Some(tick_ms) = args.get_one::<u64>("tick-ms") {
                config = config.with_tick_interval(Duration::from_millis(*tick_ms));
            }
            if let Some(seed) = args.get_one::<u64>("seed") {
                config = config.with_seed(*seed);
            }
            let config = config.validated()?;
            let topics: Vec<String> = args
                .get_many::<String>("topic")
                .map(|values| values.cloned().collect())
                .unwrap_or_default();

            let state = simulate(config, &topics).await?;

            if args.get_flag("json") {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                print_table(&state);
            }
        }
        Some(("config", _)) => {
            print!("{}", config.to_toml_string()?);
        }
        _ => {
            println!("No subcommand given; try `research-lab simulate --topic <TOPIC>`");
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Submit every topic, then keep as many experiments running as the
/// concurrency limit allows until all have completed.
async fn simulate(config: LabConfig, topics: &[String]) -> anyhow::Result<LabState> {
    let lab = Lab::new(config);

    let mut progress_rx = lab.subscribe();
    let reporter = tokio::spawn(async move {
        while let Ok(event) = progress_rx.recv().await {
            if let StoreChange::ExperimentUpdated(id) = event.change {
                if let Some(exp) = event.state.experiment(id) {
                    tracing::info!(
                        experiment = %exp.name,
                        status = %exp.status,
                        progress = format_args!("{:.0}%", exp.progress),
                        cpu = format_args!("{:.0}%", exp.resource_usage.cpu),
                        "update"
                    );
                }
            }
        }
    });

    let mut queue: VecDeque<ExperimentId> = VecDeque::new();
    for topic in topics {
        let submission = lab.submit_topic(topic).await?;
        queue.push_back(submission.experiment);
    }

    loop {
        while let Some(&id) = queue.front() {
            match lab.start(id) {
                Ok(()) => {
                    queue.pop_front();
                }
                Err(LabError::AtCapacity { limit }) => {
                    tracing::info!(limit, queued = queue.len(), "at capacity, waiting");
                    break;
                }
                Err(err) => return Err(err.into()),
            }
        }

        let running = lab.snapshot().running_count();
        if queue.is_empty() && running == 0 {
            break;
        }
        lab.wait_for(|state| state.running_count() < running).await;
    }

    reporter.abort();
    Ok(lab.snapshot())
}

fn print_table(state: &LabState) {
    println!("{:<28} {:<10} {:>8} {:>10}", "ID", "STATUS", "PROGRESS", "ELAPSED");
    for exp in &state.experiments {
        let elapsed = exp
            .end_time
            .and_then(|end| (end - exp.start_time).to_std().ok())
            .map_or_else(|| "-".to_string(), |d| format!("{:.1}s", d.as_secs_f64()));
        println!(
            "{:<28} {:<10} {:>7.0}% {:>10}",
            exp.id, exp.status, exp.progress, elapsed
        );
        println!("  {}", exp.name);
    }
    let completed = state
        .experiments_with_status(ExperimentStatus::Completed)
        .count();
    println!();
    println!("{completed}/{} experiments completed", state.experiments.len());
}
