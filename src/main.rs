use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use taylor_diag::taylor::{self, RunOptions, TaylorRun};
use taylor_diag::vertical::InterpMethod;
use taylor_diag::{DiagConfig, RunReport, Season, Weighting, visualize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Subcommand)]
enum Command {
    /// Compute and print the statistics tables without drawing diagrams
    Stats {
        /// Path to the JSON run configuration
        config: PathBuf,

        /// Print the tables as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Parser)]
#[command(name = "taylor-diag")]
#[command(version)]
#[command(about = "Taylor diagrams of climate model climatologies against a reference")]
#[command(arg_required_else_help = true)]
#[command(subcommand_precedence_over_arg = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the JSON run configuration (for the default render mode)
    config: Option<PathBuf>,

    /// Season to process (ANN, DJF, JJA, MAM, SON); repeatable, default all
    #[arg(long = "season", value_name = "SEASON", global = true)]
    seasons: Vec<Season>,

    /// Use uniform instead of cos(latitude) spatial weights
    #[arg(long, global = true)]
    unweighted: bool,

    /// Interpolate to pressure levels linearly in log-pressure
    #[arg(long, global = true)]
    log_interp: bool,

    /// Show the diagrams in an interactive window after writing them
    #[arg(long)]
    preview: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

fn main() {
    init_tracing();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);

        // Print the error chain for better context
        for cause in e.chain().skip(1) {
            eprintln!("  Caused by: {}", cause);
        }

        process::exit(1);
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "taylor_diag=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.no_color {
        colored::control::set_override(false);
    }

    let (config_path, stats_only, json) = match &args.command {
        Some(Command::Stats { config, json }) => (config.clone(), true, *json),
        None => (
            args.config
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Missing configuration file path"))?,
            false,
            false,
        ),
    };

    if !config_path.is_file() {
        return Err(anyhow::anyhow!(
            "Configuration file '{}' does not exist. Please provide the path to a JSON run configuration.",
            config_path.display()
        ));
    }

    let config = DiagConfig::from_file(&config_path)?;

    let options = RunOptions {
        seasons: if args.seasons.is_empty() {
            Season::ALL.to_vec()
        } else {
            args.seasons.clone()
        },
        weighting: if args.unweighted {
            Weighting::Uniform
        } else {
            config.weighting()
        },
        interp: if args.log_interp {
            InterpMethod::Log
        } else {
            InterpMethod::Linear
        },
        ..RunOptions::default()
    };

    let report = RunReport::new();
    let diagnostics = TaylorRun::new(&config, &report, options);

    if stats_only {
        let results = diagnostics
            .compute()
            .context("Failed to compute Taylor statistics")?;
        if json {
            // Warnings already went to stderr; keep stdout parseable.
            println!("{}", serde_json::to_string_pretty(&taylor::results_json(&results)?)?);
        } else {
            for result in &results {
                print!("{}", result.format_tables());
            }
            report.print_summary();
        }
        return Ok(());
    }

    let rendered = diagnostics
        .run()
        .context("Failed to produce Taylor diagrams")?;
    report.print_summary();

    if args.preview {
        println!("Navigation: ←/→ = previous/next season, Esc/q = quit");
        let diagrams: Vec<_> = rendered.iter().map(|r| r.results.diagram()).collect();
        visualize::show_diagrams(&diagrams)?;
    }

    Ok(())
}
