//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads or synthesizes the record set
//! - runs the analysis pipeline
//! - prints the text or JSON report and the charts

use std::path::Path;

use clap::Parser;

use crate::cli::{Command, FitArgs, SynthArgs};
use crate::domain::{DataSource, FilterConfig, FitConfig, StageOutcome};
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `tnmr` binary.
pub fn run() -> Result<(), AppError> {
    // `tnmr` and `tnmr --input x.json` behave like `tnmr fit ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Synth(args) => handle_synth(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = fit_config_from_args(&args)?;
    let (_session, output) = pipeline::run_fit(&config)?;

    if config.json {
        println!("{}", crate::report::to_json_report(&output, &config)?);
        return Ok(());
    }

    println!("{}", crate::report::format_run_summary(&output, &config));

    if config.plot {
        if let StageOutcome::Completed(fit) = &output.fit {
            println!("{}", crate::plot::render_recovery_plot(fit, config.plot_width, config.plot_height));
        }
        if let StageOutcome::Completed(sweep) = &output.ilt {
            println!("{}", crate::plot::render_ilt_plot(sweep, config.plot_width, config.plot_height));
        }
    }

    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    let records = crate::data::generate_sample(&args.synth.to_config())?;
    let json = serde_json::to_string_pretty(&crate::io::to_container_json(&records))?;
    match &args.output {
        Some(path) => write_text(path, &json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn write_text(path: &Path, text: &str) -> Result<(), AppError> {
    std::fs::write(path, text)
        .map_err(|e| AppError::input(format!("Failed to write {}: {e}", path.display())))?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

pub fn fit_config_from_args(args: &FitArgs) -> Result<FitConfig, AppError> {
    if args.max_generations == 0 {
        return Err(AppError::input("--max-generations must be > 0."));
    }
    if !(args.left.is_finite() && args.right.is_finite()) {
        return Err(AppError::input("Spectral pivots must be finite."));
    }

    let source = match &args.input {
        Some(path) => DataSource::Container(path.clone()),
        None => DataSource::Synthetic(args.synth.to_config()),
    };

    Ok(FitConfig {
        source,
        filter: FilterConfig {
            kind: args.filter,
            width: args.filter_width,
        },
        phase: args.phase,
        autophase_index: args.autophase,
        pivot: args.pivot,
        spectral_pivots: (args.left, args.right),
        model: args.model,
        normalize: args.normalize,
        seed: args.seed,
        max_generations: args.max_generations,
        ilt: !args.no_ilt,
        json: args.json,
        plot: args.plot && !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
    })
}

/// Rewrite argv so `tnmr` defaults to `tnmr fit`.
///
/// Rules:
/// - `tnmr`                         -> `tnmr fit`
/// - `tnmr --input x.json ...`      -> `tnmr fit --input x.json ...`
/// - `tnmr --help/--version/-h`     -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("fit".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "fit" | "synth");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "fit flags".
    if arg1.starts_with('-') {
        argv.insert(1, "fit".to_string());
        return argv;
    }

    argv
}
