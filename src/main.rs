use qpadm_runner::estimator::{EstimatorGateway, RscriptEstimator, RuntimeState};
use qpadm_runner::parse::{load_config, load_named_lists};
use qpadm_runner::process::{
    display_named_lists, display_results_table, export_chart_file, AdmixError, AnalysisSession, Args,
    Pipeline, RequestDraft, RunOutcome,
};
use qpadm_runner::progress::{display_status_box, StatusBox};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use std::path::Path;
use std::process;

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    Builder::new().filter_level(level).parse_default_env().init();

    let config = load_config(Path::new(&args.config))
        .with_context(|| format!("reading config file {}", args.config))?;
    let left_lists = load_named_lists(Path::new(&args.left_lists))
        .with_context(|| format!("reading left lists from {}", args.left_lists))?;
    let right_lists = load_named_lists(Path::new(&args.right_lists))
        .with_context(|| format!("reading right lists from {}", args.right_lists))?;

    if args.list_populations {
        display_named_lists("Sources (Left)", &left_lists);
        display_named_lists("Outgroups (Right)", &right_lists);
        return Ok(());
    }

    let output_dir = Path::new(&args.output_dir);

    let dataset = match config.dataset() {
        Some(dataset) => dataset,
        None => {
            eprintln!("{}", AdmixError::ConfigMissing.to_string().red());
            process::exit(1);
        }
    };

    let index_file = dataset.index_file();
    display_status_box(StatusBox {
        title: "Configuration".to_string(),
        stats: vec![
            ("Dataset prefix".to_string(), dataset.prefix().to_string()),
            (
                "Index file".to_string(),
                index_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "not found (.fam or .ind)".to_string()),
            ),
            ("Left lists".to_string(), left_lists.len().to_string()),
            ("Right lists".to_string(), right_lists.len().to_string()),
        ],
    });

    if args.export_index {
        match dataset.export_index(output_dir)? {
            Some(path) => println!("{}", format!("Index file copied to {}", path.display()).green()),
            None => println!("{}", "No index file (.fam or .ind) found.".yellow()),
        }
        if args.target.is_none() {
            return Ok(());
        }
    }

    let left = args.left_source()?.resolve(&left_lists)?;
    let right = args.right_source()?.resolve(&right_lists)?;
    let target = args.target.clone().unwrap_or_default();

    let runtime = RuntimeState::initialize(config.runtime_context(args.rscript.as_deref()));
    if let RuntimeState::FailedInit(reason) = &runtime {
        eprintln!("{}", format!("Failed to load R libraries on startup: {}", reason).red());
    }

    println!("{}", format!("Target: {}", target).cyan());
    println!("{}", format!("Sources (Left): {}", left).cyan());
    println!("{}", format!("Outgroups (Right): {}", right).cyan());

    let draft = RequestDraft {
        target,
        left,
        right,
        dataset: Some(dataset),
    };

    let gateway = EstimatorGateway::new(&runtime, RscriptEstimator);
    let mut session = AnalysisSession::new(Pipeline::new(gateway));

    match session.run(draft) {
        RunOutcome::Feasible(report) => {
            println!("{}", "Analysis complete!".green().bold());
            println!("\n{}\n{}", report.chart.title.bold(), report.chart.stats_block);
            display_results_table(&report);

            // CSV first, then the chart
            if let Some(csv_path) = session.export_last(output_dir)? {
                println!("{}", format!("Full result written to {}", csv_path.display()).green());
            }
            let chart_path = export_chart_file(output_dir, &report)?;
            println!("{}", format!("Chart written to {}", chart_path.display()).green());
        }
        RunOutcome::Infeasible => {
            println!("{}", "Analysis finished: no feasible model was found.".yellow());
        }
        RunOutcome::Failed(e) => {
            if e.is_critical() {
                eprintln!("{}", "A critical error occurred during execution.".red().bold());
                error!("{:?}", e);
            } else {
                eprintln!("{}", format!("ERROR: {}", e).red());
            }
            process::exit(1);
        }
    }

    info!("Done");
    Ok(())
}
