use anyhow::Result;
use aptaforge::cli::{Cli, Commands};
use aptaforge::report::build_overview;
use aptaforge::{AptaPlexParser, Experiment, ExperimentConfiguration};
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;
use std::time::Instant;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging only if not already set
    if !tracing::dispatcher::has_been_set() {
        let log_level = if cli.verbose { "debug" } else { "info" };
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
            .init();
    }

    match cli.command {
        Commands::Run { config, output } => {
            let configuration = ExperimentConfiguration::load(config.as_deref())?;

            println!("🧬 AptaForge - SELEX Sequencing Data Parser");
            println!("===========================================");
            println!("Experiment: {}", configuration.experiment.name);
            println!("Cycles: {}", configuration.cycles.len());
            println!("Input files: {}\n", configuration.parser.forward_files.len());

            let experiment = Arc::new(Experiment::from_configuration(&configuration)?);
            let parser = AptaPlexParser::new(configuration.clone(), Arc::clone(&experiment));

            let started = Instant::now();
            parser.run()?;
            let elapsed = started.elapsed();

            let progress = parser.progress().snapshot();
            print_summary(&experiment, &progress, elapsed.as_secs_f64());

            if let Some(path) = output {
                let overview = build_overview(&experiment, progress, &configuration);
                let json = serde_json::to_string_pretty(&overview)?;
                std::fs::write(&path, json)?;
                println!("   📄 Overview written to {}", path.display());
            }

            println!("\n✨ Parsing completed successfully! ✨");
        }
        Commands::Check { config } => {
            let configuration = ExperimentConfiguration::load(config.as_deref())?;
            println!(
                "{} configuration for experiment '{}' is valid",
                "✅".green(),
                configuration.experiment.name
            );
        }
    }

    Ok(())
}

fn print_summary(
    experiment: &Experiment,
    progress: &aptaforge::parsing::ProgressSnapshot,
    elapsed_seconds: f64,
) {
    let pass_rate = if progress.processed_reads > 0 {
        progress.accepted_reads as f64 / progress.processed_reads as f64 * 100.0
    } else {
        0.0
    };

    println!("\n🎉 Parsing Complete!");
    println!("====================");
    println!("📊 Import Summary:");
    println!(
        "   Processed reads:   {}",
        progress.processed_reads.to_string().bright_white()
    );
    println!(
        "   Accepted reads:    {} ({:.1}%)",
        progress.accepted_reads.to_string().bright_green(),
        pass_rate
    );
    println!(
        "   Pool size:         {}",
        experiment.pool().len().to_string().bright_white()
    );

    if progress.error_total() > 0 {
        println!("\n❌ Rejected Reads:");
        println!("   Contig assembly:   {}", progress.contig_assembly_fails);
        println!("   Invalid alphabet:  {}", progress.invalid_alphabet);
        println!("   5' primer:         {}", progress.unmatchable_primer5);
        println!("   3' primer:         {}", progress.unmatchable_primer3);
        println!("   Invalid cycle:     {}", progress.invalid_cycle);
        println!("   Primer overlaps:   {}", progress.primer_overlaps);
    }

    println!("\n🧪 Selection Cycles:");
    for cycle in experiment.cycles().iter().flatten() {
        println!(
            "   {} (round {}): {} reads, {} unique",
            cycle.name().bright_cyan(),
            cycle.round(),
            cycle.size(),
            cycle.unique_size()
        );
    }

    println!("\n   Processing time: {elapsed_seconds:.2} seconds");
}
