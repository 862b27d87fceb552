use std::{env, process};

use anyhow::Context;

use config::ExperimentConfig;
use continual::data::MetadataTable;
use continual::Experiment;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <config.yaml> <metadata.csv>", args[0]);
        process::exit(1);
    }

    if let Err(e) = run(&args[1], &args[2]) {
        log::error!("{e:#}");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(config_path: &str, metadata_path: &str) -> anyhow::Result<()> {
    let config = ExperimentConfig::load(config_path)
        .with_context(|| format!("loading config '{config_path}'"))?;
    let table = MetadataTable::load(metadata_path)
        .with_context(|| format!("loading metadata '{metadata_path}'"))?;

    let experiment = Experiment::new(config, table);
    let report = experiment.run().context("experiment failed")?;

    println!(
        "done: avg accuracy {:.4}, backward transfer {:.4}, report at {}",
        report.average_accuracy,
        report.backward_transfer,
        experiment.report_path().display()
    );
    Ok(())
}
