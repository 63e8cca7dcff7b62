use std::path::Path;
use std::sync::Arc;

use console::style;
use futures::StreamExt;
use tracing::{error, info};

use crate::controller::{Controller, Mode};
use crate::errors::{PoxideError, Result};
use crate::expr::Value;
use crate::output::{ConsoleSink, JsonLinesSink};

use super::RunArgs;

pub async fn handle_run(args: RunArgs, quiet: bool) -> Result<()> {
    let mode: Mode = args.mode.parse()?;

    let mut controller = Controller::new();
    if !quiet {
        controller = controller.with_sink(Box::new(ConsoleSink::new()));
    }
    if let Some(path) = &args.output {
        controller = controller.with_sink(Box::new(JsonLinesSink::new(path)));
    }
    controller.initialize();

    for pair in &args.option {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            PoxideError::Config(format!("option '{pair}' is not in key=value form"))
        })?;
        controller.set_option(key, Value::Str(value.to_string()));
    }

    let mut pocs = Vec::new();
    for path in &args.poc {
        pocs.push(controller.load_poc(Path::new(path))?);
    }
    if let Some(dir) = &args.poc_dir {
        pocs.extend(controller.load_pocs_from_dir(Path::new(dir))?);
    }
    if pocs.is_empty() {
        return Err(PoxideError::Config(
            "no POC templates given (use --poc or --poc-dir)".to_string(),
        ));
    }

    let mut targets = args.target.clone();
    if let Some(path) = &args.targets_file {
        let text = std::fs::read_to_string(path)?;
        targets.extend(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string),
        );
    }
    if targets.is_empty() {
        return Err(PoxideError::Config(
            "no targets given (use --target or --targets-file)".to_string(),
        ));
    }

    info!(pocs = pocs.len(), targets = targets.len(), mode = %mode, "Starting scan");

    let controller = Arc::new(controller);
    let pairs: Vec<(String, String)> = pocs
        .iter()
        .flat_map(|poc| targets.iter().map(move |t| (poc.clone(), t.clone())))
        .collect();
    let total = pairs.len();

    let concurrency = args.threads.max(1);
    let hits = futures::stream::iter(pairs)
        .map(|(poc, target)| {
            let controller = Arc::clone(&controller);
            async move {
                match controller.execute_poc(&poc, &target, mode).await {
                    Ok(output) => output.success,
                    Err(e) => {
                        error!(poc = %poc, target = %target, error = %e, "Execution failed");
                        false
                    }
                }
            }
        })
        .buffer_unordered(concurrency)
        .filter(|hit| futures::future::ready(*hit))
        .count()
        .await;

    println!(
        "\n{} {} of {} checks matched",
        style("Done:").bold(),
        style(hits).green().bold(),
        total
    );

    controller.shutdown()?;
    Ok(())
}
