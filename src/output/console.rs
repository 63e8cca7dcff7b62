use console::style;

use crate::errors::Result;

use super::{Output, ResultSink};

/// Prints one styled line per result to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

impl ResultSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn handle(&self, output: &Output) -> Result<()> {
        if output.success {
            println!(
                "{} {}",
                style("[+]").green().bold(),
                style(&output.message).green()
            );
            for (key, value) in &output.data {
                println!("    {}: {}", style(key).cyan(), value.canonical_string());
            }
        } else {
            println!("{} {}", style("[-]").red().bold(), output.message);
        }
        Ok(())
    }
}
