use std::path::Path;

use console::style;

use crate::errors::Result;
use crate::template;

use super::ValidateArgs;

pub fn handle_validate(args: ValidateArgs) -> Result<()> {
    let template = template::parse_file(Path::new(&args.path))?;
    println!(
        "{} {} ({} request(s), severity {})",
        style("Valid:").green().bold(),
        args.path,
        template.requests.len(),
        template.info.severity
    );
    Ok(())
}
