use std::path::Path;

use console::style;

use crate::controller::Controller;
use crate::errors::Result;

use super::{ListArgs, SearchArgs};

pub fn handle_list(args: ListArgs) -> Result<()> {
    let controller = Controller::new();
    for path in &args.poc {
        controller.load_poc(Path::new(path))?;
    }
    if let Some(dir) = &args.poc_dir {
        controller.load_pocs_from_dir(Path::new(dir))?;
    }

    let registry = controller.registry();
    let names = registry.list();
    if names.is_empty() {
        println!("No POC templates loaded.");
        return Ok(());
    }

    println!("{} template(s):\n", names.len());
    for name in names {
        print_entry(&registry, &name);
    }
    Ok(())
}

pub fn handle_search(args: SearchArgs) -> Result<()> {
    let controller = Controller::new();
    if let Some(dir) = &args.poc_dir {
        controller.load_pocs_from_dir(Path::new(dir))?;
    }

    let registry = controller.registry();
    let matches = registry.search(&args.query);
    if matches.is_empty() {
        println!("No templates match '{}'.", args.query);
        return Ok(());
    }

    println!("{} match(es) for '{}':\n", matches.len(), args.query);
    for name in matches {
        print_entry(&registry, &name);
    }
    Ok(())
}

fn print_entry(registry: &crate::registry::Registry, name: &str) {
    if let Some(handle) = registry.get(name) {
        let info = handle.info();
        let severity = match info.severity.rank() {
            0 | 1 => style(info.severity.as_str()).red(),
            2 => style(info.severity.as_str()).yellow(),
            _ => style(info.severity.as_str()).dim(),
        };
        println!(
            "  {} [{}] {}",
            style(name).cyan().bold(),
            severity,
            info.name
        );
        if !info.description.is_empty() {
            println!("      {}", style(&info.description).dim());
        }
    }
}
