use std::path::Path;

use {
    anyhow::Result,
    ribbon_config::RibbonConfig,
    ribbon_extensions::{Component, parse_with_report},
};

pub fn tree(config: &RibbonConfig, path: &Path, json: bool) -> Result<()> {
    let mut report = parse_with_report(path)?;
    report.extension.dir_hash = ribbon_cache::dir_hash(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report.extension)?);
        return Ok(());
    }

    let ext = &report.extension;
    println!("{} [{}]", ext.name, ext.dir_hash);
    for tab in ext.tabs() {
        print_component(tab, 1, &config.host.locale);
    }
    for diagnostic in &report.diagnostics {
        eprintln!("warning: {diagnostic}");
    }
    Ok(())
}

fn print_component(component: &Component, depth: usize, locale: &str) {
    let indent = "  ".repeat(depth);
    let title = component.display_title(locale);
    match &component.command {
        Some(command) => {
            let context = command
                .availability
                .as_deref()
                .map(|c| format!(" <{c}>"))
                .unwrap_or_default();
            println!(
                "{indent}{title} ({}){context}  {}",
                component.kind.tag(),
                component.unique_id
            );
        },
        None => println!("{indent}{title} ({})", component.kind.tag()),
    }
    for child in &component.children {
        print_component(child, depth + 1, locale);
    }
}

pub fn hash(path: &Path) -> Result<()> {
    println!("{}", ribbon_cache::dir_hash(path)?);
    Ok(())
}
