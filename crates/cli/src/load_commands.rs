use {
    anyhow::{Result, bail},
    ribbon_config::RibbonConfig,
    ribbon_loader::{ExtensionStatus, LoadSummary, Session},
    ribbon_ui::HeadlessUi,
    tracing::warn,
};

pub async fn load(config: RibbonConfig, json: bool) -> Result<()> {
    let session = Session::new(config, HeadlessUi::new());
    let summary = session.reload().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
        let rendered = session.with_ui(|m| m.host().render()).await;
        if !rendered.is_empty() {
            println!("\n{rendered}");
        }
    }
    Ok(())
}

pub async fn run(
    config: RibbonConfig,
    unique_id: &str,
    configure: bool,
    args: Vec<String>,
) -> Result<()> {
    let session = Session::new(config, HeadlessUi::new());
    let summary = session.reload().await?;
    if summary.failed().count() > 0 {
        warn!(failed = summary.failed().count(), "some extensions failed to load");
    }
    if !session.is_available(unique_id).await {
        warn!(command = %unique_id, "command is not available in the current host state");
    }
    let outcome = if configure {
        session.configure(unique_id, args).await?
    } else {
        session.invoke(unique_id, args).await?
    };
    print!("{}", outcome.stdout);
    eprint!("{}", outcome.stderr);
    if outcome.exit_code != 0 {
        bail!("command exited with code {}", outcome.exit_code);
    }
    Ok(())
}

#[cfg(feature = "file-watcher")]
pub async fn watch(config: RibbonConfig) -> Result<()> {
    use {
        ribbon_loader::watcher::{ExtensionWatchEvent, ExtensionWatcher},
        std::sync::Arc,
    };

    let roots = config.extensions.search_paths.clone();
    let session = Arc::new(Session::new(config, HeadlessUi::new()));
    print_summary(&session.reload().await?);

    let (_watcher, mut events) =
        ExtensionWatcher::start(&roots, std::time::Duration::from_millis(500))?;
    println!("Watching {} search root(s); Ctrl-C to stop.", roots.len());

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(ExtensionWatchEvent::Changed { paths }) = event else {
                    break;
                };
                tracing::info!(changed = paths.len(), "extension files changed, reloading");
                let session = Arc::clone(&session);
                tokio::spawn(async move {
                    match session.reload().await {
                        Ok(summary) if summary.superseded => {},
                        Ok(summary) => print_summary(&summary),
                        Err(e) => warn!(error = %e, "reload failed"),
                    }
                });
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn print_summary(summary: &LoadSummary) {
    if !summary.libraries.is_empty() {
        println!("libraries: {}", summary.libraries.join(", "));
    }
    for report in &summary.extensions {
        match &report.status {
            ExtensionStatus::Loaded(loaded) => {
                let source = if loaded.from_cache { "cache" } else { "parsed" };
                println!(
                    "  ok       {} ({} commands, {source}, bindings {:?})",
                    report.name, loaded.commands, loaded.origin
                );
                for id in &loaded.dropped {
                    println!("             dropped {id}");
                }
                for failure in &loaded.ui.failures {
                    println!("             ui skipped {}: {}", failure.unique_id, failure.reason);
                }
            },
            ExtensionStatus::Disabled => println!("  disabled {}", report.name),
            ExtensionStatus::Failed { stage, error } => {
                println!("  failed   {} at {stage}: {error}", report.name);
            },
            ExtensionStatus::Abandoned => println!("  skipped  {} (superseded)", report.name),
        }
    }
    if !summary.removed_elements.is_empty() {
        println!("removed {} stale UI element(s)", summary.removed_elements.len());
    }
}
