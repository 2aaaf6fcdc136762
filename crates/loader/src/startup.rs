use std::time::Duration;

use {
    anyhow::{Context, Result},
    ribbon_bindings::{
        ExecutionOutcome, HandlerSpec, HandlerTarget, Invocation,
        handler::{CommandHandler, ScriptHandler},
    },
    ribbon_common::SessionContext,
    ribbon_config::RibbonConfig,
    ribbon_extensions::{CommandKind, Extension, ScriptLanguage, parse::clean_id_part},
};

/// Run the extension's startup script, if it has one.
pub async fn run_startup(
    extension: &Extension,
    config: &RibbonConfig,
    context: &SessionContext,
) -> Result<Option<ExecutionOutcome>> {
    let Some(script) = &extension.startup_script else {
        return Ok(None);
    };
    let language = ScriptLanguage::from_path(script)
        .with_context(|| format!("unknown startup script type: {}", script.display()))?;
    let engine = config
        .engine_for(language.engine_key())
        .with_context(|| format!("no engine configured for {} scripts", language.engine_key()))?;

    let mut search_paths = vec![extension.directory.clone()];
    search_paths.extend(extension.library_paths.iter().cloned());
    let spec = HandlerSpec {
        unique_id: format!("{}-startup", clean_id_part(&extension.name)),
        kind: CommandKind::NoGui,
        target: HandlerTarget::Script {
            path: script.clone(),
            language,
        },
        config_script_path: None,
        search_paths,
        options: Vec::new(),
        availability: None,
        log_path: None,
    };
    let handler = ScriptHandler::new(
        &spec,
        engine,
        Duration::from_secs(config.bindings.handler_timeout_secs),
    )?;
    let outcome = handler.execute(&Invocation::new(context.clone())).await?;
    Ok(Some(outcome))
}
