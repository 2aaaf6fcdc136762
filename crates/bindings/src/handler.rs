//! The command-invocation contract and its built-in implementations.
//!
//! Script commands run through an external engine process: the session
//! context goes in as JSON on stdin and in [`CONTEXT_ENV_VAR`], search paths
//! in `RIBBON_SEARCH_PATHS` (and `PYTHONPATH` for Python).

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
    ribbon_common::{SessionContext, context::CONTEXT_ENV_VAR},
    ribbon_config::EngineConfig,
    ribbon_extensions::ScriptLanguage,
    serde::{Deserialize, Serialize},
    tokio::{io::AsyncWriteExt, process::Command},
    tracing::{debug, warn},
};

use crate::module::{HandlerSpec, HandlerTarget};

pub const SEARCH_PATHS_ENV: &str = "RIBBON_SEARCH_PATHS";
pub const COMMAND_ID_ENV: &str = "RIBBON_COMMAND_ID";
pub const LOG_FILE_ENV: &str = "RIBBON_LOG_FILE";
pub const CONFIG_MODE_ENV: &str = "RIBBON_CONFIG_MODE";

/// Inputs for one invocation.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub context: SessionContext,
    /// Extra arguments appended after the command's own options.
    pub arguments: Vec<String>,
}

impl Invocation {
    pub fn new(context: SessionContext) -> Self {
        Self {
            context,
            arguments: Vec::new(),
        }
    }
}

/// What an invocation produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutcome {
    pub fn success() -> Self {
        Self::default()
    }
}

/// A bound command the host can invoke.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Unique id of the bound command.
    fn name(&self) -> &str;

    async fn execute(&self, invocation: &Invocation) -> Result<ExecutionOutcome>;

    /// Whether [`CommandHandler::configure`] does anything.
    fn has_configure(&self) -> bool {
        false
    }

    /// Secondary "configure" entry point.
    async fn configure(&self, _invocation: &Invocation) -> Result<ExecutionOutcome> {
        bail!("command '{}' has no configure entry point", self.name())
    }
}

/// Request handed to the host for commands it runs itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRequest {
    pub unique_id: String,
    pub assembly: Option<String>,
    pub command_class: Option<String>,
    pub path: Option<PathBuf>,
}

/// Host side of link, invoke and content commands.
#[async_trait]
pub trait HostInvoker: Send + Sync {
    async fn invoke(&self, request: &HostRequest) -> Result<ExecutionOutcome>;
}

/// Invoker for hosts that cannot run host-side commands.
pub struct NoHostInvoker;

#[async_trait]
impl HostInvoker for NoHostInvoker {
    async fn invoke(&self, request: &HostRequest) -> Result<ExecutionOutcome> {
        bail!(
            "host cannot run '{}': no host invoker installed",
            request.unique_id
        )
    }
}

/// Opens a URL; swapped out in tests.
pub type UrlOpener = Arc<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

pub fn system_url_opener() -> UrlOpener {
    Arc::new(|url: &str| open::that_detached(url))
}

// ── Script handler ──────────────────────────────────────────────────────────

/// Runs a command script through its language engine.
pub struct ScriptHandler {
    unique_id: String,
    script: PathBuf,
    config_script: Option<PathBuf>,
    language: ScriptLanguage,
    engine: EngineConfig,
    search_paths: Vec<PathBuf>,
    options: Vec<String>,
    log_path: Option<PathBuf>,
    timeout: Duration,
}

impl ScriptHandler {
    pub fn new(spec: &HandlerSpec, engine: EngineConfig, timeout: Duration) -> Result<Self> {
        let HandlerTarget::Script { path, language } = &spec.target else {
            bail!("command '{}' is not a script command", spec.unique_id);
        };
        Ok(Self {
            unique_id: spec.unique_id.clone(),
            script: path.clone(),
            config_script: spec.config_script_path.clone(),
            language: *language,
            engine,
            search_paths: spec.search_paths.clone(),
            options: spec.options.clone(),
            log_path: spec.log_path.clone(),
            timeout,
        })
    }

    async fn run(&self, script: &Path, config_mode: bool, invocation: &Invocation) -> Result<ExecutionOutcome> {
        let context_json = invocation
            .context
            .to_env_value()
            .context("failed to serialize session context")?;
        let search_paths = std::env::join_paths(&self.search_paths)
            .context("search path contains an invalid character")?;

        debug!(
            command = %self.unique_id,
            engine = %self.engine.command,
            script = %script.display(),
            config_mode,
            "running command script"
        );

        let mut cmd = Command::new(&self.engine.command);
        cmd.args(&self.engine.args)
            .arg(script)
            .args(&self.options)
            .args(&invocation.arguments)
            .env(SEARCH_PATHS_ENV, &search_paths)
            .env(COMMAND_ID_ENV, &self.unique_id)
            .env(CONTEXT_ENV_VAR, &context_json)
            .env(CONFIG_MODE_ENV, if config_mode { "1" } else { "0" })
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if self.language == ScriptLanguage::Python {
            cmd.env("PYTHONPATH", &search_paths);
        }
        if let Some(log) = &self.log_path {
            cmd.env(LOG_FILE_ENV, log);
        }
        if let Some(dir) = script.parent() {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to start engine '{}'", self.engine.command))?;

        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(context_json.as_bytes()).await
            && e.kind() != std::io::ErrorKind::BrokenPipe
        {
            return Err(e.into());
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .with_context(|| {
                format!(
                    "command '{}' timed out after {:?}",
                    self.unique_id, self.timeout
                )
            })?
            .with_context(|| format!("command '{}' failed to complete", self.unique_id))?;

        let outcome = ExecutionOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        self.append_log(&outcome).await;

        if outcome.exit_code != 0 {
            bail!(
                "command '{}' exited with code {}: {}",
                self.unique_id,
                outcome.exit_code,
                outcome.stderr.trim()
            );
        }
        Ok(outcome)
    }

    async fn append_log(&self, outcome: &ExecutionOutcome) {
        let Some(path) = &self.log_path else {
            return;
        };
        let entry = format!(
            "== {} exit={}\n{}{}",
            self.unique_id, outcome.exit_code, outcome.stdout, outcome.stderr
        );
        let write = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(entry.as_bytes()).await
        };
        if let Err(e) = write.await {
            warn!(path = %path.display(), error = %e, "failed to write command log");
        }
    }
}

#[async_trait]
impl CommandHandler for ScriptHandler {
    fn name(&self) -> &str {
        &self.unique_id
    }

    async fn execute(&self, invocation: &Invocation) -> Result<ExecutionOutcome> {
        self.run(&self.script, false, invocation).await
    }

    fn has_configure(&self) -> bool {
        self.config_script.is_some()
    }

    async fn configure(&self, invocation: &Invocation) -> Result<ExecutionOutcome> {
        match &self.config_script {
            Some(config) => self.run(config, true, invocation).await,
            // Scripts may branch on RIBBON_CONFIG_MODE themselves.
            None => self.run(&self.script, true, invocation).await,
        }
    }
}

// ── URL handler ─────────────────────────────────────────────────────────────

pub struct UrlHandler {
    unique_id: String,
    url: String,
    opener: UrlOpener,
}

impl UrlHandler {
    pub fn new(unique_id: impl Into<String>, url: impl Into<String>, opener: UrlOpener) -> Self {
        Self {
            unique_id: unique_id.into(),
            url: url.into(),
            opener,
        }
    }
}

#[async_trait]
impl CommandHandler for UrlHandler {
    fn name(&self) -> &str {
        &self.unique_id
    }

    async fn execute(&self, _invocation: &Invocation) -> Result<ExecutionOutcome> {
        debug!(command = %self.unique_id, url = %self.url, "opening url");
        let opener = Arc::clone(&self.opener);
        let url = self.url.clone();
        tokio::task::spawn_blocking(move || opener(&url))
            .await
            .context("url opener panicked")?
            .with_context(|| format!("failed to open {}", self.url))?;
        Ok(ExecutionOutcome::success())
    }
}

// ── Host handler ────────────────────────────────────────────────────────────

/// Forwards link, invoke and content commands to the host.
pub struct HostHandler {
    request: HostRequest,
    invoker: Arc<dyn HostInvoker>,
}

impl HostHandler {
    pub fn new(request: HostRequest, invoker: Arc<dyn HostInvoker>) -> Self {
        Self { request, invoker }
    }
}

#[async_trait]
impl CommandHandler for HostHandler {
    fn name(&self) -> &str {
        &self.request.unique_id
    }

    async fn execute(&self, _invocation: &Invocation) -> Result<ExecutionOutcome> {
        self.invoker.invoke(&self.request).await
    }
}

/// Environment a script sees, for display and debugging.
pub fn script_environment(spec: &HandlerSpec) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert(COMMAND_ID_ENV.to_string(), spec.unique_id.clone());
    if let Ok(paths) = std::env::join_paths(&spec.search_paths) {
        env.insert(
            SEARCH_PATHS_ENV.to_string(),
            paths.to_string_lossy().into_owned(),
        );
    }
    if let Some(log) = &spec.log_path {
        env.insert(LOG_FILE_ENV.to_string(), log.display().to_string());
    }
    env
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        ribbon_extensions::CommandKind,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    fn script_spec(dir: &Path, script: &str, config: Option<&str>) -> HandlerSpec {
        let path = dir.join(script);
        std::fs::write(&path, "").unwrap();
        let config_script_path = config.map(|c| {
            let p = dir.join(c);
            std::fs::write(&p, "").unwrap();
            p
        });
        HandlerSpec {
            unique_id: "Ext-T-P-Go-pushbutton".into(),
            kind: CommandKind::Push,
            target: HandlerTarget::Script {
                path,
                language: ScriptLanguage::Ruby,
            },
            config_script_path,
            search_paths: vec![dir.to_path_buf()],
            options: Vec::new(),
            availability: None,
            log_path: Some(dir.join("logs/go.log")),
        }
    }

    /// `sh -c '<body>' <script>` stands in for a language engine.
    fn sh_engine(body: &str) -> EngineConfig {
        EngineConfig {
            command: "sh".into(),
            args: vec!["-c".into(), body.into()],
        }
    }

    #[tokio::test]
    async fn script_receives_context_and_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = script_spec(tmp.path(), "script.rb", None);
        let handler = ScriptHandler::new(
            &spec,
            sh_engine("echo \"$RIBBON_COMMAND_ID|$RIBBON_SEARCH_PATHS|$RIBBON_CONFIG_MODE\"; cat"),
            Duration::from_secs(5),
        )
        .unwrap();

        let ctx = SessionContext::default();
        ctx.set("units", serde_json::Value::from("metric"));
        let outcome = handler.execute(&Invocation::new(ctx.clone())).await.unwrap();
        let mut lines = outcome.stdout.lines();
        assert_eq!(
            lines.next().unwrap(),
            format!("Ext-T-P-Go-pushbutton|{}|0", tmp.path().display())
        );
        let echoed: serde_json::Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        assert_eq!(echoed["values"]["units"], "metric");
        assert_eq!(echoed["session_id"], ctx.session_id());

        let log = std::fs::read_to_string(tmp.path().join("logs/go.log")).unwrap();
        assert!(log.contains("exit=0"));
    }

    #[tokio::test]
    async fn configure_prefers_config_script() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = script_spec(tmp.path(), "script.rb", Some("config.rb"));
        let handler =
            ScriptHandler::new(&spec, sh_engine("echo \"$0 $RIBBON_CONFIG_MODE\""), Duration::from_secs(5))
                .unwrap();
        assert!(handler.has_configure());
        let outcome = handler
            .configure(&Invocation::default())
            .await
            .unwrap();
        assert!(outcome.stdout.trim().ends_with("config.rb 1"));
    }

    #[tokio::test]
    async fn failures_and_timeouts_are_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = script_spec(tmp.path(), "script.rb", None);

        let failing =
            ScriptHandler::new(&spec, sh_engine("echo boom >&2; exit 3"), Duration::from_secs(5))
                .unwrap();
        let err = failing.execute(&Invocation::default()).await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        let slow = ScriptHandler::new(&spec, sh_engine("sleep 5"), Duration::from_millis(100))
            .unwrap();
        let err = slow.execute(&Invocation::default()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn url_handler_uses_opener() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let opener: UrlOpener = Arc::new(move |url: &str| {
            assert_eq!(url, "https://example.com");
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let handler = UrlHandler::new("help", "https://example.com", opener);
        handler.execute(&Invocation::default()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!handler.has_configure());
        assert!(handler.configure(&Invocation::default()).await.is_err());
    }

    #[tokio::test]
    async fn host_handler_without_invoker_fails() {
        let handler = HostHandler::new(
            HostRequest {
                unique_id: "link".into(),
                assembly: Some("Tools.dll".into()),
                command_class: Some("Tools.Run".into()),
                path: None,
            },
            Arc::new(NoHostInvoker),
        );
        assert!(handler.execute(&Invocation::default()).await.is_err());
    }
}
