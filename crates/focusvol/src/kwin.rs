use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use focusvol_core::audio::ProcessId;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const BUS_NAME: &str = "org.focusvol.Focus";
const OBJECT_PATH: &str = "/org/focusvol/Focus";
const PLUGIN_NAME: &str = "focusvol-focus";
const LOAD_ATTEMPTS: u32 = 5;

#[zbus::proxy(
    interface = "org.kde.kwin.Scripting",
    default_service = "org.kde.KWin",
    default_path = "/Scripting",
    gen_blocking = false
)]
trait Scripting {
    #[zbus(name = "loadScript")]
    fn load_script(&self, file_path: &str, plugin_name: &str) -> zbus::Result<i32>;

    #[zbus(name = "unloadScript")]
    fn unload_script(&self, plugin_name: &str) -> zbus::Result<bool>;

    #[zbus(name = "start")]
    fn start(&self) -> zbus::Result<()>;
}

/// Receives the pid of every newly activated window.
struct FocusSink {
    tx: watch::Sender<Option<ProcessId>>,
}

#[zbus::interface(name = "org.focusvol.Focus")]
impl FocusSink {
    fn activated(&self, pid: i32) {
        let pid = window_pid(pid);
        debug!("focus moved to pid {pid:?}");
        self.tx.send_replace(pid);
    }
}

/// KWin reports 0 for windows it cannot attribute to a process.
fn window_pid(raw: i32) -> Option<ProcessId> {
    u32::try_from(raw).ok().filter(|&p| p > 0).map(ProcessId)
}

fn script_source() -> String {
    format!(
        r#"function report(window) {{
    if (!window) return;
    callDBus("{BUS_NAME}", "{OBJECT_PATH}", "{BUS_NAME}", "Activated", window.pid || 0);
}}
workspace.windowActivated.connect(report);
report(workspace.activeWindow);
"#
    )
}

fn script_file() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map_or_else(std::env::temp_dir, PathBuf::from)
        .join(format!("{PLUGIN_NAME}.js"))
}

/// A focus script running inside KWin.
///
/// Holds the bus connection that serves [`FocusSink`], so focus updates keep
/// flowing for as long as the value lives. [`unload`](Self::unload) removes
/// the script from KWin and deletes its file.
struct KwinScript {
    scripting: ScriptingProxy<'static>,
    file: PathBuf,
}

impl KwinScript {
    async fn load(conn: &zbus::Connection, file: PathBuf) -> Result<Self> {
        let scripting = ScriptingProxy::new(conn).await?;
        // A previous instance may have died with its script still registered.
        let _ = scripting.unload_script(PLUGIN_NAME).await;

        let path = file.to_str().context("script path is not UTF-8")?;
        let id = scripting.load_script(path, PLUGIN_NAME).await?;
        scripting.start().await?;
        debug!("KWin script {PLUGIN_NAME} running as #{id}");

        Ok(KwinScript { scripting, file })
    }

    async fn unload(self) {
        match self.scripting.unload_script(PLUGIN_NAME).await {
            Ok(_) => debug!("unloaded KWin script {PLUGIN_NAME}"),
            Err(e) => debug!("KWin script unload failed: {e}"),
        }
        let _ = std::fs::remove_file(&self.file);
    }
}

/// Serve the focus sink on the session bus and start the script in KWin.
async fn attach(tx: watch::Sender<Option<ProcessId>>) -> Result<KwinScript> {
    // The script reports the current window as soon as it starts.
    let conn = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, FocusSink { tx })?
        .build()
        .await
        .context("session bus")?;

    let file = script_file();
    std::fs::write(&file, script_source())
        .with_context(|| format!("writing {}", file.display()))?;

    // KWin may still be starting when we are launched at login.
    let mut attempt = 1;
    loop {
        match KwinScript::load(&conn, file.clone()).await {
            Ok(script) => return Ok(script),
            Err(e) if attempt < LOAD_ATTEMPTS => {
                debug!("KWin script load attempt {attempt} failed: {e:#}");
                tokio::time::sleep(Duration::from_millis(500) * attempt).await;
                attempt += 1;
            }
            Err(e) => {
                let _ = std::fs::remove_file(&file);
                return Err(e.context(format!("loading KWin script after {attempt} attempts")));
            }
        }
    }
}

/// Publish the focused window's pid into `tx` until `cancel` fires.
///
/// Without KWin the channel stays `None` and hotkeys have nothing to act on.
pub async fn track_focus(tx: watch::Sender<Option<ProcessId>>, cancel: CancellationToken) {
    let script = match attach(tx).await {
        Ok(script) => script,
        Err(e) => {
            warn!("focus tracking unavailable: {e:#}");
            cancel.cancelled().await;
            return;
        }
    };

    info!("tracking the focused window through KWin");
    cancel.cancelled().await;
    script.unload().await;
}
