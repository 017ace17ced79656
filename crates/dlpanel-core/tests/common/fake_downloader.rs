//! Shell stand-in for aria2c, driven by the locator path.
//!
//! `/ok/<name>` prints progress readouts and writes the file, `/fail/<name>`
//! exits 3 with an error on stderr, `/exists/<name>` reports the file as
//! already present, `/hang/<name>` writes partial files and its pid, then
//! sleeps in a child process until killed. `/jumpy/<name>` prints readouts
//! that go out of range and backwards before finishing. Every invocation
//! appends its locator to `invocations.log` in the fixture directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dlpanel_core::catalog::{CatalogItem, ItemSource, StaticCatalog};
use dlpanel_core::config::PanelConfig;
use dlpanel_core::{Engine, JobKind, JobStatus, TransferSpec};

const SCRIPT: &str = r#"#!/bin/sh
dir=""
out=""
url=""
while [ $# -gt 0 ]; do
  case "$1" in
    -d) dir="$2"; shift 2 ;;
    -o) out="$2"; shift 2 ;;
    *) url="$1"; shift ;;
  esac
done
dest="$dir/$out"
echo "$url" >> "$FIXTURE/invocations.log"
case "$url" in
  */fail/*)
    echo "Exception: [AbstractCommand.cc:351] errorCode=3 Resource not found" >&2
    exit 3
    ;;
  */exists/*)
    echo "05/14 10:02:11 [NOTICE] GID#2089b05ecca3d829 - Download has already completed: $dest"
    exit 13
    ;;
  */jumpy/*)
    for readout in '4.0MiB/10MiB(40%)' '15MiB/10MiB(150%)' '3.0MiB/10MiB(30%)' '6.0MiB/10MiB(60%)'; do
      printf '[#a1b2c3 %s CN:4 DL:1.0MiB ETA:9s]\n' "$readout"
      sleep 0.3
    done
    printf '[#a1b2c3 10MiB/10MiB(100%%) CN:4 DL:1.0MiB]\n'
    printf 'data' > "$dest"
    ;;
  */hang/*)
    echo $$ > "$dir/hang.pid"
    printf 'partial' > "$dest"
    printf 'resume' > "$dest.aria2"
    printf '[#a1b2c3 1.0MiB/10MiB(10%%) CN:4 DL:2.0MiB ETA:5s]\n'
    sleep 30 &
    wait
    ;;
  *)
    printf '[#a1b2c3 0B/4.0MiB(0%%) CN:1 DL:0B]\r'
    printf '[#a1b2c3 2.0MiB/4.0MiB(50%%) CN:4 DL:1.5MiB ETA:2s]\r'
    printf '[#a1b2c3 4.0MiB/4.0MiB(100%%) CN:4 DL:2.0MiB]\n'
    echo "Download Results:"
    printf 'data' > "$dest"
    ;;
esac
"#;

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: PanelConfig,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-aria2c.sh");
        std::fs::write(&script, SCRIPT.replace("$FIXTURE", &dir.path().display().to_string()))
            .unwrap();

        let mut config = PanelConfig::default();
        config.models_root = dir.path().join("models");
        config.default_destination = config.models_root.clone();
        config.scripts_dir = dir.path().join("scripts");
        config.stop_grace_ms = 2_000;
        config.settle_ms = 100;
        config.downloader.program = "sh".to_string();
        config.downloader.base_args = vec![script.display().to_string()];
        Self { dir, config }
    }

    pub fn models(&self) -> PathBuf {
        self.config.models_root.clone()
    }

    /// Catalog item with one spec per `(mode, filename)` pair.
    pub fn item(&self, id: &str, files: &[(&str, &str)]) -> CatalogItem {
        let specs = files
            .iter()
            .map(|(mode, name)| {
                TransferSpec::new(
                    &format!("https://models.example.test/{mode}/{name}"),
                    self.models().join("checkpoints"),
                    None,
                )
                .unwrap()
            })
            .collect();
        CatalogItem {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            requires_token: false,
            source: ItemSource::Specs(specs),
        }
    }

    pub fn engine(&self, items: Vec<CatalogItem>) -> Arc<Engine> {
        Arc::new(Engine::with_catalog(
            self.config.clone(),
            Arc::new(StaticCatalog::new(items)),
        ))
    }

    /// Locators the fake downloader was invoked with, in order.
    pub fn invocations(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("invocations.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn hang_pid(&self) -> Option<i32> {
        let path = self.models().join("checkpoints").join("hang.pid");
        std::fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    /// Pid written by a tool script that runs `echo $$ > "$PIDFILE"`.
    pub fn tool_pid(&self) -> Option<i32> {
        std::fs::read_to_string(self.tool_pid_path()).ok()?.trim().parse().ok()
    }

    pub fn tool_pid_path(&self) -> PathBuf {
        self.dir.path().join("tool.pid")
    }

    /// Write `<tool>_setup.sh`. `$PIDFILE` in `body` is replaced with [`tool_pid_path`](Self::tool_pid_path).
    pub fn write_tool_script(&self, tool: &str, body: &str) -> PathBuf {
        let dir = self.config.tool_scripts_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{tool}_setup.sh"));
        let body = body.replace("$PIDFILE", &self.tool_pid_path().display().to_string());
        std::fs::write(&path, body).unwrap();
        make_executable(&path);
        path
    }
}

fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

/// Poll `kind` until `done` accepts its status or `timeout` passes.
pub async fn wait_for(
    engine: &Engine,
    kind: JobKind,
    timeout: Duration,
    done: impl Fn(&JobStatus) -> bool,
) -> JobStatus {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let status = engine.status(kind);
        if done(&status) || tokio::time::Instant::now() >= deadline {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Every distinct status seen while polling `kind` every 10 ms until it is terminal.
pub async fn record_until_terminal(engine: &Engine, kind: JobKind, timeout: Duration) -> Vec<JobStatus> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut seen: Vec<JobStatus> = Vec::new();
    loop {
        let status = engine.status(kind);
        let terminal = status.state.is_terminal();
        if seen.last() != Some(&status) {
            seen.push(status);
        }
        if terminal || tokio::time::Instant::now() >= deadline {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
