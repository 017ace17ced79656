//! Line protocol for controlling a foreground `dlpanel` process.
//!
//! While a job runs in the foreground, the CLI listens on a unix socket. A
//! second invocation (e.g. `dlpanel stop batch`) sends one line per command:
//! `stop <class>` or `status <class>`. Each command gets a single JSON line back.

use std::path::PathBuf;
use std::str::FromStr;

use crate::engine::Engine;
use crate::job::JobKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Stop(JobKind),
    Status(JobKind),
}

impl ControlCommand {
    pub fn to_line(self) -> String {
        match self {
            ControlCommand::Stop(kind) => format!("stop {kind}\n"),
            ControlCommand::Status(kind) => format!("status {kind}\n"),
        }
    }
}

impl FromStr for ControlCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or_else(|| "empty command".to_string())?;
        let kind: JobKind = parts
            .next()
            .ok_or_else(|| format!("{verb}: missing job class"))?
            .parse()?;
        if parts.next().is_some() {
            return Err(format!("{verb}: unexpected arguments"));
        }
        match verb {
            "stop" => Ok(ControlCommand::Stop(kind)),
            "status" => Ok(ControlCommand::Status(kind)),
            other => Err(format!("unknown command: {other}")),
        }
    }
}

/// Execute one protocol line against `engine` and return the JSON reply (no newline).
pub async fn handle_line(engine: &Engine, line: &str) -> String {
    let reply = match line.parse::<ControlCommand>() {
        Ok(ControlCommand::Stop(kind)) => serde_json::to_value(engine.stop(kind).await),
        Ok(ControlCommand::Status(kind)) => serde_json::to_value(engine.status(kind)),
        Err(e) => Ok(serde_json::json!({ "error": e })),
    };
    match reply {
        Ok(value) => value.to_string(),
        Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
    }
}

/// Default path for the control socket (XDG state dir).
pub fn default_control_socket_path() -> std::io::Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("dlpanel")?.get_state_home();
    Ok(dir.join("control.sock"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use crate::config::PanelConfig;
    use std::sync::Arc;

    #[test]
    fn parses_commands() {
        assert_eq!(
            "stop batch".parse::<ControlCommand>().unwrap(),
            ControlCommand::Stop(JobKind::Batch)
        );
        assert_eq!(
            "  status   tool ".parse::<ControlCommand>().unwrap(),
            ControlCommand::Status(JobKind::Tool)
        );
        assert!("pause 1".parse::<ControlCommand>().is_err());
        assert!("stop".parse::<ControlCommand>().is_err());
        assert!("stop batch now".parse::<ControlCommand>().is_err());
        assert_eq!(ControlCommand::Stop(JobKind::Single).to_line(), "stop single\n");
    }

    #[tokio::test]
    async fn replies_are_json() {
        let engine = Engine::with_catalog(PanelConfig::default(), Arc::new(StaticCatalog::default()));
        let status: serde_json::Value =
            serde_json::from_str(&handle_line(&engine, "status single").await).unwrap();
        assert_eq!(status["state"], "idle");

        let stop: serde_json::Value =
            serde_json::from_str(&handle_line(&engine, "stop single").await).unwrap();
        assert_eq!(stop["accepted"], true);
        assert_eq!(stop["was_running"], false);

        let err: serde_json::Value =
            serde_json::from_str(&handle_line(&engine, "bogus").await).unwrap();
        assert!(err["error"].as_str().unwrap().contains("missing job class"));
    }
}
