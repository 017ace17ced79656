//! `dlpanel stop <class>` / `dlpanel status <class>` – talk to a running dlpanel over its control socket.

use anyhow::{bail, Result};
use dlpanel_core::control::{default_control_socket_path, ControlCommand};
use dlpanel_core::JobKind;

use crate::cli::control_socket;

async fn send(command: ControlCommand) -> Result<()> {
    let path = default_control_socket_path()?;
    if !path.exists() {
        bail!("no running dlpanel job (no control socket at {})", path.display());
    }
    let reply = control_socket::send_command(&path, command).await?;
    println!("{reply}");
    Ok(())
}

pub async fn run_stop(class: JobKind) -> Result<()> {
    send(ControlCommand::Stop(class)).await
}

pub async fn run_status(class: JobKind) -> Result<()> {
    send(ControlCommand::Status(class)).await
}
