//! Command channel between a user-facing surface and the running session.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{HatewatchError, Result};
use crate::session::SessionController;

/// A request from the control surface, e.g. `{"action": "toggle"}`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlCommand {
    Toggle,
    GetStatus,
    ClearStorage,
}

/// `{"active": bool}` for toggle and status, `{"cleared": true}` after a reset.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(untagged)]
pub enum ControlResponse {
    Status { active: bool },
    Cleared { cleared: bool },
}

type Request = (ControlCommand, oneshot::Sender<Result<ControlResponse>>);

/// Cloneable handle for sending commands to the control server.
#[derive(Clone)]
pub struct ControlClient {
    sender: mpsc::Sender<Request>,
}

impl ControlClient {
    pub async fn request(&self, command: ControlCommand) -> Result<ControlResponse> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send((command, reply))
            .await
            .map_err(|_| HatewatchError::ControlChannel("no session is listening".to_string()))?;
        response.await.map_err(|_| {
            HatewatchError::ControlChannel("session went away before answering".to_string())
        })?
    }

    pub async fn toggle(&self) -> Result<bool> {
        match self.request(ControlCommand::Toggle).await? {
            ControlResponse::Status { active } => Ok(active),
            other => Err(unexpected(other)),
        }
    }

    pub async fn status(&self) -> Result<bool> {
        match self.request(ControlCommand::GetStatus).await? {
            ControlResponse::Status { active } => Ok(active),
            other => Err(unexpected(other)),
        }
    }

    pub async fn clear_storage(&self) -> Result<()> {
        match self.request(ControlCommand::ClearStorage).await? {
            ControlResponse::Cleared { .. } => Ok(()),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: ControlResponse) -> HatewatchError {
    HatewatchError::ControlChannel(format!("unexpected response: {:?}", response))
}

/// Serves control commands against a [`SessionController`] it owns.
pub struct ControlServer;

impl ControlServer {
    /// Spawns the server task. It runs until every client is dropped and
    /// then hands the controller back.
    pub fn spawn(controller: SessionController) -> (ControlClient, JoinHandle<SessionController>) {
        let (sender, receiver) = mpsc::channel(16);
        let task = tokio::spawn(Self::serve(controller, receiver, None));
        (ControlClient { sender }, task)
    }

    /// Like [`spawn`](Self::spawn), but also waits for the host to become
    /// ready and then optionally starts detection. Commands are answered
    /// while the wait is pending.
    pub fn spawn_when_ready(
        controller: SessionController,
        autostart: bool,
    ) -> (ControlClient, JoinHandle<SessionController>) {
        let (sender, receiver) = mpsc::channel(16);
        let task = tokio::spawn(Self::serve(controller, receiver, Some(autostart)));
        (ControlClient { sender }, task)
    }

    /// `startup` is `Some(autostart)` when readiness should be awaited.
    async fn serve(
        mut controller: SessionController,
        mut receiver: mpsc::Receiver<Request>,
        startup: Option<bool>,
    ) -> SessionController {
        let ready = controller.wait_until_ready();
        tokio::pin!(ready);
        let mut waiting = startup.is_some();

        loop {
            tokio::select! {
                conversation = &mut ready, if waiting => {
                    waiting = false;
                    info!(target: "control", conversation = %conversation, "Host ready");
                    if startup == Some(true) {
                        if let Err(e) = controller.start() {
                            warn!(target: "control", "Failed to start detection: {}", e);
                        }
                    }
                }
                request = receiver.recv() => {
                    let Some((command, reply)) = request else {
                        break;
                    };
                    debug!(target: "control", ?command, "control command");
                    let response = Self::handle(&mut controller, command);
                    if let Err(e) = &response {
                        warn!(target: "control", "Command {:?} failed: {}", command, e);
                    }
                    // the caller may have given up waiting
                    let _ = reply.send(response);
                }
            }
        }
        controller
    }

    fn handle(controller: &mut SessionController, command: ControlCommand) -> Result<ControlResponse> {
        match command {
            ControlCommand::Toggle => Ok(ControlResponse::Status {
                active: controller.toggle()?,
            }),
            ControlCommand::GetStatus => Ok(ControlResponse::Status {
                active: controller.is_active(),
            }),
            ControlCommand::ClearStorage => {
                controller.clear_storage()?;
                Ok(ControlResponse::Cleared { cleared: true })
            }
        }
    }
}
