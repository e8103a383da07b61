//! JSON-lines bridge between a host process and the detection engine.
//!
//! Each input line is one request; each request gets exactly one output
//! line. Document edits are applied directly to the shared document, so the
//! engine observes them exactly as it would observe the host's own edits.

use anyhow::Result;
use hatewatch_core::{
    AnnotationManager, ControlClient, ControlCommand, DocumentHandle, ElementSpec, NodeId,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeRequest {
    Insert {
        /// Defaults to the document body
        parent: Option<NodeId>,
        element: ElementSpec,
    },
    Remove {
        node: NodeId,
    },
    SetAttribute {
        node: NodeId,
        name: String,
        value: String,
    },
    RemoveAttribute {
        node: NodeId,
        name: String,
    },
    SetText {
        node: NodeId,
        text: String,
    },
    Navigate {
        location: String,
    },
    Command {
        command: ControlCommand,
    },
    Snapshot,
}

pub struct Bridge {
    document: DocumentHandle,
    client: ControlClient,
    annotator: AnnotationManager,
}

impl Bridge {
    pub fn new(document: DocumentHandle, client: ControlClient, annotator: AnnotationManager) -> Self {
        Self {
            document,
            client,
            annotator,
        }
    }

    /// Answers one request line. Failures become `{"error": ...}`.
    pub async fn handle_line(&self, line: &str) -> Value {
        let request: BridgeRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(e) => return json!({ "error": format!("invalid request: {}", e) }),
        };
        debug!(?request, "bridge request");

        match self.handle(request).await {
            Ok(value) => value,
            Err(e) => json!({ "error": e.to_string() }),
        }
    }

    async fn handle(&self, request: BridgeRequest) -> Result<Value> {
        let ok = json!({ "ok": true });
        match request {
            BridgeRequest::Insert { parent, element } => {
                let node = self.document.mutate(|doc| {
                    let parent = parent.unwrap_or_else(|| doc.body());
                    doc.insert(parent, &element)
                })?;
                Ok(json!({ "node": node }))
            }
            BridgeRequest::Remove { node } => {
                self.document.mutate(|doc| doc.remove(node))?;
                Ok(ok)
            }
            BridgeRequest::SetAttribute { node, name, value } => {
                self.document
                    .mutate(|doc| doc.set_attribute(node, &name, &value))?;
                Ok(ok)
            }
            BridgeRequest::RemoveAttribute { node, name } => {
                self.document.mutate(|doc| doc.remove_attribute(node, &name))?;
                Ok(ok)
            }
            BridgeRequest::SetText { node, text } => {
                self.document.mutate(|doc| doc.set_text(node, &text))?;
                Ok(ok)
            }
            BridgeRequest::Navigate { location } => {
                self.document.mutate(|doc| doc.navigate(&location));
                Ok(ok)
            }
            BridgeRequest::Command { command } => {
                let response = self.client.request(command).await?;
                Ok(serde_json::to_value(response)?)
            }
            BridgeRequest::Snapshot => {
                let active = self.client.status().await?;
                let annotations = self.document.read(|doc| self.annotator.annotations(doc));
                Ok(json!({ "active": active, "annotations": annotations }))
            }
        }
    }

    /// Serves requests until the input ends.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let response = self.handle_line(&line).await;
            writer.write_all(response.to_string().as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hatewatch_core::{
        Classification, Classifier, Config, ControlServer, SessionController, Verdict,
    };
    use std::sync::Arc;

    struct FlagEverything;

    #[async_trait]
    impl Classifier for FlagEverything {
        async fn classify(&self, _text: &str) -> Classification {
            Classification::Verdict(Verdict::flagged(Some("Say it kindly".to_string()), None))
        }
    }

    fn bridge_with(autostart: Option<bool>) -> Bridge {
        let config = Config::new();
        let document = DocumentHandle::default();
        let controller =
            SessionController::new(&config, document.clone(), Arc::new(FlagEverything));
        let (client, _task) = match autostart {
            Some(autostart) => ControlServer::spawn_when_ready(controller, autostart),
            None => ControlServer::spawn(controller),
        };
        let annotator = AnnotationManager::new(Arc::new(config.profile), &config.default_suggestion);
        Bridge::new(document, client, annotator)
    }

    fn bridge() -> Bridge {
        bridge_with(None)
    }

    const MESSAGE: &str = r#"{"type":"insert","element":{"tag":"div","attributes":{"data-id":"m1"},
        "children":[{"tag":"span","attributes":{"class":"selectable-text"},"text":"you are awful"}]}}"#;

    #[tokio::test]
    async fn test_malformed_line_is_an_error_response() {
        let bridge = bridge();
        let response = bridge.handle_line("{not json").await;
        assert!(response["error"].as_str().unwrap().starts_with("invalid request"));

        let response = bridge.handle_line(r#"{"type":"remove","node":999}"#).await;
        assert!(response["error"].is_string());
    }

    #[tokio::test]
    async fn test_insert_returns_node_id() {
        let bridge = bridge();
        let response = bridge.handle_line(MESSAGE).await;
        let node: NodeId = serde_json::from_value(response["node"].clone()).unwrap();
        assert!(bridge.document.read(|doc| doc.is_connected(node)));

        let remove = json!({ "type": "remove", "node": node });
        assert_eq!(bridge.handle_line(&remove.to_string()).await, json!({ "ok": true }));
        assert!(!bridge.document.read(|doc| doc.contains(node)));
    }

    #[tokio::test]
    async fn test_commands_forward_to_session() {
        let bridge = bridge();
        let response = bridge
            .handle_line(r#"{"type":"command","command":{"action":"toggle"}}"#)
            .await;
        assert_eq!(response, json!({ "active": true }));

        let response = bridge
            .handle_line(r#"{"type":"command","command":{"action":"clearStorage"}}"#)
            .await;
        assert_eq!(response, json!({ "cleared": true }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_flagged_message_shows_in_snapshot() {
        let bridge = bridge();
        bridge
            .handle_line(r#"{"type":"command","command":{"action":"toggle"}}"#)
            .await;
        let inserted = bridge.handle_line(MESSAGE).await;
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        let snapshot = bridge.handle_line(r#"{"type":"snapshot"}"#).await;
        assert_eq!(snapshot["active"], json!(true));
        assert_eq!(snapshot["annotations"][0]["node"], inserted["node"]);
        assert_eq!(
            snapshot["annotations"][0]["suggestion"],
            json!("Suggestion: Say it kindly")
        );
    }

    #[tokio::test]
    async fn test_run_answers_one_line_per_request() {
        let bridge = bridge();
        let input = b"{\"type\":\"navigate\",\"location\":\"#/c/1\"}\n\n{\"type\":\"bogus\"}\n";
        let mut output = Vec::new();
        bridge.run(&input[..], &mut output).await.unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"ok":true}"#);
        assert!(lines[1].contains("error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_before_host_ready_are_answered() {
        let bridge = bridge_with(Some(true));
        let input = concat!(
            r#"{"type":"command","command":{"action":"getStatus"}}"#,
            "\n",
            r#"{"type":"snapshot"}"#,
            "\n",
            r#"{"type":"insert","element":{"tag":"div","attributes":{"id":"main"}}}"#,
            "\n",
        );
        let mut output = Vec::new();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            bridge.run(input.as_bytes(), &mut output),
        )
        .await
        .expect("bridge stalled before the host was ready")
        .unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], json!({ "active": false }));
        assert_eq!(lines[1]["active"], json!(false));
        assert!(lines[2]["node"].is_u64());

        // the ready marker is in place, so autostart kicks in
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        let snapshot = bridge.handle_line(r#"{"type":"snapshot"}"#).await;
        assert_eq!(snapshot["active"], json!(true));
    }
}
