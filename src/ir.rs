//! Rendered-document intermediate representation.
//!
//! Rendering a source document (markdown, notebooks, whatever) into this IR
//! is a renderer's job, not ours; the engine only consumes the result. The
//! IR is a flat, ordered list of nodes, a few of which are flagged as
//! executable and carry the unit attributes on themselves. It deserializes
//! from the JSON a renderer emits.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A rendered document: ordered nodes, some executable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Document {
    /// Parse a renderer's JSON output.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// One rendered node. Non-executable nodes are prose and are ignored by
/// extraction; executable nodes become units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Node {
    /// Whether this node is marked as runnable
    pub executable: bool,
    /// The node's text content
    pub text: String,
    /// Operation type attribute ("file", "command", "edit")
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent: Option<String>,
    pub privileged: bool,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_when: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_renderer_output() {
        let json = r#"{
            "nodes": [
                { "text": "Install the service as follows." },
                {
                    "executable": true,
                    "type": "command",
                    "text": "apt-get install -y nginx",
                    "privileged": true
                },
                {
                    "executable": true,
                    "type": "file",
                    "path": "/etc/nginx/nginx.conf",
                    "permission": "r",
                    "text": "worker_processes 1;",
                    "failedWhen": "exitCode != 0"
                }
            ]
        }"#;

        let doc = Document::from_json(json).unwrap();
        assert_eq!(doc.nodes.len(), 3);
        assert!(!doc.nodes[0].executable);
        assert!(doc.nodes[1].privileged);
        assert_eq!(doc.nodes[2].kind.as_deref(), Some("file"));
        assert_eq!(doc.nodes[2].failed_when.as_deref(), Some("exitCode != 0"));
    }

    #[test]
    fn empty_document_parses() {
        let doc = Document::from_json("{}").unwrap();
        assert!(doc.nodes.is_empty());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Document::from_json("not json").is_err());
    }
}
