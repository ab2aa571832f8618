use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::tracker::FunctionTracker;

#[derive(Default)]
pub struct ServerState {
    repo_root: Option<PathBuf>,
    tracker: FunctionTracker,
}

impl ServerState {
    fn repo_root_from_params(&mut self, params: &serde_json::Value) -> PathBuf {
        let repo_root = params
            .get("repoPath")
            .or_else(|| params.get("root"))
            .and_then(|v| v.as_str())
            .map(PathBuf::from)
            .or_else(|| self.repo_root.clone())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        self.repo_root = Some(repo_root.clone());
        repo_root
    }

    fn tool_list(&self, id: serde_json::Value) -> serde_json::Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "tools": [
                    {
                        "name": "scan_codebase",
                        "description": "Walk a repository and rebuild the function index: every Python/JavaScript/TypeScript function definition (signature, file, line) and every call site referencing it. Run this before detect_changes, and again after large edits.",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "repoPath": { "type": "string", "description": "Absolute path to the repo root" }
                            }
                        }
                    },
                    {
                        "name": "detect_changes",
                        "description": "Compare an edited function definition against the indexed one. When its parameter list changed, returns a rewrite suggestion for every recorded call site (old_code -> new_code). Scans the repo first if nothing is indexed yet.",
                        "inputSchema": {
                            "type": "object",
                            "properties": {
                                "repoPath": { "type": "string", "description": "Absolute path to the repo root" },
                                "file_path": { "type": "string", "description": "File the definition lives in (repo-relative or absolute under repoPath); its extension selects the language" },
                                "code": { "type": "string", "description": "The updated function definition, or the whole file when all_functions is true" },
                                "all_functions": { "type": "boolean", "description": "Optional: check every function header in `code` instead of only the first (default false)" }
                            },
                            "required": ["file_path", "code"]
                        }
                    }
                ]
            }
        })
    }

    fn tool_call(&mut self, id: serde_json::Value, params: &serde_json::Value) -> serde_json::Value {
        let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
        let args = params.get("arguments").cloned().unwrap_or(json!({}));

        let ok = |text: String| {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "content": [{"type":"text","text": text }], "isError": false }
            })
        };

        let err = |msg: String| {
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "content": [{"type":"text","text": msg }], "isError": true }
            })
        };

        match name {
            "scan_codebase" => {
                let repo_root = self.repo_root_from_params(&args);
                match self.tracker.scan(&repo_root) {
                    Ok(report) => match to_text(&report) {
                        Ok(text) => ok(text),
                        Err(e) => err(format!("encode failed: {e}")),
                    },
                    Err(e) => err(format!("scan failed: {e}")),
                }
            }
            "detect_changes" => {
                let repo_root = self.repo_root_from_params(&args);
                let Some(file_path) = args.get("file_path").and_then(|v| v.as_str()) else {
                    return err("Missing file_path".to_string());
                };
                let Some(code) = args.get("code").and_then(|v| v.as_str()) else {
                    return err("Missing code".to_string());
                };
                let all_functions = args.get("all_functions").and_then(|v| v.as_bool()).unwrap_or(false);

                if self.tracker.root().as_deref() != Some(repo_root.as_path()) {
                    debug!(root = %repo_root.display(), "root not indexed yet, scanning first");
                    if let Err(e) = self.tracker.scan(&repo_root) {
                        return err(format!("scan failed: {e}"));
                    }
                }

                let report = if all_functions {
                    self.tracker.detect_file_changes(file_path, code)
                } else {
                    self.tracker.detect_change(file_path, code)
                };
                match to_text(&report) {
                    Ok(text) => ok(text),
                    Err(e) => err(format!("encode failed: {e}")),
                }
            }
            _ => err(format!("Tool not found: {name}")),
        }
    }
}

fn to_text<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

pub fn run_stdio_server() -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    let mut state = ServerState::default();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { continue };
        if line.trim().is_empty() {
            continue;
        }

        let msg: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "dropping non-JSON line");
                continue;
            }
        };

        // JSON-RPC notifications have no "id" field; they get no reply.
        let has_id = msg.get("id").is_some();
        if !has_id {
            continue;
        }

        let id = msg.get("id").cloned().unwrap_or(json!(null));
        let method = msg.get("method").and_then(|m| m.as_str()).unwrap_or("");
        debug!(method, "request");

        let reply = match method {
            "initialize" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": msg.get("params").and_then(|p| p.get("protocolVersion")).cloned().unwrap_or(json!("2024-11-05")),
                    "capabilities": { "tools": { "listChanged": false } },
                    "serverInfo": { "name": "sigdrift", "version": env!("CARGO_PKG_VERSION") }
                }
            }),
            "ping" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {}
            }),
            "tools/list" => state.tool_list(id),
            "tools/call" => {
                let params = msg.get("params").cloned().unwrap_or(json!({}));
                state.tool_call(id, &params)
            }
            // No resources or prompts are exposed.
            "resources/list" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "resources": [] }
            }),
            "prompts/list" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": { "prompts": [] }
            }),
            _ => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("Method not found: {method}") }
            }),
        };

        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }

    Ok(())
}
