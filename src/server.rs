/*
 * Pictor - Sandboxed Filesystem & Image Generation Tool Server
 * File Path: src/server.rs
 * Responsibility: Line-delimited JSON-RPC loop between stdin and stdout.
 */

use crate::config::Config;
use crate::sandbox::AllowedRoots;
use crate::tools;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(json!({ "code": code, "message": message.into() })),
        }
    }
}

/// One request in, one response out, until stdin closes. stdout carries
/// nothing but protocol frames; diagnostics stay on stderr.
pub async fn run(config: Config, roots: AllowedRoots) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut reader = BufReader::new(stdin).lines();
    let mut writer = io::BufWriter::new(stdout);

    while let Some(line) = reader.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                write_response(&mut writer, &Response::err(Value::Null, -32700, e.to_string()))
                    .await?;
                continue;
            }
        };

        if config.runtime.debug {
            eprintln!("📨 {} (id {})", request.method, request.id);
        }

        match handle_request(&config, &roots, request).await {
            Some(response) => write_response(&mut writer, &response).await?,
            None => {} // Notifications get no reply.
        }
    }

    Ok(())
}

async fn write_response(
    writer: &mut io::BufWriter<io::Stdout>,
    response: &Response,
) -> anyhow::Result<()> {
    let mut frame = serde_json::to_string(response)?;
    frame.push('\n');
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn handle_request(
    config: &Config,
    roots: &AllowedRoots,
    request: Request,
) -> Option<Response> {
    if request.method.starts_with("notifications/") {
        return None;
    }

    let response = match request.method.as_str() {
        "initialize" => Response::ok(request.id, initialize_result()),
        "tools/list" => Response::ok(request.id, json!({ "tools": tools::tool_definitions() })),
        "tools/call" => {
            let Some(name) = request.params.get("name").and_then(Value::as_str) else {
                return Some(Response::err(request.id, -32602, "`name` is required"));
            };
            let arguments = request
                .params
                .get("arguments")
                .cloned()
                .unwrap_or_else(|| json!({}));

            let result = tools::dispatch_tool(name, &arguments, roots, config).await;
            if config.runtime.debug && result.is_error {
                eprintln!("⚠️ Tool `{}` failed: {}", name, result.output);
            }
            Response::ok(
                request.id,
                json!({
                    "content": [{ "type": "text", "text": result.output }],
                    "isError": result.is_error
                }),
            )
        }
        _ => Response::err(request.id, -32601, "method not found"),
    };

    Some(response)
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "serverInfo": {
            "name": "pictor",
            "version": env!("CARGO_PKG_VERSION")
        },
        "capabilities": {
            "tools": {}
        }
    })
}
