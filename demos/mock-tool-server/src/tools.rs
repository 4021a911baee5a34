use serde_json::{Value, json};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Answer one JSON-RPC line; notifications and unparsable lines get no reply
pub fn handle_line(line: &str) -> Option<Value> {
    let request: Value = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed line");
            return None;
        }
    };

    let id = request.get("id").cloned()?;
    let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let result = match method {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "mock-tool-server", "version": env!("CARGO_PKG_VERSION") },
        })),
        "tools/list" => Ok(json!({
            "tools": [{
                "name": "echo",
                "description": "Echo back the given message",
                "inputSchema": {
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"],
                },
            }],
        })),
        "tools/call" => call_tool(&params),
        other => Err((-32601, format!("Method not found: {other}"))),
    };

    Some(match result {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message },
        }),
    })
}

fn call_tool(params: &Value) -> Result<Value, (i64, String)> {
    match params.get("name").and_then(Value::as_str) {
        Some("echo") => {
            let message = params
                .pointer("/arguments/message")
                .and_then(Value::as_str)
                .ok_or((-32602, "echo requires a string `message`".to_string()))?;
            Ok(json!({
                "content": [{ "type": "text", "text": format!("hello {message}") }],
                "isError": false,
            }))
        }
        Some(name) => Err((-32602, format!("Unknown tool: {name}"))),
        None => Err((-32602, "Missing tool name".to_string())),
    }
}
