//! JSON-RPC response strings.

use serde_json::{json, Value};

/// `{"result": .., "id": ..}`
pub fn to_json_result(result: &Value, id: u64) -> String {
    json!({ "result": result, "id": id }).to_string()
}

/// `{"error": {"code": .., "message": ..}, "id": ..}`
pub fn to_json_error(code: i64, message: &str, id: u64) -> String {
    json!({ "error": { "code": code, "message": message }, "id": id }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_embeds_id() {
        let rendered = to_json_result(&json!({"height": 12}), 7);
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["id"], 7);
        assert_eq!(parsed["result"]["height"], 12);
    }

    #[test]
    fn error_embeds_code_and_message() {
        let rendered = to_json_error(-32601, "Method not found.", 3);
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["error"]["code"], -32601);
        assert_eq!(parsed["error"]["message"], "Method not found.");
        assert_eq!(parsed["id"], 3);
    }
}
