use std::io::Write;

/// Write a line to stdout
pub fn write_line(text: &str) -> Result<(), String> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .and_then(|_| handle.write_all(b"\n"))
        .map_err(|e| format!("Failed to write to stdout: {}", e))
}

/// Serialize a value to JSON (pretty or compact).
pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, String> {
    if compact {
        serde_json::to_string(value).map_err(|e| format!("JSON serialization failed: {}", e))
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| format!("JSON serialization failed: {}", e))
    }
}

/// Serialize and print, mapping failures to an exit code
pub fn print_json<T: serde::Serialize>(value: &T, compact: bool) -> i32 {
    match to_json(value, compact).and_then(|json| write_line(&json)) {
        Ok(()) => crate::exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            crate::exit_codes::EXECUTION_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compact_json_is_single_line() {
        let value = json!({"Port": 443, "anomaly": 1});
        let compact = to_json(&value, true).unwrap();
        assert!(!compact.contains('\n'));
        assert_eq!(compact, r#"{"Port":443,"anomaly":1}"#);

        let pretty = to_json(&value, false).unwrap();
        assert!(pretty.contains('\n'));
    }
}
