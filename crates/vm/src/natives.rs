//! Built-in native functions: a single built-in, `clock`.

use std::time::{SystemTime, UNIX_EPOCH};

use loxi_core::Value;

/// Seconds since the Unix epoch, wall-clock — a stand-in for
/// seconds-since-process-start, since Rust's `Instant` has no portable
/// "process start" epoch to subtract against.
pub fn clock(_args: &[Value]) -> Result<Value, String> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("system clock error: {e}"))?;
    Ok(Value::Number(elapsed.as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_returns_a_positive_number() {
        let result = clock(&[]).unwrap();
        assert!(matches!(result, Value::Number(n) if n > 0.0));
    }
}
