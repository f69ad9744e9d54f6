use serde_json::Value;

/// Progress implied by one stdout line of the agent CLI.
///
/// A JSON record with `type == "result"` means the run is done (100); a
/// numeric `progress` field is taken as a percentage. Anything else says
/// nothing about progress.
pub fn progress_from_line(line: &str) -> Option<u8> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let record: Value = serde_json::from_str(trimmed).ok()?;
    if record.get("type").and_then(Value::as_str) == Some("result") {
        return Some(100);
    }
    let progress = record.get("progress")?.as_f64()?;
    if !progress.is_finite() {
        return None;
    }
    Some(progress.clamp(0.0, 100.0).round() as u8)
}
