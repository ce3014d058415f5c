//! Extraction of JSON payloads from raw LLM output.
//!
//! Models routinely wrap JSON in markdown code fences or surround it with
//! prose; callers parse the returned slice with serde_json.

/// Strip markdown code fences and surrounding prose, returning the JSON
/// payload candidate. Falls back to the trimmed input when no fence or
/// JSON delimiter is found.
pub fn extract_json_payload(raw: &str) -> &str {
    let trimmed = raw.trim();

    let delimiter = match (trimmed.find('{'), trimmed.find('[')) {
        (Some(o), Some(a)) => Some(o.min(a)),
        (Some(o), None) => Some(o),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    };

    // Fenced block: ```json ... ``` or ``` ... ```. A fence only opens
    // the payload when it precedes any JSON delimiter; a trailing fence
    // after bare JSON is noise.
    let fence = trimmed
        .find("```")
        .filter(|&f| delimiter.map_or(true, |d| f < d));
    if let Some(start) = fence {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        let after = after.trim_start_matches(['\r', '\n']);
        if let Some(end) = after.find("```") {
            return after[..end].trim();
        }
        return after.trim();
    }

    // Unfenced: take from the first { or [ to the matching last } or ]
    let obj = trimmed.find('{').map(|s| (s, trimmed.rfind('}')));
    let arr = trimmed.find('[').map(|s| (s, trimmed.rfind(']')));
    let candidate = match (obj, arr) {
        (Some((os, oe)), Some((as_, ae))) => {
            if os < as_ { (os, oe) } else { (as_, ae) }
        }
        (Some(pair), None) => pair,
        (None, Some(pair)) => pair,
        (None, None) => return trimmed,
    };
    if let (start, Some(end)) = candidate {
        if end > start {
            return trimmed[start..=end].trim();
        }
    }
    trimmed
}
