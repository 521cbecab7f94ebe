//! Best-effort repair of truncated JSON arrays.
//!
//! LLM replies get cut off at token limits, usually mid-element. Rather
//! than discarding the whole batch, close the array after the last
//! element that survived intact and parse what we have.

/// Attempt to repair a truncated JSON array by closing it at the last
/// complete top-level element.
///
/// Prose brackets before the real array ("Here are [some] cards: ...")
/// are skipped: each `[` is tried in turn and a candidate is accepted
/// only when the closed result is syntactically valid JSON. Schema
/// problems in individual elements are still the caller's to handle.
///
/// Returns `None` when no candidate yields a complete element.
pub fn repair_truncated_array(input: &str) -> Option<String> {
    let mut search_from = 0;
    while let Some(offset) = input[search_from..].find('[') {
        let start = search_from + offset;
        if let Some(candidate) = close_array(&input[start..]) {
            if serde_json::from_str::<serde_json::Value>(&candidate).is_ok() {
                return Some(candidate);
            }
        }
        search_from = start + 1;
    }
    None
}

/// Close one candidate array, cutting after the last element that
/// completed at depth 1.
fn close_array(body: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    // Byte offset just past the last element that closed at depth 1
    let mut last_complete_end: Option<usize> = None;

    for (idx, ch) in body.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
                // A bare string element at the top level counts as complete
                if depth == 1 {
                    last_complete_end = Some(idx + ch.len_utf8());
                }
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    last_complete_end = Some(idx + ch.len_utf8());
                } else if depth == 0 && ch == ']' {
                    // Whole array closed; nothing to repair
                    return Some(body[..=idx].to_string());
                }
            }
            _ => {}
        }
    }

    let end = last_complete_end?;
    let mut repaired = body[..end].to_string();
    repaired.push(']');
    Some(repaired)
}
