//! Model-response parsing: one reasoning block, one code block.

/// A parsed model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResponse {
    /// Free text preceding the first code block.
    pub reasoning: String,
    /// The first fenced code block's content; empty if none was emitted.
    pub code: String,
    /// Code blocks beyond the first (discarded, but counted so the next
    /// prompt can mention the discard).
    pub discarded_blocks: usize,
}

/// Split a completion into reasoning + the first fenced code block.
pub fn parse_response(text: &str) -> ParsedResponse {
    let mut blocks = Vec::new();
    let mut reasoning = String::new();
    let mut in_block = false;
    let mut current = String::new();
    let mut first_fence_seen = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            if in_block {
                blocks.push(current.clone());
                current.clear();
                in_block = false;
            } else {
                in_block = true;
                first_fence_seen = true;
            }
            continue;
        }
        if in_block {
            current.push_str(line);
            current.push('\n');
        } else if !first_fence_seen {
            reasoning.push_str(line);
            reasoning.push('\n');
        }
    }
    // An unterminated fence still counts as a block.
    if in_block && !current.is_empty() {
        blocks.push(current);
    }

    let code = blocks.first().map(|b| b.trim_end().to_string()).unwrap_or_default();
    ParsedResponse {
        reasoning: reasoning.trim().to_string(),
        code,
        discarded_blocks: blocks.len().saturating_sub(1),
    }
}

/// Pull a JSON object out of a fallback completion: a fenced ```json
/// block first, then the first balanced `{ ... }` span.
pub fn extract_json_object(text: &str) -> Option<serde_json::Value> {
    let parsed = parse_response(text);
    if !parsed.code.is_empty() {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(parsed.code.trim()) {
            if value.is_object() {
                return Some(value);
            }
        }
    }
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + i + 1];
                    return serde_json::from_str::<serde_json::Value>(candidate)
                        .ok()
                        .filter(|v| v.is_object());
                }
            }
            _ => {}
        }
    }
    None
}
