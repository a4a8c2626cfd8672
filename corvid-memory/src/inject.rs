//! Context injection: render retrieved items into a bounded section.

use corvid_core::{ComplexityLevel, MemoryItem};

/// Cap on the whole injected memory section, in chars.
pub const MEMORY_INJECTION_MAX: usize = 2_000;

/// Per-item cap: title plus at most this many content lines.
const ITEM_LINES: usize = 4;

/// Render retrieved items as the in-context procedural-memory section.
/// Empty input renders to an empty string (the no-memory case).
pub fn render_memories(items: &[(MemoryItem, f64)]) -> String {
    if items.is_empty() {
        return String::new();
    }
    let mut out =
        String::from("Procedural memories (assess applicability before acting):\n");
    for (item, _) in items {
        let mut block = format!("- {}\n", item.title);
        for line in item
            .content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .take(ITEM_LINES)
        {
            block.push_str(&format!("  {}\n", line.trim()));
        }
        if out.chars().count() + block.chars().count() > MEMORY_INJECTION_MAX {
            break;
        }
        out.push_str(&block);
    }
    out
}

/// Estimate the curriculum level of a query from surface features.
/// Used to prefer exemplars of matching, then adjacent, levels.
pub fn estimate_level(query: &str) -> ComplexityLevel {
    let lower = query.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if mentions(&["federat", "across", "endpoint", "combine", "union of"]) {
        ComplexityLevel::L5
    } else if mentions(&["count", "how many", "average", "most", "least", "group"]) {
        ComplexityLevel::L4
    } else if mentions(&["path", "chain", "via", "through", "indirect", "connected"]) {
        ComplexityLevel::L3
    } else if mentions(&["related", "subclass", "subclasses", "hierarchy", "linked", "property", "properties"])
    {
        ComplexityLevel::L2
    } else {
        ComplexityLevel::L1
    }
}

/// Stable re-rank by curriculum level: items tagged `L1`..`L5` move
/// ahead when their level matches (or neighbours) the query's estimated
/// level; untagged items are unaffected relative to each other.
pub fn rerank_by_level(query: &str, items: &mut [(MemoryItem, f64)]) {
    let target = estimate_level(query);
    let tag_level = |item: &MemoryItem| -> Option<ComplexityLevel> {
        item.tags.iter().find_map(|tag| match tag.as_str() {
            "L1" => Some(ComplexityLevel::L1),
            "L2" => Some(ComplexityLevel::L2),
            "L3" => Some(ComplexityLevel::L3),
            "L4" => Some(ComplexityLevel::L4),
            "L5" => Some(ComplexityLevel::L5),
            _ => None,
        })
    };
    items.sort_by_key(|(item, _)| match tag_level(item) {
        Some(level) => level.distance(&target),
        None => 1, // neutral: between a matching and a distant level
    });
}
