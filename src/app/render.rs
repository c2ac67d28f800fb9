use memoria::core::memory::{MemoryStats, RetrievedMemory};
use memoria::ui::style as ui;

/// Strengths below this are highlighted as fading.
const WEAK_STRENGTH: f64 = 0.25;

pub fn render_memory(retrieved: &RetrievedMemory) -> String {
    let memory = &retrieved.memory;
    let mut head = format!(
        "{} {}",
        ui::accent(format!("#{}", memory.id)),
        ui::cyan(memory.scope())
    );
    if let Some(relevance) = retrieved.relevance {
        head.push_str(&format!("  relevance {relevance:.3}"));
    }
    head.push_str(&format!(
        "  strength {}",
        ui::strength(retrieved.current_strength, WEAK_STRENGTH)
    ));

    let mut lines = vec![head];
    lines.extend(memory.content.lines().map(|line| format!("    {line}")));

    let mut detail = format!("created {}", memory.created_at.to_rfc3339());
    if let Some(accessed) = memory.last_accessed_at {
        detail.push_str(&format!("  accessed {}", accessed.to_rfc3339()));
    }
    if !memory.metadata.is_empty() {
        detail.push_str(&format!(
            "  {}",
            serde_json::Value::Object(memory.metadata.clone())
        ));
    }
    lines.push(format!("    {}", ui::dim(detail)));
    lines.join("\n")
}

pub fn render_list(rows: &[RetrievedMemory]) -> String {
    if rows.is_empty() {
        return ui::dim("(no memories)");
    }
    rows.iter()
        .map(render_memory)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_stats(stats: &MemoryStats) -> String {
    let mut lines = vec![
        format!("◆ {}", ui::header("Memory stats")),
        format!("  {}   {}", ui::cyan("count"), stats.count),
    ];
    if stats.count > 0 {
        lines.push(format!(
            "  {}    {}",
            ui::cyan("mean"),
            ui::strength(stats.mean_strength, WEAK_STRENGTH)
        ));
        lines.push(format!(
            "  {}     {}",
            ui::cyan("min"),
            ui::strength(stats.min_strength, WEAK_STRENGTH)
        ));
        lines.push(format!(
            "  {}     {}",
            ui::cyan("max"),
            ui::strength(stats.max_strength, WEAK_STRENGTH)
        ));
    }
    lines.join("\n")
}
