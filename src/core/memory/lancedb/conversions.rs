use crate::core::memory::memory_types::ScopeFilter;

/// Quote a string literal for a LanceDB (DataFusion) predicate.
///
/// Scope identifiers are validated to contain no control characters before
/// they get here, so doubling single quotes is the only escaping needed.
pub(super) fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub(super) fn sql_eq(column: &str, value: &str) -> String {
    format!("{column} = {}", sql_literal(value))
}

pub(super) fn id_eq(id: i64) -> String {
    format!("id = {id}")
}

pub(super) fn id_in(ids: &[i64]) -> String {
    let list = ids
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("id IN ({list})")
}

/// Predicate for the scope part of a filter. Metadata filters are applied
/// in-process after the scan.
pub(super) fn scope_predicate(filter: &ScopeFilter) -> Option<String> {
    let mut clauses = Vec::new();
    if let Some(user) = &filter.user_id {
        clauses.push(sql_eq("user_id", user));
    }
    if let Some(agent) = &filter.agent_id {
        clauses.push(sql_eq("agent_id", agent));
    } else if filter.requires_no_agent() {
        clauses.push("agent_id IS NULL".to_string());
    }
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" AND "))
    }
}
