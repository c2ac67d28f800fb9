use console::style;
use std::fmt::Display;

/// Green bold — confirmations
pub fn success<D: Display>(text: D) -> String {
    style(text).green().bold().to_string()
}

/// White bold — section headers, titles
pub fn header<D: Display>(text: D) -> String {
    style(text).white().bold().to_string()
}

/// Dim — secondary text such as timestamps and metadata
pub fn dim<D: Display>(text: D) -> String {
    style(text).dim().to_string()
}

/// Yellow — warnings, weak or stale strengths
pub fn yellow<D: Display>(text: D) -> String {
    style(text).yellow().to_string()
}

/// Cyan bold — record ids
pub fn accent<D: Display>(text: D) -> String {
    style(text).cyan().bold().to_string()
}

/// Cyan — field labels
pub fn cyan<D: Display>(text: D) -> String {
    style(text).cyan().to_string()
}

/// Strength rendered with two decimals, yellow below `weak`.
pub fn strength(value: f64, weak: f64) -> String {
    let text = format!("{value:.2}");
    if value < weak {
        yellow(text)
    } else {
        style(text).green().to_string()
    }
}
