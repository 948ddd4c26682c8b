//! Personalization-variable extraction from step subjects and bodies.

use std::sync::LazyLock;

use regex::Regex;

// The three brace styles seen across provider templates.
static BRACE_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").expect("valid regex"),
        Regex::new(r"\[\[\s*([A-Za-z0-9_.]+)\s*\]\]").expect("valid regex"),
        Regex::new(r"\{\s*([A-Za-z0-9_.]+)\s*\}").expect("valid regex"),
    ]
});

/// Extract variable names from a step's subject and body, deduplicated.
/// Subject variables come first, then body variables, scanned one brace
/// style at a time.
pub fn extract_variables(subject: &str, body: &str) -> Vec<String> {
    let mut vars = Vec::new();
    for text in [subject, body] {
        for pattern in BRACE_PATTERNS.iter() {
            for capture in pattern.captures_iter(text) {
                let name = capture[1].to_string();
                if !vars.contains(&name) {
                    vars.push(name);
                }
            }
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_three_brace_styles() {
        let vars = extract_variables(
            "Hi {{first_name}}",
            "I saw {company} is hiring. Best, [[sender_name]]",
        );
        assert_eq!(vars, vec!["first_name", "sender_name", "company"]);
    }

    #[test]
    fn test_duplicates_removed() {
        let vars = extract_variables("{{first_name}}", "Hello {{first_name}}, re {first_name}");
        assert_eq!(vars, vec!["first_name"]);
    }

    #[test]
    fn test_no_variables() {
        assert!(extract_variables("Plain subject", "Plain body.").is_empty());
    }

    #[test]
    fn test_dotted_names() {
        let vars = extract_variables("", "{{lead.company.name}}");
        assert_eq!(vars, vec!["lead.company.name"]);
    }
}
