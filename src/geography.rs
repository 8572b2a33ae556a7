//! Canonical keys for free-text state and district labels.

pub const UNKNOWN: &str = "Unknown";

/// Historical names, merged union territories and common misspellings, keyed
/// by the lower-cased, `&`-expanded form.
const STATE_ALIASES: &[(&str, &str)] = &[
    ("andaman and nicobar islands", "Andaman And Nicobar Islands"),
    ("dadra and nagar haveli", "Dadra And Nagar Haveli And Daman And Diu"),
    ("daman and diu", "Dadra And Nagar Haveli And Daman And Diu"),
    (
        "dadra and nagar haveli and daman and diu",
        "Dadra And Nagar Haveli And Daman And Diu",
    ),
    ("nct of delhi", "Nct Of Delhi"),
    ("delhi", "Nct Of Delhi"),
    ("orissa", "Odisha"),
    ("pondicherry", "Puducherry"),
    ("jammu and kashmir", "Jammu And Kashmir"),
    ("westbengal", "West Bengal"),
    ("west bangal", "West Bengal"),
];

/// Returns the canonical state name, or [`UNKNOWN`] for blank and
/// numeric-only junk. Applying it twice yields the same result as once.
pub fn normalize_state(raw: &str) -> String {
    let expanded = raw.replace('&', "and");
    let mut tokens: Vec<String> = expanded
        .split_whitespace()
        .map(|token| token.to_lowercase())
        .collect();

    let leading_articles = tokens.iter().take_while(|token| *token == "the").count();
    tokens.drain(..leading_articles);

    let lower = tokens.join(" ");
    if lower.is_empty() || lower.chars().all(|c| c.is_ascii_digit()) {
        return UNKNOWN.to_string();
    }

    if let Some((_, canonical)) = STATE_ALIASES.iter().find(|(alias, _)| *alias == lower) {
        return (*canonical).to_string();
    }

    tokens
        .iter()
        .map(|token| title_token(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Districts have no reference list, so only whitespace is tidied.
pub fn normalize_district(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        UNKNOWN.to_string()
    } else {
        collapsed
    }
}

pub fn is_unknown(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNKNOWN)
}

fn title_token(token: &str) -> String {
    if token == "and" || token == "of" {
        return token.to_string();
    }
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_aliases_and_historical_names() {
        assert_eq!(normalize_state("Orissa"), "Odisha");
        assert_eq!(normalize_state("  delhi "), "Nct Of Delhi");
        assert_eq!(normalize_state("Pondicherry"), "Puducherry");
        assert_eq!(normalize_state("Daman & Diu"), "Dadra And Nagar Haveli And Daman And Diu");
        assert_eq!(
            normalize_state("The Dadra And Nagar Haveli And Daman And Diu"),
            "Dadra And Nagar Haveli And Daman And Diu"
        );
        assert_eq!(normalize_state("Jammu & Kashmir"), "Jammu And Kashmir");
        assert_eq!(normalize_state("west  Bangal"), "West Bengal");
    }

    #[test]
    fn title_cases_unmapped_names() {
        assert_eq!(normalize_state("uttar   pradesh"), "Uttar Pradesh");
        assert_eq!(normalize_state("TAMIL NADU"), "Tamil Nadu");
        assert_eq!(normalize_state("isle of man"), "Isle of Man");
        assert_eq!(normalize_state("the gambia"), "Gambia");
    }

    #[test]
    fn junk_becomes_unknown() {
        assert_eq!(normalize_state(""), UNKNOWN);
        assert_eq!(normalize_state("   "), UNKNOWN);
        assert_eq!(normalize_state("100000"), UNKNOWN);
        assert_eq!(normalize_state("the 42"), UNKNOWN);
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "Orissa",
            "the the bihar",
            "Andaman & Nicobar Islands",
            "nct of delhi",
            "Jammu and Kashmir",
            "  KERALA ",
            "123",
            "",
            "Unknown",
            "west bengal",
            "Isle Of Man",
        ];
        for raw in samples {
            let once = normalize_state(raw);
            assert_eq!(normalize_state(&once), once, "input {raw:?}");
        }
    }

    #[test]
    fn district_only_tidies_whitespace() {
        assert_eq!(normalize_district("  north   goa "), "north goa");
        assert_eq!(normalize_district("Aurangabad(BH)"), "Aurangabad(BH)");
        assert_eq!(normalize_district(""), UNKNOWN);
    }
}
