//! Canonicalizes free-form parameter labels such as `MP₂.₅ (µg/m³)` into the
//! fixed key space used by units, thresholds and sensor lookup.

fn subscript_to_ascii(c: char) -> char {
    match c {
        '₀' => '0',
        '₁' => '1',
        '₂' => '2',
        '₃' => '3',
        '₄' => '4',
        '₅' => '5',
        '₆' => '6',
        '₇' => '7',
        '₈' => '8',
        '₉' => '9',
        other => other,
    }
}

/// Map a parameter label to its canonical key.
///
/// Subscript digits become ASCII, everything from the first space on is
/// dropped, and the particulate/ozone/sulphur families are folded onto
/// `MP10`, `MP2.5`, `O3` and `SO2`. Any other label comes back as its
/// leading token. Never fails and is idempotent.
pub fn normalize_parameter(raw: &str) -> String {
    let ascii: String = raw.trim().chars().map(subscript_to_ascii).collect();
    let token = ascii.split(' ').next().unwrap_or_default();

    if token.starts_with("MP1") || token == "MP10" {
        "MP10".to_string()
    } else if token.starts_with("MP2") || token.contains("2.5") || token.contains("2_5") {
        "MP2.5".to_string()
    } else if token == "O3" {
        "O3".to_string()
    } else if token == "SO2" {
        "SO2".to_string()
    } else {
        token.to_string()
    }
}
