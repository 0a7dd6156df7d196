//! Entity-name canonicalization.
//!
//! Historical and modern datasets spell the same sovereign entity in many
//! ways ("Great Britain", "UK", "United Kingdom"). Everything that groups or
//! colors by owner goes through [`canonicalize_name`] first.

/// Alias → canonical name. Both sides are already in normalized form and no
/// canonical name appears as a key, so resolution is a single lookup.
const ALIASES: &[(&str, &str)] = &[
    ("america", "united states"),
    ("britain", "united kingdom"),
    ("burma", "myanmar"),
    ("cape verde", "cabo verde"),
    ("congo brazzaville", "republic of the congo"),
    ("congo kinshasa", "democratic republic of the congo"),
    ("czech republic", "czechia"),
    ("democratic peoples republic of korea", "north korea"),
    ("dr congo", "democratic republic of the congo"),
    ("east timor", "timor leste"),
    ("great britain", "united kingdom"),
    ("holland", "netherlands"),
    ("iran islamic republic of", "iran"),
    ("ivory coast", "cote divoire"),
    ("korea republic of", "south korea"),
    ("lao pdr", "laos"),
    ("macedonia", "north macedonia"),
    ("ottoman", "ottoman empire"),
    ("republic of korea", "south korea"),
    ("russian federation", "russia"),
    ("swaziland", "eswatini"),
    ("syrian arab republic", "syria"),
    ("the netherlands", "netherlands"),
    ("turkiye", "turkey"),
    ("uk", "united kingdom"),
    ("united kingdom of great britain and northern ireland", "united kingdom"),
    ("united states of america", "united states"),
    ("us", "united states"),
    ("usa", "united states"),
    ("viet nam", "vietnam"),
];

/// Leading adjective → canonical owner.
const OWNER_ADJECTIVES: &[(&str, &str)] = &[
    ("american", "united states"),
    ("anglo", "united kingdom"),
    ("australian", "australia"),
    ("austro", "austria hungary"),
    ("belgian", "belgium"),
    ("british", "united kingdom"),
    ("danish", "denmark"),
    ("dutch", "netherlands"),
    ("english", "united kingdom"),
    ("french", "france"),
    ("german", "germany"),
    ("italian", "italy"),
    ("japanese", "japan"),
    ("norwegian", "norway"),
    ("ottoman", "ottoman empire"),
    ("portuguese", "portugal"),
    ("russian", "russia"),
    ("spanish", "spain"),
    ("swedish", "sweden"),
];

/// Folds a Latin-1 / Latin Extended-A letter to its lowercase ASCII base.
fn fold_diacritic(c: char) -> Option<&'static str> {
    let folded = match c {
        '\u{00C0}'..='\u{00C5}' | '\u{00E0}'..='\u{00E5}' => "a",
        '\u{00C6}' | '\u{00E6}' => "ae",
        '\u{00C7}' | '\u{00E7}' => "c",
        '\u{00C8}'..='\u{00CB}' | '\u{00E8}'..='\u{00EB}' => "e",
        '\u{00CC}'..='\u{00CF}' | '\u{00EC}'..='\u{00EF}' => "i",
        '\u{00D0}' | '\u{00F0}' => "d",
        '\u{00D1}' | '\u{00F1}' => "n",
        '\u{00D2}'..='\u{00D6}' | '\u{00D8}' | '\u{00F2}'..='\u{00F6}' | '\u{00F8}' => "o",
        '\u{00D9}'..='\u{00DC}' | '\u{00F9}'..='\u{00FC}' => "u",
        '\u{00DD}' | '\u{00FD}' | '\u{00FF}' => "y",
        '\u{00DE}' | '\u{00FE}' => "th",
        '\u{00DF}' => "ss",
        '\u{0100}'..='\u{0105}' => "a",
        '\u{0106}'..='\u{010D}' => "c",
        '\u{010E}'..='\u{0111}' => "d",
        '\u{0112}'..='\u{011B}' => "e",
        '\u{011C}'..='\u{0123}' => "g",
        '\u{0124}'..='\u{0127}' => "h",
        '\u{0128}'..='\u{0131}' => "i",
        '\u{0132}'..='\u{0133}' => "ij",
        '\u{0134}'..='\u{0135}' => "j",
        '\u{0136}'..='\u{0138}' => "k",
        '\u{0139}'..='\u{0142}' => "l",
        '\u{0143}'..='\u{014B}' => "n",
        '\u{014C}'..='\u{0151}' => "o",
        '\u{0152}'..='\u{0153}' => "oe",
        '\u{0154}'..='\u{0159}' => "r",
        '\u{015A}'..='\u{0161}' | '\u{017F}' => "s",
        '\u{0162}'..='\u{0167}' => "t",
        '\u{0168}'..='\u{0173}' => "u",
        '\u{0174}'..='\u{0175}' => "w",
        '\u{0176}'..='\u{0178}' => "y",
        '\u{0179}'..='\u{017E}' => "z",
        _ => return None,
    };
    Some(folded)
}

fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

fn is_apostrophe(c: char) -> bool {
    matches!(c, '\'' | '`' | '\u{2018}' | '\u{2019}' | '\u{02BB}' | '\u{02BC}')
}

/// Lowercase, fold diacritics, drop apostrophes, turn other punctuation into
/// spaces and collapse runs of whitespace. No alias resolution.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if is_combining_mark(c) || is_apostrophe(c) {
            continue;
        }
        if let Some(folded) = fold_diacritic(c) {
            out.push_str(folded);
        } else if c.is_alphanumeric() {
            out.extend(c.to_lowercase().filter(|l| !is_combining_mark(*l)));
        } else {
            out.push(' ');
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn resolve_alias(normalized: &str) -> Option<&'static str> {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| *canonical)
}

/// Canonical form of an entity name. Idempotent.
pub fn canonicalize_name(raw: &str) -> String {
    let normalized = normalize_text(raw);
    match resolve_alias(&normalized) {
        Some(canonical) => canonical.to_string(),
        None => normalized,
    }
}

/// Infers an administrative owner from a leading national adjective
/// ("French Indochina" → "france"). Requires text after the adjective.
pub fn derive_owner_from_adjective(name: &str) -> Option<String> {
    let normalized = normalize_text(name);
    let (first, rest) = normalized.split_once(' ')?;
    if rest.is_empty() {
        return None;
    }
    OWNER_ADJECTIVES
        .iter()
        .find(|(adjective, _)| *adjective == first)
        .map(|(_, owner)| owner.to_string())
}

#[cfg(test)]
mod tests {
    use super::{ALIASES, canonicalize_name, derive_owner_from_adjective, normalize_text};

    #[test]
    fn strips_case_diacritics_and_punctuation() {
        assert_eq!(canonicalize_name("  Côte d’Ivoire "), "cote divoire");
        assert_eq!(canonicalize_name("São Tomé & Príncipe"), "sao tome principe");
        assert_eq!(canonicalize_name("St. Helena"), "st helena");
        assert_eq!(canonicalize_name("Łódź\tVoivodeship"), "lodz voivodeship");
        assert_eq!(canonicalize_name("Curac\u{0327}ao"), "curacao");
    }

    #[test]
    fn resolves_aliases() {
        assert_eq!(canonicalize_name("Great Britain"), "united kingdom");
        assert_eq!(canonicalize_name("U.K."), "u k");
        assert_eq!(canonicalize_name("UK"), "united kingdom");
        assert_eq!(canonicalize_name("Ivory Coast"), "cote divoire");
        assert_eq!(canonicalize_name("Russian Federation"), "russia");
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let samples = [
            "Great Britain",
            "  Côte d'Ivoire",
            "Äland---Islands",
            "İstanbul",
            "Œuvre Straße",
            "ΕΛΛΑΣ",
            "Viet Nam",
            "",
            "   ",
            "already canonical",
            "U.S.A.",
            "Democratic People's Republic of Korea",
        ];
        for s in samples {
            let once = canonicalize_name(s);
            assert_eq!(canonicalize_name(&once), once, "input {s:?}");
        }
    }

    #[test]
    fn alias_targets_are_fixed_points() {
        for (alias, canonical) in ALIASES {
            assert_eq!(normalize_text(alias), *alias);
            assert_eq!(canonicalize_name(canonical), *canonical);
        }
    }

    #[test]
    fn derives_owner_from_adjective_prefix() {
        assert_eq!(
            derive_owner_from_adjective("French Indochina").as_deref(),
            Some("france")
        );
        assert_eq!(
            derive_owner_from_adjective("British Raj").as_deref(),
            Some("united kingdom")
        );
        assert_eq!(
            derive_owner_from_adjective("Anglo-Egyptian Sudan").as_deref(),
            Some("united kingdom")
        );
        assert_eq!(derive_owner_from_adjective("French"), None);
        assert_eq!(derive_owner_from_adjective("Frenchtown Bay"), None);
        assert_eq!(derive_owner_from_adjective("Kingdom of Kongo"), None);
    }
}
