//! Entity extraction from free-text intent and explicit field values.
//!
//! Pure pattern matching: explicit field values always win over text
//! inference, pattern order encodes priority (most specific status first),
//! and a handful of cross-entity defaults fill gaps the text implies.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Entity keys recognized by the extractor, in precedence order.
pub const ENTITY_KEYS: &[&str] = &[
    "status_type",
    "program_stage",
    "petition_status",
    "employment_offer",
    "employer_name",
    "work_start_date",
    "work_end_date",
    "graduation_date",
];

/// Status patterns, most specific first — cap-gap and H-1B language must
/// win over the bare F-1/OPT mentions they usually accompany.
static STATUS_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?i)\bcap[\s\-]?gap\b").unwrap(), "cap_gap"),
        (Regex::new(r"(?i)\bh-?1b\b").unwrap(), "h1b"),
        (Regex::new(r"(?i)\bcpt\b").unwrap(), "cpt"),
        (Regex::new(r"(?i)\bstem opt\b").unwrap(), "stem_opt"),
        (Regex::new(r"(?i)\bopt\b").unwrap(), "opt"),
        (Regex::new(r"(?i)\bf-?1\b").unwrap(), "f1"),
    ]
});

static STAGE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)\b(enrolled|current student|this quarter|this semester|while studying)\b")
                .unwrap(),
            "enrolled",
        ),
        (
            Regex::new(r"(?i)\b(graduating|graduation|final quarter|about to graduate)\b").unwrap(),
            "graduating",
        ),
        (Regex::new(r"(?i)\b(graduated|alumni)\b").unwrap(), "graduated"),
        (
            Regex::new(r"(?i)\b(working|already working|currently employed)\b").unwrap(),
            "working",
        ),
    ]
});

static PETITION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?i)\b(filed|submitted|registered)\b").unwrap(), "filed"),
        (Regex::new(r"(?i)\b(pending|waiting|processing)\b").unwrap(), "pending"),
        (
            Regex::new(r"(?i)\b(approved|selected)\b").unwrap(),
            "approved_or_selected",
        ),
        (
            Regex::new(r"(?i)\b(rejected|denied|not selected)\b").unwrap(),
            "denied_or_not_selected",
        ),
    ]
});

static OFFER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(internship|offer|job|employment)\b").unwrap());

static TRANSITION_LANGUAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)h-?1b|cap[\s\-]?gap").unwrap());

fn first_match(patterns: &[(Regex, &'static str)], text: &str) -> Option<&'static str> {
    patterns
        .iter()
        .find(|(regex, _)| regex.is_match(text))
        .map(|&(_, value)| value)
}

/// Extract normalized entities from intent text and current fields.
///
/// Explicit non-empty field values take precedence; text inference fills
/// the rest. Cross-entity defaults: CPT status implies an enrolled stage,
/// transition statuses imply a working stage and a tentative "unknown"
/// petition status.
pub fn extract_entities(
    intent: &str,
    fields: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut entities = BTreeMap::new();

    for &key in ENTITY_KEYS {
        if let Some(value) = fields.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
            entities.insert(key.to_string(), value.to_string());
        }
    }

    if !entities.contains_key("status_type")
        && let Some(status) = first_match(&STATUS_PATTERNS, intent)
    {
        entities.insert("status_type".into(), status.into());
    }

    if !entities.contains_key("program_stage")
        && let Some(stage) = first_match(&STAGE_PATTERNS, intent)
    {
        entities.insert("program_stage".into(), stage.into());
    }

    let status = normalize_status(entities.get("status_type").map(String::as_str).unwrap_or(""));
    if !entities.contains_key("program_stage") {
        if status == "cpt" {
            entities.insert("program_stage".into(), "enrolled".into());
        } else if status == "h1b" || status == "cap_gap" {
            entities.insert("program_stage".into(), "working".into());
        }
    }

    if !entities.contains_key("petition_status") {
        if TRANSITION_LANGUAGE.is_match(intent) {
            let value = first_match(&PETITION_PATTERNS, intent).unwrap_or("unknown");
            entities.insert("petition_status".into(), value.into());
        } else if status == "h1b" || status == "cap_gap" {
            entities.insert("petition_status".into(), "unknown".into());
        }
    }

    if !entities.contains_key("employment_offer") && OFFER_PATTERN.is_match(intent) {
        entities.insert("employment_offer".into(), "yes".into());
    }

    entities
}

/// Entities the intent states directly, safe to seed into the field map.
///
/// Only direct text matches qualify: cross-entity defaults and tentative
/// petition/offer inferences stay routing signals until the user confirms
/// them as fields.
pub fn seed_fields(intent: &str) -> BTreeMap<String, String> {
    let mut seeds = BTreeMap::new();
    if let Some(status) = first_match(&STATUS_PATTERNS, intent) {
        seeds.insert("status_type".to_string(), status.to_string());
    }
    if let Some(stage) = first_match(&STAGE_PATTERNS, intent) {
        seeds.insert("program_stage".to_string(), stage.to_string());
    }
    seeds
}

/// Program stage resolved from explicit sources only (field value or a
/// direct text match), ignoring status-derived defaults. The overlap
/// ambiguity check uses this: a stage inferred from an ambiguous status
/// cannot disambiguate that same status.
pub fn explicit_stage(intent: &str, fields: &BTreeMap<String, String>) -> Option<String> {
    if let Some(value) = fields
        .get("program_stage")
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
    {
        return Some(value.to_string());
    }
    first_match(&STAGE_PATTERNS, intent).map(str::to_string)
}

/// Lowercase, trim, and fold hyphens to underscores.
pub fn normalize_value(value: &str) -> String {
    value.trim().to_lowercase().replace('-', "_")
}

/// Normalize status spellings to canonical ids.
pub fn normalize_status(value: &str) -> String {
    let normalized = normalize_value(value);
    match normalized.as_str() {
        "f_1" | "f1" => "f1".into(),
        "stem" | "stemopt" | "stem_opt" => "stem_opt".into(),
        "capgap" | "cap_gap" => "cap_gap".into(),
        other => other.into(),
    }
}

/// Statuses a given status also satisfies for applicability matching
/// (CPT holders are F-1 students; cap-gap spans the OPT-to-H-1B bridge).
pub fn status_equivalents(status: &str) -> Vec<&'static str> {
    match normalize_status(status).as_str() {
        "cpt" => vec!["cpt", "f1"],
        "stem_opt" => vec!["stem_opt", "opt"],
        "cap_gap" => vec!["cap_gap", "h1b", "opt", "stem_opt", "f1"],
        "h1b" => vec!["h1b", "cap_gap", "opt", "stem_opt", "f1"],
        "f1" => vec!["f1"],
        "opt" => vec!["opt"],
        _ => vec![],
    }
}

/// Whether `status` satisfies any entry of a pack's accepted status list.
pub fn status_matches(status: &str, accepted: &[String]) -> bool {
    let equivalents = status_equivalents(status);
    let equivalents: Vec<String> = if equivalents.is_empty() {
        vec![normalize_status(status)]
    } else {
        equivalents.iter().map(|s| s.to_string()).collect()
    };
    accepted
        .iter()
        .map(|v| normalize_status(v))
        .any(|accepted| equivalents.contains(&accepted))
}
