use regex::Regex;

use crate::extract::ExtractedFields;

/// Labels derived from extracted fields by deterministic, side-effect-free
/// rules. Identical inputs always produce identical output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub is_blog: bool,
    pub niche: &'static str,
}

const BLOG_THRESHOLD: u32 = 2;

// Heuristic vocabulary, not contract: tune freely, keep it deterministic.
const BLOG_SIGNALS: &[(&str, u32)] = &[
    ("blog", 2),
    ("posts", 1),
    ("post", 1),
    ("archive", 1),
    ("article", 1),
    ("author", 1),
    ("comments", 1),
    ("published", 1),
];

// Checked in order; first keyword hit wins the niche.
const NICHE_RULES: &[(&str, &[&str])] = &[
    ("technology", &["tech", "software", "developer", "programming", "startup", "gadget"]),
    ("finance", &["finance", "bank", "money", "invest", "investing", "stock", "crypto"]),
    ("health", &["health", "doctor", "fitness", "diet", "wellness", "medical"]),
    ("travel", &["travel", "trip", "hotel", "flight", "destination", "adventure"]),
    ("food", &["food", "recipe", "recipes", "chef", "cooking", "restaurant"]),
    ("ecommerce", &["shop", "store", "buy", "cart", "checkout"]),
    ("education", &["course", "learn", "learning", "school", "tutorial", "university"]),
    ("fashion", &["fashion", "style", "clothing", "outfit", "beauty"]),
];

const DEFAULT_NICHE: &str = "general";

/// Classify along both axes. `final_url` contributes path tokens to blog
/// detection; it is empty for failed fetches so everything fails closed.
pub fn classify(fields: &ExtractedFields, final_url: &str) -> ClassificationResult {
    let haystack = format!(
        "{} {} {}",
        fields.title, fields.description, fields.text_sample
    )
    .to_lowercase();
    let url = final_url.to_lowercase();

    ClassificationResult {
        is_blog: blog_score(&haystack, &url) >= BLOG_THRESHOLD,
        niche: detect_niche(&haystack),
    }
}

fn blog_score(haystack: &str, url: &str) -> u32 {
    let mut score = 0u32;
    for (keyword, weight) in BLOG_SIGNALS {
        if contains_word(haystack, keyword) {
            score += weight;
        }
    }
    if haystack.contains("read more") {
        score += 1;
    }
    if url.contains("blog") || url.contains("/posts") {
        score += 2;
    }
    // Dated paths like /2024/05/ are a strong blog tell
    let date_path = Regex::new(r"/20\d{2}/\d{1,2}(/|$)").unwrap();
    if date_path.is_match(url) {
        score += 1;
    }
    score
}

fn detect_niche(haystack: &str) -> &'static str {
    NICHE_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| contains_word(haystack, kw)))
        .map(|(label, _)| *label)
        .unwrap_or(DEFAULT_NICHE)
}

/// Word-boundary match so "ai" never fires inside "daily".
fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}
