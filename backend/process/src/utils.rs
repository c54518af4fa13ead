use std::sync::LazyLock;

use regex::Regex;

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[_/]").expect("separator pattern is valid"));
static NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9\- ]").expect("noise pattern is valid"));
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" +").expect("space pattern is valid"));

/// Lowercase, punctuation-free form of a catalog label.
pub fn sanitize(input: &str) -> String {
    let s = SEPARATORS.replace_all(input, " ");
    let s = NOISE.replace_all(&s, "");

    SPACES.replace_all(s.trim(), " ").to_lowercase()
}

/// Two catalog entries describe the same device when brand and model agree after sanitizing.
pub fn catalog_key(brand: &str, model: &str) -> String {
    format!("{}|{}", sanitize(brand), sanitize(model))
}
