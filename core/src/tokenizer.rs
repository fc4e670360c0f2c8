use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref RE: Regex = Regex::new(r"\p{L}+").expect("valid regex");
    static ref STEMMER: Stemmer = Stemmer::create(Algorithm::English);
}

/// Turns raw text into the ordered sequence of index terms.
///
/// The same normalizer must be used at build time and at query time.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: &str) -> Vec<String>;
}

/// NFKC, lowercase, letter runs only, English stemming. Stop words are kept so
/// positions stay dense for phrase matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishNormalizer;

impl Normalizer for EnglishNormalizer {
    fn normalize(&self, raw: &str) -> Vec<String> {
        let normalized = raw.nfkc().collect::<String>().to_lowercase();
        RE.find_iter(&normalized)
            .map(|m| STEMMER.stem(m.as_str()).into_owned())
            .collect()
    }
}

impl<F> Normalizer for F
where
    F: Fn(&str) -> Vec<String> + Send + Sync,
{
    fn normalize(&self, raw: &str) -> Vec<String> { self(raw) }
}

/// Whitespace split with no further processing; handy when terms are already normalized.
pub fn whitespace(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
