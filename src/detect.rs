//! Pluggable error-page detection.
//!
//! Detectors scan rendered markup for known failure signatures (challenge
//! pages, rate-limit banners, soft 404s). Every configured detector runs
//! against every extracted document; a non-empty result suppresses the
//! outcome's final markup while the raw markup is kept for diagnostics.

/// Scanner that flags known failure signatures in rendered markup.
///
/// Returns the signatures found, in match order; an empty list means the
/// detector found nothing. Detection is pure — no detector is allowed to
/// touch the page.
pub trait ErrorDetector: Send + Sync {
    /// Identifier used in log output.
    fn name(&self) -> &str {
        "detector"
    }

    fn detect(&self, html: &str) -> Vec<String>;
}

impl<F> ErrorDetector for F
where
    F: Fn(&str) -> Vec<String> + Send + Sync,
{
    fn detect(&self, html: &str) -> Vec<String> {
        self(html)
    }
}

/// Detector matching a fixed set of case-insensitive substring signatures.
#[derive(Debug, Clone)]
pub struct SignatureDetector {
    name: String,
    signatures: Vec<String>,
}

impl SignatureDetector {
    pub fn new(name: impl Into<String>, signatures: impl IntoIterator<Item = String>) -> Self {
        Self {
            name: name.into(),
            signatures: signatures.into_iter().collect(),
        }
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }
}

impl ErrorDetector for SignatureDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, html: &str) -> Vec<String> {
        let haystack = html.to_ascii_lowercase();
        self.signatures
            .iter()
            .filter(|signature| haystack.contains(&signature.to_ascii_lowercase()))
            .cloned()
            .collect()
    }
}
