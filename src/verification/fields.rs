// src/verification/fields.rs
//! Receipt field predicates: reference, recipient and success status.
//!
//! All matching is case-insensitive substring search over OCR text. The
//! platform-specific knobs live in [`MatchPolicy`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Suffix left after stripping the reference prefix must be at least this long
pub const MIN_REFERENCE_SUFFIX_LEN: usize = 4;
/// Recipient variants of this length or shorter are too ambiguous to count
pub const MIN_RECIPIENT_VARIANT_LEN: usize = 3;

const SUCCESS_WORDS: &[&str] = &["success", "successful", "completed", "approved", "confirmed"];

const NEGATED_SUCCESS_WORDS: &[&str] = &[
    "unsuccessful",
    "not successful",
    "not completed",
    "incomplete",
    "not approved",
    "unapproved",
    "disapproved",
    "not confirmed",
    "unconfirmed",
];

/// Payment app that produced the receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentPlatform {
    #[default]
    Opay,
    PalmPay,
    Generic,
}

impl PaymentPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentPlatform::Opay => "opay",
            PaymentPlatform::PalmPay => "palmpay",
            PaymentPlatform::Generic => "generic",
        }
    }
}

impl fmt::Display for PaymentPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "opay" => Ok(PaymentPlatform::Opay),
            "palmpay" | "palm_pay" => Ok(PaymentPlatform::PalmPay),
            "generic" => Ok(PaymentPlatform::Generic),
            other => Err(format!("unknown receipt platform '{}'", other)),
        }
    }
}

/// Matching rules for one receipt platform.
#[derive(Debug, Clone)]
pub struct MatchPolicy {
    pub platform: PaymentPlatform,
    /// Fixed textual prefix of every payment reference (e.g. `tmzbrand`)
    pub reference_prefix: String,
    /// Accept the numeric suffix of a reference when the full code is mangled
    pub allow_reference_suffix: bool,
    /// Also compare against the text with all whitespace removed
    pub collapse_whitespace: bool,
    pub recipient_aliases: Vec<String>,
    pub success_words: Vec<String>,
    pub negated_success_words: Vec<String>,
}

impl MatchPolicy {
    /// Preset for a platform.
    ///
    /// * `Opay` - full reference or its suffix, plain text comparison
    /// * `PalmPay` - like Opay, but PalmPay receipts wrap the narration so
    ///   whitespace is ignored when looking for the reference
    /// * `Generic` - strict: the full reference must appear
    pub fn for_platform(platform: PaymentPlatform, reference_prefix: impl Into<String>) -> Self {
        let (allow_reference_suffix, collapse_whitespace) = match platform {
            PaymentPlatform::Opay => (true, false),
            PaymentPlatform::PalmPay => (true, true),
            PaymentPlatform::Generic => (false, false),
        };

        Self {
            platform,
            reference_prefix: reference_prefix.into(),
            allow_reference_suffix,
            collapse_whitespace,
            recipient_aliases: Vec::new(),
            success_words: SUCCESS_WORDS.iter().map(|w| w.to_string()).collect(),
            negated_success_words: NEGATED_SUCCESS_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }

    pub fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.recipient_aliases = aliases
            .into_iter()
            .map(|alias| alias.trim().to_string())
            .filter(|alias| !alias.is_empty())
            .collect();
        self
    }
}

/// Pure predicates over receipt text, parameterised by a [`MatchPolicy`]
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    policy: MatchPolicy,
}

impl FieldMatcher {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Is the payment reference (or, failing that, its suffix) in the text?
    pub fn find_reference(&self, text: &str, reference: &str) -> bool {
        let reference = reference.trim();
        if text.trim().is_empty() || reference.is_empty() {
            return false;
        }

        let haystack = text.to_uppercase();
        let compacted: Option<String> = self
            .policy
            .collapse_whitespace
            .then(|| haystack.chars().filter(|c| !c.is_whitespace()).collect());
        let contains = |needle: &str| {
            haystack.contains(needle)
                || compacted
                    .as_deref()
                    .map(|compact| compact.contains(needle))
                    .unwrap_or(false)
        };

        let needle = reference.to_uppercase();
        if contains(&needle) {
            return true;
        }

        if !self.policy.allow_reference_suffix {
            return false;
        }

        match self.reference_suffix(&needle) {
            Some(suffix) if suffix.chars().count() >= MIN_REFERENCE_SUFFIX_LEN => contains(suffix),
            _ => false,
        }
    }

    /// Is the recipient name (or one of its variants) in the text?
    pub fn find_recipient(&self, text: &str, recipient_name: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        let haystack = text.to_uppercase();
        self.recipient_variants(recipient_name)
            .iter()
            .filter(|variant| variant.chars().count() > MIN_RECIPIENT_VARIANT_LEN)
            .any(|variant| haystack.contains(variant.as_str()))
    }

    /// Does the text carry a completion word that is not negated?
    pub fn find_success_status(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }

        let mut lowered = text.to_lowercase();
        for negated in &self.policy.negated_success_words {
            lowered = lowered.replace(negated.as_str(), " ");
        }

        self.policy
            .success_words
            .iter()
            .any(|word| lowered.contains(word.as_str()))
    }

    /// Upper-cased reference with the textual prefix removed.
    fn reference_suffix<'a>(&self, reference: &'a str) -> Option<&'a str> {
        let prefix = self.policy.reference_prefix.trim().to_uppercase();
        let suffix = if !prefix.is_empty() && reference.starts_with(&prefix) {
            &reference[prefix.len()..]
        } else {
            reference.trim_start_matches(|c: char| c.is_alphabetic())
        };

        (suffix.len() < reference.len()).then_some(suffix)
    }

    fn recipient_variants(&self, recipient_name: &str) -> Vec<String> {
        let name = recipient_name.trim().to_uppercase();
        let mut variants = Vec::new();

        if !name.is_empty() {
            variants.push(name.clone());
            variants.push(name.split_whitespace().collect::<String>());
            if let Some(first) = name.split_whitespace().next() {
                variants.push(first.to_string());
            }
        }

        variants.extend(
            self.policy
                .recipient_aliases
                .iter()
                .map(|alias| alias.to_uppercase()),
        );
        variants
    }
}
