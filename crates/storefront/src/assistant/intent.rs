//! Keyword intent routing for shopper messages.
//!
//! Input is lower-cased and split on whitespace; each token is compared
//! against the keyword sets below in order. The first set with a matching
//! token wins. Tokens keep their punctuation, so `order?` does not match
//! `order`.

use std::fmt;

/// What the shopper is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    OrderSupport,
    CartRecovery,
    Support,
    Recommendation,
    LeadGen,
}

impl Intent {
    /// Query used in the prompt when the shopper typed nothing.
    #[must_use]
    pub const fn default_query(self) -> &'static str {
        match self {
            Self::Recommendation => "What are you looking for today?",
            Self::CartRecovery => "Left something in your cart?",
            Self::Support => "How can I assist you today?",
            Self::LeadGen => "Looking for something stylish?",
            Self::OrderSupport => "How can I help with your order?",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderSupport => "order_support",
            Self::CartRecovery => "cart_recovery",
            Self::Support => "support",
            Self::Recommendation => "recommendation",
            Self::LeadGen => "lead_gen",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword sets in priority order.
pub const INTENT_TABLE: &[(Intent, &[&str])] = &[
    (Intent::OrderSupport, &["order", "status", "track", "shipment"]),
    (Intent::CartRecovery, &["cart", "abandon", "buy", "purchase"]),
    (Intent::Support, &["help", "support", "return", "returns"]),
    (Intent::Recommendation, &["recommend", "looking", "need", "want"]),
    (Intent::LeadGen, &["name", "email", "lead", "contact"]),
];

/// Classify a shopper message. Blank or unmatched input is a recommendation.
#[must_use]
pub fn classify(input: &str) -> Intent {
    let lowered = input.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();

    INTENT_TABLE
        .iter()
        .find(|(_, keywords)| tokens.iter().any(|token| keywords.contains(token)))
        .map_or(Intent::Recommendation, |(intent, _)| *intent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_examples() {
        assert_eq!(classify("track my order"), Intent::OrderSupport);
        assert_eq!(classify("add to cart please"), Intent::CartRecovery);
        assert_eq!(classify("I need help returning this"), Intent::Support);
        assert_eq!(classify("looking for jeans"), Intent::Recommendation);
        assert_eq!(classify("what's your email policy"), Intent::LeadGen);
    }

    #[test]
    fn test_priority_order_wins() {
        assert_eq!(classify("order help"), Intent::OrderSupport);
        assert_eq!(classify("help me buy"), Intent::CartRecovery);
        assert_eq!(classify("want my name"), Intent::Recommendation);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("TRACK Shipment"), Intent::OrderSupport);
    }

    #[test]
    fn test_defaults_to_recommendation() {
        assert_eq!(classify(""), Intent::Recommendation);
        assert_eq!(classify("   \t"), Intent::Recommendation);
        assert_eq!(classify("hello there"), Intent::Recommendation);
    }

    #[test]
    fn test_punctuation_is_part_of_the_token() {
        assert_eq!(classify("where is my order?"), Intent::Recommendation);
    }

    #[test]
    fn test_default_queries() {
        assert_eq!(
            Intent::OrderSupport.default_query(),
            "How can I help with your order?"
        );
        assert_eq!(
            Intent::Recommendation.default_query(),
            "What are you looking for today?"
        );
    }
}
