//! System prompt templates.
//!
//! One askama template per intent under `templates/assistant/`. Each embeds
//! the catalog snapshot as compact JSON and the shopper's query.

use askama::Template;
use thiserror::Error;

use super::intent::{Intent, classify};
use crate::models::AssistantProduct;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to serialize catalog: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to render prompt: {0}")]
    Render(#[from] askama::Error),
}

#[derive(Template)]
#[template(path = "assistant/recommendation.txt")]
struct RecommendationPrompt<'a> {
    products: &'a str,
    query: &'a str,
}

#[derive(Template)]
#[template(path = "assistant/cart_recovery.txt")]
struct CartRecoveryPrompt<'a> {
    products: &'a str,
    query: &'a str,
}

#[derive(Template)]
#[template(path = "assistant/support.txt")]
struct SupportPrompt<'a> {
    products: &'a str,
    query: &'a str,
}

#[derive(Template)]
#[template(path = "assistant/lead_gen.txt")]
struct LeadGenPrompt<'a> {
    products: &'a str,
    query: &'a str,
}

#[derive(Template)]
#[template(path = "assistant/order_support.txt")]
struct OrderSupportPrompt<'a> {
    products: &'a str,
    query: &'a str,
}

/// Render the template for `intent`.
///
/// A missing or blank `input` is replaced by the intent's default query.
///
/// # Errors
///
/// Returns error if the catalog cannot be serialized or the template fails.
pub fn render(
    intent: Intent,
    products: &[AssistantProduct],
    input: Option<&str>,
) -> Result<String, PromptError> {
    let products = serde_json::to_string(products)?;
    let query = input
        .filter(|text| !text.trim().is_empty())
        .unwrap_or_else(|| intent.default_query());
    let products = products.as_str();

    let rendered = match intent {
        Intent::Recommendation => RecommendationPrompt { products, query }.render()?,
        Intent::CartRecovery => CartRecoveryPrompt { products, query }.render()?,
        Intent::Support => SupportPrompt { products, query }.render()?,
        Intent::LeadGen => LeadGenPrompt { products, query }.render()?,
        Intent::OrderSupport => OrderSupportPrompt { products, query }.render()?,
    };
    Ok(rendered)
}

/// Pick the template for a shopper message and render it.
///
/// Blank input and an empty catalog both fall back to the recommendation
/// template; an empty catalog also drops the shopper's text.
///
/// # Errors
///
/// Returns error if rendering fails.
pub fn build_prompt(
    input: &str,
    products: &[AssistantProduct],
) -> Result<(Intent, String), PromptError> {
    if input.trim().is_empty() {
        let prompt = render(Intent::Recommendation, products, None)?;
        return Ok((Intent::Recommendation, prompt));
    }
    if products.is_empty() {
        let prompt = render(Intent::Recommendation, &[], None)?;
        return Ok((Intent::Recommendation, prompt));
    }

    let intent = classify(input);
    Ok((intent, render(intent, products, Some(input))?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn catalog() -> Vec<AssistantProduct> {
        vec![AssistantProduct::fallback()]
    }

    #[test]
    fn test_prompt_embeds_catalog_and_query() {
        let (intent, prompt) = build_prompt("track my order", &catalog()).unwrap();
        assert_eq!(intent, Intent::OrderSupport);
        assert!(prompt.starts_with("You are LTRQ AI, a reliable and efficient"));
        assert!(prompt.contains(
            r#"[{"itemName":"Slim Fit Shirt","Price":29.99,"Color":"Red","ItemSize":"S"}]"#
        ));
        assert!(prompt.trim_end().ends_with("Customer query: track my order"));
    }

    #[test]
    fn test_blank_input_uses_default_query() {
        let (intent, prompt) = build_prompt("  ", &catalog()).unwrap();
        assert_eq!(intent, Intent::Recommendation);
        assert!(prompt.contains("Slim Fit Shirt"));
        assert!(prompt.contains("Customer query: What are you looking for today?"));
    }

    #[test]
    fn test_empty_catalog_forces_recommendation() {
        let (intent, prompt) = build_prompt("track my order", &[]).unwrap();
        assert_eq!(intent, Intent::Recommendation);
        assert!(prompt.contains("the following list: []."));
    }

    #[test]
    fn test_each_intent_has_its_own_template() {
        let products = catalog();
        let openings = [
            (Intent::CartRecovery, "proactive and persuasive"),
            (Intent::Support, "24/7 customer service"),
            (Intent::LeadGen, "charismatic and engaging"),
            (Intent::Recommendation, "highly knowledgeable"),
            (Intent::OrderSupport, "reliable and efficient"),
        ];
        for (intent, opening) in openings {
            let prompt = render(intent, &products, None).unwrap();
            assert!(prompt.contains(opening), "{intent} missing {opening}");
            assert!(prompt.contains(intent.default_query()));
        }
    }

    #[test]
    fn test_query_is_not_escaped() {
        let prompt = render(Intent::Support, &catalog(), Some("<b>returns</b> & refunds")).unwrap();
        assert!(prompt.contains("<b>returns</b> & refunds"));
    }
}
