//! Shopping assistant chat controller.
//!
//! # State
//!
//! ```text
//! Collapsed --toggle--> Expanded/Idle --send--> Expanded/Sending --reply--> Expanded/Idle
//!     ^                      |
//!     +-------toggle---------+
//! ```
//!
//! The first expand with an empty transcript adds a welcome message and
//! hides the popup hint. Every accepted send appends the shopper's message
//! and then exactly one assistant message: the model's reply or a fixed
//! fallback.
//!
//! A send runs in three steps: [`ChatAssistant::begin_send`] records the
//! shopper's message and snapshots the request, [`PendingReply::resolve`]
//! talks to the model without touching the assistant, and
//! [`ChatAssistant::finish_send`] records the reply. [`send_shared`] runs
//! the model call with the lock released and on its own task, so readers
//! see `is_loading` while it is pending and a dropped caller still gets
//! its reply recorded.

pub mod completion;
pub mod intent;
pub mod prompts;

pub use completion::{
    CompletionError, CompletionGateway, CompletionMessage, CompletionRequest, OpenAiClient,
};
pub use intent::{INTENT_TABLE, Intent, classify};
pub use prompts::{PromptError, build_prompt};

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinError;
use tracing::{info, instrument, warn};

use ltrq_core::ChatRole;

use crate::catalog::CatalogStore;
use crate::config::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use crate::models::{AssistantProduct, ChatMessage, ChatView};

/// Greeting added on the first expand.
pub const WELCOME_MESSAGE: &str = "Hello! I’m LTRQ AI, your personal shopping assistant. I can help you find stylish clothes, recover your cart, track orders, or answer questions. What can I assist you with today?";

/// Reply when the completion call fails for any reason.
pub const FALLBACK_MESSAGE: &str = "Sorry, something went wrong.";

/// Reply when there is no catalog to recommend from.
pub const NO_CATALOG_MESSAGE: &str =
    "Sorry, I can’t recommend products right now. Please try again later.";

/// An assistant shared between request handlers.
pub type SharedChat = Arc<Mutex<ChatAssistant>>;

/// Model settings for outgoing requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSettings {
    pub model: String,
    pub max_tokens: u32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// One shopper's chat session.
pub struct ChatAssistant {
    messages: Vec<ChatMessage>,
    is_expanded: bool,
    pending_replies: usize,
    show_popup: bool,
    products: Vec<AssistantProduct>,
    is_products_loading: bool,
    gateway: Arc<dyn CompletionGateway>,
    settings: CompletionSettings,
}

impl ChatAssistant {
    /// A collapsed assistant with no catalog loaded yet.
    #[must_use]
    pub fn new(gateway: Arc<dyn CompletionGateway>, settings: CompletionSettings) -> Self {
        Self {
            messages: Vec::new(),
            is_expanded: false,
            pending_replies: 0,
            show_popup: true,
            products: Vec::new(),
            is_products_loading: true,
            gateway,
            settings,
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub const fn is_expanded(&self) -> bool {
        self.is_expanded
    }

    /// True while any accepted message is waiting for its reply.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.pending_replies > 0
    }

    #[must_use]
    pub const fn show_popup(&self) -> bool {
        self.show_popup
    }

    #[must_use]
    pub fn products(&self) -> &[AssistantProduct] {
        &self.products
    }

    #[must_use]
    pub const fn is_products_loading(&self) -> bool {
        self.is_products_loading
    }

    /// Snapshot for the chat API.
    #[must_use]
    pub fn view(&self) -> ChatView {
        ChatView {
            messages: self.messages.clone(),
            is_expanded: self.is_expanded,
            is_loading: self.is_loading(),
            show_popup: self.show_popup,
            is_products_loading: self.is_products_loading,
        }
    }

    /// Load the catalog snapshot the prompts describe.
    ///
    /// Keeps records with a name, price, colour and size. A failed fetch or
    /// an empty result leaves a single built-in product.
    #[instrument(skip_all)]
    pub async fn load_products(&mut self, catalog: &dyn CatalogStore) {
        self.is_products_loading = true;

        let products: Vec<AssistantProduct> = match catalog.fetch_all().await {
            Ok(records) => records
                .iter()
                .filter(|product| product.has_required_fields())
                .map(AssistantProduct::from)
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to load catalog for assistant");
                Vec::new()
            }
        };

        self.products = if products.is_empty() {
            warn!("No usable catalog records, using fallback product");
            vec![AssistantProduct::fallback()]
        } else {
            products
        };
        self.is_products_loading = false;
        info!(products = self.products.len(), "Assistant catalog loaded");
    }

    /// Expand or collapse the chat window.
    pub fn toggle(&mut self) {
        self.is_expanded = !self.is_expanded;
        if self.is_expanded {
            self.show_popup = false;
            if self.messages.is_empty() {
                self.messages.push(ChatMessage::assistant(WELCOME_MESSAGE));
            }
        }
    }

    /// Send a shopper message and wait for the reply.
    ///
    /// Blank input is ignored and returns `None`. Otherwise the appended
    /// assistant message is returned. If this future is dropped before the
    /// reply arrives, the fallback message is recorded in its place.
    #[instrument(skip_all)]
    pub async fn send(&mut self, input: &str) -> Option<&ChatMessage> {
        let pending = self.begin_send(input)?;

        let mut guard = ReplyGuard {
            chat: &mut *self,
            armed: true,
        };
        let reply = pending.resolve().await;
        guard.armed = false;
        drop(guard);

        self.finish_send(reply)
    }

    /// Record a shopper message and prepare its reply.
    ///
    /// Returns `None` for blank input. Every `Some` must be followed by
    /// exactly one [`Self::finish_send`].
    #[must_use]
    pub fn begin_send(&mut self, input: &str) -> Option<PendingReply> {
        if input.trim().is_empty() {
            return None;
        }

        let history: Vec<CompletionMessage> = self
            .messages
            .iter()
            .map(|message| CompletionMessage::new(message.role(), message.text.clone()))
            .collect();

        self.messages.push(ChatMessage::user(input));
        self.pending_replies += 1;

        if self.is_products_loading || self.products.is_empty() {
            return Some(PendingReply::Ready(NO_CATALOG_MESSAGE.to_string()));
        }

        let pending = match self.request(input, history) {
            Ok(request) => PendingReply::Completion {
                gateway: Arc::clone(&self.gateway),
                request,
            },
            Err(e) => {
                warn!(error = %e, "Assistant prompt failed");
                PendingReply::Ready(FALLBACK_MESSAGE.to_string())
            }
        };
        Some(pending)
    }

    /// Record the reply to a message accepted by [`Self::begin_send`].
    pub fn finish_send(&mut self, reply: String) -> Option<&ChatMessage> {
        self.messages.push(ChatMessage::assistant(reply));
        self.pending_replies = self.pending_replies.saturating_sub(1);
        self.messages.last()
    }

    fn request(
        &self,
        input: &str,
        history: Vec<CompletionMessage>,
    ) -> Result<CompletionRequest, PromptError> {
        let (intent, prompt) = build_prompt(input, &self.products)?;
        info!(%intent, "Routing assistant message");

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(CompletionMessage::new(ChatRole::System, prompt));
        messages.extend(history);
        messages.push(CompletionMessage::new(ChatRole::User, input));

        Ok(CompletionRequest {
            model: self.settings.model.clone(),
            messages,
            max_tokens: self.settings.max_tokens,
        })
    }
}

/// Records the fallback reply if a send is abandoned mid-flight.
struct ReplyGuard<'a> {
    chat: &'a mut ChatAssistant,
    armed: bool,
}

impl Drop for ReplyGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Assistant reply abandoned");
            self.chat.finish_send(FALLBACK_MESSAGE.to_string());
        }
    }
}

/// The reply to a message accepted by [`ChatAssistant::begin_send`].
pub enum PendingReply {
    /// Known without calling the model.
    Ready(String),
    /// Needs a completion call.
    Completion {
        gateway: Arc<dyn CompletionGateway>,
        request: CompletionRequest,
    },
}

impl PendingReply {
    /// Produce the reply text. Failures become [`FALLBACK_MESSAGE`].
    pub async fn resolve(self) -> String {
        match self {
            Self::Ready(text) => text,
            Self::Completion { gateway, request } => match gateway.complete(&request).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Assistant reply failed");
                    FALLBACK_MESSAGE.to_string()
                }
            },
        }
    }
}

/// Send through a shared assistant.
///
/// The lock is only held to record the message and the reply. The model
/// call and the final update run on a spawned task that outlives the
/// caller. Returns `Ok(None)` for blank input.
///
/// # Errors
///
/// Returns the join error if the reply task panicked.
pub async fn send_shared(
    chat: &SharedChat,
    input: &str,
) -> Result<Option<(ChatMessage, ChatView)>, JoinError> {
    let Some(pending) = chat.lock().await.begin_send(input) else {
        return Ok(None);
    };

    let chat = Arc::clone(chat);
    tokio::spawn(async move {
        let reply = pending.resolve().await;
        let mut chat = chat.lock().await;
        let message = chat.finish_send(reply).cloned();
        message.map(|message| (message, chat.view()))
    })
    .await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use ltrq_core::{ItemId, Price, Product, ProductPatch, RowId};
    use tokio::sync::Notify;

    use super::*;
    use crate::assistant::completion::CompletionFuture;
    use crate::catalog::{CatalogError, CatalogFuture};

    /// Replies with a canned text or fails, and records every request.
    struct FakeGateway {
        reply: Option<String>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl FakeGateway {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(text.to_string()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl CompletionGateway for FakeGateway {
        fn complete<'a>(&'a self, request: &'a CompletionRequest) -> CompletionFuture<'a> {
            Box::pin(async move {
                self.requests.lock().unwrap().push(request.clone());
                self.reply.clone().ok_or(CompletionError::Api {
                    error_type: "server_error".to_string(),
                    message: "boom".to_string(),
                })
            })
        }
    }

    /// Holds every reply until released.
    #[derive(Default)]
    struct GatedGateway {
        release: Notify,
    }

    impl CompletionGateway for GatedGateway {
        fn complete<'a>(&'a self, _request: &'a CompletionRequest) -> CompletionFuture<'a> {
            Box::pin(async move {
                self.release.notified().await;
                Ok("Here you go".to_string())
            })
        }
    }

    /// Never answers.
    struct SilentGateway;

    impl CompletionGateway for SilentGateway {
        fn complete<'a>(&'a self, _request: &'a CompletionRequest) -> CompletionFuture<'a> {
            Box::pin(std::future::pending())
        }
    }

    struct FixedCatalog(Result<Vec<Product>, ()>);

    impl CatalogStore for FixedCatalog {
        fn fetch_all(&self) -> CatalogFuture<'_, Vec<Product>> {
            let result = self.0.clone().map_err(|()| CatalogError::Rejected {
                status: 500,
                message: "down".to_string(),
            });
            Box::pin(async move { result })
        }

        fn add_product<'a>(&'a self, _product: &'a Product) -> CatalogFuture<'a, Product> {
            Box::pin(async { Err(CatalogError::Parse("read only".to_string())) })
        }

        fn update_product<'a>(
            &'a self,
            id: RowId,
            _patch: &'a ProductPatch,
        ) -> CatalogFuture<'a, Product> {
            Box::pin(async move { Err(CatalogError::ProductNotFound(id)) })
        }
    }

    fn jeans() -> Product {
        Product {
            item_id: ItemId::new(2),
            item_name: "Classic Jeans".to_string(),
            price: Price::from_cents(3999),
            color: "Blue".to_string(),
            item_size: "M".to_string(),
            ..Product::default()
        }
    }

    async fn ready_with(gateway: Arc<dyn CompletionGateway>) -> ChatAssistant {
        let mut assistant = ChatAssistant::new(gateway, CompletionSettings::default());
        assistant
            .load_products(&FixedCatalog(Ok(vec![jeans()])))
            .await;
        assistant
    }

    async fn wait_until_loading(chat: &SharedChat) {
        for _ in 0..100 {
            if chat.lock().await.is_loading() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("send never started");
    }

    async fn ready(gateway: Arc<FakeGateway>) -> ChatAssistant {
        let mut assistant = ChatAssistant::new(gateway, CompletionSettings::default());
        assistant
            .load_products(&FixedCatalog(Ok(vec![jeans()])))
            .await;
        assistant
    }

    #[test]
    fn test_first_expand_adds_welcome_once() {
        let mut assistant =
            ChatAssistant::new(FakeGateway::replying("hi"), CompletionSettings::default());
        assert!(assistant.show_popup());
        assert!(!assistant.is_expanded());

        assistant.toggle();
        assert!(assistant.is_expanded());
        assert!(!assistant.show_popup());
        assert_eq!(assistant.messages().len(), 1);
        assert_eq!(assistant.messages()[0].text, WELCOME_MESSAGE);
        assert!(!assistant.messages()[0].is_user);

        assistant.toggle();
        assert!(!assistant.is_expanded());
        assistant.toggle();
        assert_eq!(assistant.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_blank_input_does_nothing() {
        let gateway = FakeGateway::replying("hi");
        let mut assistant = ready(Arc::clone(&gateway)).await;

        assert!(assistant.send("   ").await.is_none());
        assert!(assistant.send("").await.is_none());
        assert!(assistant.messages().is_empty());
        assert!(gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_send_builds_request_in_order() {
        let gateway = FakeGateway::replying("Try the Classic Jeans!");
        let mut assistant = ready(Arc::clone(&gateway)).await;
        assistant.toggle();

        let reply = assistant.send("track my order").await.unwrap();
        assert_eq!(reply.text, "Try the Classic Jeans!");
        assert!(!assistant.is_loading());

        let requests = gateway.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "gpt-3.5-turbo");
        assert_eq!(request.max_tokens, 150);

        let roles: Vec<ChatRole> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::Assistant, ChatRole::User]
        );
        assert!(request.messages[0].content.contains("reliable and efficient"));
        assert!(request.messages[0].content.contains("Classic Jeans"));
        assert_eq!(request.messages[1].content, WELCOME_MESSAGE);
        assert_eq!(request.messages[2].content, "track my order");

        let texts: Vec<&str> = assistant.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![WELCOME_MESSAGE, "track my order", "Try the Classic Jeans!"]
        );
    }

    #[tokio::test]
    async fn test_history_includes_prior_turns() {
        let gateway = FakeGateway::replying("Sure!");
        let mut assistant = ready(Arc::clone(&gateway)).await;

        assistant.send("looking for jeans").await;
        assistant.send("I want to buy them").await;

        let second = &gateway.requests()[1];
        let roles: Vec<ChatRole> = second.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                ChatRole::System,
                ChatRole::User,
                ChatRole::Assistant,
                ChatRole::User
            ]
        );
        assert!(second.messages[0].content.contains("recover abandoned carts"));
    }

    #[tokio::test]
    async fn test_failed_completion_appends_one_fallback() {
        let gateway = FakeGateway::failing();
        let mut assistant = ready(Arc::clone(&gateway)).await;

        let reply = assistant.send("I need help returning this").await.unwrap();
        assert_eq!(reply.text, FALLBACK_MESSAGE);
        assert_eq!(assistant.messages().len(), 2);
        assert!(!assistant.is_loading());
        assert_eq!(gateway.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_products_loading_skips_network() {
        let gateway = FakeGateway::replying("unused");
        let mut assistant = ChatAssistant::new(
            Arc::clone(&gateway) as Arc<dyn CompletionGateway>,
            CompletionSettings::default(),
        );

        let reply = assistant.send("looking for jeans").await.unwrap();
        assert_eq!(reply.text, NO_CATALOG_MESSAGE);
        assert!(gateway.requests().is_empty());
        assert!(!assistant.is_loading());
    }

    #[tokio::test]
    async fn test_empty_catalog_skips_network() {
        let gateway = FakeGateway::replying("unused");
        let mut assistant = ready(Arc::clone(&gateway)).await;
        assistant.products.clear();

        let reply = assistant.send("looking for jeans").await.unwrap();
        assert_eq!(reply.text, NO_CATALOG_MESSAGE);
        assert!(gateway.requests().is_empty());
    }

    #[tokio::test]
    async fn test_catalog_failure_uses_fallback_product() {
        let mut assistant =
            ChatAssistant::new(FakeGateway::replying("hi"), CompletionSettings::default());
        assert!(assistant.is_products_loading());

        assistant.load_products(&FixedCatalog(Err(()))).await;
        assert!(!assistant.is_products_loading());
        assert_eq!(assistant.products(), &[AssistantProduct::fallback()]);
    }

    #[tokio::test]
    async fn test_catalog_filters_incomplete_records() {
        let mut incomplete = jeans();
        incomplete.item_size = String::new();

        let mut assistant =
            ChatAssistant::new(FakeGateway::replying("hi"), CompletionSettings::default());
        assistant
            .load_products(&FixedCatalog(Ok(vec![incomplete.clone(), jeans()])))
            .await;
        assert_eq!(assistant.products().len(), 1);
        assert_eq!(assistant.products()[0].item_name, "Classic Jeans");

        assistant
            .load_products(&FixedCatalog(Ok(vec![incomplete])))
            .await;
        assert_eq!(assistant.products(), &[AssistantProduct::fallback()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_send_records_fallback() {
        let mut assistant = ready_with(Arc::new(SilentGateway)).await;

        let outcome =
            tokio::time::timeout(Duration::from_millis(50), assistant.send("looking for jeans"))
                .await;
        assert!(outcome.is_err());

        assert!(!assistant.is_loading());
        assert_eq!(assistant.messages().len(), 2);
        let last = assistant.messages().last().unwrap();
        assert!(!last.is_user);
        assert_eq!(last.text, FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn test_view_readable_while_reply_pending() {
        let gateway = Arc::new(GatedGateway::default());
        let chat: SharedChat = Arc::new(tokio::sync::Mutex::new(
            ready_with(Arc::clone(&gateway) as Arc<dyn CompletionGateway>).await,
        ));

        let sending = tokio::spawn({
            let chat = Arc::clone(&chat);
            async move { send_shared(&chat, "looking for jeans").await }
        });
        wait_until_loading(&chat).await;

        let view = chat.lock().await.view();
        assert!(view.is_loading);
        assert_eq!(view.messages.len(), 1);
        assert!(view.messages[0].is_user);

        chat.lock().await.toggle();
        assert!(chat.lock().await.is_expanded());

        gateway.release.notify_one();
        let (reply, view) = sending.await.unwrap().unwrap().unwrap();
        assert_eq!(reply.text, "Here you go");
        assert!(!view.is_loading);
        assert_eq!(view.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_shared_send_survives_dropped_caller() {
        let gateway = Arc::new(GatedGateway::default());
        let chat: SharedChat = Arc::new(tokio::sync::Mutex::new(
            ready_with(Arc::clone(&gateway) as Arc<dyn CompletionGateway>).await,
        ));

        let sending = tokio::spawn({
            let chat = Arc::clone(&chat);
            async move { send_shared(&chat, "looking for jeans").await }
        });
        wait_until_loading(&chat).await;
        sending.abort();

        gateway.release.notify_one();
        for _ in 0..100 {
            if !chat.lock().await.is_loading() {
                break;
            }
            tokio::task::yield_now().await;
        }

        let assistant = chat.lock().await;
        assert!(!assistant.is_loading());
        let texts: Vec<&str> = assistant.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["looking for jeans", "Here you go"]);
    }

    #[tokio::test]
    async fn test_shared_send_ignores_blank_input() {
        let gateway = FakeGateway::replying("hi");
        let chat: SharedChat = Arc::new(tokio::sync::Mutex::new(ready(Arc::clone(&gateway)).await));

        assert!(send_shared(&chat, "  ").await.unwrap().is_none());
        assert!(chat.lock().await.messages().is_empty());
        assert!(gateway.requests().is_empty());
    }
}
