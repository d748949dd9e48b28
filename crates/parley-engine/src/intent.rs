//! Keyword-based activity hints.
//!
//! The hint is cosmetic: it tells the user what the assistant is probably
//! doing while the reply streams in. Nothing in the engine branches on it.

use serde::{Deserialize, Serialize};

/// Inferred activity for an outgoing message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentHint {
    /// Looking for leads or prospects.
    SearchingLeads,
    /// Writing an email or outreach campaign.
    DraftingEmail,
    /// Answering from the knowledge base.
    CheckingKnowledgeBase,
    /// Building or editing a website.
    BuildingWebsite,
    /// Reports and numbers.
    AnalyzingData,
    /// Settings and channel integrations.
    UpdatingSettings,
    /// Small talk.
    Greeting,
    /// Nothing matched.
    #[default]
    Thinking,
}

impl IntentHint {
    /// Label shown while the reply is in flight.
    pub fn label(&self) -> &'static str {
        match self {
            Self::SearchingLeads => "Searching for leads",
            Self::DraftingEmail => "Drafting an email",
            Self::CheckingKnowledgeBase => "Checking the knowledge base",
            Self::BuildingWebsite => "Working on your website",
            Self::AnalyzingData => "Analyzing your data",
            Self::UpdatingSettings => "Looking at your settings",
            Self::Greeting => "Saying hello",
            Self::Thinking => "Thinking",
        }
    }
}

/// Ordered rules, English then Russian keywords per hint. First match wins.
///
/// Russian keywords are stems so that inflected forms still match.
const INTENT_RULES: &[(IntentHint, &[&str])] = &[
    (
        IntentHint::SearchingLeads,
        &[
            "lead", "prospect", "find me", "search for", "companies in", "contacts",
            "лид", "клиент", "найди", "поиск", "компани",
        ],
    ),
    (
        IntentHint::DraftingEmail,
        &[
            "email", "e-mail", "mail", "outreach", "newsletter", "follow up", "follow-up",
            "письм", "почт", "рассылк",
        ],
    ),
    (
        IntentHint::CheckingKnowledgeBase,
        &[
            "knowledge", "document", "faq", "policy", "pricing",
            "знани", "документ", "баз",
        ],
    ),
    (
        IntentHint::BuildingWebsite,
        &["website", "landing", "web page", "site", "сайт", "лендинг"],
    ),
    (
        IntentHint::AnalyzingData,
        &[
            "report", "analytic", "statistic", "conversion", "metric",
            "отчет", "отчёт", "аналитик", "статистик",
        ],
    ),
    (
        IntentHint::UpdatingSettings,
        &[
            "setting", "configure", "integration", "telegram", "whatsapp",
            "настройк", "интеграци",
        ],
    ),
    (
        IntentHint::Greeting,
        &[
            "hello", "hey", "good morning", "good evening", "greetings",
            "привет", "здравствуй", "добрый день",
        ],
    ),
];

/// Classify `text` by case-insensitive substring match against the rule table.
pub fn classify(text: &str) -> IntentHint {
    let lowered = text.to_lowercase();
    INTENT_RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(hint, _)| *hint)
        .unwrap_or_default()
}

/// Hint label once the service has reported its model.
pub fn model_label(model_id: &str) -> String {
    format!("Answering with {}", model_id)
}
