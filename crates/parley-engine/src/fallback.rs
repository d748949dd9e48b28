//! Offline replies used when the assistant service cannot be reached.

use crate::intent::{classify, IntentHint};

const LEADS_REPLY: &str = "\
I can help you find new leads.

**What I need from you**
- Target location (city or country)
- Industry or type of business
- How many leads you want to start with

**What happens next**
I will search public sources, collect company names and contact details, \
and save the results to your Leads table so you can review them.";

const EMAIL_REPLY: &str = "\
Let's put together an email.

**Tell me**
- Who the email is for
- The goal: introduction, follow-up or offer
- The tone you prefer

**Then**
I will draft a subject line and body you can edit before anything is sent.";

const KNOWLEDGE_REPLY: &str = "\
I answer questions using your knowledge base.

**How to get the best answer**
- Ask about a specific product, policy or price
- Upload documents on the Knowledge Base page if something is missing

**Note**
Answers are only as current as the documents you have added.";

const WEBSITE_REPLY: &str = "\
I can help you build a website.

**To get started**
- Describe your business in one or two sentences
- List the sections you want (about, services, contact)
- Share colours or examples you like

**Result**
You will get a draft page you can preview and adjust.";

const ANALYTICS_REPLY: &str = "\
Here is how I can help with your numbers.

**Available reports**
- Leads collected over time
- Email opens and replies
- Conversations per channel

**Next step**
Tell me which period and metric you want to look at.";

const SETTINGS_REPLY: &str = "\
Let's look at your configuration.

**You can manage**
- Channel connections: email, Telegram, WhatsApp
- Assistant name and tone
- Notification preferences

**Where**
Open the Settings page, or tell me what you want to change.";

const GREETING_REPLY: &str = "\
Hello! I'm your sales assistant.

**I can help you**
- Find leads in any city or industry
- Write outreach emails
- Answer questions from your knowledge base

**Try asking**
\"Find me leads in Dubai\" or \"Draft a follow-up email\".";

const DEFAULT_REPLY: &str = "\
I'm having trouble reaching the assistant right now, but I can still point you in the right direction.

**Things I can do**
- Find and organise leads
- Draft emails and campaigns
- Answer questions from your knowledge base
- Help set up your website and channels

**Meanwhile**
Try rephrasing your request, or ask again in a moment.";

/// Deterministic canned reply for `text`, keyed by its intent.
///
/// Never empty, for any input.
pub fn fallback_reply(text: &str) -> String {
    let reply = match classify(text) {
        IntentHint::SearchingLeads => LEADS_REPLY,
        IntentHint::DraftingEmail => EMAIL_REPLY,
        IntentHint::CheckingKnowledgeBase => KNOWLEDGE_REPLY,
        IntentHint::BuildingWebsite => WEBSITE_REPLY,
        IntentHint::AnalyzingData => ANALYTICS_REPLY,
        IntentHint::UpdatingSettings => SETTINGS_REPLY,
        IntentHint::Greeting => GREETING_REPLY,
        IntentHint::Thinking => DEFAULT_REPLY,
    };
    reply.to_string()
}
