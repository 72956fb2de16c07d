use std::sync::Arc;

use async_trait::async_trait;
use log::{error, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::search_engine::WebsiteRecord;
use crate::sequencer::Stage;

/// A generated outreach email: HTML body plus its plain-text counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailContent {
    pub subject: String,
    pub body: String,
    pub text: String,
}

/// Capability seam for the generative text provider.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Produces per-stage email content. With a provider the copy is generated
/// from a persona prompt; without one, or on any provider error, a fixed
/// per-stage template is used instead. This never fails outward.
pub struct ContentGenerator {
    provider: Option<Arc<dyn CompletionProvider>>,
    sender_name: String,
    agency_name: String,
}

impl ContentGenerator {
    pub fn new(
        provider: Option<Arc<dyn CompletionProvider>>,
        sender_name: &str,
        agency_name: &str,
    ) -> Self {
        ContentGenerator {
            provider,
            sender_name: sender_name.to_string(),
            agency_name: agency_name.to_string(),
        }
    }

    pub async fn generate(&self, website: &WebsiteRecord, stage: Stage) -> EmailContent {
        let Some(provider) = &self.provider else {
            warn!("No content provider configured. Using template email content.");
            return self.template_content(website, stage);
        };

        let prompt = self.build_prompt(website, stage);
        match provider.complete(&prompt).await {
            Ok(raw) => parse_completion(&raw),
            Err(e) => {
                error!("Content generation failed: {}. Falling back to template.", e);
                self.template_content(website, stage)
            }
        }
    }

    fn build_prompt(&self, website: &WebsiteRecord, stage: Stage) -> String {
        let base = format!(
            "You are {}, an outreach specialist for {}, a digital marketing agency. \
             Write a personalized email to the owner of {}.",
            self.sender_name, self.agency_name, website.domain
        );

        let specific = match stage {
            Stage::Initial => format!(
                "\nThis is your first contact with them. You want to inquire about \
                 sponsored post opportunities on their blog.\n\
                 Some details about their site:\n\
                 - Domain: {}\n\
                 - Title: {}\n\
                 - Domain Rating: {}\n\n\
                 Write a friendly, professional email that introduces yourself and \
                 your agency, mentions you found their site while researching quality \
                 blogs in their niche, inquires about their sponsored post rates and \
                 guidelines, and ends with a clear call to action.\n\
                 Format your response with a subject line starting with \"Subject:\" \
                 followed by the email body.\n\
                 Keep it concise, around 150-200 words.",
                website.domain,
                website.title.as_deref().unwrap_or("Unknown"),
                dr_display(website),
            ),
            Stage::Followup1 => "\nThis is a follow-up to your initial email sent a few days ago \
                 about sponsored post opportunities. They haven't responded yet.\n\
                 Write a gentle, non-pushy follow-up that references your previous \
                 email, expresses continued interest, offers to answer questions, \
                 and provides a clear call to action.\n\
                 Format your response with a subject line starting with \"Subject:\" \
                 followed by the email body.\n\
                 Keep it very concise, around 100-150 words."
                .to_string(),
            Stage::Followup2 => "\nThis is your final follow-up email regarding sponsored post \
                 opportunities. They haven't responded to your previous two emails.\n\
                 Write a final, value-focused follow-up that mentions this is your \
                 final follow-up, offers a specific benefit or incentive, provides \
                 your contact information, and leaves the door open for future \
                 collaboration.\n\
                 Format your response with a subject line starting with \"Subject:\" \
                 followed by the email body.\n\
                 Keep it extremely concise, around 75-100 words."
                .to_string(),
            Stage::Other => "\nWrite a professional email inquiring about sponsored post \
                 opportunities.\n\
                 Format your response with a subject line starting with \"Subject:\" \
                 followed by the email body.\n\
                 Keep it concise, around 150 words."
                .to_string(),
        };

        base + &specific
    }

    fn template_content(&self, website: &WebsiteRecord, stage: Stage) -> EmailContent {
        let signature = format!(
            "<p>Best regards,<br>{}<br>{}</p>",
            self.sender_name, self.agency_name
        );

        let (subject, body) = match stage {
            Stage::Initial => (
                format!("Sponsored Post Opportunity on {}", website.domain),
                format!(
                    "<p>Hello,</p>\
                     <p>I hope this email finds you well. My name is {sender} from {agency}, and I \
                     came across your website {domain} while researching quality blogs in your \
                     niche. Its domain rating of {dr} stood out to us.</p>\
                     <p>I'm reaching out to inquire about sponsored post opportunities on your \
                     site. We're interested in publishing high-quality, relevant content that \
                     would provide value to your audience.</p>\
                     <p>Could you please share your rates for sponsored posts and any guidelines \
                     you have for this type of content?</p>\
                     <p>Looking forward to potentially working together.</p>{signature}",
                    sender = self.sender_name,
                    agency = self.agency_name,
                    domain = website.domain,
                    dr = dr_display(website),
                    signature = signature,
                ),
            ),
            Stage::Followup1 => (
                format!("Following Up: Sponsored Post on {}", website.domain),
                format!(
                    "<p>Hello again,</p>\
                     <p>I wanted to follow up on my previous email regarding sponsored post \
                     opportunities on {domain}.</p>\
                     <p>I'm still interested in collaborating with you and would love to hear \
                     about your rates and guidelines when you have a moment.</p>\
                     <p>Please let me know if you have any questions I can answer.</p>{signature}",
                    domain = website.domain,
                    signature = signature,
                ),
            ),
            Stage::Followup2 => (
                format!("Final Follow-up: Collaboration with {}", website.domain),
                format!(
                    "<p>Hello,</p>\
                     <p>This is my final follow-up regarding potential sponsored content on \
                     {domain}.</p>\
                     <p>We're currently offering a 15% discount on our standard rates for new \
                     publishing partners, and I'd love to extend this offer to you.</p>\
                     <p>If you're interested in discussing this opportunity in the future, please \
                     don't hesitate to reach out.</p>{signature}",
                    domain = website.domain,
                    signature = signature,
                ),
            ),
            Stage::Other => (
                format!("Regarding {}", website.domain),
                format!(
                    "<p>Hello,</p>\
                     <p>I hope this email finds you well. I'm reaching out regarding potential \
                     collaboration opportunities with {domain}.</p>\
                     <p>I'd love to discuss this further at your convenience.</p>{signature}",
                    domain = website.domain,
                    signature = signature,
                ),
            ),
        };

        let text = strip_template_html(&body);
        EmailContent { subject, body, text }
    }
}

fn dr_display(website: &WebsiteRecord) -> String {
    website
        .dr
        .map(|dr| dr.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Pull subject and body out of a raw completion. The first line starting
/// with a case-insensitive `subject:` wins; without one, the first line is
/// the subject. Literal `\n` escapes in the body become HTML line breaks.
fn parse_completion(raw: &str) -> EmailContent {
    let content = raw.trim();
    let lines: Vec<&str> = content.lines().collect();

    let mut subject = String::new();
    let mut body = String::new();

    for (i, line) in lines.iter().enumerate() {
        if line.trim().to_lowercase().starts_with("subject:") {
            subject = line.trim()["subject:".len()..].trim().to_string();
            body = lines[i + 1..].join("\n").trim().to_string();
            break;
        }
    }

    if subject.is_empty() {
        subject = lines.first().map(|l| l.trim().to_string()).unwrap_or_default();
        body = lines.get(1..).map(|l| l.join("\n")).unwrap_or_default().trim().to_string();
    }

    EmailContent {
        subject,
        body: body.replace("\\n", "<br>"),
        text: body,
    }
}

fn strip_template_html(body: &str) -> String {
    body.replace("</p>", "\n")
        .replace("<p>", "")
        .replace("<br>", "\n")
        .trim()
        .to_string()
}

/// Chat-completions client for the content provider.
pub struct OpenAiCompletions {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl OpenAiCompletions {
    pub fn new(api_key: &str) -> Self {
        OpenAiCompletions {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| ProviderError::Malformed(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletions {
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: 500,
            temperature: 0.7,
        };

        let resp = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let chat: ChatResponse = resp.json().await?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("no completion choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn website() -> WebsiteRecord {
        WebsiteRecord {
            domain: "x.com".to_string(),
            dr: Some(45),
            ..Default::default()
        }
    }

    fn generator(provider: Option<Arc<dyn CompletionProvider>>) -> ContentGenerator {
        ContentGenerator::new(provider, "[Your Name]", "[Your Agency]")
    }

    #[tokio::test]
    async fn initial_template_has_reference_subject() {
        let content = generator(None).generate(&website(), Stage::Initial).await;
        assert_eq!(content.subject, "Sponsored Post Opportunity on x.com");
        assert!(content.body.contains("x.com"));
        assert!(content.body.contains("45"));
        assert!(content.text.contains("x.com"));
        assert!(!content.text.contains("<p>"));
    }

    #[tokio::test]
    async fn every_stage_yields_well_formed_content() {
        let generator = generator(None);
        for stage in [Stage::Initial, Stage::Followup1, Stage::Followup2, Stage::Other] {
            let content = generator.generate(&website(), stage).await;
            assert!(!content.subject.is_empty(), "empty subject for {}", stage);
            assert!(content.body.contains("x.com"), "no domain for {}", stage);
            assert!(!content.text.is_empty(), "empty text for {}", stage);
        }
    }

    #[tokio::test]
    async fn unknown_stage_uses_generic_template() {
        let content = generator(None).generate(&website(), Stage::Other).await;
        assert_eq!(content.subject, "Regarding x.com");
    }

    struct FixedCompletion(&'static str);

    #[async_trait]
    impl CompletionProvider for FixedCompletion {
        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingCompletion {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionProvider for FailingCompletion {
        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Malformed("rate limited".to_string()))
        }
    }

    #[tokio::test]
    async fn provider_output_is_parsed_for_subject_line() {
        let provider = Arc::new(FixedCompletion(
            "Subject: Quick question about x.com\nHello,\nI loved the blog.",
        ));
        let content = generator(Some(provider)).generate(&website(), Stage::Initial).await;
        assert_eq!(content.subject, "Quick question about x.com");
        assert_eq!(content.body, "Hello,\nI loved the blog.");
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_stage_template() {
        let provider = Arc::new(FailingCompletion {
            calls: AtomicUsize::new(0),
        });
        let content = generator(Some(provider.clone()))
            .generate(&website(), Stage::Followup1)
            .await;
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(content.subject, "Following Up: Sponsored Post on x.com");
    }

    #[test]
    fn completion_without_subject_line_uses_first_line() {
        let content = parse_completion("A catchy opener\nBody line one\nBody line two");
        assert_eq!(content.subject, "A catchy opener");
        assert_eq!(content.body, "Body line one\nBody line two");
    }

    #[test]
    fn subject_prefix_is_case_insensitive() {
        let content = parse_completion("SUBJECT: Hello there\nThe body.");
        assert_eq!(content.subject, "Hello there");
        assert_eq!(content.body, "The body.");
    }

    #[test]
    fn literal_newline_escapes_become_line_breaks_in_html_only() {
        let content = parse_completion("Subject: Hi\nFirst\\nSecond");
        assert_eq!(content.body, "First<br>Second");
        assert_eq!(content.text, "First\\nSecond");
    }
}
