use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::content::{ContentGenerator, EmailContent};
use crate::error::ProviderError;
use crate::search_engine::WebsiteRecord;
use crate::sequencer::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptStatus {
    Sent,
    Simulated,
    Failed,
}

/// One stage of contact with one website.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutreachAttempt {
    /// Storage id when the record has one, otherwise the domain. A weak
    /// reference, not ownership.
    pub website_id: String,
    pub stage: Stage,
    pub subject: String,
    pub body: String,
    pub text: String,
    pub status: AttemptStatus,
    pub sent_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Normalized result of one send call. Total failure is always expressed
/// here rather than as an error; this type is what the HTTP surface returns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub mock: bool,
    pub email_type: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_content: Option<EmailContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub website: WebsiteRecord,
}

fn is_false(v: &bool) -> bool {
    !v
}

impl SendOutcome {
    fn failure(website: &WebsiteRecord, stage: Stage, error: &str) -> Self {
        SendOutcome {
            success: false,
            mock: false,
            email_type: stage,
            email_content: None,
            email_id: None,
            sent_at: None,
            error: Some(error.to_string()),
            website: website.clone(),
        }
    }

    /// The attempt record for this outcome, for cadence tracking.
    pub fn attempt(&self) -> OutreachAttempt {
        let content = self.email_content.as_ref();
        OutreachAttempt {
            website_id: self
                .website
                .id
                .clone()
                .unwrap_or_else(|| self.website.domain.clone()),
            stage: self.email_type,
            subject: content.map(|c| c.subject.clone()).unwrap_or_default(),
            body: content.map(|c| c.body.clone()).unwrap_or_default(),
            text: content.map(|c| c.text.clone()).unwrap_or_default(),
            status: if !self.success {
                AttemptStatus::Failed
            } else if self.mock {
                AttemptStatus::Simulated
            } else {
                AttemptStatus::Sent
            },
            sent_at: self.sent_at.unwrap_or_else(Utc::now),
            error: self.error.clone(),
        }
    }
}

/// The message handed to the send provider.
#[derive(Debug, Clone, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Capability seam for the send provider; returns the provider's email id.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<String, ProviderError>;
}

/// Sends one outreach email for one website and stage. Without a transport
/// the send is simulated (logged, success with content). Never fails outward.
pub struct OutreachSender {
    content: ContentGenerator,
    transport: Option<Arc<dyn EmailTransport>>,
    from_address: String,
}

impl OutreachSender {
    pub fn new(
        content: ContentGenerator,
        transport: Option<Arc<dyn EmailTransport>>,
        from_address: &str,
    ) -> Self {
        OutreachSender {
            content,
            transport,
            from_address: from_address.to_string(),
        }
    }

    pub async fn send_outreach(&self, website: &WebsiteRecord, stage: Stage) -> SendOutcome {
        info!("Sending {} email to {}", stage, website.domain);

        // Precondition: nothing to send to. No provider is contacted.
        let Some(to) = website.email.clone() else {
            return SendOutcome::failure(website, stage, "No email address available");
        };

        let content = self.content.generate(website, stage).await;

        let Some(transport) = &self.transport else {
            warn!(
                "No send provider configured. Email to {} would have been sent:",
                to
            );
            info!("Subject: {}", content.subject);
            info!("{}", content.text);
            return SendOutcome {
                success: true,
                mock: true,
                email_type: stage,
                email_content: Some(content),
                email_id: None,
                sent_at: Some(Utc::now()),
                error: None,
                website: website.clone(),
            };
        };

        let message = EmailMessage {
            from: self.from_address.clone(),
            to: to.clone(),
            subject: content.subject.clone(),
            html: content.body.clone(),
            text: content.text.clone(),
        };

        match transport.send(&message).await {
            Ok(email_id) => {
                info!("Email sent successfully to {}", to);
                SendOutcome {
                    success: true,
                    mock: false,
                    email_type: stage,
                    email_content: Some(content),
                    email_id: Some(email_id),
                    sent_at: Some(Utc::now()),
                    error: None,
                    website: website.clone(),
                }
            }
            Err(e) => {
                warn!("Error sending email to {}: {}", to, e);
                SendOutcome::failure(website, stage, &e.to_string())
            }
        }
    }
}

/// Resend-style transactional email API: one JSON POST, id in the response.
pub struct ResendTransport {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

impl ResendTransport {
    pub fn new(api_key: &str) -> Self {
        ResendTransport {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: "https://api.resend.com".to_string(),
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
impl EmailTransport for ResendTransport {
    async fn send(&self, message: &EmailMessage) -> Result<String, ProviderError> {
        let url = format!("{}/emails", self.base_url);
        let resp = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(message)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                message: body,
            });
        }

        let sent: SendResponse = resp.json().await?;
        Ok(sent.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::content::CompletionProvider;

    struct CountingCompletion {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionProvider for CountingCompletion {
        async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Subject: Hi\nBody".to_string())
        }
    }

    struct RecordingTransport {
        calls: AtomicUsize,
        last_to: Mutex<Option<String>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn new(fail: bool) -> Self {
            RecordingTransport {
                calls: AtomicUsize::new(0),
                last_to: Mutex::new(None),
                fail,
            }
        }
    }

    #[async_trait]
    impl EmailTransport for RecordingTransport {
        async fn send(&self, message: &EmailMessage) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_to.lock().unwrap() = Some(message.to.clone());
            if self.fail {
                Err(ProviderError::Malformed("mailbox on fire".to_string()))
            } else {
                Ok("em_123".to_string())
            }
        }
    }

    fn website(email: Option<&str>) -> WebsiteRecord {
        WebsiteRecord {
            domain: "x.com".to_string(),
            email: email.map(str::to_string),
            ..Default::default()
        }
    }

    fn sender(
        completion: Option<Arc<dyn CompletionProvider>>,
        transport: Option<Arc<dyn EmailTransport>>,
    ) -> OutreachSender {
        let content = ContentGenerator::new(completion, "[Your Name]", "[Your Agency]");
        OutreachSender::new(content, transport, "outreach@yourdomain.com")
    }

    #[tokio::test]
    async fn missing_email_fails_without_any_provider_call() {
        let completion = Arc::new(CountingCompletion {
            calls: AtomicUsize::new(0),
        });
        let transport = Arc::new(RecordingTransport::new(false));
        let sender = sender(Some(completion.clone()), Some(transport.clone()));

        let outcome = sender.send_outreach(&website(None), Stage::Initial).await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("No email address available"));
        assert_eq!(outcome.website.domain, "x.com");
        assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.attempt().status, AttemptStatus::Failed);
    }

    #[tokio::test]
    async fn unconfigured_transport_simulates_the_send() {
        let sender = sender(None, None);

        let outcome = sender
            .send_outreach(&website(Some("owner@x.com")), Stage::Initial)
            .await;

        assert!(outcome.success);
        assert!(outcome.mock);
        assert!(outcome.email_id.is_none());
        assert!(outcome.sent_at.is_some());
        let content = outcome.email_content.as_ref().unwrap();
        assert_eq!(content.subject, "Sponsored Post Opportunity on x.com");
        assert_eq!(outcome.attempt().status, AttemptStatus::Simulated);
    }

    #[tokio::test]
    async fn successful_send_returns_provider_email_id() {
        let transport = Arc::new(RecordingTransport::new(false));
        let sender = sender(None, Some(transport.clone()));

        let outcome = sender
            .send_outreach(&website(Some("owner@x.com")), Stage::Followup1)
            .await;

        assert!(outcome.success);
        assert!(!outcome.mock);
        assert_eq!(outcome.email_id.as_deref(), Some("em_123"));
        assert_eq!(
            transport.last_to.lock().unwrap().as_deref(),
            Some("owner@x.com")
        );
        assert_eq!(outcome.attempt().status, AttemptStatus::Sent);
        assert_eq!(outcome.attempt().stage, Stage::Followup1);
    }

    #[tokio::test]
    async fn transport_failure_becomes_structured_negative_result() {
        let transport = Arc::new(RecordingTransport::new(true));
        let sender = sender(None, Some(transport));

        let outcome = sender
            .send_outreach(&website(Some("owner@x.com")), Stage::Initial)
            .await;

        assert!(!outcome.success);
        assert!(outcome.error.as_ref().unwrap().contains("mailbox on fire"));
        assert_eq!(outcome.attempt().status, AttemptStatus::Failed);
    }

    #[test]
    fn attempt_uses_storage_id_when_present() {
        let mut site = website(Some("owner@x.com"));
        site.id = Some("rec_1".to_string());
        let outcome = SendOutcome::failure(&site, Stage::Initial, "nope");
        assert_eq!(outcome.attempt().website_id, "rec_1");

        let outcome = SendOutcome::failure(&website(None), Stage::Initial, "nope");
        assert_eq!(outcome.attempt().website_id, "x.com");
    }
}
