use regex::Regex;
use std::collections::HashSet;

pub struct Extractor {
    email_regex: Regex,
}

impl Extractor {
    pub fn new() -> Self {
        Extractor {
            // General email regex
            email_regex: Regex::new(r"(?i)[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}").unwrap(),
        }
    }

    /// All distinct email addresses in `text`, lowercased, in first-seen order.
    /// The first entry is what callers treat as the primary contact.
    pub fn extract_emails(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut emails = Vec::new();
        for m in self.email_regex.find_iter(text) {
            let email = m.as_str().to_lowercase();
            // Filenames like logo@2x.png match the pattern
            if email.ends_with(".png")
                || email.ends_with(".jpg")
                || email.ends_with(".jpeg")
                || email.ends_with(".gif")
                || email.ends_with(".webp")
            {
                continue;
            }
            if seen.insert(email.clone()) {
                emails.push(email);
            }
        }
        emails
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Extractor::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_emails_in_first_seen_order() {
        let extractor = Extractor::new();
        let text = "Reach us at hello@acme.com or SALES@acme.com. Again: hello@acme.com";
        let emails = extractor.extract_emails(text);
        assert_eq!(emails, vec!["hello@acme.com", "sales@acme.com"]);
    }

    #[test]
    fn ignores_image_filenames() {
        let extractor = Extractor::new();
        let text = r#"<img src="logo@2x.png"> contact: info@example.co.uk"#;
        let emails = extractor.extract_emails(text);
        assert_eq!(emails, vec!["info@example.co.uk"]);
    }

    #[test]
    fn empty_text_yields_no_emails() {
        let extractor = Extractor::new();
        assert!(extractor.extract_emails("no addresses here").is_empty());
    }
}
