//! Outgoing message composition.

use std::fmt::Write;

use chrono::{DateTime, Local, TimeZone};

/// A plain-text email message to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Sender address.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub body: String,
}

impl OutgoingMessage {
    /// Creates a message without recipients.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: Vec::new(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Builds the RFC 5322 message dated now.
    #[must_use]
    pub fn to_rfc5322(&self) -> String {
        self.to_rfc5322_at(&Local::now())
    }

    /// Builds the RFC 5322 message with the given `Date` header.
    ///
    /// Line endings are left as written; the transport normalises them
    /// when the message is sent.
    #[must_use]
    pub fn to_rfc5322_at<Tz: TimeZone>(&self, date: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        let mut message = String::new();

        let _ = writeln!(message, "From: {}\r", header_value(&self.from));
        if !self.to.is_empty() {
            let _ = writeln!(message, "To: {}\r", header_value(&self.to.join(", ")));
        }
        let _ = writeln!(message, "Subject: {}\r", header_value(&self.subject));
        let _ = writeln!(message, "Date: {}\r", date.to_rfc2822());
        message.push_str("MIME-Version: 1.0\r\n");
        message.push_str("Content-Type: text/plain; charset=utf-8\r\n");
        message.push_str("Content-Transfer-Encoding: 8bit\r\n");

        message.push_str("\r\n");
        message.push_str(&self.body);

        message
    }
}

/// Folds line breaks into spaces so a value stays on its header line.
fn header_value(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::FixedOffset;

    use super::*;

    #[test]
    fn test_headers_then_body() {
        let date = FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 1, 9, 30, 0)
            .unwrap();
        let message = OutgoingMessage::new("jon@example.com", "test", "Test mail")
            .to("jane@example.com")
            .to("joe@example.com");

        let text = message.to_rfc5322_at(&date);
        assert!(text.starts_with(
            "From: jon@example.com\r\nTo: jane@example.com, joe@example.com\r\nSubject: test\r\nDate: Fri, "
        ));
        assert!(text.contains("Mar 2024 09:30:00 +0100\r\n"));
        assert!(text.ends_with("\r\n\r\nTest mail"));
    }

    #[test]
    fn test_line_breaks_cannot_add_headers() {
        let message = OutgoingMessage::new(
            "jon@example.com\r\nBcc: spy@example.net",
            "hello\r\nX-Injected: yes",
            "body",
        )
        .to("jane@example.com\nCc: spy@example.net");

        let text = message.to_rfc5322();
        let (headers, _) = text.split_once("\r\n\r\n").unwrap();
        assert!(headers.contains("Subject: hello X-Injected: yes\r\n"));
        assert!(headers.contains("From: jon@example.com Bcc: spy@example.net\r\n"));
        assert!(headers.lines().all(|line| {
            !line.starts_with("Bcc:") && !line.starts_with("Cc:") && !line.starts_with("X-Injected:")
        }));
    }

    #[test]
    fn test_date_header_present() {
        let text = OutgoingMessage::new("a@example.com", "s", "b").to_rfc5322();
        assert!(text.lines().any(|line| line.starts_with("Date: ")));
        assert!(!text.contains("To: "));
    }
}
