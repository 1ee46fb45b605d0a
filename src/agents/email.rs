//! Email extraction agent.
//!
//! Well-formed RFC 5322 messages go through `mail-parser`. Pasted email text
//! that only loosely follows the format ("From: ..." lines with no blank
//! separator, odd casing) is read line by line. Either way, missing headers
//! degrade to `None` and a `Partial` status.

use std::sync::LazyLock;

use chrono::DateTime;
use mail_parser::MessageParser;
use regex::Regex;

use crate::agents::{ExtractionAgent, truncate_chars};
use crate::error::AgentFault;
use crate::pipeline::types::{
    ClassificationResult, DocumentFormat, EmailRecord, ExtractionRecord, ExtractionStatus,
    RawInput, Tone, Urgency,
};

/// Sentences kept in the issue summary.
const SUMMARY_SENTENCES: usize = 2;

static HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9\-]*):[ \t]*(.*)$").unwrap());

static ANGLE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)<\s*([^<>\s]+@[^<>\s]+)\s*>\s*$").unwrap());

static BARE_ADDRESS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap());

static GREETING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(hi|hello|hey|dear|greetings|good (morning|afternoon|evening))(\s+[\w.\-]+){0,3}\s*[,!:]?$")
        .unwrap()
});

static SIGN_OFF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(thanks|thank you|many thanks|regards|best|best regards|kind regards|warm regards|sincerely|cheers|yours( truly| sincerely)?)( (so much|again|in advance|all))?\s*[,.!]?$",
    )
    .unwrap()
});

static HIGH_URGENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(urgent(ly)?|asap|immediately|critical|emergency|right away|as soon as possible|time[- ]sensitive)\b",
    )
    .unwrap()
});

static MEDIUM_URGENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(soon|priority|important|deadline|follow[- ]up|by (monday|tuesday|wednesday|thursday|friday|tomorrow|end of (day|the week|week|month)))\b",
    )
    .unwrap()
});

static THREATENING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(legal action|lawyers?|attorneys?|lawsuit|sue you|take you to court|report you|chargeback|cancel (my|our|the) (account|contract|subscription|order))\b",
    )
    .unwrap()
});

static ESCALATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(unacceptable|escalat(e|ed|ing|ion)|furious|outraged|very disappointed|frustrat(ed|ing)|complain(t|ts|ed)?|speak to (a|your) (manager|supervisor)|still (not|no|waiting|haven't|hasn't))\b",
    )
    .unwrap()
});

static QUESTION_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(could you|can you|would you|is it possible|do you|are you able|what is|when will|how (much|many|do|can))\b")
        .unwrap()
});

static POLITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(please|thank you|thanks|appreciate|kindly|grateful)\b").unwrap()
});

static INFORMATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(fyi|for your information|please note|to inform|heads up|announce(ment)?|attached (is|are|please find)|update on)\b",
    )
    .unwrap()
});

/// Extracts sender, subject, date and a short issue summary from an email.
pub struct EmailAgent {
    summary_max_chars: usize,
}

impl EmailAgent {
    pub fn new(summary_max_chars: usize) -> Self {
        Self { summary_max_chars }
    }

    fn extract(&self, text: &str) -> EmailRecord {
        let parsed = parse_message(text);

        let (sender_name, sender_email) = parsed
            .from
            .as_deref()
            .map(parse_address)
            .unwrap_or((None, None));
        let subject = parsed.subject.filter(|s| !s.trim().is_empty());
        let date = parsed.date.map(|d| normalize_date(&d));

        let mut issue_summary = summarize(&parsed.body, self.summary_max_chars);
        if issue_summary.is_empty()
            && let Some(subject) = &subject
        {
            issue_summary = truncate_chars(subject, self.summary_max_chars);
        }

        let signal_text = format!("{}\n{}", subject.as_deref().unwrap_or(""), parsed.body);
        let urgency = detect_urgency(&signal_text);
        let tone = detect_tone(&signal_text);

        let mut missing_fields = Vec::new();
        for (field, present) in [
            ("sender_name", sender_name.is_some()),
            ("sender_email", sender_email.is_some()),
            ("subject", subject.is_some()),
            ("date", date.is_some()),
        ] {
            if !present {
                missing_fields.push(field.to_string());
            }
        }

        let status = if text.trim().is_empty() {
            ExtractionStatus::MalformedInput
        } else if missing_fields.is_empty() {
            ExtractionStatus::Complete
        } else {
            ExtractionStatus::Partial
        };

        EmailRecord {
            sender_name,
            sender_email,
            subject,
            date,
            issue_summary,
            urgency,
            tone,
            status,
            missing_fields,
        }
    }
}

impl ExtractionAgent for EmailAgent {
    fn name(&self) -> &str {
        "email_agent"
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Email
    }

    fn process(
        &self,
        input: &RawInput,
        _classification: &ClassificationResult,
    ) -> Result<ExtractionRecord, AgentFault> {
        let text = input.as_text();
        Ok(ExtractionRecord::Email(self.extract(&text)))
    }
}

/// Header values and body pulled out of an email, before normalization.
#[derive(Debug, Default)]
struct ParsedEmail {
    from: Option<String>,
    subject: Option<String>,
    date: Option<String>,
    body: String,
}

fn is_known_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    matches!(
        name.as_str(),
        "from"
            | "to"
            | "cc"
            | "bcc"
            | "subject"
            | "date"
            | "sent"
            | "reply-to"
            | "message-id"
            | "mime-version"
            | "content-type"
            | "content-transfer-encoding"
    ) || name.starts_with("x-")
}

fn parse_message(text: &str) -> ParsedEmail {
    let (loose, well_formed) = parse_loose(text);
    if !well_formed {
        return loose;
    }

    let Some(message) = MessageParser::default().parse(text.as_bytes()) else {
        return loose;
    };

    let from = message.from().and_then(|a| a.first()).map(|addr| {
        match (addr.name(), addr.address()) {
            (Some(name), Some(email)) => format!("{name} <{email}>"),
            (None, Some(email)) => email.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        }
    });
    let from = from.filter(|f| !f.is_empty());
    let subject = message.subject().map(|s| s.to_string());
    if from.is_none() && subject.is_none() {
        return loose;
    }

    ParsedEmail {
        from: from.or(loose.from),
        subject: subject.or(loose.subject),
        date: loose.date.or_else(|| message.date().map(|d| d.to_rfc3339())),
        body: message
            .body_text(0)
            .map(|b| b.to_string())
            .filter(|b| !b.trim().is_empty())
            .unwrap_or(loose.body),
    }
}

/// Line-oriented header scan.
///
/// Returns the parse and whether the header block was terminated by a blank
/// line, which is the shape `mail-parser` expects.
fn parse_loose(text: &str) -> (ParsedEmail, bool) {
    let mut parsed = ParsedEmail::default();
    let mut lines = text.lines().skip_while(|l| l.trim().is_empty()).peekable();
    let mut last_header: Option<String> = None;
    let mut saw_header = false;
    let mut blank_terminated = false;
    let mut body_lines: Vec<&str> = Vec::new();

    while let Some(line) = lines.next() {
        if line.trim().is_empty() {
            blank_terminated = saw_header;
            break;
        }
        if line.starts_with([' ', '\t']) && last_header.is_some() {
            let value = line.trim();
            match last_header.as_deref() {
                Some("from") => append(&mut parsed.from, value),
                Some("subject") => append(&mut parsed.subject, value),
                Some("date") | Some("sent") => append(&mut parsed.date, value),
                _ => {}
            }
            continue;
        }
        let Some(caps) = HEADER_LINE.captures(line) else {
            body_lines.push(line);
            break;
        };
        let name = caps[1].to_ascii_lowercase();
        if !is_known_header(&name) {
            body_lines.push(line);
            break;
        }
        saw_header = true;
        let value = caps[2].trim().to_string();
        match name.as_str() {
            "from" => parsed.from = Some(value),
            "subject" => parsed.subject = Some(value),
            "date" | "sent" if parsed.date.is_none() => parsed.date = Some(value),
            _ => {}
        }
        last_header = Some(name);
    }

    body_lines.extend(lines);
    parsed.body = body_lines.join("\n");
    parsed.from = parsed.from.filter(|v| !v.is_empty());
    parsed.date = parsed.date.filter(|v| !v.is_empty());
    (parsed, blank_terminated)
}

fn append(slot: &mut Option<String>, value: &str) {
    if let Some(existing) = slot {
        existing.push(' ');
        existing.push_str(value);
    }
}

/// Split a From value into (display name, address).
fn parse_address(raw: &str) -> (Option<String>, Option<String>) {
    let raw = raw.trim();
    if let Some(caps) = ANGLE_ADDRESS.captures(raw) {
        let name = clean_display_name(&caps[1]);
        return (name, Some(caps[2].to_string()));
    }
    if let Some(m) = BARE_ADDRESS.find(raw) {
        let rest = format!("{}{}", &raw[..m.start()], &raw[m.end()..]);
        let rest = rest.replace(['(', ')'], "");
        return (clean_display_name(&rest), Some(m.as_str().to_string()));
    }
    (clean_display_name(raw), None)
}

fn clean_display_name(raw: &str) -> Option<String> {
    let name = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// RFC 3339 when the value is a valid RFC 2822 date, otherwise unchanged.
fn normalize_date(raw: &str) -> String {
    match DateTime::parse_from_rfc2822(raw.trim()) {
        Ok(dt) => dt.to_rfc3339(),
        Err(_) => raw.trim().to_string(),
    }
}

/// Remove quoted replies ("> ..." lines and everything after an attribution line).
fn strip_quoted_text(body: &str) -> String {
    let mut kept = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('>') {
            continue;
        }
        if (trimmed.starts_with("On ") && trimmed.ends_with("wrote:"))
            || (trimmed.starts_with("---") && trimmed.contains("Original Message"))
        {
            break;
        }
        kept.push(line);
    }
    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }
    kept.join("\n")
}

fn summarize(body: &str, max_chars: usize) -> String {
    let stripped = strip_quoted_text(body);
    let mut content = Vec::new();
    for line in stripped.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if SIGN_OFF.is_match(line) {
            break;
        }
        if content.is_empty() && GREETING.is_match(line) {
            continue;
        }
        content.push(line);
    }

    let joined = content.join(" ");
    let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&first_sentences(&collapsed, SUMMARY_SENTENCES), max_chars)
}

fn first_sentences(text: &str, count: usize) -> String {
    let mut seen = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_boundary {
                seen += 1;
                if seen == count {
                    return text[..idx + c.len_utf8()].to_string();
                }
            }
        }
    }
    text.to_string()
}

fn detect_urgency(text: &str) -> Urgency {
    if HIGH_URGENCY.is_match(text) {
        Urgency::High
    } else if MEDIUM_URGENCY.is_match(text) {
        Urgency::Medium
    } else {
        Urgency::Low
    }
}

fn detect_tone(text: &str) -> Tone {
    if THREATENING.is_match(text) {
        Tone::Threatening
    } else if ESCALATION.is_match(text) {
        Tone::Escalation
    } else if text.contains('?') || QUESTION_OPENER.is_match(text) {
        Tone::Question
    } else if POLITE.is_match(text) {
        Tone::Polite
    } else if INFORMATIVE.is_match(text) {
        Tone::Informative
    } else {
        Tone::Neutral
    }
}
