//! Response matching.

use std::collections::BTreeMap;

use regex::Regex;

use super::json::{self, JsonReply};

/// Named values captured from response lines.
pub type Captures = BTreeMap<String, String>;

/// How a command recognises its confirmation.
#[derive(Debug, Clone)]
pub enum Confirmation {
    /// A line matching the regex confirms.
    Pattern(Regex),
    /// A JSON object echoing the key confirms.
    JsonEcho(String),
}

/// Classification of one response line against a pending command.
#[derive(Debug, Clone, PartialEq)]
pub enum LineMatch {
    /// The command is confirmed; carries values captured from this line.
    Confirmed(Captures),
    /// The controller reported an error.
    Failed(String),
    /// The line carries values for the command but does not confirm it.
    Captured(Captures),
    /// The line does not concern the command.
    Unrelated,
}

/// Confirmation, error and capture patterns for one command.
#[derive(Debug, Clone)]
pub struct ResponseMatcher {
    confirm: Confirmation,
    error: Option<Regex>,
    capture: Option<Regex>,
}

impl ResponseMatcher {
    /// Create a matcher.
    pub fn new(confirm: Confirmation, error: Option<Regex>, capture: Option<Regex>) -> Self {
        Self {
            confirm,
            error,
            capture,
        }
    }

    /// Replace the capture pattern.
    pub fn with_capture(mut self, capture: Option<Regex>) -> Self {
        self.capture = capture;
        self
    }

    /// Confirmation rule.
    pub fn confirmation(&self) -> &Confirmation {
        &self.confirm
    }

    /// Classify one line.
    pub fn classify(&self, line: &str) -> LineMatch {
        match &self.confirm {
            Confirmation::JsonEcho(key) => match json::classify(line, key) {
                JsonReply::Echo(value) => {
                    let mut captures = Captures::new();
                    captures.insert("Value".to_string(), json::value_text(&value));
                    LineMatch::Confirmed(captures)
                }
                JsonReply::Error(message) => LineMatch::Failed(message),
                JsonReply::Unrelated => self.check_error(line).unwrap_or(LineMatch::Unrelated),
            },
            Confirmation::Pattern(confirm) => {
                if let Some(failed) = self.check_error(line) {
                    return failed;
                }
                let captures = self.capture(line);
                if confirm.is_match(line) {
                    LineMatch::Confirmed(captures)
                } else if !captures.is_empty() {
                    LineMatch::Captured(captures)
                } else {
                    LineMatch::Unrelated
                }
            }
        }
    }

    fn check_error(&self, line: &str) -> Option<LineMatch> {
        self.error
            .as_ref()
            .filter(|re| re.is_match(line))
            .map(|_| LineMatch::Failed(line.to_string()))
    }

    fn capture(&self, line: &str) -> Captures {
        let mut out = Captures::new();
        let Some(re) = &self.capture else {
            return out;
        };
        let Some(caps) = re.captures(line) else {
            return out;
        };

        let mut named = false;
        for name in re.capture_names().flatten() {
            named = true;
            if let Some(m) = caps.name(name) {
                out.insert(name.to_string(), m.as_str().to_string());
            }
        }
        if !named {
            if let Some(m) = caps.get(1) {
                out.insert("Value".to_string(), m.as_str().to_string());
            }
        }
        out
    }
}

/// Parse captured numeric values, skipping unparseable ones.
pub fn numeric_captures(captures: &Captures) -> BTreeMap<String, f64> {
    captures
        .iter()
        .filter_map(|(k, v)| v.trim().parse::<f64>().ok().map(|n| (k.clone(), n)))
        .collect()
}
