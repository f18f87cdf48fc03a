//! Rule-based action detection and execution
//!
//! Actions are deterministic responses to recognized intents (current time,
//! URL echo, placeholder weather/reminder text). They are checked before any
//! generative path and short-circuit it entirely on a match.

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("valid url pattern"));

/// Keyword sets checked in priority order; the first matching set wins.
const KEYWORD_SETS: &[(ActionCategory, &[&str])] = &[
    (
        ActionCategory::Weather,
        &["weather", "temperature", "forecast"],
    ),
    (ActionCategory::Reminder, &["remind", "reminder", "remember"]),
    (ActionCategory::OpenWebsite, &["open", "website", "browse"]),
    (ActionCategory::CurrentTime, &["time", "current time"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    Weather,
    Reminder,
    OpenWebsite,
    CurrentTime,
}

/// Structured payload attached to an action response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionData {
    Url { url: String },
    Reminder { message: String },
    Time { time: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    #[serde(rename = "type")]
    pub category: ActionCategory,
    pub response: String,
    pub data: Option<ActionData>,
}

/// Classify a message into an action category, or `None` if no keyword
/// matches. Case-insensitive substring membership, first matching set wins.
pub fn detect(message: &str) -> Option<ActionCategory> {
    let lower = message.to_lowercase();
    for (category, keywords) in KEYWORD_SETS {
        if keywords.iter().any(|k| lower.contains(k)) {
            return Some(*category);
        }
    }
    None
}

/// Produce the canned or lightly-parsed response for a detected category.
/// Always succeeds with a best-effort templated reply.
pub fn execute(category: ActionCategory, message: &str, display_name: &str) -> ActionResult {
    match category {
        ActionCategory::Weather => ActionResult {
            category,
            response: format!(
                "Sorry {display_name}, weather service is currently unavailable. \
                 Please check your favorite weather app for current conditions."
            ),
            data: None,
        },
        ActionCategory::Reminder => ActionResult {
            category,
            response: format!(
                "Okay {display_name}, I've noted your reminder. In a full implementation, \
                 this would set an actual reminder for you!"
            ),
            data: Some(ActionData::Reminder {
                message: message.to_string(),
            }),
        },
        ActionCategory::OpenWebsite => match URL_PATTERN.find(message) {
            Some(url) => ActionResult {
                category,
                response: format!(
                    "{display_name}, I found this website in your message. \
                     In a real app, I would open it for you!"
                ),
                data: Some(ActionData::Url {
                    url: url.as_str().to_string(),
                }),
            },
            None => ActionResult {
                category,
                response: format!(
                    "{display_name}, I couldn't find a valid URL in your message. Please \
                     include a full website address starting with http:// or https://"
                ),
                data: None,
            },
        },
        ActionCategory::CurrentTime => {
            let time = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            ActionResult {
                category,
                response: format!("{display_name}, the current time is {time}"),
                data: Some(ActionData::Time { time }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_each_category() {
        assert_eq!(detect("what's the Weather like"), Some(ActionCategory::Weather));
        assert_eq!(detect("check the forecast"), Some(ActionCategory::Weather));
        assert_eq!(detect("remind me to call mom"), Some(ActionCategory::Reminder));
        assert_eq!(detect("please remember this"), Some(ActionCategory::Reminder));
        assert_eq!(detect("open my dashboard"), Some(ActionCategory::OpenWebsite));
        assert_eq!(detect("browse somewhere"), Some(ActionCategory::OpenWebsite));
        assert_eq!(detect("what time is it?"), Some(ActionCategory::CurrentTime));
    }

    #[test]
    fn test_detect_no_match() {
        assert_eq!(detect("tell me a joke"), None);
        assert_eq!(detect(""), None);
    }

    #[test]
    fn test_detect_priority_order() {
        // weather outranks time, reminder outranks website
        assert_eq!(
            detect("what's the weather at this time"),
            Some(ActionCategory::Weather)
        );
        assert_eq!(
            detect("remind me to open the website"),
            Some(ActionCategory::Reminder)
        );
        assert_eq!(
            detect("open the website when you have time"),
            Some(ActionCategory::OpenWebsite)
        );
    }

    #[test]
    fn test_open_website_extracts_first_url() {
        let result = execute(
            ActionCategory::OpenWebsite,
            "visit http://example.com now",
            "Sam",
        );
        assert_eq!(
            result.data,
            Some(ActionData::Url {
                url: "http://example.com".into()
            })
        );
        assert!(result.response.contains("Sam"));
    }

    #[test]
    fn test_open_website_without_url() {
        let result = execute(ActionCategory::OpenWebsite, "visit please", "Sam");
        assert_eq!(result.data, None);
        assert!(result.response.contains("http://"));
    }

    #[test]
    fn test_current_time_format() {
        let result = execute(ActionCategory::CurrentTime, "", "Sam");
        let Some(ActionData::Time { time }) = &result.data else {
            panic!("expected time payload");
        };
        assert!(
            chrono::NaiveDateTime::parse_from_str(time, "%Y-%m-%d %H:%M:%S").is_ok(),
            "timestamp {time} should match YYYY-MM-DD HH:MM:SS"
        );
        assert!(result.response.contains("Sam"));
        assert!(result.response.contains(time.as_str()));
    }

    #[test]
    fn test_reminder_echoes_message() {
        let result = execute(ActionCategory::Reminder, "remind me to stretch", "Sam");
        assert_eq!(
            result.data,
            Some(ActionData::Reminder {
                message: "remind me to stretch".into()
            })
        );
    }

    #[test]
    fn test_weather_has_no_payload() {
        let result = execute(ActionCategory::Weather, "weather?", "Sam");
        assert!(result.data.is_none());
        assert!(result.response.contains("unavailable"));
    }
}
