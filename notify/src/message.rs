use std::collections::BTreeMap;

use chrono::Utc;

/// A push notification: what the user sees plus a data map for the app.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Tag with the event kind and the current time.
    fn kind(self, kind: &str) -> Self {
        self.with_data("type", kind)
            .with_data("timestamp", Utc::now().to_rfc3339())
    }

    pub fn known_person(names: &[String]) -> Self {
        let names_json = serde_json::to_string(names).unwrap_or_else(|_| "[]".into());
        Self::new(
            "Known Person Detected",
            format!("Welcome {}!", names.join(", ")),
        )
        .kind("known_person")
        .with_data("names", names_json)
    }

    pub fn unknown_person() -> Self {
        Self::new("Unknown Person Detected", "Someone is at your door").kind("unknown_person")
    }

    pub fn password_unlock() -> Self {
        Self::new("Door Unlocked", "Door has been unlocked with password").kind("password_unlock")
    }

    pub fn doorbell_ring() -> Self {
        Self::new("Doorbell Ring", "Someone is at your door").kind("doorbell_ring")
    }

    /// Sent once to a newly registered device.
    pub fn welcome() -> Self {
        Self::new(
            "Smart Doorbell Connected",
            "Your device is now registered for notifications",
        )
    }

    pub fn kind_tag(&self) -> Option<&str> {
        self.data.get("type").map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_person_names_everyone() {
        let n = Notification::known_person(&["alice".into(), "bob".into()]);
        assert_eq!(n.body, "Welcome alice, bob!");
        assert_eq!(n.kind_tag(), Some("known_person"));
        assert_eq!(n.data["names"], r#"["alice","bob"]"#);
        assert!(n.data.contains_key("timestamp"));
    }

    #[test]
    fn welcome_carries_no_data() {
        let n = Notification::welcome();
        assert!(n.data.is_empty());
        assert_eq!(n.kind_tag(), None);
    }
}
