use std::fmt;

use serde::Deserialize;

/// Statuses after which the provider will not change its mind.
pub const SETTLED_STATUSES: [&str; 3] = ["finished", "confirmed", "completed"];

/// Provider ids arrive as JSON numbers or strings depending on the field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ProviderId {
    Number(u64),
    Text(String),
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderId::Number(n) => write!(f, "{n}"),
            ProviderId::Text(s) => f.write_str(s),
        }
    }
}

/// The fields of an instant payment notification this service acts on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpnEvent {
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub payment_id: Option<ProviderId>,
}

impl IpnEvent {
    pub fn is_settled(&self) -> bool {
        self.payment_status
            .as_deref()
            .map(|s| SETTLED_STATUSES.contains(&s.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    pub fn payment_id_text(&self) -> String {
        self.payment_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default()
    }
}
