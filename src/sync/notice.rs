//! One-line notices shown to the user after a save or delete.

use std::fmt;

use serde::Serialize;

use crate::sync::types::PushOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Result of a push, phrased for a person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// Link to the remote row, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl Notice {
    /// Notice for a save, or `None` if nothing was sent.
    ///
    /// `custom_message` replaces the default success text.
    #[must_use]
    pub fn for_save(outcome: &PushOutcome, custom_message: Option<&str>, link: Option<String>) -> Option<Self> {
        match outcome {
            PushOutcome::Created { .. } | PushOutcome::Updated { .. } => {
                let default = if matches!(outcome, PushOutcome::Created { .. }) {
                    "Remote record created"
                } else {
                    "Remote record updated"
                };
                Some(Self {
                    level: NoticeLevel::Success,
                    message: custom_message.unwrap_or(default).to_string(),
                    link,
                })
            }
            PushOutcome::Deleted { .. } => Self::for_delete(std::slice::from_ref(outcome), custom_message),
            PushOutcome::Failed { error } => Some(Self::error(error.to_string())),
            PushOutcome::Disabled | PushOutcome::Suppressed => None,
        }
    }

    /// Single notice for one or many deletes.
    ///
    /// The first failure wins; otherwise the deleted rows are counted.
    #[must_use]
    pub fn for_delete(outcomes: &[PushOutcome], custom_message: Option<&str>) -> Option<Self> {
        if let Some(error) = outcomes.iter().find_map(|o| match o {
            PushOutcome::Failed { error } => Some(error),
            _ => None,
        }) {
            return Some(Self::error(error.to_string()));
        }

        let deleted = outcomes
            .iter()
            .filter(|o| matches!(o, PushOutcome::Deleted { .. }))
            .count();
        let message = match (custom_message, deleted) {
            (_, 0) => return None,
            (Some(custom), _) => custom.to_string(),
            (None, 1) => "Remote record deleted".to_string(),
            (None, n) => format!("{n} remote records deleted"),
        };
        Some(Self {
            level: NoticeLevel::Success,
            message,
            link: None,
        })
    }

    fn error(message: String) -> Self {
        Self {
            level: NoticeLevel::Error,
            message,
            link: None,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(link) = &self.link {
            write!(f, " ({link})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;
    use crate::sync::types::{PushAction, PushError};

    fn failed() -> PushOutcome {
        PushOutcome::Failed {
            error: PushError {
                action: PushAction::Update,
                details: RemoteError::Http(
                    "503 Server Error: Service Unavailable for url: https://api.example/v0/app1/Posts".into(),
                )
                .details(),
            },
        }
    }

    #[test]
    fn test_save_notice_uses_custom_message_and_link() {
        let outcome = PushOutcome::Updated { remote_id: "rec1".into() };
        let notice = Notice::for_save(&outcome, None, Some("https://remote/rec1".into())).unwrap();
        assert_eq!(notice.level, NoticeLevel::Success);
        assert_eq!(notice.to_string(), "Remote record updated (https://remote/rec1)");

        let notice = Notice::for_save(&outcome, Some("Synced!"), None).unwrap();
        assert_eq!(notice.message, "Synced!");

        assert!(Notice::for_save(&PushOutcome::Suppressed, None, None).is_none());
    }

    #[test]
    fn test_save_notice_shows_parsed_error() {
        let notice = Notice::for_save(&failed(), Some("ignored"), None).unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.message.starts_with("Could not update remote record. Reason: "));
        assert!(notice.message.contains("may be down"));
    }

    #[test]
    fn test_delete_notice_counts() {
        let deleted = |id: &str| PushOutcome::Deleted { remote_id: id.into() };
        assert_eq!(
            Notice::for_delete(&[deleted("rec1")], None).unwrap().message,
            "Remote record deleted"
        );
        assert_eq!(
            Notice::for_delete(&[deleted("rec1"), deleted("rec2"), deleted("rec3")], None)
                .unwrap()
                .message,
            "3 remote records deleted"
        );
        assert!(Notice::for_delete(&[PushOutcome::Disabled], None).is_none());
        assert_eq!(
            Notice::for_delete(&[deleted("rec1"), failed()], None).unwrap().level,
            NoticeLevel::Error
        );
    }
}
