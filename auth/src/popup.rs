//! Cross-window messaging between a login popup and its opener.
//!
//! Two independent tasks talk over a channel of [`WindowMessage`]s. The
//! popup side holds a [`PopupResponder`], which is consumed by posting, so
//! a popup can answer at most once. The opener side drains a [`PopupInbox`]
//! into the store, where the flow reducer decides which messages to trust:
//! only those from the app's own origin, from the popup it is waiting on,
//! and only until an outcome is recorded.

use crate::callback::{CallbackQuery, CallbackRoute};
use crate::error::{AuthError, Result};
use crate::state::{PendingRegistration, PopupId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Messages a popup may post to its opener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PopupMessage {
    /// Login succeeded.
    #[serde(rename = "oauth-success", alias = "success")]
    Success {
        /// Bearer token.
        token: String,
    },

    /// Login failed.
    #[serde(rename = "oauth-error", alias = "error")]
    Error {
        /// Server or popup error text.
        #[serde(rename = "error", alias = "reason")]
        reason: String,
    },

    /// User abandoned the flow inside the popup.
    #[serde(rename = "oauth-cancel", alias = "cancel")]
    Cancel,

    /// A pending registration sent a verification email.
    #[serde(rename = "oauth-verification-sent", alias = "verification-sent")]
    VerificationSent {
        /// Address the email went to.
        email: String,
    },
}

/// A message as the opener receives it.
///
/// `payload` is untrusted JSON; the opener parses it into a
/// [`PopupMessage`] only after checking `origin` and `source`.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowMessage {
    /// Origin of the posting window.
    pub origin: String,
    /// Popup that posted it.
    pub source: PopupId,
    /// Message body.
    pub payload: serde_json::Value,
}

impl WindowMessage {
    /// Parse the payload, if it is a known message.
    #[must_use]
    pub fn message(&self) -> Option<PopupMessage> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// Create a messaging channel.
///
/// Messages are buffered up to `capacity`; a popup never waits on a slow
/// opener.
#[must_use]
pub fn channel(capacity: usize) -> (PopupPort, PopupInbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (PopupPort { tx }, PopupInbox { rx })
}

/// Sending half, cloned into every popup.
#[derive(Debug, Clone)]
pub struct PopupPort {
    tx: mpsc::Sender<WindowMessage>,
}

impl PopupPort {
    /// Responder for one popup window at `origin`.
    #[must_use]
    pub fn responder(&self, popup: PopupId, origin: impl Into<String>) -> PopupResponder {
        PopupResponder {
            port: self.clone(),
            popup,
            origin: origin.into(),
        }
    }

    /// Post raw JSON, as any window could. Used by hosts relaying messages
    /// they did not construct.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Popup`] if the opener stopped listening or its
    /// buffer is full.
    pub fn post_raw(&self, message: WindowMessage) -> Result<()> {
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => AuthError::Popup("opener inbox full".into()),
            mpsc::error::TrySendError::Closed(_) => {
                AuthError::Popup("opener is no longer listening".into())
            },
        })
    }
}

/// What the popup's callback page should do next.
#[derive(Debug)]
pub enum PopupCallback {
    /// A message was posted; the popup can close.
    Posted,
    /// Registration needs more input. Keep the popup open, run the resolver
    /// in it, and answer later with the returned responder.
    EmailRequired {
        /// Pending registration to resolve.
        pending: PendingRegistration,
        /// Responder for the eventual outcome.
        responder: PopupResponder,
    },
}

/// The popup's single-use handle for answering its opener.
#[derive(Debug)]
pub struct PopupResponder {
    port: PopupPort,
    popup: PopupId,
    origin: String,
}

impl PopupResponder {
    /// The popup this responder answers for.
    #[must_use]
    pub const fn popup(&self) -> PopupId {
        self.popup
    }

    /// Post `message` to the opener. Consumes the responder.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Popup`] if the opener stopped listening.
    pub fn post(self, message: &PopupMessage) -> Result<()> {
        let payload = serde_json::to_value(message)
            .map_err(|e| AuthError::Popup(format!("unencodable message: {e}")))?;

        tracing::debug!(popup = %self.popup, "Posting popup message");
        self.port.post_raw(WindowMessage {
            origin: self.origin,
            source: self.popup,
            payload,
        })
    }

    /// Answer the opener from the popup's login callback page.
    ///
    /// A token is posted as success and any error as failure. The
    /// `EMAIL_REQUIRED` marker keeps the popup open for registration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Popup`] if posting failed.
    pub fn respond_to_callback(self, query: &CallbackQuery) -> Result<PopupCallback> {
        let message = match query.route() {
            CallbackRoute::Token(token) => PopupMessage::Success { token },
            CallbackRoute::EmailRequired(pending) => {
                return Ok(PopupCallback::EmailRequired {
                    pending: PendingRegistration::from_token(pending),
                    responder: self,
                });
            },
            CallbackRoute::Error(reason) => PopupMessage::Error { reason },
            CallbackRoute::Missing => PopupMessage::Error {
                reason: "No token received".to_string(),
            },
        };

        self.post(&message)?;
        Ok(PopupCallback::Posted)
    }

    /// Tell the opener the user gave up.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Popup`] if posting failed.
    pub fn cancel(self) -> Result<()> {
        self.post(&PopupMessage::Cancel)
    }
}

/// Receiving half, owned by the opener.
#[derive(Debug)]
pub struct PopupInbox {
    rx: mpsc::Receiver<WindowMessage>,
}

impl PopupInbox {
    /// Next message, or `None` once every port is gone.
    pub async fn recv(&mut self) -> Option<WindowMessage> {
        self.rx.recv().await
    }

    /// Forward every message into `deliver` until the channel closes.
    ///
    /// Typically `deliver` sends `AuthAction::PopupMessageReceived` to the
    /// store.
    pub fn spawn_forwarder<F, Fut>(mut self, mut deliver: F) -> tokio::task::JoinHandle<()>
    where
        F: FnMut(WindowMessage) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(message) = self.rx.recv().await {
                deliver(message).await;
            }
            tracing::debug!("Popup channel closed");
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    const ORIGIN: &str = "http://localhost:5173";

    #[test]
    fn wire_format_matches_the_popup_pages() {
        let success = serde_json::to_value(PopupMessage::Success { token: "t".into() }).unwrap();
        assert_eq!(success, json!({"type": "oauth-success", "token": "t"}));

        let error = serde_json::to_value(PopupMessage::Error { reason: "x".into() }).unwrap();
        assert_eq!(error, json!({"type": "oauth-error", "error": "x"}));
    }

    #[test]
    fn short_type_names_are_accepted() {
        let message: PopupMessage =
            serde_json::from_value(json!({"type": "error", "reason": "denied"})).unwrap();
        assert_eq!(message, PopupMessage::Error { reason: "denied".into() });

        let message: PopupMessage = serde_json::from_value(json!({"type": "cancel"})).unwrap();
        assert_eq!(message, PopupMessage::Cancel);
    }

    #[test]
    fn unknown_payloads_parse_to_nothing() {
        let message = WindowMessage {
            origin: ORIGIN.into(),
            source: PopupId::new(),
            payload: json!({"type": "something-else"}),
        };
        assert!(message.message().is_none());
    }

    #[tokio::test]
    async fn responder_posts_exactly_one_message() {
        let (port, mut inbox) = channel(4);
        let popup = PopupId::new();

        let query = CallbackQuery::parse("token=a.b.c").unwrap();
        let outcome = port.responder(popup, ORIGIN).respond_to_callback(&query).unwrap();
        assert!(matches!(outcome, PopupCallback::Posted));
        drop(port);

        let received = inbox.recv().await.unwrap();
        assert_eq!(received.source, popup);
        assert_eq!(received.origin, ORIGIN);
        assert_eq!(
            received.message(),
            Some(PopupMessage::Success { token: "a.b.c".into() })
        );
        assert!(inbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn email_required_keeps_the_popup_open() {
        let (port, mut inbox) = channel(4);
        let query = CallbackQuery::parse("error=EMAIL_REQUIRED:abc123").unwrap();

        let outcome = port
            .responder(PopupId::new(), ORIGIN)
            .respond_to_callback(&query)
            .unwrap();
        let PopupCallback::EmailRequired { pending, responder } = outcome else {
            panic!("expected the popup to stay open");
        };
        assert_eq!(pending.pending_token, "abc123");

        responder.cancel().unwrap();
        assert_eq!(inbox.recv().await.unwrap().message(), Some(PopupMessage::Cancel));
    }

    #[test]
    fn posting_to_a_closed_opener_fails() {
        let (port, inbox) = channel(1);
        drop(inbox);
        let result = port.responder(PopupId::new(), ORIGIN).cancel();
        assert!(matches!(result, Err(AuthError::Popup(_))));
    }
}
