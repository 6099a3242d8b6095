//! Host navigation and popup windows.

use crate::error::Result;
use crate::state::{PopupId, Route};

/// Moves the user between views.
pub trait Navigator: Send + Sync {
    /// Show an in-app view.
    fn navigate(&self, route: Route);

    /// Leave the app for an external URL (full-page redirect).
    fn redirect(&self, url: &str);
}

/// Opens popup windows.
///
/// The popup reports back through a
/// [`PopupResponder`](crate::popup::PopupResponder); the opener never
/// polls or force-closes it.
pub trait PopupOpener: Send + Sync {
    /// Open a popup at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Popup`](crate::AuthError::Popup) if the window
    /// could not be opened (e.g. blocked).
    fn open(&self, popup: PopupId, url: &str) -> Result<()>;
}
