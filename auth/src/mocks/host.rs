//! Mock host navigation and popup windows for testing.

use crate::error::{AuthError, Result};
use crate::providers::{Navigator, PopupOpener};
use crate::state::{PopupId, Route};
use std::sync::{Arc, Mutex, PoisonError};

/// Something the host was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    /// In-app view.
    Route(Route),
    /// Full-page redirect.
    Redirect(String),
}

/// Navigator that records every request.
#[derive(Debug, Clone, Default)]
pub struct RecordingNavigator {
    log: Arc<Mutex<Vec<Navigation>>>,
}

impl RecordingNavigator {
    /// Create an empty navigator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything requested so far, in order.
    #[must_use]
    pub fn history(&self) -> Vec<Navigation> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// In-app views requested so far.
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.history()
            .into_iter()
            .filter_map(|n| match n {
                Navigation::Route(route) => Some(route),
                Navigation::Redirect(_) => None,
            })
            .collect()
    }

    /// External redirects requested so far.
    #[must_use]
    pub fn redirects(&self) -> Vec<String> {
        self.history()
            .into_iter()
            .filter_map(|n| match n {
                Navigation::Redirect(url) => Some(url),
                Navigation::Route(_) => None,
            })
            .collect()
    }

    /// The most recent in-app view.
    #[must_use]
    pub fn last_route(&self) -> Option<Route> {
        self.routes().pop()
    }

    fn push(&self, navigation: Navigation) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(navigation);
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.push(Navigation::Route(route));
    }

    fn redirect(&self, url: &str) {
        self.push(Navigation::Redirect(url.to_string()));
    }
}

#[derive(Debug, Default)]
struct Windows {
    opened: Vec<(PopupId, String)>,
    blocked: bool,
}

/// Popup opener that records windows and can simulate a popup blocker.
#[derive(Debug, Clone, Default)]
pub struct MockPopupOpener {
    windows: Arc<Mutex<Windows>>,
}

impl MockPopupOpener {
    /// Create an opener that opens every popup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `open` fail.
    pub fn block(&self) {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .blocked = true;
    }

    /// Popups opened so far with their URLs.
    #[must_use]
    pub fn opened(&self) -> Vec<(PopupId, String)> {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .opened
            .clone()
    }

    /// The most recently opened popup.
    #[must_use]
    pub fn last_popup(&self) -> Option<PopupId> {
        self.opened().last().map(|(popup, _)| *popup)
    }
}

impl PopupOpener for MockPopupOpener {
    fn open(&self, popup: PopupId, url: &str) -> Result<()> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        if windows.blocked {
            return Err(AuthError::Popup("popup blocked".to_string()));
        }
        windows.opened.push((popup, url.to_string()));
        Ok(())
    }
}
