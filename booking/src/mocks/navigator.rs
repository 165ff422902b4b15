//! Recording navigator.

use super::lock;
use crate::providers::Navigator;
use std::sync::{Arc, Mutex};

/// A navigation the workflow requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavEvent {
    /// Client-side route change
    Navigate(String),
    /// Full page reload
    Reload(String),
}

#[derive(Debug)]
struct Inner {
    current_url: String,
    events: Vec<NavEvent>,
}

/// Navigator that records requests instead of performing them.
#[derive(Debug, Clone)]
pub struct RecordingNavigator {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingNavigator {
    /// Navigator whose current page is `current_url`.
    #[must_use]
    pub fn new(current_url: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                current_url: current_url.to_string(),
                events: Vec::new(),
            })),
        }
    }

    /// Requested navigations, in order.
    #[must_use]
    pub fn events(&self) -> Vec<NavEvent> {
        lock(&self.inner).events.clone()
    }

    /// Requested full reloads.
    #[must_use]
    pub fn reloads(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                NavEvent::Reload(url) => Some(url),
                NavEvent::Navigate(_) => None,
            })
            .collect()
    }

    /// Last route navigated or reloaded to.
    #[must_use]
    pub fn last(&self) -> Option<NavEvent> {
        lock(&self.inner).events.last().cloned()
    }
}

impl Default for RecordingNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        let mut inner = lock(&self.inner);
        inner.current_url = route.to_string();
        inner.events.push(NavEvent::Navigate(route.to_string()));
    }

    fn reload(&self, url: &str) {
        let mut inner = lock(&self.inner);
        inner.current_url = url.to_string();
        inner.events.push(NavEvent::Reload(url.to_string()));
    }

    fn current_url(&self) -> String {
        lock(&self.inner).current_url.clone()
    }
}
