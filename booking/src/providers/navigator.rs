//! Page navigation.

/// Host-page navigation.
///
/// `navigate` is a client-side route change that keeps in-memory state;
/// `reload` is a full page load that discards it.
pub trait Navigator: Send + Sync {
    /// Client-side route change.
    fn navigate(&self, route: &str);

    /// Full page reload to `url`.
    fn reload(&self, url: &str);

    /// URL of the current page, used as the return URL of a registration detour.
    fn current_url(&self) -> String;
}
