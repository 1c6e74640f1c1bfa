//! Lazy element proxies.
//!
//! A [`LazyProxy`] stands in for an element that has not been looked up yet.
//! The first operation resolves it through its target, caches the result and
//! tells every registered [`ProxyListener`]. An operation that fails with
//! `StaleElement` clears the cache, so the next operation searches again.
//!
//! Listeners are held weakly and identified by [`ListenerId`]. Notifications
//! run after the proxy's own locks are released, in registration order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, trace};

use crate::handle::{Handle, HandleKey, WebElement};
use crate::locator::{By, ElementLocator, MatchPolicy, SearchContext, Selector};
use crate::result::FluentResult;

/// Observer of proxy resolution
pub trait ProxyListener: Send + Sync {
    /// Called before the proxy runs a search
    fn proxy_element_search(&self, _proxy: &LazyProxy) {}

    /// Called after the proxy resolved to `element`
    fn proxy_element_found(&self, proxy: &LazyProxy, element: &Handle);
}

/// Identifies a listener registration on one proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// What the proxy resolves
#[derive(Debug, Clone)]
pub enum ProxyTarget {
    /// Search a context with a selector
    Locator(ElementLocator),
    /// An already known element
    Element(Handle),
}

/// Observable resolution state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Never resolved, or reset since
    Unresolved,
    /// Holding a resolved handle
    Resolved,
    /// The last resolution attempt failed
    Failed,
}

#[derive(Debug)]
enum Slot {
    Unresolved,
    Resolved(Handle),
    Failed(String),
}

type Listeners = Vec<(ListenerId, Weak<dyn ProxyListener>)>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle that defers its lookup until first use
pub struct LazyProxy {
    target: ProxyTarget,
    policy: MatchPolicy,
    slot: Mutex<Slot>,
    listeners: Mutex<Listeners>,
    next_listener: AtomicU64,
}

impl fmt::Debug for LazyProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyProxy")
            .field("target", &self.describe())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl LazyProxy {
    /// Proxy that searches `locator` on first use
    #[must_use]
    pub fn new(locator: ElementLocator, policy: MatchPolicy) -> Arc<Self> {
        Self::with_target(ProxyTarget::Locator(locator), policy)
    }

    /// Proxy over an element that is already known
    #[must_use]
    pub fn for_element(element: Handle) -> Arc<Self> {
        Self::with_target(ProxyTarget::Element(element), MatchPolicy::FirstMatch)
    }

    fn with_target(target: ProxyTarget, policy: MatchPolicy) -> Arc<Self> {
        Arc::new(Self {
            target,
            policy,
            slot: Mutex::new(Slot::Unresolved),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        })
    }

    /// Resolution target
    #[must_use]
    pub const fn target(&self) -> &ProxyTarget {
        &self.target
    }

    /// Selector, when the proxy resolves through a locator
    #[must_use]
    pub const fn selector(&self) -> Option<&Selector> {
        match &self.target {
            ProxyTarget::Locator(locator) => Some(locator.selector()),
            ProxyTarget::Element(_) => None,
        }
    }

    /// Policy applied when the locator matches several elements
    #[must_use]
    pub const fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Human-readable description used in logs and errors
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.target {
            ProxyTarget::Locator(locator) => locator.selector().to_string(),
            ProxyTarget::Element(element) => format!("element {}", HandleKey::of(element)),
        }
    }

    /// Current resolution state
    #[must_use]
    pub fn state(&self) -> ResolutionState {
        match &*lock(&self.slot) {
            Slot::Unresolved => ResolutionState::Unresolved,
            Slot::Resolved(_) => ResolutionState::Resolved,
            Slot::Failed(_) => ResolutionState::Failed,
        }
    }

    /// Message of the last failed resolution, if the proxy is in `Failed`
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        match &*lock(&self.slot) {
            Slot::Failed(message) => Some(message.clone()),
            _ => None,
        }
    }

    /// Whether a handle is cached
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(&*lock(&self.slot), Slot::Resolved(_))
    }

    /// The cached handle, without searching
    #[must_use]
    pub fn resolved(&self) -> Option<Handle> {
        match &*lock(&self.slot) {
            Slot::Resolved(element) => Some(Arc::clone(element)),
            _ => None,
        }
    }

    /// Resolve now, searching only when nothing is cached.
    ///
    /// # Errors
    ///
    /// `NotFound` or `AmbiguousElement` from the locator, or any driver error.
    /// The failure is recorded and the next call searches again.
    pub fn resolve(&self) -> FluentResult<Handle> {
        if let Some(element) = self.resolved() {
            return Ok(element);
        }
        for listener in self.listeners_snapshot() {
            listener.proxy_element_search(self);
        }
        let outcome = match &self.target {
            ProxyTarget::Locator(locator) => locator.find_element(self.policy),
            ProxyTarget::Element(element) => Ok(Arc::clone(element)),
        };
        match outcome {
            Ok(element) => {
                *lock(&self.slot) = Slot::Resolved(Arc::clone(&element));
                debug!(proxy = %self.describe(), element = %HandleKey::of(&element), "proxy resolved");
                for listener in self.listeners_snapshot() {
                    listener.proxy_element_found(self, &element);
                }
                Ok(element)
            }
            Err(err) => {
                debug!(proxy = %self.describe(), error = %err, "proxy resolution failed");
                *lock(&self.slot) = Slot::Failed(err.to_string());
                Err(err)
            }
        }
    }

    /// Force resolution, discarding the handle
    ///
    /// # Errors
    ///
    /// Same as [`LazyProxy::resolve`].
    pub fn now(&self) -> FluentResult<()> {
        self.resolve().map(drop)
    }

    /// Drop the cached handle; the next operation searches again
    pub fn reset(&self) {
        *lock(&self.slot) = Slot::Unresolved;
        trace!(proxy = %self.describe(), "proxy reset");
    }

    /// Whether the proxy currently resolves to an element.
    ///
    /// # Errors
    ///
    /// Any resolution error other than a failed match.
    pub fn is_present(&self) -> FluentResult<bool> {
        match self.resolve() {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Run `op` against the resolved element.
    ///
    /// A `StaleElement` failure resets the proxy before it is returned; the
    /// operation itself is not retried.
    ///
    /// # Errors
    ///
    /// Resolution errors, or whatever `op` returns.
    pub fn invoke<R>(&self, op: impl FnOnce(&dyn WebElement) -> FluentResult<R>) -> FluentResult<R> {
        let element = self.resolve()?;
        match op(element.as_ref()) {
            Err(err) if err.is_stale() => {
                debug!(proxy = %self.describe(), "resolved element went stale");
                self.reset();
                Err(err)
            }
            result => result,
        }
    }

    /// Register a listener, held weakly
    pub fn add_listener(&self, listener: Weak<dyn ProxyListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, listener));
        id
    }

    /// Remove a registration; returns whether it was present
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of live listener registrations
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.listeners)
            .iter()
            .filter(|(_, listener)| listener.strong_count() > 0)
            .count()
    }

    fn listeners_snapshot(&self) -> Vec<Arc<dyn ProxyListener>> {
        let mut listeners = lock(&self.listeners);
        listeners.retain(|(_, listener)| listener.strong_count() > 0);
        listeners
            .iter()
            .filter_map(|(_, listener)| listener.upgrade())
            .collect()
    }
}

impl SearchContext for LazyProxy {
    fn find_raw(&self, by: &By) -> FluentResult<Vec<Handle>> {
        self.invoke(|element| element.find_raw(by))
    }

    fn find_elements(&self, selector: &Selector) -> FluentResult<Vec<Handle>> {
        self.invoke(|element| element.find_elements(selector))
    }
}

impl WebElement for LazyProxy {
    fn click(&self) -> FluentResult<()> {
        self.invoke(|element| element.click())
    }

    fn submit(&self) -> FluentResult<()> {
        self.invoke(|element| element.submit())
    }

    fn clear(&self) -> FluentResult<()> {
        self.invoke(|element| element.clear())
    }

    fn send_keys(&self, text: &str) -> FluentResult<()> {
        self.invoke(|element| element.send_keys(text))
    }

    fn text(&self) -> FluentResult<String> {
        self.invoke(|element| element.text())
    }

    fn text_content(&self) -> FluentResult<String> {
        self.invoke(|element| element.text_content())
    }

    fn attribute(&self, name: &str) -> FluentResult<Option<String>> {
        self.invoke(|element| element.attribute(name))
    }

    fn tag_name(&self) -> FluentResult<String> {
        self.invoke(|element| element.tag_name())
    }

    fn is_enabled(&self) -> FluentResult<bool> {
        self.invoke(|element| element.is_enabled())
    }

    fn is_displayed(&self) -> FluentResult<bool> {
        self.invoke(|element| element.is_displayed())
    }

    fn is_selected(&self) -> FluentResult<bool> {
        self.invoke(|element| element.is_selected())
    }

    fn value(&self) -> FluentResult<Option<String>> {
        self.invoke(|element| element.value())
    }

    fn wrapped(&self) -> Option<Handle> {
        self.resolved().or_else(|| match &self.target {
            ProxyTarget::Element(element) => Some(Arc::clone(element)),
            ProxyTarget::Locator(_) => None,
        })
    }

    fn as_proxy(self: Arc<Self>) -> Option<Arc<LazyProxy>> {
        Some(self)
    }
}
