//! Raw element handles and their identity.
//!
//! A [`Handle`] is the driver's view of one on-page element. Two handles are
//! the same element iff they share an allocation; [`HandleKey`] captures that
//! identity as a plain token so the registry can key on it without keeping
//! the handle alive.
//!
//! Handles may decorate other handles (a lazy proxy decorates whatever it
//! resolved to, a logging wrapper decorates the real element, ...).
//! [`unwrap_handle`] follows that chain down to the innermost element.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::locator::{By, SearchContext, Selector};
use crate::proxy::LazyProxy;
use crate::result::FluentResult;

/// Shared, type-erased element handle
pub type Handle = Arc<dyn WebElement>;

/// Operations on one live element.
///
/// Every call is synchronous and may fail with `StaleElement` once the node
/// the handle pointed to has been detached.
///
/// # Identity
///
/// Two handles are the same element iff they share an allocation (see
/// [`HandleKey`]). A driver must hand out one shared handle per live node,
/// returning the existing `Arc` when a search finds a node it has already
/// returned, the way [`crate::mock::MockPage`] interns its elements. A driver
/// that builds a fresh object per lookup makes every search look like a new
/// element to the component registry.
pub trait WebElement: SearchContext {
    /// Click the element
    fn click(&self) -> FluentResult<()>;

    /// Submit the form the element belongs to
    fn submit(&self) -> FluentResult<()>;

    /// Clear an editable element
    fn clear(&self) -> FluentResult<()>;

    /// Type text into the element
    fn send_keys(&self, text: &str) -> FluentResult<()>;

    /// Rendered (visible) text
    fn text(&self) -> FluentResult<String>;

    /// Raw text content, including hidden text
    fn text_content(&self) -> FluentResult<String>;

    /// Attribute or property value
    fn attribute(&self, name: &str) -> FluentResult<Option<String>>;

    /// Lower-case tag name
    fn tag_name(&self) -> FluentResult<String>;

    /// Whether the element accepts interaction
    fn is_enabled(&self) -> FluentResult<bool>;

    /// Whether the element is rendered
    fn is_displayed(&self) -> FluentResult<bool>;

    /// Whether a checkbox, radio or option is selected
    fn is_selected(&self) -> FluentResult<bool> {
        Ok(self.attribute("selected")?.is_some() || self.attribute("checked")?.is_some())
    }

    /// `value` property
    fn value(&self) -> FluentResult<Option<String>> {
        self.attribute("value")
    }

    /// `id` attribute
    fn id(&self) -> FluentResult<Option<String>> {
        self.attribute("id")
    }

    /// `name` attribute
    fn name(&self) -> FluentResult<Option<String>> {
        self.attribute("name")
    }

    /// The handle this one decorates, if any
    fn wrapped(&self) -> Option<Handle> {
        None
    }

    /// Recover the lazy proxy behind this handle
    fn as_proxy(self: Arc<Self>) -> Option<Arc<LazyProxy>> {
        None
    }
}

/// Root search context of one driver session (a page or a window)
pub type Driver = Arc<dyn SearchContext>;

/// A handle used as the root of a nested search
#[derive(Debug, Clone)]
pub struct ElementScope(Handle);

impl ElementScope {
    /// Scope searches to the descendants of `handle`
    #[must_use]
    pub fn of(handle: Handle) -> Arc<dyn SearchContext> {
        Arc::new(Self(handle))
    }
}

impl SearchContext for ElementScope {
    fn find_raw(&self, by: &By) -> FluentResult<Vec<Handle>> {
        self.0.find_raw(by)
    }

    fn find_elements(&self, selector: &Selector) -> FluentResult<Vec<Handle>> {
        self.0.find_elements(selector)
    }
}

/// Identity token of a handle allocation.
///
/// Only meaningful for drivers that intern their handles; see the identity
/// section of [`WebElement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleKey(usize);

impl HandleKey {
    /// Key of a shared handle
    #[must_use]
    pub fn of(handle: &Handle) -> Self {
        Self(Arc::as_ptr(handle).cast::<()>() as usize)
    }

    /// Key of a value living inside an `Arc`, seen through a plain reference
    #[must_use]
    pub fn of_ref<T: ?Sized>(value: &T) -> Self {
        Self((value as *const T).cast::<()>() as usize)
    }
}

impl fmt::Display for HandleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Whether two handles are the same allocation
#[must_use]
pub fn same_handle(a: &Handle, b: &Handle) -> bool {
    HandleKey::of(a) == HandleKey::of(b)
}

/// Follow the decoration chain to the innermost handle.
///
/// Stops when a handle wraps nothing, wraps itself, wraps a handle already
/// visited, or after `max_depth` steps.
#[must_use]
pub fn unwrap_handle(handle: &Handle, max_depth: usize) -> Handle {
    let mut current = Arc::clone(handle);
    let mut seen = HashSet::from([HandleKey::of(&current)]);
    for _ in 0..max_depth {
        let Some(inner) = current.wrapped() else {
            break;
        };
        if !seen.insert(HandleKey::of(&inner)) {
            break;
        }
        current = inner;
    }
    current
}
