//! Fluentum: lazy element proxies and a component registry for browser tests.
//!
//! Elements are looked up lazily: [`FluentSession::el`] returns a component
//! wrapping a [`LazyProxy`] that searches the page on first use and searches
//! again after the element went stale. Every component built through a
//! session is recorded by its [`ComponentsManager`], so the component of a
//! handle can be found from the handle, before and after resolution.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ FluentSession ──► ComponentsManager ──► ComponentInstantiator │
//! │       │                  ▲  (found)            │              │
//! │       ▼                  │                     ▼              │
//! │  ElementLocator ──► LazyProxy ──► WebElement   FluentElement  │
//! │                                                FluentList<C>  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use fluentum::mock::{MockNode, MockPage};
//! use fluentum::FluentSession;
//!
//! let page = MockPage::new();
//! page.append(MockNode::new("input").name("q"));
//!
//! let session = FluentSession::new(page.clone());
//! let inputs = session.find("input");
//! inputs.write(&["rust"][..]).unwrap();
//! assert_eq!(inputs.value().unwrap().as_deref(), Some("rust"));
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

extern crate self as fluentum;

#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
mod component;
mod config;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
mod element;
mod handle;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
mod list;
#[allow(clippy::missing_errors_doc, clippy::doc_markdown)]
mod locator;
mod logging;
#[allow(clippy::missing_errors_doc, clippy::must_use_candidate)]
mod proxy;
mod registry;
mod result;
mod session;

/// In-memory page for tests and examples
///
/// Implements the driver side ([`SearchContext`], [`WebElement`]) over a
/// small DOM with a CSS subset, so the whole crate can run without a browser.
#[allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::missing_const_for_fn
)]
pub mod mock;

pub use component::{
    downcast_component, AnyComponent, Component, ComponentContext, ComponentFactory,
    ComponentFactoryBuilder, ComponentInstantiator, ComponentType, DefaultComponentInstantiator,
    FromHandle, FromHandleWithContext,
};
pub use config::{FluentConfig, LOG_FILTER_ENV, MATCH_POLICY_ENV};
pub use element::FluentElement;
pub use handle::{same_handle, unwrap_handle, Driver, ElementScope, Handle, HandleKey, WebElement};
pub use list::{FluentList, ListSource};
pub use locator::{
    apply_filters, By, ElementLocator, Filter, FilterTarget, MatchPolicy, Matcher, SearchContext,
    Selector,
};
pub use logging::init_logging;
pub use proxy::{LazyProxy, ListenerId, ProxyListener, ProxyTarget, ResolutionState};
pub use registry::{ComponentsManager, RegisteredComponent};
pub use result::{FluentError, FluentResult};
pub use session::FluentSession;

// Re-export the derive macro when the `derive` feature is enabled
#[cfg(feature = "derive")]
pub use fluentum_derive::Component;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::{
        By, Component, ComponentFactory, ComponentsManager, Filter, FluentConfig, FluentElement,
        FluentError, FluentList, FluentResult, FluentSession, Handle, LazyProxy, MatchPolicy,
        SearchContext, Selector, WebElement,
    };
}
