//! Registry of the components built in one session.
//!
//! [`ComponentsManager`] instantiates components and remembers which element
//! each one wraps, so the component of a handle can be looked up again. It
//! keys entries by the identity of the innermost handle (decorators are
//! unwrapped first) and holds that handle weakly.
//!
//! When a component wraps a [`LazyProxy`], the registry listens to the proxy.
//! Before resolution the entry is keyed by the proxy itself; once the proxy
//! resolves, the entry moves under the resolved element. A proxy that resolves
//! again after going stale moves its entries again.
//!
//! Components are held weakly too: an entry lives as long as somebody else
//! keeps its component, and the registry never keeps an element alive on its
//! own. Dead entries are swept on every access. An entry whose handle has been
//! dropped goes back under its proxy when the proxy and the component are
//! still alive, and is dropped otherwise.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, trace};

use crate::component::{
    downcast_component, AnyComponent, ComponentFactory, ComponentInstantiator, ComponentType,
    DefaultComponentInstantiator,
};
use crate::config::FluentConfig;
use crate::handle::{same_handle, unwrap_handle, Driver, Handle, HandleKey, WebElement};
use crate::proxy::{LazyProxy, ListenerId, ProxyListener};
use crate::result::FluentResult;

/// One registered component, as reported by [`ComponentsManager::get_all_components`]
#[derive(Debug, Clone)]
pub struct RegisteredComponent {
    /// Type the component was built as
    pub component_type: ComponentType,
    /// The component
    pub component: AnyComponent,
    /// Handle the entry is currently keyed by
    pub handle: Handle,
}

struct Entry {
    component_type: ComponentType,
    component: Weak<dyn Any + Send + Sync>,
    proxy: Option<HandleKey>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.component.strong_count() > 0
    }
}

struct Slot {
    handle: Weak<dyn WebElement>,
    entries: Vec<Entry>,
}

impl Slot {
    fn new(handle: &Handle) -> Self {
        Self {
            handle: Arc::downgrade(handle),
            entries: Vec::new(),
        }
    }

    fn put(&mut self, entry: Entry) {
        match self
            .entries
            .iter_mut()
            .find(|existing| existing.component_type == entry.component_type)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    fn is_live(&self) -> bool {
        self.handle.strong_count() > 0
    }
}

struct ProxyLink {
    proxy: Weak<LazyProxy>,
    listener: ListenerId,
    current: HandleKey,
}

#[derive(Default)]
struct Registry {
    slots: HashMap<HandleKey, Slot>,
    proxies: HashMap<HandleKey, ProxyLink>,
}

impl Registry {
    /// Drop entries whose component is gone and re-key or drop slots whose
    /// handle is gone; returns the number of dropped entries.
    fn sweep(&mut self) -> usize {
        let dead: Vec<HandleKey> = self
            .slots
            .iter()
            .filter(|(_, slot)| !slot.is_live())
            .map(|(key, _)| *key)
            .collect();
        let mut evicted = 0;
        for key in dead {
            let Some(slot) = self.slots.remove(&key) else {
                continue;
            };
            for entry in slot.entries {
                if !entry.is_live() {
                    evicted += 1;
                    continue;
                }
                let relocated = entry.proxy.and_then(|proxy_key| {
                    let link = self.proxies.get_mut(&proxy_key)?;
                    let proxy = link.proxy.upgrade()?;
                    link.current = proxy_key;
                    Some((proxy_key, proxy))
                });
                match relocated {
                    Some((proxy_key, proxy)) => {
                        let handle: Handle = proxy;
                        self.slots
                            .entry(proxy_key)
                            .or_insert_with(|| Slot::new(&handle))
                            .put(entry);
                    }
                    None => evicted += 1,
                }
            }
        }
        for slot in self.slots.values_mut() {
            let before = slot.entries.len();
            slot.entries.retain(Entry::is_live);
            evicted += before - slot.entries.len();
        }
        self.slots.retain(|_, slot| !slot.entries.is_empty());
        self.proxies.retain(|_, link| link.proxy.strong_count() > 0);
        if evicted > 0 {
            debug!(evicted, "swept dead registry entries");
        }
        evicted
    }

    /// Move the entries registered through `proxy_key` under `new_key`
    fn migrate(&mut self, proxy_key: HandleKey, new_key: HandleKey, new_handle: &Handle) -> usize {
        let Some(link) = self.proxies.get_mut(&proxy_key) else {
            return 0;
        };
        let old_key = std::mem::replace(&mut link.current, new_key);
        if old_key == new_key {
            return 0;
        }
        let Some(old) = self.slots.get_mut(&old_key) else {
            return 0;
        };
        let (moved, kept): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut old.entries)
            .into_iter()
            .partition(|entry| entry.proxy == Some(proxy_key));
        old.entries = kept;
        if old.entries.is_empty() {
            let _ = self.slots.remove(&old_key);
        }
        let count = moved.len();
        if count > 0 {
            let slot = self
                .slots
                .entry(new_key)
                .or_insert_with(|| Slot::new(new_handle));
            for entry in moved {
                slot.put(entry);
            }
        }
        count
    }

    fn lookup(&self, key: HandleKey, proxy: Option<HandleKey>) -> Option<&Slot> {
        self.slots.get(&key).or_else(|| {
            let link = self.proxies.get(&proxy?)?;
            self.slots.get(&link.current)
        })
    }
}

/// The first lazy proxy along a handle's decoration chain
fn find_proxy(handle: &Handle, max_depth: usize) -> Option<Arc<LazyProxy>> {
    let mut current = Arc::clone(handle);
    for _ in 0..=max_depth {
        if let Some(proxy) = Arc::clone(&current).as_proxy() {
            return Some(proxy);
        }
        let inner = current.wrapped()?;
        if same_handle(&inner, &current) {
            return None;
        }
        current = inner;
    }
    None
}

/// Instantiates components and tracks which element each one wraps
pub struct ComponentsManager {
    driver: Driver,
    config: Arc<FluentConfig>,
    instantiator: Arc<dyn ComponentInstantiator>,
    self_ref: Weak<ComponentsManager>,
    state: Mutex<Registry>,
}

impl fmt::Debug for ComponentsManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ComponentsManager")
            .field("slots", &state.slots.len())
            .field("proxies", &state.proxies.len())
            .field("instantiator", &self.instantiator)
            .finish_non_exhaustive()
    }
}

impl ComponentsManager {
    /// Registry backed by a [`DefaultComponentInstantiator`] over `factory`.
    ///
    /// Context-aware components receive the registry as their instantiator,
    /// so the components they build are registered too.
    #[must_use]
    pub fn new(driver: Driver, factory: ComponentFactory, config: Arc<FluentConfig>) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let accessor: Weak<dyn ComponentInstantiator> = me.clone();
            let instantiator = Arc::new(DefaultComponentInstantiator::new(
                Arc::clone(&driver),
                factory,
                Arc::clone(&config),
                accessor,
            ));
            Self {
                driver,
                config,
                instantiator,
                self_ref: me.clone(),
                state: Mutex::new(Registry::default()),
            }
        })
    }

    /// Registry delegating construction to a custom instantiator
    #[must_use]
    pub fn with_instantiator(
        driver: Driver,
        instantiator: Arc<dyn ComponentInstantiator>,
        config: Arc<FluentConfig>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| Self {
            driver,
            config,
            instantiator,
            self_ref: me.clone(),
            state: Mutex::new(Registry::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Root search context of the session
    #[must_use]
    pub const fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Session configuration
    #[must_use]
    pub const fn config(&self) -> &Arc<FluentConfig> {
        &self.config
    }

    /// Instantiator components are built with
    #[must_use]
    pub const fn instantiator(&self) -> &Arc<dyn ComponentInstantiator> {
        &self.instantiator
    }

    /// Build a `T` wrapping `handle` and register it
    ///
    /// # Errors
    ///
    /// `InvalidComponentType` when `T` cannot be built.
    pub fn new_component<T: Any + Send + Sync>(&self, handle: Handle) -> FluentResult<Arc<T>> {
        let component_type = ComponentType::of::<T>();
        downcast_component(self.register(component_type, handle)?, component_type)
    }

    fn register(&self, component_type: ComponentType, handle: Handle) -> FluentResult<AnyComponent> {
        let component = self
            .instantiator
            .instantiate(component_type, Arc::clone(&handle))?;
        let depth = self.config.max_unwrap_depth;
        let innermost = unwrap_handle(&handle, depth);
        let key = HandleKey::of(&innermost);
        let proxy = find_proxy(&handle, depth);

        let mut state = self.lock();
        let _ = state.sweep();
        let proxy_key = proxy.map(|proxy| {
            let proxy_key = HandleKey::of_ref(&*proxy);
            if state.proxies.contains_key(&proxy_key) {
                let _ = state.migrate(proxy_key, key, &innermost);
            } else {
                let listener: Weak<dyn ProxyListener> = self.self_ref.clone();
                let id = proxy.add_listener(listener);
                let _ = state.proxies.insert(
                    proxy_key,
                    ProxyLink {
                        proxy: Arc::downgrade(&proxy),
                        listener: id,
                        current: key,
                    },
                );
            }
            proxy_key
        });
        state
            .slots
            .entry(key)
            .or_insert_with(|| Slot::new(&innermost))
            .put(Entry {
                component_type,
                component: Arc::downgrade(&component),
                proxy: proxy_key,
            });
        debug!(
            component = component_type.name(),
            key = %key,
            proxied = proxy_key.is_some(),
            "registered component"
        );
        Ok(component)
    }

    /// Component registered for `handle`, the first one if it has several types
    #[must_use]
    pub fn get_component(&self, handle: &Handle) -> Option<AnyComponent> {
        self.with_slot(handle, |slot| {
            slot.entries.iter().find_map(|entry| entry.component.upgrade())
        })
    }

    /// Component of type `T` registered for `handle`
    #[must_use]
    pub fn get_component_as<T: Any + Send + Sync>(&self, handle: &Handle) -> Option<Arc<T>> {
        let component_type = ComponentType::of::<T>();
        let component = self.with_slot(handle, |slot| {
            slot.entries
                .iter()
                .find(|entry| entry.component_type == component_type)
                .and_then(|entry| entry.component.upgrade())
        })?;
        component.downcast::<T>().ok()
    }

    /// Every component registered for `handle`, in registration order
    #[must_use]
    pub fn get_components(&self, handle: &Handle) -> Vec<AnyComponent> {
        self.with_slot(handle, |slot| {
            Some(
                slot.entries
                    .iter()
                    .filter_map(|entry| entry.component.upgrade())
                    .collect(),
            )
        })
        .unwrap_or_default()
    }

    fn with_slot<R>(&self, handle: &Handle, f: impl FnOnce(&Slot) -> Option<R>) -> Option<R> {
        let depth = self.config.max_unwrap_depth;
        let key = HandleKey::of(&unwrap_handle(handle, depth));
        let proxy_key = find_proxy(handle, depth).map(|proxy| HandleKey::of_ref(&*proxy));
        let mut state = self.lock();
        let _ = state.sweep();
        state.lookup(key, proxy_key).and_then(f)
    }

    /// Snapshot of every live registration
    #[must_use]
    pub fn get_all_components(&self) -> Vec<RegisteredComponent> {
        let mut state = self.lock();
        let _ = state.sweep();
        state
            .slots
            .values()
            .filter_map(|slot| slot.handle.upgrade().map(|handle| (slot, handle)))
            .flat_map(|(slot, handle)| {
                slot.entries.iter().filter_map(move |entry| {
                    Some(RegisteredComponent {
                        component_type: entry.component_type,
                        component: entry.component.upgrade()?,
                        handle: Arc::clone(&handle),
                    })
                })
            })
            .collect()
    }

    /// Number of registered components
    #[must_use]
    pub fn len(&self) -> usize {
        let mut state = self.lock();
        let _ = state.sweep();
        state
            .slots
            .values()
            .map(|slot| slot.entries.iter().filter(|entry| entry.is_live()).count())
            .sum()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop entries whose component or handle is gone; returns how many were
    /// dropped
    pub fn sweep(&self) -> usize {
        self.lock().sweep()
    }

    /// Forget every registration and stop listening to every proxy
    pub fn release(&self) {
        let (components, links) = {
            let mut state = self.lock();
            let components: usize = state.slots.values().map(|slot| slot.entries.len()).sum();
            state.slots.clear();
            (components, std::mem::take(&mut state.proxies))
        };
        for link in links.values() {
            if let Some(proxy) = link.proxy.upgrade() {
                let _ = proxy.remove_listener(link.listener);
            }
        }
        debug!(components, proxies = links.len(), "released component registry");
    }

    fn proxy_found(&self, proxy: &LazyProxy, element: &Handle) {
        let innermost = unwrap_handle(element, self.config.max_unwrap_depth);
        let new_key = HandleKey::of(&innermost);
        let proxy_key = HandleKey::of_ref(proxy);
        let mut state = self.lock();
        let _ = state.sweep();
        let moved = state.migrate(proxy_key, new_key, &innermost);
        trace!(proxy = %proxy.describe(), key = %new_key, moved, "proxy resolved");
    }
}

impl ComponentInstantiator for ComponentsManager {
    fn is_component_type(&self, component_type: std::any::TypeId) -> bool {
        self.instantiator.is_component_type(component_type)
    }

    fn instantiate(
        &self,
        component_type: ComponentType,
        handle: Handle,
    ) -> FluentResult<AnyComponent> {
        self.register(component_type, handle)
    }
}

impl ProxyListener for ComponentsManager {
    fn proxy_element_found(&self, proxy: &LazyProxy, element: &Handle) {
        self.proxy_found(proxy, element);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::component::{Component, ComponentContext, FromHandle, FromHandleWithContext};
    use crate::element::FluentElement;
    use crate::locator::{By, ElementLocator, MatchPolicy, SearchContext};
    use crate::mock::{DecoratedElement, MockNode, MockPage, SelfWrappingElement};
    use crate::result::FluentError;
    use proptest::prelude::*;

    /// Component that does not keep its handle alive
    #[derive(Debug)]
    struct Marker;

    impl FromHandle for Marker {
        fn from_handle(_handle: Handle) -> FluentResult<Self> {
            Ok(Self)
        }
    }

    #[derive(Debug)]
    struct Button {
        element: FluentElement,
    }

    impl FromHandleWithContext for Button {
        fn from_handle_with_context(handle: Handle, context: ComponentContext) -> FluentResult<Self> {
            Ok(Self {
                element: FluentElement::new(handle, context),
            })
        }
    }

    impl Component for Button {
        fn element(&self) -> &FluentElement {
            &self.element
        }
    }

    fn setup() -> (Arc<MockPage>, Arc<ComponentsManager>) {
        let page = MockPage::new();
        page.append(MockNode::new("button").id("go").text("Go"));
        page.append(MockNode::new("button").id("stop").text("Stop"));
        let factory = ComponentFactory::builder()
            .component::<Marker>()
            .component_with_context::<Button>()
            .build();
        let manager = ComponentsManager::new(page.clone(), factory, Arc::new(FluentConfig::default()));
        (page, manager)
    }

    fn proxy(page: &Arc<MockPage>, css: &str) -> Arc<LazyProxy> {
        LazyProxy::new(ElementLocator::new(page.clone(), css), MatchPolicy::FirstMatch)
    }

    fn as_handle(proxy: &Arc<LazyProxy>) -> Handle {
        Arc::clone(proxy) as Handle
    }

    fn same_component(a: &AnyComponent, b: &AnyComponent) -> bool {
        Arc::ptr_eq(a, b)
    }

    mod identity_tests {
        use super::*;

        #[test]
        fn test_lookup_returns_registered_instance() {
            let (page, manager) = setup();
            let go = page.handle_by_id("go").unwrap();
            let element = manager.new_component::<FluentElement>(Arc::clone(&go)).unwrap();
            let found = manager.get_component_as::<FluentElement>(&go).unwrap();
            assert!(Arc::ptr_eq(&element, &found));
            assert_eq!(manager.len(), 1);
        }

        #[test]
        fn test_unknown_handle() {
            let (page, manager) = setup();
            assert!(manager.get_component(&page.handle_by_id("go").unwrap()).is_none());
            assert!(manager.is_empty());
        }

        #[test]
        fn test_decorated_handle_shares_identity() {
            let (page, manager) = setup();
            let raw = page.handle_by_id("go").unwrap();
            let decorated: Handle = Arc::new(DecoratedElement::new(Arc::clone(&raw)));
            let _element = manager.new_component::<FluentElement>(decorated).unwrap();
            assert!(manager.get_component(&raw).is_some());
        }

        #[test]
        fn test_self_wrapping_handle() {
            let (_page, manager) = setup();
            let selfish: Handle = SelfWrappingElement::new();
            let _marker = manager.new_component::<Marker>(Arc::clone(&selfish)).unwrap();
            assert!(manager.get_component_as::<Marker>(&selfish).is_some());
        }

        #[test]
        fn test_dual_typing() {
            let (page, manager) = setup();
            let go = page.handle_by_id("go").unwrap();
            let element = manager.new_component::<FluentElement>(Arc::clone(&go)).unwrap();
            let button = element.as_component::<Button>().unwrap();
            assert!(Arc::ptr_eq(&manager.get_component_as::<Button>(&go).unwrap(), &button));
            assert!(Arc::ptr_eq(&manager.get_component_as::<FluentElement>(&go).unwrap(), &element));
            assert_eq!(manager.get_components(&go).len(), 2);
        }

        #[test]
        fn test_same_type_replaces() {
            let (page, manager) = setup();
            let go = page.handle_by_id("go").unwrap();
            let first = manager.new_component::<FluentElement>(Arc::clone(&go)).unwrap();
            let second = manager.new_component::<FluentElement>(Arc::clone(&go)).unwrap();
            assert!(Arc::ptr_eq(&manager.get_component_as::<FluentElement>(&go).unwrap(), &second));
            assert!(!Arc::ptr_eq(&first, &second));
            assert_eq!(manager.len(), 1);
        }

        #[test]
        fn test_separate_searches_share_one_entry() {
            let (page, manager) = setup();
            let first = page.find_raw(&By::id("go")).unwrap().remove(0);
            let element = manager.new_component::<FluentElement>(first).unwrap();
            let again = page.find_raw(&By::tag_name("button")).unwrap().remove(0);
            let found = manager.get_component_as::<FluentElement>(&again).unwrap();
            assert!(Arc::ptr_eq(&found, &element));
        }

        #[test]
        fn test_invalid_type_registers_nothing() {
            #[derive(Debug)]
            struct Unknown;
            let (page, manager) = setup();
            let err = manager
                .new_component::<Unknown>(page.handle_by_id("go").unwrap())
                .unwrap_err();
            assert!(matches!(err, FluentError::InvalidComponentType { .. }));
            assert!(manager.is_empty());
        }
    }

    mod proxy_tests {
        use super::*;

        #[test]
        fn test_unresolved_proxy_is_its_own_key() {
            let (page, manager) = setup();
            let go = proxy(&page, "#go");
            let element = manager.new_component::<FluentElement>(as_handle(&go)).unwrap();
            assert_eq!(page.search_count(), 0);
            let found = manager.get_component_as::<FluentElement>(&as_handle(&go)).unwrap();
            assert!(Arc::ptr_eq(&found, &element));
        }

        #[test]
        fn test_resolution_moves_entry() {
            let (page, manager) = setup();
            let go = proxy(&page, "#go");
            let element = manager.new_component::<FluentElement>(as_handle(&go)).unwrap();
            element.click().unwrap();
            let raw = page.handle_by_id("go").unwrap();
            let by_raw = manager.get_component_as::<FluentElement>(&raw).unwrap();
            let by_proxy = manager.get_component_as::<FluentElement>(&as_handle(&go)).unwrap();
            assert!(Arc::ptr_eq(&by_raw, &element));
            assert!(Arc::ptr_eq(&by_proxy, &element));
            assert_eq!(manager.len(), 1);
        }

        #[test]
        fn test_one_listener_per_proxy() {
            let (page, manager) = setup();
            let go = proxy(&page, "#go");
            let _element = manager.new_component::<FluentElement>(as_handle(&go)).unwrap();
            let _button = manager.new_component::<Button>(as_handle(&go)).unwrap();
            assert_eq!(go.listener_count(), 1);
            go.now().unwrap();
            assert_eq!(manager.get_components(&page.handle_by_id("go").unwrap()).len(), 2);
        }

        #[test]
        fn test_found_for_unknown_proxy_is_noop() {
            let (page, manager) = setup();
            let go = proxy(&page, "#go");
            manager.proxy_element_found(&go, &page.handle_by_id("go").unwrap());
            assert!(manager.is_empty());
        }

        #[test]
        fn test_reresolution_after_staleness() {
            let (page, manager) = setup();
            let go = proxy(&page, "#go");
            let element = manager.new_component::<FluentElement>(as_handle(&go)).unwrap();
            element.click().unwrap();

            page.navigate();
            page.append(MockNode::new("button").id("go").text("Go"));
            assert!(element.click().unwrap_err().is_stale());
            let during = manager.get_component_as::<FluentElement>(&as_handle(&go)).unwrap();
            assert!(Arc::ptr_eq(&during, &element));

            element.click().unwrap();
            let fresh = page.handle_by_id("go").unwrap();
            let after = manager.get_component_as::<FluentElement>(&fresh).unwrap();
            assert!(Arc::ptr_eq(&after, &element));
            assert_eq!(manager.len(), 1);
        }

        #[test]
        fn test_registration_through_decorated_proxy() {
            let (page, manager) = setup();
            let go = proxy(&page, "#go");
            let decorated: Handle = Arc::new(DecoratedElement::new(as_handle(&go)));
            let _marker = manager.new_component::<Marker>(decorated).unwrap();
            assert_eq!(go.listener_count(), 1);
            go.now().unwrap();
            assert!(manager.get_component(&page.handle_by_id("go").unwrap()).is_some());
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn test_release() {
            let (page, manager) = setup();
            let go = proxy(&page, "#go");
            let raw = page.handle_by_id("stop").unwrap();
            let _lazy = manager.new_component::<FluentElement>(as_handle(&go)).unwrap();
            let _plain = manager.new_component::<FluentElement>(Arc::clone(&raw)).unwrap();
            manager.release();
            assert!(manager.is_empty());
            assert!(manager.get_component(&raw).is_none());
            assert_eq!(go.listener_count(), 0);
            go.now().unwrap();
            assert!(manager.get_component(&page.handle_by_id("go").unwrap()).is_none());
        }

        #[test]
        fn test_dropped_handle_is_swept() {
            let (page, manager) = setup();
            let go = page.handle_by_id("go").unwrap();
            let _marker = manager.new_component::<Marker>(Arc::clone(&go)).unwrap();
            assert_eq!(manager.len(), 1);
            drop(go);
            assert!(manager.is_empty());
            assert!(manager.get_all_components().is_empty());
        }

        #[test]
        fn test_sweep_returns_entry_to_live_proxy() {
            let (page, manager) = setup();
            let go = proxy(&page, "#go");
            let _marker = manager.new_component::<Marker>(as_handle(&go)).unwrap();
            go.now().unwrap();
            go.reset();
            assert_eq!(manager.sweep(), 0);
            assert!(manager.get_component_as::<Marker>(&as_handle(&go)).is_some());
            assert_eq!(manager.len(), 1);
        }

        #[test]
        fn test_all_components_snapshot() {
            let (page, manager) = setup();
            let go = page.handle_by_id("go").unwrap();
            let stop = page.handle_by_id("stop").unwrap();
            let _element = manager.new_component::<FluentElement>(Arc::clone(&go)).unwrap();
            let _button = manager.new_component::<Button>(Arc::clone(&stop)).unwrap();
            let all = manager.get_all_components();
            assert_eq!(all.len(), 2);
            assert!(all.iter().any(|r| same_handle(&r.handle, &go)
                && r.component_type == ComponentType::of::<FluentElement>()));
            assert!(all.iter().any(|r| same_handle(&r.handle, &stop)
                && r.component_type == ComponentType::of::<Button>()));
        }

        #[test]
        fn test_dropped_component_releases_its_element() {
            let (page, manager) = setup();
            let go = page.handle_by_id("go").unwrap();
            let watch = Arc::downgrade(&go);
            let element = manager.new_component::<FluentElement>(go).unwrap();
            assert_eq!(manager.len(), 1);

            drop(element);
            page.navigate();
            assert!(watch.upgrade().is_none());
            assert_eq!(manager.len(), 0);
            assert!(manager.get_all_components().is_empty());
        }

        #[test]
        fn test_registry_does_not_keep_components_alive() {
            let (page, manager) = setup();
            let go = page.handle_by_id("go").unwrap();
            let element = manager.new_component::<FluentElement>(Arc::clone(&go)).unwrap();
            let button = element.as_component::<Button>().unwrap();
            drop(element);
            assert!(manager.get_component_as::<FluentElement>(&go).is_none());
            assert!(Arc::ptr_eq(&manager.get_component_as::<Button>(&go).unwrap(), &button));
            assert_eq!(manager.len(), 1);
        }

        #[test]
        fn test_manager_is_freed_with_its_components() {
            let (page, manager) = setup();
            let watch = Arc::downgrade(&manager);
            let element = manager.new_component::<FluentElement>(page.handle_by_id("go").unwrap()).unwrap();
            drop(manager);
            assert!(watch.upgrade().is_some());
            drop(element);
            assert!(watch.upgrade().is_none());
        }

        #[test]
        fn test_concurrent_registration() {
            let (page, manager) = setup();
            let handles: Vec<Handle> = (0..16)
                .map(|i| {
                    let node = page.append(MockNode::new("li").id(format!("li{i}")));
                    page.handle(node).unwrap()
                })
                .collect();
            let kept: Vec<Arc<FluentElement>> = std::thread::scope(|scope| {
                let workers: Vec<_> = handles
                    .chunks(4)
                    .map(|chunk| {
                        let manager = Arc::clone(&manager);
                        scope.spawn(move || {
                            chunk
                                .iter()
                                .map(|handle| {
                                    let element = manager
                                        .new_component::<FluentElement>(Arc::clone(handle))
                                        .unwrap();
                                    let found = manager.get_component_as::<FluentElement>(handle).unwrap();
                                    assert!(Arc::ptr_eq(&element, &found));
                                    element
                                })
                                .collect::<Vec<_>>()
                        })
                    })
                    .collect();
                workers.into_iter().flat_map(|worker| worker.join().unwrap()).collect()
            });
            assert_eq!(kept.len(), 16);
            assert_eq!(manager.len(), 16);
        }

        #[test]
        fn test_concurrent_resolution_keeps_every_mapping() {
            let (page, manager) = setup();
            for i in 0..16 {
                page.append(MockNode::new("li").id(format!("li{i}")));
            }
            let proxies: Vec<Arc<LazyProxy>> = (0..16).map(|i| proxy(&page, &format!("#li{i}"))).collect();
            let elements: Vec<Arc<FluentElement>> = proxies
                .iter()
                .map(|p| manager.new_component::<FluentElement>(as_handle(p)).unwrap())
                .collect();

            std::thread::scope(|scope| {
                for chunk in proxies.chunks(2) {
                    scope.spawn(move || {
                        for p in chunk {
                            p.now().unwrap();
                        }
                    });
                }
            });

            assert_eq!(manager.len(), 16);
            for (i, element) in elements.iter().enumerate() {
                let raw = page.handle_by_id(&format!("li{i}")).unwrap();
                let found = manager.get_component_as::<FluentElement>(&raw).unwrap();
                assert!(Arc::ptr_eq(&found, element));
            }
        }
    }

    mod instantiator_tests {
        use super::*;

        #[test]
        fn test_components_receive_registry() {
            let (page, manager) = setup();
            let go = page.handle_by_id("go").unwrap();
            let element = manager.new_component::<FluentElement>(Arc::clone(&go)).unwrap();
            let nested = element.el("span").unwrap();
            assert!(manager.get_component_as::<FluentElement>(nested.handle()).is_some());
        }

        #[test]
        fn test_custom_instantiator() {
            let page = MockPage::new();
            page.append(MockNode::new("p").id("p"));
            let config = Arc::new(FluentConfig::default());
            let inner: Arc<dyn ComponentInstantiator> =
                DefaultComponentInstantiator::standalone(page.clone(), ComponentFactory::new(), Arc::clone(&config));
            let manager = ComponentsManager::with_instantiator(page.clone(), inner, config);
            let p = page.handle_by_id("p").unwrap();
            let _element = manager.new_component::<FluentElement>(Arc::clone(&p)).unwrap();
            assert!(manager.get_component(&p).is_some());
            assert!(manager.is_component_type(std::any::TypeId::of::<FluentElement>()));
        }

        #[test]
        fn test_dyn_entry_point_registers() {
            let (page, manager) = setup();
            let as_dyn: Arc<dyn ComponentInstantiator> = manager.clone();
            let go = page.handle_by_id("go").unwrap();
            let element = as_dyn.new_component::<FluentElement>(Arc::clone(&go)).unwrap();
            let found = manager.get_component(&go).unwrap();
            let element: AnyComponent = element;
            assert!(same_component(&element, &found));
        }
    }

    proptest! {
        #[test]
        fn prop_every_registered_handle_finds_its_component(count in 1usize..12, lookups in proptest::collection::vec(0usize..12, 1..20)) {
            let (page, manager) = setup();
            let handles: Vec<Handle> = (0..count)
                .map(|i| {
                    let node = page.append(MockNode::new("li").id(format!("n{i}")));
                    page.handle(node).unwrap()
                })
                .collect();
            let components: Vec<Arc<FluentElement>> = handles
                .iter()
                .map(|h| manager.new_component::<FluentElement>(Arc::clone(h)).unwrap())
                .collect();
            for i in lookups.into_iter().filter(|i| *i < count) {
                let found = manager.get_component_as::<FluentElement>(&handles[i]).unwrap();
                prop_assert!(Arc::ptr_eq(&found, &components[i]));
            }
            prop_assert_eq!(manager.len(), count);
        }
    }
}
