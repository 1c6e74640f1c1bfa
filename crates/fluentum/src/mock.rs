//! In-memory driver for testing components without a browser.
//!
//! [`MockPage`] holds a small DOM built from [`MockNode`] trees. It interns
//! handles, so searching the same live node twice returns the same
//! allocation, the way a real driver considers two references to one node
//! equal. [`MockPage::navigate`] detaches every node: handles obtained before
//! navigation fail with `StaleElement` from then on.
//!
//! The CSS support is deliberately small: compound selectors (`tag`, `*`,
//! `#id`, `.class`, `[attr]`, `[attr=value]`), descendant combinators and
//! comma-separated lists. XPath is rejected with `InvalidSelector`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use crate::handle::{Handle, WebElement};
use crate::locator::{By, SearchContext};
use crate::result::{FluentError, FluentResult};

/// Index of a node inside a [`MockPage`]
pub type NodeId = usize;

/// Declarative description of a node and its subtree
#[derive(Debug, Clone)]
pub struct MockNode {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    displayed: bool,
    enabled: bool,
    children: Vec<MockNode>,
}

impl MockNode {
    /// Create a node with the given tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attributes: BTreeMap::new(),
            text: String::new(),
            displayed: true,
            enabled: true,
            children: Vec::new(),
        }
    }

    /// Set the `id` attribute
    #[must_use]
    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    /// Set the `name` attribute
    #[must_use]
    pub fn name(self, name: impl Into<String>) -> Self {
        self.attr("name", name)
    }

    /// Set the `class` attribute
    #[must_use]
    pub fn class(self, class: impl Into<String>) -> Self {
        self.attr("class", class)
    }

    /// Set an arbitrary attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the node's own text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Render the node invisible
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    /// Disable interaction
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Append a child node
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }
}

#[derive(Debug)]
struct NodeData {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    displayed: bool,
    enabled: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attached: bool,
    clicks: u32,
    submits: u32,
}

impl NodeData {
    fn describe(&self) -> String {
        match self.attributes.get("id") {
            Some(id) => format!("<{} id={id:?}>", self.tag),
            None => format!("<{}>", self.tag),
        }
    }

    fn has_class(&self, class: &str) -> bool {
        self.attributes
            .get("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }
}

#[derive(Debug, Default)]
struct Dom {
    nodes: Vec<NodeData>,
    roots: Vec<NodeId>,
    interned: HashMap<NodeId, Weak<MockElement>>,
    searches: usize,
    generation: u64,
}

impl Dom {
    fn insert(&mut self, node: MockNode, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(NodeData {
            tag: node.tag,
            attributes: node.attributes,
            text: node.text,
            displayed: node.displayed,
            enabled: node.enabled,
            parent,
            children: Vec::new(),
            attached: true,
            clicks: 0,
            submits: 0,
        });
        for child in node.children {
            let child_id = self.insert(child, Some(id));
            self.nodes[id].children.push(child_id);
        }
        id
    }

    fn node(&self, id: NodeId) -> FluentResult<&NodeData> {
        match self.nodes.get(id) {
            Some(node) if node.attached => Ok(node),
            Some(node) => Err(FluentError::stale(node.describe())),
            None => Err(FluentError::driver(format!("unknown node {id}"))),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> FluentResult<&mut NodeData> {
        match self.nodes.get_mut(id) {
            Some(node) if node.attached => Ok(node),
            Some(node) => Err(FluentError::stale(node.describe())),
            None => Err(FluentError::driver(format!("unknown node {id}"))),
        }
    }

    fn descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &child in &self.nodes[id].children {
            out.push(child);
            self.descendants(child, out);
        }
    }

    fn document_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for &root in &self.roots {
            out.push(root);
            self.descendants(root, &mut out);
        }
        out
    }

    fn detach(&mut self, id: NodeId) {
        let mut subtree = vec![id];
        self.descendants(id, &mut subtree);
        for node in subtree {
            self.nodes[node].attached = false;
            let _ = self.interned.remove(&node);
        }
    }

    fn find_by_id_attr(&self, id_attr: &str) -> Option<NodeId> {
        self.document_order()
            .into_iter()
            .find(|&n| self.nodes[n].attributes.get("id").map(String::as_str) == Some(id_attr))
    }

    fn render_text(&self, id: NodeId, include_hidden: bool) -> String {
        let node = &self.nodes[id];
        if !include_hidden && !node.displayed {
            return String::new();
        }
        let mut parts = Vec::new();
        if !node.text.is_empty() {
            parts.push(node.text.clone());
        }
        for &child in &node.children {
            let text = self.render_text(child, include_hidden);
            if !text.is_empty() {
                parts.push(text);
            }
        }
        parts.join(" ")
    }

    fn matches(&self, id: NodeId, by: &By) -> FluentResult<bool> {
        let node = &self.nodes[id];
        Ok(match by {
            By::Css(css) => {
                let groups = parse_css(css)?;
                groups.iter().any(|chain| self.matches_chain(id, chain))
            }
            By::XPath(expr) => {
                return Err(FluentError::InvalidSelector {
                    selector: expr.clone(),
                    message: "xpath is not supported by the mock driver".to_string(),
                })
            }
            By::Id(value) => node.attributes.get("id") == Some(value),
            By::Name(value) => node.attributes.get("name") == Some(value),
            By::ClassName(value) => node.has_class(value),
            By::TagName(value) => node.tag.eq_ignore_ascii_case(value),
            By::LinkText(value) => node.tag == "a" && &self.render_text(id, false) == value,
        })
    }

    fn matches_chain(&self, id: NodeId, chain: &[Compound]) -> bool {
        let Some((last, ancestors)) = chain.split_last() else {
            return false;
        };
        if !last.matches(&self.nodes[id]) {
            return false;
        }
        if ancestors.is_empty() {
            return true;
        }
        let mut parent = self.nodes[id].parent;
        while let Some(p) = parent {
            if self.matches_chain(p, ancestors) {
                return true;
            }
            parent = self.nodes[p].parent;
        }
        false
    }
}

#[derive(Debug, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, node: &NodeData) -> bool {
        self.tag.as_ref().map_or(true, |t| &node.tag == t)
            && self
                .id
                .as_ref()
                .map_or(true, |id| node.attributes.get("id") == Some(id))
            && self.classes.iter().all(|c| node.has_class(c))
            && self.attributes.iter().all(|(name, value)| {
                match (node.attributes.get(name), value) {
                    (Some(actual), Some(expected)) => actual == expected,
                    (Some(_), None) => true,
                    (None, _) => false,
                }
            })
    }
}

fn invalid_css(css: &str, message: &str) -> FluentError {
    FluentError::InvalidSelector {
        selector: css.to_string(),
        message: message.to_string(),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn take_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        ident.push(c);
        let _ = chars.next();
    }
    ident
}

fn parse_compound(css: &str, token: &str) -> FluentResult<Compound> {
    let mut compound = Compound::default();
    let mut chars = token.chars().peekable();
    match chars.peek().copied() {
        Some('*') => {
            let _ = chars.next();
        }
        Some(c) if is_ident_char(c) => {
            compound.tag = Some(take_ident(&mut chars).to_ascii_lowercase());
        }
        _ => {}
    }
    while let Some(c) = chars.next() {
        match c {
            '#' => compound.id = Some(take_ident(&mut chars)),
            '.' => compound.classes.push(take_ident(&mut chars)),
            '[' => {
                let mut body = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(c) => body.push(c),
                        None => return Err(invalid_css(css, "unterminated attribute selector")),
                    }
                }
                let attribute = match body.split_once('=') {
                    Some((name, value)) => (
                        name.trim().to_string(),
                        Some(value.trim().trim_matches(|q| q == '"' || q == '\'').to_string()),
                    ),
                    None => (body.trim().to_string(), None),
                };
                compound.attributes.push(attribute);
            }
            _ => return Err(invalid_css(css, "unsupported selector syntax")),
        }
    }
    Ok(compound)
}

fn parse_css(css: &str) -> FluentResult<Vec<Vec<Compound>>> {
    if css.contains(['>', '+', '~']) {
        return Err(invalid_css(css, "only descendant combinators are supported"));
    }
    let mut groups = Vec::new();
    for group in css.split(',') {
        let chain = group
            .split_whitespace()
            .map(|token| parse_compound(css, token))
            .collect::<FluentResult<Vec<_>>>()?;
        if chain.is_empty() {
            return Err(invalid_css(css, "empty selector"));
        }
        groups.push(chain);
    }
    Ok(groups)
}

fn lock(dom: &Mutex<Dom>) -> MutexGuard<'_, Dom> {
    dom.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An in-memory page
pub struct MockPage {
    dom: Mutex<Dom>,
    self_ref: Weak<MockPage>,
}

impl fmt::Debug for MockPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dom = lock(&self.dom);
        f.debug_struct("MockPage")
            .field("nodes", &dom.nodes.len())
            .field("generation", &dom.generation)
            .finish()
    }
}

impl MockPage {
    /// Create an empty page
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            dom: Mutex::new(Dom::default()),
            self_ref: me.clone(),
        })
    }

    /// Append a top-level subtree
    pub fn append(&self, node: MockNode) -> NodeId {
        let mut dom = lock(&self.dom);
        let id = dom.insert(node, None);
        dom.roots.push(id);
        id
    }

    /// Append a subtree under an attached node
    pub fn append_child(&self, parent: NodeId, node: MockNode) -> FluentResult<NodeId> {
        let mut dom = lock(&self.dom);
        let _ = dom.node(parent)?;
        let id = dom.insert(node, Some(parent));
        dom.nodes[parent].children.push(id);
        Ok(id)
    }

    /// Detach every node, as a page navigation would
    pub fn navigate(&self) {
        let mut dom = lock(&self.dom);
        let roots = std::mem::take(&mut dom.roots);
        for root in roots {
            dom.detach(root);
        }
        dom.generation += 1;
        debug!(generation = dom.generation, "mock page navigated");
    }

    /// Detach one subtree
    pub fn remove(&self, id: NodeId) {
        let mut dom = lock(&self.dom);
        if let Some(parent) = dom.nodes.get(id).and_then(|n| n.parent) {
            dom.nodes[parent].children.retain(|&c| c != id);
        }
        dom.roots.retain(|&r| r != id);
        dom.detach(id);
    }

    /// Interned handle of an attached node
    pub fn handle(&self, id: NodeId) -> FluentResult<Handle> {
        let mut dom = lock(&self.dom);
        let _ = dom.node(id)?;
        self.intern(&mut dom, id)
    }

    /// Interned handle of the attached node with the given `id` attribute
    #[must_use]
    pub fn handle_by_id(&self, id_attr: &str) -> Option<Handle> {
        let mut dom = lock(&self.dom);
        let id = dom.find_by_id_attr(id_attr)?;
        self.intern(&mut dom, id).ok()
    }

    /// Node index of the attached node with the given `id` attribute
    #[must_use]
    pub fn node_id(&self, id_attr: &str) -> Option<NodeId> {
        lock(&self.dom).find_by_id_attr(id_attr)
    }

    /// Number of clicks received by a node, attached or not
    #[must_use]
    pub fn clicks(&self, id: NodeId) -> u32 {
        lock(&self.dom).nodes.get(id).map_or(0, |n| n.clicks)
    }

    /// Number of submits received by a node, attached or not
    #[must_use]
    pub fn submits(&self, id: NodeId) -> u32 {
        lock(&self.dom).nodes.get(id).map_or(0, |n| n.submits)
    }

    /// Current `value` of a node, attached or not
    #[must_use]
    pub fn value_of(&self, id: NodeId) -> Option<String> {
        lock(&self.dom)
            .nodes
            .get(id)
            .and_then(|n| n.attributes.get("value").cloned())
    }

    /// Enable or disable a node
    pub fn set_enabled(&self, id: NodeId, enabled: bool) {
        if let Some(node) = lock(&self.dom).nodes.get_mut(id) {
            node.enabled = enabled;
        }
    }

    /// Show or hide a node
    pub fn set_displayed(&self, id: NodeId, displayed: bool) {
        if let Some(node) = lock(&self.dom).nodes.get_mut(id) {
            node.displayed = displayed;
        }
    }

    /// Number of searches run against this page and its elements
    #[must_use]
    pub fn search_count(&self) -> usize {
        lock(&self.dom).searches
    }

    fn intern(&self, dom: &mut Dom, id: NodeId) -> FluentResult<Handle> {
        if let Some(existing) = dom.interned.get(&id).and_then(Weak::upgrade) {
            return Ok(existing);
        }
        let page = self
            .self_ref
            .upgrade()
            .ok_or_else(|| FluentError::driver("mock page dropped"))?;
        let element = Arc::new(MockElement { page, node: id });
        let _ = dom.interned.insert(id, Arc::downgrade(&element));
        Ok(element)
    }

    fn search(&self, scope: Option<NodeId>, by: &By) -> FluentResult<Vec<Handle>> {
        let mut dom = lock(&self.dom);
        dom.searches += 1;
        let candidates = match scope {
            Some(parent) => {
                let _ = dom.node(parent)?;
                let mut out = Vec::new();
                dom.descendants(parent, &mut out);
                out
            }
            None => dom.document_order(),
        };
        let mut found = Vec::new();
        for id in candidates {
            if dom.matches(id, by)? {
                found.push(self.intern(&mut dom, id)?);
            }
        }
        Ok(found)
    }

    fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&NodeData) -> R) -> FluentResult<R> {
        let dom = lock(&self.dom);
        dom.node(id).map(f)
    }

    fn with_node_mut<R>(&self, id: NodeId, f: impl FnOnce(&mut NodeData) -> R) -> FluentResult<R> {
        let mut dom = lock(&self.dom);
        dom.node_mut(id).map(f)
    }
}

impl SearchContext for MockPage {
    fn find_raw(&self, by: &By) -> FluentResult<Vec<Handle>> {
        self.search(None, by)
    }
}

/// Handle to one node of a [`MockPage`]
pub struct MockElement {
    page: Arc<MockPage>,
    node: NodeId,
}

impl fmt::Debug for MockElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockElement").field("node", &self.node).finish()
    }
}

impl MockElement {
    /// Node index this handle points to
    #[must_use]
    pub const fn node_id(&self) -> NodeId {
        self.node
    }
}

impl SearchContext for MockElement {
    fn find_raw(&self, by: &By) -> FluentResult<Vec<Handle>> {
        self.page.search(Some(self.node), by)
    }
}

impl WebElement for MockElement {
    fn click(&self) -> FluentResult<()> {
        self.page.with_node_mut(self.node, |n| n.clicks += 1)
    }

    fn submit(&self) -> FluentResult<()> {
        self.page.with_node_mut(self.node, |n| n.submits += 1)
    }

    fn clear(&self) -> FluentResult<()> {
        self.page.with_node_mut(self.node, |n| {
            let _ = n.attributes.insert("value".to_string(), String::new());
        })
    }

    fn send_keys(&self, text: &str) -> FluentResult<()> {
        self.page.with_node_mut(self.node, |n| {
            n.attributes
                .entry("value".to_string())
                .or_default()
                .push_str(text);
        })
    }

    fn text(&self) -> FluentResult<String> {
        let dom = lock(&self.page.dom);
        let _ = dom.node(self.node)?;
        Ok(dom.render_text(self.node, false))
    }

    fn text_content(&self) -> FluentResult<String> {
        let dom = lock(&self.page.dom);
        let _ = dom.node(self.node)?;
        Ok(dom.render_text(self.node, true))
    }

    fn attribute(&self, name: &str) -> FluentResult<Option<String>> {
        self.page
            .with_node(self.node, |n| n.attributes.get(name).cloned())
    }

    fn tag_name(&self) -> FluentResult<String> {
        self.page.with_node(self.node, |n| n.tag.clone())
    }

    fn is_enabled(&self) -> FluentResult<bool> {
        self.page
            .with_node(self.node, |n| n.enabled && !n.attributes.contains_key("disabled"))
    }

    fn is_displayed(&self) -> FluentResult<bool> {
        self.page.with_node(self.node, |n| n.displayed)
    }
}

/// A handle that decorates another one, like a logging or highlighting wrapper
#[derive(Debug)]
pub struct DecoratedElement {
    inner: Handle,
}

impl DecoratedElement {
    /// Decorate `inner`
    #[must_use]
    pub const fn new(inner: Handle) -> Self {
        Self { inner }
    }
}

impl SearchContext for DecoratedElement {
    fn find_raw(&self, by: &By) -> FluentResult<Vec<Handle>> {
        self.inner.find_raw(by)
    }
}

impl WebElement for DecoratedElement {
    fn click(&self) -> FluentResult<()> {
        self.inner.click()
    }

    fn submit(&self) -> FluentResult<()> {
        self.inner.submit()
    }

    fn clear(&self) -> FluentResult<()> {
        self.inner.clear()
    }

    fn send_keys(&self, text: &str) -> FluentResult<()> {
        self.inner.send_keys(text)
    }

    fn text(&self) -> FluentResult<String> {
        self.inner.text()
    }

    fn text_content(&self) -> FluentResult<String> {
        self.inner.text_content()
    }

    fn attribute(&self, name: &str) -> FluentResult<Option<String>> {
        self.inner.attribute(name)
    }

    fn tag_name(&self) -> FluentResult<String> {
        self.inner.tag_name()
    }

    fn is_enabled(&self) -> FluentResult<bool> {
        self.inner.is_enabled()
    }

    fn is_displayed(&self) -> FluentResult<bool> {
        self.inner.is_displayed()
    }

    fn wrapped(&self) -> Option<Handle> {
        Some(Arc::clone(&self.inner))
    }
}

/// A handle whose `wrapped()` returns itself
#[derive(Debug)]
pub struct SelfWrappingElement {
    me: Weak<SelfWrappingElement>,
}

impl SelfWrappingElement {
    /// Create the handle
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self { me: me.clone() })
    }
}

impl SearchContext for SelfWrappingElement {
    fn find_raw(&self, _by: &By) -> FluentResult<Vec<Handle>> {
        Ok(Vec::new())
    }
}

impl WebElement for SelfWrappingElement {
    fn click(&self) -> FluentResult<()> {
        Ok(())
    }

    fn submit(&self) -> FluentResult<()> {
        Ok(())
    }

    fn clear(&self) -> FluentResult<()> {
        Ok(())
    }

    fn send_keys(&self, _text: &str) -> FluentResult<()> {
        Ok(())
    }

    fn text(&self) -> FluentResult<String> {
        Ok(String::new())
    }

    fn text_content(&self) -> FluentResult<String> {
        Ok(String::new())
    }

    fn attribute(&self, _name: &str) -> FluentResult<Option<String>> {
        Ok(None)
    }

    fn tag_name(&self) -> FluentResult<String> {
        Ok("div".to_string())
    }

    fn is_enabled(&self) -> FluentResult<bool> {
        Ok(true)
    }

    fn is_displayed(&self) -> FluentResult<bool> {
        Ok(true)
    }

    fn wrapped(&self) -> Option<Handle> {
        self.me.upgrade().map(|me| me as Handle)
    }
}
