//! Host document collaborator.
//!
//! Three layers:
//!
//! - [`Fragment`] / [`Node`] / [`Element`]: owned, detached trees parsed from
//!   markup with `scraper`. Pre-replace observers mutate these in place.
//! - [`Document`]: an arena-backed tree of nodes with the handful of
//!   primitives the loader needs (attach, detach, replace, attributes,
//!   classes, text, serialization).
//! - [`HostDocument`]: a shared handle on a `Document` that notifies
//!   registered elements when a mutation connects or disconnects them, and
//!   publishes a layout generation so visibility watchers can re-check.

use scraper::{ElementRef, Html};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tokio::sync::watch;
use url::Url;

/// Attribute that takes a subtree out of the rendered page.
pub const HIDDEN_ATTR: &str = "hidden";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

// ── Owned trees ─────────────────────────────────────────────

/// A detached node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    Comment(String),
}

/// A detached element with its subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .attrs
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.collect_text(&mut out);
        }
        out
    }

    /// Replace all children with a single text node.
    pub fn set_text_content(&mut self, text: impl Into<String>) {
        self.children = vec![Node::Text(text.into())];
    }

    /// Depth-first search over this element and its descendants.
    pub fn find_mut<P>(&mut self, pred: &P) -> Option<&mut Element>
    where
        P: Fn(&Element) -> bool,
    {
        if pred(self) {
            return Some(self);
        }
        for child in &mut self.children {
            if let Node::Element(el) = child {
                if let Some(found) = el.find_mut(pred) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn find<P>(&self, pred: &P) -> Option<&Element>
    where
        P: Fn(&Element) -> bool,
    {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|child| match child {
            Node::Element(el) => el.find(pred),
            _ => None,
        })
    }
}

impl Node {
    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Element(el) => {
                for child in &el.children {
                    child.collect_text(out);
                }
            }
            Node::Text(t) => out.push_str(t),
            Node::Comment(_) => {}
        }
    }

    fn write_html(&self, out: &mut String, raw_text: bool) {
        match self {
            Node::Text(t) if raw_text => out.push_str(t),
            Node::Text(t) => escape_text(t, out),
            Node::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            Node::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for (k, v) in &el.attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    escape_attr(v, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&el.name.as_str()) {
                    return;
                }
                let raw = RAW_TEXT_ELEMENTS.contains(&el.name.as_str());
                for child in &el.children {
                    child.write_html(out, raw);
                }
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
        }
    }
}

fn escape_text(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(c),
        }
    }
}

/// Parsed markup waiting to be spliced into a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub nodes: Vec<Node>,
}

impl Fragment {
    /// Parse markup in a `<body>` context.
    pub fn parse(markup: &str) -> Self {
        let html = Html::parse_fragment(markup);
        Self {
            nodes: convert_children(html.root_element()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// The first element in document order.
    pub fn first_element(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|n| match n {
            Node::Element(el) => el.find(&|_: &Element| true),
            _ => None,
        })
    }

    pub fn first_element_mut(&mut self) -> Option<&mut Element> {
        self.find_mut(|_| true)
    }

    pub fn element_by_id(&self, id: &str) -> Option<&Element> {
        self.nodes.iter().find_map(|n| match n {
            Node::Element(el) => el.find(&|e: &Element| e.id() == Some(id)),
            _ => None,
        })
    }

    pub fn element_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.find_mut(|e| e.id() == Some(id))
    }

    fn find_mut(&mut self, pred: impl Fn(&Element) -> bool) -> Option<&mut Element> {
        for node in &mut self.nodes {
            if let Node::Element(el) = node {
                if let Some(found) = el.find_mut(&pred) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.collect_text(&mut out);
        }
        out
    }

    /// Serialize back to markup.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.write_html(&mut out, false);
        }
        out
    }
}

fn convert_children(parent: ElementRef<'_>) -> Vec<Node> {
    let mut out = Vec::new();
    for child in parent.children() {
        match child.value() {
            scraper::Node::Text(text) => out.push(Node::Text(String::from(&**text))),
            scraper::Node::Comment(comment) => out.push(Node::Comment(String::from(&**comment))),
            scraper::Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    out.push(Node::Element(convert_element(el)));
                }
            }
            _ => {}
        }
    }
    out
}

fn convert_element(el: ElementRef<'_>) -> Element {
    Element {
        name: el.value().name().to_string(),
        attrs: el
            .value()
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        children: convert_children(el),
    }
}

// ── Arena document ──────────────────────────────────────────

/// Handle on a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
enum Kind {
    Root,
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Slot {
    kind: Kind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A mutable document tree. Nodes are never freed; detached nodes simply
/// have no parent.
#[derive(Debug, Clone)]
pub struct Document {
    slots: Vec<Slot>,
    root: NodeId,
    doctype: bool,
}

impl Document {
    /// An empty `<html><head></head><body></body></html>` document.
    pub fn new() -> Self {
        let mut doc = Self::empty();
        let html = doc.create_element("html");
        let head = doc.create_element("head");
        let body = doc.create_element("body");
        doc.append_child(doc.root, html);
        doc.append_child(html, head);
        doc.append_child(html, body);
        doc.doctype = true;
        doc
    }

    fn empty() -> Self {
        Self {
            slots: vec![Slot {
                kind: Kind::Root,
                parent: None,
                children: Vec::new(),
            }],
            root: NodeId(0),
            doctype: false,
        }
    }

    /// Parse a complete HTML document.
    pub fn parse(markup: &str) -> Self {
        let html = Html::parse_document(markup);
        let mut doc = Self::empty();
        doc.doctype = html
            .tree
            .root()
            .children()
            .any(|n| matches!(n.value(), scraper::Node::Doctype(_)));
        let root_el = Node::Element(convert_element(html.root_element()));
        let id = doc.import(&root_el);
        doc.append_child(doc.root, id);
        doc
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The `<body>` element, or the root if there is none.
    pub fn body(&self) -> NodeId {
        self.elements_by_tag("body")
            .into_iter()
            .next()
            .unwrap_or(self.root)
    }

    fn slot(&self, id: NodeId) -> Option<&Slot> {
        self.slots.get(id.0)
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots.get_mut(id.0)
    }

    fn alloc(&mut self, kind: Kind) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Slot {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.alloc(Kind::Element {
            name: name.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(Kind::Text(text.to_string()))
    }

    /// Copy a detached tree into the arena. The result has no parent.
    pub fn import(&mut self, node: &Node) -> NodeId {
        match node {
            Node::Text(t) => self.alloc(Kind::Text(t.clone())),
            Node::Comment(c) => self.alloc(Kind::Comment(c.clone())),
            Node::Element(el) => {
                let id = self.alloc(Kind::Element {
                    name: el.name.clone(),
                    attrs: el.attrs.clone(),
                });
                for child in &el.children {
                    let child_id = self.import(child);
                    self.append_child(id, child_id);
                }
                id
            }
        }
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.slot(node).and_then(|s| s.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.slot(node).map(|s| s.children.as_slice()).unwrap_or(&[])
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn contains(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut cur = Some(node);
        while let Some(id) = cur {
            if id == ancestor {
                return true;
            }
            cur = self.parent(id);
        }
        false
    }

    /// Detach `node` from its parent. No-op for detached nodes.
    pub fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        if let Some(p) = self.slot_mut(parent) {
            p.children.retain(|c| *c != node);
        }
        if let Some(s) = self.slot_mut(node) {
            s.parent = None;
        }
    }

    /// Append `child` to `parent`, moving it if already attached.
    /// Returns `false` (and does nothing) if that would create a cycle.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        if self.slot(parent).is_none() || self.slot(child).is_none() || self.contains(child, parent)
        {
            return false;
        }
        self.detach(child);
        if let Some(p) = self.slot_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.slot_mut(child) {
            c.parent = Some(parent);
        }
        true
    }

    /// Insert `child` into `reference`'s parent, right before `reference`.
    pub fn insert_before(&mut self, reference: NodeId, child: NodeId) -> bool {
        let Some(parent) = self.parent(reference) else {
            return false;
        };
        if child == reference || self.contains(child, parent) {
            return false;
        }
        self.detach(child);
        let Some(p) = self.slot_mut(parent) else {
            return false;
        };
        let pos = p
            .children
            .iter()
            .position(|c| *c == reference)
            .unwrap_or(p.children.len());
        p.children.insert(pos, child);
        if let Some(c) = self.slot_mut(child) {
            c.parent = Some(parent);
        }
        true
    }

    /// Replace `node` with the fragment's nodes. Returns the inserted node
    /// ids, or `None` when `node` has no parent (nothing is changed).
    pub fn replace_with(&mut self, node: NodeId, fragment: &Fragment) -> Option<Vec<NodeId>> {
        self.parent(node)?;
        let mut inserted = Vec::with_capacity(fragment.len());
        for n in &fragment.nodes {
            let id = self.import(n);
            self.insert_before(node, id);
            inserted.push(id);
        }
        self.detach(node);
        Some(inserted)
    }

    /// Whether `node` is reachable from the document root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.contains(self.root, node)
    }

    /// Connected, and neither the node nor any ancestor is `hidden`.
    pub fn is_rendered(&self, node: NodeId) -> bool {
        if !self.is_connected(node) {
            return false;
        }
        let mut cur = Some(node);
        while let Some(id) = cur {
            if self.attribute(id, HIDDEN_ATTR).is_some() {
                return false;
            }
            cur = self.parent(id);
        }
        true
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.slot(node)?.kind {
            Kind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.slot(node)?.kind {
            Kind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(Slot {
            kind: Kind::Element { attrs, .. },
            ..
        }) = self.slot_mut(node)
        {
            match attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                Some((_, v)) => *v = value.to_string(),
                None => attrs.push((name.to_ascii_lowercase(), value.to_string())),
            }
        }
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(Slot {
            kind: Kind::Element { attrs, .. },
            ..
        }) = self.slot_mut(node)
        {
            attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .map(|c| c.split_ascii_whitespace().any(|x| x == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let value = match self.attribute(node, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_string(),
        };
        self.set_attribute(node, "class", &value);
    }

    pub fn remove_class(&mut self, node: NodeId, class: &str) {
        let Some(existing) = self.attribute(node, "class") else {
            return;
        };
        let value = existing
            .split_ascii_whitespace()
            .filter(|c| *c != class)
            .collect::<Vec<_>>()
            .join(" ");
        self.set_attribute(node, "class", &value);
    }

    pub fn text_content(&self, node: NodeId) -> String {
        self.to_node(node)
            .map(|n| {
                let mut out = String::new();
                n.collect_text(&mut out);
                out
            })
            .unwrap_or_default()
    }

    /// Replace all children of `node` with one text node.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) {
        self.clear_children(node);
        let t = self.create_text(text);
        self.append_child(node, t);
    }

    /// Replace all children of `node` with parsed markup.
    pub fn set_inner_html(&mut self, node: NodeId, markup: &str) -> Vec<NodeId> {
        self.clear_children(node);
        let fragment = Fragment::parse(markup);
        let mut ids = Vec::with_capacity(fragment.len());
        for n in &fragment.nodes {
            let id = self.import(n);
            self.append_child(node, id);
            ids.push(id);
        }
        ids
    }

    fn clear_children(&mut self, node: NodeId) {
        for child in self.children(node).to_vec() {
            self.detach(child);
        }
    }

    /// Snapshot a subtree as an owned node. `None` for the root.
    pub fn to_node(&self, node: NodeId) -> Option<Node> {
        let slot = self.slot(node)?;
        Some(match &slot.kind {
            Kind::Root => return None,
            Kind::Text(t) => Node::Text(t.clone()),
            Kind::Comment(c) => Node::Comment(c.clone()),
            Kind::Element { name, attrs } => Node::Element(Element {
                name: name.clone(),
                attrs: attrs.clone(),
                children: slot
                    .children
                    .iter()
                    .filter_map(|c| self.to_node(*c))
                    .collect(),
            }),
        })
    }

    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let Some(n) = self.to_node(node) {
            n.write_html(&mut out, false);
        }
        out
    }

    pub fn inner_html(&self, node: NodeId) -> String {
        let raw = self
            .tag_name(node)
            .map(|t| RAW_TEXT_ELEMENTS.contains(&t))
            .unwrap_or(false);
        let mut out = String::new();
        for child in self.children(node) {
            if let Some(n) = self.to_node(*child) {
                n.write_html(&mut out, raw);
            }
        }
        out
    }

    /// Serialize the whole document.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        if self.doctype {
            out.push_str("<!DOCTYPE html>");
        }
        for child in self.children(self.root) {
            if let Some(n) = self.to_node(*child) {
                n.write_html(&mut out, false);
            }
        }
        out
    }

    /// Descendants of `node` in document order, excluding `node` itself.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// First connected element with the given `id` attribute.
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|n| self.attribute(*n, "id") == Some(id))
    }

    /// Connected elements with the given tag name, in document order.
    pub fn elements_by_tag(&self, name: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .filter(|n| {
                self.tag_name(*n)
                    .map(|t| t.eq_ignore_ascii_case(name))
                    .unwrap_or(false)
            })
            .collect()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

// ── Shared host handle ──────────────────────────────────────

/// Callbacks a registered element receives when document mutations change
/// whether it is connected.
pub trait ConnectionReactions: Send + Sync {
    fn connected(&self);
    fn disconnected(&self);
}

struct Registration {
    node: NodeId,
    reactions: Weak<dyn ConnectionReactions>,
}

struct HostInner {
    tree: Mutex<Document>,
    layout: watch::Sender<u64>,
    registrations: Mutex<Vec<Registration>>,
    base_url: RwLock<Option<Url>>,
}

/// Shared, clonable handle on a host document.
///
/// Mutations go through [`HostDocument::mutate`], which fires connection
/// reactions after the tree lock is released, so reactions may freely read
/// or mutate the document.
#[derive(Clone)]
pub struct HostDocument {
    inner: Arc<HostInner>,
}

impl HostDocument {
    pub fn new() -> Self {
        Self::from_document(Document::new())
    }

    /// Parse a complete HTML document.
    pub fn parse(markup: &str) -> Self {
        Self::from_document(Document::parse(markup))
    }

    pub fn from_document(document: Document) -> Self {
        let (layout, _) = watch::channel(0);
        Self {
            inner: Arc::new(HostInner {
                tree: Mutex::new(document),
                layout,
                registrations: Mutex::new(Vec::new()),
                base_url: RwLock::new(None),
            }),
        }
    }

    /// Set the URL relative locators resolve against.
    pub fn set_base_url(&self, url: Option<Url>) {
        *self
            .inner
            .base_url
            .write()
            .unwrap_or_else(PoisonError::into_inner) = url;
    }

    pub fn base_url(&self) -> Option<Url> {
        self.inner
            .base_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolve a raw locator against the base URL. Without a base URL (or
    /// when joining fails) the raw value is returned unchanged.
    pub fn resolve_url(&self, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }
        match self.base_url() {
            Some(base) => base
                .join(raw)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| raw.to_string()),
            None => raw.to_string(),
        }
    }

    fn lock_tree(&self) -> MutexGuard<'_, Document> {
        self.inner.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the document.
    pub fn read<R>(&self, f: impl FnOnce(&Document) -> R) -> R {
        f(&self.lock_tree())
    }

    /// Mutate the document, then fire connection reactions for every
    /// registered element whose connectedness changed.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        let watched = self.live_registrations();
        let (result, flips) = {
            let mut tree = self.lock_tree();
            let before: Vec<bool> = watched
                .iter()
                .map(|(node, _)| tree.is_connected(*node))
                .collect();
            let result = f(&mut tree);
            let flips: Vec<(Arc<dyn ConnectionReactions>, bool)> = watched
                .into_iter()
                .zip(before)
                .filter_map(|((node, reactions), was)| {
                    let now = tree.is_connected(node);
                    (now != was).then_some((reactions, now))
                })
                .collect();
            (result, flips)
        };

        self.inner.layout.send_modify(|g| *g = g.wrapping_add(1));

        for (reactions, connected) in flips {
            if connected {
                reactions.connected();
            } else {
                reactions.disconnected();
            }
        }
        result
    }

    /// Layout generation; bumps after every mutation.
    pub fn layout_changes(&self) -> watch::Receiver<u64> {
        self.inner.layout.subscribe()
    }

    /// Register connection reactions for `node`.
    pub fn observe_connection(&self, node: NodeId, reactions: Weak<dyn ConnectionReactions>) {
        let mut regs = self
            .inner
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        regs.retain(|r| r.reactions.strong_count() > 0);
        regs.push(Registration { node, reactions });
    }

    /// Whether a live element is registered for `node`.
    pub fn is_observed(&self, node: NodeId) -> bool {
        self.live_registrations().iter().any(|(n, _)| *n == node)
    }

    fn live_registrations(&self) -> Vec<(NodeId, Arc<dyn ConnectionReactions>)> {
        let mut regs = self
            .inner
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        regs.retain(|r| r.reactions.strong_count() > 0);
        regs.iter()
            .filter_map(|r| r.reactions.upgrade().map(|a| (r.node, a)))
            .collect()
    }

    // Conveniences over read/mutate.

    pub fn body(&self) -> NodeId {
        self.read(|d| d.body())
    }

    pub fn create_element(&self, name: &str) -> NodeId {
        self.mutate(|d| d.create_element(name))
    }

    pub fn append_child(&self, parent: NodeId, child: NodeId) -> bool {
        self.mutate(|d| d.append_child(parent, child))
    }

    pub fn remove(&self, node: NodeId) {
        self.mutate(|d| d.detach(node))
    }

    /// Toggle the `hidden` attribute.
    pub fn set_hidden(&self, node: NodeId, hidden: bool) {
        self.mutate(|d| {
            if hidden {
                d.set_attribute(node, HIDDEN_ATTR, "");
            } else {
                d.remove_attribute(node, HIDDEN_ATTR);
            }
        })
    }

    pub fn set_inner_html(&self, node: NodeId, markup: &str) -> Vec<NodeId> {
        self.mutate(|d| d.set_inner_html(node, markup))
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        self.read(|d| d.is_connected(node))
    }

    pub fn is_rendered(&self, node: NodeId) -> bool {
        self.read(|d| d.is_rendered(node))
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.read(|d| d.has_class(node, class))
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.read(|d| d.attribute(node, name).map(str::to_string))
    }

    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.read(|d| d.get_element_by_id(id))
    }

    pub fn elements_by_tag(&self, name: &str) -> Vec<NodeId> {
        self.read(|d| d.elements_by_tag(name))
    }

    pub fn text_content(&self, node: NodeId) -> String {
        self.read(|d| d.text_content(node))
    }

    pub fn to_html(&self) -> String {
        self.read(|d| d.to_html())
    }
}

impl Default for HostDocument {
    fn default() -> Self {
        Self::new()
    }
}
