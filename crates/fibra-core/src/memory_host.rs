//! In-memory host document.
//!
//! Nodes live in a flat table indexed by [`HostNodeId`]; detached nodes stay
//! in the table. Every mutation the reconciler performs is appended to an
//! operation log so tests can assert on exactly what Commit did.

use std::fmt::Write as _;
use std::rc::Rc;

use crate::element::PropValue;
use crate::error::HostError;
use crate::host::{Event, EventHandler, Host, HostNodeId};

#[derive(Clone, Debug, PartialEq)]
pub enum MemoryNodeKind {
    Document,
    Fragment,
    Element { tag: Rc<str> },
    Text { text: String },
}

#[derive(Debug)]
struct MemoryNode {
    kind: MemoryNodeKind,
    parent: Option<HostNodeId>,
    children: Vec<HostNodeId>,
    properties: Vec<(Rc<str>, PropValue)>,
    styles: Vec<(Rc<str>, Rc<str>)>,
    listeners: Vec<(Rc<str>, EventHandler)>,
}

impl MemoryNode {
    fn new(kind: MemoryNodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            properties: Vec::new(),
            styles: Vec::new(),
            listeners: Vec::new(),
        }
    }
}

/// One recorded host mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum HostOp {
    CreateElement { node: HostNodeId, tag: Rc<str> },
    CreateText { node: HostNodeId, text: String },
    SetProperty { node: HostNodeId, key: Rc<str>, value: PropValue },
    RemoveProperty { node: HostNodeId, key: Rc<str> },
    SetStyle { node: HostNodeId, name: Rc<str>, value: Option<Rc<str>> },
    AddListener { node: HostNodeId, event: Rc<str> },
    RemoveListener { node: HostNodeId, event: Rc<str> },
    AppendChild { parent: HostNodeId, child: HostNodeId },
    InsertBefore { parent: HostNodeId, child: HostNodeId, reference: HostNodeId },
    RemoveChild { parent: HostNodeId, child: HostNodeId },
    SetTextContent { node: HostNodeId, text: String },
}

#[derive(Debug, Default)]
pub struct MemoryHost {
    nodes: Vec<MemoryNode>,
    ops: Vec<HostOp>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, kind: MemoryNodeKind) -> HostNodeId {
        let id = HostNodeId(self.nodes.len());
        self.nodes.push(MemoryNode::new(kind));
        id
    }

    pub fn create_document(&mut self) -> HostNodeId {
        self.alloc(MemoryNodeKind::Document)
    }

    pub fn create_fragment(&mut self) -> HostNodeId {
        self.alloc(MemoryNodeKind::Fragment)
    }

    /// A detached `div` to mount roots into. Not recorded in the log.
    pub fn create_container(&mut self) -> HostNodeId {
        self.alloc(MemoryNodeKind::Element { tag: "div".into() })
    }

    /// Number of nodes ever created, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    fn node(&self, id: HostNodeId) -> Result<&MemoryNode, HostError> {
        self.nodes.get(id.0).ok_or(HostError::Missing { id })
    }

    fn node_mut(&mut self, id: HostNodeId) -> Result<&mut MemoryNode, HostError> {
        self.nodes.get_mut(id.0).ok_or(HostError::Missing { id })
    }

    fn element_mut(&mut self, id: HostNodeId) -> Result<&mut MemoryNode, HostError> {
        let node = self.node_mut(id)?;
        match node.kind {
            MemoryNodeKind::Element { .. } => Ok(node),
            _ => Err(HostError::NotAnElement { id }),
        }
    }

    fn check_container(&self, id: HostNodeId) -> Result<(), HostError> {
        match self.node(id)?.kind {
            MemoryNodeKind::Text { .. } => Err(HostError::NotAContainer { id }),
            _ => Ok(()),
        }
    }

    fn detach(&mut self, child: HostNodeId) {
        let Some(parent) = self.nodes[child.0].parent.take() else {
            return;
        };
        self.nodes[parent.0].children.retain(|&id| id != child);
    }

    pub fn kind(&self, node: HostNodeId) -> Option<&MemoryNodeKind> {
        self.nodes.get(node.0).map(|node| &node.kind)
    }

    pub fn tag(&self, node: HostNodeId) -> Option<&str> {
        match self.kind(node)? {
            MemoryNodeKind::Element { tag } => Some(tag),
            _ => None,
        }
    }

    pub fn parent(&self, node: HostNodeId) -> Option<HostNodeId> {
        self.nodes.get(node.0)?.parent
    }

    pub fn children(&self, node: HostNodeId) -> &[HostNodeId] {
        self.nodes
            .get(node.0)
            .map_or(&[][..], |node| node.children.as_slice())
    }

    pub fn property(&self, node: HostNodeId, key: &str) -> Option<&PropValue> {
        self.nodes
            .get(node.0)?
            .properties
            .iter()
            .find(|(name, _)| &**name == key)
            .map(|(_, value)| value)
    }

    pub fn style(&self, node: HostNodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(node.0)?
            .styles
            .iter()
            .find(|(entry, _)| &**entry == name)
            .map(|(_, value)| &**value)
    }

    pub fn listener_count(&self, node: HostNodeId, event: &str) -> usize {
        self.nodes.get(node.0).map_or(0, |node| {
            node.listeners
                .iter()
                .filter(|(name, _)| &**name == event)
                .count()
        })
    }

    /// Concatenated text of every text node under `node`.
    pub fn text_content(&self, node: HostNodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, id: HostNodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id.0) else {
            return;
        };
        if let MemoryNodeKind::Text { text } = &node.kind {
            out.push_str(text);
        }
        for &child in &node.children {
            self.collect_text(child, out);
        }
    }

    /// Elements under `root` (inclusive) with the given tag, in document
    /// order.
    pub fn find_by_tag(&self, root: HostNodeId, tag: &str) -> Vec<HostNodeId> {
        let mut found = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if self.tag(id) == Some(tag) {
                found.push(id);
            }
            stack.extend(self.children(id).iter().rev());
        }
        found
    }

    /// First element under `root` whose `id` property is `id`.
    pub fn find_by_id(&self, root: HostNodeId, id: &str) -> Option<HostNodeId> {
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if matches!(self.property(node, "id"), Some(PropValue::Str(value)) if &**value == id) {
                return Some(node);
            }
            stack.extend(self.children(node).iter().rev());
        }
        None
    }

    /// Calls the handlers for `name` on `target` and then on each ancestor.
    /// Returns how many handlers ran.
    pub fn dispatch_event(&self, target: HostNodeId, name: &str) -> usize {
        let event = Event {
            name: name.into(),
            target,
        };
        let mut handlers = Vec::new();
        let mut cursor = Some(target);
        while let Some(id) = cursor {
            let Some(node) = self.nodes.get(id.0) else {
                break;
            };
            handlers.extend(
                node.listeners
                    .iter()
                    .filter(|(event, _)| &**event == name)
                    .map(|(_, handler)| handler.clone()),
            );
            cursor = node.parent;
        }
        for handler in &handlers {
            handler.call(&event);
        }
        handlers.len()
    }

    /// Serializes the children of `node` as HTML.
    pub fn inner_html(&self, node: HostNodeId) -> String {
        let mut out = String::new();
        for &child in self.children(node) {
            self.write_html(child, &mut out);
        }
        out
    }

    /// Serializes `node` itself as HTML.
    pub fn to_html(&self, node: HostNodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    fn write_html(&self, id: HostNodeId, out: &mut String) {
        let Some(node) = self.nodes.get(id.0) else {
            return;
        };
        let tag = match &node.kind {
            MemoryNodeKind::Text { text } => {
                escape_into(text, out);
                return;
            }
            MemoryNodeKind::Document | MemoryNodeKind::Fragment => {
                for &child in &node.children {
                    self.write_html(child, out);
                }
                return;
            }
            MemoryNodeKind::Element { tag } => tag,
        };

        out.push('<');
        out.push_str(tag);
        let mut raw_inner = None;
        for (key, value) in &node.properties {
            match value {
                PropValue::Str(value) if &**key == "innerHTML" => raw_inner = Some(value),
                PropValue::Str(value) => {
                    let _ = write!(out, " {key}=\"");
                    escape_into(value, out);
                    out.push('"');
                }
                PropValue::Number(value) => {
                    let _ = write!(out, " {key}=\"{value}\"");
                }
                PropValue::Bool(true) => {
                    let _ = write!(out, " {key}");
                }
                _ => {}
            }
        }
        if !node.styles.is_empty() {
            out.push_str(" style=\"");
            for (index, (name, value)) in node.styles.iter().enumerate() {
                if index > 0 {
                    out.push(' ');
                }
                let _ = write!(out, "{name}: {value};");
            }
            out.push('"');
        }
        out.push('>');
        match raw_inner {
            Some(html) => out.push_str(html),
            None => {
                for &child in &node.children {
                    self.write_html(child, out);
                }
            }
        }
        let _ = write!(out, "</{tag}>");
    }
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

impl Host for MemoryHost {
    fn create_element(&mut self, tag: &str) -> HostNodeId {
        let tag: Rc<str> = tag.into();
        let node = self.alloc(MemoryNodeKind::Element { tag: tag.clone() });
        self.ops.push(HostOp::CreateElement { node, tag });
        node
    }

    fn create_text_node(&mut self, text: &str) -> HostNodeId {
        let node = self.alloc(MemoryNodeKind::Text {
            text: text.to_owned(),
        });
        self.ops.push(HostOp::CreateText {
            node,
            text: text.to_owned(),
        });
        node
    }

    fn set_property(
        &mut self,
        node: HostNodeId,
        key: &str,
        value: &PropValue,
    ) -> Result<(), HostError> {
        let element = self.element_mut(node)?;
        match element.properties.iter_mut().find(|(name, _)| &**name == key) {
            Some((_, slot)) => *slot = value.clone(),
            None => element.properties.push((key.into(), value.clone())),
        }
        self.ops.push(HostOp::SetProperty {
            node,
            key: key.into(),
            value: value.clone(),
        });
        Ok(())
    }

    fn remove_property(&mut self, node: HostNodeId, key: &str) -> Result<(), HostError> {
        self.element_mut(node)?
            .properties
            .retain(|(name, _)| &**name != key);
        self.ops.push(HostOp::RemoveProperty {
            node,
            key: key.into(),
        });
        Ok(())
    }

    fn set_style(
        &mut self,
        node: HostNodeId,
        name: &str,
        value: Option<&str>,
    ) -> Result<(), HostError> {
        let element = self.element_mut(node)?;
        match value {
            Some(value) => match element.styles.iter_mut().find(|(entry, _)| &**entry == name) {
                Some((_, slot)) => *slot = value.into(),
                None => element.styles.push((name.into(), value.into())),
            },
            None => element.styles.retain(|(entry, _)| &**entry != name),
        }
        self.ops.push(HostOp::SetStyle {
            node,
            name: name.into(),
            value: value.map(Into::into),
        });
        Ok(())
    }

    fn add_event_listener(
        &mut self,
        node: HostNodeId,
        event: &str,
        handler: EventHandler,
    ) -> Result<(), HostError> {
        self.element_mut(node)?
            .listeners
            .push((event.into(), handler));
        self.ops.push(HostOp::AddListener {
            node,
            event: event.into(),
        });
        Ok(())
    }

    fn remove_event_listener(
        &mut self,
        node: HostNodeId,
        event: &str,
        handler: &EventHandler,
    ) -> Result<(), HostError> {
        self.element_mut(node)?
            .listeners
            .retain(|(name, attached)| !(&**name == event && attached == handler));
        self.ops.push(HostOp::RemoveListener {
            node,
            event: event.into(),
        });
        Ok(())
    }

    fn append_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        self.check_container(parent)?;
        self.node(child)?;
        self.detach(child);
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
        self.ops.push(HostOp::AppendChild { parent, child });
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: HostNodeId,
        child: HostNodeId,
        reference: HostNodeId,
    ) -> Result<(), HostError> {
        self.check_container(parent)?;
        self.node(child)?;
        if !self.node(parent)?.children.contains(&reference) {
            return Err(HostError::NotAChild {
                parent,
                child: reference,
            });
        }
        if child != reference {
            self.detach(child);
            let children = &mut self.nodes[parent.0].children;
            let index = children
                .iter()
                .position(|&id| id == reference)
                .unwrap_or(children.len());
            children.insert(index, child);
            self.nodes[child.0].parent = Some(parent);
        }
        self.ops.push(HostOp::InsertBefore {
            parent,
            child,
            reference,
        });
        Ok(())
    }

    fn remove_child(&mut self, parent: HostNodeId, child: HostNodeId) -> Result<(), HostError> {
        if self.node(child)?.parent != Some(parent) {
            return Err(HostError::NotAChild { parent, child });
        }
        self.detach(child);
        self.ops.push(HostOp::RemoveChild { parent, child });
        Ok(())
    }

    fn set_text_content(&mut self, node: HostNodeId, text: &str) -> Result<(), HostError> {
        if let MemoryNodeKind::Text { text: current } = &mut self.node_mut(node)?.kind {
            *current = text.to_owned();
        } else {
            for child in std::mem::take(&mut self.nodes[node.0].children) {
                self.nodes[child.0].parent = None;
            }
            if !text.is_empty() {
                let child = self.alloc(MemoryNodeKind::Text {
                    text: text.to_owned(),
                });
                self.nodes[child.0].parent = Some(node);
                self.nodes[node.0].children.push(child);
            }
        }
        self.ops.push(HostOp::SetTextContent {
            node,
            text: text.to_owned(),
        });
        Ok(())
    }

    fn is_container(&self, node: HostNodeId) -> bool {
        self.check_container(node).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Style;
    use std::cell::Cell;

    #[test]
    fn insert_before_moves_an_attached_node() {
        let mut host = MemoryHost::new();
        let root = host.create_container();
        let a = host.create_element("a");
        let b = host.create_element("b");
        let c = host.create_element("c");
        for node in [a, b, c] {
            host.append_child(root, node).unwrap();
        }
        host.insert_before(root, c, a).unwrap();
        assert_eq!(host.children(root), &[c, a, b]);
        assert_eq!(host.parent(c), Some(root));
    }

    #[test]
    fn removing_a_non_child_fails() {
        let mut host = MemoryHost::new();
        let root = host.create_container();
        let stray = host.create_element("p");
        assert_eq!(
            host.remove_child(root, stray),
            Err(HostError::NotAChild {
                parent: root,
                child: stray
            })
        );
    }

    #[test]
    fn text_nodes_cannot_hold_children_or_props() {
        let mut host = MemoryHost::new();
        let text = host.create_text_node("x");
        let p = host.create_element("p");
        assert!(!host.is_container(text));
        assert_eq!(
            host.append_child(text, p),
            Err(HostError::NotAContainer { id: text })
        );
        assert_eq!(
            host.set_property(text, "id", &PropValue::from("n")),
            Err(HostError::NotAnElement { id: text })
        );
    }

    #[test]
    fn set_text_content_replaces_children() {
        let mut host = MemoryHost::new();
        let p = host.create_element("p");
        let b = host.create_element("b");
        host.append_child(p, b).unwrap();
        host.set_text_content(p, "plain").unwrap();
        assert_eq!(host.parent(b), None);
        assert_eq!(host.text_content(p), "plain");
        host.set_text_content(p, "").unwrap();
        assert!(host.children(p).is_empty());
    }

    #[test]
    fn serializes_properties_styles_and_text() {
        let mut host = MemoryHost::new();
        let root = host.create_container();
        let a = host.create_element("a");
        host.set_property(a, "href", &PropValue::from("/x?a&b")).unwrap();
        host.set_property(a, "hidden", &PropValue::from(false)).unwrap();
        for (name, value) in Style::new([("color", "red")]).iter() {
            host.set_style(a, name, Some(value)).unwrap();
        }
        let text = host.create_text_node("1 < 2");
        host.append_child(a, text).unwrap();
        host.append_child(root, a).unwrap();
        assert_eq!(
            host.inner_html(root),
            "<a href=\"/x?a&amp;b\" style=\"color: red;\">1 &lt; 2</a>"
        );
    }

    #[test]
    fn events_bubble_to_ancestors() {
        let mut host = MemoryHost::new();
        let outer = host.create_element("div");
        let inner = host.create_element("button");
        host.append_child(outer, inner).unwrap();

        let hits = Rc::new(Cell::new(0));
        for node in [outer, inner] {
            let hits = hits.clone();
            host.add_event_listener(
                node,
                "click",
                EventHandler::new(move |_| hits.set(hits.get() + 1)),
            )
            .unwrap();
        }
        assert_eq!(host.dispatch_event(inner, "click"), 2);
        assert_eq!(host.dispatch_event(outer, "click"), 1);
        assert_eq!(hits.get(), 3);
        assert_eq!(host.dispatch_event(inner, "keydown"), 0);
    }

    #[test]
    fn removing_a_listener_matches_the_same_handler() {
        let mut host = MemoryHost::new();
        let button = host.create_element("button");
        let first = EventHandler::new(|_| {});
        let second = EventHandler::new(|_| {});
        host.add_event_listener(button, "click", first.clone()).unwrap();
        host.add_event_listener(button, "click", second).unwrap();
        host.remove_event_listener(button, "click", &first).unwrap();
        assert_eq!(host.listener_count(button, "click"), 1);
    }
}
