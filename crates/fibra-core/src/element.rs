//! Declarative tree descriptions.
//!
//! These are the immutable inputs to reconciliation: a fresh [`Content`] tree
//! is produced every render and compared against the work nodes from the
//! previous one. Anything that is not an element, text, or list converts to
//! [`Content::Empty`] and renders nothing.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::error::RenderError;
use crate::host::{Event, EventHandler};

/// Identity of an element among its siblings.
pub type Key = Rc<str>;

pub type RenderResult = Result<Content, RenderError>;

#[derive(Clone, Default)]
pub enum Content {
    #[default]
    Empty,
    Text(Rc<str>),
    Element(Element),
    List(Vec<Content>),
}

impl Content {
    pub fn text(text: impl Into<Rc<str>>) -> Self {
        Content::Text(text.into())
    }

    pub fn list(items: impl IntoIterator<Item = impl Into<Content>>) -> Self {
        Content::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Empty)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Empty => f.write_str("Empty"),
            Content::Text(text) => write!(f, "{text:?}"),
            Content::Element(element) => element.fmt(f),
            Content::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

impl From<Element> for Content {
    fn from(element: Element) -> Self {
        Content::Element(element)
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.into())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text.into())
    }
}

impl From<Rc<str>> for Content {
    fn from(text: Rc<str>) -> Self {
        Content::Text(text)
    }
}

macro_rules! content_from_integer {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Content {
            fn from(value: $ty) -> Self {
                Content::Text(value.to_string().into())
            }
        })*
    };
}

content_from_integer!(i32, i64, u32, u64, usize);

impl From<f64> for Content {
    fn from(value: f64) -> Self {
        if value.fract() == 0.0 && value.is_finite() {
            Content::Text(format!("{value:.0}").into())
        } else {
            Content::Text(value.to_string().into())
        }
    }
}

impl From<bool> for Content {
    fn from(_: bool) -> Self {
        Content::Empty
    }
}

impl From<()> for Content {
    fn from(_: ()) -> Self {
        Content::Empty
    }
}

impl<T: Into<Content>> From<Option<T>> for Content {
    fn from(value: Option<T>) -> Self {
        value.map_or(Content::Empty, Into::into)
    }
}

impl<T: Into<Content>> From<Vec<T>> for Content {
    fn from(items: Vec<T>) -> Self {
        Content::list(items)
    }
}

impl<T: Into<Content>> FromIterator<T> for Content {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Content::list(iter)
    }
}

/// Inline style entries, applied one by one.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Style(Rc<[(Rc<str>, Rc<str>)]>);

impl Style {
    pub fn new<N, V>(entries: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<Rc<str>>,
        V: Into<Rc<str>>,
    {
        Self(
            entries
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (&**name, &**value))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }
}

#[derive(Clone)]
pub enum PropValue {
    Str(Rc<str>),
    Number(f64),
    Bool(bool),
    Style(Style),
    Handler(EventHandler),
    /// Raw markup that replaces the element's children.
    InnerHtml(Rc<str>),
    /// Arbitrary data passed to components; compared by allocation.
    Any(Rc<dyn Any>),
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Number(a), PropValue::Number(b)) => a == b,
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Style(a), PropValue::Style(b)) => a == b,
            (PropValue::Handler(a), PropValue::Handler(b)) => a == b,
            (PropValue::InnerHtml(a), PropValue::InnerHtml(b)) => a == b,
            (PropValue::Any(a), PropValue::Any(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(value) => write!(f, "{value:?}"),
            PropValue::Number(value) => write!(f, "{value}"),
            PropValue::Bool(value) => write!(f, "{value}"),
            PropValue::Style(style) => style.fmt(f),
            PropValue::Handler(handler) => handler.fmt(f),
            PropValue::InnerHtml(html) => write!(f, "InnerHtml({html:?})"),
            PropValue::Any(_) => f.write_str("Any(..)"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(value.into())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(value.into())
    }
}

impl From<Rc<str>> for PropValue {
    fn from(value: Rc<str>) -> Self {
        PropValue::Str(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Number(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Number(value.into())
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<Style> for PropValue {
    fn from(value: Style) -> Self {
        PropValue::Style(value)
    }
}

impl From<EventHandler> for PropValue {
    fn from(value: EventHandler) -> Self {
        PropValue::Handler(value)
    }
}

/// Attributes plus children of one element.
#[derive(Clone, Default)]
pub struct Props {
    attrs: Vec<(Rc<str>, PropValue)>,
    children: Content,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_children(children: impl Into<Content>) -> Self {
        Self {
            attrs: Vec::new(),
            children: children.into(),
        }
    }

    pub fn children(&self) -> &Content {
        &self.children
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.attrs
            .iter()
            .find(|(key, _)| &**key == name)
            .map(|(_, value)| value)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(PropValue::Str(value)) => Some(value),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.get(name) {
            Some(PropValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(PropValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    /// Typed view of a [`PropValue::Any`] prop.
    pub fn value<T: 'static>(&self, name: &str) -> Option<&T> {
        match self.get(name) {
            Some(PropValue::Any(value)) => value.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.attrs.iter().map(|(key, value)| (&**key, value))
    }

    pub fn set(&mut self, name: impl Into<Rc<str>>, value: impl Into<PropValue>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name, value)),
        }
    }

    pub fn set_children(&mut self, children: impl Into<Content>) {
        self.children = children.into();
    }

    fn push_child(&mut self, child: Content) {
        match &mut self.children {
            Content::Empty => self.children = child,
            Content::List(items) => items.push(child),
            _ => {
                let first = std::mem::take(&mut self.children);
                self.children = Content::List(vec![first, child]);
            }
        }
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.attrs {
            map.entry(key, value);
        }
        if !self.children.is_empty() {
            map.entry(&"children", &self.children);
        }
        map.finish()
    }
}

/// A function component: props in, content out. Identity is the closure
/// allocation, so define each component once and clone the handle.
#[derive(Clone)]
pub struct FunctionComponent {
    name: Rc<str>,
    render: Rc<dyn Fn(&Props) -> RenderResult>,
}

impl FunctionComponent {
    pub fn new(
        name: impl Into<Rc<str>>,
        render: impl Fn(&Props) -> RenderResult + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            render: Rc::new(render),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn render(&self, props: &Props) -> RenderResult {
        (self.render)(props)
    }
}

impl PartialEq for FunctionComponent {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }
}

/// Instance of a class component, kept alive across renders in its work node.
pub trait ClassInstance {
    fn render(&mut self, props: &Props) -> RenderResult;

    /// Called after the instance's host nodes were removed.
    fn will_unmount(&mut self) {}
}

#[derive(Clone)]
pub struct ClassComponent {
    name: Rc<str>,
    construct: Rc<dyn Fn(&Props) -> Box<dyn ClassInstance>>,
}

impl ClassComponent {
    pub fn new(
        name: impl Into<Rc<str>>,
        construct: impl Fn(&Props) -> Box<dyn ClassInstance> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            construct: Rc::new(construct),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn construct(&self, props: &Props) -> Box<dyn ClassInstance> {
        (self.construct)(props)
    }
}

impl PartialEq for ClassComponent {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.construct, &other.construct)
    }
}

#[derive(Clone, PartialEq)]
pub enum ElementKind {
    Host(Rc<str>),
    Function(FunctionComponent),
    Class(ClassComponent),
    Fragment,
}

impl fmt::Debug for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Host(tag) => write!(f, "<{tag}>"),
            ElementKind::Function(component) => write!(f, "<{}>", component.name()),
            ElementKind::Class(component) => write!(f, "<{} class>", component.name()),
            ElementKind::Fragment => f.write_str("<>"),
        }
    }
}

#[derive(Clone)]
pub struct Element {
    pub(crate) kind: ElementKind,
    pub(crate) key: Option<Key>,
    pub(crate) props: Rc<Props>,
}

impl Element {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            key: None,
            props: Rc::new(Props::new()),
        }
    }

    pub fn host(tag: impl Into<Rc<str>>) -> Self {
        Self::new(ElementKind::Host(tag.into()))
    }

    pub fn component(component: &FunctionComponent) -> Self {
        Self::new(ElementKind::Function(component.clone()))
    }

    pub fn class(component: &ClassComponent) -> Self {
        Self::new(ElementKind::Class(component.clone()))
    }

    pub fn fragment(children: impl Into<Content>) -> Self {
        Self::new(ElementKind::Fragment).children(children)
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Self {
        Rc::make_mut(&mut self.props).set(name, value);
        self
    }

    /// Attaches `handler` for `event` (e.g. `"click"`), stored as the
    /// `onClick` prop.
    pub fn on(self, event: &str, handler: impl Fn(&Event) + 'static) -> Self {
        self.attr(event_prop_name(event), EventHandler::new(handler))
    }

    pub fn style<N, V>(self, entries: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<Rc<str>>,
        V: Into<Rc<str>>,
    {
        self.attr("style", Style::new(entries))
    }

    pub fn inner_html(self, html: impl Into<Rc<str>>) -> Self {
        self.attr("dangerouslySetInnerHTML", PropValue::InnerHtml(html.into()))
    }

    /// Appends one child.
    pub fn child(mut self, child: impl Into<Content>) -> Self {
        Rc::make_mut(&mut self.props).push_child(child.into());
        self
    }

    /// Replaces all children.
    pub fn children(mut self, children: impl Into<Content>) -> Self {
        Rc::make_mut(&mut self.props).set_children(children);
        self
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn key_str(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn props(&self) -> &Rc<Props> {
        &self.props
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Element");
        s.field("kind", &self.kind);
        if let Some(key) = &self.key {
            s.field("key", key);
        }
        s.field("props", &self.props).finish()
    }
}

pub(crate) fn event_prop_name(event: &str) -> String {
    let mut chars = event.chars();
    match chars.next() {
        Some(first) => format!("on{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "on".to_owned(),
    }
}

/// Inverse of [`event_prop_name`]: `onClick` → `click`.
pub(crate) fn event_name_from_prop(prop: &str) -> Option<String> {
    let rest = prop.strip_prefix("on")?;
    let mut chars = rest.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    Some(format!("{}{}", first.to_ascii_lowercase(), chars.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_prop_names_round_trip_through_lowercase_event() {
        assert_eq!(event_prop_name("click"), "onClick");
        assert_eq!(event_name_from_prop("onClick").as_deref(), Some("click"));
        assert_eq!(event_name_from_prop("one"), None);
        assert_eq!(event_name_from_prop("className"), None);
    }

    #[test]
    fn child_appends_and_promotes_single_child_to_list() {
        let element = Element::host("ul").child("a").child(Element::host("li"));
        match element.props().children() {
            Content::List(items) => assert_eq!(items.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn non_renderable_values_convert_to_empty() {
        assert!(Content::from(true).is_empty());
        assert!(Content::from(()).is_empty());
        assert!(Content::from(None::<&str>).is_empty());
        assert_eq!(Content::from(3.0).as_text(), Some("3"));
        assert_eq!(Content::from(2.5).as_text(), Some("2.5"));
    }
}
