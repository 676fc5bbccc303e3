//! Applying element props to host nodes.

use std::rc::Rc;

use crate::element::{event_name_from_prop, Content, PropValue, Props};
use crate::error::HostError;
use crate::host::{Host, HostNodeId};
use crate::work_node::PropChange;

const INNER_HTML_PROP: &str = "dangerouslySetInnerHTML";
const INNER_HTML: &str = "innerHTML";

/// Whether an element's children are stored as text content instead of
/// being reconciled into child nodes.
pub(crate) fn should_set_text_content(tag: &str, props: &Props) -> bool {
    tag == "textarea"
        || tag == "noscript"
        || matches!(props.children(), Content::Text(_))
        || matches!(props.get(INNER_HTML_PROP), Some(PropValue::InnerHtml(_)))
}

pub(crate) fn set_initial_properties<H: Host + ?Sized>(
    host: &mut H,
    node: HostNodeId,
    props: &Props,
) -> Result<(), HostError> {
    if let Content::Text(text) = props.children() {
        host.set_text_content(node, text)?;
    }
    for (key, value) in props.iter() {
        update_property(host, node, key, None, Some(value))?;
    }
    Ok(())
}

/// Changes needed to go from `old` to `new`.
pub(crate) fn diff_properties(old: &Props, new: &Props) -> Vec<PropChange> {
    let mut changes = Vec::new();

    if let Content::Text(text) = new.children() {
        if old.children().as_text() != Some(&**text) {
            changes.push(PropChange::Text(Rc::clone(text)));
        }
    }

    for (key, previous) in old.iter() {
        if new.get(key).is_none() {
            changes.push(PropChange::Remove {
                key: key.into(),
                previous: previous.clone(),
            });
        }
    }

    for (key, value) in new.iter() {
        let previous = old.get(key);
        if previous == Some(value) {
            continue;
        }
        changes.push(PropChange::Set {
            key: key.into(),
            value: value.clone(),
            previous: previous.cloned(),
        });
    }
    changes
}

pub(crate) fn commit_update<H: Host + ?Sized>(
    host: &mut H,
    node: HostNodeId,
    changes: &[PropChange],
) -> Result<(), HostError> {
    for change in changes {
        match change {
            PropChange::Text(text) => host.set_text_content(node, text)?,
            PropChange::Set {
                key,
                value,
                previous,
            } => update_property(host, node, key, previous.as_ref(), Some(value))?,
            PropChange::Remove { key, previous } => {
                update_property(host, node, key, Some(previous), None)?
            }
        }
    }
    Ok(())
}

fn update_property<H: Host + ?Sized>(
    host: &mut H,
    node: HostNodeId,
    key: &str,
    previous: Option<&PropValue>,
    next: Option<&PropValue>,
) -> Result<(), HostError> {
    if let Some(event) = event_name_from_prop(key) {
        let attaches = matches!(next, Some(PropValue::Handler(_)));
        if let Some(PropValue::Handler(old)) = previous {
            host.remove_event_listener(node, &event, old)?;
        }
        if let Some(PropValue::Handler(handler)) = next {
            host.add_event_listener(node, &event, handler.clone())?;
        }
        if attaches || matches!(previous, Some(PropValue::Handler(_))) && next.is_none() {
            return Ok(());
        }
    }

    match (previous, next) {
        (previous, Some(PropValue::Style(style))) => {
            if let Some(PropValue::Style(old)) = previous {
                for (name, _) in old.iter() {
                    if style.get(name).is_none() {
                        host.set_style(node, name, None)?;
                    }
                }
                for (name, value) in style.iter() {
                    if old.get(name) != Some(value) {
                        host.set_style(node, name, Some(value))?;
                    }
                }
            } else {
                for (name, value) in style.iter() {
                    host.set_style(node, name, Some(value))?;
                }
            }
            Ok(())
        }
        (Some(PropValue::Style(old)), None) => {
            for (name, _) in old.iter() {
                host.set_style(node, name, None)?;
            }
            Ok(())
        }
        (_, Some(PropValue::InnerHtml(html))) => {
            host.set_property(node, INNER_HTML, &PropValue::Str(Rc::clone(html)))
        }
        (Some(PropValue::InnerHtml(_)), None) => host.remove_property(node, INNER_HTML),
        (_, Some(value)) => host.set_property(node, key, value),
        (_, None) => host.remove_property(node, key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, Style};
    use crate::host::EventHandler;

    fn props_of(element: Element) -> Props {
        (**element.props()).clone()
    }

    #[test]
    fn text_children_and_inner_html_suppress_child_nodes() {
        assert!(should_set_text_content("p", &props_of(Element::host("p").child("hi"))));
        assert!(should_set_text_content(
            "div",
            &props_of(Element::host("div").inner_html("<b>x</b>"))
        ));
        assert!(should_set_text_content("textarea", &Props::new()));
        assert!(!should_set_text_content(
            "ul",
            &props_of(Element::host("ul").child(Element::host("li")))
        ));
    }

    #[test]
    fn diff_reports_removed_changed_and_new_props() {
        let handler = EventHandler::new(|_| {});
        let old = props_of(
            Element::host("a")
                .attr("href", "/a")
                .attr("title", "t")
                .attr("onClick", handler.clone())
                .child("x"),
        );
        let new = props_of(
            Element::host("a")
                .attr("href", "/b")
                .attr("onClick", handler.clone())
                .attr("id", "n")
                .child("y"),
        );
        let changes = diff_properties(&old, &new);
        assert_eq!(
            changes,
            vec![
                PropChange::Text("y".into()),
                PropChange::Remove {
                    key: "title".into(),
                    previous: PropValue::from("t"),
                },
                PropChange::Set {
                    key: "href".into(),
                    value: PropValue::from("/b"),
                    previous: Some(PropValue::from("/a")),
                },
                PropChange::Set {
                    key: "id".into(),
                    value: PropValue::from("n"),
                    previous: None,
                },
            ]
        );
    }

    #[test]
    fn identical_props_diff_to_nothing() {
        let style = Style::new([("color", "red")]);
        let props = props_of(Element::host("p").attr("style", style).child("same"));
        assert!(diff_properties(&props, &props.clone()).is_empty());
    }
}
