// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Declarative element descriptions.
//!
//! An [`Element`] describes what one tree position should look like: its
//! [`ElementType`], an optional key, and a shared [`Props`] record. Elements
//! are cheap to clone. Props are compared by `Rc` identity during
//! reconciliation: handing the work loop the same `Rc<Props>` again is how a
//! caller says "nothing changed here".

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::any::Any;
use core::cell::RefCell;
use core::fmt;

use crate::context::ContextId;
use crate::fiber::WorkTag;
use crate::hooks::RenderScope;

/// A type-erased shared value (context values, hook state).
pub type AnyValue = Rc<dyn Any>;

/// Render function of a context consumer.
pub type ConsumerRender = Rc<dyn Fn(&AnyValue) -> Element>;

/// Custom props comparison for memo components. Returns `true` if equal.
pub type PropsCompare = Rc<dyn Fn(&Props, &Props) -> bool>;

/// A single attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    /// A string.
    Str(Rc<str>),
    /// An integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A boolean.
    Bool(bool),
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// One changed attribute. `value: None` means the attribute was removed.
#[derive(Clone, Debug, PartialEq)]
pub struct AttrChange {
    /// Attribute name.
    pub name: Rc<str>,
    /// New value, or `None` if removed.
    pub value: Option<PropValue>,
}

/// The input of one element.
#[derive(Clone, Default)]
pub struct Props {
    /// Ordered attributes.
    pub attrs: BTreeMap<Rc<str>, PropValue>,
    /// Child elements. Compared by identity.
    pub children: Rc<Vec<Element>>,
    /// Text content of a text element.
    pub text: Option<Rc<str>>,
    /// The value a context provider supplies.
    pub value: Option<AnyValue>,
    /// The render function of a context consumer.
    pub render: Option<ConsumerRender>,
    /// Bits a context consumer observes. `None` observes every bit.
    pub observed_bits: Option<u32>,
}

impl Props {
    /// Creates empty props.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute.
    #[must_use]
    pub fn attr(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Replaces the children.
    #[must_use]
    pub fn children(mut self, children: Vec<Element>) -> Self {
        self.children = Rc::new(children);
        self
    }

    /// Returns an attribute value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.attrs.get(name)
    }

    /// Compares two props field by field, with identity for shared fields.
    ///
    /// Attributes and text are compared by value; children, provider value
    /// and consumer render function by pointer.
    #[must_use]
    pub fn shallow_equal(&self, other: &Self) -> bool {
        self.attrs == other.attrs
            && Rc::ptr_eq(&self.children, &other.children)
            && self.text == other.text
            && opt_ptr_eq(&self.value, &other.value)
            && opt_ptr_eq(&self.render, &other.render)
            && self.observed_bits == other.observed_bits
    }

    /// Lists attribute changes from `self` to `next`, in name order.
    #[must_use]
    pub fn diff_attrs(&self, next: &Self) -> Vec<AttrChange> {
        let mut changes = Vec::new();
        for (name, old) in &self.attrs {
            match next.attrs.get(name) {
                None => changes.push(AttrChange {
                    name: name.clone(),
                    value: None,
                }),
                Some(new) if new != old => changes.push(AttrChange {
                    name: name.clone(),
                    value: Some(new.clone()),
                }),
                Some(_) => {}
            }
        }
        for (name, new) in &next.attrs {
            if !self.attrs.contains_key(name) {
                changes.push(AttrChange {
                    name: name.clone(),
                    value: Some(new.clone()),
                });
            }
        }
        changes.sort_by(|a, b| a.name.cmp(&b.name));
        changes
    }
}

fn opt_ptr_eq<T: ?Sized>(a: &Option<Rc<T>>, b: &Option<Rc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.attrs)
            .field("children", &self.children.len())
            .field("text", &self.text)
            .field("value", &self.value.is_some())
            .field("render", &self.render.is_some())
            .field("observed_bits", &self.observed_bits)
            .finish()
    }
}

/// A named function component.
///
/// Two components are the same type only if they share the same render
/// function allocation; clone a `Component` to reuse its identity.
#[derive(Clone)]
pub struct Component {
    name: &'static str,
    render: Rc<dyn Fn(&mut RenderScope<'_>, &Props) -> Element>,
}

impl Component {
    /// Creates a component from a render function.
    pub fn new(
        name: &'static str,
        render: impl Fn(&mut RenderScope<'_>, &Props) -> Element + 'static,
    ) -> Self {
        Self {
            name,
            render: Rc::new(render),
        }
    }

    /// The component's name, used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns `true` if both handles name the same component.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.render, &other.render)
    }

    pub(crate) fn render(&self, scope: &mut RenderScope<'_>, props: &Props) -> Element {
        (self.render)(scope, props)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

/// What kind of thing an element describes.
#[derive(Clone)]
pub enum ElementType {
    /// A host node such as `div`.
    Host(Rc<str>),
    /// A host text node. Content lives in [`Props::text`].
    Text,
    /// A grouping with no host node of its own.
    Fragment,
    /// A function component.
    Function(Component),
    /// A function component that skips rendering when its props are equal.
    Memo {
        /// The wrapped component.
        component: Component,
        /// Custom equality; [`Props::shallow_equal`] if `None`.
        compare: Option<PropsCompare>,
    },
    /// Supplies a context value to its subtree.
    Provider(ContextId),
    /// Reads a context value and renders through [`Props::render`].
    Consumer(ContextId),
}

impl ElementType {
    /// Returns `true` if a fiber of type `self` can be reused for `other`.
    #[must_use]
    pub fn same_type(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Host(a), Self::Host(b)) => a == b,
            (Self::Text, Self::Text) | (Self::Fragment, Self::Fragment) => true,
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Memo { component: a, .. }, Self::Memo { component: b, .. }) => a.ptr_eq(b),
            (Self::Provider(a), Self::Provider(b)) | (Self::Consumer(a), Self::Consumer(b)) => {
                a == b
            }
            _ => false,
        }
    }

    /// The host type name, for host elements.
    #[must_use]
    pub fn host_type(&self) -> Option<&str> {
        match self {
            Self::Host(name) => Some(name),
            _ => None,
        }
    }

    /// The work tag a freshly created fiber of this type starts with.
    pub(crate) fn initial_tag(&self) -> WorkTag {
        match self {
            Self::Host(_) => WorkTag::HostComponent,
            Self::Text => WorkTag::HostText,
            Self::Fragment => WorkTag::Fragment,
            Self::Function(_) => WorkTag::IndeterminateComponent,
            Self::Memo { .. } => WorkTag::MemoComponent,
            Self::Provider(_) => WorkTag::ContextProvider,
            Self::Consumer(_) => WorkTag::ContextConsumer,
        }
    }
}

impl fmt::Debug for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(name) => write!(f, "Host({name})"),
            Self::Text => f.write_str("Text"),
            Self::Fragment => f.write_str("Fragment"),
            Self::Function(c) => write!(f, "Function({})", c.name()),
            Self::Memo { component, .. } => write!(f, "Memo({})", component.name()),
            Self::Provider(id) => write!(f, "Provider({id:?})"),
            Self::Consumer(id) => write!(f, "Consumer({id:?})"),
        }
    }
}

/// A handle the host instance is attached to after commit.
#[derive(Clone, Default)]
pub struct RefHandle(Rc<RefCell<Option<Box<dyn Any>>>>);

impl RefHandle {
    /// Creates an empty ref.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while an instance is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.0.borrow().is_some()
    }

    /// Returns a clone of the attached instance if it has type `T`.
    #[must_use]
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.0.borrow().as_ref()?.downcast_ref::<T>().cloned()
    }

    /// Returns `true` if both handles share one slot.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn attach(&self, instance: Box<dyn Any>) {
        *self.0.borrow_mut() = Some(instance);
    }

    pub(crate) fn detach(&self) {
        *self.0.borrow_mut() = None;
    }
}

impl fmt::Debug for RefHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RefHandle")
            .field(&self.is_attached())
            .finish()
    }
}

pub(crate) fn ref_eq(a: Option<&RefHandle>, b: Option<&RefHandle>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.ptr_eq(b),
        _ => false,
    }
}

/// A description of one tree position.
#[derive(Clone, Debug)]
pub struct Element {
    /// What this element is.
    pub ty: ElementType,
    /// Stable identity among siblings.
    pub key: Option<Rc<str>>,
    /// Shared input.
    pub props: Rc<Props>,
    /// Ref to attach the host instance to.
    pub ref_handle: Option<RefHandle>,
}

impl Element {
    /// Creates an element of any type.
    #[must_use]
    pub fn new(ty: ElementType, props: Props) -> Self {
        Self {
            ty,
            key: None,
            props: Rc::new(props),
            ref_handle: None,
        }
    }

    /// A host element such as `div`.
    #[must_use]
    pub fn host(ty: &str, props: Props) -> Self {
        Self::new(ElementType::Host(ty.into()), props)
    }

    /// A text node.
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self::new(
            ElementType::Text,
            Props {
                text: Some(text.into()),
                ..Props::default()
            },
        )
    }

    /// A fragment wrapping `children`.
    #[must_use]
    pub fn fragment(children: Vec<Self>) -> Self {
        Self::new(ElementType::Fragment, Props::new().children(children))
    }

    /// A function component element.
    #[must_use]
    pub fn component(component: &Component, props: Props) -> Self {
        Self::new(ElementType::Function(component.clone()), props)
    }

    /// A memo component compared with [`Props::shallow_equal`].
    #[must_use]
    pub fn memo(component: &Component, props: Props) -> Self {
        Self::new(
            ElementType::Memo {
                component: component.clone(),
                compare: None,
            },
            props,
        )
    }

    /// A memo component with a custom props comparison.
    #[must_use]
    pub fn memo_with(
        component: &Component,
        compare: impl Fn(&Props, &Props) -> bool + 'static,
        props: Props,
    ) -> Self {
        Self::new(
            ElementType::Memo {
                component: component.clone(),
                compare: Some(Rc::new(compare)),
            },
            props,
        )
    }

    /// Sets the key.
    #[must_use]
    pub fn with_key(mut self, key: &str) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the ref.
    #[must_use]
    pub fn with_ref(mut self, handle: &RefHandle) -> Self {
        self.ref_handle = Some(handle.clone());
        self
    }

    /// Returns `true` if `other` is this exact element: same type, key and
    /// props allocation.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.ty.same_type(&other.ty)
            && self.key == other.key
            && Rc::ptr_eq(&self.props, &other.props)
    }
}

/// The sibling list an element renders as. Unkeyed fragments at the top of
/// a render result are unwrapped to their children.
pub(crate) fn child_list(element: &Element) -> &[Element] {
    match element.ty {
        ElementType::Fragment if element.key.is_none() => element.props.children.as_slice(),
        _ => core::slice::from_ref(element),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn host_types_compare_by_name() {
        let a = ElementType::Host("div".into());
        let b = ElementType::Host("div".into());
        let c = ElementType::Host("span".into());
        assert!(a.same_type(&b));
        assert!(!a.same_type(&c));
        assert!(!a.same_type(&ElementType::Text));
    }

    #[test]
    fn components_compare_by_identity() {
        let a = Component::new("A", |_, _| Element::text("a"));
        let also_a = a.clone();
        let lookalike = Component::new("A", |_, _| Element::text("a"));
        assert!(ElementType::Function(a.clone()).same_type(&ElementType::Function(also_a)));
        assert!(!ElementType::Function(a).same_type(&ElementType::Function(lookalike)));
    }

    #[test]
    fn shallow_equal_compares_attrs_by_value_and_children_by_identity() {
        let children = Rc::new(vec![Element::text("x")]);
        let a = Props {
            children: children.clone(),
            ..Props::new().attr("id", "a")
        };
        let b = Props {
            children,
            ..Props::new().attr("id", "a")
        };
        assert!(a.shallow_equal(&b));
        let c = Props::new()
            .attr("id", "a")
            .children(vec![Element::text("x")]);
        assert!(!a.shallow_equal(&c), "fresh children list is a change");
    }

    #[test]
    fn diff_attrs_reports_changes_additions_and_removals() {
        let old = Props::new().attr("a", 1).attr("b", "x").attr("c", true);
        let new = Props::new().attr("a", 1).attr("b", "y").attr("d", 2.5);
        let diff = old.diff_attrs(&new);
        assert_eq!(
            diff,
            vec![
                AttrChange {
                    name: "b".into(),
                    value: Some("y".into()),
                },
                AttrChange {
                    name: "c".into(),
                    value: None,
                },
                AttrChange {
                    name: "d".into(),
                    value: Some(PropValue::Float(2.5)),
                },
            ]
        );
        assert!(old.diff_attrs(&old.clone()).is_empty());
    }

    #[test]
    fn unkeyed_fragment_unwraps() {
        let frag = Element::fragment(vec![Element::text("a"), Element::text("b")]);
        assert_eq!(child_list(&frag).len(), 2);
        let keyed = frag.clone().with_key("k");
        assert_eq!(child_list(&keyed).len(), 1);
        assert_eq!(child_list(&Element::text("c")).len(), 1);
    }

    #[test]
    fn ref_handle_attach_detach() {
        let r = RefHandle::new();
        assert!(!r.is_attached());
        r.attach(Box::new(42_u32));
        assert_eq!(r.get::<u32>(), Some(42));
        assert_eq!(r.get::<i8>(), None);
        r.detach();
        assert!(!r.is_attached());
    }
}
