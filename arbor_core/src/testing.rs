// Copyright 2026 the Arbor Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! An in-memory host that records every call.

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use thiserror::Error;

use crate::element::{AttrChange, Element, PropValue, Props};
use crate::expiration::ExpirationTime;
use crate::fiber::FiberId;
use crate::host::HostConfig;
use crate::reconciler::Reconciler;
use crate::work_loop::WorkStatus;

/// Container every test tree renders into.
pub(crate) const CONTAINER: u32 = 0;

/// A reconciler with `element` mounted at sync priority.
pub(crate) fn mount(element: Element) -> Reconciler<TestHost> {
    let mut reconciler = Reconciler::new(TestHost::new(), CONTAINER);
    render_sync(&mut reconciler, element);
    reconciler
}

/// Renders `element` at sync priority and commits it.
pub(crate) fn render_sync(reconciler: &mut Reconciler<TestHost>, element: Element) -> WorkStatus {
    reconciler.update_container(Some(element), ExpirationTime::SYNC);
    reconciler.perform_sync_work().unwrap()
}

/// Every live fiber of the committed tree has a reciprocal alternate, if any.
pub(crate) fn assert_alternates_reciprocal(reconciler: &Reconciler<TestHost>) {
    let arena = reconciler.arena();
    for fiber in arena.descendants(reconciler.current_root()) {
        if let Some(alternate) = arena[fiber].alternate {
            assert_eq!(arena[alternate].alternate, Some(fiber), "{fiber} pairs with {alternate}");
        }
    }
}

/// Host context of the test host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Namespace {
    Html,
    Svg,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub(crate) enum TestHostError {
    #[error("refusing to create `{0}`")]
    Refused(String),
    #[error("node {0} is not a child of {1}")]
    NotAChild(u32, String),
    #[error("no placements left for node {0}")]
    PlacementRefused(u32),
}

#[derive(Debug)]
struct Node {
    ty: String,
    namespace: Namespace,
    attrs: BTreeMap<Rc<str>, PropValue>,
    text: Option<String>,
    children: Vec<u32>,
}

/// Nodes are addressed by index; container `n` is a separate child list.
#[derive(Debug, Default)]
pub(crate) struct TestHost {
    nodes: Vec<Node>,
    containers: BTreeMap<u32, Vec<u32>>,
    pub(crate) log: Vec<String>,
    pub(crate) refuse: Option<String>,
    /// Placements allowed before the host starts failing them.
    pub(crate) placements_left: Option<usize>,
}

impl TestHost {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Drains the operation log.
    pub(crate) fn take_log(&mut self) -> Vec<String> {
        core::mem::take(&mut self.log)
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn namespace(&self, node: u32) -> Namespace {
        self.nodes[node as usize].namespace
    }

    /// Serializes the container's attached tree.
    pub(crate) fn render(&self, container: u32) -> String {
        let mut out = String::new();
        for &child in self.containers.get(&container).into_iter().flatten() {
            self.render_node(child, &mut out);
        }
        out
    }

    fn render_node(&self, id: u32, out: &mut String) {
        let node = &self.nodes[id as usize];
        if let Some(text) = &node.text {
            out.push_str(text);
            return;
        }
        out.push('<');
        out.push_str(&node.ty);
        for (name, value) in &node.attrs {
            out.push_str(&format!(" {name}=\"{value}\""));
        }
        out.push('>');
        for &child in &node.children {
            self.render_node(child, out);
        }
        out.push_str(&format!("</{}>", node.ty));
    }

    fn push_node(&mut self, node: Node) -> u32 {
        let id = u32::try_from(self.nodes.len()).unwrap_or(u32::MAX);
        self.nodes.push(node);
        id
    }

    fn spend_placement(&mut self, child: u32) -> Result<(), TestHostError> {
        match &mut self.placements_left {
            Some(0) => Err(TestHostError::PlacementRefused(child)),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn detach(list: &mut Vec<u32>, child: u32) {
        list.retain(|&c| c != child);
    }

    fn insert(list: &mut Vec<u32>, child: u32, before: u32) {
        Self::detach(list, child);
        let at = list.iter().position(|&c| c == before).unwrap_or(list.len());
        list.insert(at, child);
    }
}

impl HostConfig for TestHost {
    type Instance = u32;
    type Container = u32;
    type HostContext = Namespace;
    type UpdatePayload = Vec<AttrChange>;
    type Error = TestHostError;

    fn get_root_host_context(&self, _container: &u32) -> Namespace {
        Namespace::Html
    }

    fn get_child_host_context(&self, parent: &Namespace, ty: &str, _container: &u32) -> Namespace {
        match (parent, ty) {
            (_, "svg") => Namespace::Svg,
            (Namespace::Svg, "foreignObject") => Namespace::Html,
            (ns, _) => *ns,
        }
    }

    fn create_instance(
        &mut self,
        ty: &str,
        props: &Props,
        _container: &u32,
        host_context: &Namespace,
        _fiber: FiberId,
    ) -> Result<u32, TestHostError> {
        if self.refuse.as_deref() == Some(ty) {
            return Err(TestHostError::Refused(ty.to_string()));
        }
        let namespace = if ty == "svg" { Namespace::Svg } else { *host_context };
        let id = self.push_node(Node {
            ty: ty.to_string(),
            namespace,
            attrs: props.attrs.clone(),
            text: None,
            children: Vec::new(),
        });
        self.log.push(format!("create {ty} #{id}"));
        Ok(id)
    }

    fn append_initial_child(&mut self, parent: &u32, child: &u32) -> Result<(), TestHostError> {
        self.nodes[*parent as usize].children.push(*child);
        self.log.push(format!("append_initial #{parent} <- #{child}"));
        Ok(())
    }

    fn finalize_initial_children(
        &mut self,
        _instance: &u32,
        _ty: &str,
        props: &Props,
        _container: &u32,
        _host_context: &Namespace,
    ) -> Result<bool, TestHostError> {
        Ok(props.get("autofocus").is_some())
    }

    fn prepare_update(
        &mut self,
        _instance: &u32,
        _ty: &str,
        old_props: &Props,
        new_props: &Props,
        _container: &u32,
        _host_context: &Namespace,
    ) -> Result<Option<Vec<AttrChange>>, TestHostError> {
        let diff = old_props.diff_attrs(new_props);
        Ok((!diff.is_empty()).then_some(diff))
    }

    fn create_text_instance(
        &mut self,
        text: &str,
        _container: &u32,
        host_context: &Namespace,
        _fiber: FiberId,
    ) -> Result<u32, TestHostError> {
        let id = self.push_node(Node {
            ty: "#text".to_string(),
            namespace: *host_context,
            attrs: BTreeMap::new(),
            text: Some(text.to_string()),
            children: Vec::new(),
        });
        self.log.push(format!("create_text {text:?} #{id}"));
        Ok(id)
    }

    fn append_child(&mut self, parent: &u32, child: &u32) -> Result<(), TestHostError> {
        self.spend_placement(*child)?;
        let list = &mut self.nodes[*parent as usize].children;
        Self::detach(list, *child);
        list.push(*child);
        self.log.push(format!("append #{parent} <- #{child}"));
        Ok(())
    }

    fn append_child_to_container(&mut self, container: &u32, child: &u32) -> Result<(), TestHostError> {
        self.spend_placement(*child)?;
        let list = self.containers.entry(*container).or_default();
        Self::detach(list, *child);
        list.push(*child);
        self.log.push(format!("append container {container} <- #{child}"));
        Ok(())
    }

    fn insert_before(&mut self, parent: &u32, child: &u32, before: &u32) -> Result<(), TestHostError> {
        self.spend_placement(*child)?;
        Self::insert(&mut self.nodes[*parent as usize].children, *child, *before);
        self.log.push(format!("insert #{parent} <- #{child} before #{before}"));
        Ok(())
    }

    fn insert_in_container_before(
        &mut self,
        container: &u32,
        child: &u32,
        before: &u32,
    ) -> Result<(), TestHostError> {
        self.spend_placement(*child)?;
        Self::insert(self.containers.entry(*container).or_default(), *child, *before);
        self.log.push(format!("insert container {container} <- #{child} before #{before}"));
        Ok(())
    }

    fn remove_child(&mut self, parent: &u32, child: &u32) -> Result<(), TestHostError> {
        let list = &mut self.nodes[*parent as usize].children;
        if !list.contains(child) {
            return Err(TestHostError::NotAChild(*child, format!("#{parent}")));
        }
        Self::detach(list, *child);
        self.log.push(format!("remove #{parent} -> #{child}"));
        Ok(())
    }

    fn remove_child_from_container(&mut self, container: &u32, child: &u32) -> Result<(), TestHostError> {
        let list = self.containers.entry(*container).or_default();
        if !list.contains(child) {
            return Err(TestHostError::NotAChild(*child, format!("container {container}")));
        }
        Self::detach(list, *child);
        self.log.push(format!("remove container {container} -> #{child}"));
        Ok(())
    }

    fn commit_update(
        &mut self,
        instance: &u32,
        payload: &Vec<AttrChange>,
        _ty: &str,
        _old_props: &Props,
        _new_props: &Props,
    ) -> Result<(), TestHostError> {
        let attrs = &mut self.nodes[*instance as usize].attrs;
        let mut changes = Vec::new();
        for change in payload {
            match &change.value {
                Some(value) => {
                    attrs.insert(change.name.clone(), value.clone());
                    changes.push(format!("{}={value}", change.name));
                }
                None => {
                    attrs.remove(&change.name);
                    changes.push(format!("-{}", change.name));
                }
            }
        }
        self.log.push(format!("update #{instance} [{}]", changes.join(", ")));
        Ok(())
    }

    fn commit_text_update(&mut self, instance: &u32, old_text: &str, new_text: &str) -> Result<(), TestHostError> {
        self.nodes[*instance as usize].text = Some(new_text.to_string());
        self.log.push(format!("text #{instance} {old_text:?} -> {new_text:?}"));
        Ok(())
    }
}
