//! Breadth-first shader graph traversal
//!
//! Walks never recurse on the call stack. Node groups are transparent: a
//! link coming out of a group node continues at the matching input of the
//! group's `GroupOutput`, and a link coming out of a `GroupInput` continues
//! at the matching input of the enclosing group node one scope up.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use tracing::warn;

use texbake_core::{NodeGroup, NodeTree, NodeType, ShaderNode};

/// Nested groups deeper than this are treated as broken references
const MAX_GROUP_DEPTH: usize = 64;

/// A node inside a (possibly nested) group scope. The scope lists the
/// group nodes entered from the material's root tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub scope: Vec<String>,
    pub name: String,
}

impl NodeRef {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            scope: Vec::new(),
            name: name.into(),
        }
    }

    /// Slash-separated path from the root tree, e.g. `Layer/Mix`
    pub fn path(&self) -> String {
        let mut parts = self.scope.clone();
        parts.push(self.name.clone());
        parts.join("/")
    }

    pub fn from_path(path: &str) -> Self {
        let mut parts: Vec<String> = path.split('/').map(str::to_string).collect();
        let name = parts.pop().unwrap_or_default();
        Self { scope: parts, name }
    }

    /// Input socket of this node
    pub fn port(&self, socket: impl Into<String>) -> Port {
        Port {
            scope: self.scope.clone(),
            node: self.name.clone(),
            socket: socket.into(),
        }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// An input socket to resolve
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Port {
    pub scope: Vec<String>,
    pub node: String,
    pub socket: String,
}

/// Visitor decision for a reached node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    /// Continue through every linked input of the node
    Descend,
    /// Continue through one named input only
    Follow(&'static str),
    /// Do not look further upstream of this node
    Stop,
    /// End the whole walk
    Halt,
}

/// A material's root tree together with the node groups it can reach
#[derive(Debug, Clone, Copy)]
pub struct MaterialGraph<'a> {
    root: &'a NodeTree,
    groups: &'a [NodeGroup],
}

impl<'a> MaterialGraph<'a> {
    pub fn new(root: &'a NodeTree, groups: &'a [NodeGroup]) -> Self {
        Self { root, groups }
    }

    pub fn root(&self) -> &'a NodeTree {
        self.root
    }

    pub fn group(&self, name: &str) -> Option<&'a NodeGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Tree of a scope: the root tree, or the group tree behind the last
    /// entered group node
    pub fn tree(&self, scope: &[String]) -> Option<&'a NodeTree> {
        let mut tree = self.root;
        for group_node in scope {
            let node = tree.node(group_node)?;
            let group = node.group.as_deref().and_then(|g| self.group(g))?;
            tree = &group.tree;
        }
        Some(tree)
    }

    pub fn node(&self, node: &NodeRef) -> Option<&'a ShaderNode> {
        self.tree(&node.scope)?.node(&node.name)
    }

    /// Whether anything feeds the given input socket
    pub fn is_linked(&self, port: &Port) -> bool {
        self.tree(&port.scope)
            .map(|t| t.is_linked(&port.node, &port.socket))
            .unwrap_or(false)
    }

    /// The material output node of the root tree
    pub fn output(&self) -> Option<NodeRef> {
        self.root.output_node().map(|n| NodeRef::root(n.name.clone()))
    }

    /// Node groups reachable from the root tree, nested ones included, in
    /// breadth-first discovery order and without duplicates
    pub fn reachable_groups(&self) -> Vec<&'a NodeGroup> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&'a NodeTree> = VecDeque::from([self.root]);

        while let Some(tree) = queue.pop_front() {
            for node in tree.nodes_of_type(&NodeType::Group) {
                let Some(name) = node.group.as_deref() else {
                    continue;
                };
                if !seen.insert(name.to_string()) {
                    continue;
                }
                match self.group(name) {
                    Some(group) => {
                        found.push(group);
                        queue.push_back(&group.tree);
                    }
                    None => warn!(group = name, node = %node.name, "Node group not found"),
                }
            }
        }

        found
    }

    /// Every node of the root tree and of every reachable group
    pub fn all_nodes(&self) -> impl Iterator<Item = &'a ShaderNode> + 'a {
        let groups = self.reachable_groups();
        self.root
            .nodes
            .iter()
            .chain(groups.into_iter().flat_map(|g| g.tree.nodes.iter()))
    }

    /// Breadth-first walk upstream of `start`.
    ///
    /// The visitor sees every non-group node feeding the start socket
    /// (directly or through group boundaries) once, and decides how the walk
    /// continues from it.
    pub fn walk_upstream<F>(&self, start: Port, mut visit: F)
    where
        F: FnMut(&NodeRef, &'a ShaderNode) -> Walk,
    {
        let mut ports = VecDeque::from([start]);
        let mut seen_ports = HashSet::new();
        let mut seen_nodes = HashSet::new();

        while let Some(port) = ports.pop_front() {
            if !seen_ports.insert(port.clone()) {
                continue;
            }
            let Some(tree) = self.tree(&port.scope) else {
                continue;
            };

            for link in tree.links_into(&port.node, &port.socket) {
                let Some(from) = tree.node(&link.from_node) else {
                    warn!(node = %link.from_node, "Link from unknown node ignored");
                    continue;
                };

                match from.node_type {
                    NodeType::Group => {
                        if port.scope.len() >= MAX_GROUP_DEPTH {
                            warn!(node = %from.name, "Node group nesting too deep, not entered");
                            continue;
                        }
                        let mut inner = port.scope.clone();
                        inner.push(from.name.clone());
                        let output = self
                            .tree(&inner)
                            .and_then(|t| t.nodes_of_type(&NodeType::GroupOutput).next());
                        if let Some(output) = output {
                            ports.push_back(Port {
                                scope: inner,
                                node: output.name.clone(),
                                socket: link.from_socket.clone(),
                            });
                        }
                    }
                    NodeType::GroupInput => {
                        if let Some((group_node, parent)) = port.scope.split_last() {
                            ports.push_back(Port {
                                scope: parent.to_vec(),
                                node: group_node.clone(),
                                socket: link.from_socket.clone(),
                            });
                        }
                    }
                    _ => {
                        let node_ref = NodeRef {
                            scope: port.scope.clone(),
                            name: from.name.clone(),
                        };
                        if !seen_nodes.insert(node_ref.clone()) {
                            continue;
                        }
                        match visit(&node_ref, from) {
                            Walk::Descend => {
                                let mut sockets: Vec<&str> = tree
                                    .links_into_node(&from.name)
                                    .map(|l| l.to_socket.as_str())
                                    .collect();
                                sockets.dedup();
                                for socket in sockets {
                                    ports.push_back(node_ref.port(socket));
                                }
                            }
                            Walk::Follow(socket) => ports.push_back(node_ref.port(socket)),
                            Walk::Stop => {}
                            Walk::Halt => return,
                        }
                    }
                }
            }
        }
    }

    /// First node upstream of `start` matching `pred`, descending through
    /// everything
    pub fn find_upstream<P>(&self, start: Port, mut pred: P) -> Option<(NodeRef, &'a ShaderNode)>
    where
        P: FnMut(&ShaderNode) -> bool,
    {
        let mut found = None;
        self.walk_upstream(start, |node_ref, node| {
            if pred(node) {
                found = Some((node_ref.clone(), node));
                Walk::Halt
            } else {
                Walk::Descend
            }
        });
        found
    }
}
