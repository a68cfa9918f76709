use std::collections::HashMap;

/// Stable identifier for a node of a tree: its index in node order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(pub usize);

impl NodeRef {
    /// The node's topological number.
    pub fn number(self) -> usize {
        self.0
    }
}

/// Read-only view of a rooted tree topology.
///
/// Node numbering is stable for the lifetime of the tree: `node(i).number() == i`.
pub trait Tree: Send + Sync {
    fn node_count(&self) -> usize;
    fn node(&self, index: usize) -> NodeRef;
    fn root(&self) -> NodeRef;
    fn parent(&self, node: NodeRef) -> Option<NodeRef>;
    fn child_count(&self, node: NodeRef) -> usize;
    fn child(&self, node: NodeRef, index: usize) -> NodeRef;
    fn node_height(&self, node: NodeRef) -> f64;
    fn taxon(&self, node: NodeRef) -> Option<&str>;

    fn is_root(&self, node: NodeRef) -> bool {
        self.root() == node
    }

    fn is_external(&self, node: NodeRef) -> bool {
        self.child_count(node) == 0
    }

    fn external_node_count(&self) -> usize {
        (0..self.node_count())
            .filter(|&i| self.is_external(self.node(i)))
            .count()
    }
}

#[derive(Debug, Clone)]
struct TreeNode {
    parent: Option<NodeRef>,
    children: Vec<NodeRef>,
    height: f64,
    taxon: Option<String>,
}

/// A tree assembled node by node; multifurcations are allowed.
///
/// The first node added is the root. Every later node must name an existing
/// parent, so node numbers always follow a pre-order of insertion.
#[derive(Debug, Clone)]
pub struct FlexibleTree {
    nodes: Vec<TreeNode>,
    taxon_to_node: HashMap<String, NodeRef>,
}

impl FlexibleTree {
    pub fn new(root_height: f64) -> Self {
        Self {
            nodes: vec![TreeNode {
                parent: None,
                children: Vec::new(),
                height: root_height,
                taxon: None,
            }],
            taxon_to_node: HashMap::new(),
        }
    }

    fn add_node(&mut self, parent: NodeRef, height: f64, taxon: Option<String>) -> NodeRef {
        let id = NodeRef(self.nodes.len());
        if let Some(ref t) = taxon {
            self.taxon_to_node.insert(t.clone(), id);
        }
        self.nodes[parent.0].children.push(id);
        self.nodes.push(TreeNode {
            parent: Some(parent),
            children: Vec::new(),
            height,
            taxon,
        });
        id
    }

    /// Add an internal node below `parent`.
    pub fn add_internal(&mut self, parent: NodeRef, height: f64) -> NodeRef {
        self.add_node(parent, height, None)
    }

    /// Add a tip carrying a taxon label below `parent`.
    pub fn add_tip(&mut self, parent: NodeRef, height: f64, taxon: &str) -> NodeRef {
        self.add_node(parent, height, Some(taxon.to_string()))
    }

    pub fn node_by_taxon(&self, taxon: &str) -> Option<NodeRef> {
        self.taxon_to_node.get(taxon).copied()
    }

    /// Branch length above `node`; zero for the root.
    pub fn branch_length(&self, node: NodeRef) -> f64 {
        match self.nodes[node.0].parent {
            Some(p) => self.nodes[p.0].height - self.nodes[node.0].height,
            None => 0.0,
        }
    }
}

impl Default for FlexibleTree {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Tree for FlexibleTree {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, index: usize) -> NodeRef {
        NodeRef(index)
    }

    fn root(&self) -> NodeRef {
        NodeRef(0)
    }

    fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.nodes[node.0].parent
    }

    fn child_count(&self, node: NodeRef) -> usize {
        self.nodes[node.0].children.len()
    }

    fn child(&self, node: NodeRef, index: usize) -> NodeRef {
        self.nodes[node.0].children[index]
    }

    fn node_height(&self, node: NodeRef) -> f64 {
        self.nodes[node.0].height
    }

    fn taxon(&self, node: NodeRef) -> Option<&str> {
        self.nodes[node.0].taxon.as_deref()
    }
}
