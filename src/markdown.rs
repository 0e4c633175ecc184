//! Structural markdown parser.
//!
//! Builds a header/text/table tree from markdown source, one line at a time.
//! Nodes live in an arena ([`MarkdownTree::nodes`]) and refer to each other by
//! index. A `tail` index tracks the most recently opened node, which is where
//! the next line tries to attach first.
//!
//! Only `#`, `##` and `###` headers are structural. Deeper headers are plain
//! text.

/// Index of the root node in every tree.
const ROOT: usize = 0;

/// Separator between captions in a breadcrumb.
pub const BREADCRUMB_SEPARATOR: &str = " => ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    H1,
    H2,
    H3,
    Text,
    Table,
}

use NodeKind::*;

impl NodeKind {
    /// The kinds of node this kind may take as a child. A leaf listed in its
    /// own set merges into itself instead of nesting.
    const fn accepts(self) -> &'static [NodeKind] {
        match self {
            Root => &[H1, H2, H3, Text, Table],
            H1 => &[H2, H3, Text, Table],
            H2 => &[H3, Text, Table],
            H3 => &[Text, Table],
            Text => &[Text],
            Table => &[Table],
        }
    }

    fn can_accept(self, child: NodeKind) -> bool {
        self.accepts().contains(&child)
    }

    pub fn is_leaf(self) -> bool {
        matches!(self, Text | Table)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Header caption; empty for the root and for leaves.
    pub caption: String,
    /// Lines of a Text or Table leaf.
    pub lines: Vec<String>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl Node {
    fn new(kind: NodeKind, caption: String, parent: Option<usize>) -> Self {
        Self {
            kind,
            caption,
            lines: Vec::new(),
            parent,
            children: Vec::new(),
        }
    }
}

/// A Text or Table leaf in document order, with its header path.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub kind: NodeKind,
    pub breadcrumb: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkdownTree {
    pub nodes: Vec<Node>,
    tail: usize,
}

impl Default for MarkdownTree {
    fn default() -> Self {
        Self {
            nodes: vec![Node::new(Root, String::new(), None)],
            tail: ROOT,
        }
    }
}

/// Classifies one line: returns its kind and its content (the caption for
/// headers, the stripped line otherwise).
fn classify(line: &str) -> (NodeKind, &str) {
    let line = line.trim();
    if let Some(caption) = line.strip_prefix("# ") {
        (H1, caption.trim())
    } else if let Some(caption) = line.strip_prefix("## ") {
        (H2, caption.trim())
    } else if let Some(caption) = line.strip_prefix("### ") {
        (H3, caption.trim())
    } else if line.starts_with('|') && line.ends_with('|') {
        (Table, line)
    } else {
        (Text, line)
    }
}

impl MarkdownTree {
    pub fn parse(source: &str) -> Self {
        let mut tree = Self::default();
        for line in source.lines() {
            tree.add_line(line);
        }
        tree
    }

    pub fn add_line(&mut self, line: &str) {
        let (kind, content) = classify(line);

        // Root accepts every kind, so the climb always terminates.
        let mut at = self.tail;
        while !self.nodes[at].kind.can_accept(kind) {
            at = self.nodes[at].parent.unwrap_or(ROOT);
        }

        if self.nodes[at].kind == kind && kind.is_leaf() {
            self.nodes[at].lines.push(content.to_string());
            return;
        }

        let id = self.nodes.len();
        let node = if kind.is_leaf() {
            let mut leaf = Node::new(kind, String::new(), Some(at));
            leaf.lines.push(content.to_string());
            leaf
        } else {
            Node::new(kind, content.to_string(), Some(at))
        };
        self.nodes.push(node);
        self.nodes[at].children.push(id);
        self.tail = id;
    }

    /// Header captions from the root down to `id`, joined with `" => "`.
    pub fn breadcrumb(&self, id: usize) -> String {
        let mut captions = Vec::new();
        let mut current = Some(id);
        while let Some(i) = current {
            let node = &self.nodes[i];
            if !node.caption.is_empty() {
                captions.push(node.caption.as_str());
            }
            current = node.parent;
        }
        captions.reverse();
        captions.join(BREADCRUMB_SEPARATOR)
    }

    /// Text and Table leaves, depth first, in document order.
    pub fn sections(&self) -> Vec<Section> {
        let mut out = Vec::new();
        let mut stack = vec![ROOT];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id];
            if node.kind.is_leaf() {
                out.push(Section {
                    kind: node.kind,
                    breadcrumb: self.breadcrumb(id),
                    text: node.lines.join("\n"),
                });
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }
}
