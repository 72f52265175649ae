//! MML compiler seam.
//!
//! MML text reaches the pipeline through an external parser and lowering
//! engine. The parser produces a syntax tree; this module owns the tree's
//! JSON serialization (`{ "type": ..., "text": ... }` for leaves carrying
//! their source substring, `{ "type": ..., "children": [...] }` for
//! internal nodes), which is the wire format the lowering engine consumes
//! together with the original source text.

use std::sync::Arc;

use serde_json::Value;

use crate::Result;

/// One node of an MML parse tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseNode {
    /// Grammar node kind (serialized as `type`).
    pub kind: String,
    /// Source substring, for leaf nodes.
    pub text: Option<String>,
    /// Child nodes, for internal nodes.
    pub children: Vec<ParseNode>,
}

impl ParseNode {
    /// Build a leaf node carrying its source substring.
    pub fn leaf(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: Some(text.into()),
            children: Vec::new(),
        }
    }

    /// Build an internal node over its children.
    pub fn internal(kind: impl Into<String>, children: Vec<ParseNode>) -> Self {
        Self {
            kind: kind.into(),
            text: None,
            children,
        }
    }

    /// True if the node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Serialize into the lowering engine's tree JSON.
    ///
    /// Leaves carry `text` (their source substring, empty if unset);
    /// internal nodes carry `children` and no text.
    #[must_use]
    pub fn to_json(&self) -> Value {
        if self.is_leaf() {
            serde_json::json!({
                "type": self.kind,
                "text": self.text.clone().unwrap_or_default(),
            })
        } else {
            let children: Vec<Value> = self.children.iter().map(ParseNode::to_json).collect();
            serde_json::json!({
                "type": self.kind,
                "children": children,
            })
        }
    }
}

/// External MML parser front-end.
pub trait MmlParser: Send + Sync {
    /// Parse MML source into a syntax tree.
    fn parse(&self, source: &str) -> Result<ParseNode>;
}

/// External tree-to-SMF lowering engine.
pub trait MmlLowerer: Send + Sync {
    /// Lower a serialized parse tree (plus the original source, which leaf
    /// substrings refer back to) into SMF bytes.
    fn lower(&self, tree_json: &str, source: &str) -> Result<Vec<u8>>;
}

/// Chains parse → serialize → lower.
pub struct MmlCompiler {
    parser: Arc<dyn MmlParser>,
    lowerer: Arc<dyn MmlLowerer>,
}

impl MmlCompiler {
    /// Create a compiler over a parser and a lowering engine.
    pub fn new(parser: Arc<dyn MmlParser>, lowerer: Arc<dyn MmlLowerer>) -> Self {
        Self { parser, lowerer }
    }

    /// Compile MML source text into SMF bytes.
    pub fn compile(&self, source: &str) -> Result<Vec<u8>> {
        let tree = self.parser.parse(source)?;
        let tree_json = tree.to_json().to_string();
        self.lowerer.lower(&tree_json, source)
    }
}
