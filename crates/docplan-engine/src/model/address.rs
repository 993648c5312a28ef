use serde::{Deserialize, Serialize};

/// A point inside a block's flattened text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub block_id: String,
    pub offset: usize,
}

/// Half-open range in flattened-text coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn collapsed(at: usize) -> Self {
        Self { start: at, end: at }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }

    /// True when the two ranges share at least one character.
    pub fn overlaps(&self, other: &TextRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }

    /// True when `at` lies strictly between the range's ends.
    pub fn strictly_contains(&self, at: usize) -> bool {
        self.start < at && at < self.end
    }
}

/// The canonical name for a text span. Never crosses a block boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextAddress {
    pub block_id: String,
    pub range: TextRange,
}

impl TextAddress {
    pub fn new(block_id: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            block_id: block_id.into(),
            range: TextRange::new(start, end),
        }
    }
}

/// Node types exposed through addresses and selectors.
///
/// `Image` and `Sdt` exist both as blocks and as inline nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Paragraph,
    Heading,
    ListItem,
    Table,
    TableRow,
    TableCell,
    Image,
    Sdt,
    Link,
    Bookmark,
    Tab,
    LineBreak,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Paragraph => "paragraph",
            NodeType::Heading => "heading",
            NodeType::ListItem => "listItem",
            NodeType::Table => "table",
            NodeType::TableRow => "tableRow",
            NodeType::TableCell => "tableCell",
            NodeType::Image => "image",
            NodeType::Sdt => "sdt",
            NodeType::Link => "link",
            NodeType::Bookmark => "bookmark",
            NodeType::Tab => "tab",
            NodeType::LineBreak => "lineBreak",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Block,
    Inline,
}

/// Start and end of an inline node, in its block's flattened text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InlineAnchor {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeAddress {
    #[serde(rename_all = "camelCase")]
    Block { node_type: NodeType, node_id: String },
    #[serde(rename_all = "camelCase")]
    Inline {
        node_type: NodeType,
        anchor: InlineAnchor,
    },
}

impl NodeAddress {
    pub fn block(node_type: NodeType, node_id: impl Into<String>) -> Self {
        NodeAddress::Block {
            node_type,
            node_id: node_id.into(),
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self {
            NodeAddress::Block { node_type, .. } | NodeAddress::Inline { node_type, .. } => {
                *node_type
            }
        }
    }

    /// The block that owns this address: the node itself for blocks, the
    /// anchoring block for inline nodes.
    pub fn block_id(&self) -> &str {
        match self {
            NodeAddress::Block { node_id, .. } => node_id,
            NodeAddress::Inline { anchor, .. } => &anchor.start.block_id,
        }
    }
}

/// Position-independent name for comments and tracked changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "entityType", rename_all = "camelCase")]
pub enum EntityAddress {
    #[serde(rename_all = "camelCase")]
    Comment { entity_id: String },
    #[serde(rename_all = "camelCase")]
    TrackedChange { entity_id: String },
}

impl EntityAddress {
    pub fn tracked_change(id: impl Into<String>) -> Self {
        EntityAddress::TrackedChange {
            entity_id: id.into(),
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            EntityAddress::Comment { entity_id } | EntityAddress::TrackedChange { entity_id } => {
                entity_id
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_text_address_wire_shape() {
        let address = TextAddress::new("p1", 6, 11);
        let value = serde_json::to_value(&address).unwrap();

        assert_eq!(
            value,
            json!({ "blockId": "p1", "range": { "start": 6, "end": 11 } })
        );
    }

    #[test]
    fn test_node_address_is_tagged_by_kind() {
        let block: NodeAddress = serde_json::from_value(json!({
            "kind": "block", "nodeType": "listItem", "nodeId": "li2"
        }))
        .unwrap();
        assert_eq!(block, NodeAddress::block(NodeType::ListItem, "li2"));
        assert_eq!(block.block_id(), "li2");

        let inline: NodeAddress = serde_json::from_value(json!({
            "kind": "inline",
            "nodeType": "link",
            "anchor": {
                "start": { "blockId": "p1", "offset": 2 },
                "end": { "blockId": "p1", "offset": 6 }
            }
        }))
        .unwrap();
        assert_eq!(inline.node_type(), NodeType::Link);
        assert_eq!(inline.block_id(), "p1");
    }

    #[test]
    fn test_negative_offsets_are_rejected_by_deserialization() {
        let result: Result<TextRange, _> = serde_json::from_value(json!({ "start": -1, "end": 2 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_range_overlap_rules() {
        let a = TextRange::new(2, 5);
        assert!(a.overlaps(&TextRange::new(4, 8)));
        assert!(!a.overlaps(&TextRange::new(5, 8)));
        assert!(!a.overlaps(&TextRange::collapsed(3)));
        assert!(a.strictly_contains(3));
        assert!(!a.strictly_contains(2));
    }
}
