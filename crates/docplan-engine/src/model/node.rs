use std::collections::BTreeMap;
use std::sync::Arc;

use super::{MarkSet, NodeType};

/// Flattened-text stand-in for an image.
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

/// Flattened-text character between sibling blocks.
pub const BLOCK_SEPARATOR: char = '\n';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Paragraph,
    Heading,
    ListItem,
    Table,
    TableRow,
    TableCell,
    Image,
    StructuredBlock,
}

impl BlockType {
    pub fn node_type(self) -> NodeType {
        match self {
            BlockType::Paragraph => NodeType::Paragraph,
            BlockType::Heading => NodeType::Heading,
            BlockType::ListItem => NodeType::ListItem,
            BlockType::Table => NodeType::Table,
            BlockType::TableRow => NodeType::TableRow,
            BlockType::TableCell => NodeType::TableCell,
            BlockType::Image => NodeType::Image,
            BlockType::StructuredBlock => NodeType::Sdt,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockContent {
    /// A textblock: runs, atoms and wrappers.
    Inline(Vec<Inline>),
    /// A container of further blocks.
    Blocks(Vec<BlockNode>),
    /// No content at all (block images).
    Leaf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub id: String,
    pub block_type: BlockType,
    pub attrs: BTreeMap<String, String>,
    pub content: BlockContent,
}

impl BlockNode {
    pub fn new(id: impl Into<String>, block_type: BlockType, content: BlockContent) -> Self {
        Self {
            id: id.into(),
            block_type,
            attrs: BTreeMap::new(),
            content,
        }
    }

    pub fn paragraph(id: impl Into<String>, inlines: Vec<Inline>) -> Self {
        Self::new(id, BlockType::Paragraph, BlockContent::Inline(inlines))
    }

    pub fn heading(id: impl Into<String>, level: u8, inlines: Vec<Inline>) -> Self {
        Self::new(id, BlockType::Heading, BlockContent::Inline(inlines))
            .with_attr("level", level.to_string())
    }

    pub fn list_item(id: impl Into<String>, inlines: Vec<Inline>) -> Self {
        Self::new(id, BlockType::ListItem, BlockContent::Inline(inlines))
    }

    pub fn table(id: impl Into<String>, rows: Vec<BlockNode>) -> Self {
        Self::new(id, BlockType::Table, BlockContent::Blocks(rows))
    }

    pub fn table_row(id: impl Into<String>, cells: Vec<BlockNode>) -> Self {
        Self::new(id, BlockType::TableRow, BlockContent::Blocks(cells))
    }

    pub fn table_cell(id: impl Into<String>, blocks: Vec<BlockNode>) -> Self {
        Self::new(id, BlockType::TableCell, BlockContent::Blocks(blocks))
    }

    pub fn image(id: impl Into<String>, src: impl Into<String>) -> Self {
        Self::new(id, BlockType::Image, BlockContent::Leaf).with_attr("src", src)
    }

    pub fn structured(id: impl Into<String>, blocks: Vec<BlockNode>) -> Self {
        Self::new(id, BlockType::StructuredBlock, BlockContent::Blocks(blocks))
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.block_type.node_type()
    }

    pub fn is_textblock(&self) -> bool {
        matches!(self.content, BlockContent::Inline(_))
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.content, BlockContent::Leaf)
    }

    pub fn heading_level(&self) -> Option<u8> {
        if self.block_type != BlockType::Heading {
            return None;
        }
        self.attrs.get("level").and_then(|level| level.parse().ok())
    }

    pub fn content_size(&self) -> usize {
        match &self.content {
            BlockContent::Inline(children) => children.iter().map(Inline::node_size).sum(),
            BlockContent::Blocks(children) => children.iter().map(BlockNode::node_size).sum(),
            BlockContent::Leaf => 0,
        }
    }

    /// Width in absolute positions, including the open and close tokens.
    pub fn node_size(&self) -> usize {
        match self.content {
            BlockContent::Leaf => 1,
            _ => 2 + self.content_size(),
        }
    }

    pub fn flattened_text(&self) -> String {
        let mut out = String::new();
        self.flatten_into(&mut out);
        out
    }

    pub fn flattened_len(&self) -> usize {
        self.flattened_text().chars().count()
    }

    fn flatten_into(&self, out: &mut String) {
        match &self.content {
            BlockContent::Inline(children) => {
                for child in children {
                    child.flatten_into(out);
                }
            }
            BlockContent::Blocks(children) => {
                for (index, child) in children.iter().enumerate() {
                    if index > 0 {
                        out.push(BLOCK_SEPARATOR);
                    }
                    child.flatten_into(out);
                }
            }
            BlockContent::Leaf => out.push(OBJECT_REPLACEMENT),
        }
    }

    pub fn children(&self) -> &[BlockNode] {
        match &self.content {
            BlockContent::Blocks(children) => children,
            _ => &[],
        }
    }

    pub fn inlines(&self) -> &[Inline] {
        match &self.content {
            BlockContent::Inline(children) => children,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub text: String,
    pub marks: MarkSet,
}

impl TextRun {
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomType {
    Image,
    Tab,
    LineBreak,
}

impl AtomType {
    pub fn node_type(self) -> NodeType {
        match self {
            AtomType::Image => NodeType::Image,
            AtomType::Tab => NodeType::Tab,
            AtomType::LineBreak => NodeType::LineBreak,
        }
    }

    pub fn flattened(self) -> char {
        match self {
            AtomType::Image => OBJECT_REPLACEMENT,
            AtomType::Tab => '\t',
            AtomType::LineBreak => '\n',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineAtom {
    pub atom_type: AtomType,
    pub id: Option<String>,
    pub attrs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperType {
    Link,
    Bookmark,
    StructuredInline,
}

impl WrapperType {
    pub fn node_type(self) -> NodeType {
        match self {
            WrapperType::Link => NodeType::Link,
            WrapperType::Bookmark => NodeType::Bookmark,
            WrapperType::StructuredInline => NodeType::Sdt,
        }
    }
}

/// Inline element whose children count toward the flattened text but whose
/// own open and close tokens do not.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineWrapper {
    pub wrapper_type: WrapperType,
    pub id: Option<String>,
    pub attrs: BTreeMap<String, String>,
    pub children: Vec<Inline>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inline {
    Text(TextRun),
    Atom(InlineAtom),
    Wrapper(InlineWrapper),
}

impl Inline {
    pub fn text(text: impl Into<String>) -> Self {
        Inline::styled(text, MarkSet::default())
    }

    pub fn styled(text: impl Into<String>, marks: MarkSet) -> Self {
        Inline::Text(TextRun {
            text: text.into(),
            marks,
        })
    }

    pub fn atom(atom_type: AtomType) -> Self {
        Inline::Atom(InlineAtom {
            atom_type,
            id: None,
            attrs: BTreeMap::new(),
        })
    }

    pub fn image(id: impl Into<String>, src: impl Into<String>) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert("src".to_string(), src.into());
        Inline::Atom(InlineAtom {
            atom_type: AtomType::Image,
            id: Some(id.into()),
            attrs,
        })
    }

    pub fn wrapper(wrapper_type: WrapperType, children: Vec<Inline>) -> Self {
        Inline::Wrapper(InlineWrapper {
            wrapper_type,
            id: None,
            attrs: BTreeMap::new(),
            children,
        })
    }

    pub fn link(href: impl Into<String>, children: Vec<Inline>) -> Self {
        let mut attrs = BTreeMap::new();
        attrs.insert("href".to_string(), href.into());
        Inline::Wrapper(InlineWrapper {
            wrapper_type: WrapperType::Link,
            id: None,
            attrs,
            children,
        })
    }

    pub fn node_type(&self) -> Option<NodeType> {
        match self {
            Inline::Text(_) => None,
            Inline::Atom(atom) => Some(atom.atom_type.node_type()),
            Inline::Wrapper(wrapper) => Some(wrapper.wrapper_type.node_type()),
        }
    }

    pub fn node_size(&self) -> usize {
        match self {
            Inline::Text(run) => run.len(),
            Inline::Atom(_) => 1,
            Inline::Wrapper(wrapper) => 2 + wrapper.children.iter().map(Inline::node_size).sum::<usize>(),
        }
    }

    pub fn flatten_into(&self, out: &mut String) {
        match self {
            Inline::Text(run) => out.push_str(&run.text),
            Inline::Atom(atom) => out.push(atom.atom_type.flattened()),
            Inline::Wrapper(wrapper) => {
                for child in &wrapper.children {
                    child.flatten_into(out);
                }
            }
        }
    }
}

/// An immutable view of the document at one generation.
///
/// Cloning is cheap; two snapshots with the same generation share the same blocks.
#[derive(Debug, Clone)]
pub struct Snapshot {
    generation: u64,
    blocks: Arc<Vec<BlockNode>>,
}

impl Snapshot {
    pub fn new(generation: u64, blocks: Arc<Vec<BlockNode>>) -> Self {
        Self { generation, blocks }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn blocks(&self) -> &[BlockNode] {
        &self.blocks
    }

    pub fn shares_content_with(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.blocks, &other.blocks)
    }

    pub fn content_size(&self) -> usize {
        self.blocks.iter().map(BlockNode::node_size).sum()
    }

    /// Visit every block in document order with its absolute position.
    pub fn walk_blocks<'a>(&'a self, mut visit: impl FnMut(&'a BlockNode, usize, &[usize])) {
        fn walk<'a>(
            blocks: &'a [BlockNode],
            start: usize,
            path: &mut Vec<usize>,
            visit: &mut impl FnMut(&'a BlockNode, usize, &[usize]),
        ) {
            let mut pos = start;
            for (index, block) in blocks.iter().enumerate() {
                path.push(index);
                visit(block, pos, path.as_slice());
                if let BlockContent::Blocks(children) = &block.content {
                    walk(children, pos + 1, path, visit);
                }
                path.pop();
                pos += block.node_size();
            }
        }

        let mut path = Vec::new();
        walk(&self.blocks, 0, &mut path, &mut visit);
    }

    /// Follow a child-index path from the root.
    pub fn block_at_path(&self, path: &[usize]) -> Option<&BlockNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.blocks.get(*first)?;
        for index in rest {
            node = node.children().get(*index)?;
        }
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Formatting, MarkSet};
    use pretty_assertions::assert_eq;

    fn sample_table() -> BlockNode {
        BlockNode::table(
            "t1",
            vec![BlockNode::table_row(
                "t1r1",
                vec![
                    BlockNode::table_cell(
                        "t1c1",
                        vec![BlockNode::paragraph("t1c1p1", vec![Inline::text("ab")])],
                    ),
                    BlockNode::table_cell(
                        "t1c2",
                        vec![BlockNode::paragraph("t1c2p1", vec![Inline::text("cd")])],
                    ),
                ],
            )],
        )
    }

    #[test]
    fn test_inline_sizes_count_wrapper_tokens() {
        let link = Inline::link("https://example.com", vec![Inline::text("docs")]);
        assert_eq!(link.node_size(), 6);
        assert_eq!(Inline::atom(AtomType::Tab).node_size(), 1);
        assert_eq!(Inline::text("héllo").node_size(), 5);
    }

    #[test]
    fn test_paragraph_flattening_hides_wrappers() {
        let block = BlockNode::paragraph(
            "p1",
            vec![
                Inline::styled("Bold", MarkSet::with_formatting(Formatting::bold())),
                Inline::atom(AtomType::Tab),
                Inline::link("#", vec![Inline::text("link")]),
                Inline::image("img1", "cat.png"),
                Inline::atom(AtomType::LineBreak),
            ],
        );

        assert_eq!(block.flattened_text(), "Bold\tlink\u{FFFC}\n");
        assert_eq!(block.node_size(), 2 + 4 + 1 + 6 + 1 + 1);
    }

    #[test]
    fn test_container_flattening_separates_children() {
        let table = sample_table();
        assert_eq!(table.flattened_text(), "ab\ncd");
        // table(2) + row(2) + 2 * cell(2 + paragraph(2 + 2))
        assert_eq!(table.node_size(), 16);
    }

    #[test]
    fn test_walk_blocks_reports_positions_and_paths() {
        let snapshot = Snapshot::new(
            1,
            Arc::new(vec![
                BlockNode::paragraph("p1", vec![Inline::text("Hi")]),
                sample_table(),
            ]),
        );

        let mut seen = Vec::new();
        snapshot.walk_blocks(|block, pos, path| seen.push((block.id.clone(), pos, path.to_vec())));

        assert_eq!(
            seen,
            vec![
                ("p1".to_string(), 0, vec![0]),
                ("t1".to_string(), 4, vec![1]),
                ("t1r1".to_string(), 5, vec![1, 0]),
                ("t1c1".to_string(), 6, vec![1, 0, 0]),
                ("t1c1p1".to_string(), 7, vec![1, 0, 0, 0]),
                ("t1c2".to_string(), 12, vec![1, 0, 1]),
                ("t1c2p1".to_string(), 13, vec![1, 0, 1, 0]),
            ]
        );
        assert_eq!(
            snapshot.block_at_path(&[1, 0, 1, 0]).map(|b| b.id.as_str()),
            Some("t1c2p1")
        );
        assert!(snapshot.block_at_path(&[2]).is_none());
    }

    #[test]
    fn test_heading_level_attribute() {
        let heading = BlockNode::heading("h1", 2, vec![Inline::text("Intro")]);
        assert_eq!(heading.heading_level(), Some(2));
        assert_eq!(BlockNode::paragraph("p1", vec![]).heading_level(), None);
    }
}
