//! Builds a block tree from Markdown text.
//!
//! Block ids are deterministic and positional: headings `h1, h2, ..`, paragraphs
//! `p1, ..`, list items `li1, ..`, tables `t1, ..` with rows `t1r1` and cells
//! `t1r1c1` (each cell holds one paragraph `t1r1c1p1`), inline images `img1, ..`.

use std::collections::BTreeMap;

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

use crate::model::{
    AtomType, BlockNode, Formatting, Inline, InlineWrapper, MarkSet, TextRun, WrapperType,
};

enum OpenKind {
    Paragraph { code: bool },
    Heading(u8),
    ListItem { depth: usize },
    Cell,
}

struct OpenBlock {
    kind: OpenKind,
    inlines: Vec<Inline>,
}

struct TableBuilder {
    id: String,
    rows: Vec<BlockNode>,
    cells: Vec<BlockNode>,
}

/// Handles the state needed to turn pulldown-cmark's flat event stream into
/// nested blocks.
///
/// Nested lists arrive inside their parent item, between the parent's text and
/// the parent's `End(Item)`. The parent item is therefore closed as soon as a
/// nested list starts, and every item becomes its own `ListItem` block with a
/// `depth` attribute.
pub struct MarkdownImporter {
    blocks: Vec<BlockNode>,
    counters: BTreeMap<&'static str, usize>,
    current: Option<OpenBlock>,
    wrappers: Vec<InlineWrapper>,
    bold: usize,
    italic: usize,
    strike: usize,
    list_depth: usize,
    table: Option<TableBuilder>,
    image: Option<String>,
}

impl MarkdownImporter {
    pub fn import(markdown: &str) -> Vec<BlockNode> {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);

        let mut importer = Self {
            blocks: Vec::new(),
            counters: BTreeMap::new(),
            current: None,
            wrappers: Vec::new(),
            bold: 0,
            italic: 0,
            strike: 0,
            list_depth: 0,
            table: None,
            image: None,
        };
        for event in Parser::new_ext(markdown, options) {
            importer.process_event(event);
        }
        importer.close_block();
        importer.blocks
    }

    fn next_id(&mut self, prefix: &'static str) -> String {
        let counter = self.counters.entry(prefix).or_insert(0);
        *counter += 1;
        format!("{prefix}{counter}")
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::Start(Tag::Paragraph) => {
                let in_container = matches!(
                    self.current,
                    Some(OpenBlock {
                        kind: OpenKind::ListItem { .. } | OpenKind::Cell,
                        ..
                    })
                );
                if in_container {
                    // loose list items separate their paragraphs with a break
                    if let Some(open) = &mut self.current
                        && !open.inlines.is_empty()
                    {
                        open.inlines.push(Inline::atom(AtomType::LineBreak));
                    }
                } else {
                    self.open_block(OpenKind::Paragraph { code: false });
                }
            }
            Event::End(TagEnd::Paragraph) => {
                if matches!(
                    self.current,
                    Some(OpenBlock {
                        kind: OpenKind::Paragraph { .. },
                        ..
                    })
                ) {
                    self.close_block();
                }
            }
            Event::Start(Tag::Heading { level, .. }) => {
                self.open_block(OpenKind::Heading(level as u8));
            }
            Event::End(TagEnd::Heading(_)) => self.close_block(),
            Event::Start(Tag::CodeBlock(_)) => {
                self.open_block(OpenKind::Paragraph { code: true });
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(Inline::Text(run)) =
                    self.current.as_mut().and_then(|open| open.inlines.last_mut())
                {
                    let trimmed = run.text.trim_end_matches('\n').len();
                    run.text.truncate(trimmed);
                }
                self.close_block();
            }
            Event::Start(Tag::List(_)) => {
                self.close_block();
                self.list_depth += 1;
            }
            Event::End(TagEnd::List(_)) => {
                self.close_block();
                self.list_depth = self.list_depth.saturating_sub(1);
            }
            Event::Start(Tag::Item) => {
                let depth = self.list_depth.saturating_sub(1);
                self.open_block(OpenKind::ListItem { depth });
            }
            Event::End(TagEnd::Item) => self.close_block(),
            Event::Start(Tag::Table(_)) => {
                self.close_block();
                let id = self.next_id("t");
                self.table = Some(TableBuilder {
                    id,
                    rows: Vec::new(),
                    cells: Vec::new(),
                });
            }
            Event::End(TagEnd::TableHead) | Event::End(TagEnd::TableRow) => self.finish_row(),
            Event::Start(Tag::TableCell) => self.open_block(OpenKind::Cell),
            Event::End(TagEnd::TableCell) => self.close_block(),
            Event::End(TagEnd::Table) => {
                if let Some(table) = self.table.take() {
                    self.blocks.push(BlockNode::table(table.id, table.rows));
                }
            }
            Event::Start(Tag::Strong) => self.bold += 1,
            Event::End(TagEnd::Strong) => self.bold = self.bold.saturating_sub(1),
            Event::Start(Tag::Emphasis) => self.italic += 1,
            Event::End(TagEnd::Emphasis) => self.italic = self.italic.saturating_sub(1),
            Event::Start(Tag::Strikethrough) => self.strike += 1,
            Event::End(TagEnd::Strikethrough) => self.strike = self.strike.saturating_sub(1),
            Event::Start(Tag::Link { dest_url, .. }) => {
                let mut attrs = BTreeMap::new();
                attrs.insert("href".to_string(), dest_url.to_string());
                self.wrappers.push(InlineWrapper {
                    wrapper_type: WrapperType::Link,
                    id: None,
                    attrs,
                    children: Vec::new(),
                });
            }
            Event::End(TagEnd::Link) => {
                if let Some(wrapper) = self.wrappers.pop() {
                    self.push_inline(Inline::Wrapper(wrapper));
                }
            }
            Event::Start(Tag::Image { dest_url, .. }) => {
                self.image = Some(dest_url.to_string());
            }
            Event::End(TagEnd::Image) => {
                if let Some(src) = self.image.take() {
                    let id = self.next_id("img");
                    self.push_inline(Inline::image(id, src));
                }
            }
            Event::Text(text) | Event::Code(text) => {
                if self.image.is_none() {
                    self.push_text(&text);
                }
            }
            Event::SoftBreak => self.push_text(" "),
            Event::HardBreak => self.push_inline(Inline::atom(AtomType::LineBreak)),
            _ => {}
        }
    }

    fn open_block(&mut self, kind: OpenKind) {
        self.close_block();
        self.current = Some(OpenBlock {
            kind,
            inlines: Vec::new(),
        });
    }

    fn close_block(&mut self) {
        while let Some(wrapper) = self.wrappers.pop() {
            self.push_inline(Inline::Wrapper(wrapper));
        }
        let Some(open) = self.current.take() else {
            return;
        };

        let block = match open.kind {
            OpenKind::Paragraph { code } => {
                let block = BlockNode::paragraph(self.next_id("p"), open.inlines);
                if code {
                    block.with_attr("code", "true")
                } else {
                    block
                }
            }
            OpenKind::Heading(level) => BlockNode::heading(self.next_id("h"), level, open.inlines),
            OpenKind::ListItem { depth } => {
                BlockNode::list_item(self.next_id("li"), open.inlines)
                    .with_attr("depth", depth.to_string())
            }
            OpenKind::Cell => {
                let Some(table) = &mut self.table else {
                    return;
                };
                let row = table.rows.len() + 1;
                let column = table.cells.len() + 1;
                let cell_id = format!("{}r{}c{}", table.id, row, column);
                let paragraph = BlockNode::paragraph(format!("{cell_id}p1"), open.inlines);
                table.cells.push(BlockNode::table_cell(cell_id, vec![paragraph]));
                return;
            }
        };
        self.blocks.push(block);
    }

    fn finish_row(&mut self) {
        self.close_block();
        if let Some(table) = &mut self.table {
            let row_id = format!("{}r{}", table.id, table.rows.len() + 1);
            let cells = std::mem::take(&mut table.cells);
            table.rows.push(BlockNode::table_row(row_id, cells));
        }
    }

    fn marks(&self) -> MarkSet {
        MarkSet::with_formatting(Formatting {
            bold: self.bold > 0,
            italic: self.italic > 0,
            strike: self.strike > 0,
            ..Formatting::default()
        })
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let marks = self.marks();
        let target = self.inline_target();
        if let Some(Inline::Text(previous)) = target.last_mut()
            && previous.marks == marks
        {
            previous.text.push_str(text);
            return;
        }
        target.push(Inline::Text(TextRun {
            text: text.to_string(),
            marks,
        }));
    }

    fn push_inline(&mut self, inline: Inline) {
        self.inline_target().push(inline);
    }

    fn inline_target(&mut self) -> &mut Vec<Inline> {
        if let Some(wrapper) = self.wrappers.last_mut() {
            return &mut wrapper.children;
        }
        let open = self.current.get_or_insert_with(|| OpenBlock {
            kind: OpenKind::Paragraph { code: false },
            inlines: Vec::new(),
        });
        &mut open.inlines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BlockType, NodeType};
    use pretty_assertions::assert_eq;

    fn ids(blocks: &[BlockNode]) -> Vec<(&str, NodeType)> {
        blocks.iter().map(|b| (b.id.as_str(), b.node_type())).collect()
    }

    #[test]
    fn test_headings_paragraphs_and_lists_get_positional_ids() {
        let blocks = MarkdownImporter::import(
            "# Title\n\nFirst paragraph.\n\n- one\n- two\n  - nested\n\nClosing words.\n",
        );

        assert_eq!(
            ids(&blocks),
            vec![
                ("h1", NodeType::Heading),
                ("p1", NodeType::Paragraph),
                ("li1", NodeType::ListItem),
                ("li2", NodeType::ListItem),
                ("li3", NodeType::ListItem),
                ("p2", NodeType::Paragraph),
            ]
        );
        assert_eq!(blocks[0].heading_level(), Some(1));
        assert_eq!(blocks[4].flattened_text(), "nested");
        assert_eq!(blocks[4].attrs.get("depth").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_inline_formatting_links_and_images() {
        let blocks = MarkdownImporter::import(
            "Some **bold** and *soft*\ntext with [a link](https://example.com) ![cat](cat.png)",
        );

        assert_eq!(blocks.len(), 1);
        assert_eq!(
            blocks[0].flattened_text(),
            "Some bold and soft text with a link \u{FFFC}"
        );
        let inlines = blocks[0].inlines();
        assert!(matches!(&inlines[1], Inline::Text(run) if run.marks.formatting.bold));
        assert!(
            inlines
                .iter()
                .any(|inline| inline.node_type() == Some(NodeType::Link))
        );
        assert!(
            inlines
                .iter()
                .any(|inline| matches!(inline, Inline::Atom(atom) if atom.id.as_deref() == Some("img1")))
        );
    }

    #[test]
    fn test_tables_nest_rows_cells_and_paragraphs() {
        let blocks = MarkdownImporter::import("| a | b |\n|---|---|\n| c | d |\n");

        assert_eq!(blocks.len(), 1);
        let table = &blocks[0];
        assert_eq!(table.block_type, BlockType::Table);
        assert_eq!(table.id, "t1");
        assert_eq!(table.children().len(), 2);
        let second_row = &table.children()[1];
        assert_eq!(second_row.id, "t1r2");
        assert_eq!(second_row.children()[1].id, "t1r2c2");
        assert_eq!(second_row.children()[1].children()[0].id, "t1r2c2p1");
        assert_eq!(table.flattened_text(), "a\nb\nc\nd");
    }

    #[test]
    fn test_hard_breaks_become_line_break_atoms() {
        let blocks = MarkdownImporter::import("line one  \nline two");
        assert_eq!(blocks[0].flattened_text(), "line one\nline two");
    }

    #[test]
    fn test_code_blocks_are_marked_paragraphs() {
        let blocks = MarkdownImporter::import("```\nlet x = 1;\n```\n");
        assert_eq!(blocks[0].flattened_text(), "let x = 1;");
        assert_eq!(blocks[0].attrs.get("code").map(String::as_str), Some("true"));
    }
}
