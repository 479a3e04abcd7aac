//! Read-only navigation over a [`Chunk`].

use crate::ast::{Chunk, NodeId, NodeKind};

/// How an assignment (or namespace resolution) addresses its target.
#[derive(Clone, Debug, PartialEq)]
pub enum AssignTarget {
    /// Plain identifier, binds in the enclosing scope.
    Variable { name: String },
    /// Member access or index with a constant string, writes a named
    /// property on the base.
    Property { base: NodeId, name: String },
    /// Computed index, writes through the key type of the index.
    Index { base: NodeId, index: NodeId },
    /// The target cannot carry a binding (literal, invalid code, ...).
    Unsupported,
}

impl Chunk {
    /// Last relevant item on `line`, ignoring comments. Used to detect a
    /// definition a trailing doc comment belongs to.
    pub fn last_item_of_line(&self, line: u32) -> Option<NodeId> {
        let items = self.lines.get(&line)?;
        items
            .iter()
            .rev()
            .find(|id| !matches!(self.node(**id).kind, NodeKind::Comment(_)))
            .copied()
    }

    /// Innermost item covering `character` on `line`. Entry point for
    /// position based queries such as hover.
    pub fn item_at(&self, line: u32, character: u32) -> Option<NodeId> {
        let items = self.lines.get(&line)?;
        items
            .iter()
            .filter(|id| {
                let span = self.node(**id).span;
                let after_start = span.start.line < line
                    || (span.start.line == line && span.start.character <= character);
                let before_end = span.end.line > line
                    || (span.end.line == line && character < span.end.character);
                after_start && before_end
            })
            .min_by_key(|id| {
                let span = self.node(**id).span;
                (
                    span.end.line - span.start.line,
                    span.end.character.saturating_sub(span.start.character),
                )
            })
            .copied()
    }

    /// First comment on `line`, if any.
    pub fn comment_of_line(&self, line: u32) -> Option<NodeId> {
        let items = self.lines.get(&line)?;
        items
            .iter()
            .find(|id| matches!(self.node(**id).kind, NodeKind::Comment(_)))
            .copied()
    }

    /// Consecutive comment lines directly above `line`, top to bottom,
    /// joined into the raw comment text.
    pub fn comment_block_above(&self, line: u32) -> Option<String> {
        let mut collected: Vec<&str> = Vec::new();
        let mut current = line;
        while current > 1 {
            current -= 1;
            let Some(comment) = self.comment_of_line(current) else {
                break;
            };
            match &self.node(comment).kind {
                NodeKind::Comment(text) => collected.push(text),
                _ => break,
            }
        }
        if collected.is_empty() {
            return None;
        }
        collected.reverse();
        Some(collected.join("\n"))
    }

    /// Classify how `target` addresses its binding site.
    pub fn assignment_target(&self, target: NodeId) -> AssignTarget {
        match &self.node(target).kind {
            NodeKind::Identifier(name) => AssignTarget::Variable { name: name.clone() },
            NodeKind::Member { base, identifier } => match &self.node(*identifier).kind {
                NodeKind::Identifier(name) => AssignTarget::Property {
                    base: *base,
                    name: name.clone(),
                },
                _ => AssignTarget::Unsupported,
            },
            NodeKind::Index { base, index } => match &self.node(*index).kind {
                NodeKind::StringLiteral(name) => AssignTarget::Property {
                    base: *base,
                    name: name.clone(),
                },
                _ => AssignTarget::Index {
                    base: *base,
                    index: *index,
                },
            },
            _ => AssignTarget::Unsupported,
        }
    }

    /// Name of an identifier node, when it is one.
    pub fn identifier_name(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Identifier(name) => Some(name.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AstBuilder;

    #[test]
    fn comment_blocks_join_consecutive_lines_above() {
        let mut b = AstBuilder::new();
        b.comment("// first");
        b.comment("// second");
        let target = b.ident("x");
        let value = b.number(1.0);
        b.assign(target, value);
        let chunk = b.build();

        assert_eq!(
            chunk.comment_block_above(3).as_deref(),
            Some("// first\n// second")
        );
    }

    #[test]
    fn a_blank_line_ends_the_comment_block() {
        let mut b = AstBuilder::new();
        b.comment("// detached");
        b.newline();
        b.comment("// attached");
        let target = b.ident("x");
        let value = b.number(1.0);
        b.assign(target, value);
        let chunk = b.build();

        assert_eq!(chunk.comment_block_above(4).as_deref(), Some("// attached"));
    }

    #[test]
    fn string_literal_indexes_classify_as_property_writes() {
        let mut b = AstBuilder::new();
        let base = b.ident("obj");
        let key = b.string("field");
        let target = b.index(base, key);
        let value = b.number(1.0);
        b.assign(target, value);
        let chunk = b.build();

        assert_eq!(
            chunk.assignment_target(target),
            AssignTarget::Property {
                base,
                name: "field".to_string()
            }
        );
    }

    #[test]
    fn computed_indexes_stay_index_writes() {
        let mut b = AstBuilder::new();
        let base = b.ident("obj");
        let key = b.number(3.0);
        let target = b.index(base, key);
        let value = b.number(1.0);
        b.assign(target, value);
        let chunk = b.build();

        assert_eq!(
            chunk.assignment_target(target),
            AssignTarget::Index { base, index: key }
        );
    }

    #[test]
    fn item_at_picks_the_innermost_covering_node() {
        let mut b = AstBuilder::new();
        let target = b.ident("x");
        let value = b.number(1.0);
        b.assign(target, value);
        let chunk = b.build();

        let target_span = chunk.node(target).span;
        assert_eq!(chunk.item_at(1, target_span.start.character), Some(target));
        let value_span = chunk.node(value).span;
        assert_eq!(chunk.item_at(1, value_span.start.character), Some(value));
        assert_eq!(chunk.item_at(1, 99), None);
    }

    #[test]
    fn last_item_of_line_skips_trailing_comments() {
        let mut b = AstBuilder::new();
        let target = b.ident("x");
        let value = b.number(1.0);
        let assignment = b.assign(target, value);
        let chunk = b.build();

        assert_eq!(chunk.last_item_of_line(1), Some(assignment));
    }
}
