//! Programmatic [`Chunk`] construction.
//!
//! Stands in for a parser front end in tooling and tests. Spans are
//! synthesized: every node gets a fresh column range on the current
//! line, statements advance the line.

use rill_common::{Position, Span};
use rustc_hash::FxHashMap;

use crate::ast::{Ast, BinaryOp, Chunk, MapField, Node, NodeId, NodeKind, UnaryOp};

#[derive(Debug)]
pub struct AstBuilder {
    ast: Ast,
    root: NodeId,
    scopes: Vec<NodeId>,
    lines: FxHashMap<u32, Vec<NodeId>>,
    comments: Vec<NodeId>,
    block_stack: Vec<NodeId>,
    line: u32,
    column: u32,
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AstBuilder {
    pub fn new() -> Self {
        let mut ast = Ast::default();
        let root = ast.alloc(Node {
            kind: NodeKind::Chunk {
                definitions: Vec::new(),
            },
            span: Span::on_line(1, 0, 0),
            scope: None,
        });
        Self {
            ast,
            root,
            scopes: Vec::new(),
            lines: FxHashMap::default(),
            comments: Vec::new(),
            block_stack: vec![root],
            line: 1,
            column: 0,
        }
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let start = self.column;
        self.column += 2;
        let scope = self.block_stack.last().copied();
        let id = self.ast.alloc(Node {
            kind,
            span: Span::new(
                Position::new(self.line, start),
                Position::new(self.line, self.column),
            ),
            scope,
        });
        self.lines.entry(self.line).or_default().push(id);
        id
    }

    pub fn newline(&mut self) {
        self.line += 1;
        self.column = 0;
    }

    // ── Expressions ─────────────────────────────────────────────────────

    pub fn ident(&mut self, name: &str) -> NodeId {
        self.alloc(NodeKind::Identifier(name.to_string()))
    }

    pub fn string(&mut self, value: &str) -> NodeId {
        self.alloc(NodeKind::StringLiteral(value.to_string()))
    }

    pub fn number(&mut self, value: f64) -> NodeId {
        self.alloc(NodeKind::NumberLiteral(value))
    }

    pub fn boolean(&mut self, value: bool) -> NodeId {
        self.alloc(NodeKind::BooleanLiteral(value))
    }

    pub fn nil(&mut self) -> NodeId {
        self.alloc(NodeKind::NilLiteral)
    }

    pub fn invalid(&mut self) -> NodeId {
        self.alloc(NodeKind::InvalidCode)
    }

    pub fn unary(&mut self, op: UnaryOp, argument: NodeId) -> NodeId {
        self.alloc(NodeKind::Unary { op, argument })
    }

    /// `@value`
    pub fn reference(&mut self, argument: NodeId) -> NodeId {
        self.unary(UnaryOp::Reference, argument)
    }

    /// `new value`
    pub fn new_instance(&mut self, argument: NodeId) -> NodeId {
        self.unary(UnaryOp::New, argument)
    }

    pub fn binary(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> NodeId {
        self.alloc(NodeKind::Binary { op, left, right })
    }

    pub fn logical(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.alloc(NodeKind::Logical { left, right })
    }

    pub fn isa(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.alloc(NodeKind::Isa { left, right })
    }

    pub fn comparison_group(&mut self, operands: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::ComparisonGroup { operands })
    }

    pub fn paren(&mut self, expression: NodeId) -> NodeId {
        self.alloc(NodeKind::Paren { expression })
    }

    pub fn member(&mut self, base: NodeId, name: &str) -> NodeId {
        let identifier = self.ident(name);
        self.alloc(NodeKind::Member { base, identifier })
    }

    pub fn index(&mut self, base: NodeId, index: NodeId) -> NodeId {
        self.alloc(NodeKind::Index { base, index })
    }

    pub fn slice(&mut self, base: NodeId, from: Option<NodeId>, to: Option<NodeId>) -> NodeId {
        self.alloc(NodeKind::Slice { base, from, to })
    }

    pub fn call(&mut self, base: NodeId, arguments: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::Call { base, arguments })
    }

    pub fn map(&mut self, fields: Vec<(NodeId, NodeId)>) -> NodeId {
        let fields = fields
            .into_iter()
            .map(|(key, value)| MapField { key, value })
            .collect();
        self.alloc(NodeKind::MapConstructor { fields })
    }

    pub fn list(&mut self, fields: Vec<NodeId>) -> NodeId {
        self.alloc(NodeKind::ListConstructor { fields })
    }

    // ── Function blocks ─────────────────────────────────────────────────

    /// Opens a function literal. Parameters and statements created until
    /// the matching [`end_function`](Self::end_function) belong to it.
    pub fn begin_function(&mut self) -> NodeId {
        let id = self.alloc(NodeKind::Function {
            parameters: Vec::new(),
            definitions: Vec::new(),
            returns: Vec::new(),
        });
        self.scopes.push(id);
        self.block_stack.push(id);
        self.newline();
        id
    }

    pub fn param(&mut self, name: &str) -> NodeId {
        let id = self.ident(name);
        self.push_parameter(id);
        id
    }

    pub fn param_default(&mut self, name: &str, default: NodeId) -> NodeId {
        let target = self.ident(name);
        let id = self.alloc(NodeKind::Assignment {
            target,
            init: default,
        });
        self.push_parameter(id);
        id
    }

    fn push_parameter(&mut self, id: NodeId) {
        let block = *self
            .block_stack
            .last()
            .filter(|b| **b != self.root)
            .unwrap_or(&self.root);
        if let NodeKind::Function { parameters, .. } = &mut self.ast.node_mut(block).kind {
            parameters.push(id);
        }
    }

    pub fn end_function(&mut self) -> NodeId {
        let id = self.block_stack.pop().unwrap_or(self.root);
        debug_assert_ne!(id, self.root, "end_function without begin_function");
        id
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn push_definition(&mut self, id: NodeId) {
        let block = *self.block_stack.last().unwrap_or(&self.root);
        match &mut self.ast.node_mut(block).kind {
            NodeKind::Chunk { definitions } | NodeKind::Function { definitions, .. } => {
                definitions.push(id);
            }
            _ => {}
        }
        self.newline();
    }

    /// Create `target` before `init` so the statement span starts where
    /// the source line does. Comments attach to that start line.
    pub fn assign(&mut self, target: NodeId, init: NodeId) -> NodeId {
        let span = self.ast.node(target).span.merge(self.ast.node(init).span);
        let scope = self.block_stack.last().copied();
        let id = self.ast.alloc(Node {
            kind: NodeKind::Assignment { target, init },
            span,
            scope,
        });
        self.lines.entry(span.start.line).or_default().push(id);
        self.push_definition(id);
        id
    }

    pub fn for_generic(&mut self, variable: &str, iterator: NodeId) -> NodeId {
        let variable = self.ident(variable);
        let id = self.alloc(NodeKind::ForGeneric { variable, iterator });
        self.push_definition(id);
        id
    }

    pub fn import(&mut self, name: &str, path: &str) -> NodeId {
        let name = self.ident(name);
        let id = self.alloc(NodeKind::Import {
            name,
            path: path.to_string(),
        });
        self.push_definition(id);
        id
    }

    pub fn ret(&mut self, argument: Option<NodeId>) -> NodeId {
        let id = self.alloc(NodeKind::Return { argument });
        let block = *self.block_stack.last().unwrap_or(&self.root);
        if let NodeKind::Function { returns, .. } = &mut self.ast.node_mut(block).kind {
            returns.push(id);
        }
        self.newline();
        id
    }

    pub fn comment(&mut self, text: &str) -> NodeId {
        let id = self.alloc(NodeKind::Comment(text.to_string()));
        self.comments.push(id);
        self.newline();
        id
    }

    pub fn build(self) -> Chunk {
        Chunk {
            ast: self.ast,
            root: self.root,
            scopes: self.scopes,
            lines: self.lines,
            comments: self.comments,
        }
    }
}
