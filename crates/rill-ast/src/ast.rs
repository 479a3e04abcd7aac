//! Node arena and the node kind catalogue.

use rill_common::Span;
use rustc_hash::FxHashMap;

/// Index of a node inside its owning [`Ast`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    /// The `@` operator. Yields the function itself instead of calling it.
    Reference,
    New,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Equal,
    NotEqual,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl BinaryOp {
    /// Comparison operators always produce a number, independent of the
    /// operand types.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEq
                | BinaryOp::Greater
                | BinaryOp::GreaterEq
        )
    }
}

/// `key: value` pair inside a map constructor.
#[derive(Clone, Debug)]
pub struct MapField {
    pub key: NodeId,
    pub value: NodeId,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Identifier(String),
    StringLiteral(String),
    NumberLiteral(f64),
    BooleanLiteral(bool),
    NilLiteral,
    /// Region the parser could not make sense of. Evaluates to nothing.
    InvalidCode,
    Comment(String),
    Unary {
        op: UnaryOp,
        argument: NodeId,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Logical {
        left: NodeId,
        right: NodeId,
    },
    Isa {
        left: NodeId,
        right: NodeId,
    },
    /// Chained comparison such as `1 < x < 10`.
    ComparisonGroup {
        operands: Vec<NodeId>,
    },
    Paren {
        expression: NodeId,
    },
    Member {
        base: NodeId,
        identifier: NodeId,
    },
    Index {
        base: NodeId,
        index: NodeId,
    },
    Slice {
        base: NodeId,
        from: Option<NodeId>,
        to: Option<NodeId>,
    },
    Call {
        base: NodeId,
        arguments: Vec<NodeId>,
    },
    MapConstructor {
        fields: Vec<MapField>,
    },
    ListConstructor {
        fields: Vec<NodeId>,
    },
    /// Function literal. Doubles as a block: the statements nested under
    /// it register themselves into `definitions`/`returns`.
    Function {
        parameters: Vec<NodeId>,
        definitions: Vec<NodeId>,
        returns: Vec<NodeId>,
    },
    /// Root block of a document.
    Chunk {
        definitions: Vec<NodeId>,
    },
    Assignment {
        target: NodeId,
        init: NodeId,
    },
    ForGeneric {
        variable: NodeId,
        iterator: NodeId,
    },
    Import {
        name: NodeId,
        path: String,
    },
    Return {
        argument: Option<NodeId>,
    },
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    /// Enclosing block (a `Function` node, or the root `Chunk`). `None`
    /// only for the root itself.
    pub scope: Option<NodeId>,
}

/// Arena of nodes for one document.
#[derive(Clone, Debug, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Label the analyzer uses when minting span qualified identifiers.
    pub fn kind_label(&self, id: NodeId) -> &'static str {
        match self.node(id).kind {
            NodeKind::Identifier(_) => "Identifier",
            NodeKind::StringLiteral(_) => "StringLiteral",
            NodeKind::NumberLiteral(_) => "NumberLiteral",
            NodeKind::BooleanLiteral(_) => "BooleanLiteral",
            NodeKind::NilLiteral => "NilLiteral",
            NodeKind::InvalidCode => "InvalidCode",
            NodeKind::Comment(_) => "Comment",
            NodeKind::Unary { .. } => "UnaryExpression",
            NodeKind::Binary { .. } => "BinaryExpression",
            NodeKind::Logical { .. } => "LogicalExpression",
            NodeKind::Isa { .. } => "IsaExpression",
            NodeKind::ComparisonGroup { .. } => "ComparisonGroup",
            NodeKind::Paren { .. } => "ParenExpression",
            NodeKind::Member { .. } => "MemberExpression",
            NodeKind::Index { .. } => "IndexExpression",
            NodeKind::Slice { .. } => "SliceExpression",
            NodeKind::Call { .. } => "CallExpression",
            NodeKind::MapConstructor { .. } => "MapConstructor",
            NodeKind::ListConstructor { .. } => "ListConstructor",
            NodeKind::Function { .. } => "FunctionDeclaration",
            NodeKind::Chunk { .. } => "Chunk",
            NodeKind::Assignment { .. } => "AssignmentStatement",
            NodeKind::ForGeneric { .. } => "ForGenericStatement",
            NodeKind::Import { .. } => "ImportStatement",
            NodeKind::Return { .. } => "ReturnStatement",
        }
    }
}

/// Everything the parser hands the analyzer for one document.
#[derive(Clone, Debug)]
pub struct Chunk {
    pub ast: Ast,
    pub root: NodeId,
    /// Function blocks in document order. The root chunk is not listed.
    pub scopes: Vec<NodeId>,
    /// Items per line, used for comment and namespace lookups.
    pub lines: FxHashMap<u32, Vec<NodeId>>,
    pub comments: Vec<NodeId>,
}

impl Chunk {
    pub fn node(&self, id: NodeId) -> &Node {
        self.ast.node(id)
    }

    pub fn definitions_of(&self, block: NodeId) -> &[NodeId] {
        match &self.ast.node(block).kind {
            NodeKind::Chunk { definitions } | NodeKind::Function { definitions, .. } => definitions,
            _ => &[],
        }
    }

    pub fn returns_of(&self, block: NodeId) -> &[NodeId] {
        match &self.ast.node(block).kind {
            NodeKind::Function { returns, .. } => returns,
            _ => &[],
        }
    }

    pub fn parameters_of(&self, block: NodeId) -> &[NodeId] {
        match &self.ast.node(block).kind {
            NodeKind::Function { parameters, .. } => parameters,
            _ => &[],
        }
    }
}
