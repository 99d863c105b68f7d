use serde::Serialize;

use crate::types::Diagnostic;

/// Index of a node inside the [`Program`] arena that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NodeId(usize);

/// Where a node came from in the parsed text. Zero-based line numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub line: usize,
    pub end_line: usize, // last line consumed by continuations or a closing `}`
    pub indent: usize,
    pub leading: String,
}

impl SourceInfo {
    pub fn is_single_line(&self) -> bool {
        self.line == self.end_line
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceInfo>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self { kind, source: None }
    }

    pub fn with_source(kind: NodeKind, source: SourceInfo) -> Self {
        Self {
            kind,
            source: Some(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum NodeKind {
    BpmDeclaration {
        identifier: String,
    },
    BankDeclaration {
        name: String,
        alias: Option<String>,
    },
    UseStatement {
        name: String,
        alias: Option<String>,
    },
    LetDeclaration {
        name: String,
        value: Expression,
    },
    On {
        event: String,
        body: Vec<NodeId>,
    },
    Fn {
        name: String,
        params: Vec<String>,
        body: Vec<NodeId>,
    },
    Emit {
        event: String,
        payload: Option<Expression>,
    },
    Print {
        value: Expression,
    },
    If {
        condition: String,
        body: Vec<NodeId>,
        else_ifs: Vec<NodeId>,
        alternate: Option<NodeId>,
    },
    ElseIf {
        condition: String,
        body: Vec<NodeId>,
    },
    Else {
        body: Vec<NodeId>,
    },
    Loop {
        iterator: Expression,
        body: Vec<NodeId>,
    },
    Trigger {
        name: String, // includes the leading dot
        duration: Option<DurationValue>,
        args: Vec<Expression>,
    },
    ImportStatement {
        identifiers: Vec<String>,
        from: String,
    },
    ExportStatement {
        identifiers: Vec<String>,
    },
    LoadSample {
        path: String,
        alias: String,
    },
    Group {
        name: String,
        body: Vec<NodeId>,
    },
    Call {
        identifier: String,
    },
    Spawn {
        identifier: String,
    },
    Sleep {
        value: Expression,
    },
    Pattern {
        name: String,
        instrument: String,
        pattern: String,
    },
    For {
        variable: String,
        iterable: Expression,
        body: Vec<NodeId>,
    },
    Automate {
        target: String,
        body: Vec<NodeId>,
    },
    Param {
        name: String,
        body: Vec<NodeId>,
    },
    Keyframe {
        position: String, // digits before `%`
        separator: KeyframeSeparator,
        value: Expression,
    },
    ArrowCall {
        target: String,
        method: String,
        args: Option<Vec<Expression>>,
        chain: Vec<ArrowSegment>,
    },
    Comment {
        value: String,
    },
    BlankLine,
    Unknown {
        value: String,
    },
}

impl NodeKind {
    /// Children of a block node. `If` exposes its own body only; branches are
    /// separate nodes.
    pub fn body(&self) -> Option<&[NodeId]> {
        match self {
            NodeKind::On { body, .. }
            | NodeKind::Fn { body, .. }
            | NodeKind::If { body, .. }
            | NodeKind::ElseIf { body, .. }
            | NodeKind::Else { body }
            | NodeKind::Loop { body, .. }
            | NodeKind::Group { body, .. }
            | NodeKind::For { body, .. }
            | NodeKind::Automate { body, .. }
            | NodeKind::Param { body, .. } => Some(body),
            _ => None,
        }
    }

    fn body_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            NodeKind::On { body, .. }
            | NodeKind::Fn { body, .. }
            | NodeKind::If { body, .. }
            | NodeKind::ElseIf { body, .. }
            | NodeKind::Else { body }
            | NodeKind::Loop { body, .. }
            | NodeKind::Group { body, .. }
            | NodeKind::For { body, .. }
            | NodeKind::Automate { body, .. }
            | NodeKind::Param { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::BpmDeclaration { .. } => "BpmDeclaration",
            NodeKind::BankDeclaration { .. } => "BankDeclaration",
            NodeKind::UseStatement { .. } => "UseStatement",
            NodeKind::LetDeclaration { .. } => "LetDeclaration",
            NodeKind::On { .. } => "On",
            NodeKind::Fn { .. } => "Fn",
            NodeKind::Emit { .. } => "Emit",
            NodeKind::Print { .. } => "Print",
            NodeKind::If { .. } => "If",
            NodeKind::ElseIf { .. } => "ElseIf",
            NodeKind::Else { .. } => "Else",
            NodeKind::Loop { .. } => "Loop",
            NodeKind::Trigger { .. } => "Trigger",
            NodeKind::ImportStatement { .. } => "ImportStatement",
            NodeKind::ExportStatement { .. } => "ExportStatement",
            NodeKind::LoadSample { .. } => "LoadSample",
            NodeKind::Group { .. } => "Group",
            NodeKind::Call { .. } => "Call",
            NodeKind::Spawn { .. } => "Spawn",
            NodeKind::Sleep { .. } => "Sleep",
            NodeKind::Pattern { .. } => "Pattern",
            NodeKind::For { .. } => "For",
            NodeKind::Automate { .. } => "Automate",
            NodeKind::Param { .. } => "Param",
            NodeKind::Keyframe { .. } => "Keyframe",
            NodeKind::ArrowCall { .. } => "ArrowCall",
            NodeKind::Comment { .. } => "Comment",
            NodeKind::BlankLine => "BlankLine",
            NodeKind::Unknown { .. } => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyframeSeparator {
    Equals, // 50% = 0.5
    Colon,  // 50%: 0.5
}

/// One `-> method(args)` segment. `args` is `None` when written without parens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrowSegment {
    pub method: String,
    pub args: Option<Vec<Expression>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Expression {
    Identifier { name: String },
    NumberLiteral { value: f64, raw: String }, // raw: digits as written
    StringLiteral { value: String },
    BooleanLiteral { value: bool },
    ObjectLiteral { properties: Vec<Property> },
    RawLiteral { value: String },
    SynthReference { name: String },
    ObjectProperty { key: String, value: Box<Expression> },
}

impl Expression {
    pub fn identifier(name: impl Into<String>) -> Self {
        Expression::Identifier { name: name.into() }
    }

    pub fn number(value: f64) -> Self {
        Expression::NumberLiteral {
            value,
            raw: value.to_string(),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expression::StringLiteral {
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub key: String,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DurationValue {
    BeatDuration { value: String },
    Milliseconds { value: f64, raw: String },
    AutoDuration,
}

impl DurationValue {
    pub fn beat(value: impl Into<String>) -> Self {
        DurationValue::BeatDuration {
            value: value.into(),
        }
    }

    pub fn milliseconds(value: f64) -> Self {
        DurationValue::Milliseconds {
            value,
            raw: value.to_string(),
        }
    }
}

/// The text a [`Program`] was parsed from, kept for the printer's
/// reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceText {
    pub text: String,
    pub lines: Vec<String>,
}

impl SourceText {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            lines: text.split('\n').map(str::to_string).collect(),
        }
    }
}

/// Root of a parse: an arena of nodes plus the top-level body.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Program {
    nodes: Vec<Node>,
    pub body: Vec<NodeId>,
    #[serde(skip)]
    source: Option<SourceText>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    diagnostics: Vec<Diagnostic>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_source(source: SourceText) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    /// Allocates a node without attaching it anywhere.
    pub fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Allocates a node and appends it to the top-level body.
    pub fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = self.alloc(Node::new(kind));
        self.body.push(id);
        id
    }

    /// Appends `child` to `parent`'s body, or to the root when `parent` is `None`.
    /// Returns false when `parent` is not a block.
    pub fn append(&mut self, parent: Option<NodeId>, child: NodeId) -> bool {
        match parent {
            None => {
                self.body.push(child);
                true
            }
            Some(parent) => match self.nodes[parent.0].kind.body_mut() {
                Some(body) => {
                    body.push(child);
                    true
                }
                None => false,
            },
        }
    }

    /// Allocates `kind` and appends it under `parent`.
    pub fn push_child(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.alloc(Node::new(kind));
        self.append(Some(parent), id);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.kind(id).body().unwrap_or(&[])
    }

    /// All nodes in allocation order, including `ElseIf`/`Else` branches.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub fn source(&self) -> Option<&SourceText> {
        self.source.as_ref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}
