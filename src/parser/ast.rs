//! AST definitions
//!
//! The tree is stored in an arena ([`Ast`]): nodes refer to each other by
//! [`NodeId`], which is also how the engine's frames remember what they are
//! evaluating. Each node exposes its ordered [`children`](NodeKind::children)
//! and a [`tag`](NodeKind::tag).

use crate::memory::value::BitList;
use std::fmt;
use std::rc::Rc;

/// Index of a node in the [`Ast`] arena
pub type NodeId = usize;

/// Source location information for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical (short-circuit)
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

/// Literal constants
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bits(BitList),
}

/// Repetition bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantifier {
    pub min: u32,
    pub max: u32,
    pub infinite: bool,
    pub lazy: bool,
    pub atomic: bool,
}

impl Quantifier {
    /// `{n}`
    pub fn exactly(n: u32) -> Self {
        Quantifier {
            min: n,
            max: n,
            infinite: false,
            lazy: false,
            atomic: false,
        }
    }

    /// `{n,}`
    pub fn at_least(n: u32) -> Self {
        Quantifier {
            min: n,
            max: n,
            infinite: true,
            lazy: false,
            atomic: false,
        }
    }

    /// `{min,max}`; `None` if `min > max`
    pub fn between(min: u32, max: u32) -> Option<Self> {
        (min <= max).then_some(Quantifier {
            min,
            max,
            infinite: false,
            lazy: false,
            atomic: false,
        })
    }

    /// Whether another repetition is allowed after `count`
    pub fn allows_more(&self, count: u32) -> bool {
        self.infinite || count < self.max
    }

    pub fn satisfied(&self, count: u32) -> bool {
        count >= self.min
    }
}

impl fmt::Display for Quantifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max, self.infinite) {
            (0, _, true) => write!(f, "*")?,
            (1, _, true) => write!(f, "+")?,
            (0, 1, false) => write!(f, "?")?,
            (m, _, true) => write!(f, "{{{},}}", m)?,
            (m, n, false) if m == n => write!(f, "{{{}}}", m)?,
            (m, n, false) => write!(f, "{{{},{}}}", m, n)?,
        }
        if self.lazy {
            write!(f, "?")?;
        }
        if self.atomic {
            write!(f, "+")?;
        }
        Ok(())
    }
}

/// Matching modifiers; `None` inherits from the enclosing context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub insensitive: Option<bool>,
    pub reverse: Option<bool>,
}

/// One item of a character class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassItem {
    Char(char),
    Range(char, char),
}

/// `[a-z_]`, `[^0-9]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharClass {
    pub negated: bool,
    pub items: Vec<ClassItem>,
}

impl CharClass {
    pub fn matches(&self, c: char, insensitive: bool) -> bool {
        let hit = |c: char| {
            self.items.iter().any(|item| match *item {
                ClassItem::Char(x) => x == c,
                ClassItem::Range(lo, hi) => lo <= c && c <= hi,
            })
        };
        let found = if insensitive {
            hit(c) || c.to_lowercase().any(hit) || c.to_uppercase().any(hit)
        } else {
            hit(c)
        };
        found != self.negated
    }
}

/// `{prop ...}` header of a group
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupHeader {
    pub name: Option<Rc<str>>,
    /// Defaults to `true` when a name is given
    pub capture: Option<bool>,
    pub consume: bool,
    pub backtrack: bool,
    pub modifiers: Modifiers,
    /// `key = expr` properties set on the capture node after the match
    pub props: Vec<(Rc<str>, NodeId)>,
}

impl GroupHeader {
    pub fn plain() -> Self {
        GroupHeader {
            consume: true,
            backtrack: true,
            ..GroupHeader::default()
        }
    }

    pub fn captures(&self) -> bool {
        self.capture.unwrap_or(self.name.is_some())
    }
}

/// One option of a quantified group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupOption {
    pub pattern: NodeId,
    pub quantifier: Quantifier,
}

/// All node kinds
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // Statements
    Program {
        body: Vec<NodeId>,
    },
    Block {
        body: Vec<NodeId>,
    },
    Let {
        name: Rc<str>,
        init: NodeId,
    },
    FnDecl {
        name: Rc<str>,
        params: Rc<[Rc<str>]>,
        body: NodeId,
    },
    RuleDecl {
        name: Rc<str>,
        pattern: NodeId,
        capture: bool,
    },
    If {
        condition: NodeId,
        then_branch: NodeId,
        else_branch: Option<NodeId>,
    },
    While {
        condition: NodeId,
        body: NodeId,
    },
    For {
        var: Rc<str>,
        iterable: NodeId,
        body: NodeId,
    },
    Return {
        value: Option<NodeId>,
    },
    Break,
    Continue,
    ExprStmt {
        expr: NodeId,
    },

    // Expressions
    Literal(Literal),
    Ident(Rc<str>),
    ListLit {
        items: Vec<NodeId>,
    },
    ObjectLit {
        fields: Vec<(Rc<str>, NodeId)>,
    },
    Lambda {
        params: Rc<[Rc<str>]>,
        body: NodeId,
    },
    Unary {
        op: UnOp,
        operand: NodeId,
    },
    Binary {
        op: BinOp,
        left: NodeId,
        right: NodeId,
    },
    Assign {
        target: NodeId,
        value: NodeId,
    },
    Call {
        callee: NodeId,
        args: Vec<NodeId>,
    },
    Index {
        object: NodeId,
        index: NodeId,
    },
    Member {
        object: NodeId,
        name: Rc<str>,
    },

    // Lexemes
    Text {
        text: Rc<str>,
        modifiers: Modifiers,
    },
    Class {
        class: CharClass,
        modifiers: Modifiers,
    },
    Bytes {
        bytes: Rc<[u8]>,
    },
    Any {
        modifiers: Modifiers,
    },
    End,
    Sequence {
        items: Vec<NodeId>,
    },
    Group {
        header: GroupHeader,
        alternatives: Vec<NodeId>,
    },
    QuantGroup {
        options: Vec<GroupOption>,
        /// Bound on the total number of option repetitions
        bound: Option<Quantifier>,
    },
    Quantified {
        inner: NodeId,
        quantifier: Quantifier,
    },
    Not {
        inner: NodeId,
    },
    Capture {
        name: Rc<str>,
        inner: NodeId,
    },
    RuleRef {
        name: Rc<str>,
    },
    Filter {
        name: Option<Rc<str>>,
        func: Option<NodeId>,
    },
    Executor {
        guard: Option<NodeId>,
        body: NodeId,
    },
    Addition {
        name: Rc<str>,
        func: Option<NodeId>,
    },
}

impl NodeKind {
    /// Ordered child nodes
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Program { body } | NodeKind::Block { body } => body.clone(),
            NodeKind::Let { init, .. } => vec![*init],
            NodeKind::FnDecl { body, .. } | NodeKind::Lambda { body, .. } => vec![*body],
            NodeKind::RuleDecl { pattern, .. } => vec![*pattern],
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut out = vec![*condition, *then_branch];
                out.extend(*else_branch);
                out
            }
            NodeKind::While { condition, body } => vec![*condition, *body],
            NodeKind::For { iterable, body, .. } => vec![*iterable, *body],
            NodeKind::Return { value } => value.iter().copied().collect(),
            NodeKind::ExprStmt { expr } => vec![*expr],
            NodeKind::ListLit { items } | NodeKind::Sequence { items } => items.clone(),
            NodeKind::ObjectLit { fields } => fields.iter().map(|(_, v)| *v).collect(),
            NodeKind::Unary { operand, .. } => vec![*operand],
            NodeKind::Binary { left, right, .. } => vec![*left, *right],
            NodeKind::Assign { target, value } => vec![*target, *value],
            NodeKind::Call { callee, args } => {
                let mut out = vec![*callee];
                out.extend(args.iter().copied());
                out
            }
            NodeKind::Index { object, index } => vec![*object, *index],
            NodeKind::Member { object, .. } => vec![*object],
            NodeKind::Group {
                header,
                alternatives,
            } => {
                let mut out = alternatives.clone();
                out.extend(header.props.iter().map(|(_, v)| *v));
                out
            }
            NodeKind::QuantGroup { options, .. } => options.iter().map(|o| o.pattern).collect(),
            NodeKind::Quantified { inner, .. }
            | NodeKind::Not { inner }
            | NodeKind::Capture { inner, .. } => vec![*inner],
            NodeKind::Filter { func, .. } | NodeKind::Addition { func, .. } => {
                func.iter().copied().collect()
            }
            NodeKind::Executor { guard, body } => {
                let mut out: Vec<NodeId> = guard.iter().copied().collect();
                out.push(*body);
                out
            }
            NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Literal(_)
            | NodeKind::Ident(_)
            | NodeKind::Text { .. }
            | NodeKind::Class { .. }
            | NodeKind::Bytes { .. }
            | NodeKind::Any { .. }
            | NodeKind::End
            | NodeKind::RuleRef { .. } => Vec::new(),
        }
    }

    /// Discriminant name, used in traces and debug output
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Program { .. } => "program",
            NodeKind::Block { .. } => "block",
            NodeKind::Let { .. } => "let",
            NodeKind::FnDecl { .. } => "fn",
            NodeKind::RuleDecl { .. } => "rule",
            NodeKind::If { .. } => "if",
            NodeKind::While { .. } => "while",
            NodeKind::For { .. } => "for",
            NodeKind::Return { .. } => "return",
            NodeKind::Break => "break",
            NodeKind::Continue => "continue",
            NodeKind::ExprStmt { .. } => "expr-stmt",
            NodeKind::Literal(_) => "literal",
            NodeKind::Ident(_) => "ident",
            NodeKind::ListLit { .. } => "list",
            NodeKind::ObjectLit { .. } => "object",
            NodeKind::Lambda { .. } => "lambda",
            NodeKind::Unary { .. } => "unary",
            NodeKind::Binary { .. } => "binary",
            NodeKind::Assign { .. } => "assign",
            NodeKind::Call { .. } => "call",
            NodeKind::Index { .. } => "index",
            NodeKind::Member { .. } => "member",
            NodeKind::Text { .. } => "text",
            NodeKind::Class { .. } => "class",
            NodeKind::Bytes { .. } => "bytes",
            NodeKind::Any { .. } => "any",
            NodeKind::End => "end",
            NodeKind::Sequence { .. } => "sequence",
            NodeKind::Group { .. } => "group",
            NodeKind::QuantGroup { .. } => "quantified-group",
            NodeKind::Quantified { .. } => "quantifier",
            NodeKind::Not { .. } => "not",
            NodeKind::Capture { .. } => "capture",
            NodeKind::RuleRef { .. } => "rule-ref",
            NodeKind::Filter { .. } => "filter",
            NodeKind::Executor { .. } => "executor",
            NodeKind::Addition { .. } => "addition",
        }
    }

    /// Whether this node is a lexeme (evaluated against a reader)
    pub fn is_lexeme(&self) -> bool {
        matches!(
            self,
            NodeKind::Text { .. }
                | NodeKind::Class { .. }
                | NodeKind::Bytes { .. }
                | NodeKind::Any { .. }
                | NodeKind::End
                | NodeKind::Sequence { .. }
                | NodeKind::Group { .. }
                | NodeKind::QuantGroup { .. }
                | NodeKind::Quantified { .. }
                | NodeKind::Not { .. }
                | NodeKind::Capture { .. }
                | NodeKind::RuleRef { .. }
                | NodeKind::Filter { .. }
                | NodeKind::Executor { .. }
                | NodeKind::Addition { .. }
        )
    }
}

/// An AST node
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub location: SourceLocation,
}

/// The node arena. The root is the last node added by the parser.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Ast {
    pub fn new() -> Self {
        Ast::default()
    }

    pub fn add(&mut self, kind: NodeKind, location: SourceLocation) -> NodeId {
        self.nodes.push(Node { kind, location });
        self.nodes.len() - 1
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id).map(|n| &n.kind)
    }

    pub fn location(&self, id: NodeId) -> SourceLocation {
        self.nodes.get(id).map(|n| n.location).unwrap_or_default()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = root;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_count_is_bounded() {
        let q = Quantifier::exactly(5);
        assert_eq!((q.min, q.max, q.infinite), (5, 5, false));
        assert_eq!(q.to_string(), "{5}");
        assert!(Quantifier::between(3, 2).is_none());
    }

    #[test]
    fn class_matching_honors_negation_and_case() {
        let class = CharClass {
            negated: false,
            items: vec![ClassItem::Range('a', 'f')],
        };
        assert!(class.matches('c', false));
        assert!(!class.matches('C', false));
        assert!(class.matches('C', true));

        let negated = CharClass {
            negated: true,
            ..class
        };
        assert!(negated.matches('z', false));
    }
}
