//! Syntax tree for a KXI compilation unit.
//!
//! The parser builds this once; the analyzer walks it twice. Type names are
//! kept as written and only resolved during the check-and-emit pass, since a
//! class may be used before its declaration.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
  Public,
  Private,
}

impl fmt::Display for Access {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Access::Public => f.write_str("public"),
      Access::Private => f.write_str("private"),
    }
  }
}

/// A type as spelled in the source: `int`, `Cat`, `char[]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
  pub name: String,
  pub array: bool,
  pub line: usize,
}

impl fmt::Display for TypeName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.array {
      write!(f, "{}[]", self.name)
    } else {
      f.write_str(&self.name)
    }
  }
}

#[derive(Debug, Clone)]
pub struct Program {
  pub classes: Vec<ClassDecl>,
  pub main: MethodBody,
  pub line: usize,
}

#[derive(Debug, Clone)]
pub struct ClassDecl {
  pub name: String,
  pub line: usize,
  pub members: Vec<Member>,
}

impl ClassDecl {
  pub fn fields(&self) -> impl Iterator<Item = &FieldDecl> {
    self.members.iter().filter_map(|member| match member {
      Member::Field(field) => Some(field),
      _ => None,
    })
  }

  pub fn has_constructor(&self) -> bool {
    self
      .members
      .iter()
      .any(|member| matches!(member, Member::Constructor(_)))
  }
}

#[derive(Debug, Clone)]
pub enum Member {
  Field(FieldDecl),
  Method(MethodDecl),
  Constructor(ConstructorDecl),
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
  pub access: Access,
  pub ty: TypeName,
  pub name: String,
  pub init: Option<Expr>,
  pub line: usize,
}

#[derive(Debug, Clone)]
pub struct MethodDecl {
  pub access: Access,
  pub return_type: TypeName,
  pub name: String,
  pub params: Vec<Param>,
  pub body: MethodBody,
  pub line: usize,
}

#[derive(Debug, Clone)]
pub struct ConstructorDecl {
  pub name: String,
  pub params: Vec<Param>,
  pub body: MethodBody,
  pub line: usize,
}

#[derive(Debug, Clone)]
pub struct Param {
  pub ty: TypeName,
  pub name: String,
  pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MethodBody {
  pub locals: Vec<VarDecl>,
  pub statements: Vec<Stmt>,
  /// Line of the closing brace.
  pub end_line: usize,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
  pub ty: TypeName,
  pub name: String,
  pub init: Option<Expr>,
  pub line: usize,
}

#[derive(Debug, Clone)]
pub enum Stmt {
  Block(Vec<Stmt>),
  Expr(Expr),
  If {
    cond: Expr,
    then_branch: Box<Stmt>,
    else_branch: Option<Box<Stmt>>,
  },
  While {
    cond: Expr,
    body: Box<Stmt>,
  },
  Return {
    value: Option<Expr>,
    line: usize,
  },
  Cout(Expr),
  Cin(Expr),
  Switch {
    scrutinee: Expr,
    cases: Vec<Case>,
    default: Option<Box<Stmt>>,
    line: usize,
  },
  Break {
    line: usize,
  },
}

#[derive(Debug, Clone)]
pub struct Case {
  pub label: Expr,
  pub body: Stmt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Mul,
  Div,
  Add,
  Sub,
  Lt,
  Le,
  Gt,
  Ge,
  Eq,
  Ne,
  And,
  Or,
}

impl BinaryOp {
  pub fn from_lexeme(text: &str) -> Option<Self> {
    let op = match text {
      "*" => Self::Mul,
      "/" => Self::Div,
      "+" => Self::Add,
      "-" => Self::Sub,
      "<" => Self::Lt,
      "<=" => Self::Le,
      ">" => Self::Gt,
      ">=" => Self::Ge,
      "==" => Self::Eq,
      "!=" => Self::Ne,
      "&&" => Self::And,
      "||" => Self::Or,
      _ => return None,
    };
    Some(op)
  }

  pub fn lexeme(self) -> &'static str {
    match self {
      Self::Mul => "*",
      Self::Div => "/",
      Self::Add => "+",
      Self::Sub => "-",
      Self::Lt => "<",
      Self::Le => "<=",
      Self::Gt => ">",
      Self::Ge => ">=",
      Self::Eq => "==",
      Self::Ne => "!=",
      Self::And => "&&",
      Self::Or => "||",
    }
  }

  pub fn precedence(self) -> u8 {
    match self {
      Self::Mul | Self::Div => 6,
      Self::Add | Self::Sub => 5,
      Self::Lt | Self::Le | Self::Gt | Self::Ge => 4,
      Self::Eq | Self::Ne => 3,
      Self::And => 2,
      Self::Or => 1,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
  Atoi,
  Itoa,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
  /// Integer literal text, sign included.
  Number(String),
  /// Character literal lexeme, quotes included.
  Character(String),
  Bool(bool),
  Null,
  This,
  Ident(String),
  /// Call of a method without an explicit receiver.
  Call {
    name: String,
    args: Vec<Expr>,
  },
  /// Indexing of an array named without an explicit receiver.
  Index {
    name: String,
    index: Box<Expr>,
  },
  Member {
    object: Box<Expr>,
    name: String,
  },
  MethodCall {
    object: Box<Expr>,
    name: String,
    args: Vec<Expr>,
  },
  MemberIndex {
    object: Box<Expr>,
    name: String,
    index: Box<Expr>,
  },
  NewObject {
    class: String,
    args: Vec<Expr>,
  },
  NewArray {
    element: TypeName,
    size: Box<Expr>,
  },
  Convert {
    kind: Conversion,
    operand: Box<Expr>,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
  },
  Assign {
    target: Box<Expr>,
    value: Box<Expr>,
  },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
  pub kind: ExprKind,
  pub line: usize,
}

impl Expr {
  pub fn new(kind: ExprKind, line: usize) -> Self {
    Self { kind, line }
  }

  pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, line: usize) -> Self {
    Self::new(
      ExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
      },
      line,
    )
  }

  pub fn assign(target: Expr, value: Expr, line: usize) -> Self {
    Self::new(
      ExprKind::Assign {
        target: Box::new(target),
        value: Box::new(value),
      },
      line,
    )
  }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
  f.write_str("(")?;
  for (i, arg) in args.iter().enumerate() {
    if i > 0 {
      f.write_str(", ")?;
    }
    write!(f, "{arg}")?;
  }
  f.write_str(")")
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Expr, min_precedence: u8) -> fmt::Result {
  match &operand.kind {
    ExprKind::Binary { op, .. } if op.precedence() < min_precedence => write!(f, "({operand})"),
    ExprKind::Assign { .. } => write!(f, "({operand})"),
    _ => write!(f, "{operand}"),
  }
}

/// Renders the expression back to source-like text for diagnostics.
impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.kind {
      ExprKind::Number(text) | ExprKind::Character(text) | ExprKind::Ident(text) => {
        f.write_str(text)
      }
      ExprKind::Bool(value) => write!(f, "{value}"),
      ExprKind::Null => f.write_str("null"),
      ExprKind::This => f.write_str("this"),
      ExprKind::Call { name, args } => {
        f.write_str(name)?;
        write_args(f, args)
      }
      ExprKind::Index { name, index } => write!(f, "{name}[{index}]"),
      ExprKind::Member { object, name } => write!(f, "{object}.{name}"),
      ExprKind::MethodCall { object, name, args } => {
        write!(f, "{object}.{name}")?;
        write_args(f, args)
      }
      ExprKind::MemberIndex {
        object,
        name,
        index,
      } => write!(f, "{object}.{name}[{index}]"),
      ExprKind::NewObject { class, args } => {
        write!(f, "new {class}")?;
        write_args(f, args)
      }
      ExprKind::NewArray { element, size } => write!(f, "new {}[{size}]", element.name),
      ExprKind::Convert { kind, operand } => {
        let name = match kind {
          Conversion::Atoi => "atoi",
          Conversion::Itoa => "itoa",
        };
        write!(f, "{name}({operand})")
      }
      ExprKind::Binary { op, lhs, rhs } => {
        write_operand(f, lhs, op.precedence())?;
        write!(f, " {} ", op.lexeme())?;
        write_operand(f, rhs, op.precedence() + 1)
      }
      ExprKind::Assign { target, value } => write!(f, "{target} = {value}"),
    }
  }
}
