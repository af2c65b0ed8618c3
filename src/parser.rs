//! Recursive-descent parser producing the syntax tree of a compilation unit.
//!
//! Each nonterminal is one function that consumes tokens from a shared
//! cursor and fails on the first unexpected token; there is no recovery.
//! Expressions are handed to the operator-precedence builder in
//! `shunting`, which keeps precedence out of the grammar functions.

use log::debug;

use crate::ast::{
  Access, BinaryOp, Case, ClassDecl, ConstructorDecl, Conversion, Expr, ExprKind, FieldDecl,
  Member, MethodBody, MethodDecl, Param, Program, Stmt, TypeName, VarDecl,
};
use crate::error::{CompileError, CompileResult};
use crate::shunting::{Group, ShuntingYard};
use crate::tokenizer::{Token, TokenKind};

const PRIMITIVE_TYPES: &[&str] = &["int", "char", "bool", "void", "sym"];

/// Parse a whole compilation unit from the token stream.
pub fn parse(tokens: Vec<Token>) -> CompileResult<Program> {
  let mut stream = TokenStream::new(tokens)?;

  let mut classes = Vec::new();
  while stream.current().is("class") {
    classes.push(parse_class(&mut stream)?);
  }

  let line = stream.current().line;
  stream.skip("void")?;
  stream.skip("kxi2019")?;
  stream.skip("main")?;
  stream.skip("(")?;
  stream.skip(")")?;
  let main = parse_method_body(&mut stream)?;

  if !stream.is_eof() {
    return Err(stream.unexpected("EOF"));
  }

  debug!("parsed {} classes and main", classes.len());
  Ok(Program {
    classes,
    main,
    line,
  })
}

fn parse_class(stream: &mut TokenStream) -> CompileResult<ClassDecl> {
  let line = stream.current().line;
  stream.skip("class")?;
  let name = stream.get_ident()?;
  stream.skip("{")?;

  let mut members = Vec::new();
  while !stream.current().is("}") {
    members.push(parse_member(stream, &name)?);
  }
  stream.skip("}")?;

  Ok(ClassDecl {
    name,
    line,
    members,
  })
}

fn parse_member(stream: &mut TokenStream, class: &str) -> CompileResult<Member> {
  let line = stream.current().line;

  if stream.current().kind == TokenKind::Identifier
    && stream.current().lexeme == class
    && stream.peek_nth(1).is("(")
  {
    let name = stream.get_ident()?;
    let params = parse_params(stream)?;
    let body = parse_method_body(stream)?;
    return Ok(Member::Constructor(ConstructorDecl {
      name,
      params,
      body,
      line,
    }));
  }

  let access = if stream.equal("public") {
    Access::Public
  } else if stream.equal("private") {
    Access::Private
  } else {
    return Err(stream.unexpected("modifier"));
  };
  let ty = parse_type(stream)?;
  let name = stream.get_ident()?;

  if stream.current().is("(") {
    let params = parse_params(stream)?;
    let body = parse_method_body(stream)?;
    return Ok(Member::Method(MethodDecl {
      access,
      return_type: ty,
      name,
      params,
      body,
      line,
    }));
  }

  let init = if stream.equal("=") {
    Some(parse_expr(stream)?)
  } else {
    None
  };
  stream.skip(";")?;
  Ok(Member::Field(FieldDecl {
    access,
    ty,
    name,
    init,
    line,
  }))
}

fn parse_params(stream: &mut TokenStream) -> CompileResult<Vec<Param>> {
  stream.skip("(")?;
  let mut params = Vec::new();
  if stream.equal(")") {
    return Ok(params);
  }
  loop {
    let line = stream.current().line;
    let ty = parse_type(stream)?;
    let name = stream.get_ident()?;
    params.push(Param { ty, name, line });
    if !stream.equal(",") {
      break;
    }
  }
  stream.skip(")")?;
  Ok(params)
}

fn parse_type(stream: &mut TokenStream) -> CompileResult<TypeName> {
  let token = stream.current();
  let line = token.line;
  let is_type = (token.kind == TokenKind::Keyword && PRIMITIVE_TYPES.contains(&token.lexeme.as_str()))
    || token.kind == TokenKind::Identifier;
  if !is_type {
    return Err(stream.unexpected("type"));
  }
  let name = stream.advance().lexeme;
  let array = if stream.equal("[") {
    stream.skip("]")?;
    true
  } else {
    false
  };
  Ok(TypeName { name, array, line })
}

/// `type IDENT` or `type [ ] IDENT` starts a variable declaration.
fn starts_declaration(stream: &TokenStream) -> bool {
  let first = stream.current();
  let primitive =
    first.kind == TokenKind::Keyword && PRIMITIVE_TYPES.contains(&first.lexeme.as_str());
  if !primitive && first.kind != TokenKind::Identifier {
    return false;
  }
  let second = stream.peek_nth(1);
  if second.kind == TokenKind::Identifier {
    return true;
  }
  second.is("[") && stream.peek_nth(2).is("]")
}

fn parse_method_body(stream: &mut TokenStream) -> CompileResult<MethodBody> {
  stream.skip("{")?;

  let mut locals = Vec::new();
  while starts_declaration(stream) {
    let line = stream.current().line;
    let ty = parse_type(stream)?;
    let name = stream.get_ident()?;
    let init = if stream.equal("=") {
      Some(parse_expr(stream)?)
    } else {
      None
    };
    stream.skip(";")?;
    locals.push(VarDecl {
      ty,
      name,
      init,
      line,
    });
  }

  let mut statements = Vec::new();
  while !stream.current().is("}") {
    statements.push(parse_stmt(stream)?);
  }
  let end_line = stream.current().line;
  stream.skip("}")?;

  Ok(MethodBody {
    locals,
    statements,
    end_line,
  })
}

fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  let line = stream.current().line;

  if stream.equal("{") {
    let mut body = Vec::new();
    while !stream.current().is("}") {
      body.push(parse_stmt(stream)?);
    }
    stream.skip("}")?;
    return Ok(Stmt::Block(body));
  }

  if stream.equal("if") {
    let cond = parse_condition(stream)?;
    let then_branch = Box::new(parse_stmt(stream)?);
    let else_branch = if stream.equal("else") {
      Some(Box::new(parse_stmt(stream)?))
    } else {
      None
    };
    return Ok(Stmt::If {
      cond,
      then_branch,
      else_branch,
    });
  }

  if stream.equal("while") {
    let cond = parse_condition(stream)?;
    let body = Box::new(parse_stmt(stream)?);
    return Ok(Stmt::While { cond, body });
  }

  if stream.equal("return") {
    let value = if stream.current().is(";") {
      None
    } else {
      Some(parse_expr(stream)?)
    };
    stream.skip(";")?;
    return Ok(Stmt::Return { value, line });
  }

  if stream.equal("cout") {
    stream.skip("<<")?;
    let expr = parse_expr(stream)?;
    stream.skip(";")?;
    return Ok(Stmt::Cout(expr));
  }

  if stream.equal("cin") {
    stream.skip(">>")?;
    let expr = parse_expr(stream)?;
    stream.skip(";")?;
    return Ok(Stmt::Cin(expr));
  }

  if stream.equal("switch") {
    return parse_switch(stream, line);
  }

  if stream.equal("break") {
    stream.skip(";")?;
    return Ok(Stmt::Break { line });
  }

  let expr = parse_expr(stream)?;
  stream.skip(";")?;
  Ok(Stmt::Expr(expr))
}

fn parse_condition(stream: &mut TokenStream) -> CompileResult<Expr> {
  stream.skip("(")?;
  let cond = parse_expr(stream)?;
  stream.skip(")")?;
  Ok(cond)
}

fn parse_switch(stream: &mut TokenStream, line: usize) -> CompileResult<Stmt> {
  let scrutinee = parse_condition(stream)?;
  stream.skip("{")?;

  let mut cases = Vec::new();
  while stream.equal("case") {
    let label = parse_case_label(stream)?;
    stream.skip(":")?;
    let body = parse_stmt(stream)?;
    cases.push(Case { label, body });
  }

  let default = if stream.equal("default") {
    stream.skip(":")?;
    Some(Box::new(parse_stmt(stream)?))
  } else {
    None
  };
  stream.skip("}")?;

  Ok(Stmt::Switch {
    scrutinee,
    cases,
    default,
    line,
  })
}

fn parse_case_label(stream: &mut TokenStream) -> CompileResult<Expr> {
  let line = stream.current().line;
  if let Some(number) = parse_signed_number(stream) {
    return Ok(Expr::new(ExprKind::Number(number), line));
  }
  if stream.current().kind == TokenKind::Character {
    let text = stream.advance().lexeme;
    return Ok(Expr::new(ExprKind::Character(text), line));
  }
  Err(stream.unexpected("literal"))
}

/// `[+|-] NUMBER`, returned as literal text with the sign folded in.
fn parse_signed_number(stream: &mut TokenStream) -> Option<String> {
  let current = stream.current();
  if current.kind == TokenKind::Number {
    return Some(stream.advance().lexeme);
  }
  let signed = (current.is("+") || current.is("-")) && stream.peek_nth(1).kind == TokenKind::Number;
  if !signed {
    return None;
  }
  let sign = stream.advance().lexeme;
  let digits = stream.advance().lexeme;
  Some(if sign == "-" { format!("-{digits}") } else { digits })
}

/// Parse one expression with the two-stack operator-precedence builder.
pub fn parse_expr(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut sy = ShuntingYard::new();
  let mut expect_operand = true;

  loop {
    if expect_operand {
      expect_operand = parse_operand(stream, &mut sy)?;
      continue;
    }

    let token = stream.current().clone();
    if token.is(".") {
      stream.advance();
      expect_operand = parse_member_suffix(stream, &mut sy, token.line)?;
      continue;
    }

    let closes_group = sy
      .innermost_group()
      .is_some_and(|group| token.is(group.closer()));
    if closes_group {
      stream.advance();
      sy.close()?;
      continue;
    }

    let separates_argument = token.is(",")
      && sy
        .innermost_group()
        .is_some_and(|group| group.takes_arguments());
    if separates_argument {
      stream.advance();
      sy.next_argument()?;
      expect_operand = true;
      continue;
    }

    if token.kind == TokenKind::Symbol {
      if token.lexeme == "=" {
        stream.advance();
        sy.push_assign(token.line)?;
        expect_operand = true;
        continue;
      }
      if let Some(op) = BinaryOp::from_lexeme(&token.lexeme) {
        stream.advance();
        sy.push_binary(op, token.line)?;
        expect_operand = true;
        continue;
      }
    }

    break;
  }

  if let Some(group) = sy.innermost_group() {
    return Err(stream.unexpected(group.closer()));
  }
  sy.finish()
}

/// Parse what may stand in operand position. Returns whether another
/// operand is still expected (true after opening a group).
fn parse_operand(stream: &mut TokenStream, sy: &mut ShuntingYard) -> CompileResult<bool> {
  let token = stream.current().clone();
  let line = token.line;

  let empty_arguments = token.is(")")
    && sy.operands_in_group() == 0
    && sy
      .innermost_group()
      .is_some_and(|group| group.takes_arguments());
  if empty_arguments {
    stream.advance();
    sy.close()?;
    return Ok(false);
  }

  if token.is("(") {
    stream.advance();
    sy.open(Group::Paren, line);
    return Ok(true);
  }

  if let Some(number) = parse_signed_number(stream) {
    sy.push_operand(Expr::new(ExprKind::Number(number), line));
    return Ok(false);
  }

  let literal = match token.kind {
    TokenKind::Character => Some(ExprKind::Character(token.lexeme.clone())),
    TokenKind::Keyword => match token.lexeme.as_str() {
      "true" => Some(ExprKind::Bool(true)),
      "false" => Some(ExprKind::Bool(false)),
      "null" => Some(ExprKind::Null),
      "this" => Some(ExprKind::This),
      _ => None,
    },
    _ => None,
  };
  if let Some(kind) = literal {
    stream.advance();
    sy.push_operand(Expr::new(kind, line));
    return Ok(false);
  }

  if token.kind == TokenKind::Identifier {
    stream.advance();
    let name = token.lexeme;
    if stream.equal("(") {
      sy.open(Group::Call { name, object: None }, line);
      return Ok(true);
    }
    if stream.equal("[") {
      sy.open(Group::Index { name, object: None }, line);
      return Ok(true);
    }
    sy.push_operand(Expr::new(ExprKind::Ident(name), line));
    return Ok(false);
  }

  if stream.equal("new") {
    let type_token = stream.current();
    let is_type = type_token.kind == TokenKind::Identifier
      || (type_token.kind == TokenKind::Keyword
        && PRIMITIVE_TYPES.contains(&type_token.lexeme.as_str()));
    if !is_type {
      return Err(stream.unexpected("type"));
    }
    let type_line = type_token.line;
    let name = stream.advance().lexeme;
    if stream.equal("(") {
      sy.open(Group::NewObject { class: name }, line);
      return Ok(true);
    }
    if stream.equal("[") {
      let element = TypeName {
        name,
        array: false,
        line: type_line,
      };
      sy.open(Group::NewArray { element }, line);
      return Ok(true);
    }
    return Err(stream.unexpected("( or ["));
  }

  let conversion = if token.is("atoi") {
    Some(Conversion::Atoi)
  } else if token.is("itoa") {
    Some(Conversion::Itoa)
  } else {
    None
  };
  if let Some(kind) = conversion {
    stream.advance();
    stream.skip("(")?;
    sy.open(Group::Convert(kind), line);
    return Ok(true);
  }

  Err(stream.unexpected("expression"))
}

/// `. IDENT [ (args) | [index] ]` applied to the most recent operand.
/// Returns whether a group was opened and an operand is expected next.
fn parse_member_suffix(
  stream: &mut TokenStream,
  sy: &mut ShuntingYard,
  line: usize,
) -> CompileResult<bool> {
  let name = stream.get_ident()?;
  let object = Box::new(sy.pop_operand()?);
  if stream.equal("(") {
    sy.open(
      Group::Call {
        name,
        object: Some(object),
      },
      line,
    );
    return Ok(true);
  }
  if stream.equal("[") {
    sy.open(
      Group::Index {
        name,
        object: Some(object),
      },
      line,
    );
    return Ok(true);
  }
  sy.push_operand(Expr::new(ExprKind::Member { object, name }, line));
  Ok(false)
}

/// Cursor over the token vector.
pub struct TokenStream {
  tokens: Vec<Token>,
  pos: usize,
}

impl TokenStream {
  /// Take ownership of the tokens; the vector must end with `Eof`.
  pub fn new(tokens: Vec<Token>) -> CompileResult<Self> {
    if !tokens.last().is_some_and(Token::is_eof) {
      return Err(CompileError::internal("token stream is not terminated by EOF"));
    }
    Ok(Self { tokens, pos: 0 })
  }

  pub fn current(&self) -> &Token {
    self.peek_nth(0)
  }

  /// Token `n` places ahead; sticks at the final `Eof`.
  pub fn peek_nth(&self, n: usize) -> &Token {
    let last = self.tokens.len() - 1;
    &self.tokens[(self.pos + n).min(last)]
  }

  pub fn advance(&mut self) -> Token {
    let token = self.current().clone();
    if !token.is_eof() {
      self.pos += 1;
    }
    token
  }

  /// Consume the current token if it is the given keyword or symbol.
  pub fn equal(&mut self, text: &str) -> bool {
    if self.current().is(text) {
      self.pos += 1;
      return true;
    }
    false
  }

  pub fn skip(&mut self, text: &str) -> CompileResult<()> {
    if self.equal(text) {
      Ok(())
    } else {
      Err(self.unexpected(text))
    }
  }

  pub fn get_ident(&mut self) -> CompileResult<String> {
    if self.current().kind == TokenKind::Identifier {
      return Ok(self.advance().lexeme);
    }
    Err(self.unexpected("identifier"))
  }

  pub fn unexpected(&self, expected: &str) -> CompileError {
    let token = self.current();
    CompileError::syntax(token.line, token.lexeme.clone(), expected)
  }

  pub fn is_eof(&self) -> bool {
    self.current().is_eof()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tokenizer::tokenize;

  fn expr(source: &str) -> CompileResult<Expr> {
    let mut stream = TokenStream::new(tokenize(source)?)?;
    let expr = parse_expr(&mut stream)?;
    if !stream.is_eof() {
      return Err(stream.unexpected("EOF"));
    }
    Ok(expr)
  }

  fn program(source: &str) -> CompileResult<Program> {
    parse(tokenize(source)?)
  }

  #[test]
  fn precedence_shapes_the_tree() {
    assert_eq!(expr("3 + 4 * 2").unwrap().to_string(), "3 + 4 * 2");
    assert_eq!(expr("(3 + 4) * 2").unwrap().to_string(), "(3 + 4) * 2");
    assert_eq!(
      expr("a < b && c == d || e").unwrap().to_string(),
      "a < b && c == d || e"
    );
  }

  #[test]
  fn signed_literals_only_in_operand_position() {
    let e = expr("x - -5").unwrap();
    let ExprKind::Binary { op, rhs, .. } = e.kind else {
      panic!("expected subtraction");
    };
    assert_eq!(op, BinaryOp::Sub);
    assert_eq!(rhs.kind, ExprKind::Number("-5".to_string()));
  }

  #[test]
  fn member_chains_and_calls() {
    let e = expr("a.b.c(1, x + 2)[0]").err();
    assert!(e.is_some(), "indexing a call result is not in the grammar");

    let e = expr("a.b.c(1, x + 2)").unwrap();
    assert_eq!(e.to_string(), "a.b.c(1, x + 2)");
    assert!(matches!(e.kind, ExprKind::MethodCall { .. }));

    let e = expr("this.items[i + 1] = f()").unwrap();
    assert_eq!(e.to_string(), "this.items[i + 1] = f()");
  }

  #[test]
  fn new_and_conversions() {
    assert!(matches!(
      expr("new Cat(1, 'a')").unwrap().kind,
      ExprKind::NewObject { .. }
    ));
    assert!(matches!(
      expr("new int[10]").unwrap().kind,
      ExprKind::NewArray { .. }
    ));
    assert_eq!(expr("itoa(3) ").unwrap().to_string(), "itoa(3)");
  }

  #[test]
  fn assignment_cannot_nest() {
    let err = expr("a = b = c").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { .. }));
    let err = expr("f(a = 1)").unwrap_err();
    assert!(matches!(err, CompileError::Semantic { .. }));
  }

  #[test]
  fn unbalanced_parenthesis() {
    let err = expr("(1 + 2").unwrap_err();
    assert_eq!(err.to_string(), "2: Found EOF expecting )");
    let err = expr("a[(1 + 2]").unwrap_err();
    assert_eq!(err.to_string(), "1: Found ] expecting )");
  }

  #[test]
  fn minimal_program() {
    let p = program("void kxi2019 main() { }").unwrap();
    assert!(p.classes.is_empty());
    assert!(p.main.statements.is_empty());
  }

  #[test]
  fn class_members() {
    let source = "class Cat {\n  private int lives = 9;\n  public char[] name;\n  Cat(int n) { lives = n; }\n  public int getLives() { return lives; }\n}\nvoid kxi2019 main() { Cat c; c = new Cat(3); }";
    let p = program(source).unwrap();
    let class = &p.classes[0];
    assert_eq!(class.name, "Cat");
    assert_eq!(class.members.len(), 4);
    assert!(class.has_constructor());
    assert_eq!(class.fields().count(), 2);
    assert_eq!(p.main.locals.len(), 1);
    assert_eq!(p.main.locals[0].ty.name, "Cat");
  }

  #[test]
  fn declarations_vs_statements() {
    let p = program("void kxi2019 main() { int[] a; Cat c; a[0] = 1; c.x = 2; }").unwrap();
    assert_eq!(p.main.locals.len(), 2);
    assert!(p.main.locals[0].ty.array);
    assert_eq!(p.main.statements.len(), 2);
  }

  #[test]
  fn control_statements() {
    let source = "void kxi2019 main() {\n int x;\n if (x < 1) x = 1; else { x = 2; }\n while (x > 0) x = x - 1;\n switch (x) { case 1: break; case -2: x = 3; default: cout << x; }\n cin >> x;\n return;\n}";
    let p = program(source).unwrap();
    assert_eq!(p.main.statements.len(), 5);
    let Stmt::Switch { cases, default, .. } = &p.main.statements[2] else {
      panic!("expected switch");
    };
    assert_eq!(cases.len(), 2);
    assert!(default.is_some());
  }

  #[test]
  fn trailing_tokens_are_rejected() {
    let err = program("void kxi2019 main() { } x").unwrap_err();
    assert_eq!(err.to_string(), "1: Found x expecting EOF");
  }

  #[test]
  fn missing_semicolon_reports_found_and_expected() {
    let err = program("void kxi2019 main() {\n int x;\n x = 1\n}").unwrap_err();
    assert_eq!(err.to_string(), "4: Found } expecting ;");
  }
}
