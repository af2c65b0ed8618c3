//! Semantic analysis and IR emission over the syntax tree.
//!
//! The same tree is walked twice. `Pass::Declare` records every class,
//! method, constructor, field, parameter and local in the symbol table.
//! `Pass::CheckEmit` resolves types, assigns frame offsets, type-checks
//! statements and expressions and emits quadruples. All state lives in one
//! `Context` that is threaded through every function.

use log::debug;

use crate::ast::{
  Access, Case, ClassDecl, ConstructorDecl, Expr, FieldDecl, Member, MethodBody, MethodDecl, Param,
  Program, Stmt, TypeName,
};
use crate::error::{CompileError, CompileResult};
use crate::eval::{self, Value};
use crate::ir::{Opcode, Operand};
use crate::symtab::{GLOBAL_SCOPE, Symbol, SymbolId, SymbolKind, SymbolTable};
use crate::ty::Type;

/// Bytes reserved at the top of every frame: return address, previous
/// frame pointer and `this`.
pub const FRAME_HEADER: i32 = 12;
pub const THIS_OFFSET: i32 = 8;
pub const WORD: i32 = 4;

/// Name of the synthesized per-class function running field initializers.
pub const STATIC_INIT: &str = "$StaticInit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
  Declare,
  CheckEmit,
}

/// Compilation state shared by both passes.
pub struct Context {
  pub table: SymbolTable,
  /// Enclosing class symbol, `None` inside `main`.
  pub class: Option<SymbolId>,
  /// Scope of the function being analyzed, e.g. `g.Cat.meow`.
  pub scope: String,
  pub function: Option<SymbolId>,
  /// Next free frame offset in the current function.
  pub frame: i32,
  breaks: Vec<String>,
}

impl Default for Context {
  fn default() -> Self {
    Self::new()
  }
}

impl Context {
  pub fn new() -> Self {
    Self {
      table: SymbolTable::new(),
      class: None,
      scope: GLOBAL_SCOPE.to_string(),
      function: None,
      frame: FRAME_HEADER,
      breaks: Vec::new(),
    }
  }

  /// Scope holding the members of the enclosing class.
  pub fn class_scope(&self) -> CompileResult<Option<String>> {
    match self.class {
      Some(id) => Ok(Some(member_scope(&self.table.get(id)?.name))),
      None => Ok(None),
    }
  }

  /// Allocate a fresh slot symbol in the current frame.
  pub fn slot(&mut self, kind: SymbolKind, ty: Type) -> SymbolId {
    let id = self.table.insert_synthetic(&self.scope, kind, ty, self.frame);
    self.frame += WORD;
    id
  }

  pub fn emit(&mut self, line: usize, op: Opcode, x: Operand, y: Operand, z: Operand) {
    self.table.ir.emit(line, op, x, y, z);
  }

  fn fresh_label(&mut self, prefix: &str) -> String {
    format!("{prefix}{}", self.table.ir.new_label())
  }
}

pub fn member_scope(class: &str) -> String {
  format!("{GLOBAL_SCOPE}.{class}")
}

fn function_scope(class: Option<&str>, function: &str) -> String {
  match class {
    Some(class) => format!("{GLOBAL_SCOPE}.{class}.{function}"),
    None => format!("{GLOBAL_SCOPE}.{function}"),
  }
}

/// Run both passes over the tree and return the filled symbol table.
pub fn analyze(program: &Program) -> CompileResult<SymbolTable> {
  let mut cx = Context::new();
  for pass in [Pass::Declare, Pass::CheckEmit] {
    walk_program(&mut cx, pass, program)?;
    debug!(
      "{pass:?} pass done: {} symbols, {} quads",
      cx.table.len(),
      cx.table.ir.len()
    );
  }
  Ok(cx.table)
}

fn walk_program(cx: &mut Context, pass: Pass, program: &Program) -> CompileResult<()> {
  for class in &program.classes {
    walk_class(cx, pass, class)?;
  }
  walk_main(cx, pass, program)
}

/// Syntactic type to type, without checking that named classes exist.
pub fn type_of(name: &TypeName) -> Type {
  let base = Type::primitive(&name.name).unwrap_or_else(|| Type::Class(name.name.clone()));
  if name.array {
    Type::array_of(base)
  } else {
    base
  }
}

/// Resolve a type name, failing on unknown classes.
pub fn resolve_type(cx: &Context, name: &TypeName) -> CompileResult<Type> {
  let ty = type_of(name);
  let base = ty.element().unwrap_or(&ty);
  if let Type::Class(class) = base
    && cx.table.class_named(class).is_none()
  {
    return Err(CompileError::semantic(
      name.line,
      format!("Type {class} not defined"),
    ));
  }
  Ok(ty)
}

fn resolve_storage_type(cx: &Context, name: &TypeName, what: &str) -> CompileResult<Type> {
  let ty = resolve_type(cx, name)?;
  if ty == Type::Void || ty.element() == Some(&Type::Void) {
    return Err(CompileError::semantic(
      name.line,
      format!("{what} cannot have type {name}"),
    ));
  }
  Ok(ty)
}

fn walk_class(cx: &mut Context, pass: Pass, class: &ClassDecl) -> CompileResult<()> {
  match pass {
    Pass::Declare => declare_class(cx, class),
    Pass::CheckEmit => emit_class(cx, class),
  }
}

fn declare_class(cx: &mut Context, class: &ClassDecl) -> CompileResult<()> {
  let class_ty = Type::Class(class.name.clone());
  let class_id = cx.table.declare(
    class.line,
    Symbol::new(GLOBAL_SCOPE, &class.name, SymbolKind::Class, class_ty.clone()),
  )?;
  debug!("declared class {} as C{class_id}", class.name);
  let scope = member_scope(&class.name);

  let mut size = 0;
  for member in &class.members {
    match member {
      Member::Field(field) => {
        let symbol = Symbol::new(&scope, &field.name, SymbolKind::InstanceVar, type_of(&field.ty))
          .with_access(field.access)
          .at_offset(size);
        cx.table.declare(field.line, symbol)?;
        size += WORD;
      }
      Member::Method(method) => declare_method(cx, class, method)?,
      Member::Constructor(ctor) => {
        declare_function(
          cx,
          class,
          &ctor.name,
          SymbolKind::Constructor,
          class_ty.clone(),
          Access::Public,
          &ctor.params,
          &ctor.body,
          ctor.line,
        )?;
      }
    }
  }
  cx.table.set_offset(class_id, size)?;

  declare_function(
    cx,
    class,
    STATIC_INIT,
    SymbolKind::Method,
    Type::Void,
    Access::Private,
    &[],
    &MethodBody::default(),
    class.line,
  )?;
  if !class.has_constructor() {
    declare_function(
      cx,
      class,
      &class.name,
      SymbolKind::Constructor,
      class_ty,
      Access::Public,
      &[],
      &MethodBody::default(),
      class.line,
    )?;
  }
  Ok(())
}

fn declare_method(cx: &mut Context, class: &ClassDecl, method: &MethodDecl) -> CompileResult<()> {
  declare_function(
    cx,
    class,
    &method.name,
    SymbolKind::Method,
    type_of(&method.return_type),
    method.access,
    &method.params,
    &method.body,
    method.line,
  )
}

#[allow(clippy::too_many_arguments)]
fn declare_function(
  cx: &mut Context,
  class: &ClassDecl,
  name: &str,
  kind: SymbolKind,
  return_type: Type,
  access: Access,
  params: &[Param],
  body: &MethodBody,
  line: usize,
) -> CompileResult<()> {
  let symbol = Symbol::new(member_scope(&class.name), name, kind, return_type.clone())
    .returning(return_type)
    .with_access(access);
  let id = cx.table.declare(line, symbol)?;
  debug!("declared {kind} {}.{name} as {}", class.name, cx.table.label(id)?);

  let scope = function_scope(Some(&class.name), name);
  cx.table.declare(
    line,
    Symbol::new(&scope, "this", SymbolKind::Param, Type::Class(class.name.clone()))
      .at_offset(THIS_OFFSET),
  )?;

  let mut param_ids = Vec::with_capacity(params.len());
  for param in params {
    let symbol = Symbol::new(&scope, &param.name, SymbolKind::Param, type_of(&param.ty));
    param_ids.push(cx.table.declare(param.line, symbol)?);
  }
  cx.table.set_params(id, param_ids)?;

  declare_locals(cx, &scope, body)
}

fn declare_locals(cx: &mut Context, scope: &str, body: &MethodBody) -> CompileResult<()> {
  for local in &body.locals {
    let symbol = Symbol::new(scope, &local.name, SymbolKind::LocalVar, type_of(&local.ty));
    cx.table.declare(local.line, symbol)?;
  }
  Ok(())
}

fn lookup(cx: &Context, scope: &str, name: &str) -> CompileResult<SymbolId> {
  cx.table
    .search(scope, name)
    .ok_or_else(|| CompileError::internal(format!("{scope}.{name} missing after declare pass")))
}

fn emit_class(cx: &mut Context, class: &ClassDecl) -> CompileResult<()> {
  let class_id = lookup(cx, GLOBAL_SCOPE, &class.name)?;
  cx.class = Some(class_id);
  let scope = member_scope(&class.name);

  for field in class.fields() {
    let ty = resolve_storage_type(cx, &field.ty, &format!("Field {}", field.name))?;
    let id = lookup(cx, &scope, &field.name)?;
    cx.table.set_type(id, ty)?;
  }

  emit_static_init(cx, class)?;

  let mut has_constructor = false;
  for member in &class.members {
    match member {
      Member::Field(_) => {}
      Member::Method(method) => emit_method(cx, class, method)?,
      Member::Constructor(ctor) => {
        has_constructor = true;
        emit_constructor(cx, class, ctor)?;
      }
    }
  }
  if !has_constructor {
    let default = ConstructorDecl {
      name: class.name.clone(),
      params: Vec::new(),
      body: MethodBody {
        end_line: class.line,
        ..MethodBody::default()
      },
      line: class.line,
    };
    emit_constructor(cx, class, &default)?;
  }

  cx.class = None;
  Ok(())
}

/// Enter a function: fix parameter offsets and emit its `FUNC` quad.
fn begin_function(
  cx: &mut Context,
  class: Option<&str>,
  name: &str,
  params: &[Param],
  line: usize,
) -> CompileResult<SymbolId> {
  let owner_scope = class.map_or_else(|| GLOBAL_SCOPE.to_string(), member_scope);
  let id = lookup(cx, &owner_scope, name)?;
  cx.function = Some(id);
  cx.scope = function_scope(class, name);
  cx.frame = FRAME_HEADER;
  cx.breaks.clear();

  for param in params {
    let ty = resolve_storage_type(cx, &param.ty, &format!("Parameter {}", param.name))?;
    let param_id = lookup(cx, &cx.scope, &param.name)?;
    cx.table.set_type(param_id, ty)?;
    cx.table.set_offset(param_id, cx.frame)?;
    cx.frame += WORD;
  }

  let label = cx.table.label(id)?;
  cx.table.ir.emit_labeled(
    line,
    Opcode::Func,
    Operand::Sym(id),
    Operand::None,
    Operand::None,
    Some(label),
  );
  Ok(id)
}

/// Leave a function, recording its frame footprint.
fn end_function(cx: &mut Context, id: SymbolId) -> CompileResult<()> {
  cx.table.set_offset(id, cx.frame)?;
  cx.function = None;
  Ok(())
}

fn this_symbol(cx: &Context) -> CompileResult<SymbolId> {
  lookup(cx, &cx.scope, "this")
}

fn emit_static_init(cx: &mut Context, class: &ClassDecl) -> CompileResult<()> {
  let id = begin_function(cx, Some(&class.name), STATIC_INIT, &[], class.line)?;
  for field in class.fields() {
    if let Some(init) = &field.init {
      emit_field_init(cx, field, init)?;
    }
  }
  cx.emit(class.line, Opcode::Rtn, Operand::None, Operand::None, Operand::None);
  end_function(cx, id)
}

fn emit_field_init(cx: &mut Context, field: &FieldDecl, init: &Expr) -> CompileResult<()> {
  let class_scope = cx
    .class_scope()?
    .ok_or_else(|| CompileError::internal("field initializer outside a class"))?;
  let field_id = lookup(cx, &class_scope, &field.name)?;
  let this = this_symbol(cx)?;
  let target = eval::field_reference(cx, this, field_id, field.line)?;
  let value = eval::eval(cx, init)?;
  eval::store(cx, &target, &value, &format!("{} = {init}", field.name), field.line)
}

fn emit_method(cx: &mut Context, class: &ClassDecl, method: &MethodDecl) -> CompileResult<()> {
  let return_type = resolve_type(cx, &method.return_type)?;
  let id = begin_function(cx, Some(&class.name), &method.name, &method.params, method.line)?;
  cx.table.set_type(id, return_type)?;
  emit_body(cx, &method.body)?;
  cx.emit(
    method.body.end_line,
    Opcode::Rtn,
    Operand::None,
    Operand::None,
    Operand::None,
  );
  end_function(cx, id)
}

fn emit_constructor(cx: &mut Context, class: &ClassDecl, ctor: &ConstructorDecl) -> CompileResult<()> {
  let id = begin_function(cx, Some(&class.name), &ctor.name, &ctor.params, ctor.line)?;
  let this = this_symbol(cx)?;
  let init = lookup(cx, &member_scope(&class.name), STATIC_INIT)?;
  cx.emit(ctor.line, Opcode::Frame, Operand::Sym(init), Operand::Sym(this), Operand::None);
  cx.emit(ctor.line, Opcode::Call, Operand::Sym(init), Operand::None, Operand::None);
  emit_body(cx, &ctor.body)?;
  cx.emit(
    ctor.body.end_line,
    Opcode::Return,
    Operand::Sym(this),
    Operand::None,
    Operand::None,
  );
  end_function(cx, id)
}

fn walk_main(cx: &mut Context, pass: Pass, program: &Program) -> CompileResult<()> {
  match pass {
    Pass::Declare => declare_locals(cx, &function_scope(None, "main"), &program.main),
    Pass::CheckEmit => {
      cx.class = None;
      let id = begin_function(cx, None, "main", &[], program.line)?;
      emit_body(cx, &program.main)?;
      cx.emit(
        program.main.end_line,
        Opcode::Rtn,
        Operand::None,
        Operand::None,
        Operand::None,
      );
      end_function(cx, id)
    }
  }
}

fn emit_body(cx: &mut Context, body: &MethodBody) -> CompileResult<()> {
  for local in &body.locals {
    let ty = resolve_storage_type(cx, &local.ty, &format!("Variable {}", local.name))?;
    let id = lookup(cx, &cx.scope, &local.name)?;
    cx.table.set_type(id, ty.clone())?;
    cx.table.set_offset(id, cx.frame)?;
    cx.frame += WORD;

    if let Some(init) = &local.init {
      let target = Value { id, ty };
      let value = eval::eval(cx, init)?;
      eval::store(cx, &target, &value, &format!("{} = {init}", local.name), local.line)?;
    }
  }

  for stmt in &body.statements {
    emit_stmt(cx, stmt)?;
  }
  Ok(())
}

fn emit_stmt(cx: &mut Context, stmt: &Stmt) -> CompileResult<()> {
  match stmt {
    Stmt::Block(body) => {
      for stmt in body {
        emit_stmt(cx, stmt)?;
      }
      Ok(())
    }
    Stmt::Expr(expr) => eval::eval(cx, expr).map(|_| ()),
    Stmt::If {
      cond,
      then_branch,
      else_branch,
    } => {
      let skip = cx.fresh_label("SKIPIF");
      let value = condition(cx, cond, "If")?;
      cx.emit(
        cond.line,
        Opcode::Bf,
        Operand::Sym(value.id),
        Operand::label(&skip),
        Operand::None,
      );
      emit_stmt(cx, then_branch)?;
      match else_branch {
        Some(else_branch) => {
          let end = cx.fresh_label("SKIPELSE");
          cx.emit(cond.line, Opcode::Jmp, Operand::label(&end), Operand::None, Operand::None);
          cx.table.ir.place_label(&skip);
          emit_stmt(cx, else_branch)?;
          cx.table.ir.place_label(&end);
        }
        None => cx.table.ir.place_label(&skip),
      }
      Ok(())
    }
    Stmt::While { cond, body } => {
      let begin = cx.fresh_label("BEGIN");
      let end = cx.fresh_label("ENDWHILE");
      cx.table.ir.place_label(&begin);
      let value = condition(cx, cond, "While")?;
      cx.emit(
        cond.line,
        Opcode::Bf,
        Operand::Sym(value.id),
        Operand::label(&end),
        Operand::None,
      );
      cx.breaks.push(end.clone());
      emit_stmt(cx, body)?;
      cx.breaks.pop();
      cx.emit(cond.line, Opcode::Jmp, Operand::label(&begin), Operand::None, Operand::None);
      cx.table.ir.place_label(&end);
      Ok(())
    }
    Stmt::Return { value, line } => emit_return(cx, value.as_ref(), *line),
    Stmt::Cout(expr) => {
      let value = eval::eval(cx, expr)?;
      let op = match value.ty {
        Type::Char => Opcode::Wrtc,
        Type::Int => Opcode::Wrti,
        Type::Bool => Opcode::Write,
        _ => {
          return Err(CompileError::semantic(
            expr.line,
            format!("cout cannot write {} ({expr})", value.ty),
          ));
        }
      };
      cx.emit(expr.line, op, Operand::Sym(value.id), Operand::None, Operand::None);
      Ok(())
    }
    Stmt::Cin(expr) => {
      let value = eval::eval(cx, expr)?;
      let op = match value.ty {
        Type::Char => Opcode::Rdc,
        Type::Int => Opcode::Rdi,
        _ => {
          return Err(CompileError::semantic(
            expr.line,
            format!("cin cannot read {} ({expr})", value.ty),
          ));
        }
      };
      if !cx.table.get(value.id)?.is_assignable() {
        return Err(CompileError::semantic(
          expr.line,
          format!("cin needs a variable, found {expr}"),
        ));
      }
      cx.emit(expr.line, op, Operand::Sym(value.id), Operand::None, Operand::None);
      Ok(())
    }
    Stmt::Switch {
      scrutinee,
      cases,
      default,
      line,
    } => emit_switch(cx, scrutinee, cases, default.as_deref(), *line),
    Stmt::Break { line } => {
      let Some(target) = cx.breaks.last().cloned() else {
        return Err(CompileError::semantic(
          *line,
          "break outside of a loop or switch",
        ));
      };
      cx.emit(*line, Opcode::Jmp, Operand::label(target), Operand::None, Operand::None);
      Ok(())
    }
  }
}

fn condition(cx: &mut Context, cond: &Expr, what: &str) -> CompileResult<Value> {
  let value = eval::eval(cx, cond)?;
  if value.ty != Type::Bool {
    return Err(CompileError::semantic(
      cond.line,
      format!("{what} requires bool, found {} ({cond})", value.ty),
    ));
  }
  Ok(value)
}

fn emit_return(cx: &mut Context, value: Option<&Expr>, line: usize) -> CompileResult<()> {
  let function = cx
    .function
    .ok_or_else(|| CompileError::internal("return outside of a function"))?;
  let symbol = cx.table.get(function)?;
  let is_constructor = symbol.kind == SymbolKind::Constructor;
  let expected = if is_constructor {
    Type::Void
  } else {
    symbol.return_type.clone().unwrap_or(Type::Void)
  };

  match value {
    None if expected == Type::Void => {
      if is_constructor {
        let this = this_symbol(cx)?;
        cx.emit(line, Opcode::Return, Operand::Sym(this), Operand::None, Operand::None);
      } else {
        cx.emit(line, Opcode::Rtn, Operand::None, Operand::None, Operand::None);
      }
      Ok(())
    }
    None => Err(CompileError::semantic(
      line,
      format!("Return requires a value of type {expected}"),
    )),
    Some(expr) => {
      let result = eval::eval(cx, expr)?;
      if expected == Type::Void || !expected.accepts(&result.ty) {
        return Err(CompileError::semantic(
          line,
          format!(
            "Return type {} does not match {expected} ({expr})",
            result.ty
          ),
        ));
      }
      cx.emit(line, Opcode::Return, Operand::Sym(result.id), Operand::None, Operand::None);
      Ok(())
    }
  }
}

/// Cases fall through into the next body unless they `break`.
fn emit_switch(
  cx: &mut Context,
  scrutinee: &Expr,
  cases: &[Case],
  default: Option<&Stmt>,
  line: usize,
) -> CompileResult<()> {
  let value = eval::eval(cx, scrutinee)?;
  let end = cx.fresh_label("ENDSWITCH");
  cx.breaks.push(end.clone());

  let mut pending_test: Option<String> = None;
  let mut pending_body: Option<String> = None;
  for case in cases {
    if let Some(test) = pending_test.take() {
      cx.table.ir.place_label(&test);
    }
    let label = eval::eval(cx, &case.label)?;
    let matched = cx.slot(SymbolKind::TempVar, Type::Bool);
    cx.emit(
      case.label.line,
      Opcode::Eq,
      Operand::Sym(value.id),
      Operand::Sym(label.id),
      Operand::Sym(matched),
    );
    let next_test = cx.fresh_label("CASE");
    cx.emit(
      case.label.line,
      Opcode::Bf,
      Operand::Sym(matched),
      Operand::label(&next_test),
      Operand::None,
    );
    if let Some(body) = pending_body.take() {
      cx.table.ir.place_label(&body);
    }
    emit_stmt(cx, &case.body)?;
    let next_body = cx.fresh_label("BODY");
    cx.emit(line, Opcode::Jmp, Operand::label(&next_body), Operand::None, Operand::None);
    pending_test = Some(next_test);
    pending_body = Some(next_body);
  }

  for label in [pending_test, pending_body].into_iter().flatten() {
    cx.table.ir.place_label(&label);
  }
  if let Some(default) = default {
    emit_stmt(cx, default)?;
  }
  cx.breaks.pop();
  cx.table.ir.place_label(&end);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;

  fn analyze_source(source: &str) -> CompileResult<SymbolTable> {
    analyze(&parse(tokenize(source)?)?)
  }

  #[test]
  fn declare_pass_computes_field_offsets_and_class_size() {
    let table = analyze_source(
      "class P { public int x; public int y; private char c; }\nvoid kxi2019 main() { }",
    )
    .unwrap();
    let class = table.class_named("P").unwrap();
    assert_eq!(table.get(class).unwrap().offset, 12);
    let y = table.search("g.P", "y").unwrap();
    assert_eq!(table.get(y).unwrap().offset, 4);
    let c = table.search("g.P", "c").unwrap();
    assert_eq!(table.get(c).unwrap().access, Access::Private);
  }

  #[test]
  fn duplicate_member_is_rejected_before_any_ir() {
    let err = analyze_source(
      "class P { public int x; public bool x; }\nvoid kxi2019 main() { }",
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "1: Duplicate declaration of x");
  }

  #[test]
  fn parameters_and_locals_get_frame_offsets() {
    let table = analyze_source(
      "class A {\n public int f(int a, char b) { int c; c = a; return c; }\n}\nvoid kxi2019 main() { }",
    )
    .unwrap();
    let offset = |name: &str| table.get(table.search("g.A.f", name).unwrap()).unwrap().offset;
    assert_eq!(offset("this"), 8);
    assert_eq!(offset("a"), 12);
    assert_eq!(offset("b"), 16);
    assert_eq!(offset("c"), 20);
    let f = table.search("g.A", "f").unwrap();
    assert_eq!(table.get(f).unwrap().params.len(), 2);
    assert!(table.get(f).unwrap().offset >= 24);
  }

  #[test]
  fn default_constructor_is_synthesized() {
    let table = analyze_source("class A { }\nvoid kxi2019 main() { A a; a = new A(); }").unwrap();
    let ctor = table.search("g.A", "A").unwrap();
    assert_eq!(table.get(ctor).unwrap().kind, SymbolKind::Constructor);
  }

  #[test]
  fn unknown_type_is_reported() {
    let err = analyze_source("void kxi2019 main() { Dog d; }").unwrap_err();
    assert_eq!(err.to_string(), "1: Type Dog not defined");
  }

  #[test]
  fn conditions_must_be_bool() {
    let err = analyze_source("void kxi2019 main() { int x; if (x) x = 1; }").unwrap_err();
    assert!(err.to_string().contains("If requires bool"));
    let err = analyze_source("void kxi2019 main() { while (1 + 2) { } }").unwrap_err();
    assert!(err.to_string().contains("While requires bool"));
  }

  #[test]
  fn return_type_must_match() {
    let err = analyze_source("class A { public int f() { return 'c'; } }\nvoid kxi2019 main() { }")
      .unwrap_err();
    assert!(err.to_string().contains("does not match int"));
    let err =
      analyze_source("class A { public int f() { return; } }\nvoid kxi2019 main() { }").unwrap_err();
    assert!(err.to_string().contains("requires a value"));
    let err = analyze_source("void kxi2019 main() { return 1; }").unwrap_err();
    assert!(err.to_string().contains("does not match void"));
  }

  #[test]
  fn io_statements_check_types() {
    let err = analyze_source("class A { }\nvoid kxi2019 main() { A a; cout << a; }").unwrap_err();
    assert!(err.to_string().contains("cout cannot write A"));
    let err = analyze_source("void kxi2019 main() { cin >> 5; }").unwrap_err();
    assert!(err.to_string().contains("cin needs a variable"));
    let err = analyze_source("void kxi2019 main() { bool b; cin >> b; }").unwrap_err();
    assert!(err.to_string().contains("cin cannot read bool"));
  }

  #[test]
  fn break_needs_an_enclosing_loop() {
    let err = analyze_source("void kxi2019 main() { break; }").unwrap_err();
    assert!(err.to_string().contains("break outside"));
  }

  #[test]
  fn switch_leaves_no_dangling_labels() {
    let table = analyze_source(
      "void kxi2019 main() { int x; switch (x) { case 1: x = 2; case 2: break; default: x = 0; } }",
    )
    .unwrap();
    assert!(table.ir.dangling_labels().is_empty());
    let eqs = table
      .ir
      .quads()
      .iter()
      .filter(|quad| quad.op == Opcode::Eq)
      .count();
    assert_eq!(eqs, 2);
  }
}
