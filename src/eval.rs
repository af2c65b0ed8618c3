//! Type checking and lowering of expression trees.
//!
//! Children are lowered before their parent, so the quads of an operand
//! always precede the quad that consumes it. Every intermediate result lives
//! in a fresh frame slot: a `TempVar` for computed values, a `Reference` for
//! the address of a field or array element.

use crate::analyzer::{Context, member_scope, resolve_type};
use crate::ast::{Access, BinaryOp, Conversion, Expr, ExprKind};
use crate::error::{CompileError, CompileResult};
use crate::ir::{Opcode, Operand};
use crate::symtab::{SymbolId, SymbolKind};
use crate::tokenizer::char_value;
use crate::ty::{Type, signature};

/// A lowered expression: the symbol holding its value and its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
  pub id: SymbolId,
  pub ty: Type,
}

pub fn eval(cx: &mut Context, expr: &Expr) -> CompileResult<Value> {
  let line = expr.line;
  match &expr.kind {
    ExprKind::Number(text) => {
      if text.parse::<i32>().is_err() {
        return Err(CompileError::semantic(
          line,
          format!("Integer literal {text} out of range"),
        ));
      }
      Ok(Value {
        id: cx.table.int_literal(text),
        ty: Type::Int,
      })
    }
    ExprKind::Character(lexeme) => {
      if char_value(lexeme).is_none() {
        return Err(CompileError::semantic(
          line,
          format!("Invalid character literal {lexeme}"),
        ));
      }
      Ok(Value {
        id: cx.table.char_literal(lexeme),
        ty: Type::Char,
      })
    }
    ExprKind::Bool(value) => Ok(Value {
      id: if *value {
        cx.table.sentinels.true_
      } else {
        cx.table.sentinels.false_
      },
      ty: Type::Bool,
    }),
    ExprKind::Null => Ok(Value {
      id: cx.table.sentinels.null,
      ty: Type::Null,
    }),
    ExprKind::This => this_value(cx, line),
    ExprKind::Ident(name) => variable(cx, name, line),
    ExprKind::Call { name, args } => {
      let values = eval_all(cx, args)?;
      let Ok(this) = this_value(cx, line) else {
        return Err(CompileError::semantic(
          line,
          format!("Function {name}{} not defined", arg_signature(&values)),
        ));
      };
      call(cx, &this, name, values, SymbolKind::Method, true, line)
    }
    ExprKind::Index { name, index } => {
      let array = variable(cx, name, line)?;
      element(cx, &array, index, expr, line)
    }
    ExprKind::Member { object, name } => {
      let internal = matches!(object.kind, ExprKind::This);
      let object = eval(cx, object)?;
      member_field(cx, &object, name, internal, line)
    }
    ExprKind::MethodCall { object, name, args } => {
      let internal = matches!(object.kind, ExprKind::This);
      let object = eval(cx, object)?;
      let values = eval_all(cx, args)?;
      call(cx, &object, name, values, SymbolKind::Method, internal, line)
    }
    ExprKind::MemberIndex {
      object,
      name,
      index,
    } => {
      let internal = matches!(object.kind, ExprKind::This);
      let object = eval(cx, object)?;
      let array = member_field(cx, &object, name, internal, line)?;
      element(cx, &array, index, expr, line)
    }
    ExprKind::NewObject { class, args } => new_object(cx, class, args, line),
    ExprKind::NewArray { element, size } => {
      let element_ty = resolve_type(cx, element)?;
      if element_ty == Type::Void || element_ty.is_array() {
        return Err(CompileError::semantic(
          line,
          format!("Cannot allocate an array of {element_ty}"),
        ));
      }
      let count = eval(cx, size)?;
      if count.ty != Type::Int {
        return Err(CompileError::semantic(
          line,
          format!("Array size must be int, found {} in {expr}", count.ty),
        ));
      }
      let unit = match element_ty.element_size() {
        1 => cx.table.sentinels.byte_size,
        _ => cx.table.sentinels.word_size,
      };
      let bytes = cx.slot(SymbolKind::TempVar, Type::Int);
      cx.emit(
        line,
        Opcode::Mul,
        Operand::Sym(count.id),
        Operand::Sym(unit),
        Operand::Sym(bytes),
      );
      let ty = Type::array_of(element_ty);
      let array = cx.slot(SymbolKind::TempVar, ty.clone());
      cx.emit(line, Opcode::New, Operand::Sym(bytes), Operand::None, Operand::Sym(array));
      Ok(Value { id: array, ty })
    }
    ExprKind::Convert { kind, operand } => {
      let value = eval(cx, operand)?;
      let (from, to, op) = match kind {
        Conversion::Itoa => (Type::Int, Type::Char, Opcode::Itoa),
        Conversion::Atoi => (Type::Char, Type::Int, Opcode::Atoi),
      };
      if value.ty != from {
        return Err(CompileError::semantic(
          line,
          format!("{expr} needs {from}, found {}", value.ty),
        ));
      }
      let result = cx.slot(SymbolKind::TempVar, to.clone());
      cx.emit(line, op, Operand::Sym(value.id), Operand::None, Operand::Sym(result));
      Ok(Value { id: result, ty: to })
    }
    ExprKind::Binary { op, lhs, rhs } => {
      let left = eval(cx, lhs)?;
      let right = eval(cx, rhs)?;
      let Some(ty) = binary_type(*op, &left.ty, &right.ty) else {
        return Err(CompileError::semantic(
          line,
          format!(
            "Invalid operation {} {} {} in {expr}",
            left.ty,
            op.lexeme(),
            right.ty
          ),
        ));
      };
      let result = cx.slot(SymbolKind::TempVar, ty.clone());
      cx.emit(
        line,
        opcode(*op),
        Operand::Sym(left.id),
        Operand::Sym(right.id),
        Operand::Sym(result),
      );
      Ok(Value { id: result, ty })
    }
    ExprKind::Assign { target, value } => {
      let target = eval(cx, target)?;
      let value = eval(cx, value)?;
      store(cx, &target, &value, &expr.to_string(), line)?;
      Ok(target)
    }
  }
}

/// Check an assignment and emit its `MOV`.
pub fn store(
  cx: &mut Context,
  target: &Value,
  value: &Value,
  text: &str,
  line: usize,
) -> CompileResult<()> {
  if !cx.table.get(target.id)?.is_assignable() {
    return Err(CompileError::semantic(
      line,
      format!("Left side of {text} is not assignable"),
    ));
  }
  if !target.ty.accepts(&value.ty) {
    return Err(CompileError::semantic(
      line,
      format!("Cannot assign {} to {} in {text}", value.ty, target.ty),
    ));
  }
  cx.emit(
    line,
    Opcode::Mov,
    Operand::Sym(target.id),
    Operand::Sym(value.id),
    Operand::None,
  );
  Ok(())
}

/// Address of `field` inside the object held by `object`.
pub fn field_reference(
  cx: &mut Context,
  object: SymbolId,
  field: SymbolId,
  line: usize,
) -> CompileResult<Value> {
  let ty = cx.table.get(field)?.ty.clone();
  let reference = cx.slot(SymbolKind::Reference, ty.clone());
  cx.emit(
    line,
    Opcode::Ref,
    Operand::Sym(object),
    Operand::Sym(field),
    Operand::Sym(reference),
  );
  Ok(Value { id: reference, ty })
}

fn eval_all(cx: &mut Context, args: &[Expr]) -> CompileResult<Vec<Value>> {
  args.iter().map(|arg| eval(cx, arg)).collect()
}

fn arg_signature(values: &[Value]) -> String {
  signature(values.iter().map(|value| &value.ty))
}

fn this_value(cx: &Context, line: usize) -> CompileResult<Value> {
  let Some(id) = cx.table.search(&cx.scope, "this") else {
    return Err(CompileError::semantic(line, "this is only available inside a class"));
  };
  Ok(Value {
    id,
    ty: cx.table.get(id)?.ty.clone(),
  })
}

/// Locals and parameters first, then fields of the enclosing class.
fn variable(cx: &mut Context, name: &str, line: usize) -> CompileResult<Value> {
  if let Some(id) = cx.table.search(&cx.scope, name) {
    return Ok(Value {
      id,
      ty: cx.table.get(id)?.ty.clone(),
    });
  }
  if let Some(class_scope) = cx.class_scope()?
    && let Some(field) = cx.table.search(&class_scope, name)
    && cx.table.get(field)?.kind == SymbolKind::InstanceVar
  {
    let this = this_value(cx, line)?;
    return field_reference(cx, this.id, field, line);
  }
  Err(CompileError::semantic(
    line,
    format!("Variable {name} not defined"),
  ))
}

/// Look up a member of the object's class, honoring access modifiers.
fn member(
  cx: &Context,
  object: &Value,
  name: &str,
  kind: SymbolKind,
  internal: bool,
) -> Option<SymbolId> {
  let class = cx.table.class_of(object.id)?;
  let class = cx.table.get(class).ok()?;
  let id = cx.table.search(&member_scope(&class.name), name)?;
  let symbol = cx.table.get(id).ok()?;
  let visible = internal || symbol.access == Access::Public;
  (symbol.kind == kind && visible).then_some(id)
}

fn member_field(
  cx: &mut Context,
  object: &Value,
  name: &str,
  internal: bool,
  line: usize,
) -> CompileResult<Value> {
  let Some(field) = member(cx, object, name, SymbolKind::InstanceVar, internal) else {
    return Err(CompileError::semantic(
      line,
      format!("Variable {name} not defined in class {}", object.ty),
    ));
  };
  field_reference(cx, object.id, field, line)
}

fn element(
  cx: &mut Context,
  array: &Value,
  index: &Expr,
  expr: &Expr,
  line: usize,
) -> CompileResult<Value> {
  let Some(element_ty) = array.ty.element().cloned() else {
    return Err(CompileError::semantic(
      line,
      format!("{expr} indexes {}, which is not an array", array.ty),
    ));
  };
  let position = eval(cx, index)?;
  if position.ty != Type::Int {
    return Err(CompileError::semantic(
      line,
      format!("Array index must be int, found {} in {expr}", position.ty),
    ));
  }
  let reference = cx.slot(SymbolKind::Reference, element_ty.clone());
  cx.emit(
    line,
    Opcode::Aef,
    Operand::Sym(array.id),
    Operand::Sym(position.id),
    Operand::Sym(reference),
  );
  Ok(Value {
    id: reference,
    ty: element_ty,
  })
}

/// Call sites match a declaration when the canonical `(T1,T2,...)`
/// spellings are identical.
fn arguments_match(cx: &Context, function: SymbolId, values: &[Value]) -> CompileResult<bool> {
  let mut declared = Vec::new();
  for param in &cx.table.get(function)?.params {
    declared.push(&cx.table.get(*param)?.ty);
  }
  Ok(signature(declared) == arg_signature(values))
}

/// Emit the `FRAME`, `PUSH`, `CALL`, `PEEK` sequence for a method or
/// constructor invoked on `receiver`.
fn call(
  cx: &mut Context,
  receiver: &Value,
  name: &str,
  args: Vec<Value>,
  kind: SymbolKind,
  internal: bool,
  line: usize,
) -> CompileResult<Value> {
  let function = match member(cx, receiver, name, kind, internal) {
    Some(function) if arguments_match(cx, function, &args)? => function,
    _ => {
      let what = match kind {
        SymbolKind::Constructor => "Constructor",
        _ => "Function",
      };
      return Err(CompileError::semantic(
        line,
        format!(
          "{what} {name}{} not defined in class {}",
          arg_signature(&args),
          receiver.ty
        ),
      ));
    }
  };

  cx.emit(
    line,
    Opcode::Frame,
    Operand::Sym(function),
    Operand::Sym(receiver.id),
    Operand::None,
  );
  for arg in &args {
    cx.emit(line, Opcode::Push, Operand::Sym(arg.id), Operand::None, Operand::None);
  }
  cx.emit(line, Opcode::Call, Operand::Sym(function), Operand::None, Operand::None);

  let returns = cx
    .table
    .get(function)?
    .return_type
    .clone()
    .unwrap_or(Type::Void);
  if returns == Type::Void {
    return Ok(Value {
      id: cx.table.sentinels.null,
      ty: Type::Void,
    });
  }
  let result = cx.slot(SymbolKind::TempVar, returns.clone());
  cx.emit(line, Opcode::Peek, Operand::Sym(result), Operand::None, Operand::None);
  Ok(Value {
    id: result,
    ty: returns,
  })
}

fn new_object(cx: &mut Context, class: &str, args: &[Expr], line: usize) -> CompileResult<Value> {
  let Some(class_id) = cx.table.class_named(class) else {
    return Err(CompileError::semantic(
      line,
      format!("Type {class} not defined"),
    ));
  };
  let values = eval_all(cx, args)?;
  let ty = Type::Class(class.to_string());
  let size = cx.table.get(class_id)?.offset;
  let object = cx.slot(SymbolKind::TempVar, ty.clone());
  cx.emit(line, Opcode::Newi, Operand::Imm(size), Operand::None, Operand::Sym(object));
  let receiver = Value { id: object, ty };
  call(cx, &receiver, class, values, SymbolKind::Constructor, true, line)
}

fn binary_type(op: BinaryOp, lhs: &Type, rhs: &Type) -> Option<Type> {
  use BinaryOp::*;
  match op {
    Mul | Div | Add | Sub => (*lhs == Type::Int && *rhs == Type::Int).then_some(Type::Int),
    Lt | Le | Gt | Ge => {
      let ordered = lhs == rhs && matches!(lhs, Type::Int | Type::Char);
      ordered.then_some(Type::Bool)
    }
    Eq | Ne => {
      let valued = *lhs != Type::Void && *rhs != Type::Void;
      let comparable = valued && (lhs.accepts(rhs) || rhs.accepts(lhs));
      comparable.then_some(Type::Bool)
    }
    And | Or => (*lhs == Type::Bool && *rhs == Type::Bool).then_some(Type::Bool),
  }
}

fn opcode(op: BinaryOp) -> Opcode {
  match op {
    BinaryOp::Mul => Opcode::Mul,
    BinaryOp::Div => Opcode::Div,
    BinaryOp::Add => Opcode::Add,
    BinaryOp::Sub => Opcode::Sub,
    BinaryOp::Lt => Opcode::Lt,
    BinaryOp::Le => Opcode::Le,
    BinaryOp::Gt => Opcode::Gt,
    BinaryOp::Ge => Opcode::Ge,
    BinaryOp::Eq => Opcode::Eq,
    BinaryOp::Ne => Opcode::Ne,
    BinaryOp::And => Opcode::And,
    BinaryOp::Or => Opcode::Or,
  }
}
