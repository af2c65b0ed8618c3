//! Operator-precedence expression builder.
//!
//! Two explicit stacks: operands hold finished sub-trees, operators hold
//! pending binary operators and open groups. Pushing an operator reduces
//! every stacked operator of equal or higher precedence first; groups
//! (parentheses, call argument lists, index brackets) are never reduced
//! implicitly and only disappear when their closer arrives.

use crate::ast::{BinaryOp, Conversion, Expr, ExprKind, TypeName};
use crate::error::{CompileError, CompileResult};

/// What an open `(` or `[` on the operator stack will become once closed.
#[derive(Debug, Clone)]
pub enum Group {
  Paren,
  Call {
    name: String,
    object: Option<Box<Expr>>,
  },
  Index {
    name: String,
    object: Option<Box<Expr>>,
  },
  NewObject {
    class: String,
  },
  NewArray {
    element: TypeName,
  },
  Convert(Conversion),
}

impl Group {
  pub fn closer(&self) -> &'static str {
    match self {
      Group::Index { .. } | Group::NewArray { .. } => "]",
      _ => ")",
    }
  }

  /// Groups whose contents are a comma separated argument list.
  pub fn takes_arguments(&self) -> bool {
    matches!(self, Group::Call { .. } | Group::NewObject { .. })
  }
}

#[derive(Debug)]
enum Operator {
  Binary { op: BinaryOp, line: usize },
  Assign { line: usize },
  Open { group: Group, line: usize, base: usize },
}

#[derive(Debug, Default)]
pub struct ShuntingYard {
  operands: Vec<Expr>,
  operators: Vec<Operator>,
}

impl ShuntingYard {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push_operand(&mut self, expr: Expr) {
    self.operands.push(expr);
  }

  /// Take back the most recent operand, e.g. the receiver of a `.member`.
  pub fn pop_operand(&mut self) -> CompileResult<Expr> {
    self
      .operands
      .pop()
      .ok_or_else(|| CompileError::internal("operand stack is empty"))
  }

  pub fn push_binary(&mut self, op: BinaryOp, line: usize) -> CompileResult<()> {
    while let Some(top) = self.operators.last() {
      let reducible = match top {
        Operator::Binary { op: pending, .. } => pending.precedence() >= op.precedence(),
        Operator::Assign { .. } | Operator::Open { .. } => false,
      };
      if !reducible {
        break;
      }
      self.reduce_top()?;
    }
    self.operators.push(Operator::Binary { op, line });
    Ok(())
  }

  /// `=` may only start on an empty operator stack.
  pub fn push_assign(&mut self, line: usize) -> CompileResult<()> {
    if !self.operators.is_empty() {
      return Err(CompileError::semantic(
        line,
        "Assignment cannot be nested inside another expression",
      ));
    }
    self.operators.push(Operator::Assign { line });
    Ok(())
  }

  pub fn open(&mut self, group: Group, line: usize) {
    let base = self.operands.len();
    self.operators.push(Operator::Open { group, line, base });
  }

  /// The innermost group still waiting for its closer.
  pub fn innermost_group(&self) -> Option<&Group> {
    self.operators.iter().rev().find_map(|operator| match operator {
      Operator::Open { group, .. } => Some(group),
      _ => None,
    })
  }

  /// Number of finished operands inside the innermost group.
  pub fn operands_in_group(&self) -> usize {
    let base = self
      .operators
      .iter()
      .rev()
      .find_map(|operator| match operator {
        Operator::Open { base, .. } => Some(*base),
        _ => None,
      })
      .unwrap_or(0);
    self.operands.len() - base
  }

  /// A `,` inside an argument list: finish the current argument.
  pub fn next_argument(&mut self) -> CompileResult<()> {
    self.reduce_to_open()
  }

  /// Close the innermost group and replace its contents with one operand.
  pub fn close(&mut self) -> CompileResult<()> {
    self.reduce_to_open()?;
    let Some(Operator::Open { group, line, base }) = self.operators.pop() else {
      return Err(CompileError::internal("closing a group that was never opened"));
    };
    let mut inner = self.operands.split_off(base);

    let kind = match group {
      Group::Paren => {
        let expr = single(&mut inner, line, ")")?;
        self.operands.push(expr);
        return Ok(());
      }
      Group::Call { name, object: None } => ExprKind::Call { name, args: inner },
      Group::Call {
        name,
        object: Some(object),
      } => ExprKind::MethodCall {
        object,
        name,
        args: inner,
      },
      Group::Index { name, object } => {
        let index = Box::new(single(&mut inner, line, "]")?);
        match object {
          None => ExprKind::Index { name, index },
          Some(object) => ExprKind::MemberIndex {
            object,
            name,
            index,
          },
        }
      }
      Group::NewObject { class } => ExprKind::NewObject { class, args: inner },
      Group::NewArray { element } => ExprKind::NewArray {
        element,
        size: Box::new(single(&mut inner, line, "]")?),
      },
      Group::Convert(kind) => ExprKind::Convert {
        kind,
        operand: Box::new(single(&mut inner, line, ")")?),
      },
    };
    self.operands.push(Expr::new(kind, line));
    Ok(())
  }

  /// Reduce everything left; both stacks are empty afterwards.
  pub fn finish(mut self) -> CompileResult<Expr> {
    while let Some(top) = self.operators.last() {
      if let Operator::Open { group, .. } = top {
        return Err(CompileError::internal(format!(
          "expression finished with an open group awaiting {}",
          group.closer()
        )));
      }
      self.reduce_top()?;
    }
    let expr = self.pop_operand()?;
    if !self.operands.is_empty() {
      return Err(CompileError::internal(format!(
        "{} operands left after reducing an expression",
        self.operands.len()
      )));
    }
    Ok(expr)
  }

  fn reduce_to_open(&mut self) -> CompileResult<()> {
    loop {
      match self.operators.last() {
        Some(Operator::Open { .. }) => return Ok(()),
        Some(_) => self.reduce_top()?,
        None => return Err(CompileError::internal("no open group to reduce to")),
      }
    }
  }

  fn reduce_top(&mut self) -> CompileResult<()> {
    let operator = self
      .operators
      .pop()
      .ok_or_else(|| CompileError::internal("operator stack is empty"))?;
    let rhs = self.pop_operand()?;
    let lhs = self.pop_operand()?;
    let expr = match operator {
      Operator::Binary { op, line } => Expr::binary(op, lhs, rhs, line),
      Operator::Assign { line } => Expr::assign(lhs, rhs, line),
      Operator::Open { .. } => {
        return Err(CompileError::internal("tried to reduce an open group"));
      }
    };
    self.operands.push(expr);
    Ok(())
  }
}

fn single(inner: &mut Vec<Expr>, line: usize, closer: &str) -> CompileResult<Expr> {
  match (inner.pop(), inner.is_empty()) {
    (Some(expr), true) => Ok(expr),
    (None, _) => Err(CompileError::syntax(line, closer, "expression")),
    (Some(_), false) => Err(CompileError::internal("group holds more than one operand")),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn num(text: &str) -> Expr {
    Expr::new(ExprKind::Number(text.to_string()), 1)
  }

  #[test]
  fn multiplication_binds_tighter() {
    let mut sy = ShuntingYard::new();
    sy.push_operand(num("3"));
    sy.push_binary(BinaryOp::Add, 1).unwrap();
    sy.push_operand(num("4"));
    sy.push_binary(BinaryOp::Mul, 1).unwrap();
    sy.push_operand(num("2"));
    let expr = sy.finish().unwrap();
    assert_eq!(expr.to_string(), "3 + 4 * 2");
    let ExprKind::Binary { op, rhs, .. } = expr.kind else {
      panic!("expected a binary node");
    };
    assert_eq!(op, BinaryOp::Add);
    assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
  }

  #[test]
  fn equal_precedence_is_left_associative() {
    let mut sy = ShuntingYard::new();
    sy.push_operand(num("8"));
    sy.push_binary(BinaryOp::Sub, 1).unwrap();
    sy.push_operand(num("2"));
    sy.push_binary(BinaryOp::Sub, 1).unwrap();
    sy.push_operand(num("1"));
    let expr = sy.finish().unwrap();
    let ExprKind::Binary { lhs, .. } = expr.kind else {
      panic!("expected a binary node");
    };
    assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Sub, .. }));
  }

  #[test]
  fn parentheses_are_not_reduced_early() {
    let mut sy = ShuntingYard::new();
    sy.open(Group::Paren, 1);
    sy.push_operand(num("1"));
    sy.push_binary(BinaryOp::Add, 1).unwrap();
    sy.push_operand(num("2"));
    sy.close().unwrap();
    sy.push_binary(BinaryOp::Mul, 1).unwrap();
    sy.push_operand(num("3"));
    let expr = sy.finish().unwrap();
    assert_eq!(expr.to_string(), "(1 + 2) * 3");
  }

  #[test]
  fn nested_assignment_is_rejected() {
    let mut sy = ShuntingYard::new();
    sy.push_operand(num("1"));
    sy.push_binary(BinaryOp::Add, 1).unwrap();
    assert!(matches!(
      sy.push_assign(1),
      Err(CompileError::Semantic { .. })
    ));
  }

  #[test]
  fn call_arguments_are_collected() {
    let mut sy = ShuntingYard::new();
    sy.open(
      Group::Call {
        name: "f".to_string(),
        object: None,
      },
      1,
    );
    sy.push_operand(num("1"));
    sy.next_argument().unwrap();
    sy.push_operand(num("2"));
    sy.push_binary(BinaryOp::Add, 1).unwrap();
    sy.push_operand(num("3"));
    assert_eq!(sy.operands_in_group(), 3);
    sy.close().unwrap();
    let expr = sy.finish().unwrap();
    assert_eq!(expr.to_string(), "f(1, 2 + 3)");
  }

  #[test]
  fn finishing_inside_a_group_is_internal() {
    let mut sy = ShuntingYard::new();
    sy.open(Group::Paren, 4);
    sy.push_operand(num("1"));
    let err = sy.finish().unwrap_err();
    assert!(matches!(err, CompileError::Internal { .. }));
  }
}
