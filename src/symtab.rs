//! Symbol table: the permanent, append-only record of every declared and
//! synthesized symbol in a compilation unit, plus the IR list built from
//! them.
//!
//! Ids start at 100 and grow by one per symbol. Named symbols are indexed by
//! `(scope, name)`; that pair is unique.

use std::collections::HashMap;
use std::fmt;

use crate::ast::Access;
use crate::error::{CompileError, CompileResult};
use crate::ir::{IrList, Opcode, Operand};
use crate::ty::Type;

pub const FIRST_SYMBOL_ID: usize = 100;
pub const GLOBAL_SCOPE: &str = "g";

pub type SymbolId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
  Class,
  Method,
  Constructor,
  InstanceVar,
  Param,
  LocalVar,
  TempVar,
  IntLiteral,
  CharLiteral,
  BoolLiteral,
  NullLiteral,
  Reference,
}

impl SymbolKind {
  /// Letter that prefixes the id in the symbol's canonical label.
  pub fn prefix(self) -> char {
    match self {
      Self::Class => 'C',
      Self::Method => 'M',
      Self::Constructor => 'X',
      Self::InstanceVar => 'V',
      Self::Param => 'P',
      Self::LocalVar => 'L',
      Self::TempVar => 'T',
      Self::IntLiteral => 'N',
      Self::CharLiteral => 'H',
      Self::BoolLiteral => 'B',
      Self::NullLiteral => 'Z',
      Self::Reference => 'R',
    }
  }

  /// Lives in a slot of the current activation record.
  pub fn is_frame_slot(self) -> bool {
    matches!(
      self,
      Self::Param | Self::LocalVar | Self::TempVar | Self::Reference
    )
  }

  pub fn is_function(self) -> bool {
    matches!(self, Self::Method | Self::Constructor)
  }
}

impl fmt::Display for SymbolKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(self, f)
  }
}

#[derive(Debug, Clone)]
pub struct Symbol {
  pub id: SymbolId,
  pub scope: String,
  pub name: String,
  pub kind: SymbolKind,
  pub ty: Type,
  pub return_type: Option<Type>,
  pub params: Vec<SymbolId>,
  pub access: Access,
  /// Frame offset for slots, field offset for instance variables, instance
  /// size for classes, frame size for functions.
  pub offset: i32,
}

impl Symbol {
  pub fn new(scope: impl Into<String>, name: impl Into<String>, kind: SymbolKind, ty: Type) -> Self {
    Self {
      id: 0,
      scope: scope.into(),
      name: name.into(),
      kind,
      ty,
      return_type: None,
      params: Vec::new(),
      access: Access::Public,
      offset: 0,
    }
  }

  pub fn returning(mut self, ty: Type) -> Self {
    self.return_type = Some(ty);
    self
  }

  pub fn with_access(mut self, access: Access) -> Self {
    self.access = access;
    self
  }

  pub fn at_offset(mut self, offset: i32) -> Self {
    self.offset = offset;
    self
  }

  /// Canonical assembly label, e.g. `L104`.
  pub fn label(&self) -> String {
    format!("{}{}", self.kind.prefix(), self.id)
  }

  /// Storage a program may assign to.
  pub fn is_assignable(&self) -> bool {
    match self.kind {
      SymbolKind::LocalVar | SymbolKind::Reference => true,
      SymbolKind::Param => self.name != "this",
      _ => false,
    }
  }
}

/// Ids of the symbols every table starts with.
#[derive(Debug, Clone, Copy)]
pub struct Sentinels {
  pub null: SymbolId,
  pub true_: SymbolId,
  pub false_: SymbolId,
  pub byte_size: SymbolId,
  pub word_size: SymbolId,
  pub main: SymbolId,
}

#[derive(Debug)]
pub struct SymbolTable {
  symbols: Vec<Symbol>,
  index: HashMap<(String, String), SymbolId>,
  pub ir: IrList,
  pub sentinels: Sentinels,
}

impl Default for SymbolTable {
  fn default() -> Self {
    Self::new()
  }
}

impl SymbolTable {
  pub fn new() -> Self {
    let mut table = Self {
      symbols: Vec::new(),
      index: HashMap::new(),
      ir: IrList::default(),
      sentinels: Sentinels {
        null: 0,
        true_: 0,
        false_: 0,
        byte_size: 0,
        word_size: 0,
        main: 0,
      },
    };

    let null = table.insert(Symbol::new(
      GLOBAL_SCOPE,
      "null",
      SymbolKind::NullLiteral,
      Type::Null,
    ));
    let true_ = table.insert(Symbol::new(
      GLOBAL_SCOPE,
      "true",
      SymbolKind::BoolLiteral,
      Type::Bool,
    ));
    let false_ = table.insert(Symbol::new(
      GLOBAL_SCOPE,
      "false",
      SymbolKind::BoolLiteral,
      Type::Bool,
    ));
    let byte_size = table.insert(Symbol::new(GLOBAL_SCOPE, "1", SymbolKind::IntLiteral, Type::Int));
    let word_size = table.insert(Symbol::new(GLOBAL_SCOPE, "4", SymbolKind::IntLiteral, Type::Int));
    let main = table.insert(
      Symbol::new(GLOBAL_SCOPE, "main", SymbolKind::Method, Type::Void).returning(Type::Void),
    );
    table.sentinels = Sentinels {
      null,
      true_,
      false_,
      byte_size,
      word_size,
      main,
    };

    table
      .ir
      .emit(0, Opcode::Frame, Operand::Sym(main), Operand::Sym(null), Operand::None);
    table
      .ir
      .emit(0, Opcode::Call, Operand::Sym(main), Operand::None, Operand::None);
    table
      .ir
      .emit(0, Opcode::Stop, Operand::None, Operand::None, Operand::None);

    table
  }

  /// Append a symbol without a duplicate check and return its id.
  pub fn insert(&mut self, mut symbol: Symbol) -> SymbolId {
    let id = FIRST_SYMBOL_ID + self.symbols.len();
    symbol.id = id;
    self
      .index
      .entry((symbol.scope.clone(), symbol.name.clone()))
      .or_insert(id);
    self.symbols.push(symbol);
    id
  }

  /// Append a named declaration; a repeated `(scope, name)` is an error.
  pub fn declare(&mut self, line: usize, symbol: Symbol) -> CompileResult<SymbolId> {
    if self.search(&symbol.scope, &symbol.name).is_some() {
      return Err(CompileError::semantic(
        line,
        format!("Duplicate declaration of {}", symbol.name),
      ));
    }
    Ok(self.insert(symbol))
  }

  /// Synthesize a symbol whose name is its own label, e.g. a temporary.
  pub fn insert_synthetic(&mut self, scope: &str, kind: SymbolKind, ty: Type, offset: i32) -> SymbolId {
    let id = FIRST_SYMBOL_ID + self.symbols.len();
    let name = format!("{}{}", kind.prefix(), id);
    self.insert(Symbol::new(scope, name, kind, ty).at_offset(offset))
  }

  pub fn search(&self, scope: &str, name: &str) -> Option<SymbolId> {
    self.index.get(&(scope.to_string(), name.to_string())).copied()
  }

  pub fn get(&self, id: SymbolId) -> CompileResult<&Symbol> {
    id.checked_sub(FIRST_SYMBOL_ID)
      .and_then(|slot| self.symbols.get(slot))
      .ok_or_else(|| CompileError::internal(format!("unknown symbol id {id}")))
  }

  fn get_mut(&mut self, id: SymbolId) -> CompileResult<&mut Symbol> {
    id.checked_sub(FIRST_SYMBOL_ID)
      .and_then(|slot| self.symbols.get_mut(slot))
      .ok_or_else(|| CompileError::internal(format!("unknown symbol id {id}")))
  }

  pub fn set_offset(&mut self, id: SymbolId, offset: i32) -> CompileResult<()> {
    self.get_mut(id)?.offset = offset;
    Ok(())
  }

  pub fn set_params(&mut self, id: SymbolId, params: Vec<SymbolId>) -> CompileResult<()> {
    self.get_mut(id)?.params = params;
    Ok(())
  }

  pub fn set_type(&mut self, id: SymbolId, ty: Type) -> CompileResult<()> {
    let symbol = self.get_mut(id)?;
    if symbol.kind.is_function() {
      symbol.return_type = Some(ty.clone());
    }
    symbol.ty = ty;
    Ok(())
  }

  /// Class symbol named by the type of an object-typed symbol.
  pub fn class_of(&self, id: SymbolId) -> Option<SymbolId> {
    let name = self.get(id).ok()?.ty.class_name()?.to_string();
    self.class_named(&name)
  }

  pub fn class_named(&self, name: &str) -> Option<SymbolId> {
    self
      .search(GLOBAL_SCOPE, name)
      .filter(|id| self.get(*id).is_ok_and(|symbol| symbol.kind == SymbolKind::Class))
  }

  /// Interned integer literal; `text` already carries its sign.
  pub fn int_literal(&mut self, text: &str) -> SymbolId {
    self.literal(text, SymbolKind::IntLiteral, Type::Int)
  }

  pub fn char_literal(&mut self, lexeme: &str) -> SymbolId {
    self.literal(lexeme, SymbolKind::CharLiteral, Type::Char)
  }

  fn literal(&mut self, text: &str, kind: SymbolKind, ty: Type) -> SymbolId {
    if let Some(id) = self.search(GLOBAL_SCOPE, text) {
      return id;
    }
    self.insert(Symbol::new(GLOBAL_SCOPE, text, kind, ty))
  }

  pub fn label(&self, id: SymbolId) -> CompileResult<String> {
    Ok(self.get(id)?.label())
  }

  pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
    self.symbols.iter()
  }

  pub fn len(&self) -> usize {
    self.symbols.len()
  }

  pub fn is_empty(&self) -> bool {
    self.symbols.is_empty()
  }

  /// Plain-text dump of every symbol record.
  pub fn dump(&self) -> String {
    let mut out = String::new();
    for symbol in &self.symbols {
      out.push_str(&format!("Scope:\t\t{}\n", symbol.scope));
      out.push_str(&format!("Symid:\t\t{}\n", symbol.label()));
      out.push_str(&format!("Value:\t\t{}\n", symbol.name));
      out.push_str(&format!("Kind:\t\t{}\n", symbol.kind));
      out.push_str("Data:\n");
      out.push_str(&format!("\t\t\ttype: {}\n", symbol.ty));
      if let Some(ret) = &symbol.return_type {
        out.push_str(&format!("\t\t\treturnType: {ret}\n"));
      }
      if symbol.kind.is_function() {
        let params: Vec<String> = symbol
          .params
          .iter()
          .filter_map(|id| self.get(*id).ok().map(Symbol::label))
          .collect();
        out.push_str(&format!("\t\t\tParam: [{}]\n", params.join(", ")));
      }
      out.push_str(&format!("\t\t\taccessMod: {}\n", symbol.access));
      if symbol.offset != 0 {
        out.push_str(&format!("\t\t\tOffset: {}\n", symbol.offset));
      }
      out.push('\n');
    }
    out
  }

  /// Plain-text dump of the quadruple list with symbol labels.
  pub fn dump_ir(&self) -> CompileResult<String> {
    let mut out = String::new();
    for quad in self.ir.quads() {
      let mut operands = Vec::new();
      for operand in [&quad.x, &quad.y, &quad.z] {
        operands.push(match operand {
          Operand::None => String::new(),
          Operand::Sym(id) => self.label(*id)?,
          Operand::Label(name) => name.clone(),
          Operand::Imm(value) => value.to_string(),
        });
      }
      out.push_str(&format!(
        "  {}:\t{:<8}\t{:<6}\t{}\n",
        quad.line,
        quad.label.as_deref().unwrap_or(""),
        quad.op,
        operands.join("\t").trim_end()
      ));
    }
    Ok(out)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sentinels_and_bootstrap() {
    let table = SymbolTable::new();
    assert_eq!(table.sentinels.null, FIRST_SYMBOL_ID);
    assert_eq!(table.get(table.sentinels.main).unwrap().name, "main");
    assert_eq!(table.search(GLOBAL_SCOPE, "4"), Some(table.sentinels.word_size));
    let ops: Vec<Opcode> = table.ir.quads().iter().map(|q| q.op).collect();
    assert_eq!(ops, vec![Opcode::Frame, Opcode::Call, Opcode::Stop]);
  }

  #[test]
  fn duplicate_declarations_are_rejected() {
    let mut table = SymbolTable::new();
    let x = Symbol::new("g.main", "x", SymbolKind::LocalVar, Type::Int);
    table.declare(3, x.clone()).unwrap();
    let err = table.declare(4, x).unwrap_err();
    assert_eq!(err.to_string(), "4: Duplicate declaration of x");
    let other_scope = Symbol::new("g.Cat", "x", SymbolKind::InstanceVar, Type::Int);
    assert!(table.declare(5, other_scope).is_ok());
  }

  #[test]
  fn literals_are_interned() {
    let mut table = SymbolTable::new();
    let a = table.int_literal("7");
    let b = table.int_literal("7");
    let c = table.char_literal("'7'");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(table.int_literal("4"), table.sentinels.word_size);
  }

  #[test]
  fn temporaries_are_named_at_creation() {
    let mut table = SymbolTable::new();
    let t = table.insert_synthetic("g.main", SymbolKind::TempVar, Type::Int, 16);
    let symbol = table.get(t).unwrap();
    assert_eq!(symbol.name, symbol.label());
    assert_eq!(symbol.offset, 16);
  }

  #[test]
  fn class_of_resolves_object_types() {
    let mut table = SymbolTable::new();
    let cat = table
      .declare(1, Symbol::new(GLOBAL_SCOPE, "Cat", SymbolKind::Class, Type::Class("Cat".into())))
      .unwrap();
    let c = table
      .declare(2, Symbol::new("g.main", "c", SymbolKind::LocalVar, Type::Class("Cat".into())))
      .unwrap();
    let n = table
      .declare(2, Symbol::new("g.main", "n", SymbolKind::LocalVar, Type::Int))
      .unwrap();
    assert_eq!(table.class_of(c), Some(cat));
    assert_eq!(table.class_of(n), None);
  }
}
