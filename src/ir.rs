//! Linear intermediate representation: quadruples and label bookkeeping.
//!
//! Placing a label opens a placeholder slot that the next emitted
//! instruction fills. If a second label lands on the same slot, the older
//! label is merged into the newer one: every jump already referring to it is
//! rewritten through the reference map, and later references are redirected
//! through the rename map.

use std::collections::HashMap;
use std::fmt;

use log::trace;

use crate::symtab::SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
  Add,
  Sub,
  Mul,
  Div,
  Lt,
  Gt,
  Ne,
  Eq,
  Le,
  Ge,
  And,
  Or,
  Bf,
  Jmp,
  Push,
  Peek,
  Frame,
  Call,
  Rtn,
  Return,
  Func,
  Newi,
  New,
  Mov,
  Write,
  Wrtc,
  Wrti,
  Rdc,
  Rdi,
  Ref,
  Aef,
  Itoa,
  Atoi,
  Stop,
  Nop,
}

impl fmt::Display for Opcode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Opcode::Add => "ADD",
      Opcode::Sub => "SUB",
      Opcode::Mul => "MUL",
      Opcode::Div => "DIV",
      Opcode::Lt => "LT",
      Opcode::Gt => "GT",
      Opcode::Ne => "NE",
      Opcode::Eq => "EQ",
      Opcode::Le => "LE",
      Opcode::Ge => "GE",
      Opcode::And => "AND",
      Opcode::Or => "OR",
      Opcode::Bf => "BF",
      Opcode::Jmp => "JMP",
      Opcode::Push => "PUSH",
      Opcode::Peek => "PEEK",
      Opcode::Frame => "FRAME",
      Opcode::Call => "CALL",
      Opcode::Rtn => "RTN",
      Opcode::Return => "RETURN",
      Opcode::Func => "FUNC",
      Opcode::Newi => "NEWI",
      Opcode::New => "NEW",
      Opcode::Mov => "MOV",
      Opcode::Write => "WRITE",
      Opcode::Wrtc => "WRTC",
      Opcode::Wrti => "WRTI",
      Opcode::Rdc => "RDC",
      Opcode::Rdi => "RDI",
      Opcode::Ref => "REF",
      Opcode::Aef => "AEF",
      Opcode::Itoa => "ITOA",
      Opcode::Atoi => "ATOI",
      Opcode::Stop => "STOP",
      Opcode::Nop => "NOP",
    };
    f.pad(name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
  None,
  Sym(SymbolId),
  Label(String),
  Imm(i32),
}

impl Operand {
  pub fn label(name: impl Into<String>) -> Self {
    Self::Label(name.into())
  }

  pub fn sym(&self) -> Option<SymbolId> {
    match self {
      Self::Sym(id) => Some(*id),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quad {
  pub line: usize,
  pub op: Opcode,
  pub x: Operand,
  pub y: Operand,
  pub z: Operand,
  pub label: Option<String>,
}

impl Quad {
  fn operands_mut(&mut self) -> [&mut Operand; 3] {
    [&mut self.x, &mut self.y, &mut self.z]
  }

  pub fn operands(&self) -> [&Operand; 3] {
    [&self.x, &self.y, &self.z]
  }
}

#[derive(Debug, Default)]
pub struct IrList {
  quads: Vec<Quad>,
  /// The last quad is a label placeholder waiting to be filled.
  open: bool,
  /// Quads that mention a label as an operand.
  references: HashMap<String, Vec<usize>>,
  /// Labels merged into another label.
  renamed: HashMap<String, String>,
  label_counter: u32,
}

impl IrList {
  pub fn quads(&self) -> &[Quad] {
    &self.quads
  }

  pub fn len(&self) -> usize {
    self.quads.len()
  }

  pub fn is_empty(&self) -> bool {
    self.quads.is_empty()
  }

  /// Next number for synthesizing a unique label.
  pub fn new_label(&mut self) -> u32 {
    self.label_counter += 1;
    self.label_counter
  }

  pub fn emit(&mut self, line: usize, op: Opcode, x: Operand, y: Operand, z: Operand) {
    self.emit_labeled(line, op, x, y, z, None);
  }

  /// Append a quad, or fill the open placeholder. A label on a filled
  /// placeholder absorbs the placeholder's own label.
  pub fn emit_labeled(
    &mut self,
    line: usize,
    op: Opcode,
    x: Operand,
    y: Operand,
    z: Operand,
    label: Option<String>,
  ) {
    let mut quad = Quad {
      line,
      op,
      x,
      y,
      z,
      label: None,
    };
    for operand in quad.operands_mut() {
      if let Operand::Label(name) = operand {
        *name = self.resolve(name);
      }
    }

    let slot = if self.open {
      self.open = false;
      let slot = self.quads.len() - 1;
      let pending = self.quads[slot].label.take();
      quad.label = match (pending, label) {
        (Some(old), Some(new)) => {
          self.merge(&old, &new);
          Some(new)
        }
        (pending, label) => label.or(pending),
      };
      self.quads[slot] = quad;
      slot
    } else {
      quad.label = label;
      self.quads.push(quad);
      self.quads.len() - 1
    };

    let referenced: Vec<String> = self.quads[slot]
      .operands()
      .into_iter()
      .filter_map(|operand| match operand {
        Operand::Label(name) => Some(name.clone()),
        _ => None,
      })
      .collect();
    for name in referenced {
      self.references.entry(name).or_default().push(slot);
    }
  }

  /// Attach `name` to the next emitted quad.
  pub fn place_label(&mut self, name: &str) {
    if self.open {
      if let Some(slot) = self.quads.last_mut()
        && let Some(old) = slot.label.replace(name.to_string())
      {
        self.merge(&old, name);
      }
      return;
    }
    self.quads.push(Quad {
      line: 0,
      op: Opcode::Nop,
      x: Operand::None,
      y: Operand::None,
      z: Operand::None,
      label: Some(name.to_string()),
    });
    self.open = true;
  }

  /// Current name of a label that may have been merged away.
  pub fn resolve(&self, name: &str) -> String {
    let mut current = name;
    while let Some(next) = self.renamed.get(current) {
      current = next;
    }
    current.to_string()
  }

  fn merge(&mut self, old: &str, new: &str) {
    if old == new {
      return;
    }
    trace!("label {old} merged into {new}");
    let slots = self.references.remove(old).unwrap_or_default();
    for &slot in &slots {
      for operand in self.quads[slot].operands_mut() {
        if matches!(operand, Operand::Label(name) if name == old) {
          *operand = Operand::label(new);
        }
      }
    }
    self
      .references
      .entry(new.to_string())
      .or_default()
      .extend(slots);
    self.renamed.insert(old.to_string(), new.to_string());
  }

  /// Jump targets that no quad carries as its label.
  pub fn dangling_labels(&self) -> Vec<String> {
    let defined: Vec<&str> = self
      .quads
      .iter()
      .filter_map(|quad| quad.label.as_deref())
      .collect();
    let mut dangling: Vec<String> = self
      .quads
      .iter()
      .flat_map(|quad| quad.operands())
      .filter_map(|operand| match operand {
        Operand::Label(name) if !defined.contains(&name.as_str()) => Some(name.clone()),
        _ => None,
      })
      .collect();
    dangling.sort();
    dangling.dedup();
    dangling
  }
}
