//! Code generation: lower the quadruple list into stack-VM assembly.
//!
//! Every quad is translated on its own; values never stay in registers
//! across quads. `R1`..`R3` carry operands, `R5` and `R6` are scratch for
//! addresses and guards, `R7` is the heap watermark.
//!
//! Activation record, growing downward from `FP`:
//!
//! ```text
//! FP      return address
//! FP-4    previous FP
//! FP-8    this
//! FP-12   first parameter, then locals and temporaries
//! ```
//!
//! A frame slot at offset `n` lives at `FP - n`. A `Reference` slot holds an
//! address; reading or writing through it is indirect.

use std::collections::BTreeSet;

use log::debug;

use crate::analyzer::{FRAME_HEADER, WORD};
use crate::error::{CompileError, CompileResult};
use crate::ir::{Opcode, Operand, Quad};
use crate::symtab::{Symbol, SymbolId, SymbolKind, SymbolTable};
use crate::tokenizer::char_value;
use crate::ty::Type;

const OVERFLOW_MESSAGE: &str = "Stack overflow\n";
const UNDERFLOW_MESSAGE: &str = "Stack underflow\n";

/// Emit the whole program: data, code, guard handlers and the heap start.
pub fn generate(table: &SymbolTable) -> CompileResult<String> {
  let dangling = table.ir.dangling_labels();
  if !dangling.is_empty() {
    return Err(CompileError::internal(format!(
      "jump targets without a label: {}",
      dangling.join(", ")
    )));
  }

  let mut generator = Generator::new(table);
  generator.data()?;
  generator.emit("LDA R7 FREE");
  for quad in table.ir.quads() {
    generator.quad(quad)?;
  }
  generator.handler("OVERFLOW", OVERFLOW_MESSAGE);
  generator.handler("UNDERFLOW", UNDERFLOW_MESSAGE);
  generator.place("FREE");
  generator.emit(".INT 0");

  debug!(
    "generated {} lines of assembly",
    generator.asm.lines().count()
  );
  Ok(generator.asm)
}

/// Data label for a character the generator prints itself.
fn char_label(c: u8) -> String {
  format!("CHR{c}")
}

struct Generator<'a> {
  table: &'a SymbolTable,
  asm: String,
  /// Label waiting for the next instruction.
  pending: Option<String>,
  counter: u32,
}

impl<'a> Generator<'a> {
  fn new(table: &'a SymbolTable) -> Self {
    Self {
      table,
      asm: String::new(),
      pending: None,
      counter: 0,
    }
  }

  fn emit(&mut self, text: impl AsRef<str>) {
    let label = self.pending.take().unwrap_or_default();
    self.asm.push_str(&format!("{label:<15} {}\n", text.as_ref()));
  }

  /// Attach a label to the next instruction. Two labels cannot share a line,
  /// so an older pending one gets a no-op of its own.
  fn place(&mut self, label: &str) {
    if self.pending.is_some() {
      self.emit("MOV R0 R0");
    }
    self.pending = Some(label.to_string());
  }

  fn fresh_label(&mut self) -> String {
    self.counter += 1;
    format!("CG{}", self.counter)
  }

  fn symbol(&self, id: SymbolId) -> CompileResult<&'a Symbol> {
    self.table.get(id)
  }

  fn data(&mut self) -> CompileResult<()> {
    let table = self.table;
    for symbol in table.iter() {
      let label = symbol.label();
      match symbol.kind {
        SymbolKind::IntLiteral => {
          let value: i32 = symbol.name.parse().map_err(|_| {
            CompileError::internal(format!("integer literal {} does not fit", symbol.name))
          })?;
          self.place(&label);
          self.emit(format!(".INT {value}"));
        }
        SymbolKind::CharLiteral => {
          let value = char_value(&symbol.name).ok_or_else(|| {
            CompileError::internal(format!("bad character literal {}", symbol.name))
          })?;
          self.place(&label);
          self.emit(format!(".BYT {value}"));
        }
        SymbolKind::BoolLiteral => {
          self.place(&label);
          self.emit(format!(".INT {}", i32::from(symbol.name == "true")));
        }
        SymbolKind::NullLiteral => {
          self.place(&label);
          self.emit(".INT 0");
        }
        _ => {}
      }
    }

    let printed: BTreeSet<u8> = ["true", "false", OVERFLOW_MESSAGE, UNDERFLOW_MESSAGE]
      .iter()
      .flat_map(|text| text.bytes())
      .collect();
    for c in printed {
      self.place(&char_label(c));
      self.emit(format!(".BYT {c}"));
    }
    Ok(())
  }

  fn print_text(&mut self, text: &str) {
    for c in text.bytes() {
      self.emit(format!("LDB R3 {}", char_label(c)));
      self.emit("TRP 3");
    }
  }

  fn handler(&mut self, label: &str, message: &str) {
    self.place(label);
    self.print_text(message);
    self.emit("TRP 0");
  }

  /// Point `R6` at the slot of a frame symbol, relative to `base`.
  fn slot_address(&mut self, symbol: &Symbol, base: &str) -> CompileResult<()> {
    if !symbol.kind.is_frame_slot() {
      return Err(CompileError::internal(format!(
        "{} ({}) has no frame slot",
        symbol.label(),
        symbol.kind
      )));
    }
    self.emit(format!("MOV R6 {base}"));
    self.emit(format!("ADI R6 -{}", symbol.offset));
    Ok(())
  }

  /// Load the value of `operand` into `reg`, with frame slots read
  /// relative to `base`.
  fn load_from(&mut self, reg: &str, operand: &Operand, base: &str) -> CompileResult<()> {
    let id = sym_operand(operand)?;
    let symbol = self.symbol(id)?;
    match symbol.kind {
      SymbolKind::CharLiteral => self.emit(format!("LDB {reg} {}", symbol.label())),
      SymbolKind::IntLiteral | SymbolKind::BoolLiteral | SymbolKind::NullLiteral => {
        self.emit(format!("LDR {reg} {}", symbol.label()))
      }
      SymbolKind::Reference => {
        self.slot_address(symbol, base)?;
        self.emit("LDR R6 (R6)");
        let load = if symbol.ty == Type::Char { "LDB" } else { "LDR" };
        self.emit(format!("{load} {reg} (R6)"));
      }
      _ => {
        self.slot_address(symbol, base)?;
        self.emit(format!("LDR {reg} (R6)"));
      }
    }
    Ok(())
  }

  fn load(&mut self, reg: &str, operand: &Operand) -> CompileResult<()> {
    self.load_from(reg, operand, "FP")
  }

  /// Store `reg` into the storage named by `operand`.
  fn store(&mut self, reg: &str, operand: &Operand) -> CompileResult<()> {
    let symbol = self.symbol(sym_operand(operand)?)?;
    self.slot_address(symbol, "FP")?;
    if symbol.kind == SymbolKind::Reference {
      self.emit("LDR R6 (R6)");
      let store = if symbol.ty == Type::Char { "STB" } else { "STR" };
      self.emit(format!("{store} {reg} (R6)"));
    } else {
      self.emit(format!("STR {reg} (R6)"));
    }
    Ok(())
  }

  /// Store an address into a `Reference` slot itself.
  fn store_address(&mut self, reg: &str, operand: &Operand) -> CompileResult<()> {
    let symbol = self.symbol(sym_operand(operand)?)?;
    self.slot_address(symbol, "FP")?;
    self.emit(format!("STR {reg} (R6)"));
    Ok(())
  }

  /// Fail into OVERFLOW unless `bytes` more fit on the stack.
  fn stack_check(&mut self, bytes: i32) {
    self.emit("MOV R5 SP");
    self.emit(format!("ADI R5 -{bytes}"));
    self.emit("CMP R5 SL");
    self.emit("BLT R5 OVERFLOW");
  }

  fn heap_check(&mut self) {
    self.emit("MOV R5 R7");
    self.emit("CMP R5 SL");
    self.emit("BGT R5 OVERFLOW");
  }

  /// Tear down the current frame; the return address ends up in `R1`.
  fn leave(&mut self) {
    self.emit("MOV SP FP");
    self.emit("MOV R5 SP");
    self.emit("CMP R5 SB");
    self.emit("BGT R5 UNDERFLOW");
    self.emit("LDR R1 (FP)");
    self.emit("MOV R5 FP");
    self.emit("ADI R5 -4");
    self.emit("LDR FP (R5)");
  }

  fn function_label(&self, operand: &Operand) -> CompileResult<String> {
    let symbol = self.symbol(sym_operand(operand)?)?;
    if !symbol.kind.is_function() {
      return Err(CompileError::internal(format!(
        "{} is not callable",
        symbol.label()
      )));
    }
    Ok(symbol.label())
  }

  fn quad(&mut self, quad: &Quad) -> CompileResult<()> {
    if let Some(label) = &quad.label {
      self.place(label);
    }

    match quad.op {
      Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::And | Opcode::Or => {
        self.load("R1", &quad.x)?;
        self.load("R2", &quad.y)?;
        self.emit(format!("{} R1 R2", quad.op));
        self.store("R1", &quad.z)?;
      }
      Opcode::Lt | Opcode::Gt | Opcode::Eq | Opcode::Ne | Opcode::Le | Opcode::Ge => {
        self.compare(quad)?;
      }
      Opcode::Bf => {
        self.load("R1", &quad.x)?;
        self.emit(format!("BRZ R1 {}", label_operand(&quad.y)?));
      }
      Opcode::Jmp => self.emit(format!("JMP {}", label_operand(&quad.x)?)),
      Opcode::Mov => {
        self.load("R1", &quad.y)?;
        self.store("R1", &quad.x)?;
      }
      Opcode::Wrti | Opcode::Wrtc => {
        self.load("R3", &quad.x)?;
        let trap = if quad.op == Opcode::Wrti { 1 } else { 3 };
        self.emit(format!("TRP {trap}"));
      }
      Opcode::Write => {
        let otherwise = self.fresh_label();
        let done = self.fresh_label();
        self.load("R1", &quad.x)?;
        self.emit(format!("BRZ R1 {otherwise}"));
        self.print_text("true");
        self.emit(format!("JMP {done}"));
        self.place(&otherwise);
        self.print_text("false");
        self.place(&done);
      }
      Opcode::Rdi | Opcode::Rdc => {
        let trap = if quad.op == Opcode::Rdi { 2 } else { 4 };
        self.emit(format!("TRP {trap}"));
        self.store("R3", &quad.x)?;
      }
      Opcode::Itoa | Opcode::Atoi => {
        self.load("R1", &quad.x)?;
        let shift = if quad.op == Opcode::Itoa { 48 } else { -48 };
        self.emit(format!("ADI R1 {shift}"));
        self.store("R1", &quad.z)?;
      }
      Opcode::Func => {
        let symbol = self.symbol(sym_operand(&quad.x)?)?;
        let params = i32::try_from(symbol.params.len())
          .map_err(|_| CompileError::internal("too many parameters"))?;
        let footprint = symbol.offset - FRAME_HEADER - WORD * params;
        if footprint > 0 {
          self.stack_check(footprint);
          self.emit(format!("ADI SP -{footprint}"));
        }
      }
      Opcode::Frame => {
        let callee = self.symbol(sym_operand(&quad.x)?)?;
        let params = i32::try_from(callee.params.len())
          .map_err(|_| CompileError::internal("too many parameters"))?;
        self.stack_check(FRAME_HEADER + WORD * params);
        self.load("R2", &quad.y)?;
        self.emit("MOV R1 FP");
        self.emit("MOV FP SP");
        self.emit("ADI SP -4");
        self.emit("STR R1 (SP)");
        self.emit("ADI SP -4");
        self.emit("STR R2 (SP)");
        self.emit("ADI SP -4");
      }
      Opcode::Push => {
        // Arguments belong to the caller's frame.
        self.emit("MOV R5 FP");
        self.emit("ADI R5 -4");
        self.emit("LDR R5 (R5)");
        self.load_from("R1", &quad.x, "R5")?;
        self.emit("STR R1 (SP)");
        self.emit("ADI SP -4");
      }
      Opcode::Call => {
        let target = self.function_label(&quad.x)?;
        self.emit("MOV R1 PC");
        self.emit("ADI R1 36");
        self.emit("STR R1 (FP)");
        self.emit(format!("JMP {target}"));
      }
      Opcode::Rtn => {
        self.leave();
        self.emit("JMR R1");
      }
      Opcode::Return => {
        self.load("R2", &quad.x)?;
        self.leave();
        self.emit("STR R2 (SP)");
        self.emit("JMR R1");
      }
      Opcode::Peek => {
        self.emit("LDR R1 (SP)");
        self.store("R1", &quad.x)?;
      }
      Opcode::Newi => {
        let Operand::Imm(size) = quad.x else {
          return Err(CompileError::internal("NEWI needs an immediate size"));
        };
        self.emit("MOV R1 R7");
        self.emit(format!("ADI R7 {size}"));
        self.heap_check();
        self.store("R1", &quad.z)?;
      }
      Opcode::New => {
        self.load("R2", &quad.x)?;
        self.emit("MOV R1 R7");
        self.emit("ADD R7 R2");
        self.heap_check();
        self.store("R1", &quad.z)?;
      }
      Opcode::Ref => {
        let field = self.symbol(sym_operand(&quad.y)?)?;
        if field.kind != SymbolKind::InstanceVar {
          return Err(CompileError::internal(format!(
            "{} is not a field",
            field.label()
          )));
        }
        let offset = field.offset;
        self.load("R1", &quad.x)?;
        self.emit(format!("ADI R1 {offset}"));
        self.store_address("R1", &quad.z)?;
      }
      Opcode::Aef => {
        let element = self.symbol(sym_operand(&quad.z)?)?;
        let word_sized = element.ty.element_size() == WORD;
        self.load("R1", &quad.x)?;
        self.load("R2", &quad.y)?;
        if word_sized {
          let word = self.table.label(self.table.sentinels.word_size)?;
          self.emit(format!("LDR R3 {word}"));
          self.emit("MUL R2 R3");
        }
        self.emit("ADD R1 R2");
        self.store_address("R1", &quad.z)?;
      }
      Opcode::Stop => self.emit("TRP 0"),
      // An unfilled label slot; its label carries over to what follows.
      Opcode::Nop => {}
    }
    Ok(())
  }

  /// Materialize a comparison as the `true` or `false` literal.
  fn compare(&mut self, quad: &Quad) -> CompileResult<()> {
    let (branch, taken_is_true) = match quad.op {
      Opcode::Lt => ("BLT", true),
      Opcode::Gt => ("BGT", true),
      Opcode::Eq => ("BRZ", true),
      Opcode::Ne => ("BNZ", true),
      Opcode::Le => ("BGT", false),
      Opcode::Ge => ("BLT", false),
      op => return Err(CompileError::internal(format!("{op} is not a comparison"))),
    };
    let sentinels = self.table.sentinels;
    let (taken, fallthrough) = if taken_is_true {
      (sentinels.true_, sentinels.false_)
    } else {
      (sentinels.false_, sentinels.true_)
    };
    let taken = self.table.label(taken)?;
    let fallthrough = self.table.label(fallthrough)?;

    let branch_target = self.fresh_label();
    let done = self.fresh_label();
    self.load("R1", &quad.x)?;
    self.load("R2", &quad.y)?;
    self.emit("CMP R1 R2");
    self.emit(format!("{branch} R1 {branch_target}"));
    self.emit(format!("LDR R3 {fallthrough}"));
    self.emit(format!("JMP {done}"));
    self.place(&branch_target);
    self.emit(format!("LDR R3 {taken}"));
    self.place(&done);
    self.store("R3", &quad.z)
  }
}

fn sym_operand(operand: &Operand) -> CompileResult<SymbolId> {
  operand
    .sym()
    .ok_or_else(|| CompileError::internal(format!("expected a symbol operand, found {operand:?}")))
}

fn label_operand(operand: &Operand) -> CompileResult<&str> {
  match operand {
    Operand::Label(name) => Ok(name),
    _ => Err(CompileError::internal(format!(
      "expected a label operand, found {operand:?}"
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::analyzer::analyze;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;

  fn assemble(source: &str) -> String {
    let table = analyze(&parse(tokenize(source).unwrap()).unwrap()).unwrap();
    generate(&table).unwrap()
  }

  fn instructions(asm: &str) -> Vec<String> {
    asm
      .lines()
      .map(|line| line.get(16..).unwrap_or("").to_string())
      .collect()
  }

  #[test]
  fn program_layout() {
    let asm = assemble("void kxi2019 main() { int x; x = 5; cout << x; }");
    let lines = instructions(&asm);
    let code_start = lines.iter().position(|line| line == "LDA R7 FREE").unwrap();
    assert!(lines[..code_start].iter().all(|line| line.starts_with('.')));
    assert!(lines[..code_start].contains(&".INT 5".to_string()));
    assert!(asm.contains("TRP 1"));
    assert!(asm.lines().any(|line| line.starts_with("OVERFLOW")));
    assert!(asm.lines().any(|line| line.starts_with("UNDERFLOW")));
    assert_eq!(asm.lines().last().unwrap(), format!("{:<15} .INT 0", "FREE"));
  }

  #[test]
  fn main_is_called_and_then_halts() {
    let asm = assemble("void kxi2019 main() { }");
    let lines = instructions(&asm);
    let jump = lines.iter().position(|line| line.starts_with("JMP M")).unwrap();
    assert_eq!(lines[jump + 1], "TRP 0");
  }

  #[test]
  fn every_label_is_defined_once() {
    let asm = assemble(
      "void kxi2019 main() {\n int x;\n if (x < 1) x = 1; else x = 2;\n while (x > 0) { x = x - 1; }\n cout << x == 0;\n}",
    );
    let mut defined: Vec<&str> = asm
      .lines()
      .filter_map(|line| line.get(..16))
      .map(str::trim)
      .filter(|label| !label.is_empty())
      .collect();
    let count = defined.len();
    defined.sort();
    defined.dedup();
    assert_eq!(defined.len(), count);

    for line in instructions(&asm) {
      let mut words = line.split_whitespace();
      if let Some(op) = words.next()
        && matches!(op, "JMP" | "BRZ" | "BNZ" | "BLT" | "BGT")
      {
        let target = words.last().unwrap();
        assert!(defined.contains(&target), "undefined jump target {target}");
      }
    }
  }

  #[test]
  fn chars_go_through_byte_loads() {
    let asm = assemble("void kxi2019 main() { char c; c = 'a'; cout << c; cin >> c; }");
    assert!(asm.contains("LDB R1 H"));
    assert!(asm.contains(".BYT 97"));
    assert!(asm.contains("TRP 3"));
    assert!(asm.contains("TRP 4"));
  }

  #[test]
  fn frame_reserves_locals() {
    let asm = assemble("void kxi2019 main() { int a; int b; a = 1 + 2; }");
    // two locals and one temporary
    assert!(asm.contains("ADI SP -12"));
  }
}
