use kxic::ir::{Opcode, Operand};
use kxic::symtab::SymbolKind;
use kxic::ty::Type;
use kxic::{CompileError, compile};

const CAT: &str = "\
class Cat {
  private int lives = 9;
  public char initial;

  Cat(char c) {
    initial = c;
  }

  public int getLives() {
    return lives;
  }

  public void loseLife() {
    if (lives > 0) lives = lives - 1;
  }
}

void kxi2019 main() {
  Cat tom;
  int n;
  tom = new Cat('t');
  tom.loseLife();
  n = tom.getLives();
  cout << n;
  cout << tom.initial;
  cout << n == 8;
}
";

fn semantic_message(source: &str) -> String {
  match compile(source).unwrap_err() {
    CompileError::Semantic { message, .. } => message,
    other => panic!("expected a semantic error, got {other}"),
  }
}

#[test]
fn class_program_compiles() {
  let compilation = compile(CAT).unwrap();
  assert!(compilation.table.ir.dangling_labels().is_empty());
  assert!(compilation.assembly.contains("TRP 1"));
  assert!(compilation.assembly.contains("TRP 3"));
  assert!(compilation.assembly.lines().any(|line| line.starts_with("OVERFLOW")));
  assert!(compilation.assembly.lines().any(|line| line.starts_with("FREE")));
}

#[test]
fn constructor_runs_field_initializers_first() {
  let compilation = compile(CAT).unwrap();
  let table = &compilation.table;
  let ctor = table.search("g.Cat", "Cat").unwrap();
  let init = table.search("g.Cat", "$StaticInit").unwrap();
  let quads = table.ir.quads();
  let start = quads
    .iter()
    .position(|quad| quad.label == Some(table.label(ctor).unwrap()))
    .unwrap();
  assert_eq!(quads[start].op, Opcode::Func);
  assert_eq!(quads[start + 1].op, Opcode::Frame);
  assert_eq!(quads[start + 1].x, Operand::Sym(init));
  assert_eq!(quads[start + 2].op, Opcode::Call);
}

#[test]
fn symbols_carry_kinds_and_types() {
  let compilation = compile(CAT).unwrap();
  let table = &compilation.table;
  let tom = table.get(table.search("g.main", "tom").unwrap()).unwrap();
  assert_eq!(tom.kind, SymbolKind::LocalVar);
  assert_eq!(tom.ty, Type::Class("Cat".to_string()));
  assert_eq!(tom.label(), format!("L{}", tom.id));

  let get_lives = table.get(table.search("g.Cat", "getLives").unwrap()).unwrap();
  assert_eq!(get_lives.kind, SymbolKind::Method);
  assert_eq!(get_lives.return_type, Some(Type::Int));
  let ctor = table.get(table.search("g.Cat", "Cat").unwrap()).unwrap();
  assert_eq!(ctor.params.len(), 1);
}

#[test]
fn precedence_orders_the_quads() {
  let compilation = compile("void kxi2019 main() { int x; x = 3 + 4 * 2; }").unwrap();
  let quads = compilation.table.ir.quads();
  let mul = quads.iter().position(|quad| quad.op == Opcode::Mul).unwrap();
  let add = quads.iter().position(|quad| quad.op == Opcode::Add).unwrap();
  assert!(mul < add);
  assert_eq!(quads[add].y, quads[mul].z);
  let temp = quads[mul].z.sym().unwrap();
  let temp = compilation.table.get(temp).unwrap();
  assert_eq!(temp.kind, SymbolKind::TempVar);
  assert_eq!(temp.ty, Type::Int);
}

#[test]
fn simple_assignment_is_one_move() {
  let compilation = compile("void kxi2019 main() { int x; x = 5; }").unwrap();
  let table = &compilation.table;
  let x = table.search("g.main", "x").unwrap();
  let five = table.search("g", "5").unwrap();
  let moves: Vec<_> = table
    .ir
    .quads()
    .iter()
    .filter(|quad| quad.op == Opcode::Mov)
    .collect();
  assert_eq!(moves.len(), 1);
  assert_eq!(moves[0].x, Operand::Sym(x));
  assert_eq!(moves[0].y, Operand::Sym(five));
}

#[test]
fn if_else_branches_to_its_labels() {
  let source = "void kxi2019 main() {\n int x;\n if (x < 1) x = 1; else x = 2;\n cout << x;\n}";
  let compilation = compile(source).unwrap();
  let quads = compilation.table.ir.quads();
  let bf = quads.iter().position(|quad| quad.op == Opcode::Bf).unwrap();
  let jmp = quads.iter().position(|quad| quad.op == Opcode::Jmp).unwrap();
  let else_label = quads[bf].y.clone();
  let end_label = quads[jmp].x.clone();
  assert_eq!(quads[bf + 1].op, Opcode::Mov);
  assert_eq!(jmp, bf + 2);
  assert_eq!(Some(else_label), quads[jmp + 1].label.clone().map(Operand::Label));
  assert_eq!(Some(end_label), quads[jmp + 2].label.clone().map(Operand::Label));
  assert_eq!(quads[jmp + 2].op, Opcode::Wrti);
  assert!(compilation.table.ir.dangling_labels().is_empty());
}

#[test]
fn nested_if_else_backpatches_each_level() {
  let source = "\
void kxi2019 main() {
  bool a;
  bool b;
  int x;
  if (a) if (b) x = 1; else x = 2; else x = 3;
  cout << x;
}
";
  let compilation = compile(source).unwrap();
  let quads = compilation.table.ir.quads();
  let outer = quads.iter().position(|quad| quad.op == Opcode::Bf).unwrap();
  let label_at = |index: usize| quads[index].label.clone().map(Operand::Label);

  let inner = outer + 1;
  assert_eq!(quads[inner].op, Opcode::Bf);
  assert_eq!(quads[inner + 1].op, Opcode::Mov);

  let inner_jmp = inner + 2;
  assert_eq!(quads[inner_jmp].op, Opcode::Jmp);
  assert_eq!(label_at(inner_jmp + 1), Some(quads[inner].y.clone()));
  assert_eq!(quads[inner_jmp + 1].op, Opcode::Mov);

  let outer_jmp = inner_jmp + 2;
  assert_eq!(quads[outer_jmp].op, Opcode::Jmp);
  assert_eq!(label_at(outer_jmp), Some(quads[inner_jmp].x.clone()));
  assert_eq!(label_at(outer_jmp + 1), Some(quads[outer].y.clone()));
  assert_eq!(quads[outer_jmp + 1].op, Opcode::Mov);
  assert_eq!(label_at(outer_jmp + 2), Some(quads[outer_jmp].x.clone()));
  assert_eq!(quads[outer_jmp + 2].op, Opcode::Wrti);

  assert!(compilation.table.ir.dangling_labels().is_empty());
}

#[test]
fn loops_and_switches_compile() {
  let source = "\
void kxi2019 main() {
  int i;
  char c;
  i = 0;
  while (i < 10) {
    switch (i) {
      case 1: cout << 'a';
      case 2: { cout << 'b'; break; }
      default: cout << '-';
    }
    if (i == 5) break;
    i = i + 1;
  }
  cin >> c;
  cout << atoi(c);
}
";
  let compilation = compile(source).unwrap();
  assert!(compilation.table.ir.dangling_labels().is_empty());
  assert!(compilation.assembly.contains("TRP 4"));
}

#[test]
fn arrays_compile() {
  let source = "\
void kxi2019 main() {
  int[] a;
  int i;
  a = new int[5];
  a[0] = 7;
  i = a[0] + 1;
  cout << i;
}
";
  let compilation = compile(source).unwrap();
  let ops: Vec<Opcode> = compilation.table.ir.quads().iter().map(|quad| quad.op).collect();
  assert!(ops.contains(&Opcode::New));
  assert_eq!(ops.iter().filter(|op| **op == Opcode::Aef).count(), 2);
}

#[test]
fn undefined_method_is_not_defined() {
  let source = "class A { }\nvoid kxi2019 main() { A a; a = new A(); a.foo(); }";
  assert!(semantic_message(source).contains("not defined"));
}

#[test]
fn private_method_is_not_callable_from_main() {
  let source =
    "class A {\n private void hide() { }\n}\nvoid kxi2019 main() { A a; a = new A(); a.hide(); }";
  assert!(semantic_message(source).contains("not defined"));
}

#[test]
fn duplicate_local_is_rejected() {
  let err = compile("void kxi2019 main() {\n int x;\n char x;\n}").unwrap_err();
  assert_eq!(err.to_string(), "3: Duplicate declaration of x");
  assert_eq!(err.exit_code(), 2);
}

#[test]
fn type_errors_name_both_types() {
  let message = semantic_message("void kxi2019 main() { int x; bool b; x = x + b; }");
  assert!(message.contains("int"));
  assert!(message.contains("bool"));
  assert!(message.contains("x + b"));
}

#[test]
fn nested_assignment_is_rejected() {
  let message = semantic_message("void kxi2019 main() { int x; int y; x = 1 + (y = 2); }");
  assert!(message.contains("Assignment"));
}

#[test]
fn syntax_errors_report_found_and_expected() {
  let err = compile("void kxi2019 main() {\n int x\n}").unwrap_err();
  assert_eq!(err.to_string(), "3: Found } expecting ;");
}

#[test]
fn unclosed_groups_report_the_token_found() {
  let err = compile("void kxi2019 main() { int x; x = (1 + 2; }").unwrap_err();
  assert_eq!(err.to_string(), "1: Found ; expecting )");

  let source = "class A {\n public int f(int n) { return n; }\n}\n\
                void kxi2019 main() { A a; int x; x = a.f(1; }";
  let err = compile(source).unwrap_err();
  assert_eq!(err.to_string(), "4: Found ; expecting )");
}

#[test]
fn void_call_is_not_comparable_to_null() {
  let source = "class A {\n public void f() { }\n}\n\
                void kxi2019 main() { A a; bool b; a = new A(); b = null == a.f(); }";
  assert!(semantic_message(source).contains("null == void"));
}

#[test]
fn unknown_characters_are_lexical_errors() {
  let err = compile("void kxi2019 main() { int x; x = 1 $ 2; }").unwrap_err();
  assert!(matches!(err, CompileError::Lexical { .. }));
  assert_eq!(err.exit_code(), 2);
}

#[test]
fn trailing_tokens_are_rejected() {
  let err = compile("void kxi2019 main() { } }").unwrap_err();
  assert!(matches!(err, CompileError::Syntax { .. }));
}

#[test]
fn missing_file_is_an_io_error() {
  let err = kxic::compile_file(std::path::Path::new("no/such/file.kxi")).unwrap_err();
  assert_eq!(err.to_string(), "Cannot open the file: no/such/file.kxi");
  assert_eq!(err.exit_code(), 1);
}
