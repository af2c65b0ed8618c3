use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

use kxic::{CompileError, compile, read_source, tokenizer};
use log::info;

const USAGE: &str = "usage: kxic [--tokens] [--symbols] [--icode] [-o <out>] <source>";

/// Command line settings.
#[derive(Debug, Default)]
struct Options {
  source: Option<PathBuf>,
  output: Option<PathBuf>,
  tokens: bool,
  symbols: bool,
  icode: bool,
}

impl Options {
  fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
    let mut options = Self::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
      match arg.as_str() {
        "--tokens" => options.tokens = true,
        "--symbols" => options.symbols = true,
        "--icode" => options.icode = true,
        "-o" => {
          let Some(path) = args.next() else {
            return Err("-o needs a path".to_string());
          };
          options.output = Some(PathBuf::from(path));
        }
        flag if flag.starts_with('-') => return Err(format!("unknown option {flag}")),
        _ if options.source.is_some() => return Err("only one source file is accepted".to_string()),
        _ => options.source = Some(PathBuf::from(arg)),
      }
    }
    Ok(options)
  }
}

fn fail(err: CompileError) -> ! {
  eprintln!("{err}");
  process::exit(err.exit_code());
}

fn main() {
  env_logger::init();

  let options = match Options::parse(env::args().skip(1)) {
    Ok(options) => options,
    Err(message) => {
      eprintln!("{message}");
      eprintln!("{USAGE}");
      process::exit(1);
    }
  };
  let Some(source_path) = &options.source else {
    println!("{USAGE}");
    return;
  };

  let source = read_source(source_path).unwrap_or_else(|err| fail(err));
  if options.tokens {
    print!("{}", tokenizer::token_listing(&source));
  }

  let compilation = compile(&source).unwrap_or_else(|err| fail(err));
  if options.symbols {
    print!("{}", compilation.table.dump());
  }
  if options.icode {
    match compilation.table.dump_ir() {
      Ok(listing) => print!("{listing}"),
      Err(err) => fail(err),
    }
  }

  let output = options.output.unwrap_or_else(|| PathBuf::from("out.asm"));
  if let Err(err) = fs::write(&output, &compilation.assembly) {
    fail(CompileError::Io {
      path: output.display().to_string(),
      source: err,
    });
  }
  info!("wrote {}", output.display());
}
