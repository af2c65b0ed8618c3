use std::fmt;

/// Resolved type of a symbol or expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
  Int,
  Char,
  Bool,
  Void,
  Sym,
  Null,
  Class(String),
  Array(Box<Type>),
}

impl Type {
  pub fn array_of(element: Type) -> Self {
    Self::Array(Box::new(element))
  }

  /// Primitive type for a keyword, `None` for anything else.
  pub fn primitive(name: &str) -> Option<Self> {
    match name {
      "int" => Some(Self::Int),
      "char" => Some(Self::Char),
      "bool" => Some(Self::Bool),
      "void" => Some(Self::Void),
      "sym" => Some(Self::Sym),
      _ => None,
    }
  }

  pub fn element(&self) -> Option<&Type> {
    match self {
      Self::Array(element) => Some(element),
      _ => None,
    }
  }

  pub fn class_name(&self) -> Option<&str> {
    match self {
      Self::Class(name) => Some(name),
      _ => None,
    }
  }

  pub fn is_array(&self) -> bool {
    matches!(self, Self::Array(_))
  }

  /// Bytes taken by one element of this type inside an array.
  pub fn element_size(&self) -> i32 {
    match self {
      Self::Char => 1,
      _ => 4,
    }
  }

  /// Whether a value of type `source` may be stored in a slot of this type.
  pub fn accepts(&self, source: &Type) -> bool {
    self == source || *source == Self::Null
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Int => f.write_str("int"),
      Self::Char => f.write_str("char"),
      Self::Bool => f.write_str("bool"),
      Self::Void => f.write_str("void"),
      Self::Sym => f.write_str("sym"),
      Self::Null => f.write_str("null"),
      Self::Class(name) => f.write_str(name),
      Self::Array(element) => write!(f, "@:{element}"),
    }
  }
}

/// Canonical `(T1,T2,...)` spelling used to match call sites to methods.
pub fn signature<'a>(types: impl IntoIterator<Item = &'a Type>) -> String {
  let parts: Vec<String> = types.into_iter().map(Type::to_string).collect();
  format!("({})", parts.join(","))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_and_signature() {
    let types = [
      Type::Int,
      Type::array_of(Type::Char),
      Type::Class("Cat".to_string()),
    ];
    assert_eq!(signature(&types), "(int,@:char,Cat)");
    assert_eq!(signature(&Vec::<Type>::new()), "()");
  }

  #[test]
  fn null_is_accepted_everywhere() {
    assert!(Type::Class("Cat".to_string()).accepts(&Type::Null));
    assert!(Type::Int.accepts(&Type::Int));
    assert!(!Type::Int.accepts(&Type::Char));
  }
}
