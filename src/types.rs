//! Syntactic type references
//!
//! Declarations refer to types by [`TypeRef`]: a named type with optional
//! type arguments, or an array of another type. Type references are parsed
//! from their printed form (`Map<string, int[]>`) with a small logos lexer,
//! and generic parameters are replaced by [`TypeRef::substitute`].

use logos::Logos;
use std::fmt;

use crate::error::{Error, Result};
use crate::span::Span;

pub const PRIMITIVES: &[&str] = &["bool", "byte", "char", "int", "long", "float", "double", "string"];
pub const VOID: &str = "void";

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum TypeToken {
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*")]
    Ident,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token(",")]
    Comma,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
}

/// A type as written at a use site
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Named { name: String, args: Vec<TypeRef> },
    Array(Box<TypeRef>),
}

impl TypeRef {
    /// How deeply type arguments nest: `int` is 0, `List<int>` 1,
    /// `List<List<int>[]>` 2
    pub fn nesting_depth(&self) -> usize {
        match self {
            TypeRef::Array(element) => element.nesting_depth(),
            TypeRef::Named { args, .. } if args.is_empty() => 0,
            TypeRef::Named { args, .. } => 1 + args.iter().map(TypeRef::nesting_depth).max().unwrap_or(0),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeRef>) -> Self {
        TypeRef::Named {
            name: name.into(),
            args,
        }
    }

    pub fn array_of(element: TypeRef) -> Self {
        TypeRef::Array(Box::new(element))
    }

    pub fn void() -> Self {
        Self::named(VOID)
    }

    /// Parse a printed type reference
    pub fn parse(source: &str) -> Result<Self> {
        let tokens: Vec<(TypeToken, &str)> = {
            let mut lexer = TypeToken::lexer(source);
            let mut out = Vec::new();
            while let Some(token) = lexer.next() {
                match token {
                    Ok(token) => out.push((token, lexer.slice())),
                    Err(()) => {
                        return Err(Error::syntax(
                            format!("unexpected '{}' in type '{}'", lexer.slice(), source),
                            Span::default(),
                        ))
                    }
                }
            }
            out
        };
        let mut parser = TypeParser { tokens: &tokens, pos: 0, source };
        let ty = parser.parse_type()?;
        if parser.pos != tokens.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(ty)
    }

    /// Simple (base) name: `List` for `List<int>`, element name for arrays
    pub fn base_name(&self) -> &str {
        match self {
            TypeRef::Named { name, .. } => name,
            TypeRef::Array(element) => element.base_name(),
        }
    }

    pub fn args(&self) -> &[TypeRef] {
        match self {
            TypeRef::Named { args, .. } => args,
            TypeRef::Array(_) => &[],
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeRef::Named { name, args } if name == VOID && args.is_empty())
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Named { name, args } if args.is_empty() && PRIMITIVES.contains(&name.as_str()))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, TypeRef::Array(_))
    }

    /// Whether this reference names a parameterized instance (`List<int>`)
    pub fn is_parameterized(&self) -> bool {
        matches!(self, TypeRef::Named { args, .. } if !args.is_empty())
    }

    /// Whether any of `params` occurs anywhere in this reference
    pub fn mentions_any(&self, params: &[String]) -> bool {
        match self {
            TypeRef::Named { name, args } => {
                (args.is_empty() && params.iter().any(|p| p == name)) || args.iter().any(|a| a.mentions_any(params))
            }
            TypeRef::Array(element) => element.mentions_any(params),
        }
    }

    /// Replace every bound type parameter by its argument
    pub fn substitute(&self, binding: &TypeBinding) -> TypeRef {
        match self {
            TypeRef::Named { name, args } if args.is_empty() => match binding.get(name) {
                Some(bound) => bound.clone(),
                None => self.clone(),
            },
            TypeRef::Named { name, args } => TypeRef::Named {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute(binding)).collect(),
            },
            TypeRef::Array(element) => TypeRef::Array(Box::new(element.substitute(binding))),
        }
    }

    /// Printed form, used as the full name of concrete types
    pub fn full_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        write!(f, "{}", arg)?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            TypeRef::Array(element) => write!(f, "{}[]", element),
        }
    }
}

struct TypeParser<'t, 's> {
    tokens: &'t [(TypeToken, &'s str)],
    pos: usize,
    source: &'s str,
}

impl<'t, 's> TypeParser<'t, 's> {
    fn peek(&self) -> Option<TypeToken> {
        self.tokens.get(self.pos).map(|(t, _)| *t)
    }

    fn expect(&mut self, expected: TypeToken) -> Result<&'s str> {
        match self.tokens.get(self.pos) {
            Some((token, text)) if *token == expected => {
                self.pos += 1;
                Ok(text)
            }
            _ => Err(self.error(&format!("expected {:?}", expected))),
        }
    }

    fn error(&self, what: &str) -> Error {
        Error::syntax(format!("{} at token {} in type '{}'", what, self.pos, self.source), Span::default())
    }

    fn parse_type(&mut self) -> Result<TypeRef> {
        let name = self.expect(TypeToken::Ident)?.to_string();
        let mut args = Vec::new();
        if self.peek() == Some(TypeToken::Lt) {
            self.pos += 1;
            loop {
                args.push(self.parse_type()?);
                match self.peek() {
                    Some(TypeToken::Comma) => self.pos += 1,
                    Some(TypeToken::Gt) => {
                        self.pos += 1;
                        break;
                    }
                    _ => return Err(self.error("expected ',' or '>'")),
                }
            }
        }
        let mut ty = TypeRef::Named { name, args };
        while self.peek() == Some(TypeToken::LBracket) {
            self.pos += 1;
            self.expect(TypeToken::RBracket)?;
            ty = TypeRef::array_of(ty);
        }
        Ok(ty)
    }
}

/// Ordered binding of type-parameter names to argument types
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TypeBinding {
    pairs: Vec<(String, TypeRef)>,
}

impl TypeBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zip declared parameters with arguments; arity must match
    pub fn bind(params: &[String], args: &[TypeRef], span: Span) -> Result<Self> {
        if params.len() != args.len() {
            return Err(Error::type_mismatch(
                format!("{} type argument(s)", params.len()),
                format!("{}", args.len()),
                span,
            ));
        }
        Ok(Self {
            pairs: params.iter().cloned().zip(args.iter().cloned()).collect(),
        })
    }

    pub fn get(&self, param: &str) -> Option<&TypeRef> {
        self.pairs.iter().find(|(p, _)| p == param).map(|(_, t)| t)
    }

    pub fn args(&self) -> Vec<TypeRef> {
        self.pairs.iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Apply an outer binding to every argument of this one
    pub fn compose(&self, outer: &TypeBinding) -> TypeBinding {
        TypeBinding {
            pairs: self.pairs.iter().map(|(p, t)| (p.clone(), t.substitute(outer))).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_generic_array() {
        let ty = TypeRef::parse("Map<string, List<int>[]>").unwrap();
        assert_eq!(ty.base_name(), "Map");
        assert_eq!(ty.args().len(), 2);
        assert!(ty.args()[1].is_array());
        assert_eq!(ty.to_string(), "Map<string, List<int>[]>");
    }

    #[test]
    fn test_nesting_depth() {
        assert_eq!(TypeRef::parse("int").unwrap().nesting_depth(), 0);
        assert_eq!(TypeRef::parse("int[]").unwrap().nesting_depth(), 0);
        assert_eq!(TypeRef::parse("List<int>").unwrap().nesting_depth(), 1);
        assert_eq!(TypeRef::parse("Map<string, List<List<int>>[]>").unwrap().nesting_depth(), 3);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TypeRef::parse("List<int").is_err());
        assert!(TypeRef::parse("int]").is_err());
        assert!(TypeRef::parse("a + b").is_err());
    }

    #[test]
    fn test_substitute_binding() {
        let params = vec!["K".to_string(), "V".to_string()];
        let binding = TypeBinding::bind(&params, &[TypeRef::named("string"), TypeRef::named("int")], Span::default()).unwrap();
        let ty = TypeRef::parse("Map<K, V[]>").unwrap();
        assert!(ty.mentions_any(&params));
        let concrete = ty.substitute(&binding);
        assert_eq!(concrete.to_string(), "Map<string, int[]>");
        assert!(!concrete.mentions_any(&params));
    }

    #[test]
    fn test_bind_arity_mismatch() {
        let err = TypeBinding::bind(&["T".to_string()], &[], Span::default()).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_primitive_and_void() {
        assert!(TypeRef::named("int").is_primitive());
        assert!(!TypeRef::parse("int[]").unwrap().is_primitive());
        assert!(TypeRef::void().is_void());
    }
}
