use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One segment of a fully-qualified name, with optional generic qualifiers.
///
/// `List[i32]` is a part named `List` with one qualifier, the FQN of `i32`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NSPart {
    pub name: String,
    pub qualifiers: Vec<Fqn>,
}

impl NSPart {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifiers: Vec::new(),
        }
    }
}

/// Fully-qualified name: the globally-unique identifier of a named object.
///
/// The wire format is `modname::part1[qual1, qual2]::part2`, where `modname`
/// may contain dots and qualifiers nest to arbitrary depth. Two FQNs compare
/// equal iff their parts and qualifiers compare equal structurally.
///
/// A numeric `suffix` (`#1`, `#2`, ...) is appended by the VM when minting a
/// name that would otherwise collide (lambdas, closures, specialization
/// artifacts).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fqn {
    pub parts: SmallVec<[NSPart; 2]>,
    pub suffix: Option<u32>,
}

/// Error raised while parsing the FQN wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FqnParseError {
    pub message: String,
}

impl fmt::Display for FqnParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid FQN: {}", self.message)
    }
}

impl std::error::Error for FqnParseError {}

impl Fqn {
    /// Builds an FQN from plain (unqualified) part names.
    ///
    /// # Panics
    /// Panics on an empty part list.
    pub fn from_parts<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let parts: SmallVec<[NSPart; 2]> = names.into_iter().map(NSPart::new).collect();
        assert!(!parts.is_empty(), "FQN needs at least one part");
        Self {
            parts,
            suffix: None,
        }
    }

    /// The module name, i.e. the first part (may contain dots).
    pub fn modname(&self) -> &str {
        &self.parts[0].name
    }

    /// The last part's name, without qualifiers.
    pub fn symbol_name(&self) -> &str {
        &self.parts[self.parts.len() - 1].name
    }

    /// Returns a new FQN with `name` appended as an unqualified part.
    pub fn join(&self, name: &str) -> Self {
        let mut parts = self.parts.clone();
        parts.push(NSPart::new(name));
        Self {
            parts,
            suffix: None,
        }
    }

    /// Returns a new FQN whose last part carries the given qualifiers.
    ///
    /// Used when synthesizing the namespace of a blue call: `make_Point`
    /// called with `i32` becomes `make_Point[i32]`.
    pub fn with_qualifiers(&self, qualifiers: Vec<Self>) -> Self {
        let mut parts = self.parts.clone();
        parts
            .last_mut()
            .expect("FQN always has at least one part")
            .qualifiers = qualifiers;
        Self {
            parts,
            suffix: None,
        }
    }

    pub fn with_suffix(&self, suffix: u32) -> Self {
        Self {
            parts: self.parts.clone(),
            suffix: Some(suffix),
        }
    }

    /// The name shown to users in error messages: builtins are displayed
    /// bare (`i32`, not `builtins::i32`).
    pub fn human_name(&self) -> String {
        if self.suffix.is_none()
            && self.parts.len() == 2
            && self.parts[0].name == "builtins"
            && self.parts[1].qualifiers.is_empty()
        {
            return self.parts[1].name.clone();
        }
        self.to_string()
    }

    /// Flattens the FQN into a C identifier: `.` becomes `_`, `::` becomes
    /// `__`, the suffix becomes `__N`.
    ///
    /// Qualifier brackets need the VM's uniqueness table to encode; plain
    /// parts only here.
    ///
    /// # Panics
    /// Panics if any part carries qualifiers; use [`Fqn::c_name_indexed`].
    pub fn c_name(&self) -> String {
        self.c_name_indexed(&mut |_| panic!("qualified FQN needs c_name_indexed"))
    }

    /// Like [`Fqn::c_name`], but encodes each qualifier bracket group as the
    /// decimal index returned by `qual_index` (the VM's uniqueness table).
    pub fn c_name_indexed(&self, qual_index: &mut dyn FnMut(&Self) -> usize) -> String {
        let mut out = String::from("spy_");
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                out.push_str("__");
            }
            out.push_str(&part.name.replace('.', "_"));
            for q in &part.qualifiers {
                out.push('_');
                out.push_str(&qual_index(q).to_string());
            }
        }
        if let Some(n) = self.suffix {
            out.push_str("__");
            out.push_str(&n.to_string());
        }
        out
    }

    /// Parses the wire format back into an FQN.
    pub fn parse(s: &str) -> Result<Self, FqnParseError> {
        Parser::new(s)?.parse_toplevel()
    }
}

impl FromStr for Fqn {
    type Err = FqnParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Fqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "::")?;
            }
            write!(f, "{}", part.name)?;
            if !part.qualifiers.is_empty() {
                write!(f, "[")?;
                for (j, q) in part.qualifiers.iter().enumerate() {
                    if j > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{q}")?;
                }
                write!(f, "]")?;
            }
        }
        if let Some(n) = self.suffix {
            write!(f, "#{n}")?;
        }
        Ok(())
    }
}

// ==== wire-format parser ====

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Sep,      // ::
    Open,     // [
    Close,    // ]
    Comma,    // ,
    Hash(u32) // #N suffix
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '.'
}

fn is_name_cont(c: char) -> bool {
    is_name_start(c) || c.is_ascii_digit()
}

fn tokenize(s: &str) -> Result<Vec<Token>, FqnParseError> {
    let mut tokens = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '[' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ']' => {
                chars.next();
                tokens.push(Token::Close);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            ':' => {
                chars.next();
                if chars.next() != Some(':') {
                    return Err(FqnParseError {
                        message: "single ':' is not a separator".into(),
                    });
                }
                tokens.push(Token::Sep);
            }
            '#' => {
                chars.next();
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: u32 = digits.parse().map_err(|_| FqnParseError {
                    message: "bad numeric suffix".into(),
                })?;
                tokens.push(Token::Hash(n));
            }
            c if is_name_start(c) => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if is_name_cont(d) {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Name(name));
            }
            other => {
                return Err(FqnParseError {
                    message: format!("unexpected character {other:?}"),
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    i: usize,
}

impl Parser {
    fn new(s: &str) -> Result<Self, FqnParseError> {
        Ok(Self {
            tokens: tokenize(s)?,
            i: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.i)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.i).cloned();
        if tok.is_some() {
            self.i += 1;
        }
        tok
    }

    fn expect(&mut self, tok: &Token) -> Result<(), FqnParseError> {
        match self.bump() {
            Some(ref t) if t == tok => Ok(()),
            other => Err(FqnParseError {
                message: format!("expected {tok:?}, got {other:?}"),
            }),
        }
    }

    fn parse_toplevel(&mut self) -> Result<Fqn, FqnParseError> {
        let mut fqn = self.parse_qn()?;
        if let Some(Token::Hash(n)) = self.peek() {
            fqn.suffix = Some(*n);
            self.i += 1;
        }
        if self.i < self.tokens.len() {
            return Err(FqnParseError {
                message: format!("unexpected trailing token {:?}", self.tokens[self.i]),
            });
        }
        Ok(fqn)
    }

    fn parse_qn(&mut self) -> Result<Fqn, FqnParseError> {
        let mut parts = SmallVec::new();
        loop {
            parts.push(self.parse_part()?);
            if self.peek() == Some(&Token::Sep) {
                self.i += 1;
            } else {
                break;
            }
        }
        Ok(Fqn {
            parts,
            suffix: None,
        })
    }

    fn parse_part(&mut self) -> Result<NSPart, FqnParseError> {
        let name = match self.bump() {
            Some(Token::Name(name)) => name,
            other => {
                return Err(FqnParseError {
                    message: format!("expected a name, got {other:?}"),
                });
            }
        };
        let mut qualifiers = Vec::new();
        if self.peek() == Some(&Token::Open) {
            self.i += 1;
            loop {
                qualifiers.push(self.parse_qn()?);
                match self.peek() {
                    Some(Token::Comma) => self.i += 1,
                    Some(Token::Close) => break,
                    _ => {
                        return Err(FqnParseError {
                            message: "unclosed bracket".into(),
                        });
                    }
                }
            }
            self.expect(&Token::Close)?;
        }
        Ok(NSPart { name, qualifiers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_simple() {
        let fqn = Fqn::from_parts(["aaa", "bbb"]);
        assert_eq!(fqn.to_string(), "aaa::bbb");
        assert_eq!(fqn.modname(), "aaa");
        assert_eq!(fqn.symbol_name(), "bbb");
    }

    #[test]
    fn display_with_suffix() {
        let fqn = Fqn::from_parts(["aaa", "bbb"]).with_suffix(0);
        assert_eq!(fqn.to_string(), "aaa::bbb#0");
        assert_eq!(fqn.c_name(), "spy_aaa__bbb__0");
    }

    #[test]
    fn c_name_dotted_modname() {
        let fqn = Fqn::from_parts(["a.b.c", "xxx"]).with_suffix(0);
        assert_eq!(fqn.c_name(), "spy_a_b_c__xxx__0");
    }

    #[test]
    fn hash_eq_is_structural() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let a = Fqn::from_parts(["aaa", "bbb"]);
        let b = Fqn::from_parts(["aaa", "bbb"]);
        assert_eq!(a, b);
        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn parse_simple() {
        let fqn = Fqn::parse("aaa::bbb").unwrap();
        assert_eq!(fqn, Fqn::from_parts(["aaa", "bbb"]));
    }

    #[test]
    fn parse_suffix() {
        let fqn = Fqn::parse("aaa::bbb#3").unwrap();
        assert_eq!(fqn.suffix, Some(3));
    }

    #[test]
    fn parse_qualifiers() {
        let fqn = Fqn::parse("mod::List[builtins::i32]").unwrap();
        assert_eq!(fqn.parts.len(), 2);
        assert_eq!(fqn.parts[1].name, "List");
        assert_eq!(
            fqn.parts[1].qualifiers,
            vec![Fqn::from_parts(["builtins", "i32"])]
        );
    }

    #[test]
    fn parse_nested_qualifiers() {
        let s = "m::dict[m::str, m::list[m::i32]]::get";
        let fqn = Fqn::parse(s).unwrap();
        assert_eq!(fqn.to_string(), s);
    }

    #[test]
    fn roundtrip() {
        for s in [
            "builtins::i32",
            "a.b.c::xxx",
            "mod::make_Point[builtins::i32]::Point",
            "m::f[m::g[m::h], m::i]::x#7",
        ] {
            let fqn = Fqn::parse(s).unwrap();
            assert_eq!(fqn.to_string(), s, "roundtrip failed for {s}");
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Fqn::parse("a::b]").is_err());
        assert!(Fqn::parse("a::[b").is_err());
        assert!(Fqn::parse("a:b").is_err());
        assert!(Fqn::parse("a::b$c").is_err());
    }

    #[test]
    fn human_name_strips_builtins() {
        assert_eq!(Fqn::from_parts(["builtins", "i32"]).human_name(), "i32");
        assert_eq!(Fqn::from_parts(["mymod", "f"]).human_name(), "mymod::f");
    }
}
