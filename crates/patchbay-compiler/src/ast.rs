//! Target-agnostic code AST.
//!
//! Generated code is a [`Sequence`] of [`AstElement`]s: verbatim text
//! fragments interleaved with structured declarations (variables, functions).
//! Everything derives structural equality and hashing, so two independently
//! generated fragments with identical content compare equal and can be
//! deduplicated by set insertion.
//!
//! Adjacent text fragments are merged on insertion and empty ones dropped, so
//! equality does not depend on how a fragment was assembled.
//!
//! The [`Display`](std::fmt::Display) impl is a neutral pseudo-code dump for
//! logs and tests; rendering to an actual target language is the renderer's job.

use std::fmt;

use serde::Serialize;

/// Type of a variable, argument or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TypeName {
    /// Floating point sample value; its width follows the configured bit depth.
    Float,
    /// Integer.
    Int,
    /// Boolean.
    Boolean,
    /// String.
    String,
    /// A message (list of floats and strings).
    Message,
    /// No value.
    Void,
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeName::Float => "Float",
            TypeName::Int => "Int",
            TypeName::Boolean => "Boolean",
            TypeName::String => "String",
            TypeName::Message => "Message",
            TypeName::Void => "void",
        };
        f.write_str(name)
    }
}

/// A typed name, used for function arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Identifier.
    pub name: String,
    /// Type.
    pub type_name: TypeName,
}

impl Variable {
    /// Creates a typed name.
    pub fn new(name: impl Into<String>, type_name: TypeName) -> Self {
        Self {
            name: name.into(),
            type_name,
        }
    }
}

/// Variable declaration, optionally initialized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VarDeclaration {
    /// `let` (true) or `const` (false).
    pub mutable: bool,
    /// Declared name and type.
    pub variable: Variable,
    /// Initial value.
    pub value: Option<Sequence>,
}

/// Function declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Func {
    /// Function name.
    pub name: String,
    /// Arguments in order.
    pub args: Vec<Variable>,
    /// Return type.
    pub return_type: TypeName,
    /// Function body.
    pub body: Sequence,
}

impl Func {
    /// Creates a function with no arguments returning `void`.
    pub fn new(name: impl Into<String>, body: Sequence) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            return_type: TypeName::Void,
            body,
        }
    }

    /// Appends an argument.
    pub fn with_arg(mut self, name: impl Into<String>, type_name: TypeName) -> Self {
        self.args.push(Variable::new(name, type_name));
        self
    }

    /// Sets the return type.
    pub fn returning(mut self, type_name: TypeName) -> Self {
        self.return_type = type_name;
        self
    }
}

/// One element of a code [`Sequence`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "astType", content = "value")]
pub enum AstElement {
    /// Verbatim code.
    Text(String),
    /// Variable declaration.
    Var(VarDeclaration),
    /// Function declaration.
    Func(Func),
}

impl From<&str> for AstElement {
    fn from(text: &str) -> Self {
        AstElement::Text(text.to_owned())
    }
}

impl From<String> for AstElement {
    fn from(text: String) -> Self {
        AstElement::Text(text)
    }
}

impl From<Func> for AstElement {
    fn from(func: Func) -> Self {
        AstElement::Func(func)
    }
}

impl From<VarDeclaration> for AstElement {
    fn from(var: VarDeclaration) -> Self {
        AstElement::Var(var)
    }
}

/// Ordered list of code elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sequence(Vec<AstElement>);

impl Sequence {
    /// Creates an empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sequence holding one text fragment.
    pub fn text(text: impl Into<String>) -> Self {
        let mut seq = Self::new();
        seq.push(AstElement::Text(text.into()));
        seq
    }

    /// Appends an element, merging it into a trailing text fragment if both are text.
    pub fn push(&mut self, element: impl Into<AstElement>) {
        match element.into() {
            AstElement::Text(text) if text.is_empty() => {}
            AstElement::Text(text) => match self.0.last_mut() {
                Some(AstElement::Text(last)) => last.push_str(&text),
                _ => self.0.push(AstElement::Text(text)),
            },
            other => self.0.push(other),
        }
    }

    /// Builder form of [`push()`](Self::push).
    pub fn then(mut self, element: impl Into<AstElement>) -> Self {
        self.push(element);
        self
    }

    /// Appends all elements of `other`.
    pub fn append(&mut self, other: Sequence) {
        for element in other.0 {
            self.push(element);
        }
    }

    /// Declares a `const`.
    pub fn constant(mut self, name: impl Into<String>, type_name: TypeName, value: Sequence) -> Self {
        self.push(VarDeclaration {
            mutable: false,
            variable: Variable::new(name, type_name),
            value: Some(value),
        });
        self
    }

    /// Declares a `let`.
    pub fn variable(
        mut self,
        name: impl Into<String>,
        type_name: TypeName,
        value: Option<Sequence>,
    ) -> Self {
        self.push(VarDeclaration {
            mutable: true,
            variable: Variable::new(name, type_name),
            value,
        });
        self
    }

    /// The elements of this sequence.
    pub fn elements(&self) -> &[AstElement] {
        &self.0
    }

    /// Whether the sequence has no elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Function declarations at the top level of this sequence.
    pub fn funcs(&self) -> impl Iterator<Item = &Func> {
        self.0.iter().filter_map(|e| match e {
            AstElement::Func(func) => Some(func),
            _ => None,
        })
    }
}

impl From<Func> for Sequence {
    fn from(func: Func) -> Self {
        Sequence(vec![AstElement::Func(func)])
    }
}

impl FromIterator<Sequence> for Sequence {
    fn from_iter<I: IntoIterator<Item = Sequence>>(iter: I) -> Self {
        let mut seq = Sequence::new();
        for other in iter {
            seq.append(other);
        }
        seq
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.0 {
            match element {
                AstElement::Text(text) => f.write_str(text)?,
                AstElement::Var(var) => {
                    let keyword = if var.mutable { "let" } else { "const" };
                    write!(
                        f,
                        "{keyword} {}: {}",
                        var.variable.name, var.variable.type_name
                    )?;
                    if let Some(value) = &var.value {
                        write!(f, " = {value}")?;
                    }
                    f.write_str("\n")?;
                }
                AstElement::Func(func) => {
                    let args: Vec<String> = func
                        .args
                        .iter()
                        .map(|a| format!("{}: {}", a.name, a.type_name))
                        .collect();
                    writeln!(
                        f,
                        "function {}({}): {} {{\n{}\n}}",
                        func.name,
                        args.join(", "),
                        func.return_type,
                        func.body
                    )?;
                }
            }
        }
        Ok(())
    }
}
