//! Source-like formatting of type annotations and signatures.

use std::fmt;

use crate::ast::{ArgumentDefinition, BlockTypeNode, Signature, TypeNode, TypeNodeKind, TypeParameter};

pub mod tree;

impl fmt::Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeNodeKind::Constant {
                module,
                name,
                type_arguments,
            } => {
                if let Some(module) = module {
                    write!(f, "{module}::")?;
                }
                f.write_str(name)?;
                if !type_arguments.is_empty() {
                    f.write_str("!(")?;
                    comma_separated(f, type_arguments)?;
                    f.write_str(")")?;
                }
                Ok(())
            }
            TypeNodeKind::Optional(inner) => write!(f, "?{inner}"),
            TypeNodeKind::Closure(block) => write!(f, "do{block}"),
            TypeNodeKind::Lambda(block) => write!(f, "lambda{block}"),
        }
    }
}

impl fmt::Display for BlockTypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.arguments.is_empty() {
            f.write_str(" (")?;
            comma_separated(f, &self.arguments)?;
            f.write_str(")")?;
        }
        if let Some(throw_type) = &self.throw_type {
            write!(f, " !! {throw_type}")?;
        }
        if let Some(return_type) = &self.return_type {
            write!(f, " -> {return_type}")?;
        }
        Ok(())
    }
}

impl fmt::Display for TypeParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (i, bound) in self.required_traits.iter().enumerate() {
            f.write_str(if i == 0 { ": " } else { " + " })?;
            write!(f, "{bound}")?;
        }
        Ok(())
    }
}

impl fmt::Display for ArgumentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_rest() {
            f.write_str("*")?;
        } else if self.is_mutable() {
            f.write_str("mut ")?;
        }
        f.write_str(self.name())?;
        if let Some(value_type) = self.value_type() {
            write!(f, ": {value_type}")?;
        }
        if self.is_optional() {
            f.write_str(" = ...")?;
        }
        Ok(())
    }
}

/// Formats as `!(T)(a: A, b: B) !! E -> R`, leaving out the parts that are
/// absent.
impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        type_parameters(f, &self.type_parameters)?;
        if !self.arguments.is_empty() {
            f.write_str("(")?;
            comma_separated(f, &self.arguments)?;
            f.write_str(")")?;
        }
        if let Some(throw_type) = &self.throw_type {
            write!(f, " !! {throw_type}")?;
        }
        if let Some(return_type) = &self.return_type {
            write!(f, " -> {return_type}")?;
        }
        Ok(())
    }
}

pub fn type_parameters(f: &mut impl fmt::Write, params: &[TypeParameter]) -> fmt::Result {
    if params.is_empty() {
        return Ok(());
    }
    f.write_str("!(")?;
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{param}")?;
    }
    f.write_str(")")
}

fn comma_separated<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
