/// The lexer takes the source input, mapping it into a sequence of tokens.
pub mod lexer;

/// The parser takes a sequence of tokens, mapping it into an AST.
pub mod parser;

/// Desugaring rewrites parsed constructs into the smaller set of forms the
/// later stages understand.
pub mod desugar;

/// The type checker takes an untyped AST, checks the soundness of its types,
/// and annotates every expression with its type.
pub mod type_checker;

pub mod ast;
pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod module;
pub mod scope;
pub mod token;
pub mod types;

pub mod util {
    pub mod fmt;
    #[cfg(test)]
    pub(crate) mod test_utils;
}
