use std::{fmt, path::Path};

use crate::token::SourceLocation;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Error => "error",
            Level::Warning => "warning",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
    pub location: SourceLocation,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }

    pub fn file(&self) -> &Path {
        &self.location.file
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.location.file.display(),
            self.location,
            self.level,
            self.message
        )
    }
}

/// An append-only collection of errors and warnings.
///
/// Once an error has been added, [`Diagnostics::has_errors`] stays true.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    values: Vec<Diagnostic>,
    errors: bool,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn error(&mut self, message: impl Into<String>, location: SourceLocation) {
        self.errors = true;
        self.values.push(Diagnostic {
            level: Level::Error,
            message: message.into(),
            location,
        });
    }

    pub fn warning(&mut self, message: impl Into<String>, location: SourceLocation) {
        self.values.push(Diagnostic {
            level: Level::Warning,
            message: message.into(),
            location,
        });
    }

    pub fn has_errors(&self) -> bool {
        self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn append(&mut self, other: Diagnostics) {
        self.errors |= other.errors;
        self.values.extend(other.values);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.values.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.values.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.values.iter().filter(|d| !d.is_error())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

// Messages of the diagnostics reported by the compiler.
impl Diagnostics {
    pub fn syntax_error(&mut self, message: impl fmt::Display, location: SourceLocation) {
        self.error(message.to_string(), location);
    }

    pub fn module_not_found(&mut self, name: impl fmt::Display, location: SourceLocation) {
        self.error(format!("the module `{name}` could not be found"), location);
    }

    pub fn unreadable_source(&mut self, path: &Path, error: impl fmt::Display, location: SourceLocation) {
        self.error(
            format!("the file `{}` could not be read: {error}", path.display()),
            location,
        );
    }

    pub fn undefined_type(&mut self, name: &str, location: SourceLocation) {
        self.error(format!("the type `{name}` is undefined"), location);
    }

    pub fn undefined_local(&mut self, name: &str, location: SourceLocation) {
        self.error(format!("the local variable `{name}` is undefined"), location);
    }

    pub fn undefined_attribute(&mut self, name: &str, location: SourceLocation) {
        self.error(format!("the attribute `{name}` is undefined"), location);
    }

    pub fn redefined_type(&mut self, name: &str, location: SourceLocation) {
        self.error(format!("the type `{name}` has already been defined"), location);
    }

    pub fn redefined_method(&mut self, name: &str, location: SourceLocation) {
        self.error(format!("the method `{name}` has already been defined"), location);
    }

    pub fn redefined_attribute(&mut self, name: &str, location: SourceLocation) {
        self.error(format!("the attribute `{name}` has already been defined"), location);
    }

    pub fn redefined_argument(&mut self, name: &str, location: SourceLocation) {
        self.error(format!("the argument `{name}` has already been defined"), location);
    }

    pub fn not_a_trait(&mut self, name: &str, location: SourceLocation) {
        self.error(format!("the type `{name}` is not a trait"), location);
    }

    pub fn not_an_object(&mut self, name: &str, location: SourceLocation) {
        self.error(format!("the type `{name}` is not an object"), location);
    }

    pub fn type_argument_count_mismatch(
        &mut self,
        name: &str,
        given: usize,
        expected: usize,
        location: SourceLocation,
    ) {
        self.error(
            format!("the type `{name}` takes {expected} type argument(s), but {given} were given"),
            location,
        );
    }

    pub fn argument_count_mismatch(
        &mut self,
        name: &str,
        given: usize,
        expected: impl fmt::Display,
        location: SourceLocation,
    ) {
        self.error(
            format!("the method `{name}` takes {expected} argument(s), but {given} were given"),
            location,
        );
    }

    pub fn missing_trait_method(
        &mut self,
        trait_name: &str,
        method: &str,
        object: &str,
        location: SourceLocation,
    ) {
        self.error(
            format!("the type `{object}` must implement the method `{method}` required by `{trait_name}`"),
            location,
        );
    }

    pub fn type_mismatch(
        &mut self,
        expected: impl fmt::Display,
        found: impl fmt::Display,
        location: SourceLocation,
    ) {
        self.error(
            format!("expected a value of type `{expected}`, but found `{found}`"),
            location,
        );
    }

    pub fn missing_argument_type(&mut self, name: &str, location: SourceLocation) {
        self.error(
            format!("the argument `{name}` of a method must have a type"),
            location,
        );
    }

    pub fn try_without_else_outside_method(&mut self, location: SourceLocation) {
        self.error(
            "`try` without `else` can only be used in a method that may throw",
            location,
        );
    }

    pub fn throw_without_throw_type(&mut self, location: SourceLocation) {
        self.error(
            "`throw` can only be used in a block or method that declares a throw type",
            location,
        );
    }

    pub fn return_outside_method(&mut self, location: SourceLocation) {
        self.error("`return` can only be used inside a method", location);
    }

    pub fn reassign_immutable(&mut self, name: &str, location: SourceLocation) {
        self.error(
            format!("the local variable `{name}` is immutable and can't be reassigned"),
            location,
        );
    }

    pub fn instruction_outside_std(&mut self, location: SourceLocation) {
        self.error(
            "VM instructions can only be used by modules in the `std` namespace",
            location,
        );
    }

    pub fn match_not_exhaustive(&mut self, location: SourceLocation) {
        self.warning(
            "this `match` has no `else` case and may not be exhaustive",
            location,
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn location() -> SourceLocation {
        SourceLocation::new(Arc::from(Path::new("a.aeon")), 2..=2, 4)
    }

    #[test]
    fn errors_are_sticky() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.match_not_exhaustive(location());
        assert!(!diagnostics.has_errors());

        diagnostics.undefined_local("x", location());
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.errors().count(), 1);
        assert_eq!(diagnostics.warnings().count(), 1);
    }

    #[test]
    fn append_keeps_order_and_error_flag() {
        let mut first = Diagnostics::new();
        first.warning("a", location());
        let mut second = Diagnostics::new();
        second.error("b", location());

        first.append(second);
        assert!(first.has_errors());
        let messages: Vec<_> = first.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(messages, ["a", "b"]);
    }

    #[test]
    fn display() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.undefined_type("Foo", location());
        let text = diagnostics.iter().next().unwrap().to_string();
        assert_eq!(text, "a.aeon:2:4: error: the type `Foo` is undefined");
    }
}
