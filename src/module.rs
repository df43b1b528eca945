use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    ast::Body,
    desugar,
    diagnostics::Diagnostics,
    parser,
    scope::Scopes,
    token::SourceLocation,
    types::Type,
};

/// The fully qualified name of a module, such as `std::string`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleName(Vec<String>);

impl ModuleName {
    pub fn new<S: Into<String>>(components: impl IntoIterator<Item = S>) -> ModuleName {
        ModuleName(components.into_iter().map(Into::into).collect())
    }

    /// Parses a name in its `a::b::c` form.
    pub fn parse(name: &str) -> ModuleName {
        ModuleName::new(name.split("::"))
    }

    pub fn bootstrap() -> ModuleName {
        ModuleName::new(["std", "bootstrap"])
    }

    pub fn prelude() -> ModuleName {
        ModuleName::new(["std", "prelude"])
    }

    pub fn components(&self) -> &[String] {
        &self.0
    }

    pub fn is_bootstrap(&self) -> bool {
        self.0.len() == 2 && self.0[0] == "std" && self.0[1] == "bootstrap"
    }

    pub fn is_prelude(&self) -> bool {
        self.0.len() == 2 && self.0[0] == "std" && self.0[1] == "prelude"
    }

    /// Modules in the standard library may use VM instructions.
    pub fn is_std(&self) -> bool {
        self.0.first().is_some_and(|first| first == "std")
    }

    /// The relative path of the module's source file, such as `a/b/c.aeon`.
    pub fn source_path(&self, extension: &str) -> PathBuf {
        let mut path: PathBuf = self.0.iter().collect();
        path.set_extension(extension);
        path
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("::"))
    }
}

/// The contents of a source file, along with the path it was read from.
#[derive(Clone, Debug)]
pub struct SourceUnit {
    pub path: Arc<Path>,
    pub bytes: Vec<u8>,
}

impl SourceUnit {
    pub fn new(path: impl AsRef<Path>, bytes: impl Into<Vec<u8>>) -> SourceUnit {
        SourceUnit {
            path: Arc::from(path.as_ref()),
            bytes: bytes.into(),
        }
    }

    pub fn read(path: impl AsRef<Path>) -> io::Result<SourceUnit> {
        let bytes = fs::read(path.as_ref())?;
        Ok(SourceUnit::new(path, bytes))
    }
}

#[derive(Debug)]
pub struct ParsedModule {
    pub name: ModuleName,
    pub ast: Body,
    pub scopes: Scopes<Type>,
}

impl ParsedModule {
    /// A module without any expressions, used in place of modules that
    /// couldn't be read or parsed.
    pub fn empty(name: ModuleName, path: Arc<Path>) -> ParsedModule {
        let mut scopes = Scopes::new();
        let scope = scopes.add(None);
        let ast = Body::new(Vec::new(), scope, SourceLocation::start_of(path));
        ParsedModule { name, ast, scopes }
    }

    /// The modules imported by this module, along with the location of the
    /// import.
    pub fn dependencies(&self) -> Vec<(ModuleName, SourceLocation)> {
        self.ast
            .children
            .iter()
            .filter(|node| node.is_import())
            .zip(self.ast.imports())
            .map(|(node, import)| (import.module_name(), node.location.clone()))
            .collect()
    }

    pub fn path(&self) -> &Path {
        &self.ast.location.file
    }
}

/// Parses and desugars a module.
///
/// A module with syntax errors gets an empty body located at the start of its
/// file, and isn't desugared.
pub fn parse_module(name: ModuleName, source: &SourceUnit) -> (ParsedModule, Diagnostics) {
    let mut diagnostics = Diagnostics::new();
    let mut scopes = Scopes::new();
    let result = parser::parse_module(&source.bytes, source.path.clone(), &mut scopes);

    match result {
        Ok(mut ast) => {
            desugar::desugar(&name, &mut ast);
            (ParsedModule { name, ast, scopes }, diagnostics)
        }
        Err(error) => {
            log::debug!("syntax error in {name}: {error}");
            diagnostics.syntax_error(&error, error.location.clone());
            (ParsedModule::empty(name, source.path.clone()), diagnostics)
        }
    }
}
