//! Rewrites of the module AST that run after parsing.

use crate::{
    ast::{Body, Import, ImportSegment, ImportSymbol, Node, NodeKind},
    module::ModuleName,
    token::SourceLocation,
};

pub fn desugar(module: &ModuleName, body: &mut Body) {
    add_implicit_self_symbols(body);
    add_implicit_imports(module, body);
    hoist_imports(body);
}

/// `import a::b` imports the module itself, as if written `import a::b::(self)`.
pub fn add_implicit_self_symbols(body: &mut Body) {
    for node in &mut body.children {
        let NodeKind::Import(import) = &mut node.kind else {
            continue;
        };
        if import.import_all || !import.symbols.is_empty() {
            continue;
        }
        if let Some(last) = import.path.last() {
            let location = last.location.clone();
            import.symbols.push(ImportSymbol::SelfModule {
                alias: None,
                location,
            });
        }
    }
}

/// Imports everything from the bootstrap and prelude modules.
///
/// The bootstrap module imports neither, and the prelude only imports the
/// bootstrap module. Bootstrap always comes first.
pub fn add_implicit_imports(module: &ModuleName, body: &mut Body) {
    if module.is_bootstrap() {
        return;
    }

    let mut implicit = vec![wildcard_import(&ModuleName::bootstrap(), &body.location)];
    if !module.is_prelude() {
        implicit.push(wildcard_import(&ModuleName::prelude(), &body.location));
    }
    body.children.splice(0..0, implicit);
}

fn wildcard_import(module: &ModuleName, location: &SourceLocation) -> Node {
    let path = module
        .components()
        .iter()
        .map(|name| ImportSegment {
            name: name.clone(),
            location: location.clone(),
        })
        .collect();
    let import = Import {
        path,
        symbols: Vec::new(),
        import_all: true,
    };
    Node::new(NodeKind::Import(import), location.clone())
}

/// Moves all imports to the start of the body.
///
/// The relative order of imports, and of all other expressions, is preserved.
pub fn hoist_imports(body: &mut Body) {
    let (mut imports, rest): (Vec<Node>, Vec<Node>) =
        body.children.drain(..).partition(Node::is_import);
    imports.extend(rest);
    body.children = imports;
}
