use std::collections::{HashMap, HashSet};

use crate::{
    ast::{
        self, ArgumentDefinition, Block, Body, ImportSymbol, MatchCase, Node, NodeKind, Signature,
        TypeNode, TypeNodeKind, TypeParameter,
    },
    diagnostics::Diagnostics,
    module::{ModuleName, ParsedModule},
    parser::INTRINSIC_RECEIVER,
    scope::{ScopeId, Scopes},
    token::SourceLocation,
    types::{
        self, BlockKind, BlockType, Instance, Method, Type, TypeId, TypeKind, TypeParameterType,
        TypeRegistry,
    },
};

/// The types visible in a module, by name.
type TypeScope = HashMap<String, TypeId>;

/// Names visible at the top level of a module.
#[derive(Default)]
struct ModuleScope {
    types: TypeScope,
    /// Modules imported as a value, by the name they are bound to.
    modules: HashMap<String, ModuleName>,
    /// Methods, constants and types that can be referred to by name.
    values: HashSet<String>,
    /// Set when a wildcard import refers to a module that isn't part of the
    /// compilation, in which case unknown names can't be reported.
    open: bool,
}

/// What a module defines at its top level.
#[derive(Default)]
struct Exports {
    types: TypeScope,
    values: HashSet<String>,
}

pub struct Checker {
    registry: TypeRegistry,
    diagnostics: Diagnostics,
}

impl Checker {
    pub fn with_capacity(capacity: usize) -> Checker {
        Checker {
            registry: TypeRegistry::with_capacity(capacity),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Checks the modules, in three passes: types are defined first, then
    /// their members, and then all bodies are checked.
    pub fn check(mut self, modules: &mut [ParsedModule]) -> (TypeRegistry, Diagnostics) {
        let exports: HashMap<ModuleName, Exports> = modules
            .iter()
            .map(|module| (module.name.clone(), self.define_types(module)))
            .collect();
        let module_scopes: Vec<ModuleScope> = modules
            .iter()
            .map(|module| import_names(module, &exports))
            .collect();

        let mut implementations = Vec::new();
        for (module, scope) in modules.iter_mut().zip(&module_scopes) {
            let mut checker = ModuleChecker::new(
                self.context(),
                scope,
                &exports,
                &module.name,
                &mut module.scopes,
            );
            checker.define_members(&module.ast, &mut implementations);
        }

        for (trait_id, object_id, location) in implementations {
            self.check_trait_methods(trait_id, object_id, location);
        }

        for (module, scope) in modules.iter_mut().zip(&module_scopes) {
            let mut checker = ModuleChecker::new(
                self.context(),
                scope,
                &exports,
                &module.name,
                &mut module.scopes,
            );
            checker.check_module(&module.ast);
        }

        (self.registry, self.diagnostics)
    }

    fn context(&mut self) -> Context<'_> {
        Context {
            registry: &mut self.registry,
            diagnostics: &mut self.diagnostics,
        }
    }

    /// Defines the objects and traits of a module.
    fn define_types(&mut self, module: &ParsedModule) -> Exports {
        let mut exports = Exports::default();

        for node in &module.ast.children {
            let (name, kind, type_parameters) = match &node.kind {
                NodeKind::ObjectDefinition {
                    name,
                    type_parameters,
                    ..
                } => (name, TypeKind::Object, type_parameters),
                NodeKind::TraitDefinition {
                    name,
                    type_parameters,
                    ..
                } => (name, TypeKind::Trait, type_parameters),
                NodeKind::MethodDefinition(method) => {
                    exports.values.insert(method.name.clone());
                    continue;
                }
                NodeKind::DefineConstant { name, .. } => {
                    exports.values.insert(name.clone());
                    continue;
                }
                _ => continue,
            };

            if self.registry.is_builtin_name(name) || exports.types.contains_key(name) {
                self.diagnostics.redefined_type(name, node.location.clone());
                continue;
            }

            let id = self.registry.define(name, kind, Some(node.location.clone()));
            self.registry.get_mut(id).type_parameters = type_parameters
                .iter()
                .map(|param| TypeParameterType {
                    name: param.name.clone(),
                    required_traits: Vec::new(),
                })
                .collect();
            exports.types.insert(name.clone(), id);
            exports.values.insert(name.clone());
        }

        log::debug!("{} defines {} types", module.name, exports.types.len());
        exports
    }

    /// Reports the methods required by a trait that an implementation lacks.
    fn check_trait_methods(&mut self, trait_id: TypeId, object_id: TypeId, location: SourceLocation) {
        let object = self.registry.get(object_id);
        let mut work = vec![trait_id];
        let mut seen = HashSet::new();
        let mut missing = Vec::new();

        while let Some(id) = work.pop() {
            if !seen.insert(id) {
                continue;
            }
            let definition = self.registry.get(id);
            for name in definition.required_methods.keys() {
                if !object.methods.contains_key(name) && !definition.methods.contains_key(name) {
                    missing.push((definition.name.clone(), name.clone()));
                }
            }
            work.extend(
                definition
                    .required_traits
                    .iter()
                    .filter_map(Type::instance)
                    .map(|instance| instance.id),
            );
        }

        missing.sort();
        let object_name = object.name.clone();
        for (trait_name, method) in missing {
            self.diagnostics
                .missing_trait_method(&trait_name, &method, &object_name, location.clone());
        }
    }
}

/// Collects the names a module can refer to: its own definitions, and those
/// it imports.
fn import_names(module: &ParsedModule, exports: &HashMap<ModuleName, Exports>) -> ModuleScope {
    let mut scope = ModuleScope::default();
    if let Some(own) = exports.get(&module.name) {
        scope.types.clone_from(&own.types);
        scope.values.clone_from(&own.values);
    }

    for import in module.ast.imports() {
        let name = import.module_name();
        let imported = exports.get(&name);

        if import.import_all {
            match imported {
                Some(imported) => {
                    for (type_name, id) in &imported.types {
                        scope.types.entry(type_name.clone()).or_insert(*id);
                    }
                    scope.values.extend(imported.values.iter().cloned());
                }
                None => scope.open = true,
            }
        }

        for symbol in &import.symbols {
            let Some(bound_as) = symbol.import_as(import) else {
                continue;
            };
            scope.values.insert(bound_as.to_string());
            match symbol {
                ImportSymbol::SelfModule { .. } => {
                    scope.modules.insert(bound_as.to_string(), name.clone());
                }
                ImportSymbol::Named { name: symbol, .. } => {
                    if let Some(id) = imported.and_then(|i| i.types.get(symbol)) {
                        scope.types.entry(bound_as.to_string()).or_insert(*id);
                    }
                }
            }
        }
    }

    scope
}

struct Context<'a> {
    registry: &'a mut TypeRegistry,
    diagnostics: &'a mut Diagnostics,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FrameKind {
    Module,
    TypeBody,
    Method,
    Closure,
    Lambda,
}

impl FrameKind {
    fn is_block(self) -> bool {
        matches!(self, FrameKind::Method | FrameKind::Closure | FrameKind::Lambda)
    }
}

/// The innermost body being checked.
struct Frame {
    kind: FrameKind,
    self_type: Type,
    /// `None` if the body may not throw. Closures without a throw type infer
    /// it, and get `Dynamic`.
    throw_type: Option<Type>,
    return_type: Type,
}

/// A method defined at the top level of a module.
struct ModuleMethod {
    required: usize,
    total: usize,
    rest: bool,
    return_type: Type,
}

impl ModuleMethod {
    fn accepts(&self, given: usize) -> bool {
        given >= self.required && (self.rest || given <= self.total)
    }

    fn expected(&self) -> String {
        if self.rest {
            format!("at least {}", self.required)
        } else if self.required == self.total {
            self.required.to_string()
        } else {
            format!("{} to {}", self.required, self.total)
        }
    }
}

struct ModuleChecker<'a> {
    registry: &'a mut TypeRegistry,
    diagnostics: &'a mut Diagnostics,
    names: &'a ModuleScope,
    exports: &'a HashMap<ModuleName, Exports>,
    module: &'a ModuleName,
    scopes: &'a mut Scopes<Type>,
    frames: Vec<Frame>,
    /// The type parameters in scope, innermost last.
    type_parameters: Vec<TypeParameterType>,
    methods: HashMap<String, ModuleMethod>,
}

impl<'a> ModuleChecker<'a> {
    fn new(
        context: Context<'a>,
        names: &'a ModuleScope,
        exports: &'a HashMap<ModuleName, Exports>,
        module: &'a ModuleName,
        scopes: &'a mut Scopes<Type>,
    ) -> ModuleChecker<'a> {
        ModuleChecker {
            registry: context.registry,
            diagnostics: context.diagnostics,
            names,
            exports,
            module,
            scopes,
            frames: Vec::new(),
            type_parameters: Vec::new(),
            methods: HashMap::new(),
        }
    }

    // Types

    /// Resolves a type annotation.
    ///
    /// The result is stored in the node, so resolving it again reports nothing
    /// new.
    fn resolve_type(&mut self, node: &TypeNode) -> Type {
        if let Some(ty) = node.resolved_type.get() {
            return ty.clone();
        }
        let ty = match &node.kind {
            TypeNodeKind::Constant {
                module,
                name,
                type_arguments,
            } => self.resolve_constant_type(module.as_deref(), name, type_arguments, &node.location),
            TypeNodeKind::Optional(inner) => self.resolve_type(inner).optional(),
            TypeNodeKind::Closure(block) => {
                Type::Block(Box::new(self.resolve_block_type(BlockKind::Closure, block)))
            }
            TypeNodeKind::Lambda(block) => {
                Type::Block(Box::new(self.resolve_block_type(BlockKind::Lambda, block)))
            }
        };
        node.resolved_type.set(ty.clone());
        ty
    }

    fn resolve_constant_type(
        &mut self,
        module: Option<&str>,
        name: &str,
        type_arguments: &[TypeNode],
        location: &SourceLocation,
    ) -> Type {
        let arguments: Vec<Type> = type_arguments.iter().map(|t| self.resolve_type(t)).collect();

        let id = match module {
            None => {
                if let Some(param) = self.type_parameter(name) {
                    return Type::Parameter(param.clone());
                }
                if name == types::DYNAMIC {
                    return Type::Dynamic;
                }
                let id = self
                    .names
                    .types
                    .get(name)
                    .copied()
                    .or_else(|| self.registry.builtin(name));
                if id.is_none() && self.names.open {
                    return Type::Dynamic;
                }
                id
            }
            Some(module) => match self.names.modules.get(module) {
                Some(imported) => match self.exports.get(imported) {
                    Some(exports) => exports.types.get(name).copied(),
                    None => return Type::Dynamic,
                },
                None => None,
            },
        };

        let Some(id) = id else {
            let full_name = match module {
                Some(module) => format!("{module}::{name}"),
                None => name.to_string(),
            };
            self.diagnostics.undefined_type(&full_name, location.clone());
            return Type::Dynamic;
        };

        let definition = self.registry.get(id);
        let mut instance = Instance::new(id, definition.name.clone());
        let kind = definition.kind;
        let parameters = definition.type_parameters.clone();

        if !arguments.is_empty() {
            if arguments.len() == parameters.len() {
                for ((argument, param), node) in arguments.iter().zip(parameters).zip(type_arguments) {
                    let param = Type::Parameter(param);
                    if !argument.is_compatible_with(&param, self.registry) {
                        self.diagnostics
                            .type_mismatch(&param, argument, node.location.clone());
                    }
                }
                instance.arguments = arguments;
            } else {
                self.diagnostics.type_argument_count_mismatch(
                    name,
                    arguments.len(),
                    parameters.len(),
                    location.clone(),
                );
            }
        }

        match kind {
            TypeKind::Object => Type::Object(instance),
            TypeKind::Trait => Type::Trait(instance),
        }
    }

    fn resolve_block_type(&mut self, kind: BlockKind, node: &ast::BlockTypeNode) -> BlockType {
        BlockType {
            kind,
            arguments: node.arguments.iter().map(|t| self.resolve_type(t)).collect(),
            throw_type: node.throw_type.as_deref().map(|t| self.resolve_type(t)),
            return_type: node
                .return_type
                .as_deref()
                .map_or(Type::Dynamic, |t| self.resolve_type(t)),
        }
    }

    fn type_parameter(&self, name: &str) -> Option<&TypeParameterType> {
        self.type_parameters.iter().rev().find(|param| param.name == name)
    }

    /// Resolves trait bounds, dropping those that aren't traits.
    fn resolve_bounds(&mut self, bounds: &[TypeNode]) -> Vec<Type> {
        let mut resolved = Vec::with_capacity(bounds.len());
        for bound in bounds {
            let fresh = !bound.resolved_type.is_set();
            match self.resolve_type(bound) {
                ty @ Type::Trait(_) => resolved.push(ty),
                Type::Dynamic => {}
                other => {
                    if fresh {
                        self.diagnostics
                            .not_a_trait(&other.to_string(), bound.location.clone());
                    }
                }
            }
        }
        resolved
    }

    fn type_parameter_type(&mut self, param: &TypeParameter) -> TypeParameterType {
        TypeParameterType {
            name: param.name.clone(),
            required_traits: self.resolve_bounds(&param.required_traits),
        }
    }

    /// Brings type parameters into scope, returning the previous depth to
    /// truncate to.
    fn push_type_parameters(&mut self, params: Vec<TypeParameterType>) -> usize {
        let mark = self.type_parameters.len();
        self.type_parameters.extend(params);
        mark
    }

    /// Brings the parameters of a method into scope, along with the extra
    /// bounds of its `where` clause, and returns its signature.
    ///
    /// The caller truncates the type parameters when done.
    fn enter_method_signature(
        &mut self,
        signature: &Signature,
        method_bounds: &[TypeParameter],
    ) -> BlockType {
        for param in &signature.type_parameters {
            let param = self.type_parameter_type(param);
            self.type_parameters.push(param);
        }

        for bound in method_bounds {
            let fresh = bound
                .required_traits
                .first()
                .is_none_or(|node| !node.resolved_type.is_set());
            let extra = self.resolve_bounds(&bound.required_traits);
            match self.type_parameter(&bound.name).cloned() {
                Some(mut param) => {
                    param.required_traits.extend(extra);
                    self.type_parameters.push(param);
                }
                None if fresh => {
                    self.diagnostics
                        .undefined_type(&bound.name, bound.location.clone());
                }
                None => {}
            }
        }

        self.signature_type(BlockKind::Method, signature)
    }

    fn signature_type(&mut self, kind: BlockKind, signature: &Signature) -> BlockType {
        BlockType {
            kind,
            arguments: signature
                .arguments
                .iter()
                .map(|argument| self.argument_type(argument))
                .collect(),
            throw_type: signature.throw_type.as_ref().map(|t| self.resolve_type(t)),
            return_type: signature
                .return_type
                .as_ref()
                .map_or(Type::Dynamic, |t| self.resolve_type(t)),
        }
    }

    /// The type of an argument as seen from inside the block.
    fn argument_type(&mut self, argument: &ArgumentDefinition) -> Type {
        let declared = argument
            .value_type()
            .map_or(Type::Dynamic, |t| self.resolve_type(t));
        if argument.is_rest() {
            self.registry.array(declared)
        } else {
            declared
        }
    }

    fn object_instance(&mut self, node: &TypeNode) -> Option<Instance> {
        let fresh = !node.resolved_type.is_set();
        match self.resolve_type(node) {
            Type::Object(instance) => Some(instance),
            Type::Dynamic => None,
            other => {
                if fresh {
                    self.diagnostics
                        .not_an_object(&other.to_string(), node.location.clone());
                }
                None
            }
        }
    }

    fn trait_instance(&mut self, node: &TypeNode) -> Option<Instance> {
        let fresh = !node.resolved_type.is_set();
        match self.resolve_type(node) {
            Type::Trait(instance) => Some(instance),
            Type::Dynamic => None,
            other => {
                if fresh {
                    self.diagnostics
                        .not_a_trait(&other.to_string(), node.location.clone());
                }
                None
            }
        }
    }

    /// The type defined by the object or trait definition at this location.
    ///
    /// Definitions that were rejected as duplicates have none.
    fn definition(&self, name: &str, location: &SourceLocation) -> Option<TypeId> {
        let id = *self.names.types.get(name)?;
        let definition = self.registry.get(id);
        (definition.location.as_ref() == Some(location)).then_some(id)
    }

    // Members

    /// Records the attributes, methods and implemented traits of the types
    /// defined in a module.
    fn define_members(
        &mut self,
        body: &Body,
        implementations: &mut Vec<(TypeId, TypeId, SourceLocation)>,
    ) {
        for node in &body.children {
            match &node.kind {
                NodeKind::ObjectDefinition {
                    name,
                    type_parameters,
                    body,
                } => {
                    let Some(id) = self.definition(name, &node.location) else {
                        continue;
                    };
                    let mark = self.define_type_parameters(id, type_parameters);
                    for child in &body.children {
                        match &child.kind {
                            NodeKind::DefineAttribute { name, value_type } => {
                                self.define_attribute(id, name, value_type, &child.location);
                            }
                            NodeKind::MethodDefinition(method) => {
                                self.define_method(id, method, &child.location);
                            }
                            _ => {}
                        }
                    }
                    self.type_parameters.truncate(mark);
                }
                NodeKind::TraitDefinition {
                    name,
                    type_parameters,
                    required_traits,
                    body,
                } => {
                    let Some(id) = self.definition(name, &node.location) else {
                        continue;
                    };
                    let mark = self.define_type_parameters(id, type_parameters);
                    let required_traits = self.resolve_bounds(required_traits);
                    self.registry.get_mut(id).required_traits = required_traits;
                    for child in &body.children {
                        match &child.kind {
                            NodeKind::MethodDefinition(method) => {
                                self.define_method(id, method, &child.location);
                            }
                            NodeKind::RequiredMethodDefinition {
                                name,
                                signature,
                                method_bounds,
                            } => {
                                let inner = self.type_parameters.len();
                                let signature = self.enter_method_signature(signature, method_bounds);
                                let method = Method {
                                    signature,
                                    static_method: false,
                                    type_parameters: self.type_parameters.split_off(inner),
                                    location: Some(child.location.clone()),
                                };
                                self.add_method(id, name, method, true);
                            }
                            _ => {}
                        }
                    }
                    self.type_parameters.truncate(mark);
                }
                NodeKind::ImplementTrait {
                    trait_name,
                    object_name,
                    body,
                } => {
                    let Some(object) = self.object_instance(object_name) else {
                        continue;
                    };
                    let params = self.registry.get(object.id).type_parameters.clone();
                    let mark = self.push_type_parameters(params);
                    if let Some(trait_instance) = self.trait_instance(trait_name) {
                        self.registry.implement(object.id, trait_instance.id);
                        implementations.push((trait_instance.id, object.id, node.location.clone()));
                    }
                    self.define_methods(object.id, body);
                    self.type_parameters.truncate(mark);
                }
                NodeKind::ReopenObject { name, body } => {
                    let Some(object) = self.object_instance(name) else {
                        continue;
                    };
                    let params = self.registry.get(object.id).type_parameters.clone();
                    let mark = self.push_type_parameters(params);
                    self.define_methods(object.id, body);
                    self.type_parameters.truncate(mark);
                }
                _ => {}
            }
        }
    }

    /// Resolves the bounds of a type's parameters, and brings them into scope.
    fn define_type_parameters(&mut self, id: TypeId, params: &[TypeParameter]) -> usize {
        let params: Vec<_> = params.iter().map(|p| self.type_parameter_type(p)).collect();
        self.registry.get_mut(id).type_parameters.clone_from(&params);
        self.push_type_parameters(params)
    }

    fn define_attribute(&mut self, id: TypeId, name: &str, node: &TypeNode, location: &SourceLocation) {
        let ty = self.resolve_type(node);
        let attributes = &mut self.registry.get_mut(id).attributes;
        if attributes.contains_key(name) {
            self.diagnostics.redefined_attribute(name, location.clone());
        } else {
            attributes.insert(name.to_string(), ty);
        }
    }

    fn define_methods(&mut self, id: TypeId, body: &Body) {
        for child in &body.children {
            if let NodeKind::MethodDefinition(method) = &child.kind {
                self.define_method(id, method, &child.location);
            }
        }
    }

    fn define_method(&mut self, id: TypeId, method: &ast::MethodDefinition, location: &SourceLocation) {
        let mark = self.type_parameters.len();
        let signature = self.enter_method_signature(&method.signature, &method.method_bounds);
        let method_type = Method {
            signature,
            static_method: method.static_method,
            type_parameters: self.type_parameters.split_off(mark),
            location: Some(location.clone()),
        };
        self.add_method(id, &method.name, method_type, false);
    }

    fn add_method(&mut self, id: TypeId, name: &str, method: Method, required: bool) {
        let definition = self.registry.get_mut(id);
        if definition.methods.contains_key(name) || definition.required_methods.contains_key(name) {
            if let Some(location) = method.location {
                self.diagnostics.redefined_method(name, location);
            }
            return;
        }
        let methods = if required {
            &mut definition.required_methods
        } else {
            &mut definition.methods
        };
        methods.insert(name.to_string(), method);
    }

    // Bodies

    fn check_module(&mut self, body: &Body) {
        self.collect_module_methods(body);
        self.frames.push(Frame {
            kind: FrameKind::Module,
            self_type: Type::Dynamic,
            throw_type: None,
            return_type: Type::Dynamic,
        });
        self.check_body(body);
        self.frames.pop();
    }

    fn collect_module_methods(&mut self, body: &Body) {
        for node in &body.children {
            let NodeKind::MethodDefinition(method) = &node.kind else {
                continue;
            };
            if self.methods.contains_key(&method.name) {
                self.diagnostics
                    .redefined_method(&method.name, node.location.clone());
                continue;
            }

            let mark = self.type_parameters.len();
            let signature = self.enter_method_signature(&method.signature, &method.method_bounds);
            self.type_parameters.truncate(mark);

            let arguments = &method.signature.arguments;
            let required = arguments
                .iter()
                .filter(|a| !a.is_optional() && !a.is_rest())
                .count();
            let module_method = ModuleMethod {
                required,
                total: arguments.iter().filter(|a| !a.is_rest()).count(),
                rest: arguments.iter().any(ArgumentDefinition::is_rest),
                return_type: signature.return_type.without_parameters(),
            };
            self.methods.insert(method.name.clone(), module_method);
        }
    }

    /// Checks the expressions of a body, returning the type of the last one.
    fn check_body(&mut self, body: &Body) -> Type {
        let mut last = self.registry.nil();
        for node in &body.children {
            last = self.check_node(node, body.scope);
        }
        last
    }

    fn check_node(&mut self, node: &Node, scope: ScopeId) -> Type {
        let ty = self.infer(node, scope);
        let is_definition = matches!(
            node.kind,
            NodeKind::Import(_)
                | NodeKind::ObjectDefinition { .. }
                | NodeKind::TraitDefinition { .. }
                | NodeKind::ImplementTrait { .. }
                | NodeKind::ReopenObject { .. }
        );
        if !is_definition {
            node.resolved_type.set(ty.clone());
        }
        ty
    }

    fn infer(&mut self, node: &Node, scope: ScopeId) -> Type {
        match &node.kind {
            NodeKind::Integer(_) => self.registry.integer(),
            NodeKind::Float(_) => self.registry.float(),
            NodeKind::String(_) => self.registry.string(),
            NodeKind::Identifier(name) => self.check_identifier(name, scope, &node.location),
            NodeKind::Constant {
                receiver,
                name,
                type_arguments,
            } => self.check_constant(receiver.as_deref(), name, type_arguments, scope, &node.location),
            NodeKind::Attribute(name) => self.attribute_type(name, &node.location),
            NodeKind::Global(name) => {
                if !self.names.values.contains(name) && !self.names.open {
                    self.diagnostics.undefined_local(name, node.location.clone());
                }
                Type::Dynamic
            }
            NodeKind::SelfObject => self.self_type(),

            NodeKind::DefineVariable {
                name,
                mutable,
                value_type,
                value,
            } => self.define_variable(name, *mutable, value_type.as_ref(), value, scope),
            NodeKind::DefineConstant {
                name,
                value_type,
                value,
            } => self.define_variable(name, false, value_type.as_ref(), value, scope),
            NodeKind::ReassignVariable { name, value } => {
                let found = self.check_node(value, scope);
                let symbol = self
                    .scopes
                    .resolve(scope, name)
                    .map(|(_, symbol)| (symbol.mutable, symbol.value_type.clone()));
                match symbol {
                    Some((true, expected)) => self.expect(&found, &expected, &value.location),
                    Some((false, _)) => self.diagnostics.reassign_immutable(name, node.location.clone()),
                    None => self.diagnostics.undefined_local(name, node.location.clone()),
                }
                found
            }
            NodeKind::ReassignAttribute { name, value } => {
                let found = self.check_node(value, scope);
                let expected = self.attribute_type(name, &node.location);
                self.expect(&found, &expected, &value.location);
                found
            }
            NodeKind::DefineAttribute { value_type, .. } => self.resolve_type(value_type),

            NodeKind::BasicClosure(body) => {
                let self_type = self.self_type();
                self.frames.push(Frame {
                    kind: FrameKind::Closure,
                    self_type,
                    throw_type: Some(Type::Dynamic),
                    return_type: Type::Dynamic,
                });
                let return_type = self.check_body(body);
                self.frames.pop();
                Type::Block(Box::new(BlockType {
                    return_type,
                    ..BlockType::new(BlockKind::Closure)
                }))
            }
            NodeKind::Closure(block) => self.check_block(BlockKind::Closure, block),
            NodeKind::Lambda(block) => self.check_block(BlockKind::Lambda, block),
            NodeKind::MethodDefinition(method) => self.check_method(method),
            NodeKind::RequiredMethodDefinition {
                signature,
                method_bounds,
                ..
            } => {
                let mark = self.type_parameters.len();
                let signature = self.enter_method_signature(signature, method_bounds);
                self.type_parameters.truncate(mark);
                Type::Block(Box::new(signature))
            }

            NodeKind::Return { value, local } => {
                let found = value.as_ref().map(|value| self.check_node(value, scope));
                let expected = self.target_frame(*local).map(|frame| frame.return_type.clone());
                match (expected, found, value) {
                    (Some(expected), Some(found), Some(value)) => {
                        self.expect(&found, &expected, &value.location);
                    }
                    (Some(_), _, _) => {}
                    (None, _, _) => self.diagnostics.return_outside_method(node.location.clone()),
                }
                Type::Dynamic
            }
            NodeKind::Throw { value, local } => {
                let found = self.check_node(value, scope);
                let expected = self
                    .target_frame(*local)
                    .and_then(|frame| frame.throw_type.clone());
                match expected {
                    Some(expected) => self.expect(&found, &expected, &value.location),
                    None => self.diagnostics.throw_without_throw_type(node.location.clone()),
                }
                Type::Dynamic
            }
            NodeKind::Try(try_node) => {
                let ty = self.check_node(&try_node.expression, scope);
                match &try_node.else_body {
                    Some(body) => {
                        if let Some(binding) = &try_node.error_variable {
                            self.scopes
                                .define(body.scope, binding.name.clone(), Type::Dynamic, false);
                        }
                        self.check_body(body);
                    }
                    None => match self.frames.last() {
                        Some(frame) if frame.kind == FrameKind::Method => {
                            if frame.throw_type.is_none() {
                                self.diagnostics.throw_without_throw_type(node.location.clone());
                            }
                        }
                        _ => self
                            .diagnostics
                            .try_without_else_outside_method(node.location.clone()),
                    },
                }
                ty
            }
            NodeKind::TryPanic(expression) => self.check_node(expression, scope),

            NodeKind::Send(send) => self.check_send(send, scope, &node.location),
            NodeKind::TypeCast { value, cast_to } => {
                self.check_node(value, scope);
                self.resolve_type(cast_to)
            }
            NodeKind::Match(match_node) => {
                self.check_match(match_node, scope, &node.location);
                Type::Dynamic
            }

            NodeKind::ObjectDefinition {
                name,
                type_parameters,
                body,
            }
            | NodeKind::TraitDefinition {
                name,
                type_parameters,
                body,
                ..
            } => {
                let (self_type, params) = match self.definition(name, &node.location) {
                    Some(id) => {
                        let definition = self.registry.get(id);
                        (definition.self_type(), definition.type_parameters.clone())
                    }
                    None => {
                        let params = type_parameters
                            .iter()
                            .map(|param| self.type_parameter_type(param))
                            .collect();
                        (Type::Dynamic, params)
                    }
                };
                self.check_type_body(self_type, params, body);
                Type::Dynamic
            }
            NodeKind::ImplementTrait {
                object_name, body, ..
            } => {
                let object = self.object_instance(object_name);
                self.check_reopened_body(object, body);
                Type::Dynamic
            }
            NodeKind::ReopenObject { name, body } => {
                let object = self.object_instance(name);
                self.check_reopened_body(object, body);
                Type::Dynamic
            }
            NodeKind::Import(_) => Type::Dynamic,
        }
    }

    fn self_type(&self) -> Type {
        self.frames
            .last()
            .map_or(Type::Dynamic, |frame| frame.self_type.clone())
    }

    /// Looks up a method on `self`, for sends without a receiver.
    fn self_method(&self, name: &str) -> Option<BlockType> {
        let self_type = self.frames.last()?.self_type.instance()?;
        self.registry.method(self_type, name)
    }

    /// The frame that `return` and `throw` apply to. Non-local ones skip
    /// closures, and apply to the surrounding method or lambda.
    fn target_frame(&self, local: bool) -> Option<&Frame> {
        for frame in self.frames.iter().rev() {
            match frame.kind {
                FrameKind::Closure if !local => continue,
                FrameKind::Closure | FrameKind::Lambda | FrameKind::Method => return Some(frame),
                FrameKind::Module | FrameKind::TypeBody => return None,
            }
        }
        None
    }

    fn expect(&mut self, found: &Type, expected: &Type, location: &SourceLocation) {
        if !found.is_compatible_with(expected, self.registry) {
            self.diagnostics
                .type_mismatch(expected, found, location.clone());
        }
    }

    fn check_identifier(&mut self, name: &str, scope: ScopeId, location: &SourceLocation) -> Type {
        if let Some((_, symbol)) = self.scopes.resolve(scope, name) {
            return symbol.value_type.clone();
        }
        if let Some(method) = self.self_method(name) {
            return method.return_type.without_parameters();
        }
        if let Some(method) = self.methods.get(name) {
            return method.return_type.clone();
        }
        if !self.names.values.contains(name) && !self.names.open {
            self.diagnostics.undefined_local(name, location.clone());
        }
        Type::Dynamic
    }

    fn check_constant(
        &mut self,
        receiver: Option<&Node>,
        name: &str,
        type_arguments: &[TypeNode],
        scope: ScopeId,
        location: &SourceLocation,
    ) -> Type {
        if let Some(receiver) = receiver {
            self.check_node(receiver, scope);
            if let NodeKind::Identifier(module) = &receiver.kind {
                if self.names.modules.contains_key(module) {
                    return self.resolve_constant_type(Some(module), name, type_arguments, location);
                }
            }
            return Type::Dynamic;
        }

        if name == INTRINSIC_RECEIVER {
            return Type::Dynamic;
        }
        if let Some((_, symbol)) = self.scopes.resolve(scope, name) {
            return symbol.value_type.clone();
        }
        let is_type = self.type_parameter(name).is_some()
            || self.names.types.contains_key(name)
            || self.registry.is_builtin_name(name);
        if !is_type && self.names.values.contains(name) {
            return Type::Dynamic;
        }
        self.resolve_constant_type(None, name, type_arguments, location)
    }

    fn attribute_type(&mut self, name: &str, location: &SourceLocation) -> Type {
        let Type::Object(instance) = self.self_type() else {
            return Type::Dynamic;
        };
        match self.registry.attribute_type(&instance, name) {
            Some(ty) => ty,
            None => {
                self.diagnostics.undefined_attribute(name, location.clone());
                Type::Dynamic
            }
        }
    }

    fn define_variable(
        &mut self,
        name: &str,
        mutable: bool,
        value_type: Option<&TypeNode>,
        value: &Node,
        scope: ScopeId,
    ) -> Type {
        let found = self.check_node(value, scope);
        let ty = match value_type {
            Some(node) => {
                let expected = self.resolve_type(node);
                self.expect(&found, &expected, &value.location);
                expected
            }
            None => found,
        };
        self.scopes.define(scope, name, ty.clone(), mutable);
        ty
    }

    /// Defines the arguments of a block as locals of its body.
    fn define_arguments(
        &mut self,
        arguments: &[ArgumentDefinition],
        types: &[Type],
        scope: ScopeId,
        method: bool,
    ) {
        let mut seen = HashSet::new();
        for (argument, ty) in arguments.iter().zip(types) {
            let name = argument.name();
            let location = argument.location();
            if method && matches!(argument, ArgumentDefinition::Untyped { .. }) {
                self.diagnostics.missing_argument_type(name, location.clone());
            }
            if !seen.insert(name) {
                self.diagnostics.redefined_argument(name, location.clone());
                continue;
            }

            let mut local_type = ty.clone();
            if let ArgumentDefinition::Optional { default, .. } = argument {
                let found = self.check_node(default, scope);
                if argument.value_type().is_some() {
                    self.expect(&found, ty, &default.location);
                } else {
                    local_type = found;
                }
            }
            self.scopes
                .define(scope, name, local_type, argument.is_mutable());
        }
    }

    /// Checks that the last expression of a body matches a declared return
    /// type. Bodies ending in `return` or `throw` were checked already.
    fn expect_return(&mut self, found: &Type, expected: &Type, body: &Body) {
        let Some(last) = body.children.last() else {
            return;
        };
        if matches!(last.kind, NodeKind::Return { .. } | NodeKind::Throw { .. }) {
            return;
        }
        self.expect(found, expected, &last.location);
    }

    fn check_block(&mut self, kind: BlockKind, block: &Block) -> Type {
        let mark = self.type_parameters.len();
        for param in &block.signature.type_parameters {
            let param = self.type_parameter_type(param);
            self.type_parameters.push(param);
        }
        let mut signature = self.signature_type(kind, &block.signature);
        self.define_arguments(
            &block.signature.arguments,
            &signature.arguments,
            block.body.scope,
            false,
        );

        let self_type = self.self_type();
        self.frames.push(Frame {
            kind: if kind == BlockKind::Lambda {
                FrameKind::Lambda
            } else {
                FrameKind::Closure
            },
            self_type,
            throw_type: Some(signature.throw_type.clone().unwrap_or(Type::Dynamic)),
            return_type: signature.return_type.clone(),
        });
        let last = self.check_body(&block.body);
        self.frames.pop();
        self.type_parameters.truncate(mark);

        if block.signature.return_type.is_some() {
            self.expect_return(&last, &signature.return_type, &block.body);
        } else {
            signature.return_type = last;
        }
        Type::Block(Box::new(signature))
    }

    fn check_method(&mut self, method: &ast::MethodDefinition) -> Type {
        let mark = self.type_parameters.len();
        let signature = self.enter_method_signature(&method.signature, &method.method_bounds);
        self.define_arguments(
            &method.signature.arguments,
            &signature.arguments,
            method.body.scope,
            true,
        );

        let self_type = self.self_type();
        self.frames.push(Frame {
            kind: FrameKind::Method,
            self_type,
            throw_type: signature.throw_type.clone(),
            return_type: signature.return_type.clone(),
        });
        let last = self.check_body(&method.body);
        self.frames.pop();

        if method.signature.return_type.is_some() {
            self.expect_return(&last, &signature.return_type, &method.body);
        }
        self.type_parameters.truncate(mark);
        Type::Block(Box::new(signature))
    }

    fn check_send(&mut self, send: &ast::Send, scope: ScopeId, location: &SourceLocation) -> Type {
        let receiver = send
            .receiver
            .as_ref()
            .map(|receiver| self.check_node(receiver, scope));
        let arguments: Vec<Type> = send
            .arguments
            .iter()
            .map(|argument| self.check_node(argument, scope))
            .collect();
        for argument in &send.keyword_arguments {
            self.check_node(&argument.value, scope);
        }
        for node in &send.type_arguments {
            self.resolve_type(node);
        }

        if send.instruction {
            if !self.module.is_std() {
                self.diagnostics.instruction_outside_std(location.clone());
            }
            return Type::Dynamic;
        }

        let Some(receiver) = receiver else {
            return self.check_receiverless_send(send, location);
        };
        if let Some(ty) = self.operator_type(&receiver, send, &arguments) {
            return ty;
        }
        let Some(instance) = receiver.instance() else {
            return Type::Dynamic;
        };

        if let Some(method) = self.registry.method(instance, &send.name) {
            if method.arguments.len() == send.arguments.len() && send.keyword_arguments.is_empty() {
                for ((found, expected), node) in arguments.iter().zip(&method.arguments).zip(&send.arguments) {
                    self.expect(found, expected, &node.location);
                }
            }
            return method.return_type.without_parameters();
        }

        if send.name == "new" && !self.registry.get(instance.id).is_trait() {
            if self.registry.builtin(types::ARRAY) == Some(instance.id) {
                let element = common_type(&arguments, self.registry);
                return self.registry.array(element);
            }
            return receiver.clone();
        }
        Type::Dynamic
    }

    fn check_receiverless_send(&mut self, send: &ast::Send, location: &SourceLocation) -> Type {
        if let Some(method) = self.self_method(&send.name) {
            return method.return_type.without_parameters();
        }
        let Some(method) = self.methods.get(&send.name) else {
            return Type::Dynamic;
        };
        let given = send.argument_count();
        if !method.accepts(given) {
            self.diagnostics
                .argument_count_mismatch(&send.name, given, method.expected(), location.clone());
        }
        method.return_type.clone()
    }

    /// The result of an operator applied to a builtin number or string.
    fn operator_type(&mut self, receiver: &Type, send: &ast::Send, arguments: &[Type]) -> Option<Type> {
        let Type::Object(instance) = receiver else {
            return None;
        };
        let is = |name| self.registry.builtin(name) == Some(instance.id);
        let numeric = is(types::INTEGER) || is(types::FLOAT);
        let string = is(types::STRING);
        if !(numeric || string) || arguments.len() != 1 || send.arguments.len() != 1 {
            return None;
        }

        let result = match send.name.as_str() {
            "==" | "!=" => return Some(self.registry.boolean()),
            "<" | "<=" | ">" | ">=" if numeric => self.registry.boolean(),
            "+" if string => receiver.clone(),
            "+" | "-" | "*" | "/" | "%" | "**" | "&" | "|" | "^" | "<<" | ">>" if numeric => {
                receiver.clone()
            }
            _ => return None,
        };
        self.expect(&arguments[0], receiver, &send.arguments[0].location);
        Some(result)
    }

    fn check_match(&mut self, node: &ast::Match, scope: ScopeId, location: &SourceLocation) {
        if let Some(scrutinee) = &node.scrutinee {
            let scrutinee = self.check_node(scrutinee, scope);
            if let Some(binding) = &node.binding {
                self.scopes
                    .define(scope, binding.name.clone(), scrutinee, false);
            }
        }

        for case in &node.cases {
            let body = case.body();
            match case {
                MatchCase::Type { pattern, .. } => {
                    let narrowed = self.resolve_type(pattern);
                    if let Some(binding) = &node.binding {
                        self.scopes
                            .define(body.scope, binding.name.clone(), narrowed, false);
                    }
                }
                MatchCase::Expressions { patterns, .. } => {
                    for pattern in patterns {
                        let found = self.check_node(pattern, scope);
                        if node.scrutinee.is_none() {
                            let boolean = self.registry.boolean();
                            self.expect(&found, &boolean, &pattern.location);
                        }
                    }
                }
            }
            if let Some(guard) = case.guard() {
                self.check_node(guard, body.scope);
            }
            self.check_body(body);
        }

        match &node.else_body {
            Some(body) => {
                self.check_body(body);
            }
            None => self.diagnostics.match_not_exhaustive(location.clone()),
        }
    }

    fn check_type_body(&mut self, self_type: Type, params: Vec<TypeParameterType>, body: &Body) {
        let mark = self.push_type_parameters(params);
        self.frames.push(Frame {
            kind: FrameKind::TypeBody,
            self_type,
            throw_type: None,
            return_type: Type::Dynamic,
        });
        self.check_body(body);
        self.frames.pop();
        self.type_parameters.truncate(mark);
    }

    /// Checks the body of an `impl`, which is checked as part of the object.
    fn check_reopened_body(&mut self, object: Option<Instance>, body: &Body) {
        let (self_type, params) = match object {
            Some(object) => {
                let definition = self.registry.get(object.id);
                (definition.self_type(), definition.type_parameters.clone())
            }
            None => (Type::Dynamic, Vec::new()),
        };
        self.check_type_body(self_type, params, body);
    }
}

/// The type shared by all values, or `Dynamic` if they differ.
fn common_type(types: &[Type], registry: &TypeRegistry) -> Type {
    let Some(first) = types.first() else {
        return Type::Dynamic;
    };
    if types
        .iter()
        .all(|ty| ty.is_compatible_with(first, registry) && first.is_compatible_with(ty, registry))
    {
        first.clone()
    } else {
        Type::Dynamic
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        module::{self, SourceUnit},
        util::test_utils::{format_diagnostics, tree_tests},
    };

    tree_tests!(
        use checker;

        fn test_method_types() {
            let program = "def add(a: Integer, b: Integer) -> Integer { a + b }";
            let tree_ok = "
                method add(a: Integer, b: Integer) -> Integer (1:1 %: def (Integer, Integer) -> Integer)
                  send + (1:46 %: Integer)
                    receiver
                      identifier a (1:46 %: Integer)
                    arguments
                      identifier b (1:50 %: Integer)
            ";
        }

        fn test_closure_return_types_are_inferred() {
            let expr = "let f = do (x: Integer) { x * 2 }";
            let tree_ok = "
                let f (1:1 %: do (Integer) -> Integer)
                  do (x: Integer) (1:9 %: do (Integer) -> Integer)
                    send * (1:27 %: Integer)
                      receiver
                        identifier x (1:27 %: Integer)
                      arguments
                        integer 2 (1:31 %: Integer)
            ";
        }

        fn test_array_literals() {
            let expr = "let a = [1, 2]";
            let tree_ok = "
                let a (1:1 %: Array!(Integer))
                  send new (1:9 %: Array!(Integer))
                    receiver
                      constant Array (1:9 %: Array)
                    arguments
                      integer 1 (1:10 %: Integer)
                      integer 2 (1:13 %: Integer)
            ";
        }

        fn test_objects() {
            let program = indoc! {"
                object Box {
                  @value: Integer

                  def value -> Integer { @value }
                }
                Box.new.value
            "};
            let tree_ok = "
                object Box (1:1)
                  define attribute @value: Integer (2:3 %: Integer)
                  method value -> Integer (4:3 %: def -> Integer)
                    attribute @value (4:26 %: Integer)
                send value (6:1 %: Integer)
                  receiver
                    send new (6:1 %: Box)
                      receiver
                        constant Box (6:1 %: Box)
            ";
        }

        fn test_generic_methods_are_substituted() {
            let expr = indoc! {"
                object Box!(T) {
                  @value: T

                  def get -> T { @value }
                }
                let b: Box!(Integer) = Box.new
                b.get
            "};
            let tree_ok = "
                send get (7:1 %: Integer)
                  receiver
                    identifier b (7:1 %: Box!(Integer))
            ";
        }

        fn test_trait_methods() {
            let expr = indoc! {r#"
                trait Show {
                  def show -> String
                }
                object Point {}
                impl Show for Point {
                  def show -> String { "point" }
                }
                let s: Show = Point.new
                s.show
            "#};
            let tree_ok = "
                send show (9:1 %: String)
                  receiver
                    identifier s (9:1 %: Show)
            ";
        }

        fn test_match_narrows_the_binding() {
            let expr = indoc! {"
                let value: ?Integer = 1
                match(let v = value) {
                  as Integer -> v + 1
                  else -> 0
                }
            "};
            let tree_ok = "
                match (let v) (2:1 %: Dynamic)
                  identifier value (2:15 %: ?Integer)
                  case as Integer (3:3)
                    body
                      send + (3:17 %: Integer)
                        receiver
                          identifier v (3:17 %: Integer)
                        arguments
                          integer 1 (3:21 %: Integer)
                  else
                    integer 0 (4:11 %: Integer)
            ";
        }

        fn test_match_without_scrutinee() {
            let expr = indoc! {"
                let x = 1
                match { x == 1 -> 2 else -> 3 }
            "};
            let tree_ok = "
                match (2:1 %: Dynamic)
                  case (2:9)
                    patterns
                      send == (2:9 %: Boolean)
                        receiver
                          identifier x (2:9 %: Integer)
                        arguments
                          integer 1 (2:14 %: Integer)
                    body
                      integer 2 (2:19 %: Integer)
                  else
                    integer 3 (2:29 %: Integer)
            ";
        }

        fn test_match_conditions_are_booleans() {
            let program = "match { 1 -> 2 else -> 3 }";
            let expected_errors = &["1:9: error: expected a value of type `Boolean`, but found `Integer`"];
        }

        fn test_type_mismatch() {
            let program = r#"let x: Integer = "a""#;
            let expected_errors = &["1:18: error: expected a value of type `Integer`, but found `String`"];
        }

        fn test_operator_arguments() {
            let program = "let x = 1\nx + 2.0";
            let expected_errors = &["2:5: error: expected a value of type `Integer`, but found `Float`"];
        }

        fn test_reassign_immutable() {
            let program = "let x = 1\nx = 2";
            let expected_errors = &["2:1: error: the local variable `x` is immutable and can't be reassigned"];
        }

        fn test_reassign_with_another_type() {
            let program = "let mut x = 1\nx = \"s\"";
            let expected_errors = &["2:5: error: expected a value of type `Integer`, but found `String`"];
        }

        fn test_undefined_local() {
            let program = "foo";
            let expected_errors = &["1:1: error: the local variable `foo` is undefined"];
        }

        fn test_undefined_type() {
            let program = "let x: Foo = 1";
            let expected_errors = &["1:8: error: the type `Foo` is undefined"];
        }

        fn test_redefined_builtin() {
            let program = "object Integer {}";
            let expected_errors = &["1:1: error: the type `Integer` has already been defined"];
        }

        fn test_undefined_attribute() {
            let program = "object A {\n  def foo { @bar }\n}";
            let expected_errors = &["2:13: error: the attribute `@bar` is undefined"];
        }

        fn test_type_argument_bounds() {
            let program = indoc! {"
                trait Show {}
                object Box!(T: Show) {}
                let b: Box!(Integer) = Box.new
            "};
            let expected_errors = &["3:13: error: expected a value of type `T`, but found `Integer`"];
        }

        fn test_type_argument_count() {
            let program = "let a: Array!(Integer, Integer) = [1]";
            let expected_errors = &["1:8: error: the type `Array` takes 1 type argument(s), but 2 were given"];
        }

        fn test_missing_trait_methods() {
            let program = indoc! {"
                trait Show {
                  def show -> String
                }
                object Point {}
                impl Show for Point {}
            "};
            let expected_errors = &["5:1: error: the type `Point` must implement the method `show` required by `Show`"];
        }

        fn test_method_arguments_need_types() {
            let program = "def foo(a) { a }";
            let expected_errors = &["1:9: error: the argument `a` of a method must have a type"];
        }

        fn test_module_method_arity() {
            let program = "def foo(a: Integer) {}\nfoo(1, 2)";
            let expected_errors = &["2:1: error: the method `foo` takes 1 argument(s), but 2 were given"];
        }

        fn test_return_outside_method() {
            let program = "return 1";
            let expected_errors = &["1:1: error: `return` can only be used inside a method"];
        }

        fn test_non_local_return_skips_closures() {
            let program = indoc! {r#"
                def foo -> Integer {
                  [1].each do (x: Integer) {
                    return "a"
                  }
                  1
                }
            "#};
            let expected_errors = &["3:12: error: expected a value of type `Integer`, but found `String`"];
        }

        fn test_local_return_from_closures() {
            let program = indoc! {r#"
                def foo -> Integer {
                  [1].each do (x: Integer) {
                    local return "a"
                  }
                  1
                }
            "#};
            let expected_errors = &[];
        }

        fn test_throw_without_throw_type() {
            let program = r#"def foo { throw "x" }"#;
            let expected_errors = &["1:11: error: `throw` can only be used in a block or method that declares a throw type"];
        }

        fn test_try_in_method_without_throw_type() {
            let program = "def bar !! String { 1 }\ndef foo { try bar }";
            let expected_errors = &["2:11: error: `throw` can only be used in a block or method that declares a throw type"];
        }

        fn test_try_without_else_outside_method() {
            let program = "def foo !! String { 1 }\ntry foo";
            let expected_errors = &["2:1: error: `try` without `else` can only be used in a method that may throw"];
        }

        fn test_instructions_outside_std() {
            let program = "_INTRINSIC.foo(1)";
            let expected_errors = &["1:1: error: VM instructions can only be used by modules in the `std` namespace"];
        }

        fn test_match_without_else() {
            let program = "match(1) { 1 -> 2 }";
            let expected_errors = &["1:1: warning: this `match` has no `else` case and may not be exhaustive"];
        }

        fn test_unknown_wildcard_imports_open_the_module() {
            let program = "import nope::*\nfoo\nlet x: Bar = 1";
            let expected_errors = &[];
        }
    );

    fn check(sources: &[(&str, &str)]) -> Vec<String> {
        let mut modules = Vec::new();
        let mut diagnostics = Diagnostics::new();
        let std = [("std::bootstrap", ""), ("std::prelude", "")];
        let missing_std = std
            .iter()
            .filter(|(name, _)| !sources.iter().any(|(given, _)| given == name));
        for (name, source) in missing_std.chain(sources) {
            let name = ModuleName::parse(name);
            let path = name.source_path("aeon");
            let (module, parse_diagnostics) = module::parse_module(name, &SourceUnit::new(path, *source));
            diagnostics.append(parse_diagnostics);
            modules.push(module);
        }

        let (_, check_diagnostics) = Checker::with_capacity(16).check(&mut modules);
        diagnostics.append(check_diagnostics);
        format_diagnostics(&diagnostics)
    }

    #[test]
    fn imported_types() {
        let errors = check(&[
            ("lib", "object Point {}\ndef origin -> Point { Point.new }"),
            (
                "main",
                indoc! {"
                    import lib::(Point)
                    import lib
                    let p: Point = lib::Point.new
                    let q: lib::Point = p
                    let r: lib::Nope = p
                "},
            ),
        ]);
        assert_eq!(errors, ["5:8: error: the type `lib::Nope` is undefined"]);
    }

    #[test]
    fn unimported_types_are_undefined() {
        let errors = check(&[("lib", "object Point {}"), ("main", "let p: Point = 1")]);
        assert_eq!(errors, ["1:8: error: the type `Point` is undefined"]);
    }

    #[test]
    fn prelude_types_are_visible_everywhere() {
        let errors = check(&[
            ("std::prelude", "trait ToString {\n  def to_string -> String\n}"),
            ("main", "object A {}\nimpl ToString for A {\n  def to_string -> String { \"a\" }\n}"),
        ]);
        assert_eq!(errors, Vec::<String>::new());
    }

    #[test]
    fn duplicate_definitions_in_a_module() {
        let errors = check(&[(
            "main",
            indoc! {"
                object A {
                  @a: Integer
                  @a: Integer

                  def foo {}
                  def foo {}
                }
                object A {}
            "},
        )]);
        assert_eq!(
            errors,
            [
                "8:1: error: the type `A` has already been defined",
                "3:3: error: the attribute `@a` has already been defined",
                "6:3: error: the method `foo` has already been defined",
            ]
        );
    }

    #[test]
    fn traits_implemented_through_required_traits() {
        let errors = check(&[(
            "main",
            indoc! {"
                trait ToString {
                  def to_string -> String
                }
                trait Show: ToString {}
                object A {}
                impl Show for A {}
                let s: ToString = A.new
            "},
        )]);
        assert_eq!(
            errors,
            ["6:1: error: the type `A` must implement the method `to_string` required by `ToString`"]
        );
    }

    #[test]
    fn registry_records_members() {
        let mut modules = Vec::new();
        for (name, source) in [
            ("std::bootstrap", ""),
            ("std::prelude", ""),
            ("main", "object A!(T) {\n  @value: T\n  def get -> T { @value }\n}"),
        ] {
            let name = ModuleName::parse(name);
            let (module, _) = module::parse_module(name, &SourceUnit::new("main.aeon", source));
            modules.push(module);
        }

        let (registry, diagnostics) = Checker::with_capacity(16).check(&mut modules);
        assert!(diagnostics.is_empty());
        let definition = registry.iter().find(|definition| definition.name == "A").unwrap();
        assert_eq!(definition.type_parameters.len(), 1);
        assert_eq!(definition.attributes["@value"].to_string(), "T");
        assert_eq!(definition.methods["get"].signature.to_string(), "def -> T");
    }
}
