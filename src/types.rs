use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use crate::token::SourceLocation;

pub const BOOLEAN: &str = "Boolean";
pub const INTEGER: &str = "Integer";
pub const FLOAT: &str = "Float";
pub const STRING: &str = "String";
pub const NIL: &str = "Nil";
pub const ARRAY: &str = "Array";
/// The name of the type that accepts anything. It isn't a registered type.
pub const DYNAMIC: &str = "Dynamic";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

impl TypeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Type {
    /// Accepts, and is accepted by, any other type.
    Dynamic,
    Object(Instance),
    Trait(Instance),
    Parameter(TypeParameterType),
    /// `?T`
    Optional(Box<Type>),
    Block(Box<BlockType>),
}

/// A use of an object or trait, along with its type arguments.
///
/// An instance without arguments of a generic type leaves its parameters
/// unconstrained.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub id: TypeId,
    pub name: String,
    pub arguments: Vec<Type>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeParameterType {
    pub name: String,
    pub required_traits: Vec<Type>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Closure,
    Lambda,
    Method,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlockType {
    pub kind: BlockKind,
    pub arguments: Vec<Type>,
    pub throw_type: Option<Type>,
    pub return_type: Type,
}

impl BlockType {
    pub fn new(kind: BlockKind) -> BlockType {
        BlockType {
            kind,
            arguments: Vec::new(),
            throw_type: None,
            return_type: Type::Dynamic,
        }
    }

    fn substitute(&self, mapping: &HashMap<String, Type>) -> BlockType {
        BlockType {
            kind: self.kind,
            arguments: self.arguments.iter().map(|t| t.substitute(mapping)).collect(),
            throw_type: self.throw_type.as_ref().map(|t| t.substitute(mapping)),
            return_type: self.return_type.substitute(mapping),
        }
    }
}

impl Type {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Type::Dynamic)
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Type::Optional(_))
    }

    pub fn optional(self) -> Type {
        match self {
            Type::Optional(_) => self,
            other => Type::Optional(Box::new(other)),
        }
    }

    pub fn instance(&self) -> Option<&Instance> {
        match self {
            Type::Object(instance) | Type::Trait(instance) => Some(instance),
            _ => None,
        }
    }

    /// Returns true if a value of this type can be used where `other` is
    /// expected.
    pub fn is_compatible_with(&self, other: &Type, registry: &TypeRegistry) -> bool {
        match (self, other) {
            (Type::Dynamic, _) | (_, Type::Dynamic) => true,
            (Type::Optional(ours), Type::Optional(theirs)) => ours.is_compatible_with(theirs, registry),
            (Type::Object(instance), Type::Optional(_)) if registry.is_nil(instance.id) => true,
            (_, Type::Optional(theirs)) => self.is_compatible_with(theirs, registry),
            (Type::Optional(_), _) => false,
            (Type::Object(ours), Type::Object(theirs)) => {
                ours.id == theirs.id && arguments_compatible(ours, theirs, registry)
            }
            (Type::Object(ours), Type::Trait(theirs)) => registry.implements(ours.id, theirs.id),
            (Type::Trait(ours), Type::Trait(theirs)) => {
                (ours.id == theirs.id && arguments_compatible(ours, theirs, registry))
                    || registry.trait_requires(ours.id, theirs.id)
            }
            (Type::Parameter(ours), Type::Parameter(theirs)) => ours.name == theirs.name,
            (Type::Parameter(ours), Type::Trait(_)) => ours
                .required_traits
                .iter()
                .any(|bound| bound.is_compatible_with(other, registry)),
            (_, Type::Parameter(theirs)) => theirs
                .required_traits
                .iter()
                .all(|bound| self.is_compatible_with(bound, registry)),
            (Type::Block(ours), Type::Block(theirs)) => block_compatible(ours, theirs, registry),
            _ => false,
        }
    }

    /// Replaces the type parameters left in this type with `Dynamic`.
    pub fn without_parameters(&self) -> Type {
        match self {
            Type::Parameter(_) => Type::Dynamic,
            Type::Object(instance) => Type::Object(instance.map_arguments(Type::without_parameters)),
            Type::Trait(instance) => Type::Trait(instance.map_arguments(Type::without_parameters)),
            Type::Optional(inner) => Type::Optional(Box::new(inner.without_parameters())),
            Type::Block(block) => Type::Block(Box::new(BlockType {
                kind: block.kind,
                arguments: block.arguments.iter().map(Type::without_parameters).collect(),
                throw_type: block.throw_type.as_ref().map(Type::without_parameters),
                return_type: block.return_type.without_parameters(),
            })),
            Type::Dynamic => Type::Dynamic,
        }
    }

    /// Replaces type parameters with the types they map to.
    pub fn substitute(&self, mapping: &HashMap<String, Type>) -> Type {
        if mapping.is_empty() {
            return self.clone();
        }
        match self {
            Type::Parameter(param) => mapping.get(&param.name).cloned().unwrap_or_else(|| self.clone()),
            Type::Object(instance) => Type::Object(instance.substitute(mapping)),
            Type::Trait(instance) => Type::Trait(instance.substitute(mapping)),
            Type::Optional(inner) => Type::Optional(Box::new(inner.substitute(mapping))),
            Type::Block(block) => Type::Block(Box::new(block.substitute(mapping))),
            Type::Dynamic => Type::Dynamic,
        }
    }
}

impl Instance {
    pub fn new(id: TypeId, name: impl Into<String>) -> Instance {
        Instance {
            id,
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    fn substitute(&self, mapping: &HashMap<String, Type>) -> Instance {
        self.map_arguments(|t| t.substitute(mapping))
    }

    fn map_arguments(&self, f: impl FnMut(&Type) -> Type) -> Instance {
        Instance {
            id: self.id,
            name: self.name.clone(),
            arguments: self.arguments.iter().map(f).collect(),
        }
    }
}

fn arguments_compatible(ours: &Instance, theirs: &Instance, registry: &TypeRegistry) -> bool {
    if ours.arguments.is_empty() || theirs.arguments.is_empty() {
        return true;
    }
    ours.arguments.len() == theirs.arguments.len()
        && ours
            .arguments
            .iter()
            .zip(&theirs.arguments)
            .all(|(a, b)| a.is_compatible_with(b, registry))
}

fn block_compatible(ours: &BlockType, theirs: &BlockType, registry: &TypeRegistry) -> bool {
    let kinds = ours.kind == theirs.kind
        || (ours.kind == BlockKind::Lambda && theirs.kind == BlockKind::Closure);
    let throws = match (&ours.throw_type, &theirs.throw_type) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(a), Some(b)) => a.is_compatible_with(b, registry),
    };
    kinds
        && throws
        && ours.arguments.len() == theirs.arguments.len()
        && theirs
            .arguments
            .iter()
            .zip(&ours.arguments)
            .all(|(a, b)| a.is_compatible_with(b, registry))
        && ours.return_type.is_compatible_with(&theirs.return_type, registry)
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Dynamic => f.write_str("Dynamic"),
            Type::Object(instance) | Type::Trait(instance) => {
                f.write_str(&instance.name)?;
                if !instance.arguments.is_empty() {
                    f.write_str("!(")?;
                    comma_separated(f, &instance.arguments)?;
                    f.write_str(")")?;
                }
                Ok(())
            }
            Type::Parameter(param) => f.write_str(&param.name),
            Type::Optional(inner) => write!(f, "?{inner}"),
            Type::Block(block) => write!(f, "{block}"),
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self.kind {
            BlockKind::Closure => "do",
            BlockKind::Lambda => "lambda",
            BlockKind::Method => "def",
        })?;
        if !self.arguments.is_empty() {
            f.write_str(" (")?;
            comma_separated(f, &self.arguments)?;
            f.write_str(")")?;
        }
        if let Some(throw_type) = &self.throw_type {
            write!(f, " !! {throw_type}")?;
        }
        write!(f, " -> {}", self.return_type)
    }
}

fn comma_separated(f: &mut fmt::Formatter<'_>, types: &[Type]) -> fmt::Result {
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{ty}")?;
    }
    Ok(())
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Object,
    Trait,
}

#[derive(Clone, Debug)]
pub struct Method {
    pub signature: BlockType,
    pub static_method: bool,
    pub type_parameters: Vec<TypeParameterType>,
    pub location: Option<SourceLocation>,
}

#[derive(Clone, Debug)]
pub struct TypeDefinition {
    pub id: TypeId,
    pub name: String,
    pub kind: TypeKind,
    /// `None` for builtin types.
    pub location: Option<SourceLocation>,
    pub type_parameters: Vec<TypeParameterType>,
    pub attributes: HashMap<String, Type>,
    /// Object methods, or the default methods of a trait.
    pub methods: HashMap<String, Method>,
    pub required_methods: HashMap<String, Method>,
    pub required_traits: Vec<Type>,
}

impl TypeDefinition {
    pub fn is_trait(&self) -> bool {
        self.kind == TypeKind::Trait
    }

    pub fn is_builtin(&self) -> bool {
        self.location.is_none()
    }

    /// A use of this type with its own parameters as arguments, as seen from
    /// inside its definition.
    pub fn self_instance(&self) -> Instance {
        Instance {
            id: self.id,
            name: self.name.clone(),
            arguments: self
                .type_parameters
                .iter()
                .cloned()
                .map(Type::Parameter)
                .collect(),
        }
    }

    pub fn self_type(&self) -> Type {
        match self.kind {
            TypeKind::Object => Type::Object(self.self_instance()),
            TypeKind::Trait => Type::Trait(self.self_instance()),
        }
    }
}

/// Owns the definitions of every object and trait in a compilation.
pub struct TypeRegistry {
    definitions: Vec<TypeDefinition>,
    builtins: HashMap<&'static str, TypeId>,
    implementations: HashSet<(TypeId, TypeId)>,
}

impl TypeRegistry {
    pub fn with_capacity(capacity: usize) -> TypeRegistry {
        let mut registry = TypeRegistry {
            definitions: Vec::with_capacity(capacity),
            builtins: HashMap::new(),
            implementations: HashSet::new(),
        };
        for name in [BOOLEAN, INTEGER, FLOAT, STRING, NIL, ARRAY] {
            let id = registry.define(name, TypeKind::Object, None);
            registry.builtins.insert(name, id);
        }
        let array = registry.builtins[ARRAY];
        registry.get_mut(array).type_parameters.push(TypeParameterType {
            name: "T".into(),
            required_traits: Vec::new(),
        });
        registry
    }

    /// Defines a new type.
    ///
    /// Names need not be unique across modules; it's up to callers to reject
    /// duplicates within a module.
    pub fn define(
        &mut self,
        name: impl Into<String>,
        kind: TypeKind,
        location: Option<SourceLocation>,
    ) -> TypeId {
        let id = TypeId(u32::try_from(self.definitions.len()).expect("too many types"));
        let name = name.into();
        log::trace!("defining {kind:?} type {name} as {id:?}");
        self.definitions.push(TypeDefinition {
            id,
            name,
            kind,
            location,
            type_parameters: Vec::new(),
            attributes: HashMap::new(),
            methods: HashMap::new(),
            required_methods: HashMap::new(),
            required_traits: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeDefinition {
        &self.definitions[id.index()]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut TypeDefinition {
        &mut self.definitions[id.index()]
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TypeDefinition> {
        self.definitions.iter()
    }

    pub fn builtin(&self, name: &str) -> Option<TypeId> {
        self.builtins.get(name).copied()
    }

    pub fn is_builtin_name(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    pub fn is_nil(&self, id: TypeId) -> bool {
        self.builtins.get(NIL) == Some(&id)
    }

    fn builtin_type(&self, name: &'static str) -> Type {
        let id = self.builtins[name];
        Type::Object(Instance::new(id, name))
    }

    pub fn boolean(&self) -> Type {
        self.builtin_type(BOOLEAN)
    }

    pub fn integer(&self) -> Type {
        self.builtin_type(INTEGER)
    }

    pub fn float(&self) -> Type {
        self.builtin_type(FLOAT)
    }

    pub fn string(&self) -> Type {
        self.builtin_type(STRING)
    }

    pub fn nil(&self) -> Type {
        self.builtin_type(NIL)
    }

    pub fn array(&self, element: Type) -> Type {
        let mut instance = Instance::new(self.builtins[ARRAY], ARRAY);
        instance.arguments.push(element);
        Type::Object(instance)
    }

    pub fn implement(&mut self, object: TypeId, trait_id: TypeId) {
        self.implementations.insert((object, trait_id));
    }

    /// Returns true if the object implements the trait, directly or through a
    /// trait the implemented trait requires.
    pub fn implements(&self, object: TypeId, trait_id: TypeId) -> bool {
        self.implementations
            .iter()
            .filter(|(o, _)| *o == object)
            .any(|(_, t)| *t == trait_id || self.trait_requires(*t, trait_id))
    }

    /// Returns true if `trait_id` transitively requires `required`.
    pub fn trait_requires(&self, trait_id: TypeId, required: TypeId) -> bool {
        let mut seen = HashSet::new();
        let mut work = vec![trait_id];
        while let Some(current) = work.pop() {
            if !seen.insert(current) {
                continue;
            }
            for bound in &self.get(current).required_traits {
                if let Type::Trait(instance) = bound {
                    if instance.id == required {
                        return true;
                    }
                    work.push(instance.id);
                }
            }
        }
        false
    }

    /// Maps the type parameters of the instance's type to its arguments.
    pub fn type_arguments(&self, instance: &Instance) -> HashMap<String, Type> {
        self.get(instance.id)
            .type_parameters
            .iter()
            .zip(&instance.arguments)
            .map(|(param, arg)| (param.name.clone(), arg.clone()))
            .collect()
    }

    pub fn attribute_type(&self, instance: &Instance, name: &str) -> Option<Type> {
        let ty = self.get(instance.id).attributes.get(name)?;
        Some(ty.substitute(&self.type_arguments(instance)))
    }

    /// Looks up a method, searching required traits for trait instances.
    pub fn method(&self, instance: &Instance, name: &str) -> Option<BlockType> {
        let mapping = self.type_arguments(instance);
        let definition = self.get(instance.id);
        if let Some(method) = definition
            .methods
            .get(name)
            .or_else(|| definition.required_methods.get(name))
        {
            return Some(method.signature.substitute(&mapping));
        }
        definition
            .required_traits
            .iter()
            .filter_map(Type::instance)
            .find_map(|bound| self.method(bound, name))
            .map(|signature| signature.substitute(&mapping))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_types() -> (TypeRegistry, Type, Type, Type) {
        let mut registry = TypeRegistry::with_capacity(16);
        let to_string = registry.define("ToString", TypeKind::Trait, None);
        let display = registry.define("Display", TypeKind::Trait, None);
        registry
            .get_mut(display)
            .required_traits
            .push(Type::Trait(Instance::new(to_string, "ToString")));
        let person = registry.define("Person", TypeKind::Object, None);
        registry.implement(person, display);
        (
            registry,
            Type::Object(Instance::new(person, "Person")),
            Type::Trait(Instance::new(display, "Display")),
            Type::Trait(Instance::new(to_string, "ToString")),
        )
    }

    #[test]
    fn dynamic_is_compatible_both_ways() {
        let registry = TypeRegistry::with_capacity(8);
        assert!(Type::Dynamic.is_compatible_with(&registry.integer(), &registry));
        assert!(registry.integer().is_compatible_with(&Type::Dynamic, &registry));
    }

    #[test]
    fn optional_types() {
        let registry = TypeRegistry::with_capacity(8);
        let int = registry.integer();
        let optional = int.clone().optional();
        assert!(int.is_compatible_with(&optional, &registry));
        assert!(!optional.is_compatible_with(&int, &registry));
        assert!(optional.is_compatible_with(&optional, &registry));
        assert!(registry.nil().is_compatible_with(&registry.string().optional(), &registry));
        assert!(!registry.nil().is_compatible_with(&registry.string(), &registry));
    }

    #[test]
    fn objects_are_nominal() {
        let registry = TypeRegistry::with_capacity(8);
        assert!(registry.integer().is_compatible_with(&registry.integer(), &registry));
        assert!(!registry.integer().is_compatible_with(&registry.float(), &registry));

        let ints = registry.array(registry.integer());
        let strings = registry.array(registry.string());
        assert!(ints.is_compatible_with(&ints, &registry));
        assert!(!ints.is_compatible_with(&strings, &registry));
    }

    #[test]
    fn objects_and_implemented_traits() {
        let (registry, person, display, to_string) = registry_with_types();
        assert!(person.is_compatible_with(&display, &registry));
        assert!(person.is_compatible_with(&to_string, &registry));
        assert!(display.is_compatible_with(&to_string, &registry));
        assert!(!to_string.is_compatible_with(&display, &registry));
        assert!(!registry.integer().is_compatible_with(&display, &registry));
        assert!(!display.is_compatible_with(&person, &registry));
    }

    #[test]
    fn type_parameters_use_their_bounds() {
        let (registry, person, display, to_string) = registry_with_types();
        let param = Type::Parameter(TypeParameterType {
            name: "T".into(),
            required_traits: vec![display.clone()],
        });
        assert!(person.is_compatible_with(&param, &registry));
        assert!(!registry.integer().is_compatible_with(&param, &registry));
        assert!(param.is_compatible_with(&to_string, &registry));
        assert!(param.is_compatible_with(&param, &registry));
    }

    #[test]
    fn block_types() {
        let registry = TypeRegistry::with_capacity(8);
        let block = |kind, arguments, return_type| {
            Type::Block(Box::new(BlockType {
                kind,
                arguments,
                throw_type: None,
                return_type,
            }))
        };
        let int = registry.integer();
        let closure = block(BlockKind::Closure, vec![int.clone()], int.clone());
        let lambda = block(BlockKind::Lambda, vec![int.clone()], int.clone());
        let takes_optional = block(BlockKind::Closure, vec![int.clone().optional()], int.clone());

        assert!(lambda.is_compatible_with(&closure, &registry));
        assert!(!closure.is_compatible_with(&lambda, &registry));
        // Arguments are contravariant.
        assert!(takes_optional.is_compatible_with(&closure, &registry));
        assert!(!closure.is_compatible_with(&takes_optional, &registry));

        let throwing = Type::Block(Box::new(BlockType {
            throw_type: Some(registry.string()),
            ..BlockType::new(BlockKind::Closure)
        }));
        let silent = Type::Block(Box::new(BlockType::new(BlockKind::Closure)));
        assert!(silent.is_compatible_with(&throwing, &registry));
        assert!(!throwing.is_compatible_with(&silent, &registry));
    }

    #[test]
    fn substitution_and_attributes() {
        let mut registry = TypeRegistry::with_capacity(8);
        let boxed = registry.define("Box", TypeKind::Object, None);
        let param = TypeParameterType {
            name: "T".into(),
            required_traits: Vec::new(),
        };
        let definition = registry.get_mut(boxed);
        definition.type_parameters.push(param.clone());
        definition
            .attributes
            .insert("@value".into(), Type::Parameter(param));

        let mut instance = Instance::new(boxed, "Box");
        instance.arguments.push(registry.integer());
        assert_eq!(
            registry.attribute_type(&instance, "@value"),
            Some(registry.integer())
        );
        assert_eq!(Type::Object(instance).to_string(), "Box!(Integer)");
    }

    #[test]
    fn parameters_can_be_erased() {
        let registry = TypeRegistry::with_capacity(8);
        let param = Type::Parameter(TypeParameterType {
            name: "T".into(),
            required_traits: Vec::new(),
        });
        let array = registry.array(param.clone().optional());
        assert_eq!(
            array.without_parameters(),
            registry.array(Type::Dynamic.optional())
        );
        assert!(!param.is_compatible_with(&registry.integer(), &registry));
        assert!(param
            .without_parameters()
            .is_compatible_with(&registry.integer(), &registry));
    }

    #[test]
    fn display() {
        let registry = TypeRegistry::with_capacity(8);
        let block = Type::Block(Box::new(BlockType {
            kind: BlockKind::Lambda,
            arguments: vec![registry.integer(), registry.string().optional()],
            throw_type: Some(registry.string()),
            return_type: Type::Dynamic,
        }));
        assert_eq!(block.to_string(), "lambda (Integer, ?String) !! String -> Dynamic");
    }
}
