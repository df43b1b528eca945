// module ::= (import | expression)*
// import ::= 'import' NAME ('::' NAME)* ['::' ('*' | '(' symbol (',' symbol)* ')')]
// symbol ::= (NAME | 'self') ['as' NAME]
// object ::= 'object' CONSTANT [type-params] '{' (attribute | method | expression)* '}'
// trait ::= 'trait' CONSTANT [type-params] [':' type ('+' type)*] '{' method* '}'
// impl ::= 'impl' type ['for' CONSTANT] '{' method* '}'
// method ::= ['static'] 'def' NAME [type-params] [args] [throw] [return] [where] [body]
// block ::= 'do' [args] [throw] [return] body
//         | 'lambda' [args] [throw] [return] body
//         | body
// args ::= '(' (['mut'] NAME [':' type] ['=' expression] | '*' NAME [':' type]),* ')'
// type ::= ['?'] [NAME '::'] CONSTANT ['!(' type,* ')']
//        | 'do' ['(' type,* ')'] [throw] [return]
//        | 'lambda' ['(' type,* ')'] [throw] [return]
// expression ::= 'let' ['mut'] NAME [':' type] '=' expression
//              | NAME '=' expression | ATTRIBUTE '=' expression
//              | ['local'] 'return' [expression]
//              | ['local'] 'throw' expression
//              | ['local'] 'try' expression ['else' ['(' NAME ')'] (body | expression)]
//              | 'try!' expression
//              | 'match' ['(' ['let' NAME '='] expression ')'] '{' case+ ['else' '->' body] '}'
//              | expression OPERATOR expression
//              | expression '.' NAME [type-args] [call-args] [block]
//              | expression '[' expression ']' ['=' expression]
//              | expression 'as' type
//              | '[' expression,* ']'
//              | literal | NAME | CONSTANT | ATTRIBUTE | '::' NAME | 'self'

// Precedence, lowest first
//
// = op=
// || &&
// == != < <= > >=
// .. ...
// | ^ &
// << >>
// + -
// * / %
// **
// - (on numeric literals)
// . [ as

use std::cell::OnceCell;

use crate::{module::ModuleName, scope::ScopeId, token::SourceLocation, types::Type};

/// The type of a node, assigned once by the type checker.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedType(OnceCell<Type>);

impl ResolvedType {
    pub fn get(&self) -> Option<&Type> {
        self.0.get()
    }

    /// Assigns the type.
    ///
    /// # Panics
    ///
    /// Panics if a type was already assigned.
    pub fn set(&self, ty: Type) {
        if self.0.set(ty).is_err() {
            panic!("resolved type assigned twice");
        }
    }

    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub location: SourceLocation,
    pub resolved_type: ResolvedType,
}

impl Node {
    pub fn new(kind: NodeKind, location: SourceLocation) -> Node {
        Node {
            kind,
            location,
            resolved_type: ResolvedType::default(),
        }
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    pub fn resolved_type(&self) -> Option<&Type> {
        self.resolved_type.get()
    }

    pub fn is_import(&self) -> bool {
        matches!(self.kind, NodeKind::Import(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Integer(i64),
    Float(f64),
    String(String),

    Identifier(String),
    Constant {
        /// The module the constant is looked up in, as in `foo::Bar`.
        receiver: Option<Box<Node>>,
        name: String,
        type_arguments: Vec<TypeNode>,
    },
    Attribute(String),
    /// `::Name`, a module-level constant or method.
    Global(String),
    SelfObject,

    DefineVariable {
        name: String,
        mutable: bool,
        value_type: Option<TypeNode>,
        value: Box<Node>,
    },
    DefineConstant {
        name: String,
        value_type: Option<TypeNode>,
        value: Box<Node>,
    },
    ReassignVariable {
        name: String,
        value: Box<Node>,
    },
    ReassignAttribute {
        name: String,
        value: Box<Node>,
    },
    /// `@name: Type` in an object body.
    DefineAttribute {
        name: String,
        value_type: TypeNode,
    },

    /// `{ ... }`, a closure without a signature.
    BasicClosure(Body),
    Closure(Block),
    Lambda(Block),
    MethodDefinition(Box<MethodDefinition>),
    /// A method without a body, required by a trait.
    RequiredMethodDefinition {
        name: String,
        signature: Signature,
        method_bounds: Vec<TypeParameter>,
    },

    Return {
        value: Option<Box<Node>>,
        local: bool,
    },
    Throw {
        value: Box<Node>,
        local: bool,
    },
    Try(Box<Try>),
    /// `try! expression`
    TryPanic(Box<Node>),

    Send(Box<Send>),
    TypeCast {
        value: Box<Node>,
        cast_to: TypeNode,
    },
    Match(Box<Match>),

    ObjectDefinition {
        name: String,
        type_parameters: Vec<TypeParameter>,
        body: Body,
    },
    TraitDefinition {
        name: String,
        type_parameters: Vec<TypeParameter>,
        required_traits: Vec<TypeNode>,
        body: Body,
    },
    ImplementTrait {
        trait_name: TypeNode,
        object_name: TypeNode,
        body: Body,
    },
    ReopenObject {
        name: TypeNode,
        body: Body,
    },

    Import(Import),
}

/// A closure or lambda: a signature and a body.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub signature: Signature,
    pub body: Body,
}

/// The signature shared by methods, closures and lambdas.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Signature {
    pub type_parameters: Vec<TypeParameter>,
    pub arguments: Vec<ArgumentDefinition>,
    pub throw_type: Option<TypeNode>,
    pub return_type: Option<TypeNode>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodDefinition {
    pub name: String,
    pub static_method: bool,
    pub signature: Signature,
    /// `where T: Bound` requirements that only apply to this method.
    pub method_bounds: Vec<TypeParameter>,
    pub body: Body,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Try {
    pub expression: Node,
    pub error_variable: Option<Binding>,
    pub else_body: Option<Body>,
    pub local: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Send {
    pub receiver: Option<Node>,
    pub name: String,
    pub arguments: Vec<Node>,
    pub keyword_arguments: Vec<KeywordArgument>,
    pub type_arguments: Vec<TypeNode>,
    /// Set for sends to the intrinsic receiver, which compile to VM
    /// instructions.
    pub instruction: bool,
}

impl Send {
    pub fn argument_count(&self) -> usize {
        self.arguments.len() + self.keyword_arguments.len()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeywordArgument {
    pub name: String,
    pub value: Node,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    /// `None` for `match { ... }`, whose cases are conditions.
    pub scrutinee: Option<Node>,
    /// `match(let x = ...)`
    pub binding: Option<Binding>,
    /// Non empty list of cases.
    pub cases: Vec<MatchCase>,
    pub else_body: Option<Body>,
}

/// A name bound by `match` or `try ... else`.
#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub name: String,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MatchCase {
    /// `as Type [when guard] -> body`
    Type {
        pattern: TypeNode,
        guard: Option<Node>,
        body: Body,
        location: SourceLocation,
    },
    /// `a, b [when guard] -> body`
    Expressions {
        patterns: Vec<Node>,
        guard: Option<Node>,
        body: Body,
        location: SourceLocation,
    },
}

impl MatchCase {
    pub fn guard(&self) -> Option<&Node> {
        match self {
            MatchCase::Type { guard, .. } | MatchCase::Expressions { guard, .. } => guard.as_ref(),
        }
    }

    pub fn body(&self) -> &Body {
        match self {
            MatchCase::Type { body, .. } | MatchCase::Expressions { body, .. } => body,
        }
    }

    pub fn location(&self) -> &SourceLocation {
        match self {
            MatchCase::Type { location, .. } | MatchCase::Expressions { location, .. } => location,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArgumentDefinition {
    /// An argument whose type is inferred, only valid for closures and lambdas.
    Untyped {
        name: String,
        mutable: bool,
        location: SourceLocation,
    },
    Required {
        name: String,
        mutable: bool,
        value_type: TypeNode,
        location: SourceLocation,
    },
    /// `*name`, collecting the remaining arguments into an array.
    Rest {
        name: String,
        value_type: Option<TypeNode>,
        location: SourceLocation,
    },
    Optional {
        name: String,
        mutable: bool,
        value_type: Option<TypeNode>,
        default: Node,
        location: SourceLocation,
    },
}

impl ArgumentDefinition {
    pub fn name(&self) -> &str {
        match self {
            ArgumentDefinition::Untyped { name, .. }
            | ArgumentDefinition::Required { name, .. }
            | ArgumentDefinition::Rest { name, .. }
            | ArgumentDefinition::Optional { name, .. } => name,
        }
    }

    pub fn location(&self) -> &SourceLocation {
        match self {
            ArgumentDefinition::Untyped { location, .. }
            | ArgumentDefinition::Required { location, .. }
            | ArgumentDefinition::Rest { location, .. }
            | ArgumentDefinition::Optional { location, .. } => location,
        }
    }

    pub fn value_type(&self) -> Option<&TypeNode> {
        match self {
            ArgumentDefinition::Untyped { .. } => None,
            ArgumentDefinition::Required { value_type, .. } => Some(value_type),
            ArgumentDefinition::Rest { value_type, .. }
            | ArgumentDefinition::Optional { value_type, .. } => value_type.as_ref(),
        }
    }

    /// Rest arguments are always immutable.
    pub fn is_mutable(&self) -> bool {
        match self {
            ArgumentDefinition::Untyped { mutable, .. }
            | ArgumentDefinition::Required { mutable, .. }
            | ArgumentDefinition::Optional { mutable, .. } => *mutable,
            ArgumentDefinition::Rest { .. } => false,
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, ArgumentDefinition::Rest { .. })
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, ArgumentDefinition::Optional { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeNode {
    pub kind: TypeNodeKind,
    pub location: SourceLocation,
    pub resolved_type: ResolvedType,
}

impl TypeNode {
    pub fn new(kind: TypeNodeKind, location: SourceLocation) -> TypeNode {
        TypeNode {
            kind,
            location,
            resolved_type: ResolvedType::default(),
        }
    }

    /// The name of a constant type, or `None` for other type shapes.
    pub fn constant_name(&self) -> Option<&str> {
        match &self.kind {
            TypeNodeKind::Constant { name, .. } => Some(name),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TypeNodeKind {
    /// `Name`, `module::Name` or `Name!(A, B)`.
    Constant {
        module: Option<String>,
        name: String,
        type_arguments: Vec<TypeNode>,
    },
    /// `?T`
    Optional(Box<TypeNode>),
    /// `do (A) !! E -> R`
    Closure(BlockTypeNode),
    /// `lambda (A) !! E -> R`
    Lambda(BlockTypeNode),
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct BlockTypeNode {
    pub arguments: Vec<TypeNode>,
    pub throw_type: Option<Box<TypeNode>>,
    pub return_type: Option<Box<TypeNode>>,
}

/// `T: A + B`
#[derive(Clone, Debug, PartialEq)]
pub struct TypeParameter {
    pub name: String,
    pub required_traits: Vec<TypeNode>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Import {
    pub path: Vec<ImportSegment>,
    pub symbols: Vec<ImportSymbol>,
    /// `import a::b::*`
    pub import_all: bool,
}

impl Import {
    pub fn module_name(&self) -> ModuleName {
        ModuleName::new(self.path.iter().map(|segment| segment.name.clone()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportSegment {
    pub name: String,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ImportSymbol {
    /// `name` or `name as alias`
    Named {
        name: String,
        alias: Option<String>,
        location: SourceLocation,
    },
    /// `self` or `self as alias`, binding the module itself.
    SelfModule {
        alias: Option<String>,
        location: SourceLocation,
    },
}

impl ImportSymbol {
    /// The name the symbol is bound to in the importing module.
    pub fn import_as<'a>(&'a self, import: &'a Import) -> Option<&'a str> {
        match self {
            ImportSymbol::Named { name, alias, .. } => Some(alias.as_deref().unwrap_or(name)),
            ImportSymbol::SelfModule { alias, .. } => alias
                .as_deref()
                .or_else(|| import.path.last().map(|segment| segment.name.as_str())),
        }
    }

    pub fn location(&self) -> &SourceLocation {
        match self {
            ImportSymbol::Named { location, .. } | ImportSymbol::SelfModule { location, .. } => {
                location
            }
        }
    }
}

/// A sequence of expressions with its own variable scope.
#[derive(Clone, Debug, PartialEq)]
pub struct Body {
    pub children: Vec<Node>,
    pub scope: ScopeId,
    pub location: SourceLocation,
}

impl Body {
    pub fn new(children: Vec<Node>, scope: ScopeId, location: SourceLocation) -> Body {
        Body {
            children,
            scope,
            location,
        }
    }

    /// The import statements of this body, in order.
    pub fn imports(&self) -> impl Iterator<Item = &Import> {
        self.children.iter().filter_map(|node| match &node.kind {
            NodeKind::Import(import) => Some(import),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
