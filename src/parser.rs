use std::{collections::VecDeque, path::Path, sync::Arc};

use crate::{
    ast::{
        ArgumentDefinition, Binding, Block, BlockTypeNode, Body, Import, ImportSegment,
        ImportSymbol, KeywordArgument, Match, MatchCase, MethodDefinition, Node, NodeKind, Send,
        Signature, Try, TypeNode, TypeNodeKind, TypeParameter,
    },
    lexer::Lexer,
    scope::{ScopeId, Scopes},
    token::{SourceLocation, Token, TokenKind},
    types::{self, Type},
};

type Result<T, E = SyntaxError> = std::result::Result<T, E>;

/// The receiver of sends compiled to VM instructions.
pub const INTRINSIC_RECEIVER: &str = "_INTRINSIC";

/// Binding power of `.`, `[` and `as`.
const POSTFIX_BP: u8 = 21;

/// Minimum binding power of the operand of `try` and `try!`.
const TRY_OPERAND_BP: u8 = 19;

/// Parses a module, allocating its scopes in `scopes`.
///
/// Parsing stops at the first syntax error.
pub fn parse_module(input: &[u8], file: Arc<Path>, scopes: &mut Scopes<Type>) -> Result<Body> {
    Parser::new(input, file, scopes).parse()
}

pub struct Parser<'src, 'scopes> {
    lexer: Lexer<'src>,
    file: Arc<Path>,
    /// Upcoming tokens, without comments.
    lookahead: VecDeque<Token>,
    scopes: &'scopes mut Scopes<Type>,
    scope: Option<ScopeId>,
    /// Last line of the most recently consumed token.
    previous_line: usize,
}

impl<'src, 'scopes> Parser<'src, 'scopes> {
    pub fn new(input: &'src [u8], file: Arc<Path>, scopes: &'scopes mut Scopes<Type>) -> Self {
        Parser {
            lexer: Lexer::new(input, file.clone()),
            file,
            lookahead: VecDeque::with_capacity(4),
            scopes,
            scope: None,
            previous_line: 1,
        }
    }

    /// Parses the whole input as the body of a module.
    pub fn parse(mut self) -> Result<Body> {
        let scope = self.scopes.add(None);
        self.scope = Some(scope);

        let mut children = Vec::new();
        while !self.is(TokenKind::Null) {
            let node = if self.is(TokenKind::Import) {
                let token = self.advance();
                self.parse_import(token)?
            } else {
                self.parse_expression()?
            };
            children.push(node);
        }
        log::trace!("parsed {} with {} nodes", self.file.display(), children.len());

        Ok(Body::new(
            children,
            scope,
            SourceLocation::start_of(self.file.clone()),
        ))
    }

    /// Parses a single expression, for tools that evaluate expressions one at a
    /// time.
    pub fn parse_standalone_expression(mut self) -> Result<(Node, ScopeId)> {
        let scope = self.scopes.add(None);
        self.scope = Some(scope);
        let node = self.parse_expression()?;
        self.consume(TokenKind::Null)?;
        Ok((node, scope))
    }

    // import ::= 'import' NAME ('::' NAME)* ['::' ('*' | '(' symbol (',' symbol)* ')')]
    fn parse_import(&mut self, start: Token) -> Result<Node> {
        let first = self.consume(TokenKind::Identifier)?;
        let mut path = vec![ImportSegment {
            name: first.text,
            location: first.location,
        }];
        let mut symbols = Vec::new();
        let mut import_all = false;

        while self.take(TokenKind::ColonColon) {
            let token = self.consume_any(&[
                TokenKind::Identifier,
                TokenKind::Mul,
                TokenKind::ParenOpen,
            ])?;
            match token.kind {
                TokenKind::Identifier => path.push(ImportSegment {
                    name: token.text,
                    location: token.location,
                }),
                TokenKind::Mul => {
                    import_all = true;
                    break;
                }
                _ => {
                    symbols = self.parse_list(TokenKind::ParenClose, Parser::parse_import_symbol)?;
                    self.consume(TokenKind::ParenClose)?;
                    break;
                }
            }
        }

        let import = Import {
            path,
            symbols,
            import_all,
        };
        Ok(Node::new(NodeKind::Import(import), start.location))
    }

    fn parse_import_symbol(&mut self) -> Result<ImportSymbol> {
        let token = self.consume_any(&[
            TokenKind::Identifier,
            TokenKind::Constant,
            TokenKind::SelfObject,
        ])?;
        let alias = if self.take(TokenKind::As) {
            let alias = self.consume_any(&[TokenKind::Identifier, TokenKind::Constant])?;
            Some(alias.text)
        } else {
            None
        };
        Ok(match token.kind {
            TokenKind::SelfObject => ImportSymbol::SelfModule {
                alias,
                location: token.location,
            },
            _ => ImportSymbol::Named {
                name: token.text,
                alias,
                location: token.location,
            },
        })
    }
}

// Definitions.
impl Parser<'_, '_> {
    // object ::= 'object' CONSTANT [type-params] '{' expression* '}'
    fn parse_object(&mut self, start: Token) -> Result<Node> {
        let name = self.consume(TokenKind::Constant)?;
        let type_parameters = self.parse_optional_type_parameters()?;
        let body = self.parse_body(false)?;
        let kind = NodeKind::ObjectDefinition {
            name: name.text,
            type_parameters,
            body,
        };
        Ok(Node::new(kind, start.location))
    }

    // trait ::= 'trait' CONSTANT [type-params] [':' type ('+' type)*] '{' expression* '}'
    fn parse_trait(&mut self, start: Token) -> Result<Node> {
        let name = self.consume(TokenKind::Constant)?;
        let type_parameters = self.parse_optional_type_parameters()?;
        let required_traits = if self.take(TokenKind::Colon) {
            self.parse_type_bounds()?
        } else {
            Vec::new()
        };
        let body = self.parse_body(false)?;
        let kind = NodeKind::TraitDefinition {
            name: name.text,
            type_parameters,
            required_traits,
            body,
        };
        Ok(Node::new(kind, start.location))
    }

    // impl ::= 'impl' type ['for' type] '{' expression* '}'
    fn parse_impl(&mut self, start: Token) -> Result<Node> {
        let first = self.parse_type()?;
        let kind = if self.take(TokenKind::For) {
            let object_name = self.parse_type()?;
            let body = self.parse_body(false)?;
            NodeKind::ImplementTrait {
                trait_name: first,
                object_name,
                body,
            }
        } else {
            let body = self.parse_body(false)?;
            NodeKind::ReopenObject { name: first, body }
        };
        Ok(Node::new(kind, start.location))
    }

    // method ::= ['static'] 'def' NAME [type-params] [args] [throw] [return] [where] [body]
    fn parse_method(&mut self, start: Token, static_method: bool) -> Result<Node> {
        if static_method {
            self.consume(TokenKind::Def)?;
        }
        let name = self.parse_method_name()?;
        let type_parameters = self.parse_optional_type_parameters()?;
        let arguments = if self.is(TokenKind::ParenOpen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        let (throw_type, return_type) = self.parse_throw_and_return_types()?;
        let method_bounds = if self.take(TokenKind::Where) {
            let mut bounds = vec![self.parse_type_parameter()?];
            while self.take(TokenKind::Comma) {
                bounds.push(self.parse_type_parameter()?);
            }
            bounds
        } else {
            Vec::new()
        };
        let signature = Signature {
            type_parameters,
            arguments,
            throw_type,
            return_type,
        };

        let kind = if self.is(TokenKind::CurlyOpen) {
            let body = self.parse_body(false)?;
            NodeKind::MethodDefinition(Box::new(MethodDefinition {
                name,
                static_method,
                signature,
                method_bounds,
                body,
            }))
        } else {
            NodeKind::RequiredMethodDefinition {
                name,
                signature,
                method_bounds,
            }
        };
        Ok(Node::new(kind, start.location))
    }

    /// Method names are identifiers, constants, operators, `[]` and `[]=`. A
    /// name directly followed by `=` is a setter.
    fn parse_method_name(&mut self) -> Result<String> {
        let token = self.advance();
        let mut name = match token.kind {
            TokenKind::Identifier | TokenKind::Constant => token.text,
            TokenKind::BracketOpen => {
                self.consume(TokenKind::BracketClose)?;
                String::from("[]")
            }
            kind if kind.is_binary_operator() => return Ok(token.text),
            kind if kind.is_keyword() => token.text,
            _ => return Err(self.unexpected(token, TokenKind::Identifier)),
        };
        if self.is(TokenKind::Assign) && self.peek_nth(1).kind == TokenKind::ParenOpen {
            self.advance();
            name.push('=');
        }
        Ok(name)
    }

    // args ::= '(' (['mut'] NAME [':' type] ['=' expression] | '*' NAME [':' type]),* ')'
    fn parse_arguments(&mut self) -> Result<Vec<ArgumentDefinition>> {
        self.consume(TokenKind::ParenOpen)?;
        let arguments = self.parse_list(TokenKind::ParenClose, Parser::parse_argument)?;
        self.consume(TokenKind::ParenClose)?;
        Ok(arguments)
    }

    fn parse_argument(&mut self) -> Result<ArgumentDefinition> {
        if self.take(TokenKind::Mul) {
            let name = self.consume(TokenKind::Identifier)?;
            let value_type = self.parse_optional_type_annotation()?;
            return Ok(ArgumentDefinition::Rest {
                name: name.text,
                value_type,
                location: name.location,
            });
        }

        let mutable = self.take(TokenKind::Mut);
        let name = self.consume(TokenKind::Identifier)?;
        let value_type = self.parse_optional_type_annotation()?;

        Ok(if self.take(TokenKind::Assign) {
            ArgumentDefinition::Optional {
                name: name.text,
                mutable,
                value_type,
                default: self.parse_expression()?,
                location: name.location,
            }
        } else if let Some(value_type) = value_type {
            ArgumentDefinition::Required {
                name: name.text,
                mutable,
                value_type,
                location: name.location,
            }
        } else {
            ArgumentDefinition::Untyped {
                name: name.text,
                mutable,
                location: name.location,
            }
        })
    }

    fn parse_throw_and_return_types(&mut self) -> Result<(Option<TypeNode>, Option<TypeNode>)> {
        let throw_type = if self.take(TokenKind::Throws) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let return_type = if self.take(TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        Ok((throw_type, return_type))
    }

    // block ::= ('do' | 'lambda') [args] [throw] [return] body
    fn parse_block(&mut self, capturing: bool) -> Result<Block> {
        let arguments = if self.is(TokenKind::ParenOpen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        let (throw_type, return_type) = self.parse_throw_and_return_types()?;
        let body = self.parse_body(capturing)?;
        Ok(Block {
            signature: Signature {
                type_parameters: Vec::new(),
                arguments,
                throw_type,
                return_type,
            },
            body,
        })
    }

    /// `@name: Type`
    fn parse_attribute_definition(&mut self, name: Token) -> Result<Node> {
        self.consume(TokenKind::Colon)?;
        let value_type = self.parse_type()?;
        let kind = NodeKind::DefineAttribute {
            name: name.text,
            value_type,
        };
        Ok(Node::new(kind, name.location))
    }

    // let ::= 'let' ['mut'] (NAME | CONSTANT) [':' type] '=' expression
    fn parse_let(&mut self, start: Token) -> Result<Node> {
        let mutable = self.take(TokenKind::Mut);
        let name = self.consume_any(&[TokenKind::Identifier, TokenKind::Constant])?;
        if mutable && name.kind == TokenKind::Constant {
            return Err(self.error(Error::MutableConstant, name.location));
        }
        let value_type = self.parse_optional_type_annotation()?;
        self.consume(TokenKind::Assign)?;
        let value = Box::new(self.parse_expression()?);

        let kind = if name.kind == TokenKind::Constant {
            NodeKind::DefineConstant {
                name: name.text,
                value_type,
                value,
            }
        } else {
            NodeKind::DefineVariable {
                name: name.text,
                mutable,
                value_type,
                value,
            }
        };
        Ok(Node::new(kind, start.location))
    }
}

// Types.
impl Parser<'_, '_> {
    // type ::= ['?'] [NAME '::'] CONSTANT ['!(' type,* ')']
    //        | ('do' | 'lambda') ['(' type,* ')'] [throw] [return]
    fn parse_type(&mut self) -> Result<TypeNode> {
        let token = self.advance();
        let location = token.location.clone();
        let kind = match token.kind {
            TokenKind::Question => TypeNodeKind::Optional(Box::new(self.parse_type()?)),
            TokenKind::Constant => TypeNodeKind::Constant {
                module: None,
                name: token.text,
                type_arguments: self.parse_optional_type_arguments()?,
            },
            TokenKind::Identifier if self.is(TokenKind::ColonColon) => {
                self.advance();
                let name = self.consume(TokenKind::Constant)?;
                TypeNodeKind::Constant {
                    module: Some(token.text),
                    name: name.text,
                    type_arguments: self.parse_optional_type_arguments()?,
                }
            }
            TokenKind::Do => TypeNodeKind::Closure(self.parse_block_type()?),
            TokenKind::Lambda => TypeNodeKind::Lambda(self.parse_block_type()?),
            _ => return Err(self.unexpected(token, TokenKind::Constant)),
        };
        Ok(TypeNode::new(kind, location))
    }

    fn parse_block_type(&mut self) -> Result<BlockTypeNode> {
        let arguments = if self.take(TokenKind::ParenOpen) {
            let arguments = self.parse_list(TokenKind::ParenClose, Parser::parse_type)?;
            self.consume(TokenKind::ParenClose)?;
            arguments
        } else {
            Vec::new()
        };
        let (throw_type, return_type) = self.parse_throw_and_return_types()?;
        Ok(BlockTypeNode {
            arguments,
            throw_type: throw_type.map(Box::new),
            return_type: return_type.map(Box::new),
        })
    }

    fn parse_optional_type_annotation(&mut self) -> Result<Option<TypeNode>> {
        if self.take(TokenKind::Colon) {
            Ok(Some(self.parse_type()?))
        } else {
            Ok(None)
        }
    }

    fn parse_optional_type_arguments(&mut self) -> Result<Vec<TypeNode>> {
        if !self.take(TokenKind::TypeArgsOpen) {
            return Ok(Vec::new());
        }
        let arguments = self.parse_list(TokenKind::ParenClose, Parser::parse_type)?;
        self.consume(TokenKind::ParenClose)?;
        Ok(arguments)
    }

    // type-params ::= '!(' CONSTANT [':' type ('+' type)*],* ')'
    fn parse_optional_type_parameters(&mut self) -> Result<Vec<TypeParameter>> {
        if !self.take(TokenKind::TypeArgsOpen) {
            return Ok(Vec::new());
        }
        let parameters = self.parse_list(TokenKind::ParenClose, Parser::parse_type_parameter)?;
        self.consume(TokenKind::ParenClose)?;
        Ok(parameters)
    }

    fn parse_type_parameter(&mut self) -> Result<TypeParameter> {
        let name = self.consume(TokenKind::Constant)?;
        let required_traits = if self.take(TokenKind::Colon) {
            self.parse_type_bounds()?
        } else {
            Vec::new()
        };
        Ok(TypeParameter {
            name: name.text,
            required_traits,
            location: name.location,
        })
    }

    fn parse_type_bounds(&mut self) -> Result<Vec<TypeNode>> {
        let mut bounds = vec![self.parse_type()?];
        while self.take(TokenKind::Add) {
            bounds.push(self.parse_type()?);
        }
        Ok(bounds)
    }
}

// Expressions.
impl Parser<'_, '_> {
    fn parse_expression(&mut self) -> Result<Node> {
        self.parse_expression_bp(0)
    }

    fn parse_expression_bp(&mut self, min_bp: u8) -> Result<Node> {
        let token = self.advance();
        let mut lhs = self.parse_nud(token)?;

        loop {
            let kind = self.peek().kind;
            // Indexing and casts don't continue on the next line.
            if matches!(kind, TokenKind::BracketOpen | TokenKind::As) && !self.same_line() {
                break;
            }
            let Some((lbp, rbp)) = Self::infix_binding_power(kind) else {
                break;
            };
            if lbp < min_bp {
                break;
            }
            let token = self.advance();
            lhs = self.parse_led(token, lhs, rbp)?;
        }

        Ok(lhs)
    }

    /// nud: Parses tokens that start an expression.
    fn parse_nud(&mut self, token: Token) -> Result<Node> {
        let location = token.location.clone();
        let kind = match token.kind {
            TokenKind::Integer => NodeKind::Integer(self.parse_integer(&token, false)?),
            TokenKind::Float => NodeKind::Float(self.parse_float(&token, false)?),
            TokenKind::String => NodeKind::String(token.text),
            TokenKind::Identifier => return self.parse_identifier(token),
            TokenKind::Constant => NodeKind::Constant {
                receiver: None,
                name: token.text,
                type_arguments: self.parse_optional_type_arguments()?,
            },
            TokenKind::Attribute if self.is(TokenKind::Colon) => {
                return self.parse_attribute_definition(token);
            }
            TokenKind::Attribute => NodeKind::Attribute(token.text),
            TokenKind::ColonColon => {
                let name = self.consume_any(&[TokenKind::Identifier, TokenKind::Constant])?;
                NodeKind::Global(name.text)
            }
            TokenKind::SelfObject => NodeKind::SelfObject,

            // Grouping: ( expression )
            TokenKind::ParenOpen => {
                let expression = self.parse_expression()?;
                self.consume(TokenKind::ParenClose)?;
                return Ok(expression);
            }

            // Array literals: [a, b] is Array.new(a, b)
            TokenKind::BracketOpen => {
                let values = self.parse_list(TokenKind::BracketClose, Parser::parse_expression)?;
                self.consume(TokenKind::BracketClose)?;
                let array = NodeKind::Constant {
                    receiver: None,
                    name: String::from(types::ARRAY),
                    type_arguments: Vec::new(),
                };
                let receiver = Node::new(array, location.clone());
                return Ok(send(Some(receiver), "new", values, location));
            }

            TokenKind::CurlyOpen => NodeKind::BasicClosure(self.parse_body_contents(location.clone(), true)?),
            TokenKind::Do | TokenKind::Lambda => return self.parse_closure_or_lambda(token),
            TokenKind::Let => return self.parse_let(token),
            TokenKind::Def => return self.parse_method(token, false),
            TokenKind::Static => return self.parse_method(token, true),
            TokenKind::Object => return self.parse_object(token),
            TokenKind::Trait => return self.parse_trait(token),
            TokenKind::Impl => return self.parse_impl(token),
            TokenKind::Return => return self.parse_return(location, false),
            TokenKind::Throw => return self.parse_throw(location, false),
            TokenKind::Try => return self.parse_try(location, false),
            TokenKind::Local => {
                let next = self.consume_any(&[TokenKind::Return, TokenKind::Throw, TokenKind::Try])?;
                return match next.kind {
                    TokenKind::Return => self.parse_return(location, true),
                    TokenKind::Throw => self.parse_throw(location, true),
                    _ => self.parse_try(location, true),
                };
            }
            TokenKind::TryPanic => {
                let expression = self.parse_expression_bp(TRY_OPERAND_BP)?;
                NodeKind::TryPanic(Box::new(expression))
            }
            TokenKind::Match => return self.parse_match(token),

            // Negative numeric literals.
            TokenKind::Sub => {
                let next = self.advance();
                match next.kind {
                    TokenKind::Integer => NodeKind::Integer(self.parse_integer(&next, true)?),
                    TokenKind::Float => NodeKind::Float(self.parse_float(&next, true)?),
                    _ => return Err(self.error(Error::UnaryMinus, location)),
                }
            }

            TokenKind::Import => return Err(self.error(Error::NestedImport, location)),
            TokenKind::Invalid => {
                return Err(self.error(Error::InvalidToken { text: token.text }, location));
            }
            other => {
                let error = Error::UnexpectedTokenInExpr { token: other };
                return Err(self.error(error, location));
            }
        };

        Ok(Node::new(kind, location))
    }

    /// led: Parses tokens that follow a left-hand-side expression.
    fn parse_led(&mut self, token: Token, lhs: Node, rbp: u8) -> Result<Node> {
        match token.kind {
            TokenKind::Dot => {
                let name = self.advance();
                if !matches!(name.kind, TokenKind::Identifier | TokenKind::Constant) {
                    return Err(self.unexpected(name, TokenKind::Identifier));
                }
                let instruction = matches!(
                    &lhs.kind,
                    NodeKind::Constant { receiver: None, name, .. } if name == INTRINSIC_RECEIVER
                );
                self.parse_send(Some(lhs), name, instruction)
            }

            // Indexing: receiver[index] is receiver.[](index)
            TokenKind::BracketOpen => {
                let index = self.parse_expression()?;
                self.consume(TokenKind::BracketClose)?;
                let location = lhs.location.clone();
                Ok(send(Some(lhs), "[]", vec![index], location))
            }

            TokenKind::As => {
                let cast_to = self.parse_type()?;
                let location = lhs.location.clone();
                let kind = NodeKind::TypeCast {
                    value: Box::new(lhs),
                    cast_to,
                };
                Ok(Node::new(kind, location))
            }

            TokenKind::Assign => {
                let value = self.parse_expression_bp(rbp)?;
                self.assign(lhs, value)
            }

            // Compound assignment: x += y is x = x + y
            kind if kind.is_binary_assign() => {
                let value = self.parse_expression_bp(rbp)?;
                let operator = token.text.trim_end_matches('=');
                let location = lhs.location.clone();
                let value = send(Some(lhs.clone()), operator, vec![value], location);
                self.assign(lhs, value)
            }

            // Binary operators are sends to the left-hand side.
            _ => {
                let rhs = self.parse_expression_bp(rbp)?;
                let location = lhs.location.clone();
                Ok(send(Some(lhs), token.text, vec![rhs], location))
            }
        }
    }

    fn infix_binding_power(kind: TokenKind) -> Option<(u8, u8)> {
        use TokenKind::*;
        let bp = match kind {
            // Assignment (right-associative)
            Assign => (2, 1),
            kind if kind.is_binary_assign() => (2, 1),

            Or | And => (3, 4),
            Eq | Ne | Lt | Le | Gt | Ge => (5, 6),
            InclusiveRange | ExclusiveRange => (7, 8),
            BitOr | BitXor | BitAnd => (9, 10),
            Shl | Shr => (11, 12),
            Add | Sub => (13, 14),
            Mul | Div | Mod => (15, 16),

            // Exponentiation (right-associative)
            Pow => (18, 17),

            Dot | BracketOpen | As => (POSTFIX_BP, POSTFIX_BP + 1),

            _ => return None,
        };
        Some(bp)
    }

    /// Turns `target = value` into the matching reassignment or setter send.
    fn assign(&mut self, target: Node, value: Node) -> Result<Node> {
        let location = target.location.clone();
        let kind = match target.kind {
            NodeKind::Identifier(name) => NodeKind::ReassignVariable {
                name,
                value: Box::new(value),
            },
            NodeKind::Attribute(name) => NodeKind::ReassignAttribute {
                name,
                value: Box::new(value),
            },
            NodeKind::Constant { .. } => {
                return Err(self.error(Error::ConstantReassignment, location));
            }
            // receiver.name = value is receiver.name=(value)
            NodeKind::Send(mut send)
                if send.receiver.is_some()
                    && send.arguments.is_empty()
                    && send.keyword_arguments.is_empty()
                    && !send.instruction =>
            {
                send.name.push('=');
                send.arguments.push(value);
                NodeKind::Send(send)
            }
            // receiver[index] = value is receiver.[]=(index, value)
            NodeKind::Send(mut send) if send.name == "[]" && send.arguments.len() == 1 => {
                send.name.push('=');
                send.arguments.push(value);
                NodeKind::Send(send)
            }
            _ => return Err(self.error(Error::InvalidAssignmentTarget, location)),
        };
        Ok(Node::new(kind, location))
    }

    fn parse_identifier(&mut self, token: Token) -> Result<Node> {
        let next = self.peek().kind;
        match next {
            TokenKind::ParenOpen if self.same_line() => self.parse_send(None, token, false),
            TokenKind::TypeArgsOpen => self.parse_send(None, token, false),

            // module::Constant or module::method
            TokenKind::ColonColon => {
                self.advance();
                let module = Node::new(NodeKind::Identifier(token.text), token.location);
                let name = self.consume_any(&[TokenKind::Identifier, TokenKind::Constant])?;
                if name.kind == TokenKind::Identifier {
                    return self.parse_send(Some(module), name, false);
                }
                let location = module.location.clone();
                let kind = NodeKind::Constant {
                    receiver: Some(Box::new(module)),
                    name: name.text,
                    type_arguments: self.parse_optional_type_arguments()?,
                };
                Ok(Node::new(kind, location))
            }

            _ => Ok(Node::new(NodeKind::Identifier(token.text), token.location)),
        }
    }

    // send ::= NAME ['!(' type,* ')'] ['(' argument,* ')'] [('do' | 'lambda') block]
    fn parse_send(&mut self, receiver: Option<Node>, name: Token, instruction: bool) -> Result<Node> {
        let type_arguments = self.parse_optional_type_arguments()?;
        let (mut arguments, keyword_arguments) =
            if self.is(TokenKind::ParenOpen) && self.same_line() {
                self.parse_call_arguments()?
            } else {
                (Vec::new(), Vec::new())
            };

        // A trailing block is passed as the last argument.
        if matches!(self.peek().kind, TokenKind::Do | TokenKind::Lambda) && self.same_line() {
            let token = self.advance();
            arguments.push(self.parse_closure_or_lambda(token)?);
        }

        let location = receiver
            .as_ref()
            .map_or_else(|| name.location.clone(), |receiver| receiver.location.clone());
        let send = Send {
            receiver,
            name: name.text,
            arguments,
            keyword_arguments,
            type_arguments,
            instruction,
        };
        Ok(Node::new(NodeKind::Send(Box::new(send)), location))
    }

    fn parse_call_arguments(&mut self) -> Result<(Vec<Node>, Vec<KeywordArgument>)> {
        self.consume(TokenKind::ParenOpen)?;
        let mut arguments = Vec::new();
        let mut keyword_arguments = Vec::new();

        while !self.is(TokenKind::ParenClose) {
            if self.is(TokenKind::Identifier) && self.peek_nth(1).kind == TokenKind::Colon {
                let name = self.advance();
                self.advance();
                keyword_arguments.push(KeywordArgument {
                    name: name.text,
                    value: self.parse_expression()?,
                    location: name.location,
                });
            } else {
                arguments.push(self.parse_expression()?);
            }
            if !self.take(TokenKind::Comma) {
                break;
            }
        }

        self.consume(TokenKind::ParenClose)?;
        Ok((arguments, keyword_arguments))
    }

    fn parse_closure_or_lambda(&mut self, token: Token) -> Result<Node> {
        let kind = if token.kind == TokenKind::Lambda {
            NodeKind::Lambda(self.parse_block(false)?)
        } else {
            NodeKind::Closure(self.parse_block(true)?)
        };
        Ok(Node::new(kind, token.location))
    }

    fn parse_return(&mut self, location: SourceLocation, local: bool) -> Result<Node> {
        let has_value = self.same_line()
            && !matches!(
                self.peek().kind,
                TokenKind::CurlyClose
                    | TokenKind::ParenClose
                    | TokenKind::BracketClose
                    | TokenKind::Comma
                    | TokenKind::Null
            );
        let value = if has_value {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        Ok(Node::new(NodeKind::Return { value, local }, location))
    }

    fn parse_throw(&mut self, location: SourceLocation, local: bool) -> Result<Node> {
        let value = Box::new(self.parse_expression()?);
        Ok(Node::new(NodeKind::Throw { value, local }, location))
    }

    // try ::= ['local'] 'try' expression ['else' ['(' NAME ')'] (body | expression)]
    fn parse_try(&mut self, location: SourceLocation, local: bool) -> Result<Node> {
        let expression = self.parse_expression_bp(TRY_OPERAND_BP)?;
        let (error_variable, else_body) = if self.take(TokenKind::Else) {
            let error_variable = if self.take(TokenKind::ParenOpen) {
                let name = self.consume(TokenKind::Identifier)?;
                self.consume(TokenKind::ParenClose)?;
                Some(Binding {
                    name: name.text,
                    location: name.location,
                })
            } else {
                None
            };
            (error_variable, Some(self.parse_inline_body()?))
        } else {
            (None, None)
        };

        let node = Try {
            expression,
            error_variable,
            else_body,
            local,
        };
        Ok(Node::new(NodeKind::Try(Box::new(node)), location))
    }

    // match ::= 'match' '(' ['let' NAME '='] expression ')' '{' case+ ['else' '->' body] '}'
    fn parse_match(&mut self, start: Token) -> Result<Node> {
        // Without a scrutinee, the cases are conditions.
        let (scrutinee, binding) = if self.take(TokenKind::ParenOpen) {
            let binding = if self.take(TokenKind::Let) {
                let name = self.consume(TokenKind::Identifier)?;
                self.consume(TokenKind::Assign)?;
                Some(Binding {
                    name: name.text,
                    location: name.location,
                })
            } else {
                None
            };
            let scrutinee = self.parse_expression()?;
            self.consume(TokenKind::ParenClose)?;
            (Some(scrutinee), binding)
        } else {
            (None, None)
        };
        self.consume(TokenKind::CurlyOpen)?;

        let mut cases = Vec::new();
        let mut else_body = None;
        while !self.take(TokenKind::CurlyClose) {
            if self.take(TokenKind::Else) {
                self.consume(TokenKind::Arrow)?;
                else_body = Some(self.parse_inline_body()?);
                self.consume(TokenKind::CurlyClose)?;
                break;
            }
            cases.push(self.parse_match_case()?);
        }

        if cases.is_empty() {
            return Err(self.error(Error::EmptyMatch, start.location));
        }

        let node = Match {
            scrutinee,
            binding,
            cases,
            else_body,
        };
        Ok(Node::new(NodeKind::Match(Box::new(node)), start.location))
    }

    fn parse_match_case(&mut self) -> Result<MatchCase> {
        let location = self.peek().location.clone();

        if self.take(TokenKind::As) {
            let pattern = self.parse_type()?;
            let guard = self.parse_match_guard()?;
            self.consume(TokenKind::Arrow)?;
            let body = self.parse_inline_body()?;
            return Ok(MatchCase::Type {
                pattern,
                guard,
                body,
                location,
            });
        }

        let mut patterns = vec![self.parse_expression()?];
        while self.take(TokenKind::Comma) {
            patterns.push(self.parse_expression()?);
        }
        let guard = self.parse_match_guard()?;
        self.consume(TokenKind::Arrow)?;
        let body = self.parse_inline_body()?;
        Ok(MatchCase::Expressions {
            patterns,
            guard,
            body,
            location,
        })
    }

    fn parse_match_guard(&mut self) -> Result<Option<Node>> {
        if self.take(TokenKind::When) {
            Ok(Some(self.parse_expression()?))
        } else {
            Ok(None)
        }
    }

    fn parse_integer(&self, token: &Token, negative: bool) -> Result<i64> {
        let digits: String = token.text.chars().filter(|c| *c != '_').collect();
        let sign = if negative { "-" } else { "" };
        let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            Some(hex) => i64::from_str_radix(&format!("{sign}{hex}"), 16),
            None => format!("{sign}{digits}").parse(),
        };
        parsed.map_err(|_| {
            let error = Error::ParseInt {
                text: format!("{sign}{}", token.text),
            };
            self.error(error, token.location.clone())
        })
    }

    fn parse_float(&self, token: &Token, negative: bool) -> Result<f64> {
        let digits: String = token.text.chars().filter(|c| *c != '_').collect();
        match digits.parse::<f64>() {
            Ok(value) if negative => Ok(-value),
            Ok(value) => Ok(value),
            Err(_) => {
                let error = Error::ParseFloat {
                    text: token.text.clone(),
                };
                Err(self.error(error, token.location.clone()))
            }
        }
    }
}

fn send(
    receiver: Option<Node>,
    name: impl Into<String>,
    arguments: Vec<Node>,
    location: SourceLocation,
) -> Node {
    let send = Send {
        receiver,
        name: name.into(),
        arguments,
        keyword_arguments: Vec::new(),
        type_arguments: Vec::new(),
        instruction: false,
    };
    Node::new(NodeKind::Send(Box::new(send)), location)
}

// Bodies and scopes.
impl Parser<'_, '_> {
    /// Parses `{ expression* }` as a body with its own scope.
    ///
    /// Capturing bodies see the variables of the enclosing scope.
    fn parse_body(&mut self, capturing: bool) -> Result<Body> {
        let open = self.consume(TokenKind::CurlyOpen)?;
        self.parse_body_contents(open.location, capturing)
    }

    /// Parses the rest of a body whose `{` was already consumed.
    fn parse_body_contents(&mut self, location: SourceLocation, capturing: bool) -> Result<Body> {
        let parent = self.scope;
        let scope = self.scopes.add(if capturing { parent } else { None });
        self.scope = Some(scope);

        let mut children = Vec::new();
        loop {
            let next = self.peek().kind;
            match next {
                TokenKind::CurlyClose => break,
                TokenKind::Null => {
                    let token = self.advance();
                    return Err(self.unexpected(token, TokenKind::CurlyClose));
                }
                _ => children.push(self.parse_expression()?),
            }
        }
        self.advance();

        self.scope = parent;
        Ok(Body::new(children, scope, location))
    }

    /// Parses either a body, or a single expression wrapped in a body, as used
    /// by `try ... else` and match cases.
    fn parse_inline_body(&mut self) -> Result<Body> {
        if self.is(TokenKind::CurlyOpen) {
            return self.parse_body(true);
        }
        let parent = self.scope;
        let scope = self.scopes.add(parent);
        self.scope = Some(scope);
        let expression = self.parse_expression()?;
        self.scope = parent;

        let location = expression.location.clone();
        Ok(Body::new(vec![expression], scope, location))
    }

    /// Parses `item (',' item)*` until `end` is found. Does **NOT** consume the
    /// end delimiter. A trailing comma is allowed.
    fn parse_list<T>(
        &mut self,
        end: TokenKind,
        mut parse_item: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while !self.is(end) {
            items.push(parse_item(self)?);
            if !self.take(TokenKind::Comma) {
                if self.is(end) {
                    break;
                }
                let token = self.advance();
                return Err(self.unexpected_any(token, &[TokenKind::Comma, end]));
            }
        }
        Ok(items)
    }
}

// Cursor.
impl Parser<'_, '_> {
    /// Returns the next token that isn't trivia.
    fn next_significant(&mut self) -> Token {
        loop {
            let token = self.lexer.next_token();
            if !token.kind.is_trivia() {
                return token;
            }
        }
    }

    fn fill(&mut self, n: usize) {
        while self.lookahead.len() <= n {
            let token = self.next_significant();
            self.lookahead.push_back(token);
        }
    }

    /// Returns the current token.
    fn peek(&mut self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&mut self, n: usize) -> &Token {
        self.fill(n);
        &self.lookahead[n]
    }

    /// Returns the current token and advances.
    fn advance(&mut self) -> Token {
        let token = match self.lookahead.pop_front() {
            Some(token) => token,
            None => self.next_significant(),
        };
        if !token.is_null() {
            self.previous_line = token.location.last_line();
        }
        token
    }

    /// Checks whether the current token matches the given one.
    fn is(&mut self, expect: TokenKind) -> bool {
        self.peek().kind == expect
    }

    /// Returns true if the current token starts on the line the previous token
    /// ended on.
    fn same_line(&mut self) -> bool {
        let line = self.previous_line;
        self.peek().location.line() == line
    }

    /// Advances if the current token matches the provided one, returning true.
    /// If not, returns false and doesn't advance.
    fn take(&mut self, expect: TokenKind) -> bool {
        if self.is(expect) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Advances if the current token matches the provided one. If not, returns
    /// an error.
    fn consume(&mut self, expect: TokenKind) -> Result<Token> {
        let token = self.advance();
        if token.kind == expect {
            Ok(token)
        } else {
            Err(self.unexpected(token, expect))
        }
    }

    /// Advances if the current token matches any of the provided ones. If not,
    /// returns an error.
    fn consume_any(&mut self, expect: &[TokenKind]) -> Result<Token> {
        let token = self.advance();
        if expect.contains(&token.kind) {
            Ok(token)
        } else {
            Err(self.unexpected_any(token, expect))
        }
    }

    fn error(&self, error: Error, location: SourceLocation) -> SyntaxError {
        SyntaxError { error, location }
    }

    fn unexpected(&self, token: Token, expected: TokenKind) -> SyntaxError {
        let error = match token.kind {
            TokenKind::Invalid => Error::InvalidToken { text: token.text },
            actual => Error::Unexpected { actual, expected },
        };
        self.error(error, token.location)
    }

    fn unexpected_any(&self, token: Token, expected: &[TokenKind]) -> SyntaxError {
        let error = match token.kind {
            TokenKind::Invalid => Error::InvalidToken { text: token.text },
            actual => Error::UnexpectedAny {
                actual,
                expected: Box::from(expected),
            },
        };
        self.error(error, token.location)
    }
}

/// A syntax error, fatal to the module being parsed.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{error}")]
pub struct SyntaxError {
    pub error: Error,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("expected token {expected:?}, but got {actual:?}")]
    Unexpected {
        actual: TokenKind,
        expected: TokenKind,
    },
    #[error("expected one of {expected:?}, but got {actual:?}")]
    UnexpectedAny {
        actual: TokenKind,
        expected: Box<[TokenKind]>,
    },
    #[error("unexpected token {token:?} in expression")]
    UnexpectedTokenInExpr { token: TokenKind },
    #[error("invalid input {text:?}")]
    InvalidToken { text: String },
    #[error("invalid assignment target")]
    InvalidAssignmentTarget,
    #[error("constants can't be reassigned")]
    ConstantReassignment,
    #[error("constants can't be mutable")]
    MutableConstant,
    #[error("a match must have at least one case")]
    EmptyMatch,
    #[error("imports are only allowed at the top level of a module")]
    NestedImport,
    #[error("unary minus can only be applied to numeric literals")]
    UnaryMinus,
    #[error("the integer {text} is out of range")]
    ParseInt { text: String },
    #[error("the float {text} is invalid")]
    ParseFloat { text: String },
}

#[cfg(test)]
mod tests {
    use crate::util::test_utils::tree_tests;

    tree_tests!(
        use parser;

        fn test_method_definition() {
            let program = "def add(a: Integer, b: Integer) -> Integer { a + b }";
            let tree_ok = "
                method add(a: Integer, b: Integer) -> Integer (1:1)
                  send + (1:46)
                    receiver
                      identifier a (1:46)
                    arguments
                      identifier b (1:50)
            ";
        }

        fn test_precedence() {
            let expr = "1 + 2 * 3";
            let tree_ok = "
                send + (1:1)
                  receiver
                    integer 1 (1:1)
                  arguments
                    send * (1:5)
                      receiver
                        integer 2 (1:5)
                      arguments
                        integer 3 (1:9)
            ";
        }

        fn test_pow_is_right_associative() {
            let expr = "2 ** 3 ** 2";
            let tree_ok = "
                send ** (1:1)
                  receiver
                    integer 2 (1:1)
                  arguments
                    send ** (1:6)
                      receiver
                        integer 3 (1:6)
                      arguments
                        integer 2 (1:11)
            ";
        }

        fn test_numeric_literals() {
            let expr = "-10";
            let tree_ok = "integer -10 (1:1)";
        }

        fn test_hex_literals() {
            let expr = "0x1F";
            let tree_ok = "integer 31 (1:1)";
        }

        fn test_float_literals() {
            let expr = "1_000.5";
            let tree_ok = "float 1000.5 (1:1)";
        }

        fn test_send_with_keyword_arguments_and_block() {
            let expr = "foo.bar(1, key: 2) do (x) { x }";
            let tree_ok = "
                send bar (1:1)
                  receiver
                    identifier foo (1:1)
                  arguments
                    integer 1 (1:9)
                    do (x) (1:20)
                      identifier x (1:29)
                    key:
                      integer 2 (1:17)
            ";
        }

        fn test_setter_assignment() {
            let expr = "a.b = 1";
            let tree_ok = "
                send b= (1:1)
                  receiver
                    identifier a (1:1)
                  arguments
                    integer 1 (1:7)
            ";
        }

        fn test_index_assignment() {
            let expr = "x[1] = 2";
            let tree_ok = "
                send []= (1:1)
                  receiver
                    identifier x (1:1)
                  arguments
                    integer 1 (1:3)
                    integer 2 (1:8)
            ";
        }

        fn test_compound_assignment() {
            let expr = "x += 1";
            let tree_ok = "
                reassign x (1:1)
                  send + (1:1)
                    receiver
                      identifier x (1:1)
                    arguments
                      integer 1 (1:6)
            ";
        }

        fn test_let_with_type() {
            let expr = "let mut x: ?Integer = 10";
            let tree_ok = "
                let mut x: ?Integer (1:1)
                  integer 10 (1:23)
            ";
        }

        fn test_array_literal() {
            let expr = "[1, 2]";
            let tree_ok = "
                send new (1:1)
                  receiver
                    constant Array (1:1)
                  arguments
                    integer 1 (1:2)
                    integer 2 (1:5)
            ";
        }

        fn test_indexing_does_not_continue_on_the_next_line() {
            let program = "foo\n[1]";
            let tree_ok = "
                identifier foo (1:1)
                send new (2:1)
                  receiver
                    constant Array (2:1)
                  arguments
                    integer 1 (2:2)
            ";
        }

        fn test_constants() {
            let expr = "Foo!(Integer)";
            let tree_ok = "constant Foo!(Integer) (1:1)";
        }

        fn test_module_constants() {
            let expr = "a::B";
            let tree_ok = "
                constant B (1:1)
                  receiver
                    identifier a (1:1)
            ";
        }

        fn test_module_methods() {
            let expr = "a::b(1)";
            let tree_ok = "
                send b (1:1)
                  receiver
                    identifier a (1:1)
                  arguments
                    integer 1 (1:6)
            ";
        }

        fn test_globals() {
            let expr = "::Foo";
            let tree_ok = "global Foo (1:1)";
        }

        fn test_type_cast() {
            let expr = "x as ?Foo";
            let tree_ok = "
                cast ?Foo (1:1)
                  identifier x (1:1)
            ";
        }

        fn test_instructions() {
            let expr = "_INTRINSIC.foo(1)";
            let tree_ok = "
                instruction foo (1:1)
                  receiver
                    constant _INTRINSIC (1:1)
                  arguments
                    integer 1 (1:16)
            ";
        }

        fn test_basic_closure() {
            let expr = "{ 1 }";
            let tree_ok = "
                block (1:1)
                  integer 1 (1:3)
            ";
        }

        fn test_lambda() {
            let expr = "lambda (a: Integer) -> Integer { a }";
            let tree_ok = "
                lambda (a: Integer) -> Integer (1:1)
                  identifier a (1:34)
            ";
        }

        fn test_try_panic() {
            let expr = "try! foo";
            let tree_ok = "
                try! (1:1)
                  identifier foo (1:6)
            ";
        }

        fn test_try_else() {
            let expr = "try foo else (e) bar";
            let tree_ok = "
                try (1:1)
                  identifier foo (1:5)
                  else (e)
                    identifier bar (1:18)
            ";
        }

        fn test_local_throw_and_return() {
            let program = indoc::indoc! {r#"
                def foo !! String {
                  local throw "x"
                  return
                }
            "#};
            let tree_ok = r#"
                method foo !! String (1:1)
                  local throw (2:3)
                    string "x" (2:15)
                  return (3:3)
            "#;
        }

        fn test_object() {
            let program = indoc::indoc! {"
                object Box!(T: ToString) {
                  @value: T

                  def value -> T { @value }
                }
            "};
            let tree_ok = "
                object Box!(T: ToString) (1:1)
                  define attribute @value: T (2:3)
                  method value -> T (4:3)
                    attribute @value (4:20)
            ";
        }

        fn test_trait_and_impl() {
            let program = indoc::indoc! {r#"
                trait ToString: Show + Eq {
                  def to_string -> String
                }
                impl ToString for Box {
                  def to_string -> String { "box" }
                }
            "#};
            let tree_ok = r#"
                trait ToString: Show + Eq (1:1)
                  required method to_string -> String (2:3)
                impl ToString for Box (4:1)
                  method to_string -> String (5:3)
                    string "box" (5:29)
            "#;
        }

        fn test_match() {
            let program = indoc::indoc! {"
                match(let x = y) {
                  as Integer when x > 0 -> 1
                  1, 2 -> { 2 }
                  else -> 3
                }
            "};
            let tree_ok = "
                match (let x) (1:1)
                  identifier y (1:15)
                  case as Integer (2:3)
                    when
                      send > (2:19)
                        receiver
                          identifier x (2:19)
                        arguments
                          integer 0 (2:23)
                    body
                      integer 1 (2:28)
                  case (3:3)
                    patterns
                      integer 1 (3:3)
                      integer 2 (3:6)
                    body
                      integer 2 (3:13)
                  else
                    integer 3 (4:11)
            ";
        }

        fn test_match_without_scrutinee() {
            let expr = "match { x == 1 -> 2 else -> 3 }";
            let tree_ok = "
                match (1:1)
                  case (1:9)
                    patterns
                      send == (1:9)
                        receiver
                          identifier x (1:9)
                        arguments
                          integer 1 (1:14)
                    body
                      integer 2 (1:19)
                  else
                    integer 3 (1:29)
            ";
        }

        fn test_match_binding_needs_parentheses() {
            let expr = "match let x = 1 { else -> 2 }";
            let expected_errors = &["1:7: error: expected token CurlyOpen, but got Let"];
        }

        fn test_imports() {
            let program = "import std::foo::(bar as baz, self)\nimport a::*";
            let tree_ok = "
                import std::foo::(bar as baz, self) (1:1)
                import a::* (2:1)
            ";
        }

        fn test_mutable_constants() {
            let program = "let mut A = 1";
            let expected_errors = &["1:9: error: constants can't be mutable"];
        }

        fn test_invalid_assignment_target() {
            let expr = "1 = 2";
            let expected_errors = &["1:1: error: invalid assignment target"];
        }

        fn test_unary_minus_on_identifiers() {
            let expr = "-a";
            let expected_errors = &["1:1: error: unary minus can only be applied to numeric literals"];
        }

        fn test_empty_match() {
            let expr = "match(x) { else -> 1 }";
            let expected_errors = &["1:1: error: a match must have at least one case"];
        }

        fn test_nested_import() {
            let program = "def foo { import a }";
            let expected_errors = &["1:11: error: imports are only allowed at the top level of a module"];
        }

        fn test_missing_separator() {
            let expr = "foo(1 2)";
            let expected_errors = &["1:7: error: expected token ParenClose, but got Integer"];
        }
    );
}
