use std::io::Write;

use crate::{
    ast::{
        ArgumentDefinition, Body, Import, ImportSymbol, Match, MatchCase, Node, NodeKind, Signature,
        TypeParameter,
    },
    util::fmt::type_parameters,
};

const INDENT_WIDTH: usize = 2;

fn sp(w: &mut impl Write, i: usize) -> std::io::Result<()> {
    write!(w, "{:width$}", "", width = i * INDENT_WIDTH)
}

pub fn print_body_string(body: &Body) -> String {
    let mut buf = Vec::with_capacity(1024);
    print_body(&mut buf, 0, body).unwrap();
    String::from_utf8(buf).unwrap()
}

pub fn print_node_string(node: &Node) -> String {
    let mut buf = Vec::with_capacity(512);
    print_node(&mut buf, 0, node).unwrap();
    String::from_utf8(buf).unwrap()
}

pub fn print_body(w: &mut impl Write, i: usize, body: &Body) -> std::io::Result<()> {
    for node in &body.children {
        print_node(w, i, node)?;
    }
    Ok(())
}

pub fn print_node(w: &mut impl Write, i: usize, node: &Node) -> std::io::Result<()> {
    sp(w, i)?;
    let location = &node.location;
    let info = match node.resolved_type() {
        Some(ty) => format!(" %: {ty}"),
        None => String::new(),
    };

    match &node.kind {
        NodeKind::Integer(value) => writeln!(w, "integer {value} ({location}{info})")?,
        NodeKind::Float(value) => writeln!(w, "float {value:?} ({location}{info})")?,
        NodeKind::String(value) => writeln!(w, "string {value:?} ({location}{info})")?,
        NodeKind::Identifier(name) => writeln!(w, "identifier {name} ({location}{info})")?,
        NodeKind::Constant {
            receiver,
            name,
            type_arguments,
        } => {
            write!(w, "constant {name}")?;
            if !type_arguments.is_empty() {
                let arguments: Vec<_> = type_arguments.iter().map(ToString::to_string).collect();
                write!(w, "!({})", arguments.join(", "))?;
            }
            writeln!(w, " ({location}{info})")?;
            if let Some(receiver) = receiver {
                sp(w, i + 1)?;
                writeln!(w, "receiver")?;
                print_node(w, i + 2, receiver)?;
            }
        }
        NodeKind::Attribute(name) => writeln!(w, "attribute {name} ({location}{info})")?,
        NodeKind::Global(name) => writeln!(w, "global {name} ({location}{info})")?,
        NodeKind::SelfObject => writeln!(w, "self ({location}{info})")?,

        NodeKind::DefineVariable {
            name,
            mutable,
            value_type,
            value,
        } => {
            write!(w, "let ")?;
            if *mutable {
                write!(w, "mut ")?;
            }
            write!(w, "{name}")?;
            if let Some(value_type) = value_type {
                write!(w, ": {value_type}")?;
            }
            writeln!(w, " ({location}{info})")?;
            print_node(w, i + 1, value)?;
        }
        NodeKind::DefineConstant {
            name,
            value_type,
            value,
        } => {
            write!(w, "let {name}")?;
            if let Some(value_type) = value_type {
                write!(w, ": {value_type}")?;
            }
            writeln!(w, " ({location}{info})")?;
            print_node(w, i + 1, value)?;
        }
        NodeKind::ReassignVariable { name, value } | NodeKind::ReassignAttribute { name, value } => {
            writeln!(w, "reassign {name} ({location}{info})")?;
            print_node(w, i + 1, value)?;
        }
        NodeKind::DefineAttribute { name, value_type } => {
            writeln!(w, "define attribute {name}: {value_type} ({location}{info})")?;
        }

        NodeKind::BasicClosure(body) => {
            writeln!(w, "block ({location}{info})")?;
            print_body(w, i + 1, body)?;
        }
        NodeKind::Closure(block) | NodeKind::Lambda(block) => {
            let keyword = if matches!(node.kind, NodeKind::Lambda(_)) {
                "lambda"
            } else {
                "do"
            };
            let signature = block.signature.to_string();
            if !signature.is_empty() {
                write!(w, "{keyword} {}", signature.trim_start())?;
            } else {
                write!(w, "{keyword}")?;
            }
            writeln!(w, " ({location}{info})")?;
            print_defaults(w, i + 1, &block.signature)?;
            print_body(w, i + 1, &block.body)?;
        }
        NodeKind::MethodDefinition(method) => {
            if method.static_method {
                write!(w, "static ")?;
            }
            write!(w, "method {}{}", method.name, method.signature)?;
            print_where(w, &method.method_bounds)?;
            writeln!(w, " ({location}{info})")?;
            print_defaults(w, i + 1, &method.signature)?;
            print_body(w, i + 1, &method.body)?;
        }
        NodeKind::RequiredMethodDefinition {
            name,
            signature,
            method_bounds,
        } => {
            write!(w, "required method {name}{signature}")?;
            print_where(w, method_bounds)?;
            writeln!(w, " ({location}{info})")?;
        }

        NodeKind::Return { value, local } => {
            let local = if *local { "local " } else { "" };
            writeln!(w, "{local}return ({location}{info})")?;
            if let Some(value) = value {
                print_node(w, i + 1, value)?;
            }
        }
        NodeKind::Throw { value, local } => {
            let local = if *local { "local " } else { "" };
            writeln!(w, "{local}throw ({location}{info})")?;
            print_node(w, i + 1, value)?;
        }
        NodeKind::Try(try_node) => {
            let local = if try_node.local { "local " } else { "" };
            writeln!(w, "{local}try ({location}{info})")?;
            print_node(w, i + 1, &try_node.expression)?;
            if let Some(body) = &try_node.else_body {
                sp(w, i + 1)?;
                write!(w, "else")?;
                if let Some(binding) = &try_node.error_variable {
                    write!(w, " ({})", binding.name)?;
                }
                writeln!(w)?;
                print_body(w, i + 2, body)?;
            }
        }
        NodeKind::TryPanic(expression) => {
            writeln!(w, "try! ({location}{info})")?;
            print_node(w, i + 1, expression)?;
        }

        NodeKind::Send(send) => {
            let kind = if send.instruction { "instruction" } else { "send" };
            write!(w, "{kind} {}", send.name)?;
            if !send.type_arguments.is_empty() {
                let arguments: Vec<_> = send.type_arguments.iter().map(ToString::to_string).collect();
                write!(w, "!({})", arguments.join(", "))?;
            }
            writeln!(w, " ({location}{info})")?;

            if let Some(receiver) = &send.receiver {
                sp(w, i + 1)?;
                writeln!(w, "receiver")?;
                print_node(w, i + 2, receiver)?;
            }

            if send.argument_count() > 0 {
                sp(w, i + 1)?;
                writeln!(w, "arguments")?;
                for argument in &send.arguments {
                    print_node(w, i + 2, argument)?;
                }
                for argument in &send.keyword_arguments {
                    sp(w, i + 2)?;
                    writeln!(w, "{}:", argument.name)?;
                    print_node(w, i + 3, &argument.value)?;
                }
            }
        }
        NodeKind::TypeCast { value, cast_to } => {
            writeln!(w, "cast {cast_to} ({location}{info})")?;
            print_node(w, i + 1, value)?;
        }
        NodeKind::Match(match_node) => print_match(w, i, match_node, &format!("{location}{info}"))?,

        NodeKind::ObjectDefinition {
            name,
            type_parameters: params,
            body,
        } => {
            let mut header = format!("object {name}");
            type_parameters(&mut header, params).expect("writing to a string");
            writeln!(w, "{header} ({location}{info})")?;
            print_body(w, i + 1, body)?;
        }
        NodeKind::TraitDefinition {
            name,
            type_parameters: params,
            required_traits,
            body,
        } => {
            let mut header = format!("trait {name}");
            type_parameters(&mut header, params).expect("writing to a string");
            for (index, bound) in required_traits.iter().enumerate() {
                header.push_str(if index == 0 { ": " } else { " + " });
                header.push_str(&bound.to_string());
            }
            writeln!(w, "{header} ({location}{info})")?;
            print_body(w, i + 1, body)?;
        }
        NodeKind::ImplementTrait {
            trait_name,
            object_name,
            body,
        } => {
            writeln!(w, "impl {trait_name} for {object_name} ({location}{info})")?;
            print_body(w, i + 1, body)?;
        }
        NodeKind::ReopenObject { name, body } => {
            writeln!(w, "impl {name} ({location}{info})")?;
            print_body(w, i + 1, body)?;
        }
        NodeKind::Import(import) => {
            writeln!(w, "import {} ({location})", import_path(import))?;
        }
    }
    Ok(())
}

fn print_where(w: &mut impl Write, bounds: &[TypeParameter]) -> std::io::Result<()> {
    for (index, bound) in bounds.iter().enumerate() {
        write!(w, "{}{bound}", if index == 0 { " where " } else { ", " })?;
    }
    Ok(())
}

fn print_defaults(w: &mut impl Write, i: usize, signature: &Signature) -> std::io::Result<()> {
    for argument in &signature.arguments {
        if let ArgumentDefinition::Optional { name, default, .. } = argument {
            sp(w, i)?;
            writeln!(w, "default {name}")?;
            print_node(w, i + 1, default)?;
        }
    }
    Ok(())
}

fn print_match(w: &mut impl Write, i: usize, node: &Match, suffix: &str) -> std::io::Result<()> {
    write!(w, "match")?;
    if let Some(binding) = &node.binding {
        write!(w, " (let {})", binding.name)?;
    }
    writeln!(w, " ({suffix})")?;
    if let Some(scrutinee) = &node.scrutinee {
        print_node(w, i + 1, scrutinee)?;
    }

    for case in &node.cases {
        sp(w, i + 1)?;
        match case {
            MatchCase::Type { pattern, .. } => writeln!(w, "case as {pattern} ({})", case.location())?,
            MatchCase::Expressions { patterns, .. } => {
                writeln!(w, "case ({})", case.location())?;
                sp(w, i + 2)?;
                writeln!(w, "patterns")?;
                for pattern in patterns {
                    print_node(w, i + 3, pattern)?;
                }
            }
        }
        if let Some(guard) = case.guard() {
            sp(w, i + 2)?;
            writeln!(w, "when")?;
            print_node(w, i + 3, guard)?;
        }
        sp(w, i + 2)?;
        writeln!(w, "body")?;
        print_body(w, i + 3, case.body())?;
    }

    if let Some(body) = &node.else_body {
        sp(w, i + 1)?;
        writeln!(w, "else")?;
        print_body(w, i + 2, body)?;
    }
    Ok(())
}

/// `a::b::*`, `a::b::(self as c, d)`
fn import_path(import: &Import) -> String {
    let mut path: Vec<&str> = import.path.iter().map(|segment| segment.name.as_str()).collect();
    if import.import_all {
        path.push("*");
        return path.join("::");
    }

    let symbols: Vec<String> = import
        .symbols
        .iter()
        .map(|symbol| match symbol {
            ImportSymbol::Named { name, alias, .. } => match alias {
                Some(alias) => format!("{name} as {alias}"),
                None => name.clone(),
            },
            ImportSymbol::SelfModule { alias, .. } => match alias {
                Some(alias) => format!("self as {alias}"),
                None => String::from("self"),
            },
        })
        .collect();
    if symbols.is_empty() {
        path.join("::")
    } else {
        format!("{}::({})", path.join("::"), symbols.join(", "))
    }
}
