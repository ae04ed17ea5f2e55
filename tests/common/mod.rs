//! A scripted frontend for pipeline tests.
//!
//! Recognizes just enough of C++ to drive the indexing pipeline without
//! a loadable libclang: quoted includes, namespaces, classes and structs
//! with base lists, methods and free functions. Included headers are
//! inlined into the unit the way libclang reports them, with every node
//! carrying the file that physically declares it.

use clang_index::{
    error::{IndexError, Result},
    frontend::{Frontend, Node, NodeKind, ParseOptions, ParsedUnit},
    utils,
};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

pub struct MockFrontend;

impl Frontend for MockFrontend {
    fn parse(&self, file: &Path, _args: &[String], _options: ParseOptions) -> Result<ParsedUnit> {
        let mut unit = ParsedUnit::default();
        let mut visited = HashSet::new();
        visited.insert(utils::normalized(file));
        parse_file(file, &mut unit.nodes, &mut unit.includes, &mut visited)?;
        Ok(unit)
    }
}

struct Container {
    node: Node,
    is_namespace: bool,
}

fn parse_file(
    file: &Path,
    nodes: &mut Vec<Node>,
    includes: &mut Vec<PathBuf>,
    visited: &mut HashSet<PathBuf>,
) -> Result<()> {
    let file = utils::normalized(file);
    let content =
        std::fs::read_to_string(&file).map_err(|err| IndexError::io(err, file.clone()))?;
    let dir = file.parent().map(|p| p.to_path_buf()).unwrap_or_default();

    let mut stack: Vec<Container> = Vec::new();
    let mut scope_names: Vec<String> = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = (idx + 1) as u32;
        let line = raw.trim();

        if let Some(rest) = line.strip_prefix("#include \"") {
            let Some(name) = rest.split('"').next() else { continue };
            let header = utils::normalized(dir.join(name));
            if !header.exists() {
                continue;
            }
            if visited.insert(header.clone()) {
                includes.push(header.clone());
                parse_file(&header, nodes, includes, visited)?;
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix("namespace ") {
            if let Some(name) = rest.strip_suffix('{') {
                let name = name.trim().to_string();
                scope_names.push(name.clone());
                stack.push(Container {
                    node: Node::new(NodeKind::Namespace, name, &file, line_no),
                    is_namespace: true,
                });
                continue;
            }
        }

        if let Some(record) = parse_record(line, &file, line_no, &scope_names) {
            match record {
                Record::Declaration(node) => attach(node, &mut stack, nodes),
                Record::Definition(node) => {
                    scope_names.push(node.name.clone());
                    stack.push(Container { node, is_namespace: false });
                }
            }
            continue;
        }

        if line == "};" || line == "}" {
            if let Some(mut container) = stack.pop() {
                scope_names.pop();
                container.node.end_line = line_no;
                attach(container.node, &mut stack, nodes);
            }
            continue;
        }

        if let Some(node) = parse_callable(line, &file, line_no, &stack, &scope_names) {
            attach(node, &mut stack, nodes);
        }
    }

    while let Some(container) = stack.pop() {
        attach(container.node, &mut stack, nodes);
    }
    Ok(())
}

enum Record {
    Declaration(Node),
    Definition(Node),
}

fn parse_record(line: &str, file: &Path, line_no: u32, scope: &[String]) -> Option<Record> {
    let (kind, rest) = if let Some(rest) = line.strip_prefix("class ") {
        (NodeKind::Class, rest)
    } else if let Some(rest) = line.strip_prefix("struct ") {
        (NodeKind::Struct, rest)
    } else {
        return None;
    };

    if let Some(name) = rest.strip_suffix(';') {
        let name = name.trim();
        if name.chars().all(|c| c.is_alphanumeric() || c == '_') && !name.is_empty() {
            let mut node = Node::new(kind, name, file, line_no);
            node.usr = mock_usr(scope, name);
            return Some(Record::Declaration(node));
        }
        return None;
    }

    let rest = rest.strip_suffix('{')?.trim();
    let (name, bases) = match rest.split_once(':') {
        Some((name, bases)) => {
            let bases = bases
                .split(',')
                .map(|base| {
                    base.trim()
                        .trim_start_matches("public ")
                        .trim_start_matches("protected ")
                        .trim_start_matches("private ")
                        .trim_start_matches("virtual ")
                        .trim()
                        .to_string()
                })
                .filter(|base| !base.is_empty())
                .collect();
            (name, bases)
        }
        None => (rest, Vec::new()),
    };
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let mut node = Node::new(kind, name, file, line_no);
    node.usr = mock_usr(scope, name);
    node.is_definition = true;
    node.base_classes = bases;
    Some(Record::Definition(node))
}

fn parse_callable(
    line: &str,
    file: &Path,
    line_no: u32,
    stack: &[Container],
    scope: &[String],
) -> Option<Node> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    if close < open || (!line.ends_with(';') && !line.ends_with('}') && !line.ends_with('{')) {
        return None;
    }

    let mut head = &line[..open];
    let mut is_virtual = false;
    let mut is_static = false;
    loop {
        if let Some(rest) = head.strip_prefix("virtual ") {
            is_virtual = true;
            head = rest;
        } else if let Some(rest) = head.strip_prefix("static ") {
            is_static = true;
            head = rest;
        } else {
            break;
        }
    }
    let name = head.split_whitespace().last()?;
    if name.is_empty() || head.split_whitespace().count() < 2 {
        return None;
    }
    let return_type = head[..head.rfind(name)?].trim();
    let args = &line[open + 1..close];
    let tail = &line[close + 1..];

    let in_class = stack.last().map(|c| !c.is_namespace).unwrap_or(false);
    let kind = if in_class { NodeKind::Method } else { NodeKind::Function };

    let mut node = Node::new(kind, name, file, line_no);
    node.usr = format!("{}({args})", mock_usr(scope, name));
    node.is_virtual = is_virtual;
    node.is_pure_virtual = tail.contains("= 0");
    node.is_static = is_static;
    node.is_const = tail.trim_start().starts_with("const");
    node.is_definition = line.ends_with('}') || line.ends_with('{');
    let mut signature = format!("{return_type} {name}({args})");
    if node.is_const {
        signature.push_str(" const");
    }
    node.signature = Some(signature);
    Some(node)
}

fn mock_usr(scope: &[String], name: &str) -> String {
    let mut qualified = scope.join("::");
    if !qualified.is_empty() {
        qualified.push_str("::");
    }
    qualified.push_str(name);
    format!("c:mock@{qualified}")
}

fn attach(node: Node, stack: &mut Vec<Container>, nodes: &mut Vec<Node>) {
    match stack.last_mut() {
        Some(container) => container.node.children.push(node),
        None => nodes.push(node),
    }
}
