use crate::ast::{
    ArrowSegment, DurationValue, Expression, KeyframeSeparator, NodeId, NodeKind, Program,
    SourceText,
};
use crate::parser::parse;
use crate::types::FormatOptions;

/// Indentation of each `-> method(...)` line after the first chain segment.
const CHAIN_INDENT: &str = "    ";

/// Parses and prints `text` in one go.
pub fn format(text: &str, options: &FormatOptions) -> String {
    print(&parse(text), options)
}

/// Prints a whole program. A parsed program is reconciled against its own
/// source text; a program without captured source is emitted from the tree.
pub fn print(program: &Program, options: &FormatOptions) -> String {
    Printer::new(program, options).print_program()
}

pub struct Printer<'p> {
    program: &'p Program,
    options: &'p FormatOptions,
}

impl<'p> Printer<'p> {
    pub fn new(program: &'p Program, options: &'p FormatOptions) -> Self {
        Self { program, options }
    }

    pub fn print_program(&self) -> String {
        let text = match self.program.source() {
            Some(source) => self.reconcile(source),
            None => self
                .program
                .body
                .iter()
                .map(|id| self.print(*id))
                .collect::<Vec<_>>()
                .join("\n"),
        };
        finish(&text)
    }

    /// Starts from the original lines and swaps in the rendering of every
    /// node that owns exactly one line, renders to one line, and fits the
    /// print width. Everything else, unrecognized lines included, passes
    /// through untouched.
    fn reconcile(&self, source: &SourceText) -> String {
        let mut lines = source.lines.clone();

        for (id, node) in self.program.nodes() {
            let Some(info) = &node.source else {
                continue;
            };
            if !info.is_single_line()
                || matches!(node.kind, NodeKind::BlankLine | NodeKind::Unknown { .. })
            {
                continue;
            }
            let rendered = self.print(id);
            if rendered.contains('\n') {
                continue;
            }
            let width = info.leading.chars().count() + rendered.chars().count();
            if width > self.options.print_width {
                continue;
            }
            if let Some(slot) = lines.get_mut(info.line) {
                let cr = if slot.ends_with('\r') { "\r" } else { "" };
                *slot = format!("{}{rendered}{cr}", info.leading);
            }
        }

        lines.join("\n")
    }

    /// Renders one node. Block nodes include their children, indented one
    /// level per nesting depth.
    pub fn print(&self, id: NodeId) -> String {
        match self.program.kind(id) {
            NodeKind::BpmDeclaration { identifier } => format!("bpm {identifier}"),
            NodeKind::BankDeclaration { name, alias } => {
                with_alias(format!("bank {name}"), alias.as_deref())
            }
            NodeKind::UseStatement { name, alias } => {
                with_alias(format!("@use {name}"), alias.as_deref())
            }
            NodeKind::LetDeclaration { name, value } => {
                format!("let {name} = {}", print_expression(value))
            }
            NodeKind::On { event, body } => self.block(format!("on {event}:"), body),
            NodeKind::Fn { name, params, body } => {
                self.block(format!("fn {name}({}):", params.join(", ")), body)
            }
            NodeKind::Emit { event, payload } => match payload {
                Some(payload) => format!("emit {event} {}", print_expression(payload)),
                None => format!("emit {event}"),
            },
            NodeKind::Print { value } => format!("print {}", print_expression(value)),
            NodeKind::If {
                condition,
                body,
                else_ifs,
                alternate,
            } => {
                let mut out = self.block(format!("if {condition}:"), body);
                for branch in else_ifs.iter().chain(alternate.iter()) {
                    out.push('\n');
                    out.push_str(&self.print(*branch));
                }
                out
            }
            NodeKind::ElseIf { condition, body } => {
                self.block(format!("else if {condition}:"), body)
            }
            NodeKind::Else { body } => self.block("else:".to_string(), body),
            NodeKind::Loop { iterator, body } => {
                self.block(format!("loop {}:", print_expression(iterator)), body)
            }
            NodeKind::Trigger {
                name,
                duration,
                args,
            } => print_trigger(name, duration.as_ref(), args),
            NodeKind::ImportStatement { identifiers, from } => {
                format!("@import {{ {} }} from \"{from}\"", identifiers.join(", "))
            }
            NodeKind::ExportStatement { identifiers } => {
                format!("@export {{ {} }}", identifiers.join(", "))
            }
            NodeKind::LoadSample { path, alias } => format!("@load \"{path}\" as {alias}"),
            NodeKind::Group { name, body } => self.block(format!("group {name}:"), body),
            NodeKind::Call { identifier } => format!("call {identifier}"),
            NodeKind::Spawn { identifier } => format!("spawn {identifier}"),
            NodeKind::Sleep { value } => format!("sleep {}", print_expression(value)),
            NodeKind::Pattern {
                name,
                instrument,
                pattern,
            } => format!("pattern {name} with {instrument} = \"{pattern}\""),
            NodeKind::For {
                variable,
                iterable,
                body,
            } => self.block(
                format!("for {variable} in {}:", print_expression(iterable)),
                body,
            ),
            NodeKind::Automate { target, body } => {
                self.block(format!("automate {target}:"), body)
            }
            NodeKind::Param { name, body } => {
                let mut out = self.block(format!("param {name} {{"), body);
                out.push_str("\n}");
                out
            }
            NodeKind::Keyframe {
                position,
                separator,
                value,
            } => match separator {
                KeyframeSeparator::Equals => {
                    format!("{position}% = {}", print_expression(value))
                }
                KeyframeSeparator::Colon => format!("{position}%: {}", print_expression(value)),
            },
            NodeKind::ArrowCall {
                target,
                method,
                args,
                chain,
            } => print_arrow_call(target, method, args.as_deref(), chain),
            NodeKind::Comment { value } | NodeKind::Unknown { value } => value.clone(),
            NodeKind::BlankLine => String::new(),
        }
    }

    /// Renders `children` one nesting level deeper, newline-joined.
    pub fn print_block(&self, children: &[NodeId]) -> String {
        let unit = " ".repeat(self.options.tab_width);
        children
            .iter()
            .map(|id| indent_lines(&self.print(*id), &unit))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn block(&self, header: String, body: &[NodeId]) -> String {
        if body.is_empty() {
            return header;
        }
        format!("{header}\n{}", self.print_block(body))
    }
}

fn indent_lines(text: &str, unit: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{unit}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drops trailing blank lines and ends the document with exactly one newline.
fn finish(text: &str) -> String {
    let mut lines: Vec<&str> = text.split('\n').collect();
    while lines.last().is_some_and(|line| line.trim().is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn with_alias(head: String, alias: Option<&str>) -> String {
    match alias {
        Some(alias) => format!("{head} as {alias}"),
        None => head,
    }
}

pub fn print_expression(expr: &Expression) -> String {
    match expr {
        Expression::Identifier { name } => name.clone(),
        Expression::NumberLiteral { raw, .. } => raw.clone(),
        Expression::StringLiteral { value } => format!("\"{value}\""),
        Expression::BooleanLiteral { value } => value.to_string(),
        Expression::ObjectLiteral { properties } => {
            let pairs = properties
                .iter()
                .map(|p| format!("{}: {}", p.key, print_expression(&p.value)))
                .collect::<Vec<_>>();
            format!("{{{}}}", pairs.join(", "))
        }
        Expression::RawLiteral { value } => value.clone(),
        Expression::SynthReference { name } => format!("synth {name}"),
        Expression::ObjectProperty { key, value } => {
            format!("{key}: {}", print_expression(value))
        }
    }
}

fn print_duration(duration: &DurationValue) -> String {
    match duration {
        DurationValue::BeatDuration { value } => value.clone(),
        DurationValue::Milliseconds { raw, .. } => raw.clone(),
        DurationValue::AutoDuration => "auto".to_string(),
    }
}

/// `.name [duration] [positional, ...] [{key: value, ...}]`
fn print_trigger(name: &str, duration: Option<&DurationValue>, args: &[Expression]) -> String {
    let mut parts = vec![name.to_string()];
    if let Some(duration) = duration {
        parts.push(print_duration(duration));
    }

    let (properties, positional): (Vec<&Expression>, Vec<&Expression>) = args
        .iter()
        .partition(|arg| matches!(arg, Expression::ObjectProperty { .. }));

    if !positional.is_empty() {
        let args = positional
            .iter()
            .map(|arg| print_expression(arg))
            .collect::<Vec<_>>();
        parts.push(args.join(", "));
    }
    if !properties.is_empty() {
        let props = properties
            .iter()
            .map(|arg| print_expression(arg))
            .collect::<Vec<_>>();
        parts.push(format!("{{{}}}", props.join(", ")));
    }

    parts.join(" ")
}

fn print_segment(method: &str, args: Option<&[Expression]>) -> String {
    match args {
        Some(args) => {
            let args = args.iter().map(print_expression).collect::<Vec<_>>();
            format!("{method}({})", args.join(", "))
        }
        None => method.to_string(),
    }
}

/// A chain prints its first call inline and each later call on its own
/// `->` line.
fn print_arrow_call(
    target: &str,
    method: &str,
    args: Option<&[Expression]>,
    chain: &[ArrowSegment],
) -> String {
    let Some((first, rest)) = chain.split_first() else {
        return format!("{target} -> {}", print_segment(method, args));
    };
    let mut out = format!(
        "{target} -> {}",
        print_segment(&first.method, first.args.as_deref())
    );
    for segment in rest {
        out.push('\n');
        out.push_str(CHAIN_INDENT);
        out.push_str("-> ");
        out.push_str(&print_segment(&segment.method, segment.args.as_deref()));
    }
    out
}
