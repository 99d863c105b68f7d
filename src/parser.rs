use crate::ast::*;
use crate::types::Diagnostic;
use crate::value::{
    classify_duration, is_name, open_depth, parse_value, split_arguments, split_arrows,
    split_call_arguments, split_keyframe,
};

/// Parses a whole document. Never fails: lines that match no statement
/// become `Unknown` nodes.
pub fn parse(input: &str) -> Program {
    LineParser::new(input).run()
}

/// Keywords that open a block (plus `pattern`). A line starting with one of
/// these closes a flat block sitting at the same indentation.
const HEADER_KEYWORDS: &[&str] = &[
    "if", "group", "loop", "on", "fn", "for", "automate", "pattern",
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlockKind {
    Plain,
    Conditional { chain: NodeId }, // `if` or `else if`, may be followed by a branch
    Param,                         // closed by a lone `}`
}

#[derive(Debug)]
struct BlockContext {
    kind: BlockKind,
    indent: usize,
    node: NodeId,
    body_indent: Option<usize>, // fixed by the first non-blank child line
}

impl BlockContext {
    fn is_flat(&self) -> bool {
        self.body_indent == Some(self.indent)
    }
}

struct Line<'a> {
    index: usize,
    indent: usize,
    leading: &'a str,
    content: &'a str,
}

impl<'a> Line<'a> {
    fn split(index: usize, raw: &'a str) -> Self {
        let body = raw.strip_suffix('\r').unwrap_or(raw);
        let unmarked = if index == 0 {
            body.trim_start_matches('\u{feff}')
        } else {
            body
        };
        let stripped = unmarked.trim_start();
        let leading = &body[..body.len() - stripped.len()];

        Self {
            index,
            indent: leading.chars().filter(|c| c.is_whitespace()).count(),
            leading,
            content: stripped.trim_end(),
        }
    }

    fn source(&self, end_line: usize) -> SourceInfo {
        SourceInfo {
            line: self.index,
            end_line,
            indent: self.indent,
            leading: self.leading.to_string(),
        }
    }
}

struct LineParser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    program: Program,
    stack: Vec<BlockContext>,
}

impl<'a> LineParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lines: input.split('\n').collect(),
            pos: 0,
            program: Program::with_source(SourceText::new(input)),
            stack: Vec::new(),
        }
    }

    fn run(mut self) -> Program {
        while self.pos < self.lines.len() {
            let line = Line::split(self.pos, self.lines[self.pos]);
            self.pos += 1;
            self.parse_line(&line);
        }
        while !self.stack.is_empty() {
            self.close_top();
        }
        self.program
    }

    fn parse_line(&mut self, line: &Line<'a>) {
        let content = line.content;

        if content.is_empty() {
            self.blank_line(line);
            return;
        }

        if is_header_like(content) {
            while self
                .stack
                .last()
                .is_some_and(|ctx| ctx.is_flat() && ctx.indent == line.indent)
            {
                self.close_top();
            }
        }

        if content.starts_with('#') {
            self.attach(
                NodeKind::Comment {
                    value: content.to_string(),
                },
                line,
                line.index,
            );
            return;
        }

        if let Some(kind) = bpm(content)
            .or_else(|| bank(content))
            .or_else(|| use_statement(content))
        {
            self.attach(kind, line, line.index);
            return;
        }

        if self.let_declaration(line) {
            return;
        }

        if let Some(event) = header(content, "on") {
            let id = self.attach(
                NodeKind::On {
                    event: event.to_string(),
                    body: vec![],
                },
                line,
                line.index,
            );
            self.open(id, line, BlockKind::Plain);
            return;
        }

        if let Some(kind) = function(content) {
            let id = self.attach(kind, line, line.index);
            self.open(id, line, BlockKind::Plain);
            return;
        }

        if let Some(kind) = emit(content).or_else(|| print(content)) {
            self.attach(kind, line, line.index);
            return;
        }

        if let Some(condition) = header(content, "if") {
            let id = self.attach(
                NodeKind::If {
                    condition: condition.to_string(),
                    body: vec![],
                    else_ifs: vec![],
                    alternate: None,
                },
                line,
                line.index,
            );
            self.open(id, line, BlockKind::Conditional { chain: id });
            return;
        }

        if let Some(branch) = else_branch(content) {
            self.branch(line, branch);
            return;
        }

        if let Some(iterator) = header(content, "loop") {
            let id = self.attach(
                NodeKind::Loop {
                    iterator: parse_value(iterator),
                    body: vec![],
                },
                line,
                line.index,
            );
            self.open(id, line, BlockKind::Plain);
            return;
        }

        if self.trigger(line) {
            return;
        }

        if let Some(kind) = import(content)
            .or_else(|| export(content))
            .or_else(|| load(content))
        {
            self.attach(kind, line, line.index);
            return;
        }

        if let Some(name) = header(content, "group").filter(|n| is_name(n)) {
            let id = self.attach(
                NodeKind::Group {
                    name: name.to_string(),
                    body: vec![],
                },
                line,
                line.index,
            );
            self.open(id, line, BlockKind::Plain);
            return;
        }

        if let Some(kind) = call(content)
            .or_else(|| spawn(content))
            .or_else(|| sleep(content))
            .or_else(|| pattern(content))
        {
            self.attach(kind, line, line.index);
            return;
        }

        if let Some(kind) = for_loop(content).or_else(|| automate(content)) {
            let id = self.attach(kind, line, line.index);
            self.open(id, line, BlockKind::Plain);
            return;
        }

        if let Some(name) = param(content) {
            let id = self.attach(
                NodeKind::Param {
                    name: name.to_string(),
                    body: vec![],
                },
                line,
                line.index,
            );
            self.open(id, line, BlockKind::Param);
            return;
        }

        if content == "}" && self.close_param(line) {
            return;
        }

        if let Some(kind) = keyframe(content) {
            self.attach(kind, line, line.index);
            return;
        }

        if self.arrow_call(line) {
            return;
        }

        if content == "}" {
            self.program.report(Diagnostic::StrayClosingBrace {
                line: line.index + 1,
            });
        }
        self.unknown(line);
    }

    fn unknown(&mut self, line: &Line<'a>) {
        self.attach(
            NodeKind::Unknown {
                value: line.content.to_string(),
            },
            line,
            line.index,
        );
    }

    /// Blank lines go to the innermost open block. A flat block (body at
    /// the header's own indentation) ends at its first blank line.
    fn blank_line(&mut self, line: &Line<'a>) {
        if self.stack.last().is_some_and(BlockContext::is_flat) {
            self.close_top();
        }
        let parent = self.stack.last().map(|ctx| ctx.node);
        let id = self
            .program
            .alloc(Node::with_source(NodeKind::BlankLine, line.source(line.index)));
        self.program.append(parent, id);
    }

    /// Allocates `kind` and appends it to the block that owns a line at
    /// `line.indent`, closing blocks the line has dedented out of.
    fn attach(&mut self, kind: NodeKind, line: &Line<'a>, end_line: usize) -> NodeId {
        let id = self
            .program
            .alloc(Node::with_source(kind, line.source(end_line)));
        let parent = self.route(line.indent);
        self.program.append(parent, id);
        id
    }

    fn route(&mut self, indent: usize) -> Option<NodeId> {
        loop {
            let ctx = self.stack.last_mut()?;
            let body_indent = *ctx.body_indent.get_or_insert(indent);
            if body_indent <= indent {
                return Some(ctx.node);
            }
            self.close_top();
        }
    }

    fn open(&mut self, node: NodeId, line: &Line<'a>, kind: BlockKind) {
        self.stack.push(BlockContext {
            kind,
            indent: line.indent,
            node,
            body_indent: None,
        });
    }

    fn close_top(&mut self) {
        let Some(ctx) = self.stack.pop() else {
            return;
        };
        if ctx.kind == BlockKind::Param {
            let line = self
                .program
                .node(ctx.node)
                .source
                .as_ref()
                .map_or(0, |s| s.line + 1);
            self.program.report(Diagnostic::UnclosedParam { line });
        }
    }

    fn close_param(&mut self, line: &Line<'a>) -> bool {
        let Some(pos) = self
            .stack
            .iter()
            .rposition(|ctx| ctx.kind == BlockKind::Param)
        else {
            return false;
        };
        while self.stack.len() > pos + 1 {
            self.close_top();
        }
        if let Some(ctx) = self.stack.pop() {
            if let Some(source) = self.program.node_mut(ctx.node).source.as_mut() {
                source.end_line = line.index;
            }
        }
        true
    }

    /// `else if` / `else`: attaches a branch to the `if` chain open at the
    /// same indentation.
    fn branch(&mut self, line: &Line<'a>, branch: ElseBranch<'a>) {
        let found = self
            .stack
            .iter()
            .enumerate()
            .rev()
            .find_map(|(pos, ctx)| match ctx.kind {
                BlockKind::Conditional { chain } if ctx.indent == line.indent => {
                    Some((pos, chain))
                }
                _ => None,
            });
        let Some((pos, chain)) = found else {
            let keyword = match branch {
                ElseBranch::ElseIf(_) => "else if",
                ElseBranch::Else => "else",
            };
            self.program.report(Diagnostic::OrphanElse {
                line: line.index + 1,
                keyword: keyword.to_string(),
            });
            self.unknown(line);
            return;
        };

        while self.stack.len() > pos {
            self.close_top();
        }

        let (kind, block) = match branch {
            ElseBranch::ElseIf(condition) => (
                NodeKind::ElseIf {
                    condition: condition.to_string(),
                    body: vec![],
                },
                BlockKind::Conditional { chain },
            ),
            ElseBranch::Else => (NodeKind::Else { body: vec![] }, BlockKind::Plain),
        };
        let id = self
            .program
            .alloc(Node::with_source(kind, line.source(line.index)));

        if let NodeKind::If {
            else_ifs,
            alternate,
            ..
        } = &mut self.program.node_mut(chain).kind
        {
            match block {
                BlockKind::Conditional { .. } => else_ifs.push(id),
                _ => *alternate = Some(id),
            }
        }
        self.open(id, line, block);
    }

    /// Pulls following lines into `first` while `open` stays unbalanced.
    /// Continuation lines lose up to `line.indent` leading whitespace so the
    /// text is relative to the statement's own indentation. Nothing is
    /// reported here: a caller may still reject the text and rewind `pos`.
    fn continuation(
        &mut self,
        first: &str,
        line: &Line<'a>,
        open: char,
        close: char,
    ) -> Continued {
        let mut text = first.to_string();
        let mut depth = open_depth(first, open, close);
        let mut end_line = line.index;

        while depth > 0 && self.pos < self.lines.len() {
            let next = dedent(self.lines[self.pos], line.indent);
            depth += open_depth(next, open, close);
            text.push('\n');
            text.push_str(next);
            end_line = self.pos;
            self.pos += 1;
        }
        Continued {
            text,
            end_line,
            balanced: depth <= 0,
        }
    }

    fn report_unbalanced(&mut self, continued: &Continued, line: &Line<'a>, open: char) {
        if !continued.balanced {
            self.program.report(Diagnostic::UnterminatedContinuation {
                line: line.index + 1,
                open,
            });
        }
    }

    fn let_declaration(&mut self, line: &Line<'a>) -> bool {
        let Some(rest) = keyword(line.content, "let") else {
            return false;
        };
        let Some((name, value)) = rest.split_once('=') else {
            return false;
        };
        let name = name.trim();
        if !is_name(name) {
            return false;
        }
        let value = value.trim();

        let (value, end_line) = if open_depth(value, '{', '}') > 0 {
            let continued = self.continuation(value, line, '{', '}');
            self.report_unbalanced(&continued, line, '{');
            (
                Expression::RawLiteral {
                    value: continued.text,
                },
                continued.end_line,
            )
        } else {
            (parse_value(value), line.index)
        };

        self.attach(
            NodeKind::LetDeclaration {
                name: name.to_string(),
                value,
            },
            line,
            end_line,
        );
        true
    }

    /// `.name [duration] [args...]`. Object-literal arguments are flattened
    /// into `ObjectProperty` entries; a `duration` key inside them fills the
    /// duration slot when it is still empty.
    fn trigger(&mut self, line: &Line<'a>) -> bool {
        let Some(rest) = line.content.strip_prefix('.') else {
            return false;
        };
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };
        if !is_name(name) {
            return false;
        }

        let (text, end_line) = if open_depth(args, '{', '}') > 0 {
            let continued = self.continuation(args, line, '{', '}');
            self.report_unbalanced(&continued, line, '{');
            (continued.text, continued.end_line)
        } else {
            (args.to_string(), line.index)
        };

        let mut duration = None;
        let mut parsed = Vec::new();
        for token in split_arguments(&text) {
            if duration.is_none() {
                if let Some(d) = classify_duration(token) {
                    duration = Some(d);
                    continue;
                }
            }
            match parse_value(token) {
                Expression::ObjectLiteral { properties } => {
                    for property in properties {
                        if property.key == "duration" && duration.is_none() {
                            if let Some(d) = duration_of(&property.value) {
                                duration = Some(d);
                                continue;
                            }
                        }
                        parsed.push(Expression::ObjectProperty {
                            key: property.key,
                            value: Box::new(property.value),
                        });
                    }
                }
                other => parsed.push(other),
            }
        }

        self.attach(
            NodeKind::Trigger {
                name: format!(".{name}"),
                duration,
                args: parsed,
            },
            line,
            end_line,
        );
        true
    }

    /// `target -> method(args)`, optionally chained. Lines starting with
    /// `->` right after extend the chain.
    fn arrow_call(&mut self, line: &Line<'a>) -> bool {
        let content = line.content;
        let parts = split_arrows(content);
        if parts.len() < 2 || parts[0].is_empty() || parts[0].contains(char::is_whitespace) {
            return false;
        }

        let start = self.pos;
        let continued = if open_depth(content, '(', ')') > 0 {
            self.continuation(content, line, '(', ')')
        } else {
            Continued {
                text: content.to_string(),
                end_line: line.index,
                balanced: true,
            }
        };

        let parts = split_arrows(&continued.text);
        let target = parts[0];
        let Some(mut segments) = arrow_segments(&parts[1..]) else {
            self.pos = start;
            return false;
        };
        self.report_unbalanced(&continued, line, '(');
        let mut end_line = continued.end_line;

        while self.pos < self.lines.len() {
            let next = Line::split(self.pos, self.lines[self.pos]);
            let Some(tail) = next.content.strip_prefix("->") else {
                break;
            };
            let Some(more) = arrow_segments(&split_arrows(tail)) else {
                break;
            };
            segments.extend(more);
            end_line = self.pos;
            self.pos += 1;
        }

        let first = segments[0].clone();
        let chain = if segments.len() > 1 { segments } else { vec![] };
        self.attach(
            NodeKind::ArrowCall {
                target: target.to_string(),
                method: first.method,
                args: first.args,
                chain,
            },
            line,
            end_line,
        );
        true
    }
}

struct Continued {
    text: String,
    end_line: usize,
    balanced: bool,
}

enum ElseBranch<'a> {
    ElseIf(&'a str),
    Else,
}

fn is_header_like(content: &str) -> bool {
    let word = content
        .split(|c: char| c.is_whitespace() || c == ':')
        .next()
        .unwrap_or_default();
    HEADER_KEYWORDS.contains(&word)
}

/// Text after `kw` when `kw` is followed by whitespace.
fn keyword<'a>(content: &'a str, kw: &str) -> Option<&'a str> {
    let rest = content.strip_prefix(kw)?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim())
}

/// Text between `kw` and the trailing `:` of a block header.
fn header<'a>(content: &'a str, kw: &str) -> Option<&'a str> {
    let inner = content.strip_suffix(':')?;
    keyword(inner, kw).filter(|s| !s.is_empty())
}

/// `"text" rest` -> (`text`, `rest`).
fn quoted(text: &str) -> Option<(&str, &str)> {
    let inner = text.strip_prefix('"')?;
    let close = inner.find('"')?;
    Some((&inner[..close], inner[close + 1..].trim()))
}

fn dedent(raw: &str, indent: usize) -> &str {
    let raw = raw.strip_suffix('\r').unwrap_or(raw);
    let skip: usize = raw
        .chars()
        .take(indent)
        .take_while(|c| c.is_whitespace())
        .map(char::len_utf8)
        .sum();
    &raw[skip..]
}

fn identifier_list(text: &str) -> Option<Vec<String>> {
    let list: Vec<String> = text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!list.is_empty()).then_some(list)
}

/// `{ a, b } rest` -> (identifiers, `rest`).
fn braced_list(text: &str) -> Option<(Vec<String>, &str)> {
    let inner = text.strip_prefix('{')?;
    let close = inner.find('}')?;
    Some((identifier_list(&inner[..close])?, inner[close + 1..].trim()))
}

fn single_name(text: &str) -> Option<String> {
    is_name(text).then(|| text.to_string())
}

fn name_with_alias(rest: &str) -> Option<(String, Option<String>)> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    match tokens.as_slice() {
        [name] => Some((name.to_string(), None)),
        [name, "as", alias] => Some((name.to_string(), Some(alias.to_string()))),
        _ => None,
    }
}

fn duration_of(value: &Expression) -> Option<DurationValue> {
    match value {
        Expression::NumberLiteral { value, raw } => Some(DurationValue::Milliseconds {
            value: *value,
            raw: raw.clone(),
        }),
        Expression::Identifier { name } => classify_duration(name),
        _ => None,
    }
}

fn bpm(content: &str) -> Option<NodeKind> {
    let identifier = keyword(content, "bpm").filter(|s| !s.contains(char::is_whitespace))?;
    Some(NodeKind::BpmDeclaration {
        identifier: identifier.to_string(),
    })
}

fn bank(content: &str) -> Option<NodeKind> {
    let (name, alias) = name_with_alias(keyword(content, "bank")?)?;
    Some(NodeKind::BankDeclaration { name, alias })
}

fn use_statement(content: &str) -> Option<NodeKind> {
    let (name, alias) = name_with_alias(keyword(content, "@use")?)?;
    Some(NodeKind::UseStatement { name, alias })
}

fn function(content: &str) -> Option<NodeKind> {
    let signature = header(content, "fn")?;
    let open = signature.find('(')?;
    let name = signature[..open].trim();
    let params = signature[open + 1..].strip_suffix(')')?;
    if !is_name(name) {
        return None;
    }
    Some(NodeKind::Fn {
        name: name.to_string(),
        params: split_call_arguments(params)
            .into_iter()
            .map(str::to_string)
            .collect(),
        body: vec![],
    })
}

fn emit(content: &str) -> Option<NodeKind> {
    let rest = keyword(content, "emit")?;
    let (event, payload) = match rest.split_once(char::is_whitespace) {
        Some((event, payload)) => (event, Some(parse_value(payload))),
        None => (rest, None),
    };
    Some(NodeKind::Emit {
        event: single_name(event)?,
        payload,
    })
}

fn print(content: &str) -> Option<NodeKind> {
    let rest = keyword(content, "print")?;
    Some(NodeKind::Print {
        value: parse_value(rest),
    })
}

fn else_branch(content: &str) -> Option<ElseBranch<'_>> {
    let inner = content.strip_suffix(':')?.strip_prefix("else")?;
    if inner.trim().is_empty() {
        return Some(ElseBranch::Else);
    }
    if !inner.starts_with(char::is_whitespace) {
        return None;
    }
    keyword(inner.trim_start(), "if")
        .filter(|c| !c.is_empty())
        .map(ElseBranch::ElseIf)
}

fn import(content: &str) -> Option<NodeKind> {
    let rest = content.strip_prefix("@import")?.trim_start();
    let (identifiers, rest) = braced_list(rest)?;
    let (from, rest) = quoted(keyword(rest, "from")?)?;
    if !rest.is_empty() {
        return None;
    }
    Some(NodeKind::ImportStatement {
        identifiers,
        from: from.to_string(),
    })
}

fn export(content: &str) -> Option<NodeKind> {
    let rest = content.strip_prefix("@export")?.trim_start();
    let (identifiers, rest) = braced_list(rest)?;
    if !rest.is_empty() {
        return None;
    }
    Some(NodeKind::ExportStatement { identifiers })
}

fn load(content: &str) -> Option<NodeKind> {
    let (path, rest) = quoted(keyword(content, "@load")?)?;
    let alias = single_name(keyword(rest, "as")?)?;
    Some(NodeKind::LoadSample {
        path: path.to_string(),
        alias,
    })
}

fn call(content: &str) -> Option<NodeKind> {
    Some(NodeKind::Call {
        identifier: single_name(keyword(content, "call")?)?,
    })
}

fn spawn(content: &str) -> Option<NodeKind> {
    Some(NodeKind::Spawn {
        identifier: single_name(keyword(content, "spawn")?)?,
    })
}

fn sleep(content: &str) -> Option<NodeKind> {
    let rest = keyword(content, "sleep")?;
    Some(NodeKind::Sleep {
        value: parse_value(rest),
    })
}

/// `pattern <name> with <instrument> = "<steps>"`
fn pattern(content: &str) -> Option<NodeKind> {
    let rest = keyword(content, "pattern")?;
    let (name, rest) = rest.split_once(char::is_whitespace)?;
    let rest = keyword(rest.trim_start(), "with")?;
    let (instrument, rest) = rest.split_once('=')?;
    let steps = rest.trim().strip_prefix('"')?.strip_suffix('"')?;
    Some(NodeKind::Pattern {
        name: single_name(name)?,
        instrument: single_name(instrument.trim())?,
        pattern: steps.to_string(),
    })
}

fn for_loop(content: &str) -> Option<NodeKind> {
    let rest = header(content, "for")?;
    let (variable, iterable) = rest.split_once(" in ")?;
    let iterable = iterable.trim();
    if iterable.is_empty() {
        return None;
    }
    Some(NodeKind::For {
        variable: single_name(variable.trim())?,
        iterable: parse_value(iterable),
        body: vec![],
    })
}

fn automate(content: &str) -> Option<NodeKind> {
    Some(NodeKind::Automate {
        target: header(content, "automate")?.to_string(),
        body: vec![],
    })
}

fn param(content: &str) -> Option<&str> {
    let rest = content.strip_suffix('{')?;
    keyword(rest, "param").filter(|name| is_name(name))
}

fn keyframe(content: &str) -> Option<NodeKind> {
    let (position, separator, value) = split_keyframe(content)?;
    if value.trim().is_empty() {
        return None;
    }
    Some(NodeKind::Keyframe {
        position: position.to_string(),
        separator,
        value: parse_value(value),
    })
}

fn arrow_segments(parts: &[&str]) -> Option<Vec<ArrowSegment>> {
    parts.iter().copied().map(arrow_segment).collect()
}

/// `method(args)` or a bare `method`.
fn arrow_segment(text: &str) -> Option<ArrowSegment> {
    let Some(open) = text.find('(') else {
        return is_name(text).then(|| ArrowSegment {
            method: text.to_string(),
            args: None,
        });
    };
    let method = text[..open].trim();
    let inner = text[open + 1..].strip_suffix(')')?;
    if !is_name(method) {
        return None;
    }
    Some(ArrowSegment {
        method: method.to_string(),
        args: Some(split_call_arguments(inner).into_iter().map(parse_value).collect()),
    })
}
