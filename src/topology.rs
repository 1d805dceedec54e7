//! Line classification and splitting into sub-commands.
//!
//! Every function here is pure: a line is fully parsed (and every limit
//! checked) before the first process is spawned.

use crate::error::ParseError;
use crate::tokenize::ArgList;

/// Longest pipeline: five pipe operators, six stages.
pub const MAX_PIPE_STAGES: usize = 6;
/// Most commands in a `;` list.
pub const MAX_SEQUENTIAL: usize = 4;
/// Most commands in an `&&`/`||` chain (five operators).
pub const MAX_CONDITIONAL: usize = 6;

/// What a whole input line asks for. Exactly one class per line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorClass {
    Forward,
    Reverse,
    Append,
    WordCount,
    Concat,
    Redirect,
    Sequential,
    Conditional,
    Plain,
}

/// Classify a line. The checks run in a fixed precedence order; the first
/// operator present wins and the others are treated as ordinary text.
pub fn classify(line: &str) -> OperatorClass {
    if has_pipe_operator(line) {
        OperatorClass::Forward
    } else if line.contains('=') {
        OperatorClass::Reverse
    } else if line.contains('~') {
        OperatorClass::Append
    } else if line.contains('#') {
        OperatorClass::WordCount
    } else if line.contains('+') {
        OperatorClass::Concat
    } else if line.contains('<') || line.contains('>') {
        OperatorClass::Redirect
    } else if line.contains(';') {
        OperatorClass::Sequential
    } else if line.contains("&&") || line.contains("||") {
        OperatorClass::Conditional
    } else {
        OperatorClass::Plain
    }
}

/// A lone `|`. Runs of two or more belong to `||`.
fn has_pipe_operator(line: &str) -> bool {
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'|' {
            let start = i;
            while i < bytes.len() && bytes[i] == b'|' {
                i += 1;
            }
            if i - start == 1 {
                return true;
            }
        } else {
            i += 1;
        }
    }
    false
}

/// How a line is cut into sub-commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyKind {
    Forward,
    Reverse,
    Sequential,
    Conditional,
}

impl TopologyKind {
    pub fn max_segments(self) -> usize {
        match self {
            TopologyKind::Forward | TopologyKind::Reverse => MAX_PIPE_STAGES,
            TopologyKind::Sequential => MAX_SEQUENTIAL,
            TopologyKind::Conditional => MAX_CONDITIONAL,
        }
    }

    /// Sequential lists drop blank segments; every other kind rejects them.
    pub fn skips_blank_segments(self) -> bool {
        matches!(self, TopologyKind::Sequential)
    }
}

/// Split `raw` into argument lists for `kind`.
pub fn split(raw: &str, kind: TopologyKind) -> Result<Vec<ArgList>, ParseError> {
    if kind == TopologyKind::Forward && raw.contains("||") {
        return Err(ParseError::PipeMixedWithOr);
    }
    let segments: Vec<&str> = match kind {
        TopologyKind::Forward => raw.split('|').collect(),
        TopologyKind::Reverse => raw.split('=').collect(),
        TopologyKind::Sequential => raw.split(';').collect(),
        TopologyKind::Conditional => split_conditional(raw).0,
    };
    parse_segments(&segments, kind)
}

fn parse_segments(segments: &[&str], kind: TopologyKind) -> Result<Vec<ArgList>, ParseError> {
    let segments: Vec<(usize, &str)> = segments
        .iter()
        .map(|s| s.trim())
        .enumerate()
        .filter(|(_, s)| !(kind.skips_blank_segments() && s.is_empty()))
        .collect();

    if segments.len() > kind.max_segments() {
        return Err(ParseError::TooManySegments {
            found: segments.len(),
            limit: kind.max_segments(),
        });
    }

    segments
        .into_iter()
        .map(|(position, segment)| ArgList::parse(segment, position + 1))
        .collect()
}

/// Short-circuit operator between two chained commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

/// Cut at `&&` and `||`, whichever comes first at each point of the scan.
/// Returns the raw segments and the operators between them.
pub fn split_conditional(raw: &str) -> (Vec<&str>, Vec<Connector>) {
    let mut segments = Vec::new();
    let mut connectors = Vec::new();
    let mut rest = raw;

    loop {
        let next = match (rest.find("&&"), rest.find("||")) {
            (Some(a), Some(o)) if a < o => Some((a, Connector::And)),
            (_, Some(o)) => Some((o, Connector::Or)),
            (Some(a), None) => Some((a, Connector::And)),
            (None, None) => None,
        };
        match next {
            Some((pos, connector)) => {
                segments.push(&rest[..pos]);
                connectors.push(connector);
                rest = &rest[pos + 2..];
                // a third operator character (`&&&`, `|||`) belongs to the operator
                if rest.starts_with(['&', '|']) {
                    rest = &rest[1..];
                }
            }
            None => {
                segments.push(rest);
                break;
            }
        }
    }

    (segments, connectors)
}

/// One command plus its position in a pipeline.
#[derive(Debug, Clone)]
pub struct Stage {
    pub index: usize,
    pub args: ArgList,
}

/// Order in which a pipeline's stages are spawned. Wiring is the same
/// either way: stage i always writes into stage i + 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

#[derive(Debug, Clone)]
pub struct PipelineTopology {
    direction: Direction,
    stages: Vec<Stage>,
}

impl PipelineTopology {
    pub fn parse(raw: &str, direction: Direction) -> Result<Self, ParseError> {
        let kind = match direction {
            Direction::Forward => TopologyKind::Forward,
            Direction::Reverse => TopologyKind::Reverse,
        };
        let stages = split(raw, kind)?
            .into_iter()
            .enumerate()
            .map(|(index, args)| Stage { index, args })
            .collect();
        Ok(Self { direction, stages })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn channel_count(&self) -> usize {
        self.stages.len().saturating_sub(1)
    }

    /// Stage indices in the order they must be spawned.
    pub fn spawn_order(&self) -> Vec<usize> {
        let order = 0..self.stages.len();
        match self.direction {
            Direction::Forward => order.collect(),
            Direction::Reverse => order.rev().collect(),
        }
    }
}

/// A command in a conditional chain and the operator that follows it.
#[derive(Debug, Clone)]
pub struct Link {
    pub args: ArgList,
    pub next: Option<Connector>,
}

#[derive(Debug, Clone)]
pub struct ConditionalChain {
    links: Vec<Link>,
}

impl ConditionalChain {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let (segments, connectors) = split_conditional(raw);
        let lists = parse_segments(&segments, TopologyKind::Conditional)?;
        let links = lists
            .into_iter()
            .enumerate()
            .map(|(i, args)| Link {
                args,
                next: connectors.get(i).copied(),
            })
            .collect();
        Ok(Self { links })
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Operator that gates link `i`; `None` for the first link.
    pub fn gate(&self, i: usize) -> Option<Connector> {
        i.checked_sub(1).and_then(|prev| self.links[prev].next)
    }
}

#[derive(Debug, Clone)]
pub struct SequentialList {
    commands: Vec<ArgList>,
}

impl SequentialList {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        Ok(Self {
            commands: split(raw, TopologyKind::Sequential)?,
        })
    }

    pub fn commands(&self) -> &[ArgList] {
        &self.commands
    }
}
