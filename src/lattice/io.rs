//! SLF and FSM lattice text parsing.

use std::fs;
use std::path::Path;

use tracing::{debug_span, trace};

use super::{Lattice, LatticeError, LatticeFormat, LatticeInfo, Link, LinkId, Node};
use crate::dict::{Pronunciations, EPS};

impl Lattice {
    /// Read and parse a lattice file.
    ///
    /// Unknown words are appended to `prons`.
    pub fn open(
        path: &Path,
        format: LatticeFormat,
        prons: &mut Pronunciations,
    ) -> Result<Self, LatticeError> {
        let text = fs::read_to_string(path).map_err(|source| LatticeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let info = LatticeInfo::new(path, format);
        match format {
            LatticeFormat::Slf => parse_slf(&text, info, prons),
            LatticeFormat::Fsm => parse_fsm(&text, info, prons),
        }
    }
}

/// Split `ident=value`.
fn split_field(line: usize, field: &str) -> Result<(&str, &str), LatticeError> {
    field
        .split_once('=')
        .ok_or_else(|| LatticeError::MalformedField {
            line,
            field: field.to_string(),
        })
}

fn parse_num<T: std::str::FromStr>(line: usize, ident: &str, value: &str) -> Result<T, LatticeError> {
    value.parse().map_err(|_| LatticeError::InvalidValue {
        line,
        ident: ident.to_string(),
        value: value.to_string(),
    })
}

fn fill_info_field(
    info: &mut LatticeInfo,
    line: usize,
    ident: &str,
    value: &str,
) -> Result<(), LatticeError> {
    match ident {
        "UTTERANCE" => info.utterance = value.to_string(),
        "wdpenalty" => info.wdpenalty = parse_num(line, ident, value)?,
        "lmscale" | "ngscale" => info.lmscale = parse_num(line, ident, value)?,
        "prscale" => info.prscale = parse_num(line, ident, value)?,
        "NODES" | "N" => info.no_nodes = parse_num(line, ident, value)?,
        "LINKS" | "L" => info.no_links = parse_num(line, ident, value)?,
        // VERSION, ngname, lmname, vocab, hmms, tscale, ...
        _ => {}
    }
    Ok(())
}

struct SlfLink {
    link: Link,
    has_word: bool,
    line: usize,
}

/// Parse an HTK Standard Lattice Format file.
///
/// `I=` lines are nodes, `J=` lines are links, `#` lines are comments and
/// everything else is `key=value` header fields.
pub fn parse_slf(
    text: &str,
    mut info: LatticeInfo,
    prons: &mut Pronunciations,
) -> Result<Lattice, LatticeError> {
    let _span = debug_span!("parse_slf", path = %info.path.display()).entered();

    let mut node_lines = Vec::new();
    let mut link_lines = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let lineno = i + 1;
        if line.starts_with('#') {
            continue;
        } else if line.starts_with('I') {
            node_lines.push((lineno, line));
        } else if line.starts_with('J') {
            link_lines.push((lineno, line));
        } else {
            for field in line.split_whitespace() {
                let (ident, value) = split_field(lineno, field)?;
                if value.contains('=') || ident.is_empty() || value.is_empty() {
                    return Err(LatticeError::MalformedField {
                        line: lineno,
                        field: field.to_string(),
                    });
                }
                fill_info_field(&mut info, lineno, ident, value)?;
            }
        }
    }
    if info.no_nodes == 0 {
        return Err(LatticeError::Header("NODES must be positive".into()));
    }
    if info.no_links == 0 {
        return Err(LatticeError::Header("LINKS must be positive".into()));
    }

    let mut nodes: Vec<Node> = (0..info.no_nodes).map(Node::new).collect();
    for (lineno, line) in node_lines {
        let node = parse_slf_node(lineno, line, prons)?;
        if node.id >= info.no_nodes {
            return Err(LatticeError::NodeOutOfRange {
                line: lineno,
                id: node.id,
                limit: info.no_nodes,
            });
        }
        let id = node.id;
        nodes[id] = node;
    }
    let time_info = nodes[0].time >= 0.0;

    let mut slots: Vec<Option<SlfLink>> = (0..info.no_links).map(|_| None).collect();
    for (lineno, line) in link_lines {
        let parsed = parse_slf_link(lineno, line, prons)?;
        let link = &parsed.link;
        if link.id >= info.no_links {
            return Err(LatticeError::LinkOutOfRange {
                line: lineno,
                id: link.id,
                limit: info.no_links,
            });
        }
        for id in [link.start, link.end] {
            if id >= info.no_nodes {
                return Err(LatticeError::NodeOutOfRange {
                    line: lineno,
                    id,
                    limit: info.no_nodes,
                });
            }
        }
        let id = link.id;
        slots[id] = Some(parsed);
    }

    let mut links = Vec::with_capacity(info.no_links);
    for (id, slot) in slots.into_iter().enumerate() {
        let SlfLink {
            mut link,
            has_word,
            line,
        } = slot.ok_or(LatticeError::MissingLink(id))?;
        if !has_word {
            // Word-on-node lattices label the link with its end node's word.
            link.word = nodes[link.end]
                .word
                .ok_or(LatticeError::MissingWord(link.id))?;
            trace!(line, link = link.id, "link word taken from end node");
        }
        links.push(link);
    }

    Lattice::from_parts(info, nodes, links, time_info)
}

fn parse_slf_node(lineno: usize, line: &str, prons: &mut Pronunciations) -> Result<Node, LatticeError> {
    let mut node = Node::new(0);
    for field in line.split_whitespace() {
        let (ident, value) = split_field(lineno, field)?;
        match ident {
            "I" => node.id = parse_num(lineno, ident, value)?,
            "t" | "T" => node.time = parse_num(lineno, ident, value)?,
            "W" | "WORD" => node.word = Some(prons.get_idx(value)),
            "v" => {}
            _ => {
                return Err(LatticeError::UnknownField {
                    line: lineno,
                    ident: ident.to_string(),
                })
            }
        }
    }
    Ok(node)
}

fn parse_slf_link(lineno: usize, line: &str, prons: &mut Pronunciations) -> Result<SlfLink, LatticeError> {
    let mut link = Link::new(0, 0, 0, prons.eps_id());
    let mut has_word = false;
    for field in line.split_whitespace() {
        let (ident, value) = split_field(lineno, field)?;
        match ident {
            "J" => link.id = parse_num(lineno, ident, value)?,
            "S" => link.start = parse_num(lineno, ident, value)?,
            "E" => link.end = parse_num(lineno, ident, value)?,
            "a" => link.ac_score = parse_num(lineno, ident, value)?,
            "n" | "l" => link.lm_score = parse_num(lineno, ident, value)?,
            "r" => link.pr_score = parse_num(lineno, ident, value)?,
            "score" => link.score = parse_num(lineno, ident, value)?,
            "W" | "WORD" => {
                link.word = prons.get_idx(value);
                has_word = true;
            }
            _ => {
                return Err(LatticeError::UnknownField {
                    line: lineno,
                    ident: ident.to_string(),
                })
            }
        }
    }
    Ok(SlfLink {
        link,
        has_word,
        line: lineno,
    })
}

/// Parse an FSM text lattice.
///
/// Arc lines are `from to word [score]`, final-state lines `state [score]`.
/// Every final state gets an epsilon link into one synthetic end node, the
/// last node id. FSM lattices carry no time information.
pub fn parse_fsm(
    text: &str,
    mut info: LatticeInfo,
    prons: &mut Pronunciations,
) -> Result<Lattice, LatticeError> {
    let _span = debug_span!("parse_fsm", path = %info.path.display()).entered();

    let mut rows: Vec<(usize, Vec<&str>)> = Vec::new();
    let mut states = std::collections::BTreeSet::new();
    for (i, line) in text.lines().enumerate() {
        let lineno = i + 1;
        if line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() > 4 {
            return Err(LatticeError::FieldCount {
                line: lineno,
                expected: "1 to 4",
                found: fields.len(),
            });
        }
        if fields.len() >= 3 {
            states.insert(fields[0]);
            states.insert(fields[1]);
        }
        rows.push((lineno, fields));
    }
    info.no_links = rows.len();
    info.no_nodes = states.len() + 1;
    if info.no_links == 0 {
        return Err(LatticeError::Header("FSM lattice has no arcs".into()));
    }

    let end_node = info.no_nodes - 1;
    let node_id = |lineno: usize, value: &str| -> Result<usize, LatticeError> {
        let id: usize = parse_num(lineno, "state", value)?;
        if id >= end_node {
            return Err(LatticeError::NodeOutOfRange {
                line: lineno,
                id,
                limit: info.no_nodes,
            });
        }
        Ok(id)
    };

    let mut links = Vec::with_capacity(rows.len());
    for (id, (lineno, fields)) in rows.iter().enumerate() {
        let lineno = *lineno;
        let link = if fields.len() >= 3 {
            let start = node_id(lineno, fields[0])?;
            let end = node_id(lineno, fields[1])?;
            // A self-loop is read as an arc into the end node.
            let end = if end == start { end_node } else { end };
            let mut link = Link::new(id as LinkId, start, end, prons.get_idx(fields[2]));
            link.score = match fields.get(3) {
                Some(v) => parse_num(lineno, "score", v)?,
                None => 0.0,
            };
            link
        } else {
            let start = node_id(lineno, fields[0])?;
            let mut link = Link::new(id as LinkId, start, end_node, prons.get_idx(EPS));
            link.score = match fields.get(1) {
                Some(v) => parse_num(lineno, "score", v)?,
                None => 0.0,
            };
            link
        };
        links.push(link);
    }

    let nodes = (0..info.no_nodes).map(Node::new).collect();
    Lattice::from_parts(info, nodes, links, false)
}
