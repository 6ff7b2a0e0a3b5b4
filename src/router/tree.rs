//! Per-method route tree.
//!
//! An explicit recursive-descent matcher over `/`-separated path
//! segments with ordered candidate lists per node. Match priority at
//! each position: exact static segment, then parameter edges in
//! registration order (regex-constrained edges match only if the whole
//! segment satisfies the pattern, otherwise matching backtracks to the
//! next alternative), then the catch-all. The tree is only mutated
//! during the single-threaded registration phase and is read without
//! locking while serving.

use super::route::{PatternToken, anchored, scan_pattern};
use crate::handler::HandlerChain;
use regex::Regex;
use std::sync::Arc;

/// Data resolved for a matched path: the handler chain, the parameter
/// name list (index-aligned with the captured values) and the owning
/// route.
#[derive(Clone)]
pub(crate) struct Payload {
    pub handlers: HandlerChain,
    pub pnames: Arc<[String]>,
    pub route: usize,
}

/// One piece of a registered pattern, per path segment.
enum SegPattern {
    /// Exact segment text.
    Static(String),
    /// A parameter covering the whole segment.
    Param { name: String, regex: Option<Regex> },
    /// Literals and parameters mixed within one segment.
    Mixed { regex: Regex, names: Vec<String> },
    /// Trailing parameter matching the remaining path including `/`.
    CatchAll { name: String },
}

/// An intra-segment part, before classification.
enum Part {
    Lit(String),
    Par {
        name: String,
        pattern: Option<String>,
    },
}

/// Split a scanned pattern into per-segment matchers.
fn split_segments(path: &str) -> Vec<SegPattern> {
    let tokens = scan_pattern(path);
    let mut groups: Vec<Vec<Part>> = Vec::new();
    let mut cur: Vec<Part> = Vec::new();

    for token in tokens {
        match token {
            PatternToken::Literal(lit) => {
                for (i, piece) in lit.split('/').enumerate() {
                    if i > 0 {
                        groups.push(std::mem::take(&mut cur));
                    }
                    if !piece.is_empty() {
                        cur.push(Part::Lit(piece.to_string()));
                    }
                }
            }
            PatternToken::Param { name, pattern } => {
                cur.push(Part::Par { name, pattern });
            }
        }
    }
    groups.push(cur);

    let last = groups.len() - 1;
    groups
        .into_iter()
        .enumerate()
        .map(|(i, parts)| classify(parts, i == last))
        .collect()
}

fn classify(parts: Vec<Part>, is_last: bool) -> SegPattern {
    match parts.as_slice() {
        [] => SegPattern::Static(String::new()),
        [Part::Lit(text)] => SegPattern::Static(text.clone()),
        [Part::Par { name, pattern }] => {
            // `.*` can cross `/`; only the final segment may do so.
            if is_last && pattern.as_deref() == Some(".*") {
                SegPattern::CatchAll { name: name.clone() }
            } else {
                SegPattern::Param {
                    name: name.clone(),
                    regex: pattern.as_deref().map(anchored),
                }
            }
        }
        _ => {
            let mut source = String::from("^");
            let mut names = Vec::new();
            for part in &parts {
                match part {
                    Part::Lit(text) => source.push_str(&regex::escape(text)),
                    Part::Par { name, pattern } => {
                        let pat = pattern.as_deref().unwrap_or("[^/]+?");
                        source.push('(');
                        source.push_str(pat);
                        source.push(')');
                        names.push(name.clone());
                    }
                }
            }
            source.push('$');
            let regex = match Regex::new(&source) {
                Ok(re) => re,
                Err(e) => panic!("invalid route segment pattern {source:?}: {e}"),
            };
            SegPattern::Mixed { regex, names }
        }
    }
}

struct ParamEdge {
    kind: EdgeKind,
    /// Index of this edge's first captured value in the parameter
    /// buffer: the number of parameters consumed above it. Identical
    /// for every template sharing the node prefix.
    slot: usize,
    node: Node,
}

enum EdgeKind {
    Any {
        name: String,
    },
    Pattern {
        name: String,
        source: String,
        regex: Regex,
    },
    Mixed {
        source: String,
        regex: Regex,
        names: Vec<String>,
    },
}

impl EdgeKind {
    fn same_edge(&self, seg: &SegPattern) -> bool {
        match (self, seg) {
            (EdgeKind::Any { name }, SegPattern::Param { name: n, regex: None }) => name == n,
            (
                EdgeKind::Pattern { name, source, .. },
                SegPattern::Param {
                    name: n,
                    regex: Some(re),
                },
            ) => name == n && source == re.as_str(),
            (EdgeKind::Mixed { source, .. }, SegPattern::Mixed { regex, .. }) => {
                source == regex.as_str()
            }
            _ => false,
        }
    }

    fn param_count(&self) -> usize {
        match self {
            EdgeKind::Any { .. } | EdgeKind::Pattern { .. } => 1,
            EdgeKind::Mixed { names, .. } => names.len(),
        }
    }
}

struct CatchAllEdge {
    slot: usize,
    payload: Payload,
}

#[derive(Default)]
struct Node {
    statics: Vec<(String, Node)>,
    params: Vec<ParamEdge>,
    catch_all: Option<CatchAllEdge>,
    payload: Option<Payload>,
}

/// The route tree for a single HTTP method.
#[derive(Default)]
pub(crate) struct Tree {
    root: Node,
}

impl Tree {
    /// Register a pattern. Returns the number of parameters in the
    /// template, used by the router to size parameter buffers. The
    /// first registration of a given template wins; duplicates are
    /// ignored with a warning.
    pub fn add(&mut self, path: &str, payload: Payload) -> usize {
        let segments = split_segments(path);
        let mut node = &mut self.root;
        let mut slot = 0usize;

        for segment in segments {
            match segment {
                SegPattern::Static(text) => {
                    let idx = match node.statics.iter().position(|(s, _)| *s == text) {
                        Some(i) => i,
                        None => {
                            node.statics.push((text, Node::default()));
                            node.statics.len() - 1
                        }
                    };
                    node = &mut node.statics[idx].1;
                }
                seg @ (SegPattern::Param { .. } | SegPattern::Mixed { .. }) => {
                    let idx = match node.params.iter().position(|e| e.kind.same_edge(&seg)) {
                        Some(i) => i,
                        None => {
                            let kind = match seg {
                                SegPattern::Param { name, regex: None } => EdgeKind::Any { name },
                                SegPattern::Param {
                                    name,
                                    regex: Some(regex),
                                } => EdgeKind::Pattern {
                                    name,
                                    source: regex.as_str().to_string(),
                                    regex,
                                },
                                SegPattern::Mixed { regex, names } => EdgeKind::Mixed {
                                    source: regex.as_str().to_string(),
                                    regex,
                                    names,
                                },
                                SegPattern::Static(_) | SegPattern::CatchAll { .. } => {
                                    unreachable!("filtered by match arm")
                                }
                            };
                            node.params.push(ParamEdge {
                                kind,
                                slot,
                                node: Node::default(),
                            });
                            node.params.len() - 1
                        }
                    };
                    slot += node.params[idx].kind.param_count();
                    node = &mut node.params[idx].node;
                }
                SegPattern::CatchAll { .. } => {
                    if node.catch_all.is_none() {
                        node.catch_all = Some(CatchAllEdge { slot, payload });
                    } else {
                        tracing::warn!(path, "duplicate catch-all registration ignored");
                    }
                    return slot + 1;
                }
            }
        }

        if node.payload.is_none() {
            node.payload = Some(payload);
        } else {
            tracing::warn!(path, "duplicate route registration ignored");
        }
        slot
    }

    /// Resolve a path, writing captured parameter values into the
    /// caller's reusable buffer by slot index. Returns the payload of
    /// the most specific matching template, or `None`.
    pub fn find<'a>(&'a self, path: &str, pvalues: &mut Vec<String>) -> Option<&'a Payload> {
        let segments: Vec<&str> = path.split('/').collect();
        match_node(&self.root, &segments, 0, pvalues)
    }
}

fn match_node<'a>(
    node: &'a Node,
    segments: &[&str],
    idx: usize,
    pvalues: &mut Vec<String>,
) -> Option<&'a Payload> {
    if idx == segments.len() {
        return node.payload.as_ref();
    }
    let seg = segments[idx];

    if let Some((_, child)) = node.statics.iter().find(|(text, _)| text == seg)
        && let Some(payload) = match_node(child, segments, idx + 1, pvalues)
    {
        return Some(payload);
    }

    for edge in &node.params {
        let matched = match &edge.kind {
            EdgeKind::Any { .. } => {
                capture(pvalues, edge.slot, seg);
                true
            }
            EdgeKind::Pattern { regex, .. } => {
                if regex.is_match(seg) {
                    capture(pvalues, edge.slot, seg);
                    true
                } else {
                    false
                }
            }
            EdgeKind::Mixed { regex, names, .. } => match regex.captures(seg) {
                Some(caps) => {
                    for i in 0..names.len() {
                        let value = caps.get(i + 1).map(|m| m.as_str()).unwrap_or("");
                        capture(pvalues, edge.slot + i, value);
                    }
                    true
                }
                None => false,
            },
        };
        if matched && let Some(payload) = match_node(&edge.node, segments, idx + 1, pvalues) {
            return Some(payload);
        }
    }

    if let Some(ca) = &node.catch_all {
        capture(pvalues, ca.slot, &segments[idx..].join("/"));
        return Some(&ca.payload);
    }
    None
}

fn capture(pvalues: &mut Vec<String>, slot: usize, value: &str) {
    while pvalues.len() <= slot {
        pvalues.push(String::new());
    }
    pvalues[slot].clear();
    pvalues[slot].push_str(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::empty_chain;
    use crate::router::route::rewrite_catch_all;

    fn payload(route: usize, pnames: &[&str]) -> Payload {
        Payload {
            handlers: empty_chain(),
            pnames: pnames.iter().map(|s| s.to_string()).collect(),
            route,
        }
    }

    fn build(routes: &[(&str, &[&str])]) -> Tree {
        let mut tree = Tree::default();
        for (i, (path, pnames)) in routes.iter().enumerate() {
            tree.add(&rewrite_catch_all(path), payload(i, pnames));
        }
        tree
    }

    #[test]
    fn test_match_specificity_order() {
        let tree = build(&[("/a/b", &[]), ("/a/<x>", &["x"]), ("/a/*", &["*"])]);
        let mut pvalues = Vec::new();

        let hit = tree.find("/a/b", &mut pvalues).expect("static match");
        assert_eq!(hit.route, 0);

        let hit = tree.find("/a/c", &mut pvalues).expect("param match");
        assert_eq!(hit.route, 1);
        assert_eq!(pvalues[0], "c");

        let hit = tree.find("/a/c/d", &mut pvalues).expect("catch-all match");
        assert_eq!(hit.route, 2);
        assert_eq!(pvalues[0], "c/d");
    }

    #[test]
    fn test_regex_constraint() {
        let tree = build(&[("/user/<id:\\d+>", &["id"])]);
        let mut pvalues = Vec::new();

        let hit = tree.find("/user/42", &mut pvalues).expect("digits match");
        assert_eq!(hit.route, 0);
        assert_eq!(pvalues[0], "42");

        assert!(tree.find("/user/abc", &mut pvalues).is_none());
        // Pattern is whole-segment anchored.
        assert!(tree.find("/user/42abc", &mut pvalues).is_none());
    }

    #[test]
    fn test_backtracking_on_constraint_mismatch() {
        let tree = build(&[
            ("/u/<id:\\d+>/edit", &["id"]),
            ("/u/<name>/view", &["name"]),
        ]);
        let mut pvalues = Vec::new();

        // `42` satisfies the first edge but `view` only exists under the
        // second; the matcher must back out and try the alternative.
        let hit = tree.find("/u/42/view", &mut pvalues).expect("backtrack");
        assert_eq!(hit.route, 1);
        assert_eq!(pvalues[0], "42");

        let hit = tree.find("/u/42/edit", &mut pvalues).expect("constrained");
        assert_eq!(hit.route, 0);
    }

    #[test]
    fn test_first_registered_wins_between_equal_params() {
        let tree = build(&[("/p/<a>", &["a"]), ("/p/<b>", &["b"])]);
        let mut pvalues = Vec::new();
        let hit = tree.find("/p/zzz", &mut pvalues).expect("match");
        assert_eq!(hit.route, 0);
    }

    #[test]
    fn test_mixed_segment() {
        let tree = build(&[("/v<major:\\d+>.<minor:\\d+>/info", &["major", "minor"])]);
        let mut pvalues = Vec::new();

        let hit = tree.find("/v1.2/info", &mut pvalues).expect("mixed match");
        assert_eq!(hit.route, 0);
        assert_eq!(pvalues[0], "1");
        assert_eq!(pvalues[1], "2");

        assert!(tree.find("/vx.2/info", &mut pvalues).is_none());
    }

    #[test]
    fn test_catch_all_requires_slash_boundary() {
        let tree = build(&[("/files/*", &["*"])]);
        let mut pvalues = Vec::new();

        assert!(tree.find("/files", &mut pvalues).is_none());

        let hit = tree.find("/files/", &mut pvalues).expect("empty rest");
        assert_eq!(hit.route, 0);
        assert_eq!(pvalues[0], "");

        let hit = tree.find("/files/a/b.txt", &mut pvalues).expect("deep rest");
        assert_eq!(pvalues[0], "a/b.txt");
        assert_eq!(hit.route, 0);
    }

    #[test]
    fn test_root_catch_all() {
        let tree = build(&[("/*", &["*"])]);
        let mut pvalues = Vec::new();
        let hit = tree.find("/x/y", &mut pvalues).expect("root catch-all");
        assert_eq!(hit.route, 0);
        assert_eq!(pvalues[0], "x/y");
    }

    #[test]
    fn test_param_count_sizing() {
        let mut tree = Tree::default();
        assert_eq!(tree.add("/a/<x>/<y>", payload(0, &["x", "y"])), 2);
        assert_eq!(tree.add("/b", payload(1, &[])), 0);
        assert_eq!(
            tree.add(&rewrite_catch_all("/c/*"), payload(2, &["*"])),
            1
        );
    }

    #[test]
    fn test_shared_prefix_distinct_suffixes() {
        let tree = build(&[
            ("/api/users", &[]),
            ("/api/users/<id:\\d+>", &["id"]),
            ("/api/users/<id:\\d+>/posts", &["id"]),
        ]);
        let mut pvalues = Vec::new();

        assert_eq!(tree.find("/api/users", &mut pvalues).unwrap().route, 0);
        assert_eq!(tree.find("/api/users/7", &mut pvalues).unwrap().route, 1);
        assert_eq!(
            tree.find("/api/users/7/posts", &mut pvalues).unwrap().route,
            2
        );
        assert!(tree.find("/api/users/7/other", &mut pvalues).is_none());
    }
}
