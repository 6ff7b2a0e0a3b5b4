//! Route templates and reverse-URL building.
//!
//! A route template is a path pattern with literal and parameter
//! segments, compiled once at registration. Parameter tokens take the
//! form `<name>` or `<name:regex>`; a trailing `*` is shorthand for an
//! anonymous catch-all parameter matching everything including `/`.

use http::Method;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use thiserror::Error;

/// Characters escaped when substituting parameter values into a URL.
/// Everything outside the RFC 3986 unreserved set is percent-encoded,
/// so a built URL re-matches to the original values.
const PATH_SEGMENT_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a parameter value for URL substitution.
pub(crate) fn escape_param(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT_ESCAPE).to_string()
}

/// Errors from the validated reverse-URL builders.
#[derive(Debug, Error)]
pub enum UrlBuildError {
    #[error("expected {expected} parameter values, got {got}")]
    ParamCount { expected: usize, got: usize },

    #[error("unknown parameter: {0}")]
    UnknownParam(String),

    #[error("value {0:?} contains '/'")]
    SlashInValue(String),

    #[error("value {value:?} does not match pattern {pattern:?}")]
    PatternMismatch { value: String, pattern: String },
}

/// One token of a scanned route pattern.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PatternToken {
    /// A literal run, possibly spanning several `/`-separated segments.
    Literal(String),
    /// A parameter slot, optionally regex-constrained.
    Param {
        name: String,
        pattern: Option<String>,
    },
}

/// Rewrite a trailing literal `*` to the anonymous catch-all parameter.
pub(crate) fn rewrite_catch_all(path: &str) -> String {
    match path.strip_suffix('*') {
        Some(head) => format!("{head}<*:.*>"),
        None => path.to_string(),
    }
}

/// Scan a route pattern into literal and parameter tokens.
///
/// A single left-to-right pass tracking one level of `<`/`>` nesting.
/// An unmatched `<` degrades the rest of the string to literal text;
/// malformed input never panics.
pub(crate) fn scan_pattern(path: &str) -> Vec<PatternToken> {
    let bytes = path.as_bytes();
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0usize; // byte offset just past the last consumed token

    for i in 0..bytes.len() {
        match bytes[i] {
            b'<' if start.is_none() => start = Some(i),
            b'>' if start.is_some() => {
                let s = start.take().expect("start set");
                let token = &path[s + 1..i];
                let (name, pattern) = match token.split_once(':') {
                    Some((name, pat)) if !pat.is_empty() => (name, Some(pat.to_string())),
                    Some((name, _)) => (name, None),
                    None => (token, None),
                };
                if s > end {
                    tokens.push(PatternToken::Literal(path[end..s].to_string()));
                }
                tokens.push(PatternToken::Param {
                    name: name.to_string(),
                    pattern,
                });
                end = i + 1;
            }
            _ => {}
        }
    }
    if end < path.len() {
        tokens.push(PatternToken::Literal(path[end..].to_string()));
    }
    tokens
}

/// A compiled route pattern: segment list, parameter names and
/// per-parameter constraints.
#[derive(Debug)]
pub(crate) struct CompiledPattern {
    /// Literal runs and `<name>` markers in occurrence order.
    pub segments: Vec<String>,
    /// Parameter names in occurrence order.
    pub param_names: Vec<String>,
    /// Index-aligned constraints; `None` matches any non-`/` run.
    pub patterns: Vec<Option<Regex>>,
}

impl CompiledPattern {
    /// Compile a route pattern (after catch-all rewriting).
    ///
    /// Panics on an invalid regular expression in a parameter token;
    /// registration runs in the single-threaded setup phase and a bad
    /// constraint is a programmer error.
    pub fn compile(path: &str) -> Self {
        let mut segments = Vec::new();
        let mut param_names = Vec::new();
        let mut patterns = Vec::new();

        for token in scan_pattern(path) {
            match token {
                PatternToken::Literal(lit) => segments.push(lit),
                PatternToken::Param { name, pattern } => {
                    segments.push(format!("<{name}>"));
                    let regex = pattern.map(|pat| anchored(&pat));
                    param_names.push(name);
                    patterns.push(regex);
                }
            }
        }
        CompiledPattern {
            segments,
            param_names,
            patterns,
        }
    }

    /// The reverse-URL template: the pattern with regex annotations
    /// stripped.
    pub fn template(&self) -> String {
        self.segments.concat()
    }
}

/// Compile a parameter constraint anchored at both segment boundaries.
pub(crate) fn anchored(pattern: &str) -> Regex {
    match Regex::new(&format!("^(?:{pattern})$")) {
        Ok(re) => re,
        Err(e) => panic!("invalid route parameter pattern {pattern:?}: {e}"),
    }
}

/// A registered route: a URL path pattern shared by one or more HTTP
/// methods, addressable by name for reverse-URL building.
#[derive(Debug)]
pub struct Route {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) template: String,
    pub(crate) segments: Vec<String>,
    pub(crate) param_names: Vec<String>,
    pub(crate) patterns: Vec<Option<Regex>>,
    pub(crate) methods: Vec<Method>,
}

impl Route {
    pub(crate) fn new(path: &str) -> Self {
        let rewritten = rewrite_catch_all(path);
        let compiled = CompiledPattern::compile(&rewritten);
        Route {
            // The default name keeps the caller's spelling, before the
            // catch-all rewrite.
            name: path.to_string(),
            template: compiled.template(),
            path: rewritten,
            segments: compiled.segments,
            param_names: compiled.param_names,
            patterns: compiled.patterns,
            methods: Vec::new(),
        }
    }

    /// The registration name (defaults to the path).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The (rewritten) path pattern.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The methods registered on this route.
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Build a URL by substituting the given `(name, value)` pairs into
    /// the route template. Values are percent-encoded. Parameters
    /// without a value keep their `<name>` token in the output, so
    /// callers can detect incomplete substitution by scanning for `<`.
    pub fn url(&self, pairs: &[(&str, &str)]) -> String {
        let mut out = self.template.clone();
        for (name, value) in pairs {
            out = out.replace(&format!("<{name}>"), &escape_param(value));
        }
        out
    }

    /// Build a URL from a complete set of named parameter values,
    /// validating each value against the parameter's constraint.
    /// Values are substituted verbatim.
    pub fn url_by_names(&self, pairs: &[(&str, &str)]) -> Result<String, UrlBuildError> {
        if pairs.len() != self.param_names.len() {
            return Err(UrlBuildError::ParamCount {
                expected: self.param_names.len(),
                got: pairs.len(),
            });
        }
        for (name, value) in pairs {
            let idx = self
                .param_names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| UrlBuildError::UnknownParam(name.to_string()))?;
            self.check_value(idx, value)?;
        }
        let mut out = String::new();
        for segment in &self.segments {
            if let Some(name) = param_marker(segment) {
                if let Some((_, value)) = pairs.iter().find(|(n, _)| *n == name) {
                    out.push_str(value);
                }
            } else {
                out.push_str(segment);
            }
        }
        Ok(out)
    }

    /// Build a URL from positional parameter values, validating each
    /// value against its constraint. Values are substituted verbatim.
    pub fn url_by_index(&self, values: &[&str]) -> Result<String, UrlBuildError> {
        if values.len() != self.param_names.len() {
            return Err(UrlBuildError::ParamCount {
                expected: self.param_names.len(),
                got: values.len(),
            });
        }
        for (idx, value) in values.iter().enumerate() {
            self.check_value(idx, value)?;
        }
        let mut out = String::new();
        let mut next = 0usize;
        for segment in &self.segments {
            if param_marker(segment).is_some() {
                out.push_str(values[next]);
                next += 1;
            } else {
                out.push_str(segment);
            }
        }
        Ok(out)
    }

    fn check_value(&self, idx: usize, value: &str) -> Result<(), UrlBuildError> {
        match &self.patterns[idx] {
            None => {
                if value.contains('/') {
                    return Err(UrlBuildError::SlashInValue(value.to_string()));
                }
            }
            Some(re) => {
                if !re.is_match(value) {
                    return Err(UrlBuildError::PatternMismatch {
                        value: value.to_string(),
                        pattern: re.as_str().to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// If `segment` is a `<name>` marker, return the parameter name.
fn param_marker(segment: &str) -> Option<&str> {
    segment.strip_prefix('<')?.strip_suffix('>')
}
