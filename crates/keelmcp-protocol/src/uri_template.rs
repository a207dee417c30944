//! RFC 6570 URI templates.
//!
//! Levels 1-3 plus the level-4 modifiers (`:n` prefix, `*` explode).
//! Templates both construct URIs from a variable map and run in
//! reverse, extracting variables from a concrete URI.
//!
//! One deviation from a literal reading of the RFC, matching how MCP
//! resource bindings are written in practice: a literal query string of
//! the form `?key={var}&key2={var2}` drops pairs whose variable is
//! undefined, and drops the `?` entirely when no pair survives. So
//! `users://{user_id}/profile?locale={lang}` without `lang` expands to
//! `users://123/profile`.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;

/// Characters percent-encoded under "unreserved" expansion: everything
/// but ALPHA / DIGIT / `-` / `.` / `_` / `~`.
const UNRESERVED_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ').add(b'!').add(b'"').add(b'#').add(b'$').add(b'%').add(b'&').add(b'\'')
    .add(b'(').add(b')').add(b'*').add(b'+').add(b',').add(b'/').add(b':').add(b';')
    .add(b'<').add(b'=').add(b'>').add(b'?').add(b'@').add(b'[').add(b'\\').add(b']')
    .add(b'^').add(b'`').add(b'{').add(b'|').add(b'}');

/// Characters percent-encoded under "reserved" expansion (`+`, `#`):
/// reserved characters and existing percent-triplets pass through.
const RESERVED_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ').add(b'"').add(b'<').add(b'>').add(b'\\').add(b'^').add(b'`')
    .add(b'{').add(b'|').add(b'}');

/// Errors from template parsing or expansion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// Unbalanced or nested braces
    #[error("malformed expression braces in template")]
    UnbalancedBraces,
    /// An operator reserved for future RFC extension
    #[error("reserved operator '{0}' is not allowed")]
    ReservedOperator(char),
    /// Empty expression `{}` or empty variable name
    #[error("empty variable name in expression")]
    EmptyVariable,
    /// Invalid character inside a variable name
    #[error("invalid character '{0}' in variable name")]
    InvalidVariableChar(char),
    /// Prefix modifier out of the 1..=9999 range or not numeric
    #[error("invalid prefix length in expression")]
    InvalidPrefix,
}

/// Expansion operator, one per expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    /// `{var}`
    Simple,
    /// `{+var}`
    Reserved,
    /// `{#var}`
    Fragment,
    /// `{.var}`
    Label,
    /// `{/var}`
    Path,
    /// `{;var}`
    PathParam,
    /// `{?var}`
    Query,
    /// `{&var}`
    QueryContinuation,
}

impl Operator {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Reserved),
            '#' => Some(Self::Fragment),
            '.' => Some(Self::Label),
            '/' => Some(Self::Path),
            ';' => Some(Self::PathParam),
            '?' => Some(Self::Query),
            '&' => Some(Self::QueryContinuation),
            _ => None,
        }
    }

    const fn first(self) -> &'static str {
        match self {
            Self::Simple | Self::Reserved => "",
            Self::Fragment => "#",
            Self::Label => ".",
            Self::Path => "/",
            Self::PathParam => ";",
            Self::Query => "?",
            Self::QueryContinuation => "&",
        }
    }

    const fn separator(self) -> &'static str {
        match self {
            Self::Simple | Self::Reserved | Self::Fragment => ",",
            Self::Label => ".",
            Self::Path => "/",
            Self::PathParam => ";",
            Self::Query | Self::QueryContinuation => "&",
        }
    }

    const fn named(self) -> bool {
        matches!(self, Self::PathParam | Self::Query | Self::QueryContinuation)
    }

    /// What a named varspec appends when its value is empty.
    const fn if_empty(self) -> &'static str {
        match self {
            Self::Query | Self::QueryContinuation => "=",
            _ => "",
        }
    }

    const fn allows_reserved(self) -> bool {
        matches!(self, Self::Reserved | Self::Fragment)
    }
}

/// Value modifier on a varspec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    None,
    /// `:n` - at most n characters of the value
    Prefix(usize),
    /// `*` - explode lists and maps
    Explode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VarSpec {
    name: String,
    modifier: Modifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Component {
    Literal(String),
    Expression { operator: Operator, varspecs: Vec<VarSpec> },
}

/// A value substituted into a template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    /// A single string
    String(String),
    /// An ordered list
    List(Vec<String>),
    /// An ordered association list
    Assoc(Vec<(String, String)>),
}

impl TemplateValue {
    fn is_empty(&self) -> bool {
        match self {
            Self::String(s) => s.is_empty(),
            Self::List(l) => l.is_empty(),
            Self::Assoc(a) => a.is_empty(),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// A parsed RFC 6570 template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    raw: String,
    /// Everything before the literal `?`, parsed as RFC components.
    path: Vec<Component>,
    /// Literal-query pairs `key={var}`, when the template has them.
    query: Vec<(String, VarSpec)>,
    match_regex: Regex,
    /// Variable names in capture-group order for `match_regex`.
    match_vars: Vec<String>,
    /// True when the path regex itself consumes query/fragment text
    /// (`{?q}`-style operators), so matching runs on the full URI.
    regex_covers_query: bool,
}

impl PartialEq for UriTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl UriTemplate {
    /// Parse and validate a template.
    pub fn parse(template: &str) -> Result<Self, TemplateError> {
        let (path_str, query) = match split_literal_query(template) {
            Some((path, query_str)) => (path, parse_literal_query(query_str)?),
            None => (template, Vec::new()),
        };
        let path = parse_components(path_str)?;
        let (match_regex, match_vars) = build_match_regex(&path);
        let regex_covers_query = path.iter().any(|component| {
            matches!(
                component,
                Component::Expression {
                    operator: Operator::Query | Operator::QueryContinuation | Operator::Fragment,
                    ..
                }
            )
        });
        Ok(Self {
            raw: template.to_string(),
            path,
            query,
            match_regex,
            match_vars,
            regex_covers_query,
        })
    }

    /// The template text as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Ordered list of variable names across the whole template.
    pub fn variable_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for component in &self.path {
            if let Component::Expression { varspecs, .. } = component {
                names.extend(varspecs.iter().map(|v| v.name.as_str()));
            }
        }
        names.extend(self.query.iter().map(|(_, v)| v.name.as_str()));
        names
    }

    /// Construct a URI by substituting `vars`.
    ///
    /// Undefined variables expand to nothing; an expression whose
    /// variables are all undefined contributes nothing, including its
    /// operator prefix.
    pub fn expand(&self, vars: &HashMap<String, TemplateValue>) -> String {
        let mut out = String::new();
        for component in &self.path {
            match component {
                Component::Literal(text) => out.push_str(text),
                Component::Expression { operator, varspecs } => {
                    expand_expression(&mut out, *operator, varspecs, vars);
                }
            }
        }

        let mut first = true;
        for (key, varspec) in &self.query {
            let Some(value) = vars.get(&varspec.name) else { continue };
            let expanded = expand_single(value, varspec.modifier, Operator::Simple);
            out.push(if first { '?' } else { '&' });
            first = false;
            out.push_str(key);
            out.push('=');
            out.push_str(&expanded);
        }
        out
    }

    /// Convenience wrapper over [`Self::expand`] for string-only maps.
    pub fn expand_strings(&self, vars: &HashMap<String, String>) -> String {
        let converted = vars
            .iter()
            .map(|(k, v)| (k.clone(), TemplateValue::String(v.clone())))
            .collect();
        self.expand(&converted)
    }

    /// Match a concrete URI against this template, recovering the
    /// variable map. Returns `None` when the URI does not fit.
    pub fn match_uri(&self, uri: &str) -> Option<HashMap<String, String>> {
        let (uri_path, uri_query) = if self.regex_covers_query {
            (uri, None)
        } else {
            match uri.split_once('?') {
                Some((p, q)) => (p, Some(q)),
                None => (uri, None),
            }
        };

        let captures = self.match_regex.captures(uri_path)?;
        let mut vars = HashMap::new();
        for (i, name) in self.match_vars.iter().enumerate() {
            if let Some(m) = captures.get(i + 1) {
                vars.insert(name.clone(), percent_decode(m.as_str()));
            }
        }

        if !self.query.is_empty()
            && let Some(raw_query) = uri_query
        {
            let params: HashMap<&str, &str> = raw_query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .collect();
            for (key, varspec) in &self.query {
                if let Some(value) = params.get(key.as_str()) {
                    vars.insert(varspec.name.clone(), percent_decode(value));
                }
            }
        }
        Some(vars)
    }
}

/// Split at the first literal `?` (one outside any expression).
fn split_literal_query(template: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, c) in template.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '?' if depth == 0 => return Some((&template[..i], &template[i + 1..])),
            _ => {}
        }
    }
    None
}

/// Parse `key={var}&key2={var2}` literal-query pairs.
fn parse_literal_query(query: &str) -> Result<Vec<(String, VarSpec)>, TemplateError> {
    let mut pairs = Vec::new();
    for item in query.split('&') {
        let Some((key, value)) = item.split_once('=') else {
            return Err(TemplateError::UnbalancedBraces);
        };
        let inner = value
            .strip_prefix('{')
            .and_then(|v| v.strip_suffix('}'))
            .ok_or(TemplateError::UnbalancedBraces)?;
        if Operator::from_char(inner.chars().next().unwrap_or(' ')).is_some() {
            return Err(TemplateError::InvalidVariableChar(inner.chars().next().unwrap_or(' ')));
        }
        pairs.push((key.to_string(), parse_varspec(inner)?));
    }
    Ok(pairs)
}

fn parse_components(template: &str) -> Result<Vec<Component>, TemplateError> {
    let mut components = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if !literal.is_empty() {
                    components.push(Component::Literal(std::mem::take(&mut literal)));
                }
                let mut expr = String::new();
                let mut closed = false;
                for e in chars.by_ref() {
                    if e == '}' {
                        closed = true;
                        break;
                    }
                    if e == '{' {
                        return Err(TemplateError::UnbalancedBraces);
                    }
                    expr.push(e);
                }
                if !closed {
                    return Err(TemplateError::UnbalancedBraces);
                }
                components.push(parse_expression(&expr)?);
            }
            '}' => return Err(TemplateError::UnbalancedBraces),
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        components.push(Component::Literal(literal));
    }
    Ok(components)
}

fn parse_expression(expr: &str) -> Result<Component, TemplateError> {
    let mut rest = expr;
    let first = rest.chars().next().ok_or(TemplateError::EmptyVariable)?;

    // Operators reserved by the RFC for future extensions.
    if matches!(first, '=' | ',' | '!' | '@' | '|') {
        return Err(TemplateError::ReservedOperator(first));
    }

    let operator = match Operator::from_char(first) {
        Some(op) => {
            rest = &rest[first.len_utf8()..];
            op
        }
        None => Operator::Simple,
    };

    let varspecs = rest
        .split(',')
        .map(parse_varspec)
        .collect::<Result<Vec<_>, _>>()?;
    if varspecs.is_empty() {
        return Err(TemplateError::EmptyVariable);
    }
    Ok(Component::Expression { operator, varspecs })
}

fn parse_varspec(spec: &str) -> Result<VarSpec, TemplateError> {
    if spec.is_empty() {
        return Err(TemplateError::EmptyVariable);
    }

    let (name, modifier) = if let Some(name) = spec.strip_suffix('*') {
        (name, Modifier::Explode)
    } else if let Some((name, len)) = spec.split_once(':') {
        let len: usize = len.parse().map_err(|_| TemplateError::InvalidPrefix)?;
        if !(1..=9999).contains(&len) {
            return Err(TemplateError::InvalidPrefix);
        }
        (name, Modifier::Prefix(len))
    } else {
        (spec, Modifier::None)
    };

    if name.is_empty() {
        return Err(TemplateError::EmptyVariable);
    }
    for c in name.chars() {
        if !(c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '%') {
            return Err(TemplateError::InvalidVariableChar(c));
        }
    }
    Ok(VarSpec {
        name: name.to_string(),
        modifier,
    })
}

fn encode(value: &str, operator: Operator) -> String {
    if operator.allows_reserved() {
        // Pass existing percent-triplets through untouched.
        let mut out = String::with_capacity(value.len());
        let bytes = value.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                if i + 2 < bytes.len()
                    && bytes[i + 1].is_ascii_hexdigit()
                    && bytes[i + 2].is_ascii_hexdigit()
                {
                    out.push_str(&value[i..i + 3]);
                    i += 3;
                } else {
                    out.push_str("%25");
                    i += 1;
                }
            } else {
                let ch = &value[i..];
                let c = ch.chars().next().unwrap_or('\u{fffd}');
                let mut buf = [0u8; 4];
                let encoded = utf8_percent_encode(c.encode_utf8(&mut buf), RESERVED_ENCODE);
                out.extend(encoded);
                i += c.len_utf8();
            }
        }
        out
    } else {
        utf8_percent_encode(value, UNRESERVED_ENCODE).to_string()
    }
}

fn truncate(value: &str, modifier: Modifier) -> String {
    match modifier {
        Modifier::Prefix(n) => value.chars().take(n).collect(),
        _ => value.to_string(),
    }
}

/// Expand one varspec value without operator prefix/naming.
fn expand_single(value: &TemplateValue, modifier: Modifier, operator: Operator) -> String {
    match value {
        TemplateValue::String(s) => encode(&truncate(s, modifier), operator),
        TemplateValue::List(items) => {
            let sep = if modifier == Modifier::Explode { operator.separator() } else { "," };
            items
                .iter()
                .map(|i| encode(i, operator))
                .collect::<Vec<_>>()
                .join(sep)
        }
        TemplateValue::Assoc(pairs) => {
            let (pair_sep, kv_sep) = if modifier == Modifier::Explode {
                (operator.separator(), "=")
            } else {
                (",", ",")
            };
            pairs
                .iter()
                .map(|(k, v)| format!("{}{}{}", encode(k, operator), kv_sep, encode(v, operator)))
                .collect::<Vec<_>>()
                .join(pair_sep)
        }
    }
}

fn expand_expression(
    out: &mut String,
    operator: Operator,
    varspecs: &[VarSpec],
    vars: &HashMap<String, TemplateValue>,
) {
    let mut parts: Vec<String> = Vec::new();
    for varspec in varspecs {
        let Some(value) = vars.get(&varspec.name) else { continue };

        if operator.named() {
            if varspec.modifier == Modifier::Explode {
                match value {
                    TemplateValue::Assoc(pairs) => {
                        for (k, v) in pairs {
                            parts.push(format!("{}={}", encode(k, operator), encode(v, operator)));
                        }
                    }
                    TemplateValue::List(items) => {
                        for item in items {
                            parts.push(format!("{}={}", varspec.name, encode(item, operator)));
                        }
                    }
                    TemplateValue::String(s) => {
                        parts.push(format!("{}={}", varspec.name, encode(s, operator)));
                    }
                }
            } else if value.is_empty() {
                parts.push(format!("{}{}", varspec.name, operator.if_empty()));
            } else {
                parts.push(format!(
                    "{}={}",
                    varspec.name,
                    expand_single(value, varspec.modifier, operator)
                ));
            }
        } else if varspec.modifier == Modifier::Explode {
            // Unnamed explode: items joined by the operator separator.
            parts.push(expand_single(value, varspec.modifier, operator));
        } else {
            parts.push(expand_single(value, varspec.modifier, operator));
        }
    }

    if parts.is_empty() {
        return;
    }
    out.push_str(operator.first());
    out.push_str(&parts.join(operator.separator()));
}

/// Anchored regex matching the path part, one capture group per
/// variable bound segment-non-greedily. Returns the regex together
/// with the variable names in group order.
fn build_match_regex(path: &[Component]) -> (Regex, Vec<String>) {
    let mut pattern = String::from("^");
    let mut names = Vec::new();
    for component in path {
        match component {
            Component::Literal(text) => pattern.push_str(&regex::escape(text)),
            Component::Expression { operator, varspecs } => {
                let prefix = operator.first();
                if !prefix.is_empty() {
                    pattern.push_str(&regex::escape(prefix));
                }
                let stop = match operator {
                    Operator::Label => r"[^/?#.]",
                    Operator::PathParam => r"[^/?#;]",
                    _ => r"[^/?#]",
                };
                for (i, varspec) in varspecs.iter().enumerate() {
                    if i > 0 {
                        pattern.push_str(&regex::escape(operator.separator()));
                    }
                    if operator.named() {
                        pattern.push_str(&regex::escape(&varspec.name));
                        pattern.push('=');
                    }
                    pattern.push_str(&format!("({stop}+?)"));
                    names.push(varspec.name.clone());
                }
            }
        }
    }
    pattern.push('$');
    // The pattern is built from validated components; compilation cannot fail.
    let regex = Regex::new(&pattern).unwrap_or_else(|_| Regex::new("^$").expect("empty regex"));
    (regex, names)
}

fn percent_decode(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8()
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}
