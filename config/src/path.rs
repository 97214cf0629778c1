use crate::error::ConfigError;
use crate::schema::normalize_id;
use smallvec::SmallVec;

/// The query key that selects into an array by 1-based position.
pub const POSITION: &str = "position()";

/// One path segment: a child name plus an optional query. An empty query
/// means plain struct-child selection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathSegment {
    /// Normalized child name.
    pub name: String,
    /// Query pairs `(key field, literal)`, empty for no query.
    pub query: Vec<(String, String)>,
}

impl PathSegment {
    /// True when the segment carries a query.
    pub fn has_query(&self) -> bool {
        !self.query.is_empty()
    }
}

/// A parsed schema path. `/` is the empty (root) path.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Path {
    segments: SmallVec<[PathSegment; 4]>,
}

impl Path {
    /// Parses the textual form
    /// `/name/name[key=value]/name[position()=3]`. Duplicate slashes
    /// collapse; query values may be double-quoted to contain `]`.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut chars = text.chars().peekable();
        if chars.peek() != Some(&'/') {
            return Err(ConfigError::PathSyntax(format!(
                "path must start with '/': {text:?}"
            )));
        }
        let mut segments = SmallVec::new();
        while chars.peek().is_some() {
            while chars.peek() == Some(&'/') {
                chars.next();
            }
            if chars.peek().is_none() {
                break;
            }
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if c == '/' || c == '[' {
                    break;
                }
                if c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':' {
                    name.push(c);
                    chars.next();
                } else {
                    return Err(ConfigError::PathSyntax(format!(
                        "unexpected {c:?} in {text:?}"
                    )));
                }
            }
            if name.is_empty() {
                return Err(ConfigError::PathSyntax(format!(
                    "empty segment name in {text:?}"
                )));
            }
            let mut query = Vec::new();
            while chars.peek() == Some(&'[') {
                chars.next();
                let mut key = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '=' {
                        break;
                    }
                    if c == ']' {
                        return Err(ConfigError::PathSyntax(format!(
                            "query without value in {text:?}"
                        )));
                    }
                    key.push(c);
                    chars.next();
                }
                if chars.next() != Some('=') || key.is_empty() {
                    return Err(ConfigError::PathSyntax(format!(
                        "malformed query in {text:?}"
                    )));
                }
                let mut value = String::new();
                if chars.peek() == Some(&'"') {
                    chars.next();
                    loop {
                        match chars.next() {
                            Some('"') => break,
                            Some('\\') => match chars.next() {
                                Some(c) => value.push(c),
                                None => {
                                    return Err(ConfigError::PathSyntax(format!(
                                        "unterminated escape in {text:?}"
                                    )))
                                }
                            },
                            Some(c) => value.push(c),
                            None => {
                                return Err(ConfigError::PathSyntax(format!(
                                    "unterminated string in {text:?}"
                                )))
                            }
                        }
                    }
                } else {
                    while let Some(&c) = chars.peek() {
                        if c == ']' {
                            break;
                        }
                        value.push(c);
                        chars.next();
                    }
                }
                if chars.next() != Some(']') {
                    return Err(ConfigError::PathSyntax(format!(
                        "unterminated query in {text:?}"
                    )));
                }
                let key = if key == POSITION {
                    key
                } else {
                    normalize_id(&key)
                };
                query.push((key, value));
            }
            query.sort_by(|a, b| a.0.cmp(&b.0));
            segments.push(PathSegment {
                name: normalize_id(&name),
                query,
            });
        }
        Ok(Self { segments })
    }

    /// The segments in order.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// True for the root path `/`.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Splits into all-but-last and last segment; `None` for the root.
    pub fn split_last(&self) -> Option<(&[PathSegment], &PathSegment)> {
        self.segments.split_last().map(|(last, init)| (init, last))
    }
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value
            .chars()
            .any(|c| c == ']' || c == '"' || c == '/' || c.is_whitespace())
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for seg in &self.segments {
            write!(f, "/{}", seg.name)?;
            for (key, value) in &seg.query {
                if needs_quoting(value) {
                    write!(f, "[{key}=\"{}\"]", value.replace('\\', "\\\\").replace('"', "\\\""))?;
                } else {
                    write!(f, "[{key}={value}]")?;
                }
            }
        }
        Ok(())
    }
}

/// Re-prints a path in canonical form: collapsed slashes, normalized
/// identifiers, query pairs ordered by key.
pub fn normalize_path(text: &str) -> Result<String, ConfigError> {
    Path::parse(text).map(|p| p.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_root() {
        assert!(Path::parse("/").unwrap().is_root());
        assert!(Path::parse("//").unwrap().is_root());
        assert!(Path::parse("").is_err());
        assert!(Path::parse("relative/path").is_err());
    }

    #[test]
    fn parse_segments_and_queries() {
        let path = Path::parse("/routes/route[dst=10.0.0.0][len=8]/next-hop").unwrap();
        let segs = path.segments();
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0].name, "routes");
        assert_eq!(segs[1].name, "route");
        assert_eq!(
            segs[1].query,
            vec![
                ("dst".to_string(), "10.0.0.0".to_string()),
                ("len".to_string(), "8".to_string())
            ]
        );
        assert_eq!(segs[2].name, "next_hop");
        assert!(!segs[2].has_query());
    }

    #[test]
    fn position_query() {
        let path = Path::parse("/ports/port[position()=3]").unwrap();
        assert_eq!(
            path.segments()[1].query,
            vec![(POSITION.to_string(), "3".to_string())]
        );
    }

    #[test]
    fn quoted_values() {
        let path = Path::parse(r#"/t/e[name="a ]b\"c"]"#).unwrap();
        assert_eq!(path.segments()[1].query[0].1, "a ]b\"c");
    }

    #[test]
    fn normalization() {
        assert_eq!(
            normalize_path("//a//b[z=1][a=2]").unwrap(),
            "/a/b[a=2][z=1]"
        );
        assert_eq!(normalize_path("/next-hop").unwrap(), "/next_hop");
        assert_eq!(
            normalize_path(r#"/t/e[k=has space]"#).unwrap(),
            r#"/t/e[k="has space"]"#
        );
    }

    #[test]
    fn display_roundtrip() {
        for text in ["/", "/a", "/a/b[k=v]", r#"/a[k="x]y"]"#, "/p[position()=1]"] {
            let parsed = Path::parse(text).unwrap();
            let printed = parsed.to_string();
            assert_eq!(Path::parse(&printed).unwrap(), parsed);
        }
    }
}
