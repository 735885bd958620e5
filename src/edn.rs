//! The textual notation requests and queries are written in.
//!
//! A small subset of EDN: `nil`, booleans, integers, floats, strings,
//! `:keywords`, symbols, `[vectors]`, `(lists)` and `{maps}`. Vectors and
//! lists both read as [`Datum::List`]. Map entries keep the order they were
//! written in.
use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::Pair;
use pest_derive::Parser;
use std::fmt;

use crate::construct::EntityId;
use crate::datatype::Value;
use crate::error::{GraphiteError, Result};

#[derive(Parser)]
#[grammar = "edn.pest"]
struct NotationParser;

#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// Stored without the leading colon.
    Keyword(String),
    Symbol(String),
    Bytes(Vec<u8>),
    Entity(EntityId),
    List(Vec<Datum>),
    Map(Vec<(Datum, Datum)>),
}

impl Datum {
    pub fn keyword(name: &str) -> Datum {
        Datum::Keyword(name.strip_prefix(':').unwrap_or(name).to_owned())
    }
    pub fn symbol(name: &str) -> Datum {
        Datum::Symbol(name.to_owned())
    }
    pub fn text(s: &str) -> Datum {
        Datum::Text(s.to_owned())
    }
    pub fn list(items: impl IntoIterator<Item = Datum>) -> Datum {
        Datum::List(items.into_iter().collect())
    }
    pub fn map(entries: impl IntoIterator<Item = (Datum, Datum)>) -> Datum {
        Datum::Map(entries.into_iter().collect())
    }
    /// The symbolic name a keyword or string stands for; keywords get their colon back.
    pub fn as_name(&self) -> Option<String> {
        match self {
            Datum::Keyword(k) => Some(format!(":{k}")),
            Datum::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
    pub fn as_list(&self) -> Option<&[Datum]> {
        match self {
            Datum::List(items) => Some(items),
            _ => None,
        }
    }
    /// Looks up a map entry by the name of its key.
    pub fn get(&self, name: &str) -> Option<&Datum> {
        match self {
            Datum::Map(entries) => entries
                .iter()
                .find(|(key, _)| key.as_name().as_deref() == Some(name))
                .map(|(_, value)| value),
            _ => None,
        }
    }
    /// Converts a scalar into something an atom can hold. Keywords are kept
    /// as their full name and symbols as plain text.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Datum::Boolean(b) => Some(Value::Boolean(*b)),
            Datum::Integer(i) => Some(Value::Integer(*i)),
            Datum::Float(x) => Some(Value::Float(*x)),
            Datum::Text(s) => Some(Value::Text(s.clone())),
            Datum::Keyword(k) => Some(Value::Text(format!(":{k}"))),
            Datum::Symbol(s) => Some(Value::Text(s.clone())),
            Datum::Bytes(b) => Some(Value::Bytes(b.clone())),
            Datum::Entity(e) => Some(Value::Ref(*e)),
            Datum::Nil | Datum::List(_) | Datum::Map(_) => None,
        }
    }
    pub fn from_json(json: &serde_json::Value) -> Datum {
        use serde_json::Value as Json;
        match json {
            Json::Null => Datum::Nil,
            Json::Bool(b) => Datum::Boolean(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Datum::Integer(i),
                None => Datum::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Datum::Text(s.clone()),
            Json::Array(items) => Datum::List(items.iter().map(Datum::from_json).collect()),
            Json::Object(entries) => Datum::Map(
                entries
                    .iter()
                    .map(|(k, v)| (Datum::Text(k.clone()), Datum::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Datum::Nil => write!(f, "nil"),
            Datum::Boolean(b) => write!(f, "{b}"),
            Datum::Integer(i) => write!(f, "{i}"),
            Datum::Float(x) => write!(f, "{x:?}"),
            Datum::Text(s) => write!(f, "{s:?}"),
            Datum::Keyword(k) => write!(f, ":{k}"),
            Datum::Symbol(s) => write!(f, "{s}"),
            Datum::Bytes(b) => write!(f, "{}", Value::Bytes(b.clone())),
            Datum::Entity(e) => write!(f, "#{e}"),
            Datum::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Datum::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{key} {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<&str> for Datum {
    fn from(s: &str) -> Self {
        Datum::text(s)
    }
}
impl From<i64> for Datum {
    fn from(i: i64) -> Self {
        Datum::Integer(i)
    }
}

/// Parses a single form.
pub fn parse(text: &str) -> Result<Datum> {
    let mut pairs = NotationParser::parse(Rule::notation, text).map_err(|e| {
        let (line, col) = match e.line_col {
            LineColLocation::Pos((line, col)) => (line, col),
            LineColLocation::Span((line, col), _) => (line, col),
        };
        GraphiteError::Parse {
            message: e.variant.message().to_string(),
            line: Some(line),
            col: Some(col),
        }
    })?;
    let form = pairs
        .next()
        .and_then(|notation| notation.into_inner().next())
        .ok_or_else(|| GraphiteError::Parse {
            message: "expected a form".to_string(),
            line: None,
            col: None,
        })?;
    build(form)
}

fn build(pair: Pair<Rule>) -> Result<Datum> {
    let datum = match pair.as_rule() {
        Rule::nil => Datum::Nil,
        Rule::boolean => Datum::Boolean(pair.as_str() == "true"),
        Rule::integer => Datum::Integer(pair.as_str().parse().map_err(|_| malformed(&pair))?),
        Rule::float => Datum::Float(pair.as_str().parse().map_err(|_| malformed(&pair))?),
        Rule::string => Datum::Text(unescape(
            pair.into_inner().next().map(|text| text.as_str()).unwrap_or_default(),
        )),
        Rule::keyword => Datum::keyword(pair.as_str()),
        Rule::symbol => Datum::Symbol(pair.as_str().to_owned()),
        Rule::vector | Rule::list => {
            Datum::List(pair.into_inner().map(build).collect::<Result<_>>()?)
        }
        Rule::map => {
            let mut entries = Vec::new();
            let mut forms = pair.into_inner();
            while let (Some(key), Some(value)) = (forms.next(), forms.next()) {
                entries.push((build(key)?, build(value)?));
            }
            Datum::Map(entries)
        }
        _ => return Err(malformed(&pair)),
    };
    Ok(datum)
}

fn malformed(pair: &Pair<Rule>) -> GraphiteError {
    let (line, col) = pair.line_col();
    GraphiteError::Parse {
        message: format!("malformed {:?} '{}'", pair.as_rule(), pair.as_str()),
        line: Some(line),
        col: Some(col),
    }
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_a_transaction_request() {
        let datum = parse(
            r#"{:tx-data [{:movie/title "Commando" :movie/release-year 1985}
                          [:db.operation/assert "gb" :movie/genre "action/adventure"]]}"#,
        )
        .expect("parse");
        let data = datum.get(":tx-data").and_then(Datum::as_list).expect("tx-data");
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].get(":movie/release-year"), Some(&Datum::Integer(1985)));
        assert_eq!(
            data[1].as_list().map(|tuple| tuple[0].clone()),
            Some(Datum::keyword(":db.operation/assert"))
        );
    }

    #[test]
    fn reads_scalars() {
        assert_eq!(parse("nil").expect("nil"), Datum::Nil);
        assert_eq!(parse("false").expect("bool"), Datum::Boolean(false));
        assert_eq!(parse("-12").expect("int"), Datum::Integer(-12));
        assert_eq!(parse("2.5").expect("float"), Datum::Float(2.5));
        assert_eq!(parse(r#""say \"hi\"""#).expect("text"), Datum::text("say \"hi\""));
        assert_eq!(parse("?title").expect("symbol"), Datum::symbol("?title"));
        assert_eq!(parse("nilly").expect("symbol"), Datum::symbol("nilly"));
        assert_eq!(parse("_").expect("symbol"), Datum::symbol("_"));
    }

    #[test]
    fn commas_and_comments_are_whitespace() {
        let datum = parse("[1, 2 ; two\n 3]").expect("parse");
        assert_eq!(
            datum,
            Datum::list([Datum::Integer(1), Datum::Integer(2), Datum::Integer(3)])
        );
    }

    #[test]
    fn keywords_keep_their_colon_as_names() {
        let datum = parse(":db.cardinality/one").expect("parse");
        assert_eq!(datum.as_name().as_deref(), Some(":db.cardinality/one"));
        assert_eq!(datum.to_value(), Some(Value::Text(":db.cardinality/one".into())));
    }

    #[test]
    fn reports_where_parsing_failed() {
        match parse("{:find [?t]\n :where [[?e :movie/title ?t]}") {
            Err(GraphiteError::Parse { line, .. }) => assert_eq!(line, Some(2)),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }
}
