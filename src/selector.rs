//! XPath-subset selectors
//!
//! Supported dialect:
//! - steps: `name`, `*`, `.`, `..`, `text()`, `node()`
//! - separators: `a/b` (child), `a//b` (descendant), leading `/` or `//`
//! - predicates: `[name]`, `[name='v']`, `[@attr]`, `[@attr='v']`,
//!   `[text()='v']`, `[.='v']`, `!=`, `[2]`, `[last()]`, `and`, `or`, `( )`
//!
//! A selector that does not start with `/` or `.` is "bare". Bare selectors
//! resolve their first step among all descendants in search mode (and for
//! first-match lookups), and among children in strict mode.

use serde::Deserialize;

use crate::document::Node;
use crate::error::{Error, Result};

/// How `many` selectors are resolved against the context node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorMode {
    /// First step matches any descendant
    #[default]
    Search,
    /// Plain relative path evaluation
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    SelfNode,
    Parent,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    AnyElement,
    Text,
    AnyNode,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    Position(usize),
    Last,
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Exists(Operand),
    Compare {
        operand: Operand,
        negated: bool,
        literal: Literal,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Attribute(String),
    Text,
    Context,
    Path(Path),
}

#[derive(Debug, Clone, PartialEq)]
struct Literal {
    text: String,
    number: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
struct Path {
    absolute: bool,
    bare: bool,
    steps: Vec<Step>,
}

/// A compiled selector
#[derive(Debug, Clone)]
pub struct Selector {
    source: String,
    path: Path,
}

impl PartialEq for Selector {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Selector {
    /// Compile a selector string. The empty string selects the context node.
    pub fn parse(source: &str) -> Result<Selector> {
        let mut parser = Parser::new(source.trim());
        let path = if parser.at_end() {
            Path {
                absolute: false,
                bare: false,
                steps: vec![],
            }
        } else {
            parser.parse_path()?
        };
        parser.skip_ws();
        if !parser.at_end() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Selector {
            source: source.to_string(),
            path,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the selector resolves to the context node itself
    pub fn is_empty(&self) -> bool {
        !self.path.absolute && self.path.steps.is_empty()
    }

    /// All matches in document order
    pub fn select(&self, node: &Node, mode: SelectorMode) -> Vec<Node> {
        self.path.evaluate(node, mode == SelectorMode::Search)
    }

    /// First match in document order, bare selectors searched among descendants
    pub fn first(&self, node: &Node) -> Option<Node> {
        self.path.evaluate(node, true).into_iter().next()
    }
}

impl Path {
    fn evaluate(&self, node: &Node, search: bool) -> Vec<Node> {
        let start = if self.absolute {
            node.document().root()
        } else {
            node.clone()
        };

        let mut current = vec![start];
        for (index, step) in self.steps.iter().enumerate() {
            let axis = if index == 0 && self.bare && search {
                Axis::Descendant
            } else {
                step.axis
            };

            let mut next = Vec::new();
            for context in &current {
                step.apply(axis, context, &mut next);
            }
            next.sort_by_key(Node::order);
            next.dedup();
            current = next;

            if current.is_empty() {
                break;
            }
        }
        current
    }
}

impl Step {
    fn apply(&self, axis: Axis, context: &Node, out: &mut Vec<Node>) {
        match axis {
            Axis::Child => self.filter(context.children().collect(), out),
            Axis::Descendant => {
                // descendant-or-self::node()/child::test, grouped per parent so
                // positional predicates count siblings
                self.filter(context.children().collect(), out);
                for descendant in context.descendants() {
                    self.filter(descendant.children().collect(), out);
                }
            }
            Axis::SelfNode => self.filter(vec![context.clone()], out),
            Axis::Parent => self.filter(context.parent().into_iter().collect(), out),
        }
    }

    fn filter(&self, candidates: Vec<Node>, out: &mut Vec<Node>) {
        let mut matched: Vec<Node> = candidates
            .into_iter()
            .filter(|n| self.test.matches(n))
            .collect();

        for predicate in &self.predicates {
            let size = matched.len();
            matched = matched
                .into_iter()
                .enumerate()
                .filter(|(i, n)| predicate.matches(n, i + 1, size))
                .map(|(_, n)| n)
                .collect();
        }

        out.extend(matched);
    }
}

impl NodeTest {
    fn matches(&self, node: &Node) -> bool {
        match self {
            NodeTest::Name(name) => node.is_element() && node.tag_name() == name,
            NodeTest::AnyElement => node.is_element(),
            NodeTest::Text => node.is_text(),
            NodeTest::AnyNode => true,
        }
    }
}

impl Predicate {
    fn matches(&self, node: &Node, position: usize, size: usize) -> bool {
        match self {
            Predicate::Position(n) => position == *n,
            Predicate::Last => position == size,
            Predicate::Expr(expr) => expr.matches(node),
        }
    }
}

impl Expr {
    fn matches(&self, node: &Node) -> bool {
        match self {
            Expr::Or(a, b) => a.matches(node) || b.matches(node),
            Expr::And(a, b) => a.matches(node) && b.matches(node),
            Expr::Exists(operand) => !operand.values(node).is_empty(),
            Expr::Compare {
                operand,
                negated,
                literal,
            } => operand
                .values(node)
                .iter()
                .any(|value| literal.equals(value) != *negated),
        }
    }
}

impl Operand {
    fn values(&self, node: &Node) -> Vec<String> {
        match self {
            Operand::Attribute(name) => node.attribute(name).map(String::from).into_iter().collect(),
            Operand::Text => node
                .children()
                .filter(Node::is_text)
                .map(|n| n.inner_text())
                .collect(),
            Operand::Context => vec![node.inner_text()],
            Operand::Path(path) => path
                .evaluate(node, false)
                .iter()
                .map(Node::inner_text)
                .collect(),
        }
    }
}

impl Literal {
    fn equals(&self, value: &str) -> bool {
        match self.number {
            Some(number) => value.trim().parse::<f64>().is_ok_and(|v| v == number),
            None => value == self.text,
        }
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::selector(self.source, format!("{} at offset {}", message, self.pos))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        let mut i = self.pos;
        for c in s.chars() {
            if self.chars.get(i) != Some(&c) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.starts_with(s) {
            self.pos += s.chars().count();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, s: &str) -> Result<()> {
        self.skip_ws();
        if self.eat(s) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {:?}", s)))
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// Keyword followed by something that cannot continue a name
    fn eat_word(&mut self, word: &str) -> bool {
        self.skip_ws();
        if !self.starts_with(word) {
            return false;
        }
        let after = self.chars.get(self.pos + word.chars().count()).copied();
        if after.is_some_and(is_name_char) {
            return false;
        }
        self.pos += word.chars().count();
        true
    }

    fn parse_name(&mut self) -> Option<String> {
        let start = self.pos;
        if !self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return None;
        }
        while self.peek().is_some_and(is_name_char) {
            self.pos += 1;
        }
        Some(self.chars[start..self.pos].iter().collect())
    }

    fn parse_path(&mut self) -> Result<Path> {
        self.skip_ws();
        let mut absolute = false;
        let mut axis = Axis::Child;
        if self.eat("//") {
            absolute = true;
            axis = Axis::Descendant;
        } else if self.eat("/") {
            absolute = true;
            if self.at_end() || self.peek() == Some(']') {
                return Ok(Path {
                    absolute,
                    bare: false,
                    steps: vec![],
                });
            }
        }
        let bare = !absolute && self.peek() != Some('.');

        let mut steps = Vec::new();
        loop {
            steps.push(self.parse_step(axis)?);
            if self.eat("//") {
                axis = Axis::Descendant;
            } else if self.eat("/") {
                axis = Axis::Child;
            } else {
                break;
            }
        }

        Ok(Path {
            absolute,
            bare,
            steps,
        })
    }

    fn parse_step(&mut self, axis: Axis) -> Result<Step> {
        let (axis, test) = if self.eat("..") {
            (Axis::Parent, NodeTest::AnyNode)
        } else if self.eat(".") {
            (Axis::SelfNode, NodeTest::AnyNode)
        } else if self.eat("*") {
            (axis, NodeTest::AnyElement)
        } else if let Some(name) = self.parse_name() {
            if self.eat("(") {
                self.expect(")")?;
                match name.as_str() {
                    "text" => (axis, NodeTest::Text),
                    "node" => (axis, NodeTest::AnyNode),
                    _ => return Err(self.error(&format!("unsupported function {}()", name))),
                }
            } else {
                (axis, NodeTest::Name(name))
            }
        } else {
            return Err(self.error("expected a step"));
        };

        let mut predicates = Vec::new();
        while self.eat("[") {
            predicates.push(self.parse_predicate()?);
            self.expect("]")?;
        }

        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_predicate(&mut self) -> Result<Predicate> {
        self.skip_ws();
        if self.peek().is_some_and(|c| c.is_ascii_digit()) {
            let position = self.parse_number_text();
            return match position.parse::<usize>() {
                Ok(n) if n >= 1 => Ok(Predicate::Position(n)),
                _ => Err(self.error("positions start at 1")),
            };
        }
        if self.eat("last()") {
            return Ok(Predicate::Last);
        }
        Ok(Predicate::Expr(self.parse_or()?))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_word("or") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_comparison()?;
        while self.eat_word("and") {
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        self.skip_ws();
        if self.eat("(") {
            let inner = self.parse_or()?;
            self.expect(")")?;
            return Ok(inner);
        }

        let operand = self.parse_operand()?;
        self.skip_ws();
        let negated = if self.eat("!=") {
            true
        } else if self.eat("=") {
            false
        } else {
            return Ok(Expr::Exists(operand));
        };

        Ok(Expr::Compare {
            operand,
            negated,
            literal: self.parse_literal()?,
        })
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        if self.eat("@") {
            return self
                .parse_name()
                .map(Operand::Attribute)
                .ok_or_else(|| self.error("expected an attribute name"));
        }
        if self.eat("text()") {
            return Ok(Operand::Text);
        }
        if self.starts_with(".") && !self.starts_with("..") && !self.starts_with("./") {
            self.pos += 1;
            return Ok(Operand::Context);
        }
        let mut path = self.parse_path()?;
        path.bare = false;
        Ok(Operand::Path(path))
    }

    fn parse_literal(&mut self) -> Result<Literal> {
        self.skip_ws();
        match self.peek() {
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                if self.at_end() {
                    return Err(self.error("unterminated string literal"));
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                Ok(Literal { text, number: None })
            }
            Some(c) if c.is_ascii_digit() || c == '-' => {
                let text = self.parse_number_text();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| self.error("invalid number literal"))?;
                Ok(Literal {
                    text,
                    number: Some(number),
                })
            }
            _ => Err(self.error("expected a literal")),
        }
    }

    fn parse_number_text(&mut self) -> String {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

/// Join scope prefixes and a selector with `/`, skipping empty parts. A
/// leading `/` or `//` on the first part is kept.
pub fn join_path<S: AsRef<str>>(parts: &[S]) -> String {
    let mut joined = String::new();
    for part in parts.iter().map(AsRef::as_ref) {
        if joined.is_empty() {
            joined.push_str(part.trim_end_matches('/'));
            continue;
        }
        let part = part.trim_matches('/');
        if !part.is_empty() {
            joined.push('/');
            joined.push_str(part);
        }
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    fn album() -> Document {
        Document::parse_xml(
            r#"<album>
                <title>Black on Both Sides</title>
                <rights><country>DE</country></rights>
                <tracks>
                    <track code="1234"><title>Fear Not of Man</title><n>1</n></track>
                    <track code="2345"><title>Hip Hop</title><n>2</n>
                        <not_streamable_in><country>de</country></not_streamable_in>
                    </track>
                </tracks>
            </album>"#,
        )
        .unwrap()
    }

    fn texts(nodes: &[Node]) -> Vec<String> {
        nodes.iter().map(|n| n.inner_text()).collect()
    }

    #[test]
    fn test_search_mode_matches_descendants() {
        let doc = album();
        let sel = Selector::parse("tracks/track").unwrap();
        assert_eq!(sel.select(&doc.root(), SelectorMode::Search).len(), 2);
        assert!(sel.select(&doc.root(), SelectorMode::Strict).is_empty());

        let strict = Selector::parse("album/tracks/track").unwrap();
        assert_eq!(strict.select(&doc.root(), SelectorMode::Strict).len(), 2);
    }

    #[test]
    fn test_first_is_document_order() {
        let doc = album();
        let first = Selector::parse("title").unwrap().first(&doc.root()).unwrap();
        assert_eq!(first.inner_text(), "Black on Both Sides");

        let tracks = Selector::parse("tracks/track")
            .unwrap()
            .select(&doc.root(), SelectorMode::Search);
        let title = Selector::parse("title").unwrap().first(&tracks[1]).unwrap();
        assert_eq!(title.inner_text(), "Hip Hop");
    }

    #[test]
    fn test_predicates() {
        let doc = album();
        let root = doc.root();
        let first = |s: &str| Selector::parse(s).unwrap().first(&root);

        assert!(first("rights[country='DE']").is_some());
        assert!(first("rights[country='FR']").is_none());
        assert!(first("rights[country!='FR']").is_some());
        assert_eq!(first("track[@code='2345']/n").unwrap().inner_text(), "2");
        assert!(first("track[@missing]").is_none());
        assert!(first("not_streamable_in/country[text()='de']").is_some());
        assert_eq!(first("track[2]/title").unwrap().inner_text(), "Hip Hop");
        assert_eq!(first("track[last()]/n").unwrap().inner_text(), "2");
        assert_eq!(first("track[n=1]/title").unwrap().inner_text(), "Fear Not of Man");
        assert!(first("track[@code='1234' and n=2]").is_none());
        assert!(first("track[@code='1234' or n=2]").is_some());
        assert!(first("country[.='de']").is_some());
    }

    #[test]
    fn test_wildcard_parent_and_absolute() {
        let doc = album();
        let root = doc.root();
        let children = Selector::parse("/album/*")
            .unwrap()
            .select(&root, SelectorMode::Strict);
        assert_eq!(children.len(), 3);

        let title = Selector::parse("//track/title").unwrap().select(&root, SelectorMode::Strict);
        assert_eq!(texts(&title), vec!["Fear Not of Man", "Hip Hop"]);

        let n = Selector::parse("n").unwrap().first(&root).unwrap();
        let parent = Selector::parse("..").unwrap().first(&n).unwrap();
        assert_eq!(parent.tag_name(), "track");
        assert_eq!(Selector::parse(".").unwrap().first(&n).unwrap(), n);
    }

    #[test]
    fn test_empty_selector_is_context() {
        let doc = album();
        let sel = Selector::parse("").unwrap();
        assert!(sel.is_empty());
        assert_eq!(sel.first(&doc.root()), Some(doc.root()));
    }

    #[test]
    fn test_text_step() {
        let doc = Document::parse_xml("<a><b>x</b><b>y</b></a>").unwrap();
        let nodes = Selector::parse("b/text()")
            .unwrap()
            .select(&doc.root(), SelectorMode::Search);
        assert_eq!(texts(&nodes), vec!["x", "y"]);
    }

    #[test]
    fn test_invalid_selectors() {
        for bad in ["a[", "a[0]", "a/", "foo()", "a]", "a[@]", "a[b='x]"] {
            assert!(
                matches!(Selector::parse(bad), Err(Error::Selector { .. })),
                "{} should not compile",
                bad
            );
        }
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(&["contributions", "artist", "name"]), "contributions/artist/name");
        assert_eq!(join_path(&["artist", ""]), "artist");
        assert_eq!(join_path::<&str>(&[]), "");
        assert_eq!(join_path(&["/album", "title"]), "/album/title");
        assert_eq!(join_path(&["", "tracks/", "/track"]), "tracks/track");
    }
}
