//! Token-level statement splitter.

use serde::Serialize;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer};

use super::{SqlDialect, SyntaxError};

/// Kind of routine recognized from a `CREATE` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RoutineKind {
    Procedure,
    Function,
    Event,
    Trigger
}

impl RoutineKind {
    fn from_word(word: &str) -> Option<Self> {
        match word.to_ascii_uppercase().as_str() {
            "PROCEDURE" => Some(Self::Procedure),
            "FUNCTION" => Some(Self::Function),
            "EVENT" => Some(Self::Event),
            "TRIGGER" => Some(Self::Trigger),
            _ => None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Procedure => "PROCEDURE",
            Self::Function => "FUNCTION",
            Self::Event => "EVENT",
            Self::Trigger => "TRIGGER"
        }
    }
}

/// `CREATE PROCEDURE | FUNCTION | EVENT | TRIGGER` statement reduced to its
/// header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutineDefinition {
    pub kind:  RoutineKind,
    /// Routine name as written, without quotes
    pub name:  String,
    /// Table a trigger is attached to
    pub table: Option<String>
}

/// One statement's worth of script text.
#[derive(Debug)]
pub(crate) struct Chunk {
    pub text:          String,
    pub base_line:     u64,
    pub column_offset: u64,
    pub routine:       Option<RoutineDefinition>
}

/// Byte offsets of line starts, for mapping tokenizer locations back to
/// the source text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// Byte offset of a 1-based line/column location.
    pub fn offset(&self, source: &str, location: Location) -> usize {
        let line = (location.line.max(1) - 1) as usize;
        let Some(&start) = self.starts.get(line) else {
            return source.len();
        };
        let end = self
            .starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(source.len());
        let column = location.column.max(1) as usize - 1;
        source[start..end]
            .char_indices()
            .nth(column)
            .map(|(i, _)| start + i)
            .unwrap_or(end)
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }
}

/// Split a script on top-level semicolons.
pub(crate) fn split_script(sql: &str, dialect: SqlDialect) -> Result<Vec<Chunk>, SyntaxError> {
    let parser_dialect = dialect.into_parser_dialect();
    let tokens = Tokenizer::new(parser_dialect.as_ref(), sql)
        .tokenize_with_location()
        .map_err(|e| SyntaxError::from_parser_message(&e.to_string(), 0, 0))?;
    let significant: Vec<&TokenWithSpan> = tokens
        .iter()
        .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
        .collect();

    let index = LineIndex::new(sql);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut blocks = BlockTracker::default();
    let mut routine: Option<RoutineKind> = None;

    for i in 0..significant.len() {
        let token = &significant[i].token;
        if *token == Token::SemiColon && blocks.is_closed() {
            if i > start {
                chunks.push(make_chunk(sql, &index, &significant[start..i], routine));
            }
            start = i + 1;
            routine = None;
            blocks = BlockTracker::default();
            continue;
        }
        if i == start {
            routine = detect_routine(&significant[start..]);
        }
        if routine.is_some() {
            blocks.observe(&significant, i);
        }
    }
    if start < significant.len() {
        chunks.push(make_chunk(sql, &index, &significant[start..], routine));
    }
    Ok(chunks)
}

fn make_chunk(
    sql: &str,
    index: &LineIndex,
    tokens: &[&TokenWithSpan],
    routine: Option<RoutineKind>
) -> Chunk {
    let first = tokens[0].span.start;
    let last = tokens[tokens.len() - 1].span.end;
    let text = sql[index.offset(sql, first)..index.offset(sql, last)].to_string();
    Chunk {
        text,
        base_line: first.line.saturating_sub(1),
        column_offset: first.column.saturating_sub(1),
        routine: routine.map(|kind| routine_header(kind, tokens))
    }
}

/// Words that end the search for a routine keyword in a `CREATE` header.
const OBJECT_WORDS: &[&str] = &[
    "TABLE", "VIEW", "INDEX", "DATABASE", "SCHEMA", "USER", "ROLE", "SEQUENCE", "TYPE", "UNIQUE"
];

fn detect_routine(tokens: &[&TokenWithSpan]) -> Option<RoutineKind> {
    let Token::Word(first) = &tokens.first()?.token else {
        return None;
    };
    if !first.value.eq_ignore_ascii_case("CREATE") || tokens.len() < 2 {
        return None;
    }
    for token in &tokens[1..] {
        match &token.token {
            Token::Word(w) if w.quote_style.is_none() => {
                if let Some(kind) = RoutineKind::from_word(&w.value) {
                    return Some(kind);
                }
                if OBJECT_WORDS.iter().any(|o| w.value.eq_ignore_ascii_case(o)) {
                    return None;
                }
            }
            Token::LParen | Token::SemiColon => return None,
            _ => {}
        }
    }
    None
}

fn routine_header(kind: RoutineKind, tokens: &[&TokenWithSpan]) -> RoutineDefinition {
    let keyword_at = tokens
        .iter()
        .position(|t| {
            matches!(&t.token, Token::Word(w) if RoutineKind::from_word(&w.value) == Some(kind))
        })
        .unwrap_or(0);
    let mut rest = &tokens[keyword_at + 1..];
    while let Some(Token::Word(w)) = rest.first().map(|t| &t.token)
        && w.quote_style.is_none()
        && ["IF", "NOT", "EXISTS"]
            .iter()
            .any(|k| w.value.eq_ignore_ascii_case(k))
    {
        rest = &rest[1..];
    }
    let (name, consumed) = read_object_name(rest);
    let table = if kind == RoutineKind::Trigger {
        rest[consumed..]
            .iter()
            .position(|t| matches!(&t.token, Token::Word(w) if w.value.eq_ignore_ascii_case("ON")))
            .map(|on| read_object_name(&rest[consumed + on + 1..]).0)
            .filter(|t| !t.is_empty())
    } else {
        None
    };
    RoutineDefinition { kind, name, table }
}

/// Read a possibly qualified name; returns the last part and the number of
/// tokens consumed.
fn read_object_name(tokens: &[&TokenWithSpan]) -> (String, usize) {
    let mut name = String::new();
    let mut consumed = 0;
    let mut expect_part = true;
    for token in tokens {
        match &token.token {
            Token::Word(w) if expect_part => {
                name = w.value.clone();
                expect_part = false;
            }
            Token::Period if !expect_part => expect_part = true,
            _ => break
        }
        consumed += 1;
    }
    (name, consumed)
}

/// Tracks `BEGIN ... END` nesting inside routine bodies so that inner
/// semicolons do not end the statement.
#[derive(Debug, Default)]
struct BlockTracker {
    depth:      usize,
    case_depth: usize
}

impl BlockTracker {
    fn is_closed(&self) -> bool {
        self.depth == 0
    }

    fn observe(&mut self, tokens: &[&TokenWithSpan], i: usize) {
        let Token::Word(word) = &tokens[i].token else {
            return;
        };
        if word.quote_style.is_some() {
            return;
        }
        let upper = word.value.to_ascii_uppercase();
        match upper.as_str() {
            "BEGIN" => self.depth += 1,
            "CASE" => {
                let after_end = i > 0
                    && matches!(
                        &tokens[i - 1].token,
                        Token::Word(w) if w.value.eq_ignore_ascii_case("END")
                    );
                if !after_end {
                    self.case_depth += 1;
                }
            }
            "END" => {
                let next = tokens.get(i + 1).and_then(|t| match &t.token {
                    Token::Word(w) => Some(w.value.to_ascii_uppercase()),
                    _ => None
                });
                match next.as_deref() {
                    Some("IF" | "LOOP" | "WHILE" | "REPEAT") => {}
                    Some("CASE") => self.case_depth = self.case_depth.saturating_sub(1),
                    _ if self.case_depth > 0 => self.case_depth -= 1,
                    _ => self.depth = self.depth.saturating_sub(1)
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(sql: &str) -> Vec<Chunk> {
        split_script(sql, SqlDialect::MySQL).unwrap()
    }

    #[test]
    fn test_split_on_semicolons() {
        let c = chunks("SELECT 1; SELECT 2;");
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].text, "SELECT 1");
        assert_eq!(c[1].text, "SELECT 2");
    }

    #[test]
    fn test_empty_statements_skipped() {
        assert_eq!(chunks(";;  ;\n").len(), 0);
    }

    #[test]
    fn test_base_line_skips_comments() {
        let c = chunks("-- header\n\n/* block */\nSELECT 1");
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].base_line, 3);
        assert_eq!(c[0].text, "SELECT 1");
    }

    #[test]
    fn test_semicolon_in_string_does_not_split() {
        let c = chunks("INSERT INTO t VALUES ('a;b'); SELECT 1");
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].text, "INSERT INTO t VALUES ('a;b')");
    }

    #[test]
    fn test_routine_body_kept_together() {
        let sql = "CREATE PROCEDURE p()\nBEGIN\n  SELECT 1;\n  \
                   IF x THEN SELECT 2; END IF;\nEND;\nSELECT 3;";
        let c = chunks(sql);
        assert_eq!(c.len(), 2);
        let routine = c[0].routine.as_ref().unwrap();
        assert_eq!(routine.kind, RoutineKind::Procedure);
        assert_eq!(routine.name, "p");
        assert_eq!(c[1].base_line, 5);
    }

    #[test]
    fn test_trigger_header() {
        let c = chunks(
            "CREATE TRIGGER trg BEFORE INSERT ON `db`.`orders` FOR EACH ROW SET NEW.a = 1"
        );
        let routine = c[0].routine.as_ref().unwrap();
        assert_eq!(routine.kind, RoutineKind::Trigger);
        assert_eq!(routine.name, "trg");
        assert_eq!(routine.table.as_deref(), Some("orders"));
    }

    #[test]
    fn test_create_table_is_not_routine() {
        let c = chunks("CREATE TABLE function_log (id INT)");
        assert!(c[0].routine.is_none());
    }

    #[test]
    fn test_line_index_offsets() {
        let src = "ab\ncdé\nf";
        let index = LineIndex::new(src);
        assert_eq!(index.line_count(), 3);
        assert_eq!(index.offset(src, Location::new(2, 3)), 5);
        assert_eq!(index.offset(src, Location::new(2, 4)), 7);
        assert_eq!(index.offset(src, Location::new(3, 1)), 8);
    }
}
