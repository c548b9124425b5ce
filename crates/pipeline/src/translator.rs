//! Question → SQL: a deterministic generation pass followed by a narrow
//! extraction pass that strips prose and markdown from the candidate.

use tracing::{debug, instrument, warn};

use sqlsage_llm::{ModelHandle, PromptBindings, PromptError, PromptTemplate, Slot, strip_thinking};

pub const GENERATION_TEMPLATE: &str = "\
You are a {dialect} expert. Given an input question, create a syntactically correct {dialect} query to run.
Unless the user asks for a specific number of results, query for at most {top_k} results using the row-limiting syntax of {dialect}. You can order the results to return the most informative data in the database.
Never query for all columns from a table. Select only the columns needed to answer the question and quote column names the way {dialect} expects.
Use only the column names you can see in the tables below, and pay attention to which column is in which table.
When the question refers to today, this month or other relative dates, use the database's current-date functions.

Use the following format:

Question: Question here
SQLQuery: SQL Query to run

Only use the following tables:
{schema}

Question: {input}
SQLQuery: ";

pub const REPAIR_TEMPLATE: &str = "\
Extract and return ONLY the SQL query from this text, without any additional text, quotes, or markdown:

Input text:
{candidate}

Return only the clean SQL query that can be executed directly. Do not include any explanations, markdown formatting, or additional text.";

/// What the translator was given to ground its query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub dialect: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationResult {
    pub raw_candidate: String,
    /// `None` when generation or repair failed.
    pub cleaned_query: Option<String>,
    pub failure: Option<String>,
}

impl TranslationResult {
    fn failed(raw_candidate: String, reason: impl Into<String>) -> Self {
        Self {
            raw_candidate,
            cleaned_query: None,
            failure: Some(reason.into()),
        }
    }
}

pub struct Translator {
    generator: ModelHandle,
    extractor: ModelHandle,
    generation: PromptTemplate,
    repair: PromptTemplate,
    top_k: usize,
}

impl Translator {
    pub fn new(generator: ModelHandle, extractor: ModelHandle, top_k: usize) -> Result<Self, PromptError> {
        Ok(Self {
            generator,
            extractor,
            generation: PromptTemplate::parse_requiring(
                GENERATION_TEMPLATE,
                &[Slot::Dialect, Slot::TopK, Slot::Schema, Slot::Input],
            )?,
            repair: PromptTemplate::parse_requiring(REPAIR_TEMPLATE, &[Slot::Candidate])?,
            top_k,
        })
    }

    #[instrument(skip_all, fields(question_chars = question.len(), dialect = %schema.dialect))]
    pub async fn translate(&self, question: &str, schema: &SchemaDescriptor) -> TranslationResult {
        let top_k = self.top_k.to_string();
        let prompt = match self.generation.render(
            &PromptBindings::new()
                .bind(Slot::Dialect, schema.dialect.as_str())
                .bind(Slot::TopK, top_k.as_str())
                .bind(Slot::Schema, schema.text.as_str())
                .bind(Slot::Input, question),
        ) {
            Ok(prompt) => prompt,
            Err(err) => return TranslationResult::failed(String::new(), err.to_string()),
        };

        let raw_candidate = match self.generator.complete(&prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, "sql generation failed");
                return TranslationResult::failed(String::new(), format!("generation: {err}"));
            }
        };
        debug!(raw = %raw_candidate, "candidate generated");

        match self.repair(&raw_candidate).await {
            Ok(cleaned) if !cleaned.is_empty() => TranslationResult {
                raw_candidate,
                cleaned_query: Some(cleaned),
                failure: None,
            },
            Ok(_) => {
                warn!(raw = %raw_candidate, "repair produced an empty statement");
                TranslationResult::failed(raw_candidate, "repair produced an empty statement")
            }
            Err(reason) => {
                warn!(raw = %raw_candidate, %reason, "sql repair failed");
                TranslationResult::failed(raw_candidate, reason)
            }
        }
    }

    /// Single extraction pass over a candidate, followed by [`sanitize_sql`].
    pub async fn repair(&self, candidate: &str) -> Result<String, String> {
        let prompt = self
            .repair
            .render(&PromptBindings::new().bind(Slot::Candidate, candidate))
            .map_err(|err| err.to_string())?;
        let extracted = self
            .extractor
            .complete(&prompt)
            .await
            .map_err(|err| format!("repair: {err}"))?;
        Ok(sanitize_sql(&extracted))
    }
}

// ── Deterministic clean-up ──────────────────────────────────────────────────

const STATEMENT_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "PRAGMA", "VALUES",
];

const CLAUSE_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "FROM", "WHERE", "GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "JOIN",
    "LEFT", "RIGHT", "INNER", "OUTER", "FULL", "CROSS", "ON", "AND", "OR", "NOT", "UNION",
    "INTERSECT", "EXCEPT", "CASE", "WHEN", "THEN", "ELSE", "END", "AS", "WINDOW", "FETCH",
];

const TRAILING_MARKERS: &[&str] = &["SQLResult:", "Answer:", "Explanation:"];

/// Trailing words after which a statement cannot end.
const CONTINUATION_KEYWORDS: &[&str] = &[
    "SELECT", "DISTINCT", "FROM", "WHERE", "AND", "OR", "NOT", "ON", "JOIN", "BY", "AS", "IN",
    "LIKE", "BETWEEN", "IS", "CASE", "WHEN", "THEN", "ELSE", "HAVING", "UNION", "ALL", "WITH",
    "LIMIT", "OFFSET",
];

fn first_word(text: &str) -> String {
    text.trim_start()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_ascii_uppercase()
}

fn starts_with_any(text: &str, keywords: &[&str]) -> bool {
    let word = first_word(text);
    keywords.contains(&word.as_str())
        || matches!(text.trim_start().chars().next(), Some('(' | ')'))
}

/// Content of the first fenced block, or the text unchanged.
fn unfence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after = &text[open + 3..];
    let body = match after.find('\n') {
        Some(nl) if after[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => &after[nl + 1..],
        _ => after,
    };
    match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    }
}

fn strip_quotes(mut text: &str) -> &str {
    loop {
        text = text.trim();
        let mut chars = text.chars();
        match (chars.next(), chars.next_back()) {
            (Some(first), Some(last))
                if text.len() >= 2 && first == last && matches!(first, '"' | '\'' | '`') =>
            {
                text = &text[1..text.len() - 1];
            }
            _ => return text,
        }
    }
}

/// Start at the first line that opens a statement, or failing that at the
/// first `SELECT`.
fn skip_leading_prose(text: &str) -> &str {
    if starts_with_any(text, STATEMENT_KEYWORDS) {
        return text;
    }
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if starts_with_any(line, STATEMENT_KEYWORDS) && !line.trim_start().starts_with('(') {
            return text[offset..].trim_start();
        }
        offset += line.len();
    }
    let upper = text.to_ascii_uppercase();
    let mut search = 0;
    while let Some(pos) = upper[search..].find("SELECT") {
        let at = search + pos;
        let boundary_before = at == 0 || !upper.as_bytes()[at - 1].is_ascii_alphanumeric();
        let boundary_after = upper
            .as_bytes()
            .get(at + 6)
            .is_none_or(|b| !b.is_ascii_alphanumeric() && *b != b'_');
        if boundary_before && boundary_after {
            return &text[at..];
        }
        search = at + 6;
    }
    text
}

/// Text up to the first `;` outside string literals and quoted identifiers.
fn first_statement(text: &str) -> &str {
    let mut quote: Option<char> = None;
    for (idx, ch) in text.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(ch),
            (None, ';') => return &text[..idx],
            _ => {}
        }
    }
    text
}

/// Byte offsets where one of `labels` opens a line, ignoring indentation.
/// With `track_quotes`, offsets inside string literals and quoted identifiers
/// are skipped.
fn label_offsets(text: &str, labels: &[&str], track_quotes: bool) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut quote: Option<char> = None;
    let mut line_start = true;
    for (idx, ch) in text.char_indices() {
        let opens_line = quote.is_none() && line_start;
        if opens_line && labels.iter().any(|label| text[idx..].starts_with(label)) {
            offsets.push(idx);
        }
        if track_quotes {
            match (quote, ch) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"' | '`') => quote = Some(ch),
                _ => {}
            }
        }
        line_start = ch == '\n' || (line_start && ch.is_whitespace());
    }
    offsets
}

/// Drop `SQLResult:`-style sections that follow the statement.
fn cut_trailing_sections(text: &str) -> &str {
    match label_offsets(text, TRAILING_MARKERS, true).first() {
        Some(&pos) => &text[..pos],
        None => text,
    }
}

/// Parentheses opened and not yet closed, outside quotes.
fn open_parens(text: &str) -> i64 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for ch in text.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth -= 1,
            _ => {}
        }
    }
    depth
}

fn expects_continuation(text: &str) -> bool {
    let text = text.trim_end();
    if text.ends_with([',', '(', '=', '<', '>', '+', '-', '*', '/', '|']) || open_parens(text) > 0 {
        return true;
    }
    let last = text
        .rsplit(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    CONTINUATION_KEYWORDS.contains(&last.as_str())
}

/// Keep leading paragraphs while they continue the statement: either the
/// paragraph opens a clause or the text kept so far is unfinished.
fn drop_trailing_prose(text: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for paragraph in text.split("\n\n") {
        if kept.is_empty()
            || starts_with_any(paragraph, CLAUSE_KEYWORDS)
            || expects_continuation(&kept.join("\n\n"))
        {
            kept.push(paragraph);
        } else {
            break;
        }
    }
    kept.join("\n\n")
}

/// Reduce model output to a single executable statement: reasoning blocks,
/// code fences, `SQLQuery:` labels, trailing `SQLResult:` sections,
/// surrounding quotes and prose are removed and only the first statement is
/// kept, without its terminating semicolon.  Applying it twice gives the same
/// result as applying it once.
pub fn sanitize_sql(text: &str) -> String {
    let visible = strip_thinking(text);
    let mut sql = unfence(&visible);

    if let Some(&pos) = label_offsets(sql, &["SQLQuery:"], false).last() {
        sql = &sql[pos + "SQLQuery:".len()..];
    }

    let sql = strip_quotes(sql);
    let sql = skip_leading_prose(sql);
    let sql = cut_trailing_sections(sql);
    let sql = first_statement(sql);
    let sql = drop_trailing_prose(sql.trim());
    sql.trim().to_string()
}
