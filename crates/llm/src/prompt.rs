//! Parameterised prompt templates with a closed set of named slots.
//!
//! Placeholders are written `{slot_name}`; `{{` and `}}` produce literal
//! braces.  A template is parsed once, rejecting unknown slot names, and
//! [`PromptTemplate::render`] refuses to produce a prompt while any slot the
//! template mentions is unbound.  Bound values are inserted verbatim, so
//! braces inside model output or query results are never re-interpreted.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    /// The user's current question.
    Input,
    /// Rendered conversation history (summary + recent turns).
    History,
    /// Retrieved knowledge chunks.
    Context,
    /// Table / column description of the database.
    Schema,
    /// SQL dialect name, e.g. `MySQL`.
    Dialect,
    /// Default row cap for generated queries.
    TopK,
    /// Raw model output awaiting SQL extraction.
    Candidate,
    /// Running conversation summary.
    Summary,
    /// Turns being folded into the summary.
    NewLines,
}

impl Slot {
    pub const ALL: [Slot; 9] = [
        Slot::Input,
        Slot::History,
        Slot::Context,
        Slot::Schema,
        Slot::Dialect,
        Slot::TopK,
        Slot::Candidate,
        Slot::Summary,
        Slot::NewLines,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Slot::Input => "input",
            Slot::History => "history",
            Slot::Context => "context",
            Slot::Schema => "schema",
            Slot::Dialect => "dialect",
            Slot::TopK => "top_k",
            Slot::Candidate => "candidate",
            Slot::Summary => "summary",
            Slot::NewLines => "new_lines",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromptError {
    #[error("unknown placeholder `{{{0}}}`")]
    UnknownSlot(String),
    #[error("unterminated placeholder starting at byte {0}")]
    Unterminated(usize),
    #[error("template does not use required slot `{0}`")]
    SlotNotInTemplate(&'static str),
    #[error("slot `{0}` is not bound")]
    MissingSlot(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(Slot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
    slots: BTreeSet<Slot>,
}

impl PromptTemplate {
    pub fn parse(template: &str) -> Result<Self, PromptError> {
        let mut segments = Vec::new();
        let mut slots = BTreeSet::new();
        let mut text = String::new();
        let mut chars = template.char_indices().peekable();

        while let Some((pos, ch)) = chars.next() {
            match ch {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    text.push('{');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        name.push(inner);
                    }
                    if !closed {
                        return Err(PromptError::Unterminated(pos));
                    }
                    let slot = Slot::from_name(name.trim())
                        .ok_or_else(|| PromptError::UnknownSlot(name.clone()))?;
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Slot(slot));
                    slots.insert(slot);
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    text.push('}');
                }
                other => text.push(other),
            }
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self { segments, slots })
    }

    /// Parse and check that every slot in `required` appears in the template.
    pub fn parse_requiring(template: &str, required: &[Slot]) -> Result<Self, PromptError> {
        let parsed = Self::parse(template)?;
        parsed.require(required)?;
        Ok(parsed)
    }

    pub fn require(&self, required: &[Slot]) -> Result<(), PromptError> {
        match required.iter().find(|slot| !self.slots.contains(slot)) {
            Some(slot) => Err(PromptError::SlotNotInTemplate(slot.name())),
            None => Ok(()),
        }
    }

    pub fn slots(&self) -> &BTreeSet<Slot> {
        &self.slots
    }

    pub fn render(&self, bindings: &PromptBindings<'_>) -> Result<String, PromptError> {
        if let Some(missing) = self.slots.iter().find(|slot| !bindings.values.contains_key(slot)) {
            return Err(PromptError::MissingSlot(missing.name()));
        }

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(slot) => out.push_str(bindings.values[slot].as_ref()),
            }
        }
        Ok(out)
    }
}

/// Values for a single render.  Extra bindings the template does not use are
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct PromptBindings<'a> {
    values: BTreeMap<Slot, std::borrow::Cow<'a, str>>,
}

impl<'a> PromptBindings<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, slot: Slot, value: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.values.insert(slot, value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_all_slots_in_order() {
        let template =
            PromptTemplate::parse("History:\n{history}\n<context>{context}</context>\nQ: {input}")
                .unwrap();
        let prompt = template
            .render(
                &PromptBindings::new()
                    .bind(Slot::History, "(none)")
                    .bind(Slot::Context, "rows")
                    .bind(Slot::Input, "how many?"),
            )
            .unwrap();
        assert_eq!(prompt, "History:\n(none)\n<context>rows</context>\nQ: how many?");
    }

    #[test]
    fn unbound_slot_is_rejected() {
        let template = PromptTemplate::parse("{context} {input}").unwrap();
        let err = template
            .render(&PromptBindings::new().bind(Slot::Input, "q"))
            .unwrap_err();
        assert_eq!(err, PromptError::MissingSlot("context"));
    }

    #[test]
    fn unknown_placeholder_is_rejected_at_parse_time() {
        let err = PromptTemplate::parse("hello {user_name}").unwrap_err();
        assert_eq!(err, PromptError::UnknownSlot("user_name".to_string()));
    }

    #[test]
    fn unterminated_placeholder_is_rejected() {
        assert_eq!(
            PromptTemplate::parse("abc {input").unwrap_err(),
            PromptError::Unterminated(4)
        );
    }

    #[test]
    fn doubled_braces_are_literals() {
        let template = PromptTemplate::parse("{{\"answer\": \"...\"}} for {input}").unwrap();
        assert_eq!(template.slots().len(), 1);
        let prompt = template
            .render(&PromptBindings::new().bind(Slot::Input, "q"))
            .unwrap();
        assert_eq!(prompt, "{\"answer\": \"...\"} for q");
    }

    #[test]
    fn bound_values_are_not_reparsed() {
        let template = PromptTemplate::parse("{candidate}").unwrap();
        let prompt = template
            .render(&PromptBindings::new().bind(Slot::Candidate, "SELECT '{input}'"))
            .unwrap();
        assert_eq!(prompt, "SELECT '{input}'");
    }

    #[test]
    fn required_slots_must_appear() {
        let err = PromptTemplate::parse_requiring("{context} {input}", &[Slot::History, Slot::Input])
            .unwrap_err();
        assert_eq!(err, PromptError::SlotNotInTemplate("history"));
    }

    #[test]
    fn slot_names_roundtrip() {
        for slot in Slot::ALL {
            assert_eq!(Slot::from_name(slot.name()), Some(slot));
        }
    }
}
