//! Ordered, named, optional prompt sections.
//!
//! A prompt is a list of sections rendered in insertion order. Sections
//! whose body is blank are dropped, so callers can add every section
//! unconditionally and let missing data fall away.

/// Identifies a section so tests and logs can reason about layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Personality,
    Phase,
    CallPlan,
    DateTime,
    CallCount,
    KeyInformation,
    SmsSummaries,
    PreviousSummaries,
    LastDetailed,
    ScheduledCall,
    Instructions,
}

#[derive(Debug, Clone)]
struct Part {
    section: Section,
    body: String,
}

/// Accumulates sections and renders them separated by blank lines.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    parts: Vec<Part>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a section; blank bodies are skipped.
    #[must_use]
    pub fn section(mut self, section: Section, body: impl Into<String>) -> Self {
        let body = body.into();
        let trimmed = body.trim();
        if !trimmed.is_empty() {
            self.parts.push(Part {
                section,
                body: trimmed.to_owned(),
            });
        }
        self
    }

    #[must_use]
    pub fn optional(self, section: Section, body: Option<String>) -> Self {
        match body {
            Some(body) => self.section(section, body),
            None => self,
        }
    }

    /// Add `== TITLE: ==` followed by one line per item; no items, no section.
    #[must_use]
    pub fn titled<S: AsRef<str>>(self, section: Section, title: &str, lines: &[S]) -> Self {
        let lines: Vec<&str> = lines
            .iter()
            .map(|l| l.as_ref().trim())
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return self;
        }
        self.section(section, format!("== {title}: ==\n{}", lines.join("\n")))
    }

    /// Sections present, in render order.
    pub fn sections(&self) -> Vec<Section> {
        self.parts.iter().map(|p| p.section).collect()
    }

    pub fn build(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.body.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Substitute `{key}` placeholders in a prompt template.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_owned(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_sections_are_dropped_and_order_kept() {
        let builder = PromptBuilder::new()
            .section(Section::Personality, "base")
            .section(Section::Phase, "   ")
            .optional(Section::CallPlan, None)
            .section(Section::DateTime, "now")
            .titled::<&str>(Section::KeyInformation, "KEY", &[])
            .titled(Section::SmsSummaries, "SMS", &["- a", "", "- b"]);

        assert_eq!(
            builder.sections(),
            vec![Section::Personality, Section::DateTime, Section::SmsSummaries]
        );
        assert_eq!(builder.build(), "base\n\nnow\n\n== SMS: ==\n- a\n- b");
    }

    #[test]
    fn render_replaces_every_placeholder() {
        assert_eq!(
            render("{coach} and {coach} at {tz}", &[("coach", "Max"), ("tz", "UTC")]),
            "Max and Max at UTC"
        );
    }
}
