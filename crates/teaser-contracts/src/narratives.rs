use indexmap::IndexMap;

pub const DEFAULT_NARRATIVE_KIND: &str = "business_overview";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrativeSpec {
    pub kind: String,
    template: fn(&str, &str) -> String,
}

impl NarrativeSpec {
    pub fn render(&self, sector: &str, context: &str) -> String {
        (self.template)(sector, context)
    }
}

/// Ordered registry of the narrative kinds the engine can write.
///
/// Unknown kinds resolve to `business_overview` rather than failing; the
/// teaser pipeline treats narrative text as best-effort content.
#[derive(Debug, Clone)]
pub struct NarrativeRegistry {
    kinds: IndexMap<String, NarrativeSpec>,
}

impl NarrativeRegistry {
    pub fn new(kinds: Option<IndexMap<String, NarrativeSpec>>) -> Self {
        Self {
            kinds: kinds.unwrap_or_else(default_kinds),
        }
    }

    pub fn list(&self) -> impl Iterator<Item = &NarrativeSpec> {
        self.kinds.values()
    }

    /// Prompt for `kind`, defaulting to the business overview template.
    pub fn prompt_for(&self, kind: &str, sector: &str, context: &str) -> String {
        let spec = self
            .kinds
            .get(kind)
            .or_else(|| self.kinds.get(DEFAULT_NARRATIVE_KIND));
        match spec {
            Some(spec) => spec.render(sector, context),
            None => String::new(),
        }
    }
}

impl Default for NarrativeRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_kinds() -> IndexMap<String, NarrativeSpec> {
    let mut map = IndexMap::new();

    let mut insert = |kind: &str, template: fn(&str, &str) -> String| {
        map.insert(
            kind.to_string(),
            NarrativeSpec {
                kind: kind.to_string(),
                template,
            },
        );
    };

    insert(DEFAULT_NARRATIVE_KIND, business_overview_prompt);
    insert("investment_highlights", investment_highlights_prompt);
    insert("market_position", market_position_prompt);
    insert("executive_summary", executive_summary_prompt);

    map
}

fn business_overview_prompt(sector: &str, context: &str) -> String {
    format!(
        "You are an M&A investment analyst. Write a concise, professional business overview for an investment teaser.\n\n\
         Sector: {sector}\n\
         Context: {context}\n\n\
         Write 3-4 bullet points describing the business. Use professional language. Do NOT include any company names - keep it anonymous. Focus on:\n\
         - Core business activities\n\
         - Key products/services\n\
         - Market position\n\
         - Competitive advantages\n\n\
         Output only the bullet points, no headers or explanations."
    )
}

fn investment_highlights_prompt(sector: &str, context: &str) -> String {
    format!(
        "You are an M&A investment analyst. Generate compelling investment highlights for a blind teaser.\n\n\
         Sector: {sector}\n\
         Context: {context}\n\n\
         Write 4-5 investment highlights that would attract potential buyers. Each highlight should:\n\
         - Start with a strong action word\n\
         - Be specific with metrics where available\n\
         - Focus on growth potential and value drivers\n\
         - Be anonymous (no company names)\n\n\
         Output only the bullet points."
    )
}

fn market_position_prompt(sector: &str, context: &str) -> String {
    format!(
        "Summarize the market position of this business based on the context.\n\n\
         Sector: {sector}\n\
         Context: {context}\n\n\
         Write 2-3 sentences about market position, competitive landscape, and growth opportunity. Keep it anonymous and professional."
    )
}

fn executive_summary_prompt(sector: &str, context: &str) -> String {
    format!(
        "Write a brief executive summary for an investment teaser.\n\n\
         Sector: {sector}\n\
         Context: {context}\n\n\
         Write 2-3 sentences summarizing the investment opportunity. Be compelling but factual. No company names."
    )
}

#[cfg(test)]
mod tests {
    use super::{NarrativeRegistry, DEFAULT_NARRATIVE_KIND};

    #[test]
    fn registry_lists_four_kinds_in_order() {
        let registry = NarrativeRegistry::default();
        let kinds: Vec<&str> = registry.list().map(|spec| spec.kind.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "business_overview",
                "investment_highlights",
                "market_position",
                "executive_summary",
            ]
        );
    }

    #[test]
    fn prompt_embeds_sector_and_context() {
        let registry = NarrativeRegistry::default();
        let prompt = registry.prompt_for("investment_highlights", "Logistics", "FY25 revenue up 22%");
        assert!(prompt.contains("Sector: Logistics"));
        assert!(prompt.contains("FY25 revenue up 22%"));
        assert!(prompt.contains("investment highlights"));
    }

    #[test]
    fn unknown_kind_falls_back_to_business_overview() {
        let registry = NarrativeRegistry::default();
        let fallback = registry.prompt_for("press_release", "Tech", "ctx");
        let overview = registry.prompt_for(DEFAULT_NARRATIVE_KIND, "Tech", "ctx");
        assert_eq!(fallback, overview);
        assert!(fallback.contains("business overview"));
    }
}
