use regex::Regex;
use serde::Serialize;

/// Structured business-intelligence fields extracted from a free-text
/// model reply. Absent or `N/A` fields stay at their defaults; the record
/// is never rejected for being partial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResearchSummary {
    pub market_size: Option<String>,
    pub cagr: Option<String>,
    pub key_trends: Vec<String>,
    pub competitive_landscape: String,
    pub growth_drivers: Vec<String>,
}

/// Prompt asking the model to reply in the labeled-field format that
/// `parse_research_response` understands. Content is truncated to 4000
/// characters so the request stays inside the model's context.
pub fn build_research_prompt(web_content: &str, query: &str) -> String {
    let content: String = web_content.chars().take(4000).collect();
    format!(
        "Analyze the following web content and extract key business intelligence.\n\n\
         Search Query: {query}\n\
         Web Content:\n\
         {content}\n\n\
         Extract and structure the following:\n\
         1. MARKET_SIZE: Total addressable market value (in USD or INR)\n\
         2. CAGR: Compound annual growth rate percentage\n\
         3. KEY_TRENDS: 2-3 major industry trends\n\
         4. COMPETITIVE_LANDSCAPE: Brief overview\n\
         5. GROWTH_DRIVERS: Key factors driving growth\n\n\
         Format your response as:\n\
         MARKET_SIZE: [value]\n\
         CAGR: [percentage]\n\
         KEY_TRENDS: [trend1]; [trend2]; [trend3]\n\
         COMPETITIVE_LANDSCAPE: [brief description]\n\
         GROWTH_DRIVERS: [driver1]; [driver2]\n\n\
         If information is not available, write \"N/A\" for that field."
    )
}

/// Total parser for the labeled reply format. Each field is extracted
/// independently; a missing label or an `N/A` value leaves that field at
/// its default. Never fails — the worst case is the all-defaults record.
pub fn parse_research_response(response: &str) -> ResearchSummary {
    let mut summary = ResearchSummary::default();

    summary.market_size = extract_line(response, "MARKET_SIZE");
    summary.cagr = extract_cagr(response);
    if let Some(raw) = extract_line(response, "KEY_TRENDS") {
        summary.key_trends = split_delimited(&raw);
    }
    if let Some(raw) = extract_line(response, "COMPETITIVE_LANDSCAPE") {
        summary.competitive_landscape = raw;
    }
    if let Some(raw) = extract_line(response, "GROWTH_DRIVERS") {
        summary.growth_drivers = split_delimited(&raw);
    }

    summary
}

fn extract_line(response: &str, label: &str) -> Option<String> {
    let pattern = format!(r"{label}:\s*(.+?)(?:\n|$)");
    let regex = Regex::new(&pattern).ok()?;
    let captured = regex.captures(response)?.get(1)?.as_str();
    if captured.contains("N/A") {
        return None;
    }
    let trimmed = captured.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

fn extract_cagr(response: &str) -> Option<String> {
    let regex = Regex::new(r"CAGR:\s*(\d+\.?\d*%?)").ok()?;
    let captured = regex.captures(response)?.get(1)?.as_str().trim();
    if captured.is_empty() {
        return None;
    }
    Some(captured.to_string())
}

fn split_delimited(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
