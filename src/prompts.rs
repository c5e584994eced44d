//! Prompts used by the LLM-backed model service.
//!
//! Centralising every prompt here keeps the adapter in
//! [`crate::services::model`] free of wording, and lets unit tests inspect
//! the rendered prompts without a live provider.
//!
//! Each builder takes the target language and the per-item context and
//! returns the finished message text; nothing here talks to a model.

/// System prompt for page translation.
pub const TRANSLATE_SYSTEM_PROMPT: &str = "You are a translator with vast knowledge of human languages.";

/// System prompt for page summaries.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You summarise document pages for later retrieval. Answer with the summary only.";

/// Translation request for one page of text.
///
/// If the page is already in `language`, the model is asked to return it as is.
pub fn translate_prompt(context: &str, language: &str) -> String {
    format!(
        "Please translate the following context to {language}.\n\
If the context language is same as {language}, just return the context as is.\n\n\
CONTEXT:\n{context}\n\n\
TRANSLATED_TEXT:"
    )
}

/// Bullet-point summary request for one page of text.
pub fn summary_prompt(context: &str, language: &str) -> String {
    format!(
        "Please summarize the sentence according to the following REQUEST.\n\n\
REQUEST:\n\
1. Summarize the main points in bullet points.\n\
2. Write the summary in {language}.\n\
3. DO NOT translate any technical terms.\n\
4. DO NOT include any unnecessary information.\n\
5. Summary must include important entities, numerical values.\n\n\
CONTEXT:\n{context}\n\n\
SUMMARY:"
    )
}

/// System prompt for a cropped figure.
pub fn image_system_prompt(language: &str) -> String {
    format!(
        "You are an expert in extracting useful information from IMAGE.\n\
With a given image, your task is to extract key entities, summarize them, and write useful information.\n\
Please write the summary in {language}."
    )
}

/// System prompt for a cropped table.
pub fn table_system_prompt(language: &str) -> String {
    format!(
        "You are an expert in extracting useful information from TABLE.\n\
With a given image, your task is to extract key entities, summarize them, and write useful information.\n\
Please write the summary in {language}."
    )
}

/// User turn accompanying a figure or table crop.
///
/// `subject` is "image" or "image of table"; `context` is the summary of the
/// page the element sits on.
pub fn visual_user_prompt(subject: &str, context: &str, language: &str) -> String {
    format!(
        "Here is the context related to the {subject}: {context}\n\n\
LANGUAGE: {language}\n\
###\n\n\
Output Format:\n\n\
TITLE:\n\
SUMMARY:\n\
ENTITIES:\n\
DATA_INSIGHTS:\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_prompt_embeds_context_and_language() {
        let p = translate_prompt("Bonjour", "Korean");
        assert!(p.contains("to Korean."));
        assert!(p.contains("CONTEXT:\nBonjour"));
        assert!(p.ends_with("TRANSLATED_TEXT:"));
    }

    #[test]
    fn summary_prompt_requests_bullets() {
        let p = summary_prompt("Revenue rose.", "English");
        assert!(p.contains("bullet points"));
        assert!(p.contains("Write the summary in English."));
        assert!(p.contains("Revenue rose."));
    }

    #[test]
    fn visual_prompts_name_the_subject() {
        assert!(image_system_prompt("German").contains("IMAGE"));
        assert!(table_system_prompt("German").contains("TABLE"));
        let u = visual_user_prompt("image of table", "Q3 results", "German");
        assert!(u.starts_with("Here is the context related to the image of table: Q3 results"));
        assert!(u.contains("DATA_INSIGHTS:"));
    }

    #[test]
    fn empty_context_still_renders() {
        let p = summary_prompt("", "English");
        assert!(p.contains("CONTEXT:\n\n"));
    }
}
