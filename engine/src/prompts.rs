//! Builds the variable bundles bound to each named
//! [`PromptTemplate`](learnpath_core::prompts::PromptTemplate). The
//! natural-language content the templates wrap is not specified here — only
//! which variables each stage supplies.

use learnpath_core::{
    model::{EnhancedModule, Module, SearchResult},
    prompts::{Prompt, PromptTemplate},
    request::ExplanationStyle,
};

/// How many hits per query to include when serializing search results into
/// a prompt.
const HITS_PER_QUERY_IN_PROMPT: usize = 3;

/// Formats accumulated search results as `Source: X\ncontent` blocks per
/// query, truncated to the top few hits per query.
pub fn format_search_results(results: &[SearchResult]) -> String {
    let mut out = String::new();
    for result in results {
        out.push_str(&format!("Query: {} ({})\n", result.query, result.rationale));
        match result.items.hits() {
            Some(hits) => {
                for hit in hits.iter().take(HITS_PER_QUERY_IN_PROMPT) {
                    out.push_str(&format!("  Source: {} ({})\n  {}\n", hit.title, hit.url, hit.content));
                }
            }
            None => out.push_str("  (search failed)\n"),
        }
    }
    out
}

/// Formats the abridged global outline (module titles + descriptions), used
/// by both the submodule planner and submodule developer prompts.
pub fn format_outline(modules: &[EnhancedModule]) -> String {
    modules
        .iter()
        .enumerate()
        .map(|(i, module)| format!("{}. {} — {}", i + 1, module.module.title, module.module.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn explanation_style_label(style: ExplanationStyle) -> &'static str {
    match style {
        ExplanationStyle::Standard => "standard",
        ExplanationStyle::Simple => "simple",
        ExplanationStyle::Technical => "technical",
        ExplanationStyle::Example => "example",
        ExplanationStyle::Conceptual => "conceptual",
        ExplanationStyle::GrumpyGenius => "grumpy_genius",
    }
}

/// C5 step 1 prompt: five seed queries for `topic`.
pub fn seed_queries(topic: &str) -> Prompt {
    Prompt::new(PromptTemplate::SeedQueries).with_variable("topic", topic)
}

/// C5 step 3 prompt: is the accumulated research adequate?
pub fn evaluate_research(topic: &str, accumulated: &[SearchResult]) -> Prompt {
    Prompt::new(PromptTemplate::EvaluateResearch)
        .with_variable("topic", topic)
        .with_variable("accumulated_results", format_search_results(accumulated))
}

/// C5 step 4a prompt: refinement queries targeting `missing_aspects`.
pub fn refinement_queries(topic: &str, missing_aspects: &[String]) -> Prompt {
    Prompt::new(PromptTemplate::RefinementQueries)
        .with_variable("topic", topic)
        .with_variable("missing_aspects", missing_aspects.join(", "))
}

/// The module-count instruction fragment, present only when
/// `desired_module_count` was set.
pub fn module_count_instruction(desired: Option<usize>) -> String {
    desired.map_or_else(
        || "Choose the number of modules appropriate for the topic (typically 3 to 7).".to_string(),
        |count| format!("Produce exactly {count} modules."),
    )
}

/// C6 prompt: the ordered module list.
pub fn plan_modules(topic: &str, results: &[SearchResult], desired_module_count: Option<usize>) -> Prompt {
    Prompt::new(PromptTemplate::PlanModules)
        .with_variable("topic", topic)
        .with_variable("search_results", format_search_results(results))
        .with_variable("module_count_instruction", module_count_instruction(desired_module_count))
}

/// The submodule-count instruction fragment.
pub fn submodule_count_instruction(desired: Option<usize>) -> String {
    desired.map_or_else(
        || "Choose the number of submodules appropriate for this module.".to_string(),
        |count| format!("Produce exactly {count} submodules."),
    )
}

/// C7 prompt: the ordered submodule list for one module.
pub fn plan_submodules_for_module(
    topic: &str,
    module: &Module,
    learning_path_context: &str,
    desired_submodule_count: Option<usize>,
) -> Prompt {
    Prompt::new(PromptTemplate::PlanSubmodulesForModule)
        .with_variable("topic", topic)
        .with_variable("module_title", module.title.clone())
        .with_variable("module_description", module.description.clone())
        .with_variable("learning_path_context", learning_path_context)
        .with_variable("submodule_count_instruction", submodule_count_instruction(desired_submodule_count))
}

/// C8 step 1 prompt: submodule-specific search queries.
#[allow(clippy::too_many_arguments)]
pub fn submodule_queries(
    topic: &str,
    language: &str,
    explanation_style: ExplanationStyle,
    module: &Module,
    submodule_title: &str,
    submodule_description: &str,
    position: (usize, usize),
    outline: &str,
    module_context: &str,
) -> Prompt {
    Prompt::new(PromptTemplate::SubmoduleQueries)
        .with_variable("topic", topic)
        .with_variable("language", language)
        .with_variable("explanation_style", explanation_style_label(explanation_style))
        .with_variable("module_title", module.title.clone())
        .with_variable("module_description", module.description.clone())
        .with_variable("submodule_title", submodule_title)
        .with_variable("submodule_description", submodule_description)
        .with_variable("submodule_position", format!("{} of {}", position.0, position.1))
        .with_variable("outline", outline)
        .with_variable("module_context", module_context)
}

/// C8 step 3 prompt: authors a submodule's content.
#[allow(clippy::too_many_arguments)]
pub fn submodule_content(
    topic: &str,
    language: &str,
    explanation_style: ExplanationStyle,
    module_summary: &str,
    submodule_summary: &str,
    previous_submodule: Option<&str>,
    next_submodule: Option<&str>,
    results: &[SearchResult],
    outline: &str,
) -> Prompt {
    Prompt::new(PromptTemplate::SubmoduleContent)
        .with_variable("topic", topic)
        .with_variable("language", language)
        .with_variable("explanation_style", explanation_style_label(explanation_style))
        .with_variable("module_summary", module_summary)
        .with_variable("submodule_summary", submodule_summary)
        .with_variable("previous_submodule", previous_submodule.unwrap_or("no previous submodule"))
        .with_variable("next_submodule", next_submodule.unwrap_or("no next submodule"))
        .with_variable("search_results", format_search_results(results))
        .with_variable("outline", outline)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_count_instruction_requests_exact_count_when_set() {
        assert_eq!(module_count_instruction(Some(4)), "Produce exactly 4 modules.");
    }

    #[test]
    fn module_count_instruction_is_open_ended_by_default() {
        assert!(module_count_instruction(None).contains("typically"));
    }

    #[test]
    fn format_search_results_marks_failed_queries() {
        use learnpath_core::model::SearchQuery;
        let query = SearchQuery::new("bst", "seed");
        let results = vec![SearchResult::error(&query, "timeout")];
        assert!(format_search_results(&results).contains("search failed"));
    }
}
