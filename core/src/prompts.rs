//! The prompt-template contract. The engine owns template *names*, their
//! declared variable lists, and (for structured calls) the schema; the
//! natural-language content behind each name may be swapped freely so long
//! as the variables and schema are preserved.

use indexmap::IndexMap;

/// Truncation cap for scraped page content fed into authoring prompts.
pub const MAX_SCRAPED_CHARS: usize = 8 * 1024;

/// Named prompt templates the engine calls through. There are seven, despite
/// the project's planning notes having once called this "six templates" —
/// kept verbatim here rather than silently renumbering anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptTemplate {
    /// C5 step 1: generate exactly five seed search queries for the topic.
    SeedQueries,
    /// C5 step 3: judge whether accumulated research is sufficient.
    EvaluateResearch,
    /// C5 step 4a: generate queries targeting `missing_aspects`.
    RefinementQueries,
    /// C6: produce the ordered module list.
    PlanModules,
    /// C7: produce the ordered submodule list for one module.
    PlanSubmodulesForModule,
    /// C8 step 1: produce submodule-specific search queries.
    SubmoduleQueries,
    /// C8 step 3: author a submodule's content.
    SubmoduleContent,
}

impl PromptTemplate {
    /// The variable names this template is declared to accept, in binding
    /// order. The variable bundle's keys are declared alongside the
    /// template, not discovered at call time.
    pub fn declared_variables(self) -> &'static [&'static str] {
        match self {
            Self::SeedQueries => &["topic"],
            Self::EvaluateResearch => &["topic", "accumulated_results"],
            Self::RefinementQueries => &["topic", "missing_aspects"],
            Self::PlanModules => &["topic", "search_results", "module_count_instruction"],
            Self::PlanSubmodulesForModule => &[
                "topic",
                "module_title",
                "module_description",
                "learning_path_context",
                "submodule_count_instruction",
            ],
            Self::SubmoduleQueries => &[
                "topic",
                "language",
                "explanation_style",
                "module_title",
                "module_description",
                "submodule_title",
                "submodule_description",
                "submodule_position",
                "outline",
                "module_context",
            ],
            Self::SubmoduleContent => &[
                "topic",
                "language",
                "explanation_style",
                "module_summary",
                "submodule_summary",
                "previous_submodule",
                "next_submodule",
                "search_results",
                "outline",
            ],
        }
    }
}

/// A named variable bundle bound to a [`PromptTemplate`], passed into
/// [`LlmCapability::complete_text`](crate::capability::LlmCapability::complete_text)
/// or [`complete_structured`](crate::capability::LlmCapability::complete_structured).
///
/// Variables are stored in an [`IndexMap`] so providers that interpolate
/// them into a running transcript see them in declaration order rather than
/// hash order.
#[derive(Debug, Clone)]
pub struct Prompt {
    template: PromptTemplate,
    variables: IndexMap<&'static str, String>,
    extra_system_instructions: Vec<String>,
}

impl Prompt {
    /// Starts a prompt for `template` with no variables bound yet.
    pub fn new(template: PromptTemplate) -> Self {
        Self {
            template,
            variables: IndexMap::new(),
            extra_system_instructions: Vec::new(),
        }
    }

    /// Binds `name` to `value`. Panics in debug builds if `name` is not in
    /// [`PromptTemplate::declared_variables`] for this prompt's template —
    /// callers are expected to bind exactly the declared set.
    #[must_use]
    pub fn with_variable(mut self, name: &'static str, value: impl Into<String>) -> Self {
        debug_assert!(
            self.template.declared_variables().contains(&name),
            "{name:?} is not a declared variable of {:?}",
            self.template
        );
        self.variables.insert(name, value.into());
        self
    }

    /// The template this prompt is bound to.
    pub fn template(&self) -> PromptTemplate {
        self.template
    }

    /// The bound variables, in declaration order.
    pub fn variables(&self) -> &IndexMap<&'static str, String> {
        &self.variables
    }

    /// Appends a system-level instruction (used by
    /// `complete_structured`'s default implementation to attach schema
    /// instructions without losing the caller's own variables).
    pub(crate) fn push_system_instruction(&mut self, instruction: String) {
        self.extra_system_instructions.push(instruction);
    }

    /// Any extra system instructions layered onto this prompt, in the order
    /// they were added.
    pub fn system_instructions(&self) -> &[String] {
        &self.extra_system_instructions
    }
}

/// Builds the system instruction appended to a prompt when
/// `complete_structured` is asked for schema-conformant output, for
/// providers without native structured-output support.
pub fn structured_output_instructions(schema_json: &str) -> String {
    format!(
        "You must respond with a single JSON value that strictly conforms to \
         the following JSON Schema. Do not include any commentary, markdown \
         fences, or text outside the JSON value.\n\nSchema:\n{schema_json}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_variables_nonempty_for_every_template() {
        let templates = [
            PromptTemplate::SeedQueries,
            PromptTemplate::EvaluateResearch,
            PromptTemplate::RefinementQueries,
            PromptTemplate::PlanModules,
            PromptTemplate::PlanSubmodulesForModule,
            PromptTemplate::SubmoduleQueries,
            PromptTemplate::SubmoduleContent,
        ];
        for template in templates {
            assert!(!template.declared_variables().is_empty());
        }
    }

    #[test]
    fn variables_preserve_insertion_order() {
        let prompt = Prompt::new(PromptTemplate::SeedQueries).with_variable("topic", "bst");
        assert_eq!(
            prompt.variables().keys().copied().collect::<Vec<_>>(),
            vec!["topic"]
        );
    }
}
