//! Operation prompt templates
//!
//! One method per catalog operation. Each returns a ready
//! [`CompletionRequest`] carrying the operation label and sampling settings.

use super::{PromptBuilder, PromptProfile};
use crate::ai::provider::CompletionRequest;
use crate::constants::{limits, secondary, tokens};
use crate::types::{ChatMessage, Stage, TaskKind};

const CODE_GENERATION_RULES: &str = "You are a code generation expert. \
Based on the following prompt, generate only the code block requested. \
Do not include any explanation, preamble, or markdown formatting. \
Just return the raw code and one line comments where necessary.";

const FORMAT_RULES: &str = "You are a code formatting expert. \
Format the following code with proper indentation, spacing, and style. \
Add one-line comments where necessary to clarify complex logic. \
Preserve the original functionality and logic. \
Return ONLY the formatted code, no explanations, no markdown formatting, no code blocks.";

const REFINE_RULES: &str = "You are a senior engineer. \
The user ran the generated code and got the following error/output. \
Diagnose the issue and provide a corrected version of the code. \
Preserve the original intent and public API where possible. \
If the error indicates missing imports or environment, include minimal fixes. \
Return ONLY the corrected code, no explanations, no markdown.";

const CLASSIFY_RULES: &str = "You are an expert in LeetCode problem classification. \
Analyze the following problem description and its solution. \
Generate a comma-separated list of 3 to 5 relevant classifications \
(e.g., 'Dynamic Programming', 'Two Pointers', 'BFS', 'Array', 'Hash Table'). \
Do not include any explanation, markdown, or other text. \
Example output: Dynamic Programming,Array,Hash Table";

const EXPLAIN_SECTIONS: [&str; 7] = [
    "Overview & Intent - what the code does and why.",
    "How It Works - the main steps/flow (not line-by-line unless necessary).",
    "Key Design Decisions - data structures, algorithms, and trade-offs.",
    "Complexity - Big-O time and space complexity for the critical path.",
    "Edge Cases & Correctness - inputs to watch for and why it remains correct.",
    "Improvements & Alternatives - performance, readability, or robustness ideas.",
    "Security/Performance Notes - only if applicable.",
];

const SOLUTION_SECTIONS: [&str; 8] = [
    "Overview & Intent - what the solution achieves and why this approach.",
    "Strategy & Key Ideas - the algorithm/pattern (e.g., Two Pointers, DP, BFS) and data structures used.",
    "Step-by-Step Walkthrough - the core flow; keep it brief and focused.",
    "Correctness Argument - why this works for all cases.",
    "Time Complexity - Big-O with a short justification.",
    "Space Complexity - Big-O with a short justification.",
    "Edge Cases & Pitfalls - tricky inputs and how the code handles them.",
    "Possible Improvements/Alternatives - if applicable.",
];

/// First `max_chars` characters of `text`
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl PromptProfile {
    /// Input budget for explanations, in estimated tokens
    pub fn explain_budget(&self) -> usize {
        match self {
            Self::Gemini => tokens::DEFAULT_MAX_INPUT,
            Self::MiniMax => secondary::EXPLAIN_MAX_INPUT,
        }
    }

    /// Input budget for tag suggestion, in estimated tokens
    pub fn tags_budget(&self) -> usize {
        match self {
            Self::Gemini => tokens::DEFAULT_MAX_INPUT,
            Self::MiniMax => secondary::TAGS_MAX_INPUT,
        }
    }

    /// Oversized explain/tag inputs are chunked; otherwise they are truncated
    pub fn chunks_large_inputs(&self) -> bool {
        matches!(self, Self::Gemini)
    }

    pub fn generate_code(&self, prompt: &str) -> CompletionRequest {
        self.request(
            TaskKind::CodeGeneration.label(),
            CODE_GENERATION_RULES.to_string(),
            format!("PROMPT: \"{}\"", prompt),
        )
        .with_temperature(0.4)
        .with_max_output_tokens(tokens::CODE_MAX_OUTPUT)
    }

    /// Explanation of one chunk (`part` is 1-based)
    pub fn explain(&self, code: &str, part: usize, total: usize) -> CompletionRequest {
        match self {
            Self::Gemini => {
                let rules = PromptBuilder::new()
                    .text(
                        "You are a senior code reviewer and educator. \
                         Analyze the code and produce a clear, structured explanation. \
                         Use Markdown with short sections and bullet points. \
                         Do NOT wrap the whole response in a single code block.",
                    )
                    .numbered("Your explanation MUST include:", &EXPLAIN_SECTIONS)
                    .build();
                let input = PromptBuilder::new()
                    .code(&format!("PART {}/{}: Code", part, total), code)
                    .build();
                self.request(format!("code explanation (part {})", part), rules, input)
                    .with_temperature(0.4)
            }
            Self::MiniMax => {
                let input = PromptBuilder::new()
                    .code(
                        "Explain this code",
                        truncate_chars(code, secondary::EXPLAIN_TRUNCATE_CHARS),
                    )
                    .build();
                self.request(
                    TaskKind::Explanation.label(),
                    "You are a code analysis expert. \
                     Provide clear, structured explanations using simple language."
                        .to_string(),
                    input,
                )
                .with_temperature(0.3)
                .with_max_output_tokens(secondary::EXPLAIN_MAX_OUTPUT)
            }
        }
    }

    pub fn format_code(&self, code: &str, language: Option<&str>) -> CompletionRequest {
        let input = PromptBuilder::new()
            .field("Language", language)
            .code("CODE TO FORMAT", code)
            .text("FORMATTED CODE:")
            .build();
        self.request(TaskKind::Formatting.label(), FORMAT_RULES.to_string(), input)
            .with_temperature(0.2)
            .with_max_output_tokens(tokens::CODE_MAX_OUTPUT)
    }

    /// Tag suggestion for one chunk (`part` is 1-based)
    pub fn suggest_tags(&self, code: &str, part: usize, total: usize) -> CompletionRequest {
        match self {
            Self::Gemini => {
                let rules = "You are a code analysis expert. \
                    Analyze the following code and generate a comma-separated list of 3 to 5 relevant, lowercase tags. \
                    Prioritize: programming language, paradigm (oop, functional), frameworks/libs (flask, react), \
                    algorithmic techniques (two-pointers, dp, bfs, sorting), and data structures (heap, trie, hashmap). \
                    Do not include any explanation, markdown, or other text. \
                    Example output: python,flask,sqlalchemy,database";
                let input = PromptBuilder::new()
                    .code(&format!("CODE (part {}/{})", part, total), code)
                    .build();
                self.request(format!("tag suggestion (part {})", part), rules.to_string(), input)
                    .with_temperature(0.4)
            }
            Self::MiniMax => {
                let input = PromptBuilder::new()
                    .code(
                        "Generate tags for this code",
                        truncate_chars(code, secondary::TAGS_TRUNCATE_CHARS),
                    )
                    .build();
                self.request(
                    TaskKind::TagSuggestion.label(),
                    "You are a code tagging expert. \
                     Generate 3-5 relevant, lowercase tags separated by commas."
                        .to_string(),
                    input,
                )
                .with_temperature(0.3)
                .with_max_output_tokens(secondary::TAGS_MAX_OUTPUT)
            }
        }
    }

    pub fn refine(
        &self,
        code: &str,
        error_output: &str,
        language: Option<&str>,
    ) -> CompletionRequest {
        let input = PromptBuilder::new()
            .field("Target Language", language)
            .code("ERROR/OUTPUT", error_output)
            .code("CURRENT CODE", code)
            .text("CORRECTED CODE:")
            .build();
        self.request(TaskKind::Refinement.label(), REFINE_RULES.to_string(), input)
            .with_temperature(0.3)
            .with_max_output_tokens(tokens::CODE_MAX_OUTPUT)
    }

    pub fn generate_solution(
        &self,
        title: &str,
        description: &str,
        language: &str,
    ) -> CompletionRequest {
        let rules = format!(
            "You are an expert LeetCode solution generator. \
             Generate a complete, correct, and efficient solution in {} for the following LeetCode problem. \
             Provide only the code, without any explanation, preamble, or markdown formatting.",
            language
        );
        let input = format!(
            "Problem Title: {}\nProblem Description: {}\n\nSOLUTION ({}):",
            title, description, language
        );
        self.request(TaskKind::SolutionGeneration.label(), rules, input)
            .with_temperature(0.4)
            .with_max_output_tokens(tokens::CODE_MAX_OUTPUT)
    }

    pub fn explain_solution(&self, code: &str, title: &str, language: &str) -> CompletionRequest {
        let rules = PromptBuilder::new()
            .numbered(
                &format!(
                    "You are an expert at explaining LeetCode solutions. \
                     Provide a concise but educative explanation for the following {} solution to the problem '{}'. \
                     Structure the answer with Markdown headings and cover:",
                    language, title
                ),
                &SOLUTION_SECTIONS,
            )
            .text("Do not wrap the entire response in a single code block.")
            .build();
        let input = PromptBuilder::new()
            .code(&format!("SOLUTION ({})", language), code)
            .build();
        self.request(TaskKind::SolutionExplanation.label(), rules, input)
            .with_temperature(0.3)
    }

    pub fn classify_solution(&self, code: &str, description: &str) -> CompletionRequest {
        let input = PromptBuilder::new()
            .labeled("PROBLEM DESCRIPTION", Some(description))
            .code("SOLUTION CODE", code)
            .build();
        self.request(
            TaskKind::Classification.label(),
            CLASSIFY_RULES.to_string(),
            input,
        )
        .with_temperature(0.3)
    }

    /// Chat turn over the most recent history
    pub fn chat(&self, preamble: &str, history: &[ChatMessage], message: &str) -> CompletionRequest {
        let recent = &history[history.len().saturating_sub(limits::CHAT_HISTORY_TURNS)..];
        let label = TaskKind::Chat.label();

        match self {
            Self::Gemini => {
                let mut messages = Vec::with_capacity(recent.len() + 2);
                messages.push(ChatMessage::user(preamble));
                messages.extend(recent.iter().cloned());
                messages.push(ChatMessage::user(message));
                CompletionRequest::conversation(label, messages).with_temperature(0.7)
            }
            Self::MiniMax => {
                let mut messages = recent.to_vec();
                messages.push(ChatMessage::user(message));
                CompletionRequest::conversation(label, messages)
                    .with_system(preamble)
                    .with_temperature(0.7)
                    .with_max_output_tokens(tokens::DEFAULT_MAX_OUTPUT)
            }
        }
    }

    /// One multi-step stage over the previous stage's output
    ///
    /// `extra` carries test cases for testing and complexity hints for
    /// refining; other stages ignore it.
    pub fn stage(&self, stage: Stage, input: &str, extra: Option<&str>) -> CompletionRequest {
        let header = format!(
            "You are {} - Layer {} of the Multi-Step Algorithmic Solver Architecture.",
            stage.persona(),
            stage.number()
        );

        let (rules, body, temperature) = match stage {
            Stage::Architecture => (
                PromptBuilder::new()
                    .text(&header)
                    .text(
                        "Your goal is to fully understand the problem, identify constraints, handle edge cases, \
                         and select the optimal algorithm. Analyze the problem systematically and provide a \
                         detailed, justified plan and strategic outline.",
                    )
                    .numbered(
                        "Structure your response as:",
                        &[
                            "Problem Understanding & Requirements Analysis",
                            "Input/Output Specifications & Constraints",
                            "Edge Cases & Boundary Conditions",
                            "Algorithm Selection & Justification",
                            "Implementation Strategy & Approach",
                            "Complexity Analysis (Time & Space)",
                            "Risk Assessment & Potential Challenges",
                        ],
                    )
                    .build(),
                PromptBuilder::new()
                    .labeled("PROBLEM DESCRIPTION", Some(input))
                    .text("Provide a comprehensive architectural analysis and strategic plan.")
                    .build(),
                0.3,
            ),
            Stage::Coding => (
                PromptBuilder::new()
                    .text(&header)
                    .text(
                        "Your goal is to generate clean, fully commented, and robust code based strictly \
                         on the architectural plan from Layer 1. Follow the strategic outline precisely \
                         and implement a complete, executable solution.",
                    )
                    .text(
                        "Requirements:\n\
                         - Follow the architecture plan exactly\n\
                         - Include comprehensive inline comments\n\
                         - Handle edge cases as identified in Layer 1\n\
                         - Use clear variable names and proper formatting\n\
                         - Ensure the code is production-ready\n\
                         - Return ONLY the code, no explanations or markdown",
                    )
                    .build(),
                PromptBuilder::new()
                    .labeled("ARCHITECTURE PLAN", Some(input))
                    .text("GENERATE THE COMPLETE CODE:")
                    .build(),
                0.2,
            ),
            Stage::Testing => (
                PromptBuilder::new()
                    .text(&header)
                    .text(
                        "Your goal is to rigorously test the generated code using provided or self-generated \
                         test cases, identify bugs, and produce the corrected solution.",
                    )
                    .numbered(
                        "Process:",
                        &[
                            "Analyze the code for potential bugs and edge cases",
                            "Generate comprehensive test cases covering normal cases, edge cases, boundary conditions and error scenarios",
                            "Simulate execution and identify issues",
                            "Provide corrected code if needed",
                            "Document any bugs found and fixes applied",
                        ],
                    )
                    .build(),
                PromptBuilder::new()
                    .code("GENERATED CODE", input)
                    .labeled("ADDITIONAL TEST CASES", extra)
                    .text(
                        "Provide your verification analysis and corrected code (if any fixes were needed).",
                    )
                    .build(),
                0.3,
            ),
            Stage::Refining => (
                PromptBuilder::new()
                    .text(&header)
                    .text(
                        "Your goal is to analyze the time and space complexity and optimize the solution \
                         for efficiency (if possible). Provide the final optimized code and complexity summary.",
                    )
                    .numbered(
                        "Tasks:",
                        &[
                            "Analyze current time and space complexity",
                            "Identify potential optimizations",
                            "Apply optimizations while maintaining correctness",
                            "Provide final optimized code",
                            "Give detailed complexity analysis (Big O notation)",
                            "Explain optimization techniques used",
                        ],
                    )
                    .build(),
                PromptBuilder::new()
                    .code("VERIFIED CODE", input)
                    .labeled("COMPLEXITY ANALYSIS", extra)
                    .text("Provide the final optimized solution with comprehensive complexity analysis.")
                    .build(),
                0.2,
            ),
        };

        self.request(TaskKind::MultiStepStage(stage).label(), rules, body)
            .with_temperature(temperature)
            .with_max_output_tokens(tokens::CODE_MAX_OUTPUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_text(request: &CompletionRequest) -> &str {
        request.messages.last().map(|m| m.content.as_str()).unwrap_or_default()
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }

    #[test]
    fn test_generate_code_prompt() {
        let request = PromptProfile::Gemini.generate_code("reverse a string");
        assert!(user_text(&request).starts_with("You are a code generation expert."));
        assert!(user_text(&request).ends_with("PROMPT: \"reverse a string\""));
        assert_eq!(request.operation, "code generation");
        assert_eq!(request.temperature, 0.4);
    }

    #[test]
    fn test_gemini_explain_marks_parts() {
        let request = PromptProfile::Gemini.explain("fn main() {}", 2, 3);
        assert!(user_text(&request).contains("PART 2/3: Code:\n```\nfn main() {}\n```"));
        assert!(user_text(&request).contains("7. Security/Performance Notes"));
        assert_eq!(request.operation, "code explanation (part 2)");
    }

    #[test]
    fn test_minimax_explain_truncates() {
        let code = "x".repeat(5_000);
        let request = PromptProfile::MiniMax.explain(&code, 1, 1);
        let sent = user_text(&request);
        assert_eq!(sent.matches('x').count(), 4_000);
        assert!(request.system.is_some());
        assert_eq!(request.max_output_tokens, Some(1_500));
        assert_eq!(request.temperature, 0.3);
    }

    #[test]
    fn test_minimax_tags_settings() {
        let request = PromptProfile::MiniMax.suggest_tags(&"y".repeat(4_000), 1, 1);
        assert_eq!(user_text(&request).matches('y').count(), 3_000);
        assert_eq!(request.max_output_tokens, Some(100));
    }

    #[test]
    fn test_format_prompt_with_language() {
        let request = PromptProfile::MiniMax.format_code("x=1", Some("python"));
        assert_eq!(
            user_text(&request),
            "Language: python\nCODE TO FORMAT:\n```\nx=1\n```\n\nFORMATTED CODE:"
        );
        assert_eq!(request.temperature, 0.2);
    }

    #[test]
    fn test_refine_prompt() {
        let request = PromptProfile::MiniMax.refine("print(x)", "NameError: x", None);
        let text = user_text(&request);
        assert!(text.starts_with("ERROR/OUTPUT:\n```\nNameError: x\n```"));
        assert!(text.contains("CURRENT CODE:\n```\nprint(x)\n```"));
        assert!(text.ends_with("CORRECTED CODE:"));
    }

    #[test]
    fn test_chat_history_truncated() {
        let history: Vec<ChatMessage> = (0..30)
            .map(|i| ChatMessage::user(format!("turn {}", i)))
            .collect();

        let gemini = PromptProfile::Gemini.chat("Only answer about snippets.", &history, "hi");
        // preamble + 20 turns + new message
        assert_eq!(gemini.messages.len(), 22);
        assert_eq!(gemini.messages[0].content, "Only answer about snippets.");
        assert_eq!(gemini.messages[1].content, "turn 10");

        let minimax = PromptProfile::MiniMax.chat("Only answer about snippets.", &history, "hi");
        assert_eq!(minimax.messages.len(), 21);
        assert_eq!(minimax.system.as_deref(), Some("Only answer about snippets."));
    }

    #[test]
    fn test_stage_prompts() {
        let architect = PromptProfile::MiniMax.stage(Stage::Architecture, "two sum", None);
        assert!(architect.system.as_deref().is_some_and(|s| s.starts_with(
            "You are The Architect - Layer 1 of the Multi-Step Algorithmic Solver Architecture."
        )));
        assert!(user_text(&architect).starts_with("PROBLEM DESCRIPTION:\ntwo sum"));
        assert_eq!(architect.temperature, 0.3);

        let tester = PromptProfile::MiniMax.stage(Stage::Testing, "code", Some("[1,2] -> 3"));
        assert!(user_text(&tester).contains("ADDITIONAL TEST CASES:\n[1,2] -> 3"));

        let refiner = PromptProfile::MiniMax.stage(Stage::Refining, "code", None);
        assert!(!user_text(&refiner).contains("COMPLEXITY ANALYSIS:"));
        assert_eq!(refiner.temperature, 0.2);
        assert_eq!(refiner.operation, "multi-step stage 4 refining");
    }

    #[test]
    fn test_profile_budgets() {
        assert_eq!(PromptProfile::Gemini.explain_budget(), 12_000);
        assert_eq!(PromptProfile::MiniMax.explain_budget(), 8_000);
        assert_eq!(PromptProfile::MiniMax.tags_budget(), 6_000);
        assert!(PromptProfile::Gemini.chunks_large_inputs());
        assert!(!PromptProfile::MiniMax.chunks_large_inputs());
    }
}
