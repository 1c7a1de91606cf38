use std::path::Path;

use crate::error::AgentError;

pub const SYSTEM_PREAMBLE: &str = "You are a specialist agent. Follow the Skill exactly.";

/// Stands in for the goal when the caller sends none.
pub const NO_GOAL: &str = "(none provided)";

pub const OUTPUT_INSTRUCTION: &str = "Return ONLY the final structured output.";

/// System/user message pair for one completion call. Never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Read the skill document. Called on every request: there is no cache, so
/// edits to the file show up on the next call.
pub async fn read_skill(path: &Path) -> Result<String, AgentError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| AgentError::SkillRead {
            path: path.display().to_string(),
            source,
        })
}

/// Assemble the prompt. The skill goes into the system message verbatim;
/// goal and notes go into the user message verbatim.
pub fn build_prompt(goal: Option<&str>, notes: &str, skill: &str) -> Prompt {
    let goal = goal.filter(|g| !g.is_empty()).unwrap_or(NO_GOAL);
    Prompt {
        system: format!("{SYSTEM_PREAMBLE}\n\nSKILL:\n{skill}"),
        user: format!(
            "GOAL:\n{goal}\n\nMEETING NOTES / INPUT:\n{notes}\n\n{OUTPUT_INSTRUCTION}"
        ),
    }
}

/// Read the skill at `skill_path` and build the prompt from it.
pub async fn load_prompt(
    skill_path: &Path,
    goal: Option<&str>,
    notes: &str,
) -> Result<Prompt, AgentError> {
    let skill = read_skill(skill_path).await?;
    Ok(build_prompt(goal, notes, &skill))
}
