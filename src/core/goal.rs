//! Goal 与 Playbook：运行的输入，从 TOML 文件加载
//!
//! 单个目标文件：
//! ```toml
//! description = "Save the draft"
//! instruction = "Open the editor and click Save"
//! ```
//! Playbook 文件带 `name` 与 `[[goals]]` 列表，可选 `persona` 覆盖系统提示词。

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::AgentError;

/// 不可变的运行目标
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    /// 未指定时生成 UUID v4
    #[serde(default = "new_run_id")]
    pub run_id: String,
    #[serde(default)]
    pub description: String,
    pub instruction: String,
}

fn new_run_id() -> String {
    Uuid::new_v4().to_string()
}

impl Goal {
    pub fn new(description: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            run_id: new_run_id(),
            description: description.into(),
            instruction: instruction.into(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    fn validate(&self) -> Result<(), AgentError> {
        if self.instruction.trim().is_empty() {
            return Err(AgentError::GoalFile(format!(
                "goal '{}' has an empty instruction",
                self.run_id
            )));
        }
        Ok(())
    }
}

/// 按顺序执行的一组目标
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 覆盖 Planner 的系统提示词
    #[serde(default)]
    pub persona: Option<String>,
    pub goals: Vec<Goal>,
}

/// 文件内容：单个目标或 playbook
#[derive(Clone, Debug)]
pub enum RunFile {
    Goal(Goal),
    Playbook(Playbook),
}

impl RunFile {
    pub fn parse(text: &str) -> Result<Self, AgentError> {
        let value: toml::Value =
            toml::from_str(text).map_err(|e| AgentError::GoalFile(e.to_string()))?;
        let is_playbook = value.get("goals").is_some();

        if is_playbook {
            let playbook: Playbook = value
                .try_into()
                .map_err(|e: toml::de::Error| AgentError::GoalFile(e.to_string()))?;
            if playbook.goals.is_empty() {
                return Err(AgentError::GoalFile(format!(
                    "playbook '{}' has no goals",
                    playbook.name
                )));
            }
            for goal in &playbook.goals {
                goal.validate()?;
            }
            Ok(RunFile::Playbook(playbook))
        } else {
            let goal: Goal = value
                .try_into()
                .map_err(|e: toml::de::Error| AgentError::GoalFile(e.to_string()))?;
            goal.validate()?;
            Ok(RunFile::Goal(goal))
        }
    }

    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AgentError::GoalFile(format!("{}: {}", path.display(), e)))?;
        Self::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_single_goal_gets_run_id() {
        let file = RunFile::parse("description = \"save\"\ninstruction = \"click Save\"").unwrap();
        match file {
            RunFile::Goal(goal) => {
                assert_eq!(goal.instruction, "click Save");
                assert!(Uuid::parse_str(&goal.run_id).is_ok());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_playbook_with_persona() {
        let text = r#"
name = "jobs"
persona = "You are a recruiter."

[[goals]]
run_id = "first"
instruction = "Search for Rust jobs"

[[goals]]
instruction = "Extract the top two"
"#;
        match RunFile::parse(text).unwrap() {
            RunFile::Playbook(pb) => {
                assert_eq!(pb.name, "jobs");
                assert_eq!(pb.persona.as_deref(), Some("You are a recruiter."));
                assert_eq!(pb.goals.len(), 2);
                assert_eq!(pb.goals[0].run_id, "first");
                assert_ne!(pb.goals[1].run_id, "first");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_instruction_rejected() {
        assert!(matches!(
            RunFile::parse("instruction = \"  \""),
            Err(AgentError::GoalFile(_))
        ));
        assert!(RunFile::parse("name = \"x\"\ngoals = []").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "instruction = \"open example.com\"").unwrap();
        assert!(matches!(RunFile::load(file.path()).unwrap(), RunFile::Goal(_)));

        let missing = file.path().with_extension("missing");
        assert!(matches!(RunFile::load(&missing), Err(AgentError::GoalFile(_))));
    }
}
