use std::collections::HashMap;
use std::path::Path;

/// What the manager knows when it launches an agent.
#[derive(Debug, Clone, Copy)]
pub struct LaunchSpec<'a> {
    pub system_prompt: Option<&'a str>,
    pub user_prompt: &'a str,
    pub working_dir: &'a Path,
}

/// Builds the command line for one coding-agent CLI.
pub trait AgentRunner: Send + Sync {
    fn name(&self) -> &str;
    fn command(&self) -> String;
    fn args(&self, spec: &LaunchSpec<'_>) -> Vec<String>;

    fn env(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// `claude --print --output-format stream-json [--system-prompt X] <prompt>`
pub struct ClaudeCliRunner {
    program: String,
}

impl ClaudeCliRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ClaudeCliRunner {
    fn default() -> Self {
        Self::new("claude")
    }
}

impl AgentRunner for ClaudeCliRunner {
    fn name(&self) -> &str {
        "Claude Code"
    }

    fn command(&self) -> String {
        self.program.clone()
    }

    fn args(&self, spec: &LaunchSpec<'_>) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
        ];
        if let Some(system) = spec.system_prompt.filter(|s| !s.is_empty()) {
            args.push("--system-prompt".to_string());
            args.push(system.to_string());
        }
        args.push(spec.user_prompt.to_string());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec<'a>(system: Option<&'a str>, prompt: &'a str) -> LaunchSpec<'a> {
        LaunchSpec {
            system_prompt: system,
            user_prompt: prompt,
            working_dir: Path::new("/tmp"),
        }
    }

    #[test]
    fn claude_args_without_system_prompt() {
        let runner = ClaudeCliRunner::default();
        assert_eq!(runner.command(), "claude");
        assert_eq!(
            runner.args(&spec(None, "fix the bug")),
            vec!["--print", "--output-format", "stream-json", "fix the bug"]
        );
    }

    #[test]
    fn claude_args_with_system_prompt() {
        let runner = ClaudeCliRunner::new("/opt/bin/claude");
        let args = runner.args(&spec(Some("be brief"), "go"));
        assert_eq!(&args[3..], ["--system-prompt", "be brief", "go"]);
        assert_eq!(runner.command(), "/opt/bin/claude");
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let args = ClaudeCliRunner::default().args(&spec(Some(""), "go"));
        assert!(!args.contains(&"--system-prompt".to_string()));
    }
}
