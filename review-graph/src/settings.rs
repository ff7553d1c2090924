//! Graph tuning knobs, read from the environment with defaults.

use std::time::Duration;

/// How `clause_analyze` executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// ReAct tool loop with planner and plan-driven skips (default).
    Gen3,
    /// Required-skills pass plus a single analysis chat, no planner.
    Legacy,
}

/// Runtime settings for the graph.
#[derive(Debug, Clone)]
pub struct GraphSettings {
    pub mode: ExecutionMode,
    /// Default ReAct iteration budget when no clause plan overrides it.
    pub react_max_iterations: u32,
    /// Wall-clock budget for the ReAct branch of one clause.
    pub react_clause_timeout: Duration,
    pub react_temperature: f32,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Gen3,
            react_max_iterations: 5,
            react_clause_timeout: Duration::from_secs(30),
            react_temperature: 0.1,
        }
    }
}

impl GraphSettings {
    /// Reads `EXECUTION_MODE`, `REACT_MAX_ITERATIONS`,
    /// `REACT_CLAUSE_TIMEOUT_SECS` and `REACT_TEMPERATURE`, falling back to
    /// defaults on anything missing or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mode = match std::env::var("EXECUTION_MODE")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "legacy" => ExecutionMode::Legacy,
            _ => ExecutionMode::Gen3,
        };
        Self {
            mode,
            react_max_iterations: env_parse("REACT_MAX_ITERATIONS")
                .unwrap_or(defaults.react_max_iterations),
            react_clause_timeout: env_parse::<f64>("REACT_CLAUSE_TIMEOUT_SECS")
                .map(Duration::from_secs_f64)
                .unwrap_or(defaults.react_clause_timeout),
            react_temperature: env_parse("REACT_TEMPERATURE").unwrap_or(defaults.react_temperature),
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_gen3_with_30s_timeout() {
        let settings = GraphSettings::default();
        assert_eq!(settings.mode, ExecutionMode::Gen3);
        assert_eq!(settings.react_clause_timeout, Duration::from_secs(30));
        assert_eq!(settings.react_max_iterations, 5);
    }
}
