// Command classification tables
// Streaming-command rewrites and prompt auto-responses, kept as ordered data

use regex::Regex;
use std::collections::BTreeMap;
use std::time::Duration;

/// How a streaming command is bounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRewrite {
    /// `pm2 logs`: `--lines N --nostream`
    Pm2Lines,
    /// `docker logs -f`: drop follow, `--tail N`
    DockerTail,
    /// `tail -f`: `timeout S tail ... | head -n N`
    TailHead,
    /// `journalctl -f`: drop follow, `-n N`
    JournalLines,
    /// Anything else: `timeout S ...`
    HardTimeout,
}

/// Ordered: first match wins
const STREAMING_RULES: &[(&str, StreamRewrite)] = &[
    (r"(?i)^pm2\s+logs?\b", StreamRewrite::Pm2Lines),
    (r"(?i)^docker\s+logs?\s+(-f|--follow)", StreamRewrite::DockerTail),
    (r"(?i)^tail\s+-f", StreamRewrite::TailHead),
    (r"(?i)^journalctl\s+-f", StreamRewrite::JournalLines),
    (r"(?i)^watch\b", StreamRewrite::HardTimeout),
    (r"(?i)^top\b", StreamRewrite::HardTimeout),
    (r"(?i)^htop\b", StreamRewrite::HardTimeout),
    (r"(?i)^less\b", StreamRewrite::HardTimeout),
    (r"(?i)^more\b", StreamRewrite::HardTimeout),
    (r"(?i)^vim?\b", StreamRewrite::HardTimeout),
    (r"(?i)^nano\b", StreamRewrite::HardTimeout),
];

/// Built-in prompt table (case-insensitive substring -> response), checked after caller responses
const PROMPT_RULES: &[(&str, &str)] = &[
    ("continue connecting", "yes"),
    ("are you sure", "yes"),
    ("(yes/no)", "yes"),
    ("do you want to continue", "y"),
    ("[y/n]", "y"),
    ("overwrite", "y"),
    ("save", "y"),
];

struct StreamingRule {
    pattern: Regex,
    rewrite: StreamRewrite,
}

/// Bounds injected into rewritten streaming commands
#[derive(Debug, Clone, Copy)]
pub struct StreamLimits {
    pub lines: usize,
    pub timeout: Duration,
}

pub struct CommandClassifier {
    streaming: Vec<StreamingRule>,
    prompts: Vec<(String, String)>,
}

impl Default for CommandClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CommandClassifier {
    pub fn builtin() -> Self {
        let streaming = STREAMING_RULES
            .iter()
            .filter_map(|(pattern, rewrite)| {
                Regex::new(pattern).ok().map(|pattern| StreamingRule {
                    pattern,
                    rewrite: *rewrite,
                })
            })
            .collect();
        let prompts = PROMPT_RULES
            .iter()
            .map(|(p, r)| (p.to_string(), r.to_string()))
            .collect();
        Self { streaming, prompts }
    }

    /// Add a prompt rule after the built-in ones
    pub fn with_prompt(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.prompts.push((pattern.into(), response.into()));
        self
    }

    pub fn streaming_kind(&self, command: &str) -> Option<StreamRewrite> {
        let command = command.trim();
        self.streaming
            .iter()
            .find(|rule| rule.pattern.is_match(command))
            .map(|rule| rule.rewrite)
    }

    /// Bounded form of `command`, or `None` when it is not streaming and not forced
    pub fn rewrite(&self, command: &str, force: bool, limits: StreamLimits) -> Option<String> {
        let kind = match (self.streaming_kind(command), force) {
            (Some(kind), _) => kind,
            (None, true) => StreamRewrite::HardTimeout,
            (None, false) => return None,
        };
        let command = command.trim();
        let lines = limits.lines;
        let secs = limits.timeout.as_secs().max(1);

        let rewritten = match kind {
            StreamRewrite::Pm2Lines => {
                let base = strip(command, &[r"\s+--lines\s+\d+", r"(?i)\s+--nostream"]);
                format!("{} --lines {} --nostream", base, lines)
            }
            StreamRewrite::DockerTail => {
                let base = strip(command, &[r"\s+(-f|--follow)\b", r"\s+--tail\s+\d+"]);
                format!("{} --tail {}", base, lines)
            }
            StreamRewrite::TailHead => {
                let base = strip(command, &[r"\s+-f\b"]);
                format!("timeout {} {} | head -n {}", secs, base, lines)
            }
            StreamRewrite::JournalLines => {
                let base = strip(command, &[r"\s+-f\b"]);
                format!("{} -n {}", base, lines)
            }
            StreamRewrite::HardTimeout => format!("timeout {} {}", secs, command),
        };
        Some(rewritten)
    }

    /// First prompt rule whose pattern occurs in `text`; caller responses win
    pub fn match_prompt<'a>(
        &'a self,
        text: &str,
        custom: &'a BTreeMap<String, String>,
    ) -> Option<(&'a str, &'a str)> {
        let text = text.to_lowercase();
        custom
            .iter()
            .map(|(p, r)| (p.as_str(), r.as_str()))
            .chain(self.prompts.iter().map(|(p, r)| (p.as_str(), r.as_str())))
            .find(|(pattern, _)| !pattern.is_empty() && text.contains(&pattern.to_lowercase()))
    }
}

fn strip(command: &str, patterns: &[&str]) -> String {
    patterns.iter().fold(command.to_string(), |acc, pattern| {
        match Regex::new(pattern) {
            Ok(re) => re.replace_all(&acc, "").into_owned(),
            Err(_) => acc,
        }
    })
}
