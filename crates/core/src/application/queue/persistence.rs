// Snapshot encoding
// The snapshot is a pretty-printed JSON object keyed by job id

use crate::domain::Job;
use std::collections::BTreeMap;

/// Serialize the jobs worth keeping across a restart
pub(super) fn render<'a>(
    jobs: impl IntoIterator<Item = &'a Job>,
    now_millis: i64,
    retention_ms: i64,
) -> serde_json::Result<(String, usize)> {
    let kept: BTreeMap<&str, &Job> = jobs
        .into_iter()
        .filter(|job| job.should_persist(now_millis, retention_ms))
        .map(|job| (job.id.as_str(), job))
        .collect();
    let count = kept.len();
    Ok((serde_json::to_string_pretty(&kept)?, count))
}

/// Parsed snapshot: readable jobs plus the ids of records that were skipped
pub(super) struct Parsed {
    pub jobs: Vec<Job>,
    pub skipped: Vec<(String, String)>,
}

/// Parse a snapshot; fails only when the document itself is unusable
pub(super) fn parse(raw: &str) -> Result<Parsed, String> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let serde_json::Value::Object(records) = value else {
        return Err("snapshot is not a JSON object".to_string());
    };

    let mut parsed = Parsed {
        jobs: Vec::with_capacity(records.len()),
        skipped: Vec::new(),
    };
    for (key, record) in records {
        match serde_json::from_value::<Job>(record) {
            Ok(job) => parsed.jobs.push(job),
            Err(e) => parsed.skipped.push((key, e.to_string())),
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommandSpec, JobSpec, JobStatus};

    const DAY: i64 = 24 * 3600 * 1000;

    #[test]
    fn test_render_drops_old_terminal_jobs() {
        let spec = JobSpec::Ssh(CommandSpec::new("ls"));
        let mut old_done = Job::new("old", 0, "a", spec.clone());
        old_done.status = JobStatus::Completed;
        let mut old_crashed = Job::new("crash", 0, "a", spec.clone());
        old_crashed.status = JobStatus::Crashed;
        let fresh = Job::new("new", 2 * DAY, "a", spec);

        let (json, count) = render([&old_done, &old_crashed, &fresh], 2 * DAY + 10, DAY).unwrap();
        assert_eq!(count, 2);
        assert!(json.contains("\"crash\""));
        assert!(!json.contains("\"old\""));
    }

    #[test]
    fn test_parse_skips_malformed_records() {
        let spec = JobSpec::Ssh(CommandSpec::new("ls"));
        let good = serde_json::to_value(Job::new("good", 5, "a", spec)).unwrap();
        let raw = serde_json::json!({"good": good, "bad": {"id": 42}}).to_string();

        let parsed = parse(&raw).unwrap();
        assert_eq!(parsed.jobs.len(), 1);
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].0, "bad");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("{not json").is_err());
        assert!(parse("[1, 2]").is_err());
    }
}
