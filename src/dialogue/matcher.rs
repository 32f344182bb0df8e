//! Resolve a free-text task reference against the user's open tasks.

use crate::config::MatcherConfig;
use crate::dialogue::intent::Slots;
use crate::dialogue::text::{normalize_title, similarity};
use crate::ledger::Task;
use std::cmp::Ordering;

/// Outcome of matching: a unique task, a set to choose from, or neither
/// ("not found").
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub matched: Option<Task>,
    pub options: Vec<Task>,
}

impl MatchResult {
    fn unique(task: &Task) -> Self {
        Self {
            matched: Some(task.clone()),
            options: Vec::new(),
        }
    }

    fn choose(options: Vec<Task>) -> Self {
        Self {
            matched: None,
            options,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.matched.is_none() && self.options.is_empty()
    }
}

/// Match `slots` against `candidates`. Never guesses: a weak or absent match
/// returns nothing.
pub fn match_task(candidates: &[Task], slots: &Slots, config: &MatcherConfig) -> MatchResult {
    if let Some(id) = &slots.task_id {
        return candidates
            .iter()
            .find(|task| &task.id == id)
            .map_or_else(MatchResult::default, MatchResult::unique);
    }

    let reference = normalize_title(slots.task_name());
    if !slots.explicit_task || reference.is_empty() {
        return match candidates {
            [] => MatchResult::default(),
            [only] => MatchResult::unique(only),
            many => MatchResult::choose(many.to_vec()),
        };
    }

    let titled: Vec<(String, &Task)> = candidates
        .iter()
        .map(|task| (normalize_title(&task.title), task))
        .filter(|(title, _)| !title.is_empty())
        .collect();

    let exact: Vec<&Task> = titled
        .iter()
        .filter(|(title, _)| *title == reference)
        .map(|(_, task)| *task)
        .collect();
    if let Some(result) = narrow(&exact, config) {
        return result;
    }

    let contained: Vec<&Task> = titled
        .iter()
        .filter(|(title, _)| title.contains(&reference) || reference.contains(title.as_str()))
        .map(|(_, task)| *task)
        .collect();
    if let Some(result) = narrow(&contained, config) {
        return result;
    }

    let mut scored: Vec<(f64, &Task)> = titled
        .iter()
        .map(|(title, task)| (similarity(title, &reference), *task))
        .filter(|(score, _)| *score >= config.min_similarity)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    let Some(&(best, _)) = scored.first() else {
        return MatchResult::default();
    };
    let tied: Vec<&Task> = scored
        .iter()
        .take_while(|(score, _)| best - score <= config.tie_tolerance)
        .map(|(_, task)| *task)
        .collect();
    narrow(&tied, config).unwrap_or_default()
}

fn narrow(tasks: &[&Task], config: &MatcherConfig) -> Option<MatchResult> {
    match tasks {
        [] => None,
        [only] => Some(MatchResult::unique(only)),
        many => Some(MatchResult::choose(
            many.iter()
                .take(config.max_options)
                .map(|task| (*task).clone())
                .collect(),
        )),
    }
}
