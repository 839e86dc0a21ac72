use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};

/// A line breakpoint. Numbers are never reused within a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakpoint {
    pub number: usize,
    pub filename: String,
    pub line: usize,
    pub temporary: bool,
    pub enabled: bool,
    pub hits: usize,
    pub condition: Option<String>,
}

impl Breakpoint {
    /// `[number, filename, lineno, temporary, enabled, hits, condition]`
    pub fn to_row(&self) -> Value {
        json!([
            self.number,
            self.filename,
            self.line,
            self.temporary,
            self.enabled,
            self.hits,
            self.condition
        ])
    }
}

#[derive(Debug, Default)]
pub struct Breakpoints {
    entries: BTreeMap<usize, Breakpoint>,
    last_number: usize,
}

impl Breakpoints {
    pub fn insert(&mut self, filename: &str, line: usize, temporary: bool, condition: Option<String>) -> usize {
        self.last_number += 1;
        let number = self.last_number;
        self.entries.insert(
            number,
            Breakpoint {
                number,
                filename: filename.to_string(),
                line,
                temporary,
                enabled: true,
                hits: 0,
                condition,
            },
        );
        number
    }

    pub fn get(&self, number: usize) -> Option<&Breakpoint> {
        self.entries.get(&number)
    }

    pub fn remove(&mut self, number: usize) -> Option<Breakpoint> {
        self.entries.remove(&number)
    }

    /// Removes every breakpoint on `filename:line`, returning their numbers.
    pub fn clear_line(&mut self, filename: &str, line: usize) -> Vec<usize> {
        self.clear_where(|bp| bp.filename == filename && bp.line == line)
    }

    pub fn clear_file(&mut self, filename: &str) -> Vec<usize> {
        self.clear_where(|bp| bp.filename == filename)
    }

    fn clear_where(&mut self, predicate: impl Fn(&Breakpoint) -> bool) -> Vec<usize> {
        let numbers: Vec<usize> = self
            .entries
            .values()
            .filter(|bp| predicate(bp))
            .map(|bp| bp.number)
            .collect();
        for number in &numbers {
            self.entries.remove(number);
        }
        numbers
    }

    pub fn set_enabled(&mut self, number: usize, enabled: bool) -> bool {
        match self.entries.get_mut(&number) {
            Some(bp) => {
                bp.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Enabled breakpoints on `filename:line`, as `(number, condition)`.
    pub fn active_at(&self, filename: &str, line: usize) -> Vec<(usize, Option<String>)> {
        self.entries
            .values()
            .filter(|bp| bp.enabled && bp.line == line && bp.filename == filename)
            .map(|bp| (bp.number, bp.condition.clone()))
            .collect()
    }

    pub fn has_line(&self, filename: &str, line: usize) -> bool {
        self.entries
            .values()
            .any(|bp| bp.line == line && bp.filename == filename)
    }

    /// Counts a hit. Temporary breakpoints are deleted by their first hit.
    pub fn record_hit(&mut self, number: usize) {
        let temporary = match self.entries.get_mut(&number) {
            Some(bp) => {
                bp.hits += 1;
                bp.temporary
            }
            None => return,
        };
        if temporary {
            self.entries.remove(&number);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
