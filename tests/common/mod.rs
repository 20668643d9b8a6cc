#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;

use fdm::error::{DeployError, DeployResult};
use fdm::{CommandLine, Runner};

type Answer = Result<String, i32>;

/// Runner that records every command and answers from a script.
///
/// Answers are matched by argv prefix, first registered rule wins.
/// A rule with several answers hands them out in order and then keeps
/// repeating the last one. Unmatched commands succeed with no output.
#[derive(Default)]
pub struct RecordingRunner {
    calls: RefCell<Vec<CommandLine>>,
    rules: RefCell<Vec<(Vec<String>, VecDeque<Answer>)>>,
    fetched: RefCell<Vec<(String, String)>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, prefix: &[&str], stdout: &str) -> &Self {
        self.push(prefix, Ok(stdout.to_string()))
    }

    pub fn fail(&self, prefix: &[&str], code: i32) -> &Self {
        self.push(prefix, Err(code))
    }

    fn push(&self, prefix: &[&str], answer: Answer) -> &Self {
        let prefix: Vec<String> = prefix.iter().map(ToString::to_string).collect();
        let mut rules = self.rules.borrow_mut();
        if let Some((_, answers)) = rules.iter_mut().find(|(p, _)| *p == prefix) {
            answers.push_back(answer);
        } else {
            rules.push((prefix, VecDeque::from([answer])));
        }
        self
    }

    fn answer(&self, command: &CommandLine) -> Answer {
        self.calls.borrow_mut().push(command.clone());
        let mut rules = self.rules.borrow_mut();
        for (prefix, answers) in rules.iter_mut() {
            let words: Vec<&str> = prefix.iter().map(String::as_str).collect();
            if command.starts_with(&words) {
                return if answers.len() > 1 {
                    answers.pop_front().unwrap()
                } else {
                    answers.front().cloned().unwrap()
                };
            }
        }
        Ok(String::new())
    }

    pub fn calls(&self) -> Vec<CommandLine> {
        self.calls.borrow().clone()
    }

    /// Every recorded command rendered as a shell line.
    pub fn lines(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(CommandLine::to_shell)
            .collect()
    }

    /// Index of the first recorded command starting with `prefix`.
    pub fn position(&self, prefix: &[&str]) -> Option<usize> {
        self.calls
            .borrow()
            .iter()
            .position(|c| c.starts_with(prefix))
    }

    pub fn count(&self, prefix: &[&str]) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn fetched(&self) -> Vec<(String, String)> {
        self.fetched.borrow().clone()
    }
}

impl Runner for RecordingRunner {
    fn run(&self, command: &CommandLine) -> DeployResult<String> {
        self.answer(command).map_err(|code| DeployError::CommandFailed {
            command: command.to_shell(),
            code: Some(code),
            stderr: String::new(),
        })
    }

    fn succeeds(&self, command: &CommandLine) -> DeployResult<bool> {
        Ok(self.answer(command).is_ok())
    }

    fn run_interactive(&self, command: &CommandLine) -> DeployResult<()> {
        self.run(command).map(|_| ())
    }

    fn fetch(&self, target_path: &str, local_path: &str) -> DeployResult<()> {
        self.fetched
            .borrow_mut()
            .push((target_path.to_string(), local_path.to_string()));
        Ok(())
    }

    fn target(&self) -> String {
        "recorder".to_string()
    }
}

/// One `docker ps --format '{{json .}}'` line.
pub fn ps_line(id: &str, name: &str) -> String {
    format!(r#"{{"ID":"{id}","Names":"{name}","Image":"x","Status":"Up 2 hours"}}"#)
}
