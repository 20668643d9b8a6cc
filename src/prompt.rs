use dialoguer::Confirm as DialoguerConfirm;
use dialoguer::theme::ColorfulTheme;

use crate::error::DeployResult;

/// Asks the operator a yes/no question.
pub trait Confirm {
    fn confirm(&self, question: &str) -> DeployResult<bool>;
}

/// Prompts on the terminal. The default answer is "yes".
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl Confirm for TerminalPrompt {
    fn confirm(&self, question: &str) -> DeployResult<bool> {
        let answer = DialoguerConfirm::with_theme(&ColorfulTheme::default())
            .with_prompt(question)
            .default(true)
            .interact()?;
        Ok(answer)
    }
}

/// Answers every question the same way without asking, e.g. for
/// `--yes` or unattended runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&self, question: &str) -> DeployResult<bool> {
        tracing::debug!(question, answer = self.0, "answering prompt");
        Ok(self.0)
    }
}
