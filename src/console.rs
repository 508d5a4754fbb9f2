//! Terminal front end for a running scan: status spinner and error prompts.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use syncscan_core::{ErrorPolicy, ScanError};
use syncscan_scan::{ErrorDecision, FillBufferCallback};
use tracing::warn;

const STATUS_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {wide_msg}";

/// Console callback drawing to stderr and reading answers from `input`.
pub struct ConsoleCallback {
    policy: ErrorPolicy,
    input: Box<dyn BufRead>,
    bar: ProgressBar,
    errors_seen: usize,
}

impl ConsoleCallback {
    pub fn new(policy: ErrorPolicy) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template(STATUS_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));

        Self::with_bar(policy, Box::new(io::stdin().lock()), bar)
    }

    /// Console without a visible spinner, answering prompts from `input`.
    pub fn with_input(policy: ErrorPolicy, input: Box<dyn BufRead>) -> Self {
        Self::with_bar(policy, input, ProgressBar::hidden())
    }

    fn with_bar(policy: ErrorPolicy, input: Box<dyn BufRead>, bar: ProgressBar) -> Self {
        Self {
            policy,
            input,
            bar,
            errors_seen: 0,
        }
    }

    pub fn errors_seen(&self) -> usize {
        self.errors_seen
    }

    /// Remove the spinner line.
    pub fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}

impl FillBufferCallback for ConsoleCallback {
    fn report_status(&mut self, status_msg: &str, items_scanned: u64) -> Result<(), ScanError> {
        self.bar.set_message(format!("{items_scanned} items  {status_msg}"));
        Ok(())
    }

    fn report_error(
        &mut self,
        msg: &str,
        retry_number: usize,
    ) -> Result<ErrorDecision, ScanError> {
        if retry_number == 0 {
            self.errors_seen += 1;
        }

        match self.policy {
            ErrorPolicy::Prompt => {
                let input = &mut self.input;
                self.bar.suspend(|| {
                    eprintln!("{msg}");
                    prompt(input.as_mut(), retry_number)
                })
            }
            ErrorPolicy::Continue => {
                self.bar.suspend(|| eprintln!("{msg}"));
                warn!(retry_number, "continuing after read error");
                Ok(ErrorDecision::Continue)
            }
            ErrorPolicy::Abort => {
                self.bar.suspend(|| eprintln!("{msg}"));
                Err(ScanError::aborted(
                    msg.lines().next().unwrap_or_default().to_string(),
                ))
            }
        }
    }
}

fn prompt(input: &mut dyn BufRead, retry_number: usize) -> Result<ErrorDecision, ScanError> {
    loop {
        if retry_number > 0 {
            eprint!("[r]etry (attempt {}), [c]ontinue, [a]bort? ", retry_number + 1);
        } else {
            eprint!("[r]etry, [c]ontinue, [a]bort? ");
        }
        let _ = io::stderr().flush();

        let mut line = String::new();
        let read = input.read_line(&mut line).map_err(|e| ScanError::Other {
            message: format!("cannot read answer: {e}"),
        })?;
        if read == 0 {
            return Err(ScanError::aborted("input closed while waiting for an answer"));
        }

        match parse_answer(&line) {
            Some(Answer::Retry) => return Ok(ErrorDecision::Retry),
            Some(Answer::Continue) => return Ok(ErrorDecision::Continue),
            Some(Answer::Abort) => return Err(ScanError::aborted("aborted by user")),
            None => eprintln!("Please answer r, c or a."),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Answer {
    Retry,
    Continue,
    Abort,
}

fn parse_answer(line: &str) -> Option<Answer> {
    match line.trim().to_ascii_lowercase().as_str() {
        "r" | "retry" => Some(Answer::Retry),
        "c" | "continue" | "" => Some(Answer::Continue),
        "a" | "abort" => Some(Answer::Abort),
        _ => None,
    }
}
