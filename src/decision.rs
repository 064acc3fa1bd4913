use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};

/// What to do about a camera that failed to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Keep recording from the other cameras
    Continue,
    /// Stop the whole run
    Abort,
}

/// Asked once per reported failure, in the order failures were reported.
pub trait FailureDecider: Send {
    fn decide(&mut self, source_id: usize) -> Result<Decision>;
}

/// Always answers the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub Decision);

impl FailureDecider for FixedDecision {
    fn decide(&mut self, _source_id: usize) -> Result<Decision> {
        Ok(self.0)
    }
}

/// Asks an operator on a terminal.
pub struct PromptDecider<R, W> {
    input: R,
    output: W,
}

impl<R, W> PromptDecider<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl PromptDecider<std::io::BufReader<std::io::Stdin>, std::io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(std::io::BufReader::new(std::io::stdin()), std::io::stderr())
    }
}

impl<R, W> FailureDecider for PromptDecider<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn decide(&mut self, source_id: usize) -> Result<Decision> {
        loop {
            write!(
                self.output,
                "Camera {} failed to connect. Continue without it? [y/N] ",
                source_id + 1
            )
            .context("Failed to write prompt")?;
            self.output.flush().context("Failed to flush prompt")?;

            let mut answer = String::new();
            let read = self
                .input
                .read_line(&mut answer)
                .context("Failed to read answer")?;
            if read == 0 {
                bail!("input closed before camera {} failure was answered", source_id + 1);
            }

            match answer.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => return Ok(Decision::Continue),
                "" | "n" | "no" => return Ok(Decision::Abort),
                other => {
                    writeln!(self.output, "Please answer y or n (got {:?})", other)
                        .context("Failed to write prompt")?;
                }
            }
        }
    }
}
