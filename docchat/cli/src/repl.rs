//! Read-eval loop over stdin

use anyhow::{Context, Result};
use docchat_core::{
    AnswerBackend, Attachment, DispatchError, Dispatcher, SubmitOutcome, Submission,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::commands::{parse_command, Command, HELP_TEXT};
use crate::render::Console;

/// Interactive session driving one dispatcher
pub struct Repl<B: AnswerBackend> {
    dispatcher: Dispatcher<B>,
    console: mpsc::Sender<Console>,
    /// Document to send with the next query
    attachment: Option<Attachment>,
}

impl<B: AnswerBackend + 'static> Repl<B> {
    /// Create a REPL around `dispatcher`
    pub fn new(dispatcher: Dispatcher<B>, console: mpsc::Sender<Console>) -> Self {
        Self {
            dispatcher,
            console,
            attachment: None,
        }
    }

    /// Read lines until `/quit`, end of input or Ctrl-C at the prompt
    pub async fn run(mut self) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            self.say(Console::Prompt).await;

            let line = tokio::select! {
                line = lines.next_line() => line.context("Failed to read input")?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted at prompt");
                    None
                }
            };
            let Some(line) = line else {
                break;
            };

            match parse_command(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => self.execute(command).await,
                Err(e) => self.info(e.to_string()).await,
            }
        }

        self.dispatcher.shutdown().await;
        Ok(())
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::Query(query) => self.ask(query).await,

            Command::Attach(path) => match Attachment::from_path(&path).await {
                Ok(attachment) => {
                    self.info(format!(
                        "Attached {} ({} bytes); it will be sent with your next question.",
                        attachment.file_name(),
                        attachment.bytes().len()
                    ))
                    .await;
                    self.attachment = Some(attachment);
                }
                Err(e) => self.info(e.to_string()).await,
            },

            Command::Detach => {
                if let Some(attachment) = self.attachment.take() {
                    self.info(format!("Dropped {}.", attachment.file_name())).await;
                }
            }

            Command::Clear => {
                if let Err(e) = self.dispatcher.clear_history().await {
                    self.info(e.to_string()).await;
                }
            }

            Command::Help => self.info(HELP_TEXT.to_string()).await,

            Command::Quit => {}
        }
    }

    async fn ask(&mut self, query: String) {
        let mut submission = Submission::text(query);
        let blank = submission.query.trim().is_empty();
        if !blank {
            if let Some(attachment) = self.attachment.take() {
                submission = submission.with_attachment(attachment);
            }
        }

        match self.dispatcher.submit(submission).await {
            Ok(SubmitOutcome::Streaming(_)) => self.await_answer().await,
            Ok(SubmitOutcome::Answered(_) | SubmitOutcome::Failed(_))
            | Err(DispatchError::EmptyQuery) => {}
            Err(e) => self.info(e.to_string()).await,
        }
    }

    /// Wait for the streamed answer; Ctrl-C cancels it
    async fn await_answer(&mut self) {
        tokio::select! {
            () = self.dispatcher.wait_streaming() => {}
            _ = tokio::signal::ctrl_c() => {
                self.dispatcher.cancel_streaming().await;
            }
        }
    }

    async fn info(&self, text: String) {
        self.say(Console::Info(text)).await;
    }

    async fn say(&self, console: Console) {
        if self.console.send(console).await.is_err() {
            tracing::debug!("Renderer stopped");
        }
    }
}
