use crate::core::state::{Message, Role};
use crate::services::auth::AuthService;
use crate::services::chat::{ChatController, SubmitOutcome};
use crate::services::setup::login_interactively;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Text;
use std::time::Duration;

const QUIT: &str = "/quit";
const LOGOUT: &str = "/logout";
const RESTART: &str = "/restart";

/// Terminal chat loop. Returns when the user quits or logs out.
pub async fn run_chat(controller: &ChatController, auth: &AuthService) -> Result<()> {
    println!(
        "Story {}: describe what your story should be about. Commands: {} {} {}",
        controller.story_id(),
        RESTART,
        LOGOUT,
        QUIT
    );

    loop {
        let input = match controller.expected_answers() {
            Some(count) if count > 0 => collect_answers(count)?,
            _ => Text::new(">").prompt()?,
        };

        match input.trim() {
            QUIT => return Ok(()),
            LOGOUT => {
                auth.logout().await;
                println!("Logged out.");
                return Ok(());
            }
            RESTART => {
                controller.reset();
                println!("Starting over.");
                continue;
            }
            _ => {}
        }

        let shown = controller.transcript().len();
        let spinner = spinner()?;
        let outcome = controller.submit(&input).await;
        spinner.finish_and_clear();

        // The user's own echo is already on screen
        for message in controller.messages_since(shown) {
            if message.role == Role::Assistant {
                print_message(&message);
            }
        }

        match outcome {
            SubmitOutcome::LoginRequired => {
                println!("Your session has expired.");
                login_interactively(auth).await?;
            }
            SubmitOutcome::Failed(reason) => {
                eprintln!("Request failed: {}. Send your message again to retry.", reason)
            }
            SubmitOutcome::Ignored => println!("Nothing to send."),
            SubmitOutcome::Applied { step: 5, .. } => {
                println!("Your story is ready. Use {} to write another one.", RESTART)
            }
            _ => {}
        }
    }
}

/// The interview step wants one answer per question, newline separated.
fn collect_answers(count: usize) -> Result<String> {
    let mut answers = Vec::with_capacity(count);
    for i in 1..=count {
        let answer = Text::new(&format!("Answer {}/{}:", i, count))
            .with_help_message("Leave blank to let the writer decide; at least one answer is needed")
            .prompt()?;
        if i == 1 && answer.trim().starts_with('/') {
            return Ok(answer);
        }
        answers.push(answer);
    }
    Ok(answers.join("\n"))
}

fn spinner() -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message("Writing...");
    pb.enable_steady_tick(Duration::from_millis(120));
    Ok(pb)
}

fn print_message(message: &Message) {
    println!(
        "\n[{}] {}\n",
        message.produced_at.with_timezone(&chrono::Local).format("%H:%M:%S"),
        message.content
    );
}
