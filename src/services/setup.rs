use crate::core::config::Config;
use crate::services::auth::AuthService;
use anyhow::Result;
use inquire::{CustomType, Password, Select, Text};

const LOGIN: &str = "Log in";
const REGISTER: &str = "Create an account";

/// Makes sure a token is stored and a story is chosen. Returns the story id.
pub async fn run_setup(config: &mut Config, auth: &AuthService) -> Result<u64> {
    if auth.is_logged_in() {
        log::info!("Using stored session from {}", config.session_file);
    } else {
        login_interactively(auth).await?;
    }

    let story_id = match config.story_id {
        Some(id) => id,
        None => {
            let id = CustomType::<u64>::new("Story id:")
                .with_help_message("The story the generated chapters and characters are saved to")
                .with_error_message("Please enter a numeric story id")
                .prompt()?;
            config.story_id = Some(id);
            config.save()?;
            println!("Configuration saved.");
            id
        }
    };

    Ok(story_id)
}

pub async fn login_interactively(auth: &AuthService) -> Result<()> {
    loop {
        let action = Select::new("You are not logged in:", vec![LOGIN, REGISTER]).prompt()?;

        let email = Text::new("Email:").prompt()?;
        if action == REGISTER {
            let password = Password::new("Password:").without_confirmation().prompt()?;
            let confirm = Password::new("Confirm password:")
                .without_confirmation()
                .prompt()?;
            match auth.register(&email, &password, &confirm).await {
                Ok(message) => println!("{}", message),
                Err(errors) => print_errors(&errors.messages()),
            }
            continue;
        }

        let password = Password::new("Password:").without_confirmation().prompt()?;
        match auth.login(&email, &password).await {
            Ok(()) => {
                println!("Logged in.");
                return Ok(());
            }
            Err(errors) => print_errors(&errors.messages()),
        }
    }
}

fn print_errors(messages: &[&str]) {
    for message in messages {
        eprintln!("  {}", message);
    }
}
