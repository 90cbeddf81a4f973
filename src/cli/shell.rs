use anyhow::Result;
use clap::Parser;
use log::debug;
use std::io;

use crate::app::App;
use crate::cli::utils::{print_error, print_header, print_info, read_line_from};
use crate::cli::{execute, Commands, Context};

/// One line typed into the shell
#[derive(Parser, Debug)]
#[clap(name = "accessible-auth", no_binary_name = true, disable_version_flag = true)]
struct ShellLine {
    #[clap(subcommand)]
    command: Commands,
}

/// Split a line into words, keeping double-quoted text together
fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Interactive loop; every command of the CLI is available without the program name
pub fn run(app: &App, ctx: &Context) -> Result<()> {
    // The lock is taken per line so commands can prompt for input themselves
    run_with(app, ctx, |prompt| read_line_from(&mut io::stdin().lock(), prompt))
}

fn run_with<F>(app: &App, ctx: &Context, mut next_line: F) -> Result<()>
where
    F: FnMut(&str) -> Result<Option<String>>,
{
    print_header(&app.config.app_name);
    print_info("Type help for the list of commands, or exit to leave.");

    loop {
        let Some(line) = next_line("> ")? else {
            debug!("Shell input closed");
            println!();
            break;
        };
        let words = split_words(&line);

        match words.first().map(String::as_str) {
            None => continue,
            Some("exit") | Some("quit") => break,
            _ => {}
        }

        let parsed = match ShellLine::try_parse_from(&words) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Also covers help output
                let _ = e.print();
                continue;
            }
        };

        if let Commands::Shell = parsed.command {
            print_info("You are already in the shell.");
            continue;
        }

        debug!("Shell command: {:?}", words.first());
        if let Err(e) = execute(app, ctx, &parsed.command) {
            print_error(&format!("{:#}", e));
        }
    }

    print_info("Goodbye.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::io::{BufRead, Cursor};
    use tempfile::{tempdir, TempDir};

    fn test_app() -> (TempDir, App) {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("shell.db").to_str().unwrap().to_string();
        config.email.outbox_dir = dir.path().join("outbox").to_str().unwrap().to_string();
        config.security.argon2_memory_kib = 1024;
        config.security.argon2_iterations = 1;
        let app = App::build(config).unwrap();
        (dir, app)
    }

    #[test]
    fn test_shell_stops_when_input_closes() {
        let (_dir, app) = test_app();
        let ctx = Context::new(&app, "127.0.0.1");
        let mut input = io::empty();

        run_with(&app, &ctx, |prompt| read_line_from(&mut input, prompt)).unwrap();
    }

    #[test]
    fn test_shell_skips_blank_lines_and_stops_at_exit() {
        let (_dir, app) = test_app();
        let ctx = Context::new(&app, "127.0.0.1");
        let mut input = Cursor::new("\n   \nquit\nlogout\n");
        let mut prompts = 0;

        run_with(&app, &ctx, |prompt| {
            prompts += 1;
            read_line_from(&mut input, prompt)
        })
        .unwrap();

        assert_eq!(prompts, 3);
        let mut rest = String::new();
        input.read_line(&mut rest).unwrap();
        assert_eq!(rest, "logout\n");
    }

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("  login   --email a@b.co "), vec!["login", "--email", "a@b.co"]);
        assert_eq!(
            split_words(r#"profile update --timezone "America/New York""#),
            vec!["profile", "update", "--timezone", "America/New York"]
        );
        assert!(split_words("   ").is_empty());
    }

    #[test]
    fn test_shell_line_parses_without_program_name() {
        let parsed = ShellLine::try_parse_from(split_words("send-code --email a@b.co")).unwrap();
        assert!(matches!(parsed.command, Commands::SendCode { ref email } if email == "a@b.co"));

        assert!(ShellLine::try_parse_from(split_words("transfer --amount 10")).is_err());
    }
}
