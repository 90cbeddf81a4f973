use anyhow::{anyhow, Context, Result};
use std::io::{self, BufRead, Write};

/// Print the prompt and read one line from `reader`; `None` once the input is closed
pub fn read_line_from<R: BufRead>(reader: &mut R, prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    if reader.read_line(&mut input)? == 0 {
        return Ok(None);
    }

    // Trim whitespace and newlines
    Ok(Some(input.trim().to_string()))
}

/// Read a line of input from the terminal
pub fn read_line(prompt: &str) -> Result<String> {
    read_line_from(&mut io::stdin().lock(), prompt)?.ok_or_else(|| anyhow!("Input closed"))
}

/// Read a hidden line of input from the terminal (like a password)
pub fn read_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("Failed to read password")
}

/// Prompt twice and require both entries to match
pub fn read_new_password() -> Result<String> {
    loop {
        let password = read_password("New password: ")?;
        let confirmation = read_password("Repeat password: ")?;
        if password == confirmation {
            return Ok(password);
        }
        print_error("Passwords do not match. Try again.");
    }
}

/// Ask a yes/no question; anything but y/yes is a no
pub fn confirm(question: &str) -> Result<bool> {
    let answer = read_line(&format!("{} [y/N]: ", question))?;
    Ok(matches!(answer.to_lowercase().as_str(), "y" | "yes"))
}

// Plain prefixes read well with screen readers, unlike symbols

pub fn print_success(message: &str) {
    println!("Success: {}", message);
}

pub fn print_error(message: &str) {
    eprintln!("Error: {}", message);
}

pub fn print_warning(message: &str) {
    println!("Warning: {}", message);
}

pub fn print_info(message: &str) {
    println!("{}", message);
}

pub fn print_header(title: &str) {
    println!("\n{}\n{}", title, "=".repeat(title.chars().count()));
}

/// Print a labelled value, skipping empty ones
pub fn print_field(label: &str, value: Option<impl AsRef<str>>) {
    if let Some(value) = value {
        let value: &str = value.as_ref();
        if !value.is_empty() {
            println!("{}: {}", label, value);
        }
    }
}

pub fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_line_from_trims_and_reports_end_of_input() {
        let mut input = Cursor::new("  yes \n");

        assert_eq!(read_line_from(&mut input, "> ").unwrap().as_deref(), Some("yes"));
        assert_eq!(read_line_from(&mut input, "> ").unwrap(), None);
        assert_eq!(read_line_from(&mut io::empty(), "> ").unwrap(), None);
    }
}
