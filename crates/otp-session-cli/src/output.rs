//! Output formatting for the CLI.

use clap::ValueEnum;
use serde::Serialize;
use session_engine::AuthError;

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print a serializable value, using `text` for the human-readable form.
pub fn print<T: Serialize>(value: &T, text: &str, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", text),
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", text),
        },
    }
}

/// Print a success message.
pub fn print_success(message: &str, format: OutputFormat) {
    match format {
        OutputFormat::Text => println!("{}", message),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "status": "success", "message": message })
        ),
    }
}

/// Print an error message.
pub fn print_error(message: &str, format: OutputFormat) {
    match format {
        OutputFormat::Text => eprintln!("Error: {}", message),
        OutputFormat::Json => eprintln!(
            "{}",
            serde_json::json!({ "status": "error", "message": message })
        ),
    }
}

/// Print an authentication error. Classified errors carry their translation
/// key so front ends can localize the message.
pub fn print_auth_error(err: &AuthError, format: OutputFormat) {
    let Some(classified) = err.classified() else {
        print_error(&err.to_string(), format);
        return;
    };

    match format {
        OutputFormat::Text => {
            eprintln!("Error: {}", classified.original.message);
            eprintln!("  {:<16} {}", "kind:", classified.kind);
            eprintln!("  {:<16} {}", "translation key:", classified.translation_key);
        }
        OutputFormat::Json => eprintln!(
            "{}",
            serde_json::json!({
                "status": "error",
                "kind": classified.kind,
                "translation_key": classified.translation_key,
                "message": classified.original.message,
            })
        ),
    }
}

/// Print a table row.
pub fn print_row(label: &str, value: &str) {
    println!("  {:<16} {}", format!("{}:", label), value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_parses_from_cli_values() {
        assert_eq!(
            OutputFormat::from_str("json", true).unwrap(),
            OutputFormat::Json
        );
        assert_eq!(
            OutputFormat::from_str("TEXT", true).unwrap(),
            OutputFormat::Text
        );
        assert!(OutputFormat::from_str("yaml", true).is_err());
    }
}
