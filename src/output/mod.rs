use std::sync::atomic::{AtomicU8, Ordering};

use colored::{ColoredString, Colorize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
        }
    }
}

static VERBOSITY: AtomicU8 = AtomicU8::new(0);

pub fn set_verbosity(level: u8) {
    VERBOSITY.store(level, Ordering::Relaxed);
}

pub fn verbosity() -> u8 {
    VERBOSITY.load(Ordering::Relaxed)
}

pub fn set_color(enabled: bool) {
    colored::control::set_override(enabled);
}

fn tagged(tag: ColoredString, message: &str) -> String {
    format!(
        "{}{}{} {}",
        "[".bold().white(),
        tag,
        "]".bold().white(),
        message
    )
}

pub fn info(message: impl AsRef<str>) {
    eprintln!("{}", tagged("INF".bold().green(), message.as_ref()));
}

pub fn warn(message: impl AsRef<str>) {
    eprintln!("{}", tagged("WRN".bold().yellow(), message.as_ref()));
}

pub fn error(message: impl AsRef<str>) {
    eprintln!("{}", tagged("ERR".bold().red(), message.as_ref()));
}

// only shown with -v or more
pub fn debug(message: impl AsRef<str>) {
    if verbosity() >= 1 {
        eprintln!("{}", tagged("DBG".bold().blue(), message.as_ref()));
    }
}

pub fn format_kv_line(label: &str, value: &str) -> String {
    format!(":: {:<10}: {}", label, value)
}
