pub mod config;
pub mod duplicates;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Command;
use clap_complete::Shell;
use colored::{ColoredString, Colorize};

/// Format bool value as a coloured string.
#[must_use]
pub fn colorize_bool(value: bool) -> ColoredString {
    if value { "true".green() } else { "false".red() }
}

#[inline]
pub fn print_error(message: &str) {
    eprintln!("{}", format!("Error: {message}").red());
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        $crate::print_error(&format!($($arg)*))
    };
}

#[inline]
pub fn print_warning(message: &str) {
    eprintln!("{}", message.yellow());
}

#[macro_export]
macro_rules! print_warning {
    ($($arg:tt)*) => {
        $crate::print_warning(&format!($($arg)*))
    };
}

/// Format bytes as a human-readable size using binary (IEC) prefixes.
///
/// ```rust
/// use hydrus_review::format_size;
///
/// assert_eq!(format_size(512), "512.0B");
/// assert_eq!(format_size(1536), "1.5KiB");
/// assert_eq!(format_size(3 * 1024 * 1024), "3.0MiB");
/// ```
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["", "Ki", "Mi", "Gi", "Ti", "Pi"];

    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{value:.1}{unit}B");
        }
        value /= 1024.0;
    }
    format!("{value:.1}EiB")
}

/// Format duration as a human-readable string
#[must_use]
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

/// Generate a shell completion script for the given shell.
///
/// # Errors
/// Returns an error if the completion directory cannot be resolved or written to.
pub fn generate_shell_completion(shell: Shell, mut command: Command, install: bool, command_name: &str) -> Result<()> {
    if install {
        let out_dir = get_shell_completion_dir(shell, command_name)?;
        let path = clap_complete::generate_to(shell, &mut command, command_name, out_dir)?;
        println!("Completion file generated to: {}", path.display());
    } else {
        clap_complete::generate(shell, &mut command, command_name, &mut std::io::stdout());
    }
    Ok(())
}

/// Directory for installing a completion script.
///
/// Zsh with oh-my-zsh gets a custom plugin directory that has to be enabled in `.zshrc`.
/// Otherwise the user directory is preferred when it exists, then the system directory,
/// and finally the user directory is created.
fn get_shell_completion_dir(shell: Shell, name: &str) -> Result<PathBuf> {
    let home = dirs::home_dir().context("Failed to get home directory")?;

    let (user_dir, system_dir) = match shell {
        Shell::Bash => (home.join(".bash_completion.d"), "/etc/bash_completion.d"),
        Shell::Fish => (home.join(".config/fish/completions"), "/usr/share/fish/completions"),
        Shell::Zsh => {
            let omz_plugins = home.join(".oh-my-zsh/custom/plugins");
            if omz_plugins.exists() {
                let plugin_dir = omz_plugins.join(name);
                std::fs::create_dir_all(&plugin_dir)?;
                return Ok(plugin_dir);
            }
            (home.join(".zsh/completions"), "/usr/share/zsh/site-functions")
        }
        _ => anyhow::bail!("Installing completions is only supported for bash, fish and zsh"),
    };

    if user_dir.exists() {
        return Ok(user_dir);
    }
    let system_dir = PathBuf::from(system_dir);
    if system_dir.exists() {
        return Ok(system_dir);
    }

    std::fs::create_dir_all(&user_dir)
        .with_context(|| format!("Failed to create completion directory: {}", user_dir.display()))?;
    Ok(user_dir)
}

/// Helper method to assert floating point equality in test cases.
#[inline]
pub fn assert_f64_eq(a: f64, b: f64) {
    let epsilon = f64::EPSILON;
    assert!(
        (a - b).abs() <= epsilon,
        "Values are not equal: {a} and {b} (epsilon = {epsilon})"
    );
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    use std::time::Duration;

    #[test]
    fn format_size_bytes() {
        assert_eq!(format_size(0), "0.0B");
        assert_eq!(format_size(1023), "1023.0B");
    }

    #[test]
    fn format_size_binary_prefixes() {
        assert_eq!(format_size(1024), "1.0KiB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.5MiB");
        assert_eq!(format_size(2 * 1024 * 1024 * 1024), "2.0GiB");
    }

    #[test]
    fn completion_install_rejects_unsupported_shell() {
        assert!(get_shell_completion_dir(Shell::Elvish, "hreview").is_err());
        assert!(get_shell_completion_dir(Shell::PowerShell, "hreview").is_err());
    }

    #[test]
    fn format_duration_seconds() {
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
    }

    #[test]
    fn format_duration_minutes_and_hours() {
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 05s");
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 02m 03s");
    }
}
