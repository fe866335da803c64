//! The rendered form of a probe: what to exec, with which arguments and
//! environment. Building an `Invocation` never runs anything.

use crate::account::Secret;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Arg {
    value: String,
    /// Always single-quote in the display form, even when not required.
    quoted: bool,
}

/// A command ready for the executor.
///
/// Secrets live only in `secret_env`. The `Display` form is the command line
/// an operator would type (without the secret bindings), which is what gets
/// logged and persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<Arg>,
    env: Vec<(String, String)>,
    secret_env: Vec<(String, Secret)>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            secret_env: Vec::new(),
        }
    }

    /// Append an argument, quoted in the display form only if needed.
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            quoted: false,
        });
        self
    }

    /// Append an argument that is always shown single-quoted.
    pub fn quoted_arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg {
            value: value.into(),
            quoted: true,
        });
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Bind a secret into the child environment. Never rendered.
    pub fn secret_env(mut self, key: impl Into<String>, secret: Secret) -> Self {
        self.secret_env.push((key.into(), secret));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|a| a.value.as_str())
    }

    pub fn env_vars(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn secret_vars(&self) -> &[(String, Secret)] {
        &self.secret_env
    }

    /// Names of the secret bindings, for logging.
    pub fn secret_names(&self) -> Vec<&str> {
        self.secret_env.iter().map(|(k, _)| k.as_str()).collect()
    }

    /// Display form of the command line.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(shell_word(&self.program, false));
        for a in &self.args {
            parts.push(shell_word(&a.value, a.quoted));
        }
        parts.join(" ")
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

fn shell_word(value: &str, force: bool) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if safe && !force {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
