use std::fmt;

/// A command expressed as an ordered argument vector, optionally
/// executed from a working directory.
///
/// Arguments are never joined into a shell string for local
/// execution. Remote runners render them with [`shell_quote`], so
/// values containing spaces or quotes survive the trip intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<String>,
}

impl CommandLine {
    #[must_use]
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            dir: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `flag value` for each value, e.g. `-e A=1 -e B=2`.
    #[must_use]
    pub fn flag_each(mut self, flag: &str, values: &[String]) -> Self {
        for value in values {
            self.args.push(flag.to_string());
            self.args.push(value.clone());
        }
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: &str) -> Self {
        self.dir = Some(dir.to_string());
        self
    }

    /// Prefix the command with another program, e.g. `sudo`.
    #[must_use]
    pub fn wrapped_in(self, program: &str) -> Self {
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: program.to_string(),
            args,
            dir: self.dir,
        }
    }

    /// Program followed by its arguments.
    #[must_use]
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Render as a single POSIX shell line, including the `cd`
    /// prefix when a working directory is set.
    #[must_use]
    pub fn to_shell(&self) -> String {
        let line = self
            .argv()
            .into_iter()
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ");
        match &self.dir {
            Some(dir) => format!("cd {} && {line}", shell_quote(dir)),
            None => line,
        }
    }

    /// Whether the argument vector starts with the given words.
    #[must_use]
    pub fn starts_with(&self, words: &[&str]) -> bool {
        let argv = self.argv();
        argv.len() >= words.len() && argv.iter().zip(words).all(|(a, w)| a == w)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell())
    }
}

/// Quote a word for a POSIX shell. Words made only of safe
/// characters are returned unchanged.
#[must_use]
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
