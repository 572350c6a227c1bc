//! Mention-aware command grammar.
//!
//! A bot declares its commands as a [`Grammar`]: an ordered table of rules,
//! each a sequence of [`Part`]s. [`Grammar::parse`] strips the leading
//! `@**name**` mention, splits the rest with shell-like quoting rules and
//! matches the tokens against the rules.
//!
//! Parsing never fails. Input that does not tokenize becomes a free-form
//! [`Parsed::Prompt`]; tokens that match no rule become [`Parsed::Help`].
//! Only a message without a leading mention yields `None`.

use std::collections::{HashMap, HashSet};
use std::fmt;

/// One element of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Part {
    /// A literal word that must be present (`set`, `--reset`).
    Word(&'static str),
    /// A literal word that may be present; recorded as a flag (`[all]`).
    Optional(&'static str),
    /// Exactly one positional argument (`<query_id>`).
    Arg(&'static str),
    /// One or more positional arguments, consuming the rest (`<query>...`).
    Args(&'static str),
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(w) => write!(f, "{w}"),
            Self::Optional(w) => write!(f, "[{w}]"),
            Self::Arg(name) => write!(f, "<{name}>"),
            Self::Args(name) => write!(f, "<{name}>..."),
        }
    }
}

/// A named command shape.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: &'static str,
    pub parts: Vec<Part>,
}

/// A matched rule with its captured arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub rule: &'static str,
    args: HashMap<&'static str, Vec<String>>,
    flags: HashSet<&'static str>,
}

impl Invocation {
    /// Single positional argument by name.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args
            .get(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All values captured for an argument (empty if absent).
    pub fn args(&self, name: &str) -> &[String] {
        self.args.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether an optional word was present.
    pub fn flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }
}

/// Outcome of parsing a mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Command(Invocation),
    /// Help was requested or the input matched no rule. Carries the usage text.
    Help(String),
    /// Free-form text that could not be tokenized.
    Prompt(String),
}

/// Declared command grammar of one bot.
#[derive(Debug, Clone)]
pub struct Grammar {
    bot: String,
    summary: String,
    details: String,
    rules: Vec<Rule>,
}

impl Grammar {
    pub fn new(bot: &str) -> Self {
        Self {
            bot: bot.to_string(),
            summary: String::new(),
            details: String::new(),
            rules: Vec::new(),
        }
    }

    /// One-paragraph description shown above the usage lines.
    pub fn summary(mut self, text: &str) -> Self {
        self.summary = text.trim().to_string();
        self
    }

    /// Free text (commands, arguments, examples) shown below the usage lines.
    pub fn details(mut self, text: &str) -> Self {
        self.details = text.trim().to_string();
        self
    }

    /// Append a rule. Rules are tried in declaration order.
    pub fn rule(mut self, name: &'static str, parts: &[Part]) -> Self {
        self.rules.push(Rule {
            name,
            parts: parts.to_vec(),
        });
        self
    }

    pub fn bot(&self) -> &str {
        &self.bot
    }

    /// Mention marker for this bot, e.g. `@**arxiv**`.
    pub fn mention(&self) -> String {
        format!("@**{}**", self.bot)
    }

    /// Full usage text.
    pub fn usage(&self) -> String {
        let mention = self.mention();
        let mut out = String::new();
        if !self.summary.is_empty() {
            out.push_str(&self.summary);
            out.push_str("\n\n");
        }
        out.push_str("Usage:\n");
        out.push_str(&format!("  {mention} --help\n"));
        for rule in &self.rules {
            let synopsis: Vec<String> = rule.parts.iter().map(Part::to_string).collect();
            out.push_str(&format!("  {mention} {}\n", synopsis.join(" ")));
        }
        if !self.details.is_empty() {
            out.push('\n');
            out.push_str(&self.details);
            out.push('\n');
        }
        out
    }

    /// Parse a raw message. `None` when the message does not start with a mention.
    pub fn parse(&self, message: &str) -> Option<Parsed> {
        let remainder = strip_mention(message)?;

        let tokens = match split(remainder) {
            Ok(tokens) => tokens,
            Err(_) => return Some(Parsed::Prompt(remainder.to_string())),
        };

        if tokens.iter().any(|t| t == "--help" || t == "-h") {
            return Some(Parsed::Help(self.usage()));
        }

        let matched = self
            .rules
            .iter()
            .find_map(|rule| match_rule(rule, &tokens));
        Some(match matched {
            Some(invocation) => Parsed::Command(invocation),
            None => Parsed::Help(self.usage()),
        })
    }
}

/// Strip a leading `@**name**` mention followed by whitespace.
///
/// Returns the trimmed remainder, or `None` if the marker is absent.
pub fn strip_mention(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("@**")?;
    let end = rest.find("**")?;
    let name = &rest[..end];
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let after = &rest[end + 2..];
    if !after.starts_with(char::is_whitespace) {
        return None;
    }
    Some(after.trim())
}

fn match_rule(rule: &Rule, tokens: &[String]) -> Option<Invocation> {
    let mut args: HashMap<&'static str, Vec<String>> = HashMap::new();
    let mut flags = HashSet::new();
    let mut pos = 0;

    for part in &rule.parts {
        match *part {
            Part::Word(word) => {
                if tokens.get(pos).map(String::as_str) != Some(word) {
                    return None;
                }
                pos += 1;
            }
            Part::Optional(word) => {
                if tokens.get(pos).map(String::as_str) == Some(word) {
                    flags.insert(word);
                    pos += 1;
                }
            }
            Part::Arg(name) => {
                let token = tokens.get(pos).filter(|t| is_positional(t))?;
                args.insert(name, vec![token.clone()]);
                pos += 1;
            }
            Part::Args(name) => {
                let rest = &tokens[pos.min(tokens.len())..];
                if rest.is_empty() || !rest.iter().all(|t| is_positional(t)) {
                    return None;
                }
                args.insert(name, rest.to_vec());
                pos = tokens.len();
            }
        }
    }

    if pos != tokens.len() {
        return None;
    }

    Some(Invocation {
        rule: rule.name,
        args,
        flags,
    })
}

/// Option-looking tokens (`-x`, `--foo`) are never positional values.
fn is_positional(token: &str) -> bool {
    !(token.len() > 1 && token.starts_with('-'))
}

/// Tokenizer failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    UnclosedQuote,
    TrailingEscape,
}

/// Split a command line into words using POSIX shell quoting rules.
///
/// Single quotes are literal. Inside double quotes a backslash escapes only
/// `"` and `\`. Outside quotes a backslash escapes any character. Adjacent
/// quoted and unquoted pieces join into one word.
pub fn split(input: &str) -> Result<Vec<String>, SplitError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(SplitError::UnclosedQuote),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => return Err(SplitError::UnclosedQuote),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(SplitError::UnclosedQuote),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => return Err(SplitError::TrailingEscape),
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}
