//! Evaluation of GitLab rule conditions (`if:`) against a set of variables.
//!
//! Comparisons and regex matches are computed directly; the boolean structure
//! (`&&`, `||`, parentheses) is handed to `evalexpr`.

use crate::error::{Error, Result};
use crate::model::{Job, When};
use evalexpr::{ContextWithMutableVariables, HashMapContext, Node, Value, build_operator_tree};
use regex::Regex;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Var(String),
    Str(String),
    Null,
    Pattern(String),
    Eq,
    Ne,
    Match,
    NoMatch,
    And,
    Or,
    Open,
    Close,
}

#[derive(Debug, Clone)]
enum Operand {
    Var(String),
    Str(String),
    Null,
}

#[derive(Debug, Clone)]
enum PatternSource {
    Literal(Regex),
    Var(String),
}

#[derive(Debug, Clone)]
enum Condition {
    /// `$VAR`: set and not empty.
    Present(String),
    Compare { left: Operand, right: Operand, equal: bool },
    Matches { subject: Operand, pattern: PatternSource, negate: bool },
}

/// A parsed rule condition.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    tree: Node,
    conditions: Vec<Condition>,
}

impl Expression {
    /// Parses a condition such as `$CI_COMMIT_BRANCH == "main" && $CI_COMMIT_TAG =~ /^v/`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Expression`] if the text is not a valid condition.
    pub fn new(source: impl AsRef<str>) -> Result<Self> {
        let source = source.as_ref();
        let fail = |message: String| Error::Expression {
            expression: source.to_string(),
            message,
        };

        let tokens = tokenize(source).map_err(fail)?;
        let (boolean, conditions) = translate(&tokens).map_err(fail)?;
        let tree = build_operator_tree(&boolean).map_err(|e| fail(e.to_string()))?;

        Ok(Self {
            source: source.to_string(),
            tree,
            conditions,
        })
    }

    /// The condition as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the condition. Variables missing from `variables` are unset.
    ///
    /// # Errors
    ///
    /// Fails if a variable used as a pattern does not hold a valid `/regex/`.
    pub fn evaluate(&self, variables: &HashMap<String, String>) -> Result<bool> {
        let fail = |message: String| Error::Expression {
            expression: self.source.clone(),
            message,
        };

        let mut context = HashMapContext::new();
        for (i, condition) in self.conditions.iter().enumerate() {
            let value = condition.evaluate(variables).map_err(fail)?;
            context
                .set_value(format!("c{i}"), Value::Boolean(value))
                .map_err(|e| fail(e.to_string()))?;
        }

        match self.tree.eval_with_context(&context).map_err(|e| fail(e.to_string()))? {
            Value::Boolean(b) => Ok(b),
            other => Err(fail(format!("the condition did not evaluate to a boolean, got '{other}'"))),
        }
    }
}

impl Operand {
    fn value<'a>(&'a self, variables: &'a HashMap<String, String>) -> Option<&'a str> {
        match self {
            Self::Var(name) => variables.get(name).map(String::as_str),
            Self::Str(text) => Some(text),
            Self::Null => None,
        }
    }
}

impl Condition {
    fn evaluate(&self, variables: &HashMap<String, String>) -> Result<bool, String> {
        match self {
            Self::Present(name) => Ok(variables.get(name).is_some_and(|v| !v.is_empty())),
            Self::Compare { left, right, equal } => Ok((left.value(variables) == right.value(variables)) == *equal),
            Self::Matches { subject, pattern, negate } => {
                let regex = match pattern {
                    PatternSource::Literal(regex) => regex.clone(),
                    PatternSource::Var(name) => {
                        let text = variables.get(name).map_or("", String::as_str);
                        pattern_regex(text.strip_prefix('/').unwrap_or(text))?
                    }
                };
                let matched = subject.value(variables).is_some_and(|text| regex.is_match(text));
                Ok(matched != *negate)
            }
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::Open,
            ')' => Token::Close,
            '$' => {
                let braced = chars.next_if(|(_, c)| *c == '{').is_some();
                let mut name = String::new();
                while let Some((_, c)) = chars.next_if(|(_, c)| c.is_ascii_alphanumeric() || *c == '_') {
                    name.push(c);
                }
                if braced && chars.next_if(|(_, c)| *c == '}').is_none() {
                    return Err(format!("unterminated `${{` at offset {start}"));
                }
                if name.is_empty() {
                    return Err(format!("expected a variable name at offset {start}"));
                }
                Token::Var(name)
            }
            '"' | '\'' => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '\\')) => {
                            if let Some((_, escaped)) = chars.next() {
                                text.push(escaped);
                            }
                        }
                        Some((_, q)) if q == c => break,
                        Some((_, other)) => text.push(other),
                        None => return Err(format!("unterminated string at offset {start}")),
                    }
                }
                Token::Str(text)
            }
            '/' if matches!(tokens.last(), Some(Token::Match | Token::NoMatch)) => {
                let mut text = String::new();
                let mut escaped = false;
                loop {
                    match chars.next() {
                        Some((_, '/')) if !escaped => break,
                        Some((_, c)) => {
                            escaped = c == '\\' && !escaped;
                            text.push(c);
                        }
                        None => return Err(format!("unterminated pattern at offset {start}")),
                    }
                }
                text.push('/');
                while let Some((_, flag)) = chars.next_if(|(_, c)| c.is_ascii_alphabetic()) {
                    text.push(flag);
                }
                Token::Pattern(text)
            }
            '=' | '!' | '&' | '|' => {
                let next = chars.next().map(|(_, c)| c);
                match (c, next) {
                    ('=', Some('=')) => Token::Eq,
                    ('!', Some('=')) => Token::Ne,
                    ('=', Some('~')) => Token::Match,
                    ('!', Some('~')) => Token::NoMatch,
                    ('&', Some('&')) => Token::And,
                    ('|', Some('|')) => Token::Or,
                    _ => return Err(format!("unknown operator at offset {start}")),
                }
            }
            c if c.is_ascii_alphabetic() => {
                let mut word = String::from(c);
                while let Some((_, c)) = chars.next_if(|(_, c)| c.is_ascii_alphanumeric() || *c == '_') {
                    word.push(c);
                }
                if word != "null" {
                    return Err(format!("unexpected word '{word}' at offset {start}"));
                }
                Token::Null
            }
            other => return Err(format!("unexpected character '{other}' at offset {start}")),
        };

        tokens.push(token);
    }

    Ok(tokens)
}

/// Replaces every comparison with a boolean placeholder `cN`, yielding the boolean
/// skeleton of the condition and the conditions the placeholders stand for.
fn translate(tokens: &[Token]) -> Result<(String, Vec<Condition>), String> {
    let mut boolean = String::new();
    let mut conditions = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Open => boolean.push_str("( "),
            Token::Close => boolean.push_str(") "),
            Token::And => boolean.push_str("&& "),
            Token::Or => boolean.push_str("|| "),
            operand @ (Token::Var(_) | Token::Str(_) | Token::Null) => {
                let left = to_operand(operand)?;
                let condition = match tokens.get(i + 1) {
                    Some(op @ (Token::Eq | Token::Ne)) => {
                        let right = tokens.get(i + 2).ok_or("a comparison needs a right-hand side")?;
                        i += 2;
                        Condition::Compare {
                            left,
                            right: to_operand(right)?,
                            equal: *op == Token::Eq,
                        }
                    }
                    Some(op @ (Token::Match | Token::NoMatch)) => {
                        let pattern = match tokens.get(i + 2) {
                            Some(Token::Pattern(text)) => PatternSource::Literal(pattern_regex(text)?),
                            Some(Token::Var(name)) => PatternSource::Var(name.clone()),
                            _ => return Err("`=~` and `!~` need a /pattern/".into()),
                        };
                        i += 2;
                        Condition::Matches {
                            subject: left,
                            pattern,
                            negate: *op == Token::NoMatch,
                        }
                    }
                    _ => match left {
                        Operand::Var(name) => Condition::Present(name),
                        _ => return Err("a string or null on its own is not a condition".into()),
                    },
                };

                boolean.push_str(&format!("c{} ", conditions.len()));
                conditions.push(condition);
            }
            other => return Err(format!("unexpected {other:?}")),
        }
        i += 1;
    }

    if conditions.is_empty() {
        return Err("the condition is empty".into());
    }

    Ok((boolean, conditions))
}

fn to_operand(token: &Token) -> Result<Operand, String> {
    match token {
        Token::Var(name) => Ok(Operand::Var(name.clone())),
        Token::Str(text) => Ok(Operand::Str(text.clone())),
        Token::Null => Ok(Operand::Null),
        other => Err(format!("expected a variable, string or null, found {other:?}")),
    }
}

/// Compiles `pattern/flags` (without the leading slash).
fn pattern_regex(text: &str) -> Result<Regex, String> {
    let (pattern, flags) = text.rsplit_once('/').ok_or_else(|| format!("'{text}' is not a /pattern/"))?;
    let prefix = if flags.is_empty() { String::new() } else { format!("(?{flags})") };
    Regex::new(&format!("{prefix}{pattern}")).map_err(|e| e.to_string())
}

/// Whether a job runs for a given set of variables, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The job runs, with this `when`.
    Run(When),
    /// The job is left out of the pipeline.
    Skip,
}

/// Applies a job's rules: the first matching rule decides; with rules and no match
/// the job does not run. An explicit empty rule list never matches.
///
/// `changes` and `exists` clauses cannot be decided without a repository and are
/// treated as satisfied.
///
/// # Errors
///
/// Fails if a rule condition is invalid.
pub fn evaluate_rules(job: &Job, variables: &HashMap<String, String>) -> Result<Disposition> {
    let disposition = |when: Option<When>| match when.or(job.when).unwrap_or(When::OnSuccess) {
        When::Never => Disposition::Skip,
        when => Disposition::Run(when),
    };

    let Some(rules) = &job.rules else {
        return Ok(disposition(None));
    };

    for rule in rules {
        let matched = match &rule.if_ {
            Some(condition) => Expression::new(condition)?.evaluate(variables)?,
            None => true,
        };

        if matched {
            return Ok(disposition(rule.when));
        }
    }

    Ok(Disposition::Skip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Rule;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    fn eval(expression: &str, variables: &[(&str, &str)]) -> bool {
        Expression::new(expression).unwrap().evaluate(&vars(variables)).unwrap()
    }

    #[test]
    fn presence_and_comparison() {
        assert!(eval("$CI_COMMIT_TAG", &[("CI_COMMIT_TAG", "v1")]));
        assert!(!eval("$CI_COMMIT_TAG", &[("CI_COMMIT_TAG", "")]));
        assert!(!eval("$CI_COMMIT_TAG", &[]));
        assert!(eval(r#"$CI_COMMIT_BRANCH == "main""#, &[("CI_COMMIT_BRANCH", "main")]));
        assert!(eval("$CI_COMMIT_BRANCH != 'main'", &[("CI_COMMIT_BRANCH", "dev")]));
        assert!(eval("$CI_COMMIT_BRANCH == $CI_DEFAULT_BRANCH", &[("CI_COMMIT_BRANCH", "main"), ("CI_DEFAULT_BRANCH", "main")]));
        assert!(eval("$UNSET == null", &[]));
        assert!(eval("${CI_COMMIT_REF_NAME} == \"x\"", &[("CI_COMMIT_REF_NAME", "x")]));
    }

    #[test]
    fn regex_matches() {
        assert!(eval("$CI_COMMIT_TAG =~ /^v\\d+/", &[("CI_COMMIT_TAG", "v12")]));
        assert!(eval("$CI_COMMIT_TAG =~ /^V/i", &[("CI_COMMIT_TAG", "v12")]));
        assert!(eval("$CI_COMMIT_TAG !~ /^v/", &[]));
        assert!(eval("$BRANCH =~ $PATTERN", &[("BRANCH", "release-1"), ("PATTERN", "/^release-/")]));
    }

    #[test]
    fn boolean_structure() {
        let variables = [("A", "1"), ("B", "")];
        assert!(eval("$A && ($B || $A == \"1\")", &variables));
        assert!(!eval("$A && $B", &variables));
        assert!(eval("$B || $A", &variables));
    }

    #[test]
    fn invalid_conditions() {
        assert!(Expression::new("").is_err());
        assert!(Expression::new("$A ==").is_err());
        assert!(Expression::new("\"text\"").is_err());
        assert!(Expression::new("$A = 1").is_err());
        assert!(Expression::new("$A && (").is_err());
    }

    #[test]
    fn first_matching_rule_wins() {
        let job = Job {
            rules: Some(vec![
                Rule {
                    when: Some(When::Never),
                    ..Rule::when_if("$CI_PIPELINE_SOURCE == \"schedule\"")
                },
                Rule {
                    when: Some(When::Manual),
                    ..Rule::when_if("$CI_COMMIT_TAG")
                },
                Rule::when_if("$CI_COMMIT_BRANCH"),
            ]),
            ..Job::new("deploy")
        };

        let run = |pairs: &[(&str, &str)]| evaluate_rules(&job, &vars(pairs)).unwrap();
        assert_eq!(run(&[("CI_PIPELINE_SOURCE", "schedule"), ("CI_COMMIT_TAG", "v1")]), Disposition::Skip);
        assert_eq!(run(&[("CI_COMMIT_TAG", "v1")]), Disposition::Run(When::Manual));
        assert_eq!(run(&[("CI_COMMIT_BRANCH", "main")]), Disposition::Run(When::OnSuccess));
        assert_eq!(run(&[]), Disposition::Skip);
    }

    #[test]
    fn jobs_without_rules_always_run_and_empty_rules_never() {
        let plain = Job::new("plain");
        assert_eq!(evaluate_rules(&plain, &HashMap::new()).unwrap(), Disposition::Run(When::OnSuccess));

        let empty = Job {
            rules: Some(Vec::new()),
            ..Job::new("empty")
        };
        assert_eq!(evaluate_rules(&empty, &HashMap::new()).unwrap(), Disposition::Skip);
    }
}
