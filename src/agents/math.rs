//! Arithmetic agent
//!
//! Handles `X% of Y` and plain `+ - * /` expressions with parentheses,
//! extracted from free text such as "calculate (2 + 3) * 4".

use crate::agent::{Agent, AgentDescriptor};
use crate::error::{Error, Result};
use crate::types::Command;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::{Arc, LazyLock};

static PERCENTAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*%\s*of\s*(\d+(?:\.\d+)?)").expect("valid percentage pattern")
});

static LEAD_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:please\s+)?(?:calculate|compute|what\s+is|solve|evaluate)\s+")
        .expect("valid lead-in pattern")
});

/// Evaluates arithmetic found in a command
#[derive(Debug, Default)]
pub struct MathAgent;

impl MathAgent {
    /// Descriptor registered as `math_agent`, type `math`
    pub fn descriptor() -> AgentDescriptor {
        AgentDescriptor::new("math_agent", "math", Arc::new(MathAgent))
            // "/" and "*" are left out: they appear in paths and URLs
            .with_intents(["calculate", "compute", "math", "solve", "percent", "%", "+"])
            .with_priority(1)
    }

    /// Evaluate the arithmetic in `text`
    pub fn evaluate(text: &str) -> Result<Value> {
        if let Some(caps) = PERCENTAGE.captures(text) {
            let percentage: f64 = caps[1].parse().map_err(|_| Error::invalid_input("bad percentage"))?;
            let value: f64 = caps[2].parse().map_err(|_| Error::invalid_input("bad percentage base"))?;
            let result = (percentage / 100.0 * value * 100.0).round() / 100.0;
            return Ok(json!({
                "result": result,
                "percentage": percentage,
                "value": value,
                "operation": "percentage",
            }));
        }

        let expression = extract_expression(text);
        if expression.is_empty() {
            return Err(Error::invalid_input("no arithmetic expression found"));
        }

        let tokens = tokenize(&expression)?;
        let mut parser = Parser { tokens: &tokens, pos: 0 };
        let result = parser.expression()?;
        if parser.pos != tokens.len() {
            return Err(Error::invalid_input(format!(
                "unexpected trailing input in '{}'",
                expression
            )));
        }
        if !result.is_finite() {
            return Err(Error::invalid_input("division by zero is not allowed"));
        }

        Ok(json!({
            "result": result,
            "expression": expression,
            "operation": "evaluation",
        }))
    }
}

#[async_trait]
impl Agent for MathAgent {
    async fn invoke(&self, command: &Command) -> Result<Value> {
        Self::evaluate(command.text())
    }
}

fn extract_expression(text: &str) -> String {
    let body = LEAD_IN.replace(text, "");
    let kept: String = body
        .chars()
        .filter(|c| c.is_ascii_digit() || "+-*/().".contains(*c) || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Op(char),
    Open,
    Close,
}

fn tokenize(expression: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = literal
                    .parse()
                    .map_err(|_| Error::invalid_input(format!("invalid number '{}'", literal)))?;
                tokens.push(Token::Number(number));
            }
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '(' => {
                tokens.push(Token::Open);
                chars.next();
            }
            ')' => {
                tokens.push(Token::Close);
                chars.next();
            }
            other => return Err(Error::invalid_input(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

/// Recursive descent over `expr := term (+|- term)*`, `term := factor (*|/ factor)*`
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn expression(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            self.pos += 1;
            let rhs = self.factor()?;
            if op == '/' {
                if rhs == 0.0 {
                    return Err(Error::invalid_input("division by zero is not allowed"));
                }
                value /= rhs;
            } else {
                value *= rhs;
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64> {
        match self.peek() {
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(n)
            }
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(-self.factor()?)
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.factor()
            }
            Some(Token::Open) => {
                self.pos += 1;
                let value = self.expression()?;
                if self.peek() != Some(Token::Close) {
                    return Err(Error::invalid_input("unbalanced parentheses"));
                }
                self.pos += 1;
                Ok(value)
            }
            _ => Err(Error::invalid_input("expected a number")),
        }
    }
}
