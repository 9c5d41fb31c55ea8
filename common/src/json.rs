use serde_json::Value;

use crate::error::TokenizeError;

pub const DEFAULT_MAX_TOKENS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Object,
    Array,
    String,
    Primitive,
}

// Keys are parents of their values, so an object's `size` counts its keys.
// `end` is one past the last token nested under this one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub size: usize,
    pub parent: Option<usize>,
    pub end: usize,
}

impl Token {
    pub fn is_container(&self) -> bool {
        matches!(self.kind, TokenKind::Object | TokenKind::Array)
    }
}

pub trait Tokenizer {
    fn tokenize(&self, source: &str) -> Result<Vec<Token>, TokenizeError>;
}

#[derive(Debug, Clone, Copy)]
pub struct JsonTokenizer {
    max_tokens: usize,
}

impl Default for JsonTokenizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS)
    }
}

impl JsonTokenizer {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    fn push(
        &self,
        tokens: &mut Vec<Token>,
        kind: TokenKind,
        text: String,
        parent: Option<usize>,
    ) -> Result<usize, TokenizeError> {
        if tokens.len() >= self.max_tokens {
            return Err(TokenizeError::TooManyTokens(self.max_tokens));
        }
        if let Some(parent) = parent {
            tokens[parent].size += 1;
        }
        let index = tokens.len();
        tokens.push(Token {
            kind,
            text,
            size: 0,
            parent,
            end: index + 1,
        });
        Ok(index)
    }

    fn flatten(
        &self,
        value: &Value,
        parent: Option<usize>,
        tokens: &mut Vec<Token>,
    ) -> Result<(), TokenizeError> {
        let index = match value {
            Value::Object(map) => {
                let index = self.push(tokens, TokenKind::Object, String::new(), parent)?;
                for (key, nested) in map {
                    let key_index =
                        self.push(tokens, TokenKind::String, key.clone(), Some(index))?;
                    self.flatten(nested, Some(key_index), tokens)?;
                    tokens[key_index].end = tokens.len();
                }
                index
            }
            Value::Array(items) => {
                let index = self.push(tokens, TokenKind::Array, String::new(), parent)?;
                for item in items {
                    self.flatten(item, Some(index), tokens)?;
                }
                index
            }
            Value::String(text) => self.push(tokens, TokenKind::String, text.clone(), parent)?,
            primitive => self.push(tokens, TokenKind::Primitive, primitive.to_string(), parent)?,
        };
        tokens[index].end = tokens.len();
        Ok(())
    }
}

impl Tokenizer for JsonTokenizer {
    fn tokenize(&self, source: &str) -> Result<Vec<Token>, TokenizeError> {
        let value: Value = serde_json::from_str(source)?;
        let mut tokens = Vec::new();
        self.flatten(&value, None, &mut tokens)?;
        Ok(tokens)
    }
}

impl From<serde_json::Error> for TokenizeError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() {
            Self::Partial
        } else {
            Self::Invalid {
                line: err.line(),
                column: err.column(),
            }
        }
    }
}
