use crate::json::{Token, TokenKind};

#[derive(Debug, Clone, Copy)]
pub struct FieldExtractor<'a> {
    tokens: &'a [Token],
}

impl<'a> FieldExtractor<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens }
    }

    pub fn root(&self) -> Option<usize> {
        self.tokens
            .first()
            .filter(|token| token.kind == TokenKind::Object)
            .map(|_| 0)
    }

    pub fn object_after_key(&self, key: &str) -> Option<usize> {
        self.tokens.windows(2).enumerate().find_map(|(index, pair)| {
            let (before, candidate) = (&pair[0], &pair[1]);
            let matches = before.kind == TokenKind::String
                && candidate.kind == TokenKind::Object
                && before.text == key;
            matches.then_some(index + 1)
        })
    }

    /// Text of the scalar following `key` anywhere inside the container at
    /// `scope`. A value longer than `max_len` counts as absent.
    pub fn field(&self, scope: usize, key: &str, max_len: usize) -> Option<&'a str> {
        let container = self.tokens.get(scope).filter(|token| token.is_container())?;
        let last = container.end.min(self.tokens.len());

        (scope + 1..last).find_map(|index| {
            let token = &self.tokens[index];
            if token.kind != TokenKind::String || token.text != key || !self.is_key(token) {
                return None;
            }
            let value = self.tokens.get(index + 1).filter(|_| index + 1 < last)?;
            if value.is_container() {
                return None;
            }
            Some(value.text.as_str()).filter(|text| text.len() <= max_len)
        })
    }

    fn is_key(&self, token: &Token) -> bool {
        token
            .parent
            .and_then(|parent| self.tokens.get(parent))
            .is_some_and(|parent| parent.kind == TokenKind::Object)
    }
}
