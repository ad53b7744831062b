/// Space, tab, newline, carriage return and form feed. Nothing else splits a word.
pub fn is_delimiter(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0c')
}

/// Lazy iterator over the words of a line. Cloning it restarts from the same position.
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    rest: &'a str,
}

pub fn tokenize(line: &str) -> Tokens<'_> {
    Tokens { rest: line }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let Some(start) = self.rest.find(|c: char| !is_delimiter(c)) else {
            self.rest = "";
            return None;
        };
        let rest = &self.rest[start..];
        let end = rest.find(is_delimiter).unwrap_or(rest.len());
        let (token, tail) = rest.split_at(end);
        self.rest = tail;
        Some(token)
    }
}
