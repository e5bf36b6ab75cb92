//! Program resource file parsing
//!
//! A program file is a header of user uniform declarations followed by the
//! program source:
//!
//! ```text
//! spring_len comps 1 min 0.0 max 2.0 speed 0.01 default 0.5
//! gravity comps 3 min -10.0 max 10.0 speed 0.1 default 0.0 -1.0 0.0
//! END_USER_UNIFS
//! <program source, verbatim to end of file>
//! ```
//!
//! The header is strict: keywords must appear in exactly this order and
//! `default` must be followed by exactly `comps` values.

use super::user_unif::UserUnif;
use crate::constants::contract::{END_USER_UNIFS, MAX_USER_UNIFS};
use crate::error::{MorphError, Result};
use glam::Vec4;
use std::path::Path;
use std::str::FromStr;

/// Whitespace tokenizer that remembers where it stopped
struct Tokens<'a> {
    text: &'a str,
    offset: usize,
    count: usize,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            offset: 0,
            count: 0,
        }
    }

    fn next_token(&mut self) -> Option<&'a str> {
        let rest = &self.text[self.offset..];
        let start = rest.find(|c: char| !c.is_whitespace())?;
        let token_len = rest[start..]
            .find(char::is_whitespace)
            .unwrap_or(rest.len() - start);
        let token = &rest[start..start + token_len];
        self.offset += start + token_len;
        self.count += 1;
        Some(token)
    }

    fn expect_token(&mut self, what: &str) -> Result<&'a str> {
        let index = self.count;
        self.next_token().ok_or_else(|| {
            MorphError::header(
                index,
                format!("expected {}, found end of file before {}", what, END_USER_UNIFS),
            )
        })
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        let index = self.count;
        let token = self.expect_token(&format!("'{}'", keyword))?;
        if token != keyword {
            return Err(MorphError::header(
                index,
                format!("expected '{}', found '{}'", keyword, token),
            ));
        }
        Ok(())
    }

    fn parse_value<T: FromStr>(&mut self, what: &str) -> Result<T> {
        let index = self.count;
        let token = self.expect_token(what)?;
        token.parse().map_err(|_| {
            MorphError::header(index, format!("expected {}, found '{}'", what, token))
        })
    }

    /// Everything after the last token returned
    fn remainder(&self) -> &'a str {
        &self.text[self.offset..]
    }
}

fn parse_declaration(tokens: &mut Tokens, name: &str) -> Result<UserUnif> {
    tokens.expect_keyword("comps")?;
    let comps_index = tokens.count;
    let num_comps: usize = tokens.parse_value("a component count")?;
    if !(1..=4).contains(&num_comps) {
        return Err(MorphError::header(
            comps_index,
            format!("'{}' declares {} components, expected 1 to 4", name, num_comps),
        ));
    }
    tokens.expect_keyword("min")?;
    let min: f32 = tokens.parse_value("a minimum value")?;
    tokens.expect_keyword("max")?;
    let max: f32 = tokens.parse_value("a maximum value")?;
    tokens.expect_keyword("speed")?;
    let drag_speed: f32 = tokens.parse_value("a drag speed")?;
    tokens.expect_keyword("default")?;

    let mut default_value = Vec4::ZERO;
    for i in 0..num_comps {
        default_value[i] =
            tokens.parse_value(&format!("default value {} of {} for '{}'", i + 1, num_comps, name))?;
    }

    Ok(UserUnif::new(name, num_comps, min, max, drag_speed, default_value))
}

/// Splits program text into its source and declared user uniforms
///
/// The returned source starts right after the `END_USER_UNIFS` token and is
/// otherwise untouched.
pub fn parse_program_text(text: &str) -> Result<(String, Vec<UserUnif>)> {
    let mut tokens = Tokens::new(text);
    let mut user_unifs: Vec<UserUnif> = Vec::new();

    loop {
        let name_index = tokens.count;
        let name = tokens.expect_token("a uniform name")?;
        if name == END_USER_UNIFS {
            break;
        }
        if user_unifs.iter().any(|u| u.name == name) {
            return Err(MorphError::header(
                name_index,
                format!("uniform '{}' is declared twice", name),
            ));
        }
        if user_unifs.len() == MAX_USER_UNIFS {
            return Err(MorphError::header(
                name_index,
                format!("more than {} user uniforms declared", MAX_USER_UNIFS),
            ));
        }
        user_unifs.push(parse_declaration(&mut tokens, name)?);
    }

    Ok((tokens.remainder().to_string(), user_unifs))
}

/// Reads and parses a program resource file
pub fn parse_program_file(path: &Path) -> Result<(String, Vec<UserUnif>)> {
    if !path.is_file() {
        return Err(MorphError::MissingProgramFile(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|e| MorphError::io(path, e))?;
    parse_program_text(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_UNIFS: &str = "\
spring_len comps 1 min 0.0 max 2.0 speed 0.01 default 0.5
gravity comps 3 min -10.0 max 10.0 speed 0.1 default 0.0 -1.0 0.0
END_USER_UNIFS
@compute @workgroup_size(64)
fn main() {}
";

    fn assert_malformed(text: &str) {
        match parse_program_text(text) {
            Err(MorphError::MalformedHeader { .. }) => {}
            other => panic!("Expected MalformedHeader, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_two_unifs() {
        let (source, unifs) = parse_program_text(TWO_UNIFS).unwrap();
        assert_eq!(unifs.len(), 2);

        assert_eq!(unifs[0].name, "spring_len");
        assert_eq!(unifs[0].num_comps, 1);
        assert_eq!(unifs[0].min, 0.0);
        assert_eq!(unifs[0].max, 2.0);
        assert_eq!(unifs[0].drag_speed, 0.01);
        assert_eq!(unifs[0].default_value, Vec4::new(0.5, 0.0, 0.0, 0.0));
        assert_eq!(unifs[0].current_value, unifs[0].default_value);

        assert_eq!(unifs[1].name, "gravity");
        assert_eq!(unifs[1].num_comps, 3);
        assert_eq!(unifs[1].default_value, Vec4::new(0.0, -1.0, 0.0, 0.0));
        assert_eq!(unifs[1].current_value, unifs[1].default_value);

        assert_eq!(source, "\n@compute @workgroup_size(64)\nfn main() {}\n");
    }

    #[test]
    fn test_source_is_verbatim() {
        let text = "END_USER_UNIFS  keep   this\n\tspacing END_USER_UNIFS";
        let (source, unifs) = parse_program_text(text).unwrap();
        assert!(unifs.is_empty());
        assert_eq!(source, "  keep   this\n\tspacing END_USER_UNIFS");
    }

    #[test]
    fn test_wrong_keyword_order_fails() {
        assert_malformed(
            "speed 5.0 comps 4 min -1.0 max 1.0 default 0.0 0.0 0.0 0.0 END_USER_UNIFS src",
        );
        assert_malformed(
            "foo comps 4 max 1.0 min -1.0 speed 5.0 default 0.0 0.0 0.0 0.0 END_USER_UNIFS src",
        );
        assert_malformed(
            "foo comps 1 min -1.0 max 1.0 default 0.0 speed 5.0 END_USER_UNIFS src",
        );
    }

    #[test]
    fn test_default_count_must_match() {
        // too few: the sentinel is read where a number is expected
        assert_malformed("foo comps 3 min 0 max 1 speed 1 default 0.0 0.0 END_USER_UNIFS src");
        // too many: the extra value is read as the next uniform's name
        assert_malformed("foo comps 1 min 0 max 1 speed 1 default 0.0 0.0 END_USER_UNIFS src");
    }

    #[test]
    fn test_component_count_range() {
        assert_malformed("foo comps 0 min 0 max 1 speed 1 default END_USER_UNIFS");
        assert_malformed("foo comps 5 min 0 max 1 speed 1 default 1 2 3 4 5 END_USER_UNIFS");
        assert_malformed("foo comps two min 0 max 1 speed 1 default 1 2 END_USER_UNIFS");
    }

    #[test]
    fn test_missing_sentinel_fails() {
        assert_malformed("");
        assert_malformed("foo comps 1 min 0 max 1 speed 1 default 0.5");
    }

    #[test]
    fn test_duplicate_names_fail() {
        assert_malformed(
            "a comps 1 min 0 max 1 speed 1 default 0 a comps 1 min 0 max 1 speed 1 default 0 END_USER_UNIFS",
        );
    }

    #[test]
    fn test_error_reports_token_index() {
        match parse_program_text("foo comps 1 min 0 max 1 speed x default 0 END_USER_UNIFS") {
            Err(MorphError::MalformedHeader { token_index, .. }) => assert_eq!(token_index, 8),
            other => panic!("Expected MalformedHeader, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file() {
        let path = Path::new("definitely/not/here.wgsl");
        match parse_program_file(path) {
            Err(MorphError::MissingProgramFile(p)) => assert_eq!(p, path),
            other => panic!("Expected MissingProgramFile, got {:?}", other),
        }
    }
}
