use combine::error::ParseError;
use combine::parser::char::char;
use combine::{between, choice, eof, many, many1, none_of, satisfy, EasyParser, Parser, Stream};

use crate::Error;

/// One piece of a parsed filename template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    /// Text copied verbatim.
    Lit(String),
    /// `{key}` placeholder, replaced by the value bound to `key`.
    Var(String),
}

fn var<Input>() -> impl Parser<Input, Output = Piece>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    between(
        char('{'),
        char('}'),
        many1::<String, _, _>(satisfy(|c: char| c == '_' || c.is_alphanumeric())),
    )
    .map(Piece::Var)
}

fn literal<Input>() -> impl Parser<Input, Output = Piece>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1::<String, _, _>(none_of("{}".chars())).map(Piece::Lit)
}

fn pieces<Input>() -> impl Parser<Input, Output = Vec<Piece>>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many::<Vec<Piece>, _, _>(choice((var(), literal()))).skip(eof())
}

/// Split a template like `"{sample}/reads.{chunk}.fq"` into literal and placeholder pieces.
pub fn parse_template(text: &str) -> Result<Vec<Piece>, Error> {
    pieces()
        .easy_parse(text)
        .map(|(pieces, _remainder)| pieces)
        .map_err(|e| Error::from_easy("template", text, e))
}

/// Substitute every placeholder in `text` using `lookup`.
/// Fails if the template is malformed or refers to a key `lookup` doesn't know.
pub fn format_template<'a, F>(text: &str, lookup: F) -> Result<String, Error>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut formatted = String::with_capacity(text.len() + 16);
    for piece in parse_template(text)? {
        match piece {
            Piece::Lit(lit) => formatted.push_str(&lit),
            Piece::Var(key) => {
                let value =
                    lookup(&key).ok_or_else(|| Error::UndefinedKey(text.to_owned(), key.clone()))?;
                formatted.push_str(value);
            }
        }
    }
    Ok(formatted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_parse_pieces() -> Result<()> {
        let pieces = parse_template("data/{sample}.{chunk}.txt")?;
        assert_eq!(
            pieces,
            vec![
                Piece::Lit("data/".to_owned()),
                Piece::Var("sample".to_owned()),
                Piece::Lit(".".to_owned()),
                Piece::Var("chunk".to_owned()),
                Piece::Lit(".txt".to_owned()),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_plain_text_and_empty() -> Result<()> {
        assert_eq!(
            parse_template("plain.txt")?,
            vec![Piece::Lit("plain.txt".to_owned())]
        );
        assert!(parse_template("")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_unclosed_placeholder() {
        assert!(matches!(
            parse_template("out/{sample.txt"),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_format() -> Result<()> {
        let lookup = |key: &str| match key {
            "sample" => Some("s1"),
            _ => None,
        };
        assert_eq!(format_template("{sample}.bam", lookup)?, "s1.bam");
        assert!(matches!(
            format_template("{lane}.bam", lookup),
            Err(Error::UndefinedKey(_, key)) if key == "lane"
        ));
        Ok(())
    }
}
