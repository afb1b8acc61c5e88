use super::{
    ChainQuery, Clause, Direction, Literal, NodePattern, Op, PatternChain, Predicate,
    RelPattern, ReturnItem,
};
use crate::error::GraphError;
use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_while, take_while1};
use nom::character::complete::{char as pchar, digit1, multispace0, satisfy};
use nom::combinator::{all_consuming, cut, map, map_res, not, opt, peek, recognize, value};
use nom::multi::{many1, separated_list1};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;
use serde_json::Value;

/// Parse and scope-check a chained-MATCH query.
///
/// Every rejection is a [`GraphError::Syntax`] carrying the line and column
/// of the offending input.
pub fn parse(text: &str) -> Result<ChainQuery, GraphError> {
    if text.trim().is_empty() {
        return Err(GraphError::Syntax("empty query".into()));
    }
    let parsed = all_consuming(delimited(
        multispace0,
        terminated(many1(ws(clause)), opt(ws(pchar(';')))),
        multispace0,
    ))(text);
    let clauses = match parsed {
        Ok((_, clauses)) => clauses,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            return Err(syntax_error(text, e.input));
        }
        Err(nom::Err::Incomplete(_)) => {
            return Err(GraphError::Syntax("unexpected end of input".into()));
        }
    };
    let query = ChainQuery { clauses };
    query.check_scope()?;
    Ok(query)
}

fn syntax_error(text: &str, rest: &str) -> GraphError {
    let offset = text.len() - rest.len();
    let consumed = &text[..offset];
    let line = consumed.matches('\n').count() + 1;
    let column = consumed
        .rfind('\n')
        .map_or(consumed.chars().count(), |nl| consumed[nl + 1..].chars().count())
        + 1;
    let token: String = rest
        .chars()
        .take_while(|c| !c.is_whitespace())
        .take(24)
        .collect();
    if token.is_empty() {
        GraphError::Syntax(format!(
            "Unexpected end of input (line {line}, column {column} (offset: {offset}))"
        ))
    } else {
        GraphError::Syntax(format!(
            "Invalid input '{token}' (line {line}, column {column} (offset: {offset}))"
        ))
    }
}

// =============================================================================
// Clauses
// =============================================================================

fn clause(input: &str) -> IResult<&str, Clause> {
    alt((match_clause, with_clause, limit_clause, return_clause))(input)
}

fn match_clause(input: &str) -> IResult<&str, Clause> {
    let (input, _) = keyword("match")(input)?;
    let (input, patterns) = cut(separated_list1(ws(pchar(',')), ws(pattern_chain)))(input)?;
    let (input, predicates) = opt(preceded(
        keyword("where"),
        cut(separated_list1(keyword("and"), ws(predicate))),
    ))(input)?;
    Ok((
        input,
        Clause::Match {
            patterns,
            predicates: predicates.unwrap_or_default(),
        },
    ))
}

fn with_clause(input: &str) -> IResult<&str, Clause> {
    map(
        preceded(
            keyword("with"),
            cut(separated_list1(ws(pchar(',')), ws(identifier))),
        ),
        Clause::With,
    )(input)
}

fn limit_clause(input: &str) -> IResult<&str, Clause> {
    map(
        preceded(
            keyword("limit"),
            cut(ws(map_res(digit1, |s: &str| s.parse::<usize>()))),
        ),
        Clause::Limit,
    )(input)
}

fn return_clause(input: &str) -> IResult<&str, Clause> {
    let (input, _) = keyword("return")(input)?;
    let (input, distinct) = opt(keyword("distinct"))(input)?;
    let (input, items) = cut(separated_list1(ws(pchar(',')), ws(return_item)))(input)?;
    Ok((
        input,
        Clause::Return {
            distinct: distinct.is_some(),
            items,
        },
    ))
}

fn return_item(input: &str) -> IResult<&str, ReturnItem> {
    map(
        pair(identifier, opt(preceded(pchar('.'), identifier))),
        |(alias, property)| ReturnItem { alias, property },
    )(input)
}

// =============================================================================
// Patterns
// =============================================================================

fn pattern_chain(input: &str) -> IResult<&str, PatternChain> {
    let (mut input, start) = node_pattern(input)?;
    let mut steps = Vec::new();
    loop {
        match rel_pattern(input) {
            Ok((rest, rel)) => {
                let (rest, node) = cut(node_pattern)(rest)?;
                steps.push((rel, node));
                input = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((input, PatternChain { start, steps }))
}

fn node_pattern(input: &str) -> IResult<&str, NodePattern> {
    map(
        delimited(
            pchar('('),
            pair(ws(opt(identifier)), opt(preceded(ws(pchar(':')), ws(label_name)))),
            pchar(')'),
        ),
        |(alias, label)| NodePattern { alias, label },
    )(input)
}

fn rel_pattern(input: &str) -> IResult<&str, RelPattern> {
    let (input, incoming) = ws(alt((value(true, tag("<-")), value(false, tag("-")))))(input)?;
    let (input, (alias, rel_type)) = delimited(
        pchar('['),
        pair(ws(opt(identifier)), opt(preceded(ws(pchar(':')), ws(label_name)))),
        pchar(']'),
    )(input)?;
    let (input, outgoing) = ws(alt((value(true, tag("->")), value(false, tag("-")))))(input)?;
    let direction = match (incoming, outgoing) {
        (false, true) => Direction::Outgoing,
        (true, false) => Direction::Incoming,
        (false, false) => Direction::Either,
        (true, true) => {
            return Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Verify,
            )))
        }
    };
    Ok((
        input,
        RelPattern {
            alias,
            rel_type,
            direction,
        },
    ))
}

// =============================================================================
// Predicates
// =============================================================================

fn predicate(input: &str) -> IResult<&str, Predicate> {
    map(
        tuple((
            identifier,
            pchar('.'),
            identifier,
            ws(alt((value(Op::Eq, pchar('=')), value(Op::Contains, keyword("contains"))))),
            literal,
        )),
        |(alias, _, property, op, value)| Predicate {
            alias,
            property,
            op,
            value,
        },
    )(input)
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        map(quoted, |s| Literal::Value(Value::String(s))),
        map(preceded(pchar('$'), identifier), Literal::Param),
        map(
            map_res(recognize(pair(opt(pchar('-')), digit1)), |s: &str| {
                s.parse::<i64>()
            }),
            |n| Literal::Value(Value::from(n)),
        ),
        value(Literal::Value(Value::Bool(true)), keyword("true")),
        value(Literal::Value(Value::Bool(false)), keyword("false")),
    ))(input)
}

/// Single- or double-quoted string with backslash escapes. Empty strings
/// are allowed.
fn quoted(input: &str) -> IResult<&str, String> {
    let fail = |at| nom::Err::Error(nom::error::Error::new(at, nom::error::ErrorKind::Char));
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, c)) if c == '\'' || c == '"' => c,
        _ => return Err(fail(input)),
    };
    let mut out = String::new();
    while let Some((i, c)) = chars.next() {
        if c == quote {
            return Ok((&input[i + c.len_utf8()..], out));
        }
        if c == '\\' {
            match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, escaped)) => out.push(escaped),
                None => break,
            }
        } else {
            out.push(c);
        }
    }
    Err(nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

// =============================================================================
// Lexical helpers
// =============================================================================

fn identifier(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(take_while1(is_ident_start), take_while(is_ident_continue))),
        str::to_string,
    )(input)
}

fn label_name(input: &str) -> IResult<&str, String> {
    alt((
        map(
            delimited(pchar('`'), take_while1(|c| c != '`'), pchar('`')),
            str::to_string,
        ),
        identifier,
    ))(input)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Case-insensitive keyword not followed by an identifier character.
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    ws(terminated(tag_no_case(word), not(peek(satisfy(is_ident_continue)))))
}

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}
