use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take, take_till, take_till1, take_while1},
    character::complete::{char, space0, space1},
    combinator::{all_consuming, map, map_res, opt, rest, value},
    error::{Error, ErrorKind},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use super::types::*;

/// Decode a single command line, CRLF already stripped.
pub fn client_command(input: &[u8]) -> IResult<&[u8], ClientCommand> {
    all_consuming(alt((
        helo_command,
        ehlo_command,
        mail_command,
        rcpt_command,
        data_command,
        rset_command,
        noop_command,
        quit_command,
        vrfy_command,
        help_command,
    )))(input)
}

const KNOWN_VERBS: &[&[u8]] = &[
    b"HELO", b"EHLO", b"MAIL", b"RCPT", b"DATA", b"RSET", b"NOOP", b"QUIT", b"VRFY", b"HELP",
];

/// Tells a command we know but could not parse (501) from a command we
/// have never heard of (500).
pub fn known_verb(input: &[u8]) -> bool {
    let verb: IResult<&[u8], &[u8]> = take(4usize)(input);
    match verb {
        Ok((rest, verb)) => {
            (rest.is_empty() || rest[0] == b' ')
                && KNOWN_VERBS.iter().any(|k| k.eq_ignore_ascii_case(verb))
        }
        Err(_) => false,
    }
}

// ---------------------

fn is_space(c: u8) -> bool {
    c == b' ' || c == b'\t'
}

fn utf8(input: &[u8]) -> Result<String, std::str::Utf8Error> {
    std::str::from_utf8(input).map(str::to_string)
}

fn domain(input: &[u8]) -> IResult<&[u8], String> {
    map_res(take_till1(is_space), utf8)(input)
}

fn helo_command(input: &[u8]) -> IResult<&[u8], ClientCommand> {
    map(
        delimited(pair(tag_no_case(b"HELO"), space1), domain, space0),
        ClientCommand::Helo,
    )(input)
}

fn ehlo_command(input: &[u8]) -> IResult<&[u8], ClientCommand> {
    map(
        delimited(pair(tag_no_case(b"EHLO"), space1), domain, space0),
        ClientCommand::Ehlo,
    )(input)
}

/// `<@relay1,@relay2:user@host>` is still accepted by RFC 5321 but the
/// source route must be ignored.
fn strip_source_route(path: String) -> String {
    match (path.starts_with('@'), path.find(':')) {
        (true, Some(idx)) => path[idx + 1..].to_string(),
        _ => path,
    }
}

fn path(input: &[u8]) -> IResult<&[u8], String> {
    map(
        map_res(
            delimited(char('<'), take_till(|c: u8| c == b'>'), char('>')),
            utf8,
        ),
        strip_source_route,
    )(input)
}

fn esmtp_keyword_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-'
}

fn esmtp_param(input: &[u8]) -> IResult<&[u8], (&[u8], Option<&[u8]>)> {
    pair(
        take_while1(esmtp_keyword_char),
        opt(preceded(char('='), take_till1(is_space))),
    )(input)
}

fn esmtp_params(input: &[u8]) -> IResult<&[u8], Vec<(&[u8], Option<&[u8]>)>> {
    terminated(many0(preceded(space1, esmtp_param)), space0)(input)
}

fn mail_command(input: &[u8]) -> IResult<&[u8], ClientCommand> {
    let mut parser = tuple((
        tag_no_case(b"MAIL"),
        space1,
        tag_no_case(b"FROM:"),
        space0,
        path,
        esmtp_params,
    ));
    let (input, (_, _, _, _, from, params)) = parser(input)?;

    let size = match params
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(b"SIZE"))
    {
        None => None,
        Some(&(_, raw)) => {
            let parsed = raw
                .and_then(|v| std::str::from_utf8(v).ok())
                .and_then(|v| v.parse::<u64>().ok());
            match parsed {
                Some(v) => Some(v),
                None => return Err(nom::Err::Failure(Error::new(input, ErrorKind::Digit))),
            }
        }
    };

    Ok((input, ClientCommand::Mail { from, size }))
}

fn rcpt_command(input: &[u8]) -> IResult<&[u8], ClientCommand> {
    let mut parser = tuple((
        tag_no_case(b"RCPT"),
        space1,
        tag_no_case(b"TO:"),
        space0,
        path,
        esmtp_params,
    ));
    let (input, (_, _, _, _, to, _)) = parser(input)?;
    Ok((input, ClientCommand::Rcpt { to }))
}

fn data_command(input: &[u8]) -> IResult<&[u8], ClientCommand> {
    value(ClientCommand::Data, terminated(tag_no_case(b"DATA"), space0))(input)
}

fn rset_command(input: &[u8]) -> IResult<&[u8], ClientCommand> {
    value(ClientCommand::Rset, terminated(tag_no_case(b"RSET"), space0))(input)
}

fn quit_command(input: &[u8]) -> IResult<&[u8], ClientCommand> {
    value(ClientCommand::Quit, terminated(tag_no_case(b"QUIT"), space0))(input)
}

fn noop_command(input: &[u8]) -> IResult<&[u8], ClientCommand> {
    value(
        ClientCommand::Noop,
        pair(tag_no_case(b"NOOP"), opt(preceded(space1, rest))),
    )(input)
}

fn help_command(input: &[u8]) -> IResult<&[u8], ClientCommand> {
    value(
        ClientCommand::Help,
        pair(tag_no_case(b"HELP"), opt(preceded(space1, rest))),
    )(input)
}

fn vrfy_command(input: &[u8]) -> IResult<&[u8], ClientCommand> {
    map(
        preceded(
            pair(tag_no_case(b"VRFY"), space1),
            map_res(take_while1(|_: u8| true), utf8),
        ),
        ClientCommand::Vrfy,
    )(input)
}
