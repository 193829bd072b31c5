use crate::error::QueryError;

///
/// Token
///
/// One `[label:]Name` position in a chain. Without an explicit label
/// the name doubles as the label.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Token {
    pub label: String,
    pub name: String,
}

impl Token {
    fn parse(raw: &str, chain: &str) -> Result<Self, QueryError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(QueryError::BadChain {
                chain: chain.to_string(),
                reason: "empty token".to_string(),
            });
        }
        Ok(match raw.split_once(':') {
            Some((label, name)) if !label.is_empty() && !name.is_empty() => Self {
                label: label.to_string(),
                name: name.to_string(),
            },
            Some(_) => {
                return Err(QueryError::BadChain {
                    chain: chain.to_string(),
                    reason: format!("malformed token: {raw}"),
                });
            }
            None => Self {
                label: raw.to_string(),
                name: raw.to_string(),
            },
        })
    }
}

///
/// Direction
///
/// Forward (`A-EVENT>B`): the textual-left node is the event's left
/// endpoint. Backward (`A<EVENT-B`): the textual-right node is.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Forward,
    Backward,
}

///
/// Hop
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Hop {
    pub event: Token,
    pub direction: Direction,
    pub to: Token,
}

///
/// Chain
///
/// One parsed path expression. A bare node token (no hops) introduces
/// a disconnected fragment.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Chain {
    pub head: Token,
    pub hops: Vec<Hop>,
}

/// Parse a chain expression such as `U:User<HAVE-UserGroup` or
/// `A-OWN>B-IN>C`.
pub fn parse(chain: &str) -> Result<Chain, QueryError> {
    let bad = |reason: &str| QueryError::BadChain {
        chain: chain.to_string(),
        reason: reason.to_string(),
    };

    let mut rest = chain.trim();
    let head_end = rest.find(['-', '<']).unwrap_or(rest.len());
    let head = Token::parse(&rest[..head_end], chain)?;
    rest = &rest[head_end..];

    let mut hops = Vec::new();
    while !rest.is_empty() {
        let (event_raw, direction, after_event) = if let Some(tail) = rest.strip_prefix('-') {
            let end = tail.find('>').ok_or_else(|| bad("missing '>'"))?;
            (&tail[..end], Direction::Forward, &tail[end + 1..])
        } else if let Some(tail) = rest.strip_prefix('<') {
            let end = tail.find('-').ok_or_else(|| bad("missing '-'"))?;
            (&tail[..end], Direction::Backward, &tail[end + 1..])
        } else {
            return Err(bad("expected '-' or '<'"));
        };

        let event = Token::parse(event_raw, chain)?;
        let to_end = after_event.find(['-', '<']).unwrap_or(after_event.len());
        let to = Token::parse(&after_event[..to_end], chain)?;
        rest = &after_event[to_end..];

        hops.push(Hop {
            event,
            direction,
            to,
        });
    }

    Ok(Chain { head, hops })
}
