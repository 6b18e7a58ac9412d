//! Software packet filter
//!
//! Evaluates a subset of the BPF filter language against decoded TCP segments
//! for sources that cannot filter themselves (pcap file replay).
//!
//! ```text
//! expr    := and ('or' and)*
//! and     := unary ('and' unary)*
//! unary   := 'not' unary | '(' expr ')' | [proto] primitive
//! proto   := tcp | udp | ip | ip6
//! primitive := proto
//!            | [src|dst] host ADDR
//!            | [src|dst] port N
//!            | [src|dst] portrange A-B
//! ```
//!
//! `&&`, `||` and `!` are accepted as aliases.

use std::fmt;
use std::net::IpAddr;

use crate::common::{DispatchError, Result};
use crate::reassembly::TcpSegment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Qualifier {
    Src,
    Dst,
    Either,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Primitive {
    Tcp,
    Udp,
    Ip,
    Ip6,
    Host(Qualifier, IpAddr),
    PortRange(Qualifier, u16, u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Primitive(Primitive),
}

/// Compiled filter expression
#[derive(Debug, Clone)]
pub struct PacketFilter {
    source: String,
    expr: Option<Expr>,
}

impl PacketFilter {
    /// Compile a filter expression; an empty expression matches everything
    ///
    /// # Errors
    ///
    /// [`DispatchError::Configuration`] for unknown or misplaced tokens.
    pub fn compile(source: &str) -> Result<Self> {
        let tokens = tokenize(source);
        let expr = if tokens.is_empty() {
            None
        } else {
            let mut parser = Parser { tokens: &tokens, pos: 0, source };
            let expr = parser.parse_or()?;
            if let Some(token) = parser.peek() {
                return Err(parser.error(&format!("unexpected `{}`", token)));
            }
            Some(expr)
        };

        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    /// Whether `segment` passes the filter
    pub fn matches(&self, segment: &TcpSegment) -> bool {
        self.expr.as_ref().map_or(true, |expr| eval(expr, segment))
    }

    /// The expression as given
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for PacketFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn eval(expr: &Expr, segment: &TcpSegment) -> bool {
    match expr {
        Expr::Or(left, right) => eval(left, segment) || eval(right, segment),
        Expr::And(left, right) => eval(left, segment) && eval(right, segment),
        Expr::Not(inner) => !eval(inner, segment),
        Expr::Primitive(primitive) => match primitive {
            Primitive::Tcp => true,
            Primitive::Udp => false,
            Primitive::Ip => segment.src.is_ipv4(),
            Primitive::Ip6 => segment.src.is_ipv6(),
            Primitive::Host(qualifier, addr) => {
                qualified(*qualifier, segment, |endpoint| endpoint.ip() == *addr)
            }
            Primitive::PortRange(qualifier, low, high) => {
                qualified(*qualifier, segment, |endpoint| (*low..=*high).contains(&endpoint.port()))
            }
        },
    }
}

fn qualified(qualifier: Qualifier, segment: &TcpSegment, test: impl Fn(&std::net::SocketAddr) -> bool) -> bool {
    match qualifier {
        Qualifier::Src => test(&segment.src),
        Qualifier::Dst => test(&segment.dst),
        Qualifier::Either => test(&segment.src) || test(&segment.dst),
    }
}

fn tokenize(source: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        let standalone = match c {
            '(' | ')' | '!' => Some(c.to_string()),
            '&' if chars.peek() == Some(&'&') => {
                chars.next();
                Some("&&".to_string())
            }
            '|' if chars.peek() == Some(&'|') => {
                chars.next();
                Some("||".to_string())
            }
            c if c.is_whitespace() => None,
            c => {
                current.push(c);
                continue;
            }
        };

        if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        if let Some(token) = standalone {
            tokens.push(token);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

struct Parser<'a> {
    tokens: &'a [String],
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn next(&mut self) -> Option<&'a str> {
        let token = self.peek();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: &str) -> DispatchError {
        DispatchError::Configuration(format!("invalid filter `{}`: {}", self.source.trim(), message))
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut expr = self.parse_and()?;
        while matches!(self.peek(), Some("or" | "||")) {
            self.pos += 1;
            expr = Expr::Or(Box::new(expr), Box::new(self.parse_and()?));
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut expr = self.parse_unary()?;
        while matches!(self.peek(), Some("and" | "&&")) {
            self.pos += 1;
            expr = Expr::And(Box::new(expr), Box::new(self.parse_unary()?));
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.next() {
            Some("not" | "!") => Ok(Expr::Not(Box::new(self.parse_unary()?))),
            Some("(") => {
                let expr = self.parse_or()?;
                match self.next() {
                    Some(")") => Ok(expr),
                    _ => Err(self.error("missing `)`")),
                }
            }
            Some(token) => self.parse_qualified(token),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    /// Primitive, optionally prefixed by a protocol (`tcp port 80`)
    fn parse_qualified(&mut self, token: &'a str) -> Result<Expr> {
        let primitive = self.parse_primitive(token)?;
        let is_protocol = matches!(primitive, Primitive::Tcp | Primitive::Udp | Primitive::Ip | Primitive::Ip6);
        if is_protocol && matches!(self.peek(), Some("src" | "dst" | "host" | "port" | "portrange")) {
            if let Some(next) = self.next() {
                let rest = self.parse_primitive(next)?;
                return Ok(Expr::And(Box::new(Expr::Primitive(primitive)), Box::new(Expr::Primitive(rest))));
            }
        }
        Ok(Expr::Primitive(primitive))
    }

    fn parse_primitive(&mut self, token: &'a str) -> Result<Primitive> {
        let (qualifier, keyword) = match token {
            "src" => (Qualifier::Src, self.next()),
            "dst" => (Qualifier::Dst, self.next()),
            other => (Qualifier::Either, Some(other)),
        };

        match keyword {
            Some("tcp") if qualifier == Qualifier::Either => Ok(Primitive::Tcp),
            Some("udp") if qualifier == Qualifier::Either => Ok(Primitive::Udp),
            Some("ip") if qualifier == Qualifier::Either => Ok(Primitive::Ip),
            Some("ip6") if qualifier == Qualifier::Either => Ok(Primitive::Ip6),
            Some("host") => {
                let value = self.next().ok_or_else(|| self.error("`host` needs an address"))?;
                let addr = value
                    .parse::<IpAddr>()
                    .map_err(|_| self.error(&format!("`{}` is not an IP address", value)))?;
                Ok(Primitive::Host(qualifier, addr))
            }
            Some("port") => {
                let value = self.next().ok_or_else(|| self.error("`port` needs a number"))?;
                let port = self.parse_port(value)?;
                Ok(Primitive::PortRange(qualifier, port, port))
            }
            Some("portrange") => {
                let value = self.next().ok_or_else(|| self.error("`portrange` needs A-B"))?;
                let (low, high) = value
                    .split_once('-')
                    .ok_or_else(|| self.error(&format!("`{}` is not a port range", value)))?;
                let (low, high) = (self.parse_port(low)?, self.parse_port(high)?);
                if low > high {
                    return Err(self.error(&format!("empty port range `{}`", value)));
                }
                Ok(Primitive::PortRange(qualifier, low, high))
            }
            Some(other) => Err(self.error(&format!("unknown token `{}`", other))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn parse_port(&self, value: &str) -> Result<u16> {
        value
            .parse::<u16>()
            .map_err(|_| self.error(&format!("`{}` is not a port number", value)))
    }
}
