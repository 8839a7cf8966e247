//! Header value tokenizers
//!
//! Split Via, Contact, To/From and Authorization header values into the raw
//! header structures the event model consumes. Values are kept as written,
//! quotes included; unquoting happens when events are built.

use crate::domain::event::{AuthorizationHeader, ContactHeader, Param, ViaHeader};

/// Split on `sep` outside quoted strings and angle brackets
fn split_top_level(value: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '<' if !quoted => depth += 1,
            '>' if !quoted => depth = depth.saturating_sub(1),
            c if c == sep && !quoted && depth == 0 => {
                parts.push(value[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(value[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

fn parse_params<'a>(parts: impl Iterator<Item = &'a str>) -> Vec<Param> {
    parts
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((key, value)) => (key.trim().to_string(), Some(value.trim().to_string())),
            None => (p.to_string(), None),
        })
        .collect()
}

/// Split `host[:port]`, accepting bracketed IPv6 literals
pub fn split_host_port(hostport: &str) -> (String, Option<String>) {
    let hostport = hostport.trim();
    if let Some(rest) = hostport.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').map(str::to_string);
            return (host.to_string(), port);
        }
    }
    match hostport.split_once(':') {
        // more than one colon is an unbracketed IPv6 literal without a port
        Some((host, port)) if !port.contains(':') => (host.to_string(), Some(port.to_string())),
        _ => (hostport.to_string(), None),
    }
}

/// Tokenize a Via header value; one value may carry several comma-separated hops
pub fn parse_via(value: &str) -> Vec<ViaHeader> {
    split_top_level(value, ',')
        .into_iter()
        .filter_map(|hop| {
            let (protocol, rest) = hop.split_once(char::is_whitespace)?;
            let transport = protocol.rsplit('/').next().map(str::to_string);
            let mut fields = rest.trim().split(';');
            let (host, port) = split_host_port(fields.next()?);

            Some(ViaHeader {
                transport,
                host: Some(host).filter(|h| !h.is_empty()),
                port,
                params: parse_params(fields),
            })
        })
        .collect()
}

fn parse_uri(uri: &str, header: &mut ContactHeader) {
    let uri = uri.split('?').next().unwrap_or(uri);
    let (scheme, rest) = match uri.split_once(':') {
        Some((scheme, rest)) if !scheme.contains('@') => (Some(scheme.trim()), rest),
        _ => (None, uri),
    };
    let mut fields = rest.split(';');
    let userhost = fields.next().unwrap_or_default();
    let (user, hostport) = match userhost.rsplit_once('@') {
        // drop any password after the user name
        Some((user, hostport)) => (user.split(':').next(), hostport),
        None => (None, userhost),
    };
    let (host, port) = split_host_port(hostport);

    header.scheme = scheme.map(str::to_string);
    header.user = user.filter(|u| !u.is_empty()).map(str::to_string);
    header.host = Some(host).filter(|h| !h.is_empty());
    header.port = port;
}

fn parse_contact(value: &str) -> Option<ContactHeader> {
    let mut header = ContactHeader::default();

    let params = if let Some(open) = value.find('<') {
        let close = value[open..].find('>').map(|i| open + i)?;
        let display = value[..open].trim();
        header.display = Some(display.to_string()).filter(|d| !d.is_empty());
        parse_uri(&value[open + 1..close], &mut header);
        &value[close + 1..]
    } else {
        // without brackets, parameters belong to the header
        let (uri, params) = value.split_once(';').unwrap_or((value, ""));
        parse_uri(uri, &mut header);
        params
    };

    header.params = parse_params(params.split(';'));
    header.host.as_ref()?;
    Some(header)
}

/// Whether a Contact header value is the `*` wildcard
pub fn is_wildcard(value: &str) -> bool {
    value.trim() == "*"
}

/// Tokenize a Contact header value; the `*` wildcard yields nothing
pub fn parse_contacts(value: &str) -> Vec<ContactHeader> {
    split_top_level(value, ',')
        .into_iter()
        .filter(|c| *c != "*")
        .filter_map(parse_contact)
        .collect()
}

/// User part of a To or From header value
pub fn parse_user(value: &str) -> Option<String> {
    parse_contact(value.trim()).and_then(|header| header.user)
}

/// Tokenize an Authorization or Proxy-Authorization header value
pub fn parse_authorization(value: &str) -> Option<AuthorizationHeader> {
    let value = value.trim();
    let (scheme, params) = value.split_once(char::is_whitespace)?;
    let mut header = AuthorizationHeader {
        scheme: Some(scheme.to_string()),
        ..Default::default()
    };

    for part in split_top_level(params, ',') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = Some(value.trim().to_string());
        match key.trim().to_ascii_lowercase().as_str() {
            "username" => header.username = value,
            "realm" => header.realm = value,
            "nonce" => header.nonce = value,
            "uri" => header.uri = value,
            "response" => header.response = value,
            "algorithm" => header.algorithm = value,
            _ => {}
        }
    }
    Some(header)
}
