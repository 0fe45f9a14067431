//! Negotiation of the `permessage-deflate` extension (RFC 7692) over the
//! `Sec-WebSocket-Extensions` handshake header.
//!
//! Some parameters affect both compression and decompression
//! (`client_no_context_takeover`, `server_no_context_takeover`), while others
//! affect only the sender that they name (`client_max_window_bits`,
//! `server_max_window_bits`). Keeping a compression context between messages
//! improves the compression ratio at the cost of memory; a larger window
//! (closer to 15) compresses better but is slower and uses more memory than a
//! smaller one (closer to 9).

use crate::error::Error;

const PERMESSAGE_DEFLATE: &str = "permessage-deflate";
const CLIENT_NO_CONTEXT_TAKEOVER: &str = "client_no_context_takeover";
const SERVER_NO_CONTEXT_TAKEOVER: &str = "server_no_context_takeover";
const CLIENT_MAX_WINDOW_BITS: &str = "client_max_window_bits";
const SERVER_MAX_WINDOW_BITS: &str = "server_max_window_bits";

pub const MIN_WINDOW_BITS: u8 = 9;
pub const MAX_WINDOW_BITS: u8 = 15;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    /// Dictates if compression is enabled.
    pub permessage_deflate: bool,
    /// The client resets its compression context after every message; if
    /// accepted, the server must reset its decompression context per message.
    pub client_no_context_takeover: Option<bool>,
    /// The server resets its compression context after every message; if the
    /// client asked for this and the server accepts, the client must reset its
    /// decompression context per message.
    pub server_no_context_takeover: Option<bool>,
    /// Window size the client compresses with.
    pub client_max_window_bits: Option<u8>,
    /// Window size the server compresses with.
    pub server_max_window_bits: Option<u8>,
}

/// Parses a `Sec-WebSocket-Extensions` header value. Returns `Ok(None)` when
/// the header doesn't mention `permessage-deflate` at all (the header may
/// still list other, unsupported extensions, which are silently ignored).
pub fn parse_extensions(extensions_header_value: &str) -> Result<Option<Extensions>, Error> {
    let mut extensions = Extensions::default();

    for extension_str in extensions_header_value.split(';') {
        let extension_str = extension_str.trim();
        if extension_str == PERMESSAGE_DEFLATE {
            extensions.permessage_deflate = true;
        } else if extension_str.starts_with(CLIENT_NO_CONTEXT_TAKEOVER) {
            extensions.client_no_context_takeover = Some(true);
        } else if extension_str.starts_with(SERVER_NO_CONTEXT_TAKEOVER) {
            extensions.server_no_context_takeover = Some(true);
        } else if extension_str.starts_with(CLIENT_MAX_WINDOW_BITS) {
            extensions.client_max_window_bits = Some(parse_window_bits(extension_str)?);
        } else if extension_str.starts_with(SERVER_MAX_WINDOW_BITS) {
            extensions.server_max_window_bits = Some(parse_window_bits(extension_str)?);
        }
    }

    if !extensions.permessage_deflate {
        return Ok(None);
    }

    Ok(Some(extensions))
}

fn parse_window_bits(param: &str) -> Result<u8, Error> {
    let bits = match param.split_once('=') {
        None => MAX_WINDOW_BITS,
        Some((_, value)) => value
            .trim()
            .parse::<u8>()
            .map_err(|_| Error::InvalidMaxWindowBits)?,
    };
    if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&bits) {
        return Err(Error::InvalidMaxWindowBits);
    }
    Ok(bits)
}

/// Merges what the server is configured to offer with what the client asked
/// for, producing the extension parameters both sides will actually run with.
/// `None` on either side means permessage-deflate is off for this connection.
pub fn merge_extensions(
    server_extensions: Option<Extensions>,
    client_extensions: Option<Extensions>,
) -> Option<Extensions> {
    let server_ext = server_extensions?;
    let client_ext = client_extensions?;

    if !(server_ext.permessage_deflate && client_ext.permessage_deflate) {
        return None;
    }

    Some(Extensions {
        permessage_deflate: true,
        client_no_context_takeover: server_ext
            .client_no_context_takeover
            .and(client_ext.client_no_context_takeover),
        server_no_context_takeover: server_ext
            .server_no_context_takeover
            .and(client_ext.server_no_context_takeover),
        client_max_window_bits: min_option(
            server_ext.client_max_window_bits,
            client_ext.client_max_window_bits,
        ),
        server_max_window_bits: min_option(
            server_ext.server_max_window_bits,
            client_ext.server_max_window_bits,
        ),
    })
}

fn min_option(a: Option<u8>, b: Option<u8>) -> Option<u8> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Renders `extensions` as a `Sec-WebSocket-Extensions` header value, with no
/// trailing CRLF. Returns `None` when there is nothing to advertise.
pub fn build_header_value(extensions: &Extensions) -> Option<String> {
    if !extensions.permessage_deflate {
        return None;
    }

    let mut value = PERMESSAGE_DEFLATE.to_string();
    if let Some(true) = extensions.client_no_context_takeover {
        value.push_str("; ");
        value.push_str(CLIENT_NO_CONTEXT_TAKEOVER);
    }
    if let Some(true) = extensions.server_no_context_takeover {
        value.push_str("; ");
        value.push_str(SERVER_NO_CONTEXT_TAKEOVER);
    }
    if let Some(bits) = extensions.client_max_window_bits {
        value.push_str(&format!("; {}={}", CLIENT_MAX_WINDOW_BITS, bits));
    }
    if let Some(bits) = extensions.server_max_window_bits {
        value.push_str(&format!("; {}={}", SERVER_MAX_WINDOW_BITS, bits));
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_without_permessage_deflate_parses_to_none() {
        assert_eq!(parse_extensions("some-other-extension").unwrap(), None);
    }

    #[test]
    fn bare_permessage_deflate_parses() {
        let ext = parse_extensions("permessage-deflate").unwrap().unwrap();
        assert!(ext.permessage_deflate);
        assert_eq!(ext.client_max_window_bits, None);
    }

    #[test]
    fn full_parameter_set_parses() {
        let header = "permessage-deflate; client_no_context_takeover; \
                       server_max_window_bits=10; client_max_window_bits=12";
        let ext = parse_extensions(header).unwrap().unwrap();
        assert_eq!(ext.client_no_context_takeover, Some(true));
        assert_eq!(ext.server_max_window_bits, Some(10));
        assert_eq!(ext.client_max_window_bits, Some(12));
        assert_eq!(ext.server_no_context_takeover, None);
    }

    #[test]
    fn window_bits_out_of_range_is_rejected() {
        assert!(matches!(
            parse_extensions("permessage-deflate; client_max_window_bits=20"),
            Err(Error::InvalidMaxWindowBits)
        ));
        assert!(matches!(
            parse_extensions("permessage-deflate; client_max_window_bits=4"),
            Err(Error::InvalidMaxWindowBits)
        ));
    }

    #[test]
    fn merge_takes_the_smaller_window_and_requires_both_sides_enabled() {
        let server = Extensions {
            permessage_deflate: true,
            client_max_window_bits: Some(15),
            ..Default::default()
        };
        let client = Extensions {
            permessage_deflate: true,
            client_max_window_bits: Some(10),
            ..Default::default()
        };
        let merged = merge_extensions(Some(server), Some(client)).unwrap();
        assert_eq!(merged.client_max_window_bits, Some(10));
    }

    #[test]
    fn merge_with_either_side_absent_disables_the_extension() {
        assert_eq!(merge_extensions(None, Some(Extensions::default())), None);
        assert_eq!(merge_extensions(Some(Extensions::default()), None), None);
    }

    #[test]
    fn header_roundtrips_through_parse_and_build() {
        let original = Extensions {
            permessage_deflate: true,
            client_no_context_takeover: Some(true),
            server_no_context_takeover: None,
            client_max_window_bits: Some(13),
            server_max_window_bits: None,
        };
        let header = build_header_value(&original).unwrap();
        let parsed = parse_extensions(&header).unwrap().unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn disabled_extension_has_no_header_value() {
        assert_eq!(build_header_value(&Extensions::default()), None);
    }
}
