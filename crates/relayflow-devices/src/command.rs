/*!
 * Command synthesis.
 *
 * Catalog command templates use a small set of placeholders so that one
 * catalog format covers firmwares expecting ASCII channel numbers, raw
 * binary channel codes, or password-bearing commands. Substitution runs in
 * a fixed order:
 *
 * 1. `{A}` becomes the module's authentication token. `{u}` and `{p}` inside
 *    the token are first replaced by the connection string's user name and
 *    password, when those are present.
 * 2. `{c}`, `{p}` and `{u}` left in the command become the decimal channel
 *    index. Older catalogs use all three for the channel, which is why a
 *    token whose credentials are missing ends up carrying the channel
 *    number instead.
 * 3. `{C}` becomes the single character whose code is the channel index.
 * 4. `\ddd` (three octal digits) becomes the character with that code.
 * 5. `\0xHH` (two hex digits) becomes the character with that code.
 *
 * Every occurrence of a placeholder is replaced. The rendered text is sent
 * as bytes: characters up to U+00FF map to a single byte of the same value,
 * anything above is sent as UTF-8.
 */
use bytes::Bytes;

use crate::module::ValidatedModule;

/// Render the command switching `channel_index` of `module` to `state`.
///
/// Returns `None` when the module has no channel with that index; the caller
/// must report the operation as unavailable and write nothing.
pub fn synthesize(module: &ValidatedModule, channel_index: u32, state: bool) -> Option<Bytes> {
    let channel = module.channel(channel_index)?;
    let token = resolve_token(module);
    Some(encode(&render(
        channel.command_template(state),
        &token,
        Some(channel.index),
    )))
}

/// Render the module's status request command, if it has one
pub fn status_request(module: &ValidatedModule) -> Option<Bytes> {
    let template = module.status_command()?;
    Some(encode(&render(template, &resolve_token(module), None)))
}

fn resolve_token(module: &ValidatedModule) -> String {
    let mut token = module.authentication_token().unwrap_or_default().to_string();
    let connection = module.connection();
    if let Some(username) = connection.username() {
        token = token.replace("{u}", username);
    }
    if let Some(password) = connection.password() {
        token = token.replace("{p}", password);
    }
    token
}

fn render(template: &str, token: &str, channel: Option<u32>) -> String {
    let mut command = template.replace("{A}", token);
    if let Some(index) = channel {
        let decimal = index.to_string();
        command = command
            .replace("{c}", &decimal)
            .replace("{p}", &decimal)
            .replace("{u}", &decimal);
        if let Some(code) = char::from_u32(index) {
            command = command.replace("{C}", code.encode_utf8(&mut [0; 4]));
        }
    }
    let command = unescape(&command, "\\", 3, 8);
    unescape(&command, "\\0x", 2, 16)
}

/// Replace `marker` followed by exactly `width` digits in `radix` with the
/// character of that code. Anything else is left as written.
fn unescape(s: &str, marker: &str, width: usize, radix: u32) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find(marker) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + marker.len()..];
        let decoded = tail
            .get(..width)
            .filter(|digits| digits.chars().all(|c| c.is_digit(radix)))
            .and_then(|digits| u32::from_str_radix(digits, radix).ok())
            .and_then(char::from_u32);
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &tail[width..];
            }
            None => {
                out.push_str(marker);
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

fn encode(command: &str) -> Bytes {
    let mut bytes = Vec::with_capacity(command.len());
    for ch in command.chars() {
        match u8::try_from(u32::from(ch)) {
            Ok(byte) => bytes.push(byte),
            Err(_) => bytes.extend_from_slice(ch.encode_utf8(&mut [0; 4]).as_bytes()),
        }
    }
    Bytes::from(bytes)
}
