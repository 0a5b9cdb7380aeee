//! `decode` subcommand: explain key-controller status bytes offline.

use keymux_lib::status::StatusByte;

use super::{DecodeJson, KeyEvent, Result, key_status, kv_indent, kv_width, print_json};

/// Parse a byte written as decimal, `0x` hex or `0b` binary.
pub(super) fn parse_byte(s: &str) -> std::result::Result<u8, String> {
    let s = s.trim();
    let lower = s.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        u8::from_str_radix(&hex.replace('_', ""), 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u8::from_str_radix(&bin.replace('_', ""), 2)
    } else {
        s.parse::<u8>()
    };
    parsed.map_err(|e| format!("invalid status byte \"{s}\": {e}"))
}

/// One-line human description of a decoded event.
pub(super) fn describe(event: &KeyEvent) -> String {
    match event {
        KeyEvent::Normal { code, pressed: true } => format!("key {code} pressed"),
        KeyEvent::Normal {
            code,
            pressed: false,
        } => format!("key {code} released"),
        KeyEvent::Overflow => "overflow (events were lost)".into(),
        KeyEvent::NoEvent => "no event".into(),
        KeyEvent::Ambiguous { raw } => format!("undefined reserved pattern 0x{raw:02X}"),
    }
}

pub(super) fn cmd_decode(bytes: &[u8], json: bool) -> Result<()> {
    if json {
        let rows: Vec<DecodeJson> = bytes
            .iter()
            .map(|&raw| {
                let status = StatusByte(raw);
                DecodeJson {
                    raw,
                    empty: status.empty(),
                    release: status.release(),
                    code: status.code(),
                    event: key_status::decode(raw),
                }
            })
            .collect();
        return print_json(&rows);
    }

    let w = kv_width(&[], &["Empty:", "Release:", "Code:", "Event:"]);
    for (i, &raw) in bytes.iter().enumerate() {
        if i > 0 {
            println!();
        }
        let status = StatusByte(raw);
        println!("0x{raw:02X} (0b{raw:08b})");
        kv_indent("Empty:", status.empty(), w);
        kv_indent("Release:", status.release(), w);
        kv_indent("Code:", status.code(), w);
        kv_indent("Event:", describe(&status.decode()), w);
    }
    Ok(())
}
