//! Helpers for turning identifiers into file names and shell arguments.

use std::net::IpAddr;

/// Lowercases `name` and collapses every run of characters outside
/// `[a-z0-9_]` into a single underscore.
pub fn sanitize_for_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;

    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    out
}

pub fn sanitize_ip(ip: &IpAddr) -> String {
    ip.to_string().replace(['.', ':'], "-")
}

const SHELL_META: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '!', '<', '>', '\'', '"', '\\', '\n', '\r',
];

/// Rejects values that would change the meaning of a shell command when
/// interpolated into a rule's command template.
pub fn is_shell_safe(value: &str) -> bool {
    !value.contains(SHELL_META) && !value.chars().any(char::is_whitespace)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
